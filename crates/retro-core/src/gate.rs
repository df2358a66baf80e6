//! Board lifecycle and permission checks run before any mutation.

use crate::board::Board;
use crate::card::Card;
use crate::error::CoreError;
use crate::ids::{BoardId, CardId, UserHash};
use crate::session::UserSession;
use crate::storage::StorageRead;

pub struct LifecycleGate;

impl LifecycleGate {
    pub fn load_board<R: StorageRead + ?Sized>(
        reader: &R,
        board_id: BoardId,
    ) -> Result<Board, CoreError> {
        reader
            .get_board(board_id)?
            .ok_or(CoreError::BoardNotFound(board_id))
    }

    /// Load a board that must accept writes.
    pub fn load_active_board<R: StorageRead + ?Sized>(
        reader: &R,
        board_id: BoardId,
    ) -> Result<Board, CoreError> {
        let board = Self::load_board(reader, board_id)?;
        Self::ensure_active(&board)?;
        Ok(board)
    }

    pub fn load_card<R: StorageRead + ?Sized>(
        reader: &R,
        card_id: CardId,
    ) -> Result<Card, CoreError> {
        reader
            .get_card(card_id)?
            .ok_or(CoreError::CardNotFound(card_id))
    }

    pub fn ensure_active(board: &Board) -> Result<(), CoreError> {
        if board.is_closed() {
            return Err(CoreError::BoardClosed(board.id));
        }
        Ok(())
    }

    pub fn ensure_admin(board: &Board, user: &UserHash) -> Result<(), CoreError> {
        if !board.is_admin(user) {
            return Err(CoreError::Forbidden("only board admins may do this"));
        }
        Ok(())
    }

    /// While the creator is the only admin, only the creator may designate
    /// another one. Afterwards any admin may.
    pub fn ensure_can_designate_admin(board: &Board, user: &UserHash) -> Result<(), CoreError> {
        if board.admins.len() <= 1 {
            if board.creator() != Some(user) {
                return Err(CoreError::Forbidden(
                    "only the board creator may designate the first admin",
                ));
            }
            return Ok(());
        }
        Self::ensure_admin(board, user)
    }

    /// The caller's session on the board. Card and reaction mutations need one.
    pub fn ensure_member<R: StorageRead + ?Sized>(
        reader: &R,
        board_id: BoardId,
        user: &UserHash,
    ) -> Result<UserSession, CoreError> {
        reader
            .get_session(board_id, user)?
            .ok_or(CoreError::Forbidden("join the board first"))
    }

    pub fn ensure_card_owner(card: &Card, user: &UserHash) -> Result<(), CoreError> {
        if !card.is_created_by(user) {
            return Err(CoreError::Forbidden("only the card's creator may edit it"));
        }
        Ok(())
    }

    pub fn ensure_owner_or_admin(
        board: &Board,
        card: &Card,
        user: &UserHash,
    ) -> Result<(), CoreError> {
        if card.is_created_by(user) || board.is_admin(user) {
            return Ok(());
        }
        Err(CoreError::Forbidden(
            "only the card's creator or a board admin may delete it",
        ))
    }
}
