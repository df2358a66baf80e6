//! Per-user card and reaction limits.
//!
//! Checks run in their own read transaction, separate from the write that
//! follows. Concurrent requests from one user can therefore overshoot a limit
//! by the number of requests in flight; there is no per-user lock.

use std::sync::Arc;

use serde::Serialize;

use crate::board::Board;
use crate::card::CardType;
use crate::error::CoreError;
use crate::gate::LifecycleGate;
use crate::ids::{BoardId, CardId, UserHash};
use crate::storage::{Storage, StorageRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub current_count: u64,
    pub limit: Option<u32>,
    pub limit_enabled: bool,
}

impl QuotaCheck {
    fn evaluate(current_count: u64, limit: Option<u32>) -> Self {
        Self {
            allowed: limit.map_or(true, |l| current_count < u64::from(l)),
            current_count,
            limit,
            limit_enabled: limit.is_some(),
        }
    }

    fn unlimited(current_count: u64) -> Self {
        Self::evaluate(current_count, None)
    }
}

pub struct QuotaEvaluator<S> {
    storage: Arc<S>,
}

impl<S: Storage> QuotaEvaluator<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Whether the user may create another card of `card_type`.
    /// Action cards are never limited.
    pub fn can_create_card(
        &self,
        board_id: BoardId,
        user: &UserHash,
        card_type: CardType,
    ) -> Result<QuotaCheck, CoreError> {
        let reader = self.storage.read()?;
        let board = LifecycleGate::load_board(&*reader, board_id)?;
        Self::card_check(&*reader, &board, user, card_type)
    }

    /// Whether the user may place another reaction anywhere on the board.
    pub fn can_add_reaction(
        &self,
        board_id: BoardId,
        user: &UserHash,
    ) -> Result<QuotaCheck, CoreError> {
        let reader = self.storage.read()?;
        let board = LifecycleGate::load_board(&*reader, board_id)?;
        Self::reaction_check(&*reader, &board, user)
    }

    pub fn ensure_can_create_card(
        &self,
        board_id: BoardId,
        user: &UserHash,
        card_type: CardType,
    ) -> Result<QuotaCheck, CoreError> {
        let check = self.can_create_card(board_id, user, card_type)?;
        match check.limit {
            Some(limit) if !check.allowed => Err(CoreError::CardLimitReached {
                current: check.current_count,
                limit,
            }),
            _ => Ok(check),
        }
    }

    /// Like [`can_add_reaction`](Self::can_add_reaction), but a user who
    /// already reacted to `card_id` passes: repeating a reaction adds no row.
    pub fn ensure_can_react(
        &self,
        board_id: BoardId,
        card_id: CardId,
        user: &UserHash,
    ) -> Result<QuotaCheck, CoreError> {
        let reader = self.storage.read()?;
        let board = LifecycleGate::load_board(&*reader, board_id)?;
        let check = Self::reaction_check(&*reader, &board, user)?;
        if reader.get_reaction(card_id, user)?.is_some() {
            return Ok(QuotaCheck {
                allowed: true,
                ..check
            });
        }
        match check.limit {
            Some(limit) if !check.allowed => Err(CoreError::ReactionLimitReached {
                current: check.current_count,
                limit,
            }),
            _ => Ok(check),
        }
    }

    fn card_check<R: StorageRead + ?Sized>(
        reader: &R,
        board: &Board,
        user: &UserHash,
        card_type: CardType,
    ) -> Result<QuotaCheck, CoreError> {
        let current = reader.count_cards(board.id, user, CardType::Feedback)?;
        if card_type == CardType::Action {
            return Ok(QuotaCheck::unlimited(current));
        }
        Ok(QuotaCheck::evaluate(
            current,
            board.card_limit_per_user.map(|l| l.get()),
        ))
    }

    fn reaction_check<R: StorageRead + ?Sized>(
        reader: &R,
        board: &Board,
        user: &UserHash,
    ) -> Result<QuotaCheck, CoreError> {
        let current = reader.count_reactions(board.id, user)?;
        Ok(QuotaCheck::evaluate(
            current,
            board.reaction_limit_per_user.map(|l| l.get()),
        ))
    }
}
