//! Ordered deletion of a board and everything that belongs to it.
//!
//! Steps always run in the same order: collect card ids, delete their
//! reactions, delete the cards, delete the sessions, delete the board. An
//! interrupted run therefore never leaves a reaction pointing at a missing
//! card. On a transactional store all steps share one transaction; otherwise
//! each step commits on its own and a failure leaves the earlier steps
//! applied. In that mode the card step also clears reactions of cards created
//! after the ids were collected.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::ids::{BoardId, CardId};
use crate::storage::{Storage, StorageTxn};

/// The per-entity deletion steps a cascade is built from.
pub trait CascadeOps {
    fn get_card_ids_by_board(&mut self, board_id: BoardId) -> Result<Vec<CardId>, StorageError>;

    fn delete_reactions_by_cards(&mut self, card_ids: &[CardId]) -> Result<u64, StorageError>;

    fn delete_cards_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError>;

    fn delete_sessions_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError>;

    fn delete_board_by_id(&mut self, board_id: BoardId) -> Result<bool, StorageError>;
}

impl<T: StorageTxn + ?Sized> CascadeOps for T {
    fn get_card_ids_by_board(&mut self, board_id: BoardId) -> Result<Vec<CardId>, StorageError> {
        self.card_ids_by_board(board_id)
    }

    fn delete_reactions_by_cards(&mut self, card_ids: &[CardId]) -> Result<u64, StorageError> {
        StorageTxn::delete_reactions_by_cards(self, card_ids)
    }

    fn delete_cards_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
        StorageTxn::delete_cards_by_board(self, board_id)
    }

    fn delete_sessions_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
        StorageTxn::delete_sessions_by_board(self, board_id)
    }

    fn delete_board_by_id(&mut self, board_id: BoardId) -> Result<bool, StorageError> {
        StorageTxn::delete_board(self, board_id)
    }
}

/// Runs each step in its own committed transaction.
struct AutoCommit<'a, S: ?Sized> {
    storage: &'a S,
}

impl<S: Storage + ?Sized> AutoCommit<'_, S> {
    fn step<T>(
        &self,
        op: impl FnOnce(&mut dyn StorageTxn) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut txn = self.storage.begin()?;
        let out = op(&mut *txn)?;
        txn.commit()?;
        Ok(out)
    }
}

impl<S: Storage + ?Sized> CascadeOps for AutoCommit<'_, S> {
    fn get_card_ids_by_board(&mut self, board_id: BoardId) -> Result<Vec<CardId>, StorageError> {
        self.storage.read()?.card_ids_by_board(board_id)
    }

    fn delete_reactions_by_cards(&mut self, card_ids: &[CardId]) -> Result<u64, StorageError> {
        self.step(|txn| StorageTxn::delete_reactions_by_cards(txn, card_ids))
    }

    /// Cards created after the id snapshot had their reactions missed by
    /// the previous step, so they are swept here first.
    fn delete_cards_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
        self.step(|txn| {
            let late_ids = txn.card_ids_by_board(board_id)?;
            StorageTxn::delete_reactions_by_cards(&mut *txn, &late_ids)?;
            StorageTxn::delete_cards_by_board(&mut *txn, board_id)
        })
    }

    fn delete_sessions_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
        self.step(|txn| StorageTxn::delete_sessions_by_board(txn, board_id))
    }

    fn delete_board_by_id(&mut self, board_id: BoardId) -> Result<bool, StorageError> {
        self.step(|txn| StorageTxn::delete_board(txn, board_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// All steps committed together.
    Transactional,
    /// Each step committed separately; no rollback on failure.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub board_id: BoardId,
    pub cards_deleted: u64,
    pub reactions_deleted: u64,
    pub sessions_deleted: u64,
    pub board_deleted: bool,
    pub mode: CascadeMode,
}

pub struct CascadeCoordinator<S> {
    storage: Arc<S>,
}

impl<S: Storage> CascadeCoordinator<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn mode(&self) -> CascadeMode {
        if self.storage.is_transactional() {
            CascadeMode::Transactional
        } else {
            CascadeMode::BestEffort
        }
    }

    pub fn delete_board(&self, board_id: BoardId) -> Result<CascadeReport, StorageError> {
        match self.mode() {
            CascadeMode::Transactional => {
                let mut txn = self.storage.begin()?;
                let report = run_cascade(&mut *txn, board_id, CascadeMode::Transactional)?;
                txn.commit()?;
                Ok(report)
            }
            CascadeMode::BestEffort => {
                let mut ops = AutoCommit {
                    storage: &*self.storage,
                };
                run_cascade(&mut ops, board_id, CascadeMode::BestEffort)
            }
        }
    }
}

/// Run the cascade steps in order against any set of deletion operations.
pub fn run_cascade<O: CascadeOps + ?Sized>(
    ops: &mut O,
    board_id: BoardId,
    mode: CascadeMode,
) -> Result<CascadeReport, StorageError> {
    let failed = |step: &'static str| {
        move |e: StorageError| {
            warn!(board = %board_id, step, mode = ?mode, error = %e, "Cascade step failed");
            e
        }
    };

    let card_ids = ops
        .get_card_ids_by_board(board_id)
        .map_err(failed("get_card_ids_by_board"))?;
    let reactions_deleted = ops
        .delete_reactions_by_cards(&card_ids)
        .map_err(failed("delete_reactions_by_cards"))?;
    let cards_deleted = ops
        .delete_cards_by_board(board_id)
        .map_err(failed("delete_cards_by_board"))?;
    let sessions_deleted = ops
        .delete_sessions_by_board(board_id)
        .map_err(failed("delete_sessions_by_board"))?;
    let board_deleted = ops
        .delete_board_by_id(board_id)
        .map_err(failed("delete_board_by_id"))?;

    debug!(
        board = %board_id,
        cards_deleted,
        reactions_deleted,
        sessions_deleted,
        "Cascade complete"
    );

    Ok(CascadeReport {
        board_id,
        cards_deleted,
        reactions_deleted,
        sessions_deleted,
        board_deleted,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{default_columns, Board};
    use crate::card::{Card, CardType};
    use crate::ids::UserHash;
    use crate::reaction::Reaction;
    use crate::session::UserSession;
    use crate::storage::memory::{FailPoint, MemoryStorage};

    /// Board with 2 cards, 3 reactions and 2 sessions.
    fn seed(storage: &MemoryStorage) -> BoardId {
        let admin = UserHash::new("admin");
        let guest = UserHash::new("guest");
        let board = Board::new(
            "Retro".to_string(),
            default_columns(),
            admin.clone(),
            None,
            None,
        );
        let cards: Vec<Card> = (0..2)
            .map(|_| {
                Card::new(
                    board.id,
                    "went_well".to_string(),
                    "content".to_string(),
                    CardType::Feedback,
                    false,
                    admin.clone(),
                    None,
                )
            })
            .collect();

        let mut txn = storage.begin().unwrap();
        txn.put_board(&board).unwrap();
        for card in &cards {
            txn.put_card(card).unwrap();
        }
        for (card, user) in [(&cards[0], &admin), (&cards[0], &guest), (&cards[1], &guest)] {
            txn.insert_reaction(&Reaction::new(card.id, board.id, user.clone(), None, None))
                .unwrap();
        }
        txn.put_session(&UserSession::new(board.id, admin.clone(), "Admin".to_string(), true))
            .unwrap();
        txn.put_session(&UserSession::new(board.id, guest, "Guest".to_string(), false))
            .unwrap();
        txn.commit().unwrap();
        board.id
    }

    struct Counts {
        board: bool,
        cards: usize,
        reactions: usize,
        sessions: usize,
    }

    fn counts(storage: &MemoryStorage, board_id: BoardId) -> Counts {
        let reader = storage.read().unwrap();
        Counts {
            board: reader.get_board(board_id).unwrap().is_some(),
            cards: reader.cards_by_board(board_id).unwrap().len(),
            reactions: reader.reactions_by_board(board_id).unwrap().len(),
            sessions: reader.sessions_by_board(board_id).unwrap().len(),
        }
    }

    #[test]
    fn test_transactional_cascade_removes_everything() {
        let storage = Arc::new(MemoryStorage::new());
        let target = seed(&storage);
        let unrelated = seed(&storage);

        let report = CascadeCoordinator::new(storage.clone())
            .delete_board(target)
            .unwrap();
        assert_eq!(report.mode, CascadeMode::Transactional);
        assert_eq!(report.cards_deleted, 2);
        assert_eq!(report.reactions_deleted, 3);
        assert_eq!(report.sessions_deleted, 2);
        assert!(report.board_deleted);

        let gone = counts(&storage, target);
        assert!(!gone.board);
        assert_eq!((gone.cards, gone.reactions, gone.sessions), (0, 0, 0));

        let kept = counts(&storage, unrelated);
        assert!(kept.board);
        assert_eq!((kept.cards, kept.reactions, kept.sessions), (2, 3, 2));
    }

    #[test]
    fn test_best_effort_cascade_removes_everything() {
        let storage = Arc::new(MemoryStorage::without_transactions());
        let target = seed(&storage);

        let report = CascadeCoordinator::new(storage.clone())
            .delete_board(target)
            .unwrap();
        assert_eq!(report.mode, CascadeMode::BestEffort);
        assert_eq!(report.reactions_deleted, 3);

        let gone = counts(&storage, target);
        assert!(!gone.board);
        assert_eq!((gone.cards, gone.reactions, gone.sessions), (0, 0, 0));
    }

    #[test]
    fn test_transactional_failure_rolls_back() {
        let storage = Arc::new(MemoryStorage::new());
        let target = seed(&storage);
        storage.fail_at(FailPoint::DeleteCardsByBoard);

        let err = CascadeCoordinator::new(storage.clone())
            .delete_board(target)
            .unwrap_err();
        assert!(matches!(err, StorageError::Injected(_)));

        let after = counts(&storage, target);
        assert!(after.board);
        assert_eq!((after.cards, after.reactions, after.sessions), (2, 3, 2));
    }

    #[test]
    fn test_best_effort_failure_keeps_earlier_steps() {
        let storage = Arc::new(MemoryStorage::without_transactions());
        let target = seed(&storage);
        storage.fail_at(FailPoint::DeleteCardsByBoard);

        assert!(CascadeCoordinator::new(storage.clone())
            .delete_board(target)
            .is_err());

        // reactions went first, so no reaction references a missing card
        let after = counts(&storage, target);
        assert!(after.board);
        assert_eq!((after.cards, after.reactions, after.sessions), (2, 0, 2));

        storage.clear_failure();
        let report = CascadeCoordinator::new(storage.clone())
            .delete_board(target)
            .unwrap();
        assert_eq!(report.reactions_deleted, 0);
        assert_eq!(report.cards_deleted, 2);
        assert!(!counts(&storage, target).board);
    }

    #[test]
    fn test_best_effort_sweeps_cards_added_mid_cascade() {
        let storage = MemoryStorage::without_transactions();
        let target = seed(&storage);
        let mut ops = AutoCommit { storage: &storage };

        let snapshot = ops.get_card_ids_by_board(target).unwrap();
        assert_eq!(ops.delete_reactions_by_cards(&snapshot).unwrap(), 3);

        // a card and a reaction land between the snapshot and the card step
        let late = Card::new(
            target,
            "went_well".to_string(),
            "late".to_string(),
            CardType::Feedback,
            false,
            UserHash::new("guest"),
            None,
        );
        let mut txn = storage.begin().unwrap();
        txn.put_card(&late).unwrap();
        txn.insert_reaction(&Reaction::new(late.id, target, UserHash::new("guest"), None, None))
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(ops.delete_cards_by_board(target).unwrap(), 3);
        let after = counts(&storage, target);
        assert_eq!((after.cards, after.reactions), (0, 0));
    }

    #[test]
    fn test_missing_board_is_reported() {
        let storage = Arc::new(MemoryStorage::new());
        let report = CascadeCoordinator::new(storage)
            .delete_board(BoardId::generate())
            .unwrap();
        assert!(!report.board_deleted);
        assert_eq!(report.cards_deleted, 0);
    }
}
