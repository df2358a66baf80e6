use chrono::Utc;

use crate::board::Board;
use crate::card::{Card, CardType};
use crate::error::StorageError;
use crate::ids::{BoardId, CardId, UserHash};
use crate::reaction::Reaction;
use crate::session::UserSession;

/// Result of an atomic counter update.
#[derive(Debug, Clone)]
pub struct CountUpdate {
    /// The card as written.
    pub card: Card,
    /// True if the update would have taken the counter below zero.
    pub clamped: bool,
}

/// Apply a signed delta to a counter, flooring at zero.
fn apply_delta(value: u32, delta: i32) -> (u32, bool) {
    if delta >= 0 {
        return (value.saturating_add(delta.unsigned_abs()), false);
    }
    let decrement = delta.unsigned_abs();
    if decrement > value {
        (0, true)
    } else {
        (value - decrement, false)
    }
}

/// Read access to boards, cards, reactions and sessions.
pub trait StorageRead {
    fn get_board(&self, id: BoardId) -> Result<Option<Board>, StorageError>;

    fn find_board_by_share_token(&self, token: &str) -> Result<Option<Board>, StorageError>;

    fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError>;

    fn cards_by_board(&self, board_id: BoardId) -> Result<Vec<Card>, StorageError>;

    /// Cards whose `parent_card_id` is `parent_id`.
    fn children_of(&self, parent_id: CardId) -> Result<Vec<Card>, StorageError>;

    fn get_reaction(
        &self,
        card_id: CardId,
        user: &UserHash,
    ) -> Result<Option<Reaction>, StorageError>;

    fn reactions_by_card(&self, card_id: CardId) -> Result<Vec<Reaction>, StorageError>;

    fn reactions_by_board(&self, board_id: BoardId) -> Result<Vec<Reaction>, StorageError>;

    fn get_session(
        &self,
        board_id: BoardId,
        user: &UserHash,
    ) -> Result<Option<UserSession>, StorageError>;

    fn sessions_by_board(&self, board_id: BoardId) -> Result<Vec<UserSession>, StorageError>;

    /// Get a card that must exist inside the current transaction.
    fn require_card(&self, id: CardId) -> Result<Card, StorageError> {
        self.get_card(id)?.ok_or(StorageError::CardNotFound(id))
    }

    fn card_ids_by_board(&self, board_id: BoardId) -> Result<Vec<CardId>, StorageError> {
        Ok(self
            .cards_by_board(board_id)?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    /// Count the cards of one type a user created on a board.
    fn count_cards(
        &self,
        board_id: BoardId,
        user: &UserHash,
        card_type: CardType,
    ) -> Result<u64, StorageError> {
        Ok(self
            .cards_by_board(board_id)?
            .iter()
            .filter(|c| c.card_type == card_type && c.is_created_by(user))
            .count() as u64)
    }

    /// Count the reactions a user placed anywhere on a board.
    fn count_reactions(&self, board_id: BoardId, user: &UserHash) -> Result<u64, StorageError> {
        Ok(self
            .reactions_by_board(board_id)?
            .iter()
            .filter(|r| &r.user_hash == user)
            .count() as u64)
    }
}

/// A unit of work against storage.
///
/// Writes become visible when [`commit`](StorageTxn::commit) succeeds. A
/// transaction dropped without committing discards its writes on backends
/// that support atomicity (see [`Storage::is_transactional`]).
///
/// The provided methods are the atomic field operations the engine relies
/// on: each is a read-modify-write within this transaction, so they never
/// race with other writers.
pub trait StorageTxn: StorageRead {
    fn put_board(&mut self, board: &Board) -> Result<(), StorageError>;

    fn delete_board(&mut self, id: BoardId) -> Result<bool, StorageError>;

    fn put_card(&mut self, card: &Card) -> Result<(), StorageError>;

    fn delete_card(&mut self, id: CardId) -> Result<bool, StorageError>;

    fn delete_cards_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError>;

    /// Insert a reaction row. Returns false, leaving the existing row in
    /// place, if the `(card, user)` pair already reacted.
    fn insert_reaction(&mut self, reaction: &Reaction) -> Result<bool, StorageError>;

    fn delete_reaction(&mut self, card_id: CardId, user: &UserHash)
        -> Result<bool, StorageError>;

    fn delete_reactions_by_cards(&mut self, card_ids: &[CardId]) -> Result<u64, StorageError>;

    /// Insert or replace the session for `(board_id, user_hash)`.
    fn put_session(&mut self, session: &UserSession) -> Result<(), StorageError>;

    fn delete_sessions_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError>;

    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    fn increment_direct_count(
        &mut self,
        card_id: CardId,
        delta: i32,
    ) -> Result<CountUpdate, StorageError> {
        let mut card = self.require_card(card_id)?;
        let (value, clamped) = apply_delta(card.direct_reaction_count, delta);
        card.direct_reaction_count = value;
        self.put_card(&card)?;
        Ok(CountUpdate { card, clamped })
    }

    fn increment_aggregated_count(
        &mut self,
        card_id: CardId,
        delta: i32,
    ) -> Result<CountUpdate, StorageError> {
        let mut card = self.require_card(card_id)?;
        let (value, clamped) = apply_delta(card.aggregated_reaction_count, delta);
        card.aggregated_reaction_count = value;
        self.put_card(&card)?;
        Ok(CountUpdate { card, clamped })
    }

    fn set_parent(
        &mut self,
        card_id: CardId,
        parent: Option<CardId>,
    ) -> Result<Card, StorageError> {
        let mut card = self.require_card(card_id)?;
        card.parent_card_id = parent;
        card.updated_at = Utc::now();
        self.put_card(&card)?;
        Ok(card)
    }

    /// Set `aggregated_reaction_count` to the sum of the direct counts of the
    /// card's current children.
    fn recompute_aggregate(&mut self, parent_id: CardId) -> Result<Card, StorageError> {
        let sum: u32 = self
            .children_of(parent_id)?
            .iter()
            .map(|c| c.direct_reaction_count)
            .sum();
        let mut parent = self.require_card(parent_id)?;
        parent.aggregated_reaction_count = sum;
        self.put_card(&parent)?;
        Ok(parent)
    }

    /// Make every child of `parent_id` top-level. Returns the ids touched.
    fn orphan_children(&mut self, parent_id: CardId) -> Result<Vec<CardId>, StorageError> {
        let now = Utc::now();
        let mut orphaned = Vec::new();
        for mut child in self.children_of(parent_id)? {
            child.parent_card_id = None;
            child.updated_at = now;
            self.put_card(&child)?;
            orphaned.push(child.id);
        }
        Ok(orphaned)
    }

    /// Add `feedback_id` to the action card's link set.
    /// Returns the card and whether the set changed.
    fn insert_linked_feedback(
        &mut self,
        action_id: CardId,
        feedback_id: CardId,
    ) -> Result<(Card, bool), StorageError> {
        let mut card = self.require_card(action_id)?;
        let inserted = card.linked_feedback_ids.insert(feedback_id);
        if inserted {
            card.updated_at = Utc::now();
            self.put_card(&card)?;
        }
        Ok((card, inserted))
    }

    fn remove_linked_feedback(
        &mut self,
        card_id: CardId,
        linked_id: CardId,
    ) -> Result<(Card, bool), StorageError> {
        let mut card = self.require_card(card_id)?;
        let removed = card.linked_feedback_ids.remove(&linked_id);
        if removed {
            card.updated_at = Utc::now();
            self.put_card(&card)?;
        }
        Ok((card, removed))
    }

    /// Remove `card_id` from every link set on the board.
    /// Returns the ids of the cards whose sets changed.
    fn purge_links_to(
        &mut self,
        board_id: BoardId,
        card_id: CardId,
    ) -> Result<Vec<CardId>, StorageError> {
        let now = Utc::now();
        let mut touched = Vec::new();
        for mut card in self.cards_by_board(board_id)? {
            if card.linked_feedback_ids.remove(&card_id) {
                card.updated_at = now;
                self.put_card(&card)?;
                touched.push(card.id);
            }
        }
        Ok(touched)
    }
}

/// Entry point to a storage backend.
pub trait Storage: Send + Sync {
    /// Open a read-only view.
    fn read(&self) -> Result<Box<dyn StorageRead + '_>, StorageError>;

    /// Open a write transaction.
    fn begin(&self) -> Result<Box<dyn StorageTxn + '_>, StorageError>;

    /// Whether a transaction's writes are applied atomically on commit.
    /// When false, every write is applied as soon as it is issued.
    fn is_transactional(&self) -> bool {
        true
    }
}

// In-memory implementation for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};

    #[derive(Debug, Clone, Default)]
    struct MemoryState {
        boards: HashMap<BoardId, Board>,
        cards: HashMap<CardId, Card>,
        reactions: HashMap<(CardId, UserHash), Reaction>,
        sessions: HashMap<(BoardId, UserHash), UserSession>,
    }

    /// Operations that can be made to fail on demand.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FailPoint {
        DeleteReactionsByCards,
        DeleteCardsByBoard,
        DeleteSessionsByBoard,
        DeleteBoard,
        PutCard,
    }

    impl FailPoint {
        fn name(self) -> &'static str {
            match self {
                FailPoint::DeleteReactionsByCards => "delete_reactions_by_cards",
                FailPoint::DeleteCardsByBoard => "delete_cards_by_board",
                FailPoint::DeleteSessionsByBoard => "delete_sessions_by_board",
                FailPoint::DeleteBoard => "delete_board",
                FailPoint::PutCard => "put_card",
            }
        }
    }

    /// In-memory storage for testing.
    ///
    /// Transactions hold the store's lock for their whole lifetime, so they
    /// are fully serialized. In transactional mode writes go to a staged copy
    /// that replaces the state on commit.
    pub struct MemoryStorage {
        state: Mutex<MemoryState>,
        transactional: bool,
        fail_point: Mutex<Option<FailPoint>>,
    }

    impl Default for MemoryStorage {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(MemoryState::default()),
                transactional: true,
                fail_point: Mutex::new(None),
            }
        }

        /// A store that applies every write immediately and cannot roll back.
        ///
        /// Only the board cascade is written for this mode. Engine operations
        /// run against it can be left partially applied when a step fails.
        pub fn without_transactions() -> Self {
            Self {
                transactional: false,
                ..Self::new()
            }
        }

        /// Make the given operation fail until [`clear_failure`](Self::clear_failure).
        pub fn fail_at(&self, point: FailPoint) {
            *self.fail_point.lock().unwrap() = Some(point);
        }

        pub fn clear_failure(&self) {
            *self.fail_point.lock().unwrap() = None;
        }

        fn open(&self, staged: bool) -> Result<MemoryTxn<'_>, StorageError> {
            let guard = self
                .state
                .lock()
                .map_err(|e| StorageError::Database(format!("lock poisoned: {}", e)))?;
            let fail_point = *self
                .fail_point
                .lock()
                .map_err(|e| StorageError::Database(format!("lock poisoned: {}", e)))?;
            let staged = if staged { Some(guard.clone()) } else { None };
            Ok(MemoryTxn {
                guard,
                staged,
                fail_point,
            })
        }
    }

    impl Storage for MemoryStorage {
        fn read(&self) -> Result<Box<dyn StorageRead + '_>, StorageError> {
            Ok(Box::new(self.open(false)?))
        }

        fn begin(&self) -> Result<Box<dyn StorageTxn + '_>, StorageError> {
            Ok(Box::new(self.open(self.transactional)?))
        }

        fn is_transactional(&self) -> bool {
            self.transactional
        }
    }

    pub struct MemoryTxn<'a> {
        guard: MutexGuard<'a, MemoryState>,
        staged: Option<MemoryState>,
        fail_point: Option<FailPoint>,
    }

    impl MemoryTxn<'_> {
        fn state(&self) -> &MemoryState {
            match &self.staged {
                Some(s) => s,
                None => &*self.guard,
            }
        }

        fn state_mut(&mut self) -> &mut MemoryState {
            match &mut self.staged {
                Some(s) => s,
                None => &mut *self.guard,
            }
        }

        fn check(&self, point: FailPoint) -> Result<(), StorageError> {
            if self.fail_point == Some(point) {
                return Err(StorageError::Injected(point.name()));
            }
            Ok(())
        }
    }

    impl StorageRead for MemoryTxn<'_> {
        fn get_board(&self, id: BoardId) -> Result<Option<Board>, StorageError> {
            Ok(self.state().boards.get(&id).cloned())
        }

        fn find_board_by_share_token(&self, token: &str) -> Result<Option<Board>, StorageError> {
            Ok(self
                .state()
                .boards
                .values()
                .find(|b| b.share_token == token)
                .cloned())
        }

        fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError> {
            Ok(self.state().cards.get(&id).cloned())
        }

        fn cards_by_board(&self, board_id: BoardId) -> Result<Vec<Card>, StorageError> {
            Ok(self
                .state()
                .cards
                .values()
                .filter(|c| c.board_id == board_id)
                .cloned()
                .collect())
        }

        fn children_of(&self, parent_id: CardId) -> Result<Vec<Card>, StorageError> {
            Ok(self
                .state()
                .cards
                .values()
                .filter(|c| c.parent_card_id == Some(parent_id))
                .cloned()
                .collect())
        }

        fn get_reaction(
            &self,
            card_id: CardId,
            user: &UserHash,
        ) -> Result<Option<Reaction>, StorageError> {
            Ok(self
                .state()
                .reactions
                .get(&(card_id, user.clone()))
                .cloned())
        }

        fn reactions_by_card(&self, card_id: CardId) -> Result<Vec<Reaction>, StorageError> {
            Ok(self
                .state()
                .reactions
                .values()
                .filter(|r| r.card_id == card_id)
                .cloned()
                .collect())
        }

        fn reactions_by_board(&self, board_id: BoardId) -> Result<Vec<Reaction>, StorageError> {
            Ok(self
                .state()
                .reactions
                .values()
                .filter(|r| r.board_id == board_id)
                .cloned()
                .collect())
        }

        fn get_session(
            &self,
            board_id: BoardId,
            user: &UserHash,
        ) -> Result<Option<UserSession>, StorageError> {
            Ok(self
                .state()
                .sessions
                .get(&(board_id, user.clone()))
                .cloned())
        }

        fn sessions_by_board(&self, board_id: BoardId) -> Result<Vec<UserSession>, StorageError> {
            Ok(self
                .state()
                .sessions
                .values()
                .filter(|s| s.board_id == board_id)
                .cloned()
                .collect())
        }
    }

    impl StorageTxn for MemoryTxn<'_> {
        fn put_board(&mut self, board: &Board) -> Result<(), StorageError> {
            self.state_mut().boards.insert(board.id, board.clone());
            Ok(())
        }

        fn delete_board(&mut self, id: BoardId) -> Result<bool, StorageError> {
            self.check(FailPoint::DeleteBoard)?;
            Ok(self.state_mut().boards.remove(&id).is_some())
        }

        fn put_card(&mut self, card: &Card) -> Result<(), StorageError> {
            self.check(FailPoint::PutCard)?;
            self.state_mut().cards.insert(card.id, card.clone());
            Ok(())
        }

        fn delete_card(&mut self, id: CardId) -> Result<bool, StorageError> {
            Ok(self.state_mut().cards.remove(&id).is_some())
        }

        fn delete_cards_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
            self.check(FailPoint::DeleteCardsByBoard)?;
            let cards = &mut self.state_mut().cards;
            let before = cards.len();
            cards.retain(|_, c| c.board_id != board_id);
            Ok((before - cards.len()) as u64)
        }

        fn insert_reaction(&mut self, reaction: &Reaction) -> Result<bool, StorageError> {
            let key = (reaction.card_id, reaction.user_hash.clone());
            let reactions = &mut self.state_mut().reactions;
            if reactions.contains_key(&key) {
                return Ok(false);
            }
            reactions.insert(key, reaction.clone());
            Ok(true)
        }

        fn delete_reaction(
            &mut self,
            card_id: CardId,
            user: &UserHash,
        ) -> Result<bool, StorageError> {
            Ok(self
                .state_mut()
                .reactions
                .remove(&(card_id, user.clone()))
                .is_some())
        }

        fn delete_reactions_by_cards(&mut self, card_ids: &[CardId]) -> Result<u64, StorageError> {
            self.check(FailPoint::DeleteReactionsByCards)?;
            let reactions = &mut self.state_mut().reactions;
            let before = reactions.len();
            reactions.retain(|(card_id, _), _| !card_ids.contains(card_id));
            Ok((before - reactions.len()) as u64)
        }

        fn put_session(&mut self, session: &UserSession) -> Result<(), StorageError> {
            self.state_mut().sessions.insert(
                (session.board_id, session.user_hash.clone()),
                session.clone(),
            );
            Ok(())
        }

        fn delete_sessions_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
            self.check(FailPoint::DeleteSessionsByBoard)?;
            let sessions = &mut self.state_mut().sessions;
            let before = sessions.len();
            sessions.retain(|(b, _), _| *b != board_id);
            Ok((before - sessions.len()) as u64)
        }

        fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
            if let Some(staged) = self.staged.take() {
                *self.guard = staged;
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn make_card(board_id: BoardId, author: &str) -> Card {
            Card::new(
                board_id,
                "went_well".to_string(),
                "content".to_string(),
                CardType::Feedback,
                false,
                UserHash::new(author),
                None,
            )
        }

        #[test]
        fn test_uncommitted_transaction_is_discarded() {
            let storage = MemoryStorage::new();
            let card = make_card(BoardId::generate(), "u1");

            {
                let mut txn = storage.begin().unwrap();
                txn.put_card(&card).unwrap();
                // dropped without commit
            }
            assert!(storage.read().unwrap().get_card(card.id).unwrap().is_none());

            let mut txn = storage.begin().unwrap();
            txn.put_card(&card).unwrap();
            txn.commit().unwrap();
            assert!(storage.read().unwrap().get_card(card.id).unwrap().is_some());
        }

        #[test]
        fn test_without_transactions_applies_immediately() {
            let storage = MemoryStorage::without_transactions();
            let card = make_card(BoardId::generate(), "u1");

            {
                let mut txn = storage.begin().unwrap();
                txn.put_card(&card).unwrap();
            }
            assert!(storage.read().unwrap().get_card(card.id).unwrap().is_some());
        }

        #[test]
        fn test_insert_reaction_is_keyed_by_card_and_user() {
            let storage = MemoryStorage::new();
            let board_id = BoardId::generate();
            let card = make_card(board_id, "u1");
            let user = UserHash::new("u2");

            let mut txn = storage.begin().unwrap();
            let reaction = Reaction::new(card.id, board_id, user.clone(), None, None);
            assert!(txn.insert_reaction(&reaction).unwrap());
            assert!(!txn.insert_reaction(&reaction).unwrap());
            assert_eq!(txn.count_reactions(board_id, &user).unwrap(), 1);
            assert!(txn.delete_reaction(card.id, &user).unwrap());
            assert!(!txn.delete_reaction(card.id, &user).unwrap());
        }

        #[test]
        fn test_counter_floors_at_zero() {
            let storage = MemoryStorage::new();
            let card = make_card(BoardId::generate(), "u1");

            let mut txn = storage.begin().unwrap();
            txn.put_card(&card).unwrap();

            let up = txn.increment_direct_count(card.id, 1).unwrap();
            assert_eq!(up.card.direct_reaction_count, 1);
            assert!(!up.clamped);

            let down = txn.increment_direct_count(card.id, -2).unwrap();
            assert_eq!(down.card.direct_reaction_count, 0);
            assert!(down.clamped);
        }

        #[test]
        fn test_recompute_aggregate_sums_children() {
            let storage = MemoryStorage::new();
            let board_id = BoardId::generate();
            let parent = make_card(board_id, "u1");
            let mut a = make_card(board_id, "u1");
            let mut b = make_card(board_id, "u2");
            a.parent_card_id = Some(parent.id);
            a.direct_reaction_count = 3;
            b.parent_card_id = Some(parent.id);
            b.direct_reaction_count = 4;

            let mut txn = storage.begin().unwrap();
            txn.put_card(&parent).unwrap();
            txn.put_card(&a).unwrap();
            txn.put_card(&b).unwrap();

            let parent = txn.recompute_aggregate(parent.id).unwrap();
            assert_eq!(parent.aggregated_reaction_count, 7);

            let orphaned = txn.orphan_children(parent.id).unwrap();
            assert_eq!(orphaned.len(), 2);
            let parent = txn.recompute_aggregate(parent.id).unwrap();
            assert_eq!(parent.aggregated_reaction_count, 0);
        }

        #[test]
        fn test_fail_point_injects_error() {
            let storage = MemoryStorage::new();
            storage.fail_at(FailPoint::DeleteCardsByBoard);

            let mut txn = storage.begin().unwrap();
            let err = txn.delete_cards_by_board(BoardId::generate()).unwrap_err();
            assert!(matches!(err, StorageError::Injected("delete_cards_by_board")));
            drop(txn);

            storage.clear_failure();
            let mut txn = storage.begin().unwrap();
            assert_eq!(txn.delete_cards_by_board(BoardId::generate()).unwrap(), 0);
        }
    }
}
