use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use super::RetroService;
use crate::card::{Card, CardType, CardPatch, CardView, LinkType, NewCard};
use crate::engine::{CardDeletion, LinkOutcome, ReactionOutcome};
use crate::error::{CoreError, ValidationError};
use crate::event::BoardEvent;
use crate::gate::LifecycleGate;
use crate::ids::{BoardId, CardId, UserHash};
use crate::notify::NotificationSink;
use crate::quota::QuotaCheck;
use crate::session::UserSession;
use crate::storage::Storage;
use crate::validation::Validator;

impl<S: Storage, N: NotificationSink> RetroService<S, N> {
    /// Post a card. Feedback cards count against the per-user card limit.
    pub fn create_card(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        new_card: NewCard,
    ) -> Result<Card, CoreError> {
        Validator::validate_content(&new_card.content)?;
        let session = self.check_card_target(caller, board_id, &new_card.column_id)?;

        if new_card.card_type == CardType::Feedback {
            self.quota
                .ensure_can_create_card(board_id, caller, new_card.card_type)?;
        }

        let card = Card::new(
            board_id,
            new_card.column_id,
            new_card.content,
            new_card.card_type,
            new_card.is_anonymous,
            caller.clone(),
            Some(session.alias),
        );

        let mut txn = self.storage.begin()?;
        LifecycleGate::load_active_board(&*txn, board_id)?;
        txn.put_card(&card)?;
        txn.commit()?;

        debug!(card = %card.id, board = %board_id, card_type = ?card.card_type, "Card created");
        self.sink.notify(BoardEvent::CardCreated { card: card.clone() });
        Ok(card)
    }

    /// A card with its children.
    pub fn get_card(&self, card_id: CardId) -> Result<CardView, CoreError> {
        let reader = self.storage.read()?;
        let card = LifecycleGate::load_card(&*reader, card_id)?;
        let children = reader.children_of(card_id)?;
        Ok(CardView::new(card, children))
    }

    /// Top-level cards of a board with their children nested, oldest first.
    pub fn list_cards(&self, board_id: BoardId) -> Result<Vec<CardView>, CoreError> {
        let reader = self.storage.read()?;
        LifecycleGate::load_board(&*reader, board_id)?;

        let mut top_level = Vec::new();
        let mut children: HashMap<CardId, Vec<Card>> = HashMap::new();
        for card in reader.cards_by_board(board_id)? {
            match card.parent_card_id {
                Some(parent_id) => children.entry(parent_id).or_default().push(card),
                None => top_level.push(card),
            }
        }

        let mut views: Vec<CardView> = top_level
            .into_iter()
            .map(|card| {
                let kids = children.remove(&card.id).unwrap_or_default();
                CardView::new(card, kids)
            })
            .collect();
        views.sort_by_key(|v| v.card.created_at);
        Ok(views)
    }

    /// Edit a card's content, column or anonymity. Only its creator may.
    pub fn update_card(
        &self,
        caller: &UserHash,
        card_id: CardId,
        patch: CardPatch,
    ) -> Result<Card, CoreError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        if let Some(content) = &patch.content {
            Validator::validate_content(content)?;
        }

        let mut txn = self.storage.begin()?;
        let mut card = LifecycleGate::load_card(&*txn, card_id)?;
        let board = LifecycleGate::load_active_board(&*txn, card.board_id)?;
        let session = LifecycleGate::ensure_member(&*txn, board.id, caller)?;
        LifecycleGate::ensure_card_owner(&card, caller)?;

        if let Some(column_id) = patch.column_id {
            if board.column(&column_id).is_none() {
                return Err(CoreError::ColumnNotFound(column_id));
            }
            card.column_id = column_id;
        }
        if let Some(content) = patch.content {
            card.content = content;
        }
        if let Some(is_anonymous) = patch.is_anonymous {
            card.is_anonymous = is_anonymous;
            card.created_by_alias = if is_anonymous {
                None
            } else {
                Some(session.alias)
            };
        }
        card.updated_at = Utc::now();
        txn.put_card(&card)?;
        txn.commit()?;

        debug!(card = %card_id, "Card updated");
        self.sink.notify(BoardEvent::CardUpdated { card: card.clone() });
        Ok(card)
    }

    /// Delete a card. Its creator or a board admin may.
    pub fn delete_card(&self, caller: &UserHash, card_id: CardId) -> Result<CardDeletion, CoreError> {
        {
            let reader = self.storage.read()?;
            let card = LifecycleGate::load_card(&*reader, card_id)?;
            let board = LifecycleGate::load_active_board(&*reader, card.board_id)?;
            LifecycleGate::ensure_member(&*reader, board.id, caller)?;
            LifecycleGate::ensure_owner_or_admin(&board, &card, caller)?;
        }
        self.engine.delete_card(card_id)
    }

    pub fn link(
        &self,
        caller: &UserHash,
        source_id: CardId,
        target_id: CardId,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CoreError> {
        self.check_card_mutation(caller, source_id)?;
        self.engine.link(source_id, target_id, link_type)
    }

    pub fn unlink(
        &self,
        caller: &UserHash,
        source_id: CardId,
        target_id: CardId,
        link_type: LinkType,
    ) -> Result<LinkOutcome, CoreError> {
        self.check_card_mutation(caller, source_id)?;
        self.engine.unlink(source_id, target_id, link_type)
    }

    /// React to a card. Counts against the per-user reaction limit unless the
    /// caller already reacted to it.
    pub fn add_reaction(
        &self,
        caller: &UserHash,
        card_id: CardId,
        reaction_type: Option<String>,
    ) -> Result<ReactionOutcome, CoreError> {
        let (card, session) = self.check_card_mutation(caller, card_id)?;
        self.quota.ensure_can_react(card.board_id, card_id, caller)?;
        self.engine
            .add_reaction(card_id, caller, Some(session.alias), reaction_type)
    }

    pub fn remove_reaction(
        &self,
        caller: &UserHash,
        card_id: CardId,
    ) -> Result<ReactionOutcome, CoreError> {
        self.check_card_mutation(caller, card_id)?;
        self.engine.remove_reaction(card_id, caller)
    }

    pub fn can_create_card(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        card_type: CardType,
    ) -> Result<QuotaCheck, CoreError> {
        self.quota.can_create_card(board_id, caller, card_type)
    }

    pub fn can_add_reaction(
        &self,
        caller: &UserHash,
        board_id: BoardId,
    ) -> Result<QuotaCheck, CoreError> {
        self.quota.can_add_reaction(board_id, caller)
    }

    /// Gate checks for a new card: active board, membership, known column.
    fn check_card_target(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        column_id: &str,
    ) -> Result<UserSession, CoreError> {
        let reader = self.storage.read()?;
        let board = LifecycleGate::load_active_board(&*reader, board_id)?;
        let session = LifecycleGate::ensure_member(&*reader, board_id, caller)?;
        if board.column(column_id).is_none() {
            return Err(CoreError::ColumnNotFound(column_id.to_string()));
        }
        Ok(session)
    }

    /// Gate checks before handing a card mutation to the engine.
    fn check_card_mutation(
        &self,
        caller: &UserHash,
        card_id: CardId,
    ) -> Result<(Card, UserSession), CoreError> {
        let reader = self.storage.read()?;
        let card = LifecycleGate::load_card(&*reader, card_id)?;
        LifecycleGate::load_active_board(&*reader, card.board_id)?;
        let session = LifecycleGate::ensure_member(&*reader, card.board_id, caller)?;
        Ok((card, session))
    }
}
