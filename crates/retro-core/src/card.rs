use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::ids::{BoardId, CardId, UserHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Feedback,
    Action,
}

/// Kind of relationship between two cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// One-level parent/child grouping of feedback cards.
    ParentOf,
    /// Many-to-many association between an action card and feedback cards.
    LinkedTo,
}

/// Position of a card in the one-level hierarchy.
///
/// Not stored: derived from `parent_card_id` and whether any card points at
/// this one as its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parentage {
    Standalone,
    Parent,
    Child,
}

/// A card posted on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub board_id: BoardId,
    pub column_id: String,
    pub content: String,
    pub card_type: CardType,
    pub is_anonymous: bool,
    pub created_by_hash: UserHash,
    /// Display alias; always `None` for anonymous cards.
    pub created_by_alias: Option<String>,
    pub parent_card_id: Option<CardId>,
    pub linked_feedback_ids: BTreeSet<CardId>,
    /// Reactions placed on this card itself.
    pub direct_reaction_count: u32,
    /// Sum of the direct counts of this card's children, excluding its own.
    pub aggregated_reaction_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(
        board_id: BoardId,
        column_id: String,
        content: String,
        card_type: CardType,
        is_anonymous: bool,
        created_by_hash: UserHash,
        alias: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CardId::generate(),
            board_id,
            column_id,
            content,
            card_type,
            is_anonymous,
            created_by_hash,
            created_by_alias: if is_anonymous { None } else { alias },
            parent_card_id: None,
            linked_feedback_ids: BTreeSet::new(),
            direct_reaction_count: 0,
            aggregated_reaction_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn parentage(&self, child_count: usize) -> Parentage {
        if self.parent_card_id.is_some() {
            Parentage::Child
        } else if child_count > 0 {
            Parentage::Parent
        } else {
            Parentage::Standalone
        }
    }

    pub fn is_created_by(&self, user: &UserHash) -> bool {
        &self.created_by_hash == user
    }

    pub fn counts(&self) -> CardCounts {
        CardCounts {
            card_id: self.id,
            direct_reaction_count: self.direct_reaction_count,
            aggregated_reaction_count: self.aggregated_reaction_count,
        }
    }
}

/// Reaction counters of one card, carried in change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCounts {
    pub card_id: CardId,
    pub direct_reaction_count: u32,
    pub aggregated_reaction_count: u32,
}

/// Input for creating a card.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCard {
    pub column_id: String,
    pub content: String,
    pub card_type: CardType,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Partial update of a card's editable fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardPatch {
    pub content: Option<String>,
    pub column_id: Option<String>,
    pub is_anonymous: Option<bool>,
}

impl CardPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.column_id.is_none() && self.is_anonymous.is_none()
    }
}

/// A card as shown to participants.
///
/// `Card`'s own serialization is the stored row and always carries the
/// creator hash. Anything leaving the core goes through this view, which
/// omits the hash on anonymous cards so they cannot be matched against the
/// author's named ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicCard<'a> {
    pub id: CardId,
    pub board_id: BoardId,
    pub column_id: &'a str,
    pub content: &'a str,
    pub card_type: CardType,
    pub is_anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_hash: Option<&'a UserHash>,
    pub created_by_alias: Option<&'a str>,
    pub parent_card_id: Option<CardId>,
    pub linked_feedback_ids: &'a BTreeSet<CardId>,
    pub direct_reaction_count: u32,
    pub aggregated_reaction_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Card> for PublicCard<'a> {
    fn from(card: &'a Card) -> Self {
        Self {
            id: card.id,
            board_id: card.board_id,
            column_id: &card.column_id,
            content: &card.content,
            card_type: card.card_type,
            is_anonymous: card.is_anonymous,
            created_by_hash: (!card.is_anonymous).then_some(&card.created_by_hash),
            created_by_alias: card.created_by_alias.as_deref(),
            parent_card_id: card.parent_card_id,
            linked_feedback_ids: &card.linked_feedback_ids,
            direct_reaction_count: card.direct_reaction_count,
            aggregated_reaction_count: card.aggregated_reaction_count,
            created_at: card.created_at,
            updated_at: card.updated_at,
        }
    }
}

/// `serialize_with` helpers for payload fields holding cards.
pub mod public {
    use serde::{Serialize, Serializer};

    use super::{Card, PublicCard};

    pub fn card<S: Serializer>(card: &Card, serializer: S) -> Result<S::Ok, S::Error> {
        PublicCard::from(card).serialize(serializer)
    }

    pub fn option<S: Serializer>(card: &Option<Card>, serializer: S) -> Result<S::Ok, S::Error> {
        card.as_ref().map(PublicCard::from).serialize(serializer)
    }
}

/// A card together with its children, as returned by reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub card: Card,
    pub parentage: Parentage,
    pub children: Vec<Card>,
}

impl CardView {
    pub fn new(card: Card, mut children: Vec<Card>) -> Self {
        children.sort_by_key(|c| c.created_at);
        Self {
            parentage: card.parentage(children.len()),
            card,
            children,
        }
    }
}

#[derive(Serialize)]
struct CardViewJson<'a> {
    #[serde(flatten)]
    card: PublicCard<'a>,
    parentage: Parentage,
    children: Vec<PublicCard<'a>>,
}

impl Serialize for CardView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CardViewJson {
            card: PublicCard::from(&self.card),
            parentage: self.parentage,
            children: self.children.iter().map(PublicCard::from).collect(),
        }
        .serialize(serializer)
    }
}
