use serde::Serialize;

use crate::board::Board;
use crate::card::{public, Card, CardCounts, LinkType};
use crate::ids::{BoardId, CardId};

/// A change on a board, delivered to the notification sink after the
/// mutation has committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BoardEvent {
    CardCreated {
        #[serde(serialize_with = "public::card")]
        card: Card,
    },
    CardUpdated {
        #[serde(serialize_with = "public::card")]
        card: Card,
    },
    CardDeleted {
        board_id: BoardId,
        card_id: CardId,
        /// Cards whose parent or link set changed because of the delete.
        affected: Vec<CardId>,
        /// Counts of the former parent after its aggregate was recomputed.
        parent: Option<CardCounts>,
    },
    CardLinked {
        board_id: BoardId,
        source_id: CardId,
        target_id: CardId,
        link_type: LinkType,
        counts: Vec<CardCounts>,
    },
    CardUnlinked {
        board_id: BoardId,
        source_id: CardId,
        target_id: CardId,
        link_type: LinkType,
        counts: Vec<CardCounts>,
    },
    ReactionAdded {
        board_id: BoardId,
        card_id: CardId,
        counts: Vec<CardCounts>,
    },
    ReactionRemoved {
        board_id: BoardId,
        card_id: CardId,
        counts: Vec<CardCounts>,
    },
    BoardUpdated {
        board: Board,
    },
    BoardClosed {
        board: Board,
    },
    BoardDeleted {
        board_id: BoardId,
    },
    UserJoined {
        board_id: BoardId,
        alias: String,
        is_admin: bool,
    },
}

impl BoardEvent {
    pub fn board_id(&self) -> BoardId {
        match self {
            BoardEvent::CardCreated { card } | BoardEvent::CardUpdated { card } => card.board_id,
            BoardEvent::BoardUpdated { board } | BoardEvent::BoardClosed { board } => board.id,
            BoardEvent::CardDeleted { board_id, .. }
            | BoardEvent::CardLinked { board_id, .. }
            | BoardEvent::CardUnlinked { board_id, .. }
            | BoardEvent::ReactionAdded { board_id, .. }
            | BoardEvent::ReactionRemoved { board_id, .. }
            | BoardEvent::BoardDeleted { board_id }
            | BoardEvent::UserJoined { board_id, .. } => *board_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BoardEvent::CardCreated { .. } => "card_created",
            BoardEvent::CardUpdated { .. } => "card_updated",
            BoardEvent::CardDeleted { .. } => "card_deleted",
            BoardEvent::CardLinked { .. } => "card_linked",
            BoardEvent::CardUnlinked { .. } => "card_unlinked",
            BoardEvent::ReactionAdded { .. } => "reaction_added",
            BoardEvent::ReactionRemoved { .. } => "reaction_removed",
            BoardEvent::BoardUpdated { .. } => "board_updated",
            BoardEvent::BoardClosed { .. } => "board_closed",
            BoardEvent::BoardDeleted { .. } => "board_deleted",
            BoardEvent::UserJoined { .. } => "user_joined",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged() {
        let board_id = BoardId::generate();
        let event = BoardEvent::BoardDeleted { board_id };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "board_deleted");
        assert_eq!(json["data"]["board_id"], serde_json::json!(board_id.0));
        assert_eq!(event.kind(), "board_deleted");
        assert_eq!(event.board_id(), board_id);
    }

    #[test]
    fn test_card_event_hides_anonymous_creator() {
        use crate::card::CardType;
        use crate::ids::UserHash;

        let card = Card::new(
            BoardId::generate(),
            "went_well".to_string(),
            "content".to_string(),
            CardType::Feedback,
            true,
            UserHash::new("author"),
            Some("Ada".to_string()),
        );
        let json = serde_json::to_value(BoardEvent::CardCreated { card }).unwrap();
        assert_eq!(json["type"], "card_created");
        assert_eq!(json["data"]["card"]["is_anonymous"], true);
        assert!(json["data"]["card"].get("created_by_hash").is_none());
    }

    #[test]
    fn test_reaction_event_carries_counts() {
        let board_id = BoardId::generate();
        let card_id = CardId::generate();
        let event = BoardEvent::ReactionAdded {
            board_id,
            card_id,
            counts: vec![CardCounts {
                card_id,
                direct_reaction_count: 1,
                aggregated_reaction_count: 0,
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reaction_added");
        assert_eq!(json["data"]["counts"][0]["direct_reaction_count"], 1);
    }
}
