use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BoardId, CardId, UserHash};

pub const DEFAULT_REACTION_TYPE: &str = "thumbs_up";

/// A user's reaction to a card. Identity is `(card_id, user_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub card_id: CardId,
    pub board_id: BoardId,
    pub user_hash: UserHash,
    pub user_alias: Option<String>,
    pub reaction_type: String,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn new(
        card_id: CardId,
        board_id: BoardId,
        user_hash: UserHash,
        user_alias: Option<String>,
        reaction_type: Option<String>,
    ) -> Self {
        Self {
            card_id,
            board_id,
            user_hash,
            user_alias,
            reaction_type: reaction_type.unwrap_or_else(|| DEFAULT_REACTION_TYPE.to_string()),
            created_at: Utc::now(),
        }
    }
}
