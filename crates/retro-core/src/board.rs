use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{BoardId, UserHash};

/// Lifecycle state of a board. Transitions only from `Active` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardState {
    Active,
    Closed,
}

/// A column cards are posted into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
}

impl Column {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Columns a board gets when it is created without any.
pub fn default_columns() -> Vec<Column> {
    vec![
        Column::new("went_well", "What went well"),
        Column::new("to_improve", "What to improve"),
        Column::new("action_items", "Action items"),
    ]
}

/// A retrospective board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub state: BoardState,
    pub columns: Vec<Column>,
    /// Admin identities. The first entry is the creator.
    pub admins: Vec<UserHash>,
    /// `None` means unlimited.
    pub card_limit_per_user: Option<NonZeroU32>,
    /// `None` means unlimited.
    pub reaction_limit_per_user: Option<NonZeroU32>,
    pub share_token: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Board {
    pub fn new(
        name: String,
        columns: Vec<Column>,
        creator: UserHash,
        card_limit_per_user: Option<NonZeroU32>,
        reaction_limit_per_user: Option<NonZeroU32>,
    ) -> Self {
        Self {
            id: BoardId::generate(),
            name,
            state: BoardState::Active,
            columns,
            admins: vec![creator],
            card_limit_per_user,
            reaction_limit_per_user,
            share_token: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == BoardState::Closed
    }

    pub fn is_admin(&self, user: &UserHash) -> bool {
        self.admins.contains(user)
    }

    /// The creator is always the first admin.
    pub fn creator(&self) -> Option<&UserHash> {
        self.admins.first()
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == column_id)
    }

    pub fn close(&mut self, at: DateTime<Utc>) {
        self.state = BoardState::Closed;
        self.closed_at = Some(at);
    }

    /// Add an admin. Returns false if the user already was one.
    pub fn add_admin(&mut self, user: UserHash) -> bool {
        if self.is_admin(&user) {
            return false;
        }
        self.admins.push(user);
        true
    }
}

/// Input for creating a board. Limits of `0` are rejected by validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBoard {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub card_limit_per_user: Option<u32>,
    #[serde(default)]
    pub reaction_limit_per_user: Option<u32>,
}
