use serde::Serialize;
use thiserror::Error;

use crate::ids::{BoardId, CardId};

/// Machine-readable reason codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BoardClosed,
    BoardNotFound,
    CardNotFound,
    ColumnNotFound,
    Forbidden,
    ChildCannotBeParent,
    ParentCannotBeChild,
    CardLimitReached,
    ReactionLimitReached,
    InvalidLink,
    ValidationError,
    StorageError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BoardClosed => "BOARD_CLOSED",
            ErrorCode::BoardNotFound => "BOARD_NOT_FOUND",
            ErrorCode::CardNotFound => "CARD_NOT_FOUND",
            ErrorCode::ColumnNotFound => "COLUMN_NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::ChildCannotBeParent => "CHILD_CANNOT_BE_PARENT",
            ErrorCode::ParentCannotBeChild => "PARENT_CANNOT_BE_CHILD",
            ErrorCode::CardLimitReached => "CARD_LIMIT_REACHED",
            ErrorCode::ReactionLimitReached => "REACTION_LIMIT_REACHED",
            ErrorCode::InvalidLink => "INVALID_LINK",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Board is closed: {0}")]
    BoardClosed(BoardId),

    #[error("Board not found: {0}")]
    BoardNotFound(BoardId),

    #[error("No board is shared under this token")]
    UnknownShareToken,

    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Link rejected: {0}")]
    Link(#[from] LinkRejection),

    #[error("Card limit reached: {current} of {limit}")]
    CardLimitReached { current: u64, limit: u32 },

    #[error("Reaction limit reached: {current} of {limit}")]
    ReactionLimitReached { current: u64, limit: u32 },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::BoardClosed(_) => ErrorCode::BoardClosed,
            CoreError::BoardNotFound(_) | CoreError::UnknownShareToken => ErrorCode::BoardNotFound,
            CoreError::CardNotFound(_) => ErrorCode::CardNotFound,
            CoreError::ColumnNotFound(_) => ErrorCode::ColumnNotFound,
            CoreError::Forbidden(_) => ErrorCode::Forbidden,
            CoreError::Link(rejection) => rejection.code(),
            CoreError::CardLimitReached { .. } => ErrorCode::CardLimitReached,
            CoreError::ReactionLimitReached { .. } => ErrorCode::ReactionLimitReached,
            CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::Storage(StorageError::CardNotFound(_)) => ErrorCode::CardNotFound,
            CoreError::Storage(_) => ErrorCode::StorageError,
        }
    }
}

/// Why a proposed link or unlink between two cards is illegal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRejection {
    #[error("a card cannot be linked to itself")]
    SelfLink,

    #[error("cards belong to different boards")]
    CrossBoard,

    #[error("the proposed child already has children")]
    ChildCannotBeParent,

    #[error("the proposed parent is already a child")]
    ParentCannotBeChild,

    #[error("parent/child links require two feedback cards")]
    NotFeedback,

    #[error("linked_to requires one action card and one feedback card")]
    WrongCardTypes,

    #[error("cards are not linked")]
    NotLinked,
}

impl LinkRejection {
    pub fn code(&self) -> ErrorCode {
        match self {
            LinkRejection::ChildCannotBeParent => ErrorCode::ChildCannotBeParent,
            LinkRejection::ParentCannotBeChild => ErrorCode::ParentCannotBeChild,
            _ => ErrorCode::InvalidLink,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Content cannot be empty")]
    EmptyContent,

    #[error("Content too long: {0} characters (max 5000)")]
    ContentTooLong(usize),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid alias: {0}")]
    InvalidAlias(String),

    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    #[error("Invalid limit for {0}: must be a positive integer or omitted")]
    InvalidLimit(&'static str),

    #[error("User has not joined the board")]
    NotJoined,

    #[error("Nothing to update")]
    EmptyPatch,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Injected failure at {0}")]
    Injected(&'static str),
}
