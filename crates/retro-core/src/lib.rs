//! Retro Core - Domain models, storage traits and the card engine.
//!
//! This crate contains the domain logic for retrospective boards: the
//! relationship rules between cards, reaction aggregation, per-user quotas,
//! cascade deletion and the board lifecycle gate. It has no dependencies on
//! other Retro crates.

pub mod board;
pub mod card;
pub mod cascade;
pub mod engine;
pub mod error;
pub mod event;
pub mod gate;
pub mod identity;
pub mod ids;
pub mod notify;
pub mod quota;
pub mod reaction;
pub mod relationship;
pub mod service;
pub mod session;
pub mod storage;
pub mod validation;

// Re-exports for convenience
pub use board::{Board, BoardState, Column, NewBoard};
pub use card::{
    Card, CardCounts, CardPatch, CardType, CardView, LinkType, NewCard, Parentage, PublicCard,
};
pub use cascade::{CascadeCoordinator, CascadeMode, CascadeOps, CascadeReport};
pub use engine::{CardDeletion, CardEngine, LinkOutcome, ReactionOutcome};
pub use error::{CoreError, ErrorCode, LinkRejection, StorageError, ValidationError};
pub use event::BoardEvent;
pub use gate::LifecycleGate;
pub use identity::{IdentityResolver, Sha256Identity};
pub use ids::{BoardId, CardId, UserHash};
pub use notify::{NoopSink, NotificationSink};
pub use quota::{QuotaCheck, QuotaEvaluator};
pub use reaction::Reaction;
pub use relationship::{LinkEndpoint, RelationshipValidator};
pub use service::RetroService;
pub use session::{ActiveUser, UserSession};
pub use storage::{CountUpdate, Storage, StorageRead, StorageTxn};
pub use validation::Validator;

#[cfg(any(test, feature = "test-utils"))]
pub use notify::RecordingSink;
#[cfg(any(test, feature = "test-utils"))]
pub use storage::memory::{FailPoint, MemoryStorage};
