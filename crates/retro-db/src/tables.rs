use redb::TableDefinition;

use retro_core::{BoardId, CardId, UserHash};

/// Table for storing boards.
/// Key: board UUID as bytes
/// Value: serialized Board as bytes
pub const BOARDS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("boards");

/// Table for storing cards.
/// Key: card UUID as bytes
/// Value: serialized Card as bytes
pub const CARDS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("cards");

/// Table for storing reactions, one row per (card, user).
/// Key: card UUID bytes followed by the user hash
/// Value: serialized Reaction as bytes
pub const REACTIONS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("reactions");

/// Table for storing user sessions, one row per (board, user).
/// Key: board UUID bytes followed by the user hash
/// Value: serialized UserSession as bytes
pub const SESSIONS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sessions");

pub const ALL_TABLES: [TableDefinition<&[u8], &[u8]>; 4] =
    [BOARDS_TABLE, CARDS_TABLE, REACTIONS_TABLE, SESSIONS_TABLE];

pub fn board_key(id: BoardId) -> [u8; 16] {
    *id.0.as_bytes()
}

pub fn card_key(id: CardId) -> [u8; 16] {
    *id.0.as_bytes()
}

/// Encode a reaction key (card, user). All reactions on a card share the
/// card's 16-byte prefix.
pub fn reaction_key(card_id: CardId, user: &UserHash) -> Vec<u8> {
    compound_key(card_key(card_id), user)
}

/// Encode a session key (board, user).
pub fn session_key(board_id: BoardId, user: &UserHash) -> Vec<u8> {
    compound_key(board_key(board_id), user)
}

fn compound_key(prefix: [u8; 16], user: &UserHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + user.as_str().len());
    key.extend_from_slice(&prefix);
    key.extend_from_slice(user.as_str().as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_reaction_key_prefix() {
        let card = CardId(Uuid::new_v4());
        let key = reaction_key(card, &UserHash::new("abc"));
        assert_eq!(key.len(), 19);
        assert!(key.starts_with(&card_key(card)));
        assert!(key.ends_with(b"abc"));
    }

    #[test]
    fn test_keys_distinct_per_user() {
        let board = BoardId(Uuid::new_v4());
        assert_ne!(
            session_key(board, &UserHash::new("a")),
            session_key(board, &UserHash::new("b"))
        );
    }
}
