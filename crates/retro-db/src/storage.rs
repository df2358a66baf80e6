use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use retro_core::{
    Board, BoardId, Card, CardId, Reaction, Storage, StorageError, StorageRead, StorageTxn,
    UserHash, UserSession,
};

use crate::tables::{
    board_key, card_key, reaction_key, session_key, ALL_TABLES, BOARDS_TABLE, CARDS_TABLE,
    REACTIONS_TABLE, SESSIONS_TABLE,
};

type Table = TableDefinition<'static, &'static [u8], &'static [u8]>;

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

/// redb implementation of [`Storage`].
///
/// redb runs one write transaction at a time, so every engine operation is
/// serialized against other writers. Reads see a consistent snapshot.
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        for table in ALL_TABLES {
            let _ = write_txn.open_table(table).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

impl Storage for RedbStorage {
    fn read(&self) -> Result<Box<dyn StorageRead + '_>, StorageError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        Ok(Box::new(RedbTxn {
            kind: TxnKind::Read(txn),
        }))
    }

    fn begin(&self) -> Result<Box<dyn StorageTxn + '_>, StorageError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        Ok(Box::new(RedbTxn {
            kind: TxnKind::Write(txn),
        }))
    }
}

enum TxnKind {
    Read(ReadTransaction),
    Write(WriteTransaction),
}

/// A read snapshot or a write transaction. Dropping a write transaction
/// without committing aborts it.
pub struct RedbTxn {
    kind: TxnKind,
}

impl RedbTxn {
    fn get<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> Result<Option<T>, StorageError> {
        match &self.kind {
            TxnKind::Read(txn) => get_row(&txn.open_table(table).map_err(db_err)?, key),
            TxnKind::Write(txn) => get_row(&txn.open_table(table).map_err(db_err)?, key),
        }
    }

    /// All rows whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, table: Table, prefix: &[u8]) -> Result<Vec<T>, StorageError> {
        match &self.kind {
            TxnKind::Read(txn) => scan_rows(&txn.open_table(table).map_err(db_err)?, prefix),
            TxnKind::Write(txn) => scan_rows(&txn.open_table(table).map_err(db_err)?, prefix),
        }
    }

    fn writer(&self) -> Result<&WriteTransaction, StorageError> {
        match &self.kind {
            TxnKind::Write(txn) => Ok(txn),
            TxnKind::Read(_) => Err(StorageError::Database(
                "write attempted in a read transaction".to_string(),
            )),
        }
    }

    fn put<T: Serialize>(&self, table: Table, key: &[u8], row: &T) -> Result<(), StorageError> {
        let mut table = self.writer()?.open_table(table).map_err(db_err)?;
        let value = serde_json::to_vec(row).map_err(db_err)?;
        table.insert(key, value.as_slice()).map_err(db_err)?;
        Ok(())
    }

    fn remove(&self, table: Table, key: &[u8]) -> Result<bool, StorageError> {
        let mut table = self.writer()?.open_table(table).map_err(db_err)?;
        let removed = table.remove(key).map_err(db_err)?.is_some();
        Ok(removed)
    }

    /// Remove every row matching `pred`. Returns the number removed.
    fn remove_where<T: DeserializeOwned>(
        &self,
        table: Table,
        pred: impl Fn(&T) -> bool,
    ) -> Result<u64, StorageError> {
        let mut table = self.writer()?.open_table(table).map_err(db_err)?;

        let mut doomed = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (key, value) = entry.map_err(db_err)?;
            let row: T = serde_json::from_slice(value.value()).map_err(db_err)?;
            if pred(&row) {
                doomed.push(key.value().to_vec());
            }
        }

        for key in &doomed {
            table.remove(key.as_slice()).map_err(db_err)?;
        }
        Ok(doomed.len() as u64)
    }
}

fn get_row<T, R>(table: &R, key: &[u8]) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    match table.get(key).map_err(db_err)? {
        Some(value) => {
            let row: T = serde_json::from_slice(value.value()).map_err(db_err)?;
            Ok(Some(row))
        }
        None => Ok(None),
    }
}

fn scan_rows<T, R>(table: &R, prefix: &[u8]) -> Result<Vec<T>, StorageError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.range(prefix..).map_err(db_err)? {
        let (key, value) = entry.map_err(db_err)?;
        if !key.value().starts_with(prefix) {
            break;
        }
        let row: T = serde_json::from_slice(value.value()).map_err(db_err)?;
        rows.push(row);
    }
    Ok(rows)
}

impl StorageRead for RedbTxn {
    fn get_board(&self, id: BoardId) -> Result<Option<Board>, StorageError> {
        self.get(BOARDS_TABLE, &board_key(id))
    }

    fn find_board_by_share_token(&self, token: &str) -> Result<Option<Board>, StorageError> {
        let boards: Vec<Board> = self.scan(BOARDS_TABLE, &[])?;
        Ok(boards.into_iter().find(|b| b.share_token == token))
    }

    fn get_card(&self, id: CardId) -> Result<Option<Card>, StorageError> {
        self.get(CARDS_TABLE, &card_key(id))
    }

    fn cards_by_board(&self, board_id: BoardId) -> Result<Vec<Card>, StorageError> {
        let cards: Vec<Card> = self.scan(CARDS_TABLE, &[])?;
        Ok(cards.into_iter().filter(|c| c.board_id == board_id).collect())
    }

    fn children_of(&self, parent_id: CardId) -> Result<Vec<Card>, StorageError> {
        let cards: Vec<Card> = self.scan(CARDS_TABLE, &[])?;
        Ok(cards
            .into_iter()
            .filter(|c| c.parent_card_id == Some(parent_id))
            .collect())
    }

    fn get_reaction(
        &self,
        card_id: CardId,
        user: &UserHash,
    ) -> Result<Option<Reaction>, StorageError> {
        self.get(REACTIONS_TABLE, &reaction_key(card_id, user))
    }

    fn reactions_by_card(&self, card_id: CardId) -> Result<Vec<Reaction>, StorageError> {
        self.scan(REACTIONS_TABLE, &card_key(card_id))
    }

    fn reactions_by_board(&self, board_id: BoardId) -> Result<Vec<Reaction>, StorageError> {
        let reactions: Vec<Reaction> = self.scan(REACTIONS_TABLE, &[])?;
        Ok(reactions
            .into_iter()
            .filter(|r| r.board_id == board_id)
            .collect())
    }

    fn get_session(
        &self,
        board_id: BoardId,
        user: &UserHash,
    ) -> Result<Option<UserSession>, StorageError> {
        self.get(SESSIONS_TABLE, &session_key(board_id, user))
    }

    fn sessions_by_board(&self, board_id: BoardId) -> Result<Vec<UserSession>, StorageError> {
        self.scan(SESSIONS_TABLE, &board_key(board_id))
    }
}

impl StorageTxn for RedbTxn {
    fn put_board(&mut self, board: &Board) -> Result<(), StorageError> {
        self.put(BOARDS_TABLE, &board_key(board.id), board)
    }

    fn delete_board(&mut self, id: BoardId) -> Result<bool, StorageError> {
        self.remove(BOARDS_TABLE, &board_key(id))
    }

    fn put_card(&mut self, card: &Card) -> Result<(), StorageError> {
        self.put(CARDS_TABLE, &card_key(card.id), card)
    }

    fn delete_card(&mut self, id: CardId) -> Result<bool, StorageError> {
        self.remove(CARDS_TABLE, &card_key(id))
    }

    fn delete_cards_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
        self.remove_where(CARDS_TABLE, |c: &Card| c.board_id == board_id)
    }

    fn insert_reaction(&mut self, reaction: &Reaction) -> Result<bool, StorageError> {
        let key = reaction_key(reaction.card_id, &reaction.user_hash);
        if self.get::<Reaction>(REACTIONS_TABLE, &key)?.is_some() {
            return Ok(false);
        }
        self.put(REACTIONS_TABLE, &key, reaction)?;
        Ok(true)
    }

    fn delete_reaction(
        &mut self,
        card_id: CardId,
        user: &UserHash,
    ) -> Result<bool, StorageError> {
        self.remove(REACTIONS_TABLE, &reaction_key(card_id, user))
    }

    fn delete_reactions_by_cards(&mut self, card_ids: &[CardId]) -> Result<u64, StorageError> {
        self.remove_where(REACTIONS_TABLE, |r: &Reaction| card_ids.contains(&r.card_id))
    }

    fn put_session(&mut self, session: &UserSession) -> Result<(), StorageError> {
        self.put(
            SESSIONS_TABLE,
            &session_key(session.board_id, &session.user_hash),
            session,
        )
    }

    fn delete_sessions_by_board(&mut self, board_id: BoardId) -> Result<u64, StorageError> {
        self.remove_where(SESSIONS_TABLE, |s: &UserSession| s.board_id == board_id)
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        match self.kind {
            TxnKind::Write(txn) => txn.commit().map_err(db_err),
            TxnKind::Read(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_core::board::default_columns;
    use retro_core::{CardType, LinkType, NewBoard, NewCard, NoopSink, RetroService};
    use tempfile::{tempdir, TempDir};

    fn create_test_storage() -> (TempDir, Arc<RedbStorage>) {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.redb")).unwrap();
        RedbStorage::init_tables(&db).unwrap();
        (dir, Arc::new(RedbStorage::new(Arc::new(db))))
    }

    fn make_board() -> Board {
        Board::new(
            "Retro".to_string(),
            default_columns(),
            UserHash::new("admin"),
            None,
            None,
        )
    }

    fn make_card(board_id: BoardId) -> Card {
        Card::new(
            board_id,
            "went_well".to_string(),
            "content".to_string(),
            CardType::Feedback,
            false,
            UserHash::new("admin"),
            Some("Admin".to_string()),
        )
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, storage) = create_test_storage();
        let board = make_board();
        let card = make_card(board.id);

        let mut txn = storage.begin().unwrap();
        txn.put_board(&board).unwrap();
        txn.put_card(&card).unwrap();
        // visible inside the transaction before commit
        assert!(txn.get_card(card.id).unwrap().is_some());
        txn.commit().unwrap();

        let reader = storage.read().unwrap();
        assert_eq!(reader.get_board(board.id).unwrap(), Some(board.clone()));
        assert_eq!(reader.get_card(card.id).unwrap(), Some(card));
        assert_eq!(
            reader
                .find_board_by_share_token(&board.share_token)
                .unwrap()
                .map(|b| b.id),
            Some(board.id)
        );
    }

    #[test]
    fn test_dropped_transaction_aborts() {
        let (_dir, storage) = create_test_storage();
        let card = make_card(BoardId::generate());

        {
            let mut txn = storage.begin().unwrap();
            txn.put_card(&card).unwrap();
        }
        assert!(storage.read().unwrap().get_card(card.id).unwrap().is_none());
    }

    #[test]
    fn test_reactions_keyed_by_card_and_user() {
        let (_dir, storage) = create_test_storage();
        let board = make_board();
        let a = make_card(board.id);
        let b = make_card(board.id);
        let user = UserHash::new("u1");

        let mut txn = storage.begin().unwrap();
        let first = Reaction::new(a.id, board.id, user.clone(), None, None);
        assert!(txn.insert_reaction(&first).unwrap());
        assert!(!txn.insert_reaction(&first).unwrap());
        txn.insert_reaction(&Reaction::new(b.id, board.id, user.clone(), None, None))
            .unwrap();
        txn.insert_reaction(&Reaction::new(a.id, board.id, UserHash::new("u2"), None, None))
            .unwrap();
        txn.commit().unwrap();

        let reader = storage.read().unwrap();
        assert_eq!(reader.reactions_by_card(a.id).unwrap().len(), 2);
        assert_eq!(reader.reactions_by_card(b.id).unwrap().len(), 1);
        assert_eq!(reader.count_reactions(board.id, &user).unwrap(), 2);
        drop(reader);

        let mut txn = storage.begin().unwrap();
        assert_eq!(txn.delete_reactions_by_cards(&[a.id]).unwrap(), 2);
        assert!(txn.delete_reaction(b.id, &user).unwrap());
        assert!(!txn.delete_reaction(b.id, &user).unwrap());
        txn.commit().unwrap();

        assert!(storage
            .read()
            .unwrap()
            .reactions_by_board(board.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sessions_replace_per_user() {
        let (_dir, storage) = create_test_storage();
        let board = make_board();
        let user = UserHash::new("u1");

        let mut txn = storage.begin().unwrap();
        txn.put_session(&UserSession::new(board.id, user.clone(), "One".to_string(), false))
            .unwrap();
        txn.put_session(&UserSession::new(board.id, user.clone(), "Two".to_string(), false))
            .unwrap();
        txn.put_session(&UserSession::new(
            BoardId::generate(),
            user.clone(),
            "Elsewhere".to_string(),
            false,
        ))
        .unwrap();
        txn.commit().unwrap();

        let sessions = storage.read().unwrap().sessions_by_board(board.id).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].alias, "Two");
    }

    #[test]
    fn test_atomic_field_operations() {
        let (_dir, storage) = create_test_storage();
        let board = make_board();
        let parent = make_card(board.id);
        let mut child = make_card(board.id);
        child.direct_reaction_count = 3;

        let mut txn = storage.begin().unwrap();
        txn.put_card(&parent).unwrap();
        txn.put_card(&child).unwrap();
        txn.set_parent(child.id, Some(parent.id)).unwrap();
        let parent_after = txn.recompute_aggregate(parent.id).unwrap();
        assert_eq!(parent_after.aggregated_reaction_count, 3);

        let update = txn.increment_aggregated_count(parent.id, -5).unwrap();
        assert!(update.clamped);
        assert_eq!(update.card.aggregated_reaction_count, 0);
        txn.commit().unwrap();

        let children = storage.read().unwrap().children_of(parent.id).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
    }

    #[test]
    fn test_service_on_redb() {
        let (_dir, storage) = create_test_storage();
        let service = RetroService::new(storage.clone(), Arc::new(NoopSink));
        let admin = UserHash::new("admin");

        let (board, _) = service
            .create_board(
                &admin,
                "Admin",
                NewBoard {
                    name: "Retro".to_string(),
                    ..NewBoard::default()
                },
            )
            .unwrap();
        let new_card = || NewCard {
            column_id: "went_well".to_string(),
            content: "content".to_string(),
            card_type: CardType::Feedback,
            is_anonymous: false,
        };
        let parent = service.create_card(&admin, board.id, new_card()).unwrap();
        let child = service.create_card(&admin, board.id, new_card()).unwrap();
        service
            .link(&admin, parent.id, child.id, LinkType::ParentOf)
            .unwrap();
        service.add_reaction(&admin, child.id, None).unwrap();

        let view = service.get_card(parent.id).unwrap();
        assert_eq!(view.card.aggregated_reaction_count, 1);
        assert_eq!(view.children.len(), 1);

        let report = service.delete_board(&admin, board.id).unwrap();
        assert_eq!(report.cards_deleted, 2);
        assert_eq!(report.reactions_deleted, 1);
        assert_eq!(report.sessions_deleted, 1);
        assert_eq!(report.mode, retro_core::CascadeMode::Transactional);
    }
}
