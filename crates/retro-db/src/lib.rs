//! Retro DB - redb implementation of the storage traits.

pub mod storage;
pub mod tables;

pub use storage::{RedbStorage, RedbTxn};

use std::path::Path;
use std::sync::Arc;

use redb::Database;
use tracing::info;

use retro_core::StorageError;

/// Open (or create) a database with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StorageError> {
    let path = path.as_ref();
    let db = Database::create(path).map_err(|e| StorageError::Database(e.to_string()))?;

    RedbStorage::init_tables(&db)?;

    info!(path = %path.display(), "Database ready");
    Ok(Arc::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_core::{Storage, StorageRead};
    use tempfile::tempdir;

    #[test]
    fn test_init_database() {
        let dir = tempdir().unwrap();
        let db = init_database(dir.path().join("test.redb")).unwrap();

        let storage = RedbStorage::new(db);
        assert!(storage.is_transactional());
        let reader = storage.read().unwrap();
        assert!(reader.get_board(retro_core::BoardId::generate()).unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let board = retro_core::Board::new(
            "Retro".to_string(),
            retro_core::board::default_columns(),
            retro_core::UserHash::new("admin"),
            None,
            None,
        );

        {
            let storage = RedbStorage::new(init_database(&path).unwrap());
            let mut txn = storage.begin().unwrap();
            txn.put_board(&board).unwrap();
            txn.commit().unwrap();
        }

        let storage = RedbStorage::new(init_database(&path).unwrap());
        let stored = storage.read().unwrap().get_board(board.id).unwrap();
        assert_eq!(stored.map(|b| b.name), Some("Retro".to_string()));
    }
}
