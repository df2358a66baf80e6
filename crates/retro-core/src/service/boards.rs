use chrono::Utc;
use tracing::info;

use super::RetroService;
use crate::board::{default_columns, Board, NewBoard};
use crate::cascade::CascadeReport;
use crate::error::{CoreError, ValidationError};
use crate::event::BoardEvent;
use crate::gate::LifecycleGate;
use crate::ids::{BoardId, UserHash};
use crate::notify::NotificationSink;
use crate::session::{ActiveUser, UserSession};
use crate::storage::Storage;
use crate::validation::Validator;

impl<S: Storage, N: NotificationSink> RetroService<S, N> {
    /// Create a board. The caller becomes its first admin and joins it.
    pub fn create_board(
        &self,
        caller: &UserHash,
        alias: &str,
        new_board: NewBoard,
    ) -> Result<(Board, UserSession), CoreError> {
        let name = Validator::validate_name(&new_board.name)?;
        let alias = Validator::validate_alias(alias)?;
        let columns = if new_board.columns.is_empty() {
            default_columns()
        } else {
            Validator::validate_columns(&new_board.columns)?
        };
        let card_limit = Validator::validate_limit("card_limit_per_user", new_board.card_limit_per_user)?;
        let reaction_limit =
            Validator::validate_limit("reaction_limit_per_user", new_board.reaction_limit_per_user)?;

        let board = Board::new(name, columns, caller.clone(), card_limit, reaction_limit);
        let session = UserSession::new(board.id, caller.clone(), alias, true);

        let mut txn = self.storage.begin()?;
        txn.put_board(&board)?;
        txn.put_session(&session)?;
        txn.commit()?;

        info!(board = %board.id, name = %board.name, "Board created");
        Ok((board, session))
    }

    pub fn get_board(&self, board_id: BoardId) -> Result<Board, CoreError> {
        let reader = self.storage.read()?;
        LifecycleGate::load_board(&*reader, board_id)
    }

    pub fn get_board_by_share_token(&self, token: &str) -> Result<Board, CoreError> {
        self.storage
            .read()?
            .find_board_by_share_token(token)?
            .ok_or(CoreError::UnknownShareToken)
    }

    pub fn rename_board(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        name: &str,
    ) -> Result<Board, CoreError> {
        let name = Validator::validate_name(name)?;

        let mut txn = self.storage.begin()?;
        let mut board = LifecycleGate::load_active_board(&*txn, board_id)?;
        LifecycleGate::ensure_admin(&board, caller)?;
        board.name = name;
        txn.put_board(&board)?;
        txn.commit()?;

        self.sink.notify(BoardEvent::BoardUpdated {
            board: board.clone(),
        });
        Ok(board)
    }

    /// Close a board. Closed boards reject every card and reaction mutation.
    pub fn close_board(&self, caller: &UserHash, board_id: BoardId) -> Result<Board, CoreError> {
        let mut txn = self.storage.begin()?;
        let mut board = LifecycleGate::load_active_board(&*txn, board_id)?;
        LifecycleGate::ensure_admin(&board, caller)?;
        board.close(Utc::now());
        txn.put_board(&board)?;
        txn.commit()?;

        info!(board = %board_id, "Board closed");
        self.sink.notify(BoardEvent::BoardClosed {
            board: board.clone(),
        });
        Ok(board)
    }

    /// Delete a board with its cards, reactions and sessions.
    pub fn delete_board(
        &self,
        caller: &UserHash,
        board_id: BoardId,
    ) -> Result<CascadeReport, CoreError> {
        {
            let reader = self.storage.read()?;
            let board = LifecycleGate::load_board(&*reader, board_id)?;
            LifecycleGate::ensure_admin(&board, caller)?;
        }

        let report = self.cascade.delete_board(board_id)?;

        info!(
            board = %board_id,
            cards = report.cards_deleted,
            reactions = report.reactions_deleted,
            sessions = report.sessions_deleted,
            mode = ?report.mode,
            "Board deleted"
        );
        self.sink.notify(BoardEvent::BoardDeleted { board_id });
        Ok(report)
    }

    /// Join a board, or rejoin it under a new alias. A user has at most one
    /// session per board; rejoining keeps the admin flag and join time.
    pub fn join_board(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        alias: &str,
    ) -> Result<UserSession, CoreError> {
        let alias = Validator::validate_alias(alias)?;

        let mut txn = self.storage.begin()?;
        let board = LifecycleGate::load_board(&*txn, board_id)?;
        let session = match txn.get_session(board_id, caller)? {
            Some(mut existing) => {
                existing.alias = alias;
                existing.last_active_at = Utc::now();
                existing
            }
            None => UserSession::new(board_id, caller.clone(), alias, board.is_admin(caller)),
        };
        txn.put_session(&session)?;
        txn.commit()?;

        self.sink.notify(BoardEvent::UserJoined {
            board_id,
            alias: session.alias.clone(),
            is_admin: session.is_admin,
        });
        Ok(session)
    }

    pub fn update_alias(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        alias: &str,
    ) -> Result<UserSession, CoreError> {
        let alias = Validator::validate_alias(alias)?;

        let mut txn = self.storage.begin()?;
        LifecycleGate::load_board(&*txn, board_id)?;
        let mut session = LifecycleGate::ensure_member(&*txn, board_id, caller)?;
        session.alias = alias;
        session.last_active_at = Utc::now();
        txn.put_session(&session)?;
        txn.commit()?;

        self.sink.notify(BoardEvent::UserJoined {
            board_id,
            alias: session.alias.clone(),
            is_admin: session.is_admin,
        });
        Ok(session)
    }

    pub fn heartbeat(&self, caller: &UserHash, board_id: BoardId) -> Result<UserSession, CoreError> {
        let mut txn = self.storage.begin()?;
        LifecycleGate::load_board(&*txn, board_id)?;
        let mut session = LifecycleGate::ensure_member(&*txn, board_id, caller)?;
        session.last_active_at = Utc::now();
        txn.put_session(&session)?;
        txn.commit()?;
        Ok(session)
    }

    /// Users seen on the board within the active window, by alias.
    pub fn active_users(&self, board_id: BoardId) -> Result<Vec<ActiveUser>, CoreError> {
        let reader = self.storage.read()?;
        LifecycleGate::load_board(&*reader, board_id)?;
        let now = Utc::now();
        let mut users: Vec<ActiveUser> = reader
            .sessions_by_board(board_id)?
            .into_iter()
            .filter(|s| s.is_active(now, self.active_window))
            .map(ActiveUser::from)
            .collect();
        users.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(users)
    }

    /// Designate `target` as an admin. The target must have joined the board.
    pub fn add_admin(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        target: &UserHash,
    ) -> Result<Board, CoreError> {
        let mut txn = self.storage.begin()?;
        let mut board = LifecycleGate::load_active_board(&*txn, board_id)?;
        LifecycleGate::ensure_can_designate_admin(&board, caller)?;
        let mut session = txn
            .get_session(board_id, target)?
            .ok_or(ValidationError::NotJoined)?;

        if !board.add_admin(target.clone()) {
            return Ok(board);
        }
        session.is_admin = true;
        txn.put_board(&board)?;
        txn.put_session(&session)?;
        txn.commit()?;

        info!(board = %board_id, admins = board.admins.len(), "Admin added");
        self.sink.notify(BoardEvent::BoardUpdated {
            board: board.clone(),
        });
        Ok(board)
    }

    pub fn rename_column(
        &self,
        caller: &UserHash,
        board_id: BoardId,
        column_id: &str,
        name: &str,
    ) -> Result<Board, CoreError> {
        let name = Validator::validate_name(name)?;

        let mut txn = self.storage.begin()?;
        let mut board = LifecycleGate::load_active_board(&*txn, board_id)?;
        LifecycleGate::ensure_admin(&board, caller)?;
        board
            .column_mut(column_id)
            .ok_or_else(|| CoreError::ColumnNotFound(column_id.to_string()))?
            .name = name;
        txn.put_board(&board)?;
        txn.commit()?;

        self.sink.notify(BoardEvent::BoardUpdated {
            board: board.clone(),
        });
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::super::test_support::{named, setup};
    use super::*;
    use crate::board::Column;
    use crate::card::{CardType, NewCard};
    use crate::error::ErrorCode;

    #[test]
    fn test_create_board_defaults() {
        let f = setup(named("Sprint 12"));
        assert_eq!(f.board.name, "Sprint 12");
        assert_eq!(f.board.columns.len(), 3);
        assert_eq!(f.board.admins, vec![f.admin.clone()]);

        let users = f.service.active_users(f.board.id).unwrap();
        let aliases: Vec<&str> = users.iter().map(|u| u.alias.as_str()).collect();
        assert_eq!(aliases, vec!["Admin", "Guest"]);
        assert!(users[0].is_admin);
        assert!(!users[1].is_admin);
    }

    #[test]
    fn test_create_board_validation() {
        let f = setup(named("Retro"));
        let err = f
            .service
            .create_board(&f.admin, "Admin", named("   "))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let zero_limit = NewBoard {
            card_limit_per_user: Some(0),
            ..named("Retro")
        };
        let err = f
            .service
            .create_board(&f.admin, "Admin", zero_limit)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let custom = NewBoard {
            columns: vec![Column::new("start", "Start"), Column::new("stop", "Stop")],
            reaction_limit_per_user: Some(4),
            ..named("Start/Stop")
        };
        let (board, _) = f.service.create_board(&f.admin, "Admin", custom).unwrap();
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.reaction_limit_per_user, NonZeroU32::new(4));
    }

    #[test]
    fn test_share_token_lookup() {
        let f = setup(named("Retro"));
        let found = f
            .service
            .get_board_by_share_token(&f.board.share_token)
            .unwrap();
        assert_eq!(found.id, f.board.id);

        let err = f.service.get_board_by_share_token("nope").unwrap_err();
        assert_eq!(err.code(), ErrorCode::BoardNotFound);
    }

    #[test]
    fn test_rejoin_replaces_session() {
        let f = setup(named("Retro"));
        let session = f.service.join_board(&f.guest, f.board.id, "Renamed").unwrap();
        assert_eq!(session.alias, "Renamed");

        let reader = f.service.storage().read().unwrap();
        assert_eq!(reader.sessions_by_board(f.board.id).unwrap().len(), 2);
        drop(reader);

        let admin = f.service.join_board(&f.admin, f.board.id, "Boss").unwrap();
        assert!(admin.is_admin);
    }

    #[test]
    fn test_admin_only_operations() {
        let f = setup(named("Retro"));

        let err = f
            .service
            .rename_board(&f.guest, f.board.id, "Hijacked")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        let err = f.service.close_board(&f.guest, f.board.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let board = f
            .service
            .rename_board(&f.admin, f.board.id, "Renamed")
            .unwrap();
        assert_eq!(board.name, "Renamed");
        assert_eq!(f.sink.kinds(), vec!["board_updated"]);
    }

    #[test]
    fn test_rename_column() {
        let f = setup(named("Retro"));
        let board = f
            .service
            .rename_column(&f.admin, f.board.id, "went_well", "Glad")
            .unwrap();
        assert_eq!(board.column("went_well").unwrap().name, "Glad");

        let err = f
            .service
            .rename_column(&f.admin, f.board.id, "missing", "Sad")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ColumnNotFound);
    }

    #[test]
    fn test_first_admin_designation_restricted_to_creator() {
        let f = setup(named("Retro"));
        let third = UserHash::new("third-hash");
        f.service.join_board(&third, f.board.id, "Third").unwrap();

        let err = f
            .service
            .add_admin(&f.guest, f.board.id, &third)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let board = f.service.add_admin(&f.admin, f.board.id, &f.guest).unwrap();
        assert_eq!(board.admins.len(), 2);

        // now any admin may designate
        let board = f.service.add_admin(&f.guest, f.board.id, &third).unwrap();
        assert_eq!(board.admins.len(), 3);

        let stranger = UserHash::new("stranger");
        let err = f
            .service
            .add_admin(&f.admin, f.board.id, &stranger)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_closed_board_admin_operations() {
        let f = setup(named("Retro"));
        let closed = f.service.close_board(&f.admin, f.board.id).unwrap();
        assert!(closed.is_closed());
        assert!(closed.closed_at.is_some());

        let err = f.service.close_board(&f.admin, f.board.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BoardClosed);
        let err = f
            .service
            .rename_board(&f.admin, f.board.id, "Late")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BoardClosed);

        // presence still works
        f.service.heartbeat(&f.guest, f.board.id).unwrap();
        assert!(f.service.get_board(f.board.id).unwrap().is_closed());
    }

    #[test]
    fn test_delete_board_cascades() {
        let f = setup(named("Retro"));
        let (other, _) = f
            .service
            .create_board(&f.guest, "Guest", named("Other"))
            .unwrap();
        let other_card = f
            .service
            .create_card(
                &f.guest,
                other.id,
                NewCard {
                    column_id: "to_improve".to_string(),
                    content: "elsewhere".to_string(),
                    card_type: CardType::Feedback,
                    is_anonymous: true,
                },
            )
            .unwrap();
        f.service.add_reaction(&f.guest, other_card.id, None).unwrap();

        let mut cards = Vec::new();
        for user in [&f.admin, &f.guest] {
            let card = f
                .service
                .create_card(
                    user,
                    f.board.id,
                    NewCard {
                        column_id: "went_well".to_string(),
                        content: "content".to_string(),
                        card_type: CardType::Feedback,
                        is_anonymous: false,
                    },
                )
                .unwrap();
            cards.push(card.id);
        }
        f.service.add_reaction(&f.admin, cards[0], None).unwrap();
        f.service.add_reaction(&f.guest, cards[0], None).unwrap();
        f.service.add_reaction(&f.guest, cards[1], None).unwrap();

        let err = f.service.delete_board(&f.guest, f.board.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let report = f.service.delete_board(&f.admin, f.board.id).unwrap();
        assert_eq!(report.cards_deleted, 2);
        assert_eq!(report.reactions_deleted, 3);
        assert_eq!(report.sessions_deleted, 2);
        assert_eq!(f.sink.kinds().last(), Some(&"board_deleted"));

        let reader = f.service.storage().read().unwrap();
        assert!(reader.cards_by_board(f.board.id).unwrap().is_empty());
        assert!(reader.reactions_by_board(f.board.id).unwrap().is_empty());
        assert!(reader.sessions_by_board(f.board.id).unwrap().is_empty());
        assert_eq!(reader.cards_by_board(other.id).unwrap().len(), 1);
        assert_eq!(reader.reactions_by_board(other.id).unwrap().len(), 1);
        assert_eq!(reader.sessions_by_board(other.id).unwrap().len(), 1);
        drop(reader);

        assert_eq!(
            f.service.get_board(f.board.id).unwrap_err().code(),
            ErrorCode::BoardNotFound
        );
        assert!(f.service.get_board(other.id).is_ok());
    }

    #[test]
    fn test_update_alias_requires_membership() {
        let f = setup(named("Retro"));
        let stranger = UserHash::new("stranger");
        let err = f
            .service
            .update_alias(&stranger, f.board.id, "Who")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let session = f.service.update_alias(&f.guest, f.board.id, "Gus").unwrap();
        assert_eq!(session.alias, "Gus");
        assert_eq!(f.sink.kinds(), vec!["user_joined"]);
    }

    #[test]
    fn test_inactive_users_hidden() {
        let f = setup(named("Retro"));
        let service = f.service.with_active_window(chrono::Duration::seconds(-1));
        assert!(service.active_users(f.board.id).unwrap().is_empty());
    }
}
