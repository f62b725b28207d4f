//! Operator authentication.
//!
//! Credentials are checked by a [`CredentialVerifier`] and sessions are kept
//! in a [`TokenStore`]. The daemon wires the configured operator list and
//! the workspace `sessions` table; tests use an in-memory store.

use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::OperatorEntry;

const STAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    BadCredentials,
    #[error("authentication required")]
    MissingToken,
    #[error("unknown session token")]
    UnknownToken,
    #[error("session expired")]
    Expired,
    #[error("session lifetime is out of range")]
    TtlOutOfRange,
    #[error("session store failure: {0}")]
    Store(#[from] rusqlite::Error),
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn new_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub username: String,
    pub display_name: String,
}

pub trait CredentialVerifier {
    fn verify(&self, username: &str, password: &str) -> Option<Operator>;
}

/// Operators listed under `[[auth.operators]]`.
pub struct ConfiguredOperators<'a> {
    entries: &'a [OperatorEntry],
}

impl<'a> ConfiguredOperators<'a> {
    pub fn new(entries: &'a [OperatorEntry]) -> Self {
        Self { entries }
    }
}

impl CredentialVerifier for ConfiguredOperators<'_> {
    fn verify(&self, username: &str, password: &str) -> Option<Operator> {
        let digest = hash_password(password);
        self.entries
            .iter()
            .find(|e| e.username == username && e.password_sha256.eq_ignore_ascii_case(&digest))
            .map(|e| Operator {
                username: e.username.clone(),
                display_name: e.display_name.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub display_name: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Session {
    fn new(operator: &Operator, now: NaiveDateTime, ttl: Duration) -> Result<Self, AuthError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(AuthError::TtlOutOfRange)?;
        Ok(Self {
            token: new_token(),
            username: operator.username.clone(),
            display_name: operator.display_name.clone(),
            issued_at: now,
            expires_at,
        })
    }

    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now > self.expires_at
    }
}

/// Issues, validates and revokes session tokens. Expiry is checked lazily:
/// `validate` drops a token it finds expired.
pub trait TokenStore {
    fn issue(
        &self,
        operator: &Operator,
        now: NaiveDateTime,
        ttl: Duration,
    ) -> Result<Session, AuthError>;
    fn validate(&self, token: &str, now: NaiveDateTime) -> Result<Session, AuthError>;
    /// Returns whether a session was removed.
    fn revoke(&self, token: &str) -> Result<bool, AuthError>;
    fn purge_expired(&self, now: NaiveDateTime) -> Result<usize, AuthError>;
}

/// Sessions persisted in the workspace database.
pub struct SqliteTokenStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTokenStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn parse_stamp(s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, STAMP_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl TokenStore for SqliteTokenStore<'_> {
    fn issue(
        &self,
        operator: &Operator,
        now: NaiveDateTime,
        ttl: Duration,
    ) -> Result<Session, AuthError> {
        let session = Session::new(operator, now, ttl)?;
        self.conn.execute(
            "INSERT INTO sessions(token, username, display_name, issued_at, expires_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                &session.token,
                &session.username,
                &session.display_name,
                session.issued_at.format(STAMP_FMT).to_string(),
                session.expires_at.format(STAMP_FMT).to_string(),
            ),
        )?;
        Ok(session)
    }

    fn validate(&self, token: &str, now: NaiveDateTime) -> Result<Session, AuthError> {
        let row: Option<(String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT username, display_name, issued_at, expires_at FROM sessions WHERE token = ?",
                [token],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((username, display_name, issued_at, expires_at)) = row else {
            return Err(AuthError::UnknownToken);
        };
        let session = Session {
            token: token.to_string(),
            username,
            display_name,
            issued_at: parse_stamp(&issued_at)?,
            expires_at: parse_stamp(&expires_at)?,
        };
        if session.is_expired(now) {
            self.revoke(token)?;
            return Err(AuthError::Expired);
        }
        Ok(session)
    }

    fn revoke(&self, token: &str) -> Result<bool, AuthError> {
        let n = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?", [token])?;
        Ok(n > 0)
    }

    fn purge_expired(&self, now: NaiveDateTime) -> Result<usize, AuthError> {
        // Stamps share one fixed-width format, so text comparison orders them.
        let n = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?",
            [now.format(STAMP_FMT).to_string()],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MemoryTokenStore {
        sessions: RefCell<HashMap<String, Session>>,
    }

    impl TokenStore for MemoryTokenStore {
        fn issue(
            &self,
            operator: &Operator,
            now: NaiveDateTime,
            ttl: Duration,
        ) -> Result<Session, AuthError> {
            let session = Session::new(operator, now, ttl)?;
            self.sessions
                .borrow_mut()
                .insert(session.token.clone(), session.clone());
            Ok(session)
        }

        fn validate(&self, token: &str, now: NaiveDateTime) -> Result<Session, AuthError> {
            let found = self.sessions.borrow().get(token).cloned();
            let session = found.ok_or(AuthError::UnknownToken)?;
            if session.is_expired(now) {
                self.sessions.borrow_mut().remove(token);
                return Err(AuthError::Expired);
            }
            Ok(session)
        }

        fn revoke(&self, token: &str) -> Result<bool, AuthError> {
            Ok(self.sessions.borrow_mut().remove(token).is_some())
        }

        fn purge_expired(&self, now: NaiveDateTime) -> Result<usize, AuthError> {
            let mut sessions = self.sessions.borrow_mut();
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_expired(now));
            Ok(before - sessions.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTokenStore;
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .expect("date")
            .and_hms_opt(hour, 0, 0)
            .expect("time")
    }

    fn teacher() -> Operator {
        Operator {
            username: "desk".to_string(),
            display_name: "Front Desk".to_string(),
        }
    }

    fn exercise_store(store: &dyn TokenStore) {
        let session = store
            .issue(&teacher(), at(1, 9), Duration::days(2))
            .expect("issue");
        assert_eq!(session.token.len(), 64);

        let seen = store.validate(&session.token, at(2, 9)).expect("valid");
        assert_eq!(seen.username, "desk");
        assert_eq!(seen.expires_at, at(3, 9));

        assert!(matches!(
            store.validate("nope", at(2, 9)),
            Err(AuthError::UnknownToken)
        ));

        assert!(matches!(
            store.validate(&session.token, at(3, 10)),
            Err(AuthError::Expired)
        ));
        // The expired token was dropped on read.
        assert!(matches!(
            store.validate(&session.token, at(1, 10)),
            Err(AuthError::UnknownToken)
        ));

        let other = store
            .issue(&teacher(), at(1, 9), Duration::days(1))
            .expect("issue");
        assert!(store.revoke(&other.token).expect("revoke"));
        assert!(!store.revoke(&other.token).expect("revoke twice"));

        store
            .issue(&teacher(), at(1, 9), Duration::days(1))
            .expect("issue");
        let live = store
            .issue(&teacher(), at(5, 9), Duration::days(1))
            .expect("issue");
        assert_eq!(store.purge_expired(at(5, 10)).expect("purge"), 1);
        store.validate(&live.token, at(5, 10)).expect("still valid");
    }

    #[test]
    fn memory_store_lifecycle() {
        exercise_store(&MemoryTokenStore::default());
    }

    #[test]
    fn sqlite_store_lifecycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = crate::db::open_db(dir.path()).expect("open db");
        exercise_store(&SqliteTokenStore::new(&conn));
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_panic() {
        let store = MemoryTokenStore::default();
        let res = store.issue(&teacher(), at(1, 9), Duration::days(100_000_000));
        assert!(matches!(res, Err(AuthError::TtlOutOfRange)));
    }

    #[test]
    fn configured_operators_check_digest() {
        let entries = vec![OperatorEntry {
            username: "desk".to_string(),
            password_sha256: hash_password("s3cret").to_uppercase(),
            display_name: "Front Desk".to_string(),
        }];
        let verifier = ConfiguredOperators::new(&entries);
        assert_eq!(verifier.verify("desk", "s3cret"), Some(teacher()));
        assert_eq!(verifier.verify("desk", "wrong"), None);
        assert_eq!(verifier.verify("other", "s3cret"), None);
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
