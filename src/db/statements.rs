//! Prepared-statement names and row mappers for the accounts table. Only
//! the statements [`crate::db::Pool`] actually calls are contracted here;
//! the schema itself is an external collaborator.

use chrono::{DateTime, Utc};
use tokio_postgres::Row;

pub const SELECT_ACCOUNT_BY_USERNAME: &str = "SELECT_ACCOUNT_BY_USERNAME";
pub const INSERT_ACCOUNT_BY_USERNAME: &str = "INSERT_ACCOUNT_BY_USERNAME";

/// One row of the accounts table.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub id: i64,
    pub username: String,
    pub salt: String,
    pub verifier: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Unit result for statements that don't return a meaningful row
/// (`INSERT_ACCOUNT_BY_USERNAME` only needs the generated id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertedId(pub i64);

/// Maps a raw `tokio_postgres::Row` into a typed result.
pub trait RowMapper: Sized {
    fn map(row: &Row) -> Self;
}

impl RowMapper for AccountRow {
    fn map(row: &Row) -> Self {
        AccountRow {
            id: row.get("id"),
            username: row.get("username"),
            salt: row.get("salt"),
            verifier: row.get("verifier"),
            email: row.get("email"),
            created_at: row.get("created_at"),
        }
    }
}

impl RowMapper for InsertedId {
    fn map(row: &Row) -> Self {
        InsertedId(row.get("id"))
    }
}

/// The SQL text installed under each name on every pool connection. The
/// schema itself is out of scope; this is the minimal shape handlers depend
/// on.
pub fn statement_sql(name: &str) -> &'static str {
    match name {
        SELECT_ACCOUNT_BY_USERNAME => {
            "SELECT id, username, salt, verifier, email, created_at FROM accounts WHERE username = $1"
        }
        INSERT_ACCOUNT_BY_USERNAME => {
            "INSERT INTO accounts (username, salt, verifier) VALUES ($1, $2, $3) RETURNING id"
        }
        other => panic!("no SQL text registered for prepared statement {other}"),
    }
}

pub const ALL_STATEMENTS: &[&str] = &[SELECT_ACCOUNT_BY_USERNAME, INSERT_ACCOUNT_BY_USERNAME];
