//! The account store: a fixed-size queue of prepared Postgres connections
//! with transparent reconnect, plus a synchronous/asynchronous dual API.
//!
//! Grounded in the teacher's `pool::ServerPool` (FIFO of connections behind
//! a mutex, reconnect-on-broken-connection, `PoolConfig{max_size}`), but the
//! direction of the dual API is reversed relative to the original C++
//! source: here the async path is the real implementation and the blocking
//! path is a thin wrapper that runs it to completion on a dedicated worker
//! thread (see `SPEC_FULL.md` §9).
//!
//! A second, in-memory backend exists purely for tests (see
//! [`Pool::connect_in_memory`]): it answers the same two account-store
//! operations directly over a `HashMap` rather than standing up a real
//! Postgres instance, so `tests/handshake.rs` can drive the server
//! end-to-end without an external dependency.

pub mod statements;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio_postgres::{Client, NoTls, Statement};

use crate::errors::Error;
use statements::{
    statement_sql, AccountRow, InsertedId, RowMapper, ALL_STATEMENTS, INSERT_ACCOUNT_BY_USERNAME, SELECT_ACCOUNT_BY_USERNAME,
};

struct PreparedConnection {
    client: Client,
    statements: HashMap<&'static str, Statement>,
}

impl PreparedConnection {
    async fn connect(conninfo: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(conninfo, NoTls)
            .await
            .map_err(Error::Sql)?;

        // The connection object drives actual I/O; it must be polled
        // somewhere independent of query calls, exactly like the teacher's
        // server-backend connections.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("database connection task ended: {e}");
            }
        });

        let mut statements = HashMap::new();
        for &name in ALL_STATEMENTS {
            let stmt = client
                .prepare(statement_sql(name))
                .await
                .map_err(Error::Sql)?;
            statements.insert(name, stmt);
        }

        Ok(PreparedConnection { client, statements })
    }
}

/// Queue of prepared connections plus the semaphore that bounds concurrent
/// borrowers to `pool_size`.
struct PostgresBackend {
    conninfo: String,
    idle: Mutex<VecDeque<PreparedConnection>>,
    permits: Semaphore,
}

#[derive(Clone)]
struct MemoryAccount {
    id: i64,
    salt: String,
    verifier: String,
}

struct MemoryBackend {
    accounts: Mutex<HashMap<String, MemoryAccount>>,
    next_id: AtomicI64,
}

enum Backend {
    Postgres(PostgresBackend),
    Memory(MemoryBackend),
}

/// A handle to the account database. Cheap to clone; all state lives behind
/// the `Arc`.
#[derive(Clone)]
pub struct Pool {
    backend: Arc<Backend>,
    /// Handle to the runtime that owns the I/O-bound async path, used by
    /// `select_account_by_username_sync` to dispatch work onto a dedicated
    /// worker thread without re-entering the I/O executor.
    runtime: tokio::runtime::Handle,
}

impl Pool {
    /// Opens `pool_size` connections, installs every known prepared
    /// statement on each, and enqueues them.
    pub async fn connect(conninfo: &str, pool_size: usize) -> Result<Self, Error> {
        let mut idle = VecDeque::with_capacity(pool_size);
        for _ in 0..pool_size {
            idle.push_back(PreparedConnection::connect(conninfo).await?);
        }
        Ok(Pool {
            backend: Arc::new(Backend::Postgres(PostgresBackend {
                conninfo: conninfo.to_string(),
                idle: Mutex::new(idle),
                permits: Semaphore::new(pool_size),
            })),
            runtime: tokio::runtime::Handle::current(),
        })
    }

    /// An account store backed by a plain in-process `HashMap`, for tests
    /// that need a working `Pool` without a live Postgres instance.
    pub fn connect_in_memory() -> Self {
        Pool {
            backend: Arc::new(Backend::Memory(MemoryBackend {
                accounts: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            })),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Looks up an account by its lower-cased username.
    pub async fn select_account_by_username(&self, lower_username: &str) -> Result<Option<AccountRow>, Error> {
        match self.backend.as_ref() {
            Backend::Postgres(pg) => {
                let (mut conn, _permit) = Self::acquire(pg).await?;
                let result = Self::run_select(&mut conn, lower_username).await;
                Self::finish(pg, conn, result).await
            }
            Backend::Memory(mem) => {
                let accounts = mem.accounts.lock().await;
                Ok(accounts.get(lower_username).map(|a| AccountRow {
                    id: a.id,
                    username: lower_username.to_string(),
                    salt: a.salt.clone(),
                    verifier: a.verifier.clone(),
                    email: None,
                    created_at: chrono::Utc::now(),
                }))
            }
        }
    }

    /// Inserts a newly auto-registered account, returning its generated id.
    pub async fn insert_account_by_username(
        &self,
        lower_username: &str,
        salt: &str,
        verifier: &str,
    ) -> Result<InsertedId, Error> {
        match self.backend.as_ref() {
            Backend::Postgres(pg) => {
                let (mut conn, _permit) = Self::acquire(pg).await?;
                let result = Self::run_insert(&mut conn, lower_username, salt, verifier).await;
                Self::finish(pg, conn, result).await?.ok_or(Error::ConnectionLost)
            }
            Backend::Memory(mem) => {
                let mut accounts = mem.accounts.lock().await;
                let id = mem.next_id.fetch_add(1, Ordering::Relaxed);
                accounts.insert(
                    lower_username.to_string(),
                    MemoryAccount {
                        id,
                        salt: salt.to_string(),
                        verifier: verifier.to_string(),
                    },
                );
                Ok(InsertedId(id))
            }
        }
    }

    /// Acquires a connection FIFO, reconnecting it first if the queue was
    /// momentarily drained by a borrower that had to discard a broken one.
    async fn acquire(pg: &PostgresBackend) -> Result<(PreparedConnection, tokio::sync::SemaphorePermit<'_>), Error> {
        let permit = pg.permits.acquire().await.map_err(|_| Error::Aborted)?;
        let conn = {
            let mut idle = pg.idle.lock().await;
            idle.pop_front()
        };
        let conn = match conn {
            Some(c) => c,
            None => PreparedConnection::connect(&pg.conninfo).await?,
        };
        Ok((conn, permit))
    }

    async fn run_select(conn: &mut PreparedConnection, lower_username: &str) -> Result<Option<AccountRow>, Error> {
        let stmt = conn
            .statements
            .get(SELECT_ACCOUNT_BY_USERNAME)
            .expect("SELECT_ACCOUNT_BY_USERNAME installed on every connection")
            .clone();
        let txn = conn.client.transaction().await.map_err(classify_sql_error)?;
        let rows = txn.query(&stmt, &[&lower_username]).await.map_err(classify_sql_error)?;
        txn.commit().await.map_err(classify_sql_error)?;
        Ok(rows.first().map(AccountRow::map))
    }

    async fn run_insert(
        conn: &mut PreparedConnection,
        lower_username: &str,
        salt: &str,
        verifier: &str,
    ) -> Result<Option<InsertedId>, Error> {
        let stmt = conn
            .statements
            .get(INSERT_ACCOUNT_BY_USERNAME)
            .expect("INSERT_ACCOUNT_BY_USERNAME installed on every connection")
            .clone();
        let txn = conn.client.transaction().await.map_err(classify_sql_error)?;
        let rows = txn
            .query(&stmt, &[&lower_username, &salt, &verifier])
            .await
            .map_err(classify_sql_error)?;
        txn.commit().await.map_err(classify_sql_error)?;
        Ok(rows.first().map(InsertedId::map))
    }

    /// Returns a connection to the pool, transparently re-creating it first
    /// if the query just run found it broken.
    async fn finish<R>(pg: &PostgresBackend, conn: PreparedConnection, result: Result<Option<R>, Error>) -> Result<Option<R>, Error> {
        match result {
            Ok(row) => {
                pg.idle.lock().await.push_back(conn);
                Ok(row)
            }
            Err(Error::ConnectionLost) => {
                match PreparedConnection::connect(&pg.conninfo).await {
                    Ok(fresh) => pg.idle.lock().await.push_back(fresh),
                    Err(e) => log::error!("failed to re-create broken db connection: {e}"),
                }
                Err(Error::ConnectionLost)
            }
            Err(other) => {
                pg.idle.lock().await.push_back(conn);
                Err(other)
            }
        }
    }

    /// Blocking convenience wrapper around [`Pool::select_account_by_username`],
    /// run to completion on a dedicated OS thread via `Handle::block_on` so
    /// it never blocks the calling I/O executor, at the cost of a thread per
    /// call.
    pub fn select_account_by_username_sync(&self, lower_username: &str) -> Result<Option<AccountRow>, Error> {
        let pool = self.clone();
        let handle = self.runtime.clone();
        let username = lower_username.to_string();
        std::thread::spawn(move || handle.block_on(pool.select_account_by_username(&username)))
            .join()
            .unwrap_or_else(|_| Err(Error::Aborted))
    }

    /// Drains and disconnects all idle connections. In-flight borrows are
    /// simply dropped by their callers; this only clears the idle queue.
    pub async fn shutdown(&self) {
        if let Backend::Postgres(pg) = self.backend.as_ref() {
            pg.idle.lock().await.clear();
        }
    }
}

/// `tokio_postgres` folds "connection closed" into its own error variants;
/// this narrows that down to the `ConnectionLost` kind the pool contract
/// promises versus a generic `Sql` failure.
fn classify_sql_error(e: tokio_postgres::Error) -> Error {
    if e.is_closed() {
        Error::ConnectionLost
    } else {
        Error::Sql(e)
    }
}
