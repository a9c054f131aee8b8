//! Accept loop, session registry, and shutdown orchestration.
//!
//! Grounded in the teacher's `app::server::run_server` (bind, `TcpSocket`
//! tuning, `tokio::select!` accept loop) pared down to this crate's much
//! smaller surface: no TLS negotiation, no binary upgrade, no patroni/admin
//! modes.

pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::config::Settings;
use crate::db::Pool;
use crate::errors::Error;
use registry::Registry;

/// Owns the acceptor, the session registry, and the DB pool tying them
/// together. `stop()` is one-shot and safe to call more than once.
pub struct Server {
    registry: Arc<Registry>,
    db: Pool,
    ping_timeout: Duration,
    stopped: Arc<Notify>,
}

impl Server {
    pub async fn bind(settings: &Settings) -> Result<(Self, TcpListener), Error> {
        let db = Pool::connect(&settings.database_url, settings.pool_size).await?;
        Self::bind_with_pool(settings, db)
    }

    /// Binds the listener using an already-constructed [`Pool`], skipping
    /// the usual Postgres connection step. Used by tests to run the server
    /// against [`Pool::connect_in_memory`].
    pub fn bind_with_pool(settings: &Settings, db: Pool) -> Result<(Self, TcpListener), Error> {
        let listener = bind_listener(&settings.listen_addr)?;
        Ok((
            Server {
                registry: Arc::new(Registry::new()),
                db,
                ping_timeout: Duration::from_secs(settings.ping_timeout_secs),
                stopped: Arc::new(Notify::new()),
            },
            listener,
        ))
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Drives the accept loop until `shutdown` is requested. One accepted
    /// socket becomes one spawned session task sharing ownership of the
    /// registry and the DB pool.
    pub async fn serve(&self, listener: TcpListener, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        log::info!("listening on {}", listener.local_addr().map(|a| a.to_string()).unwrap_or_default());

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("shutdown requested, closing acceptor");
                    break;
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                log::warn!("failed to set TCP_NODELAY for {peer_addr}: {e}");
                            }
                            let registry = self.registry.clone();
                            let db = self.db.clone();
                            let ping_timeout = self.ping_timeout;
                            tokio::spawn(async move {
                                crate::session::run(stream, peer_addr, registry, db, ping_timeout).await;
                            });
                        }
                        Err(e) => {
                            log::error!("accept error: {e}");
                        }
                    }
                }
            }
        }

        self.stop().await;
    }

    /// Closes every live session and tears down the DB pool. Idempotent:
    /// calling it a second time only finds an already-empty registry.
    pub async fn stop(&self) {
        self.registry.close_all();
        self.db.shutdown().await;
        self.stopped.notify_waiters();
    }
}

/// Builds a `TcpListener` with the same reuseaddr/backlog tuning style the
/// teacher applies to its acceptor, scaled down (no reuseport, no custom
/// worker affinity — out of scope for this crate).
fn bind_listener(addr: &str) -> Result<TcpListener, Error> {
    let sock_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid listen address")))?;

    let domain = if sock_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&sock_addr.into())?;
    socket.listen(1024)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).map_err(Error::Io)
}

/// Resolves when either SIGINT or SIGTERM is received, matching the
/// teacher's graceful-shutdown signal set (minus SIGHUP config reload and
/// the binary-upgrade path, both out of scope here).
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => log::info!("received SIGINT"),
        _ = sigterm.recv() => log::info!("received SIGTERM"),
    }
}
