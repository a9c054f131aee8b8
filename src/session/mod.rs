//! Per-connection session: state machine, write queue, ping timer, and the
//! read loop that frames incoming bytes into packets.
//!
//! Grounded in the teacher's `client::core::Client` (struct shape, `Drop`
//! cleanup) and the original source's `ClientSession` (write-queue /
//! ping-timer / close pattern), but expressed as a single `async fn` driving
//! `tokio::select!` rather than chained callbacks (see `SPEC_FULL.md` §9).

pub mod state;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::db::Pool;
use crate::errors::Error;
use crate::server::registry::Registry;
use crate::wire::buffer::MAX_BUFFER_SIZE;
use crate::wire::packet::Packet;
use state::SessionState;

/// Unique, process-lifetime identifier for a session in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Bound on the per-session outgoing frame queue. A handler that outruns the
/// socket past this many unsent frames aborts the session rather than
/// growing the queue without limit.
const WRITE_QUEUE_CAPACITY: usize = 256;

impl SessionId {
    fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared, thread-safe handle to one connection's protocol-level state.
/// Held by the registry, by the driving task, and passed (by reference) into
/// handlers; nothing outside this module touches the raw socket.
pub struct Session {
    pub id: SessionId,
    pub peer_addr: std::net::SocketAddr,
    connected_at: chrono::DateTime<chrono::Utc>,
    state: Mutex<SessionState>,
    closed: AtomicBool,
    server_token: u32,
    client_token: AtomicU32,
    user_name: Mutex<String>,
    is_authenticated: AtomicBool,
    is_in_db: AtomicBool,
    srp: Mutex<crate::srp::Srp>,
    ping_deadline: Mutex<Instant>,
    write_tx: mpsc::Sender<Vec<u8>>,
    shutdown: Notify,
}

impl Session {
    fn new(peer_addr: std::net::SocketAddr, write_tx: mpsc::Sender<Vec<u8>>, ping_timeout: Duration) -> Self {
        let mut token_bytes = [0u8; 4];
        rand::rng().fill_bytes(&mut token_bytes);
        Session {
            id: SessionId::next(),
            peer_addr,
            connected_at: chrono::Utc::now(),
            state: Mutex::new(SessionState::Connected),
            closed: AtomicBool::new(false),
            server_token: u32::from_le_bytes(token_bytes),
            client_token: AtomicU32::new(0),
            user_name: Mutex::new(String::new()),
            is_authenticated: AtomicBool::new(false),
            is_in_db: AtomicBool::new(false),
            srp: Mutex::new(crate::srp::Srp::new()),
            ping_deadline: Mutex::new(Instant::now() + ping_timeout),
            write_tx,
            shutdown: Notify::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn set_state(&self, s: SessionState) {
        *self.state.lock() = s;
    }

    pub fn server_token(&self) -> u32 {
        self.server_token
    }

    pub fn client_token(&self) -> u32 {
        self.client_token.load(Ordering::Relaxed)
    }

    pub fn set_client_token(&self, v: u32) {
        self.client_token.store(v, Ordering::Relaxed);
    }

    pub fn user_name(&self) -> String {
        self.user_name.lock().clone()
    }

    pub fn set_user_name(&self, name: String) {
        *self.user_name.lock() = name;
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated.load(Ordering::Relaxed)
    }

    pub fn set_authenticated(&self, v: bool) {
        self.is_authenticated.store(v, Ordering::Relaxed);
    }

    pub fn is_in_db(&self) -> bool {
        self.is_in_db.load(Ordering::Relaxed)
    }

    pub fn set_in_db(&self, v: bool) {
        self.is_in_db.store(v, Ordering::Relaxed);
    }

    pub fn srp(&self) -> parking_lot::MutexGuard<'_, crate::srp::Srp> {
        self.srp.lock()
    }

    /// Resets the idle/ping deadline to `now + timeout`. Safe to call from
    /// within a handler; the driving loop re-reads the deadline on every
    /// iteration.
    pub fn reset_ping(&self, timeout: Duration) {
        *self.ping_deadline.lock() = Instant::now() + timeout;
    }

    /// Enqueues an already-built packet for transmission. Frames are written
    /// in the order this is called, one at a time (see the writer loop in
    /// [`run`]), giving the FIFO/single-in-flight guarantee the wire
    /// contract requires. The queue is bounded: a peer that stops reading
    /// fast enough to fill it aborts the session rather than buffering
    /// unboundedly.
    pub fn send_packet(&self, packet: Packet) -> Result<(), Error> {
        self.write_tx
            .try_send(packet.serialize())
            .map_err(|_| Error::Aborted)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// One-shot close request. Returns `true` if this call performed the
    /// transition (i.e. the caller is responsible for any close-only
    /// side effects); re-entry is always a no-op.
    pub fn request_close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.set_state(SessionState::Closed);
        self.shutdown.notify_waiters();
        true
    }

    #[cfg(test)]
    pub fn new_for_test(peer_addr: std::net::SocketAddr, write_tx: mpsc::Sender<Vec<u8>>, ping_timeout: Duration) -> Self {
        Session::new(peer_addr, write_tx, ping_timeout)
    }
}

/// Accepts ownership of a freshly-accepted socket and drives its entire
/// lifecycle: sends the initial `SID_AUTH_INFO`, then loops reading frames,
/// dispatching them to handlers, flushing queued writes, and watching the
/// ping deadline, until the session closes for any reason.
pub async fn run(
    mut stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    registry: Arc<Registry>,
    db: Pool,
    ping_timeout: Duration,
) {
    let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_CAPACITY);
    let session = Arc::new(Session::new(peer_addr, write_tx, ping_timeout));
    registry.insert(session.clone());

    log::info!("session {} connected from {}", session.id.0, peer_addr);

    if let Err(e) = crate::handlers::send_initial_auth_info(&session) {
        log::warn!("session {}: failed to send initial auth info: {e}", session.id.0);
        session.request_close();
    }

    let mut inbuf: Vec<u8> = Vec::new();
    let mut read_buf = [0u8; 8192];

    'driver: loop {
        if session.is_closed() {
            break;
        }

        let deadline = *session.ping_deadline.lock();

        tokio::select! {
            biased;

            _ = session.shutdown.notified() => {
                break 'driver;
            }

            _ = tokio::time::sleep_until(deadline) => {
                log::info!("session {} idle timeout", session.id.0);
                session.request_close();
                break 'driver;
            }

            maybe_frame = write_rx.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        if let Err(e) = stream.write_all(&frame).await {
                            log::warn!("session {}: write error: {e}", session.id.0);
                            session.request_close();
                            break 'driver;
                        }
                    }
                    None => {
                        // All senders dropped; nothing left to flush.
                    }
                }
            }

            n = stream.read(&mut read_buf) => {
                match n {
                    Ok(0) => {
                        log::info!("session {} closed by peer", session.id.0);
                        session.request_close();
                        break 'driver;
                    }
                    Ok(n) => {
                        inbuf.extend_from_slice(&read_buf[..n]);
                        if let Err(e) = drain_frames(&session, &mut inbuf, &db, ping_timeout).await {
                            log::warn!("session {}: {e}", session.id.0);
                            session.request_close();
                            break 'driver;
                        }
                    }
                    Err(e) => {
                        log::warn!("session {}: read error: {e}", session.id.0);
                        session.request_close();
                        break 'driver;
                    }
                }
            }
        }
    }

    let _ = stream.shutdown().await;
    registry.remove(session.id);
    let age = chrono::Utc::now() - session.connected_at;
    log::info!(
        "session {} removed from registry (connected for {})",
        session.id.0,
        crate::utils::format_duration(&age)
    );
}

/// Carves complete frames out of `inbuf` and dispatches each one in arrival
/// order. Never consumes a length header until the full body has arrived;
/// never copies bytes that are about to be discarded.
async fn drain_frames(
    session: &Arc<Session>,
    inbuf: &mut Vec<u8>,
    db: &Pool,
    ping_timeout: Duration,
) -> Result<(), Error> {
    loop {
        if inbuf.len() < 4 {
            return Ok(());
        }
        let length = u32::from_le_bytes([inbuf[0], inbuf[1], inbuf[2], inbuf[3]]);
        Packet::check_frame_length(length)?;
        let length = length as usize;

        if inbuf.len() < 4 + length {
            return Ok(());
        }

        let body: Vec<u8> = inbuf[4..4 + length].to_vec();
        inbuf.drain(0..4 + length);

        let packet = Packet::deserialize(&body).map_err(Error::from)?;
        session.reset_ping(ping_timeout);
        crate::handlers::dispatch(session, &packet, db).await?;

        if session.is_closed() {
            return Ok(());
        }
    }
}

/// Guard used only by tests to sanity-check the frame-length bound without
/// standing up a real socket.
#[cfg(test)]
pub fn max_frame_len() -> usize {
    MAX_BUFFER_SIZE
}
