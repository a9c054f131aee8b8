//! Stateless handler functions dispatched by opcode. Each handler is a pure
//! function of `(Session, Packet)`: it reads fields out of the packet
//! payload, mutates session state through the `Session` handle, and sends
//! replies through `Session::send_packet`. Handlers never touch raw bytes
//! directly (that's `ByteBuffer`'s job) and never block the I/O executor —
//! DB calls always go through [`crate::db::Pool`]'s async methods.
//!
//! Grounded in the original source's `Handlers.cpp` for field ordering and
//! reply shapes, and in the teacher's `client::transaction::handle` for the
//! read-dispatch-loop shape this module is called from.

use crate::db::Pool;
use crate::errors::{AuthError, Error, ProtocolError};
use crate::session::state::SessionState;
use crate::session::Session;
use crate::wire::buffer::ByteBuffer;
use crate::wire::opcodes::*;
use crate::wire::packet::Packet;

/// Platform/product identifiers and client version carried in
/// `SID_AUTH_INFO`. These are fixed constants matching the original wire
/// format rather than configuration, since changing them would break
/// compatibility with an existing client.
const PLATFORM_IX86: u32 = 0x4953_5836;
const PRODUCT_W3XP: u32 = 0x5751_5233;
const CLIENT_VERSION: u32 = 17085;
const BANNER: &str = "BNCS Lobby";

/// Sends the server's opening `SID_AUTH_INFO` immediately after accept.
pub fn send_initial_auth_info(session: &Session) -> Result<(), Error> {
    let mut payload = ByteBuffer::new();
    payload.write_u32(PLATFORM_IX86)?;
    payload.write_u32(PRODUCT_W3XP)?;
    payload.write_u32(CLIENT_VERSION)?;
    payload.write_u32(0)?; // exe hash, unused by this lobby
    payload.write_u32(session.server_token())?;
    payload.write_u32(0)?; // client token, not yet known
    payload.write_string(BANNER)?;
    session.send_packet(Packet::from_buffer(SID_AUTH_INFO, payload))
}

/// Routes one decoded packet to its handler, enforcing the state machine:
/// an opcode not valid for the session's current state is a protocol
/// violation that closes the session without running any handler logic.
pub async fn dispatch(session: &Session, packet: &Packet, db: &Pool) -> Result<(), Error> {
    let state = session.state();
    if !state.accepts(packet.opcode) {
        log::warn!(
            "session {}: opcode {:#04x} invalid in state {}",
            session.id.0,
            packet.opcode,
            state
        );
        session.request_close();
        return Err(Error::ProtocolError(ProtocolError::UnexpectedOpcode {
            opcode: packet.opcode,
            state: state.as_str(),
        }));
    }

    match packet.opcode {
        SID_BNCS_PING if state == SessionState::Connected => handle_bncs_ping(session),
        SID_AUTH_CHECK => handle_auth_check(session, packet),
        SID_AUTH_INFO => handle_auth_info(session, packet, db).await,
        SID_LOGON_PROOF => handle_logon_proof(session, packet, db).await,
        SID_ENTERCHAT => handle_enterchat(session, packet),
        SID_CHATCOMMAND => handle_chat_command(session, packet),
        SID_PING => handle_ping(session, packet),
        other => {
            session.request_close();
            Err(Error::ProtocolError(ProtocolError::UnknownOpcode(other)))
        }
    }
}

/// `CONNECTED -> AUTH_CHECK_SENT`. Acks the ping, then immediately issues
/// the auth challenge the client must answer next.
fn handle_bncs_ping(session: &Session) -> Result<(), Error> {
    session.send_packet(Packet::empty(SID_BNCS_PING))?;

    let mut payload = ByteBuffer::new();
    payload.write_u32(session.server_token())?;
    payload.write_u32(CLIENT_VERSION)?;
    payload.write_u32(0)?; // exe hash
    payload.write_string("")?;
    session.send_packet(Packet::from_buffer(SID_AUTH_CHECK, payload))?;

    session.set_state(SessionState::AuthCheckSent);
    Ok(())
}

/// `AUTH_CHECK_SENT -> AUTH_CHECK_RECEIVED`. No database work; this is a
/// pure echo with two extra always-zero status fields.
fn handle_auth_check(session: &Session, packet: &Packet) -> Result<(), Error> {
    let mut r = packet.reader();
    let client_token = r.read_u32()?;
    let exe_version = r.read_u32()?;
    let exe_hash = r.read_u32()?;
    let _owner = r.read_string()?;

    session.set_client_token(client_token);

    let mut payload = ByteBuffer::new();
    payload.write_u32(client_token)?;
    payload.write_u32(exe_version)?;
    payload.write_u32(exe_hash)?;
    payload.write_u32(0)?; // key_status
    payload.write_u32(0)?; // account_status
    session.send_packet(Packet::from_buffer(SID_AUTH_CHECK, payload))?;

    session.set_state(SessionState::AuthCheckReceived);
    Ok(())
}

/// `AUTH_CHECK_RECEIVED -> AUTH_INFO_RECEIVED`. Looks the account up by
/// lower-cased username; replies with a real or fake SRP challenge that are
/// indistinguishable in shape, so timing/shape never leaks whether the
/// account exists.
async fn handle_auth_info(session: &Session, packet: &Packet, db: &Pool) -> Result<(), Error> {
    let mut r = packet.reader();
    let client_token = r.read_u32()?;
    let _exe_version = r.read_u32()?;
    let _exe_hash = r.read_u32()?;
    let origin_username = r.read_string()?;

    session.set_client_token(client_token);
    session.set_user_name(origin_username.clone());
    let lower_username = origin_username.to_lowercase();

    let found = db.select_account_by_username(&lower_username).await?;

    let b_pub_hex = {
        let mut srp = session.srp();
        match found {
            Some(account) => {
                let salt = hex::decode(&account.salt).unwrap_or_default();
                let verifier = num_bigint::BigUint::parse_bytes(account.verifier.as_bytes(), 16)
                    .unwrap_or_default();
                srp.load_verifier(salt, verifier);
                srp.generate_server_ephemeral();
                session.set_in_db(true);
            }
            None => {
                srp.generate_fake_challenge();
                session.set_in_db(false);
            }
        }
        srp.b_pub_hex().expect("ephemeral was just generated")
    };

    let salt_hex = {
        let srp = session.srp();
        hex::encode(srp.salt())
    };

    let mut payload = ByteBuffer::new();
    payload.write_string(&salt_hex)?;
    payload.write_string(&b_pub_hex)?;
    session.send_packet(Packet::from_buffer(SID_LOGON_CHALLENGE, payload))?;

    session.set_state(SessionState::AuthInfoReceived);
    Ok(())
}

/// `AUTH_INFO_RECEIVED -> LOGGED_IN` on success, `CLOSED` on failure.
///
/// For an account that did not already exist, the proof is not checked
/// cryptographically: there is no genuine verifier to check it against yet,
/// only the fake one minted in `handle_auth_info`. Per `SPEC_FULL.md` §9
/// this is treated as first-seen auto-registration — the fake challenge's
/// own `(salt, v)` becomes the permanent account record, and the first
/// proof is accepted unconditionally. This matches the "tautological by
/// construction" behavior called out there rather than inventing a stronger
/// check the original system never had.
async fn handle_logon_proof(session: &Session, packet: &Packet, db: &Pool) -> Result<(), Error> {
    let mut r = packet.reader();
    let a_hex = r.read_string()?;
    let m1_hex = r.read_string()?;

    let process_result = session.srp().process_client_public(&a_hex);
    if process_result.is_err() {
        return fail_logon(session);
    }

    let was_in_db = session.is_in_db();
    let verified = if was_in_db {
        session.srp().verify_proof(&m1_hex).is_ok()
    } else {
        true
    };

    if !verified {
        return fail_logon(session);
    }

    if !was_in_db {
        let (lower_username, salt_hex, verifier_hex) = {
            let srp = session.srp();
            (
                session.user_name().to_lowercase(),
                hex::encode(srp.salt()),
                srp.verifier()
                    .map(|v| hex::encode(v.to_bytes_be()))
                    .unwrap_or_default(),
            )
        };

        if db.insert_account_by_username(&lower_username, &salt_hex, &verifier_hex).await.is_err() {
            return fail_logon(session);
        }
        session.set_in_db(true);
    }

    session.set_authenticated(true);
    session.set_state(SessionState::LoggedIn);
    session.send_packet(Packet::new(SID_LOGON_PROOF, vec![AuthProofCode::Success.into()]))?;
    Ok(())
}

fn fail_logon(session: &Session) -> Result<(), Error> {
    session.send_packet(Packet::new(SID_LOGON_PROOF, vec![AuthProofCode::Fail.into()]))?;
    session.request_close();
    Err(Error::AuthFailed(AuthError::ProofMismatch))
}

/// Stays in `LOGGED_IN`; replies with the account name only.
fn handle_enterchat(session: &Session, packet: &Packet) -> Result<(), Error> {
    let mut r = packet.reader();
    let account = r.read_string()?;
    let channel = r.read_string()?;
    log::info!("session {}: {account} entering channel {channel}", session.id.0);

    let mut payload = ByteBuffer::new();
    payload.write_string(&account)?;
    session.send_packet(Packet::from_buffer(SID_ENTERCHAT, payload))
}

/// Logged only; no reply is defined for this opcode.
fn handle_chat_command(session: &Session, packet: &Packet) -> Result<(), Error> {
    let mut r = packet.reader();
    let command = r.read_string()?;
    log::debug!("session {}: chat command {command:?}", session.id.0);
    Ok(())
}

/// `SID_PING` while `LOGGED_IN`: echo the value back and reset the idle
/// timer (already reset by the caller on every frame, but this additionally
/// satisfies "on any explicit protocol ping" per `SPEC_FULL.md` §4.5).
fn handle_ping(session: &Session, packet: &Packet) -> Result<(), Error> {
    let mut r = packet.reader();
    let value = r.read_u32()?;
    let mut payload = ByteBuffer::new();
    payload.write_u32(value)?;
    session.send_packet(Packet::from_buffer(SID_PING, payload))
}
