//! End-to-end handshake tests driven against a real `TcpListener` on an
//! ephemeral port, backed by [`bncs_lobbyd::db::Pool::connect_in_memory`] so
//! the suite needs no external Postgres instance.

use std::time::Duration;

use num_bigint::BigUint;
use rand::RngCore;
use serial_test::serial;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use bncs_lobbyd::config::Settings;
use bncs_lobbyd::db::Pool;
use bncs_lobbyd::server::Server;
use bncs_lobbyd::wire::buffer::ByteBuffer;
use bncs_lobbyd::wire::opcodes::*;
use bncs_lobbyd::wire::packet::Packet;

const N_HEX: &str = concat!(
    "EEAF0AB9ADB38DD69C33F80AFA8FC5E86072618775FF3C0B9EA2314C9C25657",
    "6D674DF7496EA81D3383B4813D692C6E0E0D5D8E250B98BE48E495C1D6089DA",
    "D15DC7D7B46154D6B6CE8EF4AD69B15D4982559B297BCF1885C529F566660E5",
    "7EC68EDBC3C05726CC02FD4CBF4976EAA9AFD5138FE8376435B9FC61D2FC0EB",
    "06E3",
);
const G: u64 = 2;

fn n() -> BigUint {
    BigUint::parse_bytes(N_HEX.as_bytes(), 16).unwrap()
}
fn g() -> BigUint {
    BigUint::from(G)
}
fn sha1(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn client_m1(username: &str, password: &str, salt: &[u8], b_pub: &BigUint, a_priv: &BigUint) -> (BigUint, String) {
    let a_pub = g().modpow(a_priv, &n());
    let inner = sha1(&[format!("{username}:{password}").as_bytes()]);
    let x_hash = sha1(&[salt, &inner]);
    let x = BigUint::from_bytes_be(&x_hash);

    let u_hash = sha1(&[&a_pub.to_bytes_be(), &b_pub.to_bytes_be()]);
    let u = BigUint::from_bytes_be(&u_hash);

    let modulus = n();
    let gx = g().modpow(&x, &modulus);
    let base = (b_pub + &modulus - gx) % &modulus;
    let exp = a_priv + (&u * &x);
    let s = base.modpow(&exp, &modulus);

    let m1 = sha1(&[&a_pub.to_bytes_be(), &b_pub.to_bytes_be(), &s.to_bytes_be()]);
    (a_pub, hex::encode(m1))
}

async fn read_packet(stream: &mut TcpStream) -> Packet {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.expect("read frame length");
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.expect("read frame body");
    Packet::deserialize(&body).expect("valid frame body")
}

async fn send_packet(stream: &mut TcpStream, packet: Packet) {
    stream.write_all(&packet.serialize()).await.expect("write frame");
}

async fn start_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>, tokio::sync::oneshot::Sender<()>) {
    let mut settings = Settings::default();
    settings.listen_addr = "127.0.0.1:0".to_string();
    settings.ping_timeout_secs = 5;

    let (server, listener) = Server::bind_with_pool(&settings, Pool::connect_in_memory()).expect("server binds");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await;
    });
    (addr, handle, tx)
}

async fn do_handshake(stream: &mut TcpStream, username: &str, password: &str) -> Packet {
    let _auth_info = read_packet(stream).await;

    send_packet(stream, Packet::empty(SID_BNCS_PING)).await;
    let _ping_ack = read_packet(stream).await;
    let _auth_check_challenge = read_packet(stream).await;

    let mut check_payload = ByteBuffer::new();
    check_payload.write_u32(1).unwrap();
    check_payload.write_u32(17085).unwrap();
    check_payload.write_u32(0).unwrap();
    check_payload.write_string(username).unwrap();
    send_packet(stream, Packet::from_buffer(SID_AUTH_CHECK, check_payload)).await;
    let _auth_check_ack = read_packet(stream).await;

    let mut info_payload = ByteBuffer::new();
    info_payload.write_u32(1).unwrap();
    info_payload.write_u32(17085).unwrap();
    info_payload.write_u32(0).unwrap();
    info_payload.write_string(username).unwrap();
    send_packet(stream, Packet::from_buffer(SID_AUTH_INFO, info_payload)).await;

    let challenge = read_packet(stream).await;
    let mut r = challenge.reader();
    let salt = hex::decode(r.read_string().unwrap()).unwrap();
    let b_pub = BigUint::parse_bytes(r.read_string().unwrap().as_bytes(), 16).unwrap();

    let mut a_priv_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut a_priv_bytes);
    let a_priv = BigUint::from_bytes_be(&a_priv_bytes);
    let (a_pub, m1_hex) = client_m1(username, password, &salt, &b_pub, &a_priv);

    let mut proof_payload = ByteBuffer::new();
    proof_payload.write_string(&hex::encode(a_pub.to_bytes_be())).unwrap();
    proof_payload.write_string(&m1_hex).unwrap();
    send_packet(stream, Packet::from_buffer(SID_LOGON_PROOF, proof_payload)).await;

    read_packet(stream).await
}

/// E2E-1: a fresh username completes the full handshake and reaches
/// `SID_ENTERCHAT` on its first ever connection (auto-registration).
#[tokio::test]
#[serial]
async fn fresh_account_completes_handshake_and_enters_chat() {
    let (addr, handle, shutdown_tx) = start_server().await;
    let username = "e2e-fresh-account";

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let proof_reply = do_handshake(&mut stream, username, "correct horse").await;
    assert_eq!(proof_reply.payload.first().copied(), Some(AuthProofCode::Success as u8));

    let mut enter_payload = ByteBuffer::new();
    enter_payload.write_string(username).unwrap();
    enter_payload.write_string("lobby").unwrap();
    send_packet(&mut stream, Packet::from_buffer(SID_ENTERCHAT, enter_payload)).await;
    let entered = read_packet(&mut stream).await;
    assert_eq!(entered.reader().read_string().unwrap(), username);

    drop(stream);
    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

/// E2E-3: an existing account presented with the wrong password fails the
/// proof and the connection is closed.
#[tokio::test]
#[serial]
async fn wrong_password_is_rejected() {
    let (addr, handle, shutdown_tx) = start_server().await;
    let username = "e2e-wrong-password";

    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let proof_reply = do_handshake(&mut stream, username, "right-password").await;
        assert_eq!(proof_reply.payload.first().copied(), Some(AuthProofCode::Success as u8));
    }

    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let proof_reply = do_handshake(&mut stream, username, "totally-wrong").await;
        assert_eq!(proof_reply.payload.first().copied(), Some(AuthProofCode::Fail as u8));

        let mut buf = [0u8; 1];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "expected EOF after a rejected proof");
    }

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

/// E2E-4: a declared frame length over the 1 MiB ceiling closes the
/// connection before any body bytes are read.
#[tokio::test]
#[serial]
async fn oversize_frame_closes_connection() {
    let (addr, handle, shutdown_tx) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _auth_info = read_packet(&mut stream).await;

    let oversize_len: u32 = 2 * 1024 * 1024;
    stream.write_all(&oversize_len.to_le_bytes()).await.unwrap();

    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "server must close rather than wait for an oversize body");

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}
