//! Minimal demo client: connects, runs the full handshake up to
//! `SID_ENTERCHAT`, then exits. Not hardened or feature-complete — it exists
//! to exercise the server end to end from outside the test suite, the same
//! role the teacher's own CLI demo/bench clients play.

use std::env;

use num_bigint::BigUint;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

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

async fn read_packet(stream: &mut TcpStream) -> std::io::Result<Packet> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Packet::deserialize(&body).expect("server sent a malformed frame"))
}

async fn send_packet(stream: &mut TcpStream, packet: Packet) -> std::io::Result<()> {
    stream.write_all(&packet.serialize()).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = env::args().nth(1).unwrap_or_else(|| "127.0.0.1:6112".to_string());
    let username = env::args().nth(2).unwrap_or_else(|| "demo".to_string());
    let password = env::args().nth(3).unwrap_or_else(|| "demo-password".to_string());

    let mut stream = TcpStream::connect(&addr).await?;
    println!("connected to {addr}");

    // Server opens with SID_AUTH_INFO; read and discard it.
    let _auth_info = read_packet(&mut stream).await?;

    send_packet(&mut stream, Packet::empty(SID_BNCS_PING)).await?;
    let _ping_ack = read_packet(&mut stream).await?;
    let auth_check_challenge = read_packet(&mut stream).await?;
    let mut r = auth_check_challenge.reader();
    let server_token = r.read_u32()?;

    let mut check_payload = ByteBuffer::new();
    check_payload.write_u32(1)?; // client_token
    check_payload.write_u32(17085)?; // exe_version
    check_payload.write_u32(0)?; // exe_hash
    check_payload.write_string(&username)?;
    send_packet(&mut stream, Packet::from_buffer(SID_AUTH_CHECK, check_payload)).await?;
    let _auth_check_ack = read_packet(&mut stream).await?;

    let mut info_payload = ByteBuffer::new();
    info_payload.write_u32(1)?; // client_token
    info_payload.write_u32(17085)?;
    info_payload.write_u32(0)?;
    info_payload.write_string(&username)?;
    send_packet(&mut stream, Packet::from_buffer(SID_AUTH_INFO, info_payload)).await?;
    let _ = server_token;

    let challenge = read_packet(&mut stream).await?;
    let mut r = challenge.reader();
    let salt_hex = r.read_string()?;
    let b_hex = r.read_string()?;
    let salt = hex::decode(&salt_hex)?;
    let b_pub = BigUint::parse_bytes(b_hex.as_bytes(), 16).ok_or("bad B from server")?;

    let mut a_priv_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut a_priv_bytes);
    let a_priv = BigUint::from_bytes_be(&a_priv_bytes);
    let a_pub = g().modpow(&a_priv, &n());

    let inner = sha1(&[format!("{username}:{password}").as_bytes()]);
    let x_hash = sha1(&[&salt, &inner]);
    let x = BigUint::from_bytes_be(&x_hash);

    let u_hash = sha1(&[&a_pub.to_bytes_be(), &b_pub.to_bytes_be()]);
    let u = BigUint::from_bytes_be(&u_hash);

    let modulus = n();
    let gx = g().modpow(&x, &modulus);
    let base = (&b_pub + &modulus - gx) % &modulus;
    let exp = &a_priv + (&u * &x);
    let session_key = base.modpow(&exp, &modulus);

    let m1 = sha1(&[&a_pub.to_bytes_be(), &b_pub.to_bytes_be(), &session_key.to_bytes_be()]);

    let mut proof_payload = ByteBuffer::new();
    proof_payload.write_string(&hex::encode(a_pub.to_bytes_be()))?;
    proof_payload.write_string(&hex::encode(m1))?;
    send_packet(&mut stream, Packet::from_buffer(SID_LOGON_PROOF, proof_payload)).await?;

    let proof_reply = read_packet(&mut stream).await?;
    let code = proof_reply.payload.first().copied().unwrap_or(0xFF);
    if code != AuthProofCode::Success as u8 {
        return Err(format!("logon proof failed, code {code:#04x}").into());
    }
    println!("authenticated as {username}");

    let mut enter_payload = ByteBuffer::new();
    enter_payload.write_string(&username)?;
    enter_payload.write_string("lobby")?;
    send_packet(&mut stream, Packet::from_buffer(SID_ENTERCHAT, enter_payload)).await?;
    let entered = read_packet(&mut stream).await?;
    println!("entered chat as {}", entered.reader().read_string()?);

    Ok(())
}
