//! Server-side SRP-6 handshake algebra.
//!
//! Pinned to SHA-1 and the RFC 5054 1024-bit group exactly as the original
//! BNCS-style source does, to preserve wire compatibility with an existing
//! client (see `SPEC_FULL.md` §9). `M1 = H(A ∥ B ∥ S)`, which is the simpler
//! proof formula this protocol uses — not the RFC 5054 "full" M1 that also
//! folds in `H(N) xor H(g)`, a username hash, and the salt.

use num_bigint::BigUint;
use num_traits::Zero;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::errors::AuthError;

/// RFC 5054's 1024-bit group modulus.
const N_HEX: &str = concat!(
    "EEAF0AB9ADB38DD69C33F80AFA8FC5E86072618775FF3C0B9EA2314C9C25657",
    "6D674DF7496EA81D3383B4813D692C6E0E0D5D8E250B98BE48E495C1D6089DA",
    "D15DC7D7B46154D6B6CE8EF4AD69B15D4982559B297BCF1885C529F566660E5",
    "7EC68EDBC3C05726CC02FD4CBF4976EAA9AFD5138FE8376435B9FC61D2FC0EB",
    "06E3",
);
const G: u64 = 2;

fn n() -> BigUint {
    BigUint::parse_bytes(N_HEX.as_bytes(), 16).expect("N_HEX is a valid hex literal")
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

fn big_from_hex(s: &str) -> Option<BigUint> {
    BigUint::parse_bytes(s.as_bytes(), 16)
}

fn big_to_hex(v: &BigUint) -> String {
    hex::encode(v.to_bytes_be())
}

fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rng().fill_bytes(&mut buf);
    buf
}

fn random_biguint(bits: usize) -> BigUint {
    BigUint::from_bytes_be(&random_bytes(bits / 8))
}

/// Constant-time equality over two equal-length byte slices. Returns `false`
/// (never panics) if the lengths differ, since a length mismatch already
/// means "not equal" and must not be used to infer anything about contents.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Per-session SRP-6 server state.
#[derive(Debug, Default)]
pub struct Srp {
    v: Option<BigUint>,
    b: Option<BigUint>,
    b_pub: Option<BigUint>,
    a_pub: Option<BigUint>,
    session_key: Option<BigUint>,
    salt: Vec<u8>,
}

impl Srp {
    pub fn new() -> Self {
        Srp::default()
    }

    /// `x = H(salt ∥ H(username ":" password))`; `v = g^x mod N`.
    /// Returns the salt and verifier to persist for this account.
    pub fn generate_verifier(username: &str, password: &str) -> (Vec<u8>, BigUint) {
        let salt = random_bytes(16);
        let inner = sha1(&[format!("{username}:{password}").as_bytes()]);
        let x_hash = sha1(&[&salt, &inner]);
        let x = BigUint::from_bytes_be(&x_hash);
        let v = g().modpow(&x, &n());
        (salt, v)
    }

    /// Loads a previously-persisted verifier for a known account.
    pub fn load_verifier(&mut self, salt: Vec<u8>, v: BigUint) {
        self.salt = salt;
        self.v = Some(v);
    }

    /// `b` random (≥256 bits); `B = g^b mod N`. Returns `B`.
    pub fn generate_server_ephemeral(&mut self) -> BigUint {
        let b = random_biguint(256);
        let b_pub = g().modpow(&b, &n());
        self.b = Some(b);
        self.b_pub = Some(b_pub.clone());
        b_pub
    }

    /// Produces a random salt and a random (fake) verifier, then a plausible
    /// `B`, so an unknown username is indistinguishable on the wire from a
    /// known one (same field shapes, same cost).
    pub fn generate_fake_challenge(&mut self) -> (Vec<u8>, BigUint) {
        let salt = random_bytes(16);
        let v = random_biguint(256) % n();
        self.salt = salt.clone();
        self.v = Some(v.clone());
        let b_pub = self.generate_server_ephemeral();
        (salt, b_pub)
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn b_pub_hex(&self) -> Option<String> {
        self.b_pub.as_ref().map(big_to_hex)
    }

    pub fn verifier(&self) -> Option<&BigUint> {
        self.v.as_ref()
    }

    /// `u = H(A ∥ B)`; `S = (A · v^u)^b mod N`. Fails `InvalidPublicValue` if
    /// `A mod N == 0` (the standard SRP safeguard against a malicious
    /// zero-key attack).
    pub fn process_client_public(&mut self, a_pub_hex: &str) -> Result<(), AuthError> {
        let a_pub = big_from_hex(a_pub_hex).ok_or(AuthError::InvalidPublicValue)?;
        let modulus = n();
        if &a_pub % &modulus == BigUint::zero() {
            return Err(AuthError::InvalidPublicValue);
        }
        let b_pub = self.b_pub.clone().ok_or(AuthError::InvalidPublicValue)?;
        let b = self.b.clone().ok_or(AuthError::InvalidPublicValue)?;
        let v = self.v.clone().ok_or(AuthError::InvalidPublicValue)?;

        let u_hash = sha1(&[&a_pub.to_bytes_be(), &b_pub.to_bytes_be()]);
        let u = BigUint::from_bytes_be(&u_hash);

        let v_u = v.modpow(&u, &modulus);
        let base = (&a_pub * &v_u) % &modulus;
        let s = base.modpow(&b, &modulus);

        self.a_pub = Some(a_pub);
        self.session_key = Some(s);
        Ok(())
    }

    /// `M1 = H(A ∥ B ∥ S)`, compared constant-time against the claimed hex
    /// value. Every failure path returns the same `ProofMismatch` variant so
    /// callers cannot distinguish "unknown account" from "wrong password".
    pub fn verify_proof(&self, claimed_m1_hex: &str) -> Result<(), AuthError> {
        let a_pub = self.a_pub.as_ref().ok_or(AuthError::ProofMismatch)?;
        let b_pub = self.b_pub.as_ref().ok_or(AuthError::ProofMismatch)?;
        let s = self.session_key.as_ref().ok_or(AuthError::ProofMismatch)?;

        let expected = sha1(&[
            &a_pub.to_bytes_be(),
            &b_pub.to_bytes_be(),
            &s.to_bytes_be(),
        ]);
        let claimed = hex::decode(claimed_m1_hex).map_err(|_| AuthError::ProofMismatch)?;

        if constant_time_eq(&expected, &claimed) {
            Ok(())
        } else {
            Err(AuthError::ProofMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mirrors the client-side derivation: given `(N, g, salt, A-priv)` and
    /// the server's `B`, compute `A`, `S`, and `M1` the same way a
    /// standards-compliant SRP-6 client would.
    struct ClientSrp {
        a_priv: BigUint,
    }

    impl ClientSrp {
        fn new() -> Self {
            ClientSrp {
                a_priv: random_biguint(256),
            }
        }

        fn a_pub(&self) -> BigUint {
            g().modpow(&self.a_priv, &n())
        }

        fn m1_hex(&self, username: &str, password: &str, salt: &[u8], b_pub: &BigUint) -> String {
            let inner = sha1(&[format!("{username}:{password}").as_bytes()]);
            let x_hash = sha1(&[salt, &inner]);
            let x = BigUint::from_bytes_be(&x_hash);

            let a_pub = self.a_pub();
            let u_hash = sha1(&[&a_pub.to_bytes_be(), &b_pub.to_bytes_be()]);
            let u = BigUint::from_bytes_be(&u_hash);

            let modulus = n();
            let gx = g().modpow(&x, &modulus);
            let base = (b_pub + &modulus - gx) % &modulus;
            let exp = &self.a_priv + (&u * &x);
            let s = base.modpow(&exp, &modulus);

            let m1 = sha1(&[
                &a_pub.to_bytes_be(),
                &b_pub.to_bytes_be(),
                &s.to_bytes_be(),
            ]);
            hex::encode(m1)
        }
    }

    #[test]
    fn known_account_round_trip_succeeds() {
        let (salt, v) = Srp::generate_verifier("alice", "pw");

        let mut server = Srp::new();
        server.load_verifier(salt.clone(), v);
        let b_pub = server.generate_server_ephemeral();

        let client = ClientSrp::new();
        let a_pub_hex = big_to_hex(&client.a_pub());
        server.process_client_public(&a_pub_hex).unwrap();

        let m1_hex = client.m1_hex("alice", "pw", &salt, &b_pub);
        assert!(server.verify_proof(&m1_hex).is_ok());
    }

    #[test]
    fn wrong_password_fails() {
        let (salt, v) = Srp::generate_verifier("carol", "pw");

        let mut server = Srp::new();
        server.load_verifier(salt.clone(), v);
        let b_pub = server.generate_server_ephemeral();

        let client = ClientSrp::new();
        let a_pub_hex = big_to_hex(&client.a_pub());
        server.process_client_public(&a_pub_hex).unwrap();

        let m1_hex = client.m1_hex("carol", "wrong", &salt, &b_pub);
        assert_eq!(server.verify_proof(&m1_hex), Err(AuthError::ProofMismatch));
    }

    #[test]
    fn fake_challenge_has_same_shape_as_real_one() {
        let (real_salt, v) = Srp::generate_verifier("dave", "pw");
        let mut real = Srp::new();
        real.load_verifier(real_salt, v);
        let real_b = real.generate_server_ephemeral();

        let mut fake = Srp::new();
        let (fake_salt, fake_b) = fake.generate_fake_challenge();

        assert_eq!(fake_salt.len(), 16);
        assert_eq!(big_to_hex(&real_b).len(), big_to_hex(&fake_b).len());
    }

    #[test]
    fn rejects_zero_public_value() {
        let (salt, v) = Srp::generate_verifier("eve", "pw");
        let mut server = Srp::new();
        server.load_verifier(salt, v);
        server.generate_server_ephemeral();
        assert_eq!(
            server.process_client_public("00"),
            Err(AuthError::InvalidPublicValue)
        );
    }
}
