use crate::error_response::{ErrorResponse, ErrorResponseType};
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};

/// Generates a random alphanumeric string of the given length. Used for CSRF tokens,
/// API key secrets and session identifiers (at 256 bits of entropy for the latter, per
/// the caller passing a suitably large `len`).
pub fn get_rand(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// 32 random bytes, used directly as a session identifier (256 bits).
pub fn get_rand_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Encrypts `plain` with ChaCha20-Poly1305 under `key`, prepending the nonce to the
/// returned ciphertext so `decrypt` is self-contained.
pub fn encrypt(plain: &[u8], key: &[u8]) -> Result<Vec<u8>, ErrorResponse> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| {
        ErrorResponse::new(ErrorResponseType::Internal, "Invalid encryption key".to_string())
    })?;
    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ct = cipher.encrypt(nonce, plain).map_err(|_| {
        ErrorResponse::new(ErrorResponseType::Internal, "Encryption failed".to_string())
    })?;

    let mut out = nonce_bytes.to_vec();
    out.append(&mut ct);
    Ok(out)
}

pub fn decrypt(enc: &[u8], key: &[u8]) -> Result<Vec<u8>, ErrorResponse> {
    if enc.len() < 12 {
        return Err(ErrorResponse::new(
            ErrorResponseType::Internal,
            "Ciphertext too short".to_string(),
        ));
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| {
        ErrorResponse::new(ErrorResponseType::Internal, "Invalid encryption key".to_string())
    })?;
    let (nonce_bytes, ct) = enc.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher.decrypt(nonce, ct).map_err(|_| {
        ErrorResponse::new(ErrorResponseType::Internal, "Decryption failed".to_string())
    })
}

pub fn base64_url_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn base64_url_no_pad_decode(s: &str) -> Result<Vec<u8>, ErrorResponse> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| {
            ErrorResponse::new(ErrorResponseType::BadRequest, "Invalid base64".to_string())
        })
}

/// Constant-time equality for secret comparisons (CSRF tokens, TOTP codes).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = get_rand_bytes(32);
        let plain = b"hello rauthy";
        let enc = encrypt(plain, &key).unwrap();
        assert_ne!(enc[12..], plain[..]);
        let dec = decrypt(&enc, &key).unwrap();
        assert_eq!(dec, plain);
    }

    #[test]
    fn constant_time_eq_matches() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
