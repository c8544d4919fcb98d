//! Cryptographic primitives used by the login and code-generation flows.
//!
//! Standardized on `hmac`+`sha1` rather than `ring`: the teacher mixes
//! `ring::hmac` in `steam/token.rs` with a separate `hmac`/`sha2`-based
//! `HMACType` in `hmac_type.rs`, which is the inconsistency this module
//! resolves by picking one.

use hmac::{Hmac, Mac};
use rand::RngCore;
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};
use sha1::{Digest, Sha1};

use crate::error::Error;

/// Encrypts `plaintext` with the RSA public key Steam hands back from
/// `/login/getrsakey`, matching `libr2fa`'s `encrypt_password`.
pub(crate) fn rsa_encrypt_pkcs1(
    modulus_hex: &str,
    exponent_hex: &str,
    plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
    let modulus = BigUint::parse_bytes(modulus_hex.as_bytes(), 16)
        .ok_or_else(|| Error::Crypto("malformed RSA modulus".to_string()))?;
    let exponent = BigUint::parse_bytes(exponent_hex.as_bytes(), 16)
        .ok_or_else(|| Error::Crypto("malformed RSA exponent".to_string()))?;
    let key = RsaPublicKey::new(modulus, exponent).map_err(|e| Error::Crypto(e.to_string()))?;

    key.encrypt(&mut rand::rngs::OsRng, Pkcs1v15Encrypt, plaintext)
        .map_err(|e| Error::Crypto(e.to_string()))
}

/// HMAC-SHA1 over `msg` with `key`, as used by the Steam TOTP variant.
pub(crate) fn hmac_sha1(key: &[u8], msg: &[u8]) -> Result<[u8; 20], Error> {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; 20];
    out.copy_from_slice(&result);
    Ok(out)
}

/// SHA1 digest of `msg`, used to derive the device ID.
pub(crate) fn sha1(msg: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(msg);
    let result = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&result);
    out
}

/// `n` cryptographically random bytes from the OS RNG.
pub(crate) fn random_bytes(n: usize) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha1_matches_known_vector() {
        // RFC 2202 test case 1.
        let key = [0x0bu8; 20];
        let mac = hmac_sha1(&key, b"Hi There").unwrap();
        assert_eq!(
            data_encoding::HEXLOWER.encode(&mac),
            "b617318655057264e28bc0b6fb378c8ef146be00"
        );
    }

    #[test]
    fn sha1_of_empty_input_matches_known_vector() {
        let digest = sha1(b"");
        assert_eq!(
            data_encoding::HEXLOWER.encode(&digest),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn random_bytes_returns_requested_length() {
        let bytes = random_bytes(16).unwrap();
        assert_eq!(bytes.len(), 16);
    }
}
