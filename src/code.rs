//! Steam's TOTP variant: a 30-second interval, HMAC-SHA1, and a 26-character
//! alphabet instead of the usual 6 decimal digits. Grounded directly in
//! `libr2fa/src/steam/token.rs::TwoFactorSecret::generate_code`, rewritten
//! against `crate::crypto::hmac_sha1` instead of `ring::hmac`.

use crate::config::TOTP_INTERVAL_MS;
use crate::crypto::hmac_sha1;
use crate::error::Error;

const STEAM_ALPHABET: [u8; 26] = *b"23456789BCDFGHJKMNPQRTVWXY";

/// Derives the 5-character Steam Guard code for `secret_key` at
/// `server_time_ms` (milliseconds since the Unix epoch, already adjusted for
/// clock drift by the caller).
pub fn generate_code(secret_key: &[u8; 20], server_time_ms: i64) -> Result<String, Error> {
    let interval = (server_time_ms / TOTP_INTERVAL_MS) as u64;
    let mac = hmac_sha1(secret_key, &interval.to_be_bytes())?;

    let offset = (mac[19] & 0x0f) as usize;
    let mut value = (u32::from(mac[offset] & 0x7f) << 24)
        | (u32::from(mac[offset + 1]) << 16)
        | (u32::from(mac[offset + 2]) << 8)
        | u32::from(mac[offset + 3]);

    let mut code = [0u8; 5];
    for slot in &mut code {
        *slot = STEAM_ALPHABET[(value % 26) as usize];
        value /= 26;
    }

    Ok(String::from_utf8(code.to_vec()).expect("STEAM_ALPHABET is ASCII"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secret_from_base64(encoded: &str) -> [u8; 20] {
        let decoded = data_encoding::BASE64.decode(encoded.as_bytes()).unwrap();
        decoded.try_into().unwrap()
    }

    #[test]
    fn matches_the_spec_code_vector() {
        // secret b64 "cnNyY3NyY3NyY3NyY3NyY3NyY3M=", t=1234567890000 ->
        // interval 41152263.
        let secret = secret_from_base64("cnNyY3NyY3NyY3NyY3NyY3NyY3M=");
        let code = generate_code(&secret, 1_234_567_890_000).unwrap();
        assert_eq!(code, "XHQN7");
    }

    #[test]
    fn known_vector_is_stable() {
        let secret = [0u8; 20];
        let code = generate_code(&secret, 0).unwrap();
        assert_eq!(code.len(), 5);
        // Re-deriving at the same instant must reproduce the same code.
        assert_eq!(code, generate_code(&secret, 0).unwrap());
    }

    #[test]
    fn same_interval_yields_same_code() {
        let secret = secret_from_base64("wGwZx3sX5MmTxi6QgA3GiQ7Vp6E=".trim());
        let a = generate_code(&secret, 1_700_000_000_000);
        let b = generate_code(&secret, 1_700_000_000_000 + 29_000);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    proptest! {
        #[test]
        fn code_is_always_five_chars_from_the_alphabet(
            secret in proptest::array::uniform20(any::<u8>()),
            time_ms in 0i64..i64::MAX / 2,
        ) {
            let code = generate_code(&secret, time_ms).unwrap();
            prop_assert_eq!(code.len(), 5);
            for c in code.bytes() {
                prop_assert!(STEAM_ALPHABET.contains(&c));
            }
        }

        #[test]
        fn different_intervals_can_still_collide_but_same_interval_never_diverges(
            secret in proptest::array::uniform20(any::<u8>()),
            base_ms in 0i64..(i64::MAX / 2 - TOTP_INTERVAL_MS),
            jitter_ms in 0i64..TOTP_INTERVAL_MS,
        ) {
            let a = generate_code(&secret, base_ms).unwrap();
            let b = generate_code(&secret, base_ms + jitter_ms).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
