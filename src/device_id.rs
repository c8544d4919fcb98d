//! Android-style device identifiers, in the `android:<hex sha1>` shape Steam
//! expects in the `device_identifier` field of `AddAuthenticator`.

use data_encoding::HEXLOWER;

use crate::crypto;
use crate::error::Error;

pub(crate) fn build_device_id() -> Result<String, Error> {
    let random = crypto::random_bytes(4)?;
    let digest = crypto::sha1(&random);
    Ok(format!("android:{}", HEXLOWER.encode(&digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn device_id_matches_expected_shape() {
        let id = build_device_id().unwrap();
        assert!(id.starts_with("android:"));
        let hex = &id["android:".len()..];
        assert_eq!(hex.len(), 40);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn device_ids_are_not_constant() {
        let ids: HashSet<String> = (0..10_000).map(|_| build_device_id().unwrap()).collect();
        // Collisions across 4 random bytes are possible but vanishingly
        // unlikely at this sample size; a constant generator would fail hard.
        assert!(ids.len() > 9_900);
    }
}
