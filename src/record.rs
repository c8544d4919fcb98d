//! The fully enrolled authenticator and its on-disk persistence contract.

use std::sync::Mutex;

use data_encoding::HEXLOWER;
use secrecy::{ExposeSecret, Secret};
use zeroize::Zeroize;

use crate::clock::Clock;
use crate::code;
use crate::error::Error;
use crate::time_sync::TimeSync;

/// A Steam mobile authenticator that has finished enrollment and can
/// generate login codes.
///
/// `secret_key` is the only field that needs secrecy: `serial`/`device_id`/
/// `revocation_code` are identifiers, not cryptographic material.
#[derive(Debug)]
pub struct AuthenticatorRecord {
    secret_key: Secret<[u8; 20]>,
    pub serial: String,
    pub device_id: String,
    pub revocation_code: String,
    time_sync: Mutex<TimeSync>,
}

impl AuthenticatorRecord {
    pub(crate) fn new(
        secret_key: [u8; 20],
        serial: String,
        device_id: String,
        revocation_code: String,
        time_sync: TimeSync,
    ) -> Self {
        Self {
            secret_key: Secret::new(secret_key),
            serial,
            device_id,
            revocation_code,
            time_sync: Mutex::new(time_sync),
        }
    }

    /// Generates the current login code. When `resync` is true, syncs
    /// against Steam's server time first (subject to the synchronizer's own
    /// cooldown); when false, proceeds with whatever drift is already known
    /// (zero, i.e. local time, on first use).
    pub fn generate_code(
        &self,
        transport: &dyn crate::transport::HttpTransport,
        clock: &dyn Clock,
        resync: bool,
    ) -> Result<String, Error> {
        let mut time_sync = self.time_sync.lock().expect("time sync mutex poisoned");
        if resync {
            time_sync.sync(transport, clock);
        }
        code::generate_code(self.secret_key.expose_secret(), time_sync.server_time_ms(clock))
    }

    pub fn to_persisted(&self) -> PersistedAuthenticator {
        PersistedAuthenticator {
            base_secret: HEXLOWER.encode(self.secret_key.expose_secret()),
            serial: Some(self.serial.clone()),
            device_id: Some(self.device_id.clone()),
            revocation_code: Some(self.revocation_code.clone()),
        }
    }

    pub fn from_persisted(persisted: &PersistedAuthenticator) -> Result<Self, Error> {
        if persisted.base_secret.is_empty() {
            return Err(Error::NotEnrolled);
        }

        let raw = HEXLOWER
            .decode(persisted.base_secret.as_bytes())
            .map_err(|_| Error::invalid_response("base_secret is not valid lowercase hex"))?;
        let secret_key: [u8; 20] = raw
            .try_into()
            .map_err(|_| Error::invalid_response("base_secret must decode to 20 bytes"))?;

        Ok(Self::new(
            secret_key,
            persisted.serial.clone().unwrap_or_default(),
            persisted.device_id.clone().unwrap_or_default(),
            persisted.revocation_code.clone().unwrap_or_default(),
            TimeSync::new(),
        ))
    }
}

/// The on-disk shape of an [`AuthenticatorRecord`]: `base_secret` hex-encoded,
/// the rest pipe-separated and individually hex-encoded so an embedded `|`
/// can't corrupt the format. A missing trailing field decodes as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedAuthenticator {
    pub base_secret: String,
    pub serial: Option<String>,
    pub device_id: Option<String>,
    pub revocation_code: Option<String>,
}

impl PersistedAuthenticator {
    pub fn serialize(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.base_secret,
            hex_encode_opt(&self.serial),
            hex_encode_opt(&self.device_id),
            hex_encode_opt(&self.revocation_code),
        )
    }

    /// Empty input clears all fields; missing trailing fields decode as
    /// `None`.
    pub fn deserialize(input: &str) -> Self {
        if input.is_empty() {
            return Self::default();
        }

        let mut parts = input.split('|');
        let base_secret = parts.next().unwrap_or_default().to_string();
        let serial = parts.next().and_then(hex_decode_opt);
        let device_id = parts.next().and_then(hex_decode_opt);
        let revocation_code = parts.next().and_then(hex_decode_opt);

        Self {
            base_secret,
            serial,
            device_id,
            revocation_code,
        }
    }
}

impl Drop for PersistedAuthenticator {
    fn drop(&mut self) {
        self.base_secret.zeroize();
    }
}

fn hex_encode_opt(field: &Option<String>) -> String {
    match field {
        Some(value) => HEXLOWER.encode(value.as_bytes()),
        None => String::new(),
    }
}

fn hex_decode_opt(field: &str) -> Option<String> {
    if field.is_empty() {
        return None;
    }
    let decoded = HEXLOWER.decode(field.as_bytes()).ok()?;
    String::from_utf8(decoded).ok()
}
