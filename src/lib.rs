//! Core enrollment and TOTP code generation for Steam's mobile two-factor
//! authenticator.
//!
//! Two things live here: [`enroll::enroll`], the re-entrant state machine
//! that walks a new device through RSA-wrapped password login, authenticator
//! provisioning, and the drift-correcting finalize loop; and
//! [`record::AuthenticatorRecord`], what you're left with afterward, able to
//! generate login codes and persist itself to disk.
//!
//! ```no_run
//! use secrecy::SecretString;
//! use steamguard_core::{enroll, EnrollState, SystemClock, ReqwestTransport};
//!
//! let transport = ReqwestTransport::new();
//! let clock = SystemClock;
//! let mut state = EnrollState::new("username".to_string(), SecretString::new("password".to_string()));
//!
//! loop {
//!     let done = enroll(&mut state, &transport, &clock).unwrap();
//!     if done || !state.error.is_empty() {
//!         break;
//!     }
//!     if state.requires_captcha || state.requires_email_auth || state.requires_activation {
//!         break; // caller fills in the relevant EnrollState field and calls again
//!     }
//! }
//! ```

mod clock;
mod code;
mod config;
mod crypto;
mod device_id;
mod enroll;
pub mod error;
mod record;
mod steamapi;
mod time_sync;
mod transport;

pub use clock::{Clock, SystemClock};
pub use code::generate_code;
pub use enroll::{enroll, EnrollState};
pub use error::Error;
pub use record::{AuthenticatorRecord, PersistedAuthenticator};
pub use time_sync::TimeSync;
pub use transport::{CookieJar, HttpTransport, Method, ReqwestTransport};
