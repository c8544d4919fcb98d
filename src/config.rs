//! Endpoint URLs and protocol constants, centralized instead of scattered
//! through the driver the way `libr2fa`'s `steam_api.rs` scatters them across
//! `once_cell::sync::Lazy<Url>` statics.

pub(crate) const STEAM_COMMUNITY_BASE: &str = "https://steamcommunity.com";
pub(crate) const STEAM_API_BASE: &str = "https://api.steampowered.com";

pub(crate) const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 4.4.4; en-us; Nexus 4 Build/JOP40D) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/42.0.2307.2 Mobile Safari/537.36";
pub(crate) const MOBILE_REFERER: &str = "https://steamcommunity.com/mobilelogin";

pub(crate) const OAUTH_CLIENT_ID: &str = "DE45CD61";
pub(crate) const OAUTH_SCOPE: &str = "read_profile write_profile read_client write_client";

/// How long a failed time sync keeps [`crate::time_sync::TimeSync`] from
/// trying the network again.
pub(crate) const SYNC_COOLDOWN_MS: i64 = 5 * 60 * 1000;

/// Upper bound on FinalizeAddAuthenticator attempts before giving up.
pub(crate) const FINALIZE_MAX_RETRIES: u32 = 30;

/// The first finalize attempt is sent 40s behind the synced server time, then
/// walked forward 30s per retry, mirroring the drift window Steam's own
/// mobile client probes.
pub(crate) const FINALIZE_INITIAL_BACKOFF_MS: i64 = 40_000;
pub(crate) const FINALIZE_STEP_MS: i64 = 30_000;

pub(crate) const TOTP_INTERVAL_MS: i64 = 30_000;
