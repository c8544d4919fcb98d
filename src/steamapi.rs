//! Low-level Steam endpoint wrappers: request construction, response
//! deserialization, and the handful of custom deserializers Steam's JSON
//! needs (a stringified-JSON `oauth` field, `server_time` as either a string
//! or a number). Grounded in `libr2fa/src/steam/steam_api.rs` and its
//! `api_response/` DTOs.

use serde::{Deserialize, Deserializer};

use crate::config;
use crate::error::Error;
use crate::transport::{CookieJar, HttpTransport, Method};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SteamApiEnvelope<T> {
    pub response: T,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RsaResponse {
    pub success: bool,
    #[serde(default)]
    pub steamid: String,
    pub publickey_mod: String,
    pub publickey_exp: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OAuthData {
    pub oauth_token: String,
    #[serde(default)]
    pub steamid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LoginTransferParameters {
    pub steamid: String,
    pub token_secure: String,
    pub auth: String,
    #[serde(default)]
    pub webcookie: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub login_complete: bool,
    #[serde(default)]
    pub captcha_needed: bool,
    #[serde(default)]
    pub captcha_gid: String,
    #[serde(default)]
    pub emailauth_needed: bool,
    #[serde(default)]
    pub emaildomain: String,
    #[serde(default)]
    pub requires_twofactor: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "deserialize_optional_oauth")]
    pub oauth: Option<OAuthData>,
    #[serde(default)]
    pub transfer_urls: Option<Vec<String>>,
    #[serde(default)]
    pub transfer_parameters: Option<LoginTransferParameters>,
}

impl LoginResponse {
    pub(crate) fn needs_transfer_login(&self) -> bool {
        self.transfer_urls.is_some() || self.transfer_parameters.is_some()
    }
}

/// The Steam mobile `oauth` field is a JSON object encoded as a string
/// inside the outer JSON, so it needs a second parse pass.
fn deserialize_optional_oauth<'de, D>(deserializer: D) -> Result<Option<OAuthData>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(s) if !s.is_empty() => {
            let data = serde_json::from_str(&s).map_err(serde::de::Error::custom)?;
            Ok(Some(data))
        }
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AddAuthenticatorResponse {
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub revocation_code: String,
    #[serde(default)]
    pub server_time: u64,
    pub status: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FinalizeAddAuthenticatorResponse {
    pub status: i32,
    #[serde(default)]
    pub server_time: Option<u64>,
    #[serde(default)]
    pub want_more: bool,
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QueryTimeResponse {
    #[serde(deserialize_with = "deserialize_u64_flexible")]
    pub server_time: u64,
}

/// Steam returns `server_time` as a string from some endpoints and a number
/// from others; accept either, extending `libr2fa::steam::utils`'s
/// string-only `deserialize_u64_from_string`.
fn deserialize_u64_flexible<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("server_time number out of range")),
        serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        _ => Err(serde::de::Error::custom("server_time must be a number or string")),
    }
}

pub(crate) fn establish_session(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
) -> Result<(), Error> {
    transport.request(
        Method::Get,
        &format!("{}/login/home?goto=0", config::STEAM_COMMUNITY_BASE),
        &[],
        cookies,
    )?;
    Ok(())
}

pub(crate) fn get_rsa_key(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
    username: &str,
) -> Result<RsaResponse, Error> {
    let body = transport.request(
        Method::Post,
        &format!("{}/login/getrsakey", config::STEAM_COMMUNITY_BASE),
        &[("username", username)],
        cookies,
    )?;

    let parsed: RsaResponse = serde_json::from_str(&body)
        .map_err(|e| Error::invalid_response(format!("malformed getrsakey response: {e}")))?;

    if !parsed.success {
        return Err(Error::invalid_response(format!(
            "cannot get an RSA key for user {username}"
        )));
    }

    Ok(parsed)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn dologin(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
    username: &str,
    encrypted_password: &str,
    email_auth: &str,
    captcha_gid: &str,
    captcha_text: &str,
    email_steam_id: &str,
    rsa_timestamp: &str,
    donotcache: &str,
) -> Result<LoginResponse, Error> {
    let body = transport.request(
        Method::Post,
        &format!("{}/mobilelogin/dologin/", config::STEAM_COMMUNITY_BASE),
        &[
            ("password", encrypted_password),
            ("username", username),
            ("twofactorcode", ""),
            ("emailauth", email_auth),
            ("loginfriendlyname", "#login_emailauth_friendlyname_mobile"),
            ("captchagid", captcha_gid),
            ("captcha_text", captcha_text),
            ("emailsteamid", email_steam_id),
            ("rsatimestamp", rsa_timestamp),
            ("remember_login", "false"),
            ("oauth_client_id", config::OAUTH_CLIENT_ID),
            ("oauth_scope", config::OAUTH_SCOPE),
            ("donotache", donotcache),
        ],
        cookies,
    )?;

    serde_json::from_str(&body)
        .map_err(|e| Error::invalid_response(format!("malformed dologin response: {e}")))
}

pub(crate) fn transfer_login(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
    response: &LoginResponse,
) -> Result<OAuthData, Error> {
    let urls = response
        .transfer_urls
        .as_ref()
        .ok_or_else(|| Error::invalid_response("login response named no transfer_urls"))?;
    let params = response
        .transfer_parameters
        .as_ref()
        .ok_or_else(|| Error::invalid_response("login response named no transfer_parameters"))?;

    for url in urls {
        transport.request(
            Method::Post,
            url,
            &[
                ("steamid", params.steamid.as_str()),
                ("token_secure", params.token_secure.as_str()),
                ("auth", params.auth.as_str()),
                ("webcookie", params.webcookie.as_str()),
            ],
            cookies,
        )?;
    }

    Ok(OAuthData {
        oauth_token: params.auth.clone(),
        steamid: params.steamid.clone(),
    })
}

pub(crate) fn query_time(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
) -> Result<u64, Error> {
    let body = transport.request(
        Method::Post,
        &format!("{}/ITwoFactorService/QueryTime/v0001", config::STEAM_API_BASE),
        &[],
        cookies,
    )?;

    let envelope: SteamApiEnvelope<QueryTimeResponse> = serde_json::from_str(&body)
        .map_err(|e| Error::invalid_response(format!("malformed QueryTime response: {e}")))?;

    Ok(envelope.response.server_time)
}

/// Fire-and-forget presence handshake Steam's own mobile client sends before
/// provisioning a new authenticator. A failure here is not fatal to
/// enrollment.
pub(crate) fn presence_logon(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
    access_token: &str,
) -> Result<(), Error> {
    transport.request(
        Method::Post,
        &format!(
            "{}/ISteamWebUserPresenceOAuth/Logon/v0001",
            config::STEAM_API_BASE
        ),
        &[("access_token", access_token)],
        cookies,
    )?;
    Ok(())
}

/// Returns the parsed response alongside the raw body, since a response
/// missing `revocation_code` is reported back to the caller with the body
/// text rather than as an `Error`.
pub(crate) fn add_authenticator(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
    access_token: &str,
    steam_id: u64,
    device_id: &str,
) -> Result<(AddAuthenticatorResponse, String), Error> {
    let steam_id = steam_id.to_string();
    let body = transport.request(
        Method::Post,
        &format!("{}/ITwoFactorService/AddAuthenticator/v0001", config::STEAM_API_BASE),
        &[
            ("access_token", access_token),
            ("steamid", &steam_id),
            ("authenticator_type", "1"),
            ("device_identifier", device_id),
            ("sms_phone_id", "1"),
        ],
        cookies,
    )?;

    let envelope: SteamApiEnvelope<AddAuthenticatorResponse> = serde_json::from_str(&body)
        .map_err(|e| Error::invalid_response(format!("malformed AddAuthenticator response: {e}")))?;

    Ok((envelope.response, body))
}

pub(crate) fn finalize_add_authenticator(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
    access_token: &str,
    steam_id: u64,
    activation_code: &str,
    authenticator_code: &str,
    authenticator_time: u64,
) -> Result<FinalizeAddAuthenticatorResponse, Error> {
    let steam_id = steam_id.to_string();
    let authenticator_time = authenticator_time.to_string();
    let body = transport.request(
        Method::Post,
        &format!(
            "{}/ITwoFactorService/FinalizeAddAuthenticator/v0001",
            config::STEAM_API_BASE
        ),
        &[
            ("access_token", access_token),
            ("steamid", &steam_id),
            ("activation_code", activation_code),
            ("authenticator_code", authenticator_code),
            ("authenticator_time", &authenticator_time),
        ],
        cookies,
    )?;

    let envelope: SteamApiEnvelope<FinalizeAddAuthenticatorResponse> = serde_json::from_str(&body)
        .map_err(|e| {
            Error::invalid_response(format!("malformed FinalizeAddAuthenticator response: {e}"))
        })?;

    Ok(envelope.response)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EmailType {
    /// Sent right after `AddAuthenticator`, carrying the activation code.
    Activation,
    /// Sent once `FinalizeAddAuthenticator` succeeds.
    Confirmation,
}

/// Fires the (best-effort) email Steam sends at enrollment start and again
/// at completion. Neither call gates the state machine: a failure here
/// doesn't stop enrollment from proceeding.
pub(crate) fn send_email(
    transport: &dyn HttpTransport,
    cookies: &CookieJar,
    access_token: &str,
    steam_id: u64,
    email_type: EmailType,
) -> Result<(), Error> {
    let steam_id = steam_id.to_string();
    let mut form = vec![("access_token", access_token), ("steamid", steam_id.as_str())];
    match email_type {
        EmailType::Activation => {
            form.push(("email_type", "1"));
            form.push(("include_activation", "1"));
        }
        EmailType::Confirmation => form.push(("email_type", "2")),
    }

    transport.request(
        Method::Post,
        &format!("{}/ITwoFactorService/SendEmail/v0001", config::STEAM_API_BASE),
        &form,
        cookies,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn login_response_parses_the_stringified_oauth_field() {
        // Steam's `oauth` field is a JSON object re-encoded as a string, not
        // a nested object — this is the exact trap spec.md §9 calls out.
        let body = r#"{
            "success": true,
            "login_complete": true,
            "oauth": "{\"oauth_token\":\"abc123\",\"steamid\":\"76561197960287930\"}"
        }"#;

        let response: LoginResponse = serde_json::from_str(body).unwrap();

        assert!(response.login_complete);
        let oauth = response.oauth.expect("oauth field should have parsed");
        assert_eq!(oauth.oauth_token, "abc123");
        assert_eq!(oauth.steamid, "76561197960287930");
    }

    #[test]
    fn login_response_with_no_oauth_field_parses_to_none() {
        let body = r#"{"success": true}"#;
        let response: LoginResponse = serde_json::from_str(body).unwrap();
        assert!(response.oauth.is_none());
    }

    #[derive(Debug)]
    struct RecordingTransport {
        calls: RefCell<Vec<String>>,
    }

    impl HttpTransport for RecordingTransport {
        fn request(
            &self,
            _method: Method,
            url: &str,
            _form: &[(&str, &str)],
            _cookies: &CookieJar,
        ) -> Result<String, Error> {
            self.calls.borrow_mut().push(url.to_string());
            Ok(String::new())
        }
    }

    #[test]
    fn transfer_login_posts_to_every_transfer_url_and_builds_oauth_data() {
        let response = LoginResponse {
            success: true,
            login_complete: false,
            captcha_needed: false,
            captcha_gid: String::new(),
            emailauth_needed: false,
            emaildomain: String::new(),
            requires_twofactor: false,
            message: String::new(),
            oauth: None,
            transfer_urls: Some(vec![
                "https://store.steampowered.com/login/transfer".to_string(),
                "https://help.steampowered.com/login/transfer".to_string(),
            ]),
            transfer_parameters: Some(LoginTransferParameters {
                steamid: "76561197960287930".to_string(),
                token_secure: "sekrit".to_string(),
                auth: "the-oauth-token".to_string(),
                webcookie: "cookie".to_string(),
            }),
        };
        let transport = RecordingTransport { calls: RefCell::new(Vec::new()) };
        let cookies = CookieJar::new();

        let oauth = transfer_login(&transport, &cookies, &response).unwrap();

        assert_eq!(oauth.oauth_token, "the-oauth-token");
        assert_eq!(oauth.steamid, "76561197960287930");
        assert_eq!(transport.calls.borrow().len(), 2);
    }
}
