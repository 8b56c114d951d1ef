//! Password-grant authentication against the identity provider.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::Client as HttpClient;
use reqwest::header::HeaderValue;
use tracing::debug;

use crate::control::CallControl;
use crate::error::{AuthError, server_detail};

/// Public OAuth client registered for password grants.
pub const CLIENT_ID: &str = "cdse-public";

const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(600);
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Username and password; also the token cache key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token plus the instant after which it must not be reused.
#[derive(Clone)]
pub struct Token {
    value: String,
    header: HeaderValue,
    expires_at: Instant,
}

impl Token {
    /// Fails when `value` cannot be sent in an `Authorization` header.
    pub fn new(value: impl Into<String>, expires_at: Instant) -> Result<Self, AuthError> {
        let value = value.into();
        if value.is_empty() {
            return Err(AuthError::MalformedResponse("empty access_token".to_string()));
        }
        let mut header = HeaderValue::from_str(&format!("Bearer {value}")).map_err(|_| {
            AuthError::MalformedResponse("access_token is not a valid header value".to_string())
        })?;
        header.set_sensitive(true);
        Ok(Self {
            value,
            header,
            expires_at,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// `Bearer <token>`, marked sensitive.
    pub fn authorization(&self) -> &HeaderValue {
        &self.header
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges `credentials` for a bearer token.
pub(crate) fn authenticate(
    http: &HttpClient,
    auth_url: &str,
    credentials: &Credentials,
    timeout: Duration,
    control: &CallControl,
) -> Result<Token, AuthError> {
    let timeout = control.request_timeout(timeout)?;
    let form = [
        ("client_id", CLIENT_ID),
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
        ("grant_type", "password"),
    ];

    let requested_at = Instant::now();
    let resp = http
        .post(auth_url)
        .form(&form)
        .timeout(timeout)
        .send()
        .map_err(|source| AuthError::Transport {
            url: auth_url.to_string(),
            source,
        })?;

    let status = resp.status();
    let text = resp.text().map_err(|source| AuthError::Transport {
        url: auth_url.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(AuthError::Status {
            status: status.as_u16(),
            detail: server_detail(status, &text),
        });
    }

    let parsed: TokenResponse = serde_json::from_str(&text)
        .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
    let value = parsed
        .access_token
        .ok_or_else(|| AuthError::MalformedResponse("missing access_token".to_string()))?;

    let lifetime = token_lifetime(parsed.expires_in);
    debug!(user = %credentials.username, lifetime_secs = lifetime.as_secs(), "obtained access token");
    Token::new(value, requested_at + lifetime)
}

/// `expires_in` (or the default lifetime) less the expiry skew.
fn token_lifetime(expires_in: Option<u64>) -> Duration {
    expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME)
        .saturating_sub(EXPIRY_SKEW)
}

/// Tokens per credentials, refreshed lazily once expired.
///
/// The lock is held while a refresh is in flight so that concurrent
/// downloads wait for one token instead of each requesting their own.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<Credentials, Token>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token for `credentials`, or the result of `fetch` when absent or expired.
    pub fn get_or_refresh<F>(&self, credentials: &Credentials, fetch: F) -> Result<Token, AuthError>
    where
        F: FnOnce() -> Result<Token, AuthError>,
    {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = tokens.get(credentials) {
            if !token.is_expired() {
                return Ok(token.clone());
            }
            debug!(user = %credentials.username, "cached token expired");
        }

        let token = fetch()?;
        tokens.insert(credentials.clone(), token.clone());
        Ok(token)
    }

    pub fn invalidate(&self, credentials: &Credentials) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.remove(credentials);
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn creds(user: &str) -> Credentials {
        Credentials::new(user, "pw")
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn fresh_token_is_reused() {
        let cache = TokenCache::new();
        let calls = Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Token::new("t1", later())
        };

        let a = cache.get_or_refresh(&creds("u"), fetch).unwrap();
        let b = cache
            .get_or_refresh(&creds("u"), || panic!("should not refetch"))
            .unwrap();
        assert_eq!(a.value(), "t1");
        assert_eq!(b.value(), "t1");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn expired_token_is_refreshed() {
        let cache = TokenCache::new();
        cache
            .get_or_refresh(&creds("u"), || Token::new("old", Instant::now()))
            .unwrap();
        let t = cache
            .get_or_refresh(&creds("u"), || Token::new("new", later()))
            .unwrap();
        assert_eq!(t.value(), "new");
    }

    #[test]
    fn tokens_are_keyed_by_credentials() {
        let cache = TokenCache::new();
        cache.get_or_refresh(&creds("a"), || Token::new("ta", later())).unwrap();
        let b = cache.get_or_refresh(&creds("b"), || Token::new("tb", later())).unwrap();
        assert_eq!(b.value(), "tb");
        assert_eq!(cache.len(), 2);

        cache.invalidate(&creds("a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn changed_password_does_not_reuse_token() {
        let cache = TokenCache::new();
        let old = Credentials::new("u", "old-pw");
        let new = Credentials::new("u", "new-pw");
        cache.get_or_refresh(&old, || Token::new("t-old", later())).unwrap();
        let t = cache.get_or_refresh(&new, || Token::new("t-new", later())).unwrap();
        assert_eq!(t.value(), "t-new");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_refresh_is_not_cached() {
        let cache = TokenCache::new();
        let err = cache
            .get_or_refresh(&creds("u"), || {
                Err(AuthError::MalformedResponse("missing access_token".into()))
            })
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn token_must_be_a_valid_header_value() {
        assert!(matches!(
            Token::new("bad\ntoken", later()),
            Err(AuthError::MalformedResponse(_))
        ));
        assert!(Token::new("", later()).is_err());

        let t = Token::new("abc", later()).unwrap();
        assert_eq!(t.authorization().to_str().unwrap(), "Bearer abc");
        assert!(t.authorization().is_sensitive());
    }

    #[test]
    fn lifetime_is_expires_in_less_skew() {
        assert_eq!(token_lifetime(Some(600)), Duration::from_secs(570));
        assert_eq!(token_lifetime(Some(3600)), Duration::from_secs(3570));
        assert_eq!(token_lifetime(None), Duration::from_secs(570));
        assert_eq!(token_lifetime(Some(10)), Duration::ZERO);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let c = Credentials::new("user", "hunter2");
        assert!(!format!("{c:?}").contains("hunter2"));
        let t = Token::new("secret-token", Instant::now()).unwrap();
        assert!(!format!("{t:?}").contains("secret-token"));
    }
}
