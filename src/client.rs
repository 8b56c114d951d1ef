use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Credentials, Token, TokenCache, authenticate};
use crate::config::load_config;
use crate::control::CallControl;
use crate::error::AuthError;
use crate::query::DEFAULT_COLLECTION;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account name on the identity provider.
    pub user: String,
    pub password: String,
    /// Token endpoint, typically
    /// `https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token`.
    pub auth_url: String,
    /// OData product endpoint, typically
    /// `https://catalogue.dataspace.copernicus.eu/odata/v1/Products`.
    pub data_url: String,
    /// Whether the final archive fetch verifies TLS certificates.
    pub verify: bool,
}

/// Entry point to the catalog: search, authenticate, download.
///
/// Clones share one token cache.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) credentials: Credentials,

    pub(crate) timeout: Duration,
    pub(crate) max_redirects: usize,
    pub(crate) max_pages: usize,
    pub(crate) progress: bool,
    pub(crate) collection: Option<String>,

    pub(crate) http: HttpClient,
    pub(crate) tokens: Arc<TokenCache>,
}

impl Client {
    /// Creates a client from `COPERNICUS_USER` / `COPERNICUS_PASSWORD` and/or `.cdserc`.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `user`/`password` arguments
    /// - environment variables `COPERNICUS_USER` / `COPERNICUS_PASSWORD`
    /// - config file from `CDSE_RC` or `.cdserc`
    pub fn new(
        user: Option<String>,
        password: Option<String>,
        verify: Option<bool>,
    ) -> Result<Self> {
        let cfg = load_config(user, password, verify)?;
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: ClientConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .default_headers(base_headers())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            credentials: Credentials::new(cfg.user.clone(), cfg.password.clone()),
            config: cfg,
            timeout: Duration::from_secs(60),
            max_redirects: 10,
            max_pages: 100,
            progress: false,
            collection: Some(DEFAULT_COLLECTION.to_string()),
            http,
            tokens: Arc::new(TokenCache::new()),
        })
    }

    /// Per-request timeout; a caller deadline may shorten it further.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Upper bound on result pages fetched by one search.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Restricts searches to one collection; `None` searches every collection.
    pub fn with_collection(mut self, collection: Option<String>) -> Self {
        self.collection = collection;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A valid bearer token, from cache when possible.
    pub fn token(&self, control: &CallControl) -> Result<Token, AuthError> {
        self.tokens.get_or_refresh(&self.credentials, || {
            authenticate(
                &self.http,
                &self.config.auth_url,
                &self.credentials,
                self.timeout,
                control,
            )
        })
    }

    /// Builds the authorized session used for one download.
    ///
    /// `follow` selects the final-fetch flavour: redirects followed up to the
    /// configured limit and certificate checks governed by `verify`.
    pub(crate) fn session(&self, token: &Token, follow: bool) -> reqwest::Result<HttpClient> {
        let mut headers = base_headers();
        headers.insert(AUTHORIZATION, token.authorization().clone());

        let builder = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(self.timeout);
        let builder = if follow {
            // Archives can take far longer than one request timeout to stream.
            builder
                .timeout(None::<Duration>)
                .redirect(Policy::limited(self.max_redirects))
                .danger_accept_invalid_certs(!self.config.verify)
        } else {
            builder.redirect(Policy::none())
        };
        builder.build()
    }
}

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("cdse-fetch/{}", env!("CARGO_PKG_VERSION")))
            .unwrap_or(HeaderValue::from_static("cdse-fetch")),
    );
    headers
}
