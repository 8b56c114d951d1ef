use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Why an in-flight operation was abandoned before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("cancelled")]
    Cancelled,
}

/// A query could not be constructed from the caller's input.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid date {value:?} (expected YYYY-MM-DD): {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Token issuance failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("authenticate token creation failed (HTTP {status}): {detail}")]
    Status { status: u16, detail: String },

    #[error("token response did not contain an access token: {0}")]
    MalformedResponse(String),

    #[error("authentication {0}")]
    Interrupted(#[from] Interrupted),
}

/// The catalog query did not produce a usable result page.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("catalog request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("catalog search failed (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    #[error("catalog pagination revisited {url}")]
    PaginationLoop { url: String },

    #[error("catalog returned more than {limit} page(s)")]
    TooManyPages { limit: usize },

    #[error("failed to parse catalog response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("search {0}")]
    Interrupted(#[from] Interrupted),
}

impl SearchError {
    /// HTTP status of a rejected search, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A single product transfer failed. Every variant names the product identifier.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Error download {identifier}: {source}")]
    Auth {
        identifier: String,
        #[source]
        source: AuthError,
    },

    #[error("Error download {identifier}: request to {url} failed: {source}")]
    Transport {
        identifier: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Error download {identifier}: HTTP {status} from {url}")]
    Status {
        identifier: String,
        url: String,
        status: u16,
    },

    #[error("Error download {identifier}: identifier is not a plain file name")]
    InvalidIdentifier { identifier: String },

    #[error("Error download {identifier}: more than {limit} redirect(s)")]
    TooManyRedirects { identifier: String, limit: usize },

    #[error("Error download {identifier}: redirect from {url} without a usable Location header")]
    MissingLocation { identifier: String, url: String },

    #[error("Error download {identifier}: cannot write {}: {source}", path.display())]
    Io {
        identifier: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error download {identifier}: {reason}")]
    Interrupted {
        identifier: String,
        reason: Interrupted,
    },
}

impl DownloadError {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Auth { identifier, .. }
            | Self::Transport { identifier, .. }
            | Self::Status { identifier, .. }
            | Self::InvalidIdentifier { identifier }
            | Self::TooManyRedirects { identifier, .. }
            | Self::MissingLocation { identifier, .. }
            | Self::Io { identifier, .. }
            | Self::Interrupted { identifier, .. } => identifier,
        }
    }

    pub(crate) fn interrupted(identifier: &str, reason: Interrupted) -> Self {
        Self::Interrupted {
            identifier: identifier.to_string(),
            reason,
        }
    }
}

/// Raster read/write failures.
#[cfg(feature = "gdal")]
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("GDAL error on {}: {source}", path.display())]
    Gdal {
        path: PathBuf,
        #[source]
        source: gdal::errors::GdalError,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} holds {len} pixel(s), expected {width}x{height}", path.display())]
    Shape {
        path: PathBuf,
        width: usize,
        height: usize,
        len: usize,
    },
}

// The identity provider answers {"error": ..., "error_description": ...};
// the catalog wraps messages in {"detail": ...} where detail may be a string or object.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ServerErrorResponse {
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
    #[serde(default)]
    pub(crate) detail: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// Best-effort human readable message out of a server error body.
pub(crate) fn server_detail(status: StatusCode, body: &str) -> String {
    if let Ok(e) = serde_json::from_str::<ServerErrorResponse>(body) {
        if let Some(desc) = e.error_description.as_deref().or(e.message.as_deref()) {
            return match e.error.as_deref() {
                Some(code) => format!("{code}: {desc}"),
                None => desc.to_string(),
            };
        }
        match e.detail {
            Some(serde_json::Value::String(s)) => return s,
            Some(serde_json::Value::Object(map)) => {
                if let Some(serde_json::Value::String(s)) = map.get("message") {
                    return s.clone();
                }
            }
            _ => {}
        }
        if let Some(code) = e.error {
            return code;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_body_is_summarised() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid user credentials"}"#;
        assert_eq!(
            server_detail(StatusCode::UNAUTHORIZED, body),
            "invalid_grant: Invalid user credentials"
        );
    }

    #[test]
    fn odata_detail_object_is_summarised() {
        let body = r#"{"detail":{"message":"Invalid filter expression","request_id":"x"}}"#;
        assert_eq!(
            server_detail(StatusCode::BAD_REQUEST, body),
            "Invalid filter expression"
        );
    }

    #[test]
    fn plain_body_falls_back_to_text_or_reason() {
        assert_eq!(
            server_detail(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "upstream down"
        );
        assert_eq!(
            server_detail(StatusCode::TOO_MANY_REQUESTS, ""),
            "Too Many Requests"
        );
    }

    #[test]
    fn download_error_names_identifier() {
        let err = DownloadError::TooManyRedirects {
            identifier: "S2A_MSIL2A_X".into(),
            limit: 3,
        };
        assert_eq!(err.identifier(), "S2A_MSIL2A_X");
        assert!(err.to_string().contains("S2A_MSIL2A_X"));
    }
}
