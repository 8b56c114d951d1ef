use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::client::ClientConfig;

pub(crate) const DEFAULT_AUTH_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub(crate) const DEFAULT_DATA_URL: &str =
    "https://catalogue.dataspace.copernicus.eu/odata/v1/Products";

#[derive(Debug, Default)]
struct RcConfig {
    user: Option<String>,
    password: Option<String>,
    auth_url: Option<String>,
    data_url: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(
    user: Option<String>,
    password: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    let mut user = user.or_else(|| env_value("COPERNICUS_USER"));
    let mut password = password.or_else(|| env_value("COPERNICUS_PASSWORD"));
    let env_auth_url = env_value("CDSE_AUTH_URL");
    let env_data_url = env_value("CDSE_DATA_URL");

    let rc_candidates = rc_candidates();
    let mut file_verify: Option<bool> = None;
    let mut rc_auth_url = None;
    let mut rc_data_url = None;
    let mut rc_used: Option<&Path> = None;

    if user.is_none()
        || password.is_none()
        || env_auth_url.is_none()
        || env_data_url.is_none()
        || verify.is_none()
    {
        for rc_path in &rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;

                user = user.or(cfg.user);
                password = password.or(cfg.password);
                rc_auth_url = cfg.auth_url;
                rc_data_url = cfg.data_url;
                file_verify = cfg.verify;
                rc_used = Some(rc_path.as_path());
                break;
            }
        }
    }

    let sources = |key: &str, var: &str| {
        if rc_candidates.is_empty() {
            format!("Missing configuration: {key} (set {var} or create .cdserc)")
        } else {
            format!(
                "Missing configuration: {key} (set {var} or put `{key}:` in one of: {})",
                rc_candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        }
    };

    let Some(user) = user else {
        bail!(sources("user", "COPERNICUS_USER"));
    };
    let Some(password) = password else {
        bail!(sources("password", "COPERNICUS_PASSWORD"));
    };

    // Final archive fetch skips certificate checks unless enabled.
    let verify = verify.or(file_verify).unwrap_or(false);

    let (auth_url, auth_from) = resolve_endpoint(
        ("CDSE_AUTH_URL", env_auth_url),
        rc_auth_url.zip(rc_used),
        DEFAULT_AUTH_URL,
    );
    let (data_url, data_from) = resolve_endpoint(
        ("CDSE_DATA_URL", env_data_url),
        rc_data_url.zip(rc_used),
        DEFAULT_DATA_URL,
    );
    for (name, url, from) in [
        ("auth_url", &auth_url, &auth_from),
        ("data_url", &data_url, &data_from),
    ] {
        match from {
            EndpointSource::Default => debug!(%url, "{name} (default)"),
            other => info!(%url, source = %other, "{name} overridden"),
        }
    }

    Ok(ClientConfig {
        user,
        password,
        auth_url,
        data_url,
        verify,
    })
}

/// Where an endpoint URL came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EndpointSource {
    Env(&'static str),
    RcFile(PathBuf),
    Default,
}

impl std::fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env(var) => write!(f, "environment {var}"),
            Self::RcFile(path) => write!(f, "{}", path.display()),
            Self::Default => f.write_str("default"),
        }
    }
}

// Environment beats the rc file, which beats the built-in default.
fn resolve_endpoint(
    env: (&'static str, Option<String>),
    rc: Option<(String, &Path)>,
    default: &str,
) -> (String, EndpointSource) {
    match (env, rc) {
        ((var, Some(url)), _) => (url, EndpointSource::Env(var)),
        (_, Some((url, path))) => (url, EndpointSource::RcFile(path.to_path_buf())),
        _ => (default.to_string(), EndpointSource::Default),
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // Support formatting where `password:` is on one line and the value is on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') {
                set_rc_value(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            match k {
                "user" | "password" | "auth_url" | "data_url" => {
                    if v.is_empty() {
                        pending_key = Some(k);
                    } else {
                        set_rc_value(&mut cfg, k, v);
                    }
                }
                "verify" => {
                    if !v.is_empty() {
                        cfg.verify = Some(v != "0");
                    }
                }
                _ => {}
            }
        }
    }

    cfg
}

fn set_rc_value(cfg: &mut RcConfig, key: &str, value: &str) {
    let value = Some(value.to_string());
    match key {
        "user" => cfg.user = value,
        "password" => cfg.password = value,
        "auth_url" => cfg.auth_url = value,
        "data_url" => cfg.data_url = value,
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) CDSE_RC (explicit)
    // 2) ./.cdserc
    // 3) ~/.cdserc
    if let Ok(p) = std::env::var("CDSE_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".cdserc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".cdserc"));
    }
    v
}
