use reqwest::{StatusCode, Url};
use std::path::{Component, Path};

/// Redirect codes the archive service is known to answer with.
pub(crate) fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307)
}

/// Resolves a `Location` header against the URL that produced it.
pub(crate) fn urljoin(base: &str, location: &str) -> Option<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Some(location.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(location).ok().map(String::from)
}

/// `<data endpoint>(<product id>)/$value`
pub(crate) fn product_value_url(data_url: &str, product_id: &str) -> String {
    format!("{}({})/$value", data_url.trim_end_matches('/'), product_id)
}

/// Scene identifier: the product name up to its first `.`.
pub fn identifier_from_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// True when `identifier` is exactly one normal path component.
pub(crate) fn is_plain_file_name(identifier: &str) -> bool {
    if identifier.is_empty() || identifier.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(identifier).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
