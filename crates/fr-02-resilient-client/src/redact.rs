//! URL redaction for logs.
//!
//! Provider credentials usually travel as query parameters, so only the
//! scheme, host, port and path are ever logged.

use url::Url;

pub fn redact_url(url: &Url) -> String {
    let mut out = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        out.push_str(host);
    }
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path());
    out
}

/// Redact a raw string, falling back to a placeholder when it does not parse.
pub fn redact_str(raw: &str) -> String {
    Url::parse(raw)
        .map(|u| redact_url(&u))
        .unwrap_or_else(|_| "<invalid url>".to_string())
}
