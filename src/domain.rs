//! Utility functions for inspecting the host of a search result URL.

use crate::error::{AppError, Result};
use url::Url;

/// Hosts whose pages are social profiles rather than business pages.
const SOCIAL_HOSTS: &[&str] = &["facebook.com", "instagram.com", "linkedin.com"];

/// Extracts the lower-cased host (without "www.") from a URL string.
/// A missing scheme is assumed to be https.
pub(crate) fn source_host(url_str: &str) -> Result<String> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(AppError::DomainExtraction(
            "Input URL string is empty".to_string(),
        ));
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme)?;
    let host = url.host_str().ok_or_else(|| {
        AppError::DomainExtraction(format!("No host in URL: {}", with_scheme))
    })?;

    Ok(host.strip_prefix("www.").unwrap_or(host).to_lowercase())
}

/// True if the URL points at a social network (including its subdomains).
/// Unparseable URLs are not treated as social.
pub(crate) fn is_social_host(url_str: &str) -> bool {
    match source_host(url_str) {
        Ok(host) => SOCIAL_HOSTS
            .iter()
            .any(|social| host == *social || host.ends_with(&format!(".{}", social))),
        Err(e) => {
            tracing::trace!("Could not inspect host of '{}': {}", url_str, e);
            false
        }
    }
}
