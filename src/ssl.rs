//! SSL policy decisions.
//!
//! Pure functions deciding whether a request has to be upgraded to HTTPS and,
//! if so, whether it is refused outright or redirected. The middleware in
//! `crate::middleware::ssl` applies them to live requests.

use crate::config::ForceAdminSsl;

/// Whether a request must be served over SSL.
///
/// SSL is required for every request when the blog URL is `https://`, and for
/// admin requests whenever the admin SSL policy is enabled.
pub fn is_ssl_required(is_admin: bool, config_url: &str, force_admin_ssl: &ForceAdminSsl) -> bool {
    config_url.starts_with("https://") || (is_admin && force_admin_ssl.is_enabled())
}

/// Inputs for [`ssl_forbidden_or_redirect`].
#[derive(Debug, Clone, Copy)]
pub struct SslOptions<'a> {
    pub force_admin_ssl: &'a ForceAdminSsl,
    pub config_url: &'a str,
    pub config_url_ssl: Option<&'a str>,
    pub req_url: &'a str,
}

/// Outcome for an insecure request that requires SSL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SslDecision {
    Forbidden,
    Redirect(SslRedirect),
}

impl SslDecision {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, SslDecision::Forbidden)
    }
}

/// HTTPS location an insecure request is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslRedirect {
    target: String,
}

impl SslRedirect {
    /// Redirect URL with the request's query parameters appended in order.
    pub fn url(&self, query: &[(String, String)]) -> String {
        if query.is_empty() {
            return self.target.clone();
        }

        let query = query
            .iter()
            .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.target, query)
    }
}

/// Decide between refusing an insecure request and redirecting it to HTTPS.
pub fn ssl_forbidden_or_redirect(options: SslOptions<'_>) -> SslDecision {
    if !options.force_admin_ssl.redirects() {
        return SslDecision::Forbidden;
    }

    let base = match options.config_url_ssl {
        Some(url_ssl) => url_ssl.to_string(),
        None => with_https_scheme(options.config_url),
    };
    let base = base.strip_suffix('/').unwrap_or(&base);

    SslDecision::Redirect(SslRedirect {
        target: format!("{}{}", base, options.req_url),
    })
}

/// Swap the scheme of `url` for `https`.
fn with_https_scheme(url: &str) -> String {
    match url.split_once("://") {
        Some((_, rest)) => format!("https://{}", rest),
        None => format!("https://{}", url),
    }
}
