//! Cache-Control profiles.

use axum::http::header::{HeaderValue, CACHE_CONTROL};

use super::Middleware;
use crate::config::{CACHE_CONTROL_PRIVATE, CACHE_CONTROL_PUBLIC};

/// Named caching policies understood by `cache_control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheProfile {
    /// Cacheable, but revalidated on every request
    Public,
    /// Never stored by browsers or shared caches
    Private,
}

impl CacheProfile {
    /// Look a profile up by name; unknown names have no profile.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "public" => Some(CacheProfile::Public),
            "private" => Some(CacheProfile::Private),
            _ => None,
        }
    }

    pub fn header_value(self) -> HeaderValue {
        match self {
            CacheProfile::Public => HeaderValue::from_static(CACHE_CONTROL_PUBLIC),
            CacheProfile::Private => HeaderValue::from_static(CACHE_CONTROL_PRIVATE),
        }
    }
}

/// Set `Cache-Control` for `profile` on the response; no profile sets nothing.
///
/// A header set further in (by a nested app's own profile or by a handler)
/// is kept, so the innermost policy wins.
pub fn cache_control(profile: Option<CacheProfile>) -> Middleware {
    Middleware::new("cache_control", move |request, next| async move {
        let mut response = next.run(request).await;
        if let Some(profile) = profile {
            response
                .headers_mut()
                .entry(CACHE_CONTROL)
                .or_insert_with(|| profile.header_value());
        }
        response
    })
}
