//! OAuth initialization.
//!
//! Token issuing itself lives in the API layer. Setting up the blog chain only
//! has to make sure the grant exchanges the admin client relies on are
//! registered before the first request is routed.

use std::sync::{Arc, RwLock};

use crate::config::AppConfig;

/// Grant types the admin client authenticates with
pub const DEFAULT_GRANT_TYPES: &[&str] = &["password", "refresh_token"];

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Grant exchange '{0}' registered twice")]
    DuplicateGrant(String),
}

/// Collaborator invoked once while the middleware chain is set up.
pub trait OAuthInit: Send + Sync + 'static {
    fn init(&self, config: &AppConfig) -> Result<(), OAuthError>;
}

/// Registry of the grant exchanges the token endpoint accepts.
#[derive(Debug, Clone, Default)]
pub struct OAuthServer {
    grants: Arc<RwLock<Vec<String>>>,
}

impl OAuthServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grant exchange; each grant type may be registered once.
    pub fn exchange(&self, grant_type: &str) -> Result<(), OAuthError> {
        let mut grants = self.grants.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if grants.iter().any(|grant| grant == grant_type) {
            return Err(OAuthError::DuplicateGrant(grant_type.to_string()));
        }
        grants.push(grant_type.to_string());
        Ok(())
    }

    pub fn grants(&self) -> Vec<String> {
        self.grants
            .read()
            .map(|grants| grants.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl OAuthInit for OAuthServer {
    /// Register the default grants that are not registered yet.
    ///
    /// Several blogs may be built from one shared registry, so running this
    /// again is not an error.
    fn init(&self, config: &AppConfig) -> Result<(), OAuthError> {
        let mut grants = self.grants.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut added = Vec::new();
        for grant_type in DEFAULT_GRANT_TYPES {
            if !grants.iter().any(|grant| grant == grant_type) {
                grants.push(grant_type.to_string());
                added.push(*grant_type);
            }
        }
        tracing::debug!(
            added = ?added,
            url = ?config.url,
            "OAuth grant exchanges registered"
        );
        Ok(())
    }
}
