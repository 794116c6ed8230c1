//! Bearer credential capability.
//!
//! Token acquisition and refresh live outside this crate. The poll client
//! only needs "give me a credential right now".

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// The provider has no credential to hand out.
    #[error("no access token available")]
    Missing,

    /// The provider failed to obtain a credential.
    #[error("token provider failed: {0}")]
    Provider(String),
}

/// Supplies bearer credentials for outbound requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, TokenError>;
}

/// A fixed bearer token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&"<redacted>").finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, TokenError> {
        if self.0.is_empty() {
            return Err(TokenError::Missing);
        }
        Ok(self.0.clone())
    }
}
