use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{TokenError, TokenSigner};
use crate::config::SigningSecret;
use crate::error::{DomainError, ErrorKind};
use crate::types::Principal;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Issues and validates self-contained session tokens. Nothing is persisted;
/// a token dies at its `exp`.
#[derive(Clone)]
pub struct SessionTokenIssuer {
    signer: TokenSigner,
    ttl: Duration,
}

impl SessionTokenIssuer {
    pub fn new(secret: &SigningSecret, ttl: Duration) -> Self {
        Self {
            signer: TokenSigner::new(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, principal: Principal) -> Result<String, DomainError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: Some(principal.to_string()),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };

        self.signer
            .sign(&claims)
            .map_err(|e| DomainError::caused_by(ErrorKind::Unknown, "failed to issue session token", e))
    }

    pub fn validate(&self, token: &str) -> Result<Principal, TokenError> {
        let claims: SessionClaims = self.signer.verify(token)?;

        let sub = claims.sub.ok_or(TokenError::MissingSubject)?;
        sub.parse::<Principal>().map_err(|_| TokenError::InvalidSubject)
    }
}
