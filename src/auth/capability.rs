use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

use super::{TokenError, TokenSigner};
use crate::config::SigningSecret;
use crate::error::{DomainError, ErrorKind};
use crate::types::{CollectionId, KeyId, Principal, ProjectId};

/// Number of random bytes behind every API key secret
const SECRET_BYTES: usize = 32;

/// Persisted API key record. Only the SHA-256 of the secret is stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CapabilityKey {
    pub id: KeyId,
    pub owner_id: Uuid,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub collection_ids: Vec<CollectionId>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub rate_limit_per_hour: i32,
    pub created_at: DateTime<Utc>,
}

impl CapabilityKey {
    pub fn owner(&self) -> Principal {
        Principal::new(self.owner_id)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewCapabilityKey {
    pub owner_id: Uuid,
    pub project_id: ProjectId,
    pub name: String,
    pub secret_hash: String,
    pub collection_ids: Vec<CollectionId>,
    pub expires_at: DateTime<Utc>,
    pub rate_limit_per_hour: i32,
}

/// Persistence collaborator for API keys
#[async_trait]
pub trait CapabilityKeyStore: Send + Sync {
    /// Non-revoked key whose secret hashes to `secret_hash`; QueryDataNotFound otherwise
    async fn find_active_by_secret(&self, secret_hash: &str) -> Result<CapabilityKey, DomainError>;

    async fn create(&self, key: NewCapabilityKey) -> Result<CapabilityKey, DomainError>;

    async fn list_by_owner(&self, owner: Principal) -> Result<Vec<CapabilityKey>, DomainError>;

    /// Marks the owner's key revoked; QueryDataNotFound if the owner has no such key
    async fn revoke(&self, owner: Principal, id: KeyId) -> Result<(), DomainError>;

    async fn delete(&self, owner: Principal, id: KeyId) -> Result<(), DomainError>;

    /// Owner of `project_id`. An unclaimed project is claimed by `claimant`.
    async fn claim_project(&self, project_id: ProjectId, claimant: Principal) -> Result<Principal, DomainError>;
}

/// Claims carried by a scoped access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedClaims {
    pub sub: String,
    pub project_id: ProjectId,
    pub collection_ids: Vec<CollectionId>,
    pub exp: i64,
    pub iat: i64,
}

/// Request-scoped authorization established by an API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyScope {
    pub principal: Principal,
    pub project_id: ProjectId,
    pub collection_ids: Vec<CollectionId>,
}

impl KeyScope {
    pub fn allows_collection(&self, collection_id: CollectionId) -> bool {
        self.collection_ids.contains(&collection_id)
    }
}

/// Result of a successful key validation
#[derive(Debug, Clone)]
pub struct ScopedAccess {
    /// Signed token for handing the scope to another process
    pub token: String,
    pub scope: KeyScope,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CapabilityKeyIssuer {
    store: Arc<dyn CapabilityKeyStore>,
    signer: TokenSigner,
    ttl: Duration,
    default_rate_limit: u32,
}

impl CapabilityKeyIssuer {
    pub fn new(
        store: Arc<dyn CapabilityKeyStore>,
        secret: &SigningSecret,
        ttl: Duration,
        default_rate_limit: u32,
    ) -> Self {
        Self {
            store,
            signer: TokenSigner::new(secret),
            ttl,
            default_rate_limit,
        }
    }

    /// Create a key and return its plaintext secret. This is the only time the
    /// secret is available; the store keeps a hash.
    pub async fn create(
        &self,
        owner: Principal,
        project_id: ProjectId,
        name: &str,
        collection_ids: Vec<CollectionId>,
    ) -> Result<String, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::with_message(ErrorKind::InvalidParameter, "API key name is required"));
        }

        let project_owner = self
            .store
            .claim_project(project_id, owner)
            .await
            .map_err(|e| DomainError::wrap("CapabilityKeyIssuer.create", e))?;
        if project_owner != owner {
            return Err(DomainError::with_message(
                ErrorKind::UnpermittedOperation,
                "project belongs to another account",
            ));
        }

        let secret = generate_secret()?;
        let record = NewCapabilityKey {
            owner_id: owner.as_uuid(),
            project_id,
            name: name.to_string(),
            secret_hash: hash_secret(&secret),
            collection_ids,
            expires_at: Utc::now() + self.ttl,
            rate_limit_per_hour: i32::try_from(self.default_rate_limit).unwrap_or(i32::MAX),
        };

        let key = self
            .store
            .create(record)
            .await
            .map_err(|e| DomainError::wrap("CapabilityKeyIssuer.create", e))?;

        tracing::info!(key_id = key.id, project_id, owner = %owner, "Created API key");
        Ok(secret)
    }

    /// Look up an active key by secret and mint a scoped access token for it
    pub async fn validate(&self, secret: &str) -> Result<ScopedAccess, DomainError> {
        let key = self
            .store
            .find_active_by_secret(&hash_secret(secret))
            .await
            .map_err(|e| DomainError::wrap("CapabilityKeyIssuer.validate", e))?;

        let now = Utc::now();
        if key.is_expired_at(now) {
            return Err(DomainError::with_message(ErrorKind::UnpermittedOperation, "API key has expired"));
        }

        let claims = ScopedClaims {
            sub: key.owner_id.to_string(),
            project_id: key.project_id,
            collection_ids: key.collection_ids.clone(),
            exp: key.expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = self
            .signer
            .sign(&claims)
            .map_err(|e| DomainError::caused_by(ErrorKind::Unknown, "failed to mint scoped access token", e))?;

        Ok(ScopedAccess {
            token,
            scope: KeyScope {
                principal: key.owner(),
                project_id: key.project_id,
                collection_ids: key.collection_ids,
            },
            expires_at: key.expires_at,
        })
    }

    /// Verify a scoped access token minted by [`CapabilityKeyIssuer::validate`]
    pub fn parse_scoped_token(&self, token: &str) -> Result<KeyScope, TokenError> {
        let claims: ScopedClaims = self.signer.verify(token)?;
        let principal = claims
            .sub
            .parse::<Principal>()
            .map_err(|_| TokenError::InvalidSubject)?;

        Ok(KeyScope {
            principal,
            project_id: claims.project_id,
            collection_ids: claims.collection_ids,
        })
    }

    pub async fn list(&self, owner: Principal) -> Result<Vec<CapabilityKey>, DomainError> {
        self.store
            .list_by_owner(owner)
            .await
            .map_err(|e| DomainError::wrap("CapabilityKeyIssuer.list", e))
    }

    pub async fn revoke(&self, owner: Principal, id: KeyId) -> Result<(), DomainError> {
        self.store
            .revoke(owner, id)
            .await
            .map_err(|e| DomainError::wrap("CapabilityKeyIssuer.revoke", e))?;
        tracing::info!(key_id = id, owner = %owner, "Revoked API key");
        Ok(())
    }

    pub async fn delete(&self, owner: Principal, id: KeyId) -> Result<(), DomainError> {
        self.store
            .delete(owner, id)
            .await
            .map_err(|e| DomainError::wrap("CapabilityKeyIssuer.delete", e))?;
        tracing::info!(key_id = id, owner = %owner, "Deleted API key");
        Ok(())
    }
}

fn generate_secret() -> Result<String, DomainError> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| DomainError::caused_by(ErrorKind::Unknown, "failed to generate API key", e))?;
    Ok(hex::encode(bytes))
}

/// Hex SHA-256 of a secret, the form keys are stored and looked up by
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
