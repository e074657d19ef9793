use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::unit_of_work::{TransactionDriver, TxContext};
use crate::accounts::{NewUser, User, UserStore};
use crate::auth::capability::{CapabilityKey, CapabilityKeyStore, NewCapabilityKey};
use crate::error::{DomainError, ErrorKind};
use crate::ratelimit::{AlertEvent, AlertSink, ProjectRateLimitProvider};
use crate::types::{KeyId, Principal, ProjectId};

/// Writes staged by an open in-memory transaction, applied on commit
#[derive(Debug, Default)]
pub struct MemoryTx {
    users: Vec<User>,
}

/// Transaction counters, for asserting how a unit of work behaved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStats {
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Default)]
struct Inner {
    users: Mutex<HashMap<String, User>>,
    keys: Mutex<Vec<CapabilityKey>>,
    next_key_id: AtomicI64,
    project_limits: Mutex<HashMap<ProjectId, u32>>,
    project_owners: Mutex<HashMap<ProjectId, Principal>>,
    alerts: Mutex<Vec<AlertEvent>>,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

/// In-process implementation of every persistence collaborator.
///
/// Backs the server when no DATABASE_URL is configured and backs the tests.
/// Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            begins: self.inner.begins.load(Ordering::SeqCst),
            commits: self.inner.commits.load(Ordering::SeqCst),
            rollbacks: self.inner.rollbacks.load(Ordering::SeqCst),
        }
    }

    pub async fn set_project_limit(&self, project_id: ProjectId, limit: u32) {
        self.inner.project_limits.lock().await.insert(project_id, limit);
    }

    /// Alerts recorded so far, oldest first
    pub async fn alerts(&self) -> Vec<AlertEvent> {
        self.inner.alerts.lock().await.clone()
    }

    /// Push every stored key's expiry into the past
    pub async fn expire_keys(&self) {
        let past = Utc::now() - chrono::Duration::seconds(1);
        for key in self.inner.keys.lock().await.iter_mut() {
            key.expires_at = past;
        }
    }

    pub fn fail_next_commit(&self) {
        self.inner.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_rollback(&self) {
        self.inner.fail_rollback.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionDriver for MemoryDatabase {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, DomainError> {
        self.inner.begins.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), DomainError> {
        if self.inner.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::with_message(ErrorKind::RepositoryError, "commit refused"));
        }

        let mut users = self.inner.users.lock().await;
        for user in &tx.users {
            if users.contains_key(&user.email) {
                return Err(DomainError::with_message(
                    ErrorKind::AlreadyExists,
                    format!("user {} already exists", user.email),
                ));
            }
        }
        for user in tx.users {
            users.insert(user.email.clone(), user);
        }
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _tx: MemoryTx) -> Result<(), DomainError> {
        if self.inner.fail_rollback.swap(false, Ordering::SeqCst) {
            return Err(DomainError::with_message(ErrorKind::RepositoryError, "rollback refused"));
        }
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl UserStore<MemoryTx> for MemoryDatabase {
    async fn find_by_email(&self, ctx: &TxContext<MemoryTx>, email: &str) -> Result<User, DomainError> {
        if let Some(handle) = ctx.transaction() {
            let tx = handle.lock().await?;
            if let Some(user) = tx.users.iter().find(|u| u.email == email) {
                return Ok(user.clone());
            }
        }

        self.inner
            .users
            .lock()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| DomainError::with_message(ErrorKind::QueryDataNotFound, "user not found"))
    }

    async fn create(&self, ctx: &TxContext<MemoryTx>, user: NewUser) -> Result<User, DomainError> {
        if self.inner.users.lock().await.contains_key(&user.email) {
            return Err(DomainError::with_message(
                ErrorKind::AlreadyExists,
                format!("user {} already exists", user.email),
            ));
        }

        let record = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            created_at: Utc::now(),
        };

        match ctx.transaction() {
            Some(handle) => {
                let mut tx = handle.lock().await?;
                if tx.users.iter().any(|u| u.email == record.email) {
                    return Err(DomainError::with_message(
                        ErrorKind::AlreadyExists,
                        format!("user {} already exists", record.email),
                    ));
                }
                tx.users.push(record.clone());
            }
            None => {
                self.inner
                    .users
                    .lock()
                    .await
                    .insert(record.email.clone(), record.clone());
            }
        }
        Ok(record)
    }
}

#[async_trait]
impl CapabilityKeyStore for MemoryDatabase {
    async fn find_active_by_secret(&self, secret_hash: &str) -> Result<CapabilityKey, DomainError> {
        self.inner
            .keys
            .lock()
            .await
            .iter()
            .find(|k| !k.revoked && k.secret_hash == secret_hash)
            .cloned()
            .ok_or_else(|| DomainError::with_message(ErrorKind::QueryDataNotFound, "API key not found"))
    }

    async fn create(&self, key: NewCapabilityKey) -> Result<CapabilityKey, DomainError> {
        let id = self.inner.next_key_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = CapabilityKey {
            id,
            owner_id: key.owner_id,
            project_id: key.project_id,
            name: key.name,
            secret_hash: key.secret_hash,
            collection_ids: key.collection_ids,
            expires_at: key.expires_at,
            revoked: false,
            rate_limit_per_hour: key.rate_limit_per_hour,
            created_at: Utc::now(),
        };
        self.inner.keys.lock().await.push(record.clone());
        Ok(record)
    }

    async fn list_by_owner(&self, owner: Principal) -> Result<Vec<CapabilityKey>, DomainError> {
        Ok(self
            .inner
            .keys
            .lock()
            .await
            .iter()
            .filter(|k| k.owner_id == owner.as_uuid())
            .cloned()
            .collect())
    }

    async fn revoke(&self, owner: Principal, id: KeyId) -> Result<(), DomainError> {
        let mut keys = self.inner.keys.lock().await;
        let key = keys
            .iter_mut()
            .find(|k| k.id == id && k.owner_id == owner.as_uuid())
            .ok_or_else(|| DomainError::with_message(ErrorKind::QueryDataNotFound, "API key not found"))?;
        key.revoked = true;
        Ok(())
    }

    async fn delete(&self, owner: Principal, id: KeyId) -> Result<(), DomainError> {
        let mut keys = self.inner.keys.lock().await;
        let before = keys.len();
        keys.retain(|k| !(k.id == id && k.owner_id == owner.as_uuid()));
        if keys.len() == before {
            return Err(DomainError::with_message(ErrorKind::QueryDataNotFound, "API key not found"));
        }
        Ok(())
    }

    async fn claim_project(&self, project_id: ProjectId, claimant: Principal) -> Result<Principal, DomainError> {
        Ok(*self
            .inner
            .project_owners
            .lock()
            .await
            .entry(project_id)
            .or_insert(claimant))
    }
}

#[async_trait]
impl ProjectRateLimitProvider for MemoryDatabase {
    async fn limit_for_project(&self, project_id: ProjectId) -> Result<u32, DomainError> {
        self.inner
            .project_limits
            .lock()
            .await
            .get(&project_id)
            .copied()
            .ok_or_else(|| {
                DomainError::with_message(
                    ErrorKind::QueryDataNotFound,
                    format!("project {} has no configured rate limit", project_id),
                )
            })
    }
}

#[async_trait]
impl AlertSink for MemoryDatabase {
    async fn record(&self, event: &AlertEvent) -> Result<(), DomainError> {
        self.inner.alerts.lock().await.push(event.clone());
        Ok(())
    }
}
