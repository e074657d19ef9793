use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::unit_of_work::{TransactionDriver, TxContext};
use crate::accounts::{NewUser, User, UserStore};
use crate::auth::capability::{CapabilityKey, CapabilityKeyStore, NewCapabilityKey};
use crate::error::{DomainError, ErrorKind};
use crate::ratelimit::{AlertEvent, AlertSink, ProjectRateLimitProvider};
use crate::types::{KeyId, Principal, ProjectId};

pub type PgTx = Transaction<'static, Postgres>;

const KEY_COLUMNS: &str = "id, owner_id, project_id, name, secret_hash, collection_ids, \
                           expires_at, revoked, rate_limit_per_hour, created_at";

/// Postgres-backed persistence collaborators. Tables live in `sql/schema.sql`.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a driver failure onto the domain taxonomy
fn classify(context: &'static str, err: sqlx::Error) -> DomainError {
    let kind = match &err {
        sqlx::Error::RowNotFound => ErrorKind::QueryDataNotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => ErrorKind::AlreadyExists,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ErrorKind::RepositoryError
        }
        _ => ErrorKind::QueryError,
    };
    DomainError::caused_by(kind, context, err)
}

#[async_trait]
impl TransactionDriver for PgDatabase {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| classify("PgDatabase.begin", e))
    }

    async fn commit(&self, tx: PgTx) -> Result<(), DomainError> {
        tx.commit().await.map_err(|e| classify("PgDatabase.commit", e))
    }

    async fn rollback(&self, tx: PgTx) -> Result<(), DomainError> {
        tx.rollback().await.map_err(|e| classify("PgDatabase.rollback", e))
    }
}

#[async_trait]
impl UserStore<PgTx> for PgDatabase {
    async fn find_by_email(&self, ctx: &TxContext<PgTx>, email: &str) -> Result<User, DomainError> {
        let query = sqlx::query_as::<_, User>(
            "SELECT id, email, name, created_at FROM users WHERE email = $1",
        )
        .bind(email);

        let result = match ctx.transaction() {
            Some(handle) => {
                let mut tx = handle.lock().await?;
                query.fetch_one(&mut **tx).await
            }
            None => query.fetch_one(&self.pool).await,
        };
        result.map_err(|e| classify("PgDatabase.find_by_email", e))
    }

    async fn create(&self, ctx: &TxContext<PgTx>, user: NewUser) -> Result<User, DomainError> {
        let query = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, name) VALUES ($1, $2) RETURNING id, email, name, created_at",
        )
        .bind(&user.email)
        .bind(&user.name);

        let result = match ctx.transaction() {
            Some(handle) => {
                let mut tx = handle.lock().await?;
                query.fetch_one(&mut **tx).await
            }
            None => query.fetch_one(&self.pool).await,
        };
        result.map_err(|e| classify("PgDatabase.create_user", e))
    }
}

#[async_trait]
impl CapabilityKeyStore for PgDatabase {
    async fn find_active_by_secret(&self, secret_hash: &str) -> Result<CapabilityKey, DomainError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE secret_hash = $1 AND revoked = false",
            KEY_COLUMNS
        );
        sqlx::query_as::<_, CapabilityKey>(&sql)
            .bind(secret_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify("PgDatabase.find_active_by_secret", e))
    }

    async fn create(&self, key: NewCapabilityKey) -> Result<CapabilityKey, DomainError> {
        let sql = format!(
            "INSERT INTO api_keys \
             (owner_id, project_id, name, secret_hash, collection_ids, expires_at, rate_limit_per_hour) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            KEY_COLUMNS
        );
        sqlx::query_as::<_, CapabilityKey>(&sql)
            .bind(key.owner_id)
            .bind(key.project_id)
            .bind(&key.name)
            .bind(&key.secret_hash)
            .bind(&key.collection_ids)
            .bind(key.expires_at)
            .bind(key.rate_limit_per_hour)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify("PgDatabase.create_key", e))
    }

    async fn list_by_owner(&self, owner: Principal) -> Result<Vec<CapabilityKey>, DomainError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE owner_id = $1 ORDER BY created_at DESC",
            KEY_COLUMNS
        );
        sqlx::query_as::<_, CapabilityKey>(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify("PgDatabase.list_by_owner", e))
    }

    async fn revoke(&self, owner: Principal, id: KeyId) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE api_keys SET revoked = true WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| classify("PgDatabase.revoke", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::with_message(ErrorKind::QueryDataNotFound, "API key not found"));
        }
        Ok(())
    }

    async fn delete(&self, owner: Principal, id: KeyId) -> Result<(), DomainError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| classify("PgDatabase.delete", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::with_message(ErrorKind::QueryDataNotFound, "API key not found"));
        }
        Ok(())
    }

    async fn claim_project(&self, project_id: ProjectId, claimant: Principal) -> Result<Principal, DomainError> {
        // Rows inserted by the CTE are invisible to the outer SELECT on projects
        let owner: uuid::Uuid = sqlx::query_scalar(
            "WITH claimed AS ( \
                 INSERT INTO projects (id, owner_id, name) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO NOTHING RETURNING owner_id \
             ) \
             SELECT owner_id FROM claimed \
             UNION ALL SELECT owner_id FROM projects WHERE id = $1 \
             LIMIT 1",
        )
        .bind(project_id)
        .bind(claimant.as_uuid())
        .bind(format!("project {}", project_id))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify("PgDatabase.claim_project", e))?;

        Ok(Principal::new(owner))
    }
}

#[async_trait]
impl ProjectRateLimitProvider for PgDatabase {
    async fn limit_for_project(&self, project_id: ProjectId) -> Result<u32, DomainError> {
        let limit: Option<i32> =
            sqlx::query_scalar("SELECT rate_limit_per_hour FROM projects WHERE id = $1")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| classify("PgDatabase.limit_for_project", e))?;

        let limit = limit.ok_or_else(|| {
            DomainError::with_message(
                ErrorKind::QueryDataNotFound,
                format!("project {} has no configured rate limit", project_id),
            )
        })?;

        u32::try_from(limit).map_err(|_| {
            DomainError::with_message(
                ErrorKind::InvalidParameter,
                format!("project {} has a negative rate limit", project_id),
            )
        })
    }
}

#[async_trait]
impl AlertSink for PgDatabase {
    async fn record(&self, event: &AlertEvent) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO system_alerts \
             (project_id, severity, alert_type, title, message, usage_percent, request_count, limit_per_hour) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.project_id)
        .bind(event.severity.as_str())
        .bind(event.alert_type)
        .bind(&event.title)
        .bind(&event.message)
        .bind(event.usage_percent)
        .bind(i64::try_from(event.request_count).unwrap_or(i64::MAX))
        .bind(i64::from(event.limit))
        .execute(&self.pool)
        .await
        .map_err(|e| classify("PgDatabase.record_alert", e))?;
        Ok(())
    }
}
