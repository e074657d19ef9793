pub mod alert;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::DomainError;
use crate::types::ProjectId;

pub use alert::{AlertEvent, AlertSeverity, AlertSink, AlertThresholdEngine};

const SECONDS_PER_HOUR: i64 = 3600;

/// Resolves a project's configured hourly request limit
#[async_trait]
pub trait ProjectRateLimitProvider: Send + Sync {
    async fn limit_for_project(&self, project_id: ProjectId) -> Result<u32, DomainError>;
}

/// One project within one wall-clock hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub project_id: ProjectId,
    /// Hours since the Unix epoch
    pub hour: i64,
}

impl BucketKey {
    pub fn at(project_id: ProjectId, now: DateTime<Utc>) -> Self {
        Self {
            project_id,
            hour: now.timestamp().div_euclid(SECONDS_PER_HOUR),
        }
    }

    /// Start of the next hour, when this bucket stops counting
    pub fn reset_at(&self) -> DateTime<Utc> {
        let secs = (self.hour + 1) * SECONDS_PER_HOUR;
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| Utc::now() + Duration::hours(1))
    }
}

#[derive(Debug)]
struct Bucket {
    count: u64,
    last_touch: DateTime<Utc>,
    alerted: Option<AlertSeverity>,
}

/// Snapshot of a project's current bucket
#[derive(Debug, Clone, serde::Serialize)]
pub struct BucketUsage {
    pub count: u64,
    pub last_touch: DateTime<Utc>,
    pub reset: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Admission {
    Admitted {
        count: u64,
        limit: u32,
        alert: Option<AlertEvent>,
    },
    Rejected {
        limit: u32,
        reset: DateTime<Utc>,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// In-process per-project hourly admission control.
///
/// The whole read-increment-compare step runs under one lock so concurrent
/// requests cannot both slip past the limit.
pub struct RateLimiter {
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
    alerts: AlertThresholdEngine,
}

impl RateLimiter {
    pub fn new(alerts: AlertThresholdEngine) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            alerts,
        }
    }

    pub async fn admit(&self, project_id: ProjectId, limit: u32) -> Admission {
        self.admit_at(project_id, limit, Utc::now()).await
    }

    pub async fn admit_at(&self, project_id: ProjectId, limit: u32, now: DateTime<Utc>) -> Admission {
        let key = BucketKey::at(project_id, now);

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            count: 0,
            last_touch: now,
            alerted: None,
        });
        bucket.count += 1;
        bucket.last_touch = now;

        if bucket.count > u64::from(limit) {
            return Admission::Rejected {
                limit,
                reset: key.reset_at(),
            };
        }

        let alert = self
            .alerts
            .evaluate(project_id, bucket.count, limit, &mut bucket.alerted);

        Admission::Admitted {
            count: bucket.count,
            limit,
            alert,
        }
    }

    /// Drop buckets belonging to hours that have already ended
    pub async fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let current_hour = now.timestamp().div_euclid(SECONDS_PER_HOUR);
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|key, _| key.hour >= current_hour);
        before - buckets.len()
    }

    /// Requests counted so far in the project's current hour
    pub async fn usage(&self, project_id: ProjectId, now: DateTime<Utc>) -> Option<BucketUsage> {
        let key = BucketKey::at(project_id, now);
        let buckets = self.buckets.lock().await;
        buckets.get(&key).map(|bucket| BucketUsage {
            count: bucket.count,
            last_touch: bucket.last_touch,
            reset: key.reset_at(),
        })
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

/// Periodically evict elapsed buckets
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = limiter.evict_stale(Utc::now()).await;
            if evicted > 0 {
                tracing::debug!("Evicted {} stale rate limit buckets", evicted);
            }
        }
    })
}
