use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{ActivityLogEntry, NewCandidate};

mod client;

pub use client::SupabaseClient;

/// Store operations the webhook pipeline needs. All tenant, quota and dedup
/// state lives behind this seam; the service keeps nothing in process
/// between requests.
#[async_trait]
pub trait SupabaseApi: Send + Sync {
    /// Secondary tenant lookup by channel-instance id. `Ok(None)` covers
    /// both zero and ambiguous matches.
    async fn find_tenant_by_instance(&self, instance_id: &str) -> Result<Option<String>>;

    /// Current usage and ceiling for a tenant; `None` if the row does not
    /// exist.
    async fn fetch_plan_usage(&self, tenant_id: &str) -> Result<Option<PlanUsage>>;

    /// Most recent candidate of this tenant with the same identifier created
    /// at or after `since`.
    async fn find_recent_candidate(
        &self,
        tenant_id: &str,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<String>>;

    /// Atomically advance `plan_used` by one, but only while it is below
    /// `plan_limit`. The store performs the conditional update in a single
    /// step; `Exhausted` means no row qualified.
    async fn consume_plan_unit(&self, tenant_id: &str) -> Result<QuotaConsumption>;

    /// Insert one candidate row, returning its id. A store-side uniqueness
    /// conflict is reported as `DuplicateKey`, not as an error.
    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<InsertOutcome>;

    async fn insert_activity_log(&self, entry: &ActivityLogEntry) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlanUsage {
    pub plan_used: i64,
    pub plan_limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaConsumption {
    Admitted(PlanUsage),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(String),
    DuplicateKey,
}
