use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{InsertOutcome, PlanUsage, QuotaConsumption, SupabaseApi};
use crate::models::{ActivityLogEntry, NewCandidate};

const REST_PATH: &str = "rest/v1";
const CONSUME_PLAN_UNIT_FN: &str = "consume_plan_unit";

/// PostgREST client for the Supabase project backing this service.
///
/// Requests carry the anon key as `apikey` and the service-role key as the
/// bearer token, so reads and writes bypass row-level security the same way
/// the admin client of the rest of the platform does.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

impl SupabaseClient {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        service_role_key: impl Into<String>,
    ) -> Result<Self> {
        let user_agent = format!("triagem/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build Supabase HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_role_key: service_role_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.base_url, REST_PATH, table)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/{}/rpc/{}", self.base_url, REST_PATH, function)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.service_role_key)
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .authed(self.client.get(self.table_url(table)))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Supabase query against '{}' failed", table))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read Supabase '{}' response body", table))?;
        if !status.is_success() {
            return Err(anyhow!(
                "Supabase query against '{}' failed (status {}): {}",
                table,
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }

        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse Supabase '{}' response", table))
    }
}

#[async_trait]
impl SupabaseApi for SupabaseClient {
    async fn find_tenant_by_instance(&self, instance_id: &str) -> Result<Option<String>> {
        // limit=2 so an ambiguous instance id is visible as more than one row.
        let rows: Vec<IdRow> = self
            .get_rows(
                "tenants",
                &[
                    ("select", "id".to_string()),
                    ("whatsapp_instance_id", format!("eq.{}", instance_id)),
                    ("limit", "2".to_string()),
                ],
            )
            .await?;
        match rows.as_slice() {
            [only] => Ok(Some(only.id.clone())),
            _ => Ok(None),
        }
    }

    async fn fetch_plan_usage(&self, tenant_id: &str) -> Result<Option<PlanUsage>> {
        let rows: Vec<PlanUsage> = self
            .get_rows(
                "tenants",
                &[
                    ("select", "plan_used,plan_limit".to_string()),
                    ("id", format!("eq.{}", tenant_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.first().copied())
    }

    async fn find_recent_candidate(
        &self,
        tenant_id: &str,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let rows: Vec<IdRow> = self
            .get_rows(
                "candidates",
                &[
                    ("select", "id".to_string()),
                    ("tenant_id", format!("eq.{}", tenant_id)),
                    ("identifier", format!("eq.{}", identifier)),
                    (
                        "created_at",
                        format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ),
                    ("order", "created_at.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().map(|row| row.id))
    }

    async fn consume_plan_unit(&self, tenant_id: &str) -> Result<QuotaConsumption> {
        // Single conditional update on the store side:
        //   update tenants set plan_used = plan_used + 1
        //   where id = p_tenant_id and plan_used < plan_limit
        //   returning plan_used, plan_limit;
        // Zero returned rows means the ceiling was already reached.
        let response = self
            .authed(self.client.post(self.rpc_url(CONSUME_PLAN_UNIT_FN)))
            .json(&json!({ "p_tenant_id": tenant_id }))
            .send()
            .await
            .context("Supabase consume_plan_unit call failed")?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .context("Failed to read consume_plan_unit response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "consume_plan_unit failed (status {}): {}",
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }

        let rows: Vec<PlanUsage> =
            serde_json::from_slice(&bytes).context("Failed to parse consume_plan_unit response")?;
        Ok(match rows.first() {
            Some(usage) => QuotaConsumption::Admitted(*usage),
            None => QuotaConsumption::Exhausted,
        })
    }

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<InsertOutcome> {
        let response = self
            .authed(self.client.post(self.table_url("candidates")))
            .header("Prefer", "return=representation")
            .json(candidate)
            .send()
            .await
            .context("Supabase candidate insert failed")?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Ok(InsertOutcome::DuplicateKey);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read candidate insert response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "Candidate insert failed (status {}): {}",
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }

        let rows: Vec<IdRow> =
            serde_json::from_slice(&bytes).context("Failed to parse candidate insert response")?;
        let id = rows
            .into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| anyhow!("Candidate insert returned no representation"))?;
        Ok(InsertOutcome::Created(id))
    }

    async fn insert_activity_log(&self, entry: &ActivityLogEntry) -> Result<()> {
        let response = self
            .authed(self.client.post(self.table_url("activity_logs")))
            .header("Prefer", "return=minimal")
            .json(entry)
            .send()
            .await
            .context("Supabase activity log insert failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Activity log insert failed (status {}): {}",
                status,
                body
            ));
        }
        Ok(())
    }
}
