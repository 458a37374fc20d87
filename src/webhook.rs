use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::error::WebhookError;
use crate::models::{ActivityLogEntry, NewCandidate, WebhookPayload};
use crate::supabase::{InsertOutcome, PlanUsage, QuotaConsumption, SupabaseApi};

/// Redeliveries of the same (tenant, identifier) inside this window are
/// answered as duplicates instead of creating a second row. Older candidates
/// are expected to legitimately re-apply, so the policy is time-bounded.
const DEDUP_WINDOW_DAYS: i64 = 30;

/// POST /api/webhook
///
/// One pass per delivery, no state carried between requests: authenticate,
/// parse, resolve the tenant, check the quota, check for a duplicate,
/// atomically consume a plan unit, insert the candidate, then record the
/// audit entry best-effort. The first failing stage short-circuits the rest.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    authorize(state.webhook_secret.as_deref(), &headers)?;
    ensure_json_content_type(&headers)?;

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let store = state.store.as_ref();
    let tenant_id = resolve_tenant(store, &payload).await?;
    let usage = check_quota(store, &tenant_id).await?;

    let window_start = Utc::now() - Duration::days(DEDUP_WINDOW_DAYS);
    if let Some(existing_id) =
        find_duplicate(store, &tenant_id, &payload.identifier, window_start).await
    {
        info!(
            "Duplicate delivery for tenant {} identifier {} - answering with existing candidate {}",
            tenant_id, payload.identifier, existing_id
        );
        return Ok(Json(duplicate_response(&existing_id)));
    }

    consume_quota(store, &tenant_id, usage).await?;

    let record = NewCandidate::from_payload(&tenant_id, &payload, Utc::now());
    let candidate_id = match store.insert_candidate(&record).await {
        Ok(InsertOutcome::Created(id)) => id,
        Ok(InsertOutcome::DuplicateKey) => {
            // Lost the insert race to a concurrent delivery of the same
            // identifier; the surviving row is the answer.
            warn!(
                "Candidate insert conflicted for tenant {} identifier {} - resolving survivor",
                tenant_id, payload.identifier
            );
            let existing_id = store
                .find_recent_candidate(&tenant_id, &payload.identifier, window_start)
                .await
                .map_err(WebhookError::Store)?
                .ok_or_else(|| {
                    WebhookError::WriteFailed(anyhow::anyhow!(
                        "insert conflicted but no surviving candidate was found"
                    ))
                })?;
            return Ok(Json(duplicate_response(&existing_id)));
        }
        Err(e) => {
            // The consumed plan unit is not returned; plan_used stays
            // monotonic and is reconciled at the billing rollover.
            return Err(WebhookError::WriteFailed(e));
        }
    };

    info!(
        "Ingested candidate {} for tenant {} via {:?}",
        candidate_id, tenant_id, payload.source_channel
    );

    record_activity(store, &tenant_id, &candidate_id, &payload).await;

    Ok(Json(json!({
        "success": true,
        "candidate_id": candidate_id,
        "final_decision": payload.final_decision,
        "final_score": payload.final_score,
    })))
}

/// GET /api/webhook - stateless liveness probe, never touches the store.
pub async fn probe() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Triagem webhook is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn authorize(secret: Option<&str>, headers: &HeaderMap) -> Result<(), WebhookError> {
    let Some(secret) = secret else {
        return Ok(());
    };
    match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(provided) if constant_time_eq(provided.as_bytes(), secret.as_bytes()) => Ok(()),
        _ => Err(WebhookError::Unauthorized),
    }
}

fn ensure_json_content_type(headers: &HeaderMap) -> Result<(), WebhookError> {
    let content_type_ok = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        == Some(true);
    if !content_type_ok {
        return Err(WebhookError::UnsupportedMediaType);
    }
    Ok(())
}

/// Direct tenant id wins; otherwise the channel-instance id is looked up.
/// Zero matches, ambiguous matches and lookup failures all resolve to
/// `TenantNotFound`, matching the resolver contract.
async fn resolve_tenant(
    store: &dyn SupabaseApi,
    payload: &WebhookPayload,
) -> Result<String, WebhookError> {
    if let Some(id) = non_empty(payload.tenant_id.as_deref()) {
        return Ok(id.to_string());
    }
    let Some(instance_id) = non_empty(payload.whatsapp_instance_id.as_deref()) else {
        return Err(WebhookError::TenantNotFound);
    };
    match store.find_tenant_by_instance(instance_id).await {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(WebhookError::TenantNotFound),
        Err(e) => {
            warn!("Tenant lookup by instance id failed: {:?}", e);
            Err(WebhookError::TenantNotFound)
        }
    }
}

/// Read-only ceiling check. A missing tenant row surfaces here as
/// `TenantNotFound` - this is the implicit existence check for directly
/// supplied tenant ids.
async fn check_quota(store: &dyn SupabaseApi, tenant_id: &str) -> Result<PlanUsage, WebhookError> {
    let usage = store
        .fetch_plan_usage(tenant_id)
        .await
        .map_err(WebhookError::Store)?
        .ok_or(WebhookError::TenantNotFound)?;
    if usage.plan_used >= usage.plan_limit {
        return Err(WebhookError::QuotaExceeded {
            plan_used: usage.plan_used,
            plan_limit: usage.plan_limit,
        });
    }
    Ok(usage)
}

/// A failed dedup lookup admits the candidate rather than dropping it; the
/// store-side uniqueness conflict on insert is the second guard.
async fn find_duplicate(
    store: &dyn SupabaseApi,
    tenant_id: &str,
    identifier: &str,
    since: DateTime<Utc>,
) -> Option<String> {
    match store.find_recent_candidate(tenant_id, identifier, since).await {
        Ok(found) => found,
        Err(e) => {
            warn!(
                "Dedup lookup failed for tenant {} - treating delivery as new: {:?}",
                tenant_id, e
            );
            None
        }
    }
}

/// Claims one plan unit via the store's conditional increment. `Exhausted`
/// means a concurrent request took the last unit after our read-only check;
/// the rejection reports freshly read numbers when available.
async fn consume_quota(
    store: &dyn SupabaseApi,
    tenant_id: &str,
    last_seen: PlanUsage,
) -> Result<(), WebhookError> {
    match store.consume_plan_unit(tenant_id).await {
        Ok(QuotaConsumption::Admitted(usage)) => {
            debug!(
                "Tenant {} plan usage now {}/{}",
                tenant_id, usage.plan_used, usage.plan_limit
            );
            Ok(())
        }
        Ok(QuotaConsumption::Exhausted) => {
            let current = store
                .fetch_plan_usage(tenant_id)
                .await
                .ok()
                .flatten()
                .unwrap_or(last_seen);
            Err(WebhookError::QuotaExceeded {
                plan_used: current.plan_used,
                plan_limit: current.plan_limit,
            })
        }
        Err(e) => Err(WebhookError::Store(e)),
    }
}

/// Best-effort audit entry; a failure is logged and never blocks the
/// success response.
async fn record_activity(
    store: &dyn SupabaseApi,
    tenant_id: &str,
    candidate_id: &str,
    payload: &WebhookPayload,
) {
    let entry = ActivityLogEntry {
        tenant_id: tenant_id.to_string(),
        candidate_id: candidate_id.to_string(),
        action: "candidate_processed".to_string(),
        details: json!({
            "source_channel": payload.source_channel,
            "final_decision": payload.final_decision,
            "final_score": payload.final_score,
        }),
    };
    if let Err(e) = store.insert_activity_log(&entry).await {
        error!(
            "Activity log insert failed for candidate {}: {:?}",
            candidate_id, e
        );
    }
}

fn duplicate_response(existing_id: &str) -> Value {
    json!({
        "success": true,
        "duplicate": true,
        "existing_id": existing_id,
        "message": "Candidate already exists (processed within last 30 days)",
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
