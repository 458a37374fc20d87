use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel a candidate arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChannel {
    Whatsapp,
    Email,
}

/// Verdict produced by the upstream pipeline for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalDecision {
    Advance,
    Evaluate,
    Reject,
}

/// Inbound webhook body, as posted by the automation pipeline after it has
/// finished scoring a candidate. Everything except `identifier` is optional:
/// the pipeline omits fields its agents could not produce.
///
/// The nine `*_result` blobs are opaque to this service and stored verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub tenant_id: Option<String>,
    pub whatsapp_instance_id: Option<String>,

    pub identifier: String,
    pub source_channel: Option<SourceChannel>,

    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,

    pub resume_url: Option<String>,
    pub resume_text: Option<String>,
    pub resume_json: Option<Value>,

    pub sherlock_result: Option<Value>,
    pub watson_result: Option<Value>,
    pub salomao_result: Option<Value>,
    pub laszlo_result: Option<Value>,
    pub adam_grant_result: Option<Value>,
    pub deming_result: Option<Value>,
    pub drucker_result: Option<Value>,
    pub carnegie_result: Option<Value>,
    pub turing_result: Option<Value>,

    pub final_decision: Option<FinalDecision>,
    pub final_score: Option<f64>,
    pub recommended_department: Option<String>,

    #[serde(default)]
    pub response_sent: bool,
    pub response_channel: Option<String>,
}

/// Candidate row as inserted into the store. Optional columns are skipped
/// rather than sent as null so store-side defaults stay in effect.
#[derive(Debug, Clone, Serialize)]
pub struct NewCandidate {
    pub tenant_id: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_channel: Option<SourceChannel>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_json: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sherlock_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watson_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salomao_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laszlo_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adam_grant_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deming_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drucker_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carnegie_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turing_result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_decision: Option<FinalDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_department: Option<String>,

    pub response_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_sent_at: Option<DateTime<Utc>>,

    pub status: String,
}

impl NewCandidate {
    pub fn from_payload(tenant_id: &str, payload: &WebhookPayload, now: DateTime<Utc>) -> Self {
        NewCandidate {
            tenant_id: tenant_id.to_string(),
            identifier: payload.identifier.clone(),
            source_channel: payload.source_channel,
            name: payload.name.clone(),
            email: payload.email.clone(),
            phone: payload.phone.clone(),
            city: payload.city.clone(),
            state: payload.state.clone(),
            resume_url: payload.resume_url.clone(),
            resume_text: payload.resume_text.clone(),
            resume_json: payload.resume_json.clone(),
            sherlock_result: payload.sherlock_result.clone(),
            watson_result: payload.watson_result.clone(),
            salomao_result: payload.salomao_result.clone(),
            laszlo_result: payload.laszlo_result.clone(),
            adam_grant_result: payload.adam_grant_result.clone(),
            deming_result: payload.deming_result.clone(),
            drucker_result: payload.drucker_result.clone(),
            carnegie_result: payload.carnegie_result.clone(),
            turing_result: payload.turing_result.clone(),
            final_decision: payload.final_decision,
            final_score: payload.final_score,
            recommended_department: payload.recommended_department.clone(),
            response_sent: payload.response_sent,
            response_channel: payload.response_channel.clone(),
            response_sent_at: payload.response_sent.then_some(now),
            status: "completed".to_string(),
        }
    }
}

/// Audit trail entry written after a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLogEntry {
    pub tenant_id: String,
    pub candidate_id: String,
    pub action: String,
    pub details: Value,
}
