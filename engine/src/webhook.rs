//! Webhook receiver
//!
//! Validates Git push events, deduplicates by delivery id, and enqueues
//! ingestion jobs. The HTTP framing lives in the serving layer; this
//! module owns the protocol: HMAC-SHA256 signature verification
//! (constant-time), push/branch filtering, and the conditional-write
//! dedupe against the idempotency table.

use crate::queue::{IdempotencyStore, JobQueue};
use crate::types::{IngestJob, RepoContext};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Dedupe records expire after this long
const DEDUPE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Webhook protocol errors, mapped to HTTP statuses by the server
#[derive(Debug, Error)]
pub enum WebhookError {
    /// 403
    #[error("invalid signature")]
    InvalidSignature,

    /// 400
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(String),

    /// 500
    #[error("failed to enqueue ingestion job: {0}")]
    Enqueue(String),
}

/// The relevant request headers
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    /// `X-Hub-Signature-256`, "sha256=<hex>"
    pub signature: Option<String>,
    /// `X-GitHub-Event`
    pub event: Option<String>,
    /// `X-GitHub-Delivery`
    pub delivery: Option<String>,
}

/// Push payload fields the receiver consumes
#[derive(Debug, Deserialize)]
struct PushPayload {
    repository: PayloadRepository,
    after: String,
    #[serde(rename = "ref")]
    git_ref: String,
    pusher: PayloadPusher,
}

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PayloadPusher {
    name: String,
}

/// Receiver outcome, mapped to HTTP statuses by the server
#[derive(Debug)]
pub enum WebhookOutcome {
    /// 200: job enqueued
    Enqueued(IngestJob),
    /// 202: duplicate delivery, acknowledged without enqueue
    Duplicate,
    /// 200: valid event that requires no action
    Ignored(&'static str),
}

/// Validates and enqueues push events
pub struct WebhookReceiver {
    secret: String,
    branch: String,
    dedupe: Arc<dyn IdempotencyStore>,
    queue: Arc<dyn JobQueue>,
}

impl WebhookReceiver {
    pub fn new(
        secret: impl Into<String>,
        branch: impl Into<String>,
        dedupe: Arc<dyn IdempotencyStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self { secret: secret.into(), branch: branch.into(), dedupe, queue }
    }

    /// Handle one delivery
    pub fn handle(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        self.verify_signature(headers.signature.as_deref(), body)?;

        let payload: PushPayload =
            serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        if headers.event.as_deref() != Some("push") {
            return Ok(WebhookOutcome::Ignored("not a push event"));
        }
        if payload.git_ref != self.branch {
            return Ok(WebhookOutcome::Ignored("push to a non-tracked branch"));
        }

        if let Some(delivery) = headers.delivery.as_deref() {
            let fresh = self
                .dedupe
                .insert_once(delivery, DEDUPE_TTL)
                .map_err(|e| WebhookError::Enqueue(e.to_string()))?;
            if !fresh {
                log::info!("duplicate delivery {delivery}, ignoring");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let job = IngestJob {
            namespace: RepoContext::namespace_for(&payload.repository.full_name),
            repository: payload.repository.full_name,
            commit_sha: payload.after,
            pusher: payload.pusher.name,
        };

        self.queue.enqueue(&job).map_err(|e| WebhookError::Enqueue(e.to_string()))?;
        Ok(WebhookOutcome::Enqueued(job))
    }

    /// Constant-time HMAC-SHA256 check of "sha256=<hex>"
    fn verify_signature(&self, signature: Option<&str>, body: &[u8]) -> Result<(), WebhookError> {
        let Some(signature) = signature else {
            return Err(WebhookError::InvalidSignature);
        };
        let Some(hex_digest) = signature.strip_prefix("sha256=") else {
            return Err(WebhookError::InvalidSignature);
        };
        let expected = hex::decode(hex_digest).map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| WebhookError::InvalidSignature)
    }
}

/// Compute the signature header value for a payload (test and client aid)
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
