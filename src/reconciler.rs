//! Report Reconciler - applies classification results back onto stored posts
//!
//! Every delivery ends in exactly one of two ways, applied or dropped with a
//! log line, and is acknowledged either way. A result that could not be
//! applied is never redelivered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::post::MisinfoState;
use crate::queue::{Delivery, DeliveryHandler};
use crate::storage::SqliteStore;

/// Classification result as published by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisinfoPayload {
    pub post_id: Uuid,
    pub misinfo_state: MisinfoState,
    pub confidence: f32,
    pub date_submitted: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MalformedPayload,
    NilPostId,
    LookupFailed,
    PostNotFound,
    NoRowsAffected,
    UpdateFailed,
    WorkerPanicked,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MalformedPayload => "malformed payload",
            DropReason::NilPostId => "nil post id",
            DropReason::LookupFailed => "lookup failed",
            DropReason::PostNotFound => "post not found",
            DropReason::NoRowsAffected => "no rows affected",
            DropReason::UpdateFailed => "update failed",
            DropReason::WorkerPanicked => "worker panicked",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal outcome of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { post_id: Uuid, rows: usize },
    Dropped(DropReason),
}

#[derive(Clone)]
pub struct ReportReconciler {
    store: SqliteStore,
}

impl ReportReconciler {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Apply one payload to the store. Never fails; every failure is a drop.
    pub fn reconcile(&self, body: &[u8]) -> ReconcileOutcome {
        let payload: MisinfoPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("dropping badly formatted report payload: {}", e);
                return ReconcileOutcome::Dropped(DropReason::MalformedPayload);
            }
        };

        if payload.post_id.is_nil() {
            tracing::warn!("dropping report payload: nil post id");
            return ReconcileOutcome::Dropped(DropReason::NilPostId);
        }

        let stored = match self.store.find_post(&payload.post_id) {
            Ok(Some(post)) => post,
            Ok(None) => {
                tracing::warn!("dropping report: post {} not found", payload.post_id);
                return ReconcileOutcome::Dropped(DropReason::PostNotFound);
            }
            Err(e) => {
                tracing::error!("dropping report: error finding post {}: {}", payload.post_id, e);
                return ReconcileOutcome::Dropped(DropReason::LookupFailed);
            }
        };

        let updated = stored.post.clone().with_report(
            payload.misinfo_state,
            payload.confidence,
            payload.date_submitted,
        );

        match self.store.update_post(&stored, &updated) {
            Ok(0) => {
                tracing::warn!("report for post {} changed no rows", stored.id);
                ReconcileOutcome::Dropped(DropReason::NoRowsAffected)
            }
            Ok(rows) => {
                tracing::info!(
                    "post {} report returned: {} ({:.2})",
                    stored.id,
                    payload.misinfo_state,
                    payload.confidence
                );
                ReconcileOutcome::Applied { post_id: stored.id, rows }
            }
            Err(e) => {
                tracing::error!("error updating post {} from report: {}", stored.id, e);
                ReconcileOutcome::Dropped(DropReason::UpdateFailed)
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for ReportReconciler {
    async fn handle(&self, delivery: Delivery) {
        let reconciler = self.clone();
        let body = delivery.body.clone();

        let outcome = tokio::task::spawn_blocking(move || reconciler.reconcile(&body))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("report worker for delivery {} died: {}", delivery.id, e);
                ReconcileOutcome::Dropped(DropReason::WorkerPanicked)
            });

        if let ReconcileOutcome::Dropped(reason) = outcome {
            tracing::debug!("delivery {} dropped: {}", delivery.id, reason);
        }

        if let Err(e) = delivery.ack().await {
            tracing::warn!("failed to acknowledge delivery {}: {}", delivery.id, e);
        }
    }
}
