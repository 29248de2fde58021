//! Audit trail - one append-only entry per completed request
//!
//! Entries carry a SHA-256 of the sanitized input, never the input itself.
//! Sinks are fire-and-forget: the router spawns the append and only logs a
//! failure.

use crate::error::Result;
use crate::security::GuardStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use tracing::info;

/// Tracing target for audit records
pub const AUDIT_TARGET: &str = "dsrouter::audit";

/// Record of one completed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    /// When the request completed
    pub timestamp: DateTime<Utc>,
    /// Request id
    pub request_id: String,
    /// SHA-256 of the sanitized system prompt and prompt
    pub input_hash: String,
    /// Provider whose response was delivered
    pub provider: String,
    /// Final confidence
    pub confidence: Option<f32>,
    /// Routing reason tag (absent when no routing happened)
    pub routing_reason: Option<String>,
    /// Blocked by a guard or the budget limiter
    pub blocked: bool,
    /// Escalated to the top tier
    pub escalated: bool,
    /// Pre-guard outcome
    pub pre_guard_status: GuardStatus,
    /// Post-guard outcome (absent when generation never ran)
    pub post_guard_status: Option<GuardStatus>,
    /// Prompt tokens billed
    pub prompt_tokens: u32,
    /// Output tokens billed
    pub output_tokens: u32,
    /// Cost billed
    pub cost_usd: f64,
    /// End-to-end latency
    pub latency_ms: u64,
    /// Error kind that triggered a fallback, if any
    pub error_kind: Option<String>,
}

/// Hash of a sanitized request's input
#[must_use]
pub fn hash_input(prompt: &str, system_prompt: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    if let Some(system) = system_prompt {
        hasher.update(system.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an entry
    async fn append(&self, entry: AuditEntry) -> Result<()>;
}

/// Writes entries as structured events on [`AUDIT_TARGET`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        info!(
            target: AUDIT_TARGET,
            request_id = %entry.request_id,
            input_hash = %entry.input_hash,
            provider = %entry.provider,
            confidence = ?entry.confidence,
            routing_reason = entry.routing_reason.as_deref().unwrap_or("none"),
            blocked = entry.blocked,
            escalated = entry.escalated,
            pre_guard = %entry.pre_guard_status,
            post_guard = ?entry.post_guard_status,
            prompt_tokens = entry.prompt_tokens,
            output_tokens = entry.output_tokens,
            cost_usd = entry.cost_usd,
            latency_ms = entry.latency_ms,
            error_kind = entry.error_kind.as_deref().unwrap_or("none"),
            "request completed"
        );
        Ok(())
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries appended so far
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }
}
