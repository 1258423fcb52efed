//! Per-recipient delivery results for one fan-out.

use crate::activity::MemberRef;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Which welcome protocol produced a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Members added alongside the bot get a personal welcome.
    Personal,
    /// The bot was added to a scope and re-introduces itself to every member.
    Bulk,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Personal => f.write_str("personal"),
            Protocol::Bulk => f.write_str("bulk"),
        }
    }
}

/// Step of the two-phase delivery that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStage {
    Open,
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub stage: DeliveryStage,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub member: MemberRef,
    pub protocol: Protocol,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<DeliveryFailure>,
}

impl DeliveryResult {
    pub fn delivered(member: MemberRef, protocol: Protocol) -> Self {
        Self {
            member,
            protocol,
            succeeded: true,
            failure: None,
        }
    }

    pub fn failed(
        member: MemberRef,
        protocol: Protocol,
        stage: DeliveryStage,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            member,
            protocol,
            succeeded: false,
            failure: Some(DeliveryFailure {
                stage,
                reason: reason.into(),
            }),
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.reason.as_str())
    }
}

/// Append-only log of delivery results. Cheap to clone; clones share the same log so
/// concurrent fan-out tasks can record into it.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLog {
    inner: Arc<Mutex<Vec<DeliveryResult>>>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: DeliveryResult) {
        // A poisoned lock still holds every earlier entry; keep appending.
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        g.push(result);
    }

    pub fn summary(&self) -> Vec<DeliveryResult> {
        let g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        g.clone()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|r| r.succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(|r| !r.succeeded)
    }

    fn count(&self, f: impl Fn(&DeliveryResult) -> bool) -> usize {
        let g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        g.iter().filter(|&r| f(r)).count()
    }
}
