//! Proactive welcome delivery.
//!
//! Personal protocol: each member added alongside the bot gets a new 1:1 channel and the
//! welcome artifact. Bulk protocol: when the bot itself joins a scope, every current member of
//! that scope is enumerated and welcomed the same way, with the notify flag set.
//!
//! Every recipient runs open-then-send in its own task with its own error boundary, so one
//! failing recipient never stops the others. Tasks share a semaphore that caps in-flight
//! deliveries, and both network calls are bounded by the event deadline.

use crate::activity::{ChannelAccount, ConversationEvent, MemberRef};
use crate::card::WelcomeArtifact;
use crate::connector::{Connector, ConnectorError, OpenChannelRequest};
use crate::dispatch::delivery::{DeliveryLog, DeliveryResult, DeliveryStage, Protocol};
use crate::dispatch::DispatchError;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::Instant;

/// Shared, read-only inputs for every delivery in one fan-out.
struct DeliveryContext {
    connector: Arc<dyn Connector>,
    artifact: Arc<WelcomeArtifact>,
    service_url: String,
    bot: ChannelAccount,
    tenant_id: Option<String>,
    notify: bool,
    deadline: Instant,
}

pub struct WelcomeOrchestrator {
    connector: Arc<dyn Connector>,
    artifact: Arc<WelcomeArtifact>,
    permits: Arc<Semaphore>,
}

impl WelcomeOrchestrator {
    /// `max_concurrency` caps in-flight deliveries across all events (minimum 1).
    pub fn new(
        connector: Arc<dyn Connector>,
        artifact: Arc<WelcomeArtifact>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            connector,
            artifact,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    fn context(&self, event: &ConversationEvent, deadline: Instant) -> Arc<DeliveryContext> {
        Arc::new(DeliveryContext {
            connector: self.connector.clone(),
            artifact: self.artifact.clone(),
            service_url: event.service_url.clone().unwrap_or_default(),
            bot: event.recipient.clone(),
            tenant_id: event.tenant_id().map(str::to_string),
            notify: true,
            deadline,
        })
    }

    /// Personal protocol: welcome each added non-bot member over a fresh 1:1 channel.
    pub async fn welcome_members(
        &self,
        event: &ConversationEvent,
        members: &[MemberRef],
        deadline: Instant,
        results: &DeliveryLog,
    ) {
        if members.is_empty() {
            return;
        }
        let ctx = self.context(event, deadline);
        log::debug!("dispatch: personal welcome for {} member(s)", members.len());
        self.fan_out(ctx, Protocol::Personal, members.to_vec(), results).await;
    }

    /// Bulk protocol: enumerate the team (or conversation) and welcome every member.
    /// Returns the number of recipients attempted. An enumeration failure aborts this
    /// protocol for the event; nothing is delivered.
    pub async fn reintroduce_to_scope(
        &self,
        event: &ConversationEvent,
        deadline: Instant,
        results: &DeliveryLog,
    ) -> Result<usize, DispatchError> {
        let ctx = self.context(event, deadline);
        let scope_id = event.team_or_conversation_id().to_string();
        let accounts = guarded(
            deadline,
            self.connector.list_scope_members(&ctx.service_url, &scope_id),
        )
        .await
        .map_err(|source| DispatchError::Enumeration {
            scope_id: scope_id.clone(),
            source,
        })?;

        let scope = event.scope();
        let tenant_id = event.tenant_id();
        let targets: Vec<MemberRef> = accounts
            .iter()
            .filter(|a| a.id != ctx.bot.id)
            .map(|a| MemberRef::from_account(a, scope, tenant_id))
            .collect();
        log::debug!(
            "dispatch: bulk welcome for {} member(s) of {}",
            targets.len(),
            scope_id
        );
        let attempted = targets.len();
        self.fan_out(ctx, Protocol::Bulk, targets, results).await;
        Ok(attempted)
    }

    async fn fan_out(
        &self,
        ctx: Arc<DeliveryContext>,
        protocol: Protocol,
        targets: Vec<MemberRef>,
        results: &DeliveryLog,
    ) {
        let mut workers = JoinSet::new();
        let mut pending: HashMap<task::Id, MemberRef> = HashMap::new();
        for member in targets {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    results.record(DeliveryResult::failed(
                        member,
                        protocol,
                        DeliveryStage::Open,
                        "delivery pool closed",
                    ));
                    continue;
                }
            };
            let ctx = ctx.clone();
            let target = member.clone();
            let handle = workers.spawn(async move {
                let _permit = permit;
                deliver(&ctx, target, protocol).await
            });
            pending.insert(handle.id(), member);
        }
        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    results.record(result);
                }
                Err(e) => {
                    log::error!("dispatch: delivery task did not complete: {}", e);
                    if let Some(member) = pending.remove(&e.id()) {
                        results.record(DeliveryResult::failed(
                            member,
                            protocol,
                            DeliveryStage::Open,
                            format!("delivery task failed: {}", e),
                        ));
                    }
                }
            }
        }
    }
}

/// Open a channel to one member, then send the artifact on it.
async fn deliver(ctx: &DeliveryContext, member: MemberRef, protocol: Protocol) -> DeliveryResult {
    let request = OpenChannelRequest {
        service_url: ctx.service_url.clone(),
        participant: member.clone(),
        bot: ctx.bot.clone(),
        tenant_id: member.tenant_id.clone().or_else(|| ctx.tenant_id.clone()),
    };
    let channel = match guarded(ctx.deadline, ctx.connector.open_channel(&request)).await {
        Ok(channel) => channel,
        Err(e) => {
            let reason = e.to_string();
            log::warn!(
                "dispatch: {} welcome: {}",
                protocol,
                DispatchError::ChannelOpen {
                    member_id: member.id.clone(),
                    reason: reason.clone(),
                }
            );
            return DeliveryResult::failed(member, protocol, DeliveryStage::Open, reason);
        }
    };

    let conversation_id = channel.conversation_id().to_string();
    match guarded(
        ctx.deadline,
        ctx.connector.send_message(channel, &ctx.artifact, ctx.notify),
    )
    .await
    {
        Ok(()) => {
            log::debug!(
                "dispatch: welcomed {} on conversation {}",
                member.id,
                conversation_id
            );
            DeliveryResult::delivered(member, protocol)
        }
        Err(e) => {
            let reason = e.to_string();
            log::warn!(
                "dispatch: {} welcome: {} (conversation {})",
                protocol,
                DispatchError::Delivery {
                    member_id: member.id.clone(),
                    reason: reason.clone(),
                },
                conversation_id
            );
            DeliveryResult::failed(member, protocol, DeliveryStage::Send, reason)
        }
    }
}

/// Run one connector call under the event deadline, turning a timeout or panic into an error.
async fn guarded<T>(
    deadline: Instant,
    call: impl Future<Output = Result<T, ConnectorError>>,
) -> Result<T, ConnectorError> {
    if Instant::now() >= deadline {
        return Err(ConnectorError::Timeout);
    }
    match tokio::time::timeout_at(deadline, AssertUnwindSafe(call).catch_unwind()).await {
        Err(_) => Err(ConnectorError::Timeout),
        Ok(Err(_)) => Err(ConnectorError::Panicked),
        Ok(Ok(result)) => result,
    }
}
