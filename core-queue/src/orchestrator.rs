//! # Upload Orchestrator
//!
//! The state machine and scheduler that owns the lifecycle of each queued
//! item from "awaiting approval" through terminal states.
//!
//! ## Overview
//!
//! The orchestrator coordinates the pure components into the approval flow:
//! - Prices incoming changes via `CostEstimator`
//! - Classifies them against remote state via `ConflictClassifier`
//! - Gates approvals on recorded `ConflictResolution`s
//! - Selects the payment rail via `BalanceGate` with live balances
//! - Hands accepted items to the external `ExecutionService`
//! - Ingests the host's progress events and drives retry/cancellation
//!
//! ## Ownership
//!
//! The pending queue and the execution-state map are owned exclusively by the
//! orchestrator, behind a single async mutex: one logical control thread
//! mutates state, and network-bound calls are awaited outside the lock so the
//! control path never blocks on the gateways.
//!
//! ## Failure Semantics
//!
//! Individual item failures never fail siblings or a batch. Balance
//! insufficiency is detected pre-submission and keeps the item `Approved`
//! with a surfaced warning instead of entering `Uploading`. Late events for
//! ids no longer tracked (the cancellation race) are discarded silently.

use crate::balance::{BalanceGate, BalanceSnapshot, PaymentPreference, RailSelection};
use crate::conflict::{collision_free_name, ConflictClassifier, ConflictResolution, Resolution};
use crate::cost::{CostBreakdown, CostEstimator, EstimatorConfig};
use crate::error::{QueueError, Result};
use crate::item::{ApprovalStatus, LocalChange, PendingUpload, UploadId};
use crate::tracker::{ExecutionTracker, UploadExecutionState};
use core_runtime::config::CoreConfig;
use core_runtime::events::{BalanceEvent, CoreEvent, EventBus, QueueEvent, UploadEvent};
use gateway_traits::{
    BalanceOracle, ExecutionEvent, ExecutionService, ExecutionStatus, TopUpSession, UploadPayload,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Inter-item delay during batch approval, so a large batch does not
    /// saturate the execution service
    pub batch_pacing: Duration,

    /// How long a completed item's execution state lingers before removal,
    /// letting transient UI settle
    pub settle_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_pacing: Duration::from_millis(150),
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// Result of a batch operation. Batches are best-effort, not atomic.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Items that passed the approval gate (including any left `Approved` by
    /// an insufficient balance)
    pub approved: Vec<UploadId>,
    /// Items skipped because their conflict is still unresolved
    pub skipped: Vec<UploadId>,
    /// Items whose individual processing failed, with the error message
    pub failed: Vec<(UploadId, String)>,
}

impl BatchOutcome {
    /// Total number of items the batch considered
    pub fn total(&self) -> usize {
        self.approved.len() + self.skipped.len() + self.failed.len()
    }
}

/// Everything the orchestrator mutates, behind one lock.
struct QueueState {
    items: Vec<PendingUpload>,
    resolutions: HashMap<UploadId, ConflictResolution>,
    tracker: ExecutionTracker,
    balances: Option<BalanceSnapshot>,
    preference: PaymentPreference,
}

impl QueueState {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            resolutions: HashMap::new(),
            tracker: ExecutionTracker::new(),
            balances: None,
            preference: PaymentPreference::default(),
        }
    }
}

/// The reconciliation engine's scheduler and state machine.
pub struct UploadOrchestrator {
    config: OrchestratorConfig,
    execution: Arc<dyn ExecutionService>,
    balance_oracle: Arc<dyn BalanceOracle>,
    estimator: Arc<CostEstimator>,
    classifier: Arc<ConflictClassifier>,
    event_bus: Arc<EventBus>,
    state: Arc<Mutex<QueueState>>,
    cancellation: CancellationToken,
}

impl UploadOrchestrator {
    /// Create a new orchestrator from its collaborators.
    pub fn new(
        config: OrchestratorConfig,
        execution: Arc<dyn ExecutionService>,
        balance_oracle: Arc<dyn BalanceOracle>,
        estimator: Arc<CostEstimator>,
        classifier: Arc<ConflictClassifier>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            execution,
            balance_oracle,
            estimator,
            classifier,
            event_bus,
            state: Arc::new(Mutex::new(QueueState::new())),
            cancellation: CancellationToken::new(),
        }
    }

    /// Wire an orchestrator from a validated core configuration.
    pub fn with_core_config(core: &CoreConfig, config: OrchestratorConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(core.event_buffer_size));
        let estimator = Arc::new(CostEstimator::new(
            Arc::clone(&core.price_oracle),
            EstimatorConfig::from(core),
        ));
        let classifier = Arc::new(ConflictClassifier::new(Arc::clone(&core.remote_lookup)));

        Self::new(
            config,
            Arc::clone(&core.execution_service),
            Arc::clone(&core.balance_oracle),
            estimator,
            classifier,
            event_bus,
        )
    }

    /// The event bus this orchestrator publishes on
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    // ========================================================================
    // Queue Intake
    // ========================================================================

    /// Price and classify a detected change, then append it to the pending
    /// queue.
    #[instrument(skip(self, change), fields(file = %change.file_name))]
    pub async fn enqueue(&self, change: LocalChange) -> Result<UploadId> {
        change.validate()?;

        let cost = self
            .estimator
            .estimate(change.operation, change.file_size)
            .await;
        let (conflict, details) = self.classifier.classify(&change).await;

        let mut item = PendingUpload::from_change(change, cost, conflict, details)?;

        let mut state = self.state.lock().await;
        if let (Some(balances), Some(credit_cost), false) =
            (state.balances.as_ref(), item.cost.credit_cost, item.cost.free)
        {
            item.has_sufficient_credit_balance = Some(balances.credit_balance >= credit_cost);
        }

        let id = item.id;
        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::ItemQueued {
                upload_id: id.as_str(),
                file_name: item.file_name.clone(),
                operation: item.operation.as_str().to_string(),
            }))
            .ok();

        if let Some(details) = &item.conflict_details {
            self.event_bus
                .emit(CoreEvent::Queue(QueueEvent::ConflictDetected {
                    upload_id: id.as_str(),
                    conflict: item.conflict.as_str().to_string(),
                    details: details.clone(),
                }))
                .ok();
        }

        info!(
            upload_id = %id,
            conflict = %item.conflict,
            free = item.cost.free,
            "Change queued for approval"
        );
        state.items.push(item);
        Ok(id)
    }

    /// Record an operator decision for a conflicted item. Write-once: a
    /// second resolution for the same id is an error, and changing a decision
    /// requires [`withdraw`](Self::withdraw) plus re-enqueueing.
    ///
    /// A `Skip` decision immediately excludes the item from this queue cycle.
    pub async fn resolve_conflict(&self, resolution: ConflictResolution) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = resolution.upload_id;

        if state.resolutions.contains_key(&id) {
            return Err(QueueError::ResolutionExists {
                upload_id: id.as_str(),
            });
        }

        let decision = resolution.resolution;
        let item = Self::find_item_mut(&mut state.items, &id)?;

        if !decision.is_valid_for(item.conflict) {
            return Err(QueueError::InvalidResolution {
                resolution: decision.as_str().to_string(),
                conflict: item.conflict.as_str().to_string(),
            });
        }

        if decision == Resolution::Skip {
            item.mark_rejected()?;
        }

        state.resolutions.insert(id, resolution);

        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::ConflictResolved {
                upload_id: id.as_str(),
                resolution: decision.as_str().to_string(),
            }))
            .ok();
        if decision == Resolution::Skip {
            self.event_bus
                .emit(CoreEvent::Queue(QueueEvent::ItemRejected {
                    upload_id: id.as_str(),
                }))
                .ok();
        }

        info!(upload_id = %id, resolution = %decision, "Conflict resolved");
        Ok(())
    }

    /// Remove an item from the queue, along with any recorded resolution.
    ///
    /// This is the revocation path: withdrawing and re-enqueueing is the only
    /// way to change a recorded decision.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids and for items currently being executed.
    pub async fn withdraw(&self, id: UploadId) -> Result<PendingUpload> {
        let mut state = self.state.lock().await;

        if state.tracker.contains(&id) {
            return Err(QueueError::ItemInFlight {
                upload_id: id.as_str(),
            });
        }

        let idx = state
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| QueueError::ItemNotFound {
                upload_id: id.as_str(),
            })?;

        let item = state.items.remove(idx);
        state.resolutions.remove(&id);

        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::ItemWithdrawn {
                upload_id: id.as_str(),
            }))
            .ok();
        Ok(item)
    }

    // ========================================================================
    // Approval Gate
    // ========================================================================

    /// Approve one item and, if its rail is covered, submit it for execution.
    ///
    /// Conflicted items require a recorded resolution. A `UseRemote`
    /// resolution completes without publishing anything. Insufficient balance
    /// leaves the item `Approved` with a surfaced warning — it never enters
    /// `Uploading`.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: UploadId) -> Result<RailSelection> {
        {
            let mut state = self.state.lock().await;
            let has_resolution = state.resolutions.contains_key(&id);
            let tracked = state.tracker.contains(&id);
            let item = Self::find_item_mut(&mut state.items, &id)?;

            if item.conflict.requires_resolution() && !has_resolution {
                return Err(QueueError::UnresolvedConflict {
                    upload_id: id.as_str(),
                    conflict: item.conflict.as_str().to_string(),
                });
            }

            match item.status {
                ApprovalStatus::AwaitingApproval => {
                    item.mark_approved()?;
                    self.event_bus
                        .emit(CoreEvent::Queue(QueueEvent::ItemApproved {
                            upload_id: id.as_str(),
                        }))
                        .ok();
                }
                // An approved item with no live execution state is the way
                // back after an insufficient balance or a cancellation;
                // approving it again just resubmits.
                ApprovalStatus::Approved if !tracked => {}
                _ => {
                    return Err(QueueError::InvalidStateTransition {
                        from: item.status.as_str().to_string(),
                        to: "approved".to_string(),
                        reason: "item is already executing or terminal".to_string(),
                    });
                }
            }

            let use_remote = state
                .resolutions
                .get(&id)
                .map(|r| r.resolution == Resolution::UseRemote)
                .unwrap_or(false);

            if use_remote {
                // Nothing to publish: the local file is reconciled to match
                // remote by the metadata layer. The item's work is done.
                if let Some(idx) = state.items.iter().position(|i| i.id == id) {
                    state.items.remove(idx);
                }
                state.resolutions.remove(&id);
                self.event_bus
                    .emit(CoreEvent::Queue(QueueEvent::RefreshRequested))
                    .ok();
                info!(upload_id = %id, "Approved with use_remote; reconciled locally");
                return Ok(RailSelection::Free);
            }
        }

        self.submit_approved(id).await
    }

    /// Reject one item. Terminal.
    pub async fn reject(&self, id: UploadId) -> Result<()> {
        let mut state = self.state.lock().await;
        let item = Self::find_item_mut(&mut state.items, &id)?;
        item.mark_rejected()?;

        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::ItemRejected {
                upload_id: id.as_str(),
            }))
            .ok();
        info!(upload_id = %id, "Item rejected");
        Ok(())
    }

    /// Approve every awaiting item, in queue order, with inter-item pacing.
    ///
    /// Items with an unresolved conflict are skipped and remain awaiting.
    /// Per-item failures are collected, never propagated — a failing item
    /// does not abort the batch.
    pub async fn approve_all(&self) -> BatchOutcome {
        let candidates: Vec<(UploadId, bool)> = {
            let state = self.state.lock().await;
            state
                .items
                .iter()
                .filter(|i| i.status == ApprovalStatus::AwaitingApproval)
                .map(|i| {
                    let unresolved = i.conflict.requires_resolution()
                        && !state.resolutions.contains_key(&i.id);
                    (i.id, unresolved)
                })
                .collect()
        };

        let mut outcome = BatchOutcome::default();
        let mut first = true;

        for (id, unresolved) in candidates {
            if unresolved {
                debug!(upload_id = %id, "Skipping unresolved conflict in batch approval");
                outcome.skipped.push(id);
                continue;
            }

            if !first {
                tokio::time::sleep(self.config.batch_pacing).await;
            }
            first = false;

            match self.approve(id).await {
                Ok(_) => outcome.approved.push(id),
                Err(e) => {
                    warn!(upload_id = %id, "Batch approval item failed: {e}");
                    outcome.failed.push((id, e.to_string()));
                }
            }
        }

        info!(
            approved = outcome.approved.len(),
            skipped = outcome.skipped.len(),
            failed = outcome.failed.len(),
            "Batch approval finished"
        );
        outcome
    }

    /// Reject every awaiting item. Returns the ids that were rejected.
    pub async fn reject_all(&self) -> Vec<UploadId> {
        let ids: Vec<UploadId> = {
            let state = self.state.lock().await;
            state
                .items
                .iter()
                .filter(|i| i.status == ApprovalStatus::AwaitingApproval)
                .map(|i| i.id)
                .collect()
        };

        let mut rejected = Vec::new();
        for id in ids {
            if self.reject(id).await.is_ok() {
                rejected.push(id);
            }
        }
        rejected
    }

    // ========================================================================
    // Execution Lifecycle
    // ========================================================================

    /// Resubmit a failed item, clearing its prior error and progress.
    ///
    /// # Errors
    ///
    /// Only valid from the `Failed` execution state; anything else is an
    /// explicit error, never a silent resubmission.
    #[instrument(skip(self))]
    pub async fn retry(&self, id: UploadId) -> Result<RailSelection> {
        {
            let mut state = self.state.lock().await;
            match state.tracker.get(&id).map(|s| s.status) {
                Some(ExecutionStatus::Failed) => {}
                Some(other) => {
                    return Err(QueueError::InvalidStateTransition {
                        from: other.as_str().to_string(),
                        to: "uploading".to_string(),
                        reason: "only failed uploads can be retried".to_string(),
                    });
                }
                None => {
                    return Err(QueueError::InvalidStateTransition {
                        from: "untracked".to_string(),
                        to: "uploading".to_string(),
                        reason: "only failed uploads can be retried".to_string(),
                    });
                }
            }
            state.tracker.remove(&id);
            self.event_bus
                .emit(CoreEvent::Upload(UploadEvent::Retried {
                    upload_id: id.as_str(),
                }))
                .ok();
        }

        self.submit_approved(id).await
    }

    /// Cancel an in-flight upload.
    ///
    /// Best-effort: the execution service is notified, but local bookkeeping
    /// is cleared immediately without waiting for confirmation. The item
    /// returns to `Approved`, not to `AwaitingApproval`. A late completion
    /// event from the host is tolerated and discarded.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: UploadId) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match state.tracker.get(&id).map(|s| s.status) {
                Some(ExecutionStatus::Uploading) => {}
                other => {
                    return Err(QueueError::InvalidStateTransition {
                        from: other
                            .map(|s| s.as_str().to_string())
                            .unwrap_or_else(|| "untracked".to_string()),
                        to: "cancelled".to_string(),
                        reason: "only uploading items can be cancelled".to_string(),
                    });
                }
            }
            state.tracker.remove(&id);
        }

        if let Err(e) = self.execution.cancel(&id.as_str()).await {
            // Advisory only; the local state is already cleared.
            warn!(upload_id = %id, "Cancellation request failed: {e}");
        }

        self.event_bus
            .emit(CoreEvent::Upload(UploadEvent::Cancelled {
                upload_id: id.as_str(),
            }))
            .ok();
        info!(upload_id = %id, "Upload cancelled");
        Ok(())
    }

    /// Ingest one progress event from the execution service.
    ///
    /// Events for unknown or no-longer-tracked ids are discarded at debug
    /// level: after a cancellation the host may still deliver terminal
    /// events, and treating them as errors would turn an expected race into
    /// noise.
    pub async fn ingest(&self, event: ExecutionEvent) {
        let Ok(id) = UploadId::from_string(&event.upload_id) else {
            debug!(upload_id = %event.upload_id, "Discarding event with malformed id");
            return;
        };

        let mut state = self.state.lock().await;
        let Some(exec) = state.tracker.get_mut(&id) else {
            debug!(upload_id = %id, "Discarding event for untracked upload");
            return;
        };

        match event.status {
            ExecutionStatus::Uploading => {
                if exec.update_progress(event.progress) {
                    let percent = exec.progress;
                    self.event_bus
                        .emit(CoreEvent::Upload(UploadEvent::Progress {
                            upload_id: id.as_str(),
                            percent,
                        }))
                        .ok();
                }
            }
            ExecutionStatus::Failed => {
                let message = event
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown execution error".to_string());
                exec.mark_failed(event.error);
                warn!(upload_id = %id, "Upload failed: {message}");
                // Surfaced to the operator with a retry affordance; no
                // automatic resubmission.
                self.event_bus
                    .emit(CoreEvent::Upload(UploadEvent::Failed {
                        upload_id: id.as_str(),
                        message,
                    }))
                    .ok();
            }
            ExecutionStatus::Completed => {
                exec.mark_completed();

                // The published item leaves the queue; its transient
                // execution state lingers for the settle delay.
                if let Some(idx) = state.items.iter().position(|i| i.id == id) {
                    state.items.remove(idx);
                }
                state.resolutions.remove(&id);
                drop(state);

                info!(upload_id = %id, "Upload completed");
                self.event_bus
                    .emit(CoreEvent::Upload(UploadEvent::Completed {
                        upload_id: id.as_str(),
                    }))
                    .ok();
                self.event_bus
                    .emit(CoreEvent::Queue(QueueEvent::RefreshRequested))
                    .ok();
                self.event_bus
                    .emit(CoreEvent::Balance(BalanceEvent::RefreshRequested))
                    .ok();

                self.schedule_settle_removal(id);
            }
        }
    }

    /// Consume a typed event channel until it closes or the orchestrator is
    /// shut down. External publishers push [`ExecutionEvent`]s into the
    /// sending half; the orchestrator is the channel's only consumer.
    pub async fn run(&self, mut events: mpsc::Receiver<ExecutionEvent>) {
        info!("Upload orchestrator event loop started");
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => break,
                maybe = events.recv() => match maybe {
                    Some(event) => self.ingest(event).await,
                    None => break,
                },
            }
        }
        info!("Upload orchestrator event loop stopped");
    }

    /// Stop the event loop and any pending settle-delay cleanups.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    // ========================================================================
    // Balances & Snapshots
    // ========================================================================

    /// Fetch live balances, falling back to the last cached snapshot when the
    /// oracle is unreachable. Never blocks the approval flow on oracle
    /// failure.
    pub async fn refresh_balances(&self) -> BalanceSnapshot {
        let token = self.balance_oracle.token_balance().await;
        let credit = self.balance_oracle.credit_balance().await;

        match (token, credit) {
            (Ok(token_balance), Ok(credit_balance)) => {
                let snapshot = BalanceSnapshot::new(token_balance, credit_balance);
                let mut state = self.state.lock().await;
                state.balances = Some(snapshot);
                self.event_bus
                    .emit(CoreEvent::Balance(BalanceEvent::Updated {
                        token_balance,
                        credit_balance,
                    }))
                    .ok();
                snapshot
            }
            (token_res, credit_res) => {
                let message = token_res
                    .err()
                    .or_else(|| credit_res.err())
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown oracle error".to_string());
                warn!("Balance oracle unavailable, using cached balances: {message}");
                self.event_bus
                    .emit(CoreEvent::Balance(BalanceEvent::OracleDegraded { message }))
                    .ok();

                let state = self.state.lock().await;
                state.balances.unwrap_or_else(BalanceSnapshot::empty)
            }
        }
    }

    /// Create a prepaid-credit top-up session with the payment processor.
    pub async fn top_up_credits(&self, credit_amount: u64) -> Result<TopUpSession> {
        Ok(self
            .balance_oracle
            .create_top_up_session(credit_amount)
            .await?)
    }

    /// Snapshot of the pending queue, in queue order
    pub async fn pending_items(&self) -> Vec<PendingUpload> {
        self.state.lock().await.items.clone()
    }

    /// Live execution state for one item, if tracked
    pub async fn execution_state(&self, id: UploadId) -> Option<UploadExecutionState> {
        self.state.lock().await.tracker.get(&id).cloned()
    }

    /// Snapshot of all live execution states
    pub async fn execution_snapshot(&self) -> Vec<(UploadId, UploadExecutionState)> {
        self.state.lock().await.tracker.snapshot()
    }

    /// Aggregate cost over the conflict-free, non-rejected portion of the
    /// queue, using the last known balances.
    pub async fn cost_breakdown(&self) -> CostBreakdown {
        let state = self.state.lock().await;
        let balances = state.balances.unwrap_or_else(BalanceSnapshot::empty);
        let items: Vec<PendingUpload> = state
            .items
            .iter()
            .filter(|i| i.status != ApprovalStatus::Rejected)
            .cloned()
            .collect();
        CostBreakdown::compute(&items, &balances, state.preference)
    }

    /// Set the global payment-method preference
    pub async fn set_payment_preference(&self, preference: PaymentPreference) {
        let mut state = self.state.lock().await;
        state.preference = preference;
        info!(preference = %preference, "Payment preference updated");
    }

    /// The current payment-method preference
    pub async fn payment_preference(&self) -> PaymentPreference {
        self.state.lock().await.preference
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Select the rail for an approved item and submit it when covered.
    async fn submit_approved(&self, id: UploadId) -> Result<RailSelection> {
        let balances = self.refresh_balances().await;

        let (payload, rail) = {
            let mut state = self.state.lock().await;
            let preference = state.preference;
            let resolution = state.resolutions.get(&id).map(|r| r.resolution);
            let item = Self::find_item_mut(&mut state.items, &id)?;

            if item.status != ApprovalStatus::Approved {
                return Err(QueueError::InvalidStateTransition {
                    from: item.status.as_str().to_string(),
                    to: "uploading".to_string(),
                    reason: "only approved items can be submitted".to_string(),
                });
            }

            let rail = BalanceGate::select_rail(&item.cost, &balances, preference);
            if !rail.is_sufficient() {
                let available = match rail {
                    RailSelection::Credit { .. } => balances.credit_balance,
                    RailSelection::Token { .. } => balances.token_balance,
                    RailSelection::Free => 0,
                };
                warn!(
                    upload_id = %id,
                    rail = %rail.rail(),
                    required = rail.cost(),
                    available,
                    "Insufficient balance; submission blocked"
                );
                self.event_bus
                    .emit(CoreEvent::Upload(UploadEvent::InsufficientBalance {
                        upload_id: id.as_str(),
                        rail: rail.rail().as_str().to_string(),
                        required: rail.cost(),
                        available,
                    }))
                    .ok();
                return Ok(rail);
            }

            let mut file_name = item.file_name.clone();
            if resolution == Some(Resolution::KeepBoth) {
                file_name = collision_free_name(&file_name, 1);
            }

            let payload = UploadPayload {
                local_path: item.local_path.clone(),
                file_name,
                file_size: item.file_size,
                operation: item.operation,
                previous_path: item.previous_path.clone(),
                content_hash: item.content_hash.clone(),
                content: None,
            };

            state.tracker.start(id);
            (payload, rail)
        };

        match self.execution.submit(&id.as_str(), payload, rail.rail()).await {
            Ok(_ack) => {
                info!(upload_id = %id, rail = %rail.rail(), "Upload submitted");
                self.event_bus
                    .emit(CoreEvent::Upload(UploadEvent::Submitted {
                        upload_id: id.as_str(),
                        rail: rail.rail().as_str().to_string(),
                    }))
                    .ok();
                Ok(rail)
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                if let Some(exec) = state.tracker.get_mut(&id) {
                    exec.mark_failed(Some(e.to_string()));
                }
                self.event_bus
                    .emit(CoreEvent::Upload(UploadEvent::Failed {
                        upload_id: id.as_str(),
                        message: e.to_string(),
                    }))
                    .ok();
                Err(e.into())
            }
        }
    }

    /// Clear the completed execution state after the settle delay, unless a
    /// shutdown arrives first.
    fn schedule_settle_removal(&self, id: UploadId) {
        let state = Arc::clone(&self.state);
        let token = self.cancellation.clone();
        let delay = self.config.settle_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let mut state = state.lock().await;
                    let completed = state
                        .tracker
                        .get(&id)
                        .map(|s| s.status == ExecutionStatus::Completed)
                        .unwrap_or(false);
                    if completed {
                        state.tracker.remove(&id);
                    }
                }
            }
        });
    }

    fn find_item_mut<'a>(
        items: &'a mut [PendingUpload],
        id: &UploadId,
    ) -> Result<&'a mut PendingUpload> {
        items
            .iter_mut()
            .find(|i| i.id == *id)
            .ok_or_else(|| QueueError::ItemNotFound {
                upload_id: id.as_str(),
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
