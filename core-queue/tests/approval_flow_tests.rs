//! Integration tests for the approval flow
//!
//! These tests exercise the complete reconciliation path with scripted
//! gateway implementations:
//! - Free-tier, credit, and token rail selection at approval time
//! - Conflict gating, write-once resolutions, and batch approval
//! - Retry, cancellation, and the cancellation/completion race
//! - Progress ingestion and settle-delay cleanup

use async_trait::async_trait;
use core_queue::{
    ApprovalStatus, ConflictResolution, ConflictType, CostEstimator, ConflictClassifier,
    EstimatorConfig, LocalChange, OrchestratorConfig, PaymentPreference, RailSelection,
    Resolution, UploadId, UploadOrchestrator,
};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent, UploadEvent};
use gateway_traits::{
    error::{GatewayError, Result as GatewayResult},
    BalanceOracle, ExecutionEvent, ExecutionService, ExecutionStatus, OperationKind, PaymentRail,
    PriceOracle, RemoteDescriptor, RemoteStateLookup, SubmitAck, TopUpSession, UploadPayload,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

// ============================================================================
// Scripted Gateway Implementations
// ============================================================================

/// Execution service that records submissions instead of broadcasting
struct RecordingExecution {
    submissions: AsyncMutex<Vec<(String, UploadPayload, PaymentRail)>>,
    cancels: AsyncMutex<Vec<String>>,
    fail_submit: AtomicBool,
}

impl RecordingExecution {
    fn new() -> Self {
        Self {
            submissions: AsyncMutex::new(Vec::new()),
            cancels: AsyncMutex::new(Vec::new()),
            fail_submit: AtomicBool::new(false),
        }
    }

    async fn submission_count(&self) -> usize {
        self.submissions.lock().await.len()
    }

    async fn last_submission(&self) -> Option<(String, UploadPayload, PaymentRail)> {
        self.submissions.lock().await.last().cloned()
    }

    async fn cancel_count(&self) -> usize {
        self.cancels.lock().await.len()
    }
}

#[async_trait]
impl ExecutionService for RecordingExecution {
    async fn submit(
        &self,
        upload_id: &str,
        payload: UploadPayload,
        rail: PaymentRail,
    ) -> GatewayResult<SubmitAck> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(GatewayError::OperationFailed(
                "daemon unreachable".to_string(),
            ));
        }
        self.submissions
            .lock()
            .await
            .push((upload_id.to_string(), payload, rail));
        Ok(SubmitAck {
            upload_id: upload_id.to_string(),
            accepted_at: 0,
        })
    }

    async fn cancel(&self, upload_id: &str) -> GatewayResult<()> {
        self.cancels.lock().await.push(upload_id.to_string());
        Ok(())
    }
}

/// Balance oracle with adjustable balances and a failure switch
struct ScriptedBalances {
    token: AtomicU64,
    credit: AtomicU64,
    fail: AtomicBool,
}

impl ScriptedBalances {
    fn new(token: u64, credit: u64) -> Self {
        Self {
            token: AtomicU64::new(token),
            credit: AtomicU64::new(credit),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BalanceOracle for ScriptedBalances {
    async fn token_balance(&self) -> GatewayResult<u64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::OperationFailed("wallet offline".to_string()));
        }
        Ok(self.token.load(Ordering::SeqCst))
    }

    async fn credit_balance(&self) -> GatewayResult<u64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::OperationFailed("wallet offline".to_string()));
        }
        Ok(self.credit.load(Ordering::SeqCst))
    }

    async fn create_top_up_session(&self, _credit_amount: u64) -> GatewayResult<TopUpSession> {
        Ok(TopUpSession {
            session_id: "session-1".to_string(),
            checkout_url: "https://pay.example/checkout/session-1".to_string(),
            expires_at: i64::MAX,
        })
    }
}

/// Price oracle quoting fixed totals regardless of byte count
struct ScriptedPrices {
    token_price: u64,
    credit_price: u64,
}

#[async_trait]
impl PriceOracle for ScriptedPrices {
    async fn token_price_for_bytes(&self, _bytes: u64) -> GatewayResult<u64> {
        Ok(self.token_price)
    }

    async fn credit_cost_for_bytes(&self, _bytes: u64) -> GatewayResult<u64> {
        Ok(self.credit_price)
    }
}

/// Remote lookup over a fixed descriptor table, matching by path, then
/// content hash, then file name
struct ScriptedRemote {
    entries: AsyncMutex<Vec<RemoteDescriptor>>,
}

impl ScriptedRemote {
    fn new() -> Self {
        Self {
            entries: AsyncMutex::new(Vec::new()),
        }
    }

    async fn publish(&self, entry: RemoteDescriptor) {
        self.entries.lock().await.push(entry);
    }
}

#[async_trait]
impl RemoteStateLookup for ScriptedRemote {
    async fn find(
        &self,
        local_path: &Path,
        content_hash: Option<&str>,
    ) -> GatewayResult<Option<RemoteDescriptor>> {
        let entries = self.entries.lock().await;
        let by_path = entries.iter().find(|e| e.path == local_path);
        let by_hash = || {
            content_hash.and_then(|hash| {
                entries
                    .iter()
                    .find(|e| e.content_hash.as_deref() == Some(hash))
            })
        };
        let by_name = || {
            local_path.file_name().and_then(|name| {
                entries
                    .iter()
                    .find(|e| e.file_name.as_str() == name.to_string_lossy())
            })
        };
        Ok(by_path.or_else(by_hash).or_else(by_name).cloned())
    }
}

// ============================================================================
// Harness
// ============================================================================

const FREE_THRESHOLD: u64 = 100 * 1024;

struct Harness {
    orchestrator: UploadOrchestrator,
    execution: Arc<RecordingExecution>,
    balances: Arc<ScriptedBalances>,
    remote: Arc<ScriptedRemote>,
}

fn harness_with(token_price: u64, credit_price: u64, balances: ScriptedBalances) -> Harness {
    let execution = Arc::new(RecordingExecution::new());
    let balances = Arc::new(balances);
    let remote = Arc::new(ScriptedRemote::new());

    let estimator = Arc::new(CostEstimator::new(
        Arc::new(ScriptedPrices {
            token_price,
            credit_price,
        }),
        EstimatorConfig {
            free_threshold_bytes: FREE_THRESHOLD,
            default_token_rate: 1.0,
            default_credit_rate: 1.0,
        },
    ));
    let classifier = Arc::new(ConflictClassifier::new(
        Arc::clone(&remote) as Arc<dyn RemoteStateLookup>
    ));

    let orchestrator = UploadOrchestrator::new(
        OrchestratorConfig {
            batch_pacing: Duration::from_millis(1),
            settle_delay: Duration::from_millis(50),
        },
        Arc::clone(&execution) as Arc<dyn ExecutionService>,
        Arc::clone(&balances) as Arc<dyn BalanceOracle>,
        estimator,
        classifier,
        Arc::new(EventBus::new(100)),
    );

    Harness {
        orchestrator,
        execution,
        balances,
        remote,
    }
}

fn harness() -> Harness {
    harness_with(40_000, 8_000, ScriptedBalances::new(1_000_000, 1_000_000))
}

fn upload_change(name: &str, size: u64, hash: Option<&str>) -> LocalChange {
    LocalChange {
        local_path: PathBuf::from(format!("/drive/{name}")),
        file_name: name.to_string(),
        file_size: size,
        operation: OperationKind::Upload,
        previous_path: None,
        content_hash: hash.map(String::from),
    }
}

fn published(name: &str, path: &str, hash: Option<&str>) -> RemoteDescriptor {
    RemoteDescriptor {
        remote_id: format!("remote-{name}"),
        path: PathBuf::from(path),
        file_name: name.to_string(),
        content_hash: hash.map(String::from),
        size: 1024,
        hidden: false,
        modified_at: Some(0),
    }
}

fn progress_event(id: UploadId, progress: u8) -> ExecutionEvent {
    ExecutionEvent {
        upload_id: id.as_str(),
        progress,
        status: ExecutionStatus::Uploading,
        error: None,
    }
}

fn completed_event(id: UploadId) -> ExecutionEvent {
    ExecutionEvent {
        upload_id: id.as_str(),
        progress: 100,
        status: ExecutionStatus::Completed,
        error: None,
    }
}

fn failed_event(id: UploadId, message: &str) -> ExecutionEvent {
    ExecutionEvent {
        upload_id: id.as_str(),
        progress: 0,
        status: ExecutionStatus::Failed,
        error: Some(message.to_string()),
    }
}

// ============================================================================
// Rail Selection Scenarios
// ============================================================================

#[tokio::test]
async fn test_small_file_uploads_on_free_rail() {
    // Scenario A: 50KB under a 100KB threshold
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("notes.txt", 50 * 1024, None))
        .await
        .unwrap();

    let rail = h.orchestrator.approve(id).await.unwrap();

    assert_eq!(rail, RailSelection::Free);
    let (submitted_id, _, submitted_rail) = h.execution.last_submission().await.unwrap();
    assert_eq!(submitted_id, id.as_str());
    assert_eq!(submitted_rail, PaymentRail::Free);

    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.status, ExecutionStatus::Uploading);
}

#[tokio::test]
async fn test_auto_preference_selects_credit() {
    // Scenario B: 5MB file, credit balance covers the credit cost
    let h = harness_with(40_000, 8_000, ScriptedBalances::new(0, 10_000));
    let id = h
        .orchestrator
        .enqueue(upload_change("video.mp4", 5 * 1024 * 1024, None))
        .await
        .unwrap();

    let rail = h.orchestrator.approve(id).await.unwrap();

    assert_eq!(
        rail,
        RailSelection::Credit {
            cost: 8_000,
            sufficient: true
        }
    );
    let (_, _, submitted_rail) = h.execution.last_submission().await.unwrap();
    assert_eq!(submitted_rail, PaymentRail::Credit);
}

#[tokio::test]
async fn test_credit_only_insufficiency_blocks_submission() {
    // Scenario C: zero credits under a pinned credit preference
    let h = harness_with(40_000, 8_000, ScriptedBalances::new(1_000_000, 0));
    h.orchestrator
        .set_payment_preference(PaymentPreference::CreditOnly)
        .await;

    let id = h
        .orchestrator
        .enqueue(upload_change("video.mp4", 5 * 1024 * 1024, None))
        .await
        .unwrap();

    let rail = h.orchestrator.approve(id).await.unwrap();

    assert!(!rail.is_sufficient());
    assert_eq!(rail.rail(), PaymentRail::Credit);

    // Submission blocked; the item stays approved, never uploading
    assert_eq!(h.execution.submission_count().await, 0);
    assert!(h.orchestrator.execution_state(id).await.is_none());

    let items = h.orchestrator.pending_items().await;
    assert_eq!(items[0].status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn test_degraded_oracle_blocks_paid_allows_free() {
    let h = harness();
    h.balances.fail.store(true, Ordering::SeqCst);

    // With no cached balances, a paid item reads as insufficient
    let paid = h
        .orchestrator
        .enqueue(upload_change("big.bin", 5 * 1024 * 1024, None))
        .await
        .unwrap();
    let rail = h.orchestrator.approve(paid).await.unwrap();
    assert!(!rail.is_sufficient());
    assert_eq!(h.execution.submission_count().await, 0);

    // Free items are unaffected by oracle health
    let free = h
        .orchestrator
        .enqueue(upload_change("tiny.txt", 10, None))
        .await
        .unwrap();
    let rail = h.orchestrator.approve(free).await.unwrap();
    assert_eq!(rail, RailSelection::Free);
    assert_eq!(h.execution.submission_count().await, 1);
}

// ============================================================================
// Conflict Scenarios
// ============================================================================

#[tokio::test]
async fn test_duplicate_skip_leaves_it_uncounted() {
    // Scenario D: identical content hash at the same target path
    let h = harness();
    let _first = h
        .orchestrator
        .enqueue(upload_change("song.mp3", 200 * 1024, Some("hash-1")))
        .await
        .unwrap();

    // The first copy gets published
    h.remote
        .publish(published("song.mp3", "/drive/song.mp3", Some("hash-1")))
        .await;

    let second = h
        .orchestrator
        .enqueue(upload_change("song.mp3", 200 * 1024, Some("hash-1")))
        .await
        .unwrap();

    let items = h.orchestrator.pending_items().await;
    let dup = items.iter().find(|i| i.id == second).unwrap();
    assert_eq!(dup.conflict, ConflictType::Duplicate);
    assert!(dup.conflict_details.is_some());

    h.orchestrator
        .resolve_conflict(ConflictResolution::new(second, Resolution::Skip))
        .await
        .unwrap();

    // Skipped item is terminal and uncounted in the breakdown
    let items = h.orchestrator.pending_items().await;
    let dup = items.iter().find(|i| i.id == second).unwrap();
    assert_eq!(dup.status, ApprovalStatus::Rejected);

    let breakdown = h.orchestrator.cost_breakdown().await;
    assert_eq!(breakdown.total_files(), 1);
}

#[tokio::test]
async fn test_approve_requires_resolution_for_conflicts() {
    let h = harness();
    h.remote
        .publish(published("report.pdf", "/drive/report.pdf", Some("old-hash")))
        .await;

    let id = h
        .orchestrator
        .enqueue(upload_change("report.pdf", 500 * 1024, Some("new-hash")))
        .await
        .unwrap();

    let items = h.orchestrator.pending_items().await;
    assert_eq!(items[0].conflict, ConflictType::ContentConflict);

    let result = h.orchestrator.approve(id).await;
    assert!(result.is_err());

    // Still awaiting after the refused approval
    let items = h.orchestrator.pending_items().await;
    assert_eq!(items[0].status, ApprovalStatus::AwaitingApproval);
}

#[tokio::test]
async fn test_resolution_is_write_once() {
    let h = harness();
    h.remote
        .publish(published("report.pdf", "/drive/report.pdf", Some("old-hash")))
        .await;

    let id = h
        .orchestrator
        .enqueue(upload_change("report.pdf", 500 * 1024, Some("new-hash")))
        .await
        .unwrap();

    h.orchestrator
        .resolve_conflict(ConflictResolution::new(id, Resolution::KeepLocal))
        .await
        .unwrap();

    let again = h
        .orchestrator
        .resolve_conflict(ConflictResolution::new(id, Resolution::Skip))
        .await;
    assert!(again.is_err());

    // Revocation path: withdraw drops the resolution, re-enqueueing starts
    // fresh
    let item = h.orchestrator.withdraw(id).await.unwrap();
    assert_eq!(item.id, id);

    let fresh = h
        .orchestrator
        .enqueue(upload_change("report.pdf", 500 * 1024, Some("new-hash")))
        .await
        .unwrap();
    h.orchestrator
        .resolve_conflict(ConflictResolution::new(fresh, Resolution::Skip))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_use_remote_completes_without_publishing() {
    let h = harness();
    h.remote
        .publish(published("report.pdf", "/drive/report.pdf", Some("old-hash")))
        .await;

    let id = h
        .orchestrator
        .enqueue(upload_change("report.pdf", 500 * 1024, Some("new-hash")))
        .await
        .unwrap();

    h.orchestrator
        .resolve_conflict(ConflictResolution::new(id, Resolution::UseRemote))
        .await
        .unwrap();

    let rail = h.orchestrator.approve(id).await.unwrap();
    assert_eq!(rail, RailSelection::Free);

    // Nothing submitted; the item left the queue
    assert_eq!(h.execution.submission_count().await, 0);
    assert!(h.orchestrator.pending_items().await.is_empty());
}

#[tokio::test]
async fn test_keep_both_renames_before_submission() {
    let h = harness();
    h.remote
        .publish(published("photo.jpg", "/drive/photo.jpg", Some("old-hash")))
        .await;

    let id = h
        .orchestrator
        .enqueue(upload_change("photo.jpg", 500 * 1024, Some("new-hash")))
        .await
        .unwrap();

    h.orchestrator
        .resolve_conflict(ConflictResolution::new(id, Resolution::KeepBoth))
        .await
        .unwrap();

    h.orchestrator.approve(id).await.unwrap();

    let (_, payload, _) = h.execution.last_submission().await.unwrap();
    assert_eq!(payload.file_name, "photo (1).jpg");
}

#[tokio::test]
async fn test_invalid_resolution_for_class_rejected() {
    let h = harness();
    h.remote
        .publish(published("song.mp3", "/drive/song.mp3", Some("hash-1")))
        .await;

    let id = h
        .orchestrator
        .enqueue(upload_change("song.mp3", 200 * 1024, Some("hash-1")))
        .await
        .unwrap();

    // UseRemote makes no sense for a duplicate
    let result = h
        .orchestrator
        .resolve_conflict(ConflictResolution::new(id, Resolution::UseRemote))
        .await;
    assert!(result.is_err());
}

// ============================================================================
// Batch Operations
// ============================================================================

#[tokio::test]
async fn test_approve_all_skips_unresolved_conflicts() {
    // Scenario E: 3 items, #2 has an unresolved filename conflict
    let h = harness();

    let first = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();

    h.remote
        .publish(published("b.txt", "/drive/archive/b.txt", Some("other")))
        .await;
    let second = h
        .orchestrator
        .enqueue(upload_change("b.txt", 10, Some("mine")))
        .await
        .unwrap();

    let third = h
        .orchestrator
        .enqueue(upload_change("c.txt", 10, None))
        .await
        .unwrap();

    let outcome = h.orchestrator.approve_all().await;

    assert_eq!(outcome.approved, vec![first, third]);
    assert_eq!(outcome.skipped, vec![second]);
    assert!(outcome.failed.is_empty());

    assert!(h.orchestrator.execution_state(first).await.is_some());
    assert!(h.orchestrator.execution_state(third).await.is_some());

    let items = h.orchestrator.pending_items().await;
    let skipped = items.iter().find(|i| i.id == second).unwrap();
    assert_eq!(skipped.conflict, ConflictType::FilenameConflict);
    assert_eq!(skipped.status, ApprovalStatus::AwaitingApproval);
}

#[tokio::test]
async fn test_approve_all_isolates_item_failures() {
    let h = harness();

    let _first = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();
    let _second = h
        .orchestrator
        .enqueue(upload_change("b.txt", 10, None))
        .await
        .unwrap();

    // Make every submission fail at the daemon
    h.execution.fail_submit.store(true, Ordering::SeqCst);
    let outcome = h.orchestrator.approve_all().await;

    // Both items were attempted; neither failure aborted the batch
    assert_eq!(outcome.failed.len(), 2);
    assert!(outcome.approved.is_empty());
}

#[tokio::test]
async fn test_reject_all() {
    let h = harness();
    h.orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();
    h.orchestrator
        .enqueue(upload_change("b.txt", 10, None))
        .await
        .unwrap();

    let rejected = h.orchestrator.reject_all().await;
    assert_eq!(rejected.len(), 2);

    for item in h.orchestrator.pending_items().await {
        assert_eq!(item.status, ApprovalStatus::Rejected);
    }
}

// ============================================================================
// Terminal States, Retry, Cancellation
// ============================================================================

#[tokio::test]
async fn test_reject_is_terminal() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();

    h.orchestrator.reject(id).await.unwrap();

    assert!(h.orchestrator.approve(id).await.is_err());
    assert!(h.orchestrator.reject(id).await.is_err());
}

#[tokio::test]
async fn test_retry_only_valid_from_failed() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();

    // Not tracked yet
    assert!(h.orchestrator.retry(id).await.is_err());

    h.orchestrator.approve(id).await.unwrap();

    // Uploading, not failed: explicit error, never a silent resubmission
    assert!(h.orchestrator.retry(id).await.is_err());
    assert_eq!(h.execution.submission_count().await, 1);

    h.orchestrator
        .ingest(failed_event(id, "broadcast rejected"))
        .await;

    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.status, ExecutionStatus::Failed);
    assert_eq!(state.error.as_deref(), Some("broadcast rejected"));

    h.orchestrator.retry(id).await.unwrap();
    assert_eq!(h.execution.submission_count().await, 2);

    // Error and progress cleared by the resubmission
    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.status, ExecutionStatus::Uploading);
    assert_eq!(state.progress, 0);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_submission_failure_is_retryable() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();

    h.execution.fail_submit.store(true, Ordering::SeqCst);
    assert!(h.orchestrator.approve(id).await.is_err());

    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.status, ExecutionStatus::Failed);

    h.execution.fail_submit.store(false, Ordering::SeqCst);
    h.orchestrator.retry(id).await.unwrap();

    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.status, ExecutionStatus::Uploading);
}

#[tokio::test]
async fn test_cancel_clears_state_and_returns_item_to_approved() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();

    h.orchestrator.approve(id).await.unwrap();
    h.orchestrator.cancel(id).await.unwrap();

    assert_eq!(h.execution.cancel_count().await, 1);
    assert!(h.orchestrator.execution_state(id).await.is_none());

    // Back to approved, not to awaiting approval
    let items = h.orchestrator.pending_items().await;
    assert_eq!(items[0].status, ApprovalStatus::Approved);

    // Cancelling again is an explicit error
    assert!(h.orchestrator.cancel(id).await.is_err());
}

#[tokio::test]
async fn test_cancel_then_approve_resubmits() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();

    h.orchestrator.approve(id).await.unwrap();
    h.orchestrator.cancel(id).await.unwrap();

    // Approving the approved-but-idle item submits it again
    h.orchestrator.approve(id).await.unwrap();
    assert_eq!(h.execution.submission_count().await, 2);

    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.status, ExecutionStatus::Uploading);
}

#[tokio::test]
async fn test_top_up_then_approve_unblocks_submission() {
    // Scenario C continued: after a top-up the blocked item can be
    // resubmitted without leaving the approved state
    let h = harness_with(40_000, 8_000, ScriptedBalances::new(0, 0));
    h.orchestrator
        .set_payment_preference(PaymentPreference::CreditOnly)
        .await;

    let id = h
        .orchestrator
        .enqueue(upload_change("video.mp4", 5 * 1024 * 1024, None))
        .await
        .unwrap();

    let rail = h.orchestrator.approve(id).await.unwrap();
    assert!(!rail.is_sufficient());
    assert_eq!(h.execution.submission_count().await, 0);

    h.balances.credit.store(50_000, Ordering::SeqCst);

    let rail = h.orchestrator.approve(id).await.unwrap();
    assert!(rail.is_sufficient());
    assert_eq!(h.execution.submission_count().await, 1);
}

#[tokio::test]
async fn test_late_completion_after_cancel_is_discarded() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();

    h.orchestrator.approve(id).await.unwrap();
    h.orchestrator.cancel(id).await.unwrap();

    // The host finished the broadcast anyway; the late event is ignored
    h.orchestrator.ingest(completed_event(id)).await;

    assert!(h.orchestrator.execution_state(id).await.is_none());
    let items = h.orchestrator.pending_items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, ApprovalStatus::Approved);
}

// ============================================================================
// Progress Ingestion & Settle
// ============================================================================

#[tokio::test]
async fn test_progress_is_monotone_per_item() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();
    h.orchestrator.approve(id).await.unwrap();

    h.orchestrator.ingest(progress_event(id, 10)).await;
    h.orchestrator.ingest(progress_event(id, 55)).await;
    h.orchestrator.ingest(progress_event(id, 30)).await;

    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.progress, 55);
}

#[tokio::test]
async fn test_completion_removes_item_and_settles_state() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();
    h.orchestrator.approve(id).await.unwrap();

    h.orchestrator.ingest(completed_event(id)).await;

    // The published item leaves the queue immediately
    assert!(h.orchestrator.pending_items().await.is_empty());

    // Transient state lingers until the settle delay elapses
    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.status, ExecutionStatus::Completed);
    assert_eq!(state.progress, 100);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.orchestrator.execution_state(id).await.is_none());
}

#[tokio::test]
async fn test_completion_emits_refresh_signals() {
    let h = harness();
    let bus = h.orchestrator.event_bus();
    let mut events = bus.subscribe();

    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();
    h.orchestrator.approve(id).await.unwrap();
    h.orchestrator.ingest(completed_event(id)).await;

    let mut saw_queue_refresh = false;
    let mut saw_balance_refresh = false;
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CoreEvent::Queue(QueueEvent::RefreshRequested) => saw_queue_refresh = true,
            CoreEvent::Balance(core_runtime::events::BalanceEvent::RefreshRequested) => {
                saw_balance_refresh = true
            }
            CoreEvent::Upload(UploadEvent::Completed { .. }) => saw_completed = true,
            _ => {}
        }
    }

    assert!(saw_queue_refresh);
    assert!(saw_balance_refresh);
    assert!(saw_completed);
}

#[tokio::test]
async fn test_event_channel_feeds_orchestrator() {
    let h = harness();
    let id = h
        .orchestrator
        .enqueue(upload_change("a.txt", 10, None))
        .await
        .unwrap();
    h.orchestrator.approve(id).await.unwrap();

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    tx.send(progress_event(id, 40)).await.unwrap();
    drop(tx); // channel closes, run() returns after draining

    h.orchestrator.run(rx).await;

    let state = h.orchestrator.execution_state(id).await.unwrap();
    assert_eq!(state.progress, 40);
}

// ============================================================================
// Aggregates
// ============================================================================

#[tokio::test]
async fn test_breakdown_invariant_over_snapshot() {
    let h = harness_with(40_000, 8_000, ScriptedBalances::new(1_000_000, 1_000_000));

    // Free upload, free metadata op, paid upload
    h.orchestrator
        .enqueue(upload_change("tiny.txt", 10, None))
        .await
        .unwrap();
    h.orchestrator
        .enqueue(LocalChange {
            local_path: PathBuf::from("/drive/renamed.txt"),
            file_name: "renamed.txt".to_string(),
            file_size: 300 * 1024 * 1024,
            operation: OperationKind::Rename,
            previous_path: Some(PathBuf::from("/drive/old.txt")),
            content_hash: None,
        })
        .await
        .unwrap();
    h.orchestrator
        .enqueue(upload_change("big.bin", 5 * 1024 * 1024, None))
        .await
        .unwrap();

    // One unresolved conflict, excluded from the aggregate
    h.remote
        .publish(published("clash.txt", "/drive/clash.txt", Some("old")))
        .await;
    h.orchestrator
        .enqueue(upload_change("clash.txt", 200 * 1024, Some("new")))
        .await
        .unwrap();

    // Prime cached balances so the projection uses live numbers
    h.orchestrator.refresh_balances().await;

    let breakdown = h.orchestrator.cost_breakdown().await;
    let items = h.orchestrator.pending_items().await;
    let conflict_free = items.iter().filter(|i| i.conflict.is_none()).count() as u64;

    assert_eq!(breakdown.total_files(), conflict_free);
    assert_eq!(breakdown.free_files, 2);
    assert_eq!(breakdown.metadata_ops, 1);
    assert_eq!(breakdown.credit_files, 1);
    assert_eq!(breakdown.credit_cost, 8_000);
}

#[tokio::test]
async fn test_top_up_session_passthrough() {
    let h = harness();
    let session = h.orchestrator.top_up_credits(25_000).await.unwrap();
    assert_eq!(session.session_id, "session-1");
    assert!(session.checkout_url.starts_with("https://"));
}
