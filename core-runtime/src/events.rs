//! # Event Bus System
//!
//! Provides an event-driven architecture for the permanent storage core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between core modules through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! External publishers (the watcher, the metadata crawler, the host UI) push
//! typed events; there is no ambient global listener registry. Subscribers
//! that fall behind receive `RecvError::Lagged` and keep going.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, QueueEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! let event = CoreEvent::Queue(QueueEvent::RefreshRequested);
//! event_bus.emit(event).ok();
//! ```
//!
//! ## Event Types
//!
//! ### Queue Events
//! - `ItemQueued`: A detected local change entered the pending queue
//! - `ConflictDetected`: The change collides with known remote state
//! - `ConflictResolved`: An operator decision was recorded
//! - `ItemApproved` / `ItemRejected` / `ItemWithdrawn`: Approval-gate changes
//! - `RefreshRequested`: Collaborators should re-crawl queue/remote state
//!
//! ### Upload Events
//! - `Submitted`: Approved item handed to the execution service
//! - `Progress`: Incremental progress update
//! - `Completed` / `Failed` / `Cancelled`: Execution outcomes
//! - `Retried`: Operator-initiated resubmission of a failed item
//! - `InsufficientBalance`: Chosen rail cannot cover the item
//!
//! ### Balance Events
//! - `Updated`: Fresh balances fetched from the oracle
//! - `RefreshRequested`: A completed upload changed the spendable balance
//! - `OracleDegraded`: Oracle unreachable; cached values in use

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events. Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types for different modules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Pending-queue and approval-gate events
    Queue(QueueEvent),
    /// Execution-lifecycle events
    Upload(UploadEvent),
    /// Wallet balance events
    Balance(BalanceEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Upload(e) => e.description(),
            CoreEvent::Balance(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Upload(UploadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::InsufficientBalance { .. }) => EventSeverity::Warning,
            CoreEvent::Balance(BalanceEvent::OracleDegraded { .. }) => EventSeverity::Warning,
            CoreEvent::Queue(QueueEvent::ConflictDetected { .. }) => EventSeverity::Warning,
            CoreEvent::Upload(UploadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::ItemApproved { .. }) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::ItemRejected { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events related to the pending queue and the approval gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// A detected local change entered the pending queue.
    ItemQueued {
        /// The pending upload id.
        upload_id: String,
        /// File name of the candidate.
        file_name: String,
        /// The remote mutation required (e.g., "upload", "rename").
        operation: String,
    },
    /// The change collides with known remote state.
    ConflictDetected {
        /// The pending upload id.
        upload_id: String,
        /// Conflict class (e.g., "duplicate", "content_conflict").
        conflict: String,
        /// Human-readable explanation.
        details: String,
    },
    /// An operator decision was recorded for a conflicted item.
    ConflictResolved {
        /// The pending upload id.
        upload_id: String,
        /// The recorded resolution (e.g., "keep_local", "skip").
        resolution: String,
    },
    /// Item passed the approval gate.
    ItemApproved {
        /// The pending upload id.
        upload_id: String,
    },
    /// Item was rejected; terminal.
    ItemRejected {
        /// The pending upload id.
        upload_id: String,
    },
    /// Item was withdrawn from the queue (with any recorded resolution).
    ItemWithdrawn {
        /// The pending upload id.
        upload_id: String,
    },
    /// Collaborators should refresh their view of the queue and remote state.
    RefreshRequested,
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::ItemQueued { .. } => "Change queued for approval",
            QueueEvent::ConflictDetected { .. } => "Conflict detected",
            QueueEvent::ConflictResolved { .. } => "Conflict resolved",
            QueueEvent::ItemApproved { .. } => "Item approved",
            QueueEvent::ItemRejected { .. } => "Item rejected",
            QueueEvent::ItemWithdrawn { .. } => "Item withdrawn",
            QueueEvent::RefreshRequested => "Queue refresh requested",
        }
    }
}

// ============================================================================
// Upload Events
// ============================================================================

/// Events related to execution of approved items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// Approved item handed to the execution service.
    Submitted {
        /// The pending upload id.
        upload_id: String,
        /// The payment rail chosen for this submission.
        rail: String,
    },
    /// Incremental progress update.
    Progress {
        /// The pending upload id.
        upload_id: String,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// Remote mutation confirmed.
    Completed {
        /// The pending upload id.
        upload_id: String,
    },
    /// Remote mutation failed; retryable.
    Failed {
        /// The pending upload id.
        upload_id: String,
        /// Human-readable error message.
        message: String,
    },
    /// In-flight work was cancelled locally; advisory to the host.
    Cancelled {
        /// The pending upload id.
        upload_id: String,
    },
    /// Operator-initiated resubmission of a failed item.
    Retried {
        /// The pending upload id.
        upload_id: String,
    },
    /// The chosen payment rail cannot cover the item; submission blocked.
    InsufficientBalance {
        /// The pending upload id.
        upload_id: String,
        /// The rail that was evaluated.
        rail: String,
        /// Amount the rail requires, smallest units.
        required: u64,
        /// Amount currently available, smallest units.
        available: u64,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Submitted { .. } => "Upload submitted",
            UploadEvent::Progress { .. } => "Upload in progress",
            UploadEvent::Completed { .. } => "Upload completed",
            UploadEvent::Failed { .. } => "Upload failed",
            UploadEvent::Cancelled { .. } => "Upload cancelled",
            UploadEvent::Retried { .. } => "Upload retried",
            UploadEvent::InsufficientBalance { .. } => "Insufficient balance",
        }
    }
}

// ============================================================================
// Balance Events
// ============================================================================

/// Events related to wallet balances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BalanceEvent {
    /// Fresh balances fetched from the oracle.
    Updated {
        /// Native-token balance, smallest units.
        token_balance: u64,
        /// Prepaid-credit balance, smallest units.
        credit_balance: u64,
    },
    /// A completed upload changed the spendable balance; collaborators should
    /// re-fetch.
    RefreshRequested,
    /// Oracle unreachable; the engine is operating on cached values.
    OracleDegraded {
        /// Why the oracle call failed.
        message: String,
    },
}

impl BalanceEvent {
    fn description(&self) -> &str {
        match self {
            BalanceEvent::Updated { .. } => "Balances updated",
            BalanceEvent::RefreshRequested => "Balance refresh requested",
            BalanceEvent::OracleDegraded { .. } => "Balance oracle degraded",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Queue(QueueEvent::RefreshRequested);

        // Should error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_event_emission_with_subscribers() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let event = CoreEvent::Queue(QueueEvent::ItemQueued {
            upload_id: "u-1".to_string(),
            file_name: "report.pdf".to_string(),
            operation: "upload".to_string(),
        });

        let result = bus.emit(event.clone());
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Upload(UploadEvent::Submitted {
            upload_id: "u-1".to_string(),
            rail: "credit".to_string(),
        });

        bus.emit(event.clone()).ok();

        let received1 = sub1.recv().await.unwrap();
        let received2 = sub2.recv().await.unwrap();

        assert_eq!(received1, event);
        assert_eq!(received2, event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2); // Very small buffer
        let mut sub = bus.subscribe();

        // Emit more events than buffer size
        for i in 0..5 {
            let event = CoreEvent::Upload(UploadEvent::Progress {
                upload_id: format!("u-{i}"),
                percent: (i * 20) as u8,
            });
            bus.emit(event).ok();
        }

        // First recv should indicate lagging
        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_event_severity() {
        let error_event = CoreEvent::Upload(UploadEvent::Failed {
            upload_id: "u-1".to_string(),
            message: "broadcast rejected".to_string(),
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let warning_event = CoreEvent::Upload(UploadEvent::InsufficientBalance {
            upload_id: "u-1".to_string(),
            rail: "credit".to_string(),
            required: 500,
            available: 10,
        });
        assert_eq!(warning_event.severity(), EventSeverity::Warning);

        let debug_event = CoreEvent::Upload(UploadEvent::Progress {
            upload_id: "u-1".to_string(),
            percent: 50,
        });
        assert_eq!(debug_event.severity(), EventSeverity::Debug);
    }

    #[tokio::test]
    async fn test_event_description() {
        let event = CoreEvent::Queue(QueueEvent::ConflictDetected {
            upload_id: "u-1".to_string(),
            conflict: "duplicate".to_string(),
            details: "identical content already published".to_string(),
        });
        assert_eq!(event.description(), "Conflict detected");
    }

    #[tokio::test]
    async fn test_event_serialization() {
        let event = CoreEvent::Upload(UploadEvent::InsufficientBalance {
            upload_id: "u-123".to_string(),
            rail: "token".to_string(),
            required: 42_000,
            available: 7,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("u-123"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                let event = CoreEvent::Upload(UploadEvent::Progress {
                    upload_id: "u-1".to_string(),
                    percent: (i * 10) as u8,
                });
                bus1.emit(event).ok();
            }
        });

        let handle2 = tokio::spawn(async move {
            for _ in 0..10 {
                bus2.emit(CoreEvent::Balance(BalanceEvent::RefreshRequested))
                    .ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }
}
