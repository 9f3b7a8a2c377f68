//! Operation dispatch and worker coordination.
//!
//! - [`PresenceService`] -- heartbeats and presence reads.
//! - [`ClaimManager`] -- one-worker-one-claimant bindings and the kill-switch.
//! - [`DispatchQueue`] -- enqueue (single or batched) and worker poll.
//! - [`OperationStateMachine`] -- lifecycle transitions and the timeout sweep.
//! - [`BatchAggregator`] -- fan-in of sibling operations.
//!
//! [`Coordinator`] wires all of them over one pair of stores, one event bus
//! and one clock.

use std::sync::Arc;

use savesync_core::clock::{Clock, SystemClock};
use savesync_db::{MemoryStore, OperationStore, PresenceStore};
use savesync_events::EventBus;

pub mod batch;
pub mod claims;
pub mod config;
pub mod error;
pub mod presence;
pub mod queue;
pub mod state_machine;

pub use batch::BatchAggregator;
pub use claims::ClaimManager;
pub use config::DispatchConfig;
pub use error::{DispatchError, DispatchResult};
pub use presence::{PresenceCheck, PresenceMonitor, PresenceService};
pub use queue::{DispatchQueue, Enqueued};
pub use state_machine::{OperationStateMachine, Transition};

/// All dispatch services over shared stores. Cheap to share as `Arc<Coordinator>`.
pub struct Coordinator {
    pub presence: PresenceService,
    pub claims: ClaimManager,
    pub queue: DispatchQueue,
    pub operations: OperationStateMachine,
    pub batches: BatchAggregator,
    pub config: DispatchConfig,
    pub events: Arc<EventBus>,
    presence_store: Arc<dyn PresenceStore>,
    operation_store: Arc<dyn OperationStore>,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub fn new(
        presence_store: Arc<dyn PresenceStore>,
        operation_store: Arc<dyn OperationStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        let presence = PresenceService::new(
            Arc::clone(&presence_store),
            Arc::clone(&events),
            Arc::clone(&clock),
            &config,
        );
        let claims = ClaimManager::new(
            Arc::clone(&presence_store),
            Arc::clone(&events),
            Arc::clone(&clock),
            &config,
        );
        let queue = DispatchQueue::new(
            claims.clone(),
            Arc::clone(&operation_store),
            Arc::clone(&events),
            Arc::clone(&clock),
        );
        let operations = OperationStateMachine::new(
            Arc::clone(&operation_store),
            Arc::clone(&events),
            Arc::clone(&clock),
        );
        let batches = BatchAggregator::new(Arc::clone(&operation_store));

        Self {
            presence,
            claims,
            queue,
            operations,
            batches,
            config,
            events,
            presence_store,
            operation_store,
            clock,
        }
    }

    /// Coordinator over a fresh [`MemoryStore`] and the given clock.
    pub fn in_memory(config: DispatchConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            store.clone(),
            store,
            Arc::new(EventBus::default()),
            clock,
            config,
        )
    }

    /// Coordinator over a fresh [`MemoryStore`] and the wall clock.
    pub fn in_memory_system(config: DispatchConfig) -> Self {
        Self::in_memory(config, Arc::new(SystemClock))
    }

    /// A presence monitor sharing this coordinator's store, bus and clock.
    pub fn presence_monitor(&self) -> PresenceMonitor {
        PresenceMonitor::new(
            Arc::clone(&self.presence_store),
            Arc::clone(&self.events),
            Arc::clone(&self.clock),
            self.config.clone(),
        )
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn store_healthy(&self) -> bool {
        match self.operation_store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Store health check failed");
                false
            }
        }
    }
}
