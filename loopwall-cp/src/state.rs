//! Shared control-plane state
//!
//! Thread-safe shared state for coordination between the API surface, the
//! materializer, and the synchronization gateway. Per-display advisory locks
//! serialize all mutations for a given display; different displays proceed
//! fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use loopwall_common::events::LoopwallEvent;

/// Shared state accessible by all components
pub struct SharedState {
    /// Event broadcaster for the SSE push channel
    pub event_tx: broadcast::Sender<LoopwallEvent>,

    /// Per-display materialization generation tokens
    ///
    /// Bumped on playlist activation/deactivation. A materialization run
    /// snapshots the generation up front and discards its batch if the
    /// generation moved before commit.
    generations: RwLock<HashMap<Uuid, u64>>,

    /// Per-display advisory locks serializing command application,
    /// materialization, and history writes for one display
    display_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            event_tx,
            generations: RwLock::new(HashMap::new()),
            display_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: LoopwallEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<LoopwallEvent> {
        self.event_tx.subscribe()
    }

    /// Current materialization generation for a display
    pub async fn generation(&self, display_id: Uuid) -> u64 {
        self.generations
            .read()
            .await
            .get(&display_id)
            .copied()
            .unwrap_or(0)
    }

    /// Invalidate in-flight materialization for a display
    ///
    /// Returns the new generation value.
    pub async fn bump_generation(&self, display_id: Uuid) -> u64 {
        let mut generations = self.generations.write().await;
        let entry = generations.entry(display_id).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Advisory lock for a display
    ///
    /// All mutations for a given display (command application, timeline
    /// materialization, history writes) run while holding this lock.
    pub async fn display_lock(&self, display_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.display_locks.lock().await;
        locks
            .entry(display_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop lock and generation bookkeeping for a deleted display
    pub async fn forget_display(&self, display_id: Uuid) {
        self.generations.write().await.remove(&display_id);
        self.display_locks.lock().await.remove(&display_id);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
