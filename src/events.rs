//! In-process progress reporting.
//!
//! Delivery is synchronous: [`EventBus::emit`] calls every listener in
//! subscription order before returning. A listener that errors or panics is
//! logged and skipped; the remaining listeners still see the event and the
//! emitter never observes the failure.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

pub const DEFAULT_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BatchStarted,
    BatchCompleted,
    FileStarted,
    StageUpdate,
    FileCompleted,
    FileFailed,
    FileSkipped,
    ConflictDetected,
    ConflictResolved,
    CommitCreated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub file_path: Option<PathBuf>,
    pub stage: Option<String>,
    pub progress: Option<f64>,
    pub total: Option<usize>,
    pub processed: Option<usize>,
    pub message: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ProgressEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            file_path: None,
            stage: None,
            progress: None,
            total: None,
            processed: None,
            message: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn counts(mut self, processed: usize, total: usize) -> Self {
        self.processed = Some(processed);
        self.total = Some(total);
        self.progress = Some(if total == 0 {
            1.0
        } else {
            processed as f64 / total as f64
        });
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

pub trait ProgressListener: Send + Sync {
    fn on_event(&self, event: &ProgressEvent) -> anyhow::Result<()>;
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn ProgressListener>)>,
}

/// Publish/subscribe channel shared by the detector, pipeline and batch
/// runner. Construct one per run and pass it down; [`EventBus::reset`]
/// returns it to a pristine state between tests.
pub struct EventBus {
    registry: Mutex<Registry>,
    history: Mutex<VecDeque<ProgressEvent>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &lock(&self.registry).listeners.len())
            .field("history", &lock(&self.history).len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            }),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn ProgressListener>) -> ListenerId {
        let mut registry = lock(&self.registry);
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    pub fn emit(&self, event: ProgressEvent) {
        {
            let mut history = lock(&self.history);
            if self.capacity > 0 {
                if history.len() == self.capacity {
                    history.pop_front();
                }
                history.push_back(event.clone());
            }
        }

        // Snapshot so listeners may subscribe or unsubscribe while handling.
        let listeners: Vec<Arc<dyn ProgressListener>> = lock(&self.registry)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("progress listener failed on {:?}: {e:#}", event.event_type),
                Err(_) => warn!("progress listener panicked on {:?}", event.event_type),
            }
        }
    }

    pub fn history(&self) -> Vec<ProgressEvent> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn recent(&self, count: usize) -> Vec<ProgressEvent> {
        let history = lock(&self.history);
        let skip = history.len().saturating_sub(count);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    pub fn reset(&self) {
        lock(&self.registry).listeners.clear();
        self.clear_history();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
