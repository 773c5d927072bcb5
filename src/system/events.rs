//! Pipeline events and the injected observer list.
//!
//! Components publish to an [`EventBus`] handed to them at construction;
//! there is no global sink. [`EventLog`] is a ready-made observer that keeps
//! a bounded replay buffer for display.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};

use crate::camera::backend::Size;
use crate::camera::state::CaptureSessionState;
use crate::capture::state::{CaptureMode, ShutterState};

/// Default number of entries an [`EventLog`] replays.
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1000;

/// Something observable happened in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SessionStateChanged(CaptureSessionState),
    StreamsNegotiated {
        primary: Size,
        compressed: Option<Size>,
    },
    ModeChanged(CaptureMode),
    ShutterStateChanged(ShutterState),
    TargetCaptured {
        index: usize,
        captured: usize,
        total: usize,
    },
    /// Mosaic engine found too few inliers; the target stays open.
    CaptureRetry {
        index: usize,
    },
    /// Mosaic engine returned an unexpected code.
    CaptureSkipped {
        index: usize,
        code: i32,
    },
    PhotosphereSaved {
        path: PathBuf,
    },
    ExportFailed {
        reason: String,
    },
}

impl PipelineEvent {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::SessionStateChanged(CaptureSessionState::Failed)
                | Self::CaptureRetry { .. }
                | Self::CaptureSkipped { .. }
                | Self::ExportFailed { .. }
        )
    }
}

/// Receives pipeline events. Called synchronously on the publishing thread.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

impl<F> EventObserver for F
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent) {
        self(event)
    }
}

/// Cloneable handle to a shared observer list.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<Vec<Arc<dyn EventObserver>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn EventObserver>) {
        self.observers.write().push(observer);
    }

    pub fn publish(&self, event: PipelineEvent) {
        // Snapshot so observers may subscribe from inside a callback.
        let observers: Vec<_> = self.observers.read().iter().cloned().collect();
        for observer in observers {
            observer.on_event(&event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub at: DateTime<Local>,
    pub event: PipelineEvent,
}

impl LoggedEvent {
    /// Wall-clock time as `HH:MM:SS.mmm`.
    pub fn time_string(&self) -> String {
        self.at.format("%H:%M:%S%.3f").to_string()
    }
}

/// Bounded replay buffer; the oldest entry is dropped when full.
pub struct EventLog {
    entries: Mutex<VecDeque<LoggedEvent>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_LOG_CAPACITY))),
            capacity: capacity.max(1),
        })
    }

    pub fn entries(&self) -> Vec<LoggedEvent> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.entries.lock().iter().map(|e| e.event.clone()).collect()
    }

    pub fn warnings(&self) -> Vec<LoggedEvent> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.event.is_warning())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EventObserver for EventLog {
    fn on_event(&self, event: &PipelineEvent) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LoggedEvent {
            at: Local::now(),
            event: event.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_every_observer() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(Arc::new(move |_: &PipelineEvent| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        bus.publish(PipelineEvent::CaptureRetry { index: 4 });

        assert_eq!(bus.observer_count(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cloned_bus_shares_observers() {
        let bus = EventBus::new();
        let log = EventLog::new(10);
        bus.clone().subscribe(log.clone());

        bus.publish(PipelineEvent::ShutterStateChanged(ShutterState::Scanning));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_event_log_drops_oldest() {
        let log = EventLog::new(2);
        for index in 0..3 {
            log.on_event(&PipelineEvent::CaptureRetry { index });
        }

        assert_eq!(
            log.events(),
            vec![
                PipelineEvent::CaptureRetry { index: 1 },
                PipelineEvent::CaptureRetry { index: 2 },
            ]
        );
    }

    #[test]
    fn test_warning_filter() {
        let log = EventLog::new(DEFAULT_EVENT_LOG_CAPACITY);
        log.on_event(&PipelineEvent::TargetCaptured {
            index: 0,
            captured: 1,
            total: 26,
        });
        log.on_event(&PipelineEvent::ExportFailed {
            reason: "disk full".into(),
        });

        let warnings = log.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].time_string().len(), 12);
    }
}
