use parking_lot::Mutex;
use transition_engine::{EngineError, Modify, ObserverHook, Progression};

use super::counter::CounterEvent;

/// One observer callback, flattened for assertions
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Init(i64),
    EventReceived(CounterEvent),
    Modify { from: i64, to: i64 },
    Progression { from: i64, event: CounterEvent, to: i64 },
    Failure(String),
    Completion,
}

/// Observer that keeps every notification in arrival order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|notification| match notification {
                Notification::Failure(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.notifications.lock().iter().filter(|n| predicate(n)).count()
    }

    fn record(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

impl ObserverHook<CounterEvent, i64> for RecordingObserver {
    fn on_init(&self, initial: &i64) {
        self.record(Notification::Init(*initial));
    }

    fn on_event_received(&self, event: &CounterEvent) {
        self.record(Notification::EventReceived(event.clone()));
    }

    fn on_modify(&self, modify: &Modify<i64>) {
        self.record(Notification::Modify {
            from: modify.current,
            to: modify.next,
        });
    }

    fn on_progression(&self, progression: &Progression<CounterEvent, i64>) {
        self.record(Notification::Progression {
            from: progression.current,
            event: progression.event.clone(),
            to: progression.next,
        });
    }

    fn on_failure(&self, error: &EngineError) {
        self.record(Notification::Failure(error.to_string()));
    }

    fn on_completion(&self) {
        self.record(Notification::Completion);
    }
}
