//! Event target abstraction and the in-process document

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::event::{DomEvent, EventDetail, EventType};

/// Event listener callback
pub type Listener = Arc<dyn Fn(&mut DomEvent) + Send + Sync>;

/// Handle returned by `add_event_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Registration options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerOptions {
    /// Run in the capture phase, ahead of page handlers
    pub capture: bool,
    /// Listener promises not to call `prevent_default`
    pub passive: bool,
}

impl ListenerOptions {
    pub const CAPTURE: ListenerOptions = ListenerOptions {
        capture: true,
        passive: false,
    };
}

/// Something listeners can be attached to (the page document)
pub trait EventTarget: Send + Sync {
    fn add_event_listener(
        &self,
        event_type: EventType,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId;

    fn remove_event_listener(&self, event_type: EventType, id: ListenerId);
}

struct Registration {
    id: ListenerId,
    event_type: EventType,
    options: ListenerOptions,
    listener: Listener,
}

/// In-process document: dispatches events to registered listeners
///
/// Capture listeners run before bubble listeners, each group in registration
/// order. A listener that stops propagation ends the dispatch.
pub struct Document {
    listeners: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    fullscreen: AtomicBool,
}

impl Document {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fullscreen: AtomicBool::new(false),
        }
    }

    /// Dispatch an event; returns false when a listener cancelled it
    pub fn dispatch(&self, event: &mut DomEvent) -> bool {
        let ordered: Vec<Listener> = {
            let listeners = lock(&self.listeners);
            let matching = listeners.iter().filter(|r| r.event_type == event.event_type);
            let (capture, bubble): (Vec<_>, Vec<_>) = matching.partition(|r| r.options.capture);
            capture
                .into_iter()
                .chain(bubble)
                .map(|r| Arc::clone(&r.listener))
                .collect()
        };

        for listener in ordered {
            listener(event);
            if event.is_propagation_stopped() {
                break;
            }
        }
        !event.is_default_prevented()
    }

    /// Number of listeners currently registered
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Listeners registered for one event type
    pub fn listener_count_for(&self, event_type: EventType) -> usize {
        lock(&self.listeners)
            .iter()
            .filter(|r| r.event_type == event_type)
            .count()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::SeqCst)
    }

    /// Enter or leave fullscreen and fire `fullscreenchange`
    pub fn set_fullscreen(&self, active: bool) {
        if self.fullscreen.swap(active, Ordering::SeqCst) != active {
            let mut event = DomEvent::new(
                EventType::FullscreenChange,
                EventDetail::Fullscreen { active },
            );
            self.dispatch(&mut event);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTarget for Document {
    fn add_event_listener(
        &self,
        event_type: EventType,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push(Registration {
            id,
            event_type,
            options,
            listener,
        });
        id
    }

    fn remove_event_listener(&self, event_type: EventType, id: ListenerId) {
        lock(&self.listeners).retain(|r| !(r.id == id && r.event_type == event_type));
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Modifiers;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_capture_runs_first_and_can_stop() {
        let doc = Document::new();
        let page_calls = Arc::new(AtomicUsize::new(0));
        let seen = page_calls.clone();

        doc.add_event_listener(
            EventType::KeyDown,
            Arc::new(move |_e: &mut DomEvent| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            ListenerOptions::default(),
        );
        assert!(doc.dispatch(&mut DomEvent::key_down("a", Modifiers::NONE)));
        assert_eq!(page_calls.load(Ordering::SeqCst), 1);

        let guard = doc.add_event_listener(
            EventType::KeyDown,
            Arc::new(|e: &mut DomEvent| e.suppress()),
            ListenerOptions::CAPTURE,
        );
        assert!(!doc.dispatch(&mut DomEvent::key_down("a", Modifiers::NONE)));
        assert_eq!(page_calls.load(Ordering::SeqCst), 1);

        doc.remove_event_listener(EventType::KeyDown, guard);
        assert_eq!(doc.listener_count(), 1);
    }

    #[test]
    fn test_remove_requires_matching_type() {
        let doc = Document::new();
        let id = doc.add_event_listener(
            EventType::Copy,
            Arc::new(|_e: &mut DomEvent| {}),
            ListenerOptions::CAPTURE,
        );
        doc.remove_event_listener(EventType::Paste, id);
        assert_eq!(doc.listener_count_for(EventType::Copy), 1);
        doc.remove_event_listener(EventType::Copy, id);
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn test_fullscreen_change_dispatched_on_transition() {
        let doc = Document::new();
        let changes = Arc::new(AtomicUsize::new(0));
        let seen = changes.clone();
        doc.add_event_listener(
            EventType::FullscreenChange,
            Arc::new(move |_e: &mut DomEvent| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            ListenerOptions::default(),
        );

        doc.set_fullscreen(true);
        doc.set_fullscreen(true);
        doc.set_fullscreen(false);
        assert_eq!(changes.load(Ordering::SeqCst), 2);
        assert!(!doc.is_fullscreen());
    }
}
