//! Independent listener installers
//!
//! Each installer registers its listeners on the target and returns a
//! [`Remover`] that unregisters exactly those listeners.

use std::sync::Arc;

use crate::event::{DomEvent, EventDetail, EventType, Modifiers};
use crate::target::{EventTarget, Listener, ListenerId, ListenerOptions};

/// Undoes one installer
pub type Remover = Box<dyn FnOnce() + Send>;

/// Called when the document leaves fullscreen
pub type FullscreenExitCallback = Arc<dyn Fn() + Send + Sync>;

const BLOCKED_KEYS: &[&str] = &[
    "Escape",
    "Alt",
    "AltGraph",
    "Control",
    "Meta",
    "OS",
    "Shift",
    "ArrowUp",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
];

/// Whether a key press must be kept from the page
///
/// Shift+character is allowed so answers can be typed; any combination with
/// Ctrl, Alt or Meta is a shortcut and blocked.
pub fn is_blocked_key(key: &str, modifiers: &Modifiers) -> bool {
    if modifiers.is_shortcut() || BLOCKED_KEYS.contains(&key) {
        return true;
    }
    is_function_key(key)
}

fn is_function_key(key: &str) -> bool {
    key.strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .map_or(false, |n| (1..=24).contains(&n))
}

/// Register one listener for several event types
fn listen(
    target: &Arc<dyn EventTarget>,
    event_types: &[EventType],
    options: ListenerOptions,
    listener: Listener,
) -> Remover {
    let registered: Vec<(EventType, ListenerId)> = event_types
        .iter()
        .map(|&event_type| {
            let id = target.add_event_listener(event_type, Arc::clone(&listener), options);
            (event_type, id)
        })
        .collect();

    let target = Arc::clone(target);
    Box::new(move || {
        for (event_type, id) in registered {
            target.remove_event_listener(event_type, id);
        }
    })
}

/// Escape, function, modifier and arrow keys; modifier shortcuts
pub fn install_keyboard_guard(target: &Arc<dyn EventTarget>) -> Remover {
    listen(
        target,
        &[EventType::KeyDown, EventType::KeyUp],
        ListenerOptions::CAPTURE,
        Arc::new(|event: &mut DomEvent| {
            let blocked = match &event.detail {
                EventDetail::Key { key, modifiers } => is_blocked_key(key, modifiers),
                _ => false,
            };
            if blocked {
                event.suppress();
            }
        }),
    )
}

/// Right-click menu
pub fn install_context_menu_guard(target: &Arc<dyn EventTarget>) -> Remover {
    listen(
        target,
        &[EventType::ContextMenu],
        ListenerOptions::CAPTURE,
        Arc::new(|event: &mut DomEvent| event.prevent_default()),
    )
}

/// Drag and text selection
pub fn install_selection_guard(target: &Arc<dyn EventTarget>) -> Remover {
    listen(
        target,
        &[EventType::DragStart, EventType::SelectStart],
        ListenerOptions::CAPTURE,
        Arc::new(|event: &mut DomEvent| event.prevent_default()),
    )
}

pub fn install_clipboard_guard(target: &Arc<dyn EventTarget>) -> Remover {
    listen(
        target,
        &[EventType::Copy, EventType::Cut, EventType::Paste],
        ListenerOptions::CAPTURE,
        Arc::new(|event: &mut DomEvent| event.suppress()),
    )
}

/// Multi-touch, pinch-zoom wheel, and Safari gesture events
pub fn install_gesture_guard(target: &Arc<dyn EventTarget>) -> Remover {
    // Non-passive so prevent_default takes effect on touch and wheel
    let options = ListenerOptions {
        capture: true,
        passive: false,
    };

    let touch = listen(
        target,
        &[EventType::TouchStart, EventType::TouchMove],
        options,
        Arc::new(|event: &mut DomEvent| {
            if matches!(event.detail, EventDetail::Touch { touches } if touches > 1) {
                event.prevent_default();
            }
        }),
    );
    let wheel = listen(
        target,
        &[EventType::Wheel],
        options,
        Arc::new(|event: &mut DomEvent| {
            if let EventDetail::Wheel { modifiers, .. } = &event.detail {
                if modifiers.ctrl || modifiers.meta {
                    event.prevent_default();
                }
            }
        }),
    );
    let gesture = listen(
        target,
        &[
            EventType::GestureStart,
            EventType::GestureChange,
            EventType::GestureEnd,
        ],
        options,
        Arc::new(|event: &mut DomEvent| event.prevent_default()),
    );

    Box::new(move || {
        touch();
        wheel();
        gesture();
    })
}

/// Invoke `on_exit` whenever the document leaves fullscreen
pub fn install_fullscreen_watch(
    target: &Arc<dyn EventTarget>,
    on_exit: FullscreenExitCallback,
) -> Remover {
    listen(
        target,
        &[EventType::FullscreenChange],
        ListenerOptions::default(),
        Arc::new(move |event: &mut DomEvent| {
            if matches!(event.detail, EventDetail::Fullscreen { active: false }) {
                on_exit();
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn document() -> (Arc<Document>, Arc<dyn EventTarget>) {
        let doc = Arc::new(Document::new());
        let target: Arc<dyn EventTarget> = doc.clone();
        (doc, target)
    }

    #[test]
    fn test_blocked_keys() {
        for key in ["Escape", "F1", "F11", "F12", "Alt", "Control", "Meta", "Shift", "ArrowLeft"] {
            assert!(is_blocked_key(key, &Modifiers::NONE), "{key} should be blocked");
        }
        assert!(is_blocked_key("c", &Modifiers::ctrl()));
        assert!(is_blocked_key("v", &Modifiers::meta()));
        assert!(is_blocked_key("Tab", &Modifiers { alt: true, ..Modifiers::NONE }));

        assert!(!is_blocked_key("a", &Modifiers::NONE));
        assert!(!is_blocked_key("A", &Modifiers::shift()));
        assert!(!is_blocked_key("Enter", &Modifiers::NONE));
        assert!(!is_blocked_key("F", &Modifiers::shift()));
        assert!(!is_blocked_key("F25", &Modifiers::NONE));
    }

    #[test]
    fn test_keyboard_guard_suppresses() {
        let (doc, target) = document();
        let remove = install_keyboard_guard(&target);
        assert_eq!(doc.listener_count(), 2);

        let mut escape = DomEvent::key_down("Escape", Modifiers::NONE);
        assert!(!doc.dispatch(&mut escape));
        assert!(escape.is_propagation_stopped());
        assert!(doc.dispatch(&mut DomEvent::key_down("x", Modifiers::NONE)));

        remove();
        assert_eq!(doc.listener_count(), 0);
        assert!(doc.dispatch(&mut DomEvent::key_down("Escape", Modifiers::NONE)));
    }

    #[test]
    fn test_gesture_guard() {
        let (doc, target) = document();
        let remove = install_gesture_guard(&target);

        assert!(doc.dispatch(&mut DomEvent::touch(EventType::TouchStart, 1)));
        assert!(!doc.dispatch(&mut DomEvent::touch(EventType::TouchMove, 2)));
        assert!(doc.dispatch(&mut DomEvent::wheel(-3.0, Modifiers::NONE)));
        assert!(!doc.dispatch(&mut DomEvent::wheel(-3.0, Modifiers::ctrl())));
        assert!(!doc.dispatch(&mut DomEvent::plain(EventType::GestureChange)));

        remove();
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn test_clipboard_and_menu_guards() {
        let (doc, target) = document();
        let removers = vec![
            install_clipboard_guard(&target),
            install_context_menu_guard(&target),
            install_selection_guard(&target),
        ];
        for event_type in [
            EventType::Copy,
            EventType::Cut,
            EventType::Paste,
            EventType::ContextMenu,
            EventType::DragStart,
            EventType::SelectStart,
        ] {
            assert!(!doc.dispatch(&mut DomEvent::plain(event_type)));
        }
        for remove in removers {
            remove();
        }
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn test_fullscreen_watch_fires_on_exit_only() {
        let (doc, target) = document();
        let exits = Arc::new(AtomicUsize::new(0));
        let seen = exits.clone();
        let remove = install_fullscreen_watch(
            &target,
            Arc::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        doc.set_fullscreen(true);
        assert_eq!(exits.load(Ordering::SeqCst), 0);
        doc.set_fullscreen(false);
        assert_eq!(exits.load(Ordering::SeqCst), 1);

        remove();
        doc.set_fullscreen(true);
        doc.set_fullscreen(false);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }
}
