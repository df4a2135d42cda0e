//! Lockdown Controller
//!
//! Suppresses the escape hatches a candidate could use during a timed exam:
//! - Escape, function, modifier, and arrow keys; modifier shortcuts
//! - Context menu, drag, text selection, copy/cut/paste
//! - Multi-touch, pinch-zoom wheel, and Safari gesture events
//! - Native keyboard lock where the platform offers one
//!
//! Every listener installed by `activate()` is removed by `deactivate()`.

pub mod controller;
pub mod event;
pub mod installers;
pub mod keyboard_lock;
pub mod target;

pub use controller::{LockdownConfig, LockdownController};
pub use event::{DomEvent, EventDetail, EventType, Modifiers};
pub use keyboard_lock::{KeyboardLock, NoopKeyboardLock};
pub use target::{Document, EventTarget, Listener, ListenerId, ListenerOptions};

use thiserror::Error;

/// Lockdown error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockdownError {
    #[error("Keyboard lock unsupported on this platform")]
    KeyboardLockUnsupported,

    #[error("Keyboard lock rejected: {0}")]
    KeyboardLockRejected(String),
}
