//! Native keyboard lock capability

use crate::LockdownError;

/// Platform keyboard lock (captures system keys such as Escape or Meta)
pub trait KeyboardLock: Send + Sync {
    /// Whether the platform actually supports locking
    fn is_supported(&self) -> bool;

    /// Lock the given key codes (empty locks every key)
    fn lock(&self, codes: &[String]) -> Result<(), LockdownError>;

    fn unlock(&self);
}

/// Fallback when the platform has no keyboard lock
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKeyboardLock;

impl KeyboardLock for NoopKeyboardLock {
    fn is_supported(&self) -> bool {
        false
    }

    fn lock(&self, _codes: &[String]) -> Result<(), LockdownError> {
        Err(LockdownError::KeyboardLockUnsupported)
    }

    fn unlock(&self) {}
}
