//! Lockdown lifecycle

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::installers::{
    install_clipboard_guard, install_context_menu_guard, install_fullscreen_watch,
    install_gesture_guard, install_keyboard_guard, install_selection_guard,
    FullscreenExitCallback, Remover,
};
use crate::keyboard_lock::KeyboardLock;
use crate::target::EventTarget;

/// Which suppression groups are installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockdownConfig {
    pub keyboard: bool,
    pub context_menu: bool,
    pub selection: bool,
    pub clipboard: bool,
    pub gestures: bool,
    /// Request the native keyboard lock when the platform has one
    pub native_keyboard_lock: bool,
    /// Key codes passed to the native lock (empty locks every key)
    pub lock_keys: Vec<String>,
}

impl Default for LockdownConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            context_menu: true,
            selection: true,
            clipboard: true,
            gestures: true,
            native_keyboard_lock: true,
            lock_keys: ["Escape", "Tab", "F11", "MetaLeft", "MetaRight", "AltLeft", "AltRight"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Installs and removes the lockdown listeners for one proctored session
///
/// `activate` and `deactivate` are idempotent; a second call is a no-op.
/// Dropping an active controller deactivates it.
pub struct LockdownController {
    target: Arc<dyn EventTarget>,
    keyboard_lock: Arc<dyn KeyboardLock>,
    config: LockdownConfig,
    on_fullscreen_exit: Option<FullscreenExitCallback>,
    removers: Vec<Remover>,
    keyboard_locked: bool,
    active: bool,
}

impl LockdownController {
    pub fn new(
        target: Arc<dyn EventTarget>,
        keyboard_lock: Arc<dyn KeyboardLock>,
        config: LockdownConfig,
    ) -> Self {
        Self {
            target,
            keyboard_lock,
            config,
            on_fullscreen_exit: None,
            removers: Vec::new(),
            keyboard_locked: false,
            active: false,
        }
    }

    /// Watch for the document leaving fullscreen while active
    pub fn with_fullscreen_exit(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_fullscreen_exit = Some(Arc::new(callback));
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_keyboard_locked(&self) -> bool {
        self.keyboard_locked
    }

    pub fn config(&self) -> &LockdownConfig {
        &self.config
    }

    /// Install every enabled installer; returns false if already active
    pub fn activate(&mut self) -> bool {
        if self.active {
            warn!("Lockdown already active");
            return false;
        }

        let target = &self.target;
        let mut removers: Vec<Remover> = Vec::new();
        if self.config.keyboard {
            removers.push(install_keyboard_guard(target));
        }
        if self.config.context_menu {
            removers.push(install_context_menu_guard(target));
        }
        if self.config.selection {
            removers.push(install_selection_guard(target));
        }
        if self.config.clipboard {
            removers.push(install_clipboard_guard(target));
        }
        if self.config.gestures {
            removers.push(install_gesture_guard(target));
        }
        if let Some(on_exit) = &self.on_fullscreen_exit {
            removers.push(install_fullscreen_watch(target, Arc::clone(on_exit)));
        }
        self.removers = removers;

        if self.config.native_keyboard_lock && self.keyboard_lock.is_supported() {
            match self.keyboard_lock.lock(&self.config.lock_keys) {
                Ok(()) => self.keyboard_locked = true,
                Err(e) => debug!("Keyboard lock not acquired: {}", e),
            }
        } else {
            debug!("Keyboard lock unavailable, listener-only suppression");
        }

        self.active = true;
        info!(
            "Lockdown activated ({} installers, keyboard lock: {})",
            self.removers.len(),
            self.keyboard_locked
        );
        true
    }

    /// Remove every listener and release the keyboard lock; returns false if inactive
    pub fn deactivate(&mut self) -> bool {
        if !self.active {
            return false;
        }

        while let Some(remove) = self.removers.pop() {
            remove();
        }
        if self.keyboard_locked {
            self.keyboard_lock.unlock();
            self.keyboard_locked = false;
        }

        self.active = false;
        info!("Lockdown deactivated");
        true
    }
}

impl Drop for LockdownController {
    fn drop(&mut self) {
        self.deactivate();
    }
}
