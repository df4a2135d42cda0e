//! Document events seen by the lockdown listeners

/// Event types the lockdown listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    KeyDown,
    KeyUp,
    ContextMenu,
    DragStart,
    SelectStart,
    Copy,
    Cut,
    Paste,
    TouchStart,
    TouchMove,
    Wheel,
    GestureStart,
    GestureChange,
    GestureEnd,
    FullscreenChange,
}

impl EventType {
    /// DOM event name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::KeyDown => "keydown",
            EventType::KeyUp => "keyup",
            EventType::ContextMenu => "contextmenu",
            EventType::DragStart => "dragstart",
            EventType::SelectStart => "selectstart",
            EventType::Copy => "copy",
            EventType::Cut => "cut",
            EventType::Paste => "paste",
            EventType::TouchStart => "touchstart",
            EventType::TouchMove => "touchmove",
            EventType::Wheel => "wheel",
            EventType::GestureStart => "gesturestart",
            EventType::GestureChange => "gesturechange",
            EventType::GestureEnd => "gestureend",
            EventType::FullscreenChange => "fullscreenchange",
        }
    }
}

/// Modifier keys held during an input event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        alt: false,
        meta: false,
        shift: false,
    };

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::NONE
        }
    }

    pub fn meta() -> Self {
        Self {
            meta: true,
            ..Self::NONE
        }
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::NONE
        }
    }

    /// Ctrl, Alt or Meta held (Shift alone only changes the character)
    pub fn is_shortcut(&self) -> bool {
        self.ctrl || self.alt || self.meta
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    Key { key: String, modifiers: Modifiers },
    Touch { touches: usize },
    Wheel { delta_y: f32, modifiers: Modifiers },
    Fullscreen { active: bool },
    None,
}

/// One dispatched event
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub event_type: EventType,
    pub detail: EventDetail,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl DomEvent {
    pub fn new(event_type: EventType, detail: EventDetail) -> Self {
        Self {
            event_type,
            detail,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn key_down(key: &str, modifiers: Modifiers) -> Self {
        Self::new(
            EventType::KeyDown,
            EventDetail::Key {
                key: key.to_string(),
                modifiers,
            },
        )
    }

    pub fn touch(event_type: EventType, touches: usize) -> Self {
        Self::new(event_type, EventDetail::Touch { touches })
    }

    pub fn wheel(delta_y: f32, modifiers: Modifiers) -> Self {
        Self::new(EventType::Wheel, EventDetail::Wheel { delta_y, modifiers })
    }

    pub fn plain(event_type: EventType) -> Self {
        Self::new(event_type, EventDetail::None)
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Cancel and keep it from reaching page handlers
    pub fn suppress(&mut self) {
        self.prevent_default();
        self.stop_propagation();
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}
