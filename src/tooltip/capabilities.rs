//! Environment capabilities, resolved once at startup.
//!
//! Differences between host environments (pointer-event support, motion
//! preferences) collapse into this one value, injected into the tooltip
//! controller. Nothing else in the pipeline branches on environment
//! identity.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_hover_delay_ms() -> f64 {
    350.0
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct Capabilities {
    /// Host dispatches pointer events; otherwise fall back to mouse events.
    #[serde(default = "default_true", rename = "pointerEvents")]
    pub pointer_events: bool,
    /// Delay before a hover-opened tooltip becomes visible. Keyboard focus
    /// is always immediate.
    #[serde(default = "default_hover_delay_ms", rename = "hoverDelayMs")]
    pub hover_delay_ms: f64,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            pointer_events: true,
            hover_delay_ms: default_hover_delay_ms(),
        }
    }
}

impl Capabilities {
    /// Event names the host glue should delegate, per environment.
    pub fn enter_event(&self) -> &'static str {
        if self.pointer_events {
            "pointerenter"
        } else {
            "mouseenter"
        }
    }

    pub fn leave_event(&self) -> &'static str {
        if self.pointer_events {
            "pointerleave"
        } else {
            "mouseleave"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let caps = Capabilities::default();
        assert!(caps.pointer_events);
        assert_eq!(caps.hover_delay_ms, 350.0);
        assert_eq!(caps.enter_event(), "pointerenter");
    }

    #[test]
    fn test_mouse_fallback() {
        let caps: Capabilities = serde_json::from_str(r#"{"pointerEvents": false}"#).unwrap();
        assert_eq!(caps.enter_event(), "mouseenter");
        assert_eq!(caps.leave_event(), "mouseleave");
        assert_eq!(caps.hover_delay_ms, 350.0);
    }
}
