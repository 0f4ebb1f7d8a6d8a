//! Tooltip controller: reveals a wrapper's original text on hover/focus.
//!
//! A small event-driven state machine, decoupled from the rewrite pipeline
//! except for reading the attributes it wrote. Events come from delegated
//! listeners at a single ancestor (the host glue wires them using the
//! capability-resolved event names); the controller answers with commands,
//! and the applier performs the document writes.
//!
//! State machine: Idle -> Pending (hover, delayed) -> Visible, with
//! keyboard focus jumping straight to Visible. Leave, blur, the dismiss
//! key, and outside interaction all return to Idle. Re-entering the same
//! anchor while Pending keeps the original deadline, so hover jitter never
//! flickers and never produces two visible tooltips.
//!
//! The applier writes the original text into the tooltip companion as a
//! text node, never through any markup-interpreting path. The original is
//! untrusted page content.

pub mod capabilities;

pub use capabilities::Capabilities;

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::dom::{Document, NodeId};
use crate::rewrite::classify::ORIGINAL_ATTR;

/// Interaction event, already mapped to an anchor wrapper by the host glue.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TooltipEvent {
    Enter { anchor: NodeId },
    Leave,
    Focus { anchor: NodeId },
    Blur,
    /// Explicit cancel key (Escape).
    Dismiss,
    /// Pointer interaction outside any wrapper.
    Outside,
}

/// Document effect the applier must perform.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TooltipCommand {
    Show { anchor: NodeId },
    Hide { anchor: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Pending { anchor: NodeId, due_at: f64 },
    Visible { anchor: NodeId },
}

#[wasm_bindgen]
pub struct TooltipController {
    caps: Capabilities,
    phase: Phase,
}

impl TooltipController {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            phase: Phase::Idle,
        }
    }

    pub fn phase_name(&self) -> &'static str {
        match self.phase {
            Phase::Idle => "idle",
            Phase::Pending { .. } => "pending",
            Phase::Visible { .. } => "visible",
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Feed one interaction event; returns the commands to apply, in order.
    pub fn on_event(&mut self, event: TooltipEvent, now: f64) -> Vec<TooltipCommand> {
        match (self.phase, event) {
            // Hover arms the delay; focus shows immediately.
            (Phase::Idle, TooltipEvent::Enter { anchor }) => {
                self.phase = Phase::Pending {
                    anchor,
                    due_at: now + self.caps.hover_delay_ms,
                };
                Vec::new()
            }
            (Phase::Idle, TooltipEvent::Focus { anchor }) => {
                self.phase = Phase::Visible { anchor };
                vec![TooltipCommand::Show { anchor }]
            }
            (Phase::Idle, _) => Vec::new(),

            // Re-entering the pending anchor keeps its deadline; a new
            // anchor re-arms.
            (Phase::Pending { anchor, .. }, TooltipEvent::Enter { anchor: next })
                if anchor == next =>
            {
                Vec::new()
            }
            (Phase::Pending { .. }, TooltipEvent::Enter { anchor }) => {
                self.phase = Phase::Pending {
                    anchor,
                    due_at: now + self.caps.hover_delay_ms,
                };
                Vec::new()
            }
            (Phase::Pending { .. }, TooltipEvent::Focus { anchor }) => {
                self.phase = Phase::Visible { anchor };
                vec![TooltipCommand::Show { anchor }]
            }
            (Phase::Pending { .. }, TooltipEvent::Leave)
            | (Phase::Pending { .. }, TooltipEvent::Blur)
            | (Phase::Pending { .. }, TooltipEvent::Dismiss)
            | (Phase::Pending { .. }, TooltipEvent::Outside) => {
                self.phase = Phase::Idle;
                Vec::new()
            }

            (Phase::Visible { anchor }, TooltipEvent::Enter { anchor: next })
                if anchor == next =>
            {
                Vec::new()
            }
            (Phase::Visible { anchor }, TooltipEvent::Enter { anchor: next }) => {
                // Hide the old one before arming the next; at most one
                // tooltip is ever visible.
                self.phase = Phase::Pending {
                    anchor: next,
                    due_at: now + self.caps.hover_delay_ms,
                };
                vec![TooltipCommand::Hide { anchor }]
            }
            (Phase::Visible { anchor }, TooltipEvent::Focus { anchor: next }) => {
                if anchor == next {
                    return Vec::new();
                }
                self.phase = Phase::Visible { anchor: next };
                vec![
                    TooltipCommand::Hide { anchor },
                    TooltipCommand::Show { anchor: next },
                ]
            }
            (Phase::Visible { anchor }, TooltipEvent::Leave)
            | (Phase::Visible { anchor }, TooltipEvent::Blur)
            | (Phase::Visible { anchor }, TooltipEvent::Dismiss)
            | (Phase::Visible { anchor }, TooltipEvent::Outside) => {
                self.phase = Phase::Idle;
                vec![TooltipCommand::Hide { anchor }]
            }
        }
    }

    /// Clock tick: promotes an expired Pending to Visible.
    pub fn tick(&mut self, now: f64) -> Vec<TooltipCommand> {
        if let Phase::Pending { anchor, due_at } = self.phase {
            if now >= due_at {
                self.phase = Phase::Visible { anchor };
                return vec![TooltipCommand::Show { anchor }];
            }
        }
        Vec::new()
    }
}

/// Apply a command to the document model.
///
/// Show reads the anchor's stored original and writes it into the tooltip
/// companion via `set_text` (the text-only insertion path), then flips
/// `aria-hidden`. Hide flips it back. A vanished anchor is a no-op error
/// the caller may log; it never unwinds.
pub fn apply(doc: &mut Document, command: &TooltipCommand) -> Result<(), String> {
    match command {
        TooltipCommand::Show { anchor } => {
            let original = doc
                .attribute(*anchor, ORIGINAL_ATTR)
                .ok_or_else(|| format!("anchor {:?} has no stored original", anchor))?
                .to_string();
            let tip = tip_of(doc, *anchor)?;
            let tip_text = match doc.children(tip).first() {
                Some(&t) => t,
                None => {
                    let t = doc.create_text("");
                    doc.attach_silent(tip, t)?;
                    t
                }
            };
            doc.set_text(tip_text, &original)?;
            doc.set_attribute(tip, "aria-hidden", "false")
        }
        TooltipCommand::Hide { anchor } => {
            let tip = tip_of(doc, *anchor)?;
            doc.set_attribute(tip, "aria-hidden", "true")
        }
    }
}

fn tip_of(doc: &Document, anchor: NodeId) -> Result<NodeId, String> {
    doc.find_element(anchor, |d, n| d.attribute(n, "role") == Some("tooltip"))
        .ok_or_else(|| format!("anchor {:?} has no tooltip companion", anchor))
}

// =============================================================================
// WASM Bindings
// =============================================================================

#[wasm_bindgen]
impl TooltipController {
    /// Create a controller from a capabilities object (JS binding).
    #[wasm_bindgen(constructor)]
    pub fn js_new(caps: JsValue) -> Result<TooltipController, JsValue> {
        let caps: Capabilities = if caps.is_null() || caps.is_undefined() {
            Capabilities::default()
        } else {
            serde_wasm_bindgen::from_value(caps)
                .map_err(|e| JsValue::from_str(&format!("Invalid capabilities: {}", e)))?
        };
        Ok(Self::new(caps))
    }

    /// Delegated-listener event names for this environment (JS binding).
    #[wasm_bindgen(js_name = enterEventName)]
    pub fn js_enter_event_name(&self) -> String {
        self.caps.enter_event().to_string()
    }

    #[wasm_bindgen(js_name = leaveEventName)]
    pub fn js_leave_event_name(&self) -> String {
        self.caps.leave_event().to_string()
    }

    /// Feed an event; returns the command list (JS binding).
    #[wasm_bindgen(js_name = onEvent)]
    pub fn js_on_event(&mut self, event: JsValue) -> Result<JsValue, JsValue> {
        let event: TooltipEvent = serde_wasm_bindgen::from_value(event)
            .map_err(|e| JsValue::from_str(&format!("Invalid event: {}", e)))?;
        let commands = self.on_event(event, js_sys::Date::now());
        serde_wasm_bindgen::to_value(&commands).map_err(|e| JsValue::from_str(&format!("{}", e)))
    }

    /// Clock tick (JS binding).
    #[wasm_bindgen(js_name = tick)]
    pub fn js_tick(&mut self) -> JsValue {
        let commands = self.tick(js_sys::Date::now());
        serde_wasm_bindgen::to_value(&commands).unwrap_or(JsValue::NULL)
    }

    /// Current phase name (JS binding).
    #[wasm_bindgen(js_name = phaseName)]
    pub fn js_phase_name(&self) -> String {
        self.phase_name().to_string()
    }
}
