//! WebDriverAgent wire types.
//!
//! Gestures are W3C pointer action sequences; the UI tree arrives as a
//! nested JSON document that [`flatten`] reduces to the elements a caller
//! can act on. Every agent response wraps its payload in `{"value": ...}`.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::element::{Rect, ScreenElement};

/// Pause between pointer down and up for a tap.
pub const TAP_PAUSE: Duration = Duration::from_millis(100);

/// Pause between pointer down and up for a long press.
pub const LONG_PRESS_PAUSE: Duration = Duration::from_millis(500);

/// Element types kept by [`flatten`].
pub const ACCEPTED_TYPES: [&str; 8] = [
    "TextField",
    "SecureTextField",
    "Button",
    "Switch",
    "Icon",
    "SearchField",
    "StaticText",
    "Image",
];

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Body of `POST /session/{id}/actions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionsRequest {
    pub actions: Vec<PointerSequence>,
}

/// One input source and its timed actions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerSequence {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub id: &'static str,
    pub parameters: PointerParameters,
    pub actions: Vec<PointerAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerParameters {
    pub pointer_type: &'static str,
}

/// A single pointer primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointerAction {
    PointerMove { x: i32, y: i32, duration: u64 },
    PointerDown { button: u8 },
    Pause { duration: u64 },
    PointerUp { button: u8 },
}

impl ActionsRequest {
    fn finger(actions: Vec<PointerAction>) -> Self {
        Self {
            actions: vec![PointerSequence {
                source_type: "pointer",
                id: "finger1",
                parameters: PointerParameters {
                    pointer_type: "touch",
                },
                actions,
            }],
        }
    }

    /// move → down → 100 ms pause → up.
    pub fn tap(x: i32, y: i32) -> Self {
        Self::press(x, y, TAP_PAUSE)
    }

    /// move → down → 500 ms pause → up.
    pub fn long_press(x: i32, y: i32) -> Self {
        Self::press(x, y, LONG_PRESS_PAUSE)
    }

    fn press(x: i32, y: i32, hold: Duration) -> Self {
        Self::finger(vec![
            PointerAction::PointerMove { x, y, duration: 0 },
            PointerAction::PointerDown { button: 0 },
            PointerAction::Pause {
                duration: hold.as_millis() as u64,
            },
            PointerAction::PointerUp { button: 0 },
        ])
    }

    /// Press at `from`, drag to `to` over `duration`, release.
    pub fn swipe(from: (i32, i32), to: (i32, i32), duration: Duration) -> Self {
        Self::finger(vec![
            PointerAction::PointerMove {
                x: from.0,
                y: from.1,
                duration: 0,
            },
            PointerAction::PointerDown { button: 0 },
            PointerAction::PointerMove {
                x: to.0,
                y: to.1,
                duration: duration.as_millis() as u64,
            },
            PointerAction::PointerUp { button: 0 },
        ])
    }
}

// ---------------------------------------------------------------------------
// UI tree
// ---------------------------------------------------------------------------

/// Frame of a source node, in points. The agent may send fractional values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct SourceRect {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

/// One node of the `GET /source?format=json` tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceNode {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
    #[serde(default)]
    pub raw_identifier: Option<String>,
    #[serde(default)]
    pub rect: SourceRect,
    #[serde(default, deserialize_with = "flag")]
    pub is_visible: bool,
    #[serde(default, deserialize_with = "optional_flag")]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub children: Vec<SourceNode>,
}

/// The agent reports booleans as `true`, `"1"` or `1` depending on version.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
    Number(i64),
}

impl Flag {
    fn truthy(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s == "1" || s.eq_ignore_ascii_case("true"),
            Flag::Number(n) => *n != 0,
        }
    }
}

fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<Flag>::deserialize(d)?.is_some_and(|f| f.truthy()))
}

fn optional_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(Option::<Flag>::deserialize(d)?.map(|f| f.truthy()))
}

/// Values are usually strings, but switches and sliders may report numbers.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn non_empty(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(|s| !s.is_empty())
}

impl SourceNode {
    fn is_actionable(&self) -> bool {
        ACCEPTED_TYPES.contains(&self.node_type.as_str())
            && self.is_visible
            && self.rect.x >= 0.0
            && self.rect.y >= 0.0
            && (non_empty(&self.label) || non_empty(&self.name) || non_empty(&self.raw_identifier))
    }

    fn to_element(&self) -> ScreenElement {
        ScreenElement {
            label: self.label.clone().filter(|s| !s.is_empty()),
            name: self.name.clone().filter(|s| !s.is_empty()),
            value: self.value.clone().filter(|s| !s.is_empty()),
            identifier: self.raw_identifier.clone().filter(|s| !s.is_empty()),
            enabled: self.is_enabled.filter(|enabled| !enabled),
            ..ScreenElement::new(
                self.node_type.clone(),
                Rect::new(
                    self.rect.x.round() as i32,
                    self.rect.y.round() as i32,
                    self.rect.width.round() as i32,
                    self.rect.height.round() as i32,
                ),
            )
        }
    }
}

/// Flattens a source tree into the elements worth surfacing, depth first.
///
/// Keeps nodes of an accepted type that are visible, have a non-negative
/// origin, carry a label, name or identifier, and cover a non-zero area.
pub fn flatten(root: &SourceNode) -> Vec<ScreenElement> {
    let mut out = Vec::new();
    collect(root, &mut out);
    out
}

fn collect(node: &SourceNode, out: &mut Vec<ScreenElement>) {
    if node.is_actionable() {
        let element = node.to_element();
        if element.rect.has_area() {
            out.push(element);
        }
    }
    for child in &node.children {
        collect(child, out);
    }
}

/// Screen description from `GET /session/{id}/wda/screen`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub screen_size: SourceSize,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SourceSize {
    pub width: f64,
    pub height: f64,
}

fn unit_scale() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tap_encodes_w3c_sequence() {
        let body = serde_json::to_value(ActionsRequest::tap(10, 20)).unwrap();
        assert_eq!(
            body,
            json!({
                "actions": [{
                    "type": "pointer",
                    "id": "finger1",
                    "parameters": {"pointerType": "touch"},
                    "actions": [
                        {"type": "pointerMove", "x": 10, "y": 20, "duration": 0},
                        {"type": "pointerDown", "button": 0},
                        {"type": "pause", "duration": 100},
                        {"type": "pointerUp", "button": 0}
                    ]
                }]
            })
        );
    }

    #[test]
    fn long_press_holds_for_500ms() {
        let req = ActionsRequest::long_press(1, 2);
        assert_eq!(req.actions[0].actions[2], PointerAction::Pause { duration: 500 });
    }

    #[test]
    fn swipe_moves_over_duration() {
        let req = ActionsRequest::swipe((100, 800), (100, 200), Duration::from_millis(300));
        assert_eq!(
            req.actions[0].actions[2],
            PointerAction::PointerMove {
                x: 100,
                y: 200,
                duration: 300
            }
        );
    }

    fn tree() -> SourceNode {
        serde_json::from_value(json!({
            "type": "Application",
            "label": "Demo",
            "isVisible": "1",
            "rect": {"x": 0, "y": 0, "width": 390, "height": 844},
            "children": [
                {"type": "Button", "label": "Sign In", "rawIdentifier": "sign-in",
                 "isVisible": "1", "rect": {"x": 20, "y": 100, "width": 120.4, "height": 44}},
                {"type": "Button", "label": "Hidden", "isVisible": "0",
                 "rect": {"x": 20, "y": 200, "width": 100, "height": 44}},
                {"type": "StaticText", "label": "Offscreen", "isVisible": true,
                 "rect": {"x": -10, "y": 200, "width": 100, "height": 44}},
                {"type": "Other", "label": "Container", "isVisible": "1",
                 "rect": {"x": 0, "y": 300, "width": 390, "height": 400},
                 "children": [
                    {"type": "Switch", "name": "wifi", "value": "1", "isVisible": true,
                     "rect": {"x": 300, "y": 320, "width": 51, "height": 31}},
                    {"type": "StaticText", "isVisible": true,
                     "rect": {"x": 0, "y": 360, "width": 100, "height": 20}},
                    {"type": "Image", "label": "spacer", "isVisible": true,
                     "rect": {"x": 0, "y": 400, "width": 0, "height": 20}},
                    {"type": "Button", "label": "Pay", "isVisible": "1", "isEnabled": "0",
                     "rect": {"x": 10, "y": 600, "width": 100, "height": 44}}
                 ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn flatten_applies_every_filter() {
        let elements = flatten(&tree());
        let labels: Vec<_> = elements
            .iter()
            .map(|e| e.label.clone().or(e.name.clone()).unwrap_or_default())
            .collect();
        assert_eq!(labels, vec!["Sign In", "wifi", "Pay"]);

        let sign_in = &elements[0];
        assert_eq!(sign_in.identifier.as_deref(), Some("sign-in"));
        assert_eq!(sign_in.rect, Rect::new(20, 100, 120, 44));
        assert_eq!(sign_in.enabled, None);

        assert_eq!(elements[2].enabled, Some(false));
    }

    #[test]
    fn flattened_elements_never_have_zero_area() {
        assert!(flatten(&tree()).iter().all(|e| e.rect.has_area()));
    }

    #[test]
    fn screen_info_defaults_scale() {
        let info: ScreenInfo =
            serde_json::from_value(json!({"screenSize": {"width": 390, "height": 844}})).unwrap();
        assert_eq!(info.scale, 1.0);
        assert_eq!(info.screen_size.width, 390.0);
    }
}
