//! Shared value types for the device-control layer.
//!
//! This module defines the data structures every Robot hands out or accepts:
//! on-screen elements, rectangles, screen dimensions, orientation, swipe
//! directions and hardware buttons. These types are independent of any
//! specific platform transport.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::robot::RobotError;

/// A shared, immutable snapshot of the elements on screen.
///
/// Cache hits hand out clones of the same `Arc`, so two reads within the
/// cache window observe the identical set.
pub type ElementSet = Arc<[ScreenElement]>;

/// An axis-aligned rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// The x-coordinate of the top-left corner.
    pub x: i32,
    /// The y-coordinate of the top-left corner.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Creates a rectangle from its origin and size.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` if the rectangle covers a non-empty area.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// The midpoint of the rectangle.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }
}

/// One interactable or inspectable node from a platform UI tree.
///
/// Elements are rebuilt on every fresh query; no identity persists across
/// queries. Zero-area nodes are filtered out before an element is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenElement {
    /// Platform-native class or role (e.g. `android.widget.Button`,
    /// `XCUIElementTypeButton`).
    #[serde(rename = "type")]
    pub element_type: String,

    /// Accessibility label (content description on Android).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Visible text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Accessibility name (iOS only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Current value, e.g. text field contents or switch state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Stable identifier (resource-id on Android, accessibility id on iOS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Bounds in device pixels.
    pub rect: Rect,

    /// Present and `true` only when the element holds input focus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,

    /// Present and `false` only when the platform reports the element disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl ScreenElement {
    /// Creates an element with only a type and bounds set.
    pub fn new(element_type: impl Into<String>, rect: Rect) -> Self {
        Self {
            element_type: element_type.into(),
            label: None,
            text: None,
            name: None,
            value: None,
            identifier: None,
            rect,
            focused: None,
            enabled: None,
        }
    }

    /// The point a tap on this element should target.
    pub fn center(&self) -> (i32, i32) {
        self.rect.center()
    }

    /// Case-insensitive equality against text, label or value.
    pub fn shows_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.text, &self.label, &self.value]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.to_lowercase() == needle)
    }
}

/// Selects elements by substring on any combination of fields.
///
/// Every field that is set must match; unset fields are ignored. A selector
/// with no fields set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl ElementSelector {
    /// Selector on the accessibility label.
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    /// Selector on the visible text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Selector on the identifier.
    pub fn identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            ..Default::default()
        }
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.text.is_none()
            && self.element_type.is_none()
            && self.identifier.is_none()
    }

    /// Returns `true` if every set field is a substring of the element's
    /// corresponding field.
    pub fn matches(&self, element: &ScreenElement) -> bool {
        if self.is_empty() {
            return false;
        }
        fn contains(wanted: &Option<String>, actual: Option<&str>) -> bool {
            match wanted {
                None => true,
                Some(wanted) => actual.is_some_and(|a| a.contains(wanted.as_str())),
            }
        }
        contains(&self.label, element.label.as_deref())
            && contains(&self.text, element.text.as_deref())
            && contains(&self.element_type, Some(element.element_type.as_str()))
            && contains(&self.identifier, element.identifier.as_deref())
    }

    /// Returns the first element in `elements` matched by this selector.
    pub fn find<'a>(&self, elements: &'a [ScreenElement]) -> Option<&'a ScreenElement> {
        elements.iter().find(|e| self.matches(e))
    }
}

impl fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(label) = &self.label {
            parts.push(format!("label={label:?}"));
        }
        if let Some(text) = &self.text {
            parts.push(format!("text={text:?}"));
        }
        if let Some(typ) = &self.element_type {
            parts.push(format!("type={typ:?}"));
        }
        if let Some(id) = &self.identifier {
            parts.push(format!("identifier={id:?}"));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Screen dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Width in device pixels (points on iOS).
    pub width: i32,
    /// Height in device pixels (points on iOS).
    pub height: i32,
    /// Pixel-to-point scale factor; `1.0` on Android.
    pub scale: f64,
}

impl ScreenSize {
    /// The midpoint of the screen.
    pub fn center(&self) -> (i32, i32) {
        (self.width / 2, self.height / 2)
    }

    /// Start and end points of a directional swipe covering 60% of the
    /// screen along the swipe axis, centered on the midpoint.
    pub fn swipe_span(&self, direction: SwipeDirection) -> ((i32, i32), (i32, i32)) {
        let (cx, cy) = self.center();
        let extent = if direction.is_vertical() {
            self.height
        } else {
            self.width
        };
        let half = fraction(extent, 3, 10);
        let start = direction.offset(cx, cy, -half);
        let end = direction.offset(cx, cy, half);
        (start, end)
    }
}

/// `value * num / den` without intermediate overflow. Exact for
/// `num <= den`, which keeps the result within `i32`.
pub(crate) fn fraction(value: i32, num: i64, den: i64) -> i32 {
    (i64::from(value) * num / den) as i32
}

/// Device orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

impl FromStr for Orientation {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(RobotError::Actionable(format!(
                "Unsupported orientation \"{other}\". Use \"portrait\" or \"landscape\"."
            ))),
        }
    }
}

/// Cardinal swipe direction, naming the way the finger travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    /// Returns `true` for the vertical directions.
    pub fn is_vertical(self) -> bool {
        matches!(self, SwipeDirection::Up | SwipeDirection::Down)
    }

    /// End point of a swipe starting at `(x, y)` travelling `distance` pixels.
    pub fn offset(self, x: i32, y: i32, distance: i32) -> (i32, i32) {
        match self {
            SwipeDirection::Up => (x, y.saturating_sub(distance)),
            SwipeDirection::Down => (x, y.saturating_add(distance)),
            SwipeDirection::Left => (x.saturating_sub(distance), y),
            SwipeDirection::Right => (x.saturating_add(distance), y),
        }
    }
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwipeDirection::Up => "up",
            SwipeDirection::Down => "down",
            SwipeDirection::Left => "left",
            SwipeDirection::Right => "right",
        };
        f.write_str(s)
    }
}

impl FromStr for SwipeDirection {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(SwipeDirection::Up),
            "down" => Ok(SwipeDirection::Down),
            "left" => Ok(SwipeDirection::Left),
            "right" => Ok(SwipeDirection::Right),
            other => Err(RobotError::Actionable(format!(
                "Swipe direction \"{other}\" is not supported. Use one of: up, down, left, right."
            ))),
        }
    }
}

/// Hardware or soft buttons a Robot may be able to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Button {
    Back,
    Home,
    VolumeUp,
    VolumeDown,
    Enter,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    DpadCenter,
}

impl Button {
    /// Every button name, in wire form.
    pub const ALL: [&'static str; 10] = [
        "BACK",
        "HOME",
        "VOLUME_UP",
        "VOLUME_DOWN",
        "ENTER",
        "DPAD_UP",
        "DPAD_DOWN",
        "DPAD_LEFT",
        "DPAD_RIGHT",
        "DPAD_CENTER",
    ];
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Button::Back => "BACK",
            Button::Home => "HOME",
            Button::VolumeUp => "VOLUME_UP",
            Button::VolumeDown => "VOLUME_DOWN",
            Button::Enter => "ENTER",
            Button::DpadUp => "DPAD_UP",
            Button::DpadDown => "DPAD_DOWN",
            Button::DpadLeft => "DPAD_LEFT",
            Button::DpadRight => "DPAD_RIGHT",
            Button::DpadCenter => "DPAD_CENTER",
        };
        f.write_str(s)
    }
}

impl FromStr for Button {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let button = match s.to_ascii_uppercase().as_str() {
            "BACK" => Button::Back,
            "HOME" => Button::Home,
            "VOLUME_UP" => Button::VolumeUp,
            "VOLUME_DOWN" => Button::VolumeDown,
            "ENTER" => Button::Enter,
            "DPAD_UP" => Button::DpadUp,
            "DPAD_DOWN" => Button::DpadDown,
            "DPAD_LEFT" => Button::DpadLeft,
            "DPAD_RIGHT" => Button::DpadRight,
            "DPAD_CENTER" => Button::DpadCenter,
            other => {
                return Err(RobotError::Actionable(format!(
                    "Button \"{other}\" is not supported. Supported buttons: {}.",
                    Button::ALL.join(", ")
                )))
            }
        };
        Ok(button)
    }
}

/// An application installed on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    /// Package name on Android, bundle identifier on iOS.
    pub id: String,
    /// Display name, when the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
