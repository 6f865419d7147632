//! Parsing of `uiautomator dump` output.
//!
//! The dump is a small XML document: a `<hierarchy>` root holding nested
//! `<node>` elements whose state lives entirely in attributes. [`parse_hierarchy`] builds a [`UiNode`] tree from it and
//! [`collect_elements`] reduces the tree to [`ScreenElement`]s.

use std::collections::HashMap;
use std::sync::OnceLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::element::{Rect, ScreenElement};

/// Marker uiautomator prints when the window has no accessibility root.
pub const NULL_ROOT_NODE: &str = "null root node";

/// Why a dump could not be turned into a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpFailure {
    /// uiautomator reported a null root node (usually mid-transition).
    NullRootNode,
    /// The output held no XML document.
    NoXml,
    /// The XML was present but malformed.
    Malformed(String),
}

impl std::fmt::Display for DumpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpFailure::NullRootNode => write!(f, "uiautomator returned a null root node"),
            DumpFailure::NoXml => write!(f, "no XML found in uiautomator output"),
            DumpFailure::Malformed(reason) => write!(f, "malformed uiautomator XML: {reason}"),
        }
    }
}

/// One XML element from the dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiNode {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<UiNode>,
}

impl UiNode {
    /// Attribute value, treating an empty string as absent.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn bounds_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").expect("bounds regex must compile")
    })
}

/// Extracts the XML document from raw dump output, which may carry a
/// trailing "UI hierchary dumped to" line.
pub fn extract_xml(output: &str) -> Result<&str, DumpFailure> {
    if output.contains(NULL_ROOT_NODE) {
        return Err(DumpFailure::NullRootNode);
    }
    let start = output
        .find("<?xml")
        .or_else(|| output.find("<hierarchy"))
        .ok_or(DumpFailure::NoXml)?;
    let end = output
        .rfind("</hierarchy>")
        .map(|i| i + "</hierarchy>".len())
        .ok_or(DumpFailure::NoXml)?;
    if end <= start {
        return Err(DumpFailure::NoXml);
    }
    Ok(&output[start..end])
}

/// Parses dump output into its root node.
pub fn parse_hierarchy(output: &str) -> Result<UiNode, DumpFailure> {
    let xml = extract_xml(output)?;
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<UiNode> = Vec::new();
    let mut root: Option<UiNode> = None;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => stack.push(open_node(&start)?),
            Event::Empty(start) => {
                let node = open_node(&start)?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(end) => {
                let node = stack.pop().ok_or_else(|| {
                    DumpFailure::Malformed(format!(
                        "unexpected </{}>",
                        String::from_utf8_lossy(end.name().as_ref())
                    ))
                })?;
                attach(&mut stack, &mut root, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(DumpFailure::Malformed(format!("unclosed <{}>", open.tag)));
    }
    root.ok_or(DumpFailure::NoXml)
}

fn malformed(e: impl std::fmt::Display) -> DumpFailure {
    DumpFailure::Malformed(e.to_string())
}

fn open_node(start: &BytesStart<'_>) -> Result<UiNode, DumpFailure> {
    let mut attributes = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        attributes.insert(key, value);
    }
    Ok(UiNode {
        tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [UiNode], root: &mut Option<UiNode>, node: UiNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

/// Parses `[x0,y0][x1,y1]` into a rectangle.
pub fn parse_bounds(bounds: &str) -> Option<Rect> {
    let caps = bounds_regex().captures(bounds.trim())?;
    let n = |i: usize| caps[i].parse::<i32>().ok();
    let (x0, y0, x1, y1) = (n(1)?, n(2)?, n(3)?, n(4)?);
    Some(Rect::new(x0, y0, x1.checked_sub(x0)?, y1.checked_sub(y0)?))
}

fn to_element(node: &UiNode) -> Option<ScreenElement> {
    let text = node.attr("text");
    let label = node.attr("content-desc").or_else(|| node.attr("hint"));
    if text.is_none() && label.is_none() {
        return None;
    }
    let rect = node.attr("bounds").and_then(parse_bounds)?;
    if !rect.has_area() {
        return None;
    }
    Some(ScreenElement {
        text: text.map(str::to_string),
        label: label.map(str::to_string),
        identifier: node.attr("resource-id").map(str::to_string),
        focused: (node.attr("focused") == Some("true")).then_some(true),
        enabled: (node.attr("enabled") == Some("false")).then_some(false),
        ..ScreenElement::new(node.attr("class").unwrap_or("text"), rect)
    })
}

/// Flattens a hierarchy into elements carrying text, a content description
/// or a hint, in document order. Zero-area nodes are dropped.
pub fn collect_elements(root: &UiNode) -> Vec<ScreenElement> {
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

fn walk(node: &UiNode, out: &mut Vec<ScreenElement>) {
    if let Some(element) = to_element(node) {
        out.push(element);
    }
    for child in &node.children {
        walk(child, out);
    }
}
