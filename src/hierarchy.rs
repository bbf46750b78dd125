use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// uiautomator dumps every view as a <node .../> tag with quoted attributes.
// Scanning tags in document order reproduces the pre-order traversal the
// element ids are based on.
static NODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<node\b[^>]*>").expect("hardcoded regex pattern is valid"));

static ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w-]+)="([^"]*)""#).expect("hardcoded regex pattern is valid")
});

static BOUNDS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+),(\d+)\]\[(\d+),(\d+)\]").expect("hardcoded regex pattern is valid")
});

/// One view from the device hierarchy, kept only when it is worth showing
/// to the model (has text, is interactive, or is an enabled resource).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiElement {
    pub id: usize,
    pub text: String,
    pub content_desc: String,
    pub resource_id: String,
    pub class_name: String,
    /// (x1, y1, x2, y2) in screen pixels.
    pub bounds: (i32, i32, i32, i32),
    pub clickable: bool,
    pub focusable: bool,
    pub scrollable: bool,
    pub enabled: bool,
    pub checkable: bool,
    pub checked: bool,
    pub editable: bool,
}

impl UiElement {
    pub fn center(&self) -> (i32, i32) {
        let (x1, y1, x2, y2) = self.bounds;
        ((x1 + x2) / 2, (y1 + y2) / 2)
    }

    pub fn area(&self) -> i64 {
        let (x1, y1, x2, y2) = self.bounds;
        (x2 - x1) as i64 * (y2 - y1) as i64
    }

    pub fn is_interactive(&self) -> bool {
        self.clickable || self.focusable || self.editable || self.checkable
    }

    fn class_short(&self) -> &str {
        self.class_name.rsplit('.').next().unwrap_or_default()
    }

    /// Best human-readable label: text, then content description, then the
    /// trailing resource id segment, then the bare class name.
    pub fn display_text(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        if !self.content_desc.is_empty() {
            return self.content_desc.clone();
        }
        if let Some(tail) = self.resource_id.rsplit('/').next() {
            if !tail.is_empty() {
                return tail.to_string();
            }
        }
        self.class_short().to_string()
    }
}

/// Parsed device hierarchy with stable element ids in document order.
#[derive(Debug, Clone, Default)]
pub struct UiHierarchy {
    pub elements: Vec<UiElement>,
}

impl UiHierarchy {
    /// Scan the raw XML dump and keep meaningful, visibly-sized elements.
    /// Malformed fragments are skipped rather than failing the snapshot.
    pub fn parse(xml: &str) -> Self {
        let mut elements = Vec::new();
        for tag in NODE_REGEX.find_iter(xml) {
            if let Some(element) = parse_node(tag.as_str(), elements.len()) {
                elements.push(element);
            }
        }
        tracing::debug!(elements = elements.len(), "hierarchy parsed");
        Self { elements }
    }

    pub fn get(&self, id: usize) -> Option<&UiElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Center point for an element id, the coordinate taps and typing aim at.
    pub fn center_of(&self, id: usize) -> Option<(i32, i32)> {
        self.get(id).map(UiElement::center)
    }

    pub fn interactive_elements(&self) -> Vec<&UiElement> {
        self.elements.iter().filter(|e| e.is_interactive()).collect()
    }

    pub fn scrollable_elements(&self) -> Vec<&UiElement> {
        self.elements.iter().filter(|e| e.scrollable).collect()
    }

    pub fn find_by_text(&self, needle: &str) -> Vec<&UiElement> {
        let needle = needle.to_lowercase();
        self.elements
            .iter()
            .filter(|e| {
                e.text.to_lowercase().contains(&needle)
                    || e.content_desc.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Numbered element list for the decision prompt. Each line carries the
    /// id the model references in tap/type actions plus the tap coordinate.
    pub fn to_indexed_prompt(&self, max_elements: usize) -> String {
        let mut lines = vec!["Clickable Elements (use element ID for actions):".to_string()];
        for e in self.interactive_elements().into_iter().take(max_elements) {
            let mut label = e.display_text();
            if label.is_empty() || label == e.class_short() {
                label = format!("[{}]", e.class_short());
            }
            let mut props = Vec::new();
            if e.editable {
                props.push("INPUT".to_string());
            }
            if e.checkable {
                props.push(if e.checked { "☑" } else { "☐" }.to_string());
            }
            if e.scrollable {
                props.push("SCROLL".to_string());
            }
            let prop_str = if props.is_empty() {
                String::new()
            } else {
                format!(" ({})", props.join(", "))
            };
            let (cx, cy) = e.center();
            lines.push(format!("  [{}] {label}{prop_str} @ ({cx}, {cy})", e.id));
        }
        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn parse_node(tag: &str, next_id: usize) -> Option<UiElement> {
    let mut text = String::new();
    let mut content_desc = String::new();
    let mut resource_id = String::new();
    let mut class_name = "unknown".to_string();
    let mut bounds_str = String::new();
    let mut clickable = false;
    let mut focusable = false;
    let mut scrollable = false;
    let mut enabled = true;
    let mut checkable = false;
    let mut checked = false;

    for cap in ATTR_REGEX.captures_iter(tag) {
        let value = unescape_xml(&cap[2]);
        match &cap[1] {
            "text" => text = value.trim().to_string(),
            "content-desc" => content_desc = value.trim().to_string(),
            "resource-id" => resource_id = value,
            "class" => class_name = value,
            "bounds" => bounds_str = value,
            "clickable" => clickable = value == "true",
            "focusable" => focusable = value == "true",
            "scrollable" => scrollable = value == "true",
            "enabled" => enabled = value == "true",
            "checkable" => checkable = value == "true",
            "checked" => checked = value == "true",
            _ => {}
        }
    }

    let bounds = parse_bounds(&bounds_str)?;
    let editable = class_name.contains("EditText") || class_name.contains("TextInput");

    let meaningful = !text.is_empty()
        || !content_desc.is_empty()
        || clickable
        || editable
        || scrollable
        || (!resource_id.is_empty() && enabled);
    let area = ((bounds.2 - bounds.0) as i64) * ((bounds.3 - bounds.1) as i64);
    if !meaningful || area <= 100 {
        return None;
    }

    Some(UiElement {
        id: next_id,
        text,
        content_desc,
        resource_id,
        class_name,
        bounds,
        clickable,
        focusable,
        scrollable,
        enabled,
        checkable,
        checked,
        editable,
    })
}

/// Convert "[x1,y1][x2,y2]" into a tuple.
fn parse_bounds(bounds: &str) -> Option<(i32, i32, i32, i32)> {
    let cap = BOUNDS_REGEX.captures(bounds)?;
    Some((
        cap[1].parse().ok()?,
        cap[2].parse().ok()?,
        cap[3].parse().ok()?,
        cap[4].parse().ok()?,
    ))
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
