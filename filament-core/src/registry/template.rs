//! Textual cell references.
//!
//! `Observable::to_string()` yields `{{#ObItem::(<id>)}}`. Strings carrying
//! such references can be split back into text and cell segments, rendered
//! with the cells' current values, or bound into a computed string that
//! follows every referenced cell.
//!
//! The pattern is a wire format shared with string templates produced
//! elsewhere, so it must stay bit-exact.

use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use super::{MemoryManager, RegisteredCell};
use crate::error::{Error, Result};
use crate::reactive::{computed, Computed, Dependency, Subscription};

/// Pattern matching one embedded cell reference.
pub const ITEM_REFERENCE_PATTERN: &str = r"\{\{#ObItem::\(([0-9]+)\)\}\}";

fn reference_regex() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| Regex::new(ITEM_REFERENCE_PATTERN).expect("reference pattern is valid"))
}

/// A piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Registry id of an embedded cell.
    Reference(u64),
}

/// Split `input` into literal text and cell references.
pub fn parse_template(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for captures in reference_regex().captures_iter(input) {
        let whole = captures.get(0).expect("capture 0 is the whole match");
        if whole.start() > cursor {
            segments.push(Segment::Text(input[cursor..whole.start()].to_string()));
        }
        match captures[1].parse::<u64>() {
            Ok(id) => segments.push(Segment::Reference(id)),
            // Digits too long for u64 cannot name a cell; keep them as text.
            Err(_) => segments.push(Segment::Text(whole.as_str().to_string())),
        }
        cursor = whole.end();
    }

    if cursor < input.len() {
        segments.push(Segment::Text(input[cursor..].to_string()));
    }
    segments
}

/// Whether `input` contains at least one cell reference.
pub fn has_references(input: &str) -> bool {
    reference_regex().is_match(input)
}

fn render_reference(id: u64) -> Result<String> {
    let cell = MemoryManager::resolve(id)?;
    cell.render_text().ok_or(Error::NotDisplayable(id))
}

/// Substitute every reference with its cell's current value.
pub fn render_template(input: &str) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    for segment in parse_template(input) {
        match segment {
            Segment::Text(text) => output.push_str(&text),
            Segment::Reference(id) => output.push_str(&render_reference(id)?),
        }
    }
    Ok(output)
}

fn render_lossy(segments: &[Segment]) -> String {
    let mut output = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => output.push_str(text),
            Segment::Reference(id) => match render_reference(*id) {
                Ok(text) => output.push_str(&text),
                Err(err) => {
                    warn!(registry_id = id, error = %err, "unresolved template reference");
                    output.push_str(&format!("{{{{#ObItem::({})}}}}", id));
                }
            },
        }
    }
    output
}

struct ErasedDependency(Rc<dyn RegisteredCell>);

impl Dependency for ErasedDependency {
    fn watch(&self, notify: Rc<dyn Fn()>) -> Subscription {
        Rc::clone(&self.0).watch_erased(notify)
    }
}

/// Bind `input` into a computed string that re-renders whenever any
/// referenced cell changes.
///
/// Every reference must resolve when the binding is created.
pub fn bind_template(input: &str) -> Result<Computed<String>> {
    let segments = parse_template(input);
    let mut dependencies = Vec::new();
    for segment in &segments {
        if let Segment::Reference(id) = segment {
            let cell = MemoryManager::resolve(*id)?;
            if cell.render_text().is_none() {
                return Err(Error::NotDisplayable(*id));
            }
            tracing::trace!(registry_id = id, cell = %cell.cell_id(), "template dependency");
            dependencies.push(ErasedDependency(cell));
        }
    }

    let deps: Vec<&dyn Dependency> = dependencies.iter().map(|d| d as &dyn Dependency).collect();
    Ok(computed(move || render_lossy(&segments), &deps))
}
