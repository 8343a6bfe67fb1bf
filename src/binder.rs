//! Placeholder binder.
//!
//! Binds a data context into the lexed text of one archive part. Errors are
//! collected over the whole part and returned together rather than failing on
//! the first broken tag.
use crate::error::{PlaceholderError, PlaceholderErrorCode, Result};
use crate::expression::{is_truthy, Expr, Scope};
use crate::markup::{lex, Part, TagKind, XmlTagKind};
use indexmap::IndexSet;
use log::debug;
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;

const LINE_BREAK: &str = "</w:t><w:br/><w:t xml:space=\"preserve\">";

/// What to do when a placeholder resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPolicy {
    /// Substitute an empty string and continue
    #[default]
    Lenient,
    /// Record an `undefined_value` error for the placeholder
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOptions {
    pub policy: NullPolicy,
    /// Turn `\n` in values into Word line breaks
    pub linebreaks: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            policy: NullPolicy::Lenient,
            linebreaks: true,
        }
    }
}

/// Output of binding one part.
#[derive(Debug)]
pub struct BoundPart {
    pub xml: String,
    pub errors: Vec<PlaceholderError>,
}

#[derive(Debug)]
enum Node {
    Part(usize),
    Section { open: usize, body: Vec<Node> },
}

/// Region of the part a loop replaces, and the ranges repeated per iteration.
#[derive(Debug, PartialEq)]
struct Expansion {
    region: Range<usize>,
    body: Vec<Range<usize>>,
}

/// Innermost structural elements around a tag, as indices of their start markup.
#[derive(Debug, Default, Clone, Copy)]
struct Ancestry {
    paragraph: Option<usize>,
    cell: Option<usize>,
    row: Option<usize>,
}

/// Binds data contexts into WordprocessingML parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binder {
    options: BindOptions,
}

impl Binder {
    pub fn new(options: BindOptions) -> Self {
        Self { options }
    }

    /// Binds `data` into one XML part.
    ///
    /// # Arguments
    /// * `part_name` - Archive part name, used in error reports
    /// * `xml` - Part content
    /// * `data` - Root data context
    ///
    /// # Returns
    /// * `Result<BoundPart>` - Rendered XML plus every placeholder error found
    ///
    /// # Errors
    /// * `Error::Archive` if the part is not segmentable XML
    pub fn bind_part(&self, part_name: &str, xml: &str, data: &Value) -> Result<BoundPart> {
        let lexed = lex(part_name, xml)?;
        let mut errors = lexed.errors;
        let parts = lexed.parts;

        if !parts.iter().any(|p| matches!(p, Part::Tag(_))) && errors.is_empty() {
            return Ok(BoundPart {
                xml: xml.to_string(),
                errors,
            });
        }

        let compiled = compile(part_name, &parts, &mut errors);
        let pairs = match_loops(part_name, &parts, &mut errors);
        if !errors.is_empty() {
            return Ok(BoundPart {
                xml: xml.to_string(),
                errors,
            });
        }

        let (ancestry, element_end) = analyze(&parts);
        let layout = Layout {
            parts: &parts,
            pairs: &pairs,
            ancestry: &ancestry,
            element_end: &element_end,
        };
        let mut unbalanced = Vec::new();
        let tree = layout.build(0..parts.len(), &mut unbalanced);
        if !unbalanced.is_empty() {
            let errors = unbalanced
                .into_iter()
                .filter_map(|open| match &parts[open] {
                    Part::Tag(tag) => Some(PlaceholderError::new(
                        &tag.id,
                        PlaceholderErrorCode::UnbalancedLoop,
                        part_name,
                        format!(
                            "Loop '{}' opens and closes at different document levels",
                            tag.id
                        ),
                    )),
                    _ => None,
                })
                .collect();
            return Ok(BoundPart {
                xml: xml.to_string(),
                errors,
            });
        }

        let mut render = Render {
            parts: &parts,
            compiled: &compiled,
            options: self.options,
            part_name,
            out: String::with_capacity(xml.len()),
            errors: Vec::new(),
        };
        render.nodes(&tree, &Scope::root(data));
        debug!(
            "Bound part '{}': {} tag(s), {} error(s).",
            part_name,
            compiled.iter().filter(|c| c.is_some()).count(),
            render.errors.len()
        );

        let mut errors = render.errors;
        dedup(&mut errors);
        Ok(BoundPart {
            xml: render.out,
            errors,
        })
    }
}

fn compile(
    part_name: &str,
    parts: &[Part],
    errors: &mut Vec<PlaceholderError>,
) -> Vec<Option<Expr>> {
    parts
        .iter()
        .map(|part| {
            let Part::Tag(tag) = part else { return None };
            if tag.kind == TagKind::LoopClose {
                return None;
            }
            match Expr::parse(&tag.expression) {
                Ok(expr) => Some(expr),
                Err(e) => {
                    errors.push(PlaceholderError::new(
                        &tag.id,
                        PlaceholderErrorCode::InvalidExpression,
                        part_name,
                        format!("Expression '{}' is not supported: {e}", tag.expression),
                    ));
                    None
                }
            }
        })
        .collect()
}

/// Pairs loop openings with their closing tags.
fn match_loops(
    part_name: &str,
    parts: &[Part],
    errors: &mut Vec<PlaceholderError>,
) -> HashMap<usize, usize> {
    let mut pairs = HashMap::new();
    let mut stack: Vec<usize> = Vec::new();

    for (index, part) in parts.iter().enumerate() {
        let Part::Tag(tag) = part else { continue };
        match tag.kind {
            TagKind::LoopOpen | TagKind::InvertedOpen => stack.push(index),
            TagKind::LoopClose => {
                let Some(open) = stack.pop() else {
                    errors.push(PlaceholderError::new(
                        &tag.id,
                        PlaceholderErrorCode::UnopenedLoop,
                        part_name,
                        format!("Closing tag '{}' has no matching opening tag", tag.id),
                    ));
                    continue;
                };
                if let Part::Tag(open_tag) = &parts[open] {
                    let close_name = compact(&tag.expression);
                    if !close_name.is_empty() && close_name != compact(&open_tag.expression) {
                        errors.push(PlaceholderError::new(
                            &tag.id,
                            PlaceholderErrorCode::MismatchedLoop,
                            part_name,
                            format!("Loop '{}' is closed by '{}'", open_tag.id, tag.id),
                        ));
                    }
                }
                pairs.insert(open, index);
            }
            TagKind::Placeholder => {}
        }
    }

    for open in stack {
        if let Part::Tag(tag) = &parts[open] {
            errors.push(PlaceholderError::new(
                &tag.id,
                PlaceholderErrorCode::UnclosedLoop,
                part_name,
                format!("Loop '{}' is never closed", tag.id),
            ));
        }
    }

    pairs
}

fn compact(expression: &str) -> String {
    expression.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Computes the ancestry of every tag and the matching end markup of every element.
fn analyze(parts: &[Part]) -> (Vec<Ancestry>, HashMap<usize, usize>) {
    let mut ancestry = vec![Ancestry::default(); parts.len()];
    let mut element_end = HashMap::new();
    let mut stack: Vec<(&str, usize)> = Vec::new();

    for (index, part) in parts.iter().enumerate() {
        if let Some(tag) = part.xml_tag() {
            match tag.kind {
                XmlTagKind::Open => stack.push((tag.name.as_str(), index)),
                XmlTagKind::Close => {
                    if let Some(depth) = stack.iter().rposition(|(name, _)| *name == tag.name) {
                        let (_, open) = stack[depth];
                        element_end.insert(open, index);
                        stack.truncate(depth);
                    }
                }
                _ => {}
            }
            continue;
        }
        if matches!(part, Part::Tag(_)) {
            let innermost = |wanted: &str| {
                stack
                    .iter()
                    .rev()
                    .find(|(name, _)| *name == wanted)
                    .map(|(_, i)| *i)
            };
            ancestry[index] = Ancestry {
                paragraph: innermost("w:p"),
                cell: innermost("w:tc"),
                row: innermost("w:tr"),
            };
        }
    }

    (ancestry, element_end)
}

struct Layout<'p> {
    parts: &'p [Part],
    pairs: &'p HashMap<usize, usize>,
    ancestry: &'p [Ancestry],
    element_end: &'p HashMap<usize, usize>,
}

impl Layout<'_> {
    /// Builds the node tree for `range`, recording loops whose region cannot
    /// be repeated without breaking the element structure.
    fn build(&self, range: Range<usize>, unbalanced: &mut Vec<usize>) -> Vec<Node> {
        let mut nodes = Vec::new();
        // first index not yet claimed by a section
        let mut floor = range.start;
        let mut index = range.start;

        while index < range.end {
            let close = self.pairs.get(&index).copied().filter(|c| *c < range.end);
            let Some(close) = close else {
                nodes.push(Node::Part(index));
                index += 1;
                continue;
            };
            let Some(expansion) = self.expand(index, close, floor, range.end) else {
                unbalanced.push(index);
                nodes.push(Node::Part(index));
                index += 1;
                continue;
            };

            while matches!(nodes.last(), Some(Node::Part(k)) if *k >= expansion.region.start) {
                nodes.pop();
            }
            let mut body = Vec::new();
            for range in &expansion.body {
                body.extend(self.build(range.clone(), unbalanced));
            }
            nodes.push(Node::Section { open: index, body });
            index = expansion.region.end;
            floor = index;
        }

        nodes
    }

    /// Decides which markup a loop repeats.
    ///
    /// Returns `None` when no candidate region keeps the output well-formed.
    fn expand(&self, open: usize, close: usize, floor: usize, end: usize) -> Option<Expansion> {
        let (o, c) = (self.ancestry[open], self.ancestry[close]);
        let inline = Expansion {
            region: open..close + 1,
            body: vec![open + 1..close],
        };

        if o.paragraph.is_some() && o.paragraph == c.paragraph && self.balanced(&inline.region) {
            return Some(inline);
        }

        if let (Some(row), Some(close_row)) = (o.row, c.row) {
            if row == close_row && o.cell != c.cell {
                if let Some(&row_end) = self.element_end.get(&row) {
                    if row >= floor && row_end < end {
                        return Some(Expansion {
                            region: row..row_end + 1,
                            body: vec![row..open, open + 1..close, close + 1..row_end + 1],
                        });
                    }
                }
            }
        }

        if let (Some(op), Some(cp)) = (o.paragraph, c.paragraph) {
            let ends = (self.element_end.get(&op), self.element_end.get(&cp));
            if let (Some(&op_end), Some(&cp_end)) = ends {
                if op >= floor
                    && cp_end < end
                    && op_end < cp
                    && self.alone(op..op_end, open)
                    && self.alone(cp..cp_end, close)
                    && self.balanced(&(op..cp_end + 1))
                {
                    return Some(Expansion {
                        region: op..cp_end + 1,
                        body: vec![op_end + 1..cp],
                    });
                }
            }
        }

        self.balanced(&inline.region).then_some(inline)
    }

    /// True when the markup in `range` can be repeated any number of times,
    /// including zero: every ancestor it closes is reopened, in order, with
    /// the same name.
    fn balanced(&self, range: &Range<usize>) -> bool {
        let mut closed: Vec<&str> = Vec::new();
        let mut opened: Vec<&str> = Vec::new();
        for part in &self.parts[range.clone()] {
            let Some(tag) = part.xml_tag() else { continue };
            match tag.kind {
                XmlTagKind::Open => opened.push(&tag.name),
                XmlTagKind::Close => {
                    if opened.pop().is_none() {
                        closed.push(&tag.name);
                    }
                }
                _ => {}
            }
        }
        opened.iter().eq(closed.iter().rev())
    }

    /// True when `tag` is the only text inside the element spanning `range`.
    fn alone(&self, range: Range<usize>, tag: usize) -> bool {
        (range.start + 1..range.end)
            .filter(|i| *i != tag)
            .all(|i| match &self.parts[i] {
                Part::Markup { .. } => true,
                Part::Text(text) => text.trim().is_empty(),
                Part::Tag(_) => false,
            })
    }
}

struct Render<'p> {
    parts: &'p [Part],
    compiled: &'p [Option<Expr>],
    options: BindOptions,
    part_name: &'p str,
    out: String,
    errors: Vec<PlaceholderError>,
}

impl Render<'_> {
    fn nodes(&mut self, nodes: &[Node], scope: &Scope<'_>) {
        for node in nodes {
            match node {
                Node::Part(index) => self.part(*index, scope),
                Node::Section { open, body } => self.section(*open, body, scope),
            }
        }
    }

    fn part(&mut self, index: usize, scope: &Scope<'_>) {
        let (parts, compiled) = (self.parts, self.compiled);
        match &parts[index] {
            Part::Markup { raw, .. } => self.out.push_str(raw),
            Part::Text(text) => self.out.push_str(&escape(text.as_str())),
            Part::Tag(tag) if tag.kind == TagKind::Placeholder => {
                let Some(expr) = &compiled[index] else { return };
                let value = expr.evaluate(scope);
                match value.as_deref() {
                    None | Some(Value::Null) => self.missing(index, "placeholder"),
                    Some(value) => {
                        let text = format_value(value);
                        self.write_text(&text);
                    }
                }
            }
            Part::Tag(_) => {}
        }
    }

    fn section(&mut self, open: usize, body: &[Node], scope: &Scope<'_>) {
        let (parts, compiled) = (self.parts, self.compiled);
        let Part::Tag(tag) = &parts[open] else { return };
        let Some(expr) = &compiled[open] else { return };
        let value = expr.evaluate(scope);

        if tag.kind == TagKind::InvertedOpen {
            let empty = match value.as_deref() {
                Some(Value::Array(items)) => items.is_empty(),
                other => !is_truthy(other),
            };
            if empty {
                self.nodes(body, scope);
            }
            return;
        }

        match value.as_deref() {
            None => self.missing(open, "loop"),
            Some(Value::Array(items)) => {
                for item in items {
                    let child = Scope {
                        value: item,
                        parent: Some(scope),
                    };
                    self.nodes(body, &child);
                }
            }
            Some(object @ Value::Object(_)) => {
                let child = Scope {
                    value: object,
                    parent: Some(scope),
                };
                self.nodes(body, &child);
            }
            other if is_truthy(other) => self.nodes(body, scope),
            _ => {}
        }
    }

    fn missing(&mut self, index: usize, what: &str) {
        if self.options.policy == NullPolicy::Lenient {
            return;
        }
        if let Part::Tag(tag) = &self.parts[index] {
            self.errors.push(PlaceholderError::new(
                &tag.id,
                PlaceholderErrorCode::UndefinedValue,
                self.part_name,
                format!("The {what} '{}' is not defined in the data context", tag.expression),
            ));
        }
    }

    fn write_text(&mut self, text: &str) {
        if !self.options.linebreaks || !text.contains('\n') {
            self.out.push_str(&escape(text));
            return;
        }
        let normalized = text.replace("\r\n", "\n");
        for (i, line) in normalized.split('\n').enumerate() {
            if i > 0 {
                self.out.push_str(LINE_BREAK);
            }
            self.out.push_str(&escape(line));
        }
    }
}

/// Formats a resolved value as document text.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Drops repeated errors, such as one missing field reported once per loop iteration.
fn dedup(errors: &mut Vec<PlaceholderError>) {
    let mut seen = IndexSet::new();
    errors.retain(|e| seen.insert((e.id.clone(), e.code)));
}
