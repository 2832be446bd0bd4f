//! Best-match template lookup.
//!
//! # Responsibilities
//! - Index registered templates by path shape
//! - Find the most specific template matching a concrete URL
//! - Hand back the caller's associated value plus extracted parameters
//!
//! # Design Decisions
//! - Explicit arena tree, grouped by exact segment count with a separate
//!   overflow tree for `**`-suffixed templates, so the specificity rules are
//!   auditable in isolation
//! - Literal branches are tried before the wildcard branch at every position
//! - Exact-count matches always beat `**` fallbacks; among `**` templates the
//!   longest matched prefix wins
//! - Remaining ties resolve by registration order, first registered wins
//! - No interior mutability: concurrent readers wrap a `Matcher` generation
//!   in an atomic swap (see `registry`)

use std::collections::HashMap;

use crate::resolver::Params;
use crate::rewrite::extract::extract;
use crate::template::{encoding, CapturePattern, Segment, Template};

/// A successful lookup: the winning template, the caller's value, and the
/// parameters extracted from the input.
#[derive(Debug)]
pub struct Match<'a, V> {
    pub template: &'a Template,
    pub value: &'a V,
    pub params: Params,
}

struct Entry<V> {
    template: Template,
    value: V,
}

#[derive(Default)]
struct Node {
    literal: HashMap<String, usize>,
    wildcard: Option<usize>,
    terminals: Vec<usize>,
}

#[derive(Default)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    fn insert(&mut self, path: &[Segment], entry_id: usize) {
        let mut node = 0;
        for segment in path {
            node = match segment {
                Segment::Literal(text) => self.literal_child(node, text),
                Segment::Capture { pattern, .. } => match pattern {
                    CapturePattern::Exact(text) => self.literal_child(node, text),
                    _ => self.wildcard_child(node),
                },
                // A non-trailing glob is outside the wildcard grammar; treat
                // it as a single-segment wildcard rather than rejecting the
                // whole template.
                Segment::MultiCapture { .. } => self.wildcard_child(node),
            };
        }
        self.nodes[node].terminals.push(entry_id);
    }

    fn literal_child(&mut self, node: usize, text: &str) -> usize {
        if let Some(&child) = self.nodes[node].literal.get(text) {
            return child;
        }
        let child = self.push_node();
        self.nodes[node].literal.insert(text.to_string(), child);
        child
    }

    fn wildcard_child(&mut self, node: usize) -> usize {
        if let Some(child) = self.nodes[node].wildcard {
            return child;
        }
        let child = self.push_node();
        self.nodes[node].wildcard = Some(child);
        child
    }

    fn push_node(&mut self) -> usize {
        self.nodes.push(Node::default());
        self.nodes.len() - 1
    }
}

/// Template index with most-specific-wins lookup.
///
/// Values are opaque to the matcher; callers register backend descriptors,
/// role names or rule indices and get them back from [`Matcher::find`].
pub struct Matcher<V> {
    entries: Vec<Entry<V>>,
    exact: HashMap<usize, Tree>,
    glob: Tree,
}

impl<V> Default for Matcher<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Matcher<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            exact: HashMap::new(),
            glob: Tree::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Register `template` with an associated value.
    pub fn add(&mut self, template: Template, value: V) {
        let entry_id = self.entries.len();
        self.index(&template, entry_id);
        self.entries.push(Entry { template, value });
    }

    /// Drop the first registered entry equal to `template`.
    pub fn remove(&mut self, template: &Template) -> Option<V> {
        let position = self
            .entries
            .iter()
            .position(|entry| &entry.template == template)?;
        let removed = self.entries.remove(position);
        self.reindex();
        Some(removed.value)
    }

    /// The value registered under exactly `template`, if any.
    pub fn get(&self, template: &Template) -> Option<&V> {
        self.entries
            .iter()
            .find(|entry| &entry.template == template)
            .map(|entry| &entry.value)
    }

    fn index(&mut self, template: &Template, entry_id: usize) {
        if template.has_glob_suffix() {
            let prefix = &template.path()[..template.path().len() - 1];
            self.glob.insert(prefix, entry_id);
        } else {
            let count = template.path().len();
            self.exact
                .entry(count)
                .or_insert_with(Tree::new)
                .insert(template.path(), entry_id);
        }
    }

    fn reindex(&mut self) {
        self.exact.clear();
        self.glob = Tree::new();
        let templates: Vec<Template> = self
            .entries
            .iter()
            .map(|entry| entry.template.clone())
            .collect();
        for (entry_id, template) in templates.iter().enumerate() {
            self.index(template, entry_id);
        }
    }

    /// Find the most specific registered template matching `input` (a
    /// literal template) without extracting parameters.
    pub fn find(&self, input: &Template) -> Option<(&Template, &V)> {
        let segments: Vec<String> = input.path().iter().map(literal_text).collect();

        let winner = self
            .exact
            .get(&segments.len())
            .and_then(|tree| self.walk_exact(tree, 0, &segments, 0, input))
            .or_else(|| {
                let mut best = None;
                self.walk_glob(&self.glob, 0, &segments, 0, input, &mut best);
                best.map(|(_, entry_id)| entry_id)
            })?;

        let entry = &self.entries[winner];
        Some((&entry.template, &entry.value))
    }

    /// [`Matcher::find`] plus parameter extraction.
    pub fn lookup(&self, input: &Template) -> Option<Match<'_, V>> {
        let (template, value) = self.find(input)?;
        match extract(template, input) {
            Ok(params) => Some(Match {
                template,
                value,
                params,
            }),
            Err(error) => {
                // The index said this shape fits; a mismatch here means the
                // index and the extractor disagree.
                tracing::warn!(template = %template, %error, "extraction failed after match");
                None
            }
        }
    }

    fn walk_exact(
        &self,
        tree: &Tree,
        node: usize,
        segments: &[String],
        depth: usize,
        input: &Template,
    ) -> Option<usize> {
        if depth == segments.len() {
            return self.best_terminal(&tree.nodes[node].terminals, input);
        }
        if let Some(&child) = tree.nodes[node].literal.get(&segments[depth]) {
            if let Some(winner) = self.walk_exact(tree, child, segments, depth + 1, input) {
                return Some(winner);
            }
        }
        if let Some(child) = tree.nodes[node].wildcard {
            if let Some(winner) = self.walk_exact(tree, child, segments, depth + 1, input) {
                return Some(winner);
            }
        }
        None
    }

    fn walk_glob(
        &self,
        tree: &Tree,
        node: usize,
        segments: &[String],
        depth: usize,
        input: &Template,
        best: &mut Option<(usize, usize)>,
    ) {
        if !tree.nodes[node].terminals.is_empty() {
            // Longest matched prefix wins; literal-first traversal makes the
            // first candidate at a given depth the preferred one.
            let deeper = best.map(|(d, _)| depth > d).unwrap_or(true);
            if deeper {
                if let Some(winner) = self.best_terminal(&tree.nodes[node].terminals, input) {
                    *best = Some((depth, winner));
                }
            }
        }
        if depth == segments.len() {
            return;
        }
        if let Some(&child) = tree.nodes[node].literal.get(&segments[depth]) {
            self.walk_glob(tree, child, segments, depth + 1, input, best);
        }
        if let Some(child) = tree.nodes[node].wildcard {
            self.walk_glob(tree, child, segments, depth + 1, input, best);
        }
    }

    // Among co-terminal templates, the one whose query requirements the input
    // satisfies with the most keys wins; ties keep registration order.
    fn best_terminal(&self, terminals: &[usize], input: &Template) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for &entry_id in terminals {
            let template = &self.entries[entry_id].template;
            if !components_match(template, input) || !query_keys_present(template, input) {
                continue;
            }
            let keys = template.query().len();
            let better = match best {
                None => true,
                Some((best_keys, _)) => keys > best_keys,
            };
            if better {
                best = Some((keys, entry_id));
            }
        }
        best.map(|(_, entry_id)| entry_id)
    }
}

// Inputs come from `parse_literal`, so every segment is a literal; anything
// else decodes to the empty string and matches nothing literal.
fn literal_text(segment: &Segment) -> String {
    match segment {
        Segment::Literal(text) => encoding::decode(text),
        _ => String::new(),
    }
}

fn components_match(template: &Template, input: &Template) -> bool {
    if template.has_scheme() != input.has_scheme()
        || template.has_authority() != input.has_authority()
        || template.has_fragment() != input.has_fragment()
    {
        return false;
    }
    segment_matches(template.scheme(), input.scheme(), false)
        && segment_matches(template.username(), input.username(), false)
        && segment_matches(template.password(), input.password(), false)
        && segment_matches(template.host(), input.host(), false)
        // Default ports may be absent from the concrete URL.
        && segment_matches(template.port(), input.port(), true)
        && segment_matches(template.fragment(), input.fragment(), false)
}

fn segment_matches(
    pattern: Option<&Segment>,
    concrete: Option<&Segment>,
    optional: bool,
) -> bool {
    match (pattern, concrete) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(_), None) => optional,
        (Some(pattern), Some(concrete)) => match concrete {
            Segment::Literal(text) => pattern.matches(&encoding::decode(text)),
            _ => false,
        },
    }
}

fn query_keys_present(template: &Template, input: &Template) -> bool {
    template
        .query()
        .iter()
        .all(|required| input.query().iter().any(|q| q.key == required.key))
}
