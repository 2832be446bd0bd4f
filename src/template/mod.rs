//! Parsed URL template model.
//!
//! # Responsibilities
//! - Represent a URL pattern as flags plus typed segments
//! - Distinguish literal, single-capture and multi-capture segments
//! - Reproduce normalized pattern text via `Display`
//!
//! # Design Decisions
//! - Templates are immutable once built; matching/extraction/expansion are
//!   pure functions over them
//! - Segment kinds are a tagged enum, not a trait hierarchy; every consumer
//!   switches on the variant
//! - Equality and hashing go through the normalized text form, so two
//!   spellings of the same pattern compare equal

pub mod encoding;
pub mod parser;

use std::fmt;
use std::hash::{Hash, Hasher};

pub use self::parser::{parse_literal, parse_template, SyntaxError};

/// Value pattern carried by a single-segment capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapturePattern {
    /// `{name}`: no explicit pattern.
    Default,
    /// `{name=*}` or a bare `*`.
    Any,
    /// `{name=text}`: must equal `text`, still binds the name.
    Exact(String),
}

/// One path, authority or query-value component of a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Unparameterized text; matches only itself and binds nothing.
    Literal(String),
    /// Matches exactly one segment. An empty name is an anonymous wildcard.
    Capture { name: String, pattern: CapturePattern },
    /// Matches the remainder of the path. An empty name binds nothing.
    MultiCapture { name: String },
}

impl Segment {
    /// The parameter name this segment binds, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Capture { name, .. } | Segment::MultiCapture { name } => {
                if name.is_empty() {
                    None
                } else {
                    Some(name)
                }
            }
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Segment::MultiCapture { .. })
    }

    /// Whether a concrete (already decoded) value satisfies this segment.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Literal(text) => text == value,
            Segment::Capture { pattern, .. } => match pattern {
                CapturePattern::Exact(text) => text == value,
                CapturePattern::Default | CapturePattern::Any => true,
            },
            Segment::MultiCapture { .. } => true,
        }
    }

    fn fmt_pattern(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(text) => f.write_str(text),
            Segment::Capture { name, pattern } => {
                if name.is_empty() {
                    return f.write_str("*");
                }
                match pattern {
                    CapturePattern::Default => write!(f, "{{{name}}}"),
                    CapturePattern::Any => write!(f, "{{{name}=*}}"),
                    CapturePattern::Exact(text) => write!(f, "{{{name}={text}}}"),
                }
            }
            Segment::MultiCapture { name } => {
                if name.is_empty() {
                    f.write_str("**")
                } else if name == "**" {
                    f.write_str("{**}")
                } else {
                    write!(f, "{{{name}=**}}")
                }
            }
        }
    }
}

/// One `key=value` pair of a template's query section.
///
/// `value` is `None` for a bare key with no `=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySegment {
    pub key: String,
    pub value: Option<Segment>,
}

/// The `{**}` query glob: collects query parameters not claimed by a named
/// query segment and re-emits them on expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtraQuery {
    pub name: String,
}

/// A parsed URL pattern.
///
/// Built by [`parse_template`]/[`parse_literal`] or through
/// [`TemplateBuilder`]; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub(crate) scheme: Option<Segment>,
    pub(crate) has_scheme: bool,
    pub(crate) username: Option<Segment>,
    pub(crate) password: Option<Segment>,
    pub(crate) host: Option<Segment>,
    pub(crate) port: Option<Segment>,
    pub(crate) has_authority: bool,
    pub(crate) path: Vec<Segment>,
    pub(crate) is_absolute: bool,
    pub(crate) is_directory: bool,
    pub(crate) query: Vec<QuerySegment>,
    pub(crate) extra: Option<ExtraQuery>,
    pub(crate) has_query: bool,
    pub(crate) fragment: Option<Segment>,
    pub(crate) has_fragment: bool,
}

impl Template {
    pub fn builder() -> TemplateBuilder {
        TemplateBuilder::default()
    }

    pub fn scheme(&self) -> Option<&Segment> {
        self.scheme.as_ref()
    }

    pub fn has_scheme(&self) -> bool {
        self.has_scheme
    }

    pub fn username(&self) -> Option<&Segment> {
        self.username.as_ref()
    }

    pub fn password(&self) -> Option<&Segment> {
        self.password.as_ref()
    }

    pub fn host(&self) -> Option<&Segment> {
        self.host.as_ref()
    }

    pub fn port(&self) -> Option<&Segment> {
        self.port.as_ref()
    }

    pub fn has_authority(&self) -> bool {
        self.has_authority
    }

    pub fn path(&self) -> &[Segment] {
        &self.path
    }

    pub fn is_absolute(&self) -> bool {
        self.is_absolute
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn query(&self) -> &[QuerySegment] {
        &self.query
    }

    /// All query segments registered under `key`, in order.
    pub fn query_values<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = &'a QuerySegment> + 'a {
        self.query.iter().filter(move |q| q.key == key)
    }

    pub fn extra_query(&self) -> Option<&ExtraQuery> {
        self.extra.as_ref()
    }

    pub fn has_query(&self) -> bool {
        self.has_query
    }

    pub fn fragment(&self) -> Option<&Segment> {
        self.fragment.as_ref()
    }

    pub fn has_fragment(&self) -> bool {
        self.has_fragment
    }

    /// True when the template ends with a multi-segment capture.
    pub fn has_glob_suffix(&self) -> bool {
        matches!(self.path.last(), Some(Segment::MultiCapture { .. }))
    }

    fn fmt_authority(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("//")?;
        if self.username.is_some() || self.password.is_some() {
            if let Some(username) = &self.username {
                username.fmt_pattern(f)?;
            }
            if let Some(password) = &self.password {
                f.write_str(":")?;
                password.fmt_pattern(f)?;
            }
            f.write_str("@")?;
        }
        if let Some(host) = &self.host {
            host.fmt_pattern(f)?;
        }
        if let Some(port) = &self.port {
            f.write_str(":")?;
            port.fmt_pattern(f)?;
        }
        Ok(())
    }

    fn fmt_query(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut count = 0;
        let sep = |f: &mut fmt::Formatter<'_>, count: &mut usize| {
            *count += 1;
            f.write_str(if *count == 1 { "?" } else { "&" })
        };
        for segment in &self.query {
            sep(f, &mut count)?;
            match &segment.value {
                None => f.write_str(&segment.key)?,
                Some(Segment::Literal(text)) => write!(f, "{}={}", segment.key, text)?,
                Some(value) => {
                    // `{name}` shorthand round-trips without the key prefix.
                    if value.name() != Some(segment.key.as_str()) {
                        write!(f, "{}=", segment.key)?;
                    }
                    value.fmt_pattern(f)?;
                }
            }
        }
        if let Some(extra) = &self.extra {
            sep(f, &mut count)?;
            if extra.name == "*" {
                f.write_str("{*}")?;
            } else {
                f.write_str("{**}")?;
            }
        }
        if count == 0 {
            f.write_str("?")?;
        }
        Ok(())
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_scheme {
            if let Some(scheme) = &self.scheme {
                scheme.fmt_pattern(f)?;
            }
            f.write_str(":")?;
        }
        if self.has_authority {
            self.fmt_authority(f)?;
        }
        if self.is_absolute {
            f.write_str("/")?;
        }
        for (i, segment) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            segment.fmt_pattern(f)?;
        }
        if self.is_directory && !self.path.is_empty() {
            f.write_str("/")?;
        }
        if self.has_query {
            self.fmt_query(f)?;
        }
        if self.has_fragment {
            f.write_str("#")?;
            if let Some(fragment) = &self.fragment {
                fragment.fmt_pattern(f)?;
            }
        }
        Ok(())
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Template {}

impl Hash for Template {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// Assembles a [`Template`] piecewise.
///
/// Step processors use this to rebuild an in-flight URL with a modified
/// query section; tests use it to state expected shapes directly.
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    template: Template,
}

impl TemplateBuilder {
    pub fn from_template(template: &Template) -> Self {
        Self {
            template: template.clone(),
        }
    }

    pub fn scheme(mut self, segment: Segment) -> Self {
        self.template.scheme = Some(segment);
        self.template.has_scheme = true;
        self
    }

    pub fn username(mut self, segment: Segment) -> Self {
        self.template.username = Some(segment);
        self.template.has_authority = true;
        self
    }

    pub fn password(mut self, segment: Segment) -> Self {
        self.template.password = Some(segment);
        self.template.has_authority = true;
        self
    }

    pub fn host(mut self, segment: Segment) -> Self {
        self.template.host = Some(segment);
        self.template.has_authority = true;
        self
    }

    pub fn port(mut self, segment: Segment) -> Self {
        self.template.port = Some(segment);
        self.template.has_authority = true;
        self
    }

    pub fn absolute(mut self, absolute: bool) -> Self {
        self.template.is_absolute = absolute;
        self
    }

    pub fn directory(mut self, directory: bool) -> Self {
        self.template.is_directory = directory;
        self
    }

    pub fn path_segment(mut self, segment: Segment) -> Self {
        self.template.path.push(segment);
        self
    }

    pub fn query_segment(mut self, key: impl Into<String>, value: Option<Segment>) -> Self {
        self.template.query.push(QuerySegment {
            key: key.into(),
            value,
        });
        self.template.has_query = true;
        self
    }

    /// Removes every query segment registered under `key`.
    ///
    /// This is the duplicate-parameter guard: a step re-adding a query key
    /// must drop any pre-existing occurrence first, so an untrusted caller
    /// cannot smuggle a second value past it.
    pub fn without_query_key(mut self, key: &str) -> Self {
        self.template.query.retain(|q| q.key != key);
        self
    }

    pub fn clear_query(mut self) -> Self {
        self.template.query.clear();
        self.template.extra = None;
        self.template.has_query = false;
        self
    }

    pub fn extra_query(mut self, name: impl Into<String>) -> Self {
        self.template.extra = Some(ExtraQuery { name: name.into() });
        self.template.has_query = true;
        self
    }

    pub fn has_query(mut self, has_query: bool) -> Self {
        self.template.has_query = has_query;
        self
    }

    pub fn fragment(mut self, segment: Option<Segment>) -> Self {
        self.template.fragment = segment;
        self.template.has_fragment = true;
        self
    }

    pub fn build(self) -> Template {
        self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_matching() {
        let literal = Segment::Literal("a".into());
        assert!(literal.matches("a"));
        assert!(!literal.matches("b"));

        let capture = Segment::Capture {
            name: "x".into(),
            pattern: CapturePattern::Any,
        };
        assert!(capture.matches("anything"));

        let exact = Segment::Capture {
            name: "x".into(),
            pattern: CapturePattern::Exact("v1".into()),
        };
        assert!(exact.matches("v1"));
        assert!(!exact.matches("v2"));
    }

    #[test]
    fn test_anonymous_segments_bind_nothing() {
        let star = Segment::Capture {
            name: String::new(),
            pattern: CapturePattern::Any,
        };
        assert_eq!(star.name(), None);

        let glob = Segment::MultiCapture {
            name: String::new(),
        };
        assert_eq!(glob.name(), None);
        assert!(glob.is_multi());
    }

    #[test]
    fn test_builder_round_trip() {
        let template = Template::builder()
            .absolute(true)
            .path_segment(Segment::Literal("a".into()))
            .path_segment(Segment::Capture {
                name: "x".into(),
                pattern: CapturePattern::Default,
            })
            .query_segment("op", Some(Segment::Literal("OPEN".into())))
            .build();
        assert_eq!(template.to_string(), "/a/{x}?op=OPEN");
    }

    #[test]
    fn test_without_query_key_removes_all_occurrences() {
        let template = Template::builder()
            .query_segment("a", Some(Segment::Literal("1".into())))
            .query_segment("b", Some(Segment::Literal("2".into())))
            .query_segment("a", Some(Segment::Literal("3".into())))
            .build();
        let stripped = TemplateBuilder::from_template(&template)
            .without_query_key("a")
            .build();
        assert_eq!(stripped.query().len(), 1);
        assert_eq!(stripped.query()[0].key, "b");
    }

    #[test]
    fn test_equality_is_textual() {
        let a = Template::builder()
            .path_segment(Segment::Literal("x".into()))
            .build();
        let b = Template::builder()
            .path_segment(Segment::Literal("x".into()))
            .build();
        assert_eq!(a, b);
    }
}
