//! Parameter extraction.
//!
//! Binds a template's named segments to the corresponding parts of a
//! concrete URL. The URL is expected to have already matched the template's
//! shape; a structural disagreement here is a caller bug and fails hard with
//! [`MismatchError`], never silently.

use thiserror::Error;

use crate::resolver::Params;
use crate::template::{encoding, CapturePattern, Segment, Template};

/// The concrete URL does not conform to the template's shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MismatchError {
    #[error("path has {actual} segments where the template requires {expected}")]
    PathShape { expected: usize, actual: usize },

    #[error("literal segment '{expected}' does not match '{actual}'")]
    LiteralSegment { expected: String, actual: String },

    #[error("{component} does not conform to the template")]
    Component { component: &'static str },
}

/// Bind the named segments of `template` to the matching parts of `input`
/// (a literal template).
///
/// Values are percent-decoded here, except a trailing multi-capture, which
/// binds the raw remaining suffix (slashes included) so that pre-encoded
/// content survives a later expansion untouched.
pub fn extract(template: &Template, input: &Template) -> Result<Params, MismatchError> {
    let mut params = Params::new();

    bind_component("scheme", template.scheme(), input.scheme(), false, &mut params)?;
    bind_component(
        "username",
        template.username(),
        input.username(),
        false,
        &mut params,
    )?;
    bind_component(
        "password",
        template.password(),
        input.password(),
        false,
        &mut params,
    )?;
    bind_component("host", template.host(), input.host(), false, &mut params)?;
    bind_component("port", template.port(), input.port(), true, &mut params)?;

    extract_path(template, input, &mut params)?;

    bind_component(
        "fragment",
        template.fragment(),
        input.fragment(),
        false,
        &mut params,
    )?;

    extract_query(template, input, &mut params);

    Ok(params)
}

fn bind_component(
    component: &'static str,
    pattern: Option<&Segment>,
    concrete: Option<&Segment>,
    optional: bool,
    params: &mut Params,
) -> Result<(), MismatchError> {
    let Some(pattern) = pattern else {
        return Ok(());
    };
    let Some(Segment::Literal(text)) = concrete else {
        if optional {
            return Ok(());
        }
        return Err(MismatchError::Component { component });
    };
    let decoded = encoding::decode(text);
    if !pattern.matches(&decoded) {
        return Err(MismatchError::Component { component });
    }
    if let Some(name) = pattern.name() {
        params.add_value(name, decoded);
    }
    Ok(())
}

fn extract_path(
    template: &Template,
    input: &Template,
    params: &mut Params,
) -> Result<(), MismatchError> {
    let pattern = template.path();
    let concrete = input.path();

    let (pairwise, glob) = if template.has_glob_suffix() {
        let split = pattern.len() - 1;
        if concrete.len() < split {
            return Err(MismatchError::PathShape {
                expected: split,
                actual: concrete.len(),
            });
        }
        (&pattern[..split], Some(&pattern[split]))
    } else {
        if concrete.len() != pattern.len() {
            return Err(MismatchError::PathShape {
                expected: pattern.len(),
                actual: concrete.len(),
            });
        }
        (pattern, None)
    };

    for (segment, concrete) in pairwise.iter().zip(concrete) {
        let text = decoded_literal(concrete);
        if !segment.matches(&text) {
            return Err(MismatchError::LiteralSegment {
                expected: segment_text(segment),
                actual: text,
            });
        }
        if let Some(name) = segment.name() {
            params.add_value(name, text);
        }
    }

    if let Some(glob) = glob {
        let suffix: Vec<&str> = concrete[pairwise.len()..]
            .iter()
            .map(raw_literal)
            .collect();
        if !suffix.is_empty() {
            if let Some(name) = glob.name() {
                params.add_value(name, suffix.join("/"));
            }
        }
    }
    Ok(())
}

fn extract_query(template: &Template, input: &Template, params: &mut Params) {
    for segment in template.query() {
        let Some(value) = &segment.value else {
            continue;
        };
        let Some(name) = value.name() else {
            continue;
        };
        for concrete in input.query_values(&segment.key) {
            match &concrete.value {
                None => params.add_empty(name),
                Some(Segment::Literal(text)) => params.add_value(name, encoding::decode(text)),
                Some(_) => {}
            }
        }
    }

    if template.extra_query().is_some() {
        for concrete in input.query() {
            let claimed = template.query().iter().any(|q| q.key == concrete.key);
            if claimed {
                continue;
            }
            match &concrete.value {
                None => params.add_empty(&concrete.key),
                Some(Segment::Literal(text)) => {
                    params.add_value(&concrete.key, encoding::decode(text))
                }
                Some(_) => {}
            }
        }
    }
}

fn decoded_literal(segment: &Segment) -> String {
    match segment {
        Segment::Literal(text) => encoding::decode(text),
        _ => String::new(),
    }
}

fn raw_literal(segment: &Segment) -> &str {
    match segment {
        Segment::Literal(text) => text,
        _ => "",
    }
}

fn segment_text(segment: &Segment) -> String {
    match segment {
        Segment::Literal(text) => text.clone(),
        Segment::Capture {
            pattern: CapturePattern::Exact(text),
            ..
        } => text.clone(),
        Segment::Capture { name, .. } | Segment::MultiCapture { name } => name.clone(),
    }
}
