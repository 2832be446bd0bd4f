//! Rule step processors.
//!
//! # Responsibilities
//! - Define the contract for transforms that run inside a rule, between
//!   matching and expansion
//! - Ship the secure-query pair: fold a query string into one opaque
//!   parameter on the way out, restore it on the way in
//!
//! # Design Decisions
//! - Steps operate on the in-flight literal URL (or, after extraction, the
//!   parameter set); the rule templates stay untouched
//! - Restoring a query parameter removes any pre-existing occurrence of the
//!   same key first, so a caller cannot smuggle a duplicate value past the
//!   restored one
//! - The blob codec is pluggable; the crypto itself lives outside the engine

use std::sync::Arc;

use thiserror::Error;

use crate::template::{encoding, Segment, TemplateBuilder};

use super::{RewriteContext, RewriteError};

/// Blob encode/decode failure inside a step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(pub String);

/// Reversible transform applied to a folded query string.
///
/// Implementations outside the engine wrap the gateway's crypto services;
/// tests use trivial reversible codecs.
pub trait QueryCodec: Send + Sync {
    fn encode(&self, clear: &str) -> Result<String, CodecError>;
    fn decode(&self, opaque: &str) -> Result<String, CodecError>;
}

/// When a step runs relative to parameter extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    BeforeExtract,
    AfterExtract,
}

/// A transform invoked while a rule rewrites one URL.
pub trait StepProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> StepPhase {
        StepPhase::BeforeExtract
    }

    /// Transform the context in place. Errors abort the rewrite and
    /// propagate to the calling filter.
    fn process(&self, context: &mut RewriteContext) -> Result<(), RewriteError>;
}

/// Name of the query parameter carrying the folded query string.
pub const SECURE_QUERY_PARAM: &str = "_";

/// Folds the URL's entire query string into one opaque `_` parameter.
pub struct SecureQueryEncodeStep {
    codec: Arc<dyn QueryCodec>,
}

impl SecureQueryEncodeStep {
    pub fn new(codec: Arc<dyn QueryCodec>) -> Self {
        Self { codec }
    }
}

impl StepProcessor for SecureQueryEncodeStep {
    fn name(&self) -> &'static str {
        "secure-query-encode"
    }

    fn process(&self, context: &mut RewriteContext) -> Result<(), RewriteError> {
        if context.url.query().is_empty() {
            return Ok(());
        }
        let clear = serialize_query(&context.url);
        let opaque = self
            .codec
            .encode(&clear)
            .map_err(|source| step_error(self.name(), source))?;
        context.url = TemplateBuilder::from_template(&context.url)
            .clear_query()
            .query_segment(SECURE_QUERY_PARAM, Some(Segment::Literal(opaque)))
            .build();
        Ok(())
    }
}

/// Restores a query string previously folded by [`SecureQueryEncodeStep`].
pub struct SecureQueryDecodeStep {
    codec: Arc<dyn QueryCodec>,
}

impl SecureQueryDecodeStep {
    pub fn new(codec: Arc<dyn QueryCodec>) -> Self {
        Self { codec }
    }
}

impl StepProcessor for SecureQueryDecodeStep {
    fn name(&self) -> &'static str {
        "secure-query-decode"
    }

    fn process(&self, context: &mut RewriteContext) -> Result<(), RewriteError> {
        let Some(opaque) = query_text(&context.url, SECURE_QUERY_PARAM) else {
            return Ok(());
        };
        let clear = self
            .codec
            .decode(&opaque)
            .map_err(|source| step_error(self.name(), source))?;
        let restored: Vec<(String, Option<String>)> = clear
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (pair.to_string(), None),
            })
            .collect();

        let mut builder =
            TemplateBuilder::from_template(&context.url).without_query_key(SECURE_QUERY_PARAM);
        // Strip colliding pre-existing keys before re-adding any restored
        // pair; the restored values are authoritative.
        for (key, _) in &restored {
            builder = builder.without_query_key(key);
        }
        for (key, value) in restored {
            builder = builder.query_segment(key, value.map(Segment::Literal));
        }
        context.url = builder.build();
        Ok(())
    }
}

fn step_error(step: &str, source: CodecError) -> RewriteError {
    RewriteError::Step {
        step: step.to_string(),
        reason: source.to_string(),
    }
}

fn serialize_query(url: &crate::template::Template) -> String {
    url.query()
        .iter()
        .map(|segment| match &segment.value {
            Some(Segment::Literal(text)) => format!("{}={}", segment.key, text),
            _ => segment.key.clone(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn query_text(url: &crate::template::Template, key: &str) -> Option<String> {
    url.query_values(key).next().and_then(|segment| {
        match &segment.value {
            Some(Segment::Literal(text)) => Some(encoding::decode(text)),
            _ => None,
        }
    })
}
