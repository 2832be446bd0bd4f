//! URL rewriting pipeline.
//!
//! # Responsibilities
//! - Hold an ordered, direction-aware set of rewrite rules
//! - Route a concrete URL to the best-matching rule
//! - Compose extraction, step processors, function evaluation and expansion
//!
//! # Design Decisions
//! - Rule sets are loaded once per topology and immutable during request
//!   processing; reload publishes a new `Rewriter`
//! - Rule selection reuses the matcher's specificity semantics, restricted
//!   to the rule list; registration order still breaks ties
//! - A URL no rule matches passes through unchanged; that is not an error
//! - Processor failures are catchable errors, never swallowed: the calling
//!   filter decides between failing the request and best-effort passthrough

pub mod expand;
pub mod extract;
pub mod functions;
pub mod steps;

use thiserror::Error;

use crate::matcher::Matcher;
use crate::resolver::{ChainResolver, Params, Resolver};
use crate::template::{parse_literal, SyntaxError, Template};

use self::extract::MismatchError;
use self::functions::{FunctionError, FunctionRegistry};
use self::steps::{StepPhase, StepProcessor};

/// Which way a URL is traveling through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// A request on its way to a backend service.
    In,
    /// A response (or Location header) on its way back to the client.
    Out,
}

/// A rewrite failed. No-rule-matched is not represented here; that case
/// returns the input unchanged.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    #[error("function '{function}' failed: {source}")]
    Function {
        function: String,
        #[source]
        source: FunctionError,
    },

    #[error("no evaluator available for function '{0}'")]
    NoEvaluator(String),

    #[error("step '{step}' failed: {reason}")]
    Step { step: String, reason: String },
}

/// Mutable state threaded through one rule application.
pub struct RewriteContext {
    pub direction: Direction,
    /// The in-flight URL, as a literal template. Steps may replace it.
    pub url: Template,
    /// Parameters extracted from the URL; empty until the extraction phase.
    pub params: Params,
}

/// One rewrite rule: an input shape, an output shape, and the steps that run
/// in between.
pub struct Rule {
    name: String,
    directions: Vec<Direction>,
    input: Template,
    output: Template,
    steps: Vec<Box<dyn StepProcessor>>,
}

impl Rule {
    /// A rule applying to both directions; restrict with [`Rule::direction`].
    pub fn new(name: impl Into<String>, input: Template, output: Template) -> Self {
        Self {
            name: name.into(),
            directions: vec![Direction::In, Direction::Out],
            input,
            output,
            steps: Vec::new(),
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.directions = vec![direction];
        self
    }

    pub fn step(mut self, step: Box<dyn StepProcessor>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn applies_to(&self, direction: Direction) -> bool {
        self.directions.contains(&direction)
    }
}

/// Ordered rule set plus the function registry its rules may reference.
#[derive(Default)]
pub struct Rewriter {
    rules: Vec<Rule>,
    inbound: Matcher<usize>,
    outbound: Matcher<usize>,
    functions: FunctionRegistry,
}

impl Rewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self {
            functions,
            ..Self::default()
        }
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn add_rule(&mut self, rule: Rule) {
        let index = self.rules.len();
        if rule.applies_to(Direction::In) {
            self.inbound.add(rule.input.clone(), index);
        }
        if rule.applies_to(Direction::Out) {
            self.outbound.add(rule.input.clone(), index);
        }
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Rewrite `uri` for `direction`, or hand it back unchanged when no rule
    /// matches.
    ///
    /// `resolver` supplies environment values (request attributes, gateway
    /// configuration) for names the URL itself does not bind.
    pub fn rewrite(
        &self,
        uri: &str,
        direction: Direction,
        resolver: &dyn Resolver,
    ) -> Result<String, RewriteError> {
        let literal = parse_literal(uri)?;
        let matcher = match direction {
            Direction::In => &self.inbound,
            Direction::Out => &self.outbound,
        };
        let Some((_, &index)) = matcher.find(&literal) else {
            tracing::debug!(uri, ?direction, "no rewrite rule matched, passing through");
            return Ok(uri.to_string());
        };
        let rule = &self.rules[index];

        let mut context = RewriteContext {
            direction,
            url: literal,
            params: Params::new(),
        };
        self.run_steps(rule, StepPhase::BeforeExtract, &mut context)?;
        context.params = extract::extract(&rule.input, &context.url)?;
        self.run_steps(rule, StepPhase::AfterExtract, &mut context)?;

        let resolver = ChainResolver::new(&context.params, resolver);
        let evaluator = self.functions.evaluator(direction);
        let output = expand::expand(&rule.output, &resolver, Some(&evaluator))?;
        tracing::debug!(rule = %rule.name, input = uri, output = %output, "rewrote url");
        Ok(output)
    }

    fn run_steps(
        &self,
        rule: &Rule,
        phase: StepPhase,
        context: &mut RewriteContext,
    ) -> Result<(), RewriteError> {
        for step in rule.steps.iter().filter(|step| step.phase() == phase) {
            if let Err(error) = step.process(context) {
                tracing::warn!(rule = %rule.name, step = step.name(), %error, "rewrite step failed");
                return Err(error);
            }
        }
        Ok(())
    }
}
