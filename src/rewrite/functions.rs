//! Named rewrite functions.
//!
//! # Responsibilities
//! - Define the pluggable transform contract referenced from
//!   `{$name(param)}` segments
//! - Hold the registry built once at rule-load time
//! - Ship the two processors the gateway itself needs: host mapping and
//!   service-address lookup
//!
//! # Design Decisions
//! - Processors are registered up front and dispatched through a fixed
//!   interface; the engine performs no lookup-by-reflection
//! - A processor sees the rewrite direction, so one instance serves both
//!   request and response translation
//! - Unmapped hostmap inputs pass through unchanged rather than failing

use std::collections::HashMap;

use thiserror::Error;

use super::Direction;

/// A named-function invocation failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FunctionError {
    #[error("unknown rewrite function '{0}'")]
    Unknown(String),

    #[error("{0}")]
    Failed(String),
}

/// A parsed `{$function(param)}` segment name.
///
/// Plain parameter names parse with `function == None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub function: Option<String>,
    pub parameter: String,
}

impl FunctionRef {
    pub fn parse(name: &str) -> Self {
        if let Some(rest) = name.strip_prefix('$') {
            if let Some((function, tail)) = rest.split_once('(') {
                if let Some(parameter) = tail.strip_suffix(')') {
                    if !function.is_empty() {
                        return Self {
                            function: Some(function.to_string()),
                            parameter: parameter.to_string(),
                        };
                    }
                }
            }
            return Self {
                function: Some(rest.to_string()),
                parameter: String::new(),
            };
        }
        Self {
            function: None,
            parameter: name.to_string(),
        }
    }
}

/// Evaluates function references during expansion.
pub trait Evaluator {
    fn evaluate(&self, function: &str, args: &[String]) -> Result<Vec<String>, FunctionError>;
}

/// Per-invocation context handed to processors.
#[derive(Debug, Clone, Copy)]
pub struct FunctionContext {
    pub direction: Direction,
}

/// Configuration handed to a processor at initialization.
#[derive(Debug, Clone, Default)]
pub struct FunctionEnv {
    settings: HashMap<String, String>,
}

impl FunctionEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// A named, pluggable parameter transform.
///
/// Implementations outside the engine cover concerns like encryption; the
/// engine only ever calls through this interface.
pub trait FunctionProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn initialize(&mut self, env: &FunctionEnv) -> Result<(), FunctionError> {
        let _ = env;
        Ok(())
    }

    fn resolve(
        &self,
        context: &FunctionContext,
        args: &[String],
    ) -> Result<Vec<String>, FunctionError>;

    fn destroy(&mut self) {}
}

/// Registry of processors, constructed once when rules load.
#[derive(Default)]
pub struct FunctionRegistry {
    processors: HashMap<String, Box<dyn FunctionProcessor>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Box<dyn FunctionProcessor>) {
        self.processors.insert(processor.name().to_string(), processor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// An [`Evaluator`] view of this registry for one rewrite direction.
    pub fn evaluator(&self, direction: Direction) -> RegistryEvaluator<'_> {
        RegistryEvaluator {
            registry: self,
            context: FunctionContext { direction },
        }
    }

    pub fn destroy(&mut self) {
        for processor in self.processors.values_mut() {
            processor.destroy();
        }
    }
}

pub struct RegistryEvaluator<'a> {
    registry: &'a FunctionRegistry,
    context: FunctionContext,
}

impl Evaluator for RegistryEvaluator<'_> {
    fn evaluate(&self, function: &str, args: &[String]) -> Result<Vec<String>, FunctionError> {
        let processor = self
            .registry
            .processors
            .get(function)
            .ok_or_else(|| FunctionError::Unknown(function.to_string()))?;
        processor.resolve(&self.context, args)
    }
}

/// Static internal/external host mapping.
///
/// Inbound rewrites translate external names to internal ones; outbound
/// rewrites translate back. Hosts without a mapping pass through.
#[derive(Debug, Default)]
pub struct HostmapFunction {
    to_internal: HashMap<String, String>,
    to_external: HashMap<String, String>,
}

impl HostmapFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, external: impl Into<String>, internal: impl Into<String>) -> Self {
        let external = external.into();
        let internal = internal.into();
        self.to_external.insert(internal.clone(), external.clone());
        self.to_internal.insert(external, internal);
        self
    }
}

impl FunctionProcessor for HostmapFunction {
    fn name(&self) -> &'static str {
        "hostmap"
    }

    fn initialize(&mut self, env: &FunctionEnv) -> Result<(), FunctionError> {
        for (external, internal) in env.iter() {
            self.to_internal
                .insert(external.to_string(), internal.to_string());
            self.to_external
                .insert(internal.to_string(), external.to_string());
        }
        Ok(())
    }

    fn resolve(
        &self,
        context: &FunctionContext,
        args: &[String],
    ) -> Result<Vec<String>, FunctionError> {
        let mapping = match context.direction {
            Direction::In => &self.to_internal,
            Direction::Out => &self.to_external,
        };
        Ok(args
            .iter()
            .map(|host| mapping.get(host).unwrap_or(host).clone())
            .collect())
    }
}

/// Service-name to registered-address lookup.
#[derive(Debug, Default)]
pub struct ServiceAddressFunction {
    addresses: HashMap<String, String>,
}

impl ServiceAddressFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, service: impl Into<String>, address: impl Into<String>) -> Self {
        self.addresses.insert(service.into(), address.into());
        self
    }
}

impl FunctionProcessor for ServiceAddressFunction {
    fn name(&self) -> &'static str {
        "serviceaddr"
    }

    fn initialize(&mut self, env: &FunctionEnv) -> Result<(), FunctionError> {
        for (service, address) in env.iter() {
            self.addresses
                .insert(service.to_string(), address.to_string());
        }
        Ok(())
    }

    fn resolve(
        &self,
        _context: &FunctionContext,
        args: &[String],
    ) -> Result<Vec<String>, FunctionError> {
        args.iter()
            .map(|service| {
                self.addresses
                    .get(service)
                    .cloned()
                    .ok_or_else(|| FunctionError::Failed(format!("no address for service '{service}'")))
            })
            .collect()
    }
}
