//! Parameter resolution.
//!
//! # Responsibilities
//! - Define the read-only lookup capability the expander consumes
//! - Provide the in-memory [`Params`] implementation
//! - Chain resolvers so extracted values shadow environment values
//!
//! # Design Decisions
//! - A parameter maps to an ordered list of values; repeated path or query
//!   components legally produce several
//! - A value of `None` is distinct from an absent parameter: `None` emits a
//!   bare query key, absent parameters are omitted entirely
//! - `resolve` returning `None` means "not bound here", letting chained
//!   resolvers fall through

use std::collections::HashMap;

/// One resolved value. `None` marks an explicitly empty value (a query key
/// with no `=value`).
pub type ParamValue = Option<String>;

/// Read-only parameter lookup.
///
/// Implementations outside the engine expose request attributes or gateway
/// configuration through the same interface.
pub trait Resolver {
    /// Known parameter names, in a deterministic order. Implementations
    /// backed by open-ended sources may return an empty list; such resolvers
    /// still answer `resolve` but contribute nothing to catch-all query
    /// expansion.
    fn names(&self) -> Vec<String>;

    /// The ordered values bound to `name`, or `None` if unbound.
    fn resolve(&self, name: &str) -> Option<Vec<ParamValue>>;
}

/// In-memory parameter set; the engine's extraction output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    order: Vec<String>,
    values: HashMap<String, Vec<ParamValue>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append a value to `name`, creating the parameter if needed.
    pub fn add_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push(name.into(), Some(value.into()));
    }

    /// Append an explicitly empty value to `name`.
    pub fn add_empty(&mut self, name: impl Into<String>) {
        self.push(name.into(), None);
    }

    fn push(&mut self, name: String, value: ParamValue) {
        if !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.entry(name).or_default().push(value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// First value bound to `name`, flattened through the explicit-empty case.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)?
            .first()
            .and_then(|value| value.as_deref())
    }
}

impl Resolver for Params {
    fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn resolve(&self, name: &str) -> Option<Vec<ParamValue>> {
        self.values.get(name).cloned()
    }
}

/// Resolver over a flat set of configuration properties.
///
/// Mirrors the host gateway's static settings (`gateway.url` and friends)
/// without the engine knowing where they come from.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    properties: HashMap<String, String>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl Resolver for ConfigResolver {
    fn names(&self) -> Vec<String> {
        // Intentionally empty: config properties answer lookups but are never
        // swept into catch-all query expansion.
        Vec::new()
    }

    fn resolve(&self, name: &str) -> Option<Vec<ParamValue>> {
        self.properties
            .get(name)
            .map(|value| vec![Some(value.clone())])
    }
}

/// Consults `first`, then falls back to `second` for unbound names.
///
/// The rewriter uses this to let rules reference both URL-derived values and
/// environment attributes uniformly.
pub struct ChainResolver<'a> {
    first: &'a dyn Resolver,
    second: &'a dyn Resolver,
}

impl<'a> ChainResolver<'a> {
    pub fn new(first: &'a dyn Resolver, second: &'a dyn Resolver) -> Self {
        Self { first, second }
    }
}

impl Resolver for ChainResolver<'_> {
    fn names(&self) -> Vec<String> {
        let mut names = self.first.names();
        for name in self.second.names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn resolve(&self, name: &str) -> Option<Vec<ParamValue>> {
        self.first
            .resolve(name)
            .or_else(|| self.second.resolve(name))
    }
}

/// The empty resolver; resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResolver;

impl Resolver for EmptyResolver {
    fn names(&self) -> Vec<String> {
        Vec::new()
    }

    fn resolve(&self, _name: &str) -> Option<Vec<ParamValue>> {
        None
    }
}
