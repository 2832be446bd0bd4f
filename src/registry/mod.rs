//! Live service-definition registry.
//!
//! # Responsibilities
//! - Own the matcher generation shared by request-handling threads
//! - Support steady-state register/deregister without blocking readers
//!
//! # Design Decisions
//! - Writers rebuild a full index off to the side and publish it with one
//!   atomic swap; readers see the old or the new generation in full, never a
//!   partial one
//! - The writer lock covers only the rebuild-and-swap, never a lookup
//! - Lookups return owned values so no lock or guard outlives the call

use std::sync::Mutex;

use arc_swap::ArcSwap;

use crate::matcher::Matcher;
use crate::resolver::Params;
use crate::template::Template;

/// An owned lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<V> {
    pub template: Template,
    pub value: V,
    pub params: Params,
}

/// Concurrent wrapper around a [`Matcher`] generation.
///
/// Registered values are opaque service descriptors (role names, backend
/// addresses); the registry never interprets them.
pub struct ServiceRegistry<V: Clone> {
    current: ArcSwap<Matcher<V>>,
    entries: Mutex<Vec<(Template, V)>>,
}

impl<V: Clone> Default for ServiceRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ServiceRegistry<V> {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Matcher::new()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register `template`, publishing a new generation.
    pub fn register(&self, template: Template, value: V) {
        let mut entries = self.entries.lock().expect("registry writer lock poisoned");
        entries.push((template, value));
        self.publish(&entries);
    }

    /// Drop the first entry equal to `template`, publishing a new generation.
    /// Returns false when no such entry exists.
    pub fn deregister(&self, template: &Template) -> bool {
        let mut entries = self.entries.lock().expect("registry writer lock poisoned");
        let Some(position) = entries.iter().position(|(t, _)| t == template) else {
            return false;
        };
        entries.remove(position);
        self.publish(&entries);
        true
    }

    /// Find the most specific registered template for `input` (a literal
    /// template) and extract its parameters.
    pub fn lookup(&self, input: &Template) -> Option<Resolution<V>> {
        let generation = self.current.load();
        let hit = generation.lookup(input)?;
        Some(Resolution {
            template: hit.template.clone(),
            value: hit.value.clone(),
            params: hit.params,
        })
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    fn publish(&self, entries: &[(Template, V)]) {
        let mut next = Matcher::new();
        for (template, value) in entries {
            next.add(template.clone(), value.clone());
        }
        self.current.store(std::sync::Arc::new(next));
        tracing::debug!(entries = entries.len(), "published new service registry generation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{parse_literal, parse_template};

    #[test]
    fn test_register_and_lookup() {
        let registry = ServiceRegistry::new();
        registry.register(parse_template("/a/{x}").unwrap(), "R1".to_string());
        registry.register(parse_template("/a/b").unwrap(), "R2".to_string());

        let hit = registry.lookup(&parse_literal("/a/b").unwrap()).unwrap();
        assert_eq!(hit.value, "R2");

        let hit = registry.lookup(&parse_literal("/a/c").unwrap()).unwrap();
        assert_eq!(hit.value, "R1");
        assert_eq!(hit.params.first("x"), Some("c"));
    }

    #[test]
    fn test_deregister_unpublishes() {
        let registry = ServiceRegistry::new();
        let template = parse_template("/svc/{x}").unwrap();
        registry.register(template.clone(), "SVC".to_string());
        assert!(registry.lookup(&parse_literal("/svc/1").unwrap()).is_some());

        assert!(registry.deregister(&template));
        assert!(registry.lookup(&parse_literal("/svc/1").unwrap()).is_none());
        assert!(!registry.deregister(&template));
    }

    #[test]
    fn test_readers_see_complete_generations() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(ServiceRegistry::new());
        registry.register(parse_template("/stable/{x}").unwrap(), "STABLE".to_string());

        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..1000 {
                    // The stable route must resolve in every generation.
                    let hit = registry
                        .lookup(&parse_literal("/stable/1").unwrap())
                        .expect("stable route vanished mid-swap");
                    assert_eq!(hit.value, "STABLE");
                }
            })
        };

        for i in 0..100 {
            let template = parse_template(&format!("/churn-{i}/{{x}}")).unwrap();
            registry.register(template.clone(), format!("C{i}"));
            registry.deregister(&template);
        }
        reader.join().unwrap();
    }
}
