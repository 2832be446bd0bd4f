//! URL Template Engine for a reverse-proxy gateway.
//!
//! Fronting many backend services behind one endpoint means every URL that
//! crosses the proxy (request lines, Location headers, links inside bodies)
//! may need translating. This crate is the engine that does the translating:
//! a small pattern language for URL shapes, and the operations built on it.
//!
//! # Architecture Overview
//!
//! ```text
//!   incoming URL
//!        │
//!        ▼
//!   ┌──────────┐   literal    ┌──────────────────────────────────────┐
//!   │ template │─────────────▶│               rewrite                │
//!   │  parser  │              │                                      │
//!   └──────────┘              │  match rule ─▶ steps ─▶ extract      │
//!        │ patterns           │       │                   │          │
//!        ▼                    │       ▼                   ▼          │
//!   ┌──────────┐              │  ┌─────────┐        ┌──────────┐     │
//!   │ matcher  │◀─────────────│  │functions│───────▶│  expand  │     │
//!   │  (tree)  │  specificity │  └─────────┘        └────┬─────┘     │
//!   └──────────┘              └───────────────────────────┼──────────┘
//!        ▲                                                ▼
//!   ┌──────────┐                                     rewritten URL
//!   │ registry │  add/remove + atomic generation swap
//!   └──────────┘
//! ```
//!
//! The engine is pure and synchronous: no I/O, no ports, no threads of its
//! own. Shared state exists only as immutable matcher/rule-set generations
//! published through an atomic swap (`registry`).

pub mod config;
pub mod matcher;
pub mod registry;
pub mod resolver;
pub mod rewrite;
pub mod template;

pub use matcher::{Match, Matcher};
pub use registry::ServiceRegistry;
pub use resolver::{ChainResolver, ConfigResolver, EmptyResolver, Params, Resolver};
pub use rewrite::{Direction, RewriteError, Rewriter, Rule};
pub use template::{parse_literal, parse_template, SyntaxError, Template};
