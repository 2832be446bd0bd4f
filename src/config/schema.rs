//! Rule-set schema definitions.
//!
//! This module defines the on-disk shape of a rewrite rule file. All types
//! derive Serde traits for deserialization from TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root of a rewrite rule file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RulesConfig {
    /// Ordered rewrite rules; file order is registration order.
    pub rule: Vec<RuleConfig>,

    /// Data for the built-in rewrite functions.
    pub functions: FunctionsConfig,
}

/// One rewrite rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Rule identifier for logging and diagnostics.
    pub name: String,

    /// Which direction the rule applies to.
    #[serde(default)]
    pub direction: DirectionConfig,

    /// Template matched against incoming URLs.
    #[serde(rename = "match")]
    pub pattern: String,

    /// Template the matched URL is rewritten into.
    pub rewrite: String,

    /// Step processors to run, by name, in order.
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Rule direction as written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectionConfig {
    In,
    Out,
    #[default]
    Both,
}

/// Static data handed to the built-in function processors.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FunctionsConfig {
    /// external-host -> internal-host pairs.
    pub hostmap: BTreeMap<String, String>,

    /// service-name -> address pairs.
    pub serviceaddr: BTreeMap<String, String>,
}
