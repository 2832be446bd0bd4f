//! Rule-set validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Parse every template so malformed patterns fail the topology load, not
//!   a live request
//! - Check step references against the known step names
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: RulesConfig -> Result<(), Vec<ValidationError>>

use std::collections::HashSet;

use thiserror::Error;

use crate::template::{parse_template, SyntaxError};

use super::schema::RulesConfig;

/// Step names the loader can construct.
pub const KNOWN_STEPS: &[&str] = &["secure-query-encode", "secure-query-decode"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rule '{rule}' has an invalid match pattern: {source}")]
    BadMatchPattern { rule: String, source: SyntaxError },

    #[error("rule '{rule}' has an invalid rewrite pattern: {source}")]
    BadRewritePattern { rule: String, source: SyntaxError },

    #[error("rule '{rule}' references unknown step '{step}'")]
    UnknownStep { rule: String, step: String },

    #[error("duplicate rule name '{0}'")]
    DuplicateRuleName(String),

    #[error("rule '{rule}' uses secure-query steps but no query codec was supplied")]
    MissingCodec { rule: String },
}

/// Validate `config`, reporting every problem found.
pub fn validate_rules(config: &RulesConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for rule in &config.rule {
        if !seen.insert(rule.name.clone()) {
            errors.push(ValidationError::DuplicateRuleName(rule.name.clone()));
        }
        if let Err(source) = parse_template(&rule.pattern) {
            errors.push(ValidationError::BadMatchPattern {
                rule: rule.name.clone(),
                source,
            });
        }
        if let Err(source) = parse_template(&rule.rewrite) {
            errors.push(ValidationError::BadRewritePattern {
                rule: rule.name.clone(),
                source,
            });
        }
        for step in &rule.steps {
            if !KNOWN_STEPS.contains(&step.as_str()) {
                errors.push(ValidationError::UnknownStep {
                    rule: rule.name.clone(),
                    step: step.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> RulesConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = config(
            r#"
            [[rule]]
            name = "a"
            match = "/a/{x}"
            rewrite = "/b/{x}"

            [[rule]]
            name = "b"
            match = "/c/{y=**}"
            rewrite = "/d/{y=**}"
            steps = ["secure-query-decode"]
            "#,
        );
        assert_eq!(validate_rules(&config), Ok(()));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let config = config(
            r#"
            [[rule]]
            name = "dup"
            match = "/a/{broken"
            rewrite = "/b"

            [[rule]]
            name = "dup"
            match = "/c"
            rewrite = "/d"
            steps = ["no-such-step"]
            "#,
        );
        let errors = validate_rules(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::BadMatchPattern { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateRuleName(_))));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownStep { .. })));
    }
}
