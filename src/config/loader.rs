//! Rule-set loading from disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::rewrite::functions::{FunctionRegistry, HostmapFunction, ServiceAddressFunction};
use crate::rewrite::steps::{
    QueryCodec, SecureQueryDecodeStep, SecureQueryEncodeStep, StepProcessor,
};
use crate::rewrite::{Direction, Rewriter, Rule};
use crate::template::parse_template;

use super::schema::{DirectionConfig, RulesConfig};
use super::validation::{validate_rules, ValidationError};

/// Error type for rule-set loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate a rule file from a TOML file.
pub fn load_rules(path: &Path) -> Result<RulesConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: RulesConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_rules(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Construct an immutable [`Rewriter`] from a validated rule set.
///
/// `codec` backs the secure-query steps; rule sets that reference those
/// steps fail here, at load time, if none is supplied.
pub fn build_rewriter(
    config: &RulesConfig,
    codec: Option<Arc<dyn QueryCodec>>,
) -> Result<Rewriter, ConfigError> {
    validate_rules(config).map_err(ConfigError::Validation)?;

    let mut functions = FunctionRegistry::new();
    if !config.functions.hostmap.is_empty() {
        let mut hostmap = HostmapFunction::new();
        for (external, internal) in &config.functions.hostmap {
            hostmap = hostmap.map(external, internal);
        }
        functions.register(Box::new(hostmap));
    }
    if !config.functions.serviceaddr.is_empty() {
        let mut serviceaddr = ServiceAddressFunction::new();
        for (service, address) in &config.functions.serviceaddr {
            serviceaddr = serviceaddr.register(service, address);
        }
        functions.register(Box::new(serviceaddr));
    }

    let mut rewriter = Rewriter::with_functions(functions);
    let mut missing_codec = Vec::new();

    for rule_config in &config.rule {
        let input = parse_template(&rule_config.pattern).map_err(|source| {
            ConfigError::Validation(vec![ValidationError::BadMatchPattern {
                rule: rule_config.name.clone(),
                source,
            }])
        })?;
        let output = parse_template(&rule_config.rewrite).map_err(|source| {
            ConfigError::Validation(vec![ValidationError::BadRewritePattern {
                rule: rule_config.name.clone(),
                source,
            }])
        })?;
        let mut rule = Rule::new(&rule_config.name, input, output);
        rule = match rule_config.direction {
            DirectionConfig::In => rule.direction(Direction::In),
            DirectionConfig::Out => rule.direction(Direction::Out),
            DirectionConfig::Both => rule,
        };
        for step_name in &rule_config.steps {
            match build_step(step_name, &codec) {
                Some(step) => rule = rule.step(step),
                None => missing_codec.push(ValidationError::MissingCodec {
                    rule: rule_config.name.clone(),
                }),
            }
        }
        rewriter.add_rule(rule);
    }

    if !missing_codec.is_empty() {
        return Err(ConfigError::Validation(missing_codec));
    }

    tracing::info!(rules = rewriter.rule_count(), "rewrite rule set loaded");
    Ok(rewriter)
}

fn build_step(
    name: &str,
    codec: &Option<Arc<dyn QueryCodec>>,
) -> Option<Box<dyn StepProcessor>> {
    let codec = codec.as_ref()?;
    match name {
        "secure-query-encode" => Some(Box::new(SecureQueryEncodeStep::new(codec.clone()))),
        "secure-query-decode" => Some(Box::new(SecureQueryDecodeStep::new(codec.clone()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::EmptyResolver;
    use crate::rewrite::steps::CodecError;

    struct IdentityCodec;

    impl QueryCodec for IdentityCodec {
        fn encode(&self, clear: &str) -> Result<String, CodecError> {
            Ok(clear.to_string())
        }

        fn decode(&self, opaque: &str) -> Result<String, CodecError> {
            Ok(opaque.to_string())
        }
    }

    fn parse(toml: &str) -> RulesConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_build_rewriter_from_config() {
        let config = parse(
            r#"
            [[rule]]
            name = "webhdfs/inbound"
            direction = "in"
            match = "/webhdfs/v1/{path=**}?{**}"
            rewrite = "http://{$serviceaddr(webhdfs)}/webhdfs/v1/{path=**}?{**}"

            [functions.serviceaddr]
            webhdfs = "namenode:50070"
            "#,
        );
        let rewriter = build_rewriter(&config, None).unwrap();
        let out = rewriter
            .rewrite("/webhdfs/v1/tmp/file", Direction::In, &EmptyResolver)
            .unwrap();
        assert_eq!(out, "http://namenode:50070/webhdfs/v1/tmp/file");
    }

    #[test]
    fn test_bad_pattern_fails_load_not_request() {
        let config = parse(
            r#"
            [[rule]]
            name = "broken"
            match = "/a/{oops"
            rewrite = "/b"
            "#,
        );
        let result = build_rewriter(&config, None);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_secure_query_steps_require_codec() {
        let config = parse(
            r#"
            [[rule]]
            name = "secured"
            match = "/p?{**}"
            rewrite = "/p?{**}"
            steps = ["secure-query-decode"]
            "#,
        );
        assert!(matches!(
            build_rewriter(&config, None),
            Err(ConfigError::Validation(_))
        ));
        assert!(build_rewriter(&config, Some(Arc::new(IdentityCodec))).is_ok());
    }

    #[test]
    fn test_load_rules_from_disk() {
        let path = std::env::temp_dir().join("gateway-rewrite-loader-test.toml");
        fs::write(
            &path,
            r#"
            [[rule]]
            name = "echo"
            match = "/{x}"
            rewrite = "/{x}"
            "#,
        )
        .unwrap();
        let config = load_rules(&path).unwrap();
        assert_eq!(config.rule.len(), 1);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rules_missing_file() {
        let result = load_rules(Path::new("/nonexistent/rules.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
