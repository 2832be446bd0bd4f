//! Template expansion.
//!
//! Substitutes named segments with resolved values to produce a concrete
//! URL. Missing values are a soft failure (the segment contributes nothing),
//! so best-effort rewriting stays robust against partially-configured
//! resolvers. Function evaluation failures are the exception: those
//! propagate, and the calling filter decides the policy.

use std::collections::HashSet;

use crate::resolver::{ParamValue, Resolver};
use crate::template::{encoding, CapturePattern, Segment, Template};

use super::functions::{Evaluator, FunctionRef};
use super::RewriteError;

/// Expand `template` against `resolver`, evaluating `{$func(param)}`
/// references through `evaluator`.
pub fn expand(
    template: &Template,
    resolver: &dyn Resolver,
    evaluator: Option<&dyn Evaluator>,
) -> Result<String, RewriteError> {
    let mut out = String::new();
    let mut consumed = HashSet::new();

    if template.has_scheme() {
        if let Some(scheme) = template.scheme() {
            out.push_str(&expand_component(scheme, resolver, evaluator, &mut consumed)?);
        }
        out.push(':');
    }

    if template.has_authority() {
        out.push_str("//");
        if template.username().is_some() || template.password().is_some() {
            if let Some(username) = template.username() {
                out.push_str(&expand_component(username, resolver, evaluator, &mut consumed)?);
            }
            if let Some(password) = template.password() {
                out.push(':');
                out.push_str(&expand_component(password, resolver, evaluator, &mut consumed)?);
            }
            out.push('@');
        }
        if let Some(host) = template.host() {
            out.push_str(&expand_component(host, resolver, evaluator, &mut consumed)?);
        }
        if let Some(port) = template.port() {
            out.push(':');
            out.push_str(&expand_component(port, resolver, evaluator, &mut consumed)?);
        }
    }

    expand_path(template, resolver, evaluator, &mut consumed, &mut out)?;
    expand_query(template, resolver, evaluator, &mut consumed, &mut out)?;

    if template.has_fragment() {
        out.push('#');
        if let Some(fragment) = template.fragment() {
            out.push_str(&expand_component(fragment, resolver, evaluator, &mut consumed)?);
        }
    }

    Ok(out)
}

fn expand_path(
    template: &Template,
    resolver: &dyn Resolver,
    evaluator: Option<&dyn Evaluator>,
    consumed: &mut HashSet<String>,
    out: &mut String,
) -> Result<(), RewriteError> {
    if template.is_absolute() {
        out.push('/');
    }
    let mut parts: Vec<String> = Vec::new();
    for segment in template.path() {
        match segment {
            Segment::Literal(text) => parts.push(encoding::encode_path(text).into_owned()),
            Segment::Capture { name, pattern } => {
                let values = resolve_values(name, resolver, evaluator, consumed)?;
                let first = values.into_iter().flatten().next();
                match first {
                    Some(value) => parts.push(encoding::encode_path(&value).into_owned()),
                    // An unresolved exact pattern still has literal text to
                    // contribute; anything else contributes nothing.
                    None => match pattern {
                        CapturePattern::Exact(text) => {
                            parts.push(encoding::encode_path(text).into_owned())
                        }
                        _ => parts.push(String::new()),
                    },
                }
            }
            Segment::MultiCapture { name } => {
                let values = resolve_values(name, resolver, evaluator, consumed)?;
                let joined: Vec<String> = values.into_iter().flatten().collect();
                // Multi-capture values pass through untouched; they carry a
                // previously-extracted, still-encoded suffix.
                parts.push(joined.join("/"));
            }
        }
    }
    let path = parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    out.push_str(&path);
    if template.is_directory() && !path.is_empty() {
        out.push('/');
    }
    Ok(())
}

fn expand_query(
    template: &Template,
    resolver: &dyn Resolver,
    evaluator: Option<&dyn Evaluator>,
    consumed: &mut HashSet<String>,
    out: &mut String,
) -> Result<(), RewriteError> {
    let mut pairs: Vec<String> = Vec::new();

    for segment in template.query() {
        let key = encoding::encode_query(&segment.key);
        match &segment.value {
            None => pairs.push(key.into_owned()),
            Some(Segment::Literal(text)) => {
                pairs.push(format!("{key}={}", encoding::encode_query(text)));
            }
            Some(value) => {
                let Some(name) = value.name() else {
                    continue;
                };
                let Some(values) = try_resolve(name, resolver, evaluator, consumed)? else {
                    // Unresolved named pair: omitted entirely, not emitted
                    // as `key=`.
                    continue;
                };
                for value in values {
                    pairs.push(query_pair(&key, value.as_deref()));
                }
            }
        }
    }

    if template.extra_query().is_some() {
        for name in resolver.names() {
            if consumed.contains(&name) {
                continue;
            }
            consumed.insert(name.clone());
            let Some(values) = resolver.resolve(&name) else {
                continue;
            };
            let key = encoding::encode_query(&name);
            for value in values {
                pairs.push(query_pair(&key, value.as_deref()));
            }
        }
    }

    if !pairs.is_empty() {
        out.push('?');
        out.push_str(&pairs.join("&"));
    }
    Ok(())
}

fn query_pair(key: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("{key}={}", encoding::encode_query(value)),
        // Explicitly empty value: a bare key marker.
        None => key.to_string(),
    }
}

fn expand_component(
    segment: &Segment,
    resolver: &dyn Resolver,
    evaluator: Option<&dyn Evaluator>,
    consumed: &mut HashSet<String>,
) -> Result<String, RewriteError> {
    match segment {
        Segment::Literal(text) => Ok(text.clone()),
        Segment::Capture { name, pattern } => {
            let values = resolve_values(name, resolver, evaluator, consumed)?;
            match values.into_iter().flatten().next() {
                Some(value) => Ok(value),
                None => match pattern {
                    CapturePattern::Exact(text) => Ok(text.clone()),
                    _ => Ok(String::new()),
                },
            }
        }
        Segment::MultiCapture { name } => {
            let values = resolve_values(name, resolver, evaluator, consumed)?;
            Ok(values.into_iter().flatten().next().unwrap_or_default())
        }
    }
}

// Resolve a segment name, which may be a plain parameter or a
// `$function(param)` reference. Unbound resolves to an empty list.
fn resolve_values(
    name: &str,
    resolver: &dyn Resolver,
    evaluator: Option<&dyn Evaluator>,
    consumed: &mut HashSet<String>,
) -> Result<Vec<ParamValue>, RewriteError> {
    Ok(try_resolve(name, resolver, evaluator, consumed)?.unwrap_or_default())
}

fn try_resolve(
    name: &str,
    resolver: &dyn Resolver,
    evaluator: Option<&dyn Evaluator>,
    consumed: &mut HashSet<String>,
) -> Result<Option<Vec<ParamValue>>, RewriteError> {
    if name.is_empty() {
        return Ok(None);
    }
    let reference = FunctionRef::parse(name);
    consumed.insert(reference.parameter.clone());
    let resolved = resolver.resolve(&reference.parameter);
    match reference.function {
        None => Ok(resolved),
        Some(function) => {
            let Some(evaluator) = evaluator else {
                return Err(RewriteError::NoEvaluator(function));
            };
            // An unbound parameter is handed to the function as literal
            // text, so `{$serviceaddr(webhdfs)}` works without a `webhdfs`
            // parameter in scope.
            let args: Vec<String> = match resolved {
                Some(values) => values.into_iter().flatten().collect(),
                None if !reference.parameter.is_empty() => vec![reference.parameter.clone()],
                None => Vec::new(),
            };
            let values = evaluator
                .evaluate(&function, &args)
                .map_err(|source| RewriteError::Function {
                    function: function.clone(),
                    source,
                })?;
            Ok(Some(values.into_iter().map(Some).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{EmptyResolver, Params};
    use crate::rewrite::functions::FunctionError;
    use crate::template::parse_template;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, &str)]) -> Params {
        let mut params = Params::new();
        for (name, value) in pairs {
            params.add_value(*name, *value);
        }
        params
    }

    fn render(pattern: &str, params: &Params) -> String {
        expand(&parse_template(pattern).unwrap(), params, None).unwrap()
    }

    #[test]
    fn test_single_capture_takes_first_value() {
        assert_eq!(render("{path}", &params(&[("path", "path-value")])), "path-value");

        let mut multi = Params::new();
        multi.add_value("x", "first");
        multi.add_value("x", "second");
        assert_eq!(render("/{x}", &multi), "/first");
    }

    #[test]
    fn test_query_capture_expands() {
        assert_eq!(
            render("?query-name={param-name}", &params(&[("param-name", "param-value")])),
            "?query-name=param-value"
        );
    }

    #[test]
    fn test_unresolved_path_capture_drops_slash() {
        assert_eq!(render("/a/{gone}/b", &Params::new()), "/a/b");
    }

    #[test]
    fn test_unresolved_query_pair_is_omitted() {
        assert_eq!(render("path?k={gone}", &Params::new()), "path");
    }

    #[test]
    fn test_explicit_empty_value_emits_bare_key() {
        let mut params = Params::new();
        params.add_empty("flag");
        assert_eq!(render("path?flag={flag}", &params), "path?flag");
    }

    #[test]
    fn test_repeated_query_values_emit_repeated_keys() {
        let mut params = Params::new();
        params.add_value("v", "1");
        params.add_value("v", "2");
        assert_eq!(render("path?k={v}", &params), "path?k=1&k=2");
    }

    #[test]
    fn test_directory_and_empty_templates() {
        assert_eq!(render("/", &Params::new()), "/");
        assert_eq!(render("", &Params::new()), "");
        assert_eq!(render("a/", &params(&[])), "a/");
    }

    #[test]
    fn test_glob_joins_all_values() {
        let mut params = Params::new();
        params.add_value("path", "a/b/c");
        assert_eq!(render("/top/{path=**}", &params), "/top/a/b/c");
    }

    #[test]
    fn test_extra_query_emits_leftovers_in_order() {
        let mut params = Params::new();
        params.add_value("host", "h");
        params.add_value("op", "CREATE");
        params.add_value("user.name", "hdfs");
        assert_eq!(
            render("/p?{host}&{**}", &params),
            "/p?host=h&op=CREATE&user.name=hdfs"
        );
    }

    #[test]
    fn test_query_values_are_encoded() {
        let mut params = Params::new();
        params.add_value("v", "a=1");
        assert_eq!(render("path?k={v}", &params), "path?k=a%3D1");
    }

    #[test]
    fn test_path_value_keeps_url_shape() {
        let mut params = Params::new();
        params.add_value("gateway.url", "http://gw:8888/gateway/cluster");
        assert_eq!(
            render("{gateway.url}/webhdfs/v1", &params),
            "http://gw:8888/gateway/cluster/webhdfs/v1"
        );
    }

    #[test]
    fn test_authority_expansion() {
        let p = params(&[("scheme", "http"), ("host", "example"), ("port", "8443")]);
        assert_eq!(
            render("{scheme}://{host}:{port}/x", &p),
            "http://example:8443/x"
        );
    }

    #[test]
    fn test_unresolved_exact_pattern_emits_its_text() {
        assert_eq!(render("/{x=v1}/y", &Params::new()), "/v1/y");
    }

    #[test]
    fn test_missing_evaluator_is_an_error() {
        let result = expand(
            &parse_template("{$hostmap(host)}").unwrap(),
            &params(&[("host", "h")]),
            None,
        );
        assert!(matches!(result, Err(RewriteError::NoEvaluator(_))));
    }

    struct Upper;

    impl Evaluator for Upper {
        fn evaluate(&self, function: &str, args: &[String]) -> Result<Vec<String>, FunctionError> {
            if function != "upper" {
                return Err(FunctionError::Unknown(function.to_string()));
            }
            Ok(args.iter().map(|a| a.to_uppercase()).collect())
        }
    }

    #[test]
    fn test_function_reference_transforms_values() {
        let out = expand(
            &parse_template("/{$upper(x)}").unwrap(),
            &params(&[("x", "abc")]),
            Some(&Upper),
        )
        .unwrap();
        assert_eq!(out, "/ABC");
    }

    #[test]
    fn test_function_failure_propagates() {
        let result = expand(
            &parse_template("/{$missing(x)}").unwrap(),
            &EmptyResolver,
            Some(&Upper),
        );
        assert!(matches!(result, Err(RewriteError::Function { .. })));
    }
}
