//! End-to-end rewrite scenarios.
//!
//! These exercise the whole pipeline the way the gateway's dispatch filters
//! do: parse a concrete URL, pick a rule, extract, run steps and functions,
//! expand. URL shapes follow the WebHDFS-style traffic the gateway fronts.

use std::collections::BTreeMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use gateway_rewrite::config::{build_rewriter, RulesConfig};
use gateway_rewrite::rewrite::expand::expand;
use gateway_rewrite::rewrite::extract::extract;
use gateway_rewrite::rewrite::functions::HostmapFunction;
use gateway_rewrite::rewrite::steps::{CodecError, QueryCodec, SecureQueryDecodeStep};
use gateway_rewrite::rewrite::Rule;
use gateway_rewrite::{
    parse_literal, parse_template, ConfigResolver, Direction, EmptyResolver, Params, Resolver,
    Rewriter, ServiceRegistry,
};

fn rule(name: &str, input: &str, output: &str) -> Rule {
    Rule::new(
        name,
        parse_template(input).unwrap(),
        parse_template(output).unwrap(),
    )
}

#[test]
fn expand_lone_capture() {
    let mut params = Params::new();
    params.add_value("path", "path-value");
    let out = expand(&parse_template("{path}").unwrap(), &params, None).unwrap();
    assert_eq!(out, "path-value");
}

#[test]
fn rewrite_swaps_path_segments() {
    let mut rewriter = Rewriter::new();
    rewriter.add_rule(rule("swap", "/{pathA}/{pathB}", "{pathB}/{pathA}"));
    // Absolute/relative flags describe output shape, not match criteria.
    let out = rewriter
        .rewrite("path-1/path-2", Direction::In, &EmptyResolver)
        .unwrap();
    assert_eq!(out, "path-2/path-1");
}

#[test]
fn expand_query_pair() {
    let mut params = Params::new();
    params.add_value("param-name", "param-value");
    let out = expand(
        &parse_template("?query-name={param-name}").unwrap(),
        &params,
        None,
    )
    .unwrap();
    assert_eq!(out, "?query-name=param-value");
}

#[test]
fn empty_literal_template_is_empty() {
    let template = parse_literal("").unwrap();
    assert!(!template.is_absolute());
    assert!(!template.is_directory());
    assert!(template.path().is_empty());
    assert!(template.query().is_empty());

    let params = extract(&template, &parse_literal("").unwrap()).unwrap();
    assert_eq!(params.names().len(), 0);
}

#[test]
fn registry_picks_most_specific_service() {
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
fn inbound_webhdfs_request_reaches_the_namenode() {
    let mut rewriter = Rewriter::new();
    rewriter.add_rule(
        rule(
            "webhdfs/inbound",
            "*://*:*/webhdfs/v1/{path=**}?{**}",
            "http://{namenode.address}/webhdfs/v1/{path=**}?{**}",
        )
        .direction(Direction::In),
    );
    let config = ConfigResolver::new().set("namenode.address", "vm.local:50070");
    let out = rewriter
        .rewrite(
            "https://gw:8443/webhdfs/v1/tmp/file?op=CREATE&user.name=hdfs&overwrite=false",
            Direction::In,
            &config,
        )
        .unwrap();
    assert_eq!(
        out,
        "http://vm.local:50070/webhdfs/v1/tmp/file?op=CREATE&user.name=hdfs&overwrite=false"
    );
}

#[test]
fn outbound_location_header_hides_the_datanode() {
    // The datanode's address moves into query parameters so the client only
    // ever sees the gateway.
    let mut rewriter = Rewriter::new();
    rewriter.add_rule(
        rule(
            "webhdfs/outbound/location",
            "*://{host}:{port}/webhdfs/v1/{path=**}?{**}",
            "{gateway.url}/webhdfs/data/v1/{path=**}?{host}&{port}&{**}",
        )
        .direction(Direction::Out),
    );
    let config = ConfigResolver::new().set("gateway.url", "http://gw:8888/gateway/cluster");
    let out = rewriter
        .rewrite(
            "http://vm.local:50075/webhdfs/v1/tmp/dirA700/fileA700?op=CREATE&user.name=hdfs",
            Direction::Out,
            &config,
        )
        .unwrap();
    assert_eq!(
        out,
        "http://gw:8888/gateway/cluster/webhdfs/data/v1/tmp/dirA700/fileA700?host=vm.local&port=50075&op=CREATE&user.name=hdfs"
    );
}

#[test]
fn inbound_data_request_restores_the_datanode() {
    let mut rewriter = Rewriter::new();
    rewriter.add_rule(
        rule(
            "webhdfs/inbound/data",
            "/webhdfs/data/v1/{path=**}?{host}&{port}&{**}",
            "http://{host}:{port}/webhdfs/v1/{path=**}?{**}",
        )
        .direction(Direction::In),
    );
    let out = rewriter
        .rewrite(
            "/webhdfs/data/v1/tmp/file?host=vm.local&port=50075&op=CREATE&user.name=hdfs",
            Direction::In,
            &EmptyResolver,
        )
        .unwrap();
    assert_eq!(
        out,
        "http://vm.local:50075/webhdfs/v1/tmp/file?op=CREATE&user.name=hdfs"
    );
}

#[test]
fn empty_query_values_survive_a_round_trip() {
    let mut rewriter = Rewriter::new();
    rewriter.add_rule(rule(
        "ui-passthrough",
        "*://*:*/*/{path=**}?{**}",
        "http://localhost:11000/{path=**}?{**}",
    ));
    let out = rewriter
        .rewrite(
            "https://localhost:8443/app/v2/jobs?_dc=1438899557070&filter=&timezone=GMT",
            Direction::In,
            &EmptyResolver,
        )
        .unwrap();
    assert_eq!(
        out,
        "http://localhost:11000/v2/jobs?_dc=1438899557070&filter=&timezone=GMT"
    );
}

#[test]
fn hostmap_translates_by_direction() {
    let mut rewriter = Rewriter::new();
    rewriter.functions_mut().register(Box::new(
        HostmapFunction::new().map("external-host", "internal-host"),
    ));
    rewriter.add_rule(rule(
        "hostmap",
        "{scheme}://{host}:{port}/{path=**}?{**}",
        "{scheme}://{$hostmap(host)}:{port}/{path=**}?{**}",
    ));

    let outbound = rewriter
        .rewrite("scheme://internal-host:777/path", Direction::Out, &EmptyResolver)
        .unwrap();
    assert_eq!(outbound, "scheme://external-host:777/path");

    let inbound = rewriter
        .rewrite("scheme://external-host:777/path", Direction::In, &EmptyResolver)
        .unwrap();
    assert_eq!(inbound, "scheme://internal-host:777/path");
}

struct HexCodec;

impl QueryCodec for HexCodec {
    fn encode(&self, clear: &str) -> Result<String, CodecError> {
        Ok(clear.bytes().map(|b| format!("{b:02x}")).collect())
    }

    fn decode(&self, opaque: &str) -> Result<String, CodecError> {
        if opaque.len() % 2 != 0 {
            return Err(CodecError("truncated blob".into()));
        }
        let bytes: Result<Vec<u8>, _> = (0..opaque.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&opaque[i..i + 2], 16))
            .collect();
        String::from_utf8(bytes.map_err(|_| CodecError("not hex".into()))?)
            .map_err(|_| CodecError("not utf-8".into()))
    }
}

#[test]
fn secure_query_decode_strips_smuggled_duplicates() {
    let codec: Arc<dyn QueryCodec> = Arc::new(HexCodec);
    let blob = HexCodec.encode("a=1").unwrap();

    let mut rewriter = Rewriter::new();
    rewriter.add_rule(
        rule("secured", "/app/{path=**}?{**}", "/backend/{path=**}?{**}")
            .step(Box::new(SecureQueryDecodeStep::new(codec))),
    );

    // An attacker appends a=2 next to the sealed query; only the sealed a=1
    // may survive.
    let out = rewriter
        .rewrite(
            &format!("/app/files?_={blob}&a=2"),
            Direction::In,
            &EmptyResolver,
        )
        .unwrap();
    assert_eq!(out, "/backend/files?a=1");
}

#[test]
fn rule_set_loads_from_toml() {
    let mut serviceaddr = BTreeMap::new();
    serviceaddr.insert("webhdfs".to_string(), "namenode:50070".to_string());

    let config: RulesConfig = toml::from_str(
        r#"
        [[rule]]
        name = "webhdfs/inbound"
        direction = "in"
        match = "/gateway/webhdfs/v1/{path=**}?{**}"
        rewrite = "http://{$serviceaddr(webhdfs)}/webhdfs/v1/{path=**}?{**}"

        [functions.serviceaddr]
        webhdfs = "namenode:50070"
        "#,
    )
    .unwrap();
    assert_eq!(config.functions.serviceaddr, serviceaddr);

    let rewriter = build_rewriter(&config, None).unwrap();
    let out = rewriter
        .rewrite("/gateway/webhdfs/v1/tmp?op=OPEN", Direction::In, &EmptyResolver)
        .unwrap();
    assert_eq!(out, "http://namenode:50070/webhdfs/v1/tmp?op=OPEN");
}

#[test]
fn round_trip_extraction_reproduces_values() {
    let template = parse_template("/{a}/{b}?k={v}").unwrap();
    let mut params = Params::new();
    params.add_value("a", "first");
    params.add_value("b", "second");
    params.add_value("v", "third");

    let expanded = expand(&template, &params, None).unwrap();
    let reparsed = parse_literal(&expanded).unwrap();
    let extracted = extract(&template, &reparsed).unwrap();

    for name in ["a", "b", "v"] {
        assert_eq!(extracted.resolve(name), params.resolve(name), "{name}");
    }
}

#[test]
fn unmatched_urls_pass_through_unchanged() {
    let mut rewriter = Rewriter::new();
    rewriter.add_rule(rule("narrow", "/only/this", "/rewritten"));
    let original = "/completely/other/path?q=1";
    let out = rewriter
        .rewrite(original, Direction::In, &EmptyResolver)
        .unwrap();
    assert_eq!(out, original);
}
