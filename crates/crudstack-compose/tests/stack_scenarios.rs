//! End-to-end composition scenarios.
//!
//! Each test composes a full stack from a `stack.toml` and checks the
//! resulting graph and rendered template.

use std::fs;
use std::sync::Arc;

use crudstack_compose::*;
use crudstack_core::{AccessMode, ComposeError, HttpMethod, StackConfig};

const CERT_ARN: &str =
    "arn:aws:acm:eu-west-1:123456789012:certificate/0b1c2d3e-aaaa-bbbb-cccc-1234567890ab";

fn handlers() -> InMemoryResolver {
    InMemoryResolver::new()
        .with_file("functions/function.js", "exports.handler = async () => ({})")
        .with_file("functions/getMethod.js", "exports.handler = async () => ({})")
        .with_file("functions/putMethod.js", "exports.handler = async () => ({})")
        .with_file("functions/deleteMethod.js", "exports.handler = async () => ({})")
}

fn split_config(extra: &str) -> StackConfig {
    StackConfig::parse(&format!(
        "[stack]\nid = \"PoCApiCrudStack\"\n\n[features]\nsplit_handlers = true\n{extra}"
    ))
    .unwrap()
}

fn secure_config() -> String {
    format!(
        r#"
[stack]
id = "PoCApiCrudStack"

[features]
split_handlers = true
secure_domain = true

[domain]
name = "api.mfjimene.com"
certificate = "{CERT_ARN}"
"#
    )
}

#[test]
fn split_stack_has_three_units_four_routes() {
    let graph = compose(&split_config(""), &handlers()).unwrap();

    assert_eq!(graph.storage.name, "http-crud-tutorial-items");
    assert_eq!(graph.units.len(), 3);
    assert_eq!(graph.grants.len(), 3);
    assert_eq!(graph.gateway.routes.len(), 4);
    assert_eq!(graph.gateway.adapters.len(), 3);
    assert!(graph.units.iter().all(|u| u.table_binding() == Some("http-crud-tutorial-items")));
    assert!(graph.grants.iter().all(|g| g.mode == AccessMode::ReadWrite));

    let gw = &graph.gateway;
    let list = gw.route(HttpMethod::Get, "/items").unwrap();
    let get = gw.route(HttpMethod::Get, "/items/{id}").unwrap();
    let put = gw.route(HttpMethod::Put, "/items").unwrap();
    let delete = gw.route(HttpMethod::Delete, "/items/{id}").unwrap();

    assert!(Arc::ptr_eq(&list.adapter, &get.adapter));
    assert_eq!(graph.unit(get.target()).unwrap().name, "http-get-dynamo-function");
    assert_eq!(graph.unit(put.target()).unwrap().name, "http-put-dynamo-function");
    assert_eq!(graph.unit(delete.target()).unwrap().name, "http-delete-dynamo-function");
    assert!(gw.route(HttpMethod::Post, "/items").is_none());
}

#[test]
fn single_stack_routes_everything_to_one_unit() {
    let config = StackConfig::parse("[stack]\nid = \"PoCApiCrudStack\"\n").unwrap();
    let graph = compose(&config, &handlers()).unwrap();

    assert_eq!(graph.units.len(), 1);
    assert_eq!(graph.gateway.adapters.len(), 1);
    let adapter = &graph.gateway.adapters[0];
    assert!(graph.gateway.routes.iter().all(|r| Arc::ptr_eq(&r.adapter, adapter)));
}

#[test]
fn no_domain_keeps_default_endpoint() {
    let graph = compose(&split_config(""), &handlers()).unwrap();
    assert!(graph.gateway.default_endpoint_enabled());
    assert!(graph.bucket.is_none());
    assert!(graph.trust_objects.is_empty());
    assert!(graph.domain.is_none());

    let template = render(&graph).unwrap();
    assert_eq!(
        template["Resources"]["HttpApi"]["Properties"]["DisableExecuteApiEndpoint"],
        false
    );
}

#[test]
fn secure_domain_stack_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let functions = dir.path().join("functions");
    fs::create_dir_all(&functions).unwrap();
    for module in ["getMethod", "putMethod", "deleteMethod"] {
        fs::write(functions.join(format!("{module}.js")), "exports.handler = async () => ({})").unwrap();
    }
    let trust = generate_client_trust("Example", "client.mfjimene.com").unwrap();
    trust.write(&dir.path().join("certs"), "mfjimene.com.cer").unwrap();

    let manifest = dir.path().join("stack.toml");
    fs::write(&manifest, secure_config()).unwrap();
    let config = StackConfig::from_file(&manifest).unwrap();
    let graph = compose(&config, &FsResolver).unwrap();

    let domain = graph.domain.as_ref().unwrap();
    assert_eq!(domain.name, "api.mfjimene.com");
    assert_eq!(domain.truststore.to_string(), "s3://bcol-cert-bucket-pocapirud/mfjimene.com.cer");
    assert!(!graph.gateway.default_endpoint_enabled());
    assert_eq!(graph.trust_objects.len(), 1);
    assert_eq!(graph.trust_objects[0].bundle.certificates, 1);

    // Trust object precedes the domain, which precedes the gateway.
    let order = graph.dependency_order().unwrap();
    let pos = |id: &str| order.iter().position(|n| n.logical_id == id).unwrap();
    assert!(pos(&graph.trust_objects[0].logical_id) < pos(&domain.logical_id));
    assert!(pos(&domain.logical_id) < pos(&graph.gateway.logical_id));
}

#[test]
fn secure_domain_without_trust_artifact_fails() {
    let dir = tempfile::tempdir().unwrap();
    let functions = dir.path().join("functions");
    fs::create_dir_all(&functions).unwrap();
    for module in ["getMethod", "putMethod", "deleteMethod"] {
        fs::write(functions.join(format!("{module}.js")), "").unwrap();
    }
    let manifest = dir.path().join("stack.toml");
    fs::write(&manifest, secure_config()).unwrap();

    let config = StackConfig::from_file(&manifest).unwrap();
    let err = compose(&config, &FsResolver).unwrap_err();
    assert!(matches!(err, ComposeError::MissingArtifact(_)));
}

#[test]
fn domain_bound_before_staging_fails() {
    let resolver = handlers();
    let mut builder = StackBuilder::new("PoCApiCrudStack", &resolver).unwrap();
    builder
        .storage("http-crud-tutorial-items", Default::default())
        .unwrap()
        .trust_bucket("bcol-cert-bucket-pocapirud")
        .unwrap();

    let err = builder
        .secure_domain(&DomainSpec {
            name: "api.mfjimene.com".to_string(),
            certificate: CERT_ARN.to_string(),
            trust_key: "mfjimene.com.cer".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, ComposeError::TrustObjectNotStaged(_)));
}

#[test]
fn scoped_grants_narrow_access() {
    let graph = compose(&split_config("scoped_grants = true\n"), &handlers()).unwrap();
    let mode_of = |name: &str| {
        let unit = graph.units.iter().find(|u| u.name == name).unwrap();
        graph.grants.iter().find(|g| g.subject == unit.id).unwrap().mode
    };
    assert_eq!(mode_of("http-get-dynamo-function"), AccessMode::Read);
    assert_eq!(mode_of("http-put-dynamo-function"), AccessMode::Write);
    assert_eq!(mode_of("http-delete-dynamo-function"), AccessMode::Write);
}

#[test]
fn missing_handler_module_fails_composition() {
    let resolver = InMemoryResolver::new()
        .with_file("functions/getMethod.js", "")
        .with_file("functions/putMethod.js", "");
    let err = compose(&split_config(""), &resolver).unwrap_err();
    assert!(matches!(err, ComposeError::UnresolvedEntryPoint { .. }));
}

#[test]
fn template_renders_every_node() {
    let graph = compose(&split_config(""), &handlers()).unwrap();
    let template = render(&graph).unwrap();
    let resources = template["Resources"].as_object().unwrap();
    for node in graph.nodes() {
        assert!(resources.contains_key(&node.logical_id), "{} not rendered", node.logical_id);
    }
    for id in graph.derived_logical_ids() {
        assert!(resources.contains_key(&id), "{id} not rendered");
    }
    let roles = resources.values().filter(|r| r["Type"] == "AWS::IAM::Role").count();
    assert_eq!(roles, graph.units.len());
    assert!(render_string(&graph).unwrap().contains("HELLO_TABLE_NAME"));
}

#[test]
fn handler_named_like_a_derived_role_is_rejected() {
    let config = split_config("\n[handlers.put]\nname = \"http-get-dynamo-function-service-role\"\n");
    let err = compose(&config, &handlers()).unwrap_err();
    assert!(matches!(
        err,
        ComposeError::LogicalIdCollision(id) if id == "HttpGetDynamoFunctionServiceRole"
    ));
}
