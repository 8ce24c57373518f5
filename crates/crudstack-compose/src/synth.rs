//! Template synthesis: renders a [`StackGraph`] as a JSON deployment
//! template for the provisioning engine.
//!
//! Layout: `Resources` keyed by logical ID (each with `Type`, `Properties`,
//! `DependsOn`), `Outputs` with the reachable endpoint, and `Assets` listing
//! the local artifacts the engine must upload before applying.

use std::collections::HashSet;

use crudstack_core::{ComposeError, ComposeResult};
use serde_json::map::Entry;
use serde_json::{Map, Value, json};

use crate::graph::StackGraph;
use crate::routes::Gateway;

const TEMPLATE_VERSION: &str = "2010-09-09";
const LAMBDA_BASIC_EXECUTION: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

struct Resources(Map<String, Value>);

impl Resources {
    /// Insert a resource. An ID that is already taken is a collision, never
    /// an overwrite.
    fn add(
        &mut self,
        logical_id: &str,
        kind: &str,
        properties: Value,
        depends_on: &[&str],
    ) -> ComposeResult<&mut Value> {
        let mut resource = json!({ "Type": kind, "Properties": properties });
        if !depends_on.is_empty() {
            resource["DependsOn"] = json!(depends_on);
        }
        match self.0.entry(logical_id.to_string()) {
            Entry::Vacant(slot) => Ok(slot.insert(resource)),
            Entry::Occupied(_) => Err(ComposeError::LogicalIdCollision(logical_id.to_string())),
        }
    }
}

/// Render the whole stack.
pub fn render(graph: &StackGraph) -> ComposeResult<Value> {
    let mut resources = Resources(Map::new());
    render_storage(graph, &mut resources)?;
    render_units(graph, &mut resources)?;
    render_secure_domain(graph, &mut resources)?;
    render_gateway(graph, &mut resources)?;

    Ok(json!({
        "AWSTemplateFormatVersion": TEMPLATE_VERSION,
        "Description": graph.description.clone().unwrap_or_else(|| graph.stack_id.clone()),
        "Metadata": { "StackId": graph.stack_id },
        "Resources": Value::Object(resources.0),
        "Outputs": outputs(&graph.gateway),
        "Assets": assets(graph),
    }))
}

/// Render as pretty-printed JSON.
pub fn render_string(graph: &StackGraph) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&render(graph)?)?)
}

fn render_storage(graph: &StackGraph, out: &mut Resources) -> ComposeResult<()> {
    let table = &graph.storage;
    let resource = out.add(
        &table.logical_id,
        "AWS::DynamoDB::Table",
        json!({
            "TableName": table.name,
            "KeySchema": [{ "AttributeName": table.partition_key.name, "KeyType": "HASH" }],
            "AttributeDefinitions": [{
                "AttributeName": table.partition_key.name,
                "AttributeType": table.partition_key.key_type.attribute_type(),
            }],
            "ProvisionedThroughput": { "ReadCapacityUnits": 5, "WriteCapacityUnits": 5 },
        }),
        &[],
    )?;
    resource["DeletionPolicy"] = json!("Delete");
    Ok(())
}

fn render_units(graph: &StackGraph, out: &mut Resources) -> ComposeResult<()> {
    for unit in &graph.units {
        let role = unit.role_logical_id();
        out.add(
            &role,
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" },
                        "Action": "sts:AssumeRole",
                    }],
                },
                "ManagedPolicyArns": [LAMBDA_BASIC_EXECUTION],
            }),
            &[],
        )?;
        out.add(
            &unit.logical_id,
            "AWS::Lambda::Function",
            json!({
                "FunctionName": unit.name,
                "Runtime": unit.runtime.id(),
                "Handler": unit.entry.to_string(),
                "Code": {
                    "S3Key": unit.code.object_key(),
                    "SourceAsset": unit.code.sha256,
                },
                "Role": get_att(&role, "Arn"),
                "Environment": { "Variables": unit.environment },
            }),
            &[&role, &graph.storage.logical_id],
        )?;
    }

    for grant in &graph.grants {
        let Some(unit) = graph.unit(grant.subject) else {
            continue;
        };
        let role = unit.role_logical_id();
        out.add(
            &grant.logical_id,
            "AWS::IAM::Policy",
            json!({
                "PolicyName": grant.logical_id,
                "Roles": [reference(&role)],
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": grant.mode.actions(),
                        "Resource": [get_att(&grant.object, "Arn")],
                    }],
                },
            }),
            &[&unit.logical_id, &grant.object],
        )?;
    }
    Ok(())
}

fn render_secure_domain(graph: &StackGraph, out: &mut Resources) -> ComposeResult<()> {
    if let Some(bucket) = &graph.bucket {
        out.add(
            &bucket.logical_id,
            "AWS::S3::Bucket",
            json!({ "BucketName": bucket.name }),
            &[],
        )?;
    }
    for trust in &graph.trust_objects {
        out.add(
            &trust.logical_id,
            "Custom::BucketDeployment",
            json!({
                "DestinationBucketName": reference(&trust.bucket),
                "DestinationKey": trust.uri.key,
                "SourceFile": trust.bundle.path.display().to_string(),
                "SourceSha256": trust.bundle.sha256,
            }),
            &[&trust.bucket],
        )?;
    }
    if let Some(domain) = &graph.domain {
        let resource = out.add(
            &domain.logical_id,
            "AWS::ApiGatewayV2::DomainName",
            json!({
                "DomainName": domain.name,
                "DomainNameConfigurations": [{
                    "CertificateArn": domain.certificate.arn(),
                    "EndpointType": "REGIONAL",
                    "SecurityPolicy": "TLS_1_2",
                }],
                "MutualTlsAuthentication": {
                    "TruststoreUri": domain.truststore.to_string(),
                },
            }),
            &[&domain.trust_object],
        )?;
        // Unversioned bucket: the fingerprint tracks truststore changes.
        resource["Metadata"] = json!({ "TruststoreSha256": domain.truststore_sha256 });
    }
    Ok(())
}

/// `arn:<partition>:execute-api:<region>:<account>:<api>/*/*`, so only this
/// gateway may invoke the unit.
fn execute_api_arn(gateway: &str) -> Value {
    json!({
        "Fn::Join": ["", [
            "arn:",
            reference("AWS::Partition"),
            ":execute-api:",
            reference("AWS::Region"),
            ":",
            reference("AWS::AccountId"),
            ":",
            reference(gateway),
            "/*/*",
        ]]
    })
}

fn render_gateway(graph: &StackGraph, out: &mut Resources) -> ComposeResult<()> {
    let gw = &graph.gateway;
    let api_depends: Vec<&str> = gw.mapping.iter().map(|m| m.domain.as_str()).collect();
    out.add(
        &gw.logical_id,
        "AWS::ApiGatewayV2::Api",
        json!({
            "Name": gw.name,
            "ProtocolType": "HTTP",
            "DisableExecuteApiEndpoint": !gw.default_endpoint_enabled(),
        }),
        &api_depends,
    )?;

    let stage = gw.stage_logical_id();
    out.add(
        &stage,
        "AWS::ApiGatewayV2::Stage",
        json!({ "ApiId": reference(&gw.logical_id), "StageName": "$default", "AutoDeploy": true }),
        &[&gw.logical_id],
    )?;

    if let Some(mapping) = &gw.mapping {
        out.add(
            &gw.mapping_logical_id(),
            "AWS::ApiGatewayV2::ApiMapping",
            json!({
                "ApiId": reference(&gw.logical_id),
                "DomainName": reference(&mapping.domain),
                "Stage": reference(&stage),
            }),
            &[&mapping.domain, &stage],
        )?;
    }

    for adapter in &gw.adapters {
        out.add(
            &adapter.logical_id,
            "AWS::ApiGatewayV2::Integration",
            json!({
                "ApiId": reference(&gw.logical_id),
                "IntegrationType": "AWS_PROXY",
                "IntegrationUri": get_att(&adapter.target, "Arn"),
                "PayloadFormatVersion": "2.0",
            }),
            &[&gw.logical_id, &adapter.target],
        )?;
        out.add(
            &adapter.permission_logical_id(),
            "AWS::Lambda::Permission",
            json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": get_att(&adapter.target, "Arn"),
                "Principal": "apigateway.amazonaws.com",
                "SourceArn": execute_api_arn(&gw.logical_id),
            }),
            &[&adapter.target],
        )?;
    }

    for route in &gw.routes {
        out.add(
            &route.logical_id,
            "AWS::ApiGatewayV2::Route",
            json!({
                "ApiId": reference(&gw.logical_id),
                "RouteKey": route.route_key(),
                "Target": { "Fn::Join": ["", ["integrations/", reference(&route.adapter.logical_id)]] },
            }),
            &[&gw.logical_id, &route.adapter.logical_id],
        )?;
    }
    Ok(())
}

fn outputs(gw: &Gateway) -> Value {
    let endpoint = match &gw.mapping {
        Some(mapping) => json!(format!("https://{}", mapping.name)),
        None => get_att(&gw.logical_id, "ApiEndpoint"),
    };
    json!({ "ApiEndpoint": { "Value": endpoint } })
}

fn assets(graph: &StackGraph) -> Value {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();
    for unit in &graph.units {
        if seen.insert(unit.code.sha256.clone()) {
            assets.push(json!({
                "Kind": "code",
                "Source": unit.code.path.display().to_string(),
                "Sha256": unit.code.sha256,
                "ObjectKey": unit.code.object_key(),
            }));
        }
    }
    for trust in &graph.trust_objects {
        assets.push(json!({
            "Kind": "trust-anchor",
            "Source": trust.bundle.path.display().to_string(),
            "Sha256": trust.bundle.sha256,
            "Destination": trust.uri.to_string(),
            "Certificates": trust.bundle.certificates,
        }));
    }
    Value::Array(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InMemoryResolver;
    use crate::stack::compose;
    use crudstack_core::StackConfig;

    fn resolver() -> InMemoryResolver {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["client".to_string()]).unwrap();
        InMemoryResolver::new()
            .with_file("functions/function.js", "single")
            .with_file("functions/getMethod.js", "g")
            .with_file("functions/putMethod.js", "p")
            .with_file("functions/deleteMethod.js", "d")
            .with_file("certs/mfjimene.com.cer", params.self_signed(&key).unwrap().pem())
    }

    #[test]
    fn single_handler_template() {
        let config = StackConfig::parse("[stack]\nid = \"PoCApiCrudStack\"\n").unwrap();
        let template = render(&compose(&config, &resolver()).unwrap()).unwrap();

        let fun = &template["Resources"]["HttpCrudTutorialFunction"];
        assert_eq!(fun["Type"], "AWS::Lambda::Function");
        assert_eq!(fun["Properties"]["Handler"], "function.handler");
        assert_eq!(fun["Properties"]["Runtime"], "nodejs12.x");
        assert_eq!(
            fun["Properties"]["Environment"]["Variables"]["HELLO_TABLE_NAME"],
            "http-crud-tutorial-items"
        );

        let api = &template["Resources"]["HttpApi"];
        assert_eq!(api["Properties"]["DisableExecuteApiEndpoint"], false);
        assert!(template["Resources"].get("HttpApiApiMapping").is_none());
        assert_eq!(template["Outputs"]["ApiEndpoint"]["Value"]["Fn::GetAtt"][0], "HttpApi");
        assert_eq!(template["Assets"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn route_keys_are_exact() {
        let config = StackConfig::parse(
            "[stack]\nid = \"PoCApiCrudStack\"\n[features]\nsplit_handlers = true\n",
        )
        .unwrap();
        let template = render(&compose(&config, &resolver()).unwrap()).unwrap();
        let resources = template["Resources"].as_object().unwrap();

        let mut keys: Vec<&str> = resources
            .values()
            .filter(|r| r["Type"] == "AWS::ApiGatewayV2::Route")
            .map(|r| r["Properties"]["RouteKey"].as_str().unwrap())
            .collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["DELETE /items/{id}", "GET /items", "GET /items/{id}", "PUT /items"]
        );

        let policy = &resources["HttpGetDynamoFunctionPolicy"];
        let actions = policy["Properties"]["PolicyDocument"]["Statement"][0]["Action"]
            .as_array()
            .unwrap();
        assert!(actions.iter().any(|a| a == "dynamodb:PutItem"));
        assert!(actions.iter().any(|a| a == "dynamodb:GetItem"));

        let permission = &resources["HttpGetDynamoFunctionIntegrationPermission"]["Properties"];
        let parts = permission["SourceArn"]["Fn::Join"][1].as_array().unwrap();
        assert!(parts.contains(&json!({ "Ref": "HttpApi" })));
        assert_eq!(parts.last().unwrap(), "/*/*");
    }

    #[test]
    fn existing_id_is_never_overwritten() {
        let config = StackConfig::parse(
            "[stack]\nid = \"PoCApiCrudStack\"\n[features]\nsplit_handlers = true\n",
        )
        .unwrap();
        let mut graph = compose(&config, &resolver()).unwrap();
        graph.units[1].logical_id = graph.units[0].role_logical_id();

        let err = render(&graph).unwrap_err();
        assert!(matches!(err, ComposeError::LogicalIdCollision(id) if id == "HttpGetDynamoFunctionServiceRole"));
    }

    #[test]
    fn secure_domain_template() {
        let config = StackConfig::parse(
            r#"
[stack]
id = "PoCApiCrudStack"

[features]
split_handlers = true
secure_domain = true

[domain]
name = "api.mfjimene.com"
certificate = "arn:aws:acm:eu-west-1:123456789012:certificate/0b1c2d3e-aaaa-bbbb-cccc-1234567890ab"
"#,
        )
        .unwrap();
        let template = render(&compose(&config, &resolver()).unwrap()).unwrap();
        let resources = &template["Resources"];

        assert_eq!(resources["HttpApi"]["Properties"]["DisableExecuteApiEndpoint"], true);
        assert_eq!(resources["HttpApi"]["DependsOn"][0], "ApiMfjimeneCom");
        assert_eq!(
            resources["ApiMfjimeneCom"]["Properties"]["MutualTlsAuthentication"]["TruststoreUri"],
            "s3://bcol-cert-bucket-pocapirud/mfjimene.com.cer"
        );
        assert_eq!(resources["ApiMfjimeneCom"]["DependsOn"][0], "DeployMfjimeneComCer");
        let mtls = resources["ApiMfjimeneCom"]["Properties"]["MutualTlsAuthentication"]
            .as_object()
            .unwrap();
        assert_eq!(mtls.len(), 1);
        assert!(!mtls.contains_key("TruststoreVersion"));
        assert_eq!(
            resources["ApiMfjimeneCom"]["Metadata"]["TruststoreSha256"].as_str().unwrap().len(),
            64
        );
        assert_eq!(resources["BcolCertBucketPocapirud"]["Type"], "AWS::S3::Bucket");
        assert_eq!(resources["HttpApiApiMapping"]["Properties"]["DomainName"]["Ref"], "ApiMfjimeneCom");
        assert_eq!(template["Outputs"]["ApiEndpoint"]["Value"], "https://api.mfjimene.com");
    }
}
