//! stack.toml configuration parser.
//!
//! One configurable stack covers the three variants: a single handler, split
//! get/put/delete handlers, and split handlers behind an mTLS custom domain.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{HandlerRole, HttpMethod, PartitionKey};

pub const DEFAULT_STACK_ID: &str = "PoCApiCrudStack";
pub const DEFAULT_TABLE_NAME: &str = "http-crud-tutorial-items";
pub const DEFAULT_CODE_ASSET: &str = "functions";
pub const DEFAULT_RUNTIME: &str = "nodejs12.x";
pub const DEFAULT_GATEWAY_NAME: &str = "HttpApi";
pub const DEFAULT_TRUST_BUCKET: &str = "bcol-cert-bucket-pocapirud";
pub const DEFAULT_TRUST_KEY: &str = "mfjimene.com.cer";
pub const DEFAULT_TRUST_ARTIFACT: &str = "certs/mfjimene.com.cer";

pub const COLLECTION_PATH: &str = "/items";
pub const ITEM_PATH: &str = "/items/{id}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub stack: StackSection,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub code: CodeConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub domain: Option<DomainConfig>,
    /// Directory relative artifact paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSection {
    pub id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub split_handlers: bool,
    #[serde(default)]
    pub secure_domain: bool,
    /// Narrow each split handler's grant to the access its verb needs.
    #[serde(default)]
    pub scoped_grants: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub partition_key: PartitionKey,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            name: DEFAULT_TABLE_NAME.to_string(),
            partition_key: PartitionKey::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    pub asset: String,
    pub runtime: String,
}

impl Default for CodeConfig {
    fn default() -> Self {
        CodeConfig {
            asset: DEFAULT_CODE_ASSET.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
        }
    }
}

/// Per-role overrides; unset fields fall back to the role's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlersConfig {
    pub single: Option<HandlerOverride>,
    pub get: Option<HandlerOverride>,
    pub put: Option<HandlerOverride>,
    pub delete: Option<HandlerOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerOverride {
    pub name: Option<String>,
    pub entry: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            name: DEFAULT_GATEWAY_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub certificate: String,
    #[serde(default = "default_trust_bucket")]
    pub trust_bucket: String,
    #[serde(default = "default_trust_artifact")]
    pub trust_artifact: String,
    #[serde(default = "default_trust_key")]
    pub trust_key: String,
}

fn default_trust_bucket() -> String {
    DEFAULT_TRUST_BUCKET.to_string()
}

fn default_trust_artifact() -> String {
    DEFAULT_TRUST_ARTIFACT.to_string()
}

fn default_trust_key() -> String {
    DEFAULT_TRUST_KEY.to_string()
}

/// A handler to declare, after defaults and overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDecl {
    pub role: HandlerRole,
    pub name: String,
    pub entry: String,
}

/// A route to bind to the handler serving `role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecl {
    pub method: HttpMethod,
    pub path: String,
    pub role: HandlerRole,
}

impl HandlersConfig {
    fn get_override(&self, role: HandlerRole) -> Option<&HandlerOverride> {
        match role {
            HandlerRole::Single => self.single.as_ref(),
            HandlerRole::Get => self.get.as_ref(),
            HandlerRole::Put => self.put.as_ref(),
            HandlerRole::Delete => self.delete.as_ref(),
        }
    }
}

fn default_handler(role: HandlerRole) -> (&'static str, &'static str) {
    match role {
        HandlerRole::Single => ("http-crud-tutorial-function", "function.handler"),
        HandlerRole::Get => ("http-get-dynamo-function", "getMethod.handler"),
        HandlerRole::Put => ("http-put-dynamo-function", "putMethod.handler"),
        HandlerRole::Delete => ("http-delete-dynamo-function", "deleteMethod.handler"),
    }
}

impl StackConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: StackConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.features.secure_domain && self.domain.is_none() {
            bail!("features.secure_domain is enabled but no [domain] section is configured");
        }
        Ok(())
    }

    /// The domain section, only when the secure domain feature is on.
    pub fn secure_domain(&self) -> Option<&DomainConfig> {
        if self.features.secure_domain {
            self.domain.as_ref()
        } else {
            None
        }
    }

    pub fn handler_roles(&self) -> &'static [HandlerRole] {
        if self.features.split_handlers {
            &[HandlerRole::Get, HandlerRole::Put, HandlerRole::Delete]
        } else {
            &[HandlerRole::Single]
        }
    }

    /// Handlers for the enabled variant, in declaration order.
    pub fn handler_decls(&self) -> Vec<HandlerDecl> {
        self.handler_roles()
            .iter()
            .map(|&role| {
                let (name, entry) = default_handler(role);
                let over = self.handlers.get_override(role);
                HandlerDecl {
                    role,
                    name: over
                        .and_then(|o| o.name.clone())
                        .unwrap_or_else(|| name.to_string()),
                    entry: over
                        .and_then(|o| o.entry.clone())
                        .unwrap_or_else(|| entry.to_string()),
                }
            })
            .collect()
    }

    /// The CRUD HTTP surface, bound to the roles of the enabled variant.
    pub fn route_decls(&self) -> Vec<RouteDecl> {
        let split = self.features.split_handlers;
        let role = |r: HandlerRole| if split { r } else { HandlerRole::Single };
        let decl = |method, path: &str, r| RouteDecl {
            method,
            path: path.to_string(),
            role: role(r),
        };
        vec![
            decl(HttpMethod::Get, COLLECTION_PATH, HandlerRole::Get),
            decl(HttpMethod::Get, ITEM_PATH, HandlerRole::Get),
            decl(HttpMethod::Put, COLLECTION_PATH, HandlerRole::Put),
            decl(HttpMethod::Delete, ITEM_PATH, HandlerRole::Delete),
        ]
    }

    /// Scaffold a stack.toml for one of the three variants.
    pub fn scaffold(split_handlers: bool, secure_domain: bool) -> Self {
        let split_handlers = split_handlers || secure_domain;
        StackConfig {
            stack: StackSection {
                id: DEFAULT_STACK_ID.to_string(),
                description: None,
            },
            features: FeaturesConfig {
                split_handlers,
                secure_domain,
                scoped_grants: false,
            },
            table: TableConfig::default(),
            code: CodeConfig::default(),
            handlers: HandlersConfig::default(),
            gateway: GatewayConfig::default(),
            domain: secure_domain.then(|| DomainConfig {
                name: "api.example.com".to_string(),
                certificate: "arn:aws:acm:us-east-1:123456789012:certificate/00000000-0000-0000-0000-000000000000"
                    .to_string(),
                trust_bucket: default_trust_bucket(),
                trust_artifact: default_trust_artifact(),
                trust_key: default_trust_key(),
            }),
            base_dir: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = StackConfig::scaffold(true, true);
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("PoCApiCrudStack"));
        assert!(toml_str.contains("mfjimene.com.cer"));

        let reparsed = StackConfig::parse(&toml_str).unwrap();
        assert!(reparsed.features.secure_domain);
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[stack]
id = "test"
"#;
        let config = StackConfig::parse(toml_str).unwrap();
        assert_eq!(config.stack.id, "test");
        assert_eq!(config.table.name, DEFAULT_TABLE_NAME);
        assert_eq!(config.code.runtime, DEFAULT_RUNTIME);

        let handlers = config.handler_decls();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].entry, "function.handler");
        assert!(config.route_decls().iter().all(|r| r.role == HandlerRole::Single));
    }

    #[test]
    fn test_split_handlers_with_override() {
        let toml_str = r#"
[stack]
id = "test"

[features]
split_handlers = true

[handlers.put]
name = "items-writer"
"#;
        let config = StackConfig::parse(toml_str).unwrap();
        let handlers = config.handler_decls();
        let names: Vec<&str> = handlers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["http-get-dynamo-function", "items-writer", "http-delete-dynamo-function"]
        );
        assert_eq!(handlers[1].entry, "putMethod.handler");

        let routes = config.route_decls();
        assert_eq!(routes[3].method, HttpMethod::Delete);
        assert_eq!(routes[3].path, ITEM_PATH);
        assert_eq!(routes[3].role, HandlerRole::Delete);
    }

    #[test]
    fn test_secure_domain_requires_domain_section() {
        let toml_str = r#"
[stack]
id = "test"

[features]
split_handlers = true
secure_domain = true
"#;
        let err = StackConfig::parse(toml_str).unwrap_err();
        assert!(err.to_string().contains("[domain]"));
    }

    #[test]
    fn test_domain_ignored_when_feature_off() {
        let toml_str = r#"
[stack]
id = "test"

[domain]
name = "api.example.com"
certificate = "arn:aws:acm:us-east-1:123456789012:certificate/abc"
"#;
        let config = StackConfig::parse(toml_str).unwrap();
        assert!(config.domain.is_some());
        assert!(config.secure_domain().is_none());
    }

    #[test]
    fn test_from_file_records_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.toml");
        std::fs::write(&path, "[stack]\nid = \"t\"\n").unwrap();
        let config = StackConfig::from_file(&path).unwrap();
        assert_eq!(config.base_dir, dir.path());
    }
}
