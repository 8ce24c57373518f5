//! Stack assembly. Drives the composers in dependency order.

use std::path::PathBuf;

use crudstack_core::config::DomainConfig;
use crudstack_core::names::{self, logical_id};
use crudstack_core::{
    AccessMode, AssetSource, ComposeError, ComposeResult, HandlerRole, HttpMethod, PartitionKey,
    Runtime, StackConfig,
};
use tracing::info;

use crate::assets::ArtifactResolver;
use crate::domain::{DomainSpec, SecureDomainConfigurator};
use crate::graph::StackGraph;
use crate::resources::{HandlerSpec, ResourceComposer, UnitId};
use crate::routes::{DomainMapping, Gateway, RouteBinder};

struct GatewayDecl {
    logical_id: String,
    name: String,
    mapping: Option<DomainMapping>,
    binder: RouteBinder,
}

/// Builds one stack. Declarations must follow dependency order; anything
/// declared after the step that consumes it fails with `OutOfOrder`.
pub struct StackBuilder<'r> {
    stack_id: String,
    description: Option<String>,
    resources: ResourceComposer<'r>,
    secure: SecureDomainConfigurator<'r>,
    gateway: Option<GatewayDecl>,
}

impl std::fmt::Debug for StackBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackBuilder")
            .field("stack_id", &self.stack_id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<'r> StackBuilder<'r> {
    pub fn new(stack_id: &str, resolver: &'r dyn ArtifactResolver) -> ComposeResult<Self> {
        names::validate_stack_id(stack_id)?;
        Ok(Self {
            stack_id: stack_id.to_string(),
            description: None,
            resources: ResourceComposer::new(resolver),
            secure: SecureDomainConfigurator::new(resolver),
            gateway: None,
        })
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    fn before_gateway(&self, step: &'static str) -> ComposeResult<()> {
        if self.gateway.is_some() {
            return Err(ComposeError::OutOfOrder {
                step,
                before: "the gateway",
            });
        }
        Ok(())
    }

    pub fn storage(&mut self, name: &str, partition_key: PartitionKey) -> ComposeResult<&mut Self> {
        self.before_gateway("the storage resource")?;
        self.resources.declare_storage(name, partition_key)?;
        Ok(self)
    }

    pub fn compute_unit(&mut self, spec: &HandlerSpec) -> ComposeResult<UnitId> {
        self.before_gateway("a compute unit")?;
        self.resources.declare_unit(spec)
    }

    pub fn grant(&mut self, unit: UnitId, mode: AccessMode) -> ComposeResult<&mut Self> {
        self.before_gateway("a grant")?;
        self.resources.grant(unit, mode)?;
        Ok(self)
    }

    pub fn trust_bucket(&mut self, name: &str) -> ComposeResult<&mut Self> {
        self.before_gateway("the trust bucket")?;
        self.secure.create_bucket(name)?;
        Ok(self)
    }

    pub fn stage_trust_object(&mut self, artifact: &std::path::Path, key: &str) -> ComposeResult<&mut Self> {
        self.before_gateway("a trust object")?;
        self.secure.stage_trust_object(artifact, key)?;
        Ok(self)
    }

    pub fn secure_domain(&mut self, spec: &DomainSpec) -> ComposeResult<&mut Self> {
        self.before_gateway("the secure domain")?;
        self.secure.bind_domain(spec)?;
        Ok(self)
    }

    /// Assemble the gateway. When a secure domain is bound, the gateway's
    /// default traffic maps to it and the provider endpoint is disabled.
    pub fn gateway(&mut self, name: &str) -> ComposeResult<&mut Self> {
        if let Some(existing) = &self.gateway {
            return Err(ComposeError::GatewayAlreadyAssembled(existing.name.clone()));
        }
        let logical = logical_id(name);
        if logical.is_empty() {
            return Err(ComposeError::InvalidName {
                kind: "gateway",
                name: name.to_string(),
                reason: "must contain alphanumerics",
            });
        }
        let mapping = self.secure.domain().map(|d| DomainMapping {
            domain: d.logical_id.clone(),
            name: d.name.clone(),
        });
        self.gateway = Some(GatewayDecl {
            binder: RouteBinder::new(&logical),
            logical_id: logical,
            name: name.to_string(),
            mapping,
        });
        Ok(self)
    }

    pub fn route(&mut self, method: HttpMethod, path: &str, unit: UnitId) -> ComposeResult<&mut Self> {
        let gateway = self.gateway.as_mut().ok_or(ComposeError::GatewayNotAssembled)?;
        let unit = self
            .resources
            .unit(unit)
            .ok_or_else(|| ComposeError::UnknownComputeUnit(format!("#{}", unit.index())))?;
        gateway.binder.bind(method, path, unit)?;
        Ok(self)
    }

    pub fn build(self) -> ComposeResult<StackGraph> {
        let decl = self.gateway.ok_or(ComposeError::GatewayNotAssembled)?;
        let (storage, units, grants) = self.resources.finish()?;
        let (bucket, trust_objects, domain) = self.secure.into_parts();
        let (adapters, routes) = decl.binder.into_parts();

        let graph = StackGraph {
            stack_id: self.stack_id,
            description: self.description,
            storage,
            units,
            grants,
            bucket,
            trust_objects,
            domain,
            gateway: Gateway {
                logical_id: decl.logical_id,
                name: decl.name,
                mapping: decl.mapping,
                adapters,
                routes,
            },
        };
        graph.check_logical_ids()?;
        info!(
            stack = %graph.stack_id,
            units = graph.units.len(),
            routes = graph.gateway.routes.len(),
            secure_domain = graph.domain.is_some(),
            "composed stack"
        );
        Ok(graph)
    }
}

fn local_artifact(config: &StackConfig, uri: &str) -> ComposeResult<PathBuf> {
    let source = AssetSource::parse(uri)?.relative_to(&config.base_dir);
    Ok(source.local_path()?.to_path_buf())
}

fn grant_mode(config: &StackConfig, role: HandlerRole) -> AccessMode {
    if config.features.scoped_grants {
        role.scoped_access()
    } else {
        AccessMode::ReadWrite
    }
}

fn declare_secure_domain(
    builder: &mut StackBuilder<'_>,
    config: &StackConfig,
    domain: &DomainConfig,
) -> ComposeResult<()> {
    let artifact = local_artifact(config, &domain.trust_artifact)?;
    builder
        .trust_bucket(&domain.trust_bucket)?
        .stage_trust_object(&artifact, &domain.trust_key)?
        .secure_domain(&DomainSpec {
            name: domain.name.clone(),
            certificate: domain.certificate.clone(),
            trust_key: domain.trust_key.clone(),
        })?;
    Ok(())
}

/// Compose the stack described by `config`.
pub fn compose(config: &StackConfig, resolver: &dyn ArtifactResolver) -> ComposeResult<StackGraph> {
    let mut builder =
        StackBuilder::new(&config.stack.id, resolver)?.description(config.stack.description.clone());
    builder.storage(&config.table.name, config.table.partition_key.clone())?;

    let runtime = Runtime::parse(&config.code.runtime)?;
    let code = local_artifact(config, &config.code.asset)?;

    let mut by_role = Vec::new();
    for decl in config.handler_decls() {
        let unit = builder.compute_unit(&HandlerSpec {
            name: decl.name,
            entry: decl.entry,
            runtime: runtime.clone(),
            code: code.clone(),
        })?;
        by_role.push((decl.role, unit));
    }
    for &(role, unit) in &by_role {
        builder.grant(unit, grant_mode(config, role))?;
    }

    if let Some(domain) = config.secure_domain() {
        declare_secure_domain(&mut builder, config, domain)?;
    }

    builder.gateway(&config.gateway.name)?;
    for route in config.route_decls() {
        let unit = by_role
            .iter()
            .find_map(|&(role, unit)| (role == route.role).then_some(unit))
            .ok_or_else(|| ComposeError::UnknownComputeUnit(format!("{:?}", route.role)))?;
        builder.route(route.method, &route.path, unit)?;
    }

    builder.build()
}
