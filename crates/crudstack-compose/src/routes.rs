//! Route binding: maps (method, path) pairs to compute units.
//!
//! Each route reaches its unit through an integration adapter. Adapters are
//! cached per unit: the first route targeting a unit mints the adapter and
//! every later route targeting it gets the same `Arc`. A fresh adapter
//! object would be seen by the provisioning engine as a replacement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crudstack_core::names::logical_id;
use crudstack_core::{ComposeError, ComposeResult, HttpMethod, PathPattern};
use tracing::debug;

use crate::resources::{ComputeUnit, UnitId};

/// The stable reference a route invokes its compute unit through.
#[derive(Debug, PartialEq, Eq)]
pub struct IntegrationAdapter {
    pub logical_id: String,
    pub unit: UnitId,
    /// Logical ID of the target unit.
    pub target: String,
}

impl IntegrationAdapter {
    /// Logical ID of the invoke permission the adapter needs on its unit.
    pub fn permission_logical_id(&self) -> String {
        format!("{}Permission", self.logical_id)
    }
}

/// One adapter per compute unit, created lazily on first use.
#[derive(Debug, Default)]
pub struct AdapterCache {
    by_unit: HashMap<UnitId, Arc<IntegrationAdapter>>,
    created: Vec<Arc<IntegrationAdapter>>,
}

impl AdapterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the adapter for `unit`, minting it on first request.
    pub fn get_or_create(&mut self, unit: &ComputeUnit) -> Arc<IntegrationAdapter> {
        if let Some(adapter) = self.by_unit.get(&unit.id) {
            return Arc::clone(adapter);
        }
        let adapter = Arc::new(IntegrationAdapter {
            logical_id: format!("{}Integration", unit.logical_id),
            unit: unit.id,
            target: unit.logical_id.clone(),
        });
        debug!(unit = %unit.name, adapter = %adapter.logical_id, "created integration adapter");
        self.by_unit.insert(unit.id, Arc::clone(&adapter));
        self.created.push(Arc::clone(&adapter));
        adapter
    }

    pub fn get(&self, unit: UnitId) -> Option<&Arc<IntegrationAdapter>> {
        self.by_unit.get(&unit)
    }

    /// Adapters in creation order.
    pub fn adapters(&self) -> &[Arc<IntegrationAdapter>] {
        &self.created
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub logical_id: String,
    pub method: HttpMethod,
    pub path: PathPattern,
    pub adapter: Arc<IntegrationAdapter>,
}

impl Route {
    /// `"GET /items/{id}"`.
    pub fn route_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn target(&self) -> UnitId {
        self.adapter.unit
    }
}

/// Collects route declarations for one gateway.
#[derive(Debug)]
pub struct RouteBinder {
    gateway: String,
    adapters: AdapterCache,
    routes: Vec<Route>,
    keys: HashSet<(HttpMethod, String)>,
    ids: HashSet<String>,
}

impl RouteBinder {
    /// `gateway` is the logical ID of the gateway the routes belong to.
    pub fn new(gateway: &str) -> Self {
        Self {
            gateway: gateway.to_string(),
            adapters: AdapterCache::new(),
            routes: Vec::new(),
            keys: HashSet::new(),
            ids: HashSet::new(),
        }
    }

    /// Bind `method path` to `unit`. Each (method, path) pair binds once.
    pub fn bind(&mut self, method: HttpMethod, path: &str, unit: &ComputeUnit) -> ComposeResult<&Route> {
        let path = PathPattern::parse(path)?;
        if !self.keys.insert((method, path.as_str().to_string())) {
            return Err(ComposeError::DuplicateRoute {
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        let adapter = self.adapters.get_or_create(unit);
        let logical = self.route_logical_id(method, &path);
        debug!(route = %format!("{method} {path}"), unit = %unit.name, "bound route");
        self.routes.push(Route {
            logical_id: logical,
            method,
            path,
            adapter,
        });
        Ok(&self.routes[self.routes.len() - 1])
    }

    fn route_logical_id(&mut self, method: HttpMethod, path: &PathPattern) -> String {
        let mut path_part = logical_id(path.as_str());
        if path_part.is_empty() {
            path_part = "Root".to_string();
        }
        let base = format!(
            "{}Route{}{}",
            self.gateway,
            logical_id(&method.as_str().to_ascii_lowercase()),
            path_part
        );
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.ids.insert(candidate.clone()) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        candidate
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn adapters(&self) -> &AdapterCache {
        &self.adapters
    }

    pub fn into_parts(self) -> (Vec<Arc<IntegrationAdapter>>, Vec<Route>) {
        (self.adapters.created, self.routes)
    }
}

/// Custom domain the gateway's default traffic is mapped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMapping {
    /// Logical ID of the secure domain.
    pub domain: String,
    pub name: String,
}

/// The HTTP routing layer: one endpoint aggregating every route.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub logical_id: String,
    pub name: String,
    pub mapping: Option<DomainMapping>,
    pub adapters: Vec<Arc<IntegrationAdapter>>,
    pub routes: Vec<Route>,
}

impl Gateway {
    /// The provider's own endpoint is reachable only when no custom domain
    /// is mapped.
    pub fn default_endpoint_enabled(&self) -> bool {
        self.mapping.is_none()
    }

    pub fn stage_logical_id(&self) -> String {
        format!("{}DefaultStage", self.logical_id)
    }

    pub fn mapping_logical_id(&self) -> String {
        format!("{}ApiMapping", self.logical_id)
    }

    /// Human-readable entry point of the stack.
    pub fn endpoint(&self) -> String {
        match &self.mapping {
            Some(mapping) => format!("https://{}", mapping.name),
            None => format!("https://<{}>.execute-api", self.name),
        }
    }

    pub fn route(&self, method: HttpMethod, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.method == method && r.path.as_str() == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InMemoryResolver;
    use crate::resources::{HandlerSpec, ResourceComposer};
    use crudstack_core::{PartitionKey, Runtime};

    /// Units named `names`, declared in order against one table.
    fn units(names: &[&str]) -> Vec<ComputeUnit> {
        let resolver = InMemoryResolver::new().with_file("functions/function.js", "x");
        let mut composer = ResourceComposer::new(&resolver);
        composer.declare_storage("items", PartitionKey::default()).unwrap();
        for name in names {
            composer
                .declare_unit(&HandlerSpec {
                    name: name.to_string(),
                    entry: "function.handler".to_string(),
                    runtime: Runtime::parse("nodejs12.x").unwrap(),
                    code: "functions".into(),
                })
                .unwrap();
        }
        composer.units().to_vec()
    }

    #[test]
    fn routes_to_same_unit_share_adapter() {
        let units = units(&["items-get"]);
        let get = &units[0];
        let mut binder = RouteBinder::new("HttpApi");

        let a = Arc::clone(&binder.bind(HttpMethod::Get, "/items", get).unwrap().adapter);
        let b = Arc::clone(&binder.bind(HttpMethod::Get, "/items/{id}", get).unwrap().adapter);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(binder.adapters().len(), 1);
    }

    #[test]
    fn distinct_units_get_distinct_adapters() {
        let units = units(&["items-get", "items-put"]);
        let (get, put) = (&units[0], &units[1]);
        let mut binder = RouteBinder::new("HttpApi");
        binder.bind(HttpMethod::Get, "/items", get).unwrap();
        binder.bind(HttpMethod::Put, "/items", put).unwrap();

        let routes = binder.routes();
        assert!(!Arc::ptr_eq(&routes[0].adapter, &routes[1].adapter));
        assert_eq!(routes[1].adapter.logical_id, "ItemsPutIntegration");
        assert_eq!(binder.adapters().len(), 2);
    }

    #[test]
    fn duplicate_pair_fails() {
        let units = units(&["items-get", "items-put"]);
        let (get, put) = (&units[0], &units[1]);
        let mut binder = RouteBinder::new("HttpApi");
        binder.bind(HttpMethod::Get, "/items", get).unwrap();

        let err = binder.bind(HttpMethod::Get, "/items", put).unwrap_err();
        assert!(matches!(err, ComposeError::DuplicateRoute { .. }));
        assert_eq!(binder.routes().len(), 1);
    }

    #[test]
    fn same_path_different_method_is_allowed() {
        let units = units(&["items-get"]);
        let get = &units[0];
        let mut binder = RouteBinder::new("HttpApi");
        binder.bind(HttpMethod::Get, "/items/{id}", get).unwrap();
        binder.bind(HttpMethod::Delete, "/items/{id}", get).unwrap();
        assert_eq!(binder.routes()[1].route_key(), "DELETE /items/{id}");
        assert_eq!(binder.routes()[0].logical_id, "HttpApiRouteGetItemsId");
    }

    #[test]
    fn colliding_logical_ids_are_suffixed() {
        let units = units(&["items-get"]);
        let get = &units[0];
        let mut binder = RouteBinder::new("HttpApi");
        binder.bind(HttpMethod::Get, "/items/{id}", get).unwrap();
        binder.bind(HttpMethod::Get, "/items-id", get).unwrap();
        assert_eq!(binder.routes()[1].logical_id, "HttpApiRouteGetItemsId2");
    }

    #[test]
    fn invalid_path_rejected() {
        let units = units(&["items-get"]);
        let get = &units[0];
        let mut binder = RouteBinder::new("HttpApi");
        assert!(binder.bind(HttpMethod::Get, "items", get).is_err());
        assert!(binder.routes().is_empty());
    }
}
