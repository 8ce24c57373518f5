//! The composed stack and its dependency graph.
//!
//! Every declaration becomes a node keyed by its logical ID, with edges to
//! the declarations it consumes. The provisioning engine walks these edges;
//! [`StackGraph::dependency_order`] produces one valid walk.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crudstack_core::{ComposeError, ComposeResult};

use crate::domain::{ObjectStoreBucket, SecureDomain, TrustObject};
use crate::resources::{ComputeUnit, Grant, StorageResource, UnitId};
use crate::routes::Gateway;

#[derive(Debug, Clone)]
pub struct StackGraph {
    pub stack_id: String,
    pub description: Option<String>,
    pub storage: StorageResource,
    pub units: Vec<ComputeUnit>,
    pub grants: Vec<Grant>,
    pub bucket: Option<ObjectStoreBucket>,
    pub trust_objects: Vec<TrustObject>,
    pub domain: Option<SecureDomain>,
    pub gateway: Gateway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Storage,
    ComputeUnit,
    Grant,
    Bucket,
    TrustObject,
    SecureDomain,
    Gateway,
    IntegrationAdapter,
    Route,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Storage => "storage",
            NodeKind::ComputeUnit => "compute-unit",
            NodeKind::Grant => "grant",
            NodeKind::Bucket => "bucket",
            NodeKind::TrustObject => "trust-object",
            NodeKind::SecureDomain => "secure-domain",
            NodeKind::Gateway => "gateway",
            NodeKind::IntegrationAdapter => "integration",
            NodeKind::Route => "route",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackNode {
    pub logical_id: String,
    pub kind: NodeKind,
    pub depends_on: Vec<String>,
}

fn node(logical_id: &str, kind: NodeKind, depends_on: Vec<String>) -> StackNode {
    StackNode {
        logical_id: logical_id.to_string(),
        kind,
        depends_on,
    }
}

impl StackGraph {
    pub fn unit(&self, id: UnitId) -> Option<&ComputeUnit> {
        self.units.get(id.index())
    }

    /// All declarations in insertion order, with their dependency edges.
    pub fn nodes(&self) -> Vec<StackNode> {
        let mut nodes = vec![node(&self.storage.logical_id, NodeKind::Storage, vec![])];

        for unit in &self.units {
            nodes.push(node(
                &unit.logical_id,
                NodeKind::ComputeUnit,
                vec![self.storage.logical_id.clone()],
            ));
        }
        for grant in &self.grants {
            let subject = self
                .unit(grant.subject)
                .map(|u| u.logical_id.clone())
                .unwrap_or_default();
            nodes.push(node(
                &grant.logical_id,
                NodeKind::Grant,
                vec![subject, grant.object.clone()],
            ));
        }
        if let Some(bucket) = &self.bucket {
            nodes.push(node(&bucket.logical_id, NodeKind::Bucket, vec![]));
        }
        for trust in &self.trust_objects {
            nodes.push(node(&trust.logical_id, NodeKind::TrustObject, vec![trust.bucket.clone()]));
        }
        if let Some(domain) = &self.domain {
            nodes.push(node(
                &domain.logical_id,
                NodeKind::SecureDomain,
                vec![domain.trust_object.clone()],
            ));
        }

        let gateway_deps = self
            .gateway
            .mapping
            .iter()
            .map(|m| m.domain.clone())
            .collect();
        nodes.push(node(&self.gateway.logical_id, NodeKind::Gateway, gateway_deps));

        for adapter in &self.gateway.adapters {
            nodes.push(node(
                &adapter.logical_id,
                NodeKind::IntegrationAdapter,
                vec![self.gateway.logical_id.clone(), adapter.target.clone()],
            ));
        }
        for route in &self.gateway.routes {
            nodes.push(node(
                &route.logical_id,
                NodeKind::Route,
                vec![self.gateway.logical_id.clone(), route.adapter.logical_id.clone()],
            ));
        }
        nodes
    }

    /// IDs of the resources a declaration brings along when rendered:
    /// execution roles, the default stage, the domain mapping, and invoke
    /// permissions.
    pub fn derived_logical_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.units.iter().map(|u| u.role_logical_id()).collect();
        ids.push(self.gateway.stage_logical_id());
        if self.gateway.mapping.is_some() {
            ids.push(self.gateway.mapping_logical_id());
        }
        ids.extend(self.gateway.adapters.iter().map(|a| a.permission_logical_id()));
        ids
    }

    /// Logical IDs must be unique across every declaration and every
    /// derived resource.
    pub(crate) fn check_logical_ids(&self) -> ComposeResult<()> {
        let mut seen = HashSet::new();
        let ids = self
            .nodes()
            .into_iter()
            .map(|n| n.logical_id)
            .chain(self.derived_logical_ids());
        for id in ids {
            if !seen.insert(id.clone()) {
                return Err(ComposeError::LogicalIdCollision(id));
            }
        }
        Ok(())
    }

    /// Nodes in a topological order. Ties break by insertion order, so the
    /// result is deterministic and matches declaration order whenever that
    /// order is already valid.
    pub fn dependency_order(&self) -> ComposeResult<Vec<StackNode>> {
        let nodes = self.nodes();
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.logical_id.as_str(), i))
            .collect();

        let mut indegree = vec![0usize; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, n) in nodes.iter().enumerate() {
            for dep in &n.depends_on {
                let &d = index.get(dep.as_str()).ok_or_else(|| ComposeError::UnknownDependency {
                    node: n.logical_id.clone(),
                    dependency: dep.clone(),
                })?;
                indegree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &dependents[i] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != nodes.len() {
            let stuck = indegree
                .iter()
                .position(|&deg| deg > 0)
                .map(|i| nodes[i].logical_id.clone())
                .unwrap_or_default();
            return Err(ComposeError::DependencyCycle(stuck));
        }

        let mut slots: Vec<Option<StackNode>> = nodes.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }
}
