//! Resource & grant composition.
//!
//! Exactly one storage resource per stack. Every compute unit is built with
//! that resource injected: its table-name binding is set from the resource
//! at construction time, never looked up later. Grants are edges from a unit
//! to the resource and are idempotent per unit.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crudstack_core::names::{self, logical_id};
use crudstack_core::{
    AccessMode, ComposeError, ComposeResult, EntryPoint, PartitionKey, Runtime, TABLE_NAME_ENV,
};
use tracing::debug;

use crate::assets::{ArtifactResolver, CodeAsset};

/// Index of a compute unit within one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(usize);

impl UnitId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The stack's single key-value table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageResource {
    pub logical_id: String,
    pub name: String,
    pub partition_key: PartitionKey,
}

/// What a caller declares for one handler.
#[derive(Debug, Clone)]
pub struct HandlerSpec {
    pub name: String,
    /// `<module>.<function>` inside the code asset.
    pub entry: String,
    pub runtime: Runtime,
    /// Directory holding the packaged handler code.
    pub code: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeUnit {
    pub id: UnitId,
    pub logical_id: String,
    pub name: String,
    pub runtime: Runtime,
    pub entry: EntryPoint,
    pub code: CodeAsset,
    pub environment: BTreeMap<String, String>,
}

impl ComputeUnit {
    /// Table name the unit was bound to.
    pub fn table_binding(&self) -> Option<&str> {
        self.environment.get(TABLE_NAME_ENV).map(String::as_str)
    }

    pub fn role_logical_id(&self) -> String {
        format!("{}ServiceRole", self.logical_id)
    }
}

/// Authorization edge from a compute unit to the storage resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub logical_id: String,
    pub subject: UnitId,
    /// Logical ID of the storage resource.
    pub object: String,
    pub mode: AccessMode,
}

/// Builds the storage resource, its compute units, and their grants.
pub struct ResourceComposer<'r> {
    resolver: &'r dyn ArtifactResolver,
    storage: Option<StorageResource>,
    units: Vec<ComputeUnit>,
    grants: Vec<Grant>,
}

impl<'r> ResourceComposer<'r> {
    pub fn new(resolver: &'r dyn ArtifactResolver) -> Self {
        Self {
            resolver,
            storage: None,
            units: Vec::new(),
            grants: Vec::new(),
        }
    }

    /// Declare the stack's table. A second declaration is rejected.
    pub fn declare_storage(
        &mut self,
        name: &str,
        partition_key: PartitionKey,
    ) -> ComposeResult<&StorageResource> {
        if let Some(existing) = &self.storage {
            return Err(ComposeError::DuplicateStorage(existing.name.clone()));
        }
        names::validate_table_name(name)?;
        if partition_key.name.is_empty() {
            return Err(ComposeError::InvalidName {
                kind: "partition key",
                name: String::new(),
                reason: "must not be empty",
            });
        }
        debug!(table = name, key = %partition_key.name, "declared storage resource");
        Ok(self.storage.insert(StorageResource {
            logical_id: logical_id(name),
            name: name.to_string(),
            partition_key,
        }))
    }

    pub fn storage(&self) -> Option<&StorageResource> {
        self.storage.as_ref()
    }

    /// Declare a compute unit bound to the storage resource.
    ///
    /// Fails on a name collision or when the entry point does not resolve to
    /// a module in the code asset.
    pub fn declare_unit(&mut self, spec: &HandlerSpec) -> ComposeResult<UnitId> {
        let storage = self.storage.as_ref().ok_or(ComposeError::MissingStorage)?;
        names::validate_function_name(&spec.name)?;
        let logical = logical_id(&spec.name);
        if self
            .units
            .iter()
            .any(|u| u.name == spec.name || u.logical_id == logical)
        {
            return Err(ComposeError::DuplicateComputeUnit(spec.name.clone()));
        }

        let entry = EntryPoint::parse(&spec.entry)?;
        let code = self.resolver.resolve_code(&spec.code, &entry, &spec.runtime)?;

        let mut environment = BTreeMap::new();
        environment.insert(TABLE_NAME_ENV.to_string(), storage.name.clone());

        let id = UnitId(self.units.len());
        debug!(
            unit = %spec.name,
            entry = %entry,
            runtime = %spec.runtime,
            table = %storage.name,
            "declared compute unit"
        );
        self.units.push(ComputeUnit {
            id,
            logical_id: logical,
            name: spec.name.clone(),
            runtime: spec.runtime.clone(),
            entry,
            code,
            environment,
        });
        Ok(id)
    }

    pub fn unit(&self, id: UnitId) -> Option<&ComputeUnit> {
        self.units.get(id.0)
    }

    pub fn unit_by_name(&self, name: &str) -> Option<&ComputeUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn units(&self) -> &[ComputeUnit] {
        &self.units
    }

    /// Grant `subject` access to the storage resource.
    ///
    /// Re-granting the same mode is a no-op; granting a different mode widens
    /// the existing grant instead of adding a second one.
    pub fn grant(&mut self, subject: UnitId, mode: AccessMode) -> ComposeResult<&Grant> {
        let storage = self.storage.as_ref().ok_or(ComposeError::MissingStorage)?;
        let unit = self
            .units
            .get(subject.0)
            .ok_or_else(|| ComposeError::UnknownComputeUnit(format!("#{}", subject.0)))?;

        let idx = match self.grants.iter().position(|g| g.subject == subject) {
            Some(idx) => {
                let grant = &mut self.grants[idx];
                let widened = grant.mode.union(mode);
                if widened != grant.mode {
                    debug!(unit = %unit.name, from = ?grant.mode, to = ?widened, "widened grant");
                    grant.mode = widened;
                }
                idx
            }
            None => {
                debug!(unit = %unit.name, table = %storage.name, ?mode, "granted table access");
                self.grants.push(Grant {
                    logical_id: format!("{}Policy", unit.logical_id),
                    subject,
                    object: storage.logical_id.clone(),
                    mode,
                });
                self.grants.len() - 1
            }
        };
        Ok(&self.grants[idx])
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Finish composition. Every unit must hold a grant.
    pub fn finish(self) -> ComposeResult<(StorageResource, Vec<ComputeUnit>, Vec<Grant>)> {
        let storage = self.storage.ok_or(ComposeError::MissingStorage)?;
        if let Some(unit) = self
            .units
            .iter()
            .find(|u| !self.grants.iter().any(|g| g.subject == u.id))
        {
            return Err(ComposeError::MissingGrant(unit.name.clone()));
        }
        Ok((storage, self.units, self.grants))
    }
}
