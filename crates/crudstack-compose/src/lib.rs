//! Build-time composition of the CRUD stack.
//!
//! Turns declarations (one table, its handler units, grants, routes and an
//! optional mTLS custom domain) into a dependency-correct [`StackGraph`].
//! Nothing here talks to a provider: the graph is rendered into a template
//! by [`synth`] and handed to whatever engine applies it.
//!
//! # Ordering
//!
//! [`StackBuilder`] enforces the declaration order
//! storage → compute units → grants → bucket → trust object → secure domain
//! → gateway → routes. Declaring a step before its prerequisite fails
//! composition outright; there is no partial graph.

pub mod assets;
pub mod domain;
pub mod graph;
pub mod resources;
pub mod routes;
pub mod stack;
pub mod synth;
pub mod trust;

pub use assets::{ArtifactResolver, CodeAsset, FsResolver, InMemoryResolver, TrustBundle};
pub use domain::{DomainSpec, ObjectStoreBucket, SecureDomain, SecureDomainConfigurator, TrustObject};
pub use graph::{NodeKind, StackGraph, StackNode};
pub use resources::{ComputeUnit, Grant, HandlerSpec, ResourceComposer, StorageResource, UnitId};
pub use routes::{AdapterCache, Gateway, IntegrationAdapter, Route, RouteBinder};
pub use stack::{StackBuilder, compose};
pub use synth::{render, render_string};
pub use trust::{CertKeyPair, ClientTrust, TrustFiles, generate_client_trust};
