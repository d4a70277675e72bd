//! # Stackplan - Typed Cloud Stack Declarations
//!
//! Stackplan is a declarative, type-safe library for describing a cloud
//! stack as a graph of entities and realizing it against a provider. A
//! stack is assembled through an explicit builder, validated as it grows,
//! and frozen into an immutable plan before anything touches a provider.
//!
//! ## Core Concepts
//!
//! - **Stack**: A validated, immutable collection of entities and the
//!   reference graph between them
//! - **Entities**: Networks, subnets, NAT gateways, access-control sets,
//!   instances, and load balancers
//! - **References**: Typed handles returned when an entity is added; the
//!   only way to point one entity at another
//! - **Providers**: The async seam that creates real (or simulated)
//!   resources from entity specs
//! - **Realization**: A topological walk of the stack that creates every
//!   entity after its dependencies and projects the declared outputs
//! - **Manifests**: YAML files that lower into the same builder API
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       Manifest / Builder API                         │
//! │            (YAML front-end or programmatic StackBuilder)             │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Stack                                   │
//! │          (immutable entities + acyclic reference graph)              │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             Realizer                                 │
//! │        (topological walk, image memoization, output projection)      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          CloudProvider                               │
//! │               (async trait; SimulatedProvider built in)              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use stackplan::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut stack = StackBuilder::new("web-stack");
//!
//!     let net = stack.add_network(
//!         NetworkBuilder::new("custom", "10.0.0.0/16".parse()?)
//!             .zones(2)
//!             .subnet(SubnetKind::Public)
//!             .subnet(SubnetKind::Private)
//!             .nat_gateways(1),
//!     )?;
//!
//!     let mut sg = AccessControlSet::new("web-access-sg", &net.network);
//!     sg.add_ingress_rule("https-access", RuleLocator::AnyIpv4, PortSpec::Single(80), "");
//!
//!     let sg = stack.add_access_set(sg)?;
//!     let stack = stack.build()?;
//!
//!     let provider = SimulatedProvider::amazon_linux();
//!     let realized = Realizer::new(&provider).realize(&stack).await?;
//!     println!("{:#?}", realized.outputs());
//!     Ok(())
//! }
//! ```

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod access;
pub mod balancer;
pub mod cidr;
pub mod compute;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod network;
pub mod outputs;
pub mod provider;
pub mod realizer;
pub mod stack;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::access::{AccessControlSet, PortSpec, Protocol, RuleLocator, SecurityRule};
    pub use crate::balancer::{ListenerSpec, LoadBalancerSpec};
    pub use crate::cidr::CidrBlock;
    pub use crate::compute::{ImageSelector, InstanceSpec};
    pub use crate::error::{Error, Result};
    pub use crate::graph::{AccessSetRef, BalancerRef, InstanceRef, NetworkRef, SubnetRef};
    pub use crate::manifest::StackManifest;
    pub use crate::network::{NetworkBuilder, SubnetKind};
    pub use crate::outputs::{attrs, AttrRef};
    pub use crate::provider::{CloudProvider, ResolvedAttrs, SimulatedProvider};
    pub use crate::realizer::{RealizedStack, Realizer};
    pub use crate::stack::{Stack, StackBuilder};
}

/// Library version from the crate manifest.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
