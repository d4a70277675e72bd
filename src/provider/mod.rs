//! The provisioning-engine seam.
//!
//! Everything nontrivial about realizing a resource (API calls, retries,
//! diffing against prior state, credentials) lives behind the
//! [`CloudProvider`] trait. The declaration side only promises structural
//! ordering: a provider method is never called before the resolved
//! attributes of everything the resource references are available.

pub mod simulated;

pub use simulated::SimulatedProvider;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::access::AccessControlSet;
use crate::balancer::{ListenerSpec, LoadBalancerSpec};
use crate::compute::{ImageSelector, InstanceSpec};
use crate::error::Result;
use crate::network::{NatGatewaySpec, NetworkSpec, SubnetSpec};

/// Attribute map a provider returns for one realized resource.
///
/// Keys are the attribute names output bindings may reference; values are
/// arbitrary JSON. Every resolved entity carries at least an `id`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedAttrs(IndexMap<String, Value>);

impl ResolvedAttrs {
    /// Creates an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up an attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a string attribute.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The provider-assigned id, present on every realized resource.
    pub fn id(&self) -> Option<&str> {
        self.get_str(crate::outputs::attrs::ID)
    }

    /// Iterates over all attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// The external provisioning engine, one method per resource kind.
///
/// Methods receive the declared spec plus the already-resolved attributes
/// of the entities it references. Implementations own all retry and API
/// concerns; any error they return is terminal for the run.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Engine name, for logs.
    fn name(&self) -> &'static str;

    /// Resolves an image query to a single image id. Called at most once
    /// per distinct selector per run; the realizer memoizes the answer.
    async fn resolve_image(&self, selector: &ImageSelector) -> Result<String>;

    /// Realizes a network.
    async fn create_network(&self, spec: &NetworkSpec) -> Result<ResolvedAttrs>;

    /// Realizes a subnet of an already-realized network.
    async fn create_subnet(
        &self,
        spec: &SubnetSpec,
        network: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs>;

    /// Realizes a NAT gateway inside an already-realized public subnet.
    async fn create_nat_gateway(
        &self,
        spec: &NatGatewaySpec,
        subnet: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs>;

    /// Realizes an access-control set on an already-realized network.
    async fn create_access_set(
        &self,
        set: &AccessControlSet,
        network: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs>;

    /// Launches an instance with its resolved image, subnet, and
    /// access-set ids.
    async fn launch_instance(
        &self,
        spec: &InstanceSpec,
        image_id: &str,
        subnet: &ResolvedAttrs,
        access_set_ids: &[String],
    ) -> Result<ResolvedAttrs>;

    /// Realizes a load balancer shell (no listeners yet).
    async fn create_balancer(
        &self,
        spec: &LoadBalancerSpec,
        network: &ResolvedAttrs,
        access_set: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs>;

    /// Realizes one listener on an already-realized balancer. Returns at
    /// least `id` and `hostname`.
    async fn create_listener(
        &self,
        balancer: &ResolvedAttrs,
        listener: &ListenerSpec,
    ) -> Result<ResolvedAttrs>;

    /// Registers an already-realized instance as a routing target of an
    /// already-realized listener.
    async fn register_target(
        &self,
        listener: &ResolvedAttrs,
        instance: &ResolvedAttrs,
    ) -> Result<()>;
}
