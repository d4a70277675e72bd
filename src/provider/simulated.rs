//! In-memory provider for previews and tests.
//!
//! Hands out deterministic ids, keeps an image catalog queried with the
//! same name-glob/owner/most-recent semantics a real cloud applies, and
//! records every created resource so tests can assert what a run did and
//! did not realize. Failure injection covers the abort-on-error path.

use chrono::{DateTime, Duration, Utc};
use globset::Glob;
use parking_lot::Mutex;

use async_trait::async_trait;

use crate::access::AccessControlSet;
use crate::balancer::{ListenerSpec, LoadBalancerSpec};
use crate::compute::{ImageSelector, InstanceSpec};
use crate::error::{Error, Result};
use crate::network::{NatGatewaySpec, NetworkSpec, SubnetSpec};
use crate::outputs::attrs;
use crate::provider::{CloudProvider, ResolvedAttrs};

/// One image in the simulated catalog.
#[derive(Debug, Clone)]
struct SimImage {
    id: String,
    name: String,
    owner: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SimState {
    counter: u64,
    images: Vec<SimImage>,
    created: Vec<String>,
    targets: Vec<(String, String)>,
    listeners: u64,
    image_query_count: u64,
    fail_on: Option<String>,
    publish_newer_on_query: bool,
}

/// An in-memory [`CloudProvider`].
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    state: Mutex<SimState>,
}

impl SimulatedProvider {
    /// Creates a provider with an empty image catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider preloaded with two Amazon Linux image
    /// generations owned by the Amazon owner id.
    pub fn amazon_linux() -> Self {
        let provider = Self::new();
        provider.publish_image("amzn-ami-hvm-2018.03.0", "137112412989");
        provider.publish_image("amzn-ami-hvm-2018.03.1", "137112412989");
        provider
    }

    /// Publishes an image to the catalog, newer than everything already
    /// in it. Returns its id.
    pub fn publish_image(&self, name: impl Into<String>, owner: impl Into<String>) -> String {
        let mut state = self.state.lock();
        let created = state
            .images
            .iter()
            .map(|i| i.created)
            .max()
            .map(|t| t + Duration::hours(1))
            .unwrap_or_else(Utc::now);
        let id = Self::next_id_in(&mut state, "ami");
        state.images.push(SimImage {
            id: id.clone(),
            name: name.into(),
            owner: owner.into(),
            created,
        });
        id
    }

    /// After every served image query, publish a newer image with the
    /// same name and owner. Exercises the selector-memoization guarantee:
    /// a second query mid-run would see a different id.
    pub fn publish_newer_on_query(self) -> Self {
        self.state.lock().publish_newer_on_query = true;
        self
    }

    /// Injects a failure: creating the entity with this name errors.
    pub fn fail_when_creating(self, entity: impl Into<String>) -> Self {
        self.state.lock().fail_on = Some(entity.into());
        self
    }

    /// Names of every resource created so far, in creation order.
    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    /// Returns true if a resource with this name was created.
    pub fn was_created(&self, name: &str) -> bool {
        self.state.lock().created.iter().any(|c| c == name)
    }

    /// Every (listener id, instance id) target registration so far.
    pub fn registered_targets(&self) -> Vec<(String, String)> {
        self.state.lock().targets.clone()
    }

    /// Number of listeners created so far.
    pub fn listener_count(&self) -> u64 {
        self.state.lock().listeners
    }

    /// Number of image queries the catalog has answered.
    pub fn image_queries(&self) -> u64 {
        self.state.lock().image_query_count
    }

    fn next_id_in(state: &mut SimState, prefix: &str) -> String {
        state.counter += 1;
        format!("{prefix}-{:06x}", state.counter)
    }

    fn create(&self, name: &str, prefix: &str) -> Result<String> {
        let mut state = self.state.lock();
        if state.fail_on.as_deref() == Some(name) {
            return Err(Error::provider(name, "injected failure"));
        }
        let id = Self::next_id_in(&mut state, prefix);
        state.created.push(name.to_string());
        Ok(id)
    }
}

#[async_trait]
impl CloudProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn resolve_image(&self, selector: &ImageSelector) -> Result<String> {
        let matcher = Glob::new(&selector.name_pattern)
            .map_err(|e| {
                Error::validation(format!(
                    "invalid image name pattern '{}': {e}",
                    selector.name_pattern
                ))
            })?
            .compile_matcher();

        let mut state = self.state.lock();
        state.image_query_count += 1;
        let best = state
            .images
            .iter()
            .filter(|img| img.owner == selector.owner && matcher.is_match(&img.name))
            .max_by_key(|img| img.created)
            .cloned();

        let best = best.ok_or_else(|| Error::ImageQueryEmpty {
            pattern: selector.name_pattern.clone(),
            owner: selector.owner.clone(),
        })?;

        if state.publish_newer_on_query {
            let created = best.created + Duration::hours(1);
            let id = Self::next_id_in(&mut state, "ami");
            state.images.push(SimImage {
                id,
                name: best.name.clone(),
                owner: best.owner.clone(),
                created,
            });
        }

        Ok(best.id)
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<ResolvedAttrs> {
        let id = self.create(&spec.name, "vpc")?;
        Ok(ResolvedAttrs::new()
            .with(attrs::ID, id)
            .with("cidr", spec.cidr.to_string())
            .with("zones", spec.zones))
    }

    async fn create_subnet(
        &self,
        spec: &SubnetSpec,
        network: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs> {
        let id = self.create(&spec.name, "subnet")?;
        Ok(ResolvedAttrs::new()
            .with(attrs::ID, id)
            .with("cidr", spec.cidr.to_string())
            .with("kind", spec.kind.to_string())
            .with("zone", spec.zone)
            .with("vpc_id", network.id().unwrap_or_default()))
    }

    async fn create_nat_gateway(
        &self,
        spec: &NatGatewaySpec,
        subnet: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs> {
        let id = self.create(&spec.name, "nat")?;
        Ok(ResolvedAttrs::new()
            .with(attrs::ID, id)
            .with("subnet_id", subnet.id().unwrap_or_default()))
    }

    async fn create_access_set(
        &self,
        set: &AccessControlSet,
        network: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs> {
        let id = self.create(&set.name, "sg")?;
        Ok(ResolvedAttrs::new()
            .with(attrs::ID, id)
            .with("vpc_id", network.id().unwrap_or_default())
            .with("ingress_rules", set.ingress_rules().count() as u64)
            .with("egress_rules", set.egress_rules().count() as u64))
    }

    async fn launch_instance(
        &self,
        spec: &InstanceSpec,
        image_id: &str,
        subnet: &ResolvedAttrs,
        access_set_ids: &[String],
    ) -> Result<ResolvedAttrs> {
        let id = self.create(&spec.name, "i")?;
        let n = self.state.lock().counter;
        Ok(ResolvedAttrs::new()
            .with(attrs::ID, id)
            .with(attrs::IMAGE_ID, image_id)
            .with(attrs::PUBLIC_IP, format!("203.0.113.{}", n % 255))
            .with(attrs::PRIVATE_IP, format!("10.0.0.{}", n % 255))
            .with(attrs::PUBLIC_DNS, format!("{}.sim.internal", spec.name))
            .with("size", spec.size.clone())
            .with("subnet_id", subnet.id().unwrap_or_default())
            .with(
                "access_set_ids",
                serde_json::Value::from(access_set_ids.to_vec()),
            ))
    }

    async fn create_balancer(
        &self,
        spec: &LoadBalancerSpec,
        network: &ResolvedAttrs,
        access_set: &ResolvedAttrs,
    ) -> Result<ResolvedAttrs> {
        let id = self.create(&spec.name, "alb")?;
        Ok(ResolvedAttrs::new()
            .with(attrs::ID, id)
            .with("vpc_id", network.id().unwrap_or_default())
            .with("access_set_id", access_set.id().unwrap_or_default()))
    }

    async fn create_listener(
        &self,
        balancer: &ResolvedAttrs,
        listener: &ListenerSpec,
    ) -> Result<ResolvedAttrs> {
        let balancer_id = balancer.id().unwrap_or_default().to_string();
        let mut state = self.state.lock();
        state.listeners += 1;
        let id = Self::next_id_in(&mut state, "listener");
        let hostname = format!("{balancer_id}-{}.elb.sim.internal", listener.port);
        Ok(ResolvedAttrs::new()
            .with(attrs::ID, id)
            .with(attrs::HOSTNAME, hostname)
            .with("port", listener.port)
            .with("protocol", listener.protocol.to_string()))
    }

    async fn register_target(
        &self,
        listener: &ResolvedAttrs,
        instance: &ResolvedAttrs,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.targets.push((
            listener.id().unwrap_or_default().to_string(),
            instance.id().unwrap_or_default().to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_image_query_picks_most_recent() {
        let provider = SimulatedProvider::new();
        let old = provider.publish_image("amzn-ami-hvm-2017.09.0", "137112412989");
        let new = provider.publish_image("amzn-ami-hvm-2018.03.0", "137112412989");
        assert_ne!(old, new);

        let resolved = provider
            .resolve_image(&ImageSelector::new("amzn-ami-hvm-*", "137112412989"))
            .await
            .unwrap();
        assert_eq!(resolved, new);
    }

    #[tokio::test]
    async fn test_image_query_filters_by_owner() {
        let provider = SimulatedProvider::new();
        provider.publish_image("amzn-ami-hvm-2018.03.0", "someone-else");

        let err = provider
            .resolve_image(&ImageSelector::new("amzn-ami-hvm-*", "137112412989"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageQueryEmpty { .. }));
    }

    #[tokio::test]
    async fn test_publish_newer_on_query_changes_the_answer() {
        let provider = SimulatedProvider::amazon_linux().publish_newer_on_query();
        let selector = ImageSelector::new("amzn-ami-hvm-*", "137112412989");

        let first = provider.resolve_image(&selector).await.unwrap();
        let second = provider.resolve_image(&selector).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let provider = SimulatedProvider::new().fail_when_creating("doomed");
        let spec = NetworkSpec {
            name: "doomed".to_string(),
            cidr: "10.0.0.0/16".parse().unwrap(),
            zones: 2,
            subnet_kinds: vec![],
            nat_gateways: 0,
        };
        let err = provider.create_network(&spec).await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert!(!provider.was_created("doomed"));
    }
}
