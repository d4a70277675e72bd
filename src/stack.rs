//! Stack assembly: an explicit builder that accumulates entity
//! declarations and returns an immutable, validated stack.
//!
//! There is no ambient registry. Every entity enters the stack through a
//! [`StackBuilder`] call that validates its shape, stores it in an arena
//! keyed by stable id, and records its reference edges. `build` seals the
//! result into a [`Stack`] whose reference graph is guaranteed acyclic.

use indexmap::IndexMap;
use serde::Serialize;

use crate::access::{AccessControlSet, Protocol};
use crate::balancer::LoadBalancerSpec;
use crate::compute::InstanceSpec;
use crate::error::{Error, Result};
use crate::graph::{
    AccessSetRef, BalancerRef, EntityId, EntityKind, InstanceRef, NetworkRef, ReferenceKind,
    ResourceGraph, SubnetRef,
};
use crate::network::{NatGatewaySpec, NetworkBuilder, NetworkSpec, SubnetKind, SubnetSpec};
use crate::outputs::AttrRef;

/// Any entity a stack can hold.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Network(NetworkSpec),
    Subnet(SubnetSpec),
    NatGateway(NatGatewaySpec),
    AccessSet(AccessControlSet),
    Instance(InstanceSpec),
    Balancer(LoadBalancerSpec),
}

impl Entity {
    /// The entity's category.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Network(_) => EntityKind::Network,
            Entity::Subnet(_) => EntityKind::Subnet,
            Entity::NatGateway(_) => EntityKind::NatGateway,
            Entity::AccessSet(_) => EntityKind::AccessSet,
            Entity::Instance(_) => EntityKind::Instance,
            Entity::Balancer(_) => EntityKind::Balancer,
        }
    }

    /// The entity's stable id.
    pub fn id(&self) -> &str {
        match self {
            Entity::Network(n) => &n.name,
            Entity::Subnet(s) => &s.name,
            Entity::NatGateway(n) => &n.name,
            Entity::AccessSet(a) => &a.name,
            Entity::Instance(i) => &i.name,
            Entity::Balancer(b) => &b.name,
        }
    }
}

/// Typed handles returned when a network enters a stack.
#[derive(Debug, Clone)]
pub struct NetworkHandles {
    /// The network itself
    pub network: NetworkRef,
    /// Public subnets in zone order
    pub public_subnets: Vec<SubnetRef>,
    /// Private subnets in zone order
    pub private_subnets: Vec<SubnetRef>,
}

/// Accumulates entity declarations into an immutable [`Stack`].
#[derive(Debug, Default)]
pub struct StackBuilder {
    name: String,
    entities: IndexMap<EntityId, Entity>,
    graph: ResourceGraph,
    outputs: IndexMap<String, AttrRef>,
}

impl StackBuilder {
    /// Starts an empty stack.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn insert(&mut self, entity: Entity) -> Result<()> {
        let id = entity.id().to_string();
        self.graph.add_node(&id, entity.kind())?;
        self.entities.insert(id, entity);
        Ok(())
    }

    fn expect_kind(&self, id: &str, kind: EntityKind) -> Result<&Entity> {
        match self.entities.get(id) {
            Some(entity) if entity.kind() == kind => Ok(entity),
            Some(entity) => Err(Error::validation(format!(
                "'{id}' is a {}, expected a {kind}",
                entity.kind()
            ))),
            None => Err(Error::UnknownEntity(id.to_string())),
        }
    }

    /// Expands and adds a network declaration: the network node, one
    /// subnet per zone and kind, and the NAT gateways with their routing
    /// edges.
    pub fn add_network(&mut self, builder: NetworkBuilder) -> Result<NetworkHandles> {
        let expanded = builder.expand()?;
        let network_id = expanded.spec.name.clone();
        self.insert(Entity::Network(expanded.spec))?;

        let mut public_subnets = Vec::new();
        let mut private_subnets = Vec::new();
        for subnet in &expanded.subnets {
            self.insert(Entity::Subnet(subnet.clone()))?;
            self.graph
                .add_reference(&network_id, &subnet.name, ReferenceKind::Ownership)?;
            match subnet.kind {
                SubnetKind::Public => public_subnets.push(SubnetRef(subnet.name.clone())),
                SubnetKind::Private => private_subnets.push(SubnetRef(subnet.name.clone())),
            }
        }

        for nat in &expanded.nat_gateways {
            self.insert(Entity::NatGateway(nat.clone()))?;
            self.graph
                .add_reference(&nat.subnet, &nat.name, ReferenceKind::Placement)?;
        }

        // A private subnet's route table needs its NAT gateway first.
        for subnet in &expanded.subnets {
            if let Some(nat) = &subnet.egress_via {
                self.graph
                    .add_reference(nat, &subnet.name, ReferenceKind::Routing)?;
            }
        }

        Ok(NetworkHandles {
            network: NetworkRef(network_id),
            public_subnets,
            private_subnets,
        })
    }

    /// Adds an access-control set. Its network must already be declared.
    pub fn add_access_set(&mut self, set: AccessControlSet) -> Result<AccessSetRef> {
        self.expect_kind(set.network.id(), EntityKind::Network)?;
        let id = set.name.clone();
        let network_id = set.network.id().to_string();
        self.insert(Entity::AccessSet(set))?;
        self.graph
            .add_reference(&network_id, &id, ReferenceKind::Ownership)?;
        Ok(AccessSetRef(id))
    }

    /// Adds a compute instance. Placement must name a public subnet,
    /// at least one access-control set must be attached, and every
    /// attached set must belong to the subnet's network.
    pub fn add_instance(&mut self, spec: InstanceSpec) -> Result<InstanceRef> {
        if spec.access_sets.is_empty() {
            return Err(Error::NoAccessSets(spec.name));
        }

        let subnet = match self.expect_kind(spec.subnet.id(), EntityKind::Subnet)? {
            Entity::Subnet(s) => s.clone(),
            _ => unreachable!("expect_kind checked the entity kind"),
        };
        if subnet.kind != SubnetKind::Public {
            return Err(Error::PrivateSubnetPlacement {
                instance: spec.name,
                subnet: subnet.name,
            });
        }

        for set_ref in &spec.access_sets {
            let set = match self.expect_kind(set_ref.id(), EntityKind::AccessSet)? {
                Entity::AccessSet(a) => a,
                _ => unreachable!("expect_kind checked the entity kind"),
            };
            if set.network.id() != subnet.network {
                return Err(Error::validation(format!(
                    "instance '{}' attaches access set '{}' from network '{}', \
                     but is placed in network '{}'",
                    &spec.name,
                    set.name,
                    set.network.id(),
                    subnet.network
                )));
            }
        }

        let id = spec.name.clone();
        let access_sets = spec.access_sets.clone();
        self.insert(Entity::Instance(spec))?;
        self.graph
            .add_reference(&subnet.name, &id, ReferenceKind::Placement)?;
        for set_ref in &access_sets {
            self.graph
                .add_reference(set_ref.id(), &id, ReferenceKind::Attachment)?;
        }
        Ok(InstanceRef(id))
    }

    /// Adds a load balancer. Every listener needs at least one target,
    /// every target must be an instance placed in the balancer's network,
    /// and the attached access-control set must permit egress on every
    /// listener port (health checks and forwarded traffic flow out of
    /// the balancer).
    pub fn add_balancer(&mut self, spec: LoadBalancerSpec) -> Result<BalancerRef> {
        self.expect_kind(spec.network.id(), EntityKind::Network)?;
        let access_set = match self.expect_kind(spec.access_set.id(), EntityKind::AccessSet)? {
            Entity::AccessSet(a) => a.clone(),
            _ => unreachable!("expect_kind checked the entity kind"),
        };

        if spec.listeners.is_empty() {
            return Err(Error::validation(format!(
                "balancer '{}' declares no listeners",
                spec.name
            )));
        }

        for listener in &spec.listeners {
            if listener.targets.is_empty() {
                return Err(Error::EmptyListener {
                    balancer: spec.name.clone(),
                    port: listener.port,
                });
            }

            let permitted = access_set.egress_rules().any(|rule| {
                (rule.protocol == listener.protocol || rule.protocol == Protocol::All)
                    && rule.ports.contains(listener.port)
            });
            if !permitted {
                return Err(Error::EgressNotPermitted {
                    balancer: spec.name.clone(),
                    access_set: access_set.name.clone(),
                    port: listener.port,
                });
            }

            for target in &listener.targets {
                let instance = match self.expect_kind(target.id(), EntityKind::Instance)? {
                    Entity::Instance(i) => i,
                    _ => unreachable!("expect_kind checked the entity kind"),
                };
                let subnet = match self.entities.get(instance.subnet.id()) {
                    Some(Entity::Subnet(s)) => s,
                    _ => return Err(Error::UnknownEntity(instance.subnet.id().to_string())),
                };
                if subnet.network != spec.network.id() {
                    return Err(Error::validation(format!(
                        "balancer '{}' targets instance '{}' in network '{}', \
                         outside its own network '{}'",
                        spec.name,
                        instance.name,
                        subnet.network,
                        spec.network.id()
                    )));
                }
            }
        }

        let id = spec.name.clone();
        let network_id = spec.network.id().to_string();
        let set_id = spec.access_set.id().to_string();
        let targets: Vec<EntityId> = spec
            .targets()
            .into_iter()
            .map(|t| t.id().to_string())
            .collect();
        self.insert(Entity::Balancer(spec))?;
        self.graph
            .add_reference(&network_id, &id, ReferenceKind::Ownership)?;
        self.graph
            .add_reference(&set_id, &id, ReferenceKind::Attachment)?;
        // Target registration waits for both endpoints; the edge carries
        // that ordering, not any sequencing code.
        for target in &targets {
            self.graph
                .add_reference(target, &id, ReferenceKind::Routing)?;
        }
        Ok(BalancerRef(id))
    }

    /// Declares a named output. The referenced entity must exist; whether
    /// its attribute resolves is checked at realization time.
    pub fn add_output(&mut self, name: impl Into<String>, target: AttrRef) -> Result<&mut Self> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(Error::DuplicateOutput(name));
        }
        if !self.graph.contains(&target.entity) {
            return Err(Error::UnknownEntity(target.entity));
        }
        self.outputs.insert(name, target);
        Ok(self)
    }

    /// Seals the builder into an immutable stack.
    pub fn build(self) -> Result<Stack> {
        if self.graph.has_cycles() {
            let detail = self
                .graph
                .cycles()
                .first()
                .map(|c| c.join(" -> "))
                .unwrap_or_default();
            return Err(Error::DependencyCycle(detail));
        }
        Ok(Stack {
            name: self.name,
            entities: self.entities,
            graph: self.graph,
            outputs: self.outputs,
        })
    }
}

/// An immutable, validated resource-graph description.
#[derive(Debug)]
pub struct Stack {
    name: String,
    entities: IndexMap<EntityId, Entity>,
    graph: ResourceGraph,
    outputs: IndexMap<String, AttrRef>,
}

impl Stack {
    /// The stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an entity by id.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Iterates over all entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities in the stack.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// The declared outputs in declaration order.
    pub fn outputs(&self) -> &IndexMap<String, AttrRef> {
        &self.outputs
    }

    /// Entity ids in an order where every entity follows everything it
    /// references.
    pub fn realization_order(&self) -> Result<Vec<EntityId>> {
        self.graph.realization_order()
    }

    /// DOT rendering of the reference graph.
    pub fn to_dot(&self) -> String {
        self.graph.to_dot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{PortSpec, RuleLocator, SecurityRule};
    use crate::balancer::ListenerSpec;
    use crate::compute::ImageSelector;

    fn base_stack() -> (StackBuilder, NetworkHandles, AccessSetRef) {
        let mut stack = StackBuilder::new("web-stack");
        let handles = stack
            .add_network(
                NetworkBuilder::new("custom", "10.0.0.0/16".parse().unwrap())
                    .zones(2)
                    .subnet(SubnetKind::Public)
                    .subnet(SubnetKind::Private)
                    .nat_gateways(1),
            )
            .unwrap();

        let mut sg = AccessControlSet::new("web-access-sg", &handles.network);
        sg.add_ingress_rule(
            "https-access",
            RuleLocator::AnyIpv4,
            PortSpec::Single(80),
            "allow HTTP access from anywhere",
        )
        .add_egress_rule(
            "outbound-access",
            RuleLocator::AnyIpv4,
            PortSpec::All,
            "allow outbound access to anywhere",
        );
        let sg = stack.add_access_set(sg).unwrap();
        (stack, handles, sg)
    }

    fn instance(handles: &NetworkHandles, sg: &AccessSetRef, name: &str, zone: usize) -> InstanceSpec {
        InstanceSpec::new(
            name,
            "t2.micro",
            ImageSelector::new("amzn-ami-hvm-*", "137112412989"),
            &handles.public_subnets[zone],
        )
        .with_access_set(sg)
    }

    #[test]
    fn test_network_handles_split_by_kind() {
        let (_, handles, _) = base_stack();
        assert_eq!(handles.public_subnets.len(), 2);
        assert_eq!(handles.private_subnets.len(), 2);
        assert_eq!(handles.public_subnets[0].id(), "custom-public-0");
    }

    #[test]
    fn test_realization_order_is_leaves_first() {
        let (mut stack, handles, sg) = base_stack();
        let web = stack.add_instance(instance(&handles, &sg, "web-1", 0)).unwrap();
        let alb = stack
            .add_balancer(
                LoadBalancerSpec::new("web-traffic", &handles.network, &sg)
                    .with_listener(ListenerSpec::new(80).with_target(&web)),
            )
            .unwrap();
        stack.add_output("endpoint", alb.hostname()).unwrap();
        let stack = stack.build().unwrap();

        let order = stack.realization_order().unwrap();
        let pos = |id: &str| order.iter().position(|e| e == id).unwrap();
        assert!(pos("custom") < pos("custom-public-0"));
        assert!(pos("custom-public-0") < pos("custom-nat-0"));
        assert!(pos("custom-nat-0") < pos("custom-private-0"));
        assert!(pos("custom") < pos("web-access-sg"));
        assert!(pos("custom-public-0") < pos("web-1"));
        assert!(pos("web-access-sg") < pos("web-1"));
        assert!(pos("web-1") < pos("web-traffic"));
    }

    #[test]
    fn test_instance_requires_access_set() {
        let (mut stack, handles, _) = base_stack();
        let spec = InstanceSpec::new(
            "naked",
            "t2.micro",
            ImageSelector::new("amzn-ami-hvm-*", "137112412989"),
            &handles.public_subnets[0],
        );
        let err = stack.add_instance(spec).unwrap_err();
        assert!(matches!(err, Error::NoAccessSets(name) if name == "naked"));
    }

    #[test]
    fn test_instance_rejects_private_subnet() {
        let (mut stack, handles, sg) = base_stack();
        let spec = InstanceSpec::new(
            "hidden",
            "t2.micro",
            ImageSelector::new("amzn-ami-hvm-*", "137112412989"),
            &handles.private_subnets[0],
        )
        .with_access_set(&sg);
        let err = stack.add_instance(spec).unwrap_err();
        assert!(matches!(err, Error::PrivateSubnetPlacement { .. }));
    }

    #[test]
    fn test_access_set_requires_known_network() {
        let mut stack = StackBuilder::new("empty");
        let ghost = NetworkRef("ghost".to_string());
        let err = stack
            .add_access_set(AccessControlSet::new("sg", &ghost))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(id) if id == "ghost"));
    }

    #[test]
    fn test_listener_without_targets_rejected() {
        let (mut stack, handles, sg) = base_stack();
        let err = stack
            .add_balancer(
                LoadBalancerSpec::new("web-traffic", &handles.network, &sg)
                    .with_listener(ListenerSpec::new(80)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::EmptyListener { port: 80, .. }));
    }

    #[test]
    fn test_balancer_without_listeners_rejected() {
        let (mut stack, handles, sg) = base_stack();
        let err = stack
            .add_balancer(LoadBalancerSpec::new("web-traffic", &handles.network, &sg))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_balancer_requires_egress_on_listener_port() {
        let (mut stack, handles, sg) = base_stack();
        let web = stack.add_instance(instance(&handles, &sg, "web-1", 0)).unwrap();

        // A set whose only egress rule misses the listener port.
        let mut narrow = AccessControlSet::new("narrow-sg", &handles.network);
        narrow.add_egress_rule(
            "dns-only",
            RuleLocator::AnyIpv4,
            PortSpec::Single(53),
            "DNS egress only",
        );
        let narrow = stack.add_access_set(narrow).unwrap();

        let err = stack
            .add_balancer(
                LoadBalancerSpec::new("web-traffic", &handles.network, &narrow)
                    .with_listener(ListenerSpec::new(80).with_target(&web)),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EgressNotPermitted { port: 80, .. }
        ));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let (mut stack, handles, _) = base_stack();
        stack
            .add_output("vpc_id", handles.network.id_attr())
            .unwrap();
        let err = stack
            .add_output("vpc_id", handles.network.id_attr())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateOutput(name) if name == "vpc_id"));
    }

    #[test]
    fn test_output_must_reference_known_entity() {
        let (mut stack, _, _) = base_stack();
        let err = stack
            .add_output("mystery", AttrRef::new("ghost", "id"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(id) if id == "ghost"));
    }

    #[test]
    fn test_duplicate_entity_id_rejected() {
        let (mut stack, handles, sg) = base_stack();
        stack.add_instance(instance(&handles, &sg, "web-1", 0)).unwrap();
        let err = stack
            .add_instance(instance(&handles, &sg, "web-1", 1))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity(id) if id == "web-1"));
    }
}
