//! YAML stack manifests.
//!
//! A manifest is the file form of a stack declaration. Loading one parses
//! the YAML and lowers it through a [`StackBuilder`], so every shape check
//! the programmatic API performs applies to file input too.
//!
//! ```yaml
//! name: web-stack
//! network:
//!   name: custom
//!   cidr: 10.0.0.0/16
//!   zones: 2
//!   subnets: [public, private]
//!   nat_gateways: 1
//! access_sets:
//!   - name: web-access-sg
//!     ingress:
//!       - { name: https-access, locator: anywhere, ports: 80,
//!           description: allow HTTP access from anywhere }
//!     egress:
//!       - { name: outbound-access, locator: anywhere, ports: all,
//!           description: allow outbound access to anywhere }
//! instances:
//!   - name: webserver-www-1
//!     size: t2.micro
//!     image: { name_pattern: "amzn-ami-hvm-*", owner: "137112412989" }
//!     subnet: { kind: public, zone: 0 }
//!     access_sets: [web-access-sg]
//!     boot_script: |
//!       #!/bin/bash
//!       echo "Hello, from Webserver 1!" > index.html
//! balancer:
//!   name: web-traffic
//!   access_set: web-access-sg
//!   listeners:
//!     - port: 80
//!       targets: [webserver-www-1]
//! outputs:
//!   endpoint: { entity: web-traffic, attribute: hostname }
//!   vpc_id: { entity: custom, attribute: id }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::access::{AccessControlSet, PortSpec, Protocol, RuleLocator, SecurityRule};
use crate::balancer::{ListenerSpec, LoadBalancerSpec};
use crate::cidr::CidrBlock;
use crate::compute::{ImageSelector, InstanceSpec};
use crate::error::{Error, Result};
use crate::graph::{AccessSetRef, InstanceRef, SubnetRef};
use crate::network::{NetworkBuilder, SubnetKind};
use crate::outputs::AttrRef;
use crate::stack::{Stack, StackBuilder};

/// Top-level manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackManifest {
    /// Stack name
    pub name: String,
    /// The one network of the stack
    pub network: NetworkManifest,
    /// Access-control sets
    #[serde(default)]
    pub access_sets: Vec<AccessSetManifest>,
    /// Compute instances
    #[serde(default)]
    pub instances: Vec<InstanceManifest>,
    /// Optional load balancer
    #[serde(default)]
    pub balancer: Option<BalancerManifest>,
    /// Named outputs
    #[serde(default)]
    pub outputs: IndexMap<String, OutputManifest>,
}

/// Network section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkManifest {
    pub name: String,
    pub cidr: CidrBlock,
    #[serde(default = "default_zones")]
    pub zones: u8,
    pub subnets: Vec<SubnetKind>,
    #[serde(default)]
    pub nat_gateways: u8,
}

fn default_zones() -> u8 {
    2
}

/// One access-control set with its rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessSetManifest {
    pub name: String,
    #[serde(default)]
    pub ingress: Vec<RuleManifest>,
    #[serde(default)]
    pub egress: Vec<RuleManifest>,
}

/// One rule in manifest form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleManifest {
    pub name: String,
    pub locator: RuleLocator,
    pub ports: PortSpec,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub description: String,
}

/// One instance, with placement by kind and zone index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceManifest {
    pub name: String,
    pub size: String,
    pub image: ImageSelector,
    pub subnet: PlacementManifest,
    pub access_sets: Vec<String>,
    #[serde(default)]
    pub boot_script: Option<String>,
}

/// Subnet placement: the zone-th subnet of the given kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementManifest {
    pub kind: SubnetKind,
    #[serde(default)]
    pub zone: u8,
}

/// The balancer section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerManifest {
    pub name: String,
    pub access_set: String,
    pub listeners: Vec<ListenerManifest>,
}

/// One listener with its targets by instance name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerManifest {
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    pub targets: Vec<String>,
}

/// One output binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputManifest {
    pub entity: String,
    pub attribute: String,
}

impl StackManifest {
    /// Parses a manifest from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reads and parses a manifest file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Lowers the manifest into a validated stack.
    pub fn lower(&self) -> Result<Stack> {
        let mut stack = StackBuilder::new(&self.name);

        let mut network = NetworkBuilder::new(&self.network.name, self.network.cidr)
            .zones(self.network.zones)
            .nat_gateways(self.network.nat_gateways);
        for kind in &self.network.subnets {
            network = network.subnet(*kind);
        }
        let handles = stack.add_network(network)?;

        let mut set_refs: IndexMap<String, AccessSetRef> = IndexMap::new();
        for set_manifest in &self.access_sets {
            let mut set = AccessControlSet::new(&set_manifest.name, &handles.network);
            for rule in &set_manifest.ingress {
                set.add_ingress(rule.to_rule());
            }
            for rule in &set_manifest.egress {
                set.add_egress(rule.to_rule());
            }
            let set_ref = stack.add_access_set(set)?;
            set_refs.insert(set_manifest.name.clone(), set_ref);
        }

        let lookup_set = |name: &str, key: &str| -> Result<AccessSetRef> {
            set_refs
                .get(name)
                .cloned()
                .ok_or_else(|| Error::manifest(key, format!("unknown access set '{name}'")))
        };

        let mut instance_refs: IndexMap<String, InstanceRef> = IndexMap::new();
        for inst in &self.instances {
            let subnet = place(&handles, &inst.subnet, &format!("instances.{}.subnet", inst.name))?;
            let mut spec = InstanceSpec::new(&inst.name, &inst.size, inst.image.clone(), &subnet);
            for set_name in &inst.access_sets {
                let set_ref = lookup_set(set_name, &format!("instances.{}.access_sets", inst.name))?;
                spec = spec.with_access_set(&set_ref);
            }
            if let Some(script) = &inst.boot_script {
                spec = spec.with_boot_script(script);
            }
            let inst_ref = stack.add_instance(spec)?;
            instance_refs.insert(inst.name.clone(), inst_ref);
        }

        if let Some(balancer) = &self.balancer {
            let set_ref = lookup_set(
                &balancer.access_set,
                &format!("balancer.{}.access_set", balancer.name),
            )?;
            let mut spec = LoadBalancerSpec::new(&balancer.name, &handles.network, &set_ref);
            for listener in &balancer.listeners {
                let mut l = ListenerSpec::new(listener.port).with_protocol(listener.protocol);
                for target in &listener.targets {
                    let target_ref = instance_refs.get(target).ok_or_else(|| {
                        Error::manifest(
                            format!("balancer.{}.listeners", balancer.name),
                            format!("unknown target instance '{target}'"),
                        )
                    })?;
                    l = l.with_target(target_ref);
                }
                spec = spec.with_listener(l);
            }
            stack.add_balancer(spec)?;
        }

        for (name, output) in &self.outputs {
            stack.add_output(name, AttrRef::new(&output.entity, &output.attribute))?;
        }

        stack.build()
    }
}

impl RuleManifest {
    fn to_rule(&self) -> SecurityRule {
        SecurityRule::new(&self.name, self.locator, self.ports)
            .with_protocol(self.protocol)
            .with_description(&self.description)
    }
}

fn place(
    handles: &crate::stack::NetworkHandles,
    placement: &PlacementManifest,
    key: &str,
) -> Result<SubnetRef> {
    let pool = match placement.kind {
        SubnetKind::Public => &handles.public_subnets,
        SubnetKind::Private => &handles.private_subnets,
    };
    pool.get(placement.zone as usize).cloned().ok_or_else(|| {
        Error::manifest(
            key,
            format!(
                "no {} subnet in zone {} (network has {})",
                placement.kind,
                placement.zone,
                pool.len()
            ),
        )
    })
}
