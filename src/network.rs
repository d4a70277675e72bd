//! Network declarations: one virtual network expanded into per-zone
//! subnets plus NAT egress for the private ones.
//!
//! The builder only validates shape. Splitting the address range, naming
//! the subnets, and wiring private egress through a NAT gateway all happen
//! here; realizing any of it is the provider's job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cidr::CidrBlock;
use crate::error::{Error, Result};
use crate::graph::EntityId;

/// Whether a subnet is internet-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetKind {
    Public,
    Private,
}

impl fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetKind::Public => write!(f, "public"),
            SubnetKind::Private => write!(f, "private"),
        }
    }
}

/// Immutable description of a network after shape validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Network name (its stable entity id)
    pub name: String,
    /// Address range of the whole network
    pub cidr: CidrBlock,
    /// Availability-zone count
    pub zones: u8,
    /// Subnet kinds laid out per zone
    pub subnet_kinds: Vec<SubnetKind>,
    /// Effective NAT gateway count, already clamped to the zone count
    pub nat_gateways: u8,
}

/// One subnet of a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetSpec {
    /// Subnet name (its stable entity id)
    pub name: String,
    /// Owning network id
    pub network: EntityId,
    /// Public or private
    pub kind: SubnetKind,
    /// Zone index, 0-based
    pub zone: u8,
    /// Address slice carved out of the network CIDR
    pub cidr: CidrBlock,
    /// NAT gateway id private egress routes through, if any
    pub egress_via: Option<EntityId>,
}

/// One NAT gateway placed into a public subnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatGatewaySpec {
    /// Gateway name (its stable entity id)
    pub name: String,
    /// Owning network id
    pub network: EntityId,
    /// Public subnet the gateway is placed into
    pub subnet: EntityId,
    /// Zone index the gateway serves
    pub zone: u8,
}

/// A validated network expansion, ready to enter a stack.
#[derive(Debug, Clone)]
pub struct ExpandedNetwork {
    pub spec: NetworkSpec,
    pub subnets: Vec<SubnetSpec>,
    pub nat_gateways: Vec<NatGatewaySpec>,
}

/// Builder for a network declaration.
///
/// ```
/// use stackplan::network::{NetworkBuilder, SubnetKind};
///
/// let network = NetworkBuilder::new("custom", "10.0.0.0/16".parse().unwrap())
///     .zones(2)
///     .subnet(SubnetKind::Public)
///     .subnet(SubnetKind::Private)
///     .nat_gateways(1);
/// ```
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    name: String,
    cidr: CidrBlock,
    zones: u8,
    subnet_kinds: Vec<SubnetKind>,
    nat_gateways: u8,
}

impl NetworkBuilder {
    /// Starts a network declaration. Defaults: 2 zones, no subnets, no NAT.
    pub fn new(name: impl Into<String>, cidr: CidrBlock) -> Self {
        Self {
            name: name.into(),
            cidr,
            zones: 2,
            subnet_kinds: Vec::new(),
            nat_gateways: 0,
        }
    }

    /// Sets the availability-zone count.
    pub fn zones(mut self, zones: u8) -> Self {
        self.zones = zones;
        self
    }

    /// Adds one subnet kind, laid out once per zone.
    pub fn subnet(mut self, kind: SubnetKind) -> Self {
        self.subnet_kinds.push(kind);
        self
    }

    /// Sets the requested NAT gateway count. Clamped to the zone count
    /// during expansion.
    pub fn nat_gateways(mut self, count: u8) -> Self {
        self.nat_gateways = count;
        self
    }

    /// The network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates shape and expands the declaration into subnets and NAT
    /// gateways. No external call is made here or anywhere downstream of
    /// a failure.
    pub fn expand(self) -> Result<ExpandedNetwork> {
        if self.zones == 0 {
            return Err(Error::validation(format!(
                "network '{}' must span at least one availability zone",
                self.name
            )));
        }
        if self.subnet_kinds.is_empty() {
            return Err(Error::validation(format!(
                "network '{}' declares no subnets",
                self.name
            )));
        }
        for (i, kind) in self.subnet_kinds.iter().enumerate() {
            if self.subnet_kinds[..i].contains(kind) {
                return Err(Error::validation(format!(
                    "network '{}' declares subnet kind '{}' twice",
                    self.name, kind
                )));
            }
        }
        let has_public = self.subnet_kinds.contains(&SubnetKind::Public);
        if self.nat_gateways > 0 && !has_public {
            return Err(Error::validation(format!(
                "network '{}' requests NAT gateways but has no public subnets to place them in",
                self.name
            )));
        }

        // One subnet per (zone x kind); equal CIDR slices, zone-major so a
        // zone's subnets are adjacent.
        let subnet_count = self.zones as usize * self.subnet_kinds.len();
        let blocks = self.cidr.split_into(subnet_count)?;
        let nat_count = self.nat_gateways.min(self.zones);

        let mut subnets = Vec::with_capacity(subnet_count);
        let mut block_iter = blocks.into_iter();
        for zone in 0..self.zones {
            for kind in &self.subnet_kinds {
                let cidr = block_iter.next().expect("one block per subnet");
                subnets.push(SubnetSpec {
                    name: subnet_name(&self.name, *kind, zone),
                    network: self.name.clone(),
                    kind: *kind,
                    zone,
                    cidr,
                    egress_via: None,
                });
            }
        }

        let nat_gateways: Vec<NatGatewaySpec> = (0..nat_count)
            .map(|zone| NatGatewaySpec {
                name: format!("{}-nat-{}", self.name, zone),
                network: self.name.clone(),
                subnet: subnet_name(&self.name, SubnetKind::Public, zone),
                zone,
            })
            .collect();

        // Private subnets route egress through the NAT in their own zone,
        // falling back to the first NAT when their zone has none.
        if !nat_gateways.is_empty() {
            for subnet in &mut subnets {
                if subnet.kind == SubnetKind::Private {
                    let nat = nat_gateways
                        .iter()
                        .find(|n| n.zone == subnet.zone)
                        .unwrap_or(&nat_gateways[0]);
                    subnet.egress_via = Some(nat.name.clone());
                }
            }
        }

        Ok(ExpandedNetwork {
            spec: NetworkSpec {
                name: self.name,
                cidr: self.cidr,
                zones: self.zones,
                subnet_kinds: self.subnet_kinds,
                nat_gateways: nat_count,
            },
            subnets,
            nat_gateways,
        })
    }
}

fn subnet_name(network: &str, kind: SubnetKind, zone: u8) -> String {
    format!("{network}-{kind}-{zone}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> NetworkBuilder {
        NetworkBuilder::new("custom", "10.0.0.0/16".parse().unwrap())
            .zones(2)
            .subnet(SubnetKind::Public)
            .subnet(SubnetKind::Private)
    }

    #[test]
    fn test_expand_produces_zone_times_kind_subnets() {
        let expanded = builder().nat_gateways(1).expand().unwrap();
        assert_eq!(expanded.subnets.len(), 4);
        assert_eq!(expanded.spec.zones, 2);

        let publics: Vec<_> = expanded
            .subnets
            .iter()
            .filter(|s| s.kind == SubnetKind::Public)
            .collect();
        let privates: Vec<_> = expanded
            .subnets
            .iter()
            .filter(|s| s.kind == SubnetKind::Private)
            .collect();
        assert_eq!(publics.len(), 2);
        assert_eq!(privates.len(), 2);
        assert_eq!(publics[0].name, "custom-public-0");
        assert_eq!(publics[1].name, "custom-public-1");
    }

    #[test]
    fn test_subnet_cidrs_are_disjoint_slices() {
        let expanded = builder().expand().unwrap();
        let parent: CidrBlock = "10.0.0.0/16".parse().unwrap();
        for (i, a) in expanded.subnets.iter().enumerate() {
            assert!(parent.contains(&a.cidr));
            assert_eq!(a.cidr.prefix(), 18);
            for b in &expanded.subnets[i + 1..] {
                assert!(!a.cidr.contains(&b.cidr));
            }
        }
    }

    #[test]
    fn test_nat_count_clamped_to_zones() {
        let expanded = builder().nat_gateways(5).expand().unwrap();
        assert_eq!(expanded.nat_gateways.len(), 2);
        assert_eq!(expanded.spec.nat_gateways, 2);
    }

    #[test]
    fn test_single_nat_shared_by_private_subnets() {
        let expanded = builder().nat_gateways(1).expand().unwrap();
        assert_eq!(expanded.nat_gateways.len(), 1);
        let nat = &expanded.nat_gateways[0];
        assert_eq!(nat.subnet, "custom-public-0");

        for subnet in expanded.subnets.iter().filter(|s| s.kind == SubnetKind::Private) {
            // Zone 1 has no NAT of its own; falls back to the zone 0 NAT.
            assert_eq!(subnet.egress_via.as_deref(), Some("custom-nat-0"));
        }
    }

    #[test]
    fn test_no_nat_leaves_private_egress_unset() {
        let expanded = builder().expand().unwrap();
        assert!(expanded.nat_gateways.is_empty());
        assert!(expanded.subnets.iter().all(|s| s.egress_via.is_none()));
    }

    #[test]
    fn test_address_space_exhaustion_is_shape_error() {
        let err = NetworkBuilder::new("tiny", "192.168.0.0/27".parse().unwrap())
            .zones(2)
            .subnet(SubnetKind::Public)
            .subnet(SubnetKind::Private)
            .expand()
            .unwrap_err();
        assert!(matches!(err, Error::AddressSpaceExhausted { requested: 4, .. }));
        assert!(err.is_shape_error());
    }

    #[test]
    fn test_zero_zones_rejected() {
        let err = builder().zones(0).expand().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_no_subnets_rejected() {
        let err = NetworkBuilder::new("empty", "10.0.0.0/16".parse().unwrap())
            .expand()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let err = NetworkBuilder::new("dup", "10.0.0.0/16".parse().unwrap())
            .subnet(SubnetKind::Public)
            .subnet(SubnetKind::Public)
            .expand()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_nat_without_public_subnet_rejected() {
        let err = NetworkBuilder::new("isolated", "10.0.0.0/16".parse().unwrap())
            .subnet(SubnetKind::Private)
            .nat_gateways(1)
            .expand()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
