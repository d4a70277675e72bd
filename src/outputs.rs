//! Output bindings: named projections of resolved attributes.
//!
//! An output has no lifecycle of its own. It names an entity attribute,
//! and the realizer fails the whole run if the referenced entity never
//! resolved or lacks the attribute; a placeholder value is never emitted.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::graph::{BalancerRef, EntityId, InstanceRef, NetworkRef, SubnetRef};

/// Attribute keys the built-in providers resolve.
pub mod attrs {
    /// Provider-assigned identifier, present on every resolved entity.
    pub const ID: &str = "id";
    /// Public IPv4 address of an instance.
    pub const PUBLIC_IP: &str = "public_ip";
    /// Private IPv4 address of an instance.
    pub const PRIVATE_IP: &str = "private_ip";
    /// Public DNS name of an instance.
    pub const PUBLIC_DNS: &str = "public_dns";
    /// Resolved machine-image id an instance booted from.
    pub const IMAGE_ID: &str = "image_id";
    /// Externally reachable hostname of a balancer's first listener.
    pub const HOSTNAME: &str = "hostname";
}

/// Reference to one attribute of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrRef {
    /// Entity the attribute lives on
    pub entity: EntityId,
    /// Attribute key
    pub attribute: String,
}

impl AttrRef {
    /// Creates an attribute reference.
    pub fn new(entity: impl Into<EntityId>, attribute: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }
}

/// The resolved outputs of a successful run: name to value, in
/// declaration order.
pub type ResolvedOutputs = IndexMap<String, serde_json::Value>;

impl NetworkRef {
    /// Reference to the network's provider-assigned id.
    pub fn id_attr(&self) -> AttrRef {
        AttrRef::new(self.id(), attrs::ID)
    }
}

impl SubnetRef {
    /// Reference to the subnet's provider-assigned id.
    pub fn id_attr(&self) -> AttrRef {
        AttrRef::new(self.id(), attrs::ID)
    }
}

impl InstanceRef {
    /// Reference to the instance's provider-assigned id.
    pub fn id_attr(&self) -> AttrRef {
        AttrRef::new(self.id(), attrs::ID)
    }

    /// Reference to the instance's public IPv4 address.
    pub fn public_ip(&self) -> AttrRef {
        AttrRef::new(self.id(), attrs::PUBLIC_IP)
    }

    /// Reference to the instance's public DNS name.
    pub fn public_dns(&self) -> AttrRef {
        AttrRef::new(self.id(), attrs::PUBLIC_DNS)
    }
}

impl BalancerRef {
    /// Reference to the balancer's provider-assigned id.
    pub fn id_attr(&self) -> AttrRef {
        AttrRef::new(self.id(), attrs::ID)
    }

    /// Reference to the externally reachable hostname of the balancer's
    /// first listener.
    pub fn hostname(&self) -> AttrRef {
        AttrRef::new(self.id(), attrs::HOSTNAME)
    }

    /// Reference to the hostname of the listener bound to `port`.
    pub fn listener_hostname(&self, port: u16) -> AttrRef {
        AttrRef::new(self.id(), format!("listener:{port}:hostname"))
    }
}
