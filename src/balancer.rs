//! Layer-7 load balancer declarations.
//!
//! A balancer owns one or more listeners; each listener routes to one or
//! more target instances. Targets are attached through graph references,
//! so they are only registered once both the balancer and the instances
//! exist; there is no explicit sequencing code.

use serde::{Deserialize, Serialize};

use crate::access::Protocol;
use crate::graph::{AccessSetRef, InstanceRef, NetworkRef};

/// One listener: a bound port and protocol plus its routing targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSpec {
    /// Port the listener accepts connections on
    pub port: u16,
    /// Listener protocol
    #[serde(default)]
    pub protocol: Protocol,
    /// Instances registered to receive traffic
    pub targets: Vec<InstanceRef>,
}

impl ListenerSpec {
    /// Creates a TCP listener with no targets yet.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
            targets: Vec::new(),
        }
    }

    /// Sets the protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Registers a target instance.
    pub fn with_target(mut self, instance: &InstanceRef) -> Self {
        self.targets.push(instance.clone());
        self
    }
}

/// Declaration of one application load balancer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    /// Balancer name (its stable entity id)
    pub name: String,
    /// Owning network
    pub network: NetworkRef,
    /// Attached access-control set
    pub access_set: AccessSetRef,
    /// Listeners, at least one
    pub listeners: Vec<ListenerSpec>,
}

impl LoadBalancerSpec {
    /// Starts a balancer declaration with no listeners yet.
    pub fn new(
        name: impl Into<String>,
        network: &NetworkRef,
        access_set: &AccessSetRef,
    ) -> Self {
        Self {
            name: name.into(),
            network: network.clone(),
            access_set: access_set.clone(),
            listeners: Vec::new(),
        }
    }

    /// Adds a listener.
    pub fn with_listener(mut self, listener: ListenerSpec) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Every distinct target across all listeners, in declaration order.
    pub fn targets(&self) -> Vec<&InstanceRef> {
        let mut seen = Vec::new();
        for listener in &self.listeners {
            for target in &listener.targets {
                if !seen.contains(&target) {
                    seen.push(target);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_deduplicated_across_listeners() {
        let net = NetworkRef("custom".to_string());
        let sg = AccessSetRef("web-lb-sg".to_string());
        let web1 = InstanceRef("webserver-www-1".to_string());
        let web2 = InstanceRef("webserver-www-2".to_string());

        let alb = LoadBalancerSpec::new("web-traffic", &net, &sg)
            .with_listener(
                ListenerSpec::new(80)
                    .with_target(&web1)
                    .with_target(&web2),
            )
            .with_listener(ListenerSpec::new(443).with_target(&web1));

        assert_eq!(alb.listeners.len(), 2);
        let targets = alb.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id(), "webserver-www-1");
        assert_eq!(targets[1].id(), "webserver-www-2");
    }
}
