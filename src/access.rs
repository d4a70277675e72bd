//! Access-control sets: named permission boundaries attached to a network.
//!
//! A set carries ordered ingress and egress rule lists. Adding a rule with
//! a name that already exists *replaces* the prior definition in place;
//! it never duplicates. "All ports" is a distinct sentinel, not an alias
//! for the explicit 0-65535 range.

use std::fmt;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cidr::CidrBlock;
use crate::graph::NetworkRef;

/// IP protocol a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
    /// Every protocol.
    All,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
            Protocol::All => write!(f, "all"),
        }
    }
}

/// Ports a rule applies to.
///
/// `All` is deliberately its own variant so a set that means "every port"
/// survives serialization and comparison without collapsing into the
/// numerically identical 0-65535 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortSpec {
    /// Every port.
    All,
    /// A single port.
    Single(u16),
    /// An inclusive port range.
    Range {
        /// First port in the range
        from: u16,
        /// Last port in the range
        to: u16,
    },
}

impl PortSpec {
    /// An inclusive range, normalized so `from <= to`.
    pub fn range(a: u16, b: u16) -> Self {
        if a <= b {
            Self::Range { from: a, to: b }
        } else {
            Self::Range { from: b, to: a }
        }
    }

    /// Returns true for the all-ports sentinel.
    pub fn is_all(&self) -> bool {
        matches!(self, PortSpec::All)
    }

    /// Whether a given port falls inside this specification.
    pub fn contains(&self, port: u16) -> bool {
        match self {
            PortSpec::All => true,
            PortSpec::Single(p) => *p == port,
            PortSpec::Range { from, to } => (*from..=*to).contains(&port),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::All => write!(f, "all"),
            PortSpec::Single(p) => write!(f, "{p}"),
            PortSpec::Range { from, to } => write!(f, "{from}-{to}"),
        }
    }
}

// Manifest-friendly representation: "all", a bare number, or {from, to}.
impl Serialize for PortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PortSpec::All => serializer.serialize_str("all"),
            PortSpec::Single(p) => serializer.serialize_u16(*p),
            PortSpec::Range { from, to } => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("from", from)?;
                map.serialize_entry("to", to)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Port(u16),
            Range { from: u16, to: u16 },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) if s.eq_ignore_ascii_case("all") => Ok(PortSpec::All),
            Repr::Text(s) => Err(D::Error::custom(format!(
                "invalid port spec '{s}': expected 'all', a port number, or {{from, to}}"
            ))),
            Repr::Port(p) => Ok(PortSpec::Single(p)),
            Repr::Range { from, to } => Ok(PortSpec::range(from, to)),
        }
    }
}

/// Source or destination of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLocator {
    /// Anywhere: 0.0.0.0/0.
    AnyIpv4,
    /// An explicit CIDR block.
    Cidr(CidrBlock),
}

impl RuleLocator {
    /// The CIDR text the locator stands for.
    pub fn as_cidr_text(&self) -> String {
        match self {
            RuleLocator::AnyIpv4 => "0.0.0.0/0".to_string(),
            RuleLocator::Cidr(c) => c.to_string(),
        }
    }
}

impl fmt::Display for RuleLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleLocator::AnyIpv4 => write!(f, "anywhere"),
            RuleLocator::Cidr(c) => write!(f, "{c}"),
        }
    }
}

// Textual form: "anywhere" (or "0.0.0.0/0") or a CIDR block.
impl Serialize for RuleLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuleLocator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.eq_ignore_ascii_case("anywhere") || text == "0.0.0.0/0" {
            return Ok(RuleLocator::AnyIpv4);
        }
        text.parse::<CidrBlock>()
            .map(RuleLocator::Cidr)
            .map_err(|e| D::Error::custom(e.to_string()))
    }
}

/// A single ingress or egress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    /// Rule name, unique within its direction
    pub name: String,
    /// Source (ingress) or destination (egress)
    pub locator: RuleLocator,
    /// Ports the rule covers
    pub ports: PortSpec,
    /// Protocol the rule covers
    #[serde(default)]
    pub protocol: Protocol,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl SecurityRule {
    /// Creates a TCP rule; override with [`with_protocol`](Self::with_protocol).
    pub fn new(name: impl Into<String>, locator: RuleLocator, ports: PortSpec) -> Self {
        Self {
            name: name.into(),
            locator,
            ports,
            protocol: Protocol::Tcp,
            description: String::new(),
        }
    }

    /// Sets the protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A named permission boundary attached to one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlSet {
    /// Set name (its stable entity id)
    pub name: String,
    /// Owning network
    pub network: NetworkRef,
    ingress: IndexMap<String, SecurityRule>,
    egress: IndexMap<String, SecurityRule>,
}

impl AccessControlSet {
    /// Creates an empty set attached to a network.
    pub fn new(name: impl Into<String>, network: &NetworkRef) -> Self {
        Self {
            name: name.into(),
            network: network.clone(),
            ingress: IndexMap::new(),
            egress: IndexMap::new(),
        }
    }

    /// Adds a TCP ingress rule. A rule with the same name replaces the
    /// prior definition in place rather than duplicating it.
    pub fn add_ingress_rule(
        &mut self,
        name: impl Into<String>,
        source: RuleLocator,
        ports: PortSpec,
        description: impl Into<String>,
    ) -> &mut Self {
        self.add_ingress(SecurityRule::new(name, source, ports).with_description(description))
    }

    /// Adds a TCP egress rule, replacing any rule with the same name.
    pub fn add_egress_rule(
        &mut self,
        name: impl Into<String>,
        destination: RuleLocator,
        ports: PortSpec,
        description: impl Into<String>,
    ) -> &mut Self {
        self.add_egress(SecurityRule::new(name, destination, ports).with_description(description))
    }

    /// Adds a fully specified ingress rule, replacing by name.
    pub fn add_ingress(&mut self, rule: SecurityRule) -> &mut Self {
        self.ingress.insert(rule.name.clone(), rule);
        self
    }

    /// Adds a fully specified egress rule, replacing by name.
    pub fn add_egress(&mut self, rule: SecurityRule) -> &mut Self {
        self.egress.insert(rule.name.clone(), rule);
        self
    }

    /// The ingress rules in declaration order.
    pub fn ingress_rules(&self) -> impl Iterator<Item = &SecurityRule> {
        self.ingress.values()
    }

    /// The egress rules in declaration order.
    pub fn egress_rules(&self) -> impl Iterator<Item = &SecurityRule> {
        self.egress.values()
    }

    /// Looks up an ingress rule by name.
    pub fn ingress_rule(&self, name: &str) -> Option<&SecurityRule> {
        self.ingress.get(name)
    }

    /// Looks up an egress rule by name.
    pub fn egress_rule(&self, name: &str) -> Option<&SecurityRule> {
        self.egress.get(name)
    }

    /// True if some egress rule covers the port for TCP traffic.
    pub fn permits_egress_tcp(&self, port: u16) -> bool {
        self.egress.values().any(|rule| {
            matches!(rule.protocol, Protocol::Tcp | Protocol::All) && rule.ports.contains(port)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn network() -> NetworkRef {
        NetworkRef("custom".to_string())
    }

    #[test]
    fn test_duplicate_rule_name_replaces_in_place() {
        let net = network();
        let mut set = AccessControlSet::new("web-access", &net);
        set.add_ingress_rule(
            "https-access",
            RuleLocator::AnyIpv4,
            PortSpec::Single(80),
            "allow HTTP access from anywhere",
        );
        set.add_ingress_rule(
            "ssh-access",
            RuleLocator::AnyIpv4,
            PortSpec::Single(22),
            "allow SSH access from anywhere",
        );
        // Same name, new definition: must replace, not duplicate.
        set.add_ingress_rule(
            "https-access",
            RuleLocator::AnyIpv4,
            PortSpec::Single(443),
            "allow HTTPS access from anywhere",
        );

        let rules: Vec<_> = set.ingress_rules().collect();
        assert_eq!(rules.len(), 2);
        // Replacement keeps the original position.
        assert_eq!(rules[0].name, "https-access");
        assert_eq!(rules[0].ports, PortSpec::Single(443));
        assert_eq!(rules[1].name, "ssh-access");
    }

    #[test]
    fn test_all_ports_is_not_full_range() {
        assert_ne!(PortSpec::All, PortSpec::range(0, 65535));
        assert!(PortSpec::All.is_all());
        assert!(!PortSpec::range(0, 65535).is_all());
    }

    #[test]
    fn test_all_ports_survives_builder_round_trip() {
        let net = network();
        let mut set = AccessControlSet::new("web-access", &net);
        set.add_egress_rule(
            "outbound-access",
            RuleLocator::AnyIpv4,
            PortSpec::All,
            "allow outbound access to anywhere",
        );
        set.add_egress_rule(
            "explicit-range",
            RuleLocator::AnyIpv4,
            PortSpec::range(0, 65535),
            "numerically identical but not the sentinel",
        );

        assert!(set.egress_rule("outbound-access").unwrap().ports.is_all());
        assert!(!set.egress_rule("explicit-range").unwrap().ports.is_all());
    }

    #[test]
    fn test_port_spec_serde_preserves_sentinel() {
        let yaml = serde_yaml::to_string(&PortSpec::All).unwrap();
        assert_eq!(yaml.trim(), "all");
        let back: PortSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, PortSpec::All);

        let range: PortSpec = serde_yaml::from_str("{ from: 0, to: 65535 }").unwrap();
        assert_eq!(range, PortSpec::range(0, 65535));
        assert_ne!(back, range);

        let single: PortSpec = serde_yaml::from_str("80").unwrap();
        assert_eq!(single, PortSpec::Single(80));
    }

    #[test]
    fn test_port_spec_contains() {
        assert!(PortSpec::All.contains(0));
        assert!(PortSpec::All.contains(65535));
        assert!(PortSpec::Single(80).contains(80));
        assert!(!PortSpec::Single(80).contains(81));
        assert!(PortSpec::range(1000, 2000).contains(1500));
        assert!(!PortSpec::range(1000, 2000).contains(2001));
    }

    #[test]
    fn test_range_normalizes_order() {
        assert_eq!(PortSpec::range(2000, 1000), PortSpec::Range { from: 1000, to: 2000 });
    }

    #[test]
    fn test_rule_locator_serde() {
        let any: RuleLocator = serde_yaml::from_str("anywhere").unwrap();
        assert_eq!(any, RuleLocator::AnyIpv4);
        let zero: RuleLocator = serde_yaml::from_str("\"0.0.0.0/0\"").unwrap();
        assert_eq!(zero, RuleLocator::AnyIpv4);
        let cidr: RuleLocator = serde_yaml::from_str("\"10.0.0.0/16\"").unwrap();
        assert!(matches!(cidr, RuleLocator::Cidr(_)));
        assert!(serde_yaml::from_str::<RuleLocator>("\"not-a-cidr\"").is_err());
    }

    #[test]
    fn test_permits_egress_tcp() {
        let net = network();
        let mut set = AccessControlSet::new("web-lb-sg", &net);
        assert!(!set.permits_egress_tcp(80));
        set.add_egress(
            SecurityRule::new("outbound-access", RuleLocator::AnyIpv4, PortSpec::All)
                .with_protocol(Protocol::All),
        );
        assert!(set.permits_egress_tcp(80));
    }

    #[test]
    fn test_icmp_egress_does_not_permit_tcp() {
        let net = network();
        let mut set = AccessControlSet::new("ping-only", &net);
        set.add_egress(
            SecurityRule::new("ping", RuleLocator::AnyIpv4, PortSpec::All)
                .with_protocol(Protocol::Icmp),
        );
        assert!(!set.permits_egress_tcp(80));
    }
}
