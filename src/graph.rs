//! Resource reference graph.
//!
//! Entities in a stack refer to each other by stable string ids, never by
//! live object identity. The graph records one node per entity and one
//! directed edge per reference, pointing from the referenced entity to the
//! entity that needs it. Realization order is a topological sort of this
//! graph; the graph must be acyclic.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable identifier of an entity inside a stack.
pub type EntityId = String;

/// The category a graph node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Network,
    Subnet,
    NatGateway,
    AccessSet,
    Instance,
    Balancer,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Network => write!(f, "network"),
            EntityKind::Subnet => write!(f, "subnet"),
            EntityKind::NatGateway => write!(f, "nat_gateway"),
            EntityKind::AccessSet => write!(f, "access_set"),
            EntityKind::Instance => write!(f, "instance"),
            EntityKind::Balancer => write!(f, "balancer"),
        }
    }
}

/// Why one entity references another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The referencing entity lives inside the referenced one
    /// (subnet in network, balancer in network).
    Ownership,
    /// The referencing entity is placed into the referenced one
    /// (instance in subnet, NAT gateway in subnet).
    Placement,
    /// The referencing entity is bound to the referenced one
    /// (instance to access set, balancer to access set).
    Attachment,
    /// Traffic from the referencing entity flows via the referenced one
    /// (private subnet via NAT gateway, balancer to target instance).
    Routing,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Ownership => write!(f, "ownership"),
            ReferenceKind::Placement => write!(f, "placement"),
            ReferenceKind::Attachment => write!(f, "attachment"),
            ReferenceKind::Routing => write!(f, "routing"),
        }
    }
}

/// A node in the resource graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Entity id
    pub id: EntityId,
    /// Entity category
    pub kind: EntityKind,
}

/// Directed graph of resource references.
///
/// Edges point from a dependency to its dependent, so a topological sort
/// yields a valid realization order (referenced entities first).
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceNode, ReferenceKind>,
    node_indices: HashMap<EntityId, NodeIndex>,
}

impl ResourceGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node for an entity.
    pub fn add_node(&mut self, id: impl Into<EntityId>, kind: EntityKind) -> Result<()> {
        let id = id.into();
        if self.node_indices.contains_key(&id) {
            return Err(Error::DuplicateEntity(id));
        }
        let idx = self.graph.add_node(ResourceNode {
            id: id.clone(),
            kind,
        });
        self.node_indices.insert(id, idx);
        Ok(())
    }

    /// Records that `dependent` references `dependency`.
    pub fn add_reference(
        &mut self,
        dependency: &str,
        dependent: &str,
        kind: ReferenceKind,
    ) -> Result<()> {
        let from = *self
            .node_indices
            .get(dependency)
            .ok_or_else(|| Error::UnknownEntity(dependency.to_string()))?;
        let to = *self
            .node_indices
            .get(dependent)
            .ok_or_else(|| Error::UnknownEntity(dependent.to_string()))?;
        self.graph.add_edge(from, to, kind);
        Ok(())
    }

    /// Returns true if the graph contains an entity with this id.
    pub fn contains(&self, id: &str) -> bool {
        self.node_indices.contains_key(id)
    }

    /// Looks up a node by entity id.
    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.node_indices
            .get(id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Number of entities in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of references in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns true if any reference cycle exists.
    pub fn has_cycles(&self) -> bool {
        tarjan_scc(&self.graph).iter().any(|scc| scc.len() > 1)
    }

    /// Returns the entity ids of every reference cycle.
    pub fn cycles(&self) -> Vec<Vec<EntityId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.id.clone()))
                    .collect()
            })
            .collect()
    }

    /// Topological order of entity ids: every entity appears after the
    /// entities it references.
    pub fn realization_order(&self) -> Result<Vec<EntityId>> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.id.clone()))
                .collect()),
            Err(_) => {
                let cycles = self.cycles();
                let detail = cycles
                    .first()
                    .map(|c| c.join(" -> "))
                    .unwrap_or_else(|| "unknown cycle".to_string());
                Err(Error::DependencyCycle(detail))
            }
        }
    }

    /// Generates a DOT format representation for visualization.
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph stack {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        for idx in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(idx) {
                output.push_str(&format!(
                    "  \"{}\" [label=\"{}\\n{}\"];\n",
                    node.id, node.id, node.kind
                ));
            }
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let source = self
                .graph
                .node_weight(edge.source())
                .map(|n| n.id.as_str())
                .unwrap_or("?");
            let target = self
                .graph
                .node_weight(edge.target())
                .map(|n| n.id.as_str())
                .unwrap_or("?");

            let style = match edge.weight() {
                ReferenceKind::Ownership => "solid",
                ReferenceKind::Placement => "dashed",
                ReferenceKind::Attachment => "dotted",
                ReferenceKind::Routing => "bold",
            };

            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [style={}, label=\"{}\"];\n",
                source,
                target,
                style,
                edge.weight()
            ));
        }

        output.push_str("}\n");
        output
    }
}

// ============================================================================
// Typed references
// ============================================================================

/// Typed handle to a network entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkRef(pub(crate) EntityId);

/// Typed handle to a subnet entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubnetRef(pub(crate) EntityId);

/// Typed handle to an access-control set entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessSetRef(pub(crate) EntityId);

/// Typed handle to a compute instance entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef(pub(crate) EntityId);

/// Typed handle to a load balancer entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalancerRef(pub(crate) EntityId);

macro_rules! impl_entity_ref {
    ($($name:ident),+) => {
        $(
            impl $name {
                /// The stable id of the referenced entity.
                pub fn id(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

impl_entity_ref!(NetworkRef, SubnetRef, AccessSetRef, InstanceRef, BalancerRef);
