//! Walks a stack in dependency order and drives a provider.
//!
//! The walk is a plain topological pass: every entity realizes after
//! everything it references, and the first error aborts the run, so
//! nothing downstream of a failure is ever attempted. Image selectors are
//! resolved once per run and memoized, so sibling instances always boot
//! the identical image.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compute::ImageSelector;
use crate::error::{Error, Result};
use crate::graph::EntityId;
use crate::outputs::{AttrRef, ResolvedOutputs};
use crate::provider::{CloudProvider, ResolvedAttrs};
use crate::stack::{Entity, Stack};

/// The record of one successful realization run.
#[derive(Debug)]
pub struct RealizedStack {
    /// Run identifier
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    resolved: IndexMap<EntityId, ResolvedAttrs>,
    outputs: ResolvedOutputs,
}

impl RealizedStack {
    /// Resolved attributes of one entity.
    pub fn resolved(&self, id: &str) -> Option<&ResolvedAttrs> {
        self.resolved.get(id)
    }

    /// The projected outputs in declaration order.
    pub fn outputs(&self) -> &ResolvedOutputs {
        &self.outputs
    }

    /// One output value by name.
    pub fn output(&self, name: &str) -> Option<&serde_json::Value> {
        self.outputs.get(name)
    }

    /// One output value by name, as a string.
    pub fn output_str(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).and_then(|v| v.as_str())
    }
}

/// Drives one provider over one stack.
pub struct Realizer<'a, P: CloudProvider> {
    provider: &'a P,
}

impl<P: CloudProvider> std::fmt::Debug for Realizer<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realizer")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl<'a, P: CloudProvider> Realizer<'a, P> {
    /// Creates a realizer over a provider.
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Realizes the whole stack and projects its outputs.
    ///
    /// Errors abort the run: entities after the failing one in the
    /// topological order are never attempted, which covers every
    /// dependent of the failed entity.
    pub async fn realize(&self, stack: &Stack) -> Result<RealizedStack> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let order = stack.realization_order()?;
        info!(
            stack = stack.name(),
            provider = self.provider.name(),
            %run_id,
            entities = order.len(),
            "realizing stack"
        );

        let mut resolved: IndexMap<EntityId, ResolvedAttrs> = IndexMap::new();
        // One image resolution per distinct selector per run. Sibling
        // instances must agree on the image even if the provider would
        // answer a fresh query differently mid-run.
        let mut image_memo: HashMap<ImageSelector, String> = HashMap::new();

        for id in &order {
            let entity = stack
                .entity(id)
                .ok_or_else(|| Error::UnknownEntity(id.clone()))?;
            debug!(entity = %id, kind = %entity.kind(), "realizing entity");

            let attrs = match self.realize_entity(entity, &resolved, &mut image_memo).await {
                Ok(attrs) => attrs,
                Err(e) => {
                    warn!(entity = %id, error = %e, "realization aborted");
                    return Err(e);
                }
            };
            resolved.insert(id.clone(), attrs);
        }

        let outputs = project_outputs(stack.outputs(), &resolved)?;
        let finished_at = Utc::now();
        info!(
            stack = stack.name(),
            %run_id,
            outputs = outputs.len(),
            "stack realized"
        );

        Ok(RealizedStack {
            run_id,
            started_at,
            finished_at,
            resolved,
            outputs,
        })
    }

    async fn realize_entity(
        &self,
        entity: &Entity,
        resolved: &IndexMap<EntityId, ResolvedAttrs>,
        image_memo: &mut HashMap<ImageSelector, String>,
    ) -> Result<ResolvedAttrs> {
        let dep = |id: &str| -> Result<&ResolvedAttrs> {
            resolved
                .get(id)
                .ok_or_else(|| Error::UnknownEntity(id.to_string()))
        };

        match entity {
            Entity::Network(spec) => self.provider.create_network(spec).await,
            Entity::Subnet(spec) => {
                self.provider.create_subnet(spec, dep(&spec.network)?).await
            }
            Entity::NatGateway(spec) => {
                self.provider
                    .create_nat_gateway(spec, dep(&spec.subnet)?)
                    .await
            }
            Entity::AccessSet(set) => {
                self.provider
                    .create_access_set(set, dep(set.network.id())?)
                    .await
            }
            Entity::Instance(spec) => {
                let image_id = match image_memo.get(&spec.image) {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.provider.resolve_image(&spec.image).await?;
                        debug!(
                            pattern = %spec.image.name_pattern,
                            image = %id,
                            "image query resolved"
                        );
                        image_memo.insert(spec.image.clone(), id.clone());
                        id
                    }
                };
                let access_set_ids: Vec<String> = spec
                    .access_sets
                    .iter()
                    .map(|set| {
                        Ok(dep(set.id())?
                            .id()
                            .unwrap_or_default()
                            .to_string())
                    })
                    .collect::<Result<_>>()?;
                self.provider
                    .launch_instance(spec, &image_id, dep(spec.subnet.id())?, &access_set_ids)
                    .await
            }
            Entity::Balancer(spec) => {
                let mut attrs = self
                    .provider
                    .create_balancer(spec, dep(spec.network.id())?, dep(spec.access_set.id())?)
                    .await?;
                for (i, listener) in spec.listeners.iter().enumerate() {
                    let listener_attrs =
                        self.provider.create_listener(&attrs, listener).await?;
                    for target in &listener.targets {
                        self.provider
                            .register_target(&listener_attrs, dep(target.id())?)
                            .await?;
                    }
                    if let Some(hostname) = listener_attrs.get_str(crate::outputs::attrs::HOSTNAME)
                    {
                        attrs.insert(
                            format!("listener:{}:hostname", listener.port),
                            hostname.to_string(),
                        );
                        // First listener doubles as the balancer hostname.
                        if i == 0 {
                            attrs.insert(crate::outputs::attrs::HOSTNAME, hostname.to_string());
                        }
                    }
                }
                Ok(attrs)
            }
        }
    }
}

/// Projects declared outputs against the resolved entities.
///
/// Fails on the first output whose entity never resolved or whose
/// attribute is missing; a placeholder value is never emitted.
pub fn project_outputs(
    declared: &IndexMap<String, AttrRef>,
    resolved: &IndexMap<EntityId, ResolvedAttrs>,
) -> Result<ResolvedOutputs> {
    let mut outputs = ResolvedOutputs::new();
    for (name, target) in declared {
        let attrs = resolved
            .get(&target.entity)
            .ok_or_else(|| Error::UnresolvedOutput {
                output: name.clone(),
                entity: target.entity.clone(),
            })?;
        let value = attrs
            .get(&target.attribute)
            .ok_or_else(|| Error::MissingAttribute {
                entity: target.entity.clone(),
                attribute: target.attribute.clone(),
            })?;
        outputs.insert(name.clone(), value.clone());
    }
    Ok(outputs)
}
