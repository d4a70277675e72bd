//! Compute instance declarations and the machine-image query.
//!
//! An [`ImageSelector`] is a query, not an identifier: name glob, owner,
//! most-recent. The realizer resolves each distinct selector exactly once
//! per run, so every instance sharing a selector boots the identical image
//! even if the provider publishes a newer one mid-run.

use serde::{Deserialize, Serialize};

use crate::graph::{AccessSetRef, SubnetRef};

/// A machine-image lookup by filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSelector {
    /// Glob the image name must match, e.g. `amzn-ami-hvm-*`
    pub name_pattern: String,
    /// Owner identifier the image must belong to
    pub owner: String,
    /// Pick the newest match (the only supported mode; kept explicit so a
    /// serialized selector states what it means)
    #[serde(default = "default_most_recent")]
    pub most_recent: bool,
}

fn default_most_recent() -> bool {
    true
}

impl ImageSelector {
    /// Creates a most-recent selector.
    pub fn new(name_pattern: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name_pattern: name_pattern.into(),
            owner: owner.into(),
            most_recent: true,
        }
    }
}

/// Declaration of one compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Instance name (its stable entity id)
    pub name: String,
    /// Size class, e.g. `t2.micro`
    pub size: String,
    /// Image query resolved at realization time
    pub image: ImageSelector,
    /// The one public subnet the instance is placed into
    pub subnet: SubnetRef,
    /// Attached access-control sets; must be non-empty
    pub access_sets: Vec<AccessSetRef>,
    /// Opaque script executed once at first boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_script: Option<String>,
}

impl InstanceSpec {
    /// Starts an instance declaration with no access sets or boot script.
    pub fn new(
        name: impl Into<String>,
        size: impl Into<String>,
        image: ImageSelector,
        subnet: &SubnetRef,
    ) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
            image,
            subnet: subnet.clone(),
            access_sets: Vec::new(),
            boot_script: None,
        }
    }

    /// Attaches an access-control set.
    pub fn with_access_set(mut self, set: &AccessSetRef) -> Self {
        self.access_sets.push(set.clone());
        self
    }

    /// Sets the boot script. Immutable after the instance is realized;
    /// changing it later does not trigger replacement.
    pub fn with_boot_script(mut self, script: impl Into<String>) -> Self {
        self.boot_script = Some(script.into());
        self
    }

    /// Compares two revisions of one instance declaration and classifies
    /// the update. Size, image, or subnet changes force a destroy and
    /// recreate; everything else updates in place.
    pub fn diff(old: &InstanceSpec, new: &InstanceSpec) -> InstanceChange {
        let mut replaced_by = Vec::new();
        if old.size != new.size {
            replaced_by.push("size");
        }
        if old.image != new.image {
            replaced_by.push("image");
        }
        if old.subnet != new.subnet {
            replaced_by.push("subnet");
        }
        InstanceChange { replaced_by }
    }
}

/// Classification of an instance declaration update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceChange {
    /// Fields whose change forces replacement; empty means in-place update
    pub replaced_by: Vec<&'static str>,
}

impl InstanceChange {
    /// True if the update destroys and recreates the instance.
    pub fn requires_replacement(&self) -> bool {
        !self.replaced_by.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> InstanceSpec {
        InstanceSpec::new(
            "webserver-www-1",
            "t2.micro",
            ImageSelector::new("amzn-ami-hvm-*", "137112412989"),
            &SubnetRef("custom-public-0".to_string()),
        )
        .with_access_set(&AccessSetRef("web-access-sg".to_string()))
        .with_boot_script("#!/bin/bash\necho hi")
    }

    #[test]
    fn test_identical_specs_need_no_replacement() {
        let a = spec();
        let b = spec();
        assert!(!InstanceSpec::diff(&a, &b).requires_replacement());
    }

    #[test]
    fn test_size_change_forces_replacement() {
        let a = spec();
        let mut b = spec();
        b.size = "t3.large".to_string();
        let change = InstanceSpec::diff(&a, &b);
        assert!(change.requires_replacement());
        assert_eq!(change.replaced_by, vec!["size"]);
    }

    #[test]
    fn test_image_and_subnet_changes_force_replacement() {
        let a = spec();
        let mut b = spec();
        b.image = ImageSelector::new("ubuntu-*", "099720109477");
        b.subnet = SubnetRef("custom-public-1".to_string());
        let change = InstanceSpec::diff(&a, &b);
        assert_eq!(change.replaced_by, vec!["image", "subnet"]);
    }

    #[test]
    fn test_boot_script_change_is_in_place() {
        let a = spec();
        let mut b = spec();
        b.boot_script = Some("#!/bin/bash\necho other".to_string());
        assert!(!InstanceSpec::diff(&a, &b).requires_replacement());
    }

    #[test]
    fn test_equal_selectors_hash_equal() {
        use std::collections::HashMap;
        let mut memo: HashMap<ImageSelector, String> = HashMap::new();
        memo.insert(
            ImageSelector::new("amzn-ami-hvm-*", "137112412989"),
            "ami-000001".to_string(),
        );
        assert_eq!(
            memo.get(&ImageSelector::new("amzn-ami-hvm-*", "137112412989")),
            Some(&"ami-000001".to_string())
        );
    }
}
