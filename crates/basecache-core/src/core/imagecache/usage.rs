use std::collections::{BTreeMap, BTreeSet};

use basecache_domain::InstanceView;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEntry {
    pub local_count: usize,
    pub remote_count: usize,
    pub instance_names: BTreeSet<String>,
}

impl UsageEntry {
    pub fn in_use(&self) -> bool {
        self.local_count + self.remote_count > 0
    }

    /// Instances on any host referencing this image.
    pub fn popularity(&self) -> usize {
        self.local_count + self.remote_count
    }
}

/// Who uses which image, as seen from this host for one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Usage {
    pub images: BTreeMap<String, UsageEntry>,
    /// Instance directories that should hold a root disk.
    pub expected_names: BTreeSet<String>,
}

pub fn collect(instances: &[InstanceView], local_host: &str) -> Usage {
    let mut usage = Usage::default();
    for instance in instances {
        usage
            .expected_names
            .extend(instance.expected_disk_names());
        if instance.image_ref.is_empty() {
            debug!(instance = %instance.name, "instance has no image reference");
            continue;
        }
        let entry = usage.images.entry(instance.image_ref.clone()).or_default();
        if instance.is_local_to(local_host) {
            entry.local_count += 1;
        } else {
            entry.remote_count += 1;
        }
        entry.instance_names.insert(instance.name.clone());
    }
    usage
}
