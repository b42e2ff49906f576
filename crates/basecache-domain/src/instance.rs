use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Task states during which both the pre- and post-resize disks may be live.
pub const RESIZE_TASK_STATES: &[&str] = &[
    "resize_prep",
    "resize_migrating",
    "resize_migrated",
    "resize_finish",
];
pub const VM_STATE_RESIZED: &str = "resized";
pub const RESIZE_SHADOW_SUFFIX: &str = "_resize";

/// Read-only view of one inventory row for the duration of a pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceView {
    pub name: String,
    #[serde(default, deserialize_with = "image_ref_string")]
    pub image_ref: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub task_state: Option<String>,
    #[serde(default)]
    pub vm_state: Option<String>,
}

impl InstanceView {
    pub fn new(name: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_ref: image_ref.into(),
            host: None,
            task_state: None,
            vm_state: None,
        }
    }

    #[must_use]
    pub fn on_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_task_state(mut self, state: impl Into<String>) -> Self {
        self.task_state = Some(state.into());
        self
    }

    #[must_use]
    pub fn with_vm_state(mut self, state: impl Into<String>) -> Self {
        self.vm_state = Some(state.into());
        self
    }

    pub fn is_resizing(&self) -> bool {
        self.task_state
            .as_deref()
            .is_some_and(|state| RESIZE_TASK_STATES.contains(&state))
            || self.vm_state.as_deref() == Some(VM_STATE_RESIZED)
    }

    /// An instance whose host is unknown never counts as local.
    pub fn is_local_to(&self, host: &str) -> bool {
        self.host.as_deref() == Some(host)
    }

    /// Instance directory names expected to hold a root disk.
    pub fn expected_disk_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if self.is_resizing() {
            names.push(format!("{}{RESIZE_SHADOW_SUFFIX}", self.name));
        }
        names
    }
}

// Inventories have carried image references as strings, integers and null.
fn image_ref_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(value) => value,
        other => other.to_string(),
    })
}

/// Parses a JSON array of instances as exported by the inventory service.
pub fn parse_instance_snapshot(contents: &str) -> anyhow::Result<Vec<InstanceView>> {
    Ok(serde_json::from_str(contents)?)
}
