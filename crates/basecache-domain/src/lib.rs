#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod instance;
pub mod naming;

pub use instance::{
    parse_instance_snapshot, InstanceView, RESIZE_SHADOW_SUFFIX, RESIZE_TASK_STATES,
    VM_STATE_RESIZED,
};
pub use naming::{
    classify_entry, fingerprint_of, info_filename, is_base_name, is_sidecar_name,
    legacy_digest_filename, match_candidate, BaseFileKind, EntryShape, DIGEST_HEX_LEN,
    INFO_SUFFIX, LEGACY_DIGEST_SUFFIX, LEGACY_SMALL_SUFFIX,
};
