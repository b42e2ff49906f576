#![deny(clippy::all, warnings)]

mod core;

pub mod imagecache {
    pub use crate::core::imagecache::*;
}

pub use crate::core::commands::{
    fingerprint_images, show_record, verify_cache, RecordRequest, VerifyRequest,
};
pub use crate::core::config::{
    Config, ConfigOverrides, ImageCacheConfig, PathsConfig, DEFAULT_BASE_DIR_NAME,
    DEFAULT_INSTANCES_PATH,
};
pub use crate::core::effects::{
    Clock, ContentHasher, DiskInspector, Effects, FileSystem, QemuImgInspector, Sha256Hasher,
    SystemClock, SystemEffects, SystemFileSystem,
};
pub use crate::core::errors::CacheError;
pub use crate::core::imagecache::{ImageCacheManager, PassReport, RemovalFailure, Verification};
pub use crate::core::lock::{with_lock, ExternalLock, FileLockProvider, LockProvider};
pub use crate::core::outcome::{to_json_response, CommandStatus, ExecutionOutcome};
