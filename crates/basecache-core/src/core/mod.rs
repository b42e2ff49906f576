pub mod commands;
pub mod config;
pub mod effects;
pub mod errors;
pub(crate) mod fs;
pub mod imagecache;
pub mod lock;
pub mod outcome;
