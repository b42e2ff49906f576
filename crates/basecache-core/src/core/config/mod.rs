//! Configuration layering: defaults, config file, environment, flags.

pub mod settings;

pub use settings::*;
