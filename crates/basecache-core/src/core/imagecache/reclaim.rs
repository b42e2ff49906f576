use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::core::config::ImageCacheConfig;
use crate::core::effects::Effects;
use crate::core::imagecache::record::{info_path, legacy_digest_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Already gone; another host may have reaped it.
    Missing,
    TooYoung { age: Duration },
    Removed,
    Failed(String),
}

pub fn eligible_for_removal(age: Duration, is_original: bool, config: &ImageCacheConfig) -> bool {
    let threshold = if is_original {
        config.remove_unused_original_minimum_age
    } else {
        config.remove_unused_resized_minimum_age
    };
    age >= threshold
}

pub fn file_age(effects: &dyn Effects, path: &Path) -> Result<Duration> {
    let modified = effects.fs().modified(path)?;
    Ok(effects
        .clock()
        .now()
        .duration_since(modified)
        .unwrap_or_default())
}

/// Delete an unused base file and its sidecars once it is old enough.
pub fn remove_base_file(
    effects: &dyn Effects,
    base_file: &Path,
    is_original: bool,
    config: &ImageCacheConfig,
) -> RemovalOutcome {
    let fs = effects.fs();
    if !fs.exists(base_file) {
        return RemovalOutcome::Missing;
    }
    let age = match file_age(effects, base_file) {
        Ok(age) => age,
        Err(err) => {
            let message = format!("{err:#}");
            error!(base_file = %base_file.display(), error = %message, "failed to stat base file");
            return RemovalOutcome::Failed(message);
        }
    };
    if !eligible_for_removal(age, is_original, config) {
        info!(
            base_file = %base_file.display(),
            age_secs = age.as_secs(),
            "base file too young to remove"
        );
        return RemovalOutcome::TooYoung { age };
    }

    info!(base_file = %base_file.display(), age_secs = age.as_secs(), "removing base file");
    if let Err(err) = fs.remove_file(base_file) {
        let message = format!("{err:#}");
        error!(base_file = %base_file.display(), error = %message, "failed to remove base file");
        return RemovalOutcome::Failed(message);
    }
    for sidecar in [info_path(base_file), legacy_digest_path(base_file)]
        .into_iter()
        .flatten()
    {
        if !fs.exists(&sidecar) {
            continue;
        }
        if let Err(err) = fs.remove_file(&sidecar) {
            warn!(
                record = %sidecar.display(),
                error = %format!("{err:#}"),
                "failed to remove digest record"
            );
        }
    }
    RemovalOutcome::Removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::effects::Clock;
    use crate::core::imagecache::testing::TestEffects;
    use std::fs;

    #[test]
    fn originals_wait_longer_than_resized_copies() {
        let config = ImageCacheConfig {
            remove_unused_resized_minimum_age: Duration::from_secs(10),
            remove_unused_original_minimum_age: Duration::from_secs(100),
            ..ImageCacheConfig::default()
        };
        assert!(!eligible_for_removal(Duration::from_secs(9), false, &config));
        assert!(eligible_for_removal(Duration::from_secs(10), false, &config));
        assert!(!eligible_for_removal(Duration::from_secs(99), true, &config));
        assert!(eligible_for_removal(Duration::from_secs(100), true, &config));
    }

    #[test]
    fn removal_takes_sidecars_along() {
        let effects = TestEffects::new();
        let base = effects.root().join("old");
        fs::write(&base, b"image").expect("base");
        fs::write(info_path(&base).unwrap(), "{}").expect("info");
        fs::write(legacy_digest_path(&base).unwrap(), "abc").expect("legacy");
        filetime::set_file_mtime(
            &base,
            filetime::FileTime::from_system_time(
                effects.clock.now() - Duration::from_secs(7200),
            ),
        )
        .expect("age");

        let config = ImageCacheConfig::default();
        assert_eq!(
            remove_base_file(&effects, &base, false, &config),
            RemovalOutcome::Removed
        );
        assert!(!base.exists());
        assert!(!info_path(&base).unwrap().exists());
        assert!(!legacy_digest_path(&base).unwrap().exists());
        assert_eq!(
            remove_base_file(&effects, &base, false, &config),
            RemovalOutcome::Missing
        );
    }

    #[test]
    fn young_files_are_retained() {
        let effects = TestEffects::new();
        let base = effects.root().join("young");
        fs::write(&base, b"image").expect("base");
        filetime::set_file_mtime(
            &base,
            filetime::FileTime::from_system_time(effects.clock.now() - Duration::from_secs(60)),
        )
        .expect("age");

        let outcome = remove_base_file(&effects, &base, true, &ImageCacheConfig::default());
        assert_eq!(
            outcome,
            RemovalOutcome::TooYoung {
                age: Duration::from_secs(60)
            }
        );
        assert!(base.exists());
    }
}
