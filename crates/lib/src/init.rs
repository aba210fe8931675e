//! Initialize the configuration directory: create ~/.cafebot, a default config, and a profile.
//!
//! The profile is seeded from a bundled preset (`crates/lib/config/presets/<name>.json`) so it
//! can be edited in place.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;
use crate::profile::{self, StoreProfile, PRESET_NAMES};

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Writes `profile.json` from the named preset if missing.
pub fn init_config_dir(config_path: &Path, preset: &str) -> Result<PathBuf> {
    let preset_json = profile::preset_json(preset).with_context(|| {
        format!(
            "unknown preset {:?} (available: {})",
            preset,
            PRESET_NAMES.join(", ")
        )
    })?;

    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let profile_path = config::profile_file(config_path);
    if !profile_path.exists() {
        std::fs::write(&profile_path, preset_json)
            .with_context(|| format!("writing profile to {}", profile_path.display()))?;
        log::info!("wrote {} profile to {}", preset, profile_path.display());
    } else {
        log::debug!("profile already exists at {}, skipping", profile_path.display());
    }

    Ok(config_dir.to_path_buf())
}

/// Load the profile the config points at, with coordinate overrides applied.
pub fn load_profile(config: &config::Config, config_path: &Path) -> Result<StoreProfile> {
    let profile = match config::resolve_profile_source(config, config_path) {
        config::ProfileSource::File(path) => {
            log::info!("profile: loading {}", path.display());
            StoreProfile::load(&path)?
        }
        config::ProfileSource::Preset(name) => {
            log::info!("profile: using bundled preset {}", name);
            StoreProfile::preset(&name)?
        }
    };
    let (lat, lng) = config::resolve_place_coordinates(config);
    Ok(profile.with_coordinates(lat, lng))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("cafebot-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        (dir, path)
    }

    #[test]
    fn writes_config_and_profile_once() {
        let (dir, path) = temp_config_path();
        let out = init_config_dir(&path, "polyphony").unwrap();
        assert_eq!(out, dir);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        let written = std::fs::read_to_string(dir.join("profile.json")).unwrap();
        assert_eq!(written, profile::preset_json("polyphony").unwrap());

        // Existing files are left alone.
        std::fs::write(&path, r#"{"gateway":{"port":9}}"#).unwrap();
        init_config_dir(&path, "cafe").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"gateway":{"port":9}}"#
        );
        assert_eq!(std::fs::read_to_string(dir.join("profile.json")).unwrap(), written);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let (dir, path) = temp_config_path();
        let err = init_config_dir(&path, "diner").unwrap_err();
        assert!(err.to_string().contains("unknown preset"));
        assert!(!dir.exists());
    }

    #[test]
    fn load_profile_prefers_initialized_file() {
        let (dir, path) = temp_config_path();
        init_config_dir(&path, "polyphony").unwrap();
        let (config, _) = config::load_config(Some(path.clone())).unwrap();
        let profile = load_profile(&config, &path).unwrap();
        assert_eq!(profile.store_name, "ポリフォニー");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_profile_falls_back_to_preset_with_overrides() {
        if std::env::var("PLACE_LAT").is_ok() || std::env::var("PLACE_LNG").is_ok() {
            return;
        }
        let (_dir, path) = temp_config_path();
        let mut config = config::Config::default();
        config.place.latitude = Some(35.0);
        let profile = load_profile(&config, &path).unwrap();
        let place = profile.place.unwrap();
        assert_eq!(place.latitude, 35.0);
        assert_eq!(place.longitude, 135.4877019);
    }
}
