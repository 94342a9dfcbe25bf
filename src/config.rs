//! Engine configuration module.
//!
//! Handles loading, validating, and merging an `engine.toml` file. Stock
//! defaults are serialized to a TOML table and the user's file is merged on
//! top, so a config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [dispatch]
//! default_policy = "single"   # first | last | single
//!
//! [dispatch.policies]
//! # get_image_size = "last"   # per-event override, keyed by event name
//!
//! [output]
//! format = "png"              # png | jpeg | gif | bmp | tiff | webp
//! quality = 90                # 1-100, JPEG only
//!
//! [draw]
//! color = [255, 0, 0, 255]    # RGBA outline for draw_rectangle
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::dispatch::ResultPolicy;
use crate::events::EngineEvent;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `engine.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How the event bus aggregates handler results.
    pub dispatch: DispatchConfig,
    /// Defaults for the built-in `serialize` handler.
    pub output: OutputConfig,
    /// Defaults for the built-in `draw_rectangle` handler.
    pub draw: DrawConfig,
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.dispatch.policies.keys() {
            name.parse::<EngineEvent>()
                .map_err(|e| ConfigError::Validation(format!("dispatch.policies: {e}")))?;
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        self.output.image_format()?;
        Ok(())
    }
}

/// Result aggregation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Policy for every event without an override.
    pub default_policy: ResultPolicy,
    /// Per-event overrides keyed by event name (`get_image_size`, ...).
    pub policies: BTreeMap<String, ResultPolicy>,
}

/// Serialization defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Output format by extension name.
    pub format: String,
    /// JPEG quality (1 = worst, 100 = best).
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "png".to_string(),
            quality: 90,
        }
    }
}

impl OutputConfig {
    /// Resolve `format` to an encoder-backed [`ImageFormat`].
    pub fn image_format(&self) -> Result<ImageFormat, ConfigError> {
        parse_format(&self.format)
    }
}

/// Parse a format name (`png`, `jpg`, `jpeg`, ...) into a writable [`ImageFormat`].
pub fn parse_format(name: &str) -> Result<ImageFormat, ConfigError> {
    ImageFormat::from_extension(name.to_ascii_lowercase())
        .filter(|format| format.writing_enabled())
        .ok_or_else(|| ConfigError::Validation(format!("unsupported output format: {name}")))
}

/// Drawing defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DrawConfig {
    /// RGBA outline colour.
    pub color: [u8; 4],
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            color: [255, 0, 0, 255],
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(EngineConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Layer a user `engine.toml` over the stock defaults. Nested tables such as
/// `[dispatch.policies]` merge key by key; any other value in `overlay` wins.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(defaults), toml::Value::Table(layer)) => {
            let merged = layer.into_iter().fold(defaults, |mut table, (key, value)| {
                let value = match table.remove(&key) {
                    Some(default) => merge_toml(default, value),
                    None => value,
                };
                table.insert(key, value);
                table
            });
            toml::Value::Table(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<EngineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or the stock defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let overlay = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `engine.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Lifecycle Engine Configuration
# ==============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Dispatch
# ---------------------------------------------------------------------------
[dispatch]
# How several handler results for one event collapse into one:
#   first  - the earliest-subscribed handler wins
#   last   - the latest-subscribed handler wins
#   single - more than one result is an error
default_policy = "single"

[dispatch.policies]
# Per-event overrides, keyed by event name.
# get_image_size = "last"

# ---------------------------------------------------------------------------
# Serialization
# ---------------------------------------------------------------------------
[output]
# Format used when the request does not set one: png, jpeg, gif, bmp, tiff, webp.
format = "png"
# JPEG quality (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Drawing
# ---------------------------------------------------------------------------
[draw]
# RGBA colour of rectangle outlines.
color = [255, 0, 0, 255]
"##
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_overlay_keeps_other_defaults() {
        let overlay: toml::Value = toml::from_str(
            r#"
            [output]
            quality = 70
            "#,
        )
        .unwrap();
        let config = resolve_config(Some(overlay)).unwrap();
        assert_eq!(config.output.quality, 70);
        assert_eq!(config.output.format, "png");
        assert_eq!(config.draw.color, [255, 0, 0, 255]);
    }

    #[test]
    fn policies_parse_by_event_name() {
        let overlay: toml::Value = toml::from_str(
            r#"
            [dispatch]
            default_policy = "first"
            [dispatch.policies]
            get_image_size = "last"
            "#,
        )
        .unwrap();
        let config = resolve_config(Some(overlay)).unwrap();
        assert_eq!(config.dispatch.default_policy, ResultPolicy::First);
        assert_eq!(
            config.dispatch.policies.get("get_image_size"),
            Some(&ResultPolicy::Last)
        );
    }

    #[test]
    fn unknown_policy_event_is_rejected() {
        let overlay: toml::Value = toml::from_str(
            r#"
            [dispatch.policies]
            before_get_image_size = "last"
            "#,
        )
        .unwrap();
        let err = resolve_config(Some(overlay)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let overlay: toml::Value = toml::from_str("[output]\nformt = \"png\"").unwrap();
        assert!(matches!(
            resolve_config(Some(overlay)),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        let overlay: toml::Value = toml::from_str("[output]\nquality = 0").unwrap();
        assert!(matches!(
            resolve_config(Some(overlay)),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn format_names() {
        assert_eq!(parse_format("jpg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(parse_format("PNG").unwrap(), ImageFormat::Png);
        assert!(parse_format("psd").is_err());
    }

    #[test]
    fn merge_toml_overrides_nested_keys() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn policy_overrides_merge_into_stock_dispatch_table() {
        let overlay: toml::Value =
            toml::from_str("[dispatch.policies]\nget_image_size = \"first\"").unwrap();
        let merged = merge_toml(stock_defaults_value().unwrap(), overlay);
        assert_eq!(merged["dispatch"]["default_policy"].as_str(), Some("single"));
        assert_eq!(
            merged["dispatch"]["policies"]["get_image_size"].as_str(),
            Some("first")
        );
        assert_eq!(merged["output"]["quality"].as_integer(), Some(90));
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("engine.toml");
        std::fs::write(&path, "[draw]\ncolor = [0, 0, 0, 255]\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.draw.color, [0, 0, 0, 255]);
    }

    #[test]
    fn load_config_without_path_is_default() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: EngineConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
