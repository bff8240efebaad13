//! Site configuration module.
//!
//! Handles loading, validating, and layering configuration. Values are
//! resolved in this order, later layers winning:
//!
//! ```text
//! stock defaults  →  config.toml  →  environment variables  →  CLI flags
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! domain = "https://timpanogos-steel.com"   # Canonical domain for page_url
//! form_endpoint = "https://script.google.com/macros/s/your-script-id/exec"
//! recaptcha_site_key = "your-recaptcha-site-key"
//! sentry_dsn = "your-sentry-dsn"
//! ga_tracking_id = "your-ga-tracking-id"
//!
//! [site.variables]                          # Extra template globals
//! phone = "801-555-0100"
//!
//! [generation]
//! template = "base.html"    # Page template, relative to the templates dir
//! batch_size = 100          # Records per progress batch
//! on_error = "abort"        # "abort" or "continue"
//! on_duplicate = "overwrite" # "overwrite" or "reject"
//! sections_dir = "sections" # Optional <section>.txt boilerplate overrides
//!
//! [processing]
//! max_processes = 4         # Max parallel render workers (omit for auto)
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Key |
//! |----------|-----|
//! | `SITE_DOMAIN` | `site.domain` |
//! | `FORM_ENDPOINT` | `site.form_endpoint` |
//! | `RECAPTCHA_SITE_KEY` | `site.recaptcha_site_key` |
//! | `SENTRY_DSN` | `site.sentry_dsn` |
//! | `GA_TRACKING_ID` | `site.ga_tracking_id` |
//! | `BATCH_SIZE` | `generation.batch_size` |
//! | `ON_ERROR` | `generation.on_error` |
//! | `ON_DUPLICATE` | `generation.on_duplicate` |
//!
//! Unknown keys in `config.toml` are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Values exposed to every page.
    pub site: SiteSettings,
    /// How the run is driven.
    pub generation: GenerationConfig,
    /// Parallel rendering settings.
    pub processing: ProcessingConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.batch_size == 0 {
            return Err(ConfigError::Validation(
                "generation.batch_size must be at least 1".into(),
            ));
        }
        if self.generation.template.trim().is_empty() {
            return Err(ConfigError::Validation(
                "generation.template must not be empty".into(),
            ));
        }
        let domain = &self.site.domain;
        let host = domain
            .strip_prefix("https://")
            .or_else(|| domain.strip_prefix("http://"));
        if !host.is_some_and(|h| !h.trim_matches('/').is_empty()) {
            return Err(ConfigError::Validation(format!(
                "site.domain must be an http(s) URL, got {domain:?}"
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Site-wide values merged into every page context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSettings {
    /// Canonical domain; `page_url` is `<domain>/<filename>`.
    pub domain: String,
    /// Endpoint the quote form posts to.
    pub form_endpoint: String,
    pub recaptcha_site_key: String,
    pub sentry_dsn: String,
    pub ga_tracking_id: String,
    /// Extra string values made available to templates.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            domain: "https://timpanogos-steel.com".to_string(),
            form_endpoint: "https://script.google.com/macros/s/your-script-id/exec".to_string(),
            recaptcha_site_key: "your-recaptcha-site-key".to_string(),
            sentry_dsn: "your-sentry-dsn".to_string(),
            ga_tracking_id: "your-ga-tracking-id".to_string(),
            variables: BTreeMap::new(),
        }
    }
}

/// What to do when a single record cannot be turned into a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run at the first failing record.
    #[default]
    Abort,
    /// Record the failure and keep going.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!("expected \"abort\" or \"continue\", got {other:?}")),
        }
    }
}

/// What to do when two records map to the same output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The last record in dataset order owns the file.
    #[default]
    Overwrite,
    /// Fail the run before anything is written.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "expected \"overwrite\" or \"reject\", got {other:?}"
            )),
        }
    }
}

/// Generation run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Page template name, relative to the templates directory.
    pub template: String,
    /// Number of records per progress batch.
    pub batch_size: usize,
    pub on_error: FailurePolicy,
    pub on_duplicate: DuplicatePolicy,
    /// Directory of `<section>.txt` boilerplate overrides, relative to the
    /// config file. Stock texts are used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections_dir: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            template: "base.html".to_string(),
            batch_size: 100,
            on_error: FailurePolicy::default(),
            on_duplicate: DuplicatePolicy::default(),
            sections_dir: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel render workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize.
///
/// Does not validate: environment and CLI layers may still fix values up.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    Ok(config)
}

/// Apply environment overrides read through `lookup`.
///
/// Taking a lookup function instead of reading the process environment keeps
/// this testable without mutating global state.
pub fn apply_env_overrides<F>(config: &mut SiteConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let site = &mut config.site;
    for (var, field) in [
        ("SITE_DOMAIN", &mut site.domain),
        ("FORM_ENDPOINT", &mut site.form_endpoint),
        ("RECAPTCHA_SITE_KEY", &mut site.recaptcha_site_key),
        ("SENTRY_DSN", &mut site.sentry_dsn),
        ("GA_TRACKING_ID", &mut site.ga_tracking_id),
    ] {
        if let Some(value) = lookup(var) {
            *field = value;
        }
    }

    let generation = &mut config.generation;
    if let Some(raw) = lookup("BATCH_SIZE") {
        generation.batch_size = raw.trim().parse().map_err(|e| ConfigError::Env {
            var: "BATCH_SIZE".into(),
            message: format!("{e}"),
        })?;
    }
    if let Some(raw) = lookup("ON_ERROR") {
        generation.on_error = raw.parse().map_err(|message| ConfigError::Env {
            var: "ON_ERROR".into(),
            message,
        })?;
    }
    if let Some(raw) = lookup("ON_DUPLICATE") {
        generation.on_duplicate = raw.parse().map_err(|message| ConfigError::Env {
            var: "ON_DUPLICATE".into(),
            message,
        })?;
    }
    Ok(())
}

/// Load config from `path` (if present) and the process environment, then
/// validate.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let mut config = resolve_config(load_raw_config(path)?)?;
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# City Pages Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Every [site] value and the generation policies can also be set through
# environment variables (SITE_DOMAIN, FORM_ENDPOINT, RECAPTCHA_SITE_KEY,
# SENTRY_DSN, GA_TRACKING_ID, BATCH_SIZE, ON_ERROR, ON_DUPLICATE), which take
# precedence over this file.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Site values available to every page
# ---------------------------------------------------------------------------
[site]
# Canonical domain. Each page's page_url is <domain>/<filename>.
domain = "https://timpanogos-steel.com"

# Endpoint the quote request form posts to.
form_endpoint = "https://script.google.com/macros/s/your-script-id/exec"

recaptcha_site_key = "your-recaptcha-site-key"
sentry_dsn = "your-sentry-dsn"
ga_tracking_id = "your-ga-tracking-id"

# Extra string values exposed to templates under their own names.
# Dataset fields win if a name is used by both.
# [site.variables]
# phone = "801-555-0100"

# ---------------------------------------------------------------------------
# Generation
# ---------------------------------------------------------------------------
[generation]
# Page template, relative to the templates directory.
template = "base.html"

# Records per batch. Progress is reported once per batch.
batch_size = 100

# "abort": stop the run at the first record that fails.
# "continue": report failing records at the end and keep going.
on_error = "abort"

# Two records producing the same filename:
# "overwrite": the last record in the dataset owns the file.
# "reject": fail before anything is written.
on_duplicate = "overwrite"

# Directory holding residential.txt, commercial.txt, industrial.txt and/or
# agricultural.txt to replace the stock section boilerplate.
# sections_dir = "sections"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel render workers (used with on_error = "continue").
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_values() {
        let config = SiteConfig::default();
        assert_eq!(config.site.domain, "https://timpanogos-steel.com");
        assert_eq!(config.generation.batch_size, 100);
        assert_eq!(config.generation.template, "base.html");
        assert_eq!(config.generation.on_error, FailurePolicy::Abort);
        assert_eq!(config.generation.on_duplicate, DuplicatePolicy::Overwrite);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[site]
ga_tracking_id = "G-12345"

[generation]
on_error = "continue"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.site.ga_tracking_id, "G-12345");
        assert_eq!(config.generation.on_error, FailurePolicy::Continue);
        // Defaults preserved
        assert_eq!(config.site.domain, "https://timpanogos-steel.com");
        assert_eq!(config.generation.batch_size, 100);
    }

    #[test]
    fn parse_site_variables() {
        let toml = r#"
[site.variables]
phone = "801-555-0100"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.site.variables["phone"], "801-555-0100");
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[generation]
batch_sise = 10
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("[sites]\ndomain = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_policy_value_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str("[generation]\non_error = \"retry\"\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_zero_batch_size() {
        let mut config = SiteConfig::default();
        config.generation.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn validate_domain_must_be_url() {
        let mut config = SiteConfig::default();
        config.site.domain = "timpanogos-steel.com".to_string();
        assert!(config.validate().is_err());

        config.site.domain = "https://".to_string();
        assert!(config.validate().is_err());

        config.site.domain = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_empty_template() {
        let mut config = SiteConfig::default();
        config.generation.template = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zero_max_processes() {
        let mut config = SiteConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Environment overrides
    // =========================================================================

    #[test]
    fn env_overrides_site_values() {
        let mut config = SiteConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("FORM_ENDPOINT", "https://forms.example/x"),
                ("GA_TRACKING_ID", "G-ENV"),
                ("SITE_DOMAIN", "https://staging.example"),
            ]),
        )
        .unwrap();
        assert_eq!(config.site.form_endpoint, "https://forms.example/x");
        assert_eq!(config.site.ga_tracking_id, "G-ENV");
        assert_eq!(config.site.domain, "https://staging.example");
        // Untouched
        assert_eq!(config.site.sentry_dsn, "your-sentry-dsn");
    }

    #[test]
    fn env_overrides_generation_values() {
        let mut config = SiteConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("BATCH_SIZE", "25"),
                ("ON_ERROR", "Continue"),
                ("ON_DUPLICATE", "reject"),
            ]),
        )
        .unwrap();
        assert_eq!(config.generation.batch_size, 25);
        assert_eq!(config.generation.on_error, FailurePolicy::Continue);
        assert_eq!(config.generation.on_duplicate, DuplicatePolicy::Reject);
    }

    #[test]
    fn env_invalid_batch_size_is_error() {
        let mut config = SiteConfig::default();
        let result = apply_env_overrides(&mut config, env(&[("BATCH_SIZE", "lots")]));
        assert!(matches!(result, Err(ConfigError::Env { var, .. }) if var == "BATCH_SIZE"));
    }

    #[test]
    fn env_invalid_policy_is_error() {
        let mut config = SiteConfig::default();
        let result = apply_env_overrides(&mut config, env(&[("ON_ERROR", "ignore")]));
        assert!(matches!(result, Err(ConfigError::Env { var, .. }) if var == "ON_ERROR"));
    }

    #[test]
    fn env_beats_file() {
        let overlay: toml::Value = toml::from_str("[generation]\nbatch_size = 50\n").unwrap();
        let mut config = resolve_config(Some(overlay)).unwrap();
        assert_eq!(config.generation.batch_size, 50);

        apply_env_overrides(&mut config, env(&[("BATCH_SIZE", "10")])).unwrap();
        assert_eq!(config.generation.batch_size, 10);
    }

    // =========================================================================
    // File loading
    // =========================================================================

    #[test]
    fn load_raw_config_returns_none_when_no_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_raw_config(&tmp.path().join("config.toml")).unwrap().is_none());
    }

    #[test]
    fn load_raw_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_raw_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn resolve_config_with_overlay() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[site]
domain = "https://example.org"

[processing]
max_processes = 2
"#,
        )
        .unwrap();

        let config = resolve_config(load_raw_config(&path).unwrap()).unwrap();
        assert_eq!(config.site.domain, "https://example.org");
        assert_eq!(config.processing.max_processes, Some(2));
        assert_eq!(config.generation.template, "base.html");
    }

    #[test]
    fn resolve_config_rejects_unknown_keys() {
        let overlay: toml::Value = toml::from_str("[site]\ndomian = \"x\"\n").unwrap();
        assert!(matches!(resolve_config(Some(overlay)), Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[generation]
batch_size = 100
template = "base.html"
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str("[generation]\nbatch_size = 20\n").unwrap();
        let merged = merge_toml(base, overlay);
        let generation = merged.get("generation").unwrap();
        assert_eq!(generation.get("batch_size").unwrap().as_integer(), Some(20));
        assert_eq!(
            generation.get("template").unwrap().as_str(),
            Some("base.html")
        );
    }

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("a = 10\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("a").unwrap().as_integer(), Some(10));
        assert_eq!(merged.get("b").unwrap().as_integer(), Some(2));
    }

    // =========================================================================
    // Processing config
    // =========================================================================

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // stock_config_toml
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.site.domain, defaults.site.domain);
        assert_eq!(config.site.form_endpoint, defaults.site.form_endpoint);
        assert_eq!(config.generation.batch_size, defaults.generation.batch_size);
        assert_eq!(config.generation.on_error, defaults.generation.on_error);
        assert_eq!(
            config.generation.on_duplicate,
            defaults.generation.on_duplicate
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[site]"));
        assert!(content.contains("[generation]"));
        assert!(content.contains("[processing]"));
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.get("site").is_some());
        assert!(val.get("generation").is_some());
        assert!(val.get("processing").is_some());
    }
}
