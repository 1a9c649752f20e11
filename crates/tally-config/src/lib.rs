// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Settings for the webhook reconciliation service.
//!
//! A [`TallyConfig`] is assembled from compiled defaults, `tally.toml` files
//! and `TALLY_<SECTION>_<KEY>` variables, then checked for cross-field
//! consistency (delay bounds, the processing deadline against the request
//! deadline). Problems come back as [`ConfigError`] diagnostics that
//! [`render_errors`] prints with source spans and key suggestions.
//!
//! ```no_run
//! let config = tally_config::load_and_validate().expect("config errors");
//! println!("webhooks on {}:{}", config.gateway.host, config.gateway.port);
//! ```

use std::path::Path;

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::TallyConfig;

/// Settings for `tally serve` and `tally status` when no `--config` is given.
pub fn load_and_validate() -> Result<TallyConfig, Vec<ConfigError>> {
    checked(loader::load_config(), collect_toml_sources)
}

/// Inline TOML only; environment variables are ignored.
pub fn load_and_validate_str(toml_content: &str) -> Result<TallyConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// An explicit `--config` file, still overridable through `TALLY_*` variables.
pub fn load_and_validate_path(path: &Path) -> Result<TallyConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Validates a loaded config, or turns the load failure into diagnostics.
///
/// `sources` is only read on failure, to attach spans to unknown keys.
fn checked(
    loaded: Result<TallyConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<TallyConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

fn collect_toml_sources() -> Vec<(String, String)> {
    loader::config_search_paths()
        .iter()
        .filter_map(|path| read_source(path))
        .collect()
}

/// File contents keyed by the absolute path figment reports in errors.
fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let shown = std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();
    Some((shown, content))
}
