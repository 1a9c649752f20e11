// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tally.toml` > `~/.config/tally/tally.toml` > `/etc/tally/tally.toml`
//! with environment variable overrides via the `TALLY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TallyConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tally/tally.toml`
/// 3. `~/.config/tally/tally.toml`
/// 4. `./tally.toml`
/// 5. `TALLY_*` environment variables
pub fn load_config() -> Result<TallyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    config_search_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(TallyConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// TOML files consulted by [`load_config`], lowest precedence first.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/tally/tally.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("tally/tally.toml"));
    }
    paths.push(PathBuf::from("tally.toml"));
    paths
}

/// Environment provider mapping `TALLY_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")`: keys contain underscores,
/// so `TALLY_WEBHOOK_SIGNING_SECRET` must become `webhook.signing_secret`.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("TALLY_").map(|key| {
        // Keys arrive in their original case.
        map_env_key(&key.as_str().to_ascii_lowercase()).into()
    })
}

/// Maps a lowercased, prefix-stripped env key to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 6] = ["service", "storage", "gateway", "webhook", "retry", "health"];
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("webhook_signing_secret"), "webhook.signing_secret");
        assert_eq!(map_env_key("retry_max_delay_ms"), "retry.max_delay_ms");
        assert_eq!(map_env_key("gateway_admin_token"), "gateway.admin_token");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn env_overrides_reach_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TALLY_WEBHOOK_SIGNING_SECRET", "whsec_dGVzdA==");
            jail.set_env("TALLY_RETRY_BATCH_SIZE", "25");
            let config: TallyConfig = Figment::new()
                .merge(Serialized::defaults(TallyConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.webhook.signing_secret.as_deref(), Some("whsec_dGVzdA=="));
            assert_eq!(config.retry.batch_size, 25);
            Ok(())
        });
    }

    #[test]
    fn env_override_beats_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[retry]\nmax_retries = 3\n")?;
            jail.set_env("TALLY_RETRY_MAX_RETRIES", "8");
            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.retry.max_retries, 8);
            Ok(())
        });
    }
}
