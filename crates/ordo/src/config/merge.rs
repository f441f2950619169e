use std::str::FromStr;

use ordo_core::NodeId;

use super::{Config, ConfigLayer};

pub const ENV_BATCH_SIZE: &str = "ORDO_BATCH_SIZE";
pub const ENV_OWNERSHIP_RETRY_MS: &str = "ORDO_OWNERSHIP_RETRY_MS";
pub const ENV_LANES: &str = "ORDO_LANES";
pub const ENV_ACCEPT_IF_ABSENT: &str = "ORDO_ACCEPT_IF_ABSENT";
pub const ENV_NODE_ID: &str = "ORDO_NODE_ID";

/// Defaults, then the user layer, then the local layer.
pub fn merge_layers(user: Option<ConfigLayer>, local: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = local {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and ignored.
pub fn apply_env_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = parsed::<usize, _>(&lookup, ENV_BATCH_SIZE) {
        if value == 0 {
            tracing::warn!("invalid {ENV_BATCH_SIZE}, ignoring: batch size must be positive");
        } else {
            config.coordinator.batch_size = value;
        }
    }

    if let Some(value) = parsed::<u64, _>(&lookup, ENV_OWNERSHIP_RETRY_MS) {
        config.coordinator.ownership_retry_ms = value;
    }

    if let Some(value) = parsed::<usize, _>(&lookup, ENV_LANES) {
        config.lanes.parallelism = value;
    }

    if let Some(raw) = trimmed(&lookup, ENV_ACCEPT_IF_ABSENT) {
        config.submission.accept_if_absent = !matches!(
            raw.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "n" | "off"
        );
    }

    if let Some(raw) = trimmed(&lookup, ENV_NODE_ID) {
        match NodeId::parse_str(&raw) {
            Ok(id) => config.node.id = Some(id),
            Err(err) => tracing::warn!("invalid {ENV_NODE_ID}, ignoring: {err}"),
        }
    }
}

fn trimmed<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = trimmed(lookup, key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}
