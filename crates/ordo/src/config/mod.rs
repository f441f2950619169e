//! Config loading and persistence.

mod load;
mod merge;
mod schema;

pub use load::{
    ConfigError, ENV_CONFIG, config_path, load, load_from_path, load_or_default, load_with,
    user_config_path, write_config,
};
pub use merge::{
    ENV_ACCEPT_IF_ABSENT, ENV_BATCH_SIZE, ENV_LANES, ENV_NODE_ID, ENV_OWNERSHIP_RETRY_MS,
    apply_env_overrides, apply_env_overrides_from, merge_layers,
};
pub use schema::{
    Config, ConfigLayer, CoordinatorConfig, CoordinatorConfigOverride, DEFAULT_BATCH_SIZE,
    DEFAULT_LANE_PARALLELISM, DEFAULT_OWNERSHIP_RETRY_MS, FailurePolicy, FileLoggingConfig,
    FileLoggingConfigOverride, LaneConfig, LaneConfigOverride, LogFormat, LogRotation,
    LoggingConfig, LoggingConfigOverride, NodeConfig, RecoveryInterleave, SubmissionConfig,
    SubmissionConfigOverride,
};
