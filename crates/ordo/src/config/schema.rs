use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use ordo_core::NodeId;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_OWNERSHIP_RETRY_MS: u64 = 2_000;
pub const DEFAULT_LANE_PARALLELISM: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub coordinator: CoordinatorConfig,
    pub lanes: LaneConfig,
    pub submission: SubmissionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Stable identity of this node. A random id is used when unset.
    pub id: Option<NodeId>,
}

/// Which book wins when a recovered backlog and live priority work are both
/// waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryInterleave {
    /// Live priority work runs ahead of an ordinary recovered book, but not
    /// ahead of a recovered priority book.
    #[default]
    PreferPriority,
    /// Every recovered book drains before live priority work.
    RecoveredFirst,
}

ordo_core::enum_str! {
    impl RecoveryInterleave {
        pub fn as_str(&self) -> &'static str;
        pub fn parse_str(raw: &str) -> Option<Self>;
        variants {
            PreferPriority => ["prefer_priority"],
            RecoveredFirst => ["recovered_first"],
        }
    }
}

/// What happens to the envelope of a command whose body failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the envelope, marked failed, in the dead-letter key space.
    #[default]
    DeadLetter,
    /// Delete the envelope.
    Drop,
}

ordo_core::enum_str! {
    impl FailurePolicy {
        pub fn as_str(&self) -> &'static str;
        pub fn parse_str(raw: &str) -> Option<Self>;
        variants {
            DeadLetter => ["dead_letter", "dead-letter"],
            Drop => ["drop"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub batch_size: usize,
    pub ownership_retry_ms: u64,
    pub recovery_interleave: RecoveryInterleave,
    pub failure_policy: FailurePolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            ownership_retry_ms: DEFAULT_OWNERSHIP_RETRY_MS,
            recovery_interleave: RecoveryInterleave::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Desired number of lanes; rounded up to a prime.
    pub parallelism: usize,
    pub name_prefix: String,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_LANE_PARALLELISM,
            name_prefix: "ordo-lane".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Accept submissions for contexts that do not exist yet.
    pub accept_if_absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Tree,
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
            retention_max_age_days: Some(7),
            retention_max_files: Some(10),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfigOverride {
    pub batch_size: Option<usize>,
    pub ownership_retry_ms: Option<u64>,
    pub recovery_interleave: Option<RecoveryInterleave>,
    pub failure_policy: Option<FailurePolicy>,
}

impl CoordinatorConfigOverride {
    pub fn apply_to(&self, target: &mut CoordinatorConfig) {
        if let Some(batch_size) = self.batch_size {
            target.batch_size = batch_size;
        }
        if let Some(retry) = self.ownership_retry_ms {
            target.ownership_retry_ms = retry;
        }
        if let Some(interleave) = self.recovery_interleave {
            target.recovery_interleave = interleave;
        }
        if let Some(policy) = self.failure_policy {
            target.failure_policy = policy;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfigOverride {
    pub parallelism: Option<usize>,
    pub name_prefix: Option<String>,
}

impl LaneConfigOverride {
    pub fn apply_to(&self, target: &mut LaneConfig) {
        if let Some(parallelism) = self.parallelism {
            target.parallelism = parallelism;
        }
        if let Some(prefix) = self.name_prefix.as_ref() {
            target.name_prefix = prefix.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfigOverride {
    pub accept_if_absent: Option<bool>,
}

impl SubmissionConfigOverride {
    pub fn apply_to(&self, target: &mut SubmissionConfig) {
        if let Some(accept) = self.accept_if_absent {
            target.accept_if_absent = accept;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(days) = self.retention_max_age_days {
            target.retention_max_age_days = Some(days);
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}

/// One config file: every field optional, applied over the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub node: NodeConfig,
    pub coordinator: CoordinatorConfigOverride,
    pub lanes: LaneConfigOverride,
    pub submission: SubmissionConfigOverride,
    pub logging: LoggingConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        if let Some(id) = self.node.id {
            base.node.id = Some(id);
        }
        self.coordinator.apply_to(&mut base.coordinator);
        self.lanes.apply_to(&mut base.lanes);
        self.submission.apply_to(&mut base.submission);
        self.logging.apply_to(&mut base.logging);
    }
}
