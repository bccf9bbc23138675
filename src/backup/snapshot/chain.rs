use crate::backup::command::CommandLine;
use crate::backup::compress::CompressorConfig;
use crate::backup::validate::{validate_cron_str, validate_dir_exist, validate_snapshot_name_format};
use bon::Builder;
use chrono::{DateTime, Utc};
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

pub static TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";
static TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One scheduled snapshot target.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_stop_start_pairing))]
pub struct Chain {
    #[getset(get = "pub")]
    #[builder(into)]
    name: Option<String>,
    /// Working directory of every chain command.
    #[validate(custom(function = validate_dir_exist))]
    #[getset(get = "pub")]
    #[builder(into)]
    local_path: PathBuf,
    #[getset(get = "pub")]
    snapshot_command: CommandLine,
    #[getset(get = "pub")]
    stop_command: Option<CommandLine>,
    #[getset(get = "pub")]
    start_chain_command: Option<CommandLine>,
    /// Whether the service is restarted after a failed snapshot, packaging or
    /// transfer. Required when `stop_command` is set.
    #[getset(get_copy = "pub")]
    restart_on_failure: Option<bool>,
    #[validate(custom(function = validate_snapshot_name_format))]
    #[getset(get = "pub")]
    #[builder(into)]
    snapshot_name_format: String,
    #[getset(get_copy = "pub")]
    compress_snapshot: bool,
    #[serde(default)]
    #[validate(nested)]
    #[getset(get = "pub")]
    #[builder(default)]
    compressor: CompressorConfig,
    #[getset(get = "pub")]
    #[builder(into)]
    snapshot_output_path: PathBuf,
    #[getset(get = "pub")]
    #[builder(into)]
    destination_path: PathBuf,
    #[validate(custom(function = validate_cron_str))]
    #[getset(get = "pub")]
    #[builder(into)]
    schedule_time: String,
}

fn validate_stop_start_pairing(chain: &Chain) -> Result<(), ValidationError> {
    if chain.stop_command.is_none() {
        return Ok(());
    }
    if chain.start_chain_command.is_none() {
        return Err(ValidationError::new("MissingStartCommand")
            .with_message("start_chain_command is required when stop_command is set".into()));
    }
    if chain.restart_on_failure.is_none() {
        return Err(ValidationError::new("MissingRestartPolicy").with_message(
            "restart_on_failure must be set explicitly when stop_command is set".into(),
        ));
    }
    Ok(())
}

impl Chain {
    /// Name used in logs: the configured name, else the working directory.
    pub fn label(&self) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => self.local_path.to_string_lossy(),
        }
    }

    /// `snapshot_name_format` with the placeholder replaced by `dt` as
    /// `YYYYMMDDHHMMSS`.
    pub fn snapshot_name(&self, dt: DateTime<Utc>) -> String {
        self.snapshot_name_format.replace(
            TIMESTAMP_PLACEHOLDER,
            &dt.format(TIMESTAMP_FORMAT).to_string(),
        )
    }

    /// `snapshot_output_path`, relative paths resolved against `local_path`.
    pub fn resolved_output_path(&self) -> PathBuf {
        resolve(&self.local_path, &self.snapshot_output_path)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
