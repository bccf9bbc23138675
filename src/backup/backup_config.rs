use crate::backup::archive::watcher::ChangeWatcher;
use crate::backup::archive::{run_watch_lane, ArchiveLocks, ArchiveUnit, WatchSpec};
use crate::backup::command::{CommandRunner, SystemCommandRunner};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::schedule::CronSchedule;
use crate::backup::shutdown::Shutdown;
use crate::backup::snapshot::chain::Chain;
use crate::backup::snapshot::run_chain_lane;
use crate::backup::transfer::{TransferProtocol, TransferTarget};
use derive_more::Display;
use function_name::named;
use itertools::Itertools;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::{Validate, ValidationError};

#[derive(Clone, Copy, Debug, Display, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunningMode {
    #[serde(rename = "snap")]
    #[display("snapshot")]
    Snap,
    #[serde(rename = "arch")]
    #[display("archive")]
    Arch,
}

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_mode_sections))]
pub struct BackupConfig {
    pub running_mode: RunningMode,
    #[serde(default)]
    #[validate(nested)]
    pub directories: Vec<WatchSpec>,
    #[serde(default)]
    #[validate(nested)]
    pub chains: Vec<Chain>,
    pub protocol: Option<TransferProtocol>,
    pub server: Option<String>,
    pub credentials: Option<String>,
}

fn validate_mode_sections(config: &BackupConfig) -> std::result::Result<(), ValidationError> {
    match config.running_mode {
        RunningMode::Arch if config.directories.is_empty() => Err(ValidationError::new(
            "MissingDirectories",
        )
        .with_message("archive mode needs at least one entry in directories".into())),
        RunningMode::Snap if config.chains.is_empty() => Err(ValidationError::new("MissingChains")
            .with_message("snapshot mode needs at least one entry in chains".into())),
        RunningMode::Snap => config.transfer_target().map(|_| ()).map_err(|e| {
            ValidationError::new("InvalidTransferTarget").with_message(e.to_string().into())
        }),
        RunningMode::Arch => Ok(()),
    }
}

impl BackupConfig {
    pub fn transfer_target(&self) -> Result<TransferTarget> {
        let protocol = self
            .protocol
            .ok_or_else(|| Error::InvalidConfig("protocol is required in snapshot mode".into()))?;
        TransferTarget::new(protocol, self.server.as_deref(), self.credentials.as_deref())
    }

    /// Runs the configured mode until `shutdown` fires.
    pub fn start(&self, shutdown: &Shutdown) -> Result<()> {
        tracing::info!("Running in {} mode.", self.running_mode);
        match self.running_mode {
            RunningMode::Arch => run_archive_mode(self, shutdown),
            RunningMode::Snap => run_snapshot_mode(self, shutdown),
        }
    }
}

/// Watches every configured directory pair until shutdown.
///
/// All watches are registered before any lane starts, so a directory that
/// cannot be watched fails the whole start-up.
#[named]
pub fn run_archive_mode(config: &BackupConfig, shutdown: &Shutdown) -> Result<()> {
    let locks = ArchiveLocks::default();
    let units = config
        .directories
        .iter()
        .map(|spec| {
            ChangeWatcher::new(spec.watch_directory())
                .with_debug_object_and_fn_name(spec.clone(), function_path!())
                .map(|watcher| (ArchiveUnit::new(spec, &locks), watcher))
        })
        .collect::<Result<Vec<_>>>()?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(units.len().max(1))
        .thread_name(|i| format!("watch-{i}"))
        .build()?;

    pool.scope(|s| {
        for (unit, watcher) in units {
            s.spawn(move |_| {
                if let Err(e) = run_watch_lane(&unit, &watcher, shutdown) {
                    tracing::error!("Watch lane ended with error:\n{e}");
                }
            });
        }
    });
    Ok(())
}

/// Runs every chain on its own schedule until shutdown.
pub fn run_snapshot_mode(config: &BackupConfig, shutdown: &Shutdown) -> Result<()> {
    run_snapshot_mode_with(config, &SystemCommandRunner, shutdown)
}

pub fn run_snapshot_mode_with(
    config: &BackupConfig,
    runner: &dyn CommandRunner,
    shutdown: &Shutdown,
) -> Result<()> {
    let target = config.transfer_target()?;
    let lanes = config
        .chains
        .iter()
        .map(|chain| {
            CronSchedule::new(chain.schedule_time().as_str())
                .with_msg(format!("Chain {} has an invalid schedule", chain.label()))
                .map(|schedule| (chain, schedule))
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(
        "Scheduling {} chain(s): {}",
        lanes.len(),
        lanes.iter().map(|(c, s)| format!("{} [{}]", c.label(), s.cron())).join(", ")
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(lanes.len().max(1))
        .thread_name(|i| format!("chain-{i}"))
        .build()?;

    let target = &target;
    pool.scope(|s| {
        for (chain, schedule) in &lanes {
            s.spawn(move |_| {
                if let Err(e) = run_chain_lane(chain, schedule, target, runner, shutdown) {
                    tracing::error!("Chain lane ended with error:\n{e}");
                }
            });
        }
    });
    Ok(())
}
