//! Scheduled snapshot pipeline.
//!
//! Each run walks `Stopping → Snapshotting → Packaging → Transferring →
//! Restarting` and stops at the first failing stage. Stopping and Restarting
//! only happen for chains with a `stop_command`.

pub mod chain;

use crate::backup::command::CommandRunner;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::schedule::CronSchedule;
use crate::backup::shutdown::Shutdown;
use crate::backup::tar::create_compressed_tar_or_clean;
use crate::backup::transfer::TransferTarget;
use crate::backup::relocate::move_path;
use chain::Chain;
use chrono::{DateTime, Utc};
use derive_more::Display;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Stopping,
    Snapshotting,
    Packaging,
    Transferring,
    Restarting,
}

pub struct SnapshotPipeline<'a> {
    chain: &'a Chain,
    target: &'a TransferTarget,
    runner: &'a dyn CommandRunner,
}

impl<'a> SnapshotPipeline<'a> {
    pub fn new(chain: &'a Chain, target: &'a TransferTarget, runner: &'a dyn CommandRunner) -> Self {
        Self {
            chain,
            target,
            runner,
        }
    }

    /// Executes one run with `now` as the snapshot timestamp and returns where
    /// the artifact was placed.
    pub fn run(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let stopped = match self.chain.stop_command() {
            Some(stop) => {
                self.stage(PipelineStage::Stopping, || {
                    self.runner.run(stop, Some(self.chain.local_path().as_path()))
                })?;
                true
            }
            None => false,
        };

        let captured = self.capture_and_ship(now);
        if !stopped {
            return captured;
        }

        if captured.is_err() && self.chain.restart_on_failure() != Some(true) {
            tracing::warn!("Run failed, leaving service stopped as configured");
            return captured;
        }

        let restarted = match self.chain.start_chain_command() {
            Some(start) => self.stage(PipelineStage::Restarting, || {
                self.runner.run(start, Some(self.chain.local_path().as_path()))
            }),
            None => Err(Error::InvalidConfig("stop_command set without start_chain_command".into())
                .stage(PipelineStage::Restarting)),
        };

        match (captured, restarted) {
            (Ok(placed), Ok(_)) => Ok(placed),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(e),
            (Err(e1), Err(e2)) => Err(e1.chain(e2)),
        }
    }

    fn capture_and_ship(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        self.stage(PipelineStage::Snapshotting, || {
            self.runner
                .run(self.chain.snapshot_command(), Some(self.chain.local_path().as_path()))
        })?;

        let tmp = TempDir::new().map_err(|e| Error::from(e).stage(PipelineStage::Packaging))?;
        let artifact = self.stage(PipelineStage::Packaging, || self.package(now, &tmp))?;

        self.stage(PipelineStage::Transferring, || {
            self.target
                .transfer(self.runner, &artifact, self.chain.destination_path())
        })
    }

    fn package(&self, now: DateTime<Utc>, tmp: &TempDir) -> Result<PathBuf> {
        let source = self.chain.resolved_output_path();
        let artifact = tmp.path().join(self.chain.snapshot_name(now));
        if self.chain.compress_snapshot() {
            create_compressed_tar_or_clean(&source, &artifact, self.chain.compressor())?;
            tracing::info!("Compressed snapshot located in temp path: {artifact:?}");
        } else {
            move_path(&source, &artifact)?;
            tracing::info!("Moved snapshot to temp path: {artifact:?}");
        }
        Ok(artifact)
    }

    fn stage<T, F: FnOnce() -> Result<T>>(&self, stage: PipelineStage, f: F) -> Result<T> {
        tracing::info!("{stage} started");
        match f() {
            Ok(v) => {
                tracing::info!("{stage} completed");
                Ok(v)
            }
            Err(e) => {
                tracing::error!("{stage} failed: {e}");
                Err(e.stage(stage))
            }
        }
    }
}

/// Runs `chain` on its schedule until shutdown.
///
/// A failed run is logged and the lane waits for the next tick; runs never
/// overlap because the next fire time is computed after a run returns.
/// A command still running when shutdown fires is awaited, not killed.
pub fn run_chain_lane(
    chain: &Chain,
    schedule: &CronSchedule,
    target: &TransferTarget,
    runner: &dyn CommandRunner,
    shutdown: &Shutdown,
) -> Result<()> {
    let span = tracing::info_span!("chain", name = %chain.label());
    let _entered = span.enter();
    let pipeline = SnapshotPipeline::new(chain, target, runner);

    while let Some(fire_time) = schedule.wait_next(shutdown)? {
        tracing::info!("Scheduled run fired for {fire_time}");
        match pipeline.run(Utc::now()) {
            Ok(placed) => tracing::info!("Snapshot run succeeded, artifact at {placed:?}"),
            Err(e) => tracing::error!("Snapshot run failed:\n{e}"),
        }
    }

    tracing::info!("Lane stopped");
    Ok(())
}
