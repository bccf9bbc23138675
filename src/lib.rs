//! # snap_arch
//!
//! A small backup daemon with two modes.
//!
//! ## Modes
//!
//! - **Archive** (`running_mode: arch`): watches landing directories, waits
//!   for each new file to stop growing, moves it into an archive directory and
//!   keeps the newest `keep_latest` copies as `name.1.ext`, `name.2.ext`, ...
//! - **Snapshot** (`running_mode: snap`): per chain, on a cron schedule, stops
//!   a service, runs a snapshot command, optionally tars and compresses the
//!   output, ships it via scp, rsync or a local move and restarts the service.
//!
//! ## Quick Start
//!
//! ```no_run
//! use snap_arch::backup::backup_config::BackupConfig;
//! use snap_arch::backup::shutdown;
//! use validator::Validate;
//!
//! let config: BackupConfig = serde_yml::from_reader(std::fs::File::open("config.yml")?)?;
//! config.validate()?;
//!
//! let (trigger, shutdown) = shutdown::channel();
//! trigger.install_ctrlc_handler()?;
//! config.start(&shutdown)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
