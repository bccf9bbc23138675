use clap::Parser;
use snap_arch::backup::backup_config::BackupConfig;
use snap_arch::backup::result_error::error::Error;
use snap_arch::backup::result_error::result::Result;
use snap_arch::backup::result_error::WithMsg;
use snap_arch::backup::shutdown;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use validator::Validate;

/// Archive newly landed files or run scheduled service snapshots
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
}

fn load_config(path: &PathBuf) -> Result<BackupConfig> {
    File::open(path)
        .map_err(Error::from)
        .with_msg(format!("Open config failed: {path:?}"))
        .and_then(|f| {
            serde_yml::from_reader::<_, BackupConfig>(f)
                .map_err(Error::from)
                .with_msg(format!("Parse YAML config failed: {path:?}"))
        })
        .and_then(|bc| {
            bc.validate()
                .map_err(Error::from)
                .map(|_| bc)
                .with_msg(format!("Config validation failed: {path:?}"))
        })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let (trigger, shutdown) = shutdown::channel();
    let res = load_config(&args.config).and_then(|bc| {
        trigger.install_ctrlc_handler()?;
        bc.start(&shutdown)
    });

    match res {
        Ok(_) => info!("All lanes stopped, exiting"),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
