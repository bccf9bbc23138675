//! Detects the end of an in-flight upload by watching a file's size.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::shutdown::Shutdown;
use bon::Builder;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::Path;
use std::time::{Duration, Instant};
use validator::{Validate, ValidationError};

static DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
static DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(5);

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_stability_window() -> Duration {
    DEFAULT_STABILITY_WINDOW
}

/// Polling settings for [`StableFileDetector`].
///
/// A file is considered fully written once its size has not changed for
/// `stability_window`, sampled every `poll_interval`. Without a `timeout` a
/// stalled upload blocks its watch lane indefinitely.
#[skip_serializing_none]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Validate, Builder, CopyGetters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct StableFileDetector {
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    #[validate(custom(function = validate_non_zero_duration))]
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    poll_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_stability_window")]
    #[builder(default = DEFAULT_STABILITY_WINDOW)]
    stability_window: Duration,
    #[serde(with = "humantime_serde", default)]
    timeout: Option<Duration>,
}

impl Default for StableFileDetector {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn validate_non_zero_duration(duration: &Duration) -> std::result::Result<(), ValidationError> {
    if duration.is_zero() {
        return Err(ValidationError::new("InvalidDuration")
            .with_message("poll_interval must be greater than zero".into()));
    }
    Ok(())
}

impl StableFileDetector {
    /// Blocks until `path` has kept the same size for the stability window and
    /// returns that size.
    ///
    /// Fails if the file cannot be read (e.g. it was deleted mid-upload), if
    /// the optional timeout elapses, or on shutdown.
    pub fn wait_until_stable<P: AsRef<Path>>(&self, path: P, shutdown: &Shutdown) -> Result<u64> {
        let path = path.as_ref();
        let started = Instant::now();
        let mut last_size = read_size(path)?;
        let mut unchanged_since = Instant::now();

        loop {
            if unchanged_since.elapsed() >= self.stability_window {
                tracing::debug!("{path:?} stable at {last_size} bytes");
                return Ok(last_size);
            }
            if let Some(timeout) = self.timeout {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(Error::StabilityTimeout {
                        path: path.to_path_buf(),
                        waited,
                    });
                }
            }
            if shutdown.wait_timeout(self.poll_interval) {
                return Err(Error::Cancelled);
            }

            let size = read_size(path)?;
            if size != last_size {
                tracing::trace!("{path:?} size changed {last_size} -> {size}");
                last_size = size;
                unchanged_since = Instant::now();
            }
        }
    }
}

fn read_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|md| md.len())
        .map_err(Error::from)
        .with_msg(format!("Reading size of {path:?} failed"))
}
