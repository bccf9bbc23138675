use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::shutdown::Shutdown;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A validated cron expression (five fields, evaluated in UTC).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSchedule {
    cron: Arc<str>,
}

impl CronSchedule {
    pub fn new<S: Into<Arc<str>>>(cron: S) -> Result<Self> {
        let schedule = Self { cron: cron.into() };
        schedule.next_after(Utc::now())?;
        Ok(schedule)
    }

    pub fn cron(&self) -> &str {
        &self.cron
    }

    /// First fire time strictly after `reference`.
    pub fn next_after(&self, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
        cron_parser::parse(&self.cron, &reference).map_err(|e| Error::InvalidCron {
            cron: self.cron.to_string(),
            reason: format!("{e:?}"),
        })
    }

    /// Sleeps until the next fire time computed from now.
    ///
    /// Returns the fire time, or `None` when shutdown interrupts the wait.
    /// Ticks that passed while the caller was busy are skipped, not replayed.
    pub fn wait_next(&self, shutdown: &Shutdown) -> Result<Option<DateTime<Utc>>> {
        let next = self.next_after(Utc::now())?;
        tracing::info!("Sleeping until {next}");
        loop {
            let now = Utc::now();
            if now >= next {
                return Ok(Some(next));
            }
            let remaining = (next - now).to_std().unwrap_or_default();
            if shutdown.wait_timeout(remaining) {
                return Ok(None);
            }
        }
    }
}
