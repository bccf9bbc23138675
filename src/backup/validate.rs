//! Validation functions for configuration values.
//!
//! Used through `#[validate(custom(function = ...))]` on the config records.

use crate::backup::snapshot::chain::TIMESTAMP_PLACEHOLDER;
use chrono::Utc;
use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_cron_str<S: AsRef<str>>(cron: S) -> Result<(), ValidationError> {
    let cron = cron.as_ref();
    if cron_parser::parse(cron, &Utc::now()).is_err() {
        return Err(ValidationError::new("InvalidCron")
            .with_message(format!("Invalid cron string: {cron:?}").into()));
    }

    Ok(())
}

/// The format must carry the timestamp placeholder and render to a plain file
/// name.
pub fn validate_snapshot_name_format<S: AsRef<str>>(format: S) -> Result<(), ValidationError> {
    let format = format.as_ref();
    if !format.contains(TIMESTAMP_PLACEHOLDER) {
        return Err(ValidationError::new("InvalidSnapshotName").with_message(
            format!("{format:?} must contain the {TIMESTAMP_PLACEHOLDER} placeholder").into(),
        ));
    }

    let rendered = format.replace(TIMESTAMP_PLACEHOLDER, "20000101000000");
    if !is_sanitized(&rendered) {
        return Err(ValidationError::new("InvalidSnapshotName").with_message(
            format!(
                "Invalid file name, try sanitizing like {:?}",
                sanitize(&rendered)
            )
            .into(),
        ));
    }

    Ok(())
}
