use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::backup::snapshot::PipelineStage;
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    Ctrlc(#[from] ctrlc::Error),
    #[error("Invalid cron string {cron:?}: {reason}")]
    InvalidCron { cron: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Command `{command}` exited with {status}:\n{}", indent::indent_all_with("  ", .stderr))]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("File {path:?} still changing after {waited:?}")]
    StabilityTimeout { path: PathBuf, waited: Duration },
    #[error("{stage} failed:\n{}", indent::indent_all_with("  ", error.to_string()))]
    StageFailed {
        stage: PipelineStage,
        error: Box<Error>,
    },
    #[error("Interrupted by shutdown")]
    Cancelled,
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    pub fn stage(self, stage: PipelineStage) -> Error {
        Error::StageFailed {
            stage,
            error: Box::new(self),
        }
    }

    /// True when the innermost cause is a shutdown interruption.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::WithMsg { error, .. }
            | Error::WithDebugObjAndFnName { error, .. }
            | Error::StageFailed { error, .. } => error.is_cancelled(),
            _ => false,
        }
    }
}
