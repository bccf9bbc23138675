//! Final placement of a snapshot artifact.

use crate::backup::command::{CommandLine, CommandRunner};
use crate::backup::relocate::move_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Display, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferProtocol {
    /// `scp` to `credentials@server:destination_path`
    #[display("scp")]
    Scp,
    /// `rsync -avz` to `credentials@server:destination_path`
    #[display("rsync")]
    Rsync,
    /// Local move into `destination_path`
    #[display("mv")]
    #[serde(alias = "local_move")]
    Mv,
}

/// Remote login for the secure-shell based protocols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub server: String,
    pub credentials: String,
}

impl RemoteEndpoint {
    fn target<P: AsRef<Path>>(&self, destination: P) -> OsString {
        let mut target = OsString::from(format!("{}@{}:", self.credentials, self.server));
        target.push(destination.as_ref());
        target
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferTarget {
    Scp(RemoteEndpoint),
    Rsync(RemoteEndpoint),
    LocalMove,
}

impl TransferTarget {
    /// Builds the target for `protocol`; the secure-shell protocols need both
    /// `server` and `credentials`.
    pub fn new(
        protocol: TransferProtocol,
        server: Option<&str>,
        credentials: Option<&str>,
    ) -> Result<Self> {
        let endpoint = || match (server, credentials) {
            (Some(server), Some(credentials)) if !server.is_empty() && !credentials.is_empty() => {
                Ok(RemoteEndpoint {
                    server: server.to_string(),
                    credentials: credentials.to_string(),
                })
            }
            _ => Err(Error::InvalidConfig(format!(
                "protocol {protocol} requires both server and credentials"
            ))),
        };
        Ok(match protocol {
            TransferProtocol::Scp => Self::Scp(endpoint()?),
            TransferProtocol::Rsync => Self::Rsync(endpoint()?),
            TransferProtocol::Mv => Self::LocalMove,
        })
    }

    pub fn protocol(&self) -> TransferProtocol {
        match self {
            Self::Scp(_) => TransferProtocol::Scp,
            Self::Rsync(_) => TransferProtocol::Rsync,
            Self::LocalMove => TransferProtocol::Mv,
        }
    }

    /// Places `artifact` at `destination`. Returns where the artifact ended up
    /// (a `credentials@server:path` string for remote targets).
    pub fn transfer(
        &self,
        runner: &dyn CommandRunner,
        artifact: &Path,
        destination: &Path,
    ) -> Result<PathBuf> {
        tracing::info!("Transferring {artifact:?} to {destination:?} via {}", self.protocol());
        match self {
            Self::Scp(remote) => {
                let target = remote.target(destination);
                let cmd = CommandLine::new(
                    "scp",
                    [OsString::from("-r"), "-q".into(), artifact.into(), target.clone()],
                );
                runner.run(&cmd, None)?;
                Ok(target.into())
            }
            Self::Rsync(remote) => {
                let target = remote.target(destination);
                let cmd = CommandLine::new(
                    "rsync",
                    [OsString::from("-avz"), artifact.into(), target.clone()],
                );
                runner.run(&cmd, None)?;
                Ok(target.into())
            }
            Self::LocalMove => {
                let file_name = artifact.file_name().ok_or_else(|| {
                    Error::from(std::io::Error::other(format!("{artifact:?} has no file name")))
                })?;
                std::fs::create_dir_all(destination)
                    .map_err(Error::from)
                    .with_msg(format!("Creating {destination:?} failed"))?;
                let placed = destination.join(file_name);
                move_path(artifact, &placed)?;
                Ok(placed)
            }
        }
    }
}
