//! External command invocation.
//!
//! Commands are structured argument lists handed straight to
//! [`std::process::Command`]; no shell ever sees configuration values.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ffi::{OsStr, OsString};
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::process::{Command, Stdio};
use std::result;

/// A program and its arguments.
///
/// Deserializes from either a list (`[docker, compose, stop]`) or a string,
/// which is split on whitespace without any quoting rules.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandLine {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn from_words<I: IntoIterator<Item = String>>(words: I) -> Option<Self> {
        let mut words = words.into_iter();
        let program = words.next().filter(|p| !p.is_empty())?;
        Some(Self::new(program, words))
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

impl Debug for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{self}`")
    }
}

impl Serialize for CommandLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.collect_seq(
            std::iter::once(&self.program)
                .chain(self.args.iter())
                .map(|s| s.to_string_lossy()),
        )
    }
}

struct CommandLineVisitor;

impl<'de> Visitor<'de> for CommandLineVisitor {
    type Value = CommandLine;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a non-empty command string or list of arguments")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        CommandLine::from_words(v.split_whitespace().map(str::to_string))
            .ok_or_else(|| E::custom("command must not be empty"))
    }

    fn visit_seq<A>(self, mut seq: A) -> result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut words = Vec::new();
        while let Some(word) = seq.next_element::<String>()? {
            words.push(word);
        }
        CommandLine::from_words(words)
            .ok_or_else(|| serde::de::Error::custom("command must not be empty"))
    }
}

impl<'de> Deserialize<'de> for CommandLine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_any(CommandLineVisitor)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands to completion.
pub trait CommandRunner: Send + Sync {
    /// Runs `command`, in `cwd` when given. A non-zero exit is an error.
    fn run(&self, command: &CommandLine, cwd: Option<&Path>) -> Result<CommandOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &CommandLine, cwd: Option<&Path>) -> Result<CommandOutput> {
        tracing::debug!("Running {command} in {cwd:?}");
        let mut process = Command::new(command.program());
        process
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            process.current_dir(cwd);
        }

        let output = process
            .output()
            .map_err(Error::from)
            .with_msg(format!("Failed to spawn {command}"))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }

        if !stdout.trim().is_empty() {
            tracing::debug!("{command} output:\n{}", stdout.trim_end());
        }
        Ok(CommandOutput { stdout, stderr })
    }
}
