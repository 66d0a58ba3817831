// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Building and spawning the external commands that the registry supervises

use std::convert::TryFrom;
use std::fmt;
use std::process::{Output, Stdio};

use nix::unistd::setsid;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::Error;

pub struct StdIoConf {
    pub stdin: Stdio,
    pub stderr: Stdio,
    pub stdout: Stdio,
}

impl StdIoConf {
    /// No input, output is held in pipes until someone reads it
    pub fn captured() -> Self {
        StdIoConf {
            stdin: Stdio::null(),
            stderr: Stdio::piped(),
            stdout: Stdio::piped(),
        }
    }
}

/// A fully formed external command, either an argument vector or a line for `sh -c`
///
/// The first element of the argument vector is the program, it is never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Invocation {
    argv: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err("an invocation requires at least a program".into());
        }

        Ok(Self { argv })
    }

    pub fn shell<S: Into<String>>(line: S) -> Self {
        Self {
            argv: vec!["sh".to_string(), "-c".to_string(), line.into()],
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    fn command(&self, stdio: StdIoConf) -> Command {
        let mut command = Command::new(self.program());
        command
            .args(self.args())
            .stdin(stdio.stdin)
            .stdout(stdio.stdout)
            .stderr(stdio.stderr);
        command
    }
}

impl TryFrom<Vec<String>> for Invocation {
    type Error = Error;

    fn try_from(argv: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(argv)
    }
}

impl From<Invocation> for Vec<String> {
    fn from(invocation: Invocation) -> Self {
        invocation.argv
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Starts the invocation as the leader of a new session and returns without waiting on it
///
/// The child's process group id equals its pid, so the whole group, including anything the
/// command itself forks, can be signalled together later.
pub fn spawn_detached(invocation: &Invocation) -> Result<Child, Error> {
    let mut command = invocation.command(StdIoConf::captured());

    // This is safe, setsid is async-signal-safe and nothing is allocated between fork and exec
    unsafe {
        command.pre_exec(|| {
            setsid()?;
            Ok(())
        });
    }

    let child = command.spawn()?;
    debug!("spawned detached: {} pid: {:?}", invocation, child.id());

    Ok(child)
}

/// Runs the invocation to completion, collecting stdout and stderr
pub async fn run_captured(invocation: &Invocation) -> Result<Output, Error> {
    let output = invocation
        .command(StdIoConf::captured())
        .output()
        .await?;

    debug!("{} exited: {}", invocation, output.status);
    Ok(output)
}
