// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Tracks the discovery server started for each domain

use std::collections::BTreeMap;
use std::fmt;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgid, Pid};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::fork::{self, Invocation};
use crate::signal::SignalKind;
use crate::Error;

/// Identifies one discovery server instance
pub type Domain = u32;

/// Outcome of starting or stopping a domain's server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Started(Domain),
    AlreadyRunning(Domain),
    Stopped(Domain),
    NotRunning(Domain),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Status::Started(domain) => write!(f, "Server for Domain ID '{}' started.", domain),
            Status::AlreadyRunning(domain) => write!(
                f,
                "Discovery server for Domain '{}' is already running.",
                domain
            ),
            Status::Stopped(domain) => {
                write!(f, "Discovery Server for Domain ID '{}' stopped.", domain)
            }
            Status::NotRunning(domain) => {
                write!(f, "Discovery Server for Domain ID '{}' not running.", domain)
            }
        }
    }
}

/// Result of a blocking command run against a domain
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutput {
    /// Standard output of the command, whatever its exit status
    Stdout(String),
    /// The server had to be running and was not, the command was never executed
    NotRunning(Domain),
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutput::Stdout(stdout) => f.write_str(stdout),
            RunOutput::NotRunning(domain) => fmt::Display::fmt(&Status::NotRunning(*domain), f),
        }
    }
}

/// A spawned server, the leader of its own session and process group
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Pid,
}

impl ProcessHandle {
    fn spawn(invocation: &Invocation) -> Result<Self, Error> {
        let child = fork::spawn_detached(invocation)?;
        let pid = child
            .id()
            .ok_or("spawned process has no pid")?;

        Ok(Self {
            child,
            pid: Pid::from_raw(pid as libc::pid_t),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Looks up the process group, fails once the process has been reaped
    pub fn pgid(&self) -> nix::Result<Pid> {
        getpgid(Some(self.pid))
    }
}

/// Maps each domain to the server process started for it
///
/// Every operation holds one lock for its whole duration, including waiting on a stopped server
/// or on a blocking command, so a slow child stalls all other callers until it finishes.
///
/// Call [`Registry::shutdown`] when done with the registry. Dropping it only sends SIGTERM to
/// whatever is still tracked, without waiting.
#[derive(Debug, Default)]
pub struct Registry {
    processes: Mutex<BTreeMap<Domain, ProcessHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the server for `domain` and returns as soon as it exists
    pub async fn start_nonblocking(
        &self,
        domain: Domain,
        invocation: &Invocation,
    ) -> Result<Status, Error> {
        let mut processes = self.processes.lock().await;
        if processes.contains_key(&domain) {
            debug!("domain {} already has a server", domain);
            return Ok(Status::AlreadyRunning(domain));
        }

        let handle = ProcessHandle::spawn(invocation)?;
        info!("started domain {} pid: {}: {}", domain, handle.pid, invocation);

        processes.insert(domain, handle);
        Ok(Status::Started(domain))
    }

    /// Runs a command that inspects or changes a domain's server, waiting for it to exit
    ///
    /// With `check_server` the command only runs if the domain's server is tracked. A non-zero
    /// exit is not an error, whatever was written to stdout is returned; stderr is discarded.
    pub async fn run_blocking(
        &self,
        domain: Domain,
        invocation: &Invocation,
        check_server: bool,
    ) -> Result<RunOutput, Error> {
        let processes = self.processes.lock().await;
        if check_server && !processes.contains_key(&domain) {
            return Ok(RunOutput::NotRunning(domain));
        }

        let output = fork::run_captured(invocation).await?;
        if !output.status.success() {
            warn!(
                "command for domain {} failed ({}): {}",
                domain, output.status, invocation
            );
        }

        Ok(RunOutput::Stdout(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }

    /// Signals the domain's whole process group and waits for the server to exit
    pub async fn stop(&self, domain: Domain, signal: SignalKind) -> Result<Status, Error> {
        let mut processes = self.processes.lock().await;
        stop_locked(&mut processes, domain, signal).await
    }

    /// Domain to pid of every tracked server
    pub async fn list(&self) -> BTreeMap<Domain, u32> {
        let processes = self.processes.lock().await;
        processes
            .iter()
            .map(|(domain, handle)| (*domain, handle.pid()))
            .collect()
    }

    /// Stops every tracked domain, one status line per domain in ascending domain order
    pub async fn stop_all(&self, signal: SignalKind) -> Result<String, Error> {
        let mut processes = self.processes.lock().await;
        stop_all_locked(&mut processes, signal).await
    }

    /// Terminates everything still tracked
    pub async fn shutdown(&self) -> Result<String, Error> {
        info!("shutting down all domains");
        self.stop_all(SignalKind::Terminate).await
    }
}

async fn stop_locked(
    processes: &mut BTreeMap<Domain, ProcessHandle>,
    domain: Domain,
    signal: SignalKind,
) -> Result<Status, Error> {
    let handle = match processes.get_mut(&domain) {
        Some(handle) => handle,
        None => return Ok(Status::NotRunning(domain)),
    };

    let pgid = handle.pgid()?;
    debug!("sending {} to domain {} pgid: {}", signal, domain, pgid);
    killpg(pgid, signal.signal())?;

    let exit = handle.child.wait().await?;
    info!("stopped domain {} pid: {}: {}", domain, handle.pid, exit);

    processes.remove(&domain);
    Ok(Status::Stopped(domain))
}

async fn stop_all_locked(
    processes: &mut BTreeMap<Domain, ProcessHandle>,
    signal: SignalKind,
) -> Result<String, Error> {
    // snapshot, stop_locked removes entries as it goes
    let domains: Vec<Domain> = processes.keys().copied().collect();

    let mut ret = String::new();
    for domain in domains {
        let status = stop_locked(processes, domain, signal).await?;
        ret.push_str(&status.to_string());
        ret.push('\n');
    }

    Ok(ret)
}

impl Drop for Registry {
    fn drop(&mut self) {
        for (domain, handle) in self.processes.get_mut().iter() {
            match handle
                .pgid()
                .and_then(|pgid| killpg(pgid, Signal::SIGTERM))
            {
                Ok(()) => debug!("terminated domain {} on drop", domain),
                Err(e) => warn!("failed to terminate domain {} on drop: {}", domain, e),
            }
        }
    }
}
