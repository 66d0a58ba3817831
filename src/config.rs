// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;

use clap::ArgMatches;

use crate::signal::SignalKind;
use crate::Error;

pub const SOCKET: &str = "socket";
pub const SOCKET_ENV: &str = "DOMAIND_SOCKET";
pub const SIGNAL: &str = "signal";

/// Settings shared by the daemon and the client commands
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Control socket of the daemon
    pub socket: PathBuf,
    /// Signal used by `stop` and `stop-all`
    pub signal: SignalKind,
}

impl Config {
    pub fn default_socket() -> PathBuf {
        std::env::temp_dir().join("domaind.sock")
    }

    /// `args` are the top level matches, the signal is taken from the selected subcommand
    pub fn from_args(args: &ArgMatches<'_>) -> Result<Self, Error> {
        let socket = args
            .value_of_os(SOCKET)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_socket);

        let signal = match args.subcommand() {
            (_, Some(sub)) => sub
                .value_of(SIGNAL)
                .map(|s| s.parse::<SignalKind>())
                .transpose()?
                .unwrap_or_default(),
            _ => SignalKind::default(),
        };

        Ok(Self { socket, signal })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: Self::default_socket(),
            signal: SignalKind::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::{App, Arg, SubCommand};

    fn app() -> App<'static, 'static> {
        App::new("test")
            .arg(Arg::with_name(SOCKET).long(SOCKET).takes_value(true))
            .subcommand(
                SubCommand::with_name("stop").arg(Arg::with_name(SIGNAL).long(SIGNAL).takes_value(true)),
            )
            .subcommand(SubCommand::with_name("list"))
    }

    #[test]
    fn test_defaults() {
        let args = app().get_matches_from(vec!["test", "list"]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config, Config::default());
        assert!(config.socket.ends_with("domaind.sock"));
    }

    #[test]
    fn test_socket_and_signal() {
        let args =
            app().get_matches_from(vec!["test", "--socket", "/run/d.sock", "stop", "--signal", "kill"]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.socket, PathBuf::from("/run/d.sock"));
        assert_eq!(config.signal, SignalKind::Kill);
    }

    #[test]
    fn test_bad_signal() {
        let args = app().get_matches_from(vec!["test", "stop", "--signal", "5"]);
        assert!(Config::from_args(&args).is_err());
    }
}
