// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

use crate::Error;

/// The signal delivered to a server's process group when it is stopped
///
/// On the command line and in older clients this is selected by number:
///
/// | value | kind      | signal  |
/// |-------|-----------|---------|
/// | 0     | Interrupt | SIGINT  |
/// | 1     | Terminate | SIGTERM |
/// | 2     | Kill      | SIGKILL |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Ask the server to shut down gracefully
    Interrupt,
    /// Standard termination request
    Terminate,
    /// Cannot be caught or ignored
    Kill,
}

impl SignalKind {
    pub fn signal(self) -> Signal {
        match self {
            SignalKind::Interrupt => Signal::SIGINT,
            SignalKind::Terminate => Signal::SIGTERM,
            SignalKind::Kill => Signal::SIGKILL,
        }
    }
}

impl Default for SignalKind {
    fn default() -> Self {
        SignalKind::Terminate
    }
}

impl TryFrom<u8> for SignalKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SignalKind::Interrupt),
            1 => Ok(SignalKind::Terminate),
            2 => Ok(SignalKind::Kill),
            other => Err(format!("unknown signal kind: {}", other).into()),
        }
    }
}

impl FromStr for SignalKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<u8>() {
            return SignalKind::try_from(value);
        }

        let name = s.to_ascii_uppercase();
        let name = name.strip_prefix("SIG").unwrap_or(&name);
        match name {
            "INT" => Ok(SignalKind::Interrupt),
            "TERM" => Ok(SignalKind::Terminate),
            "KILL" => Ok(SignalKind::Kill),
            _ => Err(format!("unknown signal kind: {}", s).into()),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signal().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_selector() {
        assert_eq!(SignalKind::try_from(0).unwrap().signal(), Signal::SIGINT);
        assert_eq!(SignalKind::try_from(1).unwrap().signal(), Signal::SIGTERM);
        assert_eq!(SignalKind::try_from(2).unwrap().signal(), Signal::SIGKILL);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        assert!(SignalKind::try_from(3).is_err());
        assert!(SignalKind::try_from(255).is_err());
        assert!("7".parse::<SignalKind>().is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!("term".parse::<SignalKind>().unwrap(), SignalKind::Terminate);
        assert_eq!("SIGKILL".parse::<SignalKind>().unwrap(), SignalKind::Kill);
        assert_eq!("sigint".parse::<SignalKind>().unwrap(), SignalKind::Interrupt);
        assert_eq!("0".parse::<SignalKind>().unwrap(), SignalKind::Interrupt);
        assert!("hup".parse::<SignalKind>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SignalKind::Terminate.to_string(), "SIGTERM");
        assert_eq!(SignalKind::Kill.to_string(), "SIGKILL");
    }
}
