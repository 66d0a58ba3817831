// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Supervision of discovery servers, one per domain

pub mod client;
pub mod config;
pub mod daemon;
mod error;
pub mod fork;
pub mod msg;
pub mod registry;
pub mod signal;

pub use error::Error;
pub use registry::{Domain, Registry};
