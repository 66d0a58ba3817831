// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::Path;

use tokio::net::UnixStream;
use tracing::debug;

use crate::msg::{Frame, Request, Response};
use crate::Error;

/// A connection to a running daemon
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(socket: &Path) -> Result<Self, Error> {
        let stream = UnixStream::connect(socket)
            .await
            .map_err(|e| format!("no daemon listening on {}: {}", socket.display(), e))?;
        debug!("connected to {}", socket.display());

        Ok(Self { stream })
    }

    /// Sends one request and waits for its response
    pub async fn request(&mut self, request: &Request) -> Result<Response, Error> {
        request.send(&mut self.stream).await?;

        Response::recv(&mut self.stream)
            .await?
            .ok_or_else(|| Error::from("daemon closed the connection"))
    }
}
