// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Messages exchanged over the control socket
//!
//! Each message is a big-endian `u32` length followed by that many bytes of bincode.

use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::fork::Invocation;
use crate::registry::Domain;
use crate::signal::SignalKind;
use crate::Error;

/// Frames larger than this are refused, in either direction
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Start {
        domain: Domain,
        invocation: Invocation,
    },
    Run {
        domain: Domain,
        invocation: Invocation,
        check_server: bool,
    },
    Stop {
        domain: Domain,
        signal: SignalKind,
    },
    List,
    StopAll {
        signal: SignalKind,
    },
    /// Stop every server and exit the daemon
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Message(String),
    Processes(BTreeMap<Domain, u32>),
    Error(String),
}

#[async_trait]
pub trait Frame: Serialize + DeserializeOwned + Send + Sync {
    /// Reads the next message, `None` if the peer closed the stream between messages
    async fn recv<R>(reader: &mut R) -> Result<Option<Self>, Error>
    where
        R: AsyncRead + Unpin + Send,
    {
        let len = match reader.read_u32().await {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if len > MAX_FRAME_LEN {
            return Err(format!("frame of {} bytes exceeds {}", len, MAX_FRAME_LEN).into());
        }

        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;

        Ok(Some(bincode::deserialize(&buf)?))
    }

    async fn send<W>(&self, writer: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let buf = bincode::serialize(self)?;
        if buf.len() > MAX_FRAME_LEN as usize {
            return Err(format!("frame of {} bytes exceeds {}", buf.len(), MAX_FRAME_LEN).into());
        }

        writer.write_u32(buf.len() as u32).await?;
        writer.write_all(&buf).await?;
        writer.flush().await?;

        Ok(())
    }
}

#[async_trait]
impl Frame for Request {}

#[async_trait]
impl Frame for Response {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_over_a_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let request = Request::Start {
            domain: 3,
            invocation: Invocation::shell("fastdds discovery -i 0"),
        };
        request.send(&mut client).await.unwrap();
        Request::List.send(&mut client).await.unwrap();
        drop(client);

        assert_eq!(Request::recv(&mut server).await.unwrap(), Some(request));
        assert_eq!(Request::recv(&mut server).await.unwrap(), Some(Request::List));
        assert_eq!(Request::recv(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_u32(MAX_FRAME_LEN + 1).await.unwrap();
        assert!(Response::recv(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_u32(32).await.unwrap();
        client.write_all(&[0u8; 4]).await.unwrap();
        drop(client);

        assert!(Response::recv(&mut server).await.is_err());
    }
}
