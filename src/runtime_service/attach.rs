//! Attach stream forwarding between a client and the shim's attach socket.

use crate::container::{ContainerId, ContainerStatus};
use crate::error::{Error, Result};
use crate::runtime_service::RuntimeService;
use log::warn;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::task::JoinError;

const BUF_SIZE: usize = 32 * 1024;
const PIPE_TYPE_STDOUT: u8 = 1;
const PIPE_TYPE_STDERR: u8 = 2;

/// Client-provided stdin source.
pub type AttachInput = Box<dyn AsyncRead + Send + Unpin>;

/// Client-provided stdout or stderr sink.
pub type AttachOutput = Box<dyn AsyncWrite + Send + Unpin>;

impl RuntimeService {
    /// Bridge the given client streams to a running container's stdio for
    /// the remainder of its lifetime.
    ///
    /// The container state is snapshotted under the manager lock; the
    /// long-lived forwarding below runs without it.
    pub async fn attach(
        &self,
        id: &ContainerId,
        stdin: Option<AttachInput>,
        stdout: Option<AttachOutput>,
        stderr: Option<AttachOutput>,
    ) -> Result<()> {
        if stdin.is_none() && stdout.is_none() && stderr.is_none() {
            return Err(Error::IoError(io::Error::new(
                io::ErrorKind::InvalidInput,
                "at least one of the std streams must be open",
            )));
        }

        let cont = self.get_container(id).await?;
        if cont.status() != ContainerStatus::Running {
            return Err(Error::BadState {
                actual: cont.status(),
                expected: vec![ContainerStatus::Running],
            });
        }

        let conn = UnixStream::connect(self.container_attach_file(id)).await?;
        let (read_half, write_half) = conn.into_split();

        // When no stdin is given the write half is dropped right away,
        // half-closing our side of the socket.
        let input_task = stdin.map(|stdin| tokio::spawn(forward_input(stdin, write_half)));
        let output_task = if stdout.is_some() || stderr.is_some() {
            Some(tokio::spawn(forward_output(read_half, stdout, stderr)))
        } else {
            None
        };

        match (input_task, output_task) {
            (Some(mut input), Some(mut output)) => {
                tokio::select! {
                    res = &mut input => {
                        // Client stdin is exhausted; drain the output side
                        // and report its result.
                        let _ = flatten(res);
                        flatten(output.await)
                    }
                    res = &mut output => {
                        // The socket is done; the stdin pump cannot make
                        // progress anymore.
                        input.abort();
                        let _ = input.await;
                        flatten(res)
                    }
                }
            }
            (Some(input), None) => flatten(input.await),
            (None, Some(output)) => flatten(output.await),
            (None, None) => Ok(()),
        }
    }
}

async fn forward_input(mut stdin: AttachInput, mut write_half: OwnedWriteHalf) -> io::Result<()> {
    tokio::io::copy(&mut stdin, &mut write_half).await?;
    // EOF on stdin half-closes the write side of the socket.
    write_half.shutdown().await
}

/// Demultiplex the shim's output stream. Every read carries one fragment:
/// a pipe-type byte followed by the payload for the selected sink.
async fn forward_output(
    mut read_half: OwnedReadHalf,
    mut stdout: Option<AttachOutput>,
    mut stderr: Option<AttachOutput>,
) -> io::Result<()> {
    let mut buf = vec![0u8; BUF_SIZE + 1];
    loop {
        let nread = read_half.read(&mut buf).await?;
        if nread == 0 {
            return Ok(());
        }

        let sink = match buf[0] {
            PIPE_TYPE_STDOUT => stdout.as_mut(),
            PIPE_TYPE_STDERR => stderr.as_mut(),
            pipe_type => {
                warn!("unexpected attach pipe type {}", pipe_type);
                None
            }
        };
        if let Some(sink) = sink {
            sink.write_all(&buf[1..nread]).await?;
            sink.flush().await?;
        }
    }
}

fn flatten(res: std::result::Result<io::Result<()>, JoinError>) -> Result<()> {
    match res {
        Ok(io_res) => io_res.map_err(Error::IoError),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(Error::IoError(io::Error::new(io::ErrorKind::Other, e))),
    }
}
