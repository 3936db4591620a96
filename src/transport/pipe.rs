//! Local pipe connections.
//!
//! - Unix: Unix Domain Socket
//! - Windows: Named Pipe
//!
//! One duplex pipe carries both directions of a connection. A connected
//! [`PipeStream`] becomes a [`PipeTransport`] by splitting the native
//! handle into its read and write halves.
//!
//! # Example
//!
//! ```ignore
//! use streamwire::transport::{pipe_path, PipeListener, PipeStream};
//!
//! let path = pipe_path("bot");
//! let listener = PipeListener::bind(&path).await?;
//! let server_side = listener.accept().await?.into_transport();
//! let client_side = PipeStream::connect(&path).await?.into_transport();
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

use super::StreamTransport;
use crate::protocol::StreamId;

/// Transport over either platform's pipe halves.
pub type PipeTransport =
    StreamTransport<Box<dyn AsyncRead + Send + Unpin>, Box<dyn AsyncWrite + Send + Unpin>>;

fn boxed<R, W>(reader: R, writer: W) -> PipeTransport
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    StreamTransport::new(Box::new(reader), Box::new(writer))
}

/// Platform path of a pipe called `name`.
///
/// Format:
/// - Unix: `{tmp}/{name}.sock`
/// - Windows: `\\.\pipe\{name}`
pub fn pipe_path(name: &str) -> String {
    #[cfg(unix)]
    {
        std::env::temp_dir()
            .join(format!("{name}.sock"))
            .to_string_lossy()
            .into_owned()
    }

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\{name}")
    }
}

/// Generate a unique pipe path for this process.
pub fn generate_pipe_path() -> String {
    pipe_path(&format!("streamwire-{}-{}", std::process::id(), StreamId::new()))
}

#[cfg(unix)]
mod unix_impl {
    use std::io::ErrorKind;

    use tokio::net::{UnixListener, UnixStream};
    use tracing::debug;

    use super::{boxed, PipeTransport};
    use crate::error::Result;

    /// Listening Unix socket. The socket file is removed on drop.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
    }

    /// Connected Unix socket.
    pub struct PipeStream(UnixStream);

    impl PipeListener {
        /// Bind `path`, replacing a stale socket file left by an earlier run.
        pub async fn bind(path: &str) -> Result<Self> {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path, "removed stale socket"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            Ok(Self {
                listener: UnixListener::bind(path)?,
                path: path.to_string(),
            })
        }

        pub async fn accept(&self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(PipeStream(stream))
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl PipeStream {
        pub async fn connect(path: &str) -> Result<Self> {
            Ok(Self(UnixStream::connect(path).await?))
        }

        /// Wrap this pipe as a protocol transport.
        pub fn into_transport(self) -> PipeTransport {
            let (reader, writer) = self.0.into_split();
            boxed(reader, writer)
        }
    }
}

#[cfg(windows)]
mod windows_impl {
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    use super::{boxed, PipeTransport};
    use crate::error::Result;

    /// Named pipe server waiting for a client.
    pub struct PipeListener {
        path: String,
    }

    /// Connected named pipe, either end.
    pub enum PipeStream {
        Server(NamedPipeServer),
        Client(NamedPipeClient),
    }

    impl PipeListener {
        pub async fn bind(path: &str) -> Result<Self> {
            // The first instance only claims the name; accept creates the real one.
            let _ = ServerOptions::new().first_pipe_instance(true).create(path)?;

            Ok(Self {
                path: path.to_string(),
            })
        }

        pub async fn accept(&self) -> Result<PipeStream> {
            let server = ServerOptions::new()
                .first_pipe_instance(false)
                .create(&self.path)?;
            server.connect().await?;
            Ok(PipeStream::Server(server))
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl PipeStream {
        pub async fn connect(path: &str) -> Result<Self> {
            Ok(Self::Client(ClientOptions::new().open(path)?))
        }

        /// Wrap this pipe as a protocol transport.
        pub fn into_transport(self) -> PipeTransport {
            match self {
                Self::Server(pipe) => {
                    let (reader, writer) = tokio::io::split(pipe);
                    boxed(reader, writer)
                }
                Self::Client(pipe) => {
                    let (reader, writer) = tokio::io::split(pipe);
                    boxed(reader, writer)
                }
            }
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{PipeListener, PipeStream};
