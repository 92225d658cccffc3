// src/core/connection.rs

use crate::{
    CancellationToken,
    core::service::Service,
    system::{
        executor::{self, ExecutionError},
        spool::Spool,
    },
};
use std::fmt::Display;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Why a connection is being closed before a cycle completed.
///
/// The `Display` text is what the client receives after `error: `.
#[derive(Error, Debug)]
enum SessionError {
    #[error("failed to read EOF marker: {0}")]
    ReadMarker(io::Error),
    #[error("failed to create temp file: {0}")]
    CreateSpool(io::Error),
    #[error("failed to read script: {0}")]
    ReadScript(io::Error),
    #[error("failed to write script: {0}")]
    WriteScript(io::Error),
    #[error("failed to start shell: {0}")]
    Start(ExecutionError),
    #[error("failed to run shell: {0}")]
    Run(ExecutionError),
    /// The peer hung up cleanly. Nothing is written back.
    #[error("connection closed by peer")]
    Closed,
}

impl SessionError {
    /// The log message and the underlying cause, for structured logging.
    fn parts(&self) -> (&'static str, &dyn Display) {
        match self {
            Self::ReadMarker(e) => ("failed to read EOF marker", e),
            Self::CreateSpool(e) => ("failed to create temp file", e),
            Self::ReadScript(e) => ("failed to read script", e),
            Self::WriteScript(e) => ("failed to write script", e),
            Self::Start(e) => ("failed to start shell", e),
            Self::Run(e) => ("failed to run shell", e),
            Self::Closed => ("connection closed by peer", &"eof"),
        }
    }
}

/// What happens after a cycle's script has run.
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    /// The script failed: wait for another marker on the same connection.
    AwaitMarker,
    /// The script succeeded: the session is over.
    Close,
}

/// Reads one `\n`-terminated line into `buf`, terminator included.
///
/// Returns `false` on a clean end of stream, including a final line the peer never
/// terminated; such a fragment is discarded.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    Ok(n > 0 && buf.ends_with(b"\n"))
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

impl Service {
    /// Runs the script-transfer protocol on one connection until it ends.
    ///
    /// Each cycle is: marker line, script lines, the marker again, then execution.
    /// A failing script leaves the connection open for another cycle; a successful
    /// one closes it. Any I/O or protocol error closes it after at most one
    /// `error: ...` line to the client.
    pub async fn handle_connection<S>(&self, stream: S, cancellation_token: &CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        loop {
            match self.run_cycle(&mut reader, &mut writer, cancellation_token).await {
                Ok(Decision::AwaitMarker) => continue,
                Ok(Decision::Close) | Err(SessionError::Closed) => break,
                Err(e) => {
                    {
                        let (msg, cause) = e.parts();
                        self.log.warn(msg, &[("error", cause)]);
                    }
                    send_best_effort(&mut writer, format!("error: {e}\n").as_bytes()).await;
                    break;
                }
            }
        }

        if let Err(e) = writer.shutdown().await {
            self.log.debug("failed to shut down connection", &[("error", &e)]);
        }
    }

    async fn run_cycle<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        cancellation_token: &CancellationToken,
    ) -> Result<Decision, SessionError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let marker = await_marker(reader).await?;
        let mut spool = receive_script(reader, &marker).await?;
        let decision = self.execute(&mut spool, writer, cancellation_token).await;
        // `execute` already removed it on the normal path; this is a no-op then.
        if let Err(e) = spool.release() {
            self.log.warn("failed to remove spool file", &[("error", &e)]);
        }
        decision
    }

    async fn execute<W>(
        &self,
        spool: &mut Spool,
        writer: &mut W,
        cancellation_token: &CancellationToken,
    ) -> Result<Decision, SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        let script = spool
            .finalize()
            .await
            .map_err(SessionError::WriteScript)?
            .to_path_buf();

        let result =
            executor::run_script(self.executable(), &script, self.exports(), cancellation_token)
                .await;

        if let Err(e) = spool.release() {
            self.log.warn("failed to remove spool file", &[("error", &e)]);
        }

        let output = match result {
            Ok(output) => output,
            Err(e @ ExecutionError::Spawn { .. }) => return Err(SessionError::Start(e)),
            Err(e) => return Err(SessionError::Run(e)),
        };

        // Fixed relay order: everything from stdout, then everything from stderr.
        for captured in [&output.stdout, &output.stderr] {
            if !captured.is_empty() {
                if let Err(e) = writer.write_all(captured).await {
                    self.log.warn("failed to relay output", &[("error", &e)]);
                }
            }
        }

        match output.exit_error() {
            Some(e) => {
                self.log.warn("script execution failed", &[("error", &e)]);
                send_best_effort(writer, format!("error: script execution failed: {e}\n").as_bytes())
                    .await;
                Ok(Decision::AwaitMarker)
            }
            None => {
                self.log.info("script executed successfully", &[]);
                Ok(Decision::Close)
            }
        }
    }
}

/// `AwaitMarker`: skips empty lines and returns the first non-empty one, unterminated.
async fn await_marker<R>(reader: &mut R) -> Result<Vec<u8>, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        if !read_line(reader, &mut line).await.map_err(SessionError::ReadMarker)? {
            return Err(SessionError::Closed);
        }
        let marker = strip_terminator(&line);
        if !marker.is_empty() {
            return Ok(marker.to_vec());
        }
    }
}

/// `ReceivingScript`: spools lines verbatim until one equals `marker`.
///
/// On any early exit the spool is dropped, which removes its file.
async fn receive_script<R>(reader: &mut R, marker: &[u8]) -> Result<Spool, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut spool = Spool::open().map_err(SessionError::CreateSpool)?;
    let mut line = Vec::new();
    loop {
        if !read_line(reader, &mut line).await.map_err(SessionError::ReadScript)? {
            return Err(SessionError::Closed);
        }
        if strip_terminator(&line) == marker {
            return Ok(spool);
        }
        spool.append(&line).await.map_err(SessionError::WriteScript)?;
    }
}

async fn send_best_effort<W>(writer: &mut W, bytes: &[u8])
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = writer.write_all(bytes).await {
        log::debug!("Could not deliver message to client: {}", e);
    }
}
