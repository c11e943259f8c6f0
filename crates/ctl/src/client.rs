//! One TCP session with the simulator.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const BLOCK_BEGIN_SUFFIX: &str = "_INICIO";
const BLOCK_END_SUFFIX: &str = "_FIN";

pub(crate) struct Session {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    read_timeout: Duration,
}

impl Session {
    /// Connect and consume the status line the server pushes on accept.
    pub(crate) async fn connect(addr: &str, read_timeout: Duration) -> Result<(Self, String)> {
        let stream = timeout(read_timeout, TcpStream::connect(addr))
            .await
            .with_context(|| format!("timed out connecting to {addr}"))?
            .with_context(|| format!("failed to connect to {addr}"))?;
        let (reader, writer) = stream.into_split();
        let mut session = Self {
            lines: BufReader::new(reader).lines(),
            writer,
            read_timeout,
        };
        let greeting = session.read_line().await.context("no greeting")?;
        debug!(addr, greeting = %greeting, "connected");
        Ok((session, greeting))
    }

    async fn read_line(&mut self) -> Result<String> {
        match timeout(self.read_timeout, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line.trim_end().to_string()),
            Ok(Ok(None)) => bail!("server closed the connection"),
            Ok(Err(e)) => Err(e).context("read failed"),
            Err(_) => bail!("no response within {:?}", self.read_timeout),
        }
    }

    /// Send one command and collect its full response. A first line ending
    /// in `_INICIO` opens a block that runs until the matching `_FIN` line.
    pub(crate) async fn request(&mut self, command: &str) -> Result<Vec<String>> {
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await
            .context("write failed")?;
        self.writer.flush().await.context("flush failed")?;

        let first = self.read_line().await?;
        let Some(block) = first.strip_suffix(BLOCK_BEGIN_SUFFIX) else {
            return Ok(vec![first]);
        };

        let end = format!("{block}{BLOCK_END_SUFFIX}");
        let mut lines = vec![first.clone()];
        loop {
            let line = self.read_line().await?;
            let done = line == end;
            lines.push(line);
            if done {
                break;
            }
        }
        debug!(command, lines = lines.len(), "block received");
        Ok(lines)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
