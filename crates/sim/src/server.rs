//! TCP front end: one task per client connection, all sharing [`SharedState`].
//!
//! Per-connection lifecycle:
//!
//! ```text
//! CONNECTED ──[push status line]──▶ AWAITING_COMMAND ──[line]──▶ DISPATCHING
//!                                        ▲                           │
//!                                        └───────[write reply]───────┘
//! AWAITING_COMMAND ──[EOF / I/O error]──▶ CLOSED
//! ```
//!
//! A client that never sends anything holds its task open indefinitely; there
//! is no idle timeout. Request lines are capped at [`MAX_REQUEST_LEN`] bytes and
//! decoded lossily, so oversized or non-UTF-8 input is answered with the
//! unknown-command token instead of dropping the connection.

use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::protocol::{self, WireSettings};
use crate::state::SharedState;

/// Longest request line accepted, newline excluded.
pub(crate) const MAX_REQUEST_LEN: usize = 1024;

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------

/// Bind the listening socket. Failure here is fatal for the process.
pub(crate) async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))
}

/// Accept clients until `shutdown` flips or the listener fails.
pub(crate) async fn serve(
    listener: TcpListener,
    shared: SharedState,
    settings: WireSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        handle_client(stream, peer, shared, settings).await;
                    });
                }
                Err(e) => {
                    error!("accept failed: {e}; no longer accepting connections");
                    shared
                        .lock()
                        .await
                        .events
                        .record_system(format!("listener stopped: {e}"));
                    break;
                }
            },
            _ = shutdown.changed() => {
                info!("listener shutting down");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    shared: SharedState,
    settings: WireSettings,
) {
    info!(%peer, "client connected");
    shared
        .lock()
        .await
        .events
        .record_client(format!("{peer} connected"));

    match converse(stream, &shared, &settings).await {
        Ok(()) => info!(%peer, "client disconnected"),
        Err(e) => warn!(%peer, "client connection error: {e}"),
    }

    shared
        .lock()
        .await
        .events
        .record_client(format!("{peer} disconnected"));
}

async fn converse(
    stream: TcpStream,
    shared: &SharedState,
    settings: &WireSettings,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_REQUEST_LEN);

    // CONNECTED: greet with the current state.
    let greeting = {
        let st = shared.lock().await;
        protocol::encode_status(&st.sensors, settings.format)
    };
    write_line(&mut writer, &greeting).await?;

    // AWAITING_COMMAND / DISPATCHING until EOF.
    loop {
        let reply = match read_request(&mut reader, &mut buf).await? {
            Request::Eof => break,
            Request::TooLong => {
                warn!(limit = MAX_REQUEST_LEN, "request line too long, discarded");
                protocol::UNKNOWN_COMMAND.to_string()
            }
            Request::Line(line) => {
                let request = line.trim();
                if request.is_empty() {
                    continue;
                }
                debug!(request, "command received");
                let mut st = shared.lock().await;
                protocol::handle_line(&mut st, request, settings)
            }
        };
        write_line(&mut writer, &reply).await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Request framing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Request {
    Line(String),
    TooLong,
    Eof,
}

/// Read one newline-terminated request, buffering at most
/// `MAX_REQUEST_LEN + 1` bytes. Invalid UTF-8 is replaced, not rejected.
async fn read_request<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Request>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_REQUEST_LEN as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Request::Eof);
    }
    if buf.last() != Some(&b'\n') && buf.len() > MAX_REQUEST_LEN {
        discard_line(reader).await?;
        return Ok(Request::TooLong);
    }
    Ok(Request::Line(String::from_utf8_lossy(buf).into_owned()))
}

/// Skip input up to and including the next newline without buffering it.
async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        let (used, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (chunk.len(), false),
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, body: &str) -> io::Result<()> {
    writer.write_all(body.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryEntry;
    use crate::policy::Thresholds;
    use crate::protocol::{WireFormat, NO_DATA, STATS_PREFIX, UNKNOWN_COMMAND};
    use crate::signal::FixedSignal;
    use crate::state::SimState;
    use tokio::io::Lines;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    const SETTINGS: WireSettings = WireSettings {
        format: WireFormat::Extended,
        recent_entries: 24,
    };

    struct Client {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> (Self, String) {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (r, writer) = stream.into_split();
            let mut client = Self {
                lines: BufReader::new(r).lines(),
                writer,
            };
            let greeting = client.read_line().await;
            (client, greeting)
        }

        async fn read_line(&mut self) -> String {
            self.lines.next_line().await.unwrap().expect("server closed")
        }

        async fn send(&mut self, cmd: &str) -> String {
            self.send_raw(format!("{cmd}\n").as_bytes()).await
        }

        async fn send_raw(&mut self, bytes: &[u8]) -> String {
            self.writer.write_all(bytes).await.unwrap();
            self.read_line().await
        }
    }

    /// Start a server on an ephemeral port. The returned sender keeps it alive.
    async fn start(seed: usize) -> (SocketAddr, SharedState, watch::Sender<bool>) {
        let mut st = SimState::new(
            Thresholds::default(),
            144,
            time::Duration::minutes(10),
            Box::new(FixedSignal(0.0)),
        );
        st.seed_history(seed, time::OffsetDateTime::now_utc());
        let shared = st.into_shared();

        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        tokio::spawn(serve(listener, shared.clone(), SETTINGS, rx));
        (addr, shared, tx)
    }

    #[tokio::test]
    async fn greets_with_status_on_connect() {
        let (addr, _shared, _tx) = start(0).await;
        let (_client, greeting) = Client::connect(addr).await;
        assert_eq!(greeting, "DATOS:45.2,38.7,24.5,26.1,0,0,23.8,65.2");
    }

    #[tokio::test]
    async fn pump_on_then_status_reflects_it() {
        let (addr, _shared, _tx) = start(0).await;
        let (mut client, _) = Client::connect(addr).await;

        assert_eq!(client.send("BOMBA1_ON").await, "BOMBA1_ACTIVADA");
        let status = client.send("STATUS").await;
        let fields: Vec<&str> = status.trim_start_matches("DATOS:").split(',').collect();
        assert_eq!(fields[4], "1");
    }

    #[tokio::test]
    async fn unknown_command_keeps_connection_open() {
        let (addr, _shared, _tx) = start(0).await;
        let (mut client, _) = Client::connect(addr).await;

        assert_eq!(client.send("FOO").await, UNKNOWN_COMMAND);
        assert_eq!(client.send("PING").await, "PONG");
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_unknown_command() {
        let (addr, _shared, _tx) = start(0).await;
        let (mut client, _) = Client::connect(addr).await;

        assert_eq!(client.send_raw(b"\xff\xfeFOO\n").await, UNKNOWN_COMMAND);
        assert_eq!(client.send("PING").await, "PONG");
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_and_skipped() {
        let (addr, _shared, _tx) = start(0).await;
        let (mut client, _) = Client::connect(addr).await;

        let mut long = vec![b'A'; MAX_REQUEST_LEN * 4];
        long.push(b'\n');
        assert_eq!(client.send_raw(&long).await, UNKNOWN_COMMAND);
        assert_eq!(client.send("PING").await, "PONG");
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let (addr, _shared, _tx) = start(0).await;
        let (mut client, _) = Client::connect(addr).await;

        client.writer.write_all(b"\n\r\n").await.unwrap();
        assert_eq!(client.send("ping").await, "PONG");
    }

    #[tokio::test]
    async fn stats_empty_then_single_entry() {
        let (addr, shared, _tx) = start(0).await;
        let (mut client, _) = Client::connect(addr).await;

        assert_eq!(client.send("ESTADISTICAS").await, NO_DATA);

        {
            let mut st = shared.lock().await;
            let sensors = st.sensors;
            st.history.append(HistoryEntry {
                seq: 0,
                recorded_at: time::OffsetDateTime::now_utc(),
                sensors,
            });
        }

        let line = client.send("ESTADISTICAS").await;
        assert!(line.starts_with(STATS_PREFIX), "{line}");
        let fields: Vec<&str> = line.trim_start_matches(STATS_PREFIX).split(',').collect();
        assert_eq!(fields.len(), 14);
        assert_eq!(fields[0], "45.2");
        assert_eq!(fields[4], "45.2");
        assert_eq!(fields[5], "45.2");
        assert_eq!(fields[12], "0.0");
        assert_eq!(fields[13], "0.0");
    }

    #[tokio::test]
    async fn recent_history_block_is_framed() {
        let (addr, _shared, _tx) = start(144).await;
        let (mut client, _) = Client::connect(addr).await;

        assert_eq!(client.send("HISTORIAL_RECIENTE").await, "HISTORIAL_RECIENTE_INICIO");
        let mut rows = 0;
        loop {
            let line = client.read_line().await;
            if line == "HISTORIAL_RECIENTE_FIN" {
                break;
            }
            assert!(line.starts_with(&format!("HR:{rows},")), "{line}");
            rows += 1;
        }
        assert_eq!(rows, 24);
    }

    #[tokio::test]
    async fn clients_share_state() {
        let (addr, _shared, _tx) = start(0).await;
        let (mut a, _) = Client::connect(addr).await;
        let (mut b, _) = Client::connect(addr).await;

        a.send("BOMBA2_ON").await;
        let status = b.send("STATUS").await;
        let fields: Vec<&str> = status.trim_start_matches("DATOS:").split(',').collect();
        assert_eq!(fields[5], "1");
    }

    #[tokio::test]
    async fn disconnect_is_logged() {
        let (addr, shared, _tx) = start(0).await;
        {
            let (mut client, _) = Client::connect(addr).await;
            client.send("PING").await;
        }

        // The handler notices EOF asynchronously.
        for _ in 0..50 {
            let done = shared
                .lock()
                .await
                .events
                .recent(10)
                .any(|e| e.detail.ends_with("disconnected"));
            if done {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("disconnect was never recorded");
    }

    // -- Bind -------------------------------------------------------------

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let held = bind("127.0.0.1:0").await.unwrap();
        let addr = held.local_addr().unwrap().to_string();

        let err = bind(&addr).await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains(&format!("failed to bind {addr}")), "{msg}");
    }

    #[tokio::test]
    async fn bind_rejects_unresolvable_address() {
        let err = bind("not-an-address").await.unwrap_err();
        assert!(format!("{err:#}").contains("not-an-address"));
    }

    // -- Request framing --------------------------------------------------

    #[tokio::test]
    async fn read_request_splits_lines_and_reports_eof() {
        let mut input: &[u8] = b"STATUS\r\nPING";
        let mut buf = Vec::new();
        assert_eq!(
            read_request(&mut input, &mut buf).await.unwrap(),
            Request::Line("STATUS\r\n".into())
        );
        assert_eq!(
            read_request(&mut input, &mut buf).await.unwrap(),
            Request::Line("PING".into())
        );
        assert_eq!(read_request(&mut input, &mut buf).await.unwrap(), Request::Eof);
    }

    #[tokio::test]
    async fn read_request_caps_line_length() {
        let mut data = vec![b'x'; MAX_REQUEST_LEN + 10];
        data.extend_from_slice(b"\nPING\n");
        let mut input: &[u8] = &data;
        let mut buf = Vec::new();
        assert_eq!(
            read_request(&mut input, &mut buf).await.unwrap(),
            Request::TooLong
        );
        assert!(buf.len() <= MAX_REQUEST_LEN + 1);
        assert_eq!(
            read_request(&mut input, &mut buf).await.unwrap(),
            Request::Line("PING\n".into())
        );
    }

    #[tokio::test]
    async fn read_request_accepts_line_at_limit() {
        let mut data = vec![b'y'; MAX_REQUEST_LEN];
        data.push(b'\n');
        let mut input: &[u8] = &data;
        let mut buf = Vec::new();
        assert!(matches!(
            read_request(&mut input, &mut buf).await.unwrap(),
            Request::Line(l) if l.len() == MAX_REQUEST_LEN + 1
        ));
    }

    #[tokio::test]
    async fn read_request_replaces_invalid_utf8() {
        let mut input: &[u8] = b"\xffPING\n";
        let mut buf = Vec::new();
        let Request::Line(line) = read_request(&mut input, &mut buf).await.unwrap() else {
            panic!("expected a line");
        };
        assert_eq!(line, "\u{FFFD}PING\n");
    }

    // -- Shutdown ---------------------------------------------------------

    #[tokio::test]
    async fn shutdown_stops_accepting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shared = SimState::new(
            Thresholds::default(),
            10,
            time::Duration::minutes(10),
            Box::new(FixedSignal(0.0)),
        )
        .into_shared();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(serve(listener, shared, SETTINGS, rx));

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("serve did not stop")
            .unwrap();
    }
}
