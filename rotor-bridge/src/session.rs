use crate::SharedController;
use crate::protocol::{Command, Reply};
use antenna_controller::{DeviceError, PositionReading};
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;

/// Longest request line accepted from a client, newline included.
pub const MAX_LINE_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCommand,
    Processing,
    Closed,
}

/// One line read from the client.
#[derive(Debug, PartialEq)]
enum Request {
    Line(String),
    /// The line went past `MAX_LINE_LEN` and was discarded.
    Oversized,
}

/// What to do after answering a command.
#[derive(Debug, PartialEq)]
struct Outcome {
    reply: Option<Reply>,
    close: bool,
}

impl Outcome {
    fn reply(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            close: false,
        }
    }

    fn reply_and_close(reply: Reply) -> Self {
        Self {
            reply: Some(reply),
            close: true,
        }
    }
}

/// One rotctld client connection.
pub struct RotctldSession<R, W> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    writer: W,
    controller: SharedController,
    peer: String,
    state: SessionState,
}

impl<R, W> RotctldSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, controller: SharedController, peer: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(MAX_LINE_LEN),
            writer,
            controller,
            peer: peer.into(),
            state: SessionState::AwaitingCommand,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serves commands until the client disconnects, asks to stop or quit,
    /// the dish becomes unreachable or `shutdown` fires. A command already
    /// being processed always gets its reply.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let result = self.serve(&mut shutdown).await;
        self.state = SessionState::Closed;
        // The peer may already be gone.
        let _ = self.writer.shutdown().await;
        info!("Connection from {} closed", self.peer);

        result
    }

    async fn serve(&mut self, shutdown: &mut watch::Receiver<bool>) -> std::io::Result<()> {
        while self.state != SessionState::Closed {
            if *shutdown.borrow() {
                break;
            }

            let request = tokio::select! {
                _ = shutdown.changed() => break,
                request = self.next_request() => request?,
            };

            let Some(request) = request else {
                break;
            };

            self.state = SessionState::Processing;
            let outcome = match request {
                Request::Line(line) => self.process(&line).await,
                Request::Oversized => {
                    warn!(
                        "Discarded request longer than {MAX_LINE_LEN} bytes from {}",
                        self.peer
                    );
                    Outcome::reply(Reply::Failed)
                }
            };

            if let Some(reply) = outcome.reply {
                self.writer.write_all(reply.to_string().as_bytes()).await?;
                self.writer.flush().await?;
            }

            self.state = if outcome.close {
                SessionState::Closed
            } else {
                SessionState::AwaitingCommand
            };
        }

        Ok(())
    }

    /// Reads the next request, or `None` once the client hung up. Bytes that
    /// are not UTF-8 are replaced so the line still gets an answer.
    async fn next_request(&mut self) -> std::io::Result<Option<Request>> {
        self.buffer.clear();
        let n = (&mut self.reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut self.buffer)
            .await?;

        if n == 0 {
            return Ok(None);
        }

        if self.buffer.last() != Some(&b'\n') && n == MAX_LINE_LEN {
            self.discard_line().await?;
            return Ok(Some(Request::Oversized));
        }

        let line = String::from_utf8_lossy(&self.buffer);
        Ok(Some(Request::Line(
            line.trim_end_matches(['\r', '\n']).to_string(),
        )))
    }

    /// Skips input up to and including the next newline.
    async fn discard_line(&mut self) -> std::io::Result<()> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.reader.consume(end + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    async fn process(&self, line: &str) -> Outcome {
        if line.trim().is_empty() {
            return Outcome {
                reply: None,
                close: false,
            };
        }
        debug!("Received: {line:?}");

        match Command::parse(line) {
            Ok(Command::GetPosition) => {
                Outcome::reply(Reply::Position(self.controller.current_status().position))
            }
            Ok(Command::SetPosition { azimuth, elevation }) => {
                match PositionReading::new(azimuth, elevation) {
                    Ok(target) => self.move_to(target).await,
                    Err(e) => {
                        warn!("Rejected move from {}: {e}", self.peer);
                        Outcome::reply(Reply::Failed)
                    }
                }
            }
            Ok(Command::Stop) => self.stop().await,
            Ok(Command::Quit) => Outcome {
                reply: None,
                close: true,
            },
            Err(e) => {
                warn!("Command processing error: {e}");
                Outcome::reply(Reply::Failed)
            }
        }
    }

    async fn move_to(&self, target: PositionReading) -> Outcome {
        let controller = self.controller.clone();

        match tokio::task::spawn_blocking(move || controller.move_to(target)).await {
            Ok(Ok(_)) => Outcome::reply(Reply::Ok),
            Ok(Err(e)) => failure(e),
            Err(e) => {
                error!("Move task failed: {e}");
                Outcome::reply_and_close(Reply::Failed)
            }
        }
    }

    async fn stop(&self) -> Outcome {
        let controller = self.controller.clone();

        match tokio::task::spawn_blocking(move || controller.stop()).await {
            Ok(Ok(())) => Outcome::reply_and_close(Reply::Ok),
            Ok(Err(e)) => {
                error!("Failed to stop antenna: {e}");
                Outcome::reply_and_close(Reply::Failed)
            }
            Err(e) => {
                error!("Stop task failed: {e}");
                Outcome::reply_and_close(Reply::Failed)
            }
        }
    }
}

/// Every device error is reported as `RPRT 1`; only a dead channel ends the session.
fn failure(e: DeviceError) -> Outcome {
    if e.is_fatal() {
        error!("Antenna unreachable, closing session: {e}");
        Outcome::reply_and_close(Reply::Failed)
    } else {
        warn!("Move failed: {e}");
        Outcome::reply(Reply::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antenna_controller::mock::{MockChannel, SimulatedController};
    use antenna_controller::{CarryoutController, LinkSettings};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, DuplexStream, duplex, split};
    use tokio::task::JoinHandle;

    struct Harness {
        client: DuplexStream,
        session: JoinHandle<(SessionState, std::io::Result<()>)>,
        shutdown: watch::Sender<bool>,
    }

    fn start(controller: SharedController) -> Harness {
        let (client, server) = duplex(1024);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let session = tokio::spawn(async move {
            let (reader, writer) = split(server);
            let mut session = RotctldSession::new(reader, writer, controller, "test");
            let result = session.run(shutdown_rx).await;
            (session.state(), result)
        });

        Harness {
            client,
            session,
            shutdown,
        }
    }

    async fn request(client: &mut DuplexStream, line: &str, reply_len: usize) -> String {
        client.write_all(line.as_bytes()).await.unwrap();
        let mut buffer = vec![0u8; reply_len];
        client.read_exact(&mut buffer).await.unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[tokio::test]
    async fn reports_origin_before_any_move() {
        let mut harness = start(Arc::new(SimulatedController::default()));

        assert_eq!(request(&mut harness.client, "p\n", 8).await, "0.0\n0.0\n");
    }

    #[tokio::test]
    async fn set_then_get_position() {
        let mut harness = start(Arc::new(SimulatedController::default()));

        assert_eq!(request(&mut harness.client, "P 180.5 45.25\n", 7).await, "RPRT 0\n");
        assert_eq!(
            request(&mut harness.client, "p\n", 12).await,
            "180.5\n45.25\n"
        );
    }

    #[tokio::test]
    async fn malformed_commands_keep_session_open() {
        let mut harness = start(Arc::new(SimulatedController::default()));

        assert_eq!(request(&mut harness.client, "P abc 45\n", 7).await, "RPRT 1\n");
        assert_eq!(request(&mut harness.client, "P 10\n", 7).await, "RPRT 1\n");
        assert_eq!(request(&mut harness.client, "X\n", 7).await, "RPRT 1\n");
        assert_eq!(request(&mut harness.client, "P 400 45\n", 7).await, "RPRT 1\n");
        assert_eq!(request(&mut harness.client, "p\n", 8).await, "0.0\n0.0\n");
    }

    #[tokio::test]
    async fn non_utf8_request_is_answered() {
        let mut harness = start(Arc::new(SimulatedController::default()));
        harness.client.write_all(b"P \xff\xfe 45\n").await.unwrap();

        let mut reply = [0u8; 7];
        harness.client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"RPRT 1\n");
        assert_eq!(request(&mut harness.client, "p\n", 8).await, "0.0\n0.0\n");
    }

    #[tokio::test]
    async fn oversized_request_is_rejected_and_skipped() {
        let mut harness = start(Arc::new(SimulatedController::default()));
        let long = format!("P {}\n", "9".repeat(MAX_LINE_LEN * 3));

        assert_eq!(request(&mut harness.client, &long, 7).await, "RPRT 1\n");
        assert_eq!(request(&mut harness.client, "p\n", 8).await, "0.0\n0.0\n");
    }

    #[tokio::test]
    async fn request_at_the_length_limit_is_accepted() {
        let mut harness = start(Arc::new(SimulatedController::default()));
        let padding = " ".repeat(MAX_LINE_LEN - "p\n".len());
        let line = format!("p{padding}\n");
        assert_eq!(line.len(), MAX_LINE_LEN);

        assert_eq!(request(&mut harness.client, &line, 8).await, "0.0\n0.0\n");
    }

    #[tokio::test]
    async fn blank_lines_get_no_reply() {
        let mut harness = start(Arc::new(SimulatedController::default()));

        assert_eq!(request(&mut harness.client, "\n\np\n", 8).await, "0.0\n0.0\n");
    }

    #[tokio::test]
    async fn stop_replies_and_closes() {
        let mut harness = start(Arc::new(SimulatedController::default()));

        assert_eq!(request(&mut harness.client, "S\n", 7).await, "RPRT 0\n");

        let (state, result) = harness.session.await.unwrap();
        assert_eq!(state, SessionState::Closed);
        assert!(result.is_ok());

        let mut rest = Vec::new();
        harness.client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn quit_closes_without_reply() {
        let mut harness = start(Arc::new(SimulatedController::default()));
        harness.client.write_all(b"q\n").await.unwrap();

        let (state, _) = harness.session.await.unwrap();
        assert_eq!(state, SessionState::Closed);

        let mut rest = Vec::new();
        harness.client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn client_disconnect_ends_session() {
        let harness = start(Arc::new(SimulatedController::default()));
        drop(harness.client);

        let (state, result) = harness.session.await.unwrap();
        assert_eq!(state, SessionState::Closed);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn shutdown_ends_idle_session() {
        let harness = start(Arc::new(SimulatedController::default()));
        harness.shutdown.send(true).unwrap();

        let (state, _) = harness.session.await.unwrap();
        assert_eq!(state, SessionState::Closed);
    }

    #[tokio::test]
    async fn dead_channel_closes_session_after_reply() {
        let channel = MockChannel::new();
        let controller =
            Arc::new(CarryoutController::new(channel.clone(), LinkSettings::default()).unwrap());
        channel.set_failing(true);
        let mut harness = start(controller);

        assert_eq!(request(&mut harness.client, "P 10 10\n", 7).await, "RPRT 1\n");

        let (state, _) = harness.session.await.unwrap();
        assert_eq!(state, SessionState::Closed);
    }
}
