use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use pipeduplex_frame::{
    is_end, is_sync, FrameConfig, FrameError, LineReader, LineWriter, DEFAULT_MAX_LINE_LEN, END,
    SYNC,
};
use pipeduplex_transport::{Close, Drain, TransportError};
#[cfg(any(target_os = "linux", target_os = "android"))]
use pipeduplex_transport::{DuplexEnds, PipeEnd};
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::error::{PeerError, Result};

/// Longest a single pipe read blocks before the exchange deadline is
/// re-checked.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receive-side progress through one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    /// Discarding frames until one starts with `SYNC`.
    AwaitSync,
    /// Appending payload frames until one starts with `END`.
    Collecting,
    /// `END` seen; the payload is complete.
    Done,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitSync => "awaiting SYNC",
            Self::Collecting => "collecting payload",
            Self::Done => "done",
        })
    }
}

/// Which half of the conversation an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sends first, then receives. The parent process.
    Initiator,
    /// Receives first, then sends. The spawned child.
    Responder,
}

impl Role {
    pub fn sends_first(self) -> bool {
        matches!(self, Self::Initiator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        })
    }
}

/// What end-of-stream before `END` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EofPolicy {
    /// Fail with [`PeerError::Incomplete`].
    #[default]
    Error,
    /// Accept the lines collected so far as the complete message.
    ///
    /// Only applies once `SYNC` has been seen; a stream that ends before
    /// `SYNC` carried no message and still fails.
    ImplicitEnd,
}

/// Configuration for one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Bound on the receive phase and on the post-`SYNC` drain.
    /// `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Handling of a peer that closes before `END`.
    pub eof_policy: EofPolicy,
    /// Maximum length of a single frame in bytes.
    pub max_line_len: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            eof_policy: EofPolicy::default(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl ExchangeConfig {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_line_len: self.max_line_len,
            read_timeout: self.timeout.map(|t| t.min(READ_POLL_INTERVAL)),
        }
    }
}

/// Result of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeOutcome {
    pub role: Role,
    pub sent: Vec<String>,
    pub received: Vec<String>,
}

/// Receive-side state machine: `AwaitSync → Collecting → Done`.
#[derive(Debug)]
pub struct MessageAssembler {
    state: ExchangeState,
    lines: Vec<String>,
    discarded: usize,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            state: ExchangeState::AwaitSync,
            lines: Vec::new(),
            discarded: 0,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Frames dropped while waiting for `SYNC`.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Payload collected so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Advance with one received frame and return the new state.
    ///
    /// Frames arriving after `Done` are ignored.
    pub fn feed(&mut self, frame: String) -> ExchangeState {
        match self.state {
            ExchangeState::AwaitSync => {
                if is_sync(&frame) {
                    trace!(discarded = self.discarded, "SYNC received");
                    self.state = ExchangeState::Collecting;
                } else {
                    self.discarded += 1;
                }
            }
            ExchangeState::Collecting => {
                if is_end(&frame) {
                    self.state = ExchangeState::Done;
                } else {
                    self.lines.push(frame);
                }
            }
            ExchangeState::Done => {}
        }
        self.state
    }

    /// Count a frame before `SYNC` that could not be decoded.
    pub(crate) fn discard(&mut self) {
        self.discarded += 1;
    }

    /// Resolve the message once the stream has ended.
    pub fn finish(self, policy: EofPolicy) -> Result<Vec<String>> {
        match (self.state, policy) {
            (ExchangeState::Done, _) | (ExchangeState::Collecting, EofPolicy::ImplicitEnd) => {
                Ok(self.lines)
            }
            (state, _) => Err(PeerError::Incomplete {
                state,
                received: self.lines,
            }),
        }
    }

    /// Take the collected payload regardless of state.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Send one message: `SYNC`, drain, payload lines, `END`.
///
/// Every payload line is validated before anything is written. The drain
/// after `SYNC` holds the sender until the receiver has taken the marker
/// off the pipe.
pub fn send_message<W, S>(
    writer: &mut LineWriter<W>,
    payload: &[S],
    config: &ExchangeConfig,
) -> Result<()>
where
    W: Write + Drain,
    S: AsRef<str>,
{
    validate_payload(payload)?;

    writer.write_line(SYNC)?;
    writer
        .get_mut()
        .wait_for_drain(config.timeout)
        .map_err(drain_error)?;
    debug!("SYNC drained by peer");

    writer.write_lines(payload)?;
    writer.write_line(END)?;
    writer.flush()?;
    debug!(lines = payload.len(), "message sent");
    Ok(())
}

/// Receive one message, discarding anything before `SYNC`.
pub fn receive_message<R: Read>(
    reader: &mut LineReader<R>,
    config: &ExchangeConfig,
) -> Result<Vec<String>> {
    let deadline = config.timeout.map(|timeout| (Instant::now() + timeout, timeout));
    let mut assembler = MessageAssembler::new();

    loop {
        let next = match deadline {
            Some((deadline, timeout)) => {
                if Instant::now() >= deadline {
                    return Err(PeerError::Timeout(timeout));
                }
                reader.read_line_until(deadline)
            }
            None => reader.read_line(),
        };

        match next {
            Ok(Some(frame)) => {
                if assembler.feed(frame) == ExchangeState::Done {
                    debug!(
                        lines = assembler.lines().len(),
                        discarded = assembler.discarded(),
                        "message received"
                    );
                    return Ok(assembler.into_lines());
                }
            }
            Ok(None) => {
                debug!(state = %assembler.state(), "peer closed pipe");
                return assembler.finish(config.eof_policy);
            }
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(FrameError::InvalidUtf8(_)) if assembler.state() == ExchangeState::AwaitSync => {
                trace!("discarding undecodable frame before SYNC");
                assembler.discard();
            }
            Err(err) => return Err(PeerError::Frame(err)),
        }
    }
}

/// One endpoint of a single-shot duplex exchange.
///
/// The same state machine serves both processes; [`Role`] only decides
/// whether the send or the receive phase comes first. Each pipe end is
/// closed as soon as its phase is over, and both are closed on every
/// exit path.
pub struct Exchange<R, W> {
    reader: LineReader<R>,
    writer: LineWriter<W>,
    role: Role,
    config: ExchangeConfig,
}

impl<R, W> Exchange<R, W>
where
    R: Read + Close,
    W: Write + Drain + Close,
{
    /// Build an exchange over arbitrary streams.
    pub fn new(reader: R, writer: W, role: Role, config: ExchangeConfig) -> Self {
        let frame_config = config.frame_config();
        Self {
            reader: LineReader::with_config(reader, frame_config.clone()),
            writer: LineWriter::with_config(writer, frame_config),
            role,
            config,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Run the exchange, sending `outgoing` in this endpoint's turn.
    pub fn run<S: AsRef<str>>(self, outgoing: &[S]) -> Result<ExchangeOutcome> {
        let outgoing: Vec<String> = outgoing.iter().map(|s| s.as_ref().to_string()).collect();
        self.run_with(move |_| outgoing)
    }

    /// Run the exchange, building the outgoing message when this
    /// endpoint's turn to send comes.
    ///
    /// `compose` sees whatever has been received by then: nothing for the
    /// initiator, the full incoming message for the responder.
    pub fn run_with<F>(mut self, compose: F) -> Result<ExchangeOutcome>
    where
        F: FnOnce(&[String]) -> Vec<String>,
    {
        let result = self.drive(compose);
        let closed = self.close();
        let outcome = result?;
        closed?;
        Ok(outcome)
    }

    fn drive<F>(&mut self, compose: F) -> Result<ExchangeOutcome>
    where
        F: FnOnce(&[String]) -> Vec<String>,
    {
        info!(role = %self.role, "starting exchange");
        let (sent, received) = if self.role.sends_first() {
            let sent = compose(&[]);
            self.send(&sent)?;
            let received = self.receive()?;
            (sent, received)
        } else {
            let received = self.receive()?;
            let sent = compose(&received);
            self.send(&sent)?;
            (sent, received)
        };
        info!(
            role = %self.role,
            sent = sent.len(),
            received = received.len(),
            "exchange complete"
        );
        Ok(ExchangeOutcome {
            role: self.role,
            sent,
            received,
        })
    }

    fn send(&mut self, payload: &[String]) -> Result<()> {
        send_message(&mut self.writer, payload, &self.config)?;
        self.writer.get_mut().close()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<String>> {
        let received = receive_message(&mut self.reader, &self.config)?;
        self.reader.get_mut().close()?;
        Ok(received)
    }

    fn close(&mut self) -> Result<()> {
        let reader = self.reader.get_mut().close();
        let writer = self.writer.get_mut().close();
        reader.and(writer).map_err(PeerError::from)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl Exchange<PipeEnd, PipeEnd> {
    /// Build an exchange over a duplex pipe pair, bounding each pipe read
    /// so the configured timeout is honoured.
    pub fn from_pipes(ends: DuplexEnds, role: Role, config: ExchangeConfig) -> Self {
        let frame_config = config.frame_config();
        Self {
            reader: LineReader::with_config_pipe(ends.reader, frame_config.clone()),
            writer: LineWriter::with_config(ends.writer, frame_config),
            role,
            config,
        }
    }
}

fn validate_payload<S: AsRef<str>>(payload: &[S]) -> Result<()> {
    for (index, line) in payload.iter().enumerate() {
        let line = line.as_ref();
        if line.contains(['\r', '\n']) {
            return Err(PeerError::InvalidPayload {
                index,
                reason: "contains a line break",
            });
        }
        if is_end(line) {
            return Err(PeerError::InvalidPayload {
                index,
                reason: "starts with the END marker",
            });
        }
    }
    Ok(())
}

fn drain_error(err: TransportError) -> PeerError {
    match err {
        TransportError::DrainTimeout { timeout, .. } => PeerError::Timeout(timeout),
        other => PeerError::Transport(other),
    }
}
