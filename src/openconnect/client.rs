//! TCP client for the Open Connect protocol.
//!
//! Synchronous, single-owner. The session thread drives timing: shots and
//! status updates arrive over a channel and a heartbeat goes out after
//! each idle second. This type only owns the socket discipline
//! (drain-then-send, one response object per shot, bounded deadlines).

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use super::wire::{ShotMessage, SimResponse};
use crate::accumulator::ValidatedShot;

/// Per-operation deadline (connect, write, response read).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);
/// Idle interval between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_DEVICE_ID: &str = "GC2";

/// Errors from simulator operations.
///
/// `Rejected` and `Protocol` leave the connection usable; `Io` and
/// `Timeout` mean the session should tear it down and let the reconnect
/// supervisor take over.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no response within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("malformed response: {0}")]
    Protocol(#[source] serde_json::Error),

    #[error("simulator rejected the shot (code {code}): {message}")]
    Rejected { code: u32, message: String },
}

impl SimulatorError {
    /// The connection itself is broken (as opposed to a per-message
    /// problem the session can absorb).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout { .. })
    }
}

/// Open Connect client over one TCP connection.
pub struct SimClient {
    stream: TcpStream,
    /// Inbound bytes read but not yet decoded (responses may concatenate).
    inbound: Vec<u8>,
    device_id: String,
    /// Next outbound shot number, starting at 1. Independent from the
    /// router's numbering even though the two usually coincide.
    shot_number: u64,
    deadline: Duration,
}

impl SimClient {
    /// Connect with the default per-op deadline. Small writes dominate this
    /// protocol, so Nagle is disabled.
    pub fn connect(host: &str, port: u16) -> Result<Self, SimulatorError> {
        let mut last: Option<io::Error> = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, DEFAULT_DEADLINE) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => last = Some(e),
            }
        }
        Err(SimulatorError::Io(last.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses")
        })))
    }

    fn from_stream(stream: TcpStream) -> Result<Self, SimulatorError> {
        let _ = stream.set_nodelay(true);
        stream.set_write_timeout(Some(DEFAULT_DEADLINE))?;
        Ok(Self {
            stream,
            inbound: Vec::new(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            shot_number: 1,
            deadline: DEFAULT_DEADLINE,
        })
    }

    pub fn set_device_id(&mut self, device_id: impl Into<String>) {
        self.device_id = device_id.into();
    }

    /// Override the per-operation deadline.
    pub fn set_deadline(&mut self, deadline: Duration) {
        self.deadline = deadline;
    }

    /// Shut down the TCP connection.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    /// Send a shot and wait for its response. Drains any stale buffered
    /// input first, then decodes exactly one response object; anything
    /// beyond it stays buffered.
    pub fn send_shot(&mut self, shot: &ValidatedShot) -> Result<SimResponse, SimulatorError> {
        self.drain();
        let number = self.shot_number;
        self.write_message(&ShotMessage::shot(&self.device_id, number, shot))?;
        self.shot_number += 1;

        let resp = self.read_response()?;
        debug!(shot_number = number, code = resp.code, "shot response");
        if resp.is_success() {
            Ok(resp)
        } else {
            Err(SimulatorError::Rejected {
                code: resp.code,
                message: resp.message,
            })
        }
    }

    /// Send a launch-monitor status update. No response expected.
    pub fn send_status(&mut self, ready: bool, ball_detected: bool) -> Result<(), SimulatorError> {
        self.write_message(&ShotMessage::status(
            &self.device_id,
            self.shot_number,
            ready,
            ball_detected,
        ))
    }

    /// Send a heartbeat. No response expected; a write failure means the
    /// connection is gone.
    pub fn heartbeat(&mut self) -> Result<(), SimulatorError> {
        self.write_message(&ShotMessage::heartbeat(&self.device_id, self.shot_number))
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// One JSON object per write, no trailing newline.
    fn write_message(&mut self, msg: &ShotMessage) -> Result<(), SimulatorError> {
        let payload = serde_json::to_vec(msg).map_err(SimulatorError::Protocol)?;
        self.stream.write_all(&payload)?;
        Ok(())
    }

    /// Discard everything buffered on the socket without blocking. Stale
    /// responses are matched positionally; anything here belongs to a
    /// request we have given up on.
    fn drain(&mut self) {
        if self.stream.set_nonblocking(true).is_err() {
            return;
        }
        let mut buf = [0u8; 4096];
        let mut discarded = self.inbound.len();
        self.inbound.clear();
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break, // peer closed; the next write surfaces it
                Ok(n) => discarded += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        let _ = self.stream.set_nonblocking(false);
        if discarded > 0 {
            trace!(discarded, "drained stale simulator bytes");
        }
    }

    /// Read until one complete response object decodes, or the deadline
    /// expires. Bytes past the first object stay in `inbound`.
    fn read_response(&mut self) -> Result<SimResponse, SimulatorError> {
        let deadline = Instant::now() + self.deadline;
        let mut buf = [0u8; 4096];
        loop {
            if let Some(resp) = self.take_object()? {
                return Ok(resp);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SimulatorError::Timeout { timeout: self.deadline });
            }
            self.stream.set_read_timeout(Some(remaining))?;
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    return Err(SimulatorError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "simulator closed the connection",
                    )));
                }
                Ok(n) => self.inbound.extend_from_slice(&buf[..n]),
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Err(SimulatorError::Timeout { timeout: self.deadline });
                }
                Err(e) => return Err(SimulatorError::Io(e)),
            }
        }
    }

    /// Decode one object from the inbound buffer, consuming exactly its
    /// bytes. `None` when the buffer holds no complete object yet.
    fn take_object(&mut self) -> Result<Option<SimResponse>, SimulatorError> {
        if self.inbound.is_empty() {
            return Ok(None);
        }
        let mut objects = serde_json::Deserializer::from_slice(&self.inbound)
            .into_iter::<SimResponse>();
        match objects.next() {
            Some(Ok(resp)) => {
                let consumed = objects.byte_offset();
                self.inbound.drain(..consumed);
                Ok(Some(resp))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                // Undecodable garbage: drop it, keep the connection.
                warn!(error = %e, len = self.inbound.len(), "dropping malformed simulator bytes");
                self.inbound.clear();
                Err(SimulatorError::Protocol(e))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::TcpListener;
    use std::thread;

    fn shot() -> ValidatedShot {
        ValidatedShot {
            shot_id: 1,
            shot_number: 1,
            ball_speed_mph: 167.0,
            vla_deg: 10.9,
            hla_deg: 0.0,
            total_spin_rpm: 2686.0,
            back_spin_rpm: 2686.0,
            side_spin_rpm: 0.0,
            spin_axis_deg: 0.0,
            club: None,
            incomplete: false,
            received_at: Utc::now(),
        }
    }

    /// One-connection test server: runs `script` against the accepted socket.
    fn server(
        script: impl FnOnce(TcpStream) + Send + 'static,
    ) -> (String, u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            script(stream);
        });
        ("127.0.0.1".to_string(), port, handle)
    }

    fn read_request(stream: &mut TcpStream) -> serde_json::Value {
        let mut buf = [0u8; 8192];
        let n = stream.read(&mut buf).unwrap();
        serde_json::from_slice(&buf[..n]).expect("request is one JSON object")
    }

    #[test]
    fn shot_send_and_success_response() {
        let (host, port, handle) = server(|mut stream| {
            let req = read_request(&mut stream);
            assert_eq!(req["ShotNumber"], 1);
            assert_eq!(req["ShotDataOptions"]["ContainsBallData"], true);
            stream
                .write_all(br#"{"Code":200,"Message":"OK"}"#)
                .unwrap();
        });

        let mut client = SimClient::connect(&host, port).unwrap();
        let resp = client.send_shot(&shot()).unwrap();
        assert_eq!(resp.code, 200);
        handle.join().unwrap();
    }

    #[test]
    fn non_2xx_is_rejected_but_connection_survives() {
        let (host, port, handle) = server(|mut stream| {
            let _ = read_request(&mut stream);
            stream
                .write_all(br#"{"Code":501,"Message":"invalid shot"}"#)
                .unwrap();
            // Heartbeat after the rejection still arrives.
            let hb = read_request(&mut stream);
            assert_eq!(hb["ShotDataOptions"]["IsHeartBeat"], true);
        });

        let mut client = SimClient::connect(&host, port).unwrap();
        match client.send_shot(&shot()) {
            Err(SimulatorError::Rejected { code: 501, message }) => {
                assert_eq!(message, "invalid shot");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        client.heartbeat().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn exactly_one_object_consumed_and_stale_bytes_drained() {
        let (host, port, handle) = server(|mut stream| {
            let _ = read_request(&mut stream);
            // Two concatenated objects in one segment: only the first is
            // this shot's response.
            stream
                .write_all(br#"{"Code":200,"Message":"first"}{"Code":201,"Message":"stale"}"#)
                .unwrap();
            let _ = read_request(&mut stream);
            stream
                .write_all(br#"{"Code":202,"Message":"second"}"#)
                .unwrap();
        });

        let mut client = SimClient::connect(&host, port).unwrap();
        let first = client.send_shot(&shot()).unwrap();
        assert_eq!(first.message, "first");
        // The drain before the second send discards the leftover 201.
        let second = client.send_shot(&shot()).unwrap();
        assert_eq!(second.message, "second");
        handle.join().unwrap();
    }

    #[test]
    fn response_timeout() {
        let (host, port, handle) = server(|mut stream| {
            let _ = read_request(&mut stream);
            // Never respond; hold the socket open past the deadline.
            thread::sleep(Duration::from_millis(400));
        });

        let mut client = SimClient::connect(&host, port).unwrap();
        client.set_deadline(Duration::from_millis(150));
        assert!(matches!(
            client.send_shot(&shot()),
            Err(SimulatorError::Timeout { .. })
        ));
        handle.join().unwrap();
    }

    #[test]
    fn malformed_response_is_protocol_error_not_fatal() {
        let (host, port, handle) = server(|mut stream| {
            let _ = read_request(&mut stream);
            stream.write_all(b"!!not json at all!!").unwrap();
            let hb = read_request(&mut stream);
            assert_eq!(hb["ShotDataOptions"]["IsHeartBeat"], true);
        });

        let mut client = SimClient::connect(&host, port).unwrap();
        client.set_deadline(Duration::from_millis(500));
        let err = client.send_shot(&shot()).unwrap_err();
        assert!(matches!(err, SimulatorError::Protocol(_)));
        assert!(!err.is_fatal());
        client.heartbeat().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn shot_numbers_increment_from_one() {
        let (host, port, handle) = server(|mut stream| {
            for expected in 1..=2 {
                let req = read_request(&mut stream);
                assert_eq!(req["ShotNumber"], expected);
                stream.write_all(br#"{"Code":200}"#).unwrap();
            }
        });

        let mut client = SimClient::connect(&host, port).unwrap();
        client.send_shot(&shot()).unwrap();
        client.send_shot(&shot()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn closed_connection_is_fatal() {
        let (host, port, handle) = server(|mut stream| {
            let _ = read_request(&mut stream);
            // Close without responding.
        });

        let mut client = SimClient::connect(&host, port).unwrap();
        client.set_deadline(Duration::from_millis(500));
        let err = client.send_shot(&shot()).unwrap_err();
        assert!(err.is_fatal(), "got {err:?}");
        handle.join().unwrap();
    }
}
