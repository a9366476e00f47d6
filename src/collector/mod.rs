//! Collector session layer: wraps one fd's envelope reader/writer and walks
//! it through Accepted -> Handshaking -> Active -> Closed.

pub mod acceptor;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Instant;

use rand::RngCore;

use crate::error::{Error, Result};
use crate::util::{jenkins_hash, monotonic_secs, wall_clock_secs};
use crate::wire::collector::{request::Type as RequestType, Descriptor, Request};
use crate::wire::envelope::envelope::Recipient;
use crate::wire::envelope::Envelope;
use crate::wire::monitor::data::Payload as DataPayload;
use crate::wire::monitor::message::Payload as MessagePayload;
use crate::wire::monitor::{self, Data, Message, SessionInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Uds,
}

pub enum Stream {
    Tcp(TcpStream),
    Uds(UnixStream),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Uds(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Uds(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Uds(s) => s.flush(),
        }
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Stream::Tcp(s) => s.as_raw_fd(),
            Stream::Uds(s) => s.as_raw_fd(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Handshaking,
    Active,
    Closed,
}

/// Anything a data source can write a `Data` payload to, without needing to
/// know about socket framing or session state.
pub trait CollectorSink {
    fn send_data(&mut self, what: monitor::data::What, payload: DataPayload) -> Result<()>;

    /// Like `send_data`, but stamps `system_time_sec`/`monotonic_time_sec`
    /// with the caller's own times rather than the moment of the call.
    /// The startup-data cache is the one source whose payload is only
    /// meaningful stamped with when it was originally captured.
    fn send_data_at(
        &mut self,
        what: monitor::data::What,
        payload: DataPayload,
        system_time_sec: i64,
        monotonic_time_sec: i64,
    ) -> Result<()>;
}

pub struct Collector {
    pub transport: Transport,
    stream: Stream,
    pub descriptor_id: String,
    pub session_hash: Option<String>,
    pub state: SessionState,
    pub last_update_time: Instant,
    fast_usec: u64,
    pace_usec: u64,
    slow_usec: u64,
}

impl Collector {
    pub fn new(
        transport: Transport,
        stream: Stream,
        fast_usec: u64,
        pace_usec: u64,
        slow_usec: u64,
    ) -> Self {
        Self {
            transport,
            stream,
            descriptor_id: String::new(),
            session_hash: None,
            state: SessionState::Accepted,
            last_update_time: Instant::now(),
            fast_usec,
            pace_usec,
            slow_usec,
        }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Blocking read of the one-time handshake `Descriptor`, bounded by the
    /// 3-second receive timeout the acceptor configured on the fd before
    /// constructing this collector.
    pub fn read_descriptor(&mut self) -> Result<()> {
        let descriptor: Descriptor = crate::wire::read_delimited(&mut self.stream)?
            .ok_or(Error::EndOfFile)?;
        self.descriptor_id = descriptor.id;
        self.state = SessionState::Handshaking;
        Ok(())
    }

    /// Reads and dispatches one envelope. Returns `Ok(Some(request))` for a
    /// non-handshake request the caller (dispatcher) must route; handles
    /// `CreateSession` and the origin integrity check here directly.
    pub fn read_request(&mut self) -> Result<Option<Request>> {
        let envelope: Envelope = crate::wire::read_delimited(&mut self.stream)?
            .ok_or(Error::EndOfFile)?;

        if envelope.origin != Recipient::Collector as i32 {
            self.state = SessionState::Closed;
            return Err(Error::OriginMismatch);
        }

        let Some(crate::wire::envelope::envelope::Mesg::Request(request)) = envelope.mesg else {
            return Ok(None);
        };

        self.last_update_time = Instant::now();

        if request.r#type == RequestType::CreateSession as i32 {
            self.create_session()?;
            return Ok(None);
        }

        Ok(Some(request))
    }

    fn create_session(&mut self) -> Result<()> {
        let mut random_bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        let random_hex = random_bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        let mut seed = self.descriptor_id.clone().into_bytes();
        seed.extend_from_slice(random_hex.as_bytes());
        let hash = jenkins_hash(&seed);
        let hash_hex = format!("{:016x}", hash);
        self.session_hash = Some(hash_hex.clone());
        self.state = SessionState::Active;

        let session_info = SessionInfo {
            hash: hash_hex,
            fast_lane_interval_usec: self.fast_usec,
            pace_lane_interval_usec: self.pace_usec,
            slow_lane_interval_usec: self.slow_usec,
        };
        let message = Message {
            r#type: monitor::message::Type::SetSession as i32,
            payload: Some(MessagePayload::SessionInfo(session_info)),
        };
        self.write_message(message)
    }

    fn write_message(&mut self, message: Message) -> Result<()> {
        let envelope = Envelope {
            origin: Recipient::Monitor as i32,
            target: Recipient::Collector as i32,
            mesg: Some(crate::wire::envelope::envelope::Mesg::Message(message)),
        };
        crate::wire::write_delimited(&mut self.stream, &envelope)
    }
}

impl CollectorSink for Collector {
    fn send_data(&mut self, what: monitor::data::What, payload: DataPayload) -> Result<()> {
        self.send_data_at(what, payload, wall_clock_secs(), monotonic_secs())
    }

    fn send_data_at(
        &mut self,
        what: monitor::data::What,
        payload: DataPayload,
        system_time_sec: i64,
        monotonic_time_sec: i64,
    ) -> Result<()> {
        let data = Data {
            what: what as i32,
            system_time_sec,
            monotonic_time_sec,
            receive_time_sec: wall_clock_secs(),
            payload: Some(payload),
        };
        let message = Message {
            r#type: monitor::message::Type::Data as i32,
            payload: Some(MessagePayload::Data(data)),
        };
        self.write_message(message)
    }
}
