//! Generated protobuf types plus the length-prefixed envelope codec used on
//! every collector socket.

#![allow(clippy::all)]

pub mod collector {
    include!(concat!(env!("OUT_DIR"), "/tkm.collector.rs"));
}

pub mod monitor {
    include!(concat!(env!("OUT_DIR"), "/tkm.monitor.rs"));
}

pub mod envelope {
    use super::collector;
    use super::monitor;

    include!(concat!(env!("OUT_DIR"), "/tkm.rs"));
}

use std::io::{self, Read, Write};

use prost::Message;

use crate::error::{Error, Result};

/// Read one length-delimited message from a blocking-ish stream. Returns
/// `Ok(None)` on a clean EOF before any bytes of the next frame arrive.
pub fn read_delimited<M, R>(reader: &mut R) -> Result<Option<M>>
where
    M: Message + Default,
    R: Read,
{
    let len = match read_varint(reader)? {
        Some(len) => len,
        None => return Ok(None),
    };
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::EndOfFile
        } else {
            Error::Io(e)
        }
    })?;
    Ok(Some(M::decode(buf.as_slice())?))
}

/// Write one length-delimited message, followed by a flush — `writeEnvelope`
/// is defined as exactly one `send` plus one `flush`; a partial write here
/// is surfaced as an error for the caller to tear the session down.
pub fn write_delimited<M, W>(writer: &mut W, message: &M) -> Result<()>
where
    M: Message,
    W: Write,
{
    let mut buf = Vec::with_capacity(message.encoded_len() + 10);
    message.encode_length_delimited(&mut buf)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Every collector socket carries a read timeout (`SO_RCVTIMEO`) rather than
/// being genuinely non-blocking, so a peer that stalls mid-varint surfaces as
/// `WouldBlock`/`TimedOut` here. Retrying that in a loop would block the
/// single-threaded reactor for as long as the peer withholds bytes; instead
/// it's propagated like any other read error, which tears the session down
/// the same way a stall partway through `read_exact` already does.
fn read_varint<R: Read>(reader: &mut R) -> Result<Option<u64>> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(Error::Io(e)),
        }
        result |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(Some(result))
}
