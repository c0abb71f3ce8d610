//! Reading whole messages off a byte stream.
//!
//! msgpack is self-delimiting, so unlike Content-Length framing there is no
//! header. A [`Boundary`] walks element headers as bytes arrive to find where
//! the message ends, and the message is decoded once it is complete.
//! Whatever follows it stays in the buffer for the next read.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::rpc::codec::{self, Message};

/// Default cap on a single buffered message (100MB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Read one message from `reader`, using `buf` as the carry-over buffer.
///
/// Returns `Ok(None)` on a clean EOF between messages.
///
/// # Errors
///
/// - `Error::Protocol` if the bytes do not decode, the stream ends in the
///   middle of a message, or the message is larger than `max_size` bytes
/// - `Error::Connection` if the underlying read fails
pub async fn read_message<R>(reader: &mut R, buf: &mut Vec<u8>, max_size: usize) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut boundary = Boundary::new();

    loop {
        if !buf.is_empty() {
            let end = boundary.advance(buf)?;
            if boundary.offset > max_size {
                return Err(too_large(max_size));
            }
            if let Some(len) = end {
                let message = match codec::decode(&buf[..len])? {
                    Some((message, used)) if used == len => message,
                    _ => {
                        return Err(Error::Protocol(format!(
                            "Message of {} bytes did not decode as one value",
                            len
                        )))
                    }
                };
                buf.drain(..len);
                return Ok(Some(message));
            }
        }

        if buf.len() > max_size {
            return Err(too_large(max_size));
        }

        let n = reader.read(&mut chunk).await.map_err(Error::Connection)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::Protocol(format!(
                "Stream closed with {} bytes of an incomplete message",
                buf.len()
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn too_large(max_size: usize) -> Error {
    Error::Protocol(format!("Message size exceeds maximum {} bytes", max_size))
}

/// Finds the end of the first msgpack value in a growing buffer without
/// decoding it. Each call resumes where the last one stopped, so every
/// byte of header is looked at once.
#[derive(Debug)]
struct Boundary {
    /// Offset of the next element header. May run past the buffer while a
    /// string or binary body is still arriving.
    offset: usize,
    /// Elements still to walk, counting the outer value.
    remaining: u64,
}

/// Bytes following the marker: (length field width, body length, child elements).
type Element = (usize, usize, u64);

impl Boundary {
    fn new() -> Self {
        Self {
            offset: 0,
            remaining: 1,
        }
    }

    /// Length of the first value in `buf`, or `None` until all of it is there.
    fn advance(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        while self.remaining > 0 {
            let Some(&marker) = buf.get(self.offset) else {
                return Ok(None);
            };
            let Some((width, body, children)) = element(marker, &buf[self.offset + 1..])? else {
                return Ok(None);
            };
            self.offset = self.offset.saturating_add(1 + width).saturating_add(body);
            self.remaining = (self.remaining - 1).saturating_add(children);
        }
        Ok((buf.len() >= self.offset).then_some(self.offset))
    }
}

fn element(marker: u8, rest: &[u8]) -> Result<Option<Element>> {
    let fixed = |body: usize| -> Result<Option<Element>> { Ok(Some((0, body, 0))) };
    match marker {
        // fixint, nil, bool
        0x00..=0x7f | 0xe0..=0xff | 0xc0 | 0xc2 | 0xc3 => fixed(0),
        0x80..=0x8f => Ok(Some((0, 0, 2 * u64::from(marker & 0x0f)))),
        0x90..=0x9f => Ok(Some((0, 0, u64::from(marker & 0x0f)))),
        0xa0..=0xbf => fixed(usize::from(marker & 0x1f)),
        0xc1 => Err(Error::Protocol("Invalid msgpack marker 0xc1".to_string())),
        // bin and str: length then body
        0xc4 | 0xd9 => Ok(sized(rest, 1, 0)),
        0xc5 | 0xda => Ok(sized(rest, 2, 0)),
        0xc6 | 0xdb => Ok(sized(rest, 4, 0)),
        // ext: length, type byte, body
        0xc7 => Ok(sized(rest, 1, 1)),
        0xc8 => Ok(sized(rest, 2, 1)),
        0xc9 => Ok(sized(rest, 4, 1)),
        0xca => fixed(4),
        0xcb => fixed(8),
        0xcc | 0xd0 => fixed(1),
        0xcd | 0xd1 => fixed(2),
        0xce | 0xd2 => fixed(4),
        0xcf | 0xd3 => fixed(8),
        // fixext 1, 2, 4, 8, 16 plus the type byte
        0xd4..=0xd8 => fixed(1 + (1 << (marker - 0xd4))),
        0xdc => Ok(counted(rest, 2, 1)),
        0xdd => Ok(counted(rest, 4, 1)),
        0xde => Ok(counted(rest, 2, 2)),
        0xdf => Ok(counted(rest, 4, 2)),
    }
}

/// Big-endian length field of `width` (at most 4) bytes.
fn length(rest: &[u8], width: usize) -> Option<usize> {
    let field = rest.get(..width)?;
    Some(field.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b)))
}

fn sized(rest: &[u8], width: usize, extra: usize) -> Option<Element> {
    length(rest, width).map(|n| (width, n + extra, 0))
}

fn counted(rest: &[u8], width: usize, per_entry: u64) -> Option<Element> {
    length(rest, width).map(|n| (width, 0, n as u64 * per_entry))
}
