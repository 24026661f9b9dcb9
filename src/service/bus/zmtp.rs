//! ZMTP 3.0 wire format, subscriber side.
//!
//! Covers what a `SUB` peer needs over the NULL security mechanism: the
//! greeting, the `READY` handshake, subscription messages, and reading
//! (possibly multipart) messages off the stream. Frames are a flags byte,
//! a one or eight byte big-endian size, then the body.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame body accepted from a publisher (64 MiB).
pub const MAX_FRAME_SIZE: u64 = 64 * 1024 * 1024;

const GREETING_LEN: usize = 64;
const MECHANISM_NULL: &[u8] = b"NULL";

const FLAG_MORE: u8 = 0b001;
const FLAG_LONG: u8 = 0b010;
const FLAG_COMMAND: u8 = 0b100;

/// Socket types a `SUB` socket may talk to.
const PUBLISHER_TYPES: [&[u8]; 2] = [b"PUB", b"XPUB"];

/// One frame off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub more: bool,
    pub command: bool,
    pub body: Vec<u8>,
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Our greeting: version 3.0, NULL mechanism, client role.
pub fn greeting() -> [u8; GREETING_LEN] {
    let mut data = [0u8; GREETING_LEN];
    data[0] = 0xff;
    data[9] = 0x7f;
    data[10] = 3;
    data[11] = 0;
    data[12..12 + MECHANISM_NULL.len()].copy_from_slice(MECHANISM_NULL);
    data
}

/// Validate the peer's greeting.
pub fn check_greeting(peer: &[u8]) -> io::Result<()> {
    if peer.len() != GREETING_LEN || peer[0] != 0xff || peer[9] != 0x7f {
        return Err(invalid("peer did not send a ZMTP greeting"));
    }

    if peer[10] < 3 {
        return Err(invalid(format!("peer speaks ZMTP {}.{}, need 3.0 or later", peer[10], peer[11])));
    }

    let mechanism = peer[12..32].split(|b| *b == 0).next().unwrap_or_default();
    if mechanism != MECHANISM_NULL {
        return Err(invalid(format!("unsupported security mechanism `{}`", String::from_utf8_lossy(mechanism))));
    }

    Ok(())
}

/// Encode a single frame.
pub fn encode_frame(flags: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 9);

    match u8::try_from(body.len()) {
        Ok(size) => {
            out.push(flags);
            out.push(size);
        }
        Err(_) => {
            out.push(flags | FLAG_LONG);
            out.extend_from_slice(&(body.len() as u64).to_be_bytes());
        }
    }

    out.extend_from_slice(body);
    out
}

/// `READY` command announcing a `SUB` socket.
pub fn ready_command() -> Vec<u8> {
    let mut body = Vec::new();
    push_short_string(&mut body, b"READY");
    push_short_string(&mut body, b"Socket-Type");
    body.extend_from_slice(&3u32.to_be_bytes());
    body.extend_from_slice(b"SUB");

    encode_frame(FLAG_COMMAND, &body)
}

/// Subscription message for a topic prefix; the empty prefix matches everything.
pub fn subscribe_message(topic: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(topic.len() + 1);
    body.push(0x01);
    body.extend_from_slice(topic.as_bytes());

    encode_frame(0, &body)
}

fn push_short_string(out: &mut Vec<u8>, value: &[u8]) {
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}

/// Split a command body into its name and the remaining data.
pub fn command_name(body: &[u8]) -> io::Result<(&[u8], &[u8])> {
    let (&len, rest) = body.split_first().ok_or_else(|| invalid("empty command"))?;
    let len = usize::from(len);

    if rest.len() < len {
        return Err(invalid("truncated command name"));
    }

    Ok(rest.split_at(len))
}

/// Check a `READY` command body from a publisher.
pub fn check_ready(body: &[u8]) -> io::Result<()> {
    let (name, mut props) = command_name(body)?;
    if name != b"READY" {
        return Err(invalid(format!("expected READY, got `{}`", String::from_utf8_lossy(name))));
    }

    while !props.is_empty() {
        let (key, rest) = command_name(props)?;
        if rest.len() < 4 {
            return Err(invalid("truncated property"));
        }

        let (len, rest) = rest.split_at(4);
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if rest.len() < len {
            return Err(invalid("truncated property value"));
        }

        let (value, rest) = rest.split_at(len);
        if key.eq_ignore_ascii_case(b"Socket-Type") {
            if PUBLISHER_TYPES.contains(&value) {
                return Ok(());
            }
            return Err(invalid(format!("peer is a {} socket, not a publisher", String::from_utf8_lossy(value))));
        }

        props = rest;
    }

    Err(invalid("peer did not announce its socket type"))
}

/// `PONG` reply for a `PING` command body, echoing its context.
pub fn pong_for(ping: &[u8]) -> Option<Vec<u8>> {
    let (name, rest) = command_name(ping).ok()?;
    if name != b"PING" || rest.len() < 2 {
        return None;
    }

    let mut body = Vec::with_capacity(rest.len() + 3);
    push_short_string(&mut body, b"PONG");
    body.extend_from_slice(&rest[2..]);

    Some(encode_frame(FLAG_COMMAND, &body))
}

/// Read one frame.
///
/// A clean close surfaces as `UnexpectedEof`. Sizes above `MAX_FRAME_SIZE` are `InvalidData`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Frame> {
    let flags = reader.read_u8().await?;

    let size = if flags & FLAG_LONG != 0 {
        reader.read_u64().await?
    } else {
        u64::from(reader.read_u8().await?)
    };

    if size > MAX_FRAME_SIZE {
        return Err(invalid(format!("frame too large: {size} bytes (max {MAX_FRAME_SIZE})")));
    }

    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body).await?;

    Ok(Frame {
        more: flags & FLAG_MORE != 0,
        command: flags & FLAG_COMMAND != 0,
        body,
    })
}

/// Exchange greetings and `READY` commands with a publisher.
pub async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> io::Result<()> {
    stream.write_all(&greeting()).await?;
    stream.flush().await?;

    let mut peer = [0u8; GREETING_LEN];
    stream.read_exact(&mut peer).await?;
    check_greeting(&peer)?;

    stream.write_all(&ready_command()).await?;
    stream.flush().await?;

    let frame = read_frame(stream).await?;
    if !frame.command {
        return Err(invalid("expected a READY command"));
    }

    check_ready(&frame.body)
}

// Tests.
