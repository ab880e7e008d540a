//! Framing codec for the request/response protocol.
//!
//! Every request starts with a decimal ASCII tag, fields are separated by
//! a single `0x01` delimiter. DATA_ADD/DATA_GET payloads are length-prefixed
//! instead of delimiter-terminated so arbitrary binary data (including the
//! delimiter byte itself) round-trips through them untouched.

use std::io::{self, Read, Write};

/// The single reserved field separator.
pub const DELIM: u8 = 0x01;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown request tag {0}")]
    UnknownTag(u32),
    #[error("malformed field: {0}")]
    MalformedField(String),
    #[error("connection closed before declared payload was fully read (expected {expected}, got {got})")]
    ShortPayload { expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Ping = 1,
    Connect = 2,
    Disconnect = 3,
    GetPeers = 4,
    DataAdd = 5,
    DataGet = 6,
    DataRemove = 7,
}

impl Tag {
    pub fn from_u32(v: u32) -> Result<Self, WireError> {
        Ok(match v {
            1 => Tag::Ping,
            2 => Tag::Connect,
            3 => Tag::Disconnect,
            4 => Tag::GetPeers,
            5 => Tag::DataAdd,
            6 => Tag::DataGet,
            7 => Tag::DataRemove,
            other => return Err(WireError::UnknownTag(other)),
        })
    }
}

/// A fully decoded request header (everything but a DATA_ADD payload body,
/// which the caller streams separately since it may be arbitrarily large).
#[derive(Debug, Clone)]
pub enum Request {
    Ping,
    Connect { host: String, port: u16 },
    Disconnect { host: String, port: u16 },
    GetPeers,
    /// `size` has been parsed; the payload itself has not been read yet.
    DataAdd { size: usize },
    DataGet { digest: String },
    DataRemove { digest: String },
}

/// Reads one delimiter-terminated field (ASCII, not containing `DELIM`)
/// from `r`, byte by byte. Used for header fields, never for payload
/// bytes (those are read with `read_exact`).
fn read_field<R: Read>(r: &mut R) -> Result<String, WireError> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = r.read(&mut byte)?;
        if n == 0 {
            return Err(WireError::ShortPayload {
                expected: buf.len() + 1,
                got: buf.len(),
            });
        }
        if byte[0] == DELIM {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8(buf).map_err(|e| WireError::MalformedField(e.to_string()))
}

/// Public wrapper around the delimiter-terminated field reader, for
/// responses that are just a single field (e.g. GET_PEERS).
pub fn read_response_field<R: Read>(r: &mut R) -> Result<String, WireError> {
    read_field(r)
}

fn parse_u16(s: &str) -> Result<u16, WireError> {
    s.parse::<u16>()
        .map_err(|_| WireError::MalformedField(format!("not a valid port: {s}")))
}

fn parse_usize(s: &str) -> Result<usize, WireError> {
    s.parse::<usize>()
        .map_err(|_| WireError::MalformedField(format!("not a valid size: {s}")))
}

/// Reads the tag field and routes to the rest of the header. Does not read
/// the DATA_ADD payload body — callers that need it call
/// [`read_exact_payload`] afterwards.
pub fn read_request<R: Read>(r: &mut R) -> Result<Request, WireError> {
    let tag_field = read_field(r)?;
    let tag_num: u32 = tag_field
        .parse()
        .map_err(|_| WireError::MalformedField(format!("not a valid tag: {tag_field}")))?;
    let tag = Tag::from_u32(tag_num)?;

    Ok(match tag {
        Tag::Ping => Request::Ping,
        Tag::Connect => {
            let host = read_field(r)?;
            let port = parse_u16(&read_field(r)?)?;
            Request::Connect { host, port }
        }
        Tag::Disconnect => {
            let host = read_field(r)?;
            let port = parse_u16(&read_field(r)?)?;
            Request::Disconnect { host, port }
        }
        Tag::GetPeers => Request::GetPeers,
        Tag::DataAdd => {
            let size = parse_usize(&read_field(r)?)?;
            Request::DataAdd { size }
        }
        Tag::DataGet => {
            let digest = read_field(r)?;
            Request::DataGet { digest }
        }
        Tag::DataRemove => {
            let digest = read_field(r)?;
            Request::DataRemove { digest }
        }
    })
}

/// Reads exactly `size` bytes from `r`, erroring with `ShortPayload` if
/// the stream closes before all of them arrive.
pub fn read_exact_payload<R: Read>(r: &mut R, size: usize) -> Result<Vec<u8>, WireError> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(WireError::ShortPayload {
                expected: size,
                got: filled,
            });
        }
        filled += n;
    }
    Ok(buf)
}

pub fn encode_ping() -> Vec<u8> {
    format!("{}\u{1}", Tag::Ping as u32).into_bytes()
}

pub fn encode_connect(host: &str, port: u16) -> Vec<u8> {
    let mut buf = format!("{}\u{1}{}\u{1}{}\u{1}", Tag::Connect as u32, host, port).into_bytes();
    buf.shrink_to_fit();
    buf
}

pub fn encode_disconnect(host: &str, port: u16) -> Vec<u8> {
    format!("{}\u{1}{}\u{1}{}\u{1}", Tag::Disconnect as u32, host, port).into_bytes()
}

pub fn encode_get_peers() -> Vec<u8> {
    format!("{}\u{1}", Tag::GetPeers as u32).into_bytes()
}

/// Writes the DATA_ADD header only; the caller streams the payload itself
/// via `write`/`write_all` on the connection so arbitrarily large sources
/// never have to be buffered in full by this module.
pub fn write_data_add_header<W: Write>(w: &mut W, size: usize) -> Result<(), WireError> {
    write!(w, "{}\u{1}{}\u{1}", Tag::DataAdd as u32, size)?;
    Ok(())
}

pub fn encode_data_get(digest: &str) -> Vec<u8> {
    format!("{}\u{1}{}\u{1}", Tag::DataGet as u32, digest).into_bytes()
}

pub fn encode_data_remove(digest: &str) -> Vec<u8> {
    format!("{}\u{1}{}\u{1}", Tag::DataRemove as u32, digest).into_bytes()
}

/// Writes a GET_PEERS response: a single delimiter-terminated field
/// containing a comma-separated `host:port` listing. Deliberately a plain
/// text format with a strict tokenizer on the read side, rather than a
/// language-native serialization that could execute arbitrary code when
/// parsed.
pub fn encode_peer_listing(peers: &[(String, u16)]) -> Vec<u8> {
    let body = peers
        .iter()
        .map(|(h, p)| format!("{h}:{p}"))
        .collect::<Vec<_>>()
        .join(",");
    let mut buf = body.into_bytes();
    buf.push(DELIM);
    buf
}

/// Parses a GET_PEERS response body (already read up to the delimiter,
/// delimiter excluded) into a list of `(host, port)` pairs. Malformed
/// entries make the whole listing unparseable — a GET_PEERS response
/// must be all-or-nothing, per the MalformedMessage error kind.
pub fn parse_peer_listing(body: &str) -> Result<Vec<(String, u16)>, WireError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    body.split(',')
        .map(|token| {
            let (host, port) = token
                .rsplit_once(':')
                .ok_or_else(|| WireError::MalformedField(format!("bad peer token: {token}")))?;
            let port = parse_u16(port)?;
            if host.is_empty() {
                return Err(WireError::MalformedField(format!(
                    "empty host in token: {token}"
                )));
            }
            Ok((host.to_string(), port))
        })
        .collect()
}

/// Writes a DATA_GET response header (`size` followed by one delimiter).
/// `size == 0` means NOT_FOUND and no payload follows.
pub fn write_data_get_response_header<W: Write>(w: &mut W, size: usize) -> Result<(), WireError> {
    write!(w, "{size}\u{1}")?;
    Ok(())
}

/// Reads a DATA_GET response header, returning the declared payload size
/// (0 == NOT_FOUND).
pub fn read_data_get_response_header<R: Read>(r: &mut R) -> Result<usize, WireError> {
    let field = read_field(r)?;
    parse_usize(&field)
}
