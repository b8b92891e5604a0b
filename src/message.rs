//! The framed message protocol: `SocketMessage` plus `send_message`/
//! `wait_message` as operations over a [`crate::tcp::TcpEndpoint`].
//!
//! Grounded on `examples/original_source/ppl7/src/internet/SocketMessage.cpp`
//! (the `SocketMessage` class and its wire header layout) and `ppl7-inet.h`.
//! Per spec.md §9's
//! redesign flag, versions 1 and 2 are two distinct, non-overlapping
//! decoders rather than one shared header struct — the source's version-1
//! packet stores its header CRC at the same offset where version 2 stores
//! `payload_crc`, and must not be read through a layout shared with v2.

use std::io::Read;
use std::time::{Duration, Instant};

use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use rand::Rng;

use crate::error::{NetError, Result};
use crate::tcp::TcpEndpoint;
use crate::watch::Watch;

/// Spin interval for [`wait_message`]'s non-blocking readability poll.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// `payload_type` tag, offset 13 of the header. `None` is the unset default
/// (`SocketMessage::payload_type=0` in `ppl7-inet.h`'s `SocketMessage`
/// constructor); `AssocArray`/`ByteArray` mirror its `Variant::TYPE_*`
/// payload setters (`setPayload(const AssocArray&)`/`setPayload(const
/// ByteArrayPtr&)`); `Binary` is supplemented as a distinct tag for raw byte
/// payloads the source's `AssocArray`/`ByteArray` wrappers don't cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    None,
    String,
    AssocArray,
    ByteArray,
    Binary,
    Custom(u8),
}

impl PayloadType {
    fn to_byte(self) -> u8 {
        match self {
            PayloadType::None => 0,
            PayloadType::String => 1,
            PayloadType::AssocArray => 2,
            PayloadType::ByteArray => 3,
            PayloadType::Binary => 4,
            PayloadType::Custom(n) => n,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            0 => PayloadType::None,
            1 => PayloadType::String,
            2 => PayloadType::AssocArray,
            3 => PayloadType::ByteArray,
            4 => PayloadType::Binary,
            n => PayloadType::Custom(n),
        }
    }
}

const MAGIC: u8 = b'V';
const COMPRESSION_THRESHOLD: usize = 64;
const FLAG_COMPRESSED: u8 = 0b001;
const FLAG_SUPPORTS_COMPRESSION: u8 = 0b010;
const FLAG_SUPPORTS_MSG_CHANNEL: u8 = 0b100;

/// One decoded (or about-to-be-encoded) frame.
#[derive(Debug, Clone)]
pub struct SocketMessage {
    pub command_id: u16,
    pub id: u32,
    pub payload_type: PayloadType,
    pub payload: Vec<u8>,
    pub peer_supports_compression: bool,
    pub peer_supports_msg_channel: bool,
}

impl SocketMessage {
    pub fn new(command_id: u16, id: u32, payload_type: PayloadType, payload: Vec<u8>) -> Self {
        Self {
            command_id,
            id,
            payload_type,
            payload,
            peer_supports_compression: false,
            peer_supports_msg_channel: false,
        }
    }

    /// Extracts the payload as UTF-8, rejecting a type mismatch.
    pub fn as_string(&self) -> Result<String> {
        if self.payload_type != PayloadType::String {
            return Err(NetError::DataInOtherFormat);
        }
        String::from_utf8(self.payload.clone()).map_err(|_| NetError::DataInOtherFormat)
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        if self.payload_type != PayloadType::Binary {
            return Err(NetError::DataInOtherFormat);
        }
        Ok(&self.payload)
    }
}

/// Sender-side capability flags, independent of any one message.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub use_compression: bool,
    pub peer_supports_compression: bool,
    pub supports_msg_channel: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self { use_compression: true, peer_supports_compression: true, supports_msg_channel: true }
    }
}

/// Sends `msg` as a version-2 frame (spec.md §6: "version 1 is read-only
/// legacy and is never generated by a new implementation").
pub fn send_message(endpoint: &mut TcpEndpoint, msg: &SocketMessage, options: SendOptions) -> Result<()> {
    let (payload, compressed) = maybe_compress(&msg.payload, options);
    if payload.len() > u32::MAX as usize {
        return Err(NetError::PayloadTooBig);
    }

    let mut flags = 0u8;
    if compressed {
        flags |= FLAG_COMPRESSED;
    }
    if options.peer_supports_compression {
        flags |= FLAG_SUPPORTS_COMPRESSION;
    }
    if options.supports_msg_channel {
        flags |= FLAG_SUPPORTS_MSG_CHANNEL;
    }

    let payload_crc = if payload.is_empty() { 0 } else { crc32fast::hash(&payload) };
    let salt: u16 = rand::thread_rng().gen();

    let mut header = [0u8; 24];
    header[0] = MAGIC;
    header[1] = 2;
    header[2..4].copy_from_slice(&msg.command_id.to_be_bytes());
    header[4..8].copy_from_slice(&msg.id.to_be_bytes());
    header[8..12].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    header[12] = flags;
    header[13] = msg.payload_type.to_byte();
    header[14..16].copy_from_slice(&salt.to_be_bytes());
    header[16..20].copy_from_slice(&payload_crc.to_be_bytes());
    let header_crc = crc32fast::hash(&header[0..20]);
    header[20..24].copy_from_slice(&header_crc.to_be_bytes());

    endpoint.write(&header)?;
    endpoint.write(&payload)?;
    Ok(())
}

/// Deflates `payload` (with a fixed `"V1"` prefix, per spec.md §6) and uses
/// it only if strictly smaller; only attempted when `payload.len() > 64` and
/// both peers advertise compression support.
fn maybe_compress(payload: &[u8], options: SendOptions) -> (Vec<u8>, bool) {
    if payload.len() <= COMPRESSION_THRESHOLD || !options.use_compression || !options.peer_supports_compression {
        return (payload.to_vec(), false);
    }
    match deflate(payload) {
        Ok(compressed) if compressed.len() < payload.len() => (compressed, true),
        _ => (payload.to_vec(), false),
    }
}

const DEFLATE_PREFIX: &[u8; 2] = b"V1";

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(data, Compression::default());
    let mut out = Vec::with_capacity(DEFLATE_PREFIX.len() + data.len());
    out.extend_from_slice(DEFLATE_PREFIX);
    encoder.read_to_end(&mut out)?;
    Ok(out)
}

fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let body = data.strip_prefix(DEFLATE_PREFIX).unwrap_or(data);
    let mut decoder = ZlibDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Polls for a frame every 200 ms (by default), honoring cancellation and
/// an overall timeout; both return `Ok(None)` rather than an error, per
/// spec.md §4.F.
pub fn wait_message(endpoint: &mut TcpEndpoint, timeout: Duration, watch: &dyn Watch) -> Result<Option<SocketMessage>> {
    let started = Instant::now();
    loop {
        if watch.should_stop() {
            return Ok(None);
        }
        if timeout > Duration::ZERO && started.elapsed() > timeout {
            return Ok(None);
        }
        match endpoint.is_readable() {
            Ok(true) => break,
            Ok(false) => std::thread::sleep(POLL_INTERVAL),
            Err(NetError::BrokenPipe) => return Err(NetError::BrokenPipe),
            Err(e) => return Err(e),
        }
    }
    read_message(endpoint).map(Some)
}

fn read_message(endpoint: &mut TcpEndpoint) -> Result<SocketMessage> {
    let mut head = [0u8; 20];
    endpoint.read_loop(&mut head, None, &crate::watch::NeverStop)?;
    if head[0] != MAGIC {
        return Err(NetError::DataInOtherFormat);
    }

    match head[1] {
        1 => read_v1_body(endpoint, &head),
        2 => read_v2_body(endpoint, &head),
        _ => Err(NetError::InvalidProtocolVersion),
    }
}

/// Version 1: `header_crc` occupies bytes `[16..20)` and covers
/// `[0..16)`; there is no payload CRC.
fn read_v1_body(endpoint: &mut TcpEndpoint, head: &[u8; 20]) -> Result<SocketMessage> {
    let header_crc = u32::from_be_bytes(head[16..20].try_into().unwrap());
    if crc32fast::hash(&head[0..16]) != header_crc {
        return Err(NetError::InvalidPacket("header CRC".to_string()));
    }

    let command_id = u16::from_be_bytes(head[2..4].try_into().unwrap());
    let id = u32::from_be_bytes(head[4..8].try_into().unwrap());
    let payload_size = u32::from_be_bytes(head[8..12].try_into().unwrap()) as usize;
    let flags = head[12];
    let payload_type = PayloadType::from_byte(head[13]);

    let mut payload = vec![0u8; payload_size];
    if payload_size > 0 {
        endpoint.read_loop(&mut payload, None, &crate::watch::NeverStop)?;
    }
    if flags & FLAG_COMPRESSED != 0 {
        payload = inflate(&payload).map_err(|e| NetError::InvalidPacket(e.to_string()))?;
    }

    Ok(SocketMessage {
        command_id,
        id,
        payload_type,
        payload,
        peer_supports_compression: flags & FLAG_SUPPORTS_COMPRESSION != 0,
        peer_supports_msg_channel: flags & FLAG_SUPPORTS_MSG_CHANNEL != 0,
    })
}

/// Version 2: reads 4 more bytes for `payload_crc`/`header_crc`,
/// validating both the header and (after the payload is read) the payload.
fn read_v2_body(endpoint: &mut TcpEndpoint, head: &[u8; 20]) -> Result<SocketMessage> {
    let mut tail = [0u8; 4];
    endpoint.read_loop(&mut tail, None, &crate::watch::NeverStop)?;

    let mut full = [0u8; 24];
    full[0..20].copy_from_slice(head);
    full[20..24].copy_from_slice(&tail);

    let header_crc = u32::from_be_bytes(full[20..24].try_into().unwrap());
    if crc32fast::hash(&full[0..20]) != header_crc {
        return Err(NetError::InvalidPacket("header CRC".to_string()));
    }

    let command_id = u16::from_be_bytes(full[2..4].try_into().unwrap());
    let id = u32::from_be_bytes(full[4..8].try_into().unwrap());
    let payload_size = u32::from_be_bytes(full[8..12].try_into().unwrap()) as usize;
    let flags = full[12];
    let payload_type = PayloadType::from_byte(full[13]);
    let payload_crc = u32::from_be_bytes(full[16..20].try_into().unwrap());

    let mut payload = vec![0u8; payload_size];
    if payload_size > 0 {
        endpoint.read_loop(&mut payload, None, &crate::watch::NeverStop)?;
    }
    let observed_crc = if payload.is_empty() { 0 } else { crc32fast::hash(&payload) };
    if observed_crc != payload_crc {
        return Err(NetError::InvalidPacket("CRC checksum of payload".to_string()));
    }

    if flags & FLAG_COMPRESSED != 0 {
        payload = inflate(&payload).map_err(|e| NetError::InvalidPacket(e.to_string()))?;
    }

    Ok(SocketMessage {
        command_id,
        id,
        payload_type,
        payload,
        peer_supports_compression: flags & FLAG_SUPPORTS_COMPRESSION != 0,
        peer_supports_msg_channel: flags & FLAG_SUPPORTS_MSG_CHANNEL != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn connected_pair() -> (TcpEndpoint, TcpEndpoint) {
        let mut server = TcpEndpoint::new();
        server.bind("127.0.0.1", 0).unwrap();
        let port = server.local_addr().unwrap().port().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let stop = server.stop_flag();
        let handle = thread::spawn(move || {
            let mut handler = move |endpoint: TcpEndpoint, _: &str, _: u16| {
                let _ = tx.send(endpoint);
                crate::tcp::AcceptDecision::Accept
            };
            server.listen(8, Duration::from_millis(20), &mut handler).unwrap();
        });

        let mut client = TcpEndpoint::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if client.connect("127.0.0.1", &port.to_string()).is_ok() {
                break;
            }
            if Instant::now() > deadline {
                panic!("could not connect to test listener");
            }
            thread::sleep(Duration::from_millis(10));
        }
        let server_side = rx.recv_timeout(Duration::from_secs(2)).unwrap();

        stop.signal();
        handle.join().unwrap();
        (client, server_side)
    }

    #[test]
    fn framed_echo_round_trip() {
        let (mut client, mut server) = connected_pair();
        let msg = SocketMessage::new(0x1234, 0xCAFEBABE, PayloadType::String, b"hello".to_vec());
        send_message(&mut client, &msg, SendOptions::default()).unwrap();

        let received = wait_message(&mut server, Duration::from_secs(2), &crate::watch::NeverStop).unwrap().unwrap();
        assert_eq!(received.command_id, 0x1234);
        assert_eq!(received.id, 0xCAFEBABE);
        assert_eq!(received.as_string().unwrap(), "hello");

        send_message(&mut server, &received, SendOptions::default()).unwrap();
        let echoed = wait_message(&mut client, Duration::from_secs(2), &crate::watch::NeverStop).unwrap().unwrap();
        assert_eq!(echoed.as_string().unwrap(), "hello");
    }

    #[test]
    fn large_payload_is_compressed_on_the_wire() {
        let (mut client, mut server) = connected_pair();
        let payload = "the quick brown fox jumps over the lazy dog ".repeat(100).into_bytes();
        assert!(payload.len() > 4000);
        let msg = SocketMessage::new(1, 1, PayloadType::Binary, payload.clone());
        send_message(&mut client, &msg, SendOptions::default()).unwrap();

        let received = wait_message(&mut server, Duration::from_secs(2), &crate::watch::NeverStop).unwrap().unwrap();
        assert_eq!(received.as_bytes().unwrap(), payload.as_slice());
    }

    #[test]
    fn small_payload_is_never_compressed() {
        let compressed_len = {
            let (payload, compressed) = maybe_compress(b"short", SendOptions::default());
            assert!(!compressed);
            payload.len()
        };
        assert_eq!(compressed_len, 5);
    }
}
