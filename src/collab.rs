//! Collaborative-document check over the y-websocket sync protocol.
//!
//! The client joins a room, announces its (empty) state vector and applies
//! whatever the server syncs back into a local Yjs document. Frames carry
//! lib0 varint-framed messages: `[messageSync, syncType, varBuf payload]`.
use anyhow::{anyhow, bail, Context, Result};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Transact, Update, XmlFragmentRef};

pub const PROSEMIRROR_FRAGMENT: &str = "prosemirror";

const MESSAGE_SYNC: u64 = 0;
const SYNC_STEP1: u64 = 0;
const SYNC_STEP2: u64 = 1;
const SYNC_UPDATE: u64 = 2;

fn write_var(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn encode_sync(kind: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 8);
    write_var(&mut frame, MESSAGE_SYNC);
    write_var(&mut frame, kind);
    write_var(&mut frame, payload.len() as u64);
    frame.extend_from_slice(payload);
    frame
}

struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_var(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| anyhow!("truncated sync message"))?;
            self.pos += 1;
            if shift >= 64 {
                bail!("sync message varint overflows");
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_buf(&mut self) -> Result<&'a [u8]> {
        let len = usize::try_from(self.read_var()?).context("sync payload length")?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| anyhow!("truncated sync message"))?;
        let buf = &self.data[self.pos..end];
        self.pos = end;
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Send this frame back to the server.
    Reply(Vec<u8>),
    Applied { changed: bool },
    /// Awareness, auth and other non-sync traffic.
    Ignored,
}

/// Client half of the sync exchange for one document.
pub struct SyncSession {
    doc: Doc,
    fragment: XmlFragmentRef,
}

impl SyncSession {
    pub fn new(fragment: &str) -> Self {
        let doc = Doc::new();
        let fragment = doc.get_or_insert_xml_fragment(fragment);
        Self { doc, fragment }
    }

    pub fn opening_message(&self) -> Vec<u8> {
        let state = self.doc.transact().state_vector();
        encode_sync(SYNC_STEP1, &state.encode_v1())
    }

    pub fn handle(&mut self, frame: &[u8]) -> Result<SyncEvent> {
        let mut reader = FrameReader::new(frame);
        if reader.read_var()? != MESSAGE_SYNC {
            return Ok(SyncEvent::Ignored);
        }
        match reader.read_var()? {
            SYNC_STEP1 => {
                let remote = StateVector::decode_v1(reader.read_buf()?)
                    .map_err(|err| anyhow!("decode state vector: {err}"))?;
                let diff = self.doc.transact().encode_diff_v1(&remote);
                Ok(SyncEvent::Reply(encode_sync(SYNC_STEP2, &diff)))
            }
            SYNC_STEP2 | SYNC_UPDATE => {
                let update = Update::decode_v1(reader.read_buf()?)
                    .map_err(|err| anyhow!("decode document update: {err}"))?;
                let before = self.doc.transact().state_vector();
                self.doc
                    .transact_mut()
                    .apply_update(update)
                    .map_err(|err| anyhow!("apply document update: {err}"))?;
                let changed = self.doc.transact().state_vector() != before;
                Ok(SyncEvent::Applied { changed })
            }
            other => bail!("unknown sync message type {other}"),
        }
    }

    pub fn fragment_text(&self) -> String {
        let txn = self.doc.transact();
        self.fragment.get_string(&txn)
    }
}

/// A bidirectional stream of binary frames.
pub trait FrameChannel {
    fn send(&mut self, frame: Vec<u8>) -> Result<()>;
    fn recv(&mut self) -> Result<Vec<u8>>;
    fn close(&mut self) {}
}

pub trait CollabConnector {
    fn connect(&self, url: &str, timeout: Duration) -> Result<Box<dyn FrameChannel>>;
}

/// Sync one room and return the fragment text after the first update that
/// changes the local document.
pub fn sync_document(
    channel: &mut dyn FrameChannel,
    fragment: &str,
    timeout: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut session = SyncSession::new(fragment);
    channel.send(session.opening_message())?;

    while Instant::now() < deadline {
        let frame = channel.recv()?;
        match session.handle(&frame)? {
            SyncEvent::Reply(reply) => channel.send(reply)?,
            SyncEvent::Applied { changed: true } => {
                channel.close();
                return Ok(session.fragment_text());
            }
            SyncEvent::Applied { changed: false } | SyncEvent::Ignored => {}
        }
    }
    channel.close();
    bail!("no document content within {}s", timeout.as_secs())
}

/// WebSocket URL of `room` on the collab host (`https` becomes `wss`).
pub fn room_url(collab_host: &str, room: &str) -> String {
    let base = if let Some(rest) = collab_host.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = collab_host.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        collab_host.to_string()
    };
    format!("{base}/{room}")
}

/// Production connector over `tungstenite`.
pub struct WsConnector;

impl CollabConnector for WsConnector {
    fn connect(&self, url: &str, timeout: Duration) -> Result<Box<dyn FrameChannel>> {
        let request = url
            .into_client_request()
            .with_context(|| format!("parse websocket url {url}"))?;
        let uri = request.uri();
        let host = uri
            .host()
            .ok_or_else(|| anyhow!("websocket url {url} has no host"))?
            .to_string();
        let port = uri
            .port_u16()
            .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .with_context(|| format!("resolve {host}:{port}"))?
            .next()
            .ok_or_else(|| anyhow!("{host}:{port} resolves to no address"))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .with_context(|| format!("connect {host}:{port}"))?;
        stream
            .set_read_timeout(Some(timeout))
            .context("set websocket read timeout")?;
        stream
            .set_write_timeout(Some(timeout))
            .context("set websocket write timeout")?;

        let (socket, _) = tungstenite::client_tls(request, stream)
            .map_err(|err| anyhow!("websocket handshake with {url}: {err}"))?;
        tracing::debug!(url, "websocket connected");
        Ok(Box::new(WsChannel { socket }))
    }
}

struct WsChannel {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl FrameChannel for WsChannel {
    fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        self.socket
            .send(Message::Binary(frame))
            .context("send sync message")
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.socket.read().context("read sync message")? {
                Message::Binary(data) => return Ok(data),
                Message::Close(_) => bail!("collab server closed the connection"),
                _ => {}
            }
        }
    }

    fn close(&mut self) {
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }
}
