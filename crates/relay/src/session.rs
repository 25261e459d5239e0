//! Per-connection receive loop and command dispatch.
//!
//! One logical message at a time: the first frame fixes the message
//! kind, command payloads are reassembled until the final frame, and
//! everything relayable streams to the roommate frame-by-frame as it
//! arrives. Any frame or timeout failure is fatal to this connection
//! only and resolves to its orderly teardown.

use std::sync::Arc;

use tandem_protocol::{Frame, FrameError, MessageKind, read_frame};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::delivery::FrameSource;
use crate::guest::{Guest, Identity};
use crate::hall::Hall;

/// One guest's live session. Owns the read half of the connection and
/// drives the message state machine until the wire dies.
pub struct Session<R> {
    guest: Arc<Guest>,
    hall: Arc<Hall>,
    reader: R,
}

impl<R: AsyncRead + Unpin> Session<R> {
    pub fn new(guest: Arc<Guest>, hall: Arc<Hall>, reader: R) -> Self {
        Self {
            guest,
            hall,
            reader,
        }
    }

    /// Runs until the peer closes, goes silent past the idle window, or
    /// the wire breaks, then tears the connection down.
    pub async fn run(mut self) {
        match self.receive_loop().await {
            Ok(()) => info!(guest = %self.guest.id(), "close frame received"),
            Err(FrameError::Timeout) => {
                warn!(guest = %self.guest.id(), "no frames in the idle window, peer is dead");
            }
            Err(e) => warn!(guest = %self.guest.id(), "session failed: {e}"),
        }
        self.hall.close(&self.guest);
    }

    /// Processes one logical message per iteration.
    async fn receive_loop(&mut self) -> Result<(), FrameError> {
        while self.guest.is_open() {
            let first = read_frame(&mut self.reader).await?;
            let kind = MessageKind::of(&first);
            debug!(?kind, fin = first.fin, "receiving message");

            let body = self.receive_message(first, kind).await?;

            match kind {
                MessageKind::Close => return Ok(()),
                MessageKind::Ping => self.pong(),
                MessageKind::Name => self.register(&body),
                MessageKind::Room => self.change_room(&body),
                MessageKind::Clip
                | MessageKind::Pong
                | MessageKind::Text
                | MessageKind::Binary
                | MessageKind::Continuation => {}
            }
        }
        Ok(())
    }

    /// Reads a message to completion: command payloads are reassembled,
    /// relayable frames stream to the roommate as they arrive.
    async fn receive_message(
        &mut self,
        first: Frame,
        kind: MessageKind,
    ) -> Result<Vec<u8>, FrameError> {
        if kind == MessageKind::Binary {
            self.announce_file(&first);
        }

        let mut body = Vec::new();
        let mut frame = first;
        loop {
            if kind.is_command() {
                body.extend_from_slice(&frame.payload);
            }
            let fin = frame.fin;
            if kind.is_relayed() {
                self.relay(frame, FrameSource::Forwarded);
            }
            if fin {
                break;
            }
            frame = read_frame(&mut self.reader).await?;
        }
        Ok(body)
    }

    /// A binary message is a file part; the roommate hears the filename
    /// before the first data frame reaches it.
    fn announce_file(&self, frame: &Frame) {
        match frame.filename() {
            Some(name) => {
                let mut notice = b"PEND ".to_vec();
                notice.extend_from_slice(name);
                self.relay(Frame::text(notice), FrameSource::Outgoing);
            }
            None => warn!(
                guest = %self.guest.id(),
                "binary frame without a filename field, no PEND sent"
            ),
        }
    }

    /// Hands a frame to the roommate's wire, if there is one to hear it.
    fn relay(&self, frame: Frame, source: FrameSource) {
        let Some(mate) = self.guest.roommate() else {
            debug!(guest = %self.guest.id(), "no roommate, frame dropped");
            return;
        };
        if !mate.is_open() {
            warn!(guest = %self.guest.id(), "roommate already closed, frame dropped");
            return;
        }
        if let Err(e) = mate.deliver(frame, source) {
            warn!(guest = %self.guest.id(), "relay failed: {e}");
        }
    }

    /// `PING` is answered in band with a text `PONG`: browser clients
    /// never get to see pong control frames.
    fn pong(&self) {
        debug!(guest = %self.guest.id(), "responding ping with a pong");
        if let Err(e) = self.guest.deliver(Frame::text("PONG"), FrameSource::Outgoing) {
            warn!(guest = %self.guest.id(), "pong dropped: {e}");
        }
    }

    /// `NAME <displayName> <id>`: record identity, then take the first
    /// auto-assigned seat.
    fn register(&self, body: &[u8]) {
        let text = String::from_utf8_lossy(body);
        let mut fields = text.split_whitespace().skip(1);
        let (Some(name), Some(client_id)) = (fields.next(), fields.next()) else {
            warn!(payload = %text, "malformed NAME command ignored");
            return;
        };
        self.guest.set_identity(Identity {
            name: name.to_string(),
            client_id: client_id.to_string(),
        });
        info!(name = %name, id = %client_id, "checking in for the first time");
        self.hall.checkin(&self.guest, None);
    }

    /// `ROOM <roomId>`: leave the current room for the requested one. An
    /// empty id falls back to auto-assignment.
    fn change_room(&self, body: &[u8]) {
        let text = String::from_utf8_lossy(body);
        let key = text.get(5..).map(str::trim).unwrap_or("");
        self.hall
            .checkin(&self.guest, (!key.is_empty()).then_some(key));
    }
}
