//! Per-connection guest handle.
//!
//! A guest is the shared face of one live connection: identity, open
//! flag, outbound delivery side, and the room it currently occupies.
//! The session loop owns the read side; everything here is reachable
//! from other connections' contexts and carries its own interior locks.
//! The transport stays a plain socket underneath: session state lives
//! in this struct, never on the stream type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tandem_protocol::Frame;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::delivery::{DeliveryClosed, FrameSource, Outbound};
use crate::room::Room;

/// Client-supplied identity, recorded on `NAME`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub client_id: String,
}

/// One live connection.
pub struct Guest {
    id: Uuid,
    opened: AtomicBool,
    identity: Mutex<Option<Identity>>,
    /// Back-reference only; the hall owns the rooms.
    room: Mutex<Weak<Room>>,
    outbound: Outbound,
}

impl Guest {
    /// Creates the guest for a freshly upgraded connection and spawns
    /// its write pump over the socket's write half.
    pub fn new<W>(writer: W, cancel: CancellationToken) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Arc::new(Self {
            id: Uuid::new_v4(),
            opened: AtomicBool::new(true),
            identity: Mutex::new(None),
            room: Mutex::new(Weak::new()),
            outbound: Outbound::spawn(writer, cancel),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Display name, once the guest has sent `NAME`.
    pub fn name(&self) -> Option<String> {
        self.identity.lock().unwrap().as_ref().map(|i| i.name.clone())
    }

    pub fn set_identity(&self, identity: Identity) {
        *self.identity.lock().unwrap() = Some(identity);
    }

    /// Room currently occupied, if any.
    pub fn room(&self) -> Option<Arc<Room>> {
        self.room.lock().unwrap().upgrade()
    }

    pub(crate) fn set_room(&self, room: &Arc<Room>) {
        *self.room.lock().unwrap() = Arc::downgrade(room);
    }

    pub(crate) fn clear_room(&self) {
        *self.room.lock().unwrap() = Weak::new();
    }

    /// The occupant of the other seat in this guest's room, if both
    /// seats are taken.
    pub fn roommate(&self) -> Option<Arc<Guest>> {
        self.room()?.other(self)
    }

    /// Sends one frame down this guest's wire.
    pub fn deliver(&self, frame: Frame, source: FrameSource) -> Result<(), DeliveryClosed> {
        self.outbound.deliver(frame, source)
    }

    /// Marks the guest closed after a best-effort close frame. Returns
    /// `false` when it was already closed. The caller still owes the
    /// room checkout.
    pub(crate) fn shut(&self) -> bool {
        if !self.opened.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Err(e) = self.outbound.deliver(Frame::close(), FrameSource::Outgoing) {
            warn!(guest = %self.id, "no closing frame sent: {e}");
        }
        true
    }
}
