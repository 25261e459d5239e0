//! Two-seat rooms.

use std::sync::{Arc, Mutex};

use tandem_protocol::Frame;
use tracing::{debug, info};

use crate::delivery::FrameSource;
use crate::guest::Guest;

/// Seat conflict: both seats were already taken. Recoverable; the hall
/// reseats the guest into a fresh room.
#[derive(Debug, thiserror::Error)]
#[error("room {id} is full")]
pub struct RoomFull {
    pub id: String,
}

/// A two-seat pairing relaying a conversation between exactly two
/// guests. Rooms never own their occupants; the hall owns the rooms.
pub struct Room {
    id: String,
    seats: Mutex<Vec<Arc<Guest>>>,
}

impl Room {
    pub(crate) fn new(id: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            seats: Mutex::new(Vec::with_capacity(2)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn occupancy(&self) -> usize {
        self.seats.lock().unwrap().len()
    }

    /// Seats a guest and sends the join notices: the joiner learns the
    /// room id, and once both seats are taken each side learns the
    /// other's display name. Never overwrites an occupied seat.
    pub(crate) fn add(&self, guest: &Arc<Guest>) -> Result<(), RoomFull> {
        let mut seats = self.seats.lock().unwrap();
        if seats.len() > 1 {
            return Err(RoomFull {
                id: self.id.clone(),
            });
        }
        seats.push(Arc::clone(guest));

        notice(guest, format!("ROOM {}", self.id));
        if let [first, second] = seats.as_slice() {
            notice(first, format!("PEER {}", display_name(second)));
            notice(second, format!("PEER {}", display_name(first)));
        }
        Ok(())
    }

    /// Removes a guest if seated. The occupant left behind hears
    /// `POUT <name>`. Returns the remaining occupancy, or `None` when
    /// the guest was not here.
    pub(crate) fn checkout(&self, guest: &Guest) -> Option<usize> {
        let mut seats = self.seats.lock().unwrap();
        let index = seats.iter().position(|seated| seated.id() == guest.id())?;
        seats.remove(index);
        info!(room = %self.id, guest = %display_name(guest), "guest left room");

        if let Some(remaining) = seats.first() {
            notice(remaining, format!("POUT {}", display_name(guest)));
        }
        Some(seats.len())
    }

    /// The occupant at the other seat, or none while the room has fewer
    /// than two.
    pub fn other(&self, guest: &Guest) -> Option<Arc<Guest>> {
        let seats = self.seats.lock().unwrap();
        if seats.len() < 2 {
            return None;
        }
        seats.iter().find(|seated| seated.id() != guest.id()).cloned()
    }
}

fn display_name(guest: &Guest) -> String {
    guest.name().unwrap_or_default()
}

/// Best-effort server notice; a dead destination only costs a log line.
fn notice(guest: &Guest, text: String) {
    if let Err(e) = guest.deliver(Frame::text(text), FrameSource::Outgoing) {
        debug!(guest = %guest.id(), "notice dropped: {e}");
    }
}
