//! Room registry and pairing service.
//!
//! The hall is the only authority that creates, finds or retires rooms.
//! Check-in, check-out and key generation are serialized under one lock
//! so a race for the last seat in a room resolves to exactly one
//! winner; the loser is reseated into a fresh room, never errored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, error, info};

use crate::guest::Guest;
use crate::room::Room;

/// Length of generated room keys.
pub const ROOM_KEY_LEN: usize = 16;

/// Registry of all rooms.
#[derive(Default)]
pub struct Hall {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl Hall {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of registered rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    /// Looks up a registered room.
    pub fn room(&self, key: &str) -> Option<Arc<Room>> {
        self.rooms.lock().unwrap().get(key).cloned()
    }

    /// Seats a guest, leaving whatever room it held first. An explicit
    /// key addresses (or lazily creates) that room; without one a fresh
    /// unique key is generated. A full room is not an error: the guest
    /// is reseated into a brand-new room, retrying the seat exactly
    /// once.
    pub fn checkin(&self, guest: &Arc<Guest>, requested: Option<&str>) {
        self.checkout(guest);

        let mut rooms = self.rooms.lock().unwrap();
        let key = match requested.filter(|key| !key.is_empty()) {
            Some(key) => key.to_string(),
            None => generate_key(&rooms),
        };
        let room = Arc::clone(
            rooms
                .entry(key)
                .or_insert_with_key(|key| Room::new(key.clone())),
        );

        let seated = match room.add(guest) {
            Ok(()) => room,
            Err(conflict) => {
                debug!("{conflict}, reseating into a fresh room");
                let key = generate_key(&rooms);
                let fresh = Room::new(key.clone());
                rooms.insert(key, Arc::clone(&fresh));
                if let Err(conflict) = fresh.add(guest) {
                    // A freshly created room has both seats free.
                    error!("{conflict} on a fresh room, guest left unseated");
                    return;
                }
                fresh
            }
        };
        drop(rooms);

        guest.set_room(&seated);
        info!(
            guest = %guest.name().unwrap_or_else(|| "guest".into()),
            room = %seated.id(),
            "checked in"
        );
    }

    /// Leaves the current room, if any. The remaining occupant hears
    /// `POUT <name>`; a room emptied by the departure is retired from
    /// the registry.
    pub fn checkout(&self, guest: &Arc<Guest>) {
        let Some(room) = guest.room() else {
            return;
        };
        let mut rooms = self.rooms.lock().unwrap();
        if room.checkout(guest) == Some(0) {
            rooms.remove(room.id());
            debug!(room = %room.id(), "empty room retired");
        }
        drop(rooms);
        guest.clear_room();
    }

    /// Orderly teardown: best-effort close frame, mark closed, detach
    /// from the room. Idempotent, and never touches the peer's
    /// connection beyond its `POUT` notice.
    pub fn close(&self, guest: &Arc<Guest>) {
        if guest.shut() {
            self.checkout(guest);
            info!(guest = %guest.id(), "socket closed");
        }
    }
}

/// Generates a fresh room key, regenerating for as long as it collides
/// with a registered one.
fn generate_key(rooms: &HashMap<String, Arc<Room>>) -> String {
    loop {
        let key: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ROOM_KEY_LEN)
            .map(char::from)
            .collect();
        if !rooms.contains_key(&key) {
            return key;
        }
    }
}
