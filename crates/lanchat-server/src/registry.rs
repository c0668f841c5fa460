//! Connection registry: the single owner of live session state.
//!
//! All mutations (`add`, `rename`, `remove`) run under one lock and publish
//! presence before releasing it. Two registrations racing for the same name
//! are therefore serialized and at most one succeeds, and no presence
//! snapshot can observe a half-applied mutation.
//!
//! A session whose queue is too full to take a snapshot is evicted in the
//! same mutation, and the remaining sessions get a fresh list without it.

use std::collections::HashMap;
use std::sync::Arc;

use lanchat_core::{Contact, Outbound, Profile, RegistryError, SessionId};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::presence;
use crate::session::{Frame, Session, SessionHandle};

/// Whether display names must be unique among live sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamePolicy {
    /// A name held by a live session cannot be registered again.
    Unique,
    /// Any number of sessions may share a name.
    Shared,
}

impl From<Profile> for NamePolicy {
    fn from(profile: Profile) -> Self {
        if profile.unique_names() {
            Self::Unique
        } else {
            Self::Shared
        }
    }
}

struct Entry {
    /// Insertion order; contact lists are sorted by it.
    seq: u64,
    handle: Arc<SessionHandle>,
    display_name: Option<String>,
}

impl Entry {
    fn snapshot(&self) -> Session {
        Session {
            handle: self.handle.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Default)]
struct Table {
    entries: HashMap<SessionId, Entry>,
    next_seq: u64,
    /// Drop counts of sessions no longer in the table.
    retired_drops: u64,
}

impl Table {
    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    fn contacts(&self) -> Vec<Contact> {
        presence::project(
            self.ordered()
                .into_iter()
                .map(|e| (&*e.handle, e.display_name.as_deref())),
        )
    }

    /// Publish presence, then evict sessions that could not take it and
    /// republish until every live session holds the current list.
    fn publish(&mut self) -> usize {
        loop {
            let contacts = self.contacts();
            let delivered =
                presence::publish(contacts, self.ordered().into_iter().map(|e| &*e.handle));

            let evicted: Vec<SessionId> = self
                .entries
                .iter()
                .filter(|(_, e)| e.handle.is_evicted())
                .map(|(id, _)| id.clone())
                .collect();
            if evicted.is_empty() {
                return delivered;
            }
            for id in evicted {
                if let Some(entry) = self.take(&id) {
                    info!(session_id = %id, username = entry.display_name.as_deref(), "evicted slow session");
                }
            }
        }
    }

    fn take(&mut self, id: &SessionId) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        self.retired_drops += entry.handle.drop_count();
        Some(entry)
    }

    fn name_held_by_other(&self, id: &SessionId, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(other, e)| other != id && e.display_name.as_deref() == Some(name))
    }
}

/// Registry of live sessions.
pub struct Registry {
    table: Mutex<Table>,
    policy: NamePolicy,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(policy: NamePolicy) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            policy,
        }
    }

    /// Name policy in force.
    pub fn policy(&self) -> NamePolicy {
        self.policy
    }

    /// Add a freshly connected, unregistered session and publish presence
    /// (the new session receives its initial snapshot).
    pub fn add(&self, handle: Arc<SessionHandle>) {
        let mut table = self.table.lock();
        let seq = table.next_seq;
        table.next_seq += 1;
        let id = handle.id().clone();
        let _ = table.entries.insert(
            id,
            Entry {
                seq,
                handle,
                display_name: None,
            },
        );
        let _ = table.publish();
    }

    /// Remove a session and publish presence to the remaining ones.
    ///
    /// Returns the removed session, or `None` if the id was not live (no
    /// presence is published in that case).
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        let mut table = self.table.lock();
        let removed = table.take(id)?;
        let _ = table.publish();
        Some(removed.snapshot())
    }

    /// Set the display name of a live, unregistered session, queue its
    /// `registered` acknowledgement, then publish presence.
    ///
    /// Fails without mutating anything if the id is not live, the session
    /// already has a name, or (under [`NamePolicy::Unique`]) another live
    /// session holds `name`.
    pub fn rename(&self, id: &SessionId, name: &str) -> Result<(), RegistryError> {
        let mut table = self.table.lock();
        if self.policy == NamePolicy::Unique && table.name_held_by_other(id, name) {
            return Err(RegistryError::NameTaken {
                name: name.to_owned(),
            });
        }
        let entry = table
            .entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownSession(id.clone()))?;
        if entry.display_name.is_some() {
            return Err(RegistryError::AlreadyRegistered(id.clone()));
        }
        entry.display_name = Some(name.to_owned());
        let _ = entry
            .handle
            .send_envelope(&Outbound::Registered { id: id.clone() });
        let _ = table.publish();
        Ok(())
    }

    /// Look up a live session.
    pub fn lookup(&self, id: &SessionId) -> Option<Session> {
        self.table.lock().entries.get(id).map(Entry::snapshot)
    }

    /// All live sessions in connect order, registered or not.
    pub fn list(&self) -> Vec<Session> {
        self.table
            .lock()
            .ordered()
            .into_iter()
            .map(Entry::snapshot)
            .collect()
    }

    /// Current contact list (registered sessions only, connect order).
    pub fn contacts(&self) -> Vec<Contact> {
        self.table.lock().contacts()
    }

    /// Queue a frame for one session. Returns `false` if the id is not live
    /// or its queue did not accept the frame.
    pub fn send_to(&self, id: &SessionId, frame: Frame) -> bool {
        let table = self.table.lock();
        match table.entries.get(id) {
            Some(entry) => entry.handle.send(frame),
            None => {
                debug!(session_id = %id, "no live session for direct delivery");
                false
            }
        }
    }

    /// Queue a frame for every live session. Returns the number of queues
    /// that accepted it.
    pub fn broadcast(&self, frame: &Frame) -> usize {
        let table = self.table.lock();
        table
            .entries
            .values()
            .filter(|e| e.handle.send(frame.clone()))
            .count()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames dropped on full queues since startup, including sessions that
    /// have since left.
    pub fn dropped_frames(&self) -> u64 {
        let table = self.table.lock();
        let live: u64 = table.entries.values().map(|e| e.handle.drop_count()).sum();
        table.retired_drops + live
    }

    /// Number of live sessions with a display name.
    pub fn registered_count(&self) -> usize {
        self.table
            .lock()
            .entries
            .values()
            .filter(|e| e.display_name.is_some())
            .count()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(NamePolicy::Unique)
    }
}
