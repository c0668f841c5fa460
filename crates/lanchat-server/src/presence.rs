//! Presence broadcasting: project live sessions to a contact list and push
//! the full snapshot to every open connection.
//!
//! The [`Registry`](crate::registry::Registry) calls [`publish`] while it
//! still holds its lock, so a snapshot always reflects exactly one applied
//! mutation and snapshots reach every queue in mutation order.

use std::sync::Arc;

use lanchat_core::{Contact, Outbound};
use tracing::{debug, warn};

use crate::session::{SessionHandle, contact_of};

/// Project `(handle, display_name)` pairs to contact rows, skipping
/// unregistered sessions. Input order is preserved.
pub fn project<'a>(
    sessions: impl IntoIterator<Item = (&'a SessionHandle, Option<&'a str>)>,
) -> Vec<Contact> {
    sessions
        .into_iter()
        .filter_map(|(handle, name)| contact_of(handle, name))
        .collect()
}

/// Send one `contact-list` envelope to every recipient.
///
/// A recipient whose queue is full is evicted rather than left with a stale
/// list. Returns the number of queues that accepted the frame.
pub fn publish<'a>(
    contacts: Vec<Contact>,
    recipients: impl IntoIterator<Item = &'a SessionHandle>,
) -> usize {
    let contact_count = contacts.len();
    let json = match (Outbound::ContactList { contacts }).to_json() {
        Ok(j) => Arc::new(j),
        Err(e) => {
            warn!(error = %e, "failed to serialize contact list");
            return 0;
        }
    };

    let mut delivered = 0;
    for handle in recipients {
        if handle.send_or_evict(json.clone()) {
            delivered += 1;
        } else {
            debug!(session_id = %handle.id(), "presence not queued");
        }
    }
    debug!(contacts = contact_count, recipients = delivered, "published presence");
    delivered
}
