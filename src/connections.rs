//! Connection table and broadcast fan-out.
//!
//! The table owns the write half of every live connection (read halves stay
//! with their handlers). Broadcasting iterates a snapshot taken under the
//! table lock, then performs the sends with the lock released, so one slow
//! or dead peer never holds up table mutation or delivery to the rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{debug, error};

use crate::protocol;
use crate::registry::ClientId;

/// Write half of one client connection, shared between its handler's
/// teardown path and concurrent broadcasts.
type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// Shared mapping from client id to connection writer.
///
/// Clonable handle over one lock-guarded map, mutated only by the acceptor
/// (insert) and handler teardown (remove).
#[derive(Clone, Default)]
pub struct ConnectionTable {
    writers: Arc<Mutex<HashMap<ClientId, SharedWriter>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ClientId, writer: OwnedWriteHalf) {
        let mut writers = self.writers.lock().expect("connection table lock poisoned");
        writers.insert(id, Arc::new(tokio::sync::Mutex::new(writer)));
    }

    /// Remove `id` from the table. Idempotent; the underlying stream closes
    /// once the last shared reference to the writer is dropped.
    pub fn remove(&self, id: ClientId) {
        let mut writers = self.writers.lock().expect("connection table lock poisoned");
        writers.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.writers
            .lock()
            .expect("connection table lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `MSG|<text>` to every connected client except `exclude`.
    ///
    /// Sends run concurrently against a snapshot of the table. A failed
    /// send is logged and skipped; it never aborts delivery to other peers.
    pub async fn broadcast(&self, text: &str, exclude: Option<ClientId>) {
        let targets: Vec<(ClientId, SharedWriter)> = {
            let writers = self.writers.lock().expect("connection table lock poisoned");
            writers
                .iter()
                .filter(|(id, _)| Some(**id) != exclude)
                .map(|(id, writer)| (*id, Arc::clone(writer)))
                .collect()
        };

        let frame = protocol::frame_broadcast(text);
        debug!(recipients = targets.len(), "broadcasting final message");

        let sends = targets.into_iter().map(|(id, writer)| {
            let frame = frame.clone();
            async move {
                let mut writer = writer.lock().await;
                if let Err(e) = writer.write_all(&frame).await {
                    error!(client = %id, error = %e, "failed to deliver broadcast");
                }
            }
        });
        join_all(sends).await;
    }
}
