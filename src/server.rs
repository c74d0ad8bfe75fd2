//! Connection acceptor and per-client handler: the barrier itself.
//!
//! One handler task per connection. A handler reads one message per loop
//! iteration, drives its client's phases through the registry, invokes the
//! translation collaborator when the message is not already in the target
//! language, and gates the broadcast on the cohort captured at
//! message-arrival time. Handlers never wait on each other directly; all
//! coordination goes through the phase registry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::connections::ConnectionTable;
use crate::protocol;
use crate::registry::{ClientId, Phase, PhaseRegistry};
use crate::translation;

const READ_BUFFER_SIZE: usize = 4096;

/// Shared relay state: one instance per server process (or per test).
pub struct Relay {
    config: Arc<Config>,
    registry: PhaseRegistry,
    connections: ConnectionTable,
    http: reqwest::Client,
    next_client_id: AtomicU64,
    /// Finalized texts awaiting the barrier, one per cohort member. A
    /// handler deposits its text just before reaching `Ready`; whichever
    /// handler trips the barrier drains and broadcasts the whole round.
    outbox: Mutex<HashMap<ClientId, String>>,
}

impl Relay {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: PhaseRegistry::new(),
            connections: ConnectionTable::new(),
            http: reqwest::Client::new(),
            next_client_id: AtomicU64::new(0),
            outbox: Mutex::new(HashMap::new()),
        })
    }

    /// Handle to the phase registry, for the status endpoint and tests.
    pub fn registry(&self) -> PhaseRegistry {
        self.registry.clone()
    }

    /// Bind the relay listener configured in `bind_addr`.
    pub async fn listen(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.config.bind_addr)
            .await
            .with_context(|| format!("failed to bind relay listener on {}", self.config.bind_addr))
    }

    /// Accept loop. Each accepted connection gets a fresh id, is registered
    /// at `Waiting` in both shared tables, and is handed to its own handler
    /// task. A failed accept is logged and the loop continues.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let id = ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed) + 1);
                    let (reader, writer) = stream.into_split();

                    self.connections.insert(id, writer);
                    self.registry.update(id, Phase::Waiting);
                    info!(client = %id, %peer, "client connected");

                    let relay = Arc::clone(&self);
                    tokio::spawn(async move {
                        relay.handle_client(id, reader).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    /// Per-client loop: one message per iteration, then barrier evaluation.
    async fn handle_client(&self, id: ClientId, mut reader: OwnedReadHalf) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    info!(client = %id, "client disconnected");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    error!(client = %id, error = %e, "read failed");
                    break;
                }
            };

            let message = match protocol::parse_inbound(&buf[..n]) {
                Ok(message) => message,
                Err(e) => {
                    // Local, non-fatal: discard without touching any phase.
                    error!(client = %id, error = %e, "discarding malformed message");
                    continue;
                }
            };
            debug!(client = %id, language = %message.language, "message received");

            // The active cohort is captured before this client's first phase
            // mutation, so it reflects membership at message-arrival time.
            let cohort = self.registry.active_ids();
            self.registry.update(id, Phase::Received);

            let target = &self.config.target_language;
            let final_text = if message.language == *target {
                debug!(client = %id, "already in target language");
                self.registry.update(id, Phase::Checked);
                message.text
            } else {
                self.registry.update(id, Phase::Checked);
                self.registry.update(id, Phase::TranslatingStarted);
                let translated = translation::translate_text(
                    &self.http,
                    &self.config,
                    &message.text,
                    &message.language,
                    target,
                )
                .await;
                let translated = match translated {
                    Ok(text) => text,
                    Err(e) => {
                        // Fatal to this handler only; teardown lets the rest
                        // of the cohort resolve via vacuous readiness.
                        error!(client = %id, error = %e, "translation failed, dropping client");
                        break;
                    }
                };
                self.registry.update(id, Phase::TranslatingEnded);
                translated
            };

            // Deposit before flipping to Ready, so whichever handler trips
            // the barrier already sees this text in the outbox.
            self.outbox
                .lock()
                .expect("outbox lock poisoned")
                .insert(id, final_text);
            self.registry.update(id, Phase::Ready);

            if self.registry.all_ready_for(&cohort) {
                let round_texts = self.drain_round(&cohort);
                info!(
                    cohort = cohort.len(),
                    messages = round_texts.len(),
                    "barrier reached, broadcasting round"
                );
                for text in &round_texts {
                    self.connections.broadcast(text, None).await;
                }
                self.registry.reset_subset(&cohort);
            } else {
                debug!(client = %id, "waiting at barrier");
            }
        }

        // Teardown: connection table, registry, and outbox entries go
        // together.
        self.connections.remove(id);
        self.registry.remove(id);
        self.outbox.lock().expect("outbox lock poisoned").remove(&id);
        info!(client = %id, "connection closed");
    }

    /// Take the cohort's finalized texts out of the outbox, in ascending
    /// client-id order for a stable broadcast sequence within the round.
    fn drain_round(&self, cohort: &HashSet<ClientId>) -> Vec<String> {
        let mut members: Vec<ClientId> = cohort.iter().copied().collect();
        members.sort();

        let mut outbox = self.outbox.lock().expect("outbox lock poisoned");
        members
            .into_iter()
            .filter_map(|member| outbox.remove(&member))
            .collect()
    }
}
