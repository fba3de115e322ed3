//! Loopback messenger for testing.
//!
//! A [`LoopbackExchange`] simulates the messaging network in process: a
//! directory of resolvable accounts, a per-account message log serving
//! history requests, and per-account inboxes fed through
//! [`tokio::sync::mpsc`] channels. Accounts that join the exchange get a
//! [`LoopbackMessenger`] endpoint; sending on one delivers to the other and
//! echoes back to the sender with `out = true`, like the real network.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use super::{ChatId, ChatMessage, Entity, Messenger, TransportError};

#[derive(Default)]
struct ExchangeState {
    directory: Vec<Entity>,
    inboxes: HashMap<ChatId, mpsc::Sender<ChatMessage>>,
    /// Messages as seen by each account, oldest first.
    logs: HashMap<ChatId, Vec<ChatMessage>>,
    offline: bool,
}

impl ExchangeState {
    fn lookup(&self, handle: &str) -> Option<Entity> {
        let wanted = handle.trim().trim_start_matches('@');
        self.directory
            .iter()
            .find(|e| {
                e.handle
                    .as_deref()
                    .is_some_and(|h| h.eq_ignore_ascii_case(wanted))
            })
            .cloned()
    }
}

/// Shared in-process network used by loopback endpoints.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone, Default)]
pub struct LoopbackExchange {
    state: Arc<parking_lot::Mutex<ExchangeState>>,
}

impl LoopbackExchange {
    /// Create an empty exchange.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and return its endpoint.
    ///
    /// The `buffer` parameter controls the inbox channel capacity.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use sealgram::transport::loopback::LoopbackExchange;
    /// use sealgram::transport::{Entity, Messenger};
    ///
    /// # async fn example() {
    /// let exchange = LoopbackExchange::new();
    /// let alice = exchange.join(Entity::new(1, Some("alice"), "Alice"), 32);
    /// let bob = exchange.join(Entity::new(2, Some("bob"), "Bob"), 32);
    /// let to_bob = alice.resolve("@bob").await.unwrap();
    /// alice.send_text(&to_bob, "hello").await.unwrap();
    /// assert_eq!(bob.recv().await.unwrap().text, "hello");
    /// # }
    /// ```
    #[must_use]
    pub fn join(&self, account: Entity, buffer: usize) -> LoopbackMessenger {
        let (tx, rx) = mpsc::channel(buffer);
        {
            let mut state = self.state.lock();
            state.inboxes.insert(account.id, tx);
            state.logs.entry(account.id).or_default();
            state.directory.push(account.clone());
        }
        LoopbackMessenger {
            account,
            exchange: self.clone(),
            rx: Mutex::new(rx),
        }
    }

    /// Register a resolvable account that has no endpoint.
    ///
    /// Messages sent to it are logged but delivered nowhere.
    pub fn add_contact(&self, contact: Entity) {
        self.state.lock().directory.push(contact);
    }

    /// Append a message to `owner`'s log without delivering it, so that it
    /// shows up in history.
    pub fn seed_history(&self, owner: ChatId, message: ChatMessage) {
        self.state
            .lock()
            .logs
            .entry(owner)
            .or_default()
            .push(message);
    }

    /// Push an arbitrary event into `owner`'s inbox.
    ///
    /// Returns `false` if the account has no endpoint or it was dropped.
    pub async fn inject(&self, owner: ChatId, message: ChatMessage) -> bool {
        let inbox = self.state.lock().inboxes.get(&owner).cloned();
        match inbox {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Snapshot of `owner`'s message log, oldest first.
    #[must_use]
    pub fn log(&self, owner: ChatId) -> Vec<ChatMessage> {
        self.state
            .lock()
            .logs
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Simulate a network outage: every request fails with
    /// [`TransportError::ConnectionClosed`] while set.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if self.state.lock().offline {
            Err(TransportError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

/// Queue an event without waiting: a full inbox drops it, like a network
/// client whose update buffer overflowed. The message stays in the log.
fn deliver(tx: &mpsc::Sender<ChatMessage>, owner: ChatId, message: ChatMessage) {
    match tx.try_send(message) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(%owner, "inbox full; dropping event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(%owner, "inbox closed; dropping event");
        }
    }
}

/// One account's endpoint on a [`LoopbackExchange`].
pub struct LoopbackMessenger {
    account: Entity,
    exchange: LoopbackExchange,
    rx: Mutex<mpsc::Receiver<ChatMessage>>,
}

impl LoopbackMessenger {
    /// The account this endpoint belongs to.
    #[must_use]
    pub const fn account(&self) -> &Entity {
        &self.account
    }
}

impl Messenger for LoopbackMessenger {
    async fn resolve(&self, handle: &str) -> Result<Entity, TransportError> {
        self.exchange.check_online()?;
        self.exchange
            .state
            .lock()
            .lookup(handle)
            .ok_or_else(|| TransportError::NotFound(handle.to_string()))
    }

    async fn send_text(&self, to: &Entity, text: &str) -> Result<(), TransportError> {
        self.exchange.check_online()?;

        // From the sender's side the chat is the recipient, and vice versa.
        let echo = ChatMessage::text(to.id, text, true);
        let delivered = ChatMessage {
            chat_id: self.account.id,
            out: false,
            ..echo.clone()
        };

        let (own_inbox, peer_inbox) = {
            let mut state = self.exchange.state.lock();
            state
                .logs
                .entry(self.account.id)
                .or_default()
                .push(echo.clone());
            state
                .logs
                .entry(to.id)
                .or_default()
                .push(delivered.clone());
            (
                state.inboxes.get(&self.account.id).cloned(),
                state.inboxes.get(&to.id).cloned(),
            )
        };

        if let Some(tx) = peer_inbox {
            deliver(&tx, to.id, delivered);
        }
        if let Some(tx) = own_inbox {
            deliver(&tx, self.account.id, echo);
        }
        Ok(())
    }

    async fn history(
        &self,
        with: &Entity,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TransportError> {
        self.exchange.check_online()?;
        let state = self.exchange.state.lock();
        let log = state.logs.get(&self.account.id);
        Ok(log
            .into_iter()
            .flatten()
            .rev()
            .filter(|m| m.chat_id == with.id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recv(&self) -> Result<ChatMessage, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }
}
