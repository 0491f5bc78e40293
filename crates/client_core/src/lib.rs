use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{ConversationId, UserRef},
    protocol::{ClientFrame, ConversationEvent, MessageEvent, ServerFrame},
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};

pub mod conversations;
pub mod realtime;
pub mod rest;
pub mod session;
pub mod thread;

pub use conversations::{Conversation, ConversationStore, Established, Provisional};
pub use realtime::RealtimeChannel;
pub use rest::RestApi;
pub use session::{AnonymousSession, SessionProvider, StaticSessionProvider};
pub use thread::{DeliveryStatus, MessageThreadStore, OpenThread, ThreadMessage};

/// Re-render signals broadcast to the UI layer whenever a store mutates.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConversationsUpdated,
    ThreadUpdated,
    Error(String),
}

#[derive(Debug, Error)]
pub enum SendMessageError {
    #[error("no open thread to send into")]
    NoOpenThread,
    #[error("message text must not be empty")]
    EmptyText,
    #[error("failed to persist message: {0}")]
    Persist(anyhow::Error),
}

struct ClientState {
    conversations: ConversationStore,
    thread: MessageThreadStore,
    channel: Option<RealtimeChannel>,
}

/// The reconciliation core: merges the REST-fetched conversation list,
/// locally-optimistic provisional state, and realtime push events into one
/// consistent view held by the two stores.
///
/// All store mutations happen under one lock, so the ordering races the
/// transport cannot rule out (bootstrap response vs. push event) are resolved
/// purely by the merge rules, never by sequencing.
pub struct MessagingClient {
    rest: RestApi,
    local_user: UserRef,
    inner: Mutex<ClientState>,
    events: broadcast::Sender<ClientEvent>,
}

impl MessagingClient {
    pub fn new(
        server_url: impl Into<String>,
        local_user: UserRef,
        session: Arc<dyn SessionProvider>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            rest: RestApi::new(server_url, session),
            local_user,
            inner: Mutex::new(ClientState {
                conversations: ConversationStore::default(),
                thread: MessageThreadStore::default(),
                channel: None,
            }),
            events,
        })
    }

    pub fn local_user(&self) -> &UserRef {
        &self.local_user
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Opens the realtime channel and spawns the single consumer loop that
    /// drains its typed event stream into the reconciliation handlers.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let channel =
            RealtimeChannel::connect(self.rest.base_url(), self.local_user.id.clone(), inbound_tx)?;
        {
            let mut guard = self.inner.lock().await;
            if let Some(previous) = guard.channel.replace(channel) {
                previous.close();
            }
        }

        let client = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = inbound_rx.recv().await {
                client.handle_server_frame(frame).await;
            }
        });
        Ok(())
    }

    /// Replaces the conversation list from the authoritative REST fetch,
    /// merging by id so entries created by realtime events or still
    /// provisional are not lost.
    pub async fn bootstrap(&self) -> Result<()> {
        let summaries = self.rest.fetch_conversations().await?;
        {
            let mut guard = self.inner.lock().await;
            guard
                .conversations
                .bootstrap(summaries, &self.local_user.id);
        }
        self.emit(ClientEvent::ConversationsUpdated);
        Ok(())
    }

    /// Opens a thread with `partner`. With no conversation id the thread is
    /// provisional: an id-less list entry is created and no history exists to
    /// fetch. Otherwise the history is loaded wholesale from REST.
    pub async fn open_thread(
        &self,
        conversation_id: Option<ConversationId>,
        partner: UserRef,
    ) -> Result<()> {
        let Some(conversation_id) = conversation_id else {
            {
                let mut guard = self.inner.lock().await;
                guard.conversations.add_provisional(partner.clone(), Utc::now());
                guard.thread.open(None, partner);
            }
            self.emit(ClientEvent::ConversationsUpdated);
            self.emit(ClientEvent::ThreadUpdated);
            return Ok(());
        };

        {
            let mut guard = self.inner.lock().await;
            guard.thread.open(Some(conversation_id.clone()), partner);
        }
        // empty thread renders as the loading state while the fetch is out
        self.emit(ClientEvent::ThreadUpdated);

        let history = self.rest.fetch_thread(&conversation_id).await?;
        {
            let mut guard = self.inner.lock().await;
            // the user may have switched threads while the fetch was in flight
            if guard.thread.is_open(&conversation_id) {
                guard.thread.set_history(history.messages);
            }
        }
        self.emit(ClientEvent::ThreadUpdated);
        Ok(())
    }

    /// Sends a message into the open thread: optimistic append, REST persist,
    /// realtime broadcast, and (for the first message of a brand-new
    /// conversation) the provisional-to-established resolution plus the
    /// `send_conversation` event the partner's client needs to materialize a
    /// list entry.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(SendMessageError::EmptyText.into());
        }

        let (partner, prior_id) = {
            let mut guard = self.inner.lock().await;
            let open = guard
                .thread
                .open_thread()
                .ok_or(SendMessageError::NoOpenThread)?;
            let partner = open.partner.clone();
            let prior_id = open.conversation_id.clone();
            guard
                .thread
                .append_optimistic(self.local_user.id.clone(), text, Utc::now());
            (partner, prior_id)
        };
        self.emit(ClientEvent::ThreadUpdated);

        let response = match self.rest.post_message(&partner.id, text).await {
            Ok(response) => response,
            Err(err) => {
                {
                    self.inner.lock().await.thread.fail_pending();
                }
                warn!(partner_id = %partner.id, "send: persist failed: {err}");
                self.emit(ClientEvent::ThreadUpdated);
                self.emit(ClientEvent::Error(format!(
                    "failed to send message to {}: {err}",
                    partner.id
                )));
                return Err(SendMessageError::Persist(err).into());
            }
        };

        let conversation_id = response.conversation_id.clone();
        let is_new_conversation = prior_id.is_none();
        {
            let mut guard = self.inner.lock().await;
            guard
                .thread
                .confirm_pending(response.id.clone(), conversation_id.clone());
            guard.thread.adopt_conversation_id(&conversation_id);
            if is_new_conversation {
                guard.conversations.resolve_provisional(
                    &partner.id,
                    conversation_id.clone(),
                    text,
                    Utc::now(),
                );
            } else {
                guard.conversations.record_outbound(
                    &conversation_id,
                    text,
                    &partner.id,
                    Utc::now(),
                );
            }
        }

        // live delivery to the partner's client; the REST write above is the
        // durable copy, so a dropped frame only costs liveness
        self.send_frame(ClientFrame::SendMessage(MessageEvent {
            message: text.to_string(),
            sender_id: self.local_user.id.clone(),
            receiver_id: partner.id.clone(),
            conversation_id: conversation_id.clone(),
        }))
        .await;

        if is_new_conversation {
            info!(conversation_id = %conversation_id, partner_id = %partner.id,
                "send: new conversation established");
            self.send_frame(ClientFrame::SendConversation(ConversationEvent {
                last_message: text.to_string(),
                is_read: false,
                sender: self.local_user.id.clone(),
                sender_name: self.local_user.display_name.clone(),
                sender_avatar: self.local_user.avatar_url.clone(),
                sender_username: self.local_user.handle.clone(),
                receiver: partner.id.clone(),
                receiver_name: partner.display_name.clone(),
                receiver_avatar: partner.avatar_url.clone(),
                receiver_username: partner.handle.clone(),
                conversation_id,
            }))
            .await;
        }

        self.emit(ClientEvent::ConversationsUpdated);
        self.emit(ClientEvent::ThreadUpdated);
        Ok(())
    }

    /// Marks the latest message of a conversation read, durably and locally.
    /// Safe to call repeatedly; both legs are idempotent.
    pub async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        self.rest.mark_read(conversation_id).await?;
        let changed = {
            self.inner.lock().await.conversations.mark_read(conversation_id)
        };
        if changed {
            self.emit(ClientEvent::ConversationsUpdated);
        }
        Ok(())
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.inner.lock().await.conversations.list().to_vec()
    }

    pub async fn thread_messages(&self) -> Vec<ThreadMessage> {
        self.inner.lock().await.thread.messages().to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .conversations
            .list()
            .iter()
            .filter(|conversation| conversation.is_unread_for(&self.local_user.id))
            .count()
    }

    pub(crate) async fn handle_server_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::ReceiveMessage(event) => {
                if event.sender_id == self.local_user.id {
                    // own echo: the optimistic append already covered it
                    return;
                }
                let appended = {
                    let mut guard = self.inner.lock().await;
                    guard.conversations.apply_inbound_message(&event, Utc::now());
                    guard.thread.append_inbound(&event, Utc::now())
                };
                self.emit(ClientEvent::ConversationsUpdated);
                if appended {
                    self.emit(ClientEvent::ThreadUpdated);
                }
            }
            ServerFrame::ReceiveConversation(event) => {
                if event.sender == self.local_user.id {
                    return;
                }
                {
                    let mut guard = self.inner.lock().await;
                    guard.conversations.apply_conversation_event(&event, Utc::now());
                }
                self.emit(ClientEvent::ConversationsUpdated);
            }
            ServerFrame::Error(err) => {
                warn!("realtime: server reported error: {err}");
                self.emit(ClientEvent::Error(err.to_string()));
            }
        }
    }

    async fn send_frame(&self, frame: ClientFrame) {
        let guard = self.inner.lock().await;
        match &guard.channel {
            Some(channel) => channel.send(frame),
            None => warn!("realtime: not connected; outbound frame dropped"),
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

/// Boundary the UI collaborator consumes: thread/list actions in, re-render
/// signals out.
#[async_trait]
pub trait MessagingHandle: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn bootstrap(&self) -> Result<()>;
    async fn open_thread(
        &self,
        conversation_id: Option<ConversationId>,
        partner: UserRef,
    ) -> Result<()>;
    async fn send_message(&self, text: &str) -> Result<()>;
    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()>;
    async fn conversations(&self) -> Vec<Conversation>;
    async fn thread_messages(&self) -> Vec<ThreadMessage>;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

#[async_trait]
impl MessagingHandle for Arc<MessagingClient> {
    async fn connect(&self) -> Result<()> {
        MessagingClient::connect(self).await
    }

    async fn bootstrap(&self) -> Result<()> {
        MessagingClient::bootstrap(self).await
    }

    async fn open_thread(
        &self,
        conversation_id: Option<ConversationId>,
        partner: UserRef,
    ) -> Result<()> {
        MessagingClient::open_thread(self, conversation_id, partner).await
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        MessagingClient::send_message(self, text).await
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        MessagingClient::mark_read(self, conversation_id).await
    }

    async fn conversations(&self) -> Vec<Conversation> {
        MessagingClient::conversations(self).await
    }

    async fn thread_messages(&self) -> Vec<ThreadMessage> {
        MessagingClient::thread_messages(self).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        MessagingClient::subscribe_events(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
