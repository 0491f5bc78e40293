use chrono::{DateTime, Utc};
use shared::{
    domain::{ConversationId, MessageId, UserId, UserRef},
    protocol::{MessageEvent, MessagePayload},
};

/// Lifecycle of a message in the open thread. Optimistically appended
/// messages start `Pending` and settle to `Confirmed` or `Failed` when the
/// send request resolves, so the UI can grey out or offer retry instead of
/// silently lying about delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: Option<MessageId>,
    pub conversation_id: Option<ConversationId>,
    pub sender_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenThread {
    /// None while the conversation is provisional; adopted once the first
    /// send round-trip returns the server-assigned id.
    pub conversation_id: Option<ConversationId>,
    pub partner: UserRef,
}

/// Message list for the single currently-open conversation. Appends are
/// strictly FIFO; switching the open conversation clears the list.
#[derive(Debug, Default)]
pub struct MessageThreadStore {
    open: Option<OpenThread>,
    messages: Vec<ThreadMessage>,
}

impl MessageThreadStore {
    pub fn open(&mut self, conversation_id: Option<ConversationId>, partner: UserRef) {
        self.open = Some(OpenThread {
            conversation_id,
            partner,
        });
        self.messages.clear();
    }

    pub fn open_thread(&self) -> Option<&OpenThread> {
        self.open.as_ref()
    }

    pub fn is_open(&self, conversation_id: &ConversationId) -> bool {
        self.open
            .as_ref()
            .and_then(|open| open.conversation_id.as_ref())
            == Some(conversation_id)
    }

    pub fn messages(&self) -> &[ThreadMessage] {
        &self.messages
    }

    /// Wholesale replace from a `GET /messages/{conversationId}` response.
    pub fn set_history(&mut self, history: Vec<MessagePayload>) {
        self.messages = history
            .into_iter()
            .map(|message| ThreadMessage {
                id: Some(message.id),
                conversation_id: Some(message.conversation_id),
                sender_id: message.sender_id,
                text: message.text,
                created_at: message.created_at,
                status: DeliveryStatus::Confirmed,
            })
            .collect();
    }

    /// Tail-appends a just-sent message before the server has confirmed it.
    pub fn append_optimistic(&mut self, sender_id: UserId, text: &str, now: DateTime<Utc>) {
        let conversation_id = self
            .open
            .as_ref()
            .and_then(|open| open.conversation_id.clone());
        self.messages.push(ThreadMessage {
            id: None,
            conversation_id,
            sender_id,
            text: text.to_string(),
            created_at: now,
            status: DeliveryStatus::Pending,
        });
    }

    /// Settles the oldest pending message after a successful send.
    pub fn confirm_pending(&mut self, id: MessageId, conversation_id: ConversationId) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|message| message.status == DeliveryStatus::Pending)
        {
            Some(message) => {
                message.id = Some(id);
                message.conversation_id = Some(conversation_id);
                message.status = DeliveryStatus::Confirmed;
                true
            }
            None => false,
        }
    }

    /// Settles the oldest pending message after a failed send.
    pub fn fail_pending(&mut self) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|message| message.status == DeliveryStatus::Pending)
        {
            Some(message) => {
                message.status = DeliveryStatus::Failed;
                true
            }
            None => false,
        }
    }

    /// Tail-appends an inbound realtime message, but only when it belongs to
    /// the open thread: the conversation id must match and the sender must be
    /// the open thread's partner. Returns whether it was appended.
    pub fn append_inbound(&mut self, event: &MessageEvent, now: DateTime<Utc>) -> bool {
        let Some(open) = &self.open else {
            return false;
        };
        if open.conversation_id.as_ref() != Some(&event.conversation_id)
            || open.partner.id != event.sender_id
        {
            return false;
        }
        self.messages.push(ThreadMessage {
            id: None,
            conversation_id: Some(event.conversation_id.clone()),
            sender_id: event.sender_id.clone(),
            text: event.message.clone(),
            created_at: now,
            status: DeliveryStatus::Confirmed,
        });
        true
    }

    /// Called when the open provisional thread learns its server id; later
    /// inbound events for that id then pass the `append_inbound` guard.
    pub fn adopt_conversation_id(&mut self, id: &ConversationId) {
        let Some(open) = &mut self.open else {
            return;
        };
        if open.conversation_id.is_none() {
            open.conversation_id = Some(id.clone());
        }
        for message in &mut self.messages {
            if message.conversation_id.is_none() {
                message.conversation_id = Some(id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn partner(id: &str) -> UserRef {
        UserRef::stub(UserId::from(id))
    }

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, second).unwrap()
    }

    fn inbound(conversation: &str, sender: &str, text: &str) -> MessageEvent {
        MessageEvent {
            message: text.to_string(),
            sender_id: UserId::from(sender),
            receiver_id: UserId::from("u1"),
            conversation_id: ConversationId::from(conversation),
        }
    }

    #[test]
    fn appends_preserve_call_order() {
        let mut store = MessageThreadStore::default();
        store.open(Some(ConversationId::from("c1")), partner("u2"));

        store.append_optimistic(UserId::from("u1"), "one", at(1));
        assert!(store.append_inbound(&inbound("c1", "u2", "two"), at(2)));
        store.append_optimistic(UserId::from("u1"), "three", at(3));

        let texts: Vec<_> = store.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn inbound_for_other_conversation_is_rejected() {
        let mut store = MessageThreadStore::default();
        store.open(Some(ConversationId::from("c1")), partner("u2"));

        assert!(!store.append_inbound(&inbound("c2", "u3", "leak"), at(1)));
        assert!(store.messages().is_empty());
    }

    #[test]
    fn inbound_from_non_partner_is_rejected_even_on_matching_id() {
        let mut store = MessageThreadStore::default();
        store.open(Some(ConversationId::from("c1")), partner("u2"));

        assert!(!store.append_inbound(&inbound("c1", "u3", "spoof"), at(1)));
        assert!(store.messages().is_empty());
    }

    #[test]
    fn provisional_thread_rejects_inbound_until_id_is_adopted() {
        let mut store = MessageThreadStore::default();
        store.open(None, partner("u2"));

        assert!(!store.append_inbound(&inbound("c1", "u2", "early"), at(1)));

        store.adopt_conversation_id(&ConversationId::from("c1"));
        assert!(store.append_inbound(&inbound("c1", "u2", "now"), at(2)));
    }

    #[test]
    fn confirm_settles_oldest_pending_first() {
        let mut store = MessageThreadStore::default();
        store.open(None, partner("u2"));
        store.append_optimistic(UserId::from("u1"), "first", at(1));
        store.append_optimistic(UserId::from("u1"), "second", at(2));

        assert!(store.confirm_pending(MessageId::from("m1"), ConversationId::from("c1")));

        assert_eq!(store.messages()[0].status, DeliveryStatus::Confirmed);
        assert_eq!(store.messages()[0].id, Some(MessageId::from("m1")));
        assert_eq!(store.messages()[1].status, DeliveryStatus::Pending);
    }

    #[test]
    fn failed_send_tags_message_instead_of_dropping_it() {
        let mut store = MessageThreadStore::default();
        store.open(None, partner("u2"));
        store.append_optimistic(UserId::from("u1"), "doomed", at(1));

        assert!(store.fail_pending());
        assert_eq!(store.messages()[0].status, DeliveryStatus::Failed);
        assert!(!store.fail_pending());
    }

    #[test]
    fn adopt_backfills_message_conversation_ids() {
        let mut store = MessageThreadStore::default();
        store.open(None, partner("u2"));
        store.append_optimistic(UserId::from("u1"), "hi", at(1));

        store.adopt_conversation_id(&ConversationId::from("c100"));

        assert_eq!(
            store.open_thread().and_then(|o| o.conversation_id.clone()),
            Some(ConversationId::from("c100"))
        );
        assert_eq!(
            store.messages()[0].conversation_id,
            Some(ConversationId::from("c100"))
        );
    }

    #[test]
    fn switching_threads_clears_messages() {
        let mut store = MessageThreadStore::default();
        store.open(Some(ConversationId::from("c1")), partner("u2"));
        store.append_optimistic(UserId::from("u1"), "old", at(1));

        store.open(Some(ConversationId::from("c2")), partner("u3"));

        assert!(store.messages().is_empty());
        assert!(store.is_open(&ConversationId::from("c2")));
    }
}
