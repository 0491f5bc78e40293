use chrono::{DateTime, Utc};
use shared::{
    domain::{ConversationId, UserId, UserRef},
    protocol::{ConversationEvent, ConversationSummary, MessageEvent},
};

/// Client-side placeholder for a conversation that has no server-assigned id
/// yet. Exists only on the initiating client, between "user opened a thread
/// with a new partner" and "first send round-trip returned an id".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisional {
    pub partner: UserRef,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Established {
    pub id: ConversationId,
    pub partner: UserRef,
    pub last_message_text: String,
    pub is_read: bool,
    pub last_receiver: UserId,
    pub updated_at: DateTime<Utc>,
}

/// A conversation is either provisional (no id) or established. Identity
/// during the provisional window is the participant pair, afterwards the
/// server id; `resolve_provisional` is the only transition between the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversation {
    Provisional(Provisional),
    Established(Established),
}

impl Conversation {
    pub fn id(&self) -> Option<&ConversationId> {
        match self {
            Conversation::Provisional(_) => None,
            Conversation::Established(c) => Some(&c.id),
        }
    }

    pub fn partner(&self) -> &UserRef {
        match self {
            Conversation::Provisional(c) => &c.partner,
            Conversation::Established(c) => &c.partner,
        }
    }

    pub fn last_message_text(&self) -> &str {
        match self {
            Conversation::Provisional(_) => "",
            Conversation::Established(c) => &c.last_message_text,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Conversation::Provisional(c) => c.opened_at,
            Conversation::Established(c) => c.updated_at,
        }
    }

    /// Whether the unread badge applies to `user_id`: the latest message must
    /// be unread and addressed to them. A provisional conversation has no
    /// messages and is never unread.
    pub fn is_unread_for(&self, user_id: &UserId) -> bool {
        match self {
            Conversation::Provisional(_) => false,
            Conversation::Established(c) => !c.is_read && c.last_receiver == *user_id,
        }
    }
}

/// Ordered conversation list for the local user, most recent activity first.
/// Single-writer: the owning client serializes all mutations behind its own
/// lock, so the store itself is plain data.
#[derive(Debug, Default)]
pub struct ConversationStore {
    entries: Vec<Conversation>,
}

impl ConversationStore {
    pub fn list(&self) -> &[Conversation] {
        &self.entries
    }

    pub fn find_by_id(&self, id: &ConversationId) -> Option<&Established> {
        self.entries.iter().find_map(|entry| match entry {
            Conversation::Established(c) if c.id == *id => Some(c),
            _ => None,
        })
    }

    /// Merges an authoritative `GET /conversations` response into the list.
    ///
    /// Merge, not wholesale replace: entries the server response does not
    /// know about yet (provisionals, conversations materialized from realtime
    /// events moments ago) survive. For entries present on both sides the
    /// server row supplies the partner identity, and whichever side carries
    /// the newer `updated_at` supplies the denormalized message fields.
    pub fn bootstrap(&mut self, summaries: Vec<ConversationSummary>, local_user: &UserId) {
        let mut merged: Vec<Conversation> = summaries
            .into_iter()
            .map(|summary| {
                let partner = if summary.participant_a.id == *local_user {
                    summary.participant_b
                } else {
                    summary.participant_a
                };
                Conversation::Established(Established {
                    id: summary.id,
                    partner,
                    last_message_text: summary.last_message_text,
                    is_read: summary.is_read,
                    last_receiver: summary.last_receiver,
                    updated_at: summary.updated_at,
                })
            })
            .collect();

        for entry in self.entries.drain(..) {
            match &entry {
                Conversation::Established(local) => {
                    let server_row = merged.iter_mut().find_map(|candidate| match candidate {
                        Conversation::Established(c) if c.id == local.id => Some(c),
                        _ => None,
                    });
                    match server_row {
                        Some(row) => {
                            if local.updated_at > row.updated_at {
                                row.last_message_text = local.last_message_text.clone();
                                row.is_read = local.is_read;
                                row.last_receiver = local.last_receiver.clone();
                                row.updated_at = local.updated_at;
                            }
                        }
                        None => merged.push(entry),
                    }
                }
                Conversation::Provisional(local) => {
                    let pair_known = merged
                        .iter()
                        .any(|candidate| candidate.partner().id == local.partner.id);
                    if !pair_known {
                        merged.push(entry);
                    }
                }
            }
        }

        merged.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        self.entries = merged;
    }

    /// Inserts a provisional entry at the head for a partner the local user
    /// is about to message. No-op when any conversation with that partner
    /// already exists: at most one conversation per participant pair.
    pub fn add_provisional(&mut self, partner: UserRef, now: DateTime<Utc>) -> bool {
        if self
            .entries
            .iter()
            .any(|entry| entry.partner().id == partner.id)
        {
            return false;
        }
        self.entries.insert(
            0,
            Conversation::Provisional(Provisional {
                partner,
                opened_at: now,
            }),
        );
        true
    }

    /// The provisional-to-established transition: the first send round-trip
    /// returned `id`, so the placeholder matched by participant pair becomes
    /// the server-identified conversation, in place, at the head.
    ///
    /// Any entry that raced in under the same id (e.g. the partner's
    /// `receive_conversation` echo) is collapsed so exactly one entry per
    /// pair remains.
    pub fn resolve_provisional(
        &mut self,
        partner_id: &UserId,
        id: ConversationId,
        last_message_text: &str,
        now: DateTime<Utc>,
    ) {
        let raced_partner = match self
            .entries
            .iter()
            .position(|entry| entry.id() == Some(&id))
        {
            Some(pos) => Some(self.entries.remove(pos).partner().clone()),
            None => None,
        };

        let partner = match self
            .entries
            .iter()
            .position(|entry| matches!(entry, Conversation::Provisional(_)) && entry.partner().id == *partner_id)
        {
            Some(pos) => self.entries.remove(pos).partner().clone(),
            None => raced_partner.unwrap_or_else(|| UserRef::stub(partner_id.clone())),
        };

        self.entries.insert(
            0,
            Conversation::Established(Established {
                id,
                partner,
                last_message_text: last_message_text.to_string(),
                is_read: false,
                last_receiver: partner_id.clone(),
                updated_at: now,
            }),
        );
    }

    /// Applies an outbound message sent on an already-established
    /// conversation: the partner becomes the recipient of the latest message
    /// and the entry moves to the head.
    pub fn record_outbound(
        &mut self,
        id: &ConversationId,
        text: &str,
        partner_id: &UserId,
        now: DateTime<Utc>,
    ) {
        let Some(pos) = self.entries.iter().position(|entry| entry.id() == Some(id)) else {
            return;
        };
        if let Conversation::Established(c) = &mut self.entries[pos] {
            c.last_message_text = text.to_string();
            c.is_read = false;
            c.last_receiver = partner_id.clone();
            c.updated_at = now;
        }
        self.move_to_head(pos);
    }

    /// Upsert for an inbound `receive_message` event, keyed by conversation
    /// id. When no entry exists the message alone materializes one: a
    /// provisional with the sender as partner resolves in place, otherwise a
    /// stub-partner entry is created so a dropped `receive_conversation`
    /// cannot leave the conversation invisible until the next bootstrap.
    pub fn apply_inbound_message(&mut self, event: &MessageEvent, now: DateTime<Utc>) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|entry| entry.id() == Some(&event.conversation_id))
        {
            if let Conversation::Established(c) = &mut self.entries[pos] {
                c.last_message_text = event.message.clone();
                c.is_read = false;
                c.last_receiver = event.receiver_id.clone();
                c.updated_at = now;
            }
            self.move_to_head(pos);
            return;
        }

        let partner = match self.entries.iter().position(|entry| {
            matches!(entry, Conversation::Provisional(_)) && entry.partner().id == event.sender_id
        }) {
            Some(pos) => self.entries.remove(pos).partner().clone(),
            None => UserRef::stub(event.sender_id.clone()),
        };

        self.entries.insert(
            0,
            Conversation::Established(Established {
                id: event.conversation_id.clone(),
                partner,
                last_message_text: event.message.clone(),
                is_read: false,
                last_receiver: event.receiver_id.clone(),
                updated_at: now,
            }),
        );
    }

    /// Applies an inbound `receive_conversation` event on the receiving
    /// side: a new head entry, unread, with the sender as partner. Upserts by
    /// id when the entry already exists (the realtime event reflects the most
    /// recent activity and wins).
    pub fn apply_conversation_event(&mut self, event: &ConversationEvent, now: DateTime<Utc>) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|entry| entry.id() == Some(&event.conversation_id))
        {
            if let Conversation::Established(c) = &mut self.entries[pos] {
                c.partner = event.sender_ref();
                c.last_message_text = event.last_message.clone();
                c.is_read = event.is_read;
                c.last_receiver = event.receiver.clone();
                c.updated_at = now;
            }
            self.move_to_head(pos);
            return;
        }

        let partner = match self.entries.iter().position(|entry| {
            matches!(entry, Conversation::Provisional(_)) && entry.partner().id == event.sender
        }) {
            Some(pos) => {
                self.entries.remove(pos);
                event.sender_ref()
            }
            None => event.sender_ref(),
        };

        self.entries.insert(
            0,
            Conversation::Established(Established {
                id: event.conversation_id.clone(),
                partner,
                last_message_text: event.last_message.clone(),
                is_read: event.is_read,
                last_receiver: event.receiver.clone(),
                updated_at: now,
            }),
        );
    }

    /// Marks the latest message of a conversation as read. Idempotent; no-op
    /// when the id is unknown or the entry is still provisional.
    pub fn mark_read(&mut self, id: &ConversationId) -> bool {
        for entry in &mut self.entries {
            if let Conversation::Established(c) = entry {
                if c.id == *id {
                    let changed = !c.is_read;
                    c.is_read = true;
                    return changed;
                }
            }
        }
        false
    }

    fn move_to_head(&mut self, pos: usize) {
        if pos > 0 {
            let entry = self.entries.remove(pos);
            self.entries.insert(0, entry);
        }
    }
}
