use std::sync::Arc;

use anyhow::Result;
use reqwest::{Client, RequestBuilder};
use shared::{
    domain::{ConversationId, UserId},
    protocol::{ConversationSummary, SendMessageRequest, SendMessageResponse, ThreadResponse},
};

use crate::session::SessionProvider;

/// Thin client for the durable REST collaborator. Holds no conversation
/// state; every call attaches the injected session credential.
pub struct RestApi {
    http: Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl RestApi {
    pub fn new(base_url: impl Into<String>, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.session.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// `GET /conversations`: authoritative bootstrap list, server-ordered by
    /// descending `updatedAt`.
    pub async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let conversations = self
            .authorized(self.http.get(format!("{}/conversations", self.base_url)))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(conversations)
    }

    /// `GET /messages/{conversationId}`: full history for one thread.
    pub async fn fetch_thread(&self, conversation_id: &ConversationId) -> Result<ThreadResponse> {
        let thread = self
            .authorized(
                self.http
                    .get(format!("{}/messages/{conversation_id}", self.base_url)),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(thread)
    }

    /// `POST /messages/{partnerId}`: persists a message addressed to a
    /// partner; the server resolves or mints the conversation id.
    pub async fn post_message(
        &self,
        partner_id: &UserId,
        text: &str,
    ) -> Result<SendMessageResponse> {
        let response = self
            .authorized(
                self.http
                    .post(format!("{}/messages/{partner_id}", self.base_url)),
            )
            .json(&SendMessageRequest {
                text: text.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    /// `POST /conversations/{conversationId}/read`: idempotent mark-read.
    pub async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        self.authorized(self.http.post(format!(
            "{}/conversations/{conversation_id}/read",
            self.base_url
        )))
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }
}
