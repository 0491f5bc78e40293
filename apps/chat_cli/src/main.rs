use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{
    AnonymousSession, ClientEvent, MessagingClient, SessionProvider, StaticSessionProvider,
};
use shared::domain::{UserId, UserRef};
use tracing::{info, warn};

mod config;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    auth_token: Option<String>,
    /// Partner user id to open a thread with
    #[arg(long)]
    to: Option<String>,
    /// Message text to send into the opened thread
    #[arg(long)]
    message: Option<String>,
    /// Stay connected and print live updates until ctrl-c
    #[arg(long)]
    listen: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(v) = args.server_url {
        settings.server_url = v;
    }
    if let Some(v) = args.user_id {
        settings.user_id = v;
    }
    if let Some(v) = args.auth_token {
        settings.auth_token = Some(v);
    }

    let local_user = UserRef {
        id: UserId::new(settings.user_id.clone()),
        display_name: settings.display_name.clone(),
        avatar_url: settings.avatar_url.clone(),
        handle: settings.handle.clone(),
    };
    let session: Arc<dyn SessionProvider> = match settings.auth_token.clone() {
        Some(token) => Arc::new(StaticSessionProvider::new(token)),
        None => Arc::new(AnonymousSession),
    };

    let client = MessagingClient::new(settings.server_url.clone(), local_user, session);
    let mut events = client.subscribe_events();
    client.connect().await?;
    client.bootstrap().await?;
    info!(server_url = %settings.server_url, user_id = %client.local_user().id, "connected");

    let conversations = client.conversations().await;
    println!("{} conversation(s):", conversations.len());
    for conversation in &conversations {
        let marker = if conversation.is_unread_for(&client.local_user().id) {
            "*"
        } else {
            " "
        };
        match conversation.id() {
            Some(id) => println!(
                "{marker} [{id}] {}: {}",
                conversation.partner().display_name,
                conversation.last_message_text()
            ),
            None => println!("{marker} [new] {}", conversation.partner().display_name),
        }
    }

    if let Some(to) = args.to {
        let partner_id = UserId::new(to);
        let (conversation_id, partner) = conversations
            .iter()
            .find(|c| c.partner().id == partner_id)
            .map(|c| (c.id().cloned(), c.partner().clone()))
            .unwrap_or_else(|| (None, UserRef::stub(partner_id.clone())));
        client.open_thread(conversation_id, partner).await?;

        if let Some(text) = args.message {
            client.send_message(&text).await?;
            println!("sent to {partner_id}");
        }
        for message in client.thread_messages().await {
            println!("  {}: {} ({:?})", message.sender_id, message.text, message.status);
        }
    }

    if args.listen {
        println!("listening for updates, press ctrl-c to quit");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(ClientEvent::ConversationsUpdated) => {
                        let unread = client.unread_count().await;
                        println!("conversations updated ({unread} unread)");
                    }
                    Ok(ClientEvent::ThreadUpdated) => {
                        if let Some(last) = client.thread_messages().await.last() {
                            println!("thread updated, latest: {}: {}", last.sender_id, last.text);
                        }
                    }
                    Ok(ClientEvent::Error(message)) => warn!("realtime error: {message}"),
                    Err(_) => break,
                },
            }
        }
    }

    Ok(())
}
