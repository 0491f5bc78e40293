use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::UserId,
    protocol::{ClientFrame, ServerFrame},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

const RECONNECT_DELAY: Duration = Duration::from_millis(750);

/// Handle to the persistent realtime connection. One background task owns the
/// socket; the handle only queues outbound frames and tears the task down.
///
/// Delivery is at-most-once: frames submitted while the socket is down are
/// dropped, and the server buffers nothing for a disconnected client. The
/// task reconnects on its own and re-joins the per-user room after every
/// successful connect, so callers never observe connection loss directly.
pub struct RealtimeChannel {
    outbound: mpsc::UnboundedSender<ClientFrame>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    /// Connects to the event hub derived from the REST base url and forwards
    /// every inbound frame into `inbound`. The returned handle is cheap; the
    /// connection itself is established asynchronously by the task.
    pub fn connect(
        server_url: &str,
        user_id: UserId,
        inbound: mpsc::UnboundedSender<ServerFrame>,
    ) -> Result<Self> {
        let ws_url = websocket_url(server_url)?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_channel(ws_url, user_id, outbound_rx, inbound));
        Ok(Self {
            outbound: outbound_tx,
            task,
        })
    }

    /// Fire-and-forget push. Delivery confirmation, if any, arrives as a
    /// separate inbound frame.
    pub fn send(&self, frame: ClientFrame) {
        if self.outbound.send(frame).is_err() {
            warn!("realtime: channel task stopped; outbound frame dropped");
        }
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn websocket_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(anyhow!("server url must be http(s), got {other}://")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("failed to derive websocket scheme for {server_url}"))?;
    url.set_path("/ws");
    Ok(url)
}

async fn run_channel(
    ws_url: Url,
    user_id: UserId,
    mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
    inbound: mpsc::UnboundedSender<ServerFrame>,
) {
    loop {
        let ws_stream = match connect_async(ws_url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(err) => {
                warn!("realtime: connect to {ws_url} failed: {err}");
                discard_queued_frames(&mut outbound);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        let (mut writer, mut reader) = ws_stream.split();

        // the room join must be repeated on every (re)connect
        let join = match serde_json::to_string(&ClientFrame::JoinRoom(user_id.clone())) {
            Ok(text) => text,
            Err(err) => {
                warn!("realtime: failed to encode join frame: {err}");
                return;
            }
        };
        if let Err(err) = writer.send(Message::Text(join)).await {
            warn!("realtime: join failed: {err}");
            tokio::time::sleep(RECONNECT_DELAY).await;
            continue;
        }
        info!(user_id = %user_id, "realtime: joined room");

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        // handle dropped; shut the task down
                        return;
                    };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!("realtime: failed to encode outbound frame: {err}");
                            continue;
                        }
                    };
                    if let Err(err) = writer.send(Message::Text(text)).await {
                        warn!("realtime: send failed: {err}");
                        break;
                    }
                }
                message = reader.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerFrame>(&text) {
                                Ok(frame) => {
                                    if inbound.send(frame).is_err() {
                                        // consumer loop gone; nothing left to do
                                        return;
                                    }
                                }
                                Err(err) => warn!("realtime: invalid server frame: {err}"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!("realtime: receive failed: {err}");
                            break;
                        }
                    }
                }
            }
        }

        warn!("realtime: connection lost; reconnecting");
        discard_queued_frames(&mut outbound);
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// At-most-once: anything queued while the socket is down is lost, the same
/// as if it had been written to a dead connection.
fn discard_queued_frames(outbound: &mut mpsc::UnboundedReceiver<ClientFrame>) {
    while let Ok(frame) = outbound.try_recv() {
        warn!("realtime: disconnected; dropping outbound frame {frame:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_maps_scheme_and_path() {
        let url = websocket_url("http://127.0.0.1:8080").expect("url");
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/ws");

        let url = websocket_url("https://chat.example.com").expect("url");
        assert_eq!(url.as_str(), "wss://chat.example.com/ws");
    }

    #[test]
    fn websocket_url_rejects_non_http_schemes() {
        assert!(websocket_url("ftp://example.com").is_err());
        assert!(websocket_url("not a url").is_err());
    }
}
