//! WebSocket Server
//!
//! One task per connection. The writer half drains the session queue filled
//! by the hub; the reader half decodes intents and hands them to the engine.

use crate::{
    error::ServerError,
    sessions::{SessionHub, SessionId},
};
use crash_protocol::ClientMessage;
use futures::{stream::SplitStream, SinkExt, StreamExt};
use round_engine::{PlayerIntent, RoundHandle};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

/// WebSocket Server
pub struct WebSocketServer {
    handle: RoundHandle,
    hub: Arc<SessionHub>,
}

impl WebSocketServer {
    pub fn new(handle: RoundHandle, hub: Arc<SessionHub>) -> Self {
        Self { handle, hub }
    }

    /// Bind and run the WebSocket server
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!("WebSocket server listening on {}", addr);

        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let handle = self.handle.clone();
                    let hub = self.hub.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, handle, hub).await {
                            tracing::warn!("WebSocket connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handle: RoundHandle,
    hub: Arc<SessionHub>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await.map_err(ServerError::Handshake)?;
    let (mut ws_sender, ws_receiver) = ws_stream.split();

    let (session_id, tx, mut rx) = hub.open_session();

    // Forward queued frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        // The hub let go of the session: close so the client resyncs
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let attach_hub = hub.clone();
    let attached = handle
        .attach(move |state| attach_hub.register(session_id, tx, state))
        .await;

    let result = match attached {
        Ok(()) => {
            tracing::info!("Session {} connected from {}", session_id, peer_addr);
            read_intents(session_id, ws_receiver, &handle).await
        }
        Err(e) => Err(e.into()),
    };

    // Cleanup
    send_task.abort();
    hub.remove(session_id);
    tracing::info!("Session {} disconnected", session_id);

    result
}

async fn read_intents(
    session_id: SessionId,
    mut ws_receiver: SplitStream<WebSocketStream<TcpStream>>,
    handle: &RoundHandle,
) -> Result<(), ServerError> {
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match ClientMessage::decode(&text) {
                Ok(message) => {
                    tracing::debug!(
                        "Session {}: {} intent from {}",
                        session_id,
                        message_kind(&message),
                        message.user_id()
                    );
                    handle.submit(PlayerIntent::from(message)).await?;
                }
                Err(e) => {
                    tracing::debug!("Dropping malformed frame from session {}: {}", session_id, e);
                }
            },
            Ok(Message::Binary(data)) => {
                tracing::debug!(
                    "Dropping {} byte binary frame from session {}",
                    data.len(),
                    session_id
                );
            }
            // tungstenite queues the pong and flushes it on the next read
            Ok(Message::Ping(_)) => {
                tracing::trace!("Ping from session {}", session_id);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("WebSocket error on session {}: {}", session_id, e);
                break;
            }
        }
    }

    Ok(())
}

fn message_kind(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Bet(req) if req.value == 0.0 => "cancel",
        ClientMessage::Bet(_) => "bet",
        ClientMessage::Cashout(_) => "cashout",
        ClientMessage::Cancel(_) => "cancel",
    }
}
