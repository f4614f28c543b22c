//! Sync Client - connection task around the agent
//!
//! One tokio task owns the socket, the agent and the reconnect timer. The
//! host talks to it through a command channel and reads the merged view from
//! a `watch` channel. Connection attempts run inside the same `select!`, so
//! commands such as going offline are handled while a handshake is pending.

use crate::{
    agent::{GameView, SyncAgent},
    backoff::{ReconnectDecision, ReconnectPolicy},
    error::ClientError,
    now_ms, SyncClientConfig,
};
use crash_protocol::{ClientMessage, ProtocolError, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::{future::Future, pin::Pin, time::Duration};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
    MaybeTlsStream, WebSocketStream,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection attempt in flight
type Connecting = Pin<Box<dyn Future<Output = Result<WsStream, ClientError>> + Send>>;

enum Command {
    PlaceBet { amount: f64, cashout_at: Option<f64> },
    Cashout,
    CancelBet,
    ClearBetHistory,
    SetOnline(bool),
    Shutdown,
}

/// Handle to a running sync client
pub struct SyncClient {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<GameView>,
    task: JoinHandle<()>,
    max_attempts: u32,
}

impl SyncClient {
    /// Start the connection task on the current runtime
    pub fn spawn(config: SyncClientConfig) -> Self {
        let (commands, rx) = mpsc::channel(config.command_queue.max(1));
        let (view_tx, view) = watch::channel(GameView::default());
        let max_attempts = config.backoff.max_attempts;

        let connection = Connection {
            agent: SyncAgent::new(&config),
            policy: ReconnectPolicy::new(config.backoff),
            config,
            socket: None,
            connecting: None,
            retry_at: None,
            pending: None,
            awaiting_sync: false,
            view: view_tx,
        };

        Self {
            commands,
            view,
            task: tokio::spawn(connection.run(rx)),
            max_attempts,
        }
    }

    pub async fn place_bet(&self, amount: f64, cashout_at: Option<f64>) -> Result<(), ClientError> {
        self.send(Command::PlaceBet { amount, cashout_at }).await
    }

    pub async fn cashout(&self) -> Result<(), ClientError> {
        self.send(Command::Cashout).await
    }

    pub async fn cancel_bet(&self) -> Result<(), ClientError> {
        self.send(Command::CancelBet).await
    }

    /// Forget the personal bet history
    pub async fn clear_bet_history(&self) -> Result<(), ClientError> {
        self.send(Command::ClearBetHistory).await
    }

    /// Host connectivity signal
    pub async fn set_online(&self, online: bool) -> Result<(), ClientError> {
        self.send(Command::SetOnline(online)).await
    }

    /// Latest merged view
    pub fn view(&self) -> GameView {
        self.view.borrow().clone()
    }

    /// Receiver that is notified on every view change
    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `ready`. Fails once reconnecting gives
    /// up or the client stops.
    pub async fn wait_for<F>(&self, ready: F) -> Result<GameView, ClientError>
    where
        F: Fn(&GameView) -> bool,
    {
        let mut rx = self.view.clone();
        loop {
            {
                let view = rx.borrow_and_update();
                if ready(&view) {
                    return Ok(view.clone());
                }
                if view.reconnect_exhausted {
                    return Err(ClientError::ReconnectExhausted(self.max_attempts));
                }
            }
            rx.changed().await.map_err(|_| ClientError::Stopped)?;
        }
    }

    /// Close the socket, cancel any pending reconnect and wait for the task
    pub async fn shutdown(self) -> Result<(), ClientError> {
        self.send(Command::Shutdown).await?;
        self.task.await.map_err(|_| ClientError::Stopped)
    }

    async fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Stopped)
    }
}

struct Connection {
    agent: SyncAgent,
    policy: ReconnectPolicy,
    config: SyncClientConfig,
    socket: Option<WsStream>,
    connecting: Option<Connecting>,
    retry_at: Option<Instant>,
    /// Most recent intent that could not be sent
    pending: Option<ClientMessage>,
    /// Connected, `sync` frame not seen yet
    awaiting_sync: bool,
    view: watch::Sender<GameView>,
}

impl Connection {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.connect();
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command).await,
                },

                frame = next_frame(&mut self.socket) => self.handle_frame(frame).await,

                opened = finish_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect(opened);
                }

                _ = wait_until(self.retry_at) => {
                    self.retry_at = None;
                    self.connect();
                }
            }
            self.publish();
        }

        // Teardown
        self.retry_at = None;
        self.connecting = None;
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        self.agent.set_connected(false);
        self.publish();
        tracing::info!("Sync client for {} stopped", self.agent.user_id());
    }

    /// Start a connection attempt unless one is open or in flight
    fn connect(&mut self) {
        if self.socket.is_some() || self.connecting.is_some() {
            return;
        }
        tracing::debug!("Connecting to {}", self.config.url);
        self.connecting = Some(Box::pin(open(
            self.config.url.clone(),
            self.config.connect_timeout,
        )));
    }

    fn on_connect(&mut self, opened: Result<WsStream, ClientError>) {
        match opened {
            Ok(socket) => {
                tracing::info!("Connected to {}", self.config.url);
                self.socket = Some(socket);
                self.retry_at = None;
                self.awaiting_sync = true;
                self.policy.on_open();
                self.agent.set_connected(true);
            }
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", self.config.url, e);
                self.connection_lost(false);
            }
        }
    }

    fn connection_lost(&mut self, clean: bool) {
        self.socket = None;
        self.awaiting_sync = false;
        self.agent.set_connected(false);

        match self.policy.on_close(clean) {
            ReconnectDecision::Schedule(delay) => {
                tracing::info!(
                    "Reconnecting in {}ms (attempt {})",
                    delay.as_millis(),
                    self.policy.attempts()
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            ReconnectDecision::Exhausted => {
                let e = ClientError::ReconnectExhausted(self.policy.attempts());
                tracing::warn!("{}; waiting for an online signal", e);
                self.retry_at = None;
                self.agent.set_reconnect_exhausted(true);
            }
            ReconnectDecision::Idle => {
                self.retry_at = None;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let now = now_ms();
        let intent = match command {
            Command::PlaceBet { amount, cashout_at } => self.agent.place_bet(amount, cashout_at, now),
            Command::Cashout => self.agent.cashout(now),
            Command::CancelBet => self.agent.cancel_bet(now),
            Command::ClearBetHistory => {
                self.agent.clear_bet_history();
                return;
            }
            Command::SetOnline(online) => {
                if self.policy.set_online(online) {
                    tracing::info!("Host online");
                    self.agent.set_reconnect_exhausted(false);
                    self.retry_at = None;
                    self.connect();
                } else {
                    tracing::info!("Host offline, reconnect cancelled");
                    self.retry_at = None;
                    self.connecting = None;
                }
                return;
            }
            Command::Shutdown => return,
        };

        if let Some(intent) = intent {
            self.dispatch(intent).await;
        }
    }

    /// Send an intent, or park it and reconnect right away
    async fn dispatch(&mut self, intent: ClientMessage) {
        let Some(socket) = self.socket.as_mut() else {
            tracing::debug!("Not connected, holding intent for {}", intent.user_id());
            self.pending = Some(intent);
            if self.policy.is_online() {
                self.retry_at = None;
                self.connect();
            }
            return;
        };

        let text = match intent.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode intent: {}", e);
                return;
            }
        };

        if let Err(e) = socket.send(Message::Text(text)).await {
            tracing::warn!("Send failed: {}", e);
            self.pending = Some(intent);
            self.connection_lost(false);
        }
    }

    async fn handle_frame(&mut self, frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => match ServerMessage::decode(&text) {
                Ok(message) => {
                    let is_sync = matches!(message, ServerMessage::Sync(_));
                    self.agent.handle_message(message, now_ms());
                    if is_sync && self.awaiting_sync {
                        self.awaiting_sync = false;
                        self.flush_pending().await;
                    }
                }
                Err(ProtocolError::UnknownType(tag)) => {
                    tracing::debug!("Ignoring unknown message type {}", tag);
                }
                Err(e) => {
                    tracing::debug!("Ignoring malformed frame: {}", e);
                }
            },
            Some(Ok(Message::Close(frame))) => {
                let clean = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                tracing::info!("Server closed connection (clean: {})", clean);
                self.connection_lost(clean);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!("WebSocket error: {}", e);
                self.connection_lost(false);
            }
            None => {
                tracing::warn!("Connection dropped");
                self.connection_lost(false);
            }
        }
    }

    async fn flush_pending(&mut self) {
        let Some(intent) = self.pending.take() else {
            return;
        };
        if let Some(intent) = self.agent.replay(intent, now_ms()) {
            self.dispatch(intent).await;
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.agent.view());
    }
}

async fn open(url: String, connect_timeout: Duration) -> Result<WsStream, ClientError> {
    let attempt = connect_async(url.as_str());
    let (socket, _) = tokio::time::timeout(connect_timeout, attempt)
        .await
        .map_err(|_| ClientError::ConnectTimeout)??;
    Ok(socket)
}

async fn finish_connect(connecting: &mut Option<Connecting>) -> Result<WsStream, ClientError> {
    match connecting {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    socket: &mut Option<WsStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
