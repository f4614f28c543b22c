//! Sync client tests against live sockets
//!
//! - Full round trip against the game server
//! - Reconnect after the server drops the socket
//! - Backoff budget exhaustion and recovery on an online signal
//! - Intents issued while disconnected are flushed after the resync
//! - Going offline cancels a scheduled reconnect
//! - Commands are handled while a handshake is still pending

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use crash_protocol::{ClientMessage, GameState, Phase, ServerMessage};
use futures::{SinkExt, StreamExt};
use game_server::{SessionHub, WebSocketServer};
use round_engine::{FixedSampler, RoundConfig, RoundEngine, RoundHandle};
use sync_client::{BackoffConfig, BetStatus, SyncClient, SyncClientConfig};
use tokio::{
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

const WAIT: Duration = Duration::from_secs(10);

async fn within<T>(future: impl Future<Output = T>) -> Result<T> {
    Ok(timeout(WAIT, future).await?)
}

fn client_config(addr: SocketAddr, backoff: BackoffConfig) -> SyncClientConfig {
    SyncClientConfig {
        url: format!("ws://{}", addr),
        user_id: "player-1".to_string(),
        backoff,
        connect_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        initial: Duration::from_millis(20),
        factor: 1.5,
        max: Duration::from_millis(200),
        max_attempts,
    }
}

async fn start_game_server() -> Result<(SocketAddr, RoundHandle)> {
    let hub = Arc::new(SessionHub::new(64, 32));
    let config = RoundConfig {
        betting_window: Duration::from_millis(1_500),
        tick_interval: Duration::from_millis(10),
        cooldown: Duration::from_millis(200),
        ..Default::default()
    };
    let (handle, _engine) =
        RoundEngine::spawn(config, Box::new(FixedSampler::new(vec![1.8])), hub.clone())?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(WebSocketServer::new(handle.clone(), hub).serve(listener));
    Ok((addr, handle))
}

async fn accept_ws(listener: &TcpListener) -> Result<WebSocketStream<TcpStream>> {
    let (stream, _) = within(listener.accept()).await??;
    Ok(accept_async(stream).await?)
}

fn sync_frame(round_id: u64) -> Result<Message> {
    let state = GameState {
        round_id,
        next_game_at: Some(1_700_000_005_000),
        ..Default::default()
    };
    Ok(Message::Text(ServerMessage::Sync(state).encode()?))
}

#[tokio::test]
async fn test_round_trip_against_game_server() -> Result<()> {
    let (addr, handle) = start_game_server().await?;
    let client = SyncClient::spawn(client_config(addr, BackoffConfig::default()));

    within(client.wait_for(|v| v.is_connected && v.round_id == 1)).await??;

    client.place_bet(10.0, None).await?;
    let view = within(client.wait_for(|v| v.bets.iter().any(|b| b.user_id == "player-1"))).await??;
    assert_eq!(view.user_bet.as_ref().map(|b| b.amount), Some(10.0));

    let server = handle.snapshot().await?;
    assert_eq!(server.bet_of("player-1").map(|b| b.amount), Some(10.0));

    within(client.wait_for(|v| v.phase == Phase::Running && v.multiplier >= 1.05)).await??;
    client.cashout().await?;

    let view = within(client.wait_for(|v| {
        v.bets
            .iter()
            .any(|b| b.user_id == "player-1" && b.prize > 0.0)
    }))
    .await??;
    let prize = view.user_bet.as_ref().map(|b| b.prize).unwrap_or_default();
    assert!(prize >= 10.5);
    assert_eq!(view.user_bet_history.len(), 1);
    assert_eq!(view.user_bet_history[0].status, BetStatus::Win);
    assert_eq!(view.user_bet_history[0].prize, prize);

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_drop() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let client = SyncClient::spawn(client_config(addr, fast_backoff(10)));

    let mut first = accept_ws(&listener).await?;
    first.send(sync_frame(1)?).await?;
    within(client.wait_for(|v| v.is_connected && v.round_id == 1)).await??;

    // Drop without a close handshake
    drop(first);
    within(client.wait_for(|v| !v.is_connected)).await??;

    let mut second = accept_ws(&listener).await?;
    second.send(sync_frame(2)?).await?;
    let view = within(client.wait_for(|v| v.is_connected && v.round_id == 2)).await??;
    assert!(!view.reconnect_exhausted);

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_exhausted_until_online() -> Result<()> {
    // Reserve a port with nothing listening on it
    let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
    let client = SyncClient::spawn(client_config(addr, fast_backoff(2)));

    let view = within(client.wait_for(|v| v.reconnect_exhausted)).await??;
    assert!(!view.is_connected);

    let listener = TcpListener::bind(addr).await?;
    client.set_online(true).await?;

    let mut socket = accept_ws(&listener).await?;
    socket.send(sync_frame(4)?).await?;
    let view = within(client.wait_for(|v| v.is_connected && v.round_id == 4)).await??;
    assert!(!view.reconnect_exhausted);

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_intent_while_disconnected_flushed_after_sync() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let client = SyncClient::spawn(client_config(
        addr,
        BackoffConfig {
            initial: Duration::from_secs(5),
            ..fast_backoff(10)
        },
    ));

    let mut first = accept_ws(&listener).await?;
    first.send(sync_frame(1)?).await?;
    within(client.wait_for(|v| v.is_connected && v.phase == Phase::Betting)).await??;
    drop(first);
    within(client.wait_for(|v| !v.is_connected)).await??;

    // Reconnects immediately instead of waiting out the backoff
    client.place_bet(10.0, Some(1.5)).await?;
    let mut second = accept_ws(&listener).await?;
    second.send(sync_frame(1)?).await?;

    let frame = within(second.next())
        .await?
        .ok_or_else(|| anyhow!("socket closed"))??;
    let text = frame.into_text()?;
    assert_eq!(
        ClientMessage::decode(&text)?,
        ClientMessage::bet("player-1", 10.0, Some(1.5))
    );

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_offline_cancels_scheduled_reconnect() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let client = SyncClient::spawn(client_config(
        addr,
        BackoffConfig {
            initial: Duration::from_millis(300),
            ..fast_backoff(10)
        },
    ));

    let mut first = accept_ws(&listener).await?;
    first.send(sync_frame(1)?).await?;
    within(client.wait_for(|v| v.is_connected)).await??;
    drop(first);
    within(client.wait_for(|v| !v.is_connected)).await??;

    client.set_online(false).await?;
    let attempt = timeout(Duration::from_millis(1_000), listener.accept()).await;
    assert!(attempt.is_err(), "reconnected while offline");

    // Back online connects right away
    client.set_online(true).await?;
    let mut second = accept_ws(&listener).await?;
    second.send(sync_frame(2)?).await?;
    within(client.wait_for(|v| v.is_connected && v.round_id == 2)).await??;

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_during_pending_handshake() -> Result<()> {
    // Accepts TCP through the backlog but never answers the handshake
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let client = SyncClient::spawn(SyncClientConfig {
        connect_timeout: Duration::from_secs(30),
        ..client_config(addr, fast_backoff(10))
    });

    client.set_online(false).await?;
    client.clear_bet_history().await?;
    let view = client.view();
    assert!(!view.is_connected);
    assert!(view.user_bet_history.is_empty());

    timeout(Duration::from_secs(2), client.shutdown()).await??;
    drop(listener);
    Ok(())
}
