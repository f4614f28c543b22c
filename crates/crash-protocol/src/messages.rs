//! Wire message types
//!
//! Every frame is a JSON object with a `type` tag. Decoding is done in two
//! steps (tag first, payload second) so unknown tags are rejected explicitly
//! instead of falling through.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Round phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Stakes are accepted
    #[default]
    Betting,
    /// Multiplier is climbing, cashouts are accepted
    Running,
    /// Round is over, waiting for the next betting window
    #[serde(rename = "crash")]
    Crashed,
}

impl Phase {
    /// Wire name of the phase, also used as the update message tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Betting => "betting",
            Phase::Running => "running",
            Phase::Crashed => "crash",
        }
    }

    /// Parse a wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "betting" => Some(Phase::Betting),
            "running" => Some(Phase::Running),
            "crash" => Some(Phase::Crashed),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stake as seen on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetView {
    pub user_id: String,
    pub amount: f64,
    /// Auto-cashout target, 0 for manual cashout only
    #[serde(default)]
    pub cashout_at: f64,
    /// Payout once cashed out, 0 before
    #[serde(default)]
    pub prize: f64,
}

impl BetView {
    pub fn is_cashed_out(&self) -> bool {
        self.prize > 0.0
    }
}

/// Completed round outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub crash_point: f64,
    /// Unix millis
    pub timestamp: i64,
}

/// Full authoritative snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub multiplier: f64,
    /// Unix millis of the next round start, null outside the betting window
    #[serde(default)]
    pub next_game_at: Option<i64>,
    #[serde(default)]
    pub round_id: u64,
    #[serde(default)]
    pub bets: Vec<BetView>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            phase: Phase::Betting,
            multiplier: 1.0,
            next_game_at: None,
            round_id: 0,
            bets: Vec::new(),
            history: Vec::new(),
        }
    }
}

impl GameState {
    /// Find a player's stake in this snapshot
    pub fn bet_of(&self, user_id: &str) -> Option<&BetView> {
        self.bets.iter().find(|bet| bet.user_id == user_id)
    }
}

/// Server → client frames
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Sent once when a session is attached
    Sync(GameState),
    /// Sent on every state change, tagged with the phase
    Update(GameState),
}

#[derive(Serialize)]
struct SyncFrame<'a> {
    r#type: &'static str,
    #[serde(rename = "gameState")]
    game_state: &'a GameState,
}

#[derive(Serialize)]
struct UpdateFrame<'a> {
    r#type: &'static str,
    data: &'a GameState,
}

impl ServerMessage {
    /// Snapshot carried by this frame
    pub fn state(&self) -> &GameState {
        match self {
            ServerMessage::Sync(state) | ServerMessage::Update(state) => state,
        }
    }

    pub fn into_state(self) -> GameState {
        match self {
            ServerMessage::Sync(state) | ServerMessage::Update(state) => state,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            ServerMessage::Sync(state) => Self::encode_sync(state),
            ServerMessage::Update(state) => Self::encode_update(state),
        }
    }

    /// Encode a `sync` frame without taking ownership of the snapshot
    pub fn encode_sync(state: &GameState) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&SyncFrame {
            r#type: "sync",
            game_state: state,
        })?)
    }

    /// Encode a phase-tagged update frame without taking ownership of the snapshot
    pub fn encode_update(state: &GameState) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&UpdateFrame {
            r#type: state.phase.as_str(),
            data: state,
        })?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let (tag, mut frame) = split_envelope(text)?;

        if tag == "sync" {
            let state = take_field(&mut frame, "gameState")?;
            return Ok(ServerMessage::Sync(serde_json::from_value(state)?));
        }

        let phase = Phase::from_tag(&tag).ok_or(ProtocolError::UnknownType(tag))?;
        let state: GameState = serde_json::from_value(take_field(&mut frame, "data")?)?;
        if state.phase != phase {
            return Err(ProtocolError::InvalidPayload("phase does not match message type"));
        }
        Ok(ServerMessage::Update(state))
    }
}

/// `bet` payload. A `value` of 0 cancels the current stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRequest {
    pub user_id: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cashout_at: Option<f64>,
}

/// Payload carrying only the player identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRequest {
    pub user_id: String,
}

/// Client → server intents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClientMessage {
    Bet(BetRequest),
    Cashout(PlayerRequest),
    Cancel(PlayerRequest),
}

impl ClientMessage {
    pub fn bet(user_id: impl Into<String>, value: f64, cashout_at: Option<f64>) -> Self {
        ClientMessage::Bet(BetRequest {
            user_id: user_id.into(),
            value,
            cashout_at,
        })
    }

    pub fn cashout(user_id: impl Into<String>) -> Self {
        ClientMessage::Cashout(PlayerRequest {
            user_id: user_id.into(),
        })
    }

    pub fn cancel(user_id: impl Into<String>) -> Self {
        ClientMessage::Cancel(PlayerRequest {
            user_id: user_id.into(),
        })
    }

    pub fn user_id(&self) -> &str {
        match self {
            ClientMessage::Bet(req) => &req.user_id,
            ClientMessage::Cashout(req) | ClientMessage::Cancel(req) => &req.user_id,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let (tag, mut frame) = split_envelope(text)?;
        let data = take_field(&mut frame, "data")?;

        let message = match tag.as_str() {
            "bet" => ClientMessage::Bet(serde_json::from_value(data)?),
            "cashout" => ClientMessage::Cashout(serde_json::from_value(data)?),
            "cancel" => ClientMessage::Cancel(serde_json::from_value(data)?),
            _ => return Err(ProtocolError::UnknownType(tag)),
        };

        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.user_id().is_empty() {
            return Err(ProtocolError::InvalidPayload("empty userId"));
        }
        if let ClientMessage::Bet(req) = self {
            if !req.value.is_finite() || req.value < 0.0 {
                return Err(ProtocolError::InvalidPayload("value must be a non-negative number"));
            }
            if req.cashout_at.is_some_and(|target| !target.is_finite()) {
                return Err(ProtocolError::InvalidPayload("cashoutAt must be a number"));
            }
        }
        Ok(())
    }
}

fn split_envelope(text: &str) -> Result<(String, Value), ProtocolError> {
    let frame: Value = serde_json::from_str(text)?;
    let tag = frame
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();
    Ok((tag, frame))
}

fn take_field(frame: &mut Value, field: &'static str) -> Result<Value, ProtocolError> {
    frame
        .get_mut(field)
        .map(Value::take)
        .ok_or(ProtocolError::InvalidPayload(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(phase: Phase) -> GameState {
        GameState {
            phase,
            multiplier: 1.37,
            next_game_at: None,
            round_id: 4,
            bets: vec![BetView {
                user_id: "user-1".to_string(),
                amount: 10.0,
                cashout_at: 0.0,
                prize: 0.0,
            }],
            history: vec![HistoryEntry {
                crash_point: 1.2,
                timestamp: 1_700_000_000_000,
            }],
        }
    }

    #[test]
    fn test_update_is_tagged_with_phase() {
        let json = ServerMessage::Update(sample_state(Phase::Crashed))
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "crash");
        assert_eq!(value["data"]["phase"], "crash");
        assert!(value["data"]["nextGameAt"].is_null());
        assert_eq!(value["data"]["bets"][0]["userId"], "user-1");
    }

    #[test]
    fn test_sync_uses_game_state_field() {
        let json = ServerMessage::Sync(sample_state(Phase::Running))
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "sync");
        assert_eq!(value["gameState"]["multiplier"], 1.37);
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_decode_server_frame_from_plain_json() {
        let text = r#"{"type":"betting","data":{"phase":"betting","multiplier":1,
            "nextGameAt":1700000005000,"bets":[{"userId":"a","amount":5}],"history":[]}}"#;

        let message = ServerMessage::decode(text).unwrap();
        let state = message.state();
        assert_eq!(state.phase, Phase::Betting);
        assert_eq!(state.next_game_at, Some(1_700_000_005_000));
        assert_eq!(state.round_id, 0);
        assert_eq!(state.bets[0].prize, 0.0);
        assert_eq!(state.bets[0].cashout_at, 0.0);
    }

    #[test]
    fn test_decode_server_rejects_unknown_and_mismatched_tags() {
        let unknown = r#"{"type":"bet-added","data":{"userId":"a","value":1}}"#;
        assert!(matches!(
            ServerMessage::decode(unknown),
            Err(ProtocolError::UnknownType(tag)) if tag == "bet-added"
        ));

        let mismatched = r#"{"type":"running","data":{"phase":"crash","multiplier":1.5}}"#;
        assert!(matches!(
            ServerMessage::decode(mismatched),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_decode_bet_intent() {
        let text = r#"{"type":"bet","data":{"userId":"user-7","value":10,"cashoutAt":1.5}}"#;
        let message = ClientMessage::decode(text).unwrap();

        assert_eq!(message, ClientMessage::bet("user-7", 10.0, Some(1.5)));
    }

    #[test]
    fn test_bet_encoding_omits_missing_target() {
        let json = ClientMessage::bet("user-7", 0.0, None).encode().unwrap();
        assert_eq!(json, r#"{"type":"bet","data":{"userId":"user-7","value":0.0}}"#);
    }

    #[test]
    fn test_decode_client_rejects_malformed_intents() {
        let cases = [
            ("not json", "json"),
            (r#"{"data":{"userId":"a"}}"#, "type"),
            (r#"{"type":"bet"}"#, "payload"),
            (r#"{"type":"bet","data":{"userId":"","value":1}}"#, "payload"),
            (r#"{"type":"bet","data":{"userId":"a","value":-3}}"#, "payload"),
            (r#"{"type":"cashout","data":{}}"#, "json"),
            (r#"{"type":"withdraw","data":{"userId":"a"}}"#, "type"),
        ];

        for (text, kind) in cases {
            let err = ClientMessage::decode(text).unwrap_err();
            let matched = match kind {
                "json" => matches!(err, ProtocolError::Json(_)),
                "type" => matches!(
                    err,
                    ProtocolError::MissingType | ProtocolError::UnknownType(_)
                ),
                _ => matches!(err, ProtocolError::InvalidPayload(_)),
            };
            assert!(matched, "{text} produced {err:?}");
        }
    }
}
