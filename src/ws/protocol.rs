//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::color::Color;
use crate::game::map::Tile;
use crate::game::player::{Race, SessionId, Weapon};

/// First frame a client sends, before it is registered
#[derive(Debug, Clone, Deserialize)]
pub struct Handshake {
    pub name: String,
    /// Unknown values fall back to the default race
    #[serde(default, deserialize_with = "lenient_race")]
    pub race: Race,
    /// Unknown values fall back to the default weapon
    #[serde(default, deserialize_with = "lenient_weapon")]
    pub weapon: Weapon,
    #[serde(default)]
    pub color: Option<RequestedColor>,
}

/// A color picked on the client; missing channels read as zero
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RequestedColor {
    #[serde(default)]
    pub r: f64,
    #[serde(default)]
    pub g: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default)]
    pub a: f64,
}

impl From<RequestedColor> for Color {
    fn from(c: RequestedColor) -> Self {
        // Float-to-int `as` saturates, which is the clamp we want
        Color::new(c.r as u8, c.g as u8, c.b as u8, c.a as u8)
    }
}

fn lenient_race<'de, D: serde::Deserializer<'de>>(de: D) -> Result<Race, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(de)?;
    Ok(raw
        .and_then(|v| v.as_str().and_then(Race::parse))
        .unwrap_or_default())
}

fn lenient_weapon<'de, D: serde::Deserializer<'de>>(de: D) -> Result<Weapon, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(de)?;
    Ok(raw
        .and_then(|v| v.as_str().and_then(Weapon::parse))
        .unwrap_or_default())
}

/// Messages sent from client to server after the handshake
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Continuous movement with the client-claimed resulting position
    Move { dx: f64, dy: f64, x: f64, y: f64 },

    /// Idle position resync
    Position { x: f64, y: f64 },

    Chat { text: String },

    TurnAction(TurnAction),
}

impl ClientMsg {
    /// Continuous movement intents, the only rate-limited kind
    pub fn is_movement(&self) -> bool {
        matches!(self, Self::Move { .. } | Self::Position { .. })
    }
}

/// An action submitted by the turn-holder
///
/// Target fields are optional on the wire: a recognised action type with
/// missing targets still consumes the turn.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnAction {
    Move {
        #[serde(rename = "targetX", default)]
        target_x: Option<f64>,
        #[serde(rename = "targetY", default)]
        target_y: Option<f64>,
    },
    Attack {
        #[serde(rename = "targetID", default)]
        target_id: Option<String>,
    },
    Skip,
}

/// Rejection sent before the socket is closed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once after a successful join
    Init {
        id: SessionId,
        x: f64,
        y: f64,
        color: Color,
        race: Race,
    },

    /// The walkability grid, rows first
    Map { data: Vec<Vec<Tile>> },

    /// Full authoritative snapshot
    State {
        ts: u64,
        data: Vec<PlayerSnapshot>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_turn: Option<SessionId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_time_left: Option<f64>,
    },

    /// Reply to a continuous move intent
    MoveAck { x: f64, y: f64, ts: u64 },

    Chat {
        from: String,
        text: String,
        time: u64,
        color: Color,
    },
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: SessionId,
    pub name: String,
    pub race: Race,
    pub x: f64,
    pub y: f64,
    pub tx: f64,
    pub ty: f64,
    pub hp: i32,
    pub color: Color,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_falls_back_on_unknown_tags() {
        let hs: Handshake =
            serde_json::from_str(r#"{"name":"Alice","race":"dragon","weapon":7}"#).unwrap();
        assert_eq!(hs.race, Race::Human);
        assert_eq!(hs.weapon, Weapon::Sword);
        assert!(hs.color.is_none());

        let hs: Handshake =
            serde_json::from_str(r#"{"name":"Bob","race":"cat","weapon":"spear","color":{"r":10,"g":300}}"#)
                .unwrap();
        assert_eq!(hs.race, Race::Cat);
        assert_eq!(hs.weapon, Weapon::Spear);
        assert_eq!(Color::from(hs.color.unwrap()), Color::new(10, 255, 0, 0));
    }

    #[test]
    fn turn_actions_decode_with_optional_targets() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"action":"turn_action","type":"skip"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::TurnAction(TurnAction::Skip)));

        let msg: ClientMsg =
            serde_json::from_str(r#"{"action":"turn_action","type":"move","targetX":48.0}"#)
                .unwrap();
        match msg {
            ClientMsg::TurnAction(TurnAction::Move { target_x, target_y }) => {
                assert_eq!(target_x, Some(48.0));
                assert_eq!(target_y, None);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(serde_json::from_str::<ClientMsg>(r#"{"action":"turn_action","type":"dance"}"#)
            .is_err());
    }

    #[test]
    fn state_omits_turn_fields_when_idle() {
        let msg = ServerMsg::State {
            ts: 1,
            data: vec![],
            current_turn: None,
            turn_time_left: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "state");
        assert!(json.get("current_turn").is_none());
        assert!(json.get("turn_time_left").is_none());
    }
}
