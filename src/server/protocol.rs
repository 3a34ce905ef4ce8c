//! Client-to-server frames.

use serde::Deserialize;

use crate::session::{GameCommand, GameKind};

/// One frame from a client: `{"game": "grid", "event": "drop", "column": 3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Inbound {
    /// Session the frame is for.
    pub game: GameKind,
    /// What the client asks for.
    #[serde(flatten)]
    pub request: Request,
}

impl Inbound {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, an unknown game or an unknown
    /// event.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Requests a client can make of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Request {
    /// Take a seat or join the waitlist.
    Join,
    /// Leave the session.
    Leave,
    /// Watch without playing.
    Spectate,
    /// Start a round.
    Start,
    /// Place a bet.
    Bet {
        /// Amount to stake.
        amount: u64,
    },
    /// Take a card.
    Hit,
    /// Keep the hand.
    Stand,
    /// Double down.
    Double,
    /// Split a pair.
    Split,
    /// Play a card from the hand.
    Play {
        /// Index into the hand.
        card: usize,
    },
    /// Draw from the pile.
    Draw,
    /// Drop a disc.
    Drop {
        /// Column index.
        column: usize,
    },
    /// React to the signal.
    React,
}

impl Request {
    /// The in-game command, or `None` for lobby requests.
    #[must_use]
    pub const fn command(self) -> Option<GameCommand> {
        match self {
            Self::Join | Self::Leave | Self::Spectate | Self::Start => None,
            Self::Bet { amount } => Some(GameCommand::Bet { amount }),
            Self::Hit => Some(GameCommand::Hit),
            Self::Stand => Some(GameCommand::Stand),
            Self::Double => Some(GameCommand::Double),
            Self::Split => Some(GameCommand::Split),
            Self::Play { card } => Some(GameCommand::Play { card }),
            Self::Draw => Some(GameCommand::Draw),
            Self::Drop { column } => Some(GameCommand::Drop { column }),
            Self::React => Some(GameCommand::React),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_payload_fields() {
        let frame = Inbound::parse(r#"{"game":"blackjack","event":"bet","amount":25}"#).unwrap();
        assert_eq!(frame.game, GameKind::Blackjack);
        assert_eq!(frame.request.command(), Some(GameCommand::Bet { amount: 25 }));

        let frame = Inbound::parse(r#"{"game":"duel","event":"join"}"#).unwrap();
        assert_eq!(frame.request, Request::Join);
        assert_eq!(frame.request.command(), None);
    }

    #[test]
    fn rejects_unknown_game_and_event() {
        assert!(Inbound::parse(r#"{"game":"poker","event":"join"}"#).is_err());
        assert!(Inbound::parse(r#"{"game":"grid","event":"fold"}"#).is_err());
        assert!(Inbound::parse(r#"{"game":"grid","event":"drop"}"#).is_err());
    }
}
