//! Round results.
//!
//! Resolution is a pure function of the player hands and the dealer hand; it
//! never touches the ledger. Settlement turns these results into credits.

use serde::Serialize;

use crate::hand::{DealerHand, Hand, HandStatus};

/// Result of a single hand against the dealer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandOutcome {
    /// Player wins (dealer busts or player has higher value).
    Win,
    /// Player loses (player busts or dealer has higher value).
    Lose,
    /// Push (tie).
    Push,
    /// Player has blackjack.
    Blackjack,
}

/// Result for a single hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandResult {
    /// The hand index (for split hands).
    pub hand_index: usize,
    /// The outcome of the hand.
    pub outcome: HandOutcome,
    /// The bet amount for this hand.
    pub bet: u64,
    /// Signed result relative to the bet.
    pub delta: i64,
    /// The player's hand value.
    pub player_value: u8,
    /// The dealer's hand value.
    pub dealer_value: u8,
}

/// Result for a single seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatResult {
    /// Identity holding the seat.
    pub identity: String,
    /// Results for each hand (two after a split).
    pub hands: Vec<HandResult>,
    /// Sum of the hand bets.
    pub stake: u64,
    /// Sum of the hand deltas.
    pub delta: i64,
}

impl SeatResult {
    /// What settlement owes the seat before any profit cap: the stake plus
    /// the signed delta, never below zero.
    #[must_use]
    pub const fn gross_payout(&self) -> u64 {
        self.stake.saturating_add_signed(self.delta)
    }
}

/// Result of the entire round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundResult {
    /// Results for each seat that played.
    pub seats: Vec<SeatResult>,
    /// The dealer's final hand value.
    pub dealer_value: u8,
    /// Whether the dealer busted.
    pub dealer_bust: bool,
    /// Whether the dealer had blackjack.
    pub dealer_blackjack: bool,
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

/// Resolves one hand against the dealer.
///
/// `blackjack_percent` is the profit on a natural as a percentage of the bet
/// (150 pays 3:2); the result is floored.
#[must_use]
pub fn resolve_hand(
    hand_index: usize,
    hand: &Hand,
    dealer: &DealerHand,
    blackjack_percent: u64,
) -> HandResult {
    let bet = hand.bet();
    let player_value = hand.score();
    let dealer_value = dealer.value();

    let (outcome, delta) = match hand.status() {
        HandStatus::Bust => (HandOutcome::Lose, -signed(bet)),
        HandStatus::Blackjack => {
            if dealer.is_blackjack() {
                (HandOutcome::Push, 0)
            } else {
                let profit = bet.saturating_mul(blackjack_percent) / 100;
                (HandOutcome::Blackjack, signed(profit))
            }
        }
        HandStatus::Stand | HandStatus::Playing => {
            if dealer.is_bust() || player_value > dealer_value {
                (HandOutcome::Win, signed(bet))
            } else if player_value == dealer_value {
                (HandOutcome::Push, 0)
            } else {
                (HandOutcome::Lose, -signed(bet))
            }
        }
    };

    HandResult {
        hand_index,
        outcome,
        bet,
        delta,
        player_value,
        dealer_value,
    }
}

/// Resolves every seat's hands against the dealer.
///
/// `seats` pairs each identity with its hands, in seating order.
#[must_use]
pub fn resolve_round<'a>(
    seats: impl IntoIterator<Item = (&'a str, &'a [Hand])>,
    dealer: &DealerHand,
    blackjack_percent: u64,
) -> RoundResult {
    let seats = seats
        .into_iter()
        .map(|(identity, hands)| {
            let hands: Vec<HandResult> = hands
                .iter()
                .enumerate()
                .map(|(index, hand)| resolve_hand(index, hand, dealer, blackjack_percent))
                .collect();
            SeatResult {
                identity: identity.to_owned(),
                stake: hands.iter().map(|result| result.bet).sum(),
                delta: hands.iter().map(|result| result.delta).sum(),
                hands,
            }
        })
        .collect();

    RoundResult {
        seats,
        dealer_value: dealer.value(),
        dealer_bust: dealer.is_bust(),
        dealer_blackjack: dealer.is_blackjack(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Card, Suit};

    fn hand(bet: u64, ranks: &[u8]) -> Hand {
        let mut hand = Hand::new(bet);
        for &rank in ranks {
            hand.add_card(Card::new(Suit::Clubs, rank));
        }
        hand
    }

    fn dealer(ranks: &[u8]) -> DealerHand {
        let mut dealer = DealerHand::new();
        for &rank in ranks {
            dealer.add_card(Card::new(Suit::Hearts, rank));
        }
        dealer
    }

    #[test]
    fn natural_pays_three_to_two_floored() {
        let result = resolve_hand(0, &hand(101, &[1, 13]), &dealer(&[10, 9]), 150);
        assert_eq!(result.outcome, HandOutcome::Blackjack);
        assert_eq!(result.delta, 151);
    }

    #[test]
    fn natural_against_dealer_natural_pushes() {
        let result = resolve_hand(0, &hand(100, &[1, 12]), &dealer(&[1, 11]), 150);
        assert_eq!(result.outcome, HandOutcome::Push);
        assert_eq!(result.delta, 0);
    }

    #[test]
    fn bust_loses_even_when_dealer_busts() {
        let result = resolve_hand(0, &hand(40, &[10, 6, 9]), &dealer(&[10, 6, 8]), 150);
        assert_eq!(result.outcome, HandOutcome::Lose);
        assert_eq!(result.delta, -40);
    }

    #[test]
    fn totals_decide_the_rest() {
        let dealer = dealer(&[10, 9]);
        assert_eq!(
            resolve_hand(0, &hand(10, &[10, 10]), &dealer, 150).delta,
            10
        );
        assert_eq!(resolve_hand(0, &hand(10, &[10, 9]), &dealer, 150).delta, 0);
        assert_eq!(
            resolve_hand(0, &hand(10, &[10, 8]), &dealer, 150).delta,
            -10
        );
    }

    #[test]
    fn seat_delta_sums_split_hands() {
        let won = hand(50, &[8, 10]);
        let lost = hand(50, &[8, 8]);
        let hands = [won, lost];
        let round = resolve_round([("a", &hands[..])], &dealer(&[10, 7]), 150);

        assert_eq!(round.dealer_value, 17);
        let seat = &round.seats[0];
        assert_eq!(seat.stake, 100);
        assert_eq!(seat.delta, 0);
        assert_eq!(seat.gross_payout(), 100);
    }
}
