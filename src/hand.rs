//! Blackjack hands.

use serde::Serialize;

use crate::card::Card;

/// The dealer draws while the hand totals less than this.
pub const DEALER_STANDS_AT: u8 = 17;

const BLACKJACK: u8 = 21;

/// Pips count face value, pictures 10. Every ace starts at 11 and drops to
/// 1 while the total is over 21.
fn points(cards: &[Card]) -> u8 {
    let mut total: u8 = 0;
    let mut high_aces: u8 = 0;
    for card in cards {
        let pips = match card.rank {
            1 => {
                high_aces += 1;
                11
            }
            rank @ 2..=10 => rank,
            11..=13 => 10,
            _ => 0,
        };
        total = total.saturating_add(pips);
    }
    while total > BLACKJACK && high_aces > 0 {
        total -= 10;
        high_aces -= 1;
    }
    total
}

/// Where a player hand stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandStatus {
    /// Still taking actions.
    Playing,
    /// Stood, by choice, timeout or an automatic 21.
    Stand,
    /// Over 21.
    Bust,
    /// Two-card 21 from the deal.
    Blackjack,
}

/// One staked player hand. A seat holds two after a split.
#[derive(Debug, Clone)]
pub struct Hand {
    cards: Vec<Card>,
    status: HandStatus,
    bet: u64,
    doubled: bool,
    split: bool,
}

impl Hand {
    /// An empty hand staked with `bet`.
    #[must_use]
    pub const fn new(bet: u64) -> Self {
        Self {
            cards: Vec::new(),
            status: HandStatus::Playing,
            bet,
            doubled: false,
            split: false,
        }
    }

    /// The second hand of a split, holding the card moved over from the
    /// first.
    #[must_use]
    pub fn from_split(card: Card, bet: u64) -> Self {
        Self {
            cards: vec![card],
            split: true,
            ..Self::new(bet)
        }
    }

    /// Takes `card`. Over 21 busts. Reaching 21 resolves the hand: a
    /// blackjack on the first two cards of an unsplit hand, a stand
    /// otherwise.
    pub fn add_card(&mut self, card: Card) {
        self.cards.push(card);
        self.status = match self.score() {
            p if p > BLACKJACK => HandStatus::Bust,
            BLACKJACK if self.cards.len() == 2 && !self.split => HandStatus::Blackjack,
            BLACKJACK => HandStatus::Stand,
            _ => self.status,
        };
    }

    /// Cards held.
    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> HandStatus {
        self.status
    }

    /// Returns whether the hand still acts.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.status == HandStatus::Playing
    }

    /// Stands, unless the hand is already resolved.
    pub fn stand(&mut self) {
        if self.is_playing() {
            self.status = HandStatus::Stand;
        }
    }

    /// Stake on this hand.
    #[must_use]
    pub const fn bet(&self) -> u64 {
        self.bet
    }

    /// Doubles the stake.
    pub const fn double_bet(&mut self) {
        self.bet *= 2;
        self.doubled = true;
    }

    /// Returns whether the stake was doubled.
    #[must_use]
    pub const fn is_doubled(&self) -> bool {
        self.doubled
    }

    /// Best total not over 21 where the aces allow it.
    #[must_use]
    pub fn score(&self) -> u8 {
        points(&self.cards)
    }

    /// Returns whether the hand is two cards of one rank.
    #[must_use]
    pub fn is_pair(&self) -> bool {
        matches!(self.cards.as_slice(), [first, second] if first.rank == second.rank)
    }

    /// Removes the second card of a pair and marks the hand as split.
    pub fn take_split_card(&mut self) -> Option<Card> {
        if !self.is_pair() {
            return None;
        }
        self.split = true;
        self.cards.pop()
    }
}

/// The dealer's cards. The second card stays face down until revealed.
#[derive(Debug, Clone, Default)]
pub struct DealerHand {
    cards: Vec<Card>,
    revealed: bool,
}

impl DealerHand {
    /// An empty hand.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cards: Vec::new(),
            revealed: false,
        }
    }

    /// Takes `card`.
    pub fn add_card(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Every card, the hole card included.
    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Turns the hole card over.
    pub const fn reveal_hole(&mut self) {
        self.revealed = true;
    }

    /// Total the players may see: the up card alone while the hole card is
    /// down.
    #[must_use]
    pub fn visible_value(&self) -> u8 {
        if self.revealed {
            self.value()
        } else {
            points(self.cards.get(..1).unwrap_or_default())
        }
    }

    /// Full total.
    #[must_use]
    pub fn value(&self) -> u8 {
        points(&self.cards)
    }

    /// Returns whether the dealer takes another card. The dealer stands on
    /// every 17, soft ones included.
    #[must_use]
    pub fn must_draw(&self) -> bool {
        self.value() < DEALER_STANDS_AT
    }

    /// Returns whether the first two cards make 21.
    #[must_use]
    pub fn is_blackjack(&self) -> bool {
        self.cards.len() == 2 && self.value() == BLACKJACK
    }

    /// Returns whether the dealer went over 21.
    #[must_use]
    pub fn is_bust(&self) -> bool {
        self.value() > BLACKJACK
    }

    /// Empties the hand and turns the hole card back down.
    pub fn clear(&mut self) {
        self.cards.clear();
        self.revealed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Suit;

    fn cards<const N: usize>(ranks: [u8; N]) -> [Card; N] {
        ranks.map(|rank| Card::new(Suit::Clubs, rank))
    }

    #[test]
    fn aces_drop_to_one_only_when_needed() {
        assert_eq!(points(&cards([1, 6])), 17);
        assert_eq!(points(&cards([1, 6, 10])), 17);
        assert_eq!(points(&cards([1, 1, 9])), 21);
        assert_eq!(points(&cards([13, 12, 1])), 21);
        assert_eq!(points(&cards([1, 1, 1, 1])), 14);
    }

    #[test]
    fn twenty_one_after_a_split_is_not_a_blackjack() {
        let mut natural = Hand::new(10);
        for card in cards([1, 13]) {
            natural.add_card(card);
        }
        assert_eq!(natural.status(), HandStatus::Blackjack);

        let [ace, king] = cards([1, 13]);
        let mut split = Hand::from_split(ace, 10);
        split.add_card(king);
        assert_eq!(split.status(), HandStatus::Stand);
    }

    #[test]
    fn hole_card_is_left_out_of_the_visible_value() {
        let mut dealer = DealerHand::new();
        for card in cards([9, 8]) {
            dealer.add_card(card);
        }
        assert_eq!(dealer.visible_value(), 9);
        assert!(!dealer.must_draw());
        dealer.reveal_hole();
        assert_eq!(dealer.visible_value(), 17);
    }
}
