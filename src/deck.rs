//! Multi-deck shoe with a discard pile.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::card::{Card, DECK_SIZE, Suit};

/// An ordered draw pile plus the cards discarded from play.
///
/// Cards are dealt from the tail. The shuffle is [`SliceRandom::shuffle`],
/// an in-place Fisher–Yates pass.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    cards: Vec<Card>,
    discards: Vec<Card>,
}

impl Deck {
    /// Builds `decks` copies of the 52-card set and shuffles them.
    #[must_use]
    pub fn shuffled(decks: u8, rng: &mut ChaCha8Rng) -> Self {
        let mut cards = Vec::with_capacity(decks as usize * DECK_SIZE);

        for _ in 0..decks {
            for suit in Suit::ALL {
                for rank in 1..=13 {
                    cards.push(Card::new(suit, rank));
                }
            }
        }

        cards.shuffle(rng);
        Self {
            cards,
            discards: Vec::new(),
        }
    }

    /// Builds a deck that will deal `draws` in the given order.
    #[must_use]
    pub fn stacked(draws: &[Card]) -> Self {
        let mut cards = draws.to_vec();
        cards.reverse();
        Self {
            cards,
            discards: Vec::new(),
        }
    }

    /// Draws the next card.
    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    /// Draws the next card, first turning the discard pile into a fresh draw
    /// pile when the draw pile is empty.
    ///
    /// The most recent discard stays out of the reshuffle; it remains the
    /// face-up card of draw-based games.
    pub fn draw_or_reshuffle(&mut self, rng: &mut ChaCha8Rng) -> Option<Card> {
        if self.cards.is_empty() {
            self.reshuffle_discards(rng);
        }
        self.cards.pop()
    }

    /// Moves every discard except the latest one back into the draw pile and
    /// shuffles it. Returns the number of cards recycled.
    pub fn reshuffle_discards(&mut self, rng: &mut ChaCha8Rng) -> usize {
        let Some(top) = self.discards.pop() else {
            return 0;
        };

        let recycled = self.discards.len();
        self.cards.append(&mut self.discards);
        self.cards.shuffle(rng);
        self.discards.push(top);
        recycled
    }

    /// Puts a card on the discard pile.
    pub fn discard(&mut self, card: Card) {
        self.discards.push(card);
    }

    /// Returns the most recently discarded card.
    #[must_use]
    pub fn top_discard(&self) -> Option<&Card> {
        self.discards.last()
    }

    /// Number of cards left in the draw pile.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    /// Number of cards on the discard pile.
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.discards.len()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn shuffled_shoe_holds_every_card_per_deck() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut deck = Deck::shuffled(8, &mut rng);
        assert_eq!(deck.remaining(), 8 * DECK_SIZE);

        let mut aces_of_spades = 0;
        while let Some(card) = deck.draw() {
            if card == Card::new(Suit::Spades, 1) {
                aces_of_spades += 1;
            }
        }
        assert_eq!(aces_of_spades, 8);
    }

    #[test]
    fn stacked_deck_deals_in_order() {
        let mut deck = Deck::stacked(&[Card::new(Suit::Hearts, 2), Card::new(Suit::Clubs, 3)]);
        assert_eq!(deck.draw().map(|c| c.rank), Some(2));
        assert_eq!(deck.draw().map(|c| c.rank), Some(3));
        assert_eq!(deck.draw(), None);
    }

    #[test]
    fn exhausted_pile_recycles_discards_but_keeps_top() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut deck = Deck::stacked(&[]);
        deck.discard(Card::new(Suit::Hearts, 4));
        deck.discard(Card::new(Suit::Hearts, 5));
        deck.discard(Card::new(Suit::Hearts, 6));

        let card = deck.draw_or_reshuffle(&mut rng);
        assert!(card.is_some_and(|c| c.rank == 4 || c.rank == 5));
        assert_eq!(deck.top_discard().map(|c| c.rank), Some(6));
        assert_eq!(deck.remaining(), 1);
        assert_eq!(deck.discarded(), 1);
    }

    #[test]
    fn nothing_to_recycle_yields_none() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut deck = Deck::stacked(&[]);
        deck.discard(Card::new(Suit::Spades, 9));
        assert_eq!(deck.draw_or_reshuffle(&mut rng), None);
        assert_eq!(deck.discarded(), 1);
    }
}
