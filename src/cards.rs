//! Card and deck model: two standard decks, each carrying two Jokers, for
//! a 108-card draw pile.

use std::fmt;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
    Joker,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Joker,
}

const RANK_ORDER: [Value; 13] = [
    Value::Ace,
    Value::Two,
    Value::Three,
    Value::Four,
    Value::Five,
    Value::Six,
    Value::Seven,
    Value::Eight,
    Value::Nine,
    Value::Ten,
    Value::Jack,
    Value::Queen,
    Value::King,
];

impl Value {
    /// Position in the A..K sequence order. Jokers have no rank.
    pub fn rank_index(self) -> Option<usize> {
        RANK_ORDER.iter().position(|v| *v == self)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    pub suit: Suit,
    pub value: Value,
}

impl Card {
    pub const fn new(suit: Suit, value: Value) -> Self {
        Self { suit, value }
    }

    pub const JOKER: Card = Card::new(Suit::Joker, Value::Joker);

    pub fn is_joker(&self) -> bool {
        self.value == Value::Joker
    }

    /// Scoring value: A=1, 2-10 face value, J/Q/K=10, Joker=0.
    pub fn point_value(&self) -> i64 {
        match self.value {
            Value::Joker => 0,
            Value::Ace => 1,
            Value::Jack | Value::Queen | Value::King => 10,
            v => v.rank_index().map(|i| i as i64 + 1).unwrap_or(0),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_joker() {
            return write!(f, "Joker");
        }
        let v = match self.value {
            Value::Ace => "A",
            Value::Two => "2",
            Value::Three => "3",
            Value::Four => "4",
            Value::Five => "5",
            Value::Six => "6",
            Value::Seven => "7",
            Value::Eight => "8",
            Value::Nine => "9",
            Value::Ten => "10",
            Value::Jack => "J",
            Value::Queen => "Q",
            Value::King => "K",
            Value::Joker => "Joker",
        };
        let s = match self.suit {
            Suit::Spades => "\u{2660}",
            Suit::Hearts => "\u{2665}",
            Suit::Diamonds => "\u{2666}",
            Suit::Clubs => "\u{2663}",
            Suit::Joker => "?",
        };
        write!(f, "{v}{s}")
    }
}

/// Full 108-card deck: two 52-card decks, two Jokers per deck, shuffled.
pub fn build_deck() -> Vec<Card> {
    let suits = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];
    let mut deck = Vec::with_capacity(108);
    for _ in 0..2 {
        for s in suits {
            for v in RANK_ORDER {
                deck.push(Card::new(s, v));
            }
        }
        deck.push(Card::JOKER);
        deck.push(Card::JOKER);
    }
    deck.shuffle(&mut rand::thread_rng());
    deck
}
