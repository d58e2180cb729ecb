//! Rules engine: one room's authoritative deck, hands, turn order and
//! declaration scoring.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::cards::{build_deck, Card};
use crate::config;

#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub hand: Vec<Card>,
    pub score: i64,
    pub chips: i64,
    pub ready: bool,
}

impl Player {
    pub fn new(id: String, name: String, chips: Option<i64>) -> Self {
        Self {
            id,
            name,
            hand: Vec::new(),
            score: 0,
            chips: chips.unwrap_or(config::DEFAULT_CHIPS),
            ready: false,
        }
    }

    pub fn hand_value(&self) -> i64 {
        self.hand.iter().map(Card::point_value).sum()
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("round not active")]
    RoundNotActive,
    #[error("no players seated")]
    NoPlayers,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("not your turn")]
    NotYourTurn,
    #[error("invalid discard")]
    InvalidDiscard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Declaration stood: nobody matched or beat the caller's hand.
    Yaniv,
    /// An opponent's hand was at or below the caller's; caller penalized.
    Asaf,
}

/// Result of resolving a declaration: the outcome tag, the challenger (if
/// any), every player's cumulative score after the round, and the chip
/// movement applied to each player.
#[derive(Debug, Clone, Serialize)]
pub struct Declaration {
    pub outcome: RoundOutcome,
    pub challenger: Option<String>,
    pub scores: HashMap<String, i64>,
    pub chip_deltas: HashMap<String, i64>,
}

#[derive(Debug)]
pub struct GameEngine {
    pub players: Vec<Player>,
    draw_pile: Vec<Card>,
    discard_pile: Vec<Card>,
    turn_index: usize,
    round_active: bool,
    last_discard: Vec<Card>,
}

impl GameEngine {
    pub fn new(players: Vec<Player>) -> Self {
        Self {
            players,
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            turn_index: 0,
            round_active: false,
            last_discard: Vec::new(),
        }
    }

    pub fn round_active(&self) -> bool {
        self.round_active
    }

    pub fn draw_count(&self) -> usize {
        self.draw_pile.len()
    }

    pub fn discard_count(&self) -> usize {
        self.discard_pile.len()
    }

    pub fn discard_top(&self) -> Option<Card> {
        self.discard_pile.last().copied()
    }

    pub fn last_discard(&self) -> &[Card] {
        &self.last_discard
    }

    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.turn_index)
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Rebuild and shuffle the deck, deal a fresh hand to every player, flip
    /// one card to the discard pile and hand the turn to player 0.
    ///
    /// Starting a round with nobody seated is an upstream defect; it is
    /// rejected rather than leaving the turn pointer dangling.
    pub fn start_new_round(&mut self) -> Result<(), EngineError> {
        if self.players.is_empty() {
            return Err(EngineError::NoPlayers);
        }
        self.draw_pile = build_deck();
        self.discard_pile.clear();
        self.last_discard.clear();
        for i in 0..self.players.len() {
            self.players[i].hand.clear();
            for _ in 0..config::HAND_SIZE {
                if let Some(card) = self.draw_card() {
                    self.players[i].hand.push(card);
                }
            }
        }
        self.turn_index = 0;
        self.round_active = true;
        if let Some(top) = self.draw_card() {
            self.discard_pile.push(top);
        }
        Ok(())
    }

    /// Pop the top of the draw pile, reshuffling the discard pile into it
    /// first when empty. Reshuffle only ever happens on a draw request.
    pub fn draw_card(&mut self) -> Option<Card> {
        if self.draw_pile.is_empty() {
            self.draw_pile = std::mem::take(&mut self.discard_pile);
            self.draw_pile.shuffle(&mut rand::thread_rng());
        }
        self.draw_pile.pop()
    }

    pub fn advance_turn(&mut self) {
        if !self.players.is_empty() {
            self.turn_index = (self.turn_index + 1) % self.players.len();
        }
    }

    /// Discard-set legality. A single card always passes. A set is two or
    /// more cards whose non-Jokers all share a value (at least one
    /// non-Joker). A sequence is three or more same-suit cards in strictly
    /// ascending rank, with rank gaps covered by Jokers.
    pub fn is_valid_discard(discard: &[Card]) -> bool {
        if discard.is_empty() {
            return false;
        }
        if discard.len() == 1 {
            return true;
        }

        let non_jokers: Vec<Card> = discard.iter().copied().filter(|c| !c.is_joker()).collect();
        let joker_count = discard.len() - non_jokers.len();

        let first = match non_jokers.first() {
            Some(c) => *c,
            // all Jokers never form a set or a sequence
            None => return false,
        };

        if non_jokers.iter().all(|c| c.value == first.value) {
            return true;
        }

        if discard.len() < 3 {
            return false;
        }
        if !non_jokers.iter().all(|c| c.suit == first.suit) {
            return false;
        }

        let mut ranks: Vec<usize> = match non_jokers
            .iter()
            .map(|c| c.value.rank_index())
            .collect::<Option<Vec<_>>>()
        {
            Some(r) => r,
            None => return false,
        };
        ranks.sort_unstable();

        let mut gaps = 0;
        for pair in ranks.windows(2) {
            let diff = pair[1] as i64 - pair[0] as i64;
            if diff <= 0 {
                // a duplicate rank can never be bridged
                return false;
            }
            gaps += diff - 1;
        }
        gaps <= joker_count as i64
    }

    /// Remove `discard` from the player's hand (first match per card, so
    /// duplicate cards from the double deck are accounted one-for-one) and
    /// push it onto the discard pile. No state changes on failure.
    pub fn discard_cards(&mut self, player_id: &str, discard: &[Card]) -> Result<(), EngineError> {
        if !Self::is_valid_discard(discard) {
            return Err(EngineError::InvalidDiscard);
        }
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(EngineError::UnknownPlayer)?;

        let mut remaining = player.hand.clone();
        for card in discard {
            match remaining.iter().position(|c| c == card) {
                Some(idx) => {
                    remaining.remove(idx);
                }
                None => return Err(EngineError::InvalidDiscard),
            }
        }
        player.hand = remaining;
        self.discard_pile.extend_from_slice(discard);
        self.last_discard = discard.to_vec();
        Ok(())
    }

    /// Atomic move: discard (must succeed) then draw one card into the same
    /// hand. Returns the drawn card.
    pub fn perform_move(&mut self, player_id: &str, discard: &[Card]) -> Result<Card, EngineError> {
        if !self.round_active {
            return Err(EngineError::RoundNotActive);
        }
        let current = self.current_player().ok_or(EngineError::NoPlayers)?;
        if current.id != player_id {
            return Err(EngineError::NotYourTurn);
        }
        self.discard_cards(player_id, discard)?;
        // cannot be empty mid-round: the hand just discarded into the pile
        let drawn = self.draw_card().ok_or(EngineError::RoundNotActive)?;
        if let Some(p) = self.players.iter_mut().find(|p| p.id == player_id) {
            p.hand.push(drawn);
        }
        Ok(drawn)
    }

    /// Resolve a Yaniv declaration.
    ///
    /// The first opponent in seating order whose hand value is at or below
    /// the caller's becomes the challenger (Asaf) — first match wins even
    /// when a later opponent holds less. Scores and chip deltas are applied
    /// here, in the same pass, so the two ledgers never drift.
    pub fn resolve_declaration(
        &mut self,
        caller_id: &str,
        multiplier: i64,
    ) -> Result<Declaration, EngineError> {
        if !self.round_active {
            return Err(EngineError::RoundNotActive);
        }
        let caller_points = self
            .player(caller_id)
            .ok_or(EngineError::UnknownPlayer)?
            .hand_value();

        let challenger: Option<String> = self
            .players
            .iter()
            .find(|p| p.id != caller_id && p.hand_value() <= caller_points)
            .map(|p| p.id.clone());

        let mut scores = HashMap::new();
        let mut chip_deltas = HashMap::new();

        for p in self.players.iter_mut() {
            let hand_value = p.hand_value();
            let delta = if p.id == caller_id {
                if challenger.is_some() {
                    p.score += hand_value + 30;
                    -30 * multiplier
                } else {
                    0
                }
            } else if Some(&p.id) == challenger.as_ref() {
                30 * multiplier
            } else {
                p.score += hand_value;
                -hand_value * multiplier
            };
            p.chips += delta;
            scores.insert(p.id.clone(), p.score);
            chip_deltas.insert(p.id.clone(), delta);
        }

        self.round_active = false;

        Ok(Declaration {
            outcome: if challenger.is_some() {
                RoundOutcome::Asaf
            } else {
                RoundOutcome::Yaniv
            },
            challenger,
            scores,
            chip_deltas,
        })
    }

    /// Drop a player from the round. If it was their turn the pointer moves
    /// to the next seat; an emptied room deactivates the round.
    pub fn remove_player(&mut self, player_id: &str) -> bool {
        let Some(idx) = self.players.iter().position(|p| p.id == player_id) else {
            return false;
        };
        self.players.remove(idx);
        if self.players.is_empty() {
            self.turn_index = 0;
            self.round_active = false;
        } else if idx < self.turn_index {
            self.turn_index -= 1;
        } else {
            // removing the current (or a later) seat leaves the pointer on
            // the next player in order
            self.turn_index %= self.players.len();
        }
        true
    }

    /// Total cards in play. 108 while a round is running.
    pub fn total_cards(&self) -> usize {
        self.draw_pile.len()
            + self.discard_pile.len()
            + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Suit, Value};

    fn card(suit: Suit, value: Value) -> Card {
        Card::new(suit, value)
    }

    fn two_player_engine() -> GameEngine {
        GameEngine::new(vec![
            Player::new("p1".into(), "Alice".into(), None),
            Player::new("p2".into(), "Bob".into(), None),
        ])
    }

    #[test]
    fn round_start_deals_and_flips() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        assert!(eng.round_active());
        assert_eq!(eng.turn_index(), 0);
        for p in &eng.players {
            assert_eq!(p.hand.len(), 5);
        }
        assert_eq!(eng.discard_count(), 1);
        assert_eq!(eng.total_cards(), 108);
    }

    #[test]
    fn round_start_with_no_players_is_rejected() {
        let mut eng = GameEngine::new(Vec::new());
        assert_eq!(eng.start_new_round(), Err(EngineError::NoPlayers));
        assert!(!eng.round_active());
    }

    #[test]
    fn empty_draw_pile_reshuffles_discards() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        // drain the draw pile entirely
        while eng.draw_count() > 0 {
            eng.draw_card();
        }
        let mut prior_discards = eng.discard_pile.clone();
        assert!(!prior_discards.is_empty());

        let drawn = eng.draw_card().unwrap();
        assert_eq!(eng.discard_count(), 0);

        // the new draw pile plus the drawn card is exactly a permutation of
        // the old discard pile
        let mut rebuilt = eng.draw_pile.clone();
        rebuilt.push(drawn);
        let sort_key = |c: &Card| (c.suit as u8, c.value as u8);
        rebuilt.sort_by_key(sort_key);
        prior_discards.sort_by_key(sort_key);
        assert_eq!(rebuilt, prior_discards);
    }

    #[test]
    fn single_card_is_always_valid() {
        assert!(GameEngine::is_valid_discard(&[card(Suit::Clubs, Value::King)]));
        assert!(GameEngine::is_valid_discard(&[Card::JOKER]));
        assert!(!GameEngine::is_valid_discard(&[]));
    }

    #[test]
    fn set_with_joker_padding_is_valid() {
        assert!(GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Seven),
            card(Suit::Hearts, Value::Seven),
            Card::JOKER,
        ]));
        assert!(GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Seven),
            card(Suit::Hearts, Value::Seven),
        ]));
        // two different values are not a set (nor a 2-card run)
        assert!(!GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Seven),
            card(Suit::Spades, Value::Eight),
        ]));
        // jokers alone have no anchor value
        assert!(!GameEngine::is_valid_discard(&[Card::JOKER, Card::JOKER]));
    }

    #[test]
    fn sequence_legality() {
        assert!(GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Five),
            card(Suit::Spades, Value::Six),
            card(Suit::Spades, Value::Seven),
        ]));
        // gap of one bridged by one joker
        assert!(GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Five),
            card(Suit::Spades, Value::Seven),
            Card::JOKER,
        ]));
        // gap of two, only one joker
        assert!(!GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Five),
            card(Suit::Spades, Value::Eight),
            Card::JOKER,
        ]));
        // mixed suits never run
        assert!(!GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Five),
            card(Suit::Hearts, Value::Six),
            card(Suit::Spades, Value::Seven),
        ]));
        // duplicate rank cannot be bridged
        assert!(!GameEngine::is_valid_discard(&[
            card(Suit::Spades, Value::Five),
            card(Suit::Spades, Value::Five),
            card(Suit::Spades, Value::Six),
        ]));
    }

    #[test]
    fn discard_requires_exact_hand_copies() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        let seven = card(Suit::Spades, Value::Seven);
        eng.players[0].hand = vec![seven, card(Suit::Hearts, Value::Two)];
        // hand holds one copy; discarding two must fail without mutation
        let total_before = eng.total_cards();
        let err = eng.discard_cards("p1", &[seven, seven]);
        assert_eq!(err, Err(EngineError::InvalidDiscard));
        assert_eq!(eng.players[0].hand.len(), 2);
        assert_eq!(eng.total_cards(), total_before);

        eng.players[0].hand = vec![seven, seven];
        eng.discard_cards("p1", &[seven, seven]).unwrap();
        assert!(eng.players[0].hand.is_empty());
        assert_eq!(eng.last_discard(), &[seven, seven]);
    }

    #[test]
    fn move_is_atomic_and_keeps_deck_invariant() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        let first = eng.players[0].hand[0];
        let drawn = eng.perform_move("p1", &[first]).unwrap();
        assert_eq!(eng.players[0].hand.len(), 5);
        assert!(eng.players[0].hand.contains(&drawn));
        assert_eq!(eng.discard_top(), Some(first));
        assert_eq!(eng.total_cards(), 108);
    }

    #[test]
    fn rejected_move_leaves_state_untouched() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        let hand_before = eng.players[1].hand.clone();
        let pile_before = eng.discard_count();
        let turn_before = eng.turn_index();

        // not p2's turn
        let c = eng.players[1].hand[0];
        assert_eq!(eng.perform_move("p2", &[c]), Err(EngineError::NotYourTurn));
        assert_eq!(eng.players[1].hand, hand_before);
        assert_eq!(eng.discard_count(), pile_before);
        assert_eq!(eng.turn_index(), turn_before);
        assert_eq!(eng.players[1].score, 0);
    }

    #[test]
    fn turn_pointer_cycles() {
        let mut eng = GameEngine::new(vec![
            Player::new("a".into(), "A".into(), None),
            Player::new("b".into(), "B".into(), None),
            Player::new("c".into(), "C".into(), None),
        ]);
        eng.start_new_round().unwrap();
        let start = eng.turn_index();
        for _ in 0..3 {
            eng.advance_turn();
        }
        assert_eq!(eng.turn_index(), start);
    }

    #[test]
    fn successful_yaniv_scores_opponents_only() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        eng.players[0].hand = vec![card(Suit::Clubs, Value::Four)];
        eng.players[1].hand = vec![
            card(Suit::Clubs, Value::Nine),
        ];
        let res = eng.resolve_declaration("p1", 1).unwrap();
        assert_eq!(res.outcome, RoundOutcome::Yaniv);
        assert_eq!(res.challenger, None);
        assert_eq!(res.scores["p1"], 0);
        assert_eq!(res.scores["p2"], 9);
        assert_eq!(res.chip_deltas["p1"], 0);
        assert_eq!(res.chip_deltas["p2"], -9);
        assert!(!eng.round_active());
    }

    #[test]
    fn asaf_tie_break_picks_first_in_order() {
        let mut eng = GameEngine::new(vec![
            Player::new("caller".into(), "Caller".into(), None),
            Player::new("a".into(), "A".into(), None),
            Player::new("b".into(), "B".into(), None),
        ]);
        eng.start_new_round().unwrap();
        eng.players[0].hand = vec![card(Suit::Clubs, Value::Four)];
        eng.players[1].hand = vec![card(Suit::Hearts, Value::Four)]; // ties at 4
        eng.players[2].hand = vec![card(Suit::Hearts, Value::Two)]; // lower, but later
        let res = eng.resolve_declaration("caller", 2).unwrap();
        assert_eq!(res.outcome, RoundOutcome::Asaf);
        assert_eq!(res.challenger.as_deref(), Some("a"));
        // caller eats hand value + 30, challenger's score untouched
        assert_eq!(res.scores["caller"], 34);
        assert_eq!(res.scores["a"], 0);
        assert_eq!(res.scores["b"], 2);
        assert_eq!(res.chip_deltas["caller"], -60);
        assert_eq!(res.chip_deltas["a"], 60);
        assert_eq!(res.chip_deltas["b"], -4);
    }

    #[test]
    fn asaf_chip_transfer_is_zero_sum_between_caller_and_challenger() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        eng.players[0].hand = vec![card(Suit::Clubs, Value::Five)];
        eng.players[1].hand = vec![card(Suit::Clubs, Value::Three)];
        let res = eng.resolve_declaration("p1", 3).unwrap();
        assert_eq!(res.outcome, RoundOutcome::Asaf);
        let total: i64 = res.chip_deltas.values().sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn chips_applied_synchronously_with_scores() {
        let mut eng = two_player_engine();
        eng.start_new_round().unwrap();
        eng.players[0].hand = vec![card(Suit::Clubs, Value::Two)];
        eng.players[1].hand = vec![card(Suit::Clubs, Value::Eight)];
        eng.resolve_declaration("p1", 2).unwrap();
        assert_eq!(eng.players[0].chips, config::DEFAULT_CHIPS);
        assert_eq!(eng.players[1].chips, config::DEFAULT_CHIPS - 16);
        assert_eq!(eng.players[1].score, 8);
    }

    #[test]
    fn removing_current_player_advances_turn() {
        let mut eng = GameEngine::new(vec![
            Player::new("a".into(), "A".into(), None),
            Player::new("b".into(), "B".into(), None),
            Player::new("c".into(), "C".into(), None),
        ]);
        eng.start_new_round().unwrap();
        eng.advance_turn(); // b's turn
        assert!(eng.remove_player("b"));
        assert_eq!(eng.current_player().map(|p| p.id.as_str()), Some("c"));

        // removing an earlier seat keeps the pointer on the same player
        assert!(eng.remove_player("a"));
        assert_eq!(eng.current_player().map(|p| p.id.as_str()), Some("c"));

        assert!(eng.remove_player("c"));
        assert!(!eng.round_active());
    }
}
