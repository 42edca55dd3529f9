//! Chance and Community Chest decks.
//!
//! Cards are static; draw piles hold indices into the static tables.
//! A pile is drawn from the head until it runs out, then regenerated from the
//! full table and reshuffled. Get-out-of-jail-free cards stay with their holder
//! until used, so a regenerated pile leaves out a keeper someone still holds.

use crate::board::SquareId;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The two decks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Deck {
    Chance,
    CommunityChest,
}

impl Deck {
    /// Static card table for this deck
    pub fn cards(&self) -> &'static [Card] {
        match self {
            Deck::Chance => &CHANCE_CARDS,
            Deck::CommunityChest => &COMMUNITY_CHEST_CARDS,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Deck::Chance => "Chance",
            Deck::CommunityChest => "Community Chest",
        }
    }
}

/// What a card does when drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "kebab-case")]
pub enum CardAction {
    /// Bank pays the player
    Collect(i64),
    /// Player pays the bank
    Pay(i64),
    /// Every other player pays the player
    CollectFromAll(i64),
    /// Player pays every other player
    PayAll(i64),
    /// Move forward to an absolute square
    Advance(SquareId),
    GoToJail,
    GetOutOfJailFree,
}

impl CardAction {
    /// Keeper cards stay with the player instead of returning to the deck
    pub fn is_keeper(&self) -> bool {
        matches!(self, CardAction::GetOutOfJailFree)
    }
}

/// A card: text shown to players plus its action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub text: &'static str,
    pub action: CardAction,
}

const fn card(text: &'static str, action: CardAction) -> Card {
    Card { text, action }
}

pub static CHANCE_CARDS: [Card; 16] = [
    card("Advance to Boardwalk.", CardAction::Advance(39)),
    card("Advance to GO. Collect $200.", CardAction::Advance(0)),
    card("Advance to Illinois Avenue.", CardAction::Advance(24)),
    card("Advance to St. Charles Place.", CardAction::Advance(11)),
    card("Take a trip to Reading Railroad.", CardAction::Advance(5)),
    card("Advance to B. & O. Railroad.", CardAction::Advance(25)),
    card("Bank pays you a dividend of $50.", CardAction::Collect(50)),
    card("Get Out of Jail Free.", CardAction::GetOutOfJailFree),
    card("Go directly to Jail. Do not pass GO.", CardAction::GoToJail),
    card("Make general repairs on all your property. Pay $40.", CardAction::Pay(40)),
    card("Speeding fine. Pay $15.", CardAction::Pay(15)),
    card("You have been elected Chairman of the Board. Pay each player $50.", CardAction::PayAll(50)),
    card("Your building loan matures. Collect $150.", CardAction::Collect(150)),
    card("You won a crossword competition. Collect $100.", CardAction::Collect(100)),
    card("Advance to Electric Company.", CardAction::Advance(12)),
    card("Pay poor tax of $15.", CardAction::Pay(15)),
];

pub static COMMUNITY_CHEST_CARDS: [Card; 16] = [
    card("Advance to GO. Collect $200.", CardAction::Advance(0)),
    card("Bank error in your favor. Collect $200.", CardAction::Collect(200)),
    card("Doctor's fee. Pay $50.", CardAction::Pay(50)),
    card("From sale of stock you get $50.", CardAction::Collect(50)),
    card("Get Out of Jail Free.", CardAction::GetOutOfJailFree),
    card("Go directly to Jail. Do not pass GO.", CardAction::GoToJail),
    card("Holiday fund matures. Collect $100.", CardAction::Collect(100)),
    card("Income tax refund. Collect $20.", CardAction::Collect(20)),
    card("It is your birthday. Collect $10 from every player.", CardAction::CollectFromAll(10)),
    card("Life insurance matures. Collect $100.", CardAction::Collect(100)),
    card("Pay hospital fees of $100.", CardAction::Pay(100)),
    card("Pay school fees of $50.", CardAction::Pay(50)),
    card("Receive $25 consultancy fee.", CardAction::Collect(25)),
    card("You are assessed for street repairs. Pay $40.", CardAction::Pay(40)),
    card("You have won second prize in a beauty contest. Collect $10.", CardAction::Collect(10)),
    card("You inherit $100.", CardAction::Collect(100)),
];

/// A shuffled draw pile of indices into a deck's static table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawPile {
    pub order: VecDeque<usize>,
    /// Times the pile has been regenerated after running out
    pub reshuffles: u32,
}

impl DrawPile {
    /// A freshly shuffled pile holding every card of the deck
    pub fn shuffled(deck: Deck, rng: &mut dyn RngCore) -> Self {
        let mut pile = Self::default();
        pile.refill(deck, &[], rng);
        pile
    }

    fn refill(&mut self, deck: Deck, held: &[usize], rng: &mut dyn RngCore) {
        let mut indices: Vec<usize> = (0..deck.cards().len())
            .filter(|i| !held.contains(i))
            .collect();
        indices.shuffle(rng);
        self.order = indices.into();
    }

    /// Pop the next card index, regenerating the pile when it is empty.
    ///
    /// `held` lists keeper indices currently owned by players; they are left out
    /// of a regenerated pile.
    pub fn draw(&mut self, deck: Deck, held: &[usize], rng: &mut dyn RngCore) -> usize {
        if self.order.is_empty() {
            self.refill(deck, held, rng);
            self.reshuffles += 1;
        }
        // A deck never consists solely of held keepers
        self.order.pop_front().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Index of the get-out-of-jail-free card within a deck
pub fn keeper_index(deck: Deck) -> Option<usize> {
    deck.cards().iter().position(|c| c.action.is_keeper())
}
