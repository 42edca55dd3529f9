//! Player state.
//!
//! This module contains:
//! - Player struct with money, position and jail state
//! - Controller (human or a delegated decision-maker)
//! - Default color palette

use crate::board::{PlayerId, SquareId};
use crate::cards::Deck;
use serde::{Deserialize, Serialize};

/// Money every player starts with
pub const STARTING_MONEY: i64 = 1500;

/// Colors handed out when a joining player does not pick one
pub const PALETTE: [&str; 8] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f1c40f", "#9b59b6", "#e67e22", "#1abc9c", "#ecf0f1",
];

/// Whether a player is in jail, and for how many failed rolls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JailStatus {
    #[default]
    Free,
    Jailed {
        /// Failed escape rolls so far
        turns: u8,
    },
}

/// Who makes decisions for a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Controller {
    Human,
    /// Non-human player; `delegate` names the decision strategy
    Npc { delegate: String },
}

/// A single player's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    /// Display name, unique within the game (case-insensitive)
    pub name: String,
    pub color: String,
    /// May be negative until bankruptcy is resolved
    pub money: i64,
    pub position: SquareId,
    pub jail: JailStatus,
    /// Get-out-of-jail-free card from the Chance deck
    pub chance_jail_card: bool,
    /// Get-out-of-jail-free card from the Community Chest deck
    pub community_jail_card: bool,
    pub controller: Controller,
    pub bankrupt: bool,
    /// External account used to reattach a reconnecting session
    pub account: Option<String>,
}

impl Player {
    /// Create a player at GO with starting money
    pub fn new(id: PlayerId, name: String, color: String, controller: Controller) -> Self {
        Self {
            id,
            name,
            color,
            money: STARTING_MONEY,
            position: 0,
            jail: JailStatus::Free,
            chance_jail_card: false,
            community_jail_card: false,
            controller,
            bankrupt: false,
            account: None,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self.controller, Controller::Human)
    }

    /// Decision delegate of a non-human player
    pub fn delegate(&self) -> Option<&str> {
        match &self.controller {
            Controller::Human => None,
            Controller::Npc { delegate } => Some(delegate),
        }
    }

    pub fn in_jail(&self) -> bool {
        matches!(self.jail, JailStatus::Jailed { .. })
    }

    pub fn can_afford(&self, amount: i64) -> bool {
        self.money >= amount
    }

    pub fn jail_card(&self, deck: Deck) -> bool {
        match deck {
            Deck::Chance => self.chance_jail_card,
            Deck::CommunityChest => self.community_jail_card,
        }
    }

    pub fn set_jail_card(&mut self, deck: Deck, held: bool) {
        match deck {
            Deck::Chance => self.chance_jail_card = held,
            Deck::CommunityChest => self.community_jail_card = held,
        }
    }

    /// Number of get-out-of-jail-free cards held
    pub fn jail_cards(&self) -> u8 {
        self.chance_jail_card as u8 + self.community_jail_card as u8
    }

    /// Give up one held jail card, Chance first
    pub fn take_jail_card(&mut self) -> Option<Deck> {
        let deck = [Deck::Chance, Deck::CommunityChest]
            .into_iter()
            .find(|d| self.jail_card(*d))?;
        self.set_jail_card(deck, false);
        Some(deck)
    }
}
