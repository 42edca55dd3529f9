//! Monopoly - rules engine for a multiplayer property-trading board game
//!
//! This crate provides the core game logic, including:
//! - The standard 40-square board with color groups, railroads and utilities
//! - Chance and Community Chest decks with keeper-aware reshuffling
//! - Turn state machine with doubles, jail, rent, taxes and bankruptcy
//! - Time-boxed auctions and bilateral trades
//! - Heuristic non-human players
//!
//! # Architecture
//!
//! The engine is synchronous and does no I/O. Randomness is passed in as a
//! `RngCore` and time as epoch milliseconds, so a game can be replayed with a
//! seeded generator. The server crate owns one `GameState` per game and
//! persists it as JSON after every dispatched command.
//!
//! # Modules
//!
//! - [`board`]: Squares, prices and rent tables
//! - [`cards`]: Deck contents and draw piles
//! - [`player`]: Player state
//! - [`game`]: Game state machine
//! - [`auction`]: Auctions over unowned squares
//! - [`trade`]: Trade proposals
//! - [`bot`]: Non-human decision making

pub mod actions;
pub mod auction;
pub mod board;
pub mod bot;
pub mod cards;
pub mod game;
pub mod player;
pub mod trade;

// Re-export commonly used types
pub use actions::{GameAction, GameEvent, JailRelease};
pub use auction::{Auction, Bid, AUCTION_WINDOW_MS};
pub use board::{ColorGroup, PlayerId, Square, SquareId, SquareKind};
pub use bot::{strategy_for, Bot, BotDifficulty, JailChoice, Strategy};
pub use cards::{Deck, DrawPile};
pub use game::{
    ChatEntry, GameError, GameState, GameStatus, LogEntry, NewPlayer, TurnPhase, MAX_PLAYERS,
    MAX_TRANSFER,
};
pub use player::{Controller, JailStatus, Player};
pub use trade::{Trade, TradeBundle};
