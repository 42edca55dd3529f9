//! Game actions that players can take.
//!
//! This module defines all possible actions in the game and the events
//! that result from those actions.

use crate::board::{PlayerId, SquareId};
use crate::cards::Deck;
use crate::trade::TradeBundle;
use serde::{Deserialize, Serialize};

/// All possible actions a seated player can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "camelCase")]
pub enum GameAction {
    // ==================== Turn Actions ====================
    /// Roll the dice (current player only)
    RollDice,
    /// Buy the unowned square the player stands on
    BuyProperty,
    /// Pass the turn to the next player
    EndTurn,
    /// Pay the fine to leave jail before rolling
    PayJailFine,
    /// Spend a get-out-of-jail-free card before rolling
    UseJailCard,

    // ==================== Property Management ====================
    BuildHouse { square: SquareId },
    SellHouse { square: SquareId },
    Mortgage { square: SquareId },
    Unmortgage { square: SquareId },

    // ==================== Transfers ====================
    /// Hand money to another player
    GiveMoney { to: PlayerId, amount: i64 },
    /// Hand an owned square to another player
    TransferProperty { square: SquareId, to: PlayerId },

    // ==================== Trading ====================
    ProposeTrade {
        to: PlayerId,
        offer: TradeBundle,
        request: TradeBundle,
    },
    AcceptTrade,
    RejectTrade,

    // ==================== Auctions ====================
    StartAuction { square: SquareId },
    PlaceBid { amount: i64 },
}

/// How a player got out of jail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JailRelease {
    Doubles,
    PaidFine,
    Card,
    /// Paid the fine after the third failed roll
    ForcedFine,
}

/// Events that occur as a result of actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GameEvent {
    /// First log entry of a fresh game
    WaitingForPlayers,

    PlayerJoined { player: PlayerId },

    DiceRolled { player: PlayerId, dice: (u8, u8) },

    Moved { player: PlayerId, from: SquareId, to: SquareId },

    PassedGo { player: PlayerId, bonus: i64 },

    /// Landed on an unowned square that can be bought
    PurchaseAvailable { player: PlayerId, square: SquareId, price: i64 },

    PropertyBought { player: PlayerId, square: SquareId, price: i64 },

    RentPaid {
        payer: PlayerId,
        owner: PlayerId,
        square: SquareId,
        amount: i64,
    },

    TaxPaid { player: PlayerId, square: SquareId, amount: i64 },

    CardDrawn { player: PlayerId, deck: Deck, text: String },

    SentToJail { player: PlayerId },

    StillInJail { player: PlayerId, turns: u8 },

    ReleasedFromJail { player: PlayerId, how: JailRelease },

    /// Third doubles in a row
    SpeedingToJail { player: PlayerId },

    PlayerBankrupt { player: PlayerId, money: i64 },

    HouseBuilt { player: PlayerId, square: SquareId, houses: u8 },

    HouseSold { player: PlayerId, square: SquareId, houses: u8 },

    Mortgaged { player: PlayerId, square: SquareId, amount: i64 },

    Unmortgaged { player: PlayerId, square: SquareId, amount: i64 },

    MoneyGiven { from: PlayerId, to: PlayerId, amount: i64 },

    PropertyTransferred { from: PlayerId, to: PlayerId, square: SquareId },

    TradeProposed { from: PlayerId, to: PlayerId },

    TradeAccepted { from: PlayerId, to: PlayerId },

    TradeRejected { from: PlayerId, to: PlayerId },

    AuctionStarted { square: SquareId, ends_at: u64 },

    BidPlaced { player: PlayerId, amount: i64 },

    AuctionWon { player: PlayerId, square: SquareId, amount: i64 },

    AuctionUnsold { square: SquareId },

    TurnEnded { player: PlayerId, next_player: PlayerId },

    GameWon { player: PlayerId },
}
