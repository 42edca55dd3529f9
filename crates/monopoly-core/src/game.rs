//! Core game state machine.
//!
//! This module contains the main `GameState` struct and the turn logic:
//! dice, movement, landing resolution, jail, payments, property management
//! and end-of-game detection. Auctions and trades live in their own modules
//! but operate on the same state.

use crate::actions::{GameAction, GameEvent, JailRelease};
use crate::auction::Auction;
use crate::board::{
    distance_forward, group_members, standard_board, ColorGroup, PlayerId, Square, SquareId,
    SquareKind, BOARD_SIZE, GO_BONUS, HOTEL, JAIL_FINE, JAIL_POSITION,
};
use crate::bot;
use crate::cards::{keeper_index, Card, CardAction, Deck, DrawPile};
use crate::player::{Controller, JailStatus, Player, PALETTE};
use crate::trade::Trade;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Seats per game
pub const MAX_PLAYERS: usize = 8;

/// Chat entries kept; the oldest are evicted first
pub const CHAT_HISTORY_LIMIT: usize = 200;

/// Largest amount a player may give, bid or put into a trade
pub const MAX_TRANSFER: i64 = 1_000_000_000;

/// Consecutive doubles that send a player to jail
const DOUBLES_LIMIT: u8 = 3;

/// Failed jail rolls before the fine is forced
const JAIL_ROLL_LIMIT: u8 = 3;

/// Where the current player is within their turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnPhase {
    /// The current player may roll (first roll, or a doubles bonus roll)
    AwaitingRoll,
    /// No more rolls this turn; the player may manage property and end the turn
    TurnOver,
}

/// Game lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum GameStatus {
    Open,
    Finished {
        #[serde(rename = "winnerId")]
        winner_id: PlayerId,
    },
}

/// Errors that can occur when applying actions
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid action for current phase")]
    InvalidPhase,

    #[error("Unknown player")]
    UnknownPlayer,

    #[error("Player is bankrupt")]
    Bankrupt,

    #[error("No such square")]
    NoSuchSquare,

    #[error("Square cannot be bought")]
    NotPurchasable,

    #[error("Cannot afford this")]
    CannotAfford,

    #[error("You do not own this square")]
    NotOwner,

    #[error("Houses need the whole color group")]
    NoMonopoly,

    #[error("Square is mortgaged")]
    Mortgaged,

    #[error("Square is not mortgaged")]
    NotMortgaged,

    #[error("Square has houses")]
    HasHouses,

    #[error("Square has no houses")]
    NoHouses,

    #[error("Square already has a hotel")]
    MaxHouses,

    #[error("Houses cannot be built here")]
    NotBuildable,

    #[error("Player is not in jail")]
    NotInJail,

    #[error("No get-out-of-jail-free card")]
    NoJailCard,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Game is full")]
    GameFull,

    #[error("Game is over")]
    GameOver,

    #[error("An auction is already running")]
    AuctionInProgress,

    #[error("No auction is running")]
    NoAuction,

    #[error("No active trade")]
    NoActiveTrade,

    #[error("Only the recipient can answer this trade")]
    NotTradeRecipient,

    #[error("Invalid trade")]
    InvalidTrade,
}

/// One line of the append-only game log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub turn: u32,
    pub message: String,
}

/// One chat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    /// Display name of the speaker
    pub speaker: String,
    /// Seated player that spoke, if any
    pub player_id: Option<PlayerId>,
    pub text: String,
    /// Epoch milliseconds
    pub at: u64,
}

/// Parameters for seating a new player
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub name: String,
    pub color: Option<String>,
    pub account: Option<String>,
    pub controller: Controller,
}

impl NewPlayer {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            account: None,
            controller: Controller::Human,
        }
    }

    pub fn npc(name: impl Into<String>, delegate: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            account: None,
            controller: Controller::Npc {
                delegate: delegate.into(),
            },
        }
    }
}

/// The complete game state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Seated players in turn order
    pub players: Vec<Player>,
    /// The 40 squares in board order
    pub squares: Vec<Square>,
    pub chance_pile: DrawPile,
    pub community_chest_pile: DrawPile,
    /// Undefined only before the first join
    pub current_player_id: Option<PlayerId>,
    pub phase: TurnPhase,
    pub last_dice: Option<(u8, u8)>,
    /// Doubles rolled in a row by the current player
    pub doubles_streak: u8,
    /// Turn counter, never decreases
    pub turn: u32,
    pub log: Vec<LogEntry>,
    pub chat: VecDeque<ChatEntry>,
    pub auction: Option<Auction>,
    pub trade: Option<Trade>,
    #[serde(flatten)]
    pub status: GameStatus,
    /// Events recorded since the last `take_events`
    #[serde(skip)]
    events: Vec<GameEvent>,
}

impl GameState {
    /// Create a fresh game with shuffled decks and no players
    pub fn new(rng: &mut dyn RngCore) -> Self {
        let mut game = Self {
            players: Vec::new(),
            squares: standard_board(),
            chance_pile: DrawPile::shuffled(Deck::Chance, rng),
            community_chest_pile: DrawPile::shuffled(Deck::CommunityChest, rng),
            current_player_id: None,
            phase: TurnPhase::AwaitingRoll,
            last_dice: None,
            doubles_streak: 0,
            turn: 0,
            log: Vec::new(),
            chat: VecDeque::new(),
            auction: None,
            trade: None,
            status: GameStatus::Open,
            events: Vec::new(),
        };
        game.record(GameEvent::WaitingForPlayers);
        game.events.clear();
        game
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    // ==================== Queries ====================

    /// Get a player by ID
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn square(&self, id: SquareId) -> Option<&Square> {
        self.squares.get(id as usize)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.current_player_id.and_then(|id| self.player(id))
    }

    /// Check if the game is finished
    pub fn is_finished(&self) -> bool {
        matches!(self.status, GameStatus::Finished { .. })
    }

    /// Get the winner if the game is finished
    pub fn winner(&self) -> Option<PlayerId> {
        match self.status {
            GameStatus::Finished { winner_id } => Some(winner_id),
            GameStatus::Open => None,
        }
    }

    /// Player bound to an external account, for reattachment
    pub fn player_by_account(&self, account: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|p| p.account.as_deref() == Some(account))
            .map(|p| p.id)
    }

    /// Does `player` own every square of `group`?
    pub fn owns_group(&self, player: PlayerId, group: ColorGroup) -> bool {
        group_members(group).all(|id| self.squares[id as usize].owner == Some(player))
    }

    /// Squares of a kind owned by a player
    pub fn owned_count(&self, player: PlayerId, kind: SquareKind) -> usize {
        self.squares
            .iter()
            .filter(|s| s.kind == kind && s.owner == Some(player))
            .count()
    }

    /// Rent charged on a square given the last dice roll
    pub fn rent_for(&self, square: SquareId) -> i64 {
        let Some(sq) = self.square(square) else {
            return 0;
        };
        let Some(owner) = sq.owner else {
            return 0;
        };
        match sq.kind {
            SquareKind::Property => sq.rent[sq.houses.min(HOTEL) as usize],
            SquareKind::Railroad => {
                let owned = self.owned_count(owner, SquareKind::Railroad).max(1);
                25 * (1 << (owned - 1))
            }
            SquareKind::Utility => {
                let dice_sum = self.last_dice.map_or(0, |(a, b)| (a + b) as i64);
                let multiplier = if self.owned_count(owner, SquareKind::Utility) == 1 {
                    4
                } else {
                    10
                };
                dice_sum * multiplier
            }
            _ => 0,
        }
    }

    /// Drain events recorded since the previous call
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn record(&mut self, event: GameEvent) {
        let message = self.describe(&event);
        self.log.push(LogEntry {
            turn: self.turn,
            message,
        });
        self.events.push(event);
    }

    fn name_of(&self, id: PlayerId) -> &str {
        self.player(id).map_or("someone", |p| p.name.as_str())
    }

    fn square_name(&self, id: SquareId) -> &str {
        self.square(id).map_or("somewhere", |s| s.name.as_str())
    }

    /// Human-readable log line for an event
    pub fn describe(&self, event: &GameEvent) -> String {
        match event {
            GameEvent::WaitingForPlayers => "Waiting for players...".to_string(),
            GameEvent::PlayerJoined { player } => format!("{} joined the game", self.name_of(*player)),
            GameEvent::DiceRolled { player, dice } => format!(
                "{} rolled {} and {}",
                self.name_of(*player),
                dice.0,
                dice.1
            ),
            GameEvent::Moved { player, to, .. } => format!(
                "{} moved to {}",
                self.name_of(*player),
                self.square_name(*to)
            ),
            GameEvent::PassedGo { player, bonus } => {
                format!("{} passed GO and collected ${}", self.name_of(*player), bonus)
            }
            GameEvent::PurchaseAvailable { player, square, price } => format!(
                "{} can buy {} for ${}",
                self.name_of(*player),
                self.square_name(*square),
                price
            ),
            GameEvent::PropertyBought { player, square, price } => format!(
                "{} bought {} for ${}",
                self.name_of(*player),
                self.square_name(*square),
                price
            ),
            GameEvent::RentPaid { payer, owner, square, amount } => format!(
                "{} paid ${} rent to {} for {}",
                self.name_of(*payer),
                amount,
                self.name_of(*owner),
                self.square_name(*square)
            ),
            GameEvent::TaxPaid { player, square, amount } => format!(
                "{} paid ${} {}",
                self.name_of(*player),
                amount,
                self.square_name(*square)
            ),
            GameEvent::CardDrawn { player, deck, text } => {
                format!("{} drew {}: {}", self.name_of(*player), deck.label(), text)
            }
            GameEvent::SentToJail { player } => format!("{} went to jail", self.name_of(*player)),
            GameEvent::StillInJail { player, turns } => format!(
                "{} stays in jail ({} of {} attempts)",
                self.name_of(*player),
                turns,
                JAIL_ROLL_LIMIT
            ),
            GameEvent::ReleasedFromJail { player, how } => {
                let how = match how {
                    JailRelease::Doubles => "by rolling doubles",
                    JailRelease::PaidFine => "by paying the fine",
                    JailRelease::Card => "with a Get Out of Jail Free card",
                    JailRelease::ForcedFine => "after paying the fine on the third attempt",
                };
                format!("{} left jail {}", self.name_of(*player), how)
            }
            GameEvent::SpeedingToJail { player } => format!(
                "{} rolled doubles three times in a row",
                self.name_of(*player)
            ),
            GameEvent::PlayerBankrupt { player, money } => {
                format!("{} is bankrupt (${})", self.name_of(*player), money)
            }
            GameEvent::HouseBuilt { player, square, houses } => format!(
                "{} built on {} ({} houses)",
                self.name_of(*player),
                self.square_name(*square),
                houses
            ),
            GameEvent::HouseSold { player, square, houses } => format!(
                "{} sold a house on {} ({} houses)",
                self.name_of(*player),
                self.square_name(*square),
                houses
            ),
            GameEvent::Mortgaged { player, square, amount } => format!(
                "{} mortgaged {} for ${}",
                self.name_of(*player),
                self.square_name(*square),
                amount
            ),
            GameEvent::Unmortgaged { player, square, amount } => format!(
                "{} unmortgaged {} for ${}",
                self.name_of(*player),
                self.square_name(*square),
                amount
            ),
            GameEvent::MoneyGiven { from, to, amount } => format!(
                "{} gave ${} to {}",
                self.name_of(*from),
                amount,
                self.name_of(*to)
            ),
            GameEvent::PropertyTransferred { from, to, square } => format!(
                "{} gave {} to {}",
                self.name_of(*from),
                self.square_name(*square),
                self.name_of(*to)
            ),
            GameEvent::TradeProposed { from, to } => format!(
                "{} proposed a trade to {}",
                self.name_of(*from),
                self.name_of(*to)
            ),
            GameEvent::TradeAccepted { from, to } => format!(
                "{} accepted a trade from {}",
                self.name_of(*to),
                self.name_of(*from)
            ),
            GameEvent::TradeRejected { from, to } => format!(
                "{} rejected a trade from {}",
                self.name_of(*to),
                self.name_of(*from)
            ),
            GameEvent::AuctionStarted { square, .. } => {
                format!("Auction started for {}", self.square_name(*square))
            }
            GameEvent::BidPlaced { player, amount } => {
                format!("{} bid ${}", self.name_of(*player), amount)
            }
            GameEvent::AuctionWon { player, square, amount } => format!(
                "{} won {} at auction for ${}",
                self.name_of(*player),
                self.square_name(*square),
                amount
            ),
            GameEvent::AuctionUnsold { square } => {
                format!("Nobody bought {} at auction", self.square_name(*square))
            }
            GameEvent::TurnEnded { next_player, .. } => {
                format!("It is now {}'s turn", self.name_of(*next_player))
            }
            GameEvent::GameWon { player } => format!("{} wins the game!", self.name_of(*player)),
        }
    }

    // ==================== Seating ====================

    /// Seat a new player. The first player seated becomes the current player.
    pub fn add_player(&mut self, new: NewPlayer) -> Result<PlayerId, GameError> {
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::GameFull);
        }

        let id = self.players.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let name = self.unique_name(&new.name);
        let color = new
            .color
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| PALETTE[self.players.len() % PALETTE.len()].to_string());

        let mut player = Player::new(id, name, color, new.controller);
        player.account = new.account;
        self.players.push(player);

        if self.current_player_id.is_none() {
            self.current_player_id = Some(id);
            self.phase = TurnPhase::AwaitingRoll;
        }

        self.record(GameEvent::PlayerJoined { player: id });
        Ok(id)
    }

    /// `requested`, or `requested 2`, `requested 3`, ... if the name is taken
    pub fn unique_name(&self, requested: &str) -> String {
        let base = match requested.trim() {
            "" => "Player",
            trimmed => trimmed,
        };
        let taken = |candidate: &str| {
            let candidate = candidate.to_lowercase();
            self.players.iter().any(|p| p.name.to_lowercase() == candidate)
        };

        if !taken(base) {
            return base.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{} {}", base, suffix);
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    // ==================== Dispatch ====================

    /// Apply an action to the game state
    pub fn apply_action(
        &mut self,
        actor: PlayerId,
        action: GameAction,
        now: u64,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<GameEvent>, GameError> {
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        let player = self.player(actor).ok_or(GameError::UnknownPlayer)?;
        if player.bankrupt {
            return Err(GameError::Bankrupt);
        }

        // An expired auction closes before anything else can touch it
        self.resolve_expired_auction(now);

        let result = match action {
            GameAction::RollDice => self.roll_dice(actor, rng),
            GameAction::BuyProperty => self.buy_property(actor),
            GameAction::EndTurn => self.end_turn(actor, rng),
            GameAction::PayJailFine => self.pay_jail_fine(actor),
            GameAction::UseJailCard => self.use_jail_card(actor),
            GameAction::BuildHouse { square } => self.build_house(actor, square),
            GameAction::SellHouse { square } => self.sell_house(actor, square),
            GameAction::Mortgage { square } => self.mortgage(actor, square),
            GameAction::Unmortgage { square } => self.unmortgage(actor, square),
            GameAction::GiveMoney { to, amount } => self.give_money(actor, to, amount),
            GameAction::TransferProperty { square, to } => {
                self.transfer_property(actor, square, to)
            }
            GameAction::ProposeTrade { to, offer, request } => self
                .propose_trade(actor, to, offer, request)
                .map(|()| bot::answer_trade(self)),
            GameAction::AcceptTrade => self.accept_trade(actor),
            GameAction::RejectTrade => self.reject_trade(actor),
            GameAction::StartAuction { square } => self
                .start_auction(square, now)
                .map(|()| bot::bid_in_auction(self)),
            GameAction::PlaceBid { amount } => self
                .place_bid(actor, amount)
                .map(|()| bot::bid_in_auction(self)),
        };

        self.settle(now, rng);
        result.map(|()| self.take_events())
    }

    /// Post-action bookkeeping: end-of-game check, lazy auction expiry, moving
    /// the turn off a bankrupt current player and playing any non-human turns
    /// that are due.
    pub fn settle(&mut self, now: u64, rng: &mut dyn RngCore) {
        self.check_game_over();
        if self.is_finished() {
            return;
        }
        self.resolve_expired_auction(now);

        if self.current_player().is_some_and(|p| p.bankrupt) {
            self.pass_turn();
        }
        if self.current_player().is_some_and(|p| !p.is_human()) {
            self.run_npc_turns(rng);
        }
        self.check_game_over();
    }

    fn check_game_over(&mut self) {
        if self.is_finished() || self.players.len() < 2 {
            return;
        }
        let mut solvent = self.players.iter().filter(|p| !p.bankrupt);
        let (Some(survivor), None) = (solvent.next(), solvent.next()) else {
            return;
        };
        let winner_id = survivor.id;

        self.status = GameStatus::Finished { winner_id };
        self.current_player_id = Some(winner_id);
        self.auction = None;
        self.trade = None;
        self.record(GameEvent::GameWon { player: winner_id });
    }

    fn ensure_current(&self, actor: PlayerId) -> Result<(), GameError> {
        if self.current_player_id != Some(actor) {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    // ==================== Dice and Movement ====================

    /// Roll two dice for the current player
    pub fn roll_dice(&mut self, actor: PlayerId, rng: &mut dyn RngCore) -> Result<(), GameError> {
        let dice = (rng.gen_range(1..=6), rng.gen_range(1..=6));
        self.apply_roll(actor, dice, rng)
    }

    /// Resolve a roll with known dice values
    pub fn apply_roll(
        &mut self,
        actor: PlayerId,
        dice: (u8, u8),
        rng: &mut dyn RngCore,
    ) -> Result<(), GameError> {
        self.ensure_current(actor)?;
        if self.phase != TurnPhase::AwaitingRoll {
            return Err(GameError::InvalidPhase);
        }
        let jail = self.player(actor).ok_or(GameError::UnknownPlayer)?.jail;

        self.last_dice = Some(dice);
        self.record(GameEvent::DiceRolled { player: actor, dice });

        let doubles = dice.0 == dice.1;
        let total = dice.0 + dice.1;

        match jail {
            JailStatus::Jailed { turns } => {
                // Leaving jail never grants a bonus roll
                self.phase = TurnPhase::TurnOver;
                if doubles {
                    self.release_from_jail(actor, JailRelease::Doubles);
                    self.move_player(actor, total, rng);
                } else if turns + 1 >= JAIL_ROLL_LIMIT {
                    self.pay(actor, JAIL_FINE, None);
                    self.release_from_jail(actor, JailRelease::ForcedFine);
                    self.move_player(actor, total, rng);
                } else {
                    if let Some(p) = self.player_mut(actor) {
                        p.jail = JailStatus::Jailed { turns: turns + 1 };
                    }
                    self.record(GameEvent::StillInJail {
                        player: actor,
                        turns: turns + 1,
                    });
                }
            }
            JailStatus::Free => {
                if doubles {
                    self.doubles_streak += 1;
                    if self.doubles_streak >= DOUBLES_LIMIT {
                        self.record(GameEvent::SpeedingToJail { player: actor });
                        self.send_to_jail(actor);
                        return Ok(());
                    }
                    self.phase = TurnPhase::AwaitingRoll;
                } else {
                    self.doubles_streak = 0;
                    self.phase = TurnPhase::TurnOver;
                }
                // Landing may still override the phase (e.g. Go To Jail)
                self.move_player(actor, total, rng);
            }
        }

        Ok(())
    }

    /// Move a player forward, paying the GO bonus on wrap, then resolve the landing
    pub fn move_player(&mut self, player: PlayerId, amount: u8, rng: &mut dyn RngCore) {
        let Some(p) = self.player_mut(player) else {
            return;
        };
        let from = p.position;
        let to = ((from as u16 + amount as u16) % BOARD_SIZE as u16) as SquareId;
        p.position = to;

        let passed_go = to < from;
        if passed_go {
            p.money += GO_BONUS;
        }

        self.record(GameEvent::Moved { player, from, to });
        if passed_go {
            self.record(GameEvent::PassedGo {
                player,
                bonus: GO_BONUS,
            });
        }

        self.resolve_landing(player, rng);
    }

    fn resolve_landing(&mut self, player: PlayerId, rng: &mut dyn RngCore) {
        let Some(position) = self.player(player).map(|p| p.position) else {
            return;
        };
        let square = &self.squares[position as usize];
        let (kind, owner, mortgaged, price) = (square.kind, square.owner, square.mortgaged, square.price);

        match kind {
            SquareKind::Property | SquareKind::Railroad | SquareKind::Utility => match owner {
                None => self.record(GameEvent::PurchaseAvailable {
                    player,
                    square: position,
                    price,
                }),
                Some(owner) if owner != player && !mortgaged => {
                    let owner_solvent = self.player(owner).is_some_and(|o| !o.bankrupt);
                    let rent = self.rent_for(position);
                    if owner_solvent && rent > 0 {
                        self.record(GameEvent::RentPaid {
                            payer: player,
                            owner,
                            square: position,
                            amount: rent,
                        });
                        self.pay(player, rent, Some(owner));
                    }
                }
                Some(_) => {}
            },
            SquareKind::IncomeTax | SquareKind::LuxuryTax => {
                let amount = kind.tax().unwrap_or_default();
                self.record(GameEvent::TaxPaid {
                    player,
                    square: position,
                    amount,
                });
                self.pay(player, amount, None);
            }
            SquareKind::GoToJail => self.send_to_jail(player),
            SquareKind::Chance => self.draw_card(player, Deck::Chance, rng),
            SquareKind::CommunityChest => self.draw_card(player, Deck::CommunityChest, rng),
            SquareKind::Go | SquareKind::Jail | SquareKind::FreeParking => {}
        }
    }

    // ==================== Jail ====================

    /// Put a player in jail; ends the turn if it is theirs
    pub fn send_to_jail(&mut self, player: PlayerId) {
        let Some(p) = self.player_mut(player) else {
            return;
        };
        p.position = JAIL_POSITION;
        p.jail = JailStatus::Jailed { turns: 0 };

        if self.current_player_id == Some(player) {
            self.doubles_streak = 0;
            self.phase = TurnPhase::TurnOver;
        }
        self.record(GameEvent::SentToJail { player });
    }

    fn release_from_jail(&mut self, player: PlayerId, how: JailRelease) {
        if let Some(p) = self.player_mut(player) {
            p.jail = JailStatus::Free;
        }
        self.record(GameEvent::ReleasedFromJail { player, how });
    }

    fn ensure_can_leave_jail(&self, actor: PlayerId) -> Result<(), GameError> {
        self.ensure_current(actor)?;
        if self.phase != TurnPhase::AwaitingRoll {
            return Err(GameError::InvalidPhase);
        }
        if !self.player(actor).is_some_and(|p| p.in_jail()) {
            return Err(GameError::NotInJail);
        }
        Ok(())
    }

    /// Pay the fine before rolling
    pub fn pay_jail_fine(&mut self, actor: PlayerId) -> Result<(), GameError> {
        self.ensure_can_leave_jail(actor)?;
        self.pay(actor, JAIL_FINE, None);
        self.release_from_jail(actor, JailRelease::PaidFine);
        Ok(())
    }

    /// Spend a held get-out-of-jail-free card before rolling; the card is discarded
    pub fn use_jail_card(&mut self, actor: PlayerId) -> Result<(), GameError> {
        self.ensure_can_leave_jail(actor)?;
        self.player_mut(actor)
            .and_then(|p| p.take_jail_card())
            .ok_or(GameError::NoJailCard)?;
        self.release_from_jail(actor, JailRelease::Card);
        Ok(())
    }

    // ==================== Cards ====================

    /// Keeper cards of `deck` currently held by a player
    fn held_keepers(&self, deck: Deck) -> Vec<usize> {
        keeper_index(deck)
            .filter(|_| self.players.iter().any(|p| p.jail_card(deck)))
            .into_iter()
            .collect()
    }

    /// Draw from a deck and carry out the card
    pub fn draw_card(&mut self, player: PlayerId, deck: Deck, rng: &mut dyn RngCore) {
        let held = self.held_keepers(deck);
        let pile = match deck {
            Deck::Chance => &mut self.chance_pile,
            Deck::CommunityChest => &mut self.community_chest_pile,
        };
        let index = pile.draw(deck, &held, rng);
        let card = &deck.cards()[index];

        self.record(GameEvent::CardDrawn {
            player,
            deck,
            text: card.text.to_string(),
        });
        self.execute_card(player, deck, card, rng);
    }

    /// Carry out a card's action for `player`
    pub fn execute_card(&mut self, player: PlayerId, deck: Deck, card: &Card, rng: &mut dyn RngCore) {
        match card.action {
            CardAction::Collect(amount) => {
                if let Some(p) = self.player_mut(player) {
                    p.money += amount;
                }
            }
            CardAction::Pay(amount) => self.pay(player, amount, None),
            CardAction::CollectFromAll(amount) => {
                for other in self.other_solvent_players(player) {
                    self.pay(other, amount, Some(player));
                }
            }
            CardAction::PayAll(amount) => {
                for other in self.other_solvent_players(player) {
                    self.pay(player, amount, Some(other));
                }
            }
            CardAction::Advance(target) => {
                let Some(from) = self.player(player).map(|p| p.position) else {
                    return;
                };
                self.move_player(player, distance_forward(from, target), rng);
            }
            CardAction::GoToJail => self.send_to_jail(player),
            CardAction::GetOutOfJailFree => {
                if let Some(p) = self.player_mut(player) {
                    p.set_jail_card(deck, true);
                }
            }
        }
    }

    fn other_solvent_players(&self, player: PlayerId) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.id != player && !p.bankrupt)
            .map(|p| p.id)
            .collect()
    }

    // ==================== Money ====================

    /// Debit `payer` unconditionally and credit `recipient` (the bank when `None`).
    /// A negative balance afterwards marks the payer bankrupt.
    pub fn pay(&mut self, payer: PlayerId, amount: i64, recipient: Option<PlayerId>) {
        if let Some(recipient) = recipient {
            if self.player(recipient).is_none() {
                return;
            }
        }
        let Some(p) = self.player_mut(payer) else {
            return;
        };
        p.money = p.money.saturating_sub(amount);
        let went_bankrupt = p.money < 0 && !p.bankrupt;
        if went_bankrupt {
            p.bankrupt = true;
        }
        let balance = p.money;

        if let Some(r) = recipient.and_then(|id| self.player_mut(id)) {
            r.money = r.money.saturating_add(amount);
        }
        if went_bankrupt {
            self.record(GameEvent::PlayerBankrupt {
                player: payer,
                money: balance,
            });
        }
    }

    /// Hand money to another player
    pub fn give_money(&mut self, actor: PlayerId, to: PlayerId, amount: i64) -> Result<(), GameError> {
        if amount <= 0 || amount > MAX_TRANSFER {
            return Err(GameError::InvalidAmount);
        }
        if to == actor || self.player(to).is_none() {
            return Err(GameError::UnknownPlayer);
        }
        self.record(GameEvent::MoneyGiven {
            from: actor,
            to,
            amount,
        });
        self.pay(actor, amount, Some(to));
        Ok(())
    }

    // ==================== Property ====================

    /// Buy the unowned square the player stands on
    pub fn buy_property(&mut self, actor: PlayerId) -> Result<(), GameError> {
        let player = self.player(actor).ok_or(GameError::UnknownPlayer)?;
        let position = player.position;
        let square = &self.squares[position as usize];

        if !square.kind.is_purchasable() || square.owner.is_some() {
            return Err(GameError::NotPurchasable);
        }
        let price = square.price;
        if !player.can_afford(price) {
            return Err(GameError::CannotAfford);
        }

        if let Some(p) = self.player_mut(actor) {
            p.money -= price;
        }
        self.squares[position as usize].owner = Some(actor);
        self.record(GameEvent::PropertyBought {
            player: actor,
            square: position,
            price,
        });
        Ok(())
    }

    fn owned_square(&self, actor: PlayerId, square: SquareId) -> Result<&Square, GameError> {
        let sq = self.square(square).ok_or(GameError::NoSuchSquare)?;
        if sq.owner != Some(actor) {
            return Err(GameError::NotOwner);
        }
        Ok(sq)
    }

    /// Checks shared by building and selling: whole group owned, target unmortgaged
    fn buildable_square(&self, actor: PlayerId, square: SquareId) -> Result<&Square, GameError> {
        let sq = self.owned_square(actor, square)?;
        let group = sq.group.ok_or(GameError::NotBuildable)?;
        if !self.owns_group(actor, group) {
            return Err(GameError::NoMonopoly);
        }
        if sq.mortgaged {
            return Err(GameError::Mortgaged);
        }
        Ok(sq)
    }

    /// Add one house (the fifth is a hotel)
    pub fn build_house(&mut self, actor: PlayerId, square: SquareId) -> Result<(), GameError> {
        let sq = self.buildable_square(actor, square)?;
        if sq.houses >= HOTEL {
            return Err(GameError::MaxHouses);
        }
        let cost = sq.house_cost;
        let player = self.player_mut(actor).ok_or(GameError::UnknownPlayer)?;
        if !player.can_afford(cost) {
            return Err(GameError::CannotAfford);
        }

        player.money -= cost;
        let sq = &mut self.squares[square as usize];
        sq.houses += 1;
        let houses = sq.houses;
        self.record(GameEvent::HouseBuilt {
            player: actor,
            square,
            houses,
        });
        Ok(())
    }

    /// Remove one house for half its cost
    pub fn sell_house(&mut self, actor: PlayerId, square: SquareId) -> Result<(), GameError> {
        let sq = self.buildable_square(actor, square)?;
        if sq.houses == 0 {
            return Err(GameError::NoHouses);
        }
        let refund = sq.house_cost / 2;

        let sq = &mut self.squares[square as usize];
        sq.houses -= 1;
        let houses = sq.houses;
        if let Some(p) = self.player_mut(actor) {
            p.money += refund;
        }
        self.record(GameEvent::HouseSold {
            player: actor,
            square,
            houses,
        });
        Ok(())
    }

    /// Mortgage a bare square for half its price
    pub fn mortgage(&mut self, actor: PlayerId, square: SquareId) -> Result<(), GameError> {
        let sq = self.owned_square(actor, square)?;
        if sq.mortgaged {
            return Err(GameError::Mortgaged);
        }
        if sq.houses > 0 {
            return Err(GameError::HasHouses);
        }
        let amount = sq.mortgage_value();

        self.squares[square as usize].mortgaged = true;
        if let Some(p) = self.player_mut(actor) {
            p.money += amount;
        }
        self.record(GameEvent::Mortgaged {
            player: actor,
            square,
            amount,
        });
        Ok(())
    }

    /// Lift a mortgage for 55% of the price, rounded up
    pub fn unmortgage(&mut self, actor: PlayerId, square: SquareId) -> Result<(), GameError> {
        let sq = self.owned_square(actor, square)?;
        if !sq.mortgaged {
            return Err(GameError::NotMortgaged);
        }
        let amount = sq.unmortgage_cost();
        let player = self.player_mut(actor).ok_or(GameError::UnknownPlayer)?;
        if !player.can_afford(amount) {
            return Err(GameError::CannotAfford);
        }

        player.money -= amount;
        self.squares[square as usize].mortgaged = false;
        self.record(GameEvent::Unmortgaged {
            player: actor,
            square,
            amount,
        });
        Ok(())
    }

    /// Hand an owned square (with its houses and mortgage) to another player
    pub fn transfer_property(
        &mut self,
        actor: PlayerId,
        square: SquareId,
        to: PlayerId,
    ) -> Result<(), GameError> {
        self.owned_square(actor, square)?;
        let recipient = self.player(to).ok_or(GameError::UnknownPlayer)?;
        if to == actor || recipient.bankrupt {
            return Err(GameError::UnknownPlayer);
        }

        self.squares[square as usize].owner = Some(to);
        self.record(GameEvent::PropertyTransferred {
            from: actor,
            to,
            square,
        });
        Ok(())
    }

    // ==================== Turn Management ====================

    /// End the current turn. A bankrupt current player may always end it.
    pub fn end_turn(&mut self, actor: PlayerId, rng: &mut dyn RngCore) -> Result<(), GameError> {
        self.ensure_current(actor)?;
        let bankrupt = self.player(actor).map_or(true, |p| p.bankrupt);
        if self.phase != TurnPhase::TurnOver && !bankrupt {
            return Err(GameError::InvalidPhase);
        }

        self.pass_turn();
        self.run_npc_turns(rng);
        Ok(())
    }

    /// Advance to the next solvent player without running any non-human turns
    pub(crate) fn pass_turn(&mut self) {
        let Some(current) = self.current_player_id else {
            return;
        };
        let next = self.next_solvent_after(current);

        self.current_player_id = Some(next);
        self.turn += 1;
        self.phase = TurnPhase::AwaitingRoll;
        self.doubles_streak = 0;
        self.record(GameEvent::TurnEnded {
            player: current,
            next_player: next,
        });
    }

    fn next_solvent_after(&self, current: PlayerId) -> PlayerId {
        let count = self.players.len();
        let start = self
            .players
            .iter()
            .position(|p| p.id == current)
            .unwrap_or(0);
        (1..=count)
            .map(|offset| &self.players[(start + offset) % count])
            .find(|p| !p.bankrupt)
            .map_or(current, |p| p.id)
    }

    /// Play out consecutive non-human turns, at most one lap of the table
    fn run_npc_turns(&mut self, rng: &mut dyn RngCore) {
        for _ in 0..self.players.len() {
            self.check_game_over();
            if self.is_finished() {
                return;
            }
            let Some(current) = self.current_player() else {
                return;
            };
            if current.is_human() || current.bankrupt {
                return;
            }
            let id = current.id;

            bot::take_turn(self, id, rng);
            self.check_game_over();
            if self.is_finished() {
                return;
            }
            self.pass_turn();
        }
    }

    // ==================== Chat ====================

    /// Append a chat line, evicting the oldest beyond the history limit
    pub fn push_chat(&mut self, entry: ChatEntry) {
        self.chat.push_back(entry);
        while self.chat.len() > CHAT_HISTORY_LIMIT {
            self.chat.pop_front();
        }
    }
}
