//! Non-human players.
//!
//! Decisions go through the [`Strategy`] trait, so the turn driver does not
//! care how a choice is made. Three built-in tiers:
//! - Easy: buys whatever it can afford and rolls its way out of jail
//! - Medium: keeps a cash reserve and stretches only to finish a color group
//! - Hard: blocks rivals, builds houses and pays out of jail while the board is open

use crate::board::{group_members, PlayerId, SquareId, HOTEL, JAIL_FINE};
use crate::game::{GameState, TurnPhase};
use crate::trade::{Trade, TradeBundle};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A turn never holds more than three rolls: the third doubles goes to jail
const MAX_ROLLS: usize = 3;

/// Houses a hard bot puts up in one turn
const MAX_BUILDS_PER_TURN: usize = 3;

/// Bot difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotDifficulty {
    Easy,
    Medium,
    Hard,
}

impl BotDifficulty {
    /// Map a delegate name to a tier; unknown names play as medium
    pub fn from_delegate(delegate: &str) -> Self {
        match delegate.trim().to_ascii_lowercase().as_str() {
            "easy" => BotDifficulty::Easy,
            "hard" => BotDifficulty::Hard,
            _ => BotDifficulty::Medium,
        }
    }

    /// Cash the bot tries to keep on hand
    fn reserve(self) -> i64 {
        match self {
            BotDifficulty::Easy => 0,
            BotDifficulty::Medium => 200,
            BotDifficulty::Hard => 150,
        }
    }
}

/// What to do at the start of a jailed turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JailChoice {
    Roll,
    PayFine,
    UseCard,
}

/// Decisions a non-human player has to make
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Buy the unowned square `player` just landed on?
    fn should_buy(&self, game: &GameState, player: PlayerId, square: SquareId) -> bool;

    /// Bid for the square under auction, if at all
    fn auction_bid(&self, game: &GameState, player: PlayerId, square: SquareId) -> Option<i64>;

    fn jail_choice(&self, game: &GameState, player: PlayerId) -> JailChoice;

    /// Accept a trade addressed to this player?
    fn accept_trade(&self, game: &GameState, trade: &Trade) -> bool;

    /// Squares to add one house to at the end of a turn
    fn houses_to_build(&self, _game: &GameState, _player: PlayerId) -> Vec<SquareId> {
        Vec::new()
    }
}

/// Resolve a delegate name to its strategy
pub fn strategy_for(delegate: &str) -> Box<dyn Strategy> {
    Box::new(Bot::new(BotDifficulty::from_delegate(delegate)))
}

/// The built-in heuristic player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bot {
    pub difficulty: BotDifficulty,
}

impl Bot {
    pub fn new(difficulty: BotDifficulty) -> Self {
        Self { difficulty }
    }

    fn money(game: &GameState, player: PlayerId) -> i64 {
        game.player(player).map_or(0, |p| p.money)
    }

    /// Would owning `square` give `player` the whole color group?
    fn completes_group(game: &GameState, player: PlayerId, square: SquareId) -> bool {
        let Some(group) = game.square(square).and_then(|s| s.group) else {
            return false;
        };
        group_members(group)
            .filter(|&id| id != square)
            .all(|id| game.squares[id as usize].owner == Some(player))
    }

    /// Would anyone else complete a color group with `square`?
    fn blocks_rival(game: &GameState, player: PlayerId, square: SquareId) -> bool {
        game.players
            .iter()
            .filter(|p| p.id != player && !p.bankrupt)
            .any(|p| Self::completes_group(game, p.id, square))
    }

    /// Most the bot will pay for `square`
    fn valuation(&self, game: &GameState, player: PlayerId, square: SquareId) -> i64 {
        let price = game.square(square).map_or(0, |s| s.price);
        match self.difficulty {
            BotDifficulty::Easy => price / 2,
            BotDifficulty::Medium => price * 4 / 5,
            BotDifficulty::Hard => {
                if Self::completes_group(game, player, square)
                    || Self::blocks_rival(game, player, square)
                {
                    price * 5 / 4
                } else {
                    price
                }
            }
        }
    }
}

/// Rough worth of one side of a trade
fn bundle_value(game: &GameState, bundle: &TradeBundle) -> i64 {
    let squares: i64 = bundle
        .squares
        .iter()
        .filter_map(|&id| game.square(id))
        .map(|s| {
            let land = if s.mortgaged { s.mortgage_value() } else { s.price };
            land + s.houses as i64 * s.house_cost
        })
        .sum();
    bundle.money + squares + bundle.jail_cards as i64 * JAIL_FINE
}

impl Strategy for Bot {
    fn name(&self) -> &'static str {
        match self.difficulty {
            BotDifficulty::Easy => "easy",
            BotDifficulty::Medium => "medium",
            BotDifficulty::Hard => "hard",
        }
    }

    fn should_buy(&self, game: &GameState, player: PlayerId, square: SquareId) -> bool {
        let Some(price) = game.square(square).map(|s| s.price) else {
            return false;
        };
        let money = Self::money(game, player);
        if money < price {
            return false;
        }
        let left = money - price;

        match self.difficulty {
            BotDifficulty::Easy => true,
            BotDifficulty::Medium => {
                left >= self.difficulty.reserve() || Self::completes_group(game, player, square)
            }
            BotDifficulty::Hard => {
                left >= self.difficulty.reserve()
                    || Self::completes_group(game, player, square)
                    || Self::blocks_rival(game, player, square)
            }
        }
    }

    fn auction_bid(&self, game: &GameState, player: PlayerId, square: SquareId) -> Option<i64> {
        let high = game.auction.as_ref().map_or(0, |a| a.high_bid);
        let budget = Self::money(game, player) - self.difficulty.reserve();
        let bid = self.valuation(game, player, square).min(budget);
        (bid > high).then_some(bid)
    }

    fn jail_choice(&self, game: &GameState, player: PlayerId) -> JailChoice {
        let Some(p) = game.player(player) else {
            return JailChoice::Roll;
        };
        match self.difficulty {
            BotDifficulty::Easy => JailChoice::Roll,
            _ if p.jail_cards() > 0 => JailChoice::UseCard,
            BotDifficulty::Medium => JailChoice::Roll,
            BotDifficulty::Hard => {
                // Early on there is property to grab; later, jail is a safe place to sit
                let for_sale = game
                    .squares
                    .iter()
                    .filter(|s| s.kind.is_purchasable() && s.owner.is_none())
                    .count();
                if for_sale >= 10 && p.money - JAIL_FINE >= self.difficulty.reserve() {
                    JailChoice::PayFine
                } else {
                    JailChoice::Roll
                }
            }
        }
    }

    fn accept_trade(&self, game: &GameState, trade: &Trade) -> bool {
        if Self::money(game, trade.recipient_id) < trade.request.money {
            return false;
        }
        let gain = bundle_value(game, &trade.offer);
        let loss = bundle_value(game, &trade.request);

        match self.difficulty {
            BotDifficulty::Easy => gain >= loss,
            BotDifficulty::Medium => gain > loss,
            BotDifficulty::Hard => {
                let hands_over_group = trade
                    .request
                    .squares
                    .iter()
                    .any(|&id| Self::completes_group(game, trade.initiator_id, id));
                if hands_over_group {
                    gain >= loss * 2
                } else {
                    gain > loss
                }
            }
        }
    }

    fn houses_to_build(&self, game: &GameState, player: PlayerId) -> Vec<SquareId> {
        if self.difficulty != BotDifficulty::Hard {
            return Vec::new();
        }
        let mut candidates: Vec<_> = game
            .squares
            .iter()
            .filter(|s| s.owner == Some(player) && !s.mortgaged && s.houses < HOTEL)
            .filter(|s| s.group.is_some_and(|g| game.owns_group(player, g)))
            .collect();
        candidates.sort_by_key(|s| (s.houses, s.id));

        let mut budget = Self::money(game, player) - self.difficulty.reserve() * 2;
        let mut picks = Vec::new();
        for square in candidates {
            if picks.len() >= MAX_BUILDS_PER_TURN || budget < square.house_cost {
                break;
            }
            budget -= square.house_cost;
            picks.push(square.id);
        }
        picks
    }
}

/// Play one whole turn for a non-human player: leave jail if the strategy
/// says so, roll (following doubles), buy, then build.
pub fn take_turn(game: &mut GameState, player: PlayerId, rng: &mut dyn RngCore) {
    let Some(strategy) = game.player(player).and_then(|p| p.delegate()).map(strategy_for) else {
        return;
    };

    if game.player(player).is_some_and(|p| p.in_jail()) {
        let _ = match strategy.jail_choice(game, player) {
            JailChoice::UseCard => game.use_jail_card(player),
            JailChoice::PayFine => game.pay_jail_fine(player),
            JailChoice::Roll => Ok(()),
        };
    }

    for _ in 0..MAX_ROLLS {
        if game.current_player_id != Some(player) || game.phase != TurnPhase::AwaitingRoll {
            break;
        }
        if game.roll_dice(player, rng).is_err() {
            break;
        }
        let Some(p) = game.player(player) else {
            return;
        };
        if p.bankrupt {
            return;
        }
        let position = p.position;
        let for_sale = game
            .square(position)
            .is_some_and(|s| s.kind.is_purchasable() && s.owner.is_none());
        if for_sale && strategy.should_buy(game, player, position) {
            let _ = game.buy_property(player);
        }
    }

    if game.player(player).is_some_and(|p| !p.bankrupt) {
        for square in strategy.houses_to_build(game, player) {
            let _ = game.build_house(player, square);
        }
    }
}

/// Let a non-human recipient answer the pending trade straight away
pub fn answer_trade(game: &mut GameState) {
    let Some(trade) = game.trade.clone() else {
        return;
    };
    let Some(strategy) = game
        .player(trade.recipient_id)
        .and_then(|p| p.delegate())
        .map(strategy_for)
    else {
        return;
    };

    let recipient = trade.recipient_id;
    let _ = if strategy.accept_trade(game, &trade) {
        game.accept_trade(recipient)
    } else {
        game.reject_trade(recipient)
    };
}

/// Give every solvent non-human player a chance to outbid the current lead
pub fn bid_in_auction(game: &mut GameState) {
    let Some(square) = game.auction.as_ref().map(|a| a.square_id) else {
        return;
    };
    let bidders: Vec<(PlayerId, Box<dyn Strategy>)> = game
        .players
        .iter()
        .filter(|p| !p.bankrupt)
        .filter_map(|p| p.delegate().map(|d| (p.id, strategy_for(d))))
        .collect();

    for (id, strategy) in bidders {
        let Some(auction) = game.auction.as_ref() else {
            return;
        };
        if auction.high_bidder == Some(id) {
            continue;
        }
        if let Some(amount) = strategy.auction_bid(game, id, square) {
            let _ = game.place_bid(id, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::NewPlayer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn game_with_bot(delegate: &str) -> (GameState, StdRng) {
        let mut rng = StdRng::seed_from_u64(11);
        let mut game = GameState::new(&mut rng);
        game.add_player(NewPlayer::npc("Robo", delegate)).unwrap();
        game.add_player(NewPlayer::human("Alice")).unwrap();
        (game, rng)
    }

    #[test]
    fn test_strategy_registry() {
        assert_eq!(strategy_for("hard").name(), "hard");
        assert_eq!(strategy_for(" Easy ").name(), "easy");
        assert_eq!(strategy_for("something-else").name(), "medium");
    }

    #[test]
    fn test_easy_buys_whatever_it_can_afford() {
        let (mut game, _) = game_with_bot("easy");
        let bot = Bot::new(BotDifficulty::Easy);
        game.players[0].money = 400;
        assert!(bot.should_buy(&game, 1, 39));
        game.players[0].money = 399;
        assert!(!bot.should_buy(&game, 1, 39));
    }

    #[test]
    fn test_medium_keeps_reserve_unless_group_completes() {
        let (mut game, _) = game_with_bot("medium");
        let bot = Bot::new(BotDifficulty::Medium);
        game.players[0].money = 450;
        assert!(!bot.should_buy(&game, 1, 39));

        game.squares[37].owner = Some(1);
        assert!(bot.should_buy(&game, 1, 39));
    }

    #[test]
    fn test_bot_turn_rolls_and_finishes() {
        let (mut game, mut rng) = game_with_bot("medium");
        take_turn(&mut game, 1, &mut rng);
        assert!(game.last_dice.is_some());
        assert_eq!(game.phase, TurnPhase::TurnOver);
        assert_eq!(game.current_player_id, Some(1));
    }

    #[test]
    fn test_hard_bot_uses_jail_card() {
        let (mut game, mut rng) = game_with_bot("hard");
        game.send_to_jail(1);
        game.phase = TurnPhase::AwaitingRoll;
        game.players[0].chance_jail_card = true;

        take_turn(&mut game, 1, &mut rng);
        assert!(game
            .log
            .iter()
            .any(|e| e.message == "Robo left jail with a Get Out of Jail Free card"));
    }

    #[test]
    fn test_bot_answers_trades() {
        let (mut game, _) = game_with_bot("medium");
        let generous = TradeBundle {
            money: 100,
            ..TradeBundle::default()
        };
        game.propose_trade(2, 1, generous, TradeBundle::default()).unwrap();
        answer_trade(&mut game);
        assert!(game.trade.is_none());
        assert_eq!(game.player(1).unwrap().money, 1600);

        let greedy = TradeBundle {
            money: 100,
            ..TradeBundle::default()
        };
        game.propose_trade(2, 1, TradeBundle::default(), greedy).unwrap();
        answer_trade(&mut game);
        assert!(game.trade.is_none());
        assert_eq!(game.player(1).unwrap().money, 1600);
    }

    #[test]
    fn test_bots_bid_at_auction() {
        let (mut game, _) = game_with_bot("hard");
        game.start_auction(39, 0).unwrap();
        bid_in_auction(&mut game);
        let auction = game.auction.as_ref().unwrap();
        assert_eq!(auction.high_bidder, Some(1));
        assert_eq!(auction.high_bid, 400);
    }

    #[test]
    fn test_hard_bot_builds_on_full_groups() {
        let (mut game, _) = game_with_bot("hard");
        game.squares[37].owner = Some(1);
        game.squares[39].owner = Some(1);
        let bot = Bot::new(BotDifficulty::Hard);
        assert_eq!(bot.houses_to_build(&game, 1), vec![37, 39]);
        assert!(Bot::new(BotDifficulty::Medium)
            .houses_to_build(&game, 1)
            .is_empty());
    }
}
