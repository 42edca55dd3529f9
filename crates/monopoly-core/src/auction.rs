//! Time-boxed auctions over an unowned square.
//!
//! Expiry is lazy: nothing fires when the window closes. Every mutating call
//! checks `resolve_expired_auction` first, so an auction can sit expired until
//! the next action arrives.

use crate::actions::GameEvent;
use crate::board::{PlayerId, SquareId};
use crate::game::{GameError, GameState, MAX_TRANSFER};
use serde::{Deserialize, Serialize};

/// Length of the bidding window
pub const AUCTION_WINDOW_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub player_id: PlayerId,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub square_id: SquareId,
    /// Every bid in submission order, qualifying or not
    pub bids: Vec<Bid>,
    pub high_bid: i64,
    pub high_bidder: Option<PlayerId>,
    /// Epoch milliseconds
    pub ends_at: u64,
}

impl Auction {
    pub fn new(square_id: SquareId, now: u64) -> Self {
        Self {
            square_id,
            bids: Vec::new(),
            high_bid: 0,
            high_bidder: None,
            ends_at: now + AUCTION_WINDOW_MS,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.ends_at
    }
}

impl GameState {
    /// Open a 30 second auction for an unowned square
    pub fn start_auction(&mut self, square: SquareId, now: u64) -> Result<(), GameError> {
        if self.auction.is_some() {
            return Err(GameError::AuctionInProgress);
        }
        let sq = self.square(square).ok_or(GameError::NoSuchSquare)?;
        if !sq.kind.is_purchasable() || sq.owner.is_some() {
            return Err(GameError::NotPurchasable);
        }

        let auction = Auction::new(square, now);
        let ends_at = auction.ends_at;
        self.auction = Some(auction);
        self.record(GameEvent::AuctionStarted { square, ends_at });
        Ok(())
    }

    /// Record a bid. Only an affordable bid above the current high moves the lead.
    pub fn place_bid(&mut self, actor: PlayerId, amount: i64) -> Result<(), GameError> {
        let money = self.player(actor).ok_or(GameError::UnknownPlayer)?.money;
        let auction = self.auction.as_mut().ok_or(GameError::NoAuction)?;
        if amount <= 0 || amount > MAX_TRANSFER {
            return Err(GameError::InvalidAmount);
        }

        auction.bids.push(Bid {
            player_id: actor,
            amount,
        });
        if amount > auction.high_bid && money >= amount {
            auction.high_bid = amount;
            auction.high_bidder = Some(actor);
        }

        self.record(GameEvent::BidPlaced {
            player: actor,
            amount,
        });
        Ok(())
    }

    /// Close the auction if its window has passed. Returns true if it closed.
    ///
    /// The high bidder must still afford the bid and the square must still be
    /// unowned; otherwise the square stays with the bank.
    pub fn resolve_expired_auction(&mut self, now: u64) -> bool {
        if !self.auction.as_ref().is_some_and(|a| a.is_expired(now)) {
            return false;
        }
        let Some(auction) = self.auction.take() else {
            return false;
        };
        let square = auction.square_id;

        let unowned = self.square(square).is_some_and(|s| s.owner.is_none());
        let winner = auction.high_bidder.filter(|&bidder| {
            unowned
                && self
                    .player(bidder)
                    .is_some_and(|p| !p.bankrupt && p.can_afford(auction.high_bid))
        });

        match winner {
            Some(player) => {
                let amount = auction.high_bid;
                self.pay(player, amount, None);
                self.squares[square as usize].owner = Some(player);
                self.record(GameEvent::AuctionWon {
                    player,
                    square,
                    amount,
                });
            }
            None => self.record(GameEvent::AuctionUnsold { square }),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::NewPlayer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn game() -> GameState {
        let mut rng = StdRng::seed_from_u64(5);
        let mut game = GameState::new(&mut rng);
        game.add_player(NewPlayer::human("Alice")).unwrap();
        game.add_player(NewPlayer::human("Bob")).unwrap();
        game
    }

    #[test]
    fn test_only_one_auction_at_a_time() {
        let mut game = game();
        game.start_auction(1, 0).unwrap();
        assert_eq!(game.start_auction(3, 0), Err(GameError::AuctionInProgress));
    }

    #[test]
    fn test_owned_or_special_squares_cannot_be_auctioned() {
        let mut game = game();
        game.squares[1].owner = Some(1);
        assert_eq!(game.start_auction(1, 0), Err(GameError::NotPurchasable));
        assert_eq!(game.start_auction(0, 0), Err(GameError::NotPurchasable));
        assert_eq!(game.start_auction(40, 0), Err(GameError::NoSuchSquare));
    }

    #[test]
    fn test_unaffordable_bid_is_kept_but_does_not_lead() {
        let mut game = game();
        game.start_auction(39, 0).unwrap();
        game.place_bid(1, 100).unwrap();
        game.place_bid(2, 5000).unwrap();

        let auction = game.auction.as_ref().unwrap();
        assert_eq!(auction.bids.len(), 2);
        assert_eq!(auction.high_bid, 100);
        assert_eq!(auction.high_bidder, Some(1));
        assert_eq!(game.place_bid(2, 0), Err(GameError::InvalidAmount));
        assert_eq!(game.place_bid(2, i64::MAX), Err(GameError::InvalidAmount));
        assert_eq!(game.auction.as_ref().unwrap().bids.len(), 2);
    }

    #[test]
    fn test_auction_stays_open_before_deadline() {
        let mut game = game();
        game.start_auction(39, 1_000).unwrap();
        assert!(!game.resolve_expired_auction(1_000 + AUCTION_WINDOW_MS - 1));
        assert!(game.auction.is_some());
    }

    #[test]
    fn test_expired_auction_without_bids_leaves_square_unowned() {
        let mut game = game();
        game.start_auction(39, 0).unwrap();
        assert!(game.resolve_expired_auction(AUCTION_WINDOW_MS));
        assert!(game.auction.is_none());
        assert_eq!(game.squares[39].owner, None);
    }

    #[test]
    fn test_winner_must_still_afford_bid() {
        let mut game = game();
        game.start_auction(39, 0).unwrap();
        game.place_bid(1, 300).unwrap();
        game.players[0].money = 100;

        game.resolve_expired_auction(AUCTION_WINDOW_MS);
        assert_eq!(game.squares[39].owner, None);
        assert_eq!(game.player(1).unwrap().money, 100);
    }
}
