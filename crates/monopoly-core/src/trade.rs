//! Bilateral trades.
//!
//! One trade slot per game; a new proposal replaces whatever was there.
//! Trades ignore whose turn it is.

use crate::actions::GameEvent;
use crate::board::{PlayerId, SquareId};
use crate::game::{GameError, GameState, MAX_TRANSFER};
use serde::{Deserialize, Serialize};

/// One side of a trade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeBundle {
    #[serde(default)]
    pub money: i64,
    #[serde(default)]
    pub squares: Vec<SquareId>,
    #[serde(default)]
    pub jail_cards: u8,
}

impl TradeBundle {
    pub fn is_empty(&self) -> bool {
        self.money == 0 && self.squares.is_empty() && self.jail_cards == 0
    }
}

/// A pending proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub initiator_id: PlayerId,
    pub recipient_id: PlayerId,
    /// What the initiator gives
    pub offer: TradeBundle,
    /// What the initiator asks for
    pub request: TradeBundle,
}

impl GameState {
    /// Propose a trade, replacing any pending one
    pub fn propose_trade(
        &mut self,
        actor: PlayerId,
        to: PlayerId,
        offer: TradeBundle,
        request: TradeBundle,
    ) -> Result<(), GameError> {
        let recipient = self.player(to).ok_or(GameError::UnknownPlayer)?;
        if to == actor || recipient.bankrupt {
            return Err(GameError::InvalidTrade);
        }
        if offer.money < 0 || request.money < 0 || (offer.is_empty() && request.is_empty()) {
            return Err(GameError::InvalidTrade);
        }
        if offer.money > MAX_TRANSFER || request.money > MAX_TRANSFER {
            return Err(GameError::InvalidAmount);
        }

        self.trade = Some(Trade {
            initiator_id: actor,
            recipient_id: to,
            offer,
            request,
        });
        self.record(GameEvent::TradeProposed { from: actor, to });
        Ok(())
    }

    /// Accept the pending trade (recipient only).
    ///
    /// Squares no longer owned by the giving side are skipped; the rest of the
    /// trade still goes through.
    pub fn accept_trade(&mut self, actor: PlayerId) -> Result<(), GameError> {
        let trade = self.trade.as_ref().ok_or(GameError::NoActiveTrade)?;
        if trade.recipient_id != actor {
            return Err(GameError::NotTradeRecipient);
        }
        let Some(trade) = self.trade.take() else {
            return Err(GameError::NoActiveTrade);
        };
        let (from, to) = (trade.initiator_id, trade.recipient_id);

        self.hand_over(from, to, &trade.offer);
        self.hand_over(to, from, &trade.request);

        self.record(GameEvent::TradeAccepted { from, to });
        Ok(())
    }

    /// Reject the pending trade (recipient only)
    pub fn reject_trade(&mut self, actor: PlayerId) -> Result<(), GameError> {
        let trade = self.trade.as_ref().ok_or(GameError::NoActiveTrade)?;
        if trade.recipient_id != actor {
            return Err(GameError::NotTradeRecipient);
        }
        let (from, to) = (trade.initiator_id, trade.recipient_id);
        self.trade = None;
        self.record(GameEvent::TradeRejected { from, to });
        Ok(())
    }

    fn hand_over(&mut self, giver: PlayerId, taker: PlayerId, bundle: &TradeBundle) {
        if bundle.money > 0 {
            self.pay(giver, bundle.money, Some(taker));
        }

        for &square in &bundle.squares {
            if let Some(sq) = self.squares.get_mut(square as usize) {
                if sq.owner == Some(giver) {
                    sq.owner = Some(taker);
                }
            }
        }

        for _ in 0..bundle.jail_cards {
            let Some(deck) = self.player_mut(giver).and_then(|p| p.take_jail_card()) else {
                break;
            };
            if let Some(p) = self.player_mut(taker) {
                p.set_jail_card(deck, true);
            }
        }
    }
}
