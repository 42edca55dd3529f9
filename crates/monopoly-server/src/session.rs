//! Sessions connected to one game.
//!
//! The registry is owned by the game actor, so it needs no locking. A session
//! controls zero or more players: none for a spectator, one after a join, and
//! several when it seats local players.

use crate::protocol::Presence;
use monopoly_core::{GameAction, GameState, PlayerId};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One open connection
#[derive(Debug)]
pub struct Session {
    sender: mpsc::UnboundedSender<String>,
    players: Vec<PlayerId>,
    /// Account supplied at the handshake, if any
    account: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<Uuid, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn connect(
        &mut self,
        id: Uuid,
        sender: mpsc::UnboundedSender<String>,
        account: Option<String>,
    ) {
        self.sessions.insert(
            id,
            Session {
                sender,
                players: Vec::new(),
                account,
            },
        );
    }

    /// Returns false if the session was not registered
    pub fn disconnect(&mut self, id: Uuid) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn account(&self, id: Uuid) -> Option<&str> {
        self.sessions.get(&id).and_then(|s| s.account.as_deref())
    }

    pub fn players(&self, id: Uuid) -> &[PlayerId] {
        self.sessions
            .get(&id)
            .map(|s| s.players.as_slice())
            .unwrap_or(&[])
    }

    pub fn controls(&self, id: Uuid, player: PlayerId) -> bool {
        self.players(id).contains(&player)
    }

    /// Give `player` to this session, taking it away from any other session.
    /// A reconnecting client thereby replaces its stale connection.
    pub fn bind(&mut self, id: Uuid, player: PlayerId) {
        if !self.sessions.contains_key(&id) {
            return;
        }
        for (other, session) in self.sessions.iter_mut() {
            if *other != id {
                session.players.retain(|p| *p != player);
            }
        }
        if let Some(session) = self.sessions.get_mut(&id) {
            if !session.players.contains(&player) {
                session.players.push(player);
            }
        }
    }

    /// Which player a session acts as for `action`.
    ///
    /// Trade answers act as the trade recipient, everything else as the
    /// current player. A session that controls neither falls back to its
    /// first player, and the engine rejects the action if that is wrong.
    pub fn acting_player(
        &self,
        id: Uuid,
        game: &GameState,
        action: &GameAction,
    ) -> Option<PlayerId> {
        let players = self.players(id);
        let preferred = match action {
            GameAction::AcceptTrade | GameAction::RejectTrade => {
                game.trade.as_ref().map(|t| t.recipient_id)
            }
            _ => game.current_player_id,
        };

        preferred
            .filter(|p| players.contains(p))
            .or_else(|| players.first().copied())
    }

    pub fn presence(&self) -> Presence {
        let players = self
            .sessions
            .values()
            .filter(|s| !s.players.is_empty())
            .count();
        let mut online: Vec<PlayerId> = self
            .sessions
            .values()
            .flat_map(|s| s.players.iter().copied())
            .collect();
        online.sort_unstable();
        online.dedup();

        Presence {
            players,
            spectators: self.sessions.len() - players,
            online,
        }
    }

    /// Queue a frame for one session
    pub fn send_to(&self, id: Uuid, text: String) {
        if let Some(session) = self.sessions.get(&id) {
            let _ = session.sender.send(text);
        }
    }

    /// Queue a frame for every session, dropping those whose connection is gone.
    /// Returns the number of sessions dropped.
    pub fn broadcast(&mut self, text: &str) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.sender.send(text.to_string()).is_ok());
        before - self.sessions.len()
    }
}
