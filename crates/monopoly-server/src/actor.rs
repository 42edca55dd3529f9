//! One actor per game.
//!
//! Every mutation of a game goes through its actor's inbox, so commands are
//! applied strictly one at a time. After each mutating command the actor
//! settles the game, writes it to the store and broadcasts the full state to
//! every session.

use crate::banter::{BanterService, Completion};
use crate::config::ServerConfig;
use crate::protocol::{ClientMessage, ErrorReply, ServerMessage, StateUpdate};
use crate::session::SessionRegistry;
use crate::store::{Snapshot, StateStore, StoreError};
use dashmap::DashMap;
use monopoly_core::{ChatEntry, Controller, GameState, NewPlayer, PlayerId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const INBOX_CAPACITY: usize = 100;

/// Speaker name for chat from a session without a seat
const SPECTATOR_SPEAKER: &str = "Spectator";

/// Current time in epoch milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Error)]
#[error("game actor has stopped")]
pub struct ActorClosed;

/// Messages accepted by a game actor
#[derive(Debug)]
pub enum Command {
    Connect {
        session: Uuid,
        sender: mpsc::UnboundedSender<String>,
        /// Account from the connection handshake
        account: Option<String>,
    },
    Inbound {
        session: Uuid,
        message: ClientMessage,
    },
    Disconnect {
        session: Uuid,
    },
    /// A finished banter completion
    Banter {
        entry: ChatEntry,
    },
    /// Read-only copy of the full state as JSON
    Fetch {
        reply: oneshot::Sender<String>,
    },
}

/// Cloneable address of a running game actor
#[derive(Debug, Clone)]
pub struct GameHandle {
    sender: mpsc::Sender<Command>,
}

impl GameHandle {
    pub async fn send(&self, command: Command) -> Result<(), ActorClosed> {
        self.sender.send(command).await.map_err(|_| ActorClosed)
    }

    pub async fn fetch_state(&self) -> Result<String, ActorClosed> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Fetch { reply }).await?;
        response.await.map_err(|_| ActorClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves once the actor has stopped
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    fn same_actor(&self, other: &GameHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

pub struct GameActor {
    game_id: String,
    game: GameState,
    sessions: SessionRegistry,
    store: Arc<dyn StateStore>,
    banter: BanterService,
    snapshots: bool,
    /// How long to wait for a session before shutting down
    idle: Duration,
    rng: StdRng,
    inbox: mpsc::Receiver<Command>,
    /// Own address, for work that reports back later
    sender: mpsc::Sender<Command>,
}

impl GameActor {
    /// Create an actor for `game_id`. The stored state is loaded when it runs.
    pub fn new(
        game_id: String,
        store: Arc<dyn StateStore>,
        banter: BanterService,
        config: &ServerConfig,
    ) -> (Self, GameHandle) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let mut rng = StdRng::from_entropy();

        let actor = Self {
            game_id,
            game: GameState::new(&mut rng),
            sessions: SessionRegistry::new(),
            store,
            banter,
            snapshots: config.snapshots,
            idle: config.actor_idle,
            rng,
            inbox,
            sender: sender.clone(),
        };

        (actor, GameHandle { sender })
    }

    /// Run until the game goes idle or a write fails
    pub async fn run(mut self) {
        match self.store.load(&self.game_id).await {
            Ok(Some(game)) => {
                info!(game_id = %self.game_id, players = game.players.len(), "game loaded");
                self.game = game;
            }
            Ok(None) => info!(game_id = %self.game_id, "new game created"),
            Err(e) => {
                error!(game_id = %self.game_id, error = %e, "loading game failed");
                return;
            }
        }

        loop {
            let command = if self.sessions.is_empty() {
                match tokio::time::timeout(self.idle, self.inbox.recv()).await {
                    Ok(command) => command,
                    Err(_) => {
                        info!(game_id = %self.game_id, "no sessions left, unloading game");
                        break;
                    }
                }
            } else {
                self.inbox.recv().await
            };
            let Some(command) = command else {
                break;
            };

            if let Err(e) = self.handle(command).await {
                error!(game_id = %self.game_id, error = %e, "saving game failed, stopping actor");
                break;
            }
        }
    }

    async fn handle(&mut self, command: Command) -> Result<(), StoreError> {
        match command {
            Command::Connect {
                session,
                sender,
                account,
            } => {
                self.sessions.connect(session, sender, account);
                debug!(game_id = %self.game_id, %session, sessions = self.sessions.len(), "session connected");
                self.broadcast_state();
                Ok(())
            }
            Command::Disconnect { session } => {
                if self.sessions.disconnect(session) {
                    debug!(game_id = %self.game_id, %session, sessions = self.sessions.len(), "session disconnected");
                    self.broadcast_state();
                }
                Ok(())
            }
            Command::Inbound { session, message } => self.handle_message(session, message).await,
            Command::Banter { entry } => self.post_chat(entry).await,
            Command::Fetch { reply } => {
                match self.game.to_json() {
                    Ok(json) => {
                        let _ = reply.send(json);
                    }
                    Err(e) => warn!(game_id = %self.game_id, error = %e, "serializing state failed"),
                }
                Ok(())
            }
        }
    }

    async fn handle_message(
        &mut self,
        session: Uuid,
        message: ClientMessage,
    ) -> Result<(), StoreError> {
        match message {
            ClientMessage::Ping => Ok(()),

            ClientMessage::Join(join) => {
                let account = join
                    .account
                    .or_else(|| self.sessions.account(session).map(str::to_string));

                if let Some(id) = account.as_deref().and_then(|a| self.game.player_by_account(a)) {
                    info!(game_id = %self.game_id, player = id, "player reattached");
                    self.sessions.bind(session, id);
                    self.welcome(session, id);
                    return self.commit().await;
                }
                if let Some(&id) = self.sessions.players(session).first() {
                    self.welcome(session, id);
                    return self.commit().await;
                }

                let seat = NewPlayer {
                    name: join.name,
                    color: join.color,
                    account,
                    controller: Controller::Human,
                };
                match self.game.add_player(seat) {
                    Ok(id) => {
                        self.sessions.bind(session, id);
                        self.welcome(session, id);
                        self.commit().await
                    }
                    Err(e) => {
                        self.sessions.send_to(session, ErrorReply::new(e).to_text());
                        Ok(())
                    }
                }
            }

            ClientMessage::AddNpc(npc) => {
                let name = npc.name.unwrap_or_else(|| "Bot".to_string());
                let delegate = npc.delegate.unwrap_or_else(|| "medium".to_string());
                if let Err(e) = self.game.add_player(NewPlayer::npc(name, delegate)) {
                    debug!(game_id = %self.game_id, error = %e, "addNPC dropped");
                }
                self.commit().await
            }

            ClientMessage::AddLocalPlayers(local) => {
                for name in local.names {
                    match self.game.add_player(NewPlayer::human(name)) {
                        Ok(id) => self.sessions.bind(session, id),
                        Err(e) => {
                            debug!(game_id = %self.game_id, error = %e, "addLocalPlayers stopped");
                            break;
                        }
                    }
                }
                self.commit().await
            }

            ClientMessage::Chat(chat) => {
                let player_id = self.sessions.players(session).first().copied();
                let speaker = player_id
                    .and_then(|id| self.game.player(id))
                    .map_or_else(|| SPECTATOR_SPEAKER.to_string(), |p| p.name.clone());
                let entry = ChatEntry {
                    speaker,
                    player_id,
                    text: chat.text,
                    at: now_ms(),
                };
                self.post_chat(entry.clone()).await?;

                if let Some(request) = self.banter.consider(&self.game, &entry, &mut self.rng) {
                    let reply = self.banter.complete(request);
                    let sender = self.sender.clone();
                    tokio::spawn(async move {
                        let entry = reply.await;
                        let _ = sender.send(Command::Banter { entry }).await;
                    });
                }
                Ok(())
            }

            ClientMessage::Game(action) => {
                match self.sessions.acting_player(session, &self.game, &action) {
                    Some(actor) => {
                        if let Err(e) =
                            self.game
                                .apply_action(actor, action.clone(), now_ms(), &mut self.rng)
                        {
                            debug!(game_id = %self.game_id, player = actor, ?action, reason = %e, "action dropped");
                        }
                    }
                    None => {
                        debug!(game_id = %self.game_id, %session, ?action, "action from a session without a seat dropped");
                    }
                }
                self.commit().await
            }
        }
    }

    /// Chat skips the full state cycle: it goes out on its own and is saved.
    async fn post_chat(&mut self, entry: ChatEntry) -> Result<(), StoreError> {
        match ServerMessage::ChatMessage(&entry).to_text() {
            Ok(text) => {
                self.sessions.broadcast(&text);
            }
            Err(e) => warn!(game_id = %self.game_id, error = %e, "serializing chat failed"),
        }
        self.game.push_chat(entry);
        self.store.save(&self.game_id, &self.game).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.game.settle(now_ms(), &mut self.rng);
        let events = self.game.take_events();
        if !events.is_empty() {
            debug!(game_id = %self.game_id, events = events.len(), turn = self.game.turn, "settled");
        }

        self.store.save(&self.game_id, &self.game).await?;

        if self.snapshots {
            let snapshot = Snapshot::of(&self.game_id, &self.game);
            if let Err(e) = self.store.save_snapshot(&snapshot).await {
                warn!(game_id = %self.game_id, error = %e, "snapshot failed");
            }
        }

        self.broadcast_state();
        Ok(())
    }

    fn welcome(&self, session: Uuid, id: PlayerId) {
        let welcome = ServerMessage::Welcome { id };
        if let Ok(text) = welcome.to_text() {
            self.sessions.send_to(session, text);
        }
    }

    fn broadcast_state(&mut self) {
        let update = ServerMessage::GameStateUpdate(StateUpdate {
            game: &self.game,
            presence: self.sessions.presence(),
        });
        match update.to_text() {
            Ok(text) => {
                let dropped = self.sessions.broadcast(&text);
                if dropped > 0 {
                    debug!(game_id = %self.game_id, dropped, "pruned closed sessions");
                }
            }
            Err(e) => warn!(game_id = %self.game_id, error = %e, "serializing state failed"),
        }
    }
}

/// Process-wide map from game id to its actor.
///
/// Actors are started on first use and remove themselves when they stop.
pub struct GameDirectory {
    games: DashMap<String, GameHandle>,
    store: Arc<dyn StateStore>,
    completion: Arc<dyn Completion>,
    config: ServerConfig,
}

impl GameDirectory {
    pub fn new(
        store: Arc<dyn StateStore>,
        completion: Arc<dyn Completion>,
        config: ServerConfig,
    ) -> Self {
        Self {
            games: DashMap::new(),
            store,
            completion,
            config,
        }
    }

    /// Handle for `game_id`, starting its actor if none is running
    pub fn handle(self: &Arc<Self>, game_id: &str) -> GameHandle {
        let mut entry = self
            .games
            .entry(game_id.to_string())
            .or_insert_with(|| self.spawn(game_id));
        if entry.is_closed() {
            *entry = self.spawn(game_id);
        }
        entry.value().clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.games.len()
    }

    fn spawn(self: &Arc<Self>, game_id: &str) -> GameHandle {
        let banter = BanterService::new(Arc::clone(&self.completion), &self.config.banter);
        let (actor, handle) = GameActor::new(
            game_id.to_string(),
            Arc::clone(&self.store),
            banter,
            &self.config,
        );

        let directory = Arc::clone(self);
        let game_id = game_id.to_string();
        let own = handle.clone();
        tokio::spawn(async move {
            actor.run().await;
            directory
                .games
                .remove_if(&game_id, |_, current| current.same_actor(&own));
            info!(%game_id, "game actor stopped");
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banter::ScriptedCompletion;
    use crate::config::BanterConfig;
    use crate::store::MemoryStore;
    use serde_json::Value;

    fn directory_with_idle(store: Arc<MemoryStore>, idle: Duration) -> Arc<GameDirectory> {
        let config = ServerConfig {
            snapshots: true,
            banter: BanterConfig {
                chance: 0.0,
                ..BanterConfig::default()
            },
            actor_idle: idle,
            ..ServerConfig::default()
        };
        Arc::new(GameDirectory::new(store, Arc::new(ScriptedCompletion), config))
    }

    fn directory(store: Arc<MemoryStore>) -> Arc<GameDirectory> {
        directory_with_idle(store, Duration::from_secs(5))
    }

    async fn connect(
        handle: &GameHandle,
        account: Option<&str>,
    ) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let session = Uuid::new_v4();
        let (sender, rx) = mpsc::unbounded_channel();
        handle
            .send(Command::Connect {
                session,
                sender,
                account: account.map(str::to_string),
            })
            .await
            .unwrap();
        (session, rx)
    }

    async fn send(handle: &GameHandle, session: Uuid, text: &str) {
        let message = ClientMessage::parse(text).unwrap();
        handle
            .send(Command::Inbound { session, message })
            .await
            .unwrap();
    }

    /// Everything queued for a session so far. Fetching first makes sure the
    /// actor has handled all earlier commands.
    async fn drain(handle: &GameHandle, rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        handle.fetch_state().await.unwrap();
        let mut frames = Vec::new();
        while let Ok(text) = rx.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn test_join_welcomes_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");

        let (session, mut rx) = connect(&handle, None).await;
        send(&handle, session, r#"{"action":"join","payload":{"name":"Ada"}}"#).await;

        let frames = drain(&handle, &mut rx).await;
        let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
        assert_eq!(types, vec!["GAME_STATE_UPDATE", "WELCOME", "GAME_STATE_UPDATE"]);
        assert_eq!(frames[1]["payload"]["id"], 1);
        assert_eq!(frames[2]["payload"]["presence"]["players"], 1);

        let saved = store.load("g1").await.unwrap().unwrap();
        assert_eq!(saved.players.len(), 1);
        assert_eq!(saved.players[0].name, "Ada");
        assert_eq!(store.snapshot("g1").unwrap().players.len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_reattaches_by_account() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");

        let (first, _rx1) = connect(&handle, Some("acc-7")).await;
        send(&handle, first, r#"{"action":"join","payload":{"name":"Ada"}}"#).await;
        handle
            .send(Command::Disconnect { session: first })
            .await
            .unwrap();

        let (second, mut rx2) = connect(&handle, None).await;
        send(
            &handle,
            second,
            r#"{"action":"join","payload":{"name":"Someone","account":"acc-7"}}"#,
        )
        .await;

        let frames = drain(&handle, &mut rx2).await;
        let welcome = frames.iter().find(|f| f["type"] == "WELCOME").unwrap();
        assert_eq!(welcome["payload"]["id"], 1);

        let state: GameState = GameState::from_json(&handle.fetch_state().await.unwrap()).unwrap();
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0].name, "Ada");
    }

    #[tokio::test]
    async fn test_repeated_join_is_welcomed_with_state() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");

        let (session, mut rx) = connect(&handle, None).await;
        send(&handle, session, r#"{"action":"join","payload":{"name":"Ada"}}"#).await;
        drain(&handle, &mut rx).await;

        send(&handle, session, r#"{"action":"join","payload":{"name":"Ada"}}"#).await;
        let frames = drain(&handle, &mut rx).await;
        let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
        assert_eq!(types, vec!["WELCOME", "GAME_STATE_UPDATE"]);
        assert_eq!(frames[0]["payload"]["id"], 1);
        assert_eq!(frames[1]["payload"]["players"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spectator_action_still_closes_expired_auction() {
        let store = Arc::new(MemoryStore::new());
        let mut rng = StdRng::seed_from_u64(4);
        let mut game = GameState::new(&mut rng);
        game.add_player(NewPlayer::human("Alice")).unwrap();
        game.add_player(NewPlayer::human("Bob")).unwrap();
        game.start_auction(39, 0).unwrap();
        game.place_bid(2, 50).unwrap();
        game.take_events();
        store.save("g1", &game).await.unwrap();

        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");
        let (spectator, mut rx) = connect(&handle, None).await;
        send(&handle, spectator, r#"{"action":"rollDice"}"#).await;

        let frames = drain(&handle, &mut rx).await;
        assert_eq!(frames.last().unwrap()["type"], "GAME_STATE_UPDATE");
        let saved = store.load("g1").await.unwrap().unwrap();
        assert!(saved.auction.is_none());
        assert_eq!(saved.squares[39].owner, Some(2));
        assert_eq!(saved.player(2).unwrap().money, 1450);
    }

    #[tokio::test]
    async fn test_rejected_actions_are_silent() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");

        let (alice, _rx_a) = connect(&handle, None).await;
        let (bob, mut rx_b) = connect(&handle, None).await;
        send(&handle, alice, r#"{"action":"join","payload":{"name":"Alice"}}"#).await;
        send(&handle, bob, r#"{"action":"join","payload":{"name":"Bob"}}"#).await;
        drain(&handle, &mut rx_b).await;

        // Not Bob's turn
        send(&handle, bob, r#"{"action":"rollDice"}"#).await;
        let frames = drain(&handle, &mut rx_b).await;
        assert!(frames.iter().all(|f| f.get("error").is_none()));
        assert_eq!(frames.last().unwrap()["type"], "GAME_STATE_UPDATE");
        assert_eq!(frames.last().unwrap()["payload"]["lastDice"], Value::Null);
    }

    #[tokio::test]
    async fn test_full_game_rejects_join_with_error() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");

        let (host, _rx) = connect(&handle, None).await;
        let names: Vec<String> = (0..8).map(|i| format!("P{i}")).collect();
        let payload = serde_json::json!({"action": "addLocalPlayers", "payload": {"names": names}});
        send(&handle, host, &payload.to_string()).await;

        let (late, mut rx_late) = connect(&handle, None).await;
        send(&handle, late, r#"{"action":"join","payload":{"name":"Late"}}"#).await;
        let frames = drain(&handle, &mut rx_late).await;
        assert!(frames.iter().any(|f| f["error"] == "Game is full"));
    }

    #[tokio::test]
    async fn test_chat_is_broadcast_and_kept() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");

        let (alice, _rx_a) = connect(&handle, None).await;
        let (_watcher, mut rx_w) = connect(&handle, None).await;
        send(&handle, alice, r#"{"action":"join","payload":{"name":"Alice"}}"#).await;
        drain(&handle, &mut rx_w).await;

        send(&handle, alice, r#"{"action":"chat","payload":{"text":"good luck"}}"#).await;
        let frames = drain(&handle, &mut rx_w).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "CHAT_MESSAGE");
        assert_eq!(frames[0]["payload"]["speaker"], "Alice");
        assert_eq!(frames[0]["payload"]["text"], "good luck");

        let saved = store.load("g1").await.unwrap().unwrap();
        assert_eq!(saved.chat.len(), 1);
    }

    #[tokio::test]
    async fn test_hotseat_session_acts_for_current_player() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory(Arc::clone(&store));
        let handle = directory.handle("g1");

        let (session, mut rx) = connect(&handle, None).await;
        send(
            &handle,
            session,
            r#"{"action":"addLocalPlayers","payload":{"names":["Ann","Ben"]}}"#,
        )
        .await;
        send(&handle, session, r#"{"action":"rollDice"}"#).await;
        drain(&handle, &mut rx).await;

        let state = GameState::from_json(&handle.fetch_state().await.unwrap()).unwrap();
        assert!(state.last_dice.is_some());
        assert!(state.log.iter().any(|e| e.message.starts_with("Ann rolled")));
    }

    #[tokio::test]
    async fn test_idle_actor_unloads_and_restarts() {
        let store = Arc::new(MemoryStore::new());
        let directory = directory_with_idle(Arc::clone(&store), Duration::from_millis(50));
        let handle = directory.handle("g1");
        handle.fetch_state().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .unwrap();
        assert!(handle.is_closed());

        let fresh = directory.handle("g1");
        assert!(!fresh.is_closed());
        assert!(fresh.fetch_state().await.is_ok());
        assert_eq!(directory.len(), 1);
    }
}
