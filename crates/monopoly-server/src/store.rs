//! Durable storage for game state and snapshots.

use async_trait::async_trait;
use dashmap::DashMap;
use monopoly_core::{GameState, GameStatus, PlayerId};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value store for whole game states, keyed by game id.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a game, or `None` if it was never saved
    async fn load(&self, game_id: &str) -> Result<Option<GameState>, StoreError>;

    /// Replace the stored state of a game
    async fn save(&self, game_id: &str, state: &GameState) -> Result<(), StoreError>;

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Per-player line of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub id: PlayerId,
    pub name: String,
    pub money: i64,
    pub position: u8,
    pub bankrupt: bool,
}

/// Lightweight summary of a game for analytics and resume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub game_id: String,
    pub turn: u32,
    #[serde(flatten)]
    pub status: GameStatus,
    pub current_player_id: Option<PlayerId>,
    pub players: Vec<Standing>,
}

impl Snapshot {
    pub fn of(game_id: &str, game: &GameState) -> Self {
        Self {
            game_id: game_id.to_string(),
            turn: game.turn,
            status: game.status,
            current_player_id: game.current_player_id,
            players: game
                .players
                .iter()
                .map(|p| Standing {
                    id: p.id,
                    name: p.name.clone(),
                    money: p.money,
                    position: p.position,
                    bankrupt: p.bankrupt,
                })
                .collect(),
        }
    }
}

/// Process-local store; everything is lost on restart
#[derive(Default)]
pub struct MemoryStore {
    states: DashMap<String, String>,
    snapshots: DashMap<String, Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn snapshot(&self, game_id: &str) -> Option<Snapshot> {
        self.snapshots.get(game_id).map(|s| s.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, game_id: &str) -> Result<Option<GameState>, StoreError> {
        let Some(json) = self.states.get(game_id).map(|s| s.clone()) else {
            return Ok(None);
        };
        Ok(Some(GameState::from_json(&json)?))
    }

    async fn save(&self, game_id: &str, state: &GameState) -> Result<(), StoreError> {
        self.states.insert(game_id.to_string(), state.to_json()?);
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshots
            .insert(snapshot.game_id.clone(), snapshot.clone());
        Ok(())
    }
}

/// One JSON file per game under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a crash
/// never leaves a half-written state behind.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn state_path(&self, game_id: &str) -> PathBuf {
        self.dir.join(format!("{game_id}.json"))
    }

    fn snapshot_path(&self, game_id: &str) -> PathBuf {
        self.dir.join(format!("{game_id}.snapshot.json"))
    }

    async fn write_atomic(path: &Path, contents: String) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self, game_id: &str) -> Result<Option<GameState>, StoreError> {
        match tokio::fs::read_to_string(self.state_path(game_id)).await {
            Ok(json) => Ok(Some(GameState::from_json(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, game_id: &str, state: &GameState) -> Result<(), StoreError> {
        Self::write_atomic(&self.state_path(game_id), state.to_json()?).await
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)?;
        Self::write_atomic(&self.snapshot_path(&snapshot.game_id), json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monopoly_core::NewPlayer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn game() -> GameState {
        let mut rng = StdRng::seed_from_u64(1);
        let mut game = GameState::new(&mut rng);
        game.add_player(NewPlayer::human("Alice")).unwrap();
        game.take_events();
        game
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load("g1").await.unwrap().is_none());

        let game = game();
        store.save("g1", &game).await.unwrap();
        assert_eq!(store.load("g1").await.unwrap(), Some(game));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(store.load("g1").await.unwrap().is_none());

        let mut game = game();
        store.save("g1", &game).await.unwrap();
        game.players[0].money = 900;
        store.save("g1", &game).await.unwrap();

        let loaded = store.load("g1").await.unwrap().unwrap();
        assert_eq!(loaded.players[0].money, 900);
        assert!(!dir.path().join("g1.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(matches!(store.load("bad").await, Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn test_snapshot_summarises_players() {
        let store = MemoryStore::new();
        let snapshot = Snapshot::of("g1", &game());
        store.save_snapshot(&snapshot).await.unwrap();

        let saved = store.snapshot("g1").unwrap();
        assert_eq!(saved.players.len(), 1);
        assert_eq!(saved.players[0].money, 1500);
        let json = serde_json::to_string(&saved).unwrap();
        assert!(json.contains("\"status\":\"open\""));
    }
}
