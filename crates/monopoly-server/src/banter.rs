//! Table talk from non-human players.
//!
//! A chat line may draw a reply: explicitly through `/banter`, `@bot` or by
//! naming a non-human player, otherwise by chance. One cooldown covers the whole
//! game. The completion runs off the actor in a detached task and its result is
//! fed back as a chat entry; a failed or slow completion yields a filler line.

use crate::actor::now_ms;
use crate::config::BanterConfig;
use async_trait::async_trait;
use monopoly_core::{ChatEntry, GameState, PlayerId};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Speaker used when no non-human player is seated
pub const TABLE_SPEAKER: &str = "Table";

/// Posted when the completion fails or times out
pub const FALLBACK_LINE: &str = "Hmm, let me think about that one.";

const SCRIPTED_LINES: &[&str] = &[
    "Nice roll. Shame about the rent.",
    "I have my eye on Boardwalk.",
    "Railroads win games, mark my words.",
    "Careful, the Chance deck has it in for you today.",
    "Everyone lands on Illinois eventually.",
    "I would trade, but not at that price.",
];

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion timed out")]
    Timeout,

    #[error("completion failed: {0}")]
    Failed(String),
}

/// Produces one line of chat for `speaker` in reply to `prompt`.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, speaker: &str, prompt: &str) -> Result<String, CompletionError>;
}

/// Canned lines; needs no external service
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedCompletion;

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, _speaker: &str, _prompt: &str) -> Result<String, CompletionError> {
        let line = SCRIPTED_LINES.choose(&mut rand::thread_rng()).copied();
        line.map(str::to_string)
            .ok_or_else(|| CompletionError::Failed("no scripted lines".to_string()))
    }
}

/// A reply that passed the trigger and cooldown checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanterRequest {
    pub speaker: String,
    pub speaker_id: Option<PlayerId>,
    pub prompt: String,
}

pub struct BanterService {
    completion: Arc<dyn Completion>,
    cooldown_ms: u64,
    chance: f64,
    timeout: Duration,
    /// When the last reply was granted, epoch milliseconds
    last_at: Option<u64>,
}

impl BanterService {
    pub fn new(completion: Arc<dyn Completion>, config: &BanterConfig) -> Self {
        Self {
            completion,
            cooldown_ms: config.cooldown.as_millis() as u64,
            chance: config.chance,
            timeout: config.timeout,
            last_at: None,
        }
    }

    /// Decide whether `entry` draws a reply. Granting one starts the cooldown.
    pub fn consider(
        &mut self,
        game: &GameState,
        entry: &ChatEntry,
        rng: &mut dyn RngCore,
    ) -> Option<BanterRequest> {
        let from_npc = entry
            .player_id
            .and_then(|id| game.player(id))
            .is_some_and(|p| !p.is_human());
        if from_npc {
            return None;
        }
        if self
            .last_at
            .is_some_and(|last| entry.at < last.saturating_add(self.cooldown_ms))
        {
            return None;
        }

        let text = entry.text.to_lowercase();
        let mentioned = game
            .players
            .iter()
            .filter(|p| !p.is_human())
            .find(|p| text.contains(&p.name.to_lowercase()));
        let triggered = mentioned.is_some()
            || text.contains("/banter")
            || text.contains("@bot")
            || rng.gen_bool(self.chance);
        if !triggered {
            return None;
        }

        let speaker = mentioned.or_else(|| {
            game.players
                .iter()
                .find(|p| !p.is_human() && !p.bankrupt)
        });
        self.last_at = Some(entry.at);

        Some(BanterRequest {
            speaker: speaker.map_or_else(|| TABLE_SPEAKER.to_string(), |p| p.name.clone()),
            speaker_id: speaker.map(|p| p.id),
            prompt: format!("{}: {}", entry.speaker, entry.text),
        })
    }

    /// Run the completion for `request`. The returned future owns everything it
    /// needs, so it can be spawned away from the actor.
    pub fn complete(&self, request: BanterRequest) -> impl Future<Output = ChatEntry> + Send + 'static {
        let completion = Arc::clone(&self.completion);
        let timeout = self.timeout;

        async move {
            let reply =
                tokio::time::timeout(timeout, completion.complete(&request.speaker, &request.prompt))
                    .await
                    .unwrap_or(Err(CompletionError::Timeout));

            let text = match reply {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => FALLBACK_LINE.to_string(),
                Err(e) => {
                    warn!(speaker = %request.speaker, error = %e, "banter completion failed");
                    FALLBACK_LINE.to_string()
                }
            };

            ChatEntry {
                speaker: request.speaker,
                player_id: request.speaker_id,
                text,
                at: now_ms(),
            }
        }
    }
}
