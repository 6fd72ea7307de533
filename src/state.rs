//! Application state: the learner profile, the session controller, and the
//! port wiring.
//!
//! This module owns:
//!   - the single in-memory profile plus its persistence port
//!   - the session controller with whichever provider stack is configured
//!
//! With OPENAI_API_KEY present the model-backed client serves content,
//! imagery and transcription; without it we fall back to the built-in seed
//! bank (no imagery, recognition unavailable).

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::load_engine_config_from_env;
use crate::domain::{DifficultyLevel, ExerciseDefinition, ExerciseKind, LearnerResponse, UserProfile};
use crate::error::EngineError;
use crate::ports::{
    ContentProvider, Illustrator, JsonProfileStore, NoIllustrator, ProfileStore, SilentSynthesis,
    SpeechRecognizer, UnavailableRecognizer,
};
use crate::progress;
use crate::provider::OpenAI;
use crate::seeds::SeedProvider;
use crate::session::{AdvanceOutcome, SessionController, Verdict};

/// What an advance produced, profile applied where due.
pub enum AdvanceReply {
    Completed { xp: u64, profile: UserProfile },
    Next { mission_id: String, exercise: ExerciseDefinition },
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    profile: Arc<RwLock<UserProfile>>,
    store: Arc<dyn ProfileStore>,
}

impl AppState {
    /// Build state from env: load config, wire ports, load the profile.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_engine_config_from_env();
        let prompts = cfg.map(|c| c.prompts).unwrap_or_default();

        let synth = Arc::new(SilentSynthesis::default());
        let controller = match OpenAI::from_env(prompts) {
            Some(oa) => {
                info!(target: "kalen_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, transcribe_model = %oa.transcribe_model, "OpenAI enabled.");
                let oa = Arc::new(oa);
                SessionController::new(
                    Arc::clone(&oa) as Arc<dyn ContentProvider>,
                    Arc::clone(&oa) as Arc<dyn Illustrator>,
                    synth,
                    oa as Arc<dyn SpeechRecognizer>,
                )
            }
            None => {
                info!(target: "kalen_backend", "OpenAI disabled (no OPENAI_API_KEY). Serving built-in seed missions.");
                SessionController::new(
                    Arc::new(SeedProvider),
                    Arc::new(NoIllustrator),
                    synth,
                    Arc::new(UnavailableRecognizer),
                )
            }
        };

        let store: Arc<dyn ProfileStore> = Arc::new(JsonProfileStore::from_env());
        let profile = store.load();

        Self {
            controller: Arc::new(controller),
            profile: Arc::new(RwLock::new(profile)),
            store,
        }
    }

    pub async fn profile(&self) -> UserProfile {
        self.profile.read().await.clone()
    }

    /// Validate and apply a difficulty change, persisting the profile.
    #[instrument(level = "info", skip(self))]
    pub async fn set_difficulty(&self, raw: u8) -> Result<UserProfile, EngineError> {
        let level = DifficultyLevel::try_new(raw)?;
        let mut slot = self.profile.write().await;
        *slot = progress::set_difficulty(&slot, level);
        self.store.save(&slot);
        Ok(slot.clone())
    }

    /// Start a mission at the profile's current difficulty.
    pub async fn start_mission(
        &self,
        kind: ExerciseKind,
        topic: Option<String>,
    ) -> Result<(String, ExerciseDefinition), EngineError> {
        let difficulty = self.profile.read().await.difficulty;
        let exercise = self.controller.start(kind, difficulty, topic).await?;
        let mission_id = self.controller.exercise_id().await.unwrap_or_default();
        Ok((mission_id, exercise))
    }

    pub async fn submit(&self, response: LearnerResponse) -> Result<Verdict, EngineError> {
        self.controller.submit(response).await
    }

    /// Advance the session; on completion apply the award to the profile
    /// and persist it.
    #[instrument(level = "info", skip(self))]
    pub async fn advance(&self) -> Result<AdvanceReply, EngineError> {
        match self.controller.advance().await? {
            AdvanceOutcome::Completed { xp } => {
                let mut slot = self.profile.write().await;
                *slot = progress::award_xp(&slot, xp);
                self.store.save(&slot);
                info!(target: "mission", xp, total_xp = slot.xp, level = slot.level, "XP awarded");
                Ok(AdvanceReply::Completed { xp, profile: slot.clone() })
            }
            AdvanceOutcome::NextInstance(exercise) => {
                let mission_id = self.controller.exercise_id().await.unwrap_or_default();
                Ok(AdvanceReply::Next { mission_id, exercise: *exercise })
            }
        }
    }

    pub async fn abort(&self) {
        self.controller.abort().await;
    }
}
