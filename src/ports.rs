//! Capability ports injected into the session controller, plus the local
//! implementations used when no external capability is configured.
//!
//! Keeping these as explicit traits (instead of reaching for process-global
//! handles) lets tests drive the controller with fakes and keeps the
//! at-most-one-utterance / one-in-flight-recognition rules visible.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::curriculum::CurriculumBand;
use crate::domain::{
    DifficultyLevel, GrammarFeedback, LanguageTag, ListeningExercise, MultiClozeExercise,
    NarrativeSegment, ReadingExercise, SpeakingExercise, TenseClozeExercise, UserProfile,
    VocabularyWord,
};
use crate::error::EngineError;

/// Typed async content generation, one request shape per exercise kind.
/// Implementations must return payloads that pass
/// [`crate::domain::ExerciseDefinition::validate`]; the session re-checks.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn vocabulary_set(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
        topic: &str,
    ) -> Result<Vec<VocabularyWord>, EngineError>;

    async fn grammar_feedback(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
        sentence: &str,
    ) -> Result<GrammarFeedback, EngineError>;

    async fn narrative_step(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
        history: &[String],
        action: &str,
    ) -> Result<NarrativeSegment, EngineError>;

    async fn tense_cloze(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
    ) -> Result<TenseClozeExercise, EngineError>;

    async fn multi_cloze(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
    ) -> Result<MultiClozeExercise, EngineError>;

    async fn reading(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
    ) -> Result<ReadingExercise, EngineError>;

    async fn listening(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
    ) -> Result<ListeningExercise, EngineError>;

    async fn speaking(
        &self,
        level: DifficultyLevel,
        band: &CurriculumBand,
    ) -> Result<SpeakingExercise, EngineError>;
}

/// Best-effort imagery. `Ok(None)` is a normal outcome, not an error.
#[async_trait]
pub trait Illustrator: Send + Sync {
    async fn illustrate(&self, prompt: &str) -> Result<Option<Vec<u8>>, EngineError>;
}

/// Fire-and-forget text-to-speech. Starting a new utterance implicitly
/// cancels any playing one; `stop` cancels whatever is active.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn speak(&self, text: &str, language: LanguageTag);
    async fn stop(&self);
}

/// Single-shot transcription of a recorded clip. At most one recognition is
/// in flight at a time; the session enforces this.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, EngineError>;
}

/// Profile persistence. `load` falls back to defaults for a missing or
/// unreadable file; `save` failures are logged, never fatal.
pub trait ProfileStore: Send + Sync {
    fn load(&self) -> UserProfile;
    fn save(&self, profile: &UserProfile);
}

/// Illustrator used when no image capability is configured.
pub struct NoIllustrator;

#[async_trait]
impl Illustrator for NoIllustrator {
    async fn illustrate(&self, _prompt: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(None)
    }
}

/// Synthesis stand-in for deployments where audio plays on the client.
/// Tracks the active utterance so the replace-on-speak rule stays honest.
#[derive(Default)]
pub struct SilentSynthesis {
    active: Mutex<Option<String>>,
}

#[async_trait]
impl SpeechSynthesis for SilentSynthesis {
    async fn speak(&self, text: &str, language: LanguageTag) {
        let mut active = self.active.lock().expect("synth lock");
        if active.is_some() {
            debug!(target: "kalen_backend", "Replacing active utterance");
        }
        *active = Some(text.to_string());
        debug!(target: "kalen_backend", lang = language.bcp47(), text_len = text.len(), "speak (silent)");
    }

    async fn stop(&self) {
        self.active.lock().expect("synth lock").take();
    }
}

impl SilentSynthesis {
    /// Currently "playing" utterance, if any.
    pub fn active(&self) -> Option<String> {
        self.active.lock().expect("synth lock").clone()
    }
}

/// Recognizer used when no speech capability is configured. Every attempt
/// surfaces as a user-visible recognition failure.
pub struct UnavailableRecognizer;

#[async_trait]
impl SpeechRecognizer for UnavailableRecognizer {
    async fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String, EngineError> {
        Err(EngineError::RecognitionFailure(
            "speech recognition is not configured".into(),
        ))
    }
}

/// JSON file profile store. Path comes from PROFILE_PATH (default
/// ./profile.json). The legacy-difficulty migration happens inside profile
/// deserialization, so old files upgrade transparently on load.
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn from_env() -> Self {
        let path = std::env::var("PROFILE_PATH").unwrap_or_else(|_| "./profile.json".into());
        Self { path: PathBuf::from(path) }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self) -> UserProfile {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => match serde_json::from_str::<UserProfile>(&s) {
                Ok(profile) => {
                    info!(target: "kalen_backend", path = %self.path.display(), xp = profile.xp, level = profile.level, "Loaded profile");
                    profile
                }
                Err(e) => {
                    error!(target: "kalen_backend", path = %self.path.display(), error = %e, "Profile file unreadable; using defaults");
                    UserProfile::default()
                }
            },
            Err(_) => {
                info!(target: "kalen_backend", path = %self.path.display(), "No profile file; using defaults");
                UserProfile::default()
            }
        }
    }

    fn save(&self, profile: &UserProfile) {
        match serde_json::to_string_pretty(profile) {
            Ok(s) => {
                if let Err(e) = std::fs::write(&self.path, s) {
                    error!(target: "kalen_backend", path = %self.path.display(), error = %e, "Failed to write profile");
                }
            }
            Err(e) => error!(target: "kalen_backend", error = %e, "Failed to serialize profile"),
        }
    }
}
