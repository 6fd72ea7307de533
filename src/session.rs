//! The per-mission session state machine.
//!
//! One controller drives one session at a time through
//! `RequestingContent -> Presenting -> Submitted -> (Completed | RequestingContent)`.
//! The controller owns the cross-instance state the screens used to scatter:
//! the tense answer streak, the story log, the vocabulary cursor, and the
//! pending selections of the multi-item kinds. Completion emits the
//! accumulated XP exactly once; applying it to the profile is the caller's
//! job.
//!
//! Illustration requests never block presentation: they run on a spawned
//! task and are dropped if the exercise instance was superseded before the
//! image arrived.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::curriculum;
use crate::domain::{
  DifficultyLevel, ExerciseDefinition, ExerciseKind, GrammarFeedback, LanguageTag,
  LearnerResponse, NarrativeSegment,
};
use crate::error::EngineError;
use crate::ports::{ContentProvider, Illustrator, SpeechRecognizer, SpeechSynthesis};
use crate::scoring::{
  self, ClozeScore, ReadingScore, GRAMMAR_SUBMIT_XP, LISTENING_XP, SPEAKING_XP,
  TENSE_STREAK_TARGET, TENSE_STREAK_XP, VOCAB_SET_XP,
};
use crate::speech;

/// Opening action for a fresh story session.
const STORY_OPENING: &str =
  "Start a sci-fi mystery story where the main character finds a strange glowing device.";

/// Default vocabulary topic when the client does not pick one.
const DEFAULT_TOPIC: &str = "Space Exploration";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
  RequestingContent,
  Presenting,
  Submitted,
  Completed,
}

impl Phase {
  pub fn name(self) -> &'static str {
    match self {
      Phase::RequestingContent => "requesting_content",
      Phase::Presenting => "presenting",
      Phase::Submitted => "submitted",
      Phase::Completed => "completed",
    }
  }
}

/// Structured result of a scored submission, kind-specific.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Verdict {
  WordAdvanced { index: usize, total: usize },
  SetFinished { xp: u64 },
  Grammar { feedback: GrammarFeedback, xp: u64 },
  Story { chosen: String },
  Tense {
    correct: bool,
    correct_answer: String,
    explanation: String,
    explanation_cn: Option<String>,
    streak: u32,
    target: u32,
  },
  Cloze(ClozeScore),
  Reading(ReadingScore),
  Listening { correct: bool, audio_script: Option<String> },
  Speaking { transcript: String, score: u8, passed: bool },
}

/// What `advance` produced: the terminal award, or the next exercise
/// instance of the same kind.
#[derive(Debug)]
pub enum AdvanceOutcome {
  Completed { xp: u64 },
  NextInstance(Box<ExerciseDefinition>),
}

struct Session {
  id: String,
  kind: ExerciseKind,
  difficulty: DifficultyLevel,
  phase: Phase,
  exercise: Option<ExerciseDefinition>,
  /// Instance marker; bumped per exercise instance so late illustration
  /// results for superseded instances are discarded.
  generation: u64,
  illustration_b64: Option<String>,
  word_cursor: usize,
  /// Narrative transcript: segment texts interleaved with choice lines.
  story_log: Vec<String>,
  /// Continuation produced at submit time, installed on advance.
  next_segment: Option<NarrativeSegment>,
  tense_streak: u32,
  pending_blanks: HashMap<u32, String>,
  pending_answers: HashMap<usize, usize>,
  xp_pending: u64,
  script_revealed: bool,
  recognizing: bool,
}

impl Session {
  fn fresh(kind: ExerciseKind, difficulty: DifficultyLevel, generation: u64) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      kind,
      difficulty,
      phase: Phase::RequestingContent,
      exercise: None,
      generation,
      illustration_b64: None,
      word_cursor: 0,
      story_log: Vec::new(),
      next_segment: None,
      tense_streak: 0,
      pending_blanks: HashMap::new(),
      pending_answers: HashMap::new(),
      xp_pending: 0,
      script_revealed: false,
      recognizing: false,
    }
  }
}

pub struct SessionController {
  provider: Arc<dyn ContentProvider>,
  illustrator: Arc<dyn Illustrator>,
  synth: Arc<dyn SpeechSynthesis>,
  recognizer: Arc<dyn SpeechRecognizer>,
  session: Arc<RwLock<Option<Session>>>,
  generation: AtomicU64,
}

impl SessionController {
  pub fn new(
    provider: Arc<dyn ContentProvider>,
    illustrator: Arc<dyn Illustrator>,
    synth: Arc<dyn SpeechSynthesis>,
    recognizer: Arc<dyn SpeechRecognizer>,
  ) -> Self {
    Self {
      provider,
      illustrator,
      synth,
      recognizer,
      session: Arc::new(RwLock::new(None)),
      generation: AtomicU64::new(0),
    }
  }

  fn next_generation(&self) -> u64 {
    self.generation.fetch_add(1, Ordering::SeqCst) + 1
  }

  /// Begin (or retry) a mission of `kind` at `difficulty`.
  ///
  /// Re-invoking while the current session of the same kind is stuck in
  /// `RequestingContent` retries the content request and keeps the
  /// cross-instance counters; anything else starts over.
  #[instrument(level = "info", skip(self), fields(kind = %kind, %difficulty))]
  pub async fn start(
    &self,
    kind: ExerciseKind,
    difficulty: DifficultyLevel,
    topic: Option<String>,
  ) -> Result<ExerciseDefinition, EngineError> {
    let topic = topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());
    let generation = self.next_generation();

    {
      let mut slot = self.session.write().await;
      let retry = slot
        .as_ref()
        .map(|s| s.kind == kind && s.phase == Phase::RequestingContent)
        .unwrap_or(false);
      if retry {
        let s = slot.as_mut().unwrap();
        s.generation = generation;
        s.difficulty = difficulty;
        info!(target: "mission", kind = %kind, "Retrying content request");
      } else {
        if slot.is_some() {
          debug!(target: "mission", kind = %kind, "Replacing active session");
        }
        self.synth.stop().await;
        *slot = Some(Session::fresh(kind, difficulty, generation));
      }
    }

    let band = curriculum::describe(difficulty);
    let history: Vec<String> = Vec::new();
    let fetched = match kind {
      ExerciseKind::GrammarCheck => Ok(ExerciseDefinition::GrammarCheck),
      ExerciseKind::Vocabulary => self
        .provider
        .vocabulary_set(difficulty, band, &topic)
        .await
        .map(|words| ExerciseDefinition::Vocabulary { words }),
      ExerciseKind::NarrativeStep => self
        .provider
        .narrative_step(difficulty, band, &history, STORY_OPENING)
        .await
        .map(ExerciseDefinition::NarrativeStep),
      ExerciseKind::TenseCloze => {
        self.provider.tense_cloze(difficulty, band).await.map(ExerciseDefinition::TenseCloze)
      }
      ExerciseKind::MultiCloze => {
        self.provider.multi_cloze(difficulty, band).await.map(ExerciseDefinition::MultiCloze)
      }
      ExerciseKind::ReadingComprehension => self
        .provider
        .reading(difficulty, band)
        .await
        .map(ExerciseDefinition::ReadingComprehension),
      ExerciseKind::ListeningComprehension => self
        .provider
        .listening(difficulty, band)
        .await
        .map(ExerciseDefinition::ListeningComprehension),
      ExerciseKind::SpeakingChallenge => self
        .provider
        .speaking(difficulty, band)
        .await
        .map(ExerciseDefinition::SpeakingChallenge),
    };

    let exercise = match fetched {
      Ok(ex) => ex,
      Err(e) => {
        // Session stays in RequestingContent; the caller re-invokes start.
        error!(target: "mission", kind = %kind, error = %e, "Content request failed");
        return Err(e);
      }
    };
    exercise.validate()?;

    self.install_exercise(generation, exercise.clone()).await?;

    if let ExerciseDefinition::ListeningComprehension(l) = &exercise {
      // The transmission plays immediately; the script stays hidden.
      self.synth.speak(&l.audio_script, LanguageTag::En).await;
    }

    info!(target: "mission", kind = %kind, "Mission presented");
    Ok(exercise)
  }

  /// Install a fetched exercise into the session, flip to Presenting, and
  /// kick off the background illustration fetch.
  async fn install_exercise(
    &self,
    generation: u64,
    exercise: ExerciseDefinition,
  ) -> Result<(), EngineError> {
    let image_prompt = exercise.image_prompt().map(|p| p.to_string());
    {
      let mut slot = self.session.write().await;
      let s = match slot.as_mut() {
        Some(s) if s.generation == generation => s,
        // Aborted or replaced while the request was in flight.
        _ => {
          warn!(target: "mission", "Dropping content for a superseded session");
          return Err(EngineError::InvalidTransition { from: "idle", action: "present" });
        }
      };
      s.id = Uuid::new_v4().to_string();
      s.illustration_b64 = None;
      s.pending_blanks.clear();
      s.pending_answers.clear();
      s.word_cursor = 0;
      s.script_revealed = false;
      if let ExerciseDefinition::NarrativeStep(seg) = &exercise {
        if s.story_log.is_empty() {
          s.story_log.push(seg.text.clone());
        }
      }
      s.exercise = Some(exercise);
      s.phase = Phase::Presenting;
    }

    if let Some(prompt) = image_prompt {
      let slot = Arc::clone(&self.session);
      let illustrator = Arc::clone(&self.illustrator);
      tokio::spawn(async move {
        match illustrator.illustrate(&prompt).await {
          Ok(Some(bytes)) => {
            let mut slot = slot.write().await;
            match slot.as_mut() {
              Some(s) if s.generation == generation => {
                s.illustration_b64 = Some(BASE64.encode(bytes));
              }
              _ => debug!(target: "mission", "Discarding illustration for superseded exercise"),
            }
          }
          Ok(None) => {}
          Err(e) => debug!(target: "mission", error = %e, "Illustration fetch failed"),
        }
      });
    }
    Ok(())
  }

  /// Record a partial selection while Presenting. Scoring stays deferred
  /// until submit.
  #[instrument(level = "debug", skip(self))]
  pub async fn select_blank(&self, id: u32, word: String) -> Result<(), EngineError> {
    let mut slot = self.session.write().await;
    let s = require_phase(&mut *slot, Phase::Presenting, "select")?;
    match &s.exercise {
      Some(ExerciseDefinition::MultiCloze(_)) => {
        s.pending_blanks.insert(id, word);
        Ok(())
      }
      _ => Err(EngineError::InvalidResponse("no cloze passage is active".into())),
    }
  }

  /// Record a partial answer while Presenting.
  #[instrument(level = "debug", skip(self))]
  pub async fn select_answer(&self, question: usize, option: usize) -> Result<(), EngineError> {
    let mut slot = self.session.write().await;
    let s = require_phase(&mut *slot, Phase::Presenting, "select")?;
    match &s.exercise {
      Some(ExerciseDefinition::ReadingComprehension(_)) => {
        s.pending_answers.insert(question, option);
        Ok(())
      }
      _ => Err(EngineError::InvalidResponse("no reading exercise is active".into())),
    }
  }

  /// Score a submission. For the multi-item kinds one submit scores every
  /// sub-item together, merged over any partial selections.
  #[instrument(level = "info", skip(self, response))]
  pub async fn submit(&self, response: LearnerResponse) -> Result<Verdict, EngineError> {
    // Kinds whose scoring needs a port call release the lock around the
    // await and re-validate the session afterwards.
    enum Deferred {
      Grammar { text: String },
      Story { history: Vec<String>, chosen: String },
      Speech { audio: Vec<u8>, mime: String, phrase: String, keywords: Vec<String> },
    }

    let deferred;
    {
      let mut slot = self.session.write().await;
      let s = require_phase(&mut *slot, Phase::Presenting, "submit")?;
      let exercise = s.exercise.clone().expect("presenting session has an exercise");

      match (&exercise, &response) {
        (ExerciseDefinition::Vocabulary { words }, LearnerResponse::NextWord) => {
          let total = words.len();
          if s.word_cursor + 1 < total {
            s.word_cursor += 1;
            return Ok(Verdict::WordAdvanced { index: s.word_cursor, total });
          }
          s.xp_pending = VOCAB_SET_XP;
          s.phase = Phase::Submitted;
          return Ok(Verdict::SetFinished { xp: VOCAB_SET_XP });
        }

        (ExerciseDefinition::TenseCloze(t), LearnerResponse::TenseOption { option }) => {
          let correct = scoring::tense_correct(t, option);
          if correct {
            s.tense_streak += 1;
          } else {
            s.tense_streak = 0;
          }
          let verdict = Verdict::Tense {
            correct,
            correct_answer: t.correct_answer.clone(),
            explanation: t.explanation.clone(),
            explanation_cn: t.explanation_cn.clone(),
            streak: s.tense_streak,
            target: TENSE_STREAK_TARGET,
          };
          info!(target: "mission", correct, streak = s.tense_streak, "Tense answer scored");
          s.phase = Phase::Submitted;
          return Ok(verdict);
        }

        (ExerciseDefinition::MultiCloze(c), LearnerResponse::ClozeBlanks { answers }) => {
          s.pending_blanks.extend(answers.clone());
          let score = scoring::score_multi_cloze(c, &s.pending_blanks);
          s.xp_pending = score.xp;
          s.phase = Phase::Submitted;
          info!(target: "mission", correct = score.correct_count, total = score.total, "Cloze scored");
          return Ok(Verdict::Cloze(score));
        }

        (ExerciseDefinition::ReadingComprehension(r), LearnerResponse::ReadingAnswers { answers }) => {
          s.pending_answers.extend(answers.clone());
          let score = scoring::score_reading(r, &s.pending_answers);
          s.xp_pending = score.xp;
          s.phase = Phase::Submitted;
          info!(target: "mission", correct = score.correct_count, total = score.total, "Reading scored");
          return Ok(Verdict::Reading(score));
        }

        (ExerciseDefinition::ListeningComprehension(l), LearnerResponse::OptionIndex { index }) => {
          if *index >= l.options.len() {
            return Err(EngineError::InvalidResponse(format!(
              "option {} is out of range",
              index
            )));
          }
          let correct = scoring::listening_correct(l, *index);
          let audio_script = if correct {
            s.script_revealed = true;
            s.xp_pending = LISTENING_XP;
            Some(l.audio_script.clone())
          } else {
            None
          };
          s.phase = Phase::Submitted;
          info!(target: "mission", correct, "Listening answer scored");
          return Ok(Verdict::Listening { correct, audio_script });
        }

        (ExerciseDefinition::GrammarCheck, LearnerResponse::FreeText { text }) => {
          if text.trim().is_empty() {
            return Err(EngineError::InvalidResponse("nothing to check".into()));
          }
          deferred = Deferred::Grammar { text: text.clone() };
        }

        (ExerciseDefinition::NarrativeStep(seg), LearnerResponse::StoryChoice { index }) => {
          let chosen = seg
            .options
            .get(*index)
            .cloned()
            .ok_or_else(|| EngineError::InvalidResponse(format!("choice {} is out of range", index)))?;
          let mut history = s.story_log.clone();
          history.push(format!("User chose: {}", chosen));
          deferred = Deferred::Story { history, chosen };
        }

        (ExerciseDefinition::SpeakingChallenge(sp), LearnerResponse::Speech { audio_b64, mime }) => {
          if s.recognizing {
            return Err(EngineError::RecognitionFailure(
              "a recognition is already in flight".into(),
            ));
          }
          let audio = BASE64
            .decode(audio_b64)
            .map_err(|e| EngineError::RecognitionFailure(format!("could not decode audio: {e}")))?;
          s.recognizing = true;
          deferred = Deferred::Speech {
            audio,
            mime: mime.clone(),
            phrase: sp.phrase.clone(),
            keywords: sp.keywords.clone(),
          };
        }

        _ => {
          return Err(EngineError::InvalidResponse(format!(
            "response does not fit a {} mission",
            exercise.kind()
          )))
        }
      }
    }

    match deferred {
      Deferred::Grammar { text } => {
        let (difficulty, generation) = self.session_keys().await?;
        let band = curriculum::describe(difficulty);
        let feedback = self.provider.grammar_feedback(difficulty, band, &text).await?;
        let xp = scoring::grammar_award(&feedback);

        let mut slot = self.session.write().await;
        let s = require_generation(&mut *slot, generation, "submit")?;
        s.xp_pending += xp;
        s.phase = Phase::Submitted;
        info!(target: "mission", provider_score = feedback.score, xp, "Grammar submission scored");
        Ok(Verdict::Grammar { feedback, xp })
      }

      Deferred::Story { history, chosen } => {
        let (difficulty, generation) = self.session_keys().await?;
        let band = curriculum::describe(difficulty);
        let segment = self.provider.narrative_step(difficulty, band, &history, &chosen).await?;
        ExerciseDefinition::NarrativeStep(segment.clone()).validate()?;

        let mut slot = self.session.write().await;
        let s = require_generation(&mut *slot, generation, "submit")?;
        s.story_log.push(format!("User chose: {}", chosen));
        s.story_log.push(segment.text.clone());
        s.next_segment = Some(segment);
        s.phase = Phase::Submitted;
        Ok(Verdict::Story { chosen })
      }

      Deferred::Speech { audio, mime, phrase, keywords } => {
        let generation = self.session_keys().await?.1;
        let result = self.recognizer.transcribe(&audio, &mime).await;

        let mut slot = self.session.write().await;
        let s = require_generation(&mut *slot, generation, "submit")?;
        s.recognizing = false;
        let transcript = result?;
        let score = speech::match_utterance(&phrase, &keywords, &transcript)?;
        let passed = scoring::speaking_passed(score);
        s.phase = Phase::Submitted;
        info!(target: "mission", score, passed, "Speech attempt scored");
        Ok(Verdict::Speaking { transcript, score, passed })
      }
    }
  }

  /// Leave the Submitted phase: complete the mission, or loop back for
  /// another instance of the same kind (keeping cross-instance counters).
  #[instrument(level = "info", skip(self))]
  pub async fn advance(&self) -> Result<AdvanceOutcome, EngineError> {
    let (kind, difficulty, generation);
    {
      let mut slot = self.session.write().await;
      let s = require_phase(&mut *slot, Phase::Submitted, "advance")?;
      kind = s.kind;
      difficulty = s.difficulty;

      match kind {
        ExerciseKind::Vocabulary
        | ExerciseKind::MultiCloze
        | ExerciseKind::ReadingComprehension => {
          return Ok(complete(s));
        }
        ExerciseKind::GrammarCheck => {
          debug_assert_eq!(s.xp_pending, GRAMMAR_SUBMIT_XP);
          return Ok(complete(s));
        }
        ExerciseKind::SpeakingChallenge => {
          // The advance affordance is always available; only its label
          // changes with the score.
          s.xp_pending = SPEAKING_XP;
          return Ok(complete(s));
        }
        ExerciseKind::ListeningComprehension => {
          if s.script_revealed {
            return Ok(complete(s));
          }
          // Wrong answer: the instance is not retried, fetch a fresh one.
          s.phase = Phase::RequestingContent;
          generation = self.next_generation();
          s.generation = generation;
        }
        ExerciseKind::TenseCloze => {
          if s.tense_streak >= TENSE_STREAK_TARGET {
            s.xp_pending += TENSE_STREAK_XP;
            return Ok(complete(s));
          }
          s.phase = Phase::RequestingContent;
          generation = self.next_generation();
          s.generation = generation;
        }
        ExerciseKind::NarrativeStep => {
          let segment = s
            .next_segment
            .take()
            .expect("submitted narrative session has a continuation");
          s.phase = Phase::RequestingContent;
          generation = self.next_generation();
          s.generation = generation;
          drop(slot);
          let exercise = ExerciseDefinition::NarrativeStep(segment);
          self.install_exercise(generation, exercise.clone()).await?;
          return Ok(AdvanceOutcome::NextInstance(Box::new(exercise)));
        }
      }
    }

    // Loop-back kinds: fetch the next instance of the same kind.
    let band = curriculum::describe(difficulty);
    let fetched = match kind {
      ExerciseKind::TenseCloze => {
        self.provider.tense_cloze(difficulty, band).await.map(ExerciseDefinition::TenseCloze)
      }
      ExerciseKind::ListeningComprehension => self
        .provider
        .listening(difficulty, band)
        .await
        .map(ExerciseDefinition::ListeningComprehension),
      _ => unreachable!("only streak/retry kinds loop back"),
    };
    let exercise = match fetched {
      Ok(ex) => ex,
      Err(e) => {
        // Stuck in RequestingContent until the caller restarts; counters
        // survive because restart of the same kind is a retry.
        error!(target: "mission", kind = %kind, error = %e, "Reload failed");
        return Err(e);
      }
    };
    exercise.validate()?;
    self.install_exercise(generation, exercise.clone()).await?;

    if let ExerciseDefinition::ListeningComprehension(l) = &exercise {
      self.synth.speak(&l.audio_script, LanguageTag::En).await;
    }
    Ok(AdvanceOutcome::NextInstance(Box::new(exercise)))
  }

  /// Caller-driven bail-out from any phase. Late illustration or content
  /// results for this session are dropped, audio stops.
  #[instrument(level = "info", skip(self))]
  pub async fn abort(&self) {
    self.next_generation();
    self.synth.stop().await;
    let mut slot = self.session.write().await;
    if slot.take().is_some() {
      info!(target: "mission", "Session aborted");
    }
  }

  /// Illustration for the current exercise instance, if it has arrived.
  pub async fn illustration(&self) -> Option<String> {
    self.session.read().await.as_ref().and_then(|s| s.illustration_b64.clone())
  }

  /// Replay the hidden transmission of the active listening mission.
  pub async fn play_transmission(&self) -> Result<(), EngineError> {
    let script = {
      let slot = self.session.read().await;
      match slot.as_ref().and_then(|s| s.exercise.as_ref()) {
        Some(ExerciseDefinition::ListeningComprehension(l)) => l.audio_script.clone(),
        _ => return Err(EngineError::InvalidResponse("no listening mission is active".into())),
      }
    };
    self.synth.speak(&script, LanguageTag::En).await;
    Ok(())
  }

  /// Speak arbitrary visible text for the client (word cards, passages).
  pub async fn speak(&self, text: &str, language: LanguageTag) {
    self.synth.speak(text, language).await;
  }

  /// Stop any playing utterance.
  pub async fn stop_audio(&self) {
    self.synth.stop().await;
  }

  /// Current phase, if a session exists.
  pub async fn phase(&self) -> Option<Phase> {
    self.session.read().await.as_ref().map(|s| s.phase)
  }

  /// Exercise instance id, if a session exists.
  pub async fn exercise_id(&self) -> Option<String> {
    self.session.read().await.as_ref().map(|s| s.id.clone())
  }

  async fn session_keys(&self) -> Result<(DifficultyLevel, u64), EngineError> {
    let slot = self.session.read().await;
    slot
      .as_ref()
      .map(|s| (s.difficulty, s.generation))
      .ok_or(EngineError::InvalidTransition { from: "idle", action: "submit" })
  }
}

fn complete(s: &mut Session) -> AdvanceOutcome {
  s.phase = Phase::Completed;
  info!(target: "mission", kind = %s.kind, xp = s.xp_pending, "Mission complete");
  AdvanceOutcome::Completed { xp: s.xp_pending }
}

fn require_phase<'a>(
  slot: &'a mut Option<Session>,
  phase: Phase,
  action: &'static str,
) -> Result<&'a mut Session, EngineError> {
  match slot.as_mut() {
    None => Err(EngineError::InvalidTransition { from: "idle", action }),
    Some(s) if s.phase == phase => Ok(s),
    Some(s) => Err(EngineError::InvalidTransition { from: s.phase.name(), action }),
  }
}

/// Re-acquire the session after an awaited port call; the caller's view is
/// stale if the session was aborted or replaced meanwhile.
fn require_generation<'a>(
  slot: &'a mut Option<Session>,
  generation: u64,
  action: &'static str,
) -> Result<&'a mut Session, EngineError> {
  match slot.as_mut() {
    Some(s) if s.generation == generation => Ok(s),
    _ => Err(EngineError::InvalidTransition { from: "idle", action }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::curriculum::CurriculumBand;
  use crate::domain::{
    ClozeBlank, ListeningExercise, MultiClozeExercise, ReadingExercise, ReadingQuestion,
    SpeakingExercise, TenseClozeExercise, VocabularyWord,
  };
  use crate::ports::SilentSynthesis;
  use async_trait::async_trait;
  use std::sync::atomic::AtomicBool;
  use std::sync::Mutex;

  fn tense_fixture() -> TenseClozeExercise {
    TenseClozeExercise {
      sentence: "Yesterday, I [BLANK] to the moon.".into(),
      sentence_cn: None,
      correct_answer: "flew".into(),
      options: vec!["flew".into(), "fly".into(), "flying".into(), "flies".into()],
      explanation: "Past simple of fly.".into(),
      explanation_cn: None,
      tense_type: "Past Simple".into(),
      image_prompt: Some("a rocket over the moon".into()),
    }
  }

  fn listening_fixture() -> ListeningExercise {
    ListeningExercise {
      audio_script: "The alien's ship was green.".into(),
      question: "What color was the alien's ship?".into(),
      question_cn: None,
      options: vec!["Red".into(), "Green".into(), "Blue".into(), "Gold".into()],
      correct_index: 1,
      image_prompt: None,
    }
  }

  /// Scripted provider: fixed payloads, a switchable failure mode, and a
  /// keyword toggle for the malformed-response test.
  #[derive(Default)]
  struct ScriptedProvider {
    fail: AtomicBool,
    empty_keywords: AtomicBool,
    grammar_score: Mutex<u8>,
  }

  impl ScriptedProvider {
    fn check_fail(&self) -> Result<(), EngineError> {
      if self.fail.load(Ordering::SeqCst) {
        Err(EngineError::provider("scripted outage"))
      } else {
        Ok(())
      }
    }
  }

  #[async_trait]
  impl ContentProvider for ScriptedProvider {
    async fn vocabulary_set(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
      _topic: &str,
    ) -> Result<Vec<VocabularyWord>, EngineError> {
      self.check_fail()?;
      Ok(vec![
        VocabularyWord {
          word: "orbit".into(),
          definition: "the path around a planet".into(),
          definition_cn: None,
          example_sentence: "The ship is in orbit.".into(),
          example_sentence_cn: None,
          fun_fact: "Orbits can last for years.".into(),
          fun_fact_cn: None,
        },
        VocabularyWord {
          word: "comet".into(),
          definition: "an icy space rock".into(),
          definition_cn: None,
          example_sentence: "We saw a comet.".into(),
          example_sentence_cn: None,
          fun_fact: "Comets have two tails.".into(),
          fun_fact_cn: None,
        },
      ])
    }

    async fn grammar_feedback(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
      sentence: &str,
    ) -> Result<GrammarFeedback, EngineError> {
      self.check_fail()?;
      Ok(GrammarFeedback {
        corrected: sentence.replace("has", "have"),
        explanation: "Subject-verb agreement.".into(),
        explanation_cn: None,
        score: *self.grammar_score.lock().unwrap(),
      })
    }

    async fn narrative_step(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
      history: &[String],
      _action: &str,
    ) -> Result<NarrativeSegment, EngineError> {
      self.check_fail()?;
      Ok(NarrativeSegment {
        text: format!("Segment {}.", history.len() / 2 + 1),
        text_cn: None,
        options: vec!["Open the hatch".into(), "Run away".into()],
        options_cn: None,
        image_prompt: None,
      })
    }

    async fn tense_cloze(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
    ) -> Result<TenseClozeExercise, EngineError> {
      self.check_fail()?;
      Ok(tense_fixture())
    }

    async fn multi_cloze(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
    ) -> Result<MultiClozeExercise, EngineError> {
      self.check_fail()?;
      Ok(MultiClozeExercise {
        text: "The ___1___ rover found a ___2___.".into(),
        text_cn: None,
        blanks: vec![
          ClozeBlank { id: 1, correct_word: "red".into(), options: vec!["red".into(), "blue".into()] },
          ClozeBlank { id: 2, correct_word: "cat".into(), options: vec!["cat".into(), "dog".into()] },
        ],
        image_prompt: None,
      })
    }

    async fn reading(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
    ) -> Result<ReadingExercise, EngineError> {
      self.check_fail()?;
      Ok(ReadingExercise {
        title: "The Market".into(),
        passage: "Sam bought apples at the market.".into(),
        passage_cn: None,
        questions: vec![
          ReadingQuestion {
            question: "What did Sam buy?".into(),
            question_cn: None,
            options: vec!["Apples".into(), "Pears".into()],
            correct_index: 0,
          },
          ReadingQuestion {
            question: "Where was Sam?".into(),
            question_cn: None,
            options: vec!["At school".into(), "At the market".into()],
            correct_index: 1,
          },
        ],
        image_prompt: None,
      })
    }

    async fn listening(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
    ) -> Result<ListeningExercise, EngineError> {
      self.check_fail()?;
      Ok(listening_fixture())
    }

    async fn speaking(
      &self,
      _level: DifficultyLevel,
      _band: &CurriculumBand,
    ) -> Result<SpeakingExercise, EngineError> {
      self.check_fail()?;
      let keywords = if self.empty_keywords.load(Ordering::SeqCst) {
        vec![]
      } else {
        vec!["launch".into(), "ship".into()]
      };
      Ok(SpeakingExercise {
        phrase: "Launch the ship now".into(),
        phrase_cn: None,
        context: "You are commanding the ship to launch.".into(),
        keywords,
        image_prompt: None,
      })
    }
  }

  struct FixedRecognizer(&'static str);

  #[async_trait]
  impl SpeechRecognizer for FixedRecognizer {
    async fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String, EngineError> {
      Ok(self.0.to_string())
    }
  }

  /// Illustrator gated on a semaphore; returns the prompt bytes so tests
  /// can tell which request produced the image.
  struct GatedIllustrator {
    gate: Arc<tokio::sync::Semaphore>,
  }

  #[async_trait]
  impl Illustrator for GatedIllustrator {
    async fn illustrate(&self, prompt: &str) -> Result<Option<Vec<u8>>, EngineError> {
      let _permit = self.gate.acquire().await.map_err(|_| EngineError::IllustrationFailure("gate closed".into()))?;
      Ok(Some(prompt.as_bytes().to_vec()))
    }
  }

  fn controller_with(
    provider: Arc<ScriptedProvider>,
    illustrator: Arc<dyn Illustrator>,
    transcript: &'static str,
  ) -> SessionController {
    SessionController::new(
      provider,
      illustrator,
      Arc::new(SilentSynthesis::default()),
      Arc::new(FixedRecognizer(transcript)),
    )
  }

  fn controller(provider: Arc<ScriptedProvider>) -> SessionController {
    controller_with(provider, Arc::new(crate::ports::NoIllustrator), "launch it")
  }

  fn lv(n: u8) -> DifficultyLevel {
    DifficultyLevel::clamped(n as i64)
  }

  async fn submit_tense(c: &SessionController, option: &str) -> Verdict {
    c.submit(LearnerResponse::TenseOption { option: option.into() }).await.unwrap()
  }

  #[tokio::test]
  async fn submit_without_a_session_is_rejected() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    let err = c.submit(LearnerResponse::NextWord).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { from: "idle", .. }));
  }

  #[tokio::test]
  async fn submit_while_requesting_content_is_rejected() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.fail.store(true, Ordering::SeqCst);
    let c = controller(Arc::clone(&provider));
    assert!(c.start(ExerciseKind::TenseCloze, lv(4), None).await.is_err());
    assert_eq!(c.phase().await, Some(Phase::RequestingContent));

    let err = c.submit(LearnerResponse::TenseOption { option: "flew".into() }).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { from: "requesting_content", .. }));
  }

  #[tokio::test]
  async fn tense_streak_completes_after_three_in_a_row() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    c.start(ExerciseKind::TenseCloze, lv(4), None).await.unwrap();

    let mut completions = Vec::new();
    // correct, correct, incorrect, correct, correct, correct
    for option in ["flew", "flew", "fly", "flew", "flew", "flew"] {
      submit_tense(&c, option).await;
      match c.advance().await.unwrap() {
        AdvanceOutcome::Completed { xp } => completions.push(xp),
        AdvanceOutcome::NextInstance(_) => {}
      }
    }
    assert_eq!(completions, vec![TENSE_STREAK_XP]);
    assert_eq!(c.phase().await, Some(Phase::Completed));
  }

  #[tokio::test]
  async fn wrong_tense_answer_resets_the_streak() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    c.start(ExerciseKind::TenseCloze, lv(4), None).await.unwrap();

    submit_tense(&c, "flew").await;
    assert!(matches!(c.advance().await.unwrap(), AdvanceOutcome::NextInstance(_)));
    submit_tense(&c, "flew").await;
    assert!(matches!(c.advance().await.unwrap(), AdvanceOutcome::NextInstance(_)));

    let verdict = submit_tense(&c, "fly").await;
    match verdict {
      Verdict::Tense { correct, streak, .. } => {
        assert!(!correct);
        assert_eq!(streak, 0);
      }
      other => panic!("unexpected verdict {other:?}"),
    }
    // Two more correct answers are not enough after the reset.
    assert!(matches!(c.advance().await.unwrap(), AdvanceOutcome::NextInstance(_)));
    submit_tense(&c, "flew").await;
    assert!(matches!(c.advance().await.unwrap(), AdvanceOutcome::NextInstance(_)));
    submit_tense(&c, "flew").await;
    assert!(matches!(c.advance().await.unwrap(), AdvanceOutcome::NextInstance(_)));
  }

  #[tokio::test]
  async fn tense_streak_survives_a_reload_outage() {
    let provider = Arc::new(ScriptedProvider::default());
    let c = controller(Arc::clone(&provider));
    c.start(ExerciseKind::TenseCloze, lv(4), None).await.unwrap();

    submit_tense(&c, "flew").await;
    assert!(matches!(c.advance().await.unwrap(), AdvanceOutcome::NextInstance(_)));
    submit_tense(&c, "flew").await;

    provider.fail.store(true, Ordering::SeqCst);
    assert!(c.advance().await.is_err());
    assert_eq!(c.phase().await, Some(Phase::RequestingContent));

    // Restarting the same kind retries the request and keeps the streak.
    provider.fail.store(false, Ordering::SeqCst);
    c.start(ExerciseKind::TenseCloze, lv(4), None).await.unwrap();
    submit_tense(&c, "flew").await;
    match c.advance().await.unwrap() {
      AdvanceOutcome::Completed { xp } => assert_eq!(xp, TENSE_STREAK_XP),
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn vocabulary_completes_past_the_last_word() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    c.start(ExerciseKind::Vocabulary, lv(5), None).await.unwrap();

    match c.submit(LearnerResponse::NextWord).await.unwrap() {
      Verdict::WordAdvanced { index, total } => {
        assert_eq!(index, 1);
        assert_eq!(total, 2);
      }
      other => panic!("unexpected verdict {other:?}"),
    }
    assert_eq!(c.phase().await, Some(Phase::Presenting));

    match c.submit(LearnerResponse::NextWord).await.unwrap() {
      Verdict::SetFinished { xp } => assert_eq!(xp, VOCAB_SET_XP),
      other => panic!("unexpected verdict {other:?}"),
    }
    match c.advance().await.unwrap() {
      AdvanceOutcome::Completed { xp } => assert_eq!(xp, VOCAB_SET_XP),
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn grammar_awards_ten_even_for_a_low_provider_score() {
    let provider = Arc::new(ScriptedProvider::default());
    *provider.grammar_score.lock().unwrap() = 3;
    let c = controller(Arc::clone(&provider));
    c.start(ExerciseKind::GrammarCheck, lv(5), None).await.unwrap();

    match c.submit(LearnerResponse::FreeText { text: "I has a cat".into() }).await.unwrap() {
      Verdict::Grammar { feedback, xp } => {
        assert_eq!(feedback.score, 3);
        assert_eq!(xp, GRAMMAR_SUBMIT_XP);
      }
      other => panic!("unexpected verdict {other:?}"),
    }
    match c.advance().await.unwrap() {
      AdvanceOutcome::Completed { xp } => assert_eq!(xp, GRAMMAR_SUBMIT_XP),
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn cloze_merges_partial_selections_with_the_submission() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    c.start(ExerciseKind::MultiCloze, lv(5), None).await.unwrap();

    c.select_blank(1, "red".into()).await.unwrap();
    let verdict = c
      .submit(LearnerResponse::ClozeBlanks { answers: HashMap::from([(2, "dog".into())]) })
      .await
      .unwrap();
    match verdict {
      Verdict::Cloze(score) => {
        assert_eq!(score.correct_count, 1);
        assert_eq!(score.xp, 10);
      }
      other => panic!("unexpected verdict {other:?}"),
    }
    match c.advance().await.unwrap() {
      AdvanceOutcome::Completed { xp } => assert_eq!(xp, 10),
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn listening_wrong_answer_loops_to_a_fresh_instance() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    c.start(ExerciseKind::ListeningComprehension, lv(5), None).await.unwrap();
    let first_id = c.exercise_id().await.unwrap();

    match c.submit(LearnerResponse::OptionIndex { index: 0 }).await.unwrap() {
      Verdict::Listening { correct, audio_script } => {
        assert!(!correct);
        assert!(audio_script.is_none());
      }
      other => panic!("unexpected verdict {other:?}"),
    }
    assert!(matches!(c.advance().await.unwrap(), AdvanceOutcome::NextInstance(_)));
    assert_ne!(c.exercise_id().await.unwrap(), first_id);

    match c.submit(LearnerResponse::OptionIndex { index: 1 }).await.unwrap() {
      Verdict::Listening { correct, audio_script } => {
        assert!(correct);
        assert_eq!(audio_script.as_deref(), Some("The alien's ship was green."));
      }
      other => panic!("unexpected verdict {other:?}"),
    }
    match c.advance().await.unwrap() {
      AdvanceOutcome::Completed { xp } => assert_eq!(xp, LISTENING_XP),
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn speaking_advance_awards_even_below_the_pass_line() {
    // Transcript misses every keyword: pity-floor score, not a pass.
    let c = controller_with(
      Arc::new(ScriptedProvider::default()),
      Arc::new(crate::ports::NoIllustrator),
      "good morning",
    );
    c.start(ExerciseKind::SpeakingChallenge, lv(5), None).await.unwrap();

    let audio = BASE64.encode(b"pcm");
    match c
      .submit(LearnerResponse::Speech { audio_b64: audio, mime: "audio/webm".into() })
      .await
      .unwrap()
    {
      Verdict::Speaking { score, passed, .. } => {
        assert_eq!(score, 20);
        assert!(!passed);
      }
      other => panic!("unexpected verdict {other:?}"),
    }
    match c.advance().await.unwrap() {
      AdvanceOutcome::Completed { xp } => assert_eq!(xp, SPEAKING_XP),
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn malformed_speaking_payload_is_rejected_at_start() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.empty_keywords.store(true, Ordering::SeqCst);
    let c = controller(Arc::clone(&provider));
    let err = c.start(ExerciseKind::SpeakingChallenge, lv(5), None).await.unwrap_err();
    assert!(matches!(err, EngineError::MalformedExercise(_)));
    assert_eq!(c.phase().await, Some(Phase::RequestingContent));
  }

  #[tokio::test]
  async fn narrative_threads_history_forward() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    c.start(ExerciseKind::NarrativeStep, lv(5), None).await.unwrap();

    match c.submit(LearnerResponse::StoryChoice { index: 0 }).await.unwrap() {
      Verdict::Story { chosen } => assert_eq!(chosen, "Open the hatch"),
      other => panic!("unexpected verdict {other:?}"),
    }
    match c.advance().await.unwrap() {
      AdvanceOutcome::NextInstance(ex) => match *ex {
        ExerciseDefinition::NarrativeStep(seg) => assert_eq!(seg.text, "Segment 2."),
        other => panic!("unexpected exercise {other:?}"),
      },
      other => panic!("expected next segment, got {other:?}"),
    }
    assert_eq!(c.phase().await, Some(Phase::Presenting));
  }

  #[tokio::test]
  async fn stale_illustration_results_are_discarded() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let c = controller_with(
      Arc::new(ScriptedProvider::default()),
      Arc::new(GatedIllustrator { gate: Arc::clone(&gate) }),
      "launch it",
    );

    // First mission parks an illustration request behind the gate, then the
    // session moves on to a different mission before the image lands.
    c.start(ExerciseKind::TenseCloze, lv(4), None).await.unwrap();
    c.start(ExerciseKind::MultiCloze, lv(4), None).await.unwrap();

    gate.add_permits(2);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // The tense image resolved after its instance was superseded; nothing
    // may be applied to the cloze session (whose payload has no prompt).
    assert_eq!(c.illustration().await, None);
    assert_eq!(c.phase().await, Some(Phase::Presenting));
  }

  #[tokio::test]
  async fn abort_discards_the_session() {
    let c = controller(Arc::new(ScriptedProvider::default()));
    c.start(ExerciseKind::TenseCloze, lv(4), None).await.unwrap();
    c.abort().await;
    assert_eq!(c.phase().await, None);
    let err = c.advance().await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { from: "idle", .. }));
  }
}
