//! Domain models: difficulty, learner profile, exercise kinds and payloads.
//!
//! `ExerciseDefinition` is the closed union of everything the content
//! provider can hand us. Payloads are immutable once received; `validate`
//! enforces each kind's required-field contract so a malformed provider
//! response is rejected before it reaches a session.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;

/// Difficulty band, always inside 1..=10. Every construction path clamps,
/// including deserialization, so curriculum lookups can assume the range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DifficultyLevel(u8);

impl DifficultyLevel {
  pub const MIN: u8 = 1;
  pub const MAX: u8 = 10;

  /// Clamping constructor for internal and deserialized values.
  pub fn clamped(raw: i64) -> Self {
    Self(raw.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
  }

  /// Validating constructor for raw API input.
  pub fn try_new(raw: u8) -> Result<Self, EngineError> {
    if (Self::MIN..=Self::MAX).contains(&raw) {
      Ok(Self(raw))
    } else {
      Err(EngineError::InvalidDifficulty(raw))
    }
  }

  pub fn get(self) -> u8 {
    self.0
  }
}

impl Default for DifficultyLevel {
  fn default() -> Self {
    Self(5)
  }
}

impl std::fmt::Display for DifficultyLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl<'de> Deserialize<'de> for DifficultyLevel {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let raw = i64::deserialize(d)?;
    Ok(Self::clamped(raw))
  }
}

/// Persisted learner profile. `level` is derived from `xp` by the
/// progression reducers; nothing else writes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub xp: u64,
  pub level: u32,
  pub streak: u32,
  #[serde(default, deserialize_with = "migrate_difficulty")]
  pub difficulty: DifficultyLevel,
  #[serde(default)]
  pub badges: BTreeSet<String>,
}

impl Default for UserProfile {
  fn default() -> Self {
    Self {
      xp: 0,
      level: 1,
      streak: 1,
      difficulty: DifficultyLevel::default(),
      badges: BTreeSet::new(),
    }
  }
}

/// One-time upgrade path for stored profiles: early builds persisted the
/// difficulty as a rank tag. Applied at load time only.
fn migrate_difficulty<'de, D: Deserializer<'de>>(d: D) -> Result<DifficultyLevel, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Num(i64),
    Tag(String),
  }
  Ok(match Raw::deserialize(d)? {
    Raw::Num(n) => DifficultyLevel::clamped(n),
    Raw::Tag(t) => match t.as_str() {
      "Cadet" => DifficultyLevel::clamped(2),
      "Admiral" => DifficultyLevel::clamped(9),
      _ => DifficultyLevel::default(),
    },
  })
}

/// Which mission is being practiced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
  Vocabulary,
  GrammarCheck,
  NarrativeStep,
  TenseCloze,
  MultiCloze,
  ReadingComprehension,
  ListeningComprehension,
  SpeakingChallenge,
}

impl ExerciseKind {
  /// Stable label for logs.
  pub fn label(self) -> &'static str {
    match self {
      ExerciseKind::Vocabulary => "vocabulary",
      ExerciseKind::GrammarCheck => "grammar_check",
      ExerciseKind::NarrativeStep => "narrative_step",
      ExerciseKind::TenseCloze => "tense_cloze",
      ExerciseKind::MultiCloze => "multi_cloze",
      ExerciseKind::ReadingComprehension => "reading_comprehension",
      ExerciseKind::ListeningComprehension => "listening_comprehension",
      ExerciseKind::SpeakingChallenge => "speaking_challenge",
    }
  }
}

impl std::fmt::Display for ExerciseKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.label())
  }
}

// Kind payloads. The `*_cn` fields are optional Chinese mirrors of the
// presentation text; `image_prompt` feeds the best-effort illustration port.

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VocabularyWord {
  pub word: String,
  pub definition: String,
  #[serde(default)] pub definition_cn: Option<String>,
  pub example_sentence: String,
  #[serde(default)] pub example_sentence_cn: Option<String>,
  pub fun_fact: String,
  #[serde(default)] pub fun_fact_cn: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NarrativeSegment {
  pub text: String,
  #[serde(default)] pub text_cn: Option<String>,
  pub options: Vec<String>,
  #[serde(default)] pub options_cn: Option<Vec<String>>,
  #[serde(default)] pub image_prompt: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenseClozeExercise {
  /// Sentence with a single `[BLANK]` marker.
  pub sentence: String,
  #[serde(default)] pub sentence_cn: Option<String>,
  pub correct_answer: String,
  pub options: Vec<String>,
  pub explanation: String,
  #[serde(default)] pub explanation_cn: Option<String>,
  pub tense_type: String,
  #[serde(default)] pub image_prompt: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClozeBlank {
  pub id: u32,
  pub correct_word: String,
  pub options: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiClozeExercise {
  /// Passage with `___N___` placeholders, one per blank id.
  pub text: String,
  #[serde(default)] pub text_cn: Option<String>,
  pub blanks: Vec<ClozeBlank>,
  #[serde(default)] pub image_prompt: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadingQuestion {
  pub question: String,
  #[serde(default)] pub question_cn: Option<String>,
  pub options: Vec<String>,
  pub correct_index: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadingExercise {
  pub title: String,
  pub passage: String,
  #[serde(default)] pub passage_cn: Option<String>,
  pub questions: Vec<ReadingQuestion>,
  #[serde(default)] pub image_prompt: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListeningExercise {
  /// Spoken to the learner, hidden from the transcript until solved.
  pub audio_script: String,
  pub question: String,
  #[serde(default)] pub question_cn: Option<String>,
  pub options: Vec<String>,
  pub correct_index: usize,
  #[serde(default)] pub image_prompt: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpeakingExercise {
  pub phrase: String,
  #[serde(default)] pub phrase_cn: Option<String>,
  pub context: String,
  pub keywords: Vec<String>,
  #[serde(default)] pub image_prompt: Option<String>,
}

/// Grammar feedback is produced per submission, not pre-fetched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrammarFeedback {
  pub corrected: String,
  pub explanation: String,
  #[serde(default)] pub explanation_cn: Option<String>,
  /// Provider-assigned 1..=10. Informational only; never gates the award.
  pub score: u8,
}

/// Closed union of exercise payloads, one variant per kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExerciseDefinition {
  Vocabulary { words: Vec<VocabularyWord> },
  /// Open writing prompt; the correction request happens at submit time.
  GrammarCheck,
  NarrativeStep(NarrativeSegment),
  TenseCloze(TenseClozeExercise),
  MultiCloze(MultiClozeExercise),
  ReadingComprehension(ReadingExercise),
  ListeningComprehension(ListeningExercise),
  SpeakingChallenge(SpeakingExercise),
}

impl ExerciseDefinition {
  pub fn kind(&self) -> ExerciseKind {
    match self {
      ExerciseDefinition::Vocabulary { .. } => ExerciseKind::Vocabulary,
      ExerciseDefinition::GrammarCheck => ExerciseKind::GrammarCheck,
      ExerciseDefinition::NarrativeStep(_) => ExerciseKind::NarrativeStep,
      ExerciseDefinition::TenseCloze(_) => ExerciseKind::TenseCloze,
      ExerciseDefinition::MultiCloze(_) => ExerciseKind::MultiCloze,
      ExerciseDefinition::ReadingComprehension(_) => ExerciseKind::ReadingComprehension,
      ExerciseDefinition::ListeningComprehension(_) => ExerciseKind::ListeningComprehension,
      ExerciseDefinition::SpeakingChallenge(_) => ExerciseKind::SpeakingChallenge,
    }
  }

  pub fn image_prompt(&self) -> Option<&str> {
    match self {
      ExerciseDefinition::Vocabulary { .. } | ExerciseDefinition::GrammarCheck => None,
      ExerciseDefinition::NarrativeStep(s) => s.image_prompt.as_deref(),
      ExerciseDefinition::TenseCloze(t) => t.image_prompt.as_deref(),
      ExerciseDefinition::MultiCloze(c) => c.image_prompt.as_deref(),
      ExerciseDefinition::ReadingComprehension(r) => r.image_prompt.as_deref(),
      ExerciseDefinition::ListeningComprehension(l) => l.image_prompt.as_deref(),
      ExerciseDefinition::SpeakingChallenge(s) => s.image_prompt.as_deref(),
    }
  }

  /// Enforce the per-kind required-field contract on a provider response.
  pub fn validate(&self) -> Result<(), EngineError> {
    match self {
      ExerciseDefinition::Vocabulary { words } => {
        if words.is_empty() {
          return Err(EngineError::malformed("vocabulary set has no words"));
        }
        if words.iter().any(|w| w.word.trim().is_empty()) {
          return Err(EngineError::malformed("vocabulary word is empty"));
        }
      }
      ExerciseDefinition::GrammarCheck => {}
      ExerciseDefinition::NarrativeStep(seg) => {
        if seg.text.trim().is_empty() {
          return Err(EngineError::malformed("narrative segment has no text"));
        }
        if seg.options.is_empty() || seg.options.len() > 4 {
          return Err(EngineError::malformed(format!(
            "narrative segment has {} options, expected 1..=4",
            seg.options.len()
          )));
        }
      }
      ExerciseDefinition::TenseCloze(t) => {
        if !t.sentence.contains("[BLANK]") {
          return Err(EngineError::malformed("tense sentence has no [BLANK] marker"));
        }
        if t.options.is_empty() {
          return Err(EngineError::malformed("tense exercise has no options"));
        }
        if !t.options.iter().any(|o| o == &t.correct_answer) {
          return Err(EngineError::malformed("tense options do not include the answer"));
        }
      }
      ExerciseDefinition::MultiCloze(c) => {
        if c.blanks.is_empty() {
          return Err(EngineError::malformed("cloze passage has no blanks"));
        }
        let mut seen = BTreeSet::new();
        for b in &c.blanks {
          if !seen.insert(b.id) {
            return Err(EngineError::malformed(format!("duplicate blank id {}", b.id)));
          }
          if !b.options.iter().any(|o| o == &b.correct_word) {
            return Err(EngineError::malformed(format!(
              "blank {} options do not include its word",
              b.id
            )));
          }
          if !c.text.contains(&format!("___{}___", b.id)) {
            return Err(EngineError::malformed(format!(
              "blank {} has no placeholder in the passage",
              b.id
            )));
          }
        }
        for id in placeholder_ids(&c.text) {
          if !seen.contains(&id) {
            return Err(EngineError::malformed(format!(
              "placeholder ___{}___ has no blank entry",
              id
            )));
          }
        }
      }
      ExerciseDefinition::ReadingComprehension(r) => {
        if r.questions.is_empty() {
          return Err(EngineError::malformed("reading exercise has no questions"));
        }
        for (i, q) in r.questions.iter().enumerate() {
          if q.options.is_empty() || q.correct_index >= q.options.len() {
            return Err(EngineError::malformed(format!(
              "reading question {} has a correct_index outside its options",
              i
            )));
          }
        }
      }
      ExerciseDefinition::ListeningComprehension(l) => {
        if l.audio_script.trim().is_empty() {
          return Err(EngineError::malformed("listening exercise has no audio script"));
        }
        if l.options.is_empty() || l.correct_index >= l.options.len() {
          return Err(EngineError::malformed(
            "listening correct_index outside its options",
          ));
        }
      }
      ExerciseDefinition::SpeakingChallenge(s) => {
        if s.phrase.trim().is_empty() {
          return Err(EngineError::malformed("speaking challenge has no phrase"));
        }
        if s.keywords.is_empty() {
          return Err(EngineError::malformed("speaking challenge has no keywords"));
        }
      }
    }
    Ok(())
  }
}

/// Blank ids referenced by `___N___` placeholders in a cloze passage.
pub fn placeholder_ids(text: &str) -> Vec<u32> {
  let mut ids = Vec::new();
  let mut rest = text;
  while let Some(start) = rest.find("___") {
    let after = &rest[start + 3..];
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() && after[digits.len()..].starts_with("___") {
      if let Ok(id) = digits.parse::<u32>() {
        ids.push(id);
      }
      rest = &after[digits.len() + 3..];
    } else {
      rest = &rest[start + 3..];
    }
  }
  ids
}

/// What the learner handed back for the current exercise instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearnerResponse {
  /// Vocabulary: advance the reading cursor.
  NextWord,
  /// GrammarCheck: the sentence to correct.
  FreeText { text: String },
  /// NarrativeStep: index into the current segment's options.
  StoryChoice { index: usize },
  /// TenseCloze: the chosen option text.
  TenseOption { option: String },
  /// MultiCloze: blank id -> chosen word (merged over partial selections).
  ClozeBlanks { answers: HashMap<u32, String> },
  /// ReadingComprehension: question index -> option index.
  ReadingAnswers { answers: HashMap<usize, usize> },
  /// ListeningComprehension: the chosen option index.
  OptionIndex { index: usize },
  /// SpeakingChallenge: recorded audio for recognition.
  Speech { audio_b64: String, mime: String },
}

/// Language for synthesized audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageTag {
  En,
  Zh,
}

impl LanguageTag {
  pub fn bcp47(self) -> &'static str {
    match self {
      LanguageTag::En => "en-US",
      LanguageTag::Zh => "zh-CN",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_clamps_on_deserialize() {
    let lv: DifficultyLevel = serde_json::from_str("99").unwrap();
    assert_eq!(lv.get(), 10);
    let lv: DifficultyLevel = serde_json::from_str("-3").unwrap();
    assert_eq!(lv.get(), 1);
  }

  #[test]
  fn difficulty_try_new_rejects_out_of_range() {
    assert!(DifficultyLevel::try_new(0).is_err());
    assert!(DifficultyLevel::try_new(11).is_err());
    assert_eq!(DifficultyLevel::try_new(7).unwrap().get(), 7);
  }

  #[test]
  fn profile_migrates_legacy_rank_tags() {
    let p: UserProfile =
      serde_json::from_str(r#"{"xp":120,"level":2,"streak":4,"difficulty":"Admiral"}"#).unwrap();
    assert_eq!(p.difficulty.get(), 9);

    let p: UserProfile =
      serde_json::from_str(r#"{"xp":0,"level":1,"streak":1,"difficulty":"Cadet"}"#).unwrap();
    assert_eq!(p.difficulty.get(), 2);

    let p: UserProfile =
      serde_json::from_str(r#"{"xp":0,"level":1,"streak":1,"difficulty":"Ensign"}"#).unwrap();
    assert_eq!(p.difficulty.get(), 5);
  }

  #[test]
  fn profile_without_difficulty_defaults_to_five() {
    let p: UserProfile = serde_json::from_str(r#"{"xp":50,"level":1,"streak":2}"#).unwrap();
    assert_eq!(p.difficulty.get(), 5);
  }

  #[test]
  fn speaking_without_keywords_is_rejected() {
    let ex = ExerciseDefinition::SpeakingChallenge(SpeakingExercise {
      phrase: "I like playing football".into(),
      phrase_cn: None,
      context: "Tell your friend what you like".into(),
      keywords: vec![],
      image_prompt: None,
    });
    assert!(matches!(ex.validate(), Err(EngineError::MalformedExercise(_))));
  }

  #[test]
  fn cloze_with_dangling_blank_is_rejected() {
    let ex = ExerciseDefinition::MultiCloze(MultiClozeExercise {
      text: "The ___1___ ship left.".into(),
      text_cn: None,
      blanks: vec![
        ClozeBlank { id: 1, correct_word: "red".into(), options: vec!["red".into(), "blue".into()] },
        ClozeBlank { id: 2, correct_word: "cat".into(), options: vec!["cat".into(), "dog".into()] },
      ],
      image_prompt: None,
    });
    assert!(matches!(ex.validate(), Err(EngineError::MalformedExercise(_))));
  }

  #[test]
  fn placeholder_scan_finds_ids() {
    assert_eq!(placeholder_ids("a ___1___ b ___2___ c"), vec![1, 2]);
    assert_eq!(placeholder_ids("no blanks here"), Vec::<u32>::new());
  }

  #[test]
  fn reading_with_bad_index_is_rejected() {
    let ex = ExerciseDefinition::ReadingComprehension(ReadingExercise {
      title: "The Zoo".into(),
      passage: "The monkeys were loud.".into(),
      passage_cn: None,
      questions: vec![ReadingQuestion {
        question: "Who was loud?".into(),
        question_cn: None,
        options: vec!["The monkeys".into(), "The lions".into()],
        correct_index: 5,
      }],
      image_prompt: None,
    });
    assert!(matches!(ex.validate(), Err(EngineError::MalformedExercise(_))));
  }
}
