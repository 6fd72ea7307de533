//! Built-in exercise bank and the offline content provider.
//!
//! When no model API key is configured the engine still works: missions are
//! served from this small hand-curated pool and grammar feedback falls back
//! to a local heuristic. This is a provider implementation, not a retry
//! path; a request failure on the configured provider is still surfaced.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::curriculum::CurriculumBand;
use crate::domain::{
  ClozeBlank, DifficultyLevel, GrammarFeedback, ListeningExercise, MultiClozeExercise,
  NarrativeSegment, ReadingExercise, ReadingQuestion, SpeakingExercise, TenseClozeExercise,
  VocabularyWord,
};
use crate::error::EngineError;
use crate::ports::ContentProvider;

pub struct SeedProvider;

fn word(
  word: &str,
  definition: &str,
  definition_cn: &str,
  example: &str,
  fun_fact: &str,
) -> VocabularyWord {
  VocabularyWord {
    word: word.into(),
    definition: definition.into(),
    definition_cn: Some(definition_cn.into()),
    example_sentence: example.into(),
    example_sentence_cn: None,
    fun_fact: fun_fact.into(),
    fun_fact_cn: None,
  }
}

fn seed_vocabulary() -> Vec<VocabularyWord> {
  vec![
    word(
      "galaxy",
      "a huge group of stars",
      "星系",
      "Our ship flew across the galaxy.",
      "The Milky Way has more than 100 billion stars.",
    ),
    word(
      "telescope",
      "a tool that makes far things look close",
      "望远镜",
      "I looked at the moon with my telescope.",
      "The first telescopes were made for sailors.",
    ),
    word(
      "gravity",
      "the force that pulls things down",
      "重力",
      "Gravity keeps us on the ground.",
      "On the moon, gravity is six times weaker.",
    ),
  ]
}

fn seed_tense_pool() -> Vec<TenseClozeExercise> {
  vec![
    TenseClozeExercise {
      sentence: "Yesterday, the crew [BLANK] a strange signal.".into(),
      sentence_cn: Some("昨天，船员们收到了一个奇怪的信号。".into()),
      correct_answer: "heard".into(),
      options: vec!["heard".into(), "hear".into(), "hears".into(), "hearing".into()],
      explanation: "'Yesterday' points to the past, so we use the past simple 'heard'.".into(),
      explanation_cn: Some("“Yesterday”表示过去，所以用过去式 heard。".into()),
      tense_type: "Past Simple".into(),
      image_prompt: Some("a space crew listening to a radio signal".into()),
    },
    TenseClozeExercise {
      sentence: "Right now, the robot [BLANK] the engine room.".into(),
      sentence_cn: None,
      correct_answer: "is cleaning".into(),
      options: vec!["is cleaning".into(), "cleaned".into(), "cleans".into(), "clean".into()],
      explanation: "'Right now' asks for the present continuous.".into(),
      explanation_cn: None,
      tense_type: "Present Continuous".into(),
      image_prompt: Some("a friendly robot cleaning an engine room".into()),
    },
    TenseClozeExercise {
      sentence: "Tomorrow we [BLANK] the red planet.".into(),
      sentence_cn: None,
      correct_answer: "will visit".into(),
      options: vec!["will visit".into(), "visited".into(), "visits".into(), "visiting".into()],
      explanation: "'Tomorrow' needs the future with 'will'.".into(),
      explanation_cn: None,
      tense_type: "Future Simple".into(),
      image_prompt: Some("a rocket approaching a red planet".into()),
    },
  ]
}

fn seed_cloze_pool() -> Vec<MultiClozeExercise> {
  vec![MultiClozeExercise {
    text: "The little rover rolled over the ___1___ sand. It found a shiny ___2___ and sent a ___3___ home.".into(),
    text_cn: None,
    blanks: vec![
      ClozeBlank { id: 1, correct_word: "red".into(), options: vec!["red".into(), "loud".into(), "happy".into()] },
      ClozeBlank { id: 2, correct_word: "rock".into(), options: vec!["rock".into(), "song".into(), "cloud".into()] },
      ClozeBlank { id: 3, correct_word: "message".into(), options: vec!["message".into(), "sandwich".into(), "ladder".into()] },
    ],
    image_prompt: Some("a small rover on red sand".into()),
  }]
}

fn seed_reading_pool() -> Vec<ReadingExercise> {
  vec![ReadingExercise {
    title: "The Space Market".into(),
    passage: "Every Saturday there is a market on the station. Mira sells fruit from the garden dome. Today she traded three apples for a small star map. She wants to visit the ice moon next year.".into(),
    passage_cn: None,
    questions: vec![
      ReadingQuestion {
        question: "What does Mira sell?".into(),
        question_cn: None,
        options: vec!["Star maps".into(), "Fruit".into(), "Ice".into(), "Robots".into()],
        correct_index: 1,
      },
      ReadingQuestion {
        question: "What did she get for the apples?".into(),
        question_cn: None,
        options: vec!["A star map".into(), "A telescope".into(), "Three pears".into(), "A ticket".into()],
        correct_index: 0,
      },
    ],
    image_prompt: Some("a market inside a space station".into()),
  }]
}

fn seed_listening_pool() -> Vec<ListeningExercise> {
  vec![ListeningExercise {
    audio_script: "Attention crew: the blue shuttle leaves from gate four in ten minutes.".into(),
    question: "Which gate does the shuttle leave from?".into(),
    question_cn: None,
    options: vec!["Gate two".into(), "Gate three".into(), "Gate four".into(), "Gate five".into()],
    correct_index: 2,
    image_prompt: Some("a shuttle waiting at a departure gate".into()),
  }]
}

fn seed_speaking_pool() -> Vec<SpeakingExercise> {
  vec![
    SpeakingExercise {
      phrase: "Please open the cargo door".into(),
      phrase_cn: Some("请打开货舱门".into()),
      context: "You are asking the ship computer for help.".into(),
      keywords: vec!["open".into(), "cargo".into(), "door".into()],
      image_prompt: Some("a large cargo door on a spaceship".into()),
    },
    SpeakingExercise {
      phrase: "I can see two moons tonight".into(),
      phrase_cn: None,
      context: "Tell your friend what you can see from the window.".into(),
      keywords: vec!["see".into(), "two".into(), "moons".into()],
      image_prompt: Some("two moons over a quiet planet".into()),
    },
  ]
}

fn seed_story(step: usize) -> NarrativeSegment {
  let (text, options) = match step {
    0 => (
      "You find a strange glowing device half-buried in the sand. It hums softly when you come near, and two lights blink on its side.",
      vec!["Pick it up", "Call your crew first"],
    ),
    1 => (
      "The device warms in your hands and a tiny map appears above it. The map shows a cave behind the old landing pad.",
      vec!["Follow the map to the cave", "Take the device to the ship"],
    ),
    _ => (
      "Inside the cave the walls sparkle like stars. The device goes quiet, then projects one last word: HOME.",
      vec!["Touch the wall", "Head back outside"],
    ),
  };
  NarrativeSegment {
    text: text.into(),
    text_cn: None,
    options: options.into_iter().map(String::from).collect(),
    options_cn: None,
    image_prompt: Some("a glowing device in desert sand".into()),
  }
}

/// Tiny grammar heuristic for offline mode: fix terminal punctuation and
/// capitalization, score by how much had to change.
fn grammar_stub(text: &str) -> GrammarFeedback {
  let s = text.trim();
  let mut corrected = s.to_string();
  let mut notes: Vec<&str> = Vec::new();

  if let Some(first) = corrected.chars().next() {
    if first.is_ascii_lowercase() {
      let mut chars = corrected.chars();
      chars.next();
      corrected = first.to_ascii_uppercase().to_string() + chars.as_str();
      notes.push("Sentences start with a capital letter.");
    }
  }
  let ends_ok = matches!(corrected.chars().last(), Some('.') | Some('!') | Some('?'));
  if !ends_ok {
    corrected.push('.');
    notes.push("Sentences end with punctuation.");
  }

  let score = if notes.is_empty() { 9 } else { 6 };
  GrammarFeedback {
    corrected,
    explanation: if notes.is_empty() {
      "Looks good. Keep practicing longer sentences!".into()
    } else {
      notes.join(" ")
    },
    explanation_cn: None,
    score,
  }
}

#[async_trait]
impl ContentProvider for SeedProvider {
  async fn vocabulary_set(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
    _topic: &str,
  ) -> Result<Vec<VocabularyWord>, EngineError> {
    Ok(seed_vocabulary())
  }

  async fn grammar_feedback(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
    sentence: &str,
  ) -> Result<GrammarFeedback, EngineError> {
    Ok(grammar_stub(sentence))
  }

  async fn narrative_step(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
    history: &[String],
    _action: &str,
  ) -> Result<NarrativeSegment, EngineError> {
    // Two log entries per step (segment + choice line).
    Ok(seed_story(history.len() / 2))
  }

  async fn tense_cloze(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
  ) -> Result<TenseClozeExercise, EngineError> {
    pick(seed_tense_pool())
  }

  async fn multi_cloze(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
  ) -> Result<MultiClozeExercise, EngineError> {
    pick(seed_cloze_pool())
  }

  async fn reading(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
  ) -> Result<ReadingExercise, EngineError> {
    pick(seed_reading_pool())
  }

  async fn listening(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
  ) -> Result<ListeningExercise, EngineError> {
    pick(seed_listening_pool())
  }

  async fn speaking(
    &self,
    _level: DifficultyLevel,
    _band: &CurriculumBand,
  ) -> Result<SpeakingExercise, EngineError> {
    pick(seed_speaking_pool())
  }
}

fn pick<T: Clone>(pool: Vec<T>) -> Result<T, EngineError> {
  pool
    .choose(&mut rand::thread_rng())
    .cloned()
    .ok_or_else(|| EngineError::provider("seed pool is empty"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ExerciseDefinition;

  #[tokio::test]
  async fn every_seed_passes_contract_validation() {
    let p = SeedProvider;
    let lv = DifficultyLevel::default();
    let band = crate::curriculum::describe(lv);

    ExerciseDefinition::Vocabulary { words: p.vocabulary_set(lv, band, "Space").await.unwrap() }
      .validate()
      .unwrap();
    for ex in seed_tense_pool() {
      ExerciseDefinition::TenseCloze(ex).validate().unwrap();
    }
    for ex in seed_cloze_pool() {
      ExerciseDefinition::MultiCloze(ex).validate().unwrap();
    }
    for ex in seed_reading_pool() {
      ExerciseDefinition::ReadingComprehension(ex).validate().unwrap();
    }
    for ex in seed_listening_pool() {
      ExerciseDefinition::ListeningComprehension(ex).validate().unwrap();
    }
    for ex in seed_speaking_pool() {
      ExerciseDefinition::SpeakingChallenge(ex).validate().unwrap();
    }
    for step in 0..3 {
      ExerciseDefinition::NarrativeStep(seed_story(step)).validate().unwrap();
    }
  }

  #[test]
  fn grammar_stub_fixes_punctuation_and_case() {
    let fb = grammar_stub("i has a cat");
    assert_eq!(fb.corrected, "I has a cat.");
    assert!(fb.score < 9);

    let fb = grammar_stub("The ship is fast.");
    assert_eq!(fb.corrected, "The ship is fast.");
    assert_eq!(fb.score, 9);
  }
}
