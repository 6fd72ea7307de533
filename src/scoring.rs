//! Pure per-kind evaluators and the XP award table.
//!
//! Nothing here touches session or profile state; each function maps an
//! exercise definition plus the learner's answer(s) to a structured verdict
//! the session layer folds into its machine.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{GrammarFeedback, ListeningExercise, MultiClozeExercise, ReadingExercise, TenseClozeExercise};

/// XP for finishing a vocabulary word set.
pub const VOCAB_SET_XP: u64 = 50;
/// XP for every grammar submission. The provider's 1-10 score is feedback
/// only and never gates this award.
pub const GRAMMAR_SUBMIT_XP: u64 = 10;
/// Consecutive correct tense answers needed to finish the mission.
pub const TENSE_STREAK_TARGET: u32 = 3;
/// XP for completing a tense streak.
pub const TENSE_STREAK_XP: u64 = 30;
/// XP per correctly filled cloze blank.
pub const CLOZE_BLANK_XP: u64 = 10;
/// XP per correctly answered reading question.
pub const READING_QUESTION_XP: u64 = 15;
/// XP for solving a listening transmission.
pub const LISTENING_XP: u64 = 25;
/// XP for a speaking mission, awarded on the learner's advance.
pub const SPEAKING_XP: u64 = 30;
/// Speaking passes strictly above this match score.
pub const SPEAKING_PASS_THRESHOLD: u8 = 60;

/// Tense answers are an exact, case-sensitive match against the designated
/// option. No trimming beyond what the provider supplied.
pub fn tense_correct(exercise: &TenseClozeExercise, option: &str) -> bool {
  option == exercise.correct_answer
}

/// Listening is a single closed choice.
pub fn listening_correct(exercise: &ListeningExercise, index: usize) -> bool {
  index == exercise.correct_index
}

/// Whether a speech match score clears the pass line.
pub fn speaking_passed(score: u8) -> bool {
  score > SPEAKING_PASS_THRESHOLD
}

/// Grammar submissions always award the same XP; the verdict carries the
/// provider feedback through untouched.
pub fn grammar_award(_feedback: &GrammarFeedback) -> u64 {
  GRAMMAR_SUBMIT_XP
}

#[derive(Clone, Debug, Serialize)]
pub struct BlankResult {
  pub id: u32,
  pub chosen: Option<String>,
  pub correct: bool,
  pub correct_word: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ClozeScore {
  pub results: Vec<BlankResult>,
  pub correct_count: u32,
  pub total: u32,
  pub xp: u64,
}

/// Score every blank of a cloze passage in one pass. Unfilled blanks count
/// as incorrect; per-blank correctness is an exact match.
pub fn score_multi_cloze(
  exercise: &MultiClozeExercise,
  answers: &HashMap<u32, String>,
) -> ClozeScore {
  let mut results = Vec::with_capacity(exercise.blanks.len());
  let mut correct_count = 0u32;
  for blank in &exercise.blanks {
    let chosen = answers.get(&blank.id).cloned();
    let correct = chosen.as_deref() == Some(blank.correct_word.as_str());
    if correct {
      correct_count += 1;
    }
    results.push(BlankResult {
      id: blank.id,
      chosen,
      correct,
      correct_word: blank.correct_word.clone(),
    });
  }
  ClozeScore {
    results,
    correct_count,
    total: exercise.blanks.len() as u32,
    xp: correct_count as u64 * CLOZE_BLANK_XP,
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct QuestionResult {
  pub index: usize,
  pub chosen: Option<usize>,
  pub correct: bool,
  pub correct_index: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReadingScore {
  pub results: Vec<QuestionResult>,
  pub correct_count: u32,
  pub total: u32,
  pub xp: u64,
}

/// Score all comprehension questions simultaneously. Questions left
/// unanswered at submission count as incorrect.
pub fn score_reading(
  exercise: &ReadingExercise,
  answers: &HashMap<usize, usize>,
) -> ReadingScore {
  let mut results = Vec::with_capacity(exercise.questions.len());
  let mut correct_count = 0u32;
  for (index, question) in exercise.questions.iter().enumerate() {
    let chosen = answers.get(&index).copied();
    let correct = chosen == Some(question.correct_index);
    if correct {
      correct_count += 1;
    }
    results.push(QuestionResult {
      index,
      chosen,
      correct,
      correct_index: question.correct_index,
    });
  }
  ReadingScore {
    results,
    correct_count,
    total: exercise.questions.len() as u32,
    xp: correct_count as u64 * READING_QUESTION_XP,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ClozeBlank, ReadingQuestion};

  fn cloze_fixture() -> MultiClozeExercise {
    MultiClozeExercise {
      text: "The ___1___ rover found a ___2___.".into(),
      text_cn: None,
      blanks: vec![
        ClozeBlank { id: 1, correct_word: "red".into(), options: vec!["red".into(), "blue".into()] },
        ClozeBlank { id: 2, correct_word: "cat".into(), options: vec!["cat".into(), "dog".into()] },
      ],
      image_prompt: None,
    }
  }

  #[test]
  fn cloze_scores_each_blank_independently() {
    let answers = HashMap::from([(1, "red".to_string()), (2, "dog".to_string())]);
    let score = score_multi_cloze(&cloze_fixture(), &answers);
    assert_eq!(score.correct_count, 1);
    assert_eq!(score.total, 2);
    assert_eq!(score.xp, 10);
    assert!(score.results[0].correct);
    assert!(!score.results[1].correct);
  }

  #[test]
  fn cloze_unfilled_blank_is_incorrect() {
    let answers = HashMap::from([(1, "red".to_string())]);
    let score = score_multi_cloze(&cloze_fixture(), &answers);
    assert_eq!(score.correct_count, 1);
    assert_eq!(score.results[1].chosen, None);
    assert!(!score.results[1].correct);
  }

  fn reading_fixture() -> ReadingExercise {
    ReadingExercise {
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
    }
  }

  #[test]
  fn reading_scores_one_of_two() {
    let answers = HashMap::from([(0, 0), (1, 0)]);
    let score = score_reading(&reading_fixture(), &answers);
    assert_eq!(score.correct_count, 1);
    assert_eq!(score.xp, 15);
  }

  #[test]
  fn reading_unanswered_question_counts_as_incorrect() {
    let answers = HashMap::from([(0, 0)]);
    let score = score_reading(&reading_fixture(), &answers);
    assert_eq!(score.correct_count, 1);
    assert_eq!(score.results[1].chosen, None);
    assert!(!score.results[1].correct);
  }

  #[test]
  fn tense_match_is_case_sensitive() {
    let ex = TenseClozeExercise {
      sentence: "Yesterday, I [BLANK] to the moon.".into(),
      sentence_cn: None,
      correct_answer: "flew".into(),
      options: vec!["flew".into(), "fly".into(), "Flew".into(), "flying".into()],
      explanation: "Past simple of fly.".into(),
      explanation_cn: None,
      tense_type: "Past Simple".into(),
      image_prompt: None,
    };
    assert!(tense_correct(&ex, "flew"));
    assert!(!tense_correct(&ex, "Flew"));
    assert!(!tense_correct(&ex, "fly"));
  }

  // The grammar award does not depend on the provider score. Other kinds
  // gate their reward on correctness; this one intentionally does not.
  #[test]
  fn grammar_awards_ten_regardless_of_score() {
    for score in [0, 3, 8, 10] {
      let feedback = GrammarFeedback {
        corrected: "I have a cat.".into(),
        explanation: "Subject-verb agreement.".into(),
        explanation_cn: None,
        score,
      };
      assert_eq!(grammar_award(&feedback), GRAMMAR_SUBMIT_XP);
    }
  }

  #[test]
  fn speaking_pass_line_is_strict() {
    assert!(!speaking_passed(60));
    assert!(speaking_passed(61));
    assert!(speaking_passed(100));
  }
}
