//! Keyword-based matching of a recognized utterance against a target phrase.
//!
//! The matcher is deliberately shallow: lowercase both sides, strip the
//! sentence punctuation the synthesizer reads over anyway, then credit the
//! attempt by how many expected keywords showed up in the transcript.

use crate::error::EngineError;

/// Minimum score for any non-empty attempt that didn't match outright. A
/// near-miss pronunciation should not read as a zero.
const PITY_FLOOR: u8 = 20;

/// Weight of a full keyword sweep when the phrase wasn't matched exactly.
const KEYWORD_CEILING: f64 = 80.0;

fn normalize(text: &str) -> String {
  text
    .to_lowercase()
    .chars()
    .filter(|c| !matches!(c, '.' | ',' | '!'))
    .collect()
}

/// Score a recognized utterance in 0..=100.
///
/// Exact normalized match scores 100. Otherwise the score is the keyword hit
/// ratio scaled to 80, floored at 20 for any non-empty transcript. An empty
/// transcript is always 0. Zero keywords is a provider contract violation.
pub fn match_utterance(
  target_phrase: &str,
  keywords: &[String],
  recognized: &str,
) -> Result<u8, EngineError> {
  if keywords.is_empty() {
    return Err(EngineError::malformed(
      "speaking challenge has no keywords to match against",
    ));
  }

  let spoken = normalize(recognized);
  if spoken.is_empty() {
    return Ok(0);
  }
  if spoken == normalize(target_phrase) {
    return Ok(100);
  }

  let hits = keywords
    .iter()
    .filter(|k| spoken.contains(&k.to_lowercase()))
    .count();
  let score = (hits as f64 / keywords.len() as f64 * KEYWORD_CEILING).round() as u8;
  Ok(score.max(PITY_FLOOR))
}
