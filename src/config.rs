//! Loading engine configuration (prompt templates) from TOML.
//!
//! See `EngineConfig` and `Prompts` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts used by the model-backed content provider, one pair per exercise
/// kind. Defaults are sensible for the shipped curriculum; override them in
/// TOML to tune tone or structure. Each user template is filled with
/// `{curriculum}` plus the kind-specific variables named in its default.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub vocabulary_system: String,
  pub vocabulary_user_template: String,
  pub grammar_system: String,
  pub grammar_user_template: String,
  pub narrative_system: String,
  pub narrative_user_template: String,
  pub tense_system: String,
  pub tense_user_template: String,
  pub cloze_system: String,
  pub cloze_user_template: String,
  pub reading_system: String,
  pub reading_user_template: String,
  pub listening_system: String,
  pub listening_user_template: String,
  pub speaking_system: String,
  pub speaking_user_template: String,
  /// Wrapper for illustration prompts; `{subject}` is the exercise's own
  /// image prompt.
  pub illustration_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      vocabulary_system: "You are an English learning content generator for children. Respond ONLY with strict JSON.".into(),
      vocabulary_user_template: "Generate 3 vocabulary words suitable for children based on this curriculum: {curriculum}\nTopic context: {topic} (adapt the topic to fit the Unit Themes listed in the curriculum).\nReturn JSON {\"words\": [...]} where each word has: word, definition (simple, matching the level), definition_cn (Chinese translation), example_sentence (MUST use grammar from the level guide), example_sentence_cn, fun_fact (brief), fun_fact_cn.".into(),
      grammar_system: "You are a friendly AI teaching English syntax. Respond ONLY with strict JSON.".into(),
      grammar_user_template: "Curriculum: {curriculum}\nUser sentence: \"{sentence}\"\n1. Correct the grammar/syntax.\n2. Explain the error using concepts from the specified level.\n3. Provide a Chinese translation of the explanation.\n4. Score 1-10.\nReturn JSON with fields: corrected, explanation, explanation_cn, score.".into(),
      narrative_system: "You write sci-fi adventure story segments for children. Respond ONLY with strict JSON.".into(),
      narrative_user_template: "CURRICULUM CONSTRAINT: {curriculum}\nPrevious context: {history}\nAction: \"{action}\"\nWrite 1 paragraph (40-60 words) using vocabulary and grammar ONLY from the curriculum level. Provide a Chinese translation. Provide 2 choices for the next step. Provide an image prompt.\nReturn JSON with fields: text, text_cn, options, options_cn, image_prompt.".into(),
      tense_system: "You create verb tense exercises for children. Respond ONLY with strict JSON.".into(),
      tense_user_template: "CURRICULUM: {curriculum}\nCreate a sentence with a missing verb [BLANK]. The sentence context should fit the Unit Themes of the level. Provide 4 options, an explanation with Chinese translation, the tense name, and an image prompt.\nReturn JSON with fields: sentence, sentence_cn, correct_answer, options, explanation, explanation_cn, tense_type, image_prompt.".into(),
      cloze_system: "You create fill-in-the-blank passages for children. Respond ONLY with strict JSON.".into(),
      cloze_user_template: "CURRICULUM: {curriculum}\nCreate a cloze text of about 40 words with placeholders ___1___, ___2___, ___3___ for 3 blanked-out words (vocabulary from the Unit Themes). Each blank lists its options (distractors + the correct word).\nReturn JSON with fields: text, text_cn, blanks (array of {id, correct_word, options}), image_prompt.".into(),
      reading_system: "You create reading comprehension passages for children. Respond ONLY with strict JSON.".into(),
      reading_user_template: "CURRICULUM: {curriculum}\nCreate a short reading passage (80 words) on a topic from the Unit Themes of this level, plus 2 multiple-choice questions.\nReturn JSON with fields: title, passage, passage_cn, questions (array of {question, question_cn, options, correct_index}), image_prompt.".into(),
      listening_system: "You create listening comprehension scripts for children. Respond ONLY with strict JSON.".into(),
      listening_user_template: "CURRICULUM: {curriculum}\n1. audio_script: a short description or dialogue (1-2 sentences) using Unit vocabulary.\n2. question: a question about a detail in the script.\n3. options: 4 choices for the answer, with correct_index.\n4. image_prompt: visual context for the general theme (not the answer itself).\nReturn JSON with fields: audio_script, question, question_cn, options, correct_index, image_prompt.".into(),
      speaking_system: "You create speaking challenge phrases for children. Respond ONLY with strict JSON.".into(),
      speaking_user_template: "CURRICULUM: {curriculum}\n1. phrase: a key sentence using grammar/vocab from the level.\n2. context: situation description (e.g. \"Tell your friend what you like\").\n3. keywords: the key words in the phrase to check for.\nReturn JSON with fields: phrase, phrase_cn, context, keywords, image_prompt.".into(),
      illustration_template: "A kid-friendly, vibrant, 3D cartoon style illustration representing: \"{subject}\". Sci-fi, adventure or fantasy art style. No text. High quality, colorful, suitable for a game.".into(),
    }
  }
}

/// Attempt to load `EngineConfig` from ENGINE_CONFIG_PATH. On any parsing/IO
/// error, returns None.
pub fn load_engine_config_from_env() -> Option<EngineConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<EngineConfig>(&s) {
      Ok(cfg) => {
        info!(target: "kalen_backend", %path, "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "kalen_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "kalen_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_prompts_table_falls_back_to_defaults() {
    let cfg: EngineConfig = toml::from_str("").unwrap();
    assert!(cfg.prompts.vocabulary_user_template.contains("{curriculum}"));
    assert!(cfg.prompts.illustration_template.contains("{subject}"));
  }

  #[test]
  fn default_templates_name_their_variables() {
    let p = Prompts::default();
    assert!(p.grammar_user_template.contains("{sentence}"));
    assert!(p.narrative_user_template.contains("{history}"));
    assert!(p.narrative_user_template.contains("{action}"));
    assert!(p.vocabulary_user_template.contains("{topic}"));
  }
}
