//! OpenAI-compatible client backing the content, illustration and
//! recognition ports.
//!
//! We only call chat.completions (strict JSON object mode), images and
//! audio transcriptions. Calls are instrumented and log model names,
//! latencies and token usage (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::Prompts;
use crate::curriculum::CurriculumBand;
use crate::domain::{
  DifficultyLevel, GrammarFeedback, ListeningExercise, MultiClozeExercise, NarrativeSegment,
  ReadingExercise, SpeakingExercise, TenseClozeExercise, VocabularyWord,
};
use crate::error::EngineError;
use crate::ports::{ContentProvider, Illustrator, SpeechRecognizer};
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub transcribe_model: String,
  pub image_model: String,
  prompts: Prompts,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let transcribe_model =
      std::env::var("OPENAI_TRANSCRIBE_MODEL").unwrap_or_else(|_| "whisper-1".into());
    let image_model =
      std::env::var("OPENAI_IMAGE_MODEL").unwrap_or_else(|_| "gpt-image-1".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self {
      client,
      api_key,
      base_url,
      fast_model,
      strong_model,
      transcribe_model,
      image_model,
      prompts,
    })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, EngineError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "kalen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| EngineError::provider(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(EngineError::provider(format!("HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse =
      res.json().await.map_err(|e| EngineError::provider(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, elapsed = ?start.elapsed(), "Model usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| {
      debug!(target: "kalen_backend", payload = %trunc_for_log(&text, 200), "Model JSON did not parse");
      EngineError::provider(format!("JSON parse error: {}", e))
    })
  }
}

#[async_trait]
impl ContentProvider for OpenAI {
  #[instrument(level = "info", skip(self, band), fields(%level))]
  async fn vocabulary_set(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
    topic: &str,
  ) -> Result<Vec<VocabularyWord>, EngineError> {
    #[derive(Deserialize)]
    struct WordsOut {
      words: Vec<VocabularyWord>,
    }
    let curriculum = band.prompt_context();
    let user = fill_template(
      &self.prompts.vocabulary_user_template,
      &[("curriculum", curriculum.as_str()), ("topic", topic)],
    );
    let out: WordsOut = self
      .chat_json(&self.strong_model, &self.prompts.vocabulary_system, &user, 0.9)
      .await?;
    Ok(out.words)
  }

  #[instrument(level = "info", skip(self, band, sentence), fields(%level, sentence_len = sentence.len()))]
  async fn grammar_feedback(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
    sentence: &str,
  ) -> Result<GrammarFeedback, EngineError> {
    let curriculum = band.prompt_context();
    let user = fill_template(
      &self.prompts.grammar_user_template,
      &[("curriculum", curriculum.as_str()), ("sentence", sentence)],
    );
    self.chat_json(&self.fast_model, &self.prompts.grammar_system, &user, 0.2).await
  }

  #[instrument(level = "info", skip(self, band, history, action), fields(%level, history_len = history.len()))]
  async fn narrative_step(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
    history: &[String],
    action: &str,
  ) -> Result<NarrativeSegment, EngineError> {
    let curriculum = band.prompt_context();
    let history_json =
      serde_json::to_string(history).map_err(|e| EngineError::provider(e.to_string()))?;
    let user = fill_template(
      &self.prompts.narrative_user_template,
      &[
        ("curriculum", curriculum.as_str()),
        ("history", history_json.as_str()),
        ("action", action),
      ],
    );
    self.chat_json(&self.strong_model, &self.prompts.narrative_system, &user, 0.95).await
  }

  #[instrument(level = "info", skip(self, band), fields(%level))]
  async fn tense_cloze(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
  ) -> Result<TenseClozeExercise, EngineError> {
    let curriculum = band.prompt_context();
    let user =
      fill_template(&self.prompts.tense_user_template, &[("curriculum", curriculum.as_str())]);
    self.chat_json(&self.fast_model, &self.prompts.tense_system, &user, 0.8).await
  }

  #[instrument(level = "info", skip(self, band), fields(%level))]
  async fn multi_cloze(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
  ) -> Result<MultiClozeExercise, EngineError> {
    let curriculum = band.prompt_context();
    let user =
      fill_template(&self.prompts.cloze_user_template, &[("curriculum", curriculum.as_str())]);
    self.chat_json(&self.fast_model, &self.prompts.cloze_system, &user, 0.8).await
  }

  #[instrument(level = "info", skip(self, band), fields(%level))]
  async fn reading(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
  ) -> Result<ReadingExercise, EngineError> {
    let curriculum = band.prompt_context();
    let user =
      fill_template(&self.prompts.reading_user_template, &[("curriculum", curriculum.as_str())]);
    self.chat_json(&self.strong_model, &self.prompts.reading_system, &user, 0.8).await
  }

  #[instrument(level = "info", skip(self, band), fields(%level))]
  async fn listening(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
  ) -> Result<ListeningExercise, EngineError> {
    let curriculum = band.prompt_context();
    let user = fill_template(
      &self.prompts.listening_user_template,
      &[("curriculum", curriculum.as_str())],
    );
    self.chat_json(&self.fast_model, &self.prompts.listening_system, &user, 0.8).await
  }

  #[instrument(level = "info", skip(self, band), fields(%level))]
  async fn speaking(
    &self,
    level: DifficultyLevel,
    band: &CurriculumBand,
  ) -> Result<SpeakingExercise, EngineError> {
    let curriculum = band.prompt_context();
    let user = fill_template(
      &self.prompts.speaking_user_template,
      &[("curriculum", curriculum.as_str())],
    );
    self.chat_json(&self.fast_model, &self.prompts.speaking_system, &user, 0.8).await
  }
}

#[async_trait]
impl Illustrator for OpenAI {
  /// Best-effort image generation; the session swallows failures.
  #[instrument(level = "info", skip(self, prompt), fields(prompt_len = prompt.len()))]
  async fn illustrate(&self, prompt: &str) -> Result<Option<Vec<u8>>, EngineError> {
    let url = format!("{}/images/generations", self.base_url);
    let full_prompt = fill_template(&self.prompts.illustration_template, &[("subject", prompt)]);
    let req = ImageRequest { model: self.image_model.clone(), prompt: full_prompt, n: 1 };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "kalen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| EngineError::IllustrationFailure(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(EngineError::IllustrationFailure(format!("HTTP {}: {}", status, msg)));
    }

    let body: ImageResponse =
      res.json().await.map_err(|e| EngineError::IllustrationFailure(e.to_string()))?;
    match body.data.into_iter().next().and_then(|d| d.b64_json) {
      Some(b64) => {
        let bytes = BASE64
          .decode(b64)
          .map_err(|e| EngineError::IllustrationFailure(format!("bad image payload: {e}")))?;
        Ok(Some(bytes))
      }
      None => Ok(None),
    }
  }
}

#[async_trait]
impl SpeechRecognizer for OpenAI {
  /// Single-shot transcription of a recorded clip.
  #[instrument(level = "info", skip(self, audio), fields(audio_len = audio.len(), %mime))]
  async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, EngineError> {
    let url = format!("{}/audio/transcriptions", self.base_url);
    let ext = match mime {
      "audio/webm" => "webm",
      "audio/ogg" => "ogg",
      "audio/mp4" => "mp4",
      "audio/mpeg" => "mp3",
      _ => "wav",
    };
    let part = reqwest::multipart::Part::bytes(audio.to_vec())
      .file_name(format!("clip.{ext}"))
      .mime_str(mime)
      .map_err(|e| EngineError::RecognitionFailure(e.to_string()))?;
    let form = reqwest::multipart::Form::new()
      .text("model", self.transcribe_model.clone())
      .part("file", part);

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "kalen-backend/0.1")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .multipart(form)
      .send()
      .await
      .map_err(|e| EngineError::RecognitionFailure(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(EngineError::RecognitionFailure(format!("HTTP {}: {}", status, msg)));
    }

    #[derive(Deserialize)]
    struct TranscriptOut {
      text: String,
    }
    let body: TranscriptOut =
      res.json().await.map_err(|e| EngineError::RecognitionFailure(e.to_string()))?;
    Ok(body.text)
  }
}

// --- API DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: String,
}
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")]
  r#type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
}
#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)]
  prompt_tokens: Option<u32>,
  #[serde(default)]
  completion_tokens: Option<u32>,
  #[serde(default)]
  total_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ImageRequest {
  model: String,
  prompt: String,
  n: u8,
}
#[derive(Deserialize)]
struct ImageResponse {
  #[serde(default)]
  data: Vec<ImageDatum>,
}
#[derive(Deserialize)]
struct ImageDatum {
  #[serde(default)]
  b64_json: Option<String>,
}

/// Try to extract a clean error message from an API error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
