//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.
//!
//! `ExerciseOut` is the client-facing DTO: answer keys, hidden scripts and
//! speech keywords never leave the server; they come back through verdicts.

use serde::{Deserialize, Serialize};

use crate::curriculum;
use crate::domain::{
    ExerciseDefinition, ExerciseKind, LanguageTag, LearnerResponse, UserProfile, VocabularyWord,
};
use crate::session::Verdict;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Profile,
    SetDifficulty {
        level: u8,
    },
    NewMission {
        kind: ExerciseKind,
        #[serde(default)]
        topic: Option<String>,
    },
    /// Partial cloze selection while presenting; scoring waits for submit.
    SelectBlank {
        #[serde(rename = "blankId")]
        blank_id: u32,
        word: String,
    },
    /// Partial reading selection while presenting.
    SelectAnswer {
        question: usize,
        option: usize,
    },
    SubmitAnswer {
        response: LearnerResponse,
    },
    Advance,
    AbortMission,
    Illustration,
    /// Replay the hidden listening script through the synthesis port.
    PlayTransmission,
    Speak {
        text: String,
        lang: LanguageTag,
    },
    StopAudio,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Profile {
        profile: ProfileOut,
    },
    Mission {
        #[serde(rename = "missionId")]
        mission_id: String,
        exercise: ExerciseOut,
    },
    Verdict {
        verdict: Verdict,
    },
    MissionComplete {
        xp: u64,
        profile: ProfileOut,
    },
    Illustration {
        #[serde(rename = "imageB64")]
        image_b64: Option<String>,
    },
    Ack,
    Error {
        message: String,
    },
}

/// Profile DTO with the rank strings the dashboard renders.
#[derive(Debug, Serialize)]
pub struct ProfileOut {
    pub xp: u64,
    pub level: u32,
    pub streak: u32,
    pub difficulty: u8,
    pub badges: Vec<String>,
    #[serde(rename = "rankTitle")]
    pub rank_title: &'static str,
    #[serde(rename = "rankTitleCn")]
    pub rank_title_cn: &'static str,
    #[serde(rename = "rankDescription")]
    pub rank_description: &'static str,
    #[serde(rename = "rankDescriptionCn")]
    pub rank_description_cn: &'static str,
}

pub fn profile_out(p: &UserProfile) -> ProfileOut {
    ProfileOut {
        xp: p.xp,
        level: p.level,
        streak: p.streak,
        difficulty: p.difficulty.get(),
        badges: p.badges.iter().cloned().collect(),
        rank_title: curriculum::rank_title(p.difficulty),
        rank_title_cn: curriculum::rank_title_cn(p.difficulty),
        rank_description: curriculum::rank_description(p.difficulty),
        rank_description_cn: curriculum::rank_description_cn(p.difficulty),
    }
}

/// Client-facing exercise payloads, stripped of answer keys.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExerciseOut {
    Vocabulary {
        words: Vec<VocabularyWord>,
    },
    GrammarCheck,
    NarrativeStep {
        text: String,
        text_cn: Option<String>,
        options: Vec<String>,
        options_cn: Option<Vec<String>>,
    },
    TenseCloze {
        sentence: String,
        sentence_cn: Option<String>,
        options: Vec<String>,
        tense_type: String,
    },
    MultiCloze {
        text: String,
        text_cn: Option<String>,
        blanks: Vec<BlankOut>,
    },
    ReadingComprehension {
        title: String,
        passage: String,
        passage_cn: Option<String>,
        questions: Vec<QuestionOut>,
    },
    ListeningComprehension {
        question: String,
        question_cn: Option<String>,
        options: Vec<String>,
    },
    SpeakingChallenge {
        phrase: String,
        phrase_cn: Option<String>,
        context: String,
    },
}

#[derive(Debug, Serialize)]
pub struct BlankOut {
    pub id: u32,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub question: String,
    pub question_cn: Option<String>,
    pub options: Vec<String>,
}

/// Convert the internal exercise (answers included) to the public DTO.
pub fn to_out(ex: &ExerciseDefinition) -> ExerciseOut {
    match ex {
        ExerciseDefinition::Vocabulary { words } => ExerciseOut::Vocabulary { words: words.clone() },
        ExerciseDefinition::GrammarCheck => ExerciseOut::GrammarCheck,
        ExerciseDefinition::NarrativeStep(s) => ExerciseOut::NarrativeStep {
            text: s.text.clone(),
            text_cn: s.text_cn.clone(),
            options: s.options.clone(),
            options_cn: s.options_cn.clone(),
        },
        ExerciseDefinition::TenseCloze(t) => ExerciseOut::TenseCloze {
            sentence: t.sentence.clone(),
            sentence_cn: t.sentence_cn.clone(),
            options: t.options.clone(),
            tense_type: t.tense_type.clone(),
        },
        ExerciseDefinition::MultiCloze(c) => ExerciseOut::MultiCloze {
            text: c.text.clone(),
            text_cn: c.text_cn.clone(),
            blanks: c
                .blanks
                .iter()
                .map(|b| BlankOut { id: b.id, options: b.options.clone() })
                .collect(),
        },
        ExerciseDefinition::ReadingComprehension(r) => ExerciseOut::ReadingComprehension {
            title: r.title.clone(),
            passage: r.passage.clone(),
            passage_cn: r.passage_cn.clone(),
            questions: r
                .questions
                .iter()
                .map(|q| QuestionOut {
                    question: q.question.clone(),
                    question_cn: q.question_cn.clone(),
                    options: q.options.clone(),
                })
                .collect(),
        },
        ExerciseDefinition::ListeningComprehension(l) => ExerciseOut::ListeningComprehension {
            question: l.question.clone(),
            question_cn: l.question_cn.clone(),
            options: l.options.clone(),
        },
        ExerciseDefinition::SpeakingChallenge(s) => ExerciseOut::SpeakingChallenge {
            phrase: s.phrase.clone(),
            phrase_cn: s.phrase_cn.clone(),
            context: s.context.clone(),
        },
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct MissionIn {
    pub kind: ExerciseKind,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    pub response: LearnerResponse,
}

#[derive(Debug, Deserialize)]
pub struct DifficultyIn {
    pub level: u8,
}

#[derive(Serialize)]
pub struct MissionOut {
    #[serde(rename = "missionId")]
    pub mission_id: String,
    pub exercise: ExerciseOut,
}

#[derive(Serialize)]
pub struct IllustrationOut {
    #[serde(rename = "imageB64")]
    pub image_b64: Option<String>,
}

#[derive(Serialize)]
pub struct VerdictOut {
    pub verdict: Verdict,
}

/// HTTP advance result: terminal award or the next exercise instance.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvanceOut {
    Completed {
        xp: u64,
        profile: ProfileOut,
    },
    Next {
        #[serde(rename = "missionId")]
        mission_id: String,
        exercise: ExerciseOut,
    },
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListeningExercise, SpeakingExercise, TenseClozeExercise};

    #[test]
    fn public_dto_hides_answer_keys() {
        let ex = ExerciseDefinition::TenseCloze(TenseClozeExercise {
            sentence: "I [BLANK] home.".into(),
            sentence_cn: None,
            correct_answer: "went".into(),
            options: vec!["went".into(), "go".into()],
            explanation: "Past simple.".into(),
            explanation_cn: None,
            tense_type: "Past Simple".into(),
            image_prompt: None,
        });
        let json = serde_json::to_string(&to_out(&ex)).unwrap();
        assert!(!json.contains("correct_answer"));
        assert!(!json.contains("explanation"));

        let ex = ExerciseDefinition::ListeningComprehension(ListeningExercise {
            audio_script: "secret script".into(),
            question: "What?".into(),
            question_cn: None,
            options: vec!["A".into(), "B".into()],
            correct_index: 0,
            image_prompt: None,
        });
        let json = serde_json::to_string(&to_out(&ex)).unwrap();
        assert!(!json.contains("secret script"));
        assert!(!json.contains("correct_index"));

        let ex = ExerciseDefinition::SpeakingChallenge(SpeakingExercise {
            phrase: "Open the door".into(),
            phrase_cn: None,
            context: "Ask the computer.".into(),
            keywords: vec!["open".into(), "door".into()],
            image_prompt: None,
        });
        let json = serde_json::to_string(&to_out(&ex)).unwrap();
        assert!(!json.contains("keywords"));
    }

    #[test]
    fn profile_out_pairs_rank_strings() {
        let p = UserProfile::default();
        let out = profile_out(&p);
        assert_eq!(out.difficulty, 5);
        assert_eq!(out.rank_title, "Captain");
        assert!(out.rank_description.contains("Level 4"));
    }
}
