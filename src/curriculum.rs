//! Difficulty → curriculum mapping and rank presentation strings.
//!
//! Levels 1–7 follow the Cambridge Super Minds course units; 8–10 are plain
//! CEFR challenge bands with no unit themes. The asymmetry is deliberate:
//! the structured curriculum only covers the first seven bands.

use crate::domain::DifficultyLevel;

/// One curriculum band. `unit_themes` is empty for the CEFR-only bands.
#[derive(Clone, Copy, Debug)]
pub struct CurriculumBand {
  pub label: &'static str,
  pub unit_themes: &'static [&'static str],
  pub focus: &'static str,
}

impl CurriculumBand {
  /// Context paragraph handed to the content provider so generated
  /// exercises stay inside the band's vocabulary and grammar.
  pub fn prompt_context(&self) -> String {
    if self.unit_themes.is_empty() {
      format!("Level: {}. {}", self.label, self.focus)
    } else {
      let themes = self
        .unit_themes
        .iter()
        .map(|t| format!("'{}'", t))
        .collect::<Vec<_>>()
        .join(", ");
      format!("Level: {}. UNIT THEMES: {}. {}", self.label, themes, self.focus)
    }
  }
}

const BANDS: [CurriculumBand; 10] = [
  CurriculumBand {
    label: "Cambridge Super Minds Starter (Pre-A1)",
    unit_themes: &["My Classroom", "My Family", "My Face", "Toys", "My House", "On the Farm"],
    focus: "KEY VOCAB: Colors, Numbers 1-10, Family members, Face parts, Farm animals. GRAMMAR: Imperatives (Sit down), 'I have got', 'I like'.",
  },
  CurriculumBand {
    label: "Cambridge Super Minds Level 1 (A1)",
    unit_themes: &["At School", "Let's Play", "Pet Show", "Lunchtime", "The Old House", "Get Dressed", "The Robot", "At the Beach"],
    focus: "GRAMMAR: Present Continuous, 'There is/are', Prepositions (in, on, under), 'I can/can't'.",
  },
  CurriculumBand {
    label: "Cambridge Super Minds Level 2 (A1+)",
    unit_themes: &["The Zoo", "Where we live", "The Market", "My Bedroom", "People in Town", "In the Countryside"],
    focus: "GRAMMAR: Past Simple (was/were), Present Continuous for future, 'Some/Any', 'Would like', Question words.",
  },
  CurriculumBand {
    label: "Cambridge Super Minds Level 3 (A2)",
    unit_themes: &["Daily Tasks", "Around the World", "Holiday Plans", "The Weather", "The Hospital", "Ancient Egypt"],
    focus: "GRAMMAR: Past Simple (Regular/Irregular), Adverbs of frequency, Comparatives/Superlatives, 'Must/Must not'.",
  },
  CurriculumBand {
    label: "Cambridge Super Minds Level 4 (A2+)",
    unit_themes: &["In the Museum", "The World of Work", "Safety First", "The Orchestra", "Space Travel", "Camping"],
    focus: "GRAMMAR: 'Have to', Future 'Going to', Past Continuous, Relative Clauses (who/which), Possessive pronouns.",
  },
  CurriculumBand {
    label: "Cambridge Super Minds Level 5 (B1)",
    unit_themes: &["Disaster!", "In the Rainforest", "The Rock 'n' Roll Show", "Space Restaurant", "The Wild West"],
    focus: "GRAMMAR: Present Perfect, Future 'Will', First Conditional, Tag Questions, 'Should/Might'.",
  },
  CurriculumBand {
    label: "Cambridge Super Minds Level 6 (B1+)",
    unit_themes: &["The Pirates", "Transport of the Future", "Ancient History", "Mythical Beasts", "Space Explorers"],
    focus: "GRAMMAR: Passive Voice, Second Conditional, Reported Speech, Past Perfect, Third Conditional intro.",
  },
  CurriculumBand {
    label: "CEFR B2 (Upper Intermediate)",
    unit_themes: &[],
    focus: "UNIT THEMES: 'Technology Ethics', 'Global Issues', 'Extreme Sports', 'Psychology'. GRAMMAR: Mixed Conditionals, Modals of Deduction, Inversion, Advanced Phrasal Verbs.",
  },
  CurriculumBand {
    label: "CEFR B2+/C1",
    unit_themes: &[],
    focus: "UNIT THEMES: 'Academic Science', 'Literature', 'Abstract Philosophy'. GRAMMAR: Cleft sentences, Subjunctive mood, Advanced cohesive devices.",
  },
  CurriculumBand {
    label: "CEFR C2 (Mastery)",
    unit_themes: &[],
    focus: "Focus: Native-level nuance, idiomatic mastery, complex rhetoric.",
  },
];

const RANK_TITLES: [(&str, &str); 10] = [
  ("Rookie", "新兵"),
  ("Cadet", "学员"),
  ("Scout", "侦查员"),
  ("Pilot", "飞行员"),
  ("Captain", "舰长"),
  ("Major", "少校"),
  ("Commander", "指挥官"),
  ("Colonel", "上校"),
  ("General", "将军"),
  ("Admiral", "上将"),
];

const RANK_DESCRIPTIONS: [(&str, &str); 10] = [
  ("Cambridge Super Minds Starter (Pre-A1)", "剑桥 Super Minds 入门级 (Pre-A1)"),
  ("Cambridge Super Minds Level 1 (A1)", "剑桥 Super Minds 第1级 (A1)"),
  ("Cambridge Super Minds Level 2 (A1+)", "剑桥 Super Minds 第2级 (A1+)"),
  ("Cambridge Super Minds Level 3 (A2)", "剑桥 Super Minds 第3级 (A2)"),
  ("Cambridge Super Minds Level 4 (A2+)", "剑桥 Super Minds 第4级 (A2+)"),
  ("Cambridge Super Minds Level 5 (B1)", "剑桥 Super Minds 第5级 (B1)"),
  ("Cambridge Super Minds Level 6 (B1+)", "剑桥 Super Minds 第6级 (B1+)"),
  ("Challenge: CEFR B2 (Upper Int.)", "中高级挑战 (B2)"),
  ("Challenge: CEFR B2+", "高级挑战 (B2+)"),
  ("Challenge: CEFR C2 (Mastery)", "专家级挑战 (C2)"),
];

/// Curriculum descriptor for a difficulty level. Total over 1..=10 because
/// `DifficultyLevel` is clamped on construction.
pub fn describe(level: DifficultyLevel) -> &'static CurriculumBand {
  &BANDS[(level.get() - 1) as usize]
}

/// Fixed rank title, Rookie through Admiral.
pub fn rank_title(level: DifficultyLevel) -> &'static str {
  RANK_TITLES[(level.get() - 1) as usize].0
}

/// Chinese mirror of the rank title.
pub fn rank_title_cn(level: DifficultyLevel) -> &'static str {
  RANK_TITLES[(level.get() - 1) as usize].1
}

/// CEFR-paired rank description shown under the clearance selector.
pub fn rank_description(level: DifficultyLevel) -> &'static str {
  RANK_DESCRIPTIONS[(level.get() - 1) as usize].0
}

/// Chinese mirror of the rank description.
pub fn rank_description_cn(level: DifficultyLevel) -> &'static str {
  RANK_DESCRIPTIONS[(level.get() - 1) as usize].1
}
