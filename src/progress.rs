//! Progression reducers over [`UserProfile`].
//!
//! Every mutation is whole-object replace: callers read the current profile,
//! apply a reducer, and persist the returned copy. The level is re-derived
//! from XP on every award so the two can never drift.

use crate::domain::{DifficultyLevel, UserProfile};

/// XP needed per level.
pub const XP_PER_LEVEL: u64 = 100;

/// Apply an XP award. `level == xp / 100 + 1` holds on the result.
/// Amounts are trusted; negative awards are not a defined input.
pub fn award_xp(profile: &UserProfile, amount: u64) -> UserProfile {
  let xp = profile.xp + amount;
  UserProfile {
    xp,
    level: (xp / XP_PER_LEVEL) as u32 + 1,
    ..profile.clone()
  }
}

/// Replace the difficulty. No effect on xp/level/streak. Callers clamp the
/// level before handing it in; this reducer does not validate.
pub fn set_difficulty(profile: &UserProfile, level: DifficultyLevel) -> UserProfile {
  UserProfile {
    difficulty: level,
    ..profile.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_tracks_xp_for_any_award() {
    let mut p = UserProfile::default();
    for amount in [0u64, 10, 25, 30, 50, 99, 100, 135, 250] {
      p = award_xp(&p, amount);
      assert_eq!(p.level as u64, p.xp / XP_PER_LEVEL + 1, "xp={}", p.xp);
    }
  }

  #[test]
  fn award_crosses_level_boundary() {
    let p = award_xp(&UserProfile { xp: 90, ..UserProfile::default() }, 30);
    assert_eq!(p.xp, 120);
    assert_eq!(p.level, 2);
  }

  #[test]
  fn set_difficulty_leaves_progress_alone() {
    let base = UserProfile { xp: 240, level: 3, streak: 7, ..UserProfile::default() };
    let p = set_difficulty(&base, DifficultyLevel::clamped(9));
    assert_eq!(p.difficulty.get(), 9);
    assert_eq!(p.xp, 240);
    assert_eq!(p.level, 3);
    assert_eq!(p.streak, 7);
  }

  #[test]
  fn fresh_profile_defaults() {
    let p = UserProfile::default();
    assert_eq!(p.xp, 0);
    assert_eq!(p.level, 1);
    assert_eq!(p.streak, 1);
    assert_eq!(p.difficulty.get(), 5);
    assert!(p.badges.is_empty());
  }
}
