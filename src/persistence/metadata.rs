//! World metadata: name, seed, timestamps, difficulty, and the tunables
//! that the residency manager reads at startup. Persisted as RON, following
//! the teacher's RON-everywhere configuration idiom.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Peaceful,
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    /// View distance in chunks, per spec §4.F.
    #[must_use]
    pub fn view_distance(self) -> i32 {
        match self {
            Difficulty::Peaceful => 6,
            Difficulty::Easy => 8,
            Difficulty::Normal => 10,
            Difficulty::Hard => 12,
        }
    }

    /// Default per-frame admission budget, per spec §4.F ("3..6 per difficulty").
    #[must_use]
    pub fn max_chunks_per_frame(self) -> usize {
        match self {
            Difficulty::Peaceful => 3,
            Difficulty::Easy => 4,
            Difficulty::Normal => 5,
            Difficulty::Hard => 6,
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Normal
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "peaceful" => Ok(Difficulty::Peaceful),
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMeta {
    pub name: String,
    pub seed: i64,
    pub created_at_secs: i64,
    pub last_played_secs: i64,
    pub difficulty: Difficulty,
    pub description: String,
    pub autosave_interval_secs: f32,
    pub backup_retention: usize,
    pub maintenance_interval_secs: f32,
    pub last_autosave_secs: i64,
    pub last_backup_secs: i64,
    pub activity_score: f32,
}

impl WorldMeta {
    #[must_use]
    pub fn new(name: impl Into<String>, seed: i64, now_secs: i64) -> Self {
        Self {
            name: name.into(),
            seed,
            created_at_secs: now_secs,
            last_played_secs: now_secs,
            difficulty: Difficulty::default(),
            description: String::new(),
            autosave_interval_secs: 120.0,
            backup_retention: 3,
            maintenance_interval_secs: 300.0,
            last_autosave_secs: 0,
            last_backup_secs: 0,
            activity_score: 0.0,
        }
    }
}

pub const META_FILE_NAME: &str = "world.meta";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!("peaceful".parse::<Difficulty>().unwrap(), Difficulty::Peaceful);
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn view_distance_matches_spec_table() {
        assert_eq!(Difficulty::Peaceful.view_distance(), 6);
        assert_eq!(Difficulty::Easy.view_distance(), 8);
        assert_eq!(Difficulty::Normal.view_distance(), 10);
        assert_eq!(Difficulty::Hard.view_distance(), 12);
    }
}
