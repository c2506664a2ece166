use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Qb,
    Rb,
    Wr,
    Te,
    Other,
}

impl Position {
    pub const SKILL: [Position; 4] = [Position::Qb, Position::Rb, Position::Wr, Position::Te];

    pub fn code(&self) -> &'static str {
        match self {
            Position::Qb => "QB",
            Position::Rb => "RB",
            Position::Wr => "WR",
            Position::Te => "TE",
            Position::Other => "OTHER",
        }
    }

    /// Lenient parse used for provider columns ("HB", "FB" and "rb" all map to RB).
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QB" => Position::Qb,
            "RB" | "HB" | "FB" => Position::Rb,
            "WR" => Position::Wr,
            "TE" => Position::Te,
            _ => Position::Other,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Counting stats for one player in one game. Absent provider values are stored as 0.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    pub rushing_attempts: f64,
    pub rushing_yards: f64,
    pub rushing_tds: f64,
    pub targets: f64,
    pub receptions: f64,
    pub receiving_yards: f64,
    pub receiving_tds: f64,
    pub passing_attempts: f64,
    pub passing_yards: f64,
    pub passing_tds: f64,
    pub fantasy_points: f64,
}

impl GameStats {
    pub fn touches(&self) -> f64 {
        self.rushing_attempts + self.receptions
    }

    pub fn total_tds(&self) -> f64 {
        self.rushing_tds + self.receiving_tds + self.passing_tds
    }

    pub fn scored_any_td(&self) -> bool {
        self.rushing_tds > 0.0 || self.receiving_tds > 0.0 || self.passing_tds > 0.0
    }
}

/// A statistic the feature builder can window or accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKey {
    RushingAttempts,
    RushingYards,
    RushingTds,
    Targets,
    Receptions,
    ReceivingYards,
    ReceivingTds,
    PassingAttempts,
    PassingYards,
    PassingTds,
    FantasyPoints,
    Touches,
    TotalTds,
    ScoredAnyTd,
}

impl StatKey {
    pub const ALL: [StatKey; 14] = [
        StatKey::RushingAttempts,
        StatKey::RushingYards,
        StatKey::RushingTds,
        StatKey::Targets,
        StatKey::Receptions,
        StatKey::ReceivingYards,
        StatKey::ReceivingTds,
        StatKey::PassingAttempts,
        StatKey::PassingYards,
        StatKey::PassingTds,
        StatKey::FantasyPoints,
        StatKey::Touches,
        StatKey::TotalTds,
        StatKey::ScoredAnyTd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKey::RushingAttempts => "rushing_attempts",
            StatKey::RushingYards => "rushing_yards",
            StatKey::RushingTds => "rushing_tds",
            StatKey::Targets => "targets",
            StatKey::Receptions => "receptions",
            StatKey::ReceivingYards => "receiving_yards",
            StatKey::ReceivingTds => "receiving_tds",
            StatKey::PassingAttempts => "passing_attempts",
            StatKey::PassingYards => "passing_yards",
            StatKey::PassingTds => "passing_tds",
            StatKey::FantasyPoints => "fantasy_points",
            StatKey::Touches => "touches",
            StatKey::TotalTds => "total_tds",
            StatKey::ScoredAnyTd => "scored_any_td",
        }
    }

    pub fn value(&self, stats: &GameStats) -> f64 {
        match self {
            StatKey::RushingAttempts => stats.rushing_attempts,
            StatKey::RushingYards => stats.rushing_yards,
            StatKey::RushingTds => stats.rushing_tds,
            StatKey::Targets => stats.targets,
            StatKey::Receptions => stats.receptions,
            StatKey::ReceivingYards => stats.receiving_yards,
            StatKey::ReceivingTds => stats.receiving_tds,
            StatKey::PassingAttempts => stats.passing_attempts,
            StatKey::PassingYards => stats.passing_yards,
            StatKey::PassingTds => stats.passing_tds,
            StatKey::FantasyPoints => stats.fantasy_points,
            StatKey::Touches => stats.touches(),
            StatKey::TotalTds => stats.total_tds(),
            StatKey::ScoredAnyTd => {
                if stats.scored_any_td() {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatKey {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim().to_ascii_lowercase();
        StatKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == needle)
            .ok_or_else(|| format!("unknown stat `{raw}`"))
    }
}

/// One player's line in one finished game. Unique on (`player_id`, `season`, `week`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameRecord {
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub opponent: String,
    pub position: Position,
    pub season: i32,
    pub week: u32,
    pub home: bool,
    pub stats: GameStats,
}

impl PlayerGameRecord {
    pub fn scored_any_td(&self) -> bool {
        self.stats.scored_any_td()
    }

    pub fn stat(&self, key: StatKey) -> f64 {
        key.value(&self.stats)
    }
}

/// The game a feature vector describes the player entering.
///
/// Historical rows and upcoming matchups both reduce to this, so features are always computed
/// from "history strictly before (season, week)" plus this context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameContext {
    pub season: i32,
    pub week: u32,
    pub team: String,
    pub opponent: String,
    pub position: Position,
    pub home: bool,
}

impl GameContext {
    pub fn for_record(record: &PlayerGameRecord) -> Self {
        Self {
            season: record.season,
            week: record.week,
            team: record.team.clone(),
            opponent: record.opponent.clone(),
            position: record.position,
            home: record.home,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GameStats, Position, StatKey};

    #[test]
    fn stat_keys_round_trip_through_names() {
        for key in StatKey::ALL {
            assert_eq!(key.as_str().parse::<StatKey>(), Ok(key));
        }
        assert!("yards_after_catch".parse::<StatKey>().is_err());
    }

    #[test]
    fn derived_stats_follow_components() {
        let stats = GameStats {
            rushing_attempts: 12.0,
            receptions: 3.0,
            rushing_tds: 0.0,
            receiving_tds: 1.0,
            ..Default::default()
        };
        assert_eq!(stats.touches(), 15.0);
        assert_eq!(stats.total_tds(), 1.0);
        assert!(stats.scored_any_td());
        assert_eq!(StatKey::ScoredAnyTd.value(&stats), 1.0);
        assert!(!GameStats::default().scored_any_td());
    }

    #[test]
    fn lenient_position_parse() {
        assert_eq!(Position::parse_lenient(" hb "), Position::Rb);
        assert_eq!(Position::parse_lenient("TE"), Position::Te);
        assert_eq!(Position::parse_lenient("K"), Position::Other);
    }
}
