//! Feature rows for an upcoming week, computed exactly like the training rows.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, PlayerHistories, column_indices, prior_slice};
use crate::player_game::{GameContext, PlayerGameRecord, Position};
use crate::stats_loader::{Roster, TeamRatings, UpcomingGame, current_teams};

#[derive(Debug, Clone)]
pub struct UpcomingRow {
    pub player_id: String,
    pub player_name: String,
    pub context: GameContext,
    /// Games on record before this one; 0 for a player with no history.
    pub prior_games: usize,
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectedWeek {
    pub feature_names: Vec<String>,
    pub rows: Vec<UpcomingRow>,
}

impl ProjectedWeek {
    /// Same projection as [`crate::training_table::TrainingTable::select_columns`].
    pub fn select_columns(&self, names: &[String]) -> Result<Self> {
        let indices = column_indices(&self.feature_names, names)?;
        Ok(Self {
            feature_names: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| UpcomingRow {
                    features: indices.iter().map(|i| row.features[*i]).collect(),
                    ..row.clone()
                })
                .collect(),
        })
    }
}

pub struct UpcomingWeek<'a> {
    pub season: i32,
    pub week: u32,
    pub schedule: &'a [UpcomingGame],
    pub roster: &'a Roster,
    /// Externally supplied exclusions; merged with the roster's injury statuses.
    pub exclusions: &'a HashSet<String>,
}

pub fn project_week(
    records: &[PlayerGameRecord],
    ratings: &TeamRatings,
    upcoming: &UpcomingWeek<'_>,
    config: &PipelineConfig,
) -> Result<ProjectedWeek> {
    let (season, week) = (upcoming.season, upcoming.week);
    let games: Vec<&UpcomingGame> = upcoming
        .schedule
        .iter()
        .filter(|g| g.season == season && g.week == week)
        .collect();
    if games.is_empty() {
        warn!(season, week, "no scheduled games for the requested week");
    }

    let histories = PlayerHistories::from_records(records);
    let teams = current_teams(records, upcoming.roster);
    let builder = FeatureBuilder::new(&config.features, records, ratings);
    let mut excluded = upcoming.roster.injured_ids();
    excluded.extend(upcoming.exclusions.iter().cloned());

    let mut eligible = 0usize;
    let mut matched = 0usize;
    let mut byes = 0usize;
    let mut rows = Vec::new();
    for entry in upcoming.roster.entries() {
        if excluded.contains(&entry.player_id) {
            continue;
        }
        let history = histories.get(&entry.player_id);
        let position = match (entry.position, history) {
            (Position::Other, Some(h)) => h.records.last().map_or(Position::Other, |r| r.position),
            (position, _) => position,
        };
        if !config.is_tracked(position) {
            continue;
        }
        eligible += 1;
        if history.is_some() {
            matched += 1;
        }

        let team = teams
            .get(&entry.player_id)
            .map_or(entry.team.as_str(), String::as_str);
        let Some((opponent, home)) = games.iter().find_map(|g| g.side_for(team)) else {
            debug!(player = %entry.player_id, team, "no game this week, skipping");
            byes += 1;
            continue;
        };

        let prior = history.map_or(&[][..], |h| prior_slice(&h.records, season, week));
        let context = GameContext {
            season,
            week,
            team: team.to_string(),
            opponent: opponent.to_string(),
            position,
            home,
        };
        rows.push(UpcomingRow {
            player_id: entry.player_id.clone(),
            player_name: entry.player_name.clone(),
            prior_games: prior.len(),
            features: builder.features_for(prior, &context),
            context,
        });
    }

    if eligible > 0 && matched == 0 {
        return Err(ForecastError::DataIntegrity(format!(
            "none of the {eligible} eligible roster players appear in the historical stats"
        )));
    }
    if matched < eligible {
        warn!(
            players = eligible - matched,
            "roster players without history get zero-prior features"
        );
    }
    info!(
        season,
        week,
        rows = rows.len(),
        byes,
        excluded = excluded.len(),
        "projected upcoming week"
    );
    Ok(ProjectedWeek {
        feature_names: builder.layout().names().to_vec(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{UpcomingWeek, project_week};
    use crate::config::PipelineConfig;
    use crate::error::ForecastError;
    use crate::player_game::{GameStats, PlayerGameRecord, Position};
    use crate::stats_loader::{Roster, RosterEntry, TeamRatings, UpcomingGame};

    fn entry(id: &str, team: &str, position: Position, status: Option<&str>) -> RosterEntry {
        RosterEntry {
            player_id: id.to_string(),
            player_name: id.to_uppercase(),
            team: team.to_string(),
            position,
            status: status.map(str::to_string),
        }
    }

    fn game(id: &str, team: &str, week: u32) -> PlayerGameRecord {
        PlayerGameRecord {
            player_id: id.to_string(),
            player_name: id.to_uppercase(),
            team: team.to_string(),
            opponent: "NYJ".to_string(),
            position: Position::Wr,
            season: 2024,
            week,
            home: true,
            stats: GameStats {
                receiving_tds: 1.0,
                ..Default::default()
            },
        }
    }

    fn schedule() -> Vec<UpcomingGame> {
        vec![UpcomingGame {
            season: 2024,
            week: 3,
            home_team: "MIA".to_string(),
            away_team: "BUF".to_string(),
        }]
    }

    #[test]
    fn uses_current_team_and_skips_excluded_and_byes() {
        // Traded from DAL to BUF after week 2.
        let records = vec![game("a", "DAL", 1), game("a", "DAL", 2), game("c", "KC", 1)];
        let roster = Roster::from_entries(vec![
            entry("a", "BUF", Position::Wr, None),
            entry("b", "MIA", Position::Rb, Some("IR")),
            entry("c", "KC", Position::Wr, None),
            entry("d", "MIA", Position::Te, None),
            entry("e", "MIA", Position::Qb, None),
        ]);
        let schedule = schedule();
        let exclusions = HashSet::new();
        let upcoming = UpcomingWeek {
            season: 2024,
            week: 3,
            schedule: &schedule,
            roster: &roster,
            exclusions: &exclusions,
        };
        let week = project_week(&records, &TeamRatings::default(), &upcoming, &PipelineConfig::default())
            .unwrap();
        let ids: Vec<&str> = week.rows.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);

        let a = &week.rows[0];
        assert_eq!(a.context.team, "BUF");
        assert_eq!(a.context.opponent, "MIA");
        assert!(!a.context.home);
        assert_eq!(a.prior_games, 2);
        assert_eq!(week.rows[1].prior_games, 0);
        assert!(week.rows[1].features.iter().take(40).all(|v| *v == 0.0));
    }

    #[test]
    fn roster_disjoint_from_history_is_integrity_error() {
        let records = vec![game("zz", "DAL", 1)];
        let roster = Roster::from_entries(vec![entry("a", "BUF", Position::Wr, None)]);
        let schedule = schedule();
        let exclusions = HashSet::new();
        let upcoming = UpcomingWeek {
            season: 2024,
            week: 3,
            schedule: &schedule,
            roster: &roster,
            exclusions: &exclusions,
        };
        assert!(matches!(
            project_week(&records, &TeamRatings::default(), &upcoming, &PipelineConfig::default()),
            Err(ForecastError::DataIntegrity(_))
        ));
    }
}
