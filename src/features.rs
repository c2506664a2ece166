//! Per-row feature vectors.
//!
//! Every vector describes a player *entering* a game and is computed by
//! [`FeatureBuilder::features_for`] from the player's history strictly before that game. The
//! training table and the upcoming-week projector both go through it, so a feature can never be
//! computed one way for training and another way for prediction.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::debug;

use crate::config::{FeatureConfig, OpponentMode};
use crate::error::{ForecastError, Result};
use crate::player_game::{GameContext, PlayerGameRecord, Position, StatKey};
use crate::pool::WorkerPool;
use crate::stats_loader::TeamRatings;

pub const SEASON_GAMES_PRIOR: &str = "season_games_prior";
pub const OPP_TD_RATE_SEASON: &str = "opp_td_rate_season";
pub const OPP_TD_RATE_RECENT: &str = "opp_td_rate_recent";
pub const OPP_ADJUSTMENT: &str = "opp_adjustment";
pub const TEAM_OFFENSE_RATING: &str = "team_offense_rating";
pub const OPP_DEFENSE_RATING: &str = "opp_defense_rating";
pub const TEAM_RED_ZONE_EFF: &str = "team_red_zone_eff";
pub const HOME: &str = "home";
const POSITION_COLUMNS: [(Position, &str); 4] = [
    (Position::Qb, "pos_qb"),
    (Position::Rb, "pos_rb"),
    (Position::Wr, "pos_wr"),
    (Position::Te, "pos_te"),
];

pub fn rolling_column(stat: StatKey, window: usize) -> String {
    format!("{}_roll{window}", stat.as_str())
}

pub fn cumulative_column(stat: StatKey) -> String {
    format!("{}_std", stat.as_str())
}

/// Column names of a feature vector, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    names: Vec<String>,
}

impl FeatureLayout {
    pub fn from_config(config: &FeatureConfig) -> Self {
        let mut names = Vec::new();
        for stat in &config.base_stats {
            for window in &config.window_sizes {
                names.push(rolling_column(*stat, *window));
            }
        }
        for stat in &config.cumulative_stats {
            names.push(cumulative_column(*stat));
        }
        names.extend(
            [
                SEASON_GAMES_PRIOR,
                OPP_TD_RATE_SEASON,
                OPP_TD_RATE_RECENT,
                OPP_ADJUSTMENT,
                TEAM_OFFENSE_RATING,
                OPP_DEFENSE_RATING,
                TEAM_RED_ZONE_EFF,
                HOME,
            ]
            .map(str::to_string),
        );
        names.extend(POSITION_COLUMNS.map(|(_, name)| name.to_string()));
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Positions of `names` within `available`; an unknown name is a configuration error.
pub fn column_indices(available: &[String], names: &[String]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            available.iter().position(|n| n == name).ok_or_else(|| {
                ForecastError::config("feature_columns", format!("unknown feature `{name}`"))
            })
        })
        .collect()
}

/// Mean of `stat` over the last `window` rows of `prior`; fewer rows average what exists, none
/// gives 0.0.
pub fn window_mean(prior: &[PlayerGameRecord], stat: StatKey, window: usize) -> f64 {
    let tail = &prior[prior.len().saturating_sub(window)..];
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().map(|r| r.stat(stat)).sum::<f64>() / tail.len() as f64
}

/// Stat-major means of each stat over the last `w` rows of `prior`, for each window `w`.
pub fn rolling_means(
    prior: &[PlayerGameRecord],
    window_sizes: &[usize],
    base_stats: &[StatKey],
) -> Vec<f64> {
    base_stats
        .iter()
        .flat_map(|stat| window_sizes.iter().map(|w| window_mean(prior, *stat, *w)))
        .collect()
}

/// The tail of `prior` played in `season`. `prior` is sorted and ends before a game of `season`.
pub fn season_to_date(prior: &[PlayerGameRecord], season: i32) -> &[PlayerGameRecord] {
    &prior[prior.partition_point(|r| r.season < season)..]
}

/// Rolling means for one player's history, sorted by (season, week). Row `i` holds
/// [`rolling_means`] over rows `..i`.
pub fn build_rolling(
    history: &[PlayerGameRecord],
    window_sizes: &[usize],
    base_stats: &[StatKey],
) -> Vec<Vec<f64>> {
    (0..history.len())
        .map(|i| rolling_means(&history[..i], window_sizes, base_stats))
        .collect()
}

/// Season-to-date sum of `stat` over strictly prior rows; resets at each new season.
pub fn build_cumulative(history: &[PlayerGameRecord], base_stat: StatKey) -> Vec<f64> {
    history
        .iter()
        .enumerate()
        .map(|(i, record)| {
            season_to_date(&history[..i], record.season)
                .iter()
                .map(|r| r.stat(base_stat))
                .sum()
        })
        .collect()
}

/// Rows of `history` (sorted by season, week) strictly before (`season`, `week`).
pub fn prior_slice(history: &[PlayerGameRecord], season: i32, week: u32) -> &[PlayerGameRecord] {
    let end = history.partition_point(|r| (r.season, r.week) < (season, week));
    &history[..end]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    player_games: u32,
    scorers: u32,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.player_games += other.player_games;
        self.scorers += other.scorers;
    }

    fn rate(&self) -> f64 {
        if self.player_games == 0 {
            0.0
        } else {
            self.scorers as f64 / self.player_games as f64
        }
    }
}

/// Scoring rate a position achieved against an opponent next to the league rate for that
/// position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpponentAdjustment {
    pub opponent_rate: f64,
    pub league_rate: f64,
    /// `opponent_rate / max(league_rate, floor)`; 1.0 when the opponent has no games on record.
    pub ratio: f64,
    pub player_games: u32,
}

/// League-wide touchdown tallies by (season, opponent, position) and (season, position), kept
/// per week so queries can be cut off before a given week.
#[derive(Debug, Clone, Default)]
pub struct LeagueContext {
    allowed: HashMap<(i32, String, Position), BTreeMap<u32, Tally>>,
    league: HashMap<(i32, Position), BTreeMap<u32, Tally>>,
    rate_floor: f64,
}

impl LeagueContext {
    pub fn new(records: &[PlayerGameRecord], rate_floor: f64) -> Self {
        let mut ctx = Self {
            rate_floor,
            ..Self::default()
        };
        for record in records {
            let tally = Tally {
                player_games: 1,
                scorers: u32::from(record.scored_any_td()),
            };
            ctx.allowed
                .entry((record.season, record.opponent.clone(), record.position))
                .or_default()
                .entry(record.week)
                .or_default()
                .add(tally);
            ctx.league
                .entry((record.season, record.position))
                .or_default()
                .entry(record.week)
                .or_default()
                .add(tally);
        }
        ctx
    }

    /// Whole-season rate: every game of `season`, regardless of week.
    pub fn build_opponent_adjustment(
        &self,
        season: i32,
        opponent: &str,
        position: Position,
    ) -> OpponentAdjustment {
        self.adjustment(season, opponent, position, None)
    }

    /// Same rate restricted to weeks strictly before `week`.
    pub fn opponent_adjustment_before(
        &self,
        season: i32,
        opponent: &str,
        position: Position,
        week: u32,
    ) -> OpponentAdjustment {
        self.adjustment(season, opponent, position, Some(week))
    }

    /// Rate allowed to `position` over the opponent's last `games` weeks before `week`.
    pub fn opponent_recent_rate(
        &self,
        season: i32,
        opponent: &str,
        position: Position,
        week: u32,
        games: usize,
    ) -> f64 {
        let Some(weeks) = self.allowed.get(&(season, opponent.to_string(), position)) else {
            return 0.0;
        };
        let mut total = Tally::default();
        for (_, tally) in weeks.range(..week).rev().take(games) {
            total.add(*tally);
        }
        total.rate()
    }

    fn adjustment(
        &self,
        season: i32,
        opponent: &str,
        position: Position,
        before: Option<u32>,
    ) -> OpponentAdjustment {
        let sum = |weeks: Option<&BTreeMap<u32, Tally>>| {
            let mut total = Tally::default();
            if let Some(weeks) = weeks {
                let range = match before {
                    Some(week) => weeks.range(..week),
                    None => weeks.range(..),
                };
                for (_, tally) in range {
                    total.add(*tally);
                }
            }
            total
        };
        let opponent_tally = sum(self.allowed.get(&(season, opponent.to_string(), position)));
        let league_tally = sum(self.league.get(&(season, position)));
        let ratio = if opponent_tally.player_games == 0 {
            1.0
        } else {
            opponent_tally.rate() / league_tally.rate().max(self.rate_floor)
        };
        OpponentAdjustment {
            opponent_rate: opponent_tally.rate(),
            league_rate: league_tally.rate(),
            ratio,
            player_games: opponent_tally.player_games,
        }
    }
}

/// One player's records sorted by (season, week), with each record's row index in the input.
#[derive(Debug, Clone)]
pub struct PlayerHistory {
    pub records: Vec<PlayerGameRecord>,
    source_rows: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerHistories {
    by_player: HashMap<String, PlayerHistory>,
}

impl PlayerHistories {
    pub fn from_records(records: &[PlayerGameRecord]) -> Self {
        let mut staged: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            staged.entry(record.player_id.clone()).or_default().push(idx);
        }
        let by_player = staged
            .into_iter()
            .map(|(player_id, mut rows)| {
                rows.sort_by_key(|idx| (records[*idx].season, records[*idx].week));
                let history = PlayerHistory {
                    records: rows.iter().map(|idx| records[*idx].clone()).collect(),
                    source_rows: rows,
                };
                (player_id, history)
            })
            .collect();
        Self { by_player }
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerHistory> {
        self.by_player.get(player_id)
    }

    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }
}

/// Feature computation over a fixed set of historical records and team ratings.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
    layout: FeatureLayout,
    league: LeagueContext,
    ratings: TeamRatings,
}

impl FeatureBuilder {
    pub fn new(config: &FeatureConfig, records: &[PlayerGameRecord], ratings: &TeamRatings) -> Self {
        Self {
            config: config.clone(),
            layout: FeatureLayout::from_config(config),
            league: LeagueContext::new(records, config.rate_floor),
            ratings: ratings.clone(),
        }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn league(&self) -> &LeagueContext {
        &self.league
    }

    /// Feature vector for a player entering `target`, given `prior`: their history sorted by
    /// (season, week) and ending strictly before the target game.
    pub fn features_for(&self, prior: &[PlayerGameRecord], target: &GameContext) -> Vec<f64> {
        let cfg = &self.config;
        let mut out = Vec::with_capacity(self.layout.width());

        out.extend(rolling_means(prior, &cfg.window_sizes, &cfg.base_stats));

        let this_season = season_to_date(prior, target.season);
        for stat in &cfg.cumulative_stats {
            out.push(this_season.iter().map(|r| r.stat(*stat)).sum());
        }
        out.push(this_season.len() as f64);

        let adjustment = match cfg.opponent_mode {
            OpponentMode::PriorWeeks => self.league.opponent_adjustment_before(
                target.season,
                &target.opponent,
                target.position,
                target.week,
            ),
            OpponentMode::SeasonAverage => self.league.build_opponent_adjustment(
                target.season,
                &target.opponent,
                target.position,
            ),
        };
        out.push(adjustment.opponent_rate);
        out.push(self.league.opponent_recent_rate(
            target.season,
            &target.opponent,
            target.position,
            target.week,
            cfg.opponent_recent_games,
        ));
        out.push(adjustment.ratio);

        let previous = target.season - 1;
        let team = self.ratings.get(previous, &target.team).unwrap_or_default();
        let opponent = self
            .ratings
            .get(previous, &target.opponent)
            .unwrap_or_default();
        out.push(team.offense);
        out.push(opponent.defense);
        out.push(team.red_zone_efficiency);

        out.push(if target.home { 1.0 } else { 0.0 });
        for (position, _) in POSITION_COLUMNS {
            out.push(if target.position == position { 1.0 } else { 0.0 });
        }
        out
    }

    /// One feature vector per input record, returned in input order. Players are processed in
    /// parallel on `pool`.
    pub fn build_rows(
        &self,
        records: &[PlayerGameRecord],
        pool: &WorkerPool,
    ) -> Vec<Vec<f64>> {
        let histories = PlayerHistories::from_records(records);
        debug!(
            players = histories.len(),
            rows = records.len(),
            "building feature rows"
        );
        let per_player: Vec<(usize, Vec<f64>)> = pool.run(|| {
            histories
                .by_player
                .par_iter()
                .flat_map_iter(|(_, history)| {
                    history
                        .records
                        .iter()
                        .zip(&history.source_rows)
                        .map(|(record, row)| {
                            let prior = prior_slice(&history.records, record.season, record.week);
                            (*row, self.features_for(prior, &GameContext::for_record(record)))
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        });

        let mut rows = vec![Vec::new(); records.len()];
        for (row, features) in per_player {
            rows[row] = features;
        }
        rows
    }
}
