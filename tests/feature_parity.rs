use std::collections::HashSet;

use td_forecast::config::{OpponentMode, PipelineConfig};
use td_forecast::features::{FeatureBuilder, FeatureLayout, build_cumulative};
use td_forecast::player_game::{GameStats, PlayerGameRecord, Position, StatKey};
use td_forecast::projector::{UpcomingWeek, project_week};
use td_forecast::stats_loader::{
    Roster, RosterEntry, TeamRating, TeamRatings, UpcomingGame,
};
use td_forecast::training_table::assemble;

const TEAMS: [&str; 4] = ["KC", "BUF", "CIN", "BAL"];

const PAIRINGS: [[(usize, usize); 2]; 3] = [[(0, 1), (2, 3)], [(0, 2), (1, 3)], [(0, 3), (1, 2)]];

/// Four teams, one receiver each, rotating pairings over two seasons.
fn league() -> Vec<PlayerGameRecord> {
    let mut out = Vec::new();
    for season in [2022, 2023] {
        for week in 1..=12u32 {
            for (a, b) in PAIRINGS[week as usize % 3] {
                let a_home = week % 2 == 0;
                for (me, opp, home) in [(a, b, a_home), (b, a, !a_home)] {
                    let score = (week as usize + me) % 3 == 0;
                    out.push(PlayerGameRecord {
                        player_id: format!("wr-{}", TEAMS[me]),
                        player_name: format!("{} Receiver", TEAMS[me]),
                        team: TEAMS[me].to_string(),
                        opponent: TEAMS[opp].to_string(),
                        position: Position::Wr,
                        season,
                        week,
                        home,
                        stats: GameStats {
                            targets: 6.0 + me as f64,
                            receptions: 4.0 + (week % 3) as f64,
                            receiving_yards: 50.0 + 3.0 * week as f64,
                            receiving_tds: if score { 1.0 } else { 0.0 },
                            fantasy_points: 9.0 + if score { 6.0 } else { 0.0 },
                            ..Default::default()
                        },
                    });
                }
            }
        }
    }
    out
}

fn ratings() -> TeamRatings {
    let mut ratings = TeamRatings::default();
    for (i, team) in TEAMS.iter().enumerate() {
        ratings.insert(
            2022,
            team,
            TeamRating {
                offense: i as f64,
                defense: -(i as f64),
                red_zone_efficiency: 0.5 + 0.05 * i as f64,
            },
        );
    }
    ratings
}

#[test]
fn projected_rows_match_training_rows() {
    let records = league();
    let cfg = PipelineConfig::default();
    let table = assemble(&records, &ratings(), &cfg);

    // Re-project 2023 week 9 for every player, using history strictly before it.
    let target: Vec<&PlayerGameRecord> = records
        .iter()
        .filter(|r| r.season == 2023 && r.week == 9)
        .collect();
    let schedule: Vec<UpcomingGame> = target
        .iter()
        .filter(|r| r.home)
        .map(|r| UpcomingGame {
            season: 2023,
            week: 9,
            home_team: r.team.clone(),
            away_team: r.opponent.clone(),
        })
        .collect();
    let roster = Roster::from_entries(
        target
            .iter()
            .map(|r| RosterEntry {
                player_id: r.player_id.clone(),
                player_name: r.player_name.clone(),
                team: r.team.clone(),
                position: r.position,
                status: None,
            })
            .collect(),
    );
    let exclusions = HashSet::new();
    let upcoming = UpcomingWeek {
        season: 2023,
        week: 9,
        schedule: &schedule,
        roster: &roster,
        exclusions: &exclusions,
    };
    let week = project_week(&records, &ratings(), &upcoming, &cfg).unwrap();
    assert_eq!(week.feature_names, table.feature_names);
    assert!(!week.rows.is_empty());

    for row in &week.rows {
        let idx = table
            .meta
            .iter()
            .position(|m| m.player_id == row.player_id && m.season == 2023 && m.week == 9)
            .unwrap();
        assert_eq!(row.context.opponent, table.meta[idx].opponent);
        assert_eq!(row.context.home, table.meta[idx].home);
        assert_eq!(row.features, table.features[idx], "{}", row.player_id);
    }
}

#[test]
fn team_context_comes_from_previous_season() {
    let records = league();
    let cfg = PipelineConfig::default();
    let table = assemble(&records, &ratings(), &cfg);
    let layout = FeatureLayout::from_config(&cfg.features);
    let offense = layout.index_of("team_offense_rating").unwrap();
    let red_zone = layout.index_of("team_red_zone_eff").unwrap();

    for (meta, row) in table.meta.iter().zip(&table.features) {
        let t = TEAMS.iter().position(|t| *t == meta.team).unwrap();
        if meta.season == 2023 {
            assert_eq!(row[offense], t as f64);
            assert!((row[red_zone] - (0.5 + 0.05 * t as f64)).abs() < 1e-12);
        } else {
            // No 2021 ratings on file.
            assert_eq!(row[offense], 0.0);
            assert_eq!(row[red_zone], 0.0);
        }
    }
}

#[test]
fn first_game_of_player_and_of_season() {
    let records = league();
    let cfg = PipelineConfig::default();
    let table = assemble(&records, &ratings(), &cfg);
    let layout = FeatureLayout::from_config(&cfg.features);
    let season_games = layout.index_of("season_games_prior").unwrap();
    let cum_tds = layout.index_of("total_tds_std").unwrap();
    let roll12 = layout.index_of("receptions_roll12").unwrap();

    for (meta, row) in table.meta.iter().zip(&table.features) {
        if meta.week != 1 {
            continue;
        }
        assert_eq!(row[season_games], 0.0);
        assert_eq!(row[cum_tds], 0.0);
        if meta.season == 2022 {
            // Zero-prior state: every rolling and cumulative value is 0.
            assert!(row[..cum_tds + 1].iter().all(|v| *v == 0.0));
        } else {
            // Windows carry over the season boundary.
            assert!(row[roll12] > 0.0);
        }
    }

    let history: Vec<PlayerGameRecord> = records
        .iter()
        .filter(|r| r.player_id == "wr-KC")
        .cloned()
        .collect();
    let cumulative = build_cumulative(&history, StatKey::TotalTds);
    assert_eq!(cumulative[0], 0.0);
    assert_eq!(cumulative[12], 0.0);
}

#[test]
fn season_average_mode_sees_the_whole_season() {
    let records = league();
    let mut cfg = PipelineConfig::default();
    let causal = FeatureBuilder::new(&cfg.features, &records, &ratings());
    cfg.features.opponent_mode = OpponentMode::SeasonAverage;
    let leaky = FeatureBuilder::new(&cfg.features, &records, &ratings());

    let ctx = causal.league();
    let full = ctx.build_opponent_adjustment(2023, "BUF", Position::Wr);
    let before = ctx.opponent_adjustment_before(2023, "BUF", Position::Wr, 1);
    assert_eq!(before.player_games, 0);
    assert_eq!(before.ratio, 1.0);
    assert!(full.player_games > 0);

    let idx = causal.layout().index_of("opp_td_rate_season").unwrap();
    let first = records
        .iter()
        .find(|r| r.season == 2023 && r.week == 1)
        .unwrap();
    let ctx_first = td_forecast::player_game::GameContext::for_record(first);
    assert_eq!(causal.features_for(&[], &ctx_first)[idx], 0.0);
    let leaky_rate = leaky.features_for(&[], &ctx_first)[idx];
    let whole = leaky
        .league()
        .build_opponent_adjustment(2023, &first.opponent, first.position)
        .opponent_rate;
    assert_eq!(leaky_rate, whole);
}
