use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use td_forecast::backtest::run_backtest;
use td_forecast::calibration::evaluate_probs;
use td_forecast::config::PipelineConfig;
use td_forecast::features::FeatureBuilder;
use td_forecast::player_game::{GameStats, PlayerGameRecord, Position};
use td_forecast::pool::WorkerPool;
use td_forecast::stats_loader::TeamRatings;
use td_forecast::training_table::assemble;

const TEAMS: [&str; 8] = ["KC", "BUF", "CIN", "BAL", "MIA", "DAL", "SF", "DET"];

/// 8 teams x 6 skill players x 3 seasons x 17 weeks, with a deterministic scoring pattern.
fn synthetic_league() -> Vec<PlayerGameRecord> {
    let positions = [
        Position::Rb,
        Position::Rb,
        Position::Wr,
        Position::Wr,
        Position::Wr,
        Position::Te,
    ];
    let mut out = Vec::new();
    for season in 2021..=2023 {
        for week in 1..=17u32 {
            for (t, team) in TEAMS.iter().enumerate() {
                let opp = (t + week as usize) % TEAMS.len();
                let opp = if opp == t { (t + 1) % TEAMS.len() } else { opp };
                for (slot, position) in positions.iter().enumerate() {
                    let seed = t * 31 + slot * 7 + week as usize * 3 + season as usize;
                    let td = if seed % (3 + slot) == 0 { 1.0 } else { 0.0 };
                    let rushing = if *position == Position::Rb { 12.0 + (seed % 9) as f64 } else { 0.0 };
                    let targets = if *position == Position::Rb { 3.0 } else { 4.0 + (seed % 6) as f64 };
                    out.push(PlayerGameRecord {
                        player_id: format!("{team}-{slot}"),
                        player_name: format!("{team} Player {slot}"),
                        team: team.to_string(),
                        opponent: TEAMS[opp].to_string(),
                        position: *position,
                        season,
                        week,
                        home: (t + week as usize) % 2 == 0,
                        stats: GameStats {
                            rushing_attempts: rushing,
                            rushing_yards: rushing * 4.2,
                            rushing_tds: if *position == Position::Rb { td } else { 0.0 },
                            targets,
                            receptions: targets * 0.65,
                            receiving_yards: targets * 7.5,
                            receiving_tds: if *position == Position::Rb { 0.0 } else { td },
                            fantasy_points: 8.0 + 6.0 * td,
                            ..Default::default()
                        },
                    });
                }
            }
        }
    }
    out
}

fn bench_feature_rows(c: &mut Criterion) {
    let records = synthetic_league();
    let cfg = PipelineConfig::default();
    let ratings = TeamRatings::default();
    let builder = FeatureBuilder::new(&cfg.features, &records, &ratings);
    let pool = WorkerPool::global();

    c.bench_function("feature_rows", |b| {
        b.iter(|| {
            let rows = builder.build_rows(black_box(&records), &pool);
            black_box(rows.len());
        })
    });
}

fn bench_training_table(c: &mut Criterion) {
    let records = synthetic_league();
    let cfg = PipelineConfig::default();
    let ratings = TeamRatings::default();

    c.bench_function("training_table_assemble", |b| {
        b.iter(|| {
            let table = assemble(black_box(&records), &ratings, &cfg);
            black_box(table.len());
        })
    });
}

fn bench_backtest(c: &mut Criterion) {
    let mut cfg = PipelineConfig::default();
    cfg.models.random_forest.n_trees = 25;
    cfg.models.gradient_boosting.n_rounds = 40;
    let table = assemble(&synthetic_league(), &TeamRatings::default(), &cfg);

    let mut group = c.benchmark_group("backtest");
    group.sample_size(10);
    group.bench_function("walk_forward", |b| {
        b.iter(|| {
            let report = run_backtest(black_box(&table), &cfg).unwrap();
            black_box(report.summary.len());
        })
    });
    group.finish();
}

fn bench_metrics(c: &mut Criterion) {
    let preds: Vec<f64> = (0..5_000).map(|i| ((i * 37) % 1000) as f64 / 1000.0).collect();
    let labels: Vec<bool> = (0..5_000).map(|i| (i * 13) % 7 == 0).collect();

    c.bench_function("evaluate_probs", |b| {
        b.iter(|| {
            let metrics = evaluate_probs(black_box(&preds), black_box(&labels));
            black_box(metrics.brier);
        })
    });
}

criterion_group!(
    perf,
    bench_feature_rows,
    bench_training_table,
    bench_backtest,
    bench_metrics
);
criterion_main!(perf);
