use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use td_forecast::config::PipelineConfig;
use td_forecast::error::ForecastError;
use td_forecast::pipeline::{InputPaths, Pipeline};
use td_forecast::predictions::PredictionRequest;
use td_forecast::report;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("td_forecast_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Two backs over three seasons in provider-style columns; "b2" scores every other game.
fn stats_csv() -> String {
    let mut out = String::from("Player ID,Player,Tm,Opp,Year,Wk,Location,Rush Att,Rush TD,Rec,Rec TD\n");
    for season in 2021..=2023 {
        for week in 1..=14u32 {
            let loc = if week % 2 == 0 { "@" } else { "" };
            let b1_td = u32::from(week % 4 == 0);
            let b2_td = u32::from(week % 2 == 0);
            writeln!(out, "b1,Back One,KC,DEN,{season},{week},{loc},14,{b1_td},2,0").unwrap();
            writeln!(out, "b2,Back Two,DEN,KC,{season},{week},,18,{b2_td},3,0").unwrap();
        }
    }
    // A repeated row and a kicker that must be dropped from the table.
    out.push_str("b1,Back One,KC,DEN,2023,1,,99,3,9,9\n");
    out.push_str("k1,Kicker,KC,DEN,2023,1,,0,0,0,0\n");
    out
}

fn write_inputs(dir: &Path) -> InputPaths {
    let stats = dir.join("stats.csv");
    fs::write(&stats, stats_csv()).unwrap();
    let roster = dir.join("roster.csv");
    fs::write(
        &roster,
        "player_id,player_name,team,position,status\n\
         b1,Back One,BUF,RB,\n\
         b2,Back Two,DEN,RB,\n\
         k1,Kicker,KC,K,\n\
         r9,Rookie,DEN,WR,\n\
         x1,Hurt Guy,BUF,WR,Out\n",
    )
    .unwrap();
    let schedule = dir.join("schedule.csv");
    fs::write(
        &schedule,
        "season,week,home_team,away_team\n2024,1,DEN,BUF\n2024,2,KC,DEN\n",
    )
    .unwrap();
    InputPaths {
        stats,
        team_ratings: None,
        roster: Some(roster),
        schedule: Some(schedule),
        exclusions: None,
    }
}

fn test_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.models.min_positive_examples = 3;
    cfg.models.random_forest.n_trees = 20;
    cfg.models.gradient_boosting.n_rounds = 40;
    cfg
}

#[test]
fn loads_provider_columns_and_builds_table() {
    let dir = scratch_dir("table");
    let pipeline = Pipeline::load(test_config(), &write_inputs(&dir)).unwrap();
    assert_eq!(pipeline.data().records.len(), 2 * 3 * 14 + 1);

    let table = pipeline.build_training_table();
    assert_eq!(table.len(), 2 * 3 * 14);
    assert_eq!(table.positives(), 3 * (3 + 7));

    let out = dir.join("out").join("training_table.csv");
    report::write_training_table(&out, &table).unwrap();
    let written = fs::read_to_string(&out).unwrap();
    assert_eq!(written.lines().count(), table.len() + 1);
    assert!(written.lines().next().unwrap().contains("total_tds_roll5"));
}

#[test]
fn predicts_upcoming_week_through_current_team() {
    let dir = scratch_dir("predict");
    let pipeline = Pipeline::load(test_config(), &write_inputs(&dir)).unwrap();

    let request = PredictionRequest::new(2024, 1);
    let rows = pipeline.generate_predictions(&request).unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.player_id.as_str()).collect();
    assert_eq!(rows.len(), 3, "{ids:?}");
    assert!(!ids.contains(&"x1"));
    assert!(!ids.contains(&"k1"));

    let b1 = rows.iter().find(|r| r.player_id == "b1").unwrap();
    assert_eq!(b1.team, "BUF");
    assert_eq!(b1.opponent, "DEN");
    assert!(!b1.home);
    assert_eq!(b1.probabilities.len(), 4);
    for row in &rows {
        for (_, p) in &row.probabilities {
            assert!((0.0..=1.0).contains(p));
        }
    }

    let out = dir.join("predictions.csv");
    report::write_predictions(&out, &rows).unwrap();
    let header = fs::read_to_string(&out).unwrap();
    assert!(header.starts_with("player_id,player_name,team,opponent,home,position,season,week,p_poisson_baseline"));
}

#[test]
fn feature_subset_and_model_filter() {
    let dir = scratch_dir("subset");
    let pipeline = Pipeline::load(test_config(), &write_inputs(&dir)).unwrap();

    let mut request = PredictionRequest::new(2024, 2);
    request.models = vec!["logistic_regression".to_string()];
    request.feature_columns = Some(vec![
        "total_tds_roll5".to_string(),
        "touches_roll3".to_string(),
        "home".to_string(),
    ]);
    let rows = pipeline.generate_predictions(&request).unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.probabilities.len() == 1));
    // Week 2 is KC at home to DEN; BUF is on bye.
    assert!(rows.iter().all(|r| r.team == "DEN"));

    // The baseline keeps reading its own columns even though the subset leaves them out.
    request.models = vec!["poisson_baseline".to_string()];
    let rows = pipeline.generate_predictions(&request).unwrap();
    assert!(rows.iter().all(|r| r.probabilities.len() == 1));
    assert!(rows.iter().all(|r| r.probability("poisson_baseline").is_some()));

    request.feature_columns = Some(vec!["total_tds_roll7".to_string()]);
    assert!(matches!(
        pipeline.generate_predictions(&request),
        Err(ForecastError::Config { .. })
    ));
}

#[test]
fn default_models_accept_a_feature_subset() {
    let dir = scratch_dir("subset_default");
    let pipeline = Pipeline::load(test_config(), &write_inputs(&dir)).unwrap();

    let full = pipeline
        .generate_predictions(&PredictionRequest::new(2024, 1))
        .unwrap();
    let mut request = PredictionRequest::new(2024, 1);
    request.feature_columns = Some(vec![
        "total_tds_roll5".to_string(),
        "touches_roll3".to_string(),
        "home".to_string(),
    ]);
    let rows = pipeline.generate_predictions(&request).unwrap();
    assert_eq!(rows.len(), full.len());

    let names: Vec<&str> = rows[0].probabilities.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "poisson_baseline",
            "logistic_regression",
            "random_forest",
            "gradient_boosting"
        ]
    );
    for row in &rows {
        let same = full.iter().find(|r| r.player_id == row.player_id).unwrap();
        // The baseline is closed-form over the full layout, so the subset cannot move it.
        assert_eq!(
            row.probability("poisson_baseline"),
            same.probability("poisson_baseline")
        );
        for (_, p) in &row.probabilities {
            assert!((0.0..=1.0).contains(p));
        }
    }
}

#[test]
fn backtest_report_files_are_written() {
    let dir = scratch_dir("backtest");
    let pipeline = Pipeline::load(test_config(), &write_inputs(&dir)).unwrap();
    let report_data = pipeline.run_backtest().unwrap();
    assert_eq!(report_data.summary.len(), 4);

    let written = report::write_backtest(&dir.join("reports"), &report_data).unwrap();
    assert_eq!(written.len(), 4);
    let seasons = fs::read_to_string(dir.join("reports").join(report::SEASONS_CSV)).unwrap();
    assert!(seasons.lines().next().unwrap().starts_with("season,model,train_rows"));
    let json = fs::read_to_string(dir.join("reports").join(report::SUMMARY_JSON)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(parsed["generated_at"].is_string());
    assert_eq!(parsed["report"]["summary"].as_array().unwrap().len(), 4);
}

#[test]
fn missing_identity_column_fails_load() {
    let dir = scratch_dir("broken");
    let stats = dir.join("stats.csv");
    fs::write(&stats, "player_id,team,opponent,season,week,home\nb1,KC,DEN,2023,1,1\n").unwrap();
    let paths = InputPaths {
        stats,
        ..InputPaths::default()
    };
    assert!(matches!(
        Pipeline::load(PipelineConfig::default(), &paths),
        Err(ForecastError::DataIntegrity(_))
    ));
}
