use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::{FeatureBuilder, column_indices};
use crate::player_game::{PlayerGameRecord, Position};
use crate::pool::WorkerPool;
use crate::stats_loader::TeamRatings;

/// Identifying columns carried alongside each feature row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowMeta {
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub opponent: String,
    pub position: Position,
    pub season: i32,
    pub week: u32,
    pub home: bool,
}

impl RowMeta {
    fn from_record(record: &PlayerGameRecord) -> Self {
        Self {
            player_id: record.player_id.clone(),
            player_name: record.player_name.clone(),
            team: record.team.clone(),
            opponent: record.opponent.clone(),
            position: record.position,
            season: record.season,
            week: record.week,
            home: record.home,
        }
    }
}

/// Features, labels and metadata aligned on row index.
#[derive(Debug, Clone, Default)]
pub struct TrainingTable {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
    pub meta: Vec<RowMeta>,
}

impl TrainingTable {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l).count()
    }

    pub fn seasons(&self) -> Vec<i32> {
        let mut seasons: Vec<i32> = self.meta.iter().map(|m| m.season).collect();
        seasons.sort_unstable();
        seasons.dedup();
        seasons
    }

    fn subset(&self, keep: impl Fn(&RowMeta) -> bool) -> Self {
        let mut out = Self {
            feature_names: self.feature_names.clone(),
            ..Self::default()
        };
        for (idx, meta) in self.meta.iter().enumerate() {
            if keep(meta) {
                out.features.push(self.features[idx].clone());
                out.labels.push(self.labels[idx]);
                out.meta.push(meta.clone());
            }
        }
        out
    }

    /// (rows from seasons before `season`, rows from `season`).
    pub fn partition(&self, season: i32) -> (Self, Self) {
        (
            self.subset(|m| m.season < season),
            self.subset(|m| m.season == season),
        )
    }

    /// Project onto the named columns, in the order given.
    pub fn select_columns(&self, names: &[String]) -> Result<Self> {
        let indices = column_indices(&self.feature_names, names)?;
        Ok(Self {
            feature_names: names.to_vec(),
            features: self
                .features
                .iter()
                .map(|row| indices.iter().map(|i| row[*i]).collect())
                .collect(),
            labels: self.labels.clone(),
            meta: self.meta.clone(),
        })
    }
}

/// Feature rows and labels for every record at a tracked position.
pub fn assemble(
    records: &[PlayerGameRecord],
    ratings: &TeamRatings,
    config: &PipelineConfig,
) -> TrainingTable {
    let builder = FeatureBuilder::new(&config.features, records, ratings);
    let pool = WorkerPool::sized(config.runtime.feature_workers);
    let rows = builder.build_rows(records, &pool);

    let mut table = TrainingTable {
        feature_names: builder.layout().names().to_vec(),
        ..TrainingTable::default()
    };
    let mut dropped = 0usize;
    for (record, features) in records.iter().zip(rows) {
        if !config.is_tracked(record.position) {
            dropped += 1;
            continue;
        }
        table.features.push(features);
        table.labels.push(record.scored_any_td());
        table.meta.push(RowMeta::from_record(record));
    }
    if dropped > 0 {
        warn!(rows = dropped, "dropped rows at untracked positions");
    }
    info!(
        rows = table.len(),
        positives = table.positives(),
        features = table.feature_names.len(),
        "assembled training table"
    );
    table
}

#[cfg(test)]
mod tests {
    use super::assemble;
    use crate::config::PipelineConfig;
    use crate::error::ForecastError;
    use crate::player_game::{GameStats, PlayerGameRecord, Position};
    use crate::stats_loader::TeamRatings;

    fn record(id: &str, position: Position, season: i32, week: u32, td: bool) -> PlayerGameRecord {
        PlayerGameRecord {
            player_id: id.to_string(),
            player_name: id.to_string(),
            team: "BUF".to_string(),
            opponent: "MIA".to_string(),
            position,
            season,
            week,
            home: true,
            stats: GameStats {
                receiving_tds: if td { 1.0 } else { 0.0 },
                ..Default::default()
            },
        }
    }

    #[test]
    fn filters_positions_and_partitions_by_season() {
        let records = vec![
            record("wr", Position::Wr, 2022, 1, true),
            record("qb", Position::Qb, 2022, 1, true),
            record("wr", Position::Wr, 2023, 1, false),
            record("k", Position::Other, 2023, 1, false),
            record("wr", Position::Wr, 2024, 1, true),
        ];
        let table = assemble(&records, &TeamRatings::default(), &PipelineConfig::default());
        assert_eq!(table.len(), 3);
        assert_eq!(table.labels, vec![true, false, true]);
        assert_eq!(table.seasons(), vec![2022, 2023, 2024]);

        let (train, test) = table.partition(2023);
        assert_eq!(train.len(), 1);
        assert_eq!(test.len(), 1);
        assert!(train.meta.iter().all(|m| m.season < 2023));
        assert!(test.meta.iter().all(|m| m.season == 2023));
    }

    #[test]
    fn select_columns_projects_and_rejects_unknown() {
        let records = vec![record("te", Position::Te, 2023, 1, false)];
        let table = assemble(&records, &TeamRatings::default(), &PipelineConfig::default());
        let picked = table
            .select_columns(&["home".to_string(), "pos_te".to_string()])
            .unwrap();
        assert_eq!(picked.features[0], vec![1.0, 1.0]);
        assert!(matches!(
            table.select_columns(&["nope".to_string()]),
            Err(ForecastError::Config { .. })
        ));
    }
}
