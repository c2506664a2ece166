//! Raw tables in, typed records and lookup tables out.
//!
//! Provider files arrive as CSV (or Parquet for bulk player-game dumps). Both are read into a
//! [`RawTable`] with normalized column names, then converted by the `load_*` functions. Identity
//! columns are required; counting stats default to zero.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use tracing::{debug, warn};

use crate::error::{ForecastError, Result};
use crate::player_game::{GameStats, PlayerGameRecord, Position};

const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("id", "player_id"),
    ("gsis_id", "player_id"),
    ("player", "player_name"),
    ("name", "player_name"),
    ("player_display_name", "player_name"),
    ("tm", "team"),
    ("recent_team", "team"),
    ("opp", "opponent"),
    ("opponent_team", "opponent"),
    ("year", "season"),
    ("wk", "week"),
    ("is_home", "home"),
    ("location", "game_location"),
    ("pos", "position"),
    ("carries", "rushing_attempts"),
    ("rush_att", "rushing_attempts"),
    ("rushing_att", "rushing_attempts"),
    ("rush_yds", "rushing_yards"),
    ("rushing_yds", "rushing_yards"),
    ("rush_td", "rushing_tds"),
    ("rushing_td", "rushing_tds"),
    ("tgt", "targets"),
    ("rec", "receptions"),
    ("rec_yds", "receiving_yards"),
    ("receiving_yds", "receiving_yards"),
    ("rec_td", "receiving_tds"),
    ("receiving_td", "receiving_tds"),
    ("pass_att", "passing_attempts"),
    ("pass_yds", "passing_yards"),
    ("passing_yds", "passing_yards"),
    ("pass_td", "passing_tds"),
    ("passing_td", "passing_tds"),
    ("fpts", "fantasy_points"),
    ("fantasy_pts", "fantasy_points"),
    ("off_rating", "offense_rating"),
    ("def_rating", "defense_rating"),
    ("red_zone_eff", "red_zone_efficiency"),
    ("rz_eff", "red_zone_efficiency"),
    ("injury_status", "status"),
    ("game_status", "status"),
];

const STAT_COLUMNS: [&str; 11] = [
    "rushing_attempts",
    "rushing_yards",
    "rushing_tds",
    "targets",
    "receptions",
    "receiving_yards",
    "receiving_tds",
    "passing_attempts",
    "passing_yards",
    "passing_tds",
    "fantasy_points",
];

const INJURED_STATUSES: [&str; 5] = ["OUT", "IR", "DOUBTFUL", "PUP", "SUSPENDED"];

/// Canonical column name: lowercase snake case with provider aliases resolved.
pub fn normalize_column(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_sep = true;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == out)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(out)
}

/// A rectangular table of string cells with normalized headers.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub origin: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(origin: impl Into<PathBuf>, headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self {
            origin: origin.into(),
            headers: headers.iter().map(|h| normalize_column(h)).collect(),
            rows,
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| {
            ForecastError::DataIntegrity(format!(
                "{}: required column `{name}` is missing (have: {})",
                self.origin.display(),
                self.headers.join(", ")
            ))
        })
    }

    fn cell<'a>(&self, row: &'a [String], idx: usize) -> &'a str {
        row.get(idx).map(|s| s.trim()).unwrap_or("")
    }
}

pub fn read_csv_table(path: &Path) -> Result<RawTable> {
    let file = fs::File::open(path).map_err(|source| ForecastError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv_from_reader(file, path)
}

pub fn read_csv_from_reader<R: Read>(rdr: R, origin: &Path) -> Result<RawTable> {
    let csv_err = |source| ForecastError::Csv {
        path: origin.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(rdr);
    let headers = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(normalize_column)
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(RawTable {
        origin: origin.to_path_buf(),
        headers,
        rows,
    })
}

pub fn read_parquet_table(path: &Path) -> Result<RawTable> {
    let parquet_err = |source| ForecastError::Parquet {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::open(path).map_err(|source| ForecastError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = SerializedFileReader::new(file).map_err(parquet_err)?;
    let headers = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|field| normalize_column(field.name()))
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for row in reader.get_row_iter(None).map_err(parquet_err)? {
        let row = row.map_err(parquet_err)?;
        rows.push(
            row.get_column_iter()
                .map(|(_, field)| field_to_cell(field))
                .collect(),
        );
    }
    Ok(RawTable {
        origin: path.to_path_buf(),
        headers,
        rows,
    })
}

/// Dispatch on extension: `.parquet` goes through the Parquet reader, anything else is CSV.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    if is_parquet {
        read_parquet_table(path)
    } else {
        read_csv_table(path)
    }
}

fn field_to_cell(field: &Field) -> String {
    match field {
        Field::Null => String::new(),
        Field::Str(s) => s.clone(),
        Field::Bool(v) => v.to_string(),
        Field::Byte(v) => v.to_string(),
        Field::Short(v) => v.to_string(),
        Field::Int(v) => v.to_string(),
        Field::Long(v) => v.to_string(),
        Field::UByte(v) => v.to_string(),
        Field::UShort(v) => v.to_string(),
        Field::UInt(v) => v.to_string(),
        Field::ULong(v) => v.to_string(),
        Field::Float(v) => v.to_string(),
        Field::Double(v) => v.to_string(),
        other => other.to_string(),
    }
}

#[derive(Clone, Copy)]
enum HomeColumn {
    Flag(usize),
    /// Pro-Football-Reference style: "@" marks an away game, blank is home.
    Location(usize),
}

#[derive(Debug, Clone)]
pub struct PlayerGameLoad {
    pub records: Vec<PlayerGameRecord>,
    pub zero_filled: usize,
    pub duplicates: usize,
}

/// Convert a raw player-game table into deduplicated records (first occurrence wins, input order
/// otherwise kept). Positions come from the row, then the roster, then `Other`.
pub fn load_player_games(table: &RawTable, roster: Option<&Roster>) -> Result<PlayerGameLoad> {
    let id_idx = table.require("player_id")?;
    let name_idx = table.require("player_name")?;
    let team_idx = table.require("team")?;
    let opp_idx = table.require("opponent")?;
    let season_idx = table.require("season")?;
    let week_idx = table.require("week")?;
    let home_column = match (table.column("home"), table.column("game_location")) {
        (Some(idx), _) => HomeColumn::Flag(idx),
        (None, Some(idx)) => HomeColumn::Location(idx),
        (None, None) => {
            return Err(ForecastError::DataIntegrity(format!(
                "{}: required column `home` (or `game_location`) is missing",
                table.origin.display()
            )));
        }
    };
    let position_idx = table.column("position");

    let stat_idx: Vec<Option<usize>> = STAT_COLUMNS.iter().map(|c| table.column(c)).collect();
    let missing_stats: Vec<&str> = STAT_COLUMNS
        .iter()
        .zip(&stat_idx)
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing_stats.is_empty() {
        warn!(
            source = %table.origin.display(),
            columns = ?missing_stats,
            "stat columns absent, treating as zero"
        );
    }

    let mut seen: HashSet<(String, i32, u32)> = HashSet::with_capacity(table.rows.len());
    let mut records = Vec::with_capacity(table.rows.len());
    let mut zero_filled = 0usize;
    let mut duplicates = 0usize;

    for (line, row) in table.rows.iter().enumerate() {
        let player_id = table.cell(row, id_idx).to_string();
        if player_id.is_empty() {
            return Err(row_error(table, line, "player_id", "empty"));
        }
        let season = parse_int::<i32>(table, row, line, season_idx, "season")?;
        let week = parse_int::<u32>(table, row, line, week_idx, "week")?;
        if week == 0 {
            return Err(row_error(table, line, "week", "weeks are 1-based"));
        }
        if !seen.insert((player_id.clone(), season, week)) {
            duplicates += 1;
            continue;
        }

        let home = match home_column {
            HomeColumn::Flag(idx) => parse_home_flag(table.cell(row, idx))
                .ok_or_else(|| row_error(table, line, "home", "not a home/away flag"))?,
            HomeColumn::Location(idx) => table.cell(row, idx) != "@",
        };

        let mut values = [0.0_f64; STAT_COLUMNS.len()];
        for (slot, (column, idx)) in values.iter_mut().zip(STAT_COLUMNS.iter().zip(&stat_idx)) {
            match idx {
                Some(idx) => match parse_stat(table.cell(row, *idx)) {
                    Some(v) => *slot = v,
                    None if is_blank(table.cell(row, *idx)) => zero_filled += 1,
                    None => return Err(row_error(table, line, column, "not numeric")),
                },
                None => zero_filled += 1,
            }
        }

        let position = position_idx
            .map(|idx| table.cell(row, idx))
            .filter(|raw| !raw.is_empty())
            .map(Position::parse_lenient)
            .or_else(|| roster.and_then(|r| r.position(&player_id)))
            .unwrap_or(Position::Other);

        records.push(PlayerGameRecord {
            player_name: table.cell(row, name_idx).to_string(),
            team: table.cell(row, team_idx).to_ascii_uppercase(),
            opponent: table.cell(row, opp_idx).to_ascii_uppercase(),
            player_id,
            position,
            season,
            week,
            home,
            stats: GameStats {
                rushing_attempts: values[0],
                rushing_yards: values[1],
                rushing_tds: values[2],
                targets: values[3],
                receptions: values[4],
                receiving_yards: values[5],
                receiving_tds: values[6],
                passing_attempts: values[7],
                passing_yards: values[8],
                passing_tds: values[9],
                fantasy_points: values[10],
            },
        });
    }

    if zero_filled > 0 {
        warn!(
            source = %table.origin.display(),
            cells = zero_filled,
            "zero-filled missing stat cells"
        );
    }
    if duplicates > 0 {
        warn!(
            source = %table.origin.display(),
            rows = duplicates,
            "dropped duplicate (player_id, season, week) rows"
        );
    }
    debug!(rows = records.len(), "loaded player-game records");

    Ok(PlayerGameLoad {
        records,
        zero_filled,
        duplicates,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamRating {
    pub offense: f64,
    pub defense: f64,
    pub red_zone_efficiency: f64,
}

/// Team ratings and red-zone efficiency keyed by (season, team).
#[derive(Debug, Clone, Default)]
pub struct TeamRatings {
    by_key: HashMap<(i32, String), TeamRating>,
}

impl TeamRatings {
    pub fn insert(&mut self, season: i32, team: &str, rating: TeamRating) {
        self.by_key
            .insert((season, team.trim().to_ascii_uppercase()), rating);
    }

    pub fn get(&self, season: i32, team: &str) -> Option<TeamRating> {
        self.by_key.get(&(season, team.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

pub fn load_team_ratings(table: &RawTable) -> Result<TeamRatings> {
    let season_idx = table.require("season")?;
    let team_idx = table.require("team")?;
    let offense_idx = table.column("offense_rating");
    let defense_idx = table.column("defense_rating");
    let red_zone_idx = table.column("red_zone_efficiency");

    let mut ratings = TeamRatings::default();
    for (line, row) in table.rows.iter().enumerate() {
        let season = parse_int::<i32>(table, row, line, season_idx, "season")?;
        let team = table.cell(row, team_idx);
        if team.is_empty() {
            return Err(row_error(table, line, "team", "empty"));
        }
        let read = |idx: Option<usize>, column: &str| -> Result<f64> {
            let Some(idx) = idx else {
                return Ok(0.0);
            };
            let raw = table.cell(row, idx);
            match parse_stat(raw) {
                Some(v) => Ok(v),
                None if is_blank(raw) => Ok(0.0),
                None => Err(row_error(table, line, column, "not numeric")),
            }
        };
        ratings.insert(
            season,
            team,
            TeamRating {
                offense: read(offense_idx, "offense_rating")?,
                defense: read(defense_idx, "defense_rating")?,
                red_zone_efficiency: read(red_zone_idx, "red_zone_efficiency")?,
            },
        );
    }
    Ok(ratings)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub position: Position,
    pub status: Option<String>,
}

impl RosterEntry {
    pub fn is_injured(&self) -> bool {
        self.status.as_deref().is_some_and(|status| {
            let upper = status.trim().to_ascii_uppercase();
            INJURED_STATUSES.iter().any(|s| *s == upper)
        })
    }
}

/// Current roster: one entry per player, latest season wins when the table spans several.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    by_id: HashMap<String, usize>,
}

impl Roster {
    pub fn from_entries(entries: Vec<RosterEntry>) -> Self {
        let mut roster = Self::default();
        for entry in entries {
            roster.upsert(entry);
        }
        roster
    }

    fn upsert(&mut self, entry: RosterEntry) {
        match self.by_id.get(&entry.player_id) {
            Some(idx) => self.entries[*idx] = entry,
            None => {
                self.by_id.insert(entry.player_id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, player_id: &str) -> Option<&RosterEntry> {
        self.by_id.get(player_id).map(|idx| &self.entries[*idx])
    }

    pub fn position(&self, player_id: &str) -> Option<Position> {
        self.get(player_id).map(|e| e.position)
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Players the roster itself marks as unavailable.
    pub fn injured_ids(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|e| e.is_injured())
            .map(|e| e.player_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_roster(table: &RawTable) -> Result<Roster> {
    let id_idx = table.require("player_id")?;
    let team_idx = table.require("team")?;
    let position_idx = table.require("position")?;
    let name_idx = table.column("player_name");
    let status_idx = table.column("status");
    let season_idx = table.column("season");

    let mut staged: Vec<(i32, usize, RosterEntry)> = Vec::with_capacity(table.rows.len());
    for (line, row) in table.rows.iter().enumerate() {
        let player_id = table.cell(row, id_idx).to_string();
        if player_id.is_empty() {
            return Err(row_error(table, line, "player_id", "empty"));
        }
        let season = match season_idx {
            Some(idx) => parse_int::<i32>(table, row, line, idx, "season")?,
            None => 0,
        };
        let status = status_idx
            .map(|idx| table.cell(row, idx).to_string())
            .filter(|s| !s.is_empty());
        staged.push((
            season,
            line,
            RosterEntry {
                player_name: name_idx
                    .map(|idx| table.cell(row, idx).to_string())
                    .unwrap_or_default(),
                team: table.cell(row, team_idx).to_ascii_uppercase(),
                position: Position::parse_lenient(table.cell(row, position_idx)),
                player_id,
                status,
            },
        ));
    }
    // Later seasons (then later lines) overwrite earlier ones.
    staged.sort_by_key(|(season, line, _)| (*season, *line));
    Ok(Roster::from_entries(
        staged.into_iter().map(|(_, _, entry)| entry).collect(),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingGame {
    pub season: i32,
    pub week: u32,
    pub home_team: String,
    pub away_team: String,
}

impl UpcomingGame {
    /// (opponent, is_home) for `team`, if it plays in this game.
    pub fn side_for(&self, team: &str) -> Option<(&str, bool)> {
        if self.home_team == team {
            Some((self.away_team.as_str(), true))
        } else if self.away_team == team {
            Some((self.home_team.as_str(), false))
        } else {
            None
        }
    }
}

pub fn load_schedule(table: &RawTable) -> Result<Vec<UpcomingGame>> {
    let season_idx = table.require("season")?;
    let week_idx = table.require("week")?;
    let home_idx = table.require("home_team")?;
    let away_idx = table.require("away_team")?;

    let mut games = Vec::with_capacity(table.rows.len());
    for (line, row) in table.rows.iter().enumerate() {
        let home_team = table.cell(row, home_idx).to_ascii_uppercase();
        let away_team = table.cell(row, away_idx).to_ascii_uppercase();
        if home_team.is_empty() || away_team.is_empty() {
            return Err(row_error(table, line, "home_team/away_team", "empty"));
        }
        games.push(UpcomingGame {
            season: parse_int::<i32>(table, row, line, season_idx, "season")?,
            week: parse_int::<u32>(table, row, line, week_idx, "week")?,
            home_team,
            away_team,
        });
    }
    Ok(games)
}

/// Externally maintained exclusion list: any table with a `player_id` column.
pub fn load_exclusions(table: &RawTable) -> Result<HashSet<String>> {
    let id_idx = table.require("player_id")?;
    Ok(table
        .rows
        .iter()
        .map(|row| table.cell(row, id_idx).to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

/// Every player's current team: the roster's team when listed, otherwise the team on the
/// player's latest record. Used to match historical rows to the upcoming schedule after trades.
pub fn current_teams(records: &[PlayerGameRecord], roster: &Roster) -> HashMap<String, String> {
    let mut latest: HashMap<&str, (i32, u32, &str)> = HashMap::new();
    for r in records {
        let entry = latest
            .entry(r.player_id.as_str())
            .or_insert((r.season, r.week, r.team.as_str()));
        if (r.season, r.week) > (entry.0, entry.1) {
            *entry = (r.season, r.week, r.team.as_str());
        }
    }
    let mut out: HashMap<String, String> = latest
        .into_iter()
        .map(|(id, (_, _, team))| (id.to_string(), team.to_string()))
        .collect();
    for entry in roster.entries() {
        out.insert(entry.player_id.clone(), entry.team.clone());
    }
    out
}

fn parse_home_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "home" | "h" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "away" | "a" | "@" => Some(false),
        _ => None,
    }
}

fn is_blank(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "" | "na" | "nan" | "null" | "none" | "-"
    )
}

fn parse_stat(raw: &str) -> Option<f64> {
    if is_blank(raw) {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_int<T: std::str::FromStr>(
    table: &RawTable,
    row: &[String],
    line: usize,
    idx: usize,
    column: &str,
) -> Result<T> {
    let raw = table.cell(row, idx);
    raw.parse::<T>()
        .or_else(|_| {
            // Some providers export integer columns as floats ("2023.0").
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0)
                .and_then(|v| format!("{v:.0}").parse::<T>().ok())
                .ok_or(())
        })
        .map_err(|_| row_error(table, line, column, "not an integer"))
}

fn row_error(table: &RawTable, line: usize, column: &str, what: &str) -> ForecastError {
    ForecastError::DataIntegrity(format!(
        "{} row {}: column `{column}` {what}",
        table.origin.display(),
        line + 1
    ))
}
