use crate::error::StoreError;
use crate::moves::{Winner, normalize_movetext, replay_mainline, winner_from_movetext};
use crate::types::GameRecord;
use duckdb::{Connection, params};
use log::{debug, info};
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_TABLE: &str = "games";

/// Rows shown in the summary preview, lowest ids first.
pub const SUMMARY_HEAD_ROWS: usize = 5;

/// Where finished records go.
pub trait GameSink {
    /// Called once per run before the first `append`.
    fn initialize(&mut self) -> Result<(), StoreError>;

    fn append(&mut self, record: &GameRecord) -> Result<(), StoreError>;
}

impl GameSink for Vec<GameRecord> {
    fn initialize(&mut self) -> Result<(), StoreError> {
        self.clear();
        Ok(())
    }

    fn append(&mut self, record: &GameRecord) -> Result<(), StoreError> {
        self.push(record.clone());
        Ok(())
    }
}

impl<S: GameSink + ?Sized> GameSink for &mut S {
    fn initialize(&mut self) -> Result<(), StoreError> {
        (**self).initialize()
    }

    fn append(&mut self, record: &GameRecord) -> Result<(), StoreError> {
        (**self).append(record)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum GameColumn {
    GameId = 0,
    TimeControl = 1,
    Event = 2,
    WhiteElo = 3,
    BlackElo = 4,
    Opening = 5,
    Pgn = 6,
}

const GAME_COLUMN_COUNT: usize = 7;

impl GameColumn {
    const fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        GAME_COLUMNS[self.index()].name
    }
}

struct GameColumnDef {
    name: &'static str,
    sql_type: &'static str,
}

const GAME_COLUMNS: [GameColumnDef; GAME_COLUMN_COUNT] = [
    GameColumnDef {
        name: "GameID",
        sql_type: "BIGINT PRIMARY KEY",
    },
    GameColumnDef {
        name: "TimeControl",
        sql_type: "VARCHAR",
    },
    GameColumnDef {
        name: "Event",
        sql_type: "VARCHAR",
    },
    GameColumnDef {
        name: "WhiteElo",
        sql_type: "UINTEGER NOT NULL",
    },
    GameColumnDef {
        name: "BlackElo",
        sql_type: "UINTEGER NOT NULL",
    },
    GameColumnDef {
        name: "Opening",
        sql_type: "VARCHAR",
    },
    GameColumnDef {
        name: "PGN",
        sql_type: "VARCHAR NOT NULL",
    },
];

fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WinnerCounts {
    pub white: u64,
    pub black: u64,
    pub draw: u64,
    pub unknown: u64,
}

impl WinnerCounts {
    fn add(&mut self, winner: Winner) {
        match winner {
            Winner::White => self.white += 1,
            Winner::Black => self.black += 1,
            Winner::Draw => self.draw += 1,
            Winner::Unknown => self.unknown += 1,
        }
    }
}

/// One stored game as shown in the summary preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GamePreview {
    pub game_id: i64,
    pub white_elo: u32,
    pub black_elo: u32,
    /// Stored move-text with comments, NAGs and variations stripped.
    pub moves: String,
    pub result: Option<String>,
    /// `None` when the main line does not replay.
    pub final_fen: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub rows: u64,
    pub columns: u64,
    pub winners: WinnerCounts,
    pub mean_plies: Option<f64>,
    pub unreplayable: u64,
    pub head: Vec<GamePreview>,
}

/// Games table in a DuckDB database file. `initialize` is destructive.
pub struct DuckDbStore {
    conn: Connection,
    table: String,
}

impl DuckDbStore {
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.display().to_string(),
                source,
            })?;
        }
        debug!("opening DuckDB database {}", path.display());
        Ok(Self {
            conn: Connection::open(path)?,
            table: table.to_string(),
        })
    }

    /// Like `open`, but never creates anything: the database file must exist.
    pub fn open_existing(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StoreError::MissingDatabase(path.display().to_string()));
        }
        Self::open(path, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            conn: Connection::open_in_memory()?,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn sequence_name(&self) -> String {
        format!("{}_id_seq", self.table)
    }

    fn create_table_sql(&self) -> String {
        let columns: Vec<String> = GAME_COLUMNS
            .iter()
            .map(|column| {
                if column.name == GameColumn::GameId.name() {
                    format!(
                        "\"{}\" {} DEFAULT nextval('{}')",
                        column.name,
                        column.sql_type,
                        self.sequence_name()
                    )
                } else {
                    format!("\"{}\" {}", column.name, column.sql_type)
                }
            })
            .collect();
        format!("CREATE TABLE \"{}\" ({})", self.table, columns.join(", "))
    }

    fn insert_sql(&self) -> String {
        let columns = [
            GameColumn::TimeControl,
            GameColumn::Event,
            GameColumn::WhiteElo,
            GameColumn::BlackElo,
            GameColumn::Opening,
            GameColumn::Pgn,
        ];
        let names: Vec<String> = columns
            .iter()
            .map(|c| format!("\"{}\"", c.name()))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders
        )
    }

    pub fn row_count(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn column_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.columns WHERE table_name = ?",
            params![self.table],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Reads the table back and reports size, result split and replay health.
    pub fn summary(&self) -> Result<TableSummary, StoreError> {
        let mut summary = TableSummary {
            table: self.table.clone(),
            rows: self.row_count()?,
            columns: self.column_count()?,
            ..TableSummary::default()
        };

        let sql = format!(
            "SELECT \"{}\", \"{}\", \"{}\", \"{}\" FROM \"{}\" ORDER BY \"{}\"",
            GameColumn::GameId.name(),
            GameColumn::WhiteElo.name(),
            GameColumn::BlackElo.name(),
            GameColumn::Pgn.name(),
            self.table,
            GameColumn::GameId.name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut total_plies = 0u64;
        let mut replayed = 0u64;
        for row in rows {
            let (game_id, white_elo, black_elo, movetext) = row?;
            summary.winners.add(winner_from_movetext(&movetext));

            let replay = match replay_mainline(&movetext) {
                Ok(replay) => {
                    total_plies += replay.plies as u64;
                    replayed += 1;
                    Some(replay)
                }
                Err(e) => {
                    debug!("game {} does not replay: {}", game_id, e);
                    summary.unreplayable += 1;
                    None
                }
            };

            if summary.head.len() < SUMMARY_HEAD_ROWS {
                let (result, final_fen) = match replay {
                    Some(replay) => (replay.outcome, Some(replay.fen)),
                    None => (None, None),
                };
                summary.head.push(GamePreview {
                    game_id,
                    white_elo,
                    black_elo,
                    moves: normalize_movetext(&movetext),
                    result,
                    final_fen,
                });
            }
        }
        if replayed > 0 {
            summary.mean_plies = Some(total_plies as f64 / replayed as f64);
        }

        Ok(summary)
    }
}

impl GameSink for DuckDbStore {
    fn initialize(&mut self) -> Result<(), StoreError> {
        let sql = format!(
            "DROP TABLE IF EXISTS \"{table}\";\n\
             DROP SEQUENCE IF EXISTS \"{seq}\";\n\
             CREATE SEQUENCE \"{seq}\" START 1;\n\
             {create};",
            table = self.table,
            seq = self.sequence_name(),
            create = self.create_table_sql()
        );
        self.conn.execute_batch(&sql)?;
        info!("recreated table '{}'", self.table);
        Ok(())
    }

    fn append(&mut self, record: &GameRecord) -> Result<(), StoreError> {
        let sql = self.insert_sql();
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params![
            record.time_control,
            record.event,
            record.white_elo,
            record.black_elo,
            record.opening,
            record.movetext,
        ])?;
        Ok(())
    }
}
