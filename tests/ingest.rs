use lichess_elite::error::ArchiveError;
use lichess_elite::filter::FilterConfig;
use lichess_elite::pipeline::Ingest;
use lichess_elite::reader::{ArchiveInput, ArchiveSource};
use lichess_elite::store::{DuckDbStore, GameSink};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::io::Cursor;

struct MonthlyArchives(HashMap<&'static str, Vec<u8>>);

impl ArchiveSource for MonthlyArchives {
    fn open(&self, location: &str) -> Result<ArchiveInput, ArchiveError> {
        self.0
            .get(location)
            .map(|bytes| Box::new(Cursor::new(bytes.clone())) as ArchiveInput)
            .ok_or_else(|| ArchiveError::Io {
                location: location.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
    }
}

const JANUARY: &str = r#"[Event "Rated Blitz game"]
[Site "https://lichess.org/aaaa"]
[White "alpha"]
[Black "beta"]
[Result "1-0"]
[WhiteElo "2650"]
[BlackElo "2480"]
[TimeControl "180+0"]
[Opening "Sicilian Defense: Najdorf Variation"]
[Termination "Normal"]

1. e4 c5 2. Nf3 d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 a6 1-0

[Event "Rated Bullet game"]
[WhiteElo "2700"]
[BlackElo "2600"]
[TimeControl "60+0"]
[Termination "Time forfeit"]

1. d4 d5 0-1

[Event "Rated Rapid game"]
[WhiteElo "?"]
[BlackElo "2800"]
[Termination "Normal"]

1. c4 e5 1/2-1/2

"#;

const FEBRUARY: &str = r#"[Event "Rated Blitz game"]
[WhiteElo "2210"]
[BlackElo "2555"]
[TimeControl "300+3"]
[Opening "Queen's Gambit Declined"]
[Termination "Normal"]

1. d4 d5 2. c4 e6 0-1

[Event "Rated Blitz game"]
[WhiteElo "2900"]
[BlackElo "2100"]
[Termination "Normal"]

1. e4 e5 1-0

"#;

fn archives() -> MonthlyArchives {
    let mut map = HashMap::new();
    map.insert(
        "lichess_db_standard_rated_2025-01.pgn.zst",
        zstd::encode_all(JANUARY.as_bytes(), 3).unwrap(),
    );
    map.insert(
        "lichess_db_standard_rated_2025-02.pgn.zst",
        zstd::encode_all(FEBRUARY.as_bytes(), 3).unwrap(),
    );
    MonthlyArchives(map)
}

fn locations() -> Vec<String> {
    vec![
        "lichess_db_standard_rated_2025-01.pgn.zst".to_string(),
        "lichess_db_standard_rated_2025-02.pgn.zst".to_string(),
    ]
}

#[test]
fn test_elite_games_land_in_duckdb() {
    let source = archives();
    let store = DuckDbStore::open_in_memory("games").unwrap();
    let mut ingest = Ingest::new(&source, store, FilterConfig::default());

    let report = ingest.run(&locations(), &mut ()).unwrap();
    let store = ingest.into_sink();

    assert_eq!(report.records(), 2);
    assert_eq!(report.archives[0].blocks, 3);
    assert_eq!(report.archives[1].blocks, 2);
    assert_eq!(store.row_count().unwrap(), 2);

    let mut stmt = store
        .connection()
        .prepare(
            "SELECT \"GameID\", \"TimeControl\", \"Event\", \"WhiteElo\", \"BlackElo\", \
             \"Opening\", \"PGN\" FROM games ORDER BY \"GameID\"",
        )
        .unwrap();
    let rows: Vec<(i64, Option<String>, Option<String>, u32, u32, Option<String>, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })
        .unwrap()
        .map(Result::unwrap)
        .collect();

    assert_eq!(
        rows,
        vec![
            (
                1,
                Some("180+0".to_string()),
                Some("Rated Blitz game".to_string()),
                2650,
                2480,
                Some("Sicilian Defense: Najdorf Variation".to_string()),
                "1. e4 c5 2. Nf3 d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 a6 1-0".to_string(),
            ),
            (
                2,
                Some("300+3".to_string()),
                Some("Rated Blitz game".to_string()),
                2210,
                2555,
                Some("Queen's Gambit Declined".to_string()),
                "1. d4 d5 2. c4 e6 0-1".to_string(),
            ),
        ]
    );
}

#[test]
fn test_summary_reads_back_the_table() {
    let source = archives();
    let store = DuckDbStore::open_in_memory("elite").unwrap();
    let mut ingest = Ingest::new(&source, store, FilterConfig::default());
    ingest.run(&locations(), &mut ()).unwrap();
    let store = ingest.into_sink();

    let summary = store.summary().unwrap();
    assert_eq!(summary.table, "elite");
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.columns, 7);
    assert_eq!(summary.winners.white, 1);
    assert_eq!(summary.winners.black, 1);
    assert_eq!(summary.unreplayable, 0);
    assert_eq!(summary.mean_plies, Some(7.0));

    let previews: Vec<_> = summary
        .head
        .iter()
        .map(|g| (g.game_id, g.moves.as_str(), g.result.as_deref()))
        .collect();
    assert_eq!(
        previews,
        vec![
            (1, "1. e4 c5 2. Nf3 d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 a6 1-0", Some("1-0")),
            (2, "1. d4 d5 2. c4 e6 0-1", Some("0-1")),
        ]
    );
}

#[test]
fn test_rerun_replaces_previous_contents() {
    let source = archives();
    let store = DuckDbStore::open_in_memory("games").unwrap();
    let mut ingest = Ingest::new(&source, store, FilterConfig::default());
    ingest.run(&locations(), &mut ()).unwrap();
    ingest.run(&locations()[1..], &mut ()).unwrap();

    let mut store = ingest.into_sink();
    assert_eq!(store.row_count().unwrap(), 1);

    store.initialize().unwrap();
    assert_eq!(store.row_count().unwrap(), 0);
}

#[test]
fn test_custom_thresholds_and_missing_archive() {
    let source = archives();
    let store = DuckDbStore::open_in_memory("games").unwrap();
    let filter = FilterConfig::new(2100, 2700).with_excluded_terminations(Vec::<String>::new());
    let mut ingest = Ingest::new(&source, store, filter);

    let mut with_missing = locations();
    with_missing.insert(1, "lichess_db_standard_rated_2025-03.pgn.zst".to_string());
    let report = ingest.run(&with_missing, &mut ()).unwrap();

    // 2700/2600 qualifies once forfeits are allowed; 2900/2100 reaches the lower floor.
    assert_eq!(report.records(), 2);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(ingest.into_sink().row_count().unwrap(), 2);
}
