//! Move-text helpers for rows already in the games table.

use pgn_reader::{Nag, Outcome, RawComment, Reader, SanPlus, Skip, Visitor};
use serde::Serialize;
use shakmaty::{Chess, EnPassantMode, Position, fen::Fen};
use smallvec::SmallVec;
use std::fmt::Write;
use std::io;
use std::ops::ControlFlow;
use thiserror::Error;

type MoveList = SmallVec<[SanPlus; 128]>;

macro_rules! pgn_visitor_skip_variations {
    () => {
        fn nag(&mut self, _: &mut Self::Movetext, _: Nag) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn partial_comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
            ControlFlow::Continue(Skip(true))
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Winner {
    White,
    Black,
    Draw,
    Unknown,
}

impl Winner {
    pub fn from_result(token: &str) -> Self {
        match token.trim() {
            "1-0" => Self::White,
            "0-1" => Self::Black,
            "1/2-1/2" | "½-½" => Self::Draw,
            _ => Self::Unknown,
        }
    }
}

/// Reads the result token that closes a move-text line.
pub fn winner_from_movetext(movetext: &str) -> Winner {
    movetext
        .split_whitespace()
        .next_back()
        .map(Winner::from_result)
        .unwrap_or(Winner::Unknown)
}

/// SAN moves of the main line, in order, and the result token if present.
#[derive(Debug, Clone, Default)]
pub struct Mainline {
    pub sans: MoveList,
    pub outcome: Option<String>,
}

impl Mainline {
    /// Comments, NAGs and variations are dropped. `Ok(None)` when there is no game.
    pub fn parse(movetext: &str) -> io::Result<Option<Self>> {
        Reader::new(io::Cursor::new(movetext.as_bytes())).read_game(&mut MainlineCollector)
    }

    /// `1. e4 e5 2. Nf3 ...` followed by the result.
    pub fn to_movetext(&self) -> String {
        let mut out = String::new();
        for (ply, san) in self.sans.iter().enumerate() {
            if !out.is_empty() {
                out.push(' ');
            }
            if ply.is_multiple_of(2) {
                let _ = write!(out, "{}. ", ply / 2 + 1);
            }
            let _ = write!(out, "{}", san);
        }
        if let Some(outcome) = &self.outcome {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(outcome);
        }
        out
    }
}

/// Canonical main line with comments, NAGs, variations and `N...` markers
/// removed. Unreadable input yields an empty string.
pub fn normalize_movetext(movetext: &str) -> String {
    if movetext.trim().is_empty() {
        return String::new();
    }
    match Mainline::parse(movetext) {
        Ok(Some(mainline)) => mainline.to_movetext(),
        Ok(None) | Err(_) => String::new(),
    }
}

/// Builds a fresh `Mainline` per game; holds no state of its own.
struct MainlineCollector;

impl Visitor for MainlineCollector {
    type Tags = ();
    type Movetext = Mainline;
    type Output = Mainline;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(Mainline::default())
    }

    fn san(
        &mut self,
        mainline: &mut Self::Movetext,
        san_plus: SanPlus,
    ) -> ControlFlow<Self::Output> {
        mainline.sans.push(san_plus);
        ControlFlow::Continue(())
    }

    pgn_visitor_skip_variations!();

    fn outcome(
        &mut self,
        mainline: &mut Self::Movetext,
        outcome: Outcome,
    ) -> ControlFlow<Self::Output> {
        mainline.outcome = Some(outcome.to_string());
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, mainline: Self::Movetext) -> Self::Output {
        mainline
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("move-text could not be read: {0}")]
    Unreadable(#[from] io::Error),

    #[error("move-text contains no game")]
    Empty,

    #[error("illegal move '{san}' at ply {ply}")]
    IllegalMove { ply: usize, san: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub plies: usize,
    pub fen: String,
    pub outcome: Option<String>,
}

/// Plays the main line from the standard start position.
pub fn replay_mainline(movetext: &str) -> Result<Replay, ReplayError> {
    let mainline = Mainline::parse(movetext)?.ok_or(ReplayError::Empty)?;

    let mut pos = Chess::default();
    for (idx, san_plus) in mainline.sans.iter().enumerate() {
        let m = san_plus
            .san
            .to_move(&pos)
            .map_err(|_| ReplayError::IllegalMove {
                ply: idx + 1,
                san: san_plus.to_string(),
            })?;
        pos.play_unchecked(m);
    }

    Ok(Replay {
        plies: mainline.sans.len(),
        fen: Fen::from_position(&pos, EnPassantMode::Legal).to_string(),
        outcome: mainline.outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LICHESS_MOVETEXT: &str = "1. e4 { [%eval 0.17] [%clk 0:03:00] } 1... c5 { [%clk 0:03:00] } \
        2. Nf3?! { [%clk 0:02:59] } 2... d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 a6 1-0";

    #[test]
    fn test_winner_from_result_token() {
        assert_eq!(winner_from_movetext("1. e4 e5 1-0"), Winner::White);
        assert_eq!(winner_from_movetext("1. e4 e5 0-1"), Winner::Black);
        assert_eq!(winner_from_movetext("1. e4 e5 1/2-1/2"), Winner::Draw);
        assert_eq!(winner_from_movetext("1. e4 e5 *"), Winner::Unknown);
        assert_eq!(winner_from_movetext(""), Winner::Unknown);
    }

    #[test]
    fn test_normalize_strips_annotations() {
        assert_eq!(
            normalize_movetext(LICHESS_MOVETEXT),
            "1. e4 c5 2. Nf3 d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 a6 1-0"
        );
    }

    #[test]
    fn test_normalize_skips_variations() {
        assert_eq!(
            normalize_movetext("1. e4 (1. d4 d5) 1... e5 $1 2. Nf3 1/2-1/2"),
            "1. e4 e5 2. Nf3 1/2-1/2"
        );
    }

    #[test]
    fn test_mainline_without_result() {
        let mainline = Mainline::parse("1. d4 Nf6 2. c4").unwrap().unwrap();
        assert_eq!(mainline.sans.len(), 3);
        assert_eq!(mainline.outcome, None);
        assert_eq!(mainline.to_movetext(), "1. d4 Nf6 2. c4");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_movetext("   "), "");
    }

    #[test]
    fn test_replay_reaches_final_position() {
        let replay = replay_mainline(LICHESS_MOVETEXT).unwrap();
        assert_eq!(replay.plies, 10);
        assert_eq!(replay.outcome.as_deref(), Some("1-0"));
        assert_eq!(
            replay.fen,
            "rnbqkb1r/1p2pppp/p2p1n2/8/3NP3/2N5/PPP2PPP/R1BQKB1R w KQkq - 0 6"
        );
    }

    #[test]
    fn test_replay_reports_illegal_ply() {
        match replay_mainline("1. e4 e5 2. Ke3 1-0") {
            Err(ReplayError::IllegalMove { ply, san }) => {
                assert_eq!(ply, 3);
                assert_eq!(san, "Ke3");
            }
            other => panic!("expected illegal move, got {other:?}"),
        }
    }
}
