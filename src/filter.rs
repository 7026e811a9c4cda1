use crate::types::{GameRecord, PendingGame};

pub const DEFAULT_ELITE_ELO: u32 = 2500;
pub const DEFAULT_FLOOR_ELO: u32 = 2200;
pub const TIME_FORFEIT: &str = "Time forfeit";

/// Two rating thresholds; which one is the elite bar does not depend on argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingThresholds {
    high: u32,
    low: u32,
}

impl RatingThresholds {
    pub fn new(a: u32, b: u32) -> Self {
        Self {
            high: a.max(b),
            low: a.min(b),
        }
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    /// The stronger player must reach `high`, the weaker one `low`, in either color.
    pub fn admits(&self, white: u32, black: u32) -> bool {
        white.max(black) >= self.high && white.min(black) >= self.low
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub thresholds: RatingThresholds,
    pub excluded_terminations: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            thresholds: RatingThresholds::new(DEFAULT_ELITE_ELO, DEFAULT_FLOOR_ELO),
            excluded_terminations: vec![TIME_FORFEIT.to_string()],
        }
    }
}

impl FilterConfig {
    pub fn new(a: u32, b: u32) -> Self {
        Self {
            thresholds: RatingThresholds::new(a, b),
            ..Self::default()
        }
    }

    pub fn with_excluded_terminations<I, S>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_terminations = reasons.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_excluded_termination(&self, termination: &str) -> bool {
        let t = termination.trim();
        self.excluded_terminations
            .iter()
            .any(|reason| reason.trim().eq_ignore_ascii_case(t))
    }

    /// Missing or malformed ratings fail closed.
    pub fn accepts(&self, game: &PendingGame) -> bool {
        let (Some(white), Some(black)) = (game.white_elo.value(), game.black_elo.value()) else {
            return false;
        };
        if let Some(termination) = game.termination.as_deref()
            && self.is_excluded_termination(termination)
        {
            return false;
        }
        self.thresholds.admits(white, black)
    }

    /// Consumes a finalized game and returns the output record when it passes.
    pub fn admit(&self, game: PendingGame) -> Option<GameRecord> {
        if !self.accepts(&game) {
            return None;
        }
        let movetext = game.movetext?;
        Some(GameRecord {
            time_control: game.time_control,
            event: game.event,
            white_elo: game.white_elo.value()?,
            black_elo: game.black_elo.value()?,
            opening: game.opening,
            movetext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RatingField;

    fn game(white: RatingField, black: RatingField, termination: Option<&str>) -> PendingGame {
        PendingGame {
            white_elo: white,
            black_elo: black,
            termination: termination.map(str::to_string),
            movetext: Some("1. e4 e5 1-0".to_string()),
            ..PendingGame::default()
        }
    }

    #[test]
    fn test_thresholds_are_order_independent() {
        assert_eq!(RatingThresholds::new(2200, 2500), RatingThresholds::new(2500, 2200));
        let t = RatingThresholds::new(2300, 2500);
        assert_eq!(t.high(), 2500);
        assert_eq!(t.low(), 2300);
    }

    #[test]
    fn test_admits_is_symmetric_in_color() {
        let t = RatingThresholds::new(2500, 2300);
        assert!(t.admits(2500, 2300));
        assert!(t.admits(2300, 2500));
        assert!(t.admits(2499, 2600));
        assert!(t.admits(2600, 2499));
        assert!(!t.admits(2299, 2700));
        assert!(!t.admits(2700, 2299));
        assert!(!t.admits(2450, 2450));
    }

    #[test]
    fn test_accepts_qualifying_game() {
        let filter = FilterConfig::new(2500, 2200);
        let g = game(RatingField::Valid(2550), RatingField::Valid(2210), Some("Normal"));
        assert!(filter.accepts(&g));
    }

    #[test]
    fn test_time_forfeit_is_excluded_case_insensitively() {
        let filter = FilterConfig::new(2500, 2200);
        for reason in ["Time forfeit", "time forfeit", "  Time Forfeit "] {
            let g = game(RatingField::Valid(2550), RatingField::Valid(2210), Some(reason));
            assert!(!filter.accepts(&g), "{reason} should be excluded");
        }
    }

    #[test]
    fn test_custom_exclusions_replace_defaults() {
        let filter = FilterConfig::new(2500, 2200).with_excluded_terminations(["Abandoned"]);
        let forfeit = game(RatingField::Valid(2550), RatingField::Valid(2210), Some("Time forfeit"));
        let abandoned = game(RatingField::Valid(2550), RatingField::Valid(2210), Some("Abandoned"));
        assert!(filter.accepts(&forfeit));
        assert!(!filter.accepts(&abandoned));
    }

    #[test]
    fn test_missing_or_invalid_rating_fails_closed() {
        let filter = FilterConfig::new(2500, 2300);
        let invalid = game(
            RatingField::Invalid("DrNykterstein".into()),
            RatingField::Valid(2600),
            None,
        );
        let absent = game(RatingField::Valid(2600), RatingField::Absent, None);
        assert!(!filter.accepts(&invalid));
        assert!(!filter.accepts(&absent));
    }

    #[test]
    fn test_admit_drops_termination_from_record() {
        let filter = FilterConfig::new(2500, 2200);
        let mut g = game(RatingField::Valid(2550), RatingField::Valid(2210), Some("Normal"));
        g.opening = Some("Sicilian Defense".to_string());

        let record = filter.admit(g).expect("game should pass");
        assert_eq!(record.white_elo, 2550);
        assert_eq!(record.black_elo, 2210);
        assert_eq!(record.opening.as_deref(), Some("Sicilian Defense"));
        assert_eq!(record.movetext, "1. e4 e5 1-0");
    }

    #[test]
    fn test_admit_requires_movetext() {
        let filter = FilterConfig::new(2500, 2200);
        let mut g = game(RatingField::Valid(2550), RatingField::Valid(2210), None);
        g.movetext = None;
        assert!(filter.admit(g).is_none());
    }
}
