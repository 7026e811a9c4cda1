use serde::Serialize;

/// A rating tag as it appeared in the block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RatingField {
    #[default]
    Absent,
    /// The tag was present but its value is not a rating (`"?"`, a username).
    Invalid(String),
    Valid(u32),
}

impl RatingField {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Self::Absent;
        }
        match s.parse::<u32>() {
            Ok(v) => Self::Valid(v),
            Err(_) => Self::Invalid(s.to_string()),
        }
    }

    pub fn value(&self) -> Option<u32> {
        match self {
            Self::Valid(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Game block being accumulated by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingGame {
    pub time_control: Option<String>,
    pub event: Option<String>,
    pub white_elo: RatingField,
    pub black_elo: RatingField,
    pub opening: Option<String>,
    /// Only consulted by the filter; never stored.
    pub termination: Option<String>,
    pub movetext: Option<String>,
}

/// Outcome of applying one tag to a pending game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Applied,
    Duplicate,
    Unknown,
}

impl PendingGame {
    /// Known tags keep their first value within a block; unknown tags are ignored.
    pub fn set_known_tag(&mut self, key: &str, value: String) -> TagOutcome {
        let slot = match key {
            "TimeControl" => &mut self.time_control,
            "Event" => &mut self.event,
            "Opening" => &mut self.opening,
            "Termination" => &mut self.termination,
            "WhiteElo" | "BlackElo" => {
                let rating = if key == "WhiteElo" {
                    &mut self.white_elo
                } else {
                    &mut self.black_elo
                };
                if !rating.is_absent() {
                    return TagOutcome::Duplicate;
                }
                *rating = RatingField::parse(&value);
                return TagOutcome::Applied;
            }
            _ => return TagOutcome::Unknown,
        };

        if slot.is_some() {
            return TagOutcome::Duplicate;
        }
        if !value.is_empty() {
            *slot = Some(value);
        }
        TagOutcome::Applied
    }
}

/// A finalized game that passed the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameRecord {
    pub time_control: Option<String>,
    pub event: Option<String>,
    pub white_elo: u32,
    pub black_elo: u32,
    pub opening: Option<String>,
    pub movetext: String,
}
