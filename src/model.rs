use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FixtureId(pub u64);

impl fmt::Display for FixtureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn from_goals(home_goals: u16, away_goals: u16) -> Self {
        if home_goals > away_goals {
            Outcome::Home
        } else if home_goals < away_goals {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    /// Single-letter code used by the store and the training export.
    pub fn code(self) -> char {
        match self {
            Outcome::Home => 'H',
            Outcome::Draw => 'D',
            Outcome::Away => 'A',
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "H" | "h" => Some(Outcome::Home),
            "D" | "d" => Some(Outcome::Draw),
            "A" | "a" => Some(Outcome::Away),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "Home Win",
            Outcome::Draw => "Draw",
            Outcome::Away => "Away Win",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Home,
    Away,
}

impl Role {
    pub fn winning_outcome(self) -> Outcome {
        match self {
            Role::Home => Outcome::Home,
            Role::Away => Outcome::Away,
        }
    }

    pub fn opposite(self) -> Role {
        match self {
            Role::Home => Role::Away,
            Role::Away => Role::Home,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueFilter {
    Any,
    HomeOnly,
    AwayOnly,
}

impl VenueFilter {
    pub fn admits(self, role: Role) -> bool {
        match self {
            VenueFilter::Any => true,
            VenueFilter::HomeOnly => role == Role::Home,
            VenueFilter::AwayOnly => role == Role::Away,
        }
    }
}

/// Per-side match statistics after the ingestion null policy has run.
///
/// Counts are plain integers (absent values became 0). Possession stays
/// optional: a missing sample is never replaced by a made-up value here.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatLine {
    pub shots: u32,
    pub shots_on_target: u32,
    pub corners: u32,
    pub possession: Option<f64>,
    /// False when no statistics row existed for the match.
    pub enriched: bool,
}

/// A completed, validated match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: FixtureId,
    pub kickoff: DateTime<Utc>,
    pub season: Option<u16>,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_goals: u16,
    pub away_goals: u16,
    pub home_stats: StatLine,
    pub away_stats: StatLine,
}

impl Match {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_goals(self.home_goals, self.away_goals)
    }

    pub fn role_of(&self, team: TeamId) -> Option<Role> {
        if team == self.home_team {
            Some(Role::Home)
        } else if team == self.away_team {
            Some(Role::Away)
        } else {
            None
        }
    }

    pub fn goals(&self, role: Role) -> u16 {
        match role {
            Role::Home => self.home_goals,
            Role::Away => self.away_goals,
        }
    }

    pub fn stats(&self, role: Role) -> &StatLine {
        match role {
            Role::Home => &self.home_stats,
            Role::Away => &self.away_stats,
        }
    }
}

/// A scheduled fixture, used on the live prediction path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub kickoff: DateTime<Utc>,
    pub season: Option<u16>,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_name: String,
    pub away_name: String,
    pub venue: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    pub fn max(&self) -> f64 {
        self.home.max(self.draw).max(self.away)
    }

    /// Most likely outcome; exact ties resolve Home, then Draw, then Away.
    pub fn argmax(&self) -> Outcome {
        if self.home >= self.draw && self.home >= self.away {
            Outcome::Home
        } else if self.draw >= self.away {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }

    pub fn one_hot(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Home => Prob3 {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Outcome::Draw => Prob3 {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Outcome::Away => Prob3 {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        }
    }
}

pub const HIGH_CONFIDENCE_MIN: f64 = 0.60;
pub const MEDIUM_CONFIDENCE_MIN: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_max_prob(max_prob: f64) -> Self {
        if max_prob >= HIGH_CONFIDENCE_MIN {
            Confidence::High
        } else if max_prob >= MEDIUM_CONFIDENCE_MIN {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        // Older rows carry the long form ("High Confidence").
        match lower.split_whitespace().next() {
            Some("high") => Some(Confidence::High),
            Some("medium") => Some(Confidence::Medium),
            Some("low") => Some(Confidence::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Confidence, Outcome, Prob3};

    #[test]
    fn argmax_breaks_ties_home_then_draw() {
        let all_equal = Prob3::uniform();
        assert_eq!(all_equal.argmax(), Outcome::Home);

        let draw_away_tie = Prob3 {
            home: 0.2,
            draw: 0.4,
            away: 0.4,
        };
        assert_eq!(draw_away_tie.argmax(), Outcome::Draw);

        let home_away_tie = Prob3 {
            home: 0.4,
            draw: 0.2,
            away: 0.4,
        };
        assert_eq!(home_away_tie.argmax(), Outcome::Home);
    }

    #[test]
    fn confidence_buckets_use_inclusive_thresholds() {
        assert_eq!(Confidence::from_max_prob(0.60), Confidence::High);
        assert_eq!(Confidence::from_max_prob(0.5999), Confidence::Medium);
        assert_eq!(Confidence::from_max_prob(0.50), Confidence::Medium);
        assert_eq!(Confidence::from_max_prob(0.49), Confidence::Low);
    }

    #[test]
    fn confidence_parses_long_labels() {
        assert_eq!(Confidence::parse("High Confidence"), Some(Confidence::High));
        assert_eq!(Confidence::parse("medium"), Some(Confidence::Medium));
        assert_eq!(Confidence::parse("?"), None);
    }

    #[test]
    fn outcome_follows_score() {
        assert_eq!(Outcome::from_goals(2, 1), Outcome::Home);
        assert_eq!(Outcome::from_goals(1, 1), Outcome::Draw);
        assert_eq!(Outcome::from_goals(0, 3), Outcome::Away);
        assert_eq!(Outcome::from_code("A"), Some(Outcome::Away));
    }
}
