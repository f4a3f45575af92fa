#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use formcast::model::{FixtureId, Match, StatLine, TeamId};

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 1, 15, 0, 0)
        .single()
        .expect("valid date")
        + Duration::days(n)
}

pub fn stats(shots: u32, on_target: u32, corners: u32, possession: Option<f64>) -> StatLine {
    StatLine {
        shots,
        shots_on_target: on_target,
        corners,
        possession,
        enriched: true,
    }
}

pub fn game(id: u64, d: i64, home: u32, away: u32, hg: u16, ag: u16) -> Match {
    Match {
        id: FixtureId(id),
        kickoff: day(d),
        season: Some(2024),
        home_team: TeamId(home),
        away_team: TeamId(away),
        home_goals: hg,
        away_goals: ag,
        home_stats: stats(12, 5, 6, Some(55.0)),
        away_stats: stats(9, 3, 4, Some(45.0)),
    }
}

/// Seeded league: every ordered pair of `teams` meets once, one match per day.
pub fn random_league(teams: u32, seed: u64) -> Vec<Match> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    let mut id = 1u64;
    for home in 1..=teams {
        for away in 1..=teams {
            if home == away {
                continue;
            }
            let home_shots = rng.gen_range(0..20);
            let away_shots = rng.gen_range(0..16);
            out.push(Match {
                id: FixtureId(id),
                kickoff: day(id as i64),
                season: Some(2024),
                home_team: TeamId(home),
                away_team: TeamId(away),
                home_goals: rng.gen_range(0..4),
                away_goals: rng.gen_range(0..3),
                home_stats: stats(
                    home_shots,
                    rng.gen_range(0..=home_shots),
                    rng.gen_range(0..10),
                    rng.gen_bool(0.8).then(|| rng.gen_range(35.0..65.0)),
                ),
                away_stats: stats(
                    away_shots,
                    rng.gen_range(0..=away_shots),
                    rng.gen_range(0..8),
                    None,
                ),
            });
            id += 1;
        }
    }
    out
}
