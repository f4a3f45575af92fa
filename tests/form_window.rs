mod common;

use common::{day, game, random_league, stats};
use formcast::form::{FormSource, Lookback, MatchIndex, compute_form};
use formcast::ingest::StatsPolicy;
use formcast::model::{TeamId, VenueFilter};

fn five() -> Lookback {
    Lookback::new(5).expect("positive")
}

#[test]
fn five_straight_two_nil_wins() {
    let matches: Vec<_> = (0..5)
        .map(|i| {
            if i % 2 == 0 {
                game(i + 1, i as i64 * 7, 1, 2 + i as u32, 2, 0)
            } else {
                game(i + 1, i as i64 * 7, 2 + i as u32, 1, 0, 2)
            }
        })
        .collect();

    let snap = compute_form(
        &matches,
        TeamId(1),
        day(60),
        five(),
        VenueFilter::Any,
        &StatsPolicy::default(),
    )
    .expect("exactly five prior matches");
    assert_eq!(snap.win_fraction, 1.0);
    assert_eq!(snap.avg_goals_for, 2.0);
    assert_eq!(snap.avg_goals_against, 0.0);
    assert_eq!(snap.points, 15);
    assert_eq!(snap.goal_difference, 10);
}

#[test]
fn three_prior_matches_are_not_enough_for_five() {
    let matches = vec![
        game(1, 0, 1, 2, 1, 0),
        game(2, 7, 3, 1, 1, 1),
        game(3, 14, 1, 4, 0, 2),
        // after the cutoff: must not fill the window
        game(4, 30, 1, 5, 3, 0),
        game(5, 37, 6, 1, 0, 0),
    ];
    let policy = StatsPolicy::default();
    assert!(
        compute_form(&matches, TeamId(1), day(20), five(), VenueFilter::Any, &policy).is_none()
    );
    assert!(
        MatchIndex::new(&matches)
            .form(TeamId(1), day(20), five(), VenueFilter::Any, &policy)
            .is_none()
    );
}

#[test]
fn zero_denominators_give_zero_not_nan() {
    let mut m = game(1, 0, 1, 2, 1, 0);
    m.home_stats = stats(0, 0, 0, None);
    m.away_stats = stats(0, 0, 0, None);
    let one = Lookback::new(1).expect("positive");

    let snap = compute_form(&[m], TeamId(1), day(1), one, VenueFilter::Any, &StatsPolicy::default())
        .expect("one game");
    assert_eq!(snap.shot_accuracy, 0.0);
    assert_eq!(snap.conversion_rate, 0.0);
    assert_eq!(snap.defensive_efficiency, 0.0);
    assert_eq!(snap.avg_corners_for, 0.0);
}

#[test]
fn matches_on_or_after_cutoff_never_change_the_snapshot() {
    let league = random_league(6, 42);
    let policy = StatsPolicy::default();
    let cutoff = day(18);
    let before: Vec<_> = league.iter().filter(|m| m.kickoff < cutoff).cloned().collect();

    for team in 1..=6 {
        for venue in [VenueFilter::Any, VenueFilter::HomeOnly, VenueFilter::AwayOnly] {
            let lookback = Lookback::new(2).expect("positive");
            let full = compute_form(&league, TeamId(team), cutoff, lookback, venue, &policy);
            let trimmed = compute_form(&before, TeamId(team), cutoff, lookback, venue, &policy);
            assert_eq!(full, trimmed, "team {team} {venue:?}");
        }
    }
}

#[test]
fn repeated_calls_are_bit_identical() {
    let league = random_league(8, 7);
    let policy = StatsPolicy::default();
    let index = MatchIndex::new(&league);
    for team in 1..=8 {
        let a = index.form(TeamId(team), day(50), five(), VenueFilter::Any, &policy);
        let b = index.form(TeamId(team), day(50), five(), VenueFilter::Any, &policy);
        assert_eq!(a, b);
        if let (Some(a), Some(b)) = (a, b) {
            assert_eq!(a.conversion_rate.to_bits(), b.conversion_rate.to_bits());
            assert_eq!(a.avg_possession.to_bits(), b.avg_possession.to_bits());
        }
    }
}

#[test]
fn snapshot_counts_stay_consistent() {
    let league = random_league(8, 99);
    let index = MatchIndex::new(&league);
    let policy = StatsPolicy::default();
    let lookback = Lookback::new(3).expect("positive");
    let mut seen = 0;

    for cutoff in (10..60).step_by(5) {
        for team in 1..=8 {
            for venue in [VenueFilter::Any, VenueFilter::HomeOnly, VenueFilter::AwayOnly] {
                let Some(snap) = index.form(TeamId(team), day(cutoff), lookback, venue, &policy)
                else {
                    continue;
                };
                seen += 1;
                assert!((0.0..=1.0).contains(&snap.win_fraction));
                assert_eq!(snap.wins + snap.draws + snap.losses, 3);
                assert_eq!(snap.points, 3 * snap.wins + snap.draws);
                assert_eq!(snap.games, 3);
                assert!((0.0..=100.0).contains(&snap.shot_accuracy));
                assert!(snap.conversion_rate.is_finite());
                assert!(snap.defensive_efficiency.is_finite());
                assert!((0.0..=100.0).contains(&snap.avg_possession));
            }
        }
    }
    assert!(seen > 0);
}
