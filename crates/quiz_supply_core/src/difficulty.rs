//! crates/quiz_supply_core/src/difficulty.rs
//!
//! The adaptive difficulty state machine. Everything here is a pure function of a
//! score and a short window of recent answer outcomes.

use crate::domain::Tier;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

/// Tunables for the difficulty engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyConfig {
    /// Upper bound (inclusive) of the easy tier.
    pub easy_max: f64,
    /// Upper bound (inclusive) of the medium tier.
    pub medium_max: f64,
    pub up_step: f64,
    pub down_step: f64,
    /// Size of the answer window that must agree before the score moves.
    pub streak_threshold: usize,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            easy_max: 4.0,
            medium_max: 7.0,
            up_step: 2.0,
            down_step: 1.0,
            streak_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DifficultyEngine {
    config: DifficultyConfig,
}

impl DifficultyEngine {
    pub fn new(config: DifficultyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DifficultyConfig {
        &self.config
    }

    pub fn level_of(&self, score: f64) -> Tier {
        if score <= self.config.easy_max {
            Tier::Easy
        } else if score <= self.config.medium_max {
            Tier::Medium
        } else {
            Tier::Hard
        }
    }

    /// The midpoint of the tier's score range.
    pub fn initial_score(&self, tier: Tier) -> f64 {
        let (low, high) = match tier {
            Tier::Easy => (MIN_SCORE, self.config.easy_max),
            Tier::Medium => (self.config.easy_max, self.config.medium_max),
            Tier::Hard => (self.config.medium_max, MAX_SCORE),
        };
        (low + high) / 2.0
    }

    /// Moves the score according to the last `streak_threshold` outcomes.
    /// `recent` is ordered oldest first.
    pub fn adjust(&self, score: f64, recent: &[bool]) -> f64 {
        let threshold = self.config.streak_threshold.max(1);
        if recent.len() < threshold {
            return clamp(score);
        }
        let window = &recent[recent.len() - threshold..];
        let correct = window.iter().filter(|ok| **ok).count();
        let wrong = window.len() - correct;

        let delta = if wrong == 0 {
            self.config.up_step
        } else if correct == 0 {
            -self.config.down_step
        } else if correct > wrong {
            self.config.up_step / 2.0
        } else if wrong > correct {
            -self.config.down_step / 2.0
        } else {
            0.0
        };
        clamp(score + delta)
    }

    /// Early warning for an imminent tier flip, evaluated on a window one shorter
    /// than the adjustment window. Returns the tier the session is about to enter.
    pub fn will_cross_tier_soon(
        &self,
        score: f64,
        recent: &[bool],
        answered: u32,
        target: u32,
    ) -> Option<Tier> {
        if answered >= target {
            return None;
        }
        let window = self.config.streak_threshold.saturating_sub(1).max(1);
        if recent.len() < window {
            return None;
        }
        let tail = &recent[recent.len() - window..];
        let projected = if tail.iter().all(|ok| *ok) {
            clamp(score + self.config.up_step)
        } else if tail.iter().all(|ok| !*ok) {
            clamp(score - self.config.down_step)
        } else {
            return None;
        };

        let current = self.level_of(score);
        let predicted = self.level_of(projected);
        (predicted != current).then_some(predicted)
    }
}

fn clamp(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DifficultyEngine {
        DifficultyEngine::default()
    }

    #[test]
    fn level_of_partitions_the_range_into_three_contiguous_tiers() {
        let e = engine();
        let mut previous = Tier::Easy;
        let mut score = MIN_SCORE;
        while score <= MAX_SCORE {
            let tier = e.level_of(score);
            assert!(tier >= previous, "level_of must be monotonic at {score}");
            previous = tier;
            score += 0.05;
        }
        assert_eq!(e.level_of(1.0), Tier::Easy);
        assert_eq!(e.level_of(4.0), Tier::Easy);
        assert_eq!(e.level_of(4.01), Tier::Medium);
        assert_eq!(e.level_of(7.0), Tier::Medium);
        assert_eq!(e.level_of(7.01), Tier::Hard);
        assert_eq!(e.level_of(10.0), Tier::Hard);
    }

    #[test]
    fn initial_score_is_the_tier_midpoint() {
        let e = engine();
        assert_eq!(e.initial_score(Tier::Easy), 2.5);
        assert_eq!(e.initial_score(Tier::Medium), 5.5);
        assert_eq!(e.initial_score(Tier::Hard), 8.5);
    }

    #[test]
    fn adjust_ignores_short_history() {
        assert_eq!(engine().adjust(5.0, &[true]), 5.0);
        assert_eq!(engine().adjust(5.0, &[]), 5.0);
    }

    #[test]
    fn adjust_climbs_faster_than_it_falls() {
        let e = engine();
        assert_eq!(e.adjust(5.0, &[true, true]), 7.0);
        assert_eq!(e.adjust(5.0, &[false, false]), 4.0);
        // only the last window counts
        assert_eq!(e.adjust(5.0, &[false, false, true, true]), 7.0);
    }

    #[test]
    fn adjust_mixed_window_moves_half_step_towards_majority() {
        let e = DifficultyEngine::new(DifficultyConfig {
            streak_threshold: 3,
            ..DifficultyConfig::default()
        });
        assert_eq!(e.adjust(5.0, &[true, false, true]), 6.0);
        assert_eq!(e.adjust(5.0, &[false, true, false]), 4.5);
        // an even split has no majority
        assert_eq!(engine().adjust(5.0, &[true, false]), 5.0);
    }

    #[test]
    fn adjust_always_stays_in_bounds() {
        let e = engine();
        let windows: [&[bool]; 4] = [&[true, true], &[false, false], &[true, false], &[false, true]];
        let mut score = 0.0;
        while score <= 11.0 {
            for window in windows {
                let next = e.adjust(score, window);
                assert!((MIN_SCORE..=MAX_SCORE).contains(&next), "{score} -> {next}");
            }
            score += 0.25;
        }
        assert_eq!(e.adjust(9.5, &[true, true]), 10.0);
        assert_eq!(e.adjust(1.5, &[false, false]), 1.0);
    }

    #[test]
    fn two_correct_answers_from_the_easy_edge_enter_medium() {
        let e = engine();
        let next = e.adjust(4.0, &[true, true]);
        assert_eq!(next, 6.0);
        assert_eq!(e.level_of(4.0), Tier::Easy);
        assert_eq!(e.level_of(next), Tier::Medium);
    }

    #[test]
    fn will_cross_tier_soon_predicts_the_next_tier() {
        let e = engine();
        assert_eq!(e.will_cross_tier_soon(4.0, &[true], 3, 10), Some(Tier::Medium));
        assert_eq!(e.will_cross_tier_soon(4.5, &[false], 3, 10), Some(Tier::Easy));
        assert_eq!(e.will_cross_tier_soon(2.0, &[true], 3, 10), None);
        assert_eq!(e.will_cross_tier_soon(4.0, &[], 0, 10), None);
    }

    #[test]
    fn will_cross_tier_soon_is_silent_at_the_end_of_a_session() {
        assert_eq!(engine().will_cross_tier_soon(4.0, &[true], 10, 10), None);
    }
}
