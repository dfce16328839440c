use std::collections::HashMap;

use crate::{AccessPredictor, Key};

/// The reference predictor for interactive navigation over a frame range.
///
/// Combines four additive signals:
///
/// - a distance-decay prior around the current key (forward-weighted),
/// - a boost on the exact targets of the configured navigation jumps,
/// - a smaller boost on the window around each jump target, and
/// - an extra forward boost when the recent history shows a forward streak.
///
/// The output domain is the predictor's own: scores are clipped to
/// non-negative keys and, when a dataset `length` is configured, to
/// `[0, length)`. The cache treats that domain as authoritative.
#[derive(Debug, Clone)]
pub struct DynamicPredictor {
    possible_jumps: Vec<i64>,
    max_span: i64,
    forward_bias: f64,
    backward_bias: f64,
    jump_boost: f64,
    proximity_boost: f64,
    proximity_range: i64,
    history_boost: f64,
    length: Option<i64>,
}

impl DynamicPredictor {
    /// Creates a predictor for the given navigation steps (e.g. the jump
    /// sizes of a player's seek buttons) with default tuning.
    pub fn new(possible_jumps: impl Into<Vec<i64>>) -> Self {
        Self {
            possible_jumps: possible_jumps.into(),
            max_span: 30,
            forward_bias: 1.0,
            backward_bias: 0.25,
            jump_boost: 5.0,
            proximity_boost: 2.0,
            proximity_range: 2,
            history_boost: 2.0,
            length: None,
        }
    }

    /// Bound predictions to `[0, length)`; out-of-range candidates are
    /// clamped onto the boundary.
    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length.max(1));
        self
    }

    /// How far the distance-decay prior reaches in each direction.
    pub fn with_max_span(mut self, max_span: i64) -> Self {
        self.max_span = max_span.max(1);
        self
    }

    /// Weight of forward candidates in the distance-decay prior.
    pub fn with_forward_bias(mut self, forward_bias: f64) -> Self {
        self.forward_bias = forward_bias;
        self
    }

    /// Weight of backward candidates in the distance-decay prior.
    pub fn with_backward_bias(mut self, backward_bias: f64) -> Self {
        self.backward_bias = backward_bias;
        self
    }

    /// Additive score on the exact target of each configured jump.
    pub fn with_jump_boost(mut self, jump_boost: f64) -> Self {
        self.jump_boost = jump_boost;
        self
    }

    /// Additive score on the window of `range` keys around each jump
    /// target, decaying with the offset from the target.
    pub fn with_proximity(mut self, boost: f64, range: i64) -> Self {
        self.proximity_boost = boost;
        self.proximity_range = range.max(0);
        self
    }

    /// Additive forward score applied when the history shows a forward
    /// streak.
    pub fn with_history_boost(mut self, history_boost: f64) -> Self {
        self.history_boost = history_boost;
        self
    }

    /// Clamp a candidate into the predictor's output domain.
    fn clip(&self, key: Key) -> Key {
        let key = key.max(0);
        match self.length {
            Some(length) => key.min(length - 1),
            None => key,
        }
    }

    /// A forward streak is at least three strictly increasing accesses at
    /// the tail of the history.
    fn has_forward_streak(history: &[Key]) -> bool {
        history
            .windows(2)
            .rev()
            .take_while(|pair| pair[1] > pair[0])
            .count()
            >= 2
    }
}

impl AccessPredictor for DynamicPredictor {
    fn likelihoods(&self, current: Key, history: &[Key]) -> HashMap<Key, f64> {
        let mut scores: HashMap<Key, f64> = HashMap::new();
        let mut add = |key: Key, score: f64| {
            if score > 0.0 {
                *scores.entry(self.clip(key)).or_insert(0.0) += score;
            }
        };

        // Distance-decay prior, forward-weighted.
        let forward_boost = if Self::has_forward_streak(history) {
            self.history_boost
        } else {
            0.0
        };
        for distance in 1..=self.max_span {
            let decay = distance as f64;
            add(current + distance, (self.forward_bias + forward_boost) / decay);
            add(current - distance, self.backward_bias / decay);
        }

        // Jump targets and their neighborhoods.
        for &jump in &self.possible_jumps {
            let target = current + jump;
            add(target, self.jump_boost);
            for offset in 1..=self.proximity_range {
                let falloff = (offset + 1) as f64;
                add(target - offset, self.proximity_boost / falloff);
                add(target + offset, self.proximity_boost / falloff);
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_contract_compliance() {
        let predictor = DynamicPredictor::new([5, 10, -5]);
        let result = predictor.likelihoods(10, &[]);
        assert!(!result.is_empty());
        assert!(result.values().all(|&v| v > 0.0));
    }

    #[test]
    fn test_handles_empty_and_short_history() {
        let predictor = DynamicPredictor::new([5, 10]);
        assert!(!predictor.likelihoods(5, &[]).is_empty());
        assert!(!predictor.likelihoods(5, &[3]).is_empty());
    }

    #[test]
    fn test_jump_targets_get_boost() {
        let predictor = DynamicPredictor::new([5, 10])
            .with_jump_boost(10.0)
            .with_forward_bias(1.0);
        let result = predictor.likelihoods(0, &[]);

        let jump_target_5 = result.get(&5).copied().unwrap_or(0.0);
        let jump_target_10 = result.get(&10).copied().unwrap_or(0.0);
        let regular_forward = result.get(&1).copied().unwrap_or(0.0);

        assert!(jump_target_5 > regular_forward);
        assert!(jump_target_10 > regular_forward);
    }

    #[test]
    fn test_proximity_boost_around_jump_targets() {
        let predictor = DynamicPredictor::new([10]).with_proximity(2.0, 2);
        let result = predictor.likelihoods(0, &[]);

        assert!(result.get(&8).copied().unwrap_or(0.0) > 0.0);
        assert!(result.get(&12).copied().unwrap_or(0.0) > 0.0);
        // The neighborhood scores above the bare prior at the same distance.
        let plain = DynamicPredictor::new([]).likelihoods(0, &[]);
        assert!(result[&8] > plain[&8]);
    }

    #[test]
    fn test_history_boost_with_forward_streak() {
        let predictor = DynamicPredictor::new([])
            .with_history_boost(2.0)
            .with_forward_bias(1.0);

        let with_streak = predictor.likelihoods(8, &[5, 6, 7, 8]);
        let without_streak = predictor.likelihoods(8, &[5, 3, 7, 6]);

        assert!(with_streak[&9] > without_streak[&9]);
    }

    #[test]
    fn test_length_clipping_bounds_predictions() {
        let predictor = DynamicPredictor::new([50])
            .with_length(20)
            .with_max_span(30);
        let result = predictor.likelihoods(10, &[]);

        assert!(result.keys().all(|&k| k < 20));
        assert!(result.keys().all(|&k| k >= 0));
        assert!(!result.is_empty());
    }

    #[test]
    fn test_negative_current_clips_to_zero() {
        let predictor = DynamicPredictor::new([5, 10]);
        let result = predictor.likelihoods(-5, &[]);

        assert!(!result.is_empty());
        assert!(result.keys().all(|&k| k >= 0));
    }

    #[test]
    fn test_boundary_current_zero() {
        let predictor = DynamicPredictor::new([5, 10]);
        let result = predictor.likelihoods(0, &[]);

        assert!(result.keys().any(|&k| k > 0));
        assert!(result.keys().all(|&k| k >= 0));
    }

    #[test]
    fn test_boundary_near_length() {
        let predictor = DynamicPredictor::new([5])
            .with_length(10)
            .with_max_span(20);
        let result = predictor.likelihoods(8, &[]);

        assert!(result.keys().all(|&k| k < 10));
        assert!(!result.is_empty());
    }

    #[test]
    fn test_empty_possible_jumps_keeps_prior() {
        let predictor = DynamicPredictor::new([]);
        let result = predictor.likelihoods(5, &[]);

        assert!(!result.is_empty());
        assert!(result.keys().any(|&k| k > 5));
    }

    #[test]
    fn test_edge_case_parameters() {
        let result = DynamicPredictor::new([1])
            .with_max_span(1)
            .likelihoods(5, &[]);
        assert!(!result.is_empty());

        let result = DynamicPredictor::new([5])
            .with_proximity(2.0, 0)
            .likelihoods(0, &[]);
        assert!(!result.is_empty());
    }
}
