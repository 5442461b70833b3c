//! Per-axis backlash compensation.
//!
//! Gear slack means the first part of a reversal moves nothing. The filter
//! tracks net travel in an accumulator clamped to `±limit`; while a reversal
//! has not yet consumed `hysteresis` worth of travel, opposing pulses are
//! attenuated by `reduction` instead of being sent at full width.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BacklashDirection {
    Neutral,
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacklashParams {
    /// Travel needed to commit to a direction (ms)
    pub hysteresis: f64,
    /// Accumulator clamp (ms), zero falls back to `hysteresis`
    pub max_limit: f64,
    /// Gain applied to pulses presumed absorbed by slack
    pub reduction: f64,
    /// Ignore opposing pulses in the accumulator
    pub hard_lock: bool,
}

impl Default for BacklashParams {
    fn default() -> Self {
        Self {
            hysteresis: 0.0,
            max_limit: 0.0,
            reduction: 0.0,
            hard_lock: false,
        }
    }
}

impl BacklashParams {
    pub fn from_config(config: &shared::GuiderConfig) -> Self {
        Self {
            hysteresis: config.backlash_hyster as f64,
            max_limit: config.backlash_limit as f64,
            reduction: config.backlash_reduc,
            hard_lock: config.backlash_lock,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacklashCompensator {
    params: BacklashParams,
    accumulator: f64,
    direction: BacklashDirection,
}

impl BacklashCompensator {
    pub fn new(params: BacklashParams) -> Self {
        Self {
            params: BacklashParams {
                hysteresis: params.hysteresis.abs(),
                max_limit: params.max_limit.abs(),
                ..params
            },
            accumulator: 0.0,
            direction: BacklashDirection::Neutral,
        }
    }

    pub fn params(&self) -> &BacklashParams {
        &self.params
    }

    /// Replace the parameters, keeping the accumulated state.
    pub fn set_params(&mut self, params: BacklashParams) {
        let state = (self.accumulator, self.direction);
        *self = Self::new(params);
        (self.accumulator, self.direction) = state;
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn direction(&self) -> BacklashDirection {
        self.direction
    }

    /// Forget all accumulated travel.
    pub fn neutralize(&mut self) {
        self.accumulator = 0.0;
        self.direction = BacklashDirection::Neutral;
    }

    /// Convert a desired pulse (ms) into the pulse to send.
    pub fn filter(&mut self, x: f64) -> i64 {
        self.filter_raw(x).round() as i64
    }

    fn effective_limit(&self) -> f64 {
        if self.params.max_limit == 0.0 {
            self.params.hysteresis
        } else {
            self.params.max_limit
        }
    }

    fn accumulate(&mut self, x: f64) {
        let limit = self.effective_limit();
        self.accumulator = (self.accumulator + x).clamp(-limit, limit);
    }

    fn filter_raw(&mut self, x: f64) -> f64 {
        let h = self.params.hysteresis;
        if h == 0.0 && self.params.max_limit == 0.0 {
            self.neutralize();
            return x;
        }

        let x = x.round();
        match self.direction {
            BacklashDirection::Neutral => {
                self.accumulate(x);
                let commit_pos = if h != 0.0 {
                    self.accumulator >= h
                } else {
                    self.accumulator > 0.0
                };
                let commit_neg = if h != 0.0 {
                    self.accumulator <= -h
                } else {
                    self.accumulator < 0.0
                };
                if commit_pos {
                    self.direction = BacklashDirection::Positive;
                } else if commit_neg {
                    self.direction = BacklashDirection::Negative;
                }
                x
            }
            BacklashDirection::Positive => {
                if !self.params.hard_lock || x > 0.0 {
                    self.accumulate(x);
                }
                if x > 0.0 {
                    x
                } else if x < 0.0 && self.accumulator <= -h {
                    self.direction = BacklashDirection::Negative;
                    x
                } else {
                    x * self.params.reduction
                }
            }
            BacklashDirection::Negative => {
                if !self.params.hard_lock || x < 0.0 {
                    self.accumulate(x);
                }
                if x < 0.0 {
                    x
                } else if x > 0.0 && self.accumulator >= h {
                    self.direction = BacklashDirection::Positive;
                    x
                } else {
                    x * self.params.reduction
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(h: f64, l: f64, r: f64, lock: bool) -> BacklashCompensator {
        BacklashCompensator::new(BacklashParams {
            hysteresis: h,
            max_limit: l,
            reduction: r,
            hard_lock: lock,
        })
    }

    #[test]
    fn test_passthrough_when_disabled() {
        let mut f = filter_with(0.0, 0.0, 0.5, false);
        for x in [10.0, -250.0, 3.0, 0.0, 999.0, -1.0] {
            assert_eq!(f.filter(x), x as i64);
            assert_eq!(f.direction(), BacklashDirection::Neutral);
            assert_eq!(f.accumulator(), 0.0);
        }
    }

    #[test]
    fn test_output_is_rounded() {
        let mut f = filter_with(0.0, 0.0, 0.0, false);
        assert_eq!(f.filter(12.6), 13);
        assert_eq!(f.filter(-12.6), -13);
    }

    #[test]
    fn test_commits_after_hysteresis() {
        let mut f = filter_with(100.0, 0.0, 0.0, false);
        assert_eq!(f.filter(60.0), 60);
        assert_eq!(f.direction(), BacklashDirection::Neutral);
        assert_eq!(f.filter(60.0), 60);
        assert_eq!(f.direction(), BacklashDirection::Positive);
        // limit falls back to hysteresis
        assert_eq!(f.accumulator(), 100.0);
    }

    #[test]
    fn test_reversal_attenuated_until_slack_consumed() {
        let mut f = filter_with(100.0, 0.0, 0.25, false);
        f.filter(150.0);
        assert_eq!(f.direction(), BacklashDirection::Positive);

        // 100 -> 20, still above -100
        assert_eq!(f.filter(-80.0), -20);
        assert_eq!(f.direction(), BacklashDirection::Positive);
        // 20 -> -60
        assert_eq!(f.filter(-80.0), -20);
        // -60 -> -100 (clamped), reversal complete
        assert_eq!(f.filter(-80.0), -80);
        assert_eq!(f.direction(), BacklashDirection::Negative);
        assert_eq!(f.accumulator(), -100.0);
    }

    #[test]
    fn test_hard_lock_ignores_opposing_travel() {
        let mut f = filter_with(100.0, 0.0, 0.5, true);
        f.filter(200.0);
        for _ in 0..5 {
            assert_eq!(f.filter(-80.0), -40);
        }
        assert_eq!(f.accumulator(), 100.0);
        assert_eq!(f.direction(), BacklashDirection::Positive);
    }

    #[test]
    fn test_accumulator_respects_limit() {
        let mut f = filter_with(50.0, 120.0, 0.0, false);
        for x in [300.0, -40.0, 500.0, -1000.0, 70.0, -10.0] {
            f.filter(x);
            assert!(f.accumulator().abs() <= 120.0);
        }
    }

    #[test]
    fn test_zero_hysteresis_with_limit() {
        let mut f = filter_with(0.0, 100.0, 0.0, false);
        assert_eq!(f.filter(30.0), 30);
        assert_eq!(f.direction(), BacklashDirection::Positive);
        // 30 -> -10 crosses zero, so the reversal passes straight through
        assert_eq!(f.filter(-40.0), -40);
        assert_eq!(f.direction(), BacklashDirection::Negative);
    }

    #[test]
    fn test_neutralize_matches_fresh_filter() {
        let params = BacklashParams {
            hysteresis: 80.0,
            max_limit: 150.0,
            reduction: 0.3,
            hard_lock: false,
        };
        for x in [-200.0, -30.0, 0.0, 45.0, 500.0] {
            let mut used = BacklashCompensator::new(params);
            for y in [120.0, 90.0, -30.0, -70.0] {
                used.filter(y);
            }
            used.neutralize();
            let mut fresh = BacklashCompensator::new(params);
            assert_eq!(used.filter(x), fresh.filter(x));
            assert_eq!(used, fresh);
        }
    }
}
