//! Quantum configuration: clamp, round and convert to timer ticks.

use std::fmt;
use std::time::Duration;

pub const MIN_QUANTUM_MS: u64 = 100;
pub const MAX_QUANTUM_MS: u64 = 1000;
/// Period of the scheduler timer
pub const TICK_MS: u64 = 20;

/// Which bound a requested quantum was pulled back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamp {
    Raised { requested: u64, minimum: u64 },
    Lowered { requested: u64, maximum: u64 },
}

impl fmt::Display for Clamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Clamp::Raised { requested, minimum } => write!(
                f,
                "quantum {}ms is less than the minimum ({}ms), using the minimum",
                requested, minimum
            ),
            Clamp::Lowered { requested, maximum } => write!(
                f,
                "quantum {}ms is greater than the maximum ({}ms), using the maximum",
                requested, maximum
            ),
        }
    }
}

/// Effective quantum, always a multiple of 100ms inside [MIN, MAX]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantum {
    millis: u64,
}

impl Quantum {
    pub fn from_millis(requested: u64) -> (Self, Option<Clamp>) {
        let (clamped, clamp) = if requested < MIN_QUANTUM_MS {
            (MIN_QUANTUM_MS, Some(Clamp::Raised { requested, minimum: MIN_QUANTUM_MS }))
        } else if requested > MAX_QUANTUM_MS {
            (MAX_QUANTUM_MS, Some(Clamp::Lowered { requested, maximum: MAX_QUANTUM_MS }))
        } else {
            (requested, None)
        };
        let millis = (clamped + 50) / 100 * 100;
        (Self { millis }, clamp)
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn ticks(&self) -> u32 {
        (self.millis / TICK_MS) as u32
    }

    pub fn tick_period() -> Duration {
        Duration::from_millis(TICK_MS)
    }
}

impl fmt::Display for Quantum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ms ({} ticks of {}ms)", self.millis, self.ticks(), TICK_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_in_range_quantum_rounds_to_nearest_hundred() {
        let (q, clamp) = Quantum::from_millis(249);
        assert_eq!(clamp, None);
        assert_eq!(q.millis(), 200);
        assert_eq!(q.ticks(), 10);
        assert_eq!(Quantum::from_millis(250).0.millis(), 300);
    }

    #[test]
    fn test_short_quantum_is_raised_with_warning() {
        let (q, clamp) = Quantum::from_millis(50);
        assert_eq!(q.millis(), 100);
        assert_eq!(q.ticks(), 5);
        assert_eq!(clamp, Some(Clamp::Raised { requested: 50, minimum: 100 }));
        assert!(clamp.unwrap().to_string().contains("minimum"));
    }

    #[test]
    fn test_long_quantum_is_lowered() {
        let (q, clamp) = Quantum::from_millis(5_000);
        assert_eq!(q.millis(), 1000);
        assert_eq!(q.ticks(), 50);
        assert!(matches!(clamp, Some(Clamp::Lowered { .. })));
    }

    proptest! {
        #[test]
        fn prop_ticks_follow_clamp_round_divide(requested in 0u64..10_000) {
            let (q, _) = Quantum::from_millis(requested);
            let clamped = requested.clamp(MIN_QUANTUM_MS, MAX_QUANTUM_MS);
            let rounded = ((clamped as f64 / 100.0).round() as u64) * 100;
            prop_assert_eq!(q.millis(), rounded);
            prop_assert_eq!(q.ticks() as u64, rounded / TICK_MS);
        }
    }
}
