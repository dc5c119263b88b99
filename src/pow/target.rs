use std::fmt;

use primitive_types::U256;

use crate::error::MinerError;

/// Largest value a keccak-256 digest can take.
pub const MAX_HASH: U256 = U256::MAX;

/// Contract difficulty. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Difficulty(U256);

impl Difficulty {
    pub fn new(value: U256) -> Result<Self, MinerError> {
        if value.is_zero() {
            return Err(MinerError::InvalidDifficulty("difficulty must be >= 1".into()));
        }
        Ok(Self(value))
    }

    /// Parse a decimal difficulty. Negative, zero and non-numeric input are
    /// all rejected.
    pub fn parse(text: &str) -> Result<Self, MinerError> {
        let text = text.trim();
        if text.starts_with('-') {
            return Err(MinerError::InvalidDifficulty(format!(
                "difficulty must be positive, got {text}"
            )));
        }
        let value = U256::from_dec_str(text)
            .map_err(|_| MinerError::InvalidDifficulty(format!("not a number: {text:?}")))?;
        Self::new(value)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn target(&self) -> U256 {
        MAX_HASH / self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self(U256::one())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Acceptance threshold for `difficulty`: a digest must be strictly below it.
pub fn compute_target(difficulty: U256) -> Result<U256, MinerError> {
    Difficulty::new(difficulty).map(|d| d.target())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_one_accepts_everything_but_max() {
        assert_eq!(compute_target(U256::one()).unwrap(), MAX_HASH);
    }

    #[test]
    fn zero_is_rejected() {
        assert!(matches!(
            compute_target(U256::zero()),
            Err(MinerError::InvalidDifficulty(_))
        ));
    }

    #[test]
    fn parse_rejects_zero_negative_and_garbage() {
        for bad in ["0", "-3", "-0", "abc", "", "1.5"] {
            assert!(
                matches!(Difficulty::parse(bad), Err(MinerError::InvalidDifficulty(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(
            Difficulty::parse(" 1000000 ").unwrap().value(),
            U256::from(1_000_000u64)
        );
    }

    #[test]
    fn target_is_non_increasing() {
        let samples = [1u64, 2, 3, 10, 999, 1_000, 1_000_000, u64::MAX];
        for pair in samples.windows(2) {
            let t1 = compute_target(U256::from(pair[0])).unwrap();
            let t2 = compute_target(U256::from(pair[1])).unwrap();
            assert!(t2 <= t1, "target({}) > target({})", pair[1], pair[0]);
        }
    }

    #[test]
    fn truncating_division() {
        let t = compute_target(U256::from(1_000_000u64)).unwrap();
        assert_eq!(t, U256::MAX / U256::from(1_000_000u64));
        assert!(t * U256::from(1_000_000u64) <= U256::MAX);
    }
}
