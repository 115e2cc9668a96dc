//! Token accounting for reasoning backend calls

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token usage for one or more backend calls.
///
/// `total` is always `input + output`; the backend's own `total_tokens`
/// figure is not trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage::new(self.input + rhs.input, self.output + rhs.output)
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |acc, usage| acc + usage)
    }
}

impl<'a> Sum<&'a TokenUsage> for TokenUsage {
    fn sum<I: Iterator<Item = &'a TokenUsage>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_input_plus_output() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total, 150);

        let combined = usage + TokenUsage::new(5, 7);
        assert_eq!(combined, TokenUsage::new(125, 37));
        assert_eq!(combined.total, combined.input + combined.output);
    }

    #[test]
    fn test_sum_is_order_independent() {
        let turns = vec![
            TokenUsage::new(900, 40),
            TokenUsage::new(1200, 85),
            TokenUsage::new(1350, 12),
            TokenUsage::new(1500, 300),
        ];

        let forward: TokenUsage = turns.iter().sum();
        let backward: TokenUsage = turns.iter().rev().sum();
        let shuffled: TokenUsage = [turns[2], turns[0], turns[3], turns[1]].into_iter().sum();

        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
        assert_eq!(forward, TokenUsage::new(4950, 437));
    }

    #[test]
    fn test_add_assign_accumulates() {
        let mut acc = TokenUsage::default();
        acc += TokenUsage::new(10, 2);
        acc += TokenUsage::new(20, 3);
        assert_eq!(acc, TokenUsage::new(30, 5));
    }
}
