//! Deterministic disjoint-pair scheduling over a population index set.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use rand::Rng;
use thiserror::Error;

/// Errors constructing a pairing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// `n` was odd; every index must pair with exactly one partner.
    #[error("population size must be even, got {0}")]
    OddPopulation(usize),
    /// `n` was less than 2.
    #[error("population size must be >= 2, got {0}")]
    TooSmall(usize),
}

/// Produce `n/2` disjoint pairs over `0..n` by shuffling a permutation and
/// grouping consecutive elements.
///
/// Every index in `[0, n)` appears in exactly one pair. The pairing is a
/// pure function of the RNG stream: identical RNG state (and `n`) produces
/// an identical pairing.
pub fn random_disjoint_pairs<R: Rng>(n: usize, rng: &mut R) -> Result<Vec<(usize, usize)>, SchedulerError> {
    if n < 2 {
        return Err(SchedulerError::TooSmall(n));
    }
    if n % 2 != 0 {
        return Err(SchedulerError::OddPopulation(n));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    shuffle(&mut indices, rng);

    Ok(indices.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect())
}

/// Fisher-Yates shuffle driven by the given RNG, in place.
fn shuffle<R: Rng>(slice: &mut [usize], rng: &mut R) {
    for i in (1..slice.len()).rev() {
        let j = rng.gen_range(0..=i);
        slice.swap(i, j);
    }
}
