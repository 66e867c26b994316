//! The population ("soup") of 64-byte programs and the epoch driver that
//! runs one full generation of pairwise VM execution over it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::detector::{self, ReplicationKind};
use crate::scheduler::{random_disjoint_pairs, SchedulerError};
use crate::vm::{self, HaltCause, PROGRAM_LEN};

/// Errors constructing or driving a `Soup`.
#[derive(Debug, Error)]
pub enum SoupError {
    /// A program in the initial population was not exactly 64 bytes.
    #[error("program {index} has length {len}, expected {PROGRAM_LEN}")]
    BadProgramLen {
        /// Index of the offending program.
        index: usize,
        /// Its actual length.
        len: usize,
    },
    /// The pairing scheduler rejected the population size.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// The VM rejected a constructed tape (should be unreachable given a
    /// well-formed population, but surfaced rather than panicking).
    #[error(transparent)]
    Vm(#[from] vm::VmError),
    /// A population snapshot was not valid hex, or decoded to a length that
    /// is not a multiple of `PROGRAM_LEN`.
    #[error("invalid hex population snapshot: {0}")]
    InvalidHexSnapshot(String),
}

/// Encode a population as one contiguous lowercase hex string, each program
/// back-to-back in index order.
pub fn encode_population_hex(population: &[Vec<u8>]) -> String {
    let mut bytes = Vec::with_capacity(population.len() * PROGRAM_LEN);
    for program in population {
        bytes.extend_from_slice(program);
    }
    hex::encode(bytes)
}

/// Decode a population previously produced by [`encode_population_hex`].
/// Rejects non-hex input and input whose decoded length is not a multiple
/// of `PROGRAM_LEN`.
pub fn decode_population_hex(hex_str: &str) -> Result<Vec<Vec<u8>>, SoupError> {
    let bytes = hex::decode(hex_str).map_err(|e| SoupError::InvalidHexSnapshot(e.to_string()))?;
    if bytes.len() % PROGRAM_LEN != 0 {
        return Err(SoupError::InvalidHexSnapshot(format!(
            "decoded length {} is not a multiple of {PROGRAM_LEN}",
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(PROGRAM_LEN).map(|chunk| chunk.to_vec()).collect())
}

/// One pairing's outcome within an epoch.
#[derive(Clone, Debug)]
pub struct PairOutcome {
    /// First population index in the pair.
    pub i: usize,
    /// Second population index in the pair.
    pub j: usize,
    /// Whether the tape was built as `pool[i] ∥ pool[j]` or the reverse.
    pub order_ab: bool,
    /// Steps fetched and halt cause from the VM run.
    pub halt: HaltCause,
    pub steps: u64,
    /// Replication classification against the original (non-concatenation)
    /// A/B identity mapping.
    pub replication: ReplicationKind,
}

/// Owns the population buffer and drives epochs over it.
pub struct Soup {
    population: Vec<Vec<u8>>,
    epoch_index: u64,
}

impl Soup {
    /// Construct a soup from an initial population of 64-byte programs.
    ///
    /// `n = population.len()` must be even and `>= 2` (enforced at the
    /// first `epoch` call, not here, since an odd-sized population that is
    /// never epoched is not itself invalid state).
    pub fn new(population: Vec<Vec<u8>>) -> Result<Self, SoupError> {
        for (index, program) in population.iter().enumerate() {
            if program.len() != PROGRAM_LEN {
                return Err(SoupError::BadProgramLen {
                    index,
                    len: program.len(),
                });
            }
        }
        Ok(Soup {
            population,
            epoch_index: 0,
        })
    }

    /// The current population, in index order.
    pub fn population(&self) -> &[Vec<u8>] {
        &self.population
    }

    /// How many epochs have run so far.
    pub fn epoch_index(&self) -> u64 {
        self.epoch_index
    }

    /// Run one substrate epoch: schedule disjoint pairs, execute each on
    /// the VM, split and (optionally) mutate the results, and write the
    /// next generation in place.
    ///
    /// Returns the per-pair outcomes if `record_outcomes` is set, otherwise
    /// an empty vector (outcomes are still computed correctly either way;
    /// recording only controls whether they are retained).
    pub fn epoch<R: Rng>(
        &mut self,
        step_limit: u64,
        mutation_p: f64,
        record_outcomes: bool,
        rng: &mut R,
    ) -> Result<Vec<PairOutcome>, SoupError> {
        let n = self.population.len();
        let pairs = random_disjoint_pairs(n, rng)?;

        let mut next_gen: Vec<Vec<u8>> = vec![vec![0u8; PROGRAM_LEN]; n];
        let mut outcomes = Vec::new();

        for (i, j) in pairs {
            let a = self.population[i].clone();
            let b = self.population[j].clone();

            let order_ab = rng.gen::<bool>();
            let tape = if order_ab {
                vm::concat(&a, &b)?
            } else {
                vm::concat(&b, &a)?
            };

            let result = vm::run(&tape, step_limit)?;
            let (seg0, seg1) = vm::split(&result.tape)?;

            // seg0/seg1 are in concatenation order; map back to the
            // original A/B identity (pair i holds A's result, pair j holds
            // B's, regardless of which was concatenated first).
            let (mut a_prime, mut b_prime) = if order_ab {
                (seg0, seg1)
            } else {
                (seg1, seg0)
            };

            if mutation_p > 0.0 {
                mutate_program(&mut a_prime, mutation_p, rng);
                mutate_program(&mut b_prime, mutation_p, rng);
            }

            if record_outcomes {
                let replication = detector::classify(&a, &b, &a_prime, &b_prime);
                outcomes.push(PairOutcome {
                    i,
                    j,
                    order_ab,
                    halt: result.halt,
                    steps: result.steps,
                    replication,
                });
            }

            next_gen[i] = a_prime;
            next_gen[j] = b_prime;
        }

        self.population = next_gen;
        self.epoch_index += 1;
        debug!(epoch = self.epoch_index, pairs = n / 2, "epoch complete");

        Ok(outcomes)
    }

    /// Mutate every program in the pool in place, independent of any
    /// epoch's pairwise execution.
    pub fn inject_mutation<R: Rng>(&mut self, p: f64, rng: &mut R) {
        for program in self.population.iter_mut() {
            mutate_program(program, p, rng);
        }
    }
}

/// Replace each byte with probability `p` with a uniform random byte.
/// Mutation is byte-space, not opcode-space: the replacement byte may be
/// any value in `[0, 256)`, not only a recognized opcode.
fn mutate_program<R: Rng>(program: &mut [u8], p: f64, rng: &mut R) {
    for byte in program.iter_mut() {
        if rng.gen::<f64>() < p {
            *byte = rng.gen();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_population(n: usize, rng: &mut StdRng) -> Vec<Vec<u8>> {
        (0..n)
            .map(|_| (0..PROGRAM_LEN).map(|_| rng.gen()).collect())
            .collect()
    }

    #[test]
    fn rejects_malformed_program() {
        let result = Soup::new(vec![vec![0u8; 10]]);
        assert!(matches!(result, Err(SoupError::BadProgramLen { index: 0, len: 10 })));
    }

    #[test]
    fn epoch_preserves_population_size() {
        let mut rng = StdRng::seed_from_u64(1);
        let pop = random_population(8, &mut rng);
        let mut soup = Soup::new(pop).unwrap();
        soup.epoch(256, 0.0, false, &mut rng).unwrap();
        assert_eq!(soup.population().len(), 8);
        assert_eq!(soup.epoch_index(), 1);
    }

    #[test]
    fn same_seed_yields_byte_identical_epochs() {
        let mut rng_seed = StdRng::seed_from_u64(12345);
        let pop = random_population(16, &mut rng_seed);

        let mut rng1 = StdRng::seed_from_u64(999);
        let mut soup1 = Soup::new(pop.clone()).unwrap();
        soup1.epoch(256, 0.0001, true, &mut rng1).unwrap();

        let mut rng2 = StdRng::seed_from_u64(999);
        let mut soup2 = Soup::new(pop).unwrap();
        soup2.epoch(256, 0.0001, true, &mut rng2).unwrap();

        assert_eq!(soup1.population(), soup2.population());
    }

    #[test]
    fn epoch_rejects_odd_population() {
        let mut rng = StdRng::seed_from_u64(1);
        let pop = random_population(3, &mut rng);
        let mut soup = Soup::new(pop).unwrap();
        assert!(matches!(
            soup.epoch(10, 0.0, false, &mut rng),
            Err(SoupError::Scheduler(SchedulerError::OddPopulation(3)))
        ));
    }

    #[test]
    fn inject_mutation_can_change_population_without_epoching() {
        let mut rng = StdRng::seed_from_u64(5);
        let pop = vec![vec![0u8; PROGRAM_LEN]; 4];
        let mut soup = Soup::new(pop).unwrap();
        soup.inject_mutation(1.0, &mut rng);
        assert_eq!(soup.epoch_index(), 0);
        assert!(soup.population().iter().any(|p| p.iter().any(|&b| b != 0)));
    }

    #[test]
    fn population_hex_round_trips() {
        let mut rng = StdRng::seed_from_u64(77);
        let pop = random_population(6, &mut rng);
        let encoded = encode_population_hex(&pop);
        let decoded = decode_population_hex(&encoded).unwrap();
        assert_eq!(decoded, pop);
    }

    #[test]
    fn decode_rejects_non_hex_input() {
        let err = decode_population_hex("not-hex-zz").unwrap_err();
        assert!(matches!(err, SoupError::InvalidHexSnapshot(_)));
    }

    #[test]
    fn decode_rejects_length_not_a_multiple_of_program_len() {
        let err = decode_population_hex("ab").unwrap_err();
        assert!(matches!(err, SoupError::InvalidHexSnapshot(_)));
    }
}
