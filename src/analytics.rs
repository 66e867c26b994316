//! Aggregate statistics over a substrate population: entropy, compression
//! ratio, opcode histogram, top-K programs, and Hamming distance.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::collections::HashMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

/// The 10 opcode bytes recognized by the VM, in ISA table order.
pub const OPCODES: [u8; 10] = [
    b'>', b'<', b'}', b'{', b'+', b'-', b'.', b',', b'[', b']',
];

/// Errors from analytics functions operating on mismatched inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    /// Hamming distance requires equal-length sequences.
    #[error("hamming distance requires equal-length sequences, got {0} and {1}")]
    LengthMismatch(usize, usize),
}

/// Shannon entropy in bits of the byte histogram of `data`. `0.0` for empty
/// input.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }
    let total = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// zlib-level-9 compressed length of `data` divided by `data.len()`.
/// Exactly `1.0` for empty input.
pub fn compression_ratio(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 1.0;
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .expect("in-memory zlib encode is infallible");
    let compressed = encoder.finish().expect("in-memory zlib finish is infallible");
    compressed.len() as f64 / data.len() as f64
}

/// Count occurrences of each of the 10 recognized opcode bytes across
/// `data`. Keys are always present (possibly zero), in `OPCODES` order.
pub fn opcode_histogram(data: &[u8]) -> Vec<(u8, u64)> {
    let mut counts: HashMap<u8, u64> = OPCODES.iter().map(|&op| (op, 0)).collect();
    for &byte in data {
        if let Some(count) = counts.get_mut(&byte) {
            *count += 1;
        }
    }
    OPCODES.iter().map(|&op| (op, counts[&op])).collect()
}

/// The `k` most frequent distinct programs in `population`, with counts,
/// ties broken by first-occurrence order.
pub fn top_k_programs(population: &[Vec<u8>], k: usize) -> Vec<(Vec<u8>, usize)> {
    let mut counts: HashMap<&[u8], usize> = HashMap::new();
    let mut first_seen: HashMap<&[u8], usize> = HashMap::new();
    for (index, program) in population.iter().enumerate() {
        *counts.entry(program.as_slice()).or_insert(0) += 1;
        first_seen.entry(program.as_slice()).or_insert(index);
    }

    let mut entries: Vec<(&[u8], usize, usize)> = counts
        .into_iter()
        .map(|(program, count)| (program, count, first_seen[program]))
        .collect();

    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    entries
        .into_iter()
        .take(k)
        .map(|(program, count, _)| (program.to_vec(), count))
        .collect()
}

/// Number of differing byte positions between two equal-length sequences.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Result<u32, AnalyticsError> {
    if a.len() != b.len() {
        return Err(AnalyticsError::LengthMismatch(a.len(), b.len()));
    }
    Ok(a.iter().zip(b).filter(|(x, y)| x != y).count() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_of_empty_is_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn entropy_of_uniform_single_byte_is_zero() {
        assert_eq!(shannon_entropy(&[7u8; 100]), 0.0);
    }

    #[test]
    fn entropy_of_two_equally_likely_bytes_is_one_bit() {
        let data = vec![0u8, 1u8, 0u8, 1u8];
        assert!((shannon_entropy(&data) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn compression_ratio_of_empty_is_one() {
        assert_eq!(compression_ratio(&[]), 1.0);
    }

    #[test]
    fn compression_ratio_of_repetitive_data_is_small() {
        let data = vec![0u8; 10_000];
        assert!(compression_ratio(&data) < 0.1);
    }

    #[test]
    fn opcode_histogram_counts_only_recognized_bytes() {
        let data = vec![b'+', b'+', b'-', b'x', b'y'];
        let hist: HashMap<u8, u64> = opcode_histogram(&data).into_iter().collect();
        assert_eq!(hist[&b'+'], 2);
        assert_eq!(hist[&b'-'], 1);
        assert_eq!(hist.len(), OPCODES.len());
    }

    #[test]
    fn top_k_breaks_ties_by_first_occurrence() {
        let pop = vec![vec![1u8; 64], vec![2u8; 64], vec![1u8; 64]];
        let top = top_k_programs(&pop, 2);
        assert_eq!(top[0], (vec![1u8; 64], 2));
        assert_eq!(top[1], (vec![2u8; 64], 1));
    }

    #[test]
    fn hamming_distance_requires_equal_length() {
        assert_eq!(
            hamming_distance(&[1, 2, 3], &[1, 2]),
            Err(AnalyticsError::LengthMismatch(3, 2))
        );
    }

    #[test]
    fn hamming_distance_counts_differences() {
        assert_eq!(hamming_distance(&[1, 2, 3], &[1, 9, 3]).unwrap(), 1);
    }
}
