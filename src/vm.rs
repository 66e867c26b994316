//! The BFF virtual machine: a deterministic, self-modifying, 2-head,
//! 128-byte tape machine with a 10-opcode instruction set.
//!
//! **Invariant:** `run` is a pure function of its inputs. It never performs
//! I/O, never consults a random source, and always halts (the `step_limit`
//! is the finiteness guarantee — see [`HaltCause::StepLimit`]).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use thiserror::Error;

/// Length of a full tape (two concatenated 64-byte programs).
pub const TAPE_LEN: usize = 128;
/// Length of a single program.
pub const PROGRAM_LEN: usize = 64;

/// Errors constructing VM inputs. Distinct from [`HaltCause`], which is not
/// an error — it's the expected outcome of every run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VmError {
    /// A tape was not exactly [`TAPE_LEN`] bytes.
    #[error("tape must be exactly {TAPE_LEN} bytes, got {0}")]
    BadTapeLen(usize),
    /// A program was not exactly [`PROGRAM_LEN`] bytes.
    #[error("program must be exactly {PROGRAM_LEN} bytes, got {0}")]
    BadProgramLen(usize),
}

/// Why a VM run stopped.
///
/// `Normal` is part of the type for completeness but is unreachable under
/// this ISA: the program counter always eventually leaves `[0, TAPE_LEN)`,
/// hits the step limit, or runs an unmatched bracket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltCause {
    /// `steps` reached `step_limit` before any other halt condition.
    StepLimit,
    /// `head0` moved outside `[0, TAPE_LEN)`.
    OobHead0,
    /// `head1` moved outside `[0, TAPE_LEN)`.
    OobHead1,
    /// A `[` or `]` had no matching partner within the tape.
    UnmatchedBracket {
        /// Program counter at which the unmatched bracket was fetched.
        pc: usize,
    },
    /// The program counter left `[0, TAPE_LEN)` without a step-limit halt.
    PcOob,
    /// Unreachable under the current ISA; retained for exhaustiveness.
    Normal,
}

/// The result of running the VM to halt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    /// The tape after execution (same buffer, mutated in place logically).
    pub tape: Vec<u8>,
    /// Number of opcodes fetched, including the one that triggered the halt.
    pub steps: u64,
    /// Why execution stopped.
    pub halt: HaltCause,
}

/// Run a 128-byte tape to halt under the BFF ISA.
///
/// `init_head0`/`init_head1` default to 0/64 per the substrate contract but
/// are exposed for testing the ISA in isolation.
pub fn run(tape: &[u8], step_limit: u64) -> Result<RunResult, VmError> {
    run_with_heads(tape, step_limit, 0, PROGRAM_LEN)
}

/// `run`, with explicit initial head positions.
pub fn run_with_heads(
    tape: &[u8],
    step_limit: u64,
    init_head0: usize,
    init_head1: usize,
) -> Result<RunResult, VmError> {
    if tape.len() != TAPE_LEN {
        return Err(VmError::BadTapeLen(tape.len()));
    }

    let mut tape = tape.to_vec();
    let mut pc: i64 = 0;
    let mut head0: i64 = init_head0 as i64;
    let mut head1: i64 = init_head1 as i64;
    let mut steps: u64 = 0;

    let halt = loop {
        if pc < 0 || pc as usize >= TAPE_LEN {
            break HaltCause::PcOob;
        }
        if steps >= step_limit {
            break HaltCause::StepLimit;
        }
        let opcode = tape[pc as usize];
        steps += 1;

        match opcode {
            b'>' => {
                head0 += 1;
                if !in_bounds(head0) {
                    break HaltCause::OobHead0;
                }
                pc += 1;
            }
            b'<' => {
                head0 -= 1;
                if !in_bounds(head0) {
                    break HaltCause::OobHead0;
                }
                pc += 1;
            }
            b'}' => {
                head1 += 1;
                if !in_bounds(head1) {
                    break HaltCause::OobHead1;
                }
                pc += 1;
            }
            b'{' => {
                head1 -= 1;
                if !in_bounds(head1) {
                    break HaltCause::OobHead1;
                }
                pc += 1;
            }
            b'+' => {
                let cell = &mut tape[head0 as usize];
                *cell = cell.wrapping_add(1);
                pc += 1;
            }
            b'-' => {
                let cell = &mut tape[head0 as usize];
                *cell = cell.wrapping_sub(1);
                pc += 1;
            }
            b'.' => {
                tape[head1 as usize] = tape[head0 as usize];
                pc += 1;
            }
            b',' => {
                tape[head0 as usize] = tape[head1 as usize];
                pc += 1;
            }
            b'[' => {
                if tape[head0 as usize] == 0 {
                    match scan_forward_match(&tape, pc as usize) {
                        Some(target) => pc = target as i64 + 1,
                        None => break HaltCause::UnmatchedBracket { pc: pc as usize },
                    }
                } else {
                    pc += 1;
                }
            }
            b']' => {
                if tape[head0 as usize] != 0 {
                    match scan_backward_match(&tape, pc as usize) {
                        Some(target) => pc = target as i64 + 1,
                        None => break HaltCause::UnmatchedBracket { pc: pc as usize },
                    }
                } else {
                    pc += 1;
                }
            }
            _ => {
                pc += 1;
            }
        }
    };

    Ok(RunResult { tape, steps, halt })
}

#[inline]
fn in_bounds(pos: i64) -> bool {
    pos >= 0 && (pos as usize) < TAPE_LEN
}

/// From a `[` at `open_pc`, scan forward for its matching `]`.
fn scan_forward_match(tape: &[u8], open_pc: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut pc = open_pc;
    loop {
        match tape[pc] {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pc);
                }
            }
            _ => {}
        }
        if pc + 1 >= TAPE_LEN {
            return None;
        }
        pc += 1;
    }
}

/// From a `]` at `close_pc`, scan backward for its matching `[`.
fn scan_backward_match(tape: &[u8], close_pc: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut pc = close_pc;
    loop {
        match tape[pc] {
            b']' => depth += 1,
            b'[' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pc);
                }
            }
            _ => {}
        }
        if pc == 0 {
            return None;
        }
        pc -= 1;
    }
}

/// Concatenate two 64-byte programs into a 128-byte tape.
pub fn concat(a: &[u8], b: &[u8]) -> Result<Vec<u8>, VmError> {
    if a.len() != PROGRAM_LEN {
        return Err(VmError::BadProgramLen(a.len()));
    }
    if b.len() != PROGRAM_LEN {
        return Err(VmError::BadProgramLen(b.len()));
    }
    let mut tape = Vec::with_capacity(TAPE_LEN);
    tape.extend_from_slice(a);
    tape.extend_from_slice(b);
    Ok(tape)
}

/// Split a 128-byte tape back into its two 64-byte program segments.
pub fn split(tape: &[u8]) -> Result<(Vec<u8>, Vec<u8>), VmError> {
    if tape.len() != TAPE_LEN {
        return Err(VmError::BadTapeLen(tape.len()));
    }
    Ok((tape[..PROGRAM_LEN].to_vec(), tape[PROGRAM_LEN..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_tape() -> Vec<u8> {
        vec![0u8; TAPE_LEN]
    }

    #[test]
    fn rejects_wrong_length_tape() {
        assert_eq!(run(&[0u8; 4], 10), Err(VmError::BadTapeLen(4)));
    }

    #[test]
    fn halts_step_limit_after_exact_count() {
        // All no-ops: every byte advances pc without side effects.
        let tape = blank_tape();
        let result = run(&tape, 50).unwrap();
        assert_eq!(result.steps, 50);
        assert_eq!(result.halt, HaltCause::StepLimit);
    }

    #[test]
    fn increment_wraps_modulo_256() {
        assert_eq!(255u8.wrapping_add(1), 0);
        let mut tape = blank_tape();
        tape[0] = b'+';
        let result = run(&tape, 1).unwrap();
        assert_eq!(result.tape[0], 1);
    }

    #[test]
    fn copy_is_noop_when_heads_coincide() {
        let mut tape = blank_tape();
        tape[0] = b'.';
        let result = run_with_heads(&tape, 1, 5, 5).unwrap();
        assert_eq!(result.tape, tape);
    }

    #[test]
    fn head_out_of_bounds_halts_immediately() {
        let mut tape = blank_tape();
        tape[0] = b'}';
        let result = run_with_heads(&tape, 200, 0, 127).unwrap();
        assert_eq!(result.halt, HaltCause::OobHead1);
    }

    #[test]
    fn head0_decrement_below_zero_halts() {
        let mut tape = blank_tape();
        tape[0] = b'<';
        let result = run_with_heads(&tape, 10, 0, 64).unwrap();
        assert_eq!(result.halt, HaltCause::OobHead0);
    }

    #[test]
    fn unmatched_open_bracket_halts_at_origin() {
        let mut tape = blank_tape();
        tape[0] = b'[';
        let result = run(&tape, 10).unwrap();
        assert_eq!(result.halt, HaltCause::UnmatchedBracket { pc: 0 });
    }

    #[test]
    fn bracket_loop_skips_body_when_counter_is_zero() {
        // head0 points at a cell distinct from the program bytes so the `[`
        // test isn't confused by its own opcode byte; that cell is 0, so the
        // `-` between `[` and `]` must never execute.
        let mut tape = blank_tape();
        tape[0] = b'[';
        tape[1] = b'-';
        tape[2] = b']';
        let result = run_with_heads(&tape, 1, 50, 64).unwrap();
        assert_eq!(result.steps, 1);
        assert_eq!(result.halt, HaltCause::StepLimit);
        assert_eq!(result.tape[50], 0);
    }

    #[test]
    fn concat_then_split_round_trips() {
        let a = vec![1u8; PROGRAM_LEN];
        let b = vec![2u8; PROGRAM_LEN];
        let tape = concat(&a, &b).unwrap();
        let (a2, b2) = split(&tape).unwrap();
        assert_eq!(a, a2);
        assert_eq!(b, b2);
    }

    #[test]
    fn concat_rejects_wrong_length_program() {
        assert_eq!(
            concat(&[0u8; 10], &[0u8; PROGRAM_LEN]),
            Err(VmError::BadProgramLen(10))
        );
    }
}
