//! `bffx`: a Brain-Fuck-Forth style digital abiogenesis substrate, plus an
//! optional economic layer built on top of it.
//!
//! The crate is split into two layers that can be driven independently:
//!
//! - **Layer A, the substrate** ([`vm`], [`scheduler`], [`detector`],
//!   [`soup`], [`analytics`]): a population of 64-byte self-modifying
//!   programs executed pairwise on a 10-opcode virtual machine over a
//!   128-byte tape, one *epoch* at a time. [`soup::Soup`] owns the
//!   population and drives epochs; [`detector`] classifies each pairing's
//!   outcome as a replication event or not; [`analytics`] computes
//!   population-level statistics (entropy, opcode histograms, near-
//!   duplicate clustering) a caller can feed into the economic layer.
//!
//! - **Layer B, the economic engine** ([`models`], [`registry`],
//!   [`numerics`], [`policy`], [`signal`], [`cache`], [`engine`]): typed
//!   agents (king/knight/mercenary) layered over substrate (or externally
//!   supplied trace) tape ids, driven tick by tick through a fixed six-phase
//!   pipeline by [`engine::EconomicEngine`]. Role behavior and trait
//!   emergence are governed by a restricted expression grammar ([`policy`]);
//!   per-tick event bursts are routed through fixed channels with refractory
//!   cool-downs ([`signal`]); the pure per-tick computation is wrapped in an
//!   LRU cache with witness-based self-checking ([`cache`]).
//!
//! [`config::Config`] configures both layers and is the unit a caller
//! hashes ([`Config::config_hash`]) to reproduce a run byte-for-byte from a
//! seed. [`canon`] provides the canonical (sorted-key) JSON rendering that
//! hash is built on, and that the engine's tick cache keys are built on too.
//!
//! ## Determinism
//!
//! Every random draw in both layers is taken from a caller-supplied,
//! explicitly seeded `rand::Rng`. Given the same seed, config, and initial
//! population or trace, a run reproduces byte-for-byte: RNG consumption
//! order is fixed by each module's documented draw sequence, and the
//! engine's tick cache never changes the *computed* values it returns (see
//! [`engine`] for the one documented exception around replaying a stale
//! `tick_num`/metrics pair on a cache hit).

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// The 10-opcode virtual machine: tape layout, opcode semantics, and the
/// bounded-step execution loop.
pub mod vm;

/// Classifies a pairwise VM run's outcome against the original, unrun A/B
/// programs (exact, fuzzy, or no replication).
pub mod detector;

/// Deterministic pairwise scheduling over a population.
pub mod scheduler;

/// Owns the program population and drives epochs over it.
pub mod soup;

/// Population-level statistics: entropy, compression ratio, opcode
/// histograms, near-duplicate clustering, Hamming distance.
pub mod analytics;

/// Canonical (sorted-key) JSON rendering and truncated SHA-256 hex hashing,
/// shared by config hashing and the engine's tick cache keys.
pub mod canon;

/// Configuration for both layers, with validation and a stable content hash.
pub mod config;

/// The data model shared by the economic layer: agents, roles, wealth
/// traits, events, and per-tick results.
pub mod models;

/// Owns the set of economic agents and the lookups the engine needs.
pub mod registry;

/// Pure economic formulas: wealth exposure, raid value, combat resolution,
/// trade, bribery, bounty, and target selection.
pub mod numerics;

/// A restricted, whitelisted expression grammar for role and trait-
/// emergence policies.
pub mod policy;

/// Fixed-channel event routing with per-channel refractory cool-downs.
pub mod signal;

/// A generic LRU cache with witness sampling, used to memoize tick
/// computation.
pub mod cache;

/// Orchestrates one economic tick end to end.
pub mod engine;

pub use canon::{canonical_json, sha256_hex_prefix};
pub use config::{Config, ConfigError};
pub use engine::{EconomicEngine, EngineError};
pub use models::{Agent, AgentSnapshot, Event, EventKind, Role, SubstrateAnalytics, TickMetrics, TickResult, WealthTraits};
pub use registry::{AgentRegistry, RegistryError};
pub use soup::{PairOutcome, Soup, SoupError};
pub use vm::{HaltCause, RunResult, VmError, PROGRAM_LEN, TAPE_LEN};
