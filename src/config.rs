//! Typed configuration record for every tunable named in the substrate and
//! economic models, with `Default` impls matching the documented numeric
//! defaults and boundary validation at construction.
//!
//! Loading a config from a file (YAML/JSON/etc.) is out of scope; this module
//! only covers constructing and validating an in-memory record, including
//! deserializing one from an already-parsed [`serde_json::Value`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canon::{canonical_json, sha256_hex_prefix};

/// Errors validating a [`Config`] at construction.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// `registry.role_ratios` did not sum to `1.0` within tolerance.
    #[error("role ratios must sum to 1.0 (±0.01), got {0}")]
    RoleRatiosInvalid(f64),
    /// A refractory period was negative.
    #[error("refractory period for channel {channel} must be >= 0, got {value}")]
    NegativeRefractory {
        /// Channel name.
        channel: &'static str,
        /// The offending (negative) value.
        value: i64,
    },
    /// `cache.witness_sample_rate` fell outside `[0, 1]`.
    #[error("witness_sample_rate must be in [0, 1], got {0}")]
    WitnessRateOutOfRange(f64),
    /// A currency or wealth range had `min > max`.
    #[error("range for {field} has min {min} > max {max}")]
    InvertedRange {
        /// Which field the range belongs to.
        field: &'static str,
        /// The offending minimum.
        min: i64,
        /// The offending maximum.
        max: i64,
    },
}

/// Substrate (Layer A) tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    /// Maximum VM steps per pair execution.
    pub step_limit: u64,
    /// Per-byte mutation probability applied after each pair execution.
    pub mutation_p: f64,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        SubstrateConfig {
            step_limit: 8192,
            mutation_p: 0.0,
        }
    }
}

/// Inclusive integer range, validated `min <= max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    /// Inclusive lower bound.
    pub min: u64,
    /// Inclusive upper bound.
    pub max: u64,
}

impl IntRange {
    /// Construct a new range.
    pub const fn new(min: u64, max: u64) -> Self {
        IntRange { min, max }
    }
}

/// Role population ratios. Must sum to `1.0` within `±0.01`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleRatios {
    /// Fraction of the population assigned the King role.
    pub king: f64,
    /// Fraction assigned Knight.
    pub knight: f64,
    /// Fraction assigned Mercenary (the implicit remainder in the source
    /// algorithm, but carried explicitly here for validation).
    pub mercenary: f64,
}

impl Default for RoleRatios {
    fn default() -> Self {
        RoleRatios {
            king: 0.10,
            knight: 0.20,
            mercenary: 0.70,
        }
    }
}

/// Initial currency and per-trait wealth draw ranges for one role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleInitialStats {
    /// Initial currency range.
    pub currency: IntRange,
    /// Initial per-trait wealth ranges, keyed by trait name (all seven
    /// present). A `BTreeMap` keeps iteration order fixed for hashing.
    pub wealth: BTreeMap<String, IntRange>,
}

impl RoleInitialStats {
    fn uniform(currency: IntRange, trait_range: IntRange) -> Self {
        let wealth = crate::models::TRAIT_NAMES
            .iter()
            .map(|&name| (name.to_string(), trait_range))
            .collect();
        RoleInitialStats { currency, wealth }
    }
}

/// Registry (Layer B agent creation) tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Role population ratios.
    pub role_ratios: RoleRatios,
    /// King initial currency/wealth ranges.
    pub king: RoleInitialStats,
    /// Knight initial currency/wealth ranges.
    pub knight: RoleInitialStats,
    /// Mercenary initial currency/wealth ranges.
    pub mercenary: RoleInitialStats,
    /// Knight `retainer_fee` draw range at creation/mutation.
    pub knight_retainer_fee_range: IntRange,
    /// King `bribe_threshold` draw range at creation/mutation.
    pub king_bribe_threshold_range: IntRange,
    /// Per-tick (or per-call) probability that `mutate_roles` reassigns an
    /// agent's role.
    pub mutation_rate: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            role_ratios: RoleRatios::default(),
            king: RoleInitialStats::uniform(IntRange::new(400, 1200), IntRange::new(10, 60)),
            knight: RoleInitialStats::uniform(IntRange::new(100, 400), IntRange::new(5, 40)),
            mercenary: RoleInitialStats::uniform(IntRange::new(20, 150), IntRange::new(1, 20)),
            knight_retainer_fee_range: IntRange::new(20, 30),
            king_bribe_threshold_range: IntRange::new(300, 500),
            mutation_rate: 0.0,
        }
    }
}

/// Weights for [`crate::numerics::raid_value`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidValueWeights {
    /// Weight on the mercenary's own `raid` trait.
    pub alpha_raid: f64,
    /// Weight on the mercenary's `sense + adapt`.
    pub beta_sense_adapt: f64,
    /// Weight subtracting the king's projected defense.
    pub gamma_king_defend: f64,
    /// Weight on the king's exposed wealth.
    pub delta_king_exposed: f64,
}

impl Default for RaidValueWeights {
    fn default() -> Self {
        RaidValueWeights {
            alpha_raid: 1.0,
            beta_sense_adapt: 0.25,
            gamma_king_defend: 0.60,
            delta_king_exposed: 0.40,
        }
    }
}

/// Parameters for [`crate::numerics::p_knight_win`] and
/// [`crate::numerics::stake_amount`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefendResolutionConfig {
    /// Base win rate before the trait-delta sigmoid term.
    pub base_knight_winrate: f64,
    /// Weight multiplying the trait delta inside the sigmoid.
    pub trait_advantage_weight: f64,
    /// Additive bonus applied when the knight has an employer.
    pub employment_bonus: f64,
    /// Lower clamp bound for the resulting probability.
    pub clamp_min: f64,
    /// Upper clamp bound for the resulting probability.
    pub clamp_max: f64,
    /// Fraction of combined currency staked in a defend contest.
    pub stake_currency_frac: f64,
}

impl Default for DefendResolutionConfig {
    fn default() -> Self {
        DefendResolutionConfig {
            base_knight_winrate: 0.5,
            trait_advantage_weight: 0.3,
            employment_bonus: 0.25,
            clamp_min: 0.05,
            clamp_max: 0.95,
            stake_currency_frac: 0.10,
        }
    }
}

/// Loss fractions applied to a king by [`crate::numerics::apply_mirrored_losses`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailedBribeConfig {
    /// Fraction of the king's currency transferred to the raiding mercenary.
    pub king_currency_loss_frac: f64,
    /// Fraction of each of the king's traits transferred to the mercenary.
    pub king_wealth_loss_frac: f64,
}

impl Default for FailedBribeConfig {
    fn default() -> Self {
        FailedBribeConfig {
            king_currency_loss_frac: 0.50,
            king_wealth_loss_frac: 0.25,
        }
    }
}

/// Per-tick trade parameters for [`crate::numerics::apply_trade`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    /// Currency a king must hold (and spends) to trade this tick.
    pub invest_per_tick: u64,
    /// Wealth units reported as created by a successful trade.
    pub created_wealth_units: u32,
    /// Trait deltas applied on a successful trade.
    pub distribution: BTreeMap<String, i64>,
}

impl Default for TradeConfig {
    fn default() -> Self {
        let mut distribution = BTreeMap::new();
        distribution.insert("defend".to_string(), 3);
        distribution.insert("trade".to_string(), 2);
        TradeConfig {
            invest_per_tick: 100,
            created_wealth_units: 5,
            distribution,
        }
    }
}

/// The full economic numerics configuration (§4.6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicConfig {
    /// Per-role exposure multiplier used by `wealth_exposed`. Keyed by the
    /// lowercase role name (`"king"`, `"knight"`, `"mercenary"`).
    pub exposure_factors: BTreeMap<String, f64>,
    /// Weights feeding `raid_value`.
    pub raid_value_weights: RaidValueWeights,
    /// Parameters feeding `p_knight_win` and `stake_amount`.
    pub defend_resolution: DefendResolutionConfig,
    /// Loss fractions applied by `apply_mirrored_losses`.
    pub on_failed_bribe: FailedBribeConfig,
    /// Trade parameters for `apply_trade`.
    pub trade: TradeConfig,
    /// Fraction a king's wealth is scaled down by on a successful bribe.
    pub bribe_leakage: f64,
    /// Fraction of the mercenary's `raid`/`adapt` transferred to the
    /// winning knight by `apply_bounty`.
    pub bounty_frac: f64,
}

impl Default for EconomicConfig {
    fn default() -> Self {
        let mut exposure_factors = BTreeMap::new();
        exposure_factors.insert("king".to_string(), 1.0);
        exposure_factors.insert("knight".to_string(), 0.5);
        exposure_factors.insert("mercenary".to_string(), 0.4);
        EconomicConfig {
            exposure_factors,
            raid_value_weights: RaidValueWeights::default(),
            defend_resolution: DefendResolutionConfig::default(),
            on_failed_bribe: FailedBribeConfig::default(),
            trade: TradeConfig::default(),
            bribe_leakage: 0.05,
            bounty_frac: 0.07,
        }
    }
}

/// Per-channel refractory periods (in ticks) for the [`crate::signal`]
/// processor. `retainer` and `trait_drip` are fixed at `0` and are not
/// configurable (see §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefractoryConfig {
    /// Cool-down after an `unopposed_raid` signal, in ticks.
    pub raid: i64,
    /// Cool-down after a `defend_win`/`defend_loss` signal, in ticks.
    pub defend: i64,
    /// Cool-down after a `bribe_accept`/`bribe_insufficient_funds` signal.
    pub bribe: i64,
    /// Cool-down after a `trade` signal.
    pub trade: i64,
    /// Whether events arriving during refractory are queued (`true`) or
    /// dropped (`false`). Not named in the distilled spec's options list but
    /// required to realize "if queuing enabled" in §4.8.
    pub queue_events: bool,
}

impl Default for RefractoryConfig {
    fn default() -> Self {
        RefractoryConfig {
            raid: 2,
            defend: 1,
            bribe: 1,
            trade: 0,
            queue_events: true,
        }
    }
}

/// Cache tunables (§4.10).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the tick-result cache is active at all.
    pub enabled: bool,
    /// Maximum number of entries retained (LRU eviction beyond this).
    pub max_size: usize,
    /// Probability (independent of the simulation RNG) of storing a witness
    /// for a freshly computed entry.
    pub witness_sample_rate: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            max_size: 10_000,
            witness_sample_rate: 0.05,
        }
    }
}

/// One trait-emergence rule: `condition` is evaluated by
/// [`crate::policy`] against each agent's context; on a truthy result every
/// entry in `delta` is added to the named trait (clamped at zero).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraitEmergenceRule {
    /// Policy-evaluator expression source.
    pub condition: String,
    /// Trait deltas applied when `condition` is truthy for an agent.
    pub delta: BTreeMap<String, i64>,
}

/// Trait-emergence (soup drip, §4.11 Phase 1) configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitEmergenceConfig {
    /// Whether Phase 1 runs at all.
    pub enabled: bool,
    /// Rules evaluated in order, each against every agent in id order.
    pub rules: Vec<TraitEmergenceRule>,
}

impl Default for TraitEmergenceConfig {
    fn default() -> Self {
        let mut delta = BTreeMap::new();
        delta.insert("copy".to_string(), 1);
        TraitEmergenceConfig {
            enabled: true,
            rules: vec![TraitEmergenceRule {
                condition: "copy >= 12 and tick % 2 == 0".to_string(),
                delta,
            }],
        }
    }
}

/// The full configuration record. Construct with [`Config::default`] and
/// override fields, or deserialize one from an already-parsed JSON value
/// with [`Config::from_value`]; both paths should be followed by
/// [`Config::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Top-level RNG seed. Splittable per §6 ("seeded random source").
    pub seed: u64,
    /// Free-text version tag, folded into `config_hash` so that two
    /// otherwise-identical configs under different protocol versions hash
    /// differently.
    pub version: String,
    /// Substrate tunables.
    pub substrate: SubstrateConfig,
    /// Registry tunables.
    pub registry: RegistryConfig,
    /// Economic numerics tunables.
    pub economic: EconomicConfig,
    /// Signal-processor refractory tunables.
    pub refractory: RefractoryConfig,
    /// Tick-result cache tunables.
    pub cache: CacheConfig,
    /// Trait-emergence rules.
    pub trait_emergence: TraitEmergenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed: 1337,
            version: "1.0.0".to_string(),
            substrate: SubstrateConfig::default(),
            registry: RegistryConfig::default(),
            economic: EconomicConfig::default(),
            refractory: RefractoryConfig::default(),
            cache: CacheConfig::default(),
            trait_emergence: TraitEmergenceConfig::default(),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from an already-parsed JSON value. Missing
    /// fields fall back to their defaults (every sub-struct is
    /// `#[serde(default)]`); this is a record deserialization, not a file
    /// load, so it stays in scope per §1.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Validate boundary constraints not expressible in the type system
    /// alone (role ratios summing to one, non-negative refractory periods,
    /// witness rate within `[0, 1]`, non-inverted ranges).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio_sum =
            self.registry.role_ratios.king + self.registry.role_ratios.knight + self.registry.role_ratios.mercenary;
        if (ratio_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::RoleRatiosInvalid(ratio_sum));
        }

        for (channel, value) in [
            ("raid", self.refractory.raid),
            ("defend", self.refractory.defend),
            ("bribe", self.refractory.bribe),
            ("trade", self.refractory.trade),
        ] {
            if value < 0 {
                return Err(ConfigError::NegativeRefractory { channel, value });
            }
        }

        if !(0.0..=1.0).contains(&self.cache.witness_sample_rate) {
            return Err(ConfigError::WitnessRateOutOfRange(self.cache.witness_sample_rate));
        }

        for (field, range) in [
            ("registry.knight_retainer_fee_range", self.registry.knight_retainer_fee_range),
            ("registry.king_bribe_threshold_range", self.registry.king_bribe_threshold_range),
        ] {
            if range.min > range.max {
                return Err(ConfigError::InvertedRange {
                    field,
                    min: range.min as i64,
                    max: range.max as i64,
                });
            }
        }

        Ok(())
    }

    /// 16-hex-char SHA-256 prefix of this config's canonical (sort-keys)
    /// JSON rendering, used as half of the cache key (§4.10).
    pub fn config_hash(&self) -> String {
        let value = serde_json::to_value(self).expect("Config always serializes");
        let canonical = canonical_json(&value);
        sha256_hex_prefix(canonical.as_bytes(), 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn role_ratios_must_sum_to_one() {
        let mut cfg = Config::default();
        cfg.registry.role_ratios.king = 0.5;
        assert_eq!(cfg.validate(), Err(ConfigError::RoleRatiosInvalid(1.4)));
    }

    #[test]
    fn negative_refractory_is_rejected() {
        let mut cfg = Config::default();
        cfg.refractory.raid = -1;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NegativeRefractory {
                channel: "raid",
                value: -1
            })
        );
    }

    #[test]
    fn witness_rate_out_of_range_is_rejected() {
        let mut cfg = Config::default();
        cfg.cache.witness_sample_rate = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::WitnessRateOutOfRange(1.5)));
    }

    #[test]
    fn config_hash_is_deterministic_and_sensitive_to_changes() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.config_hash(), b.config_hash());
        b.seed = 42;
        assert_ne!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn from_value_fills_in_defaults_for_missing_fields() {
        let value = serde_json::json!({ "seed": 99 });
        let cfg = Config::from_value(value).unwrap();
        assert_eq!(cfg.seed, 99);
        assert_eq!(cfg.substrate.step_limit, 8192);
    }
}
