//! Core data types shared across the substrate and economic layers.
//!
//! `Role`, `WealthTraits`, `Agent`, `Event`, and the per-tick result types
//! live here rather than beside the code that produces them, since both
//! `registry` and `engine` need them and neither should own the other's
//! definitions.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of wealth trait names, in the canonical iteration order
/// used whenever traits are drawn, scaled, or hashed in a fixed order.
pub const TRAIT_NAMES: [&str; 7] = [
    "compute", "copy", "defend", "raid", "trade", "sense", "adapt",
];

/// Agent role. Determines the id prefix and which role-specific fields
/// (`employer`/`retainer_fee` for Knight, `bribe_threshold` for King) apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owns wealth, pays retainers and bribes, targeted by raids.
    King,
    /// Defends a king (if employed) or acts as a free defender.
    Knight,
    /// Raids kings for wealth, may be bribed off or bounty-hunted.
    Mercenary,
}

impl Role {
    /// The one-letter id prefix for this role (`K`, `N`, or `M`).
    ///
    /// Knight uses `N` rather than `K` to avoid colliding with King.
    pub fn id_prefix(self) -> char {
        match self {
            Role::King => 'K',
            Role::Knight => 'N',
            Role::Mercenary => 'M',
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::King => "king",
            Role::Knight => "knight",
            Role::Mercenary => "mercenary",
        };
        f.write_str(s)
    }
}

/// Seven non-negative integer traits representing an agent's wealth.
///
/// **Invariant:** every field is always `>= 0`. Mutating methods clamp at
/// zero rather than allow negative values; construction from raw integers
/// is the caller's responsibility to keep non-negative (debug-asserted).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WealthTraits {
    /// Computational capability.
    pub compute: u32,
    /// Self-replication capability; drives trait-emergence drip rules.
    pub copy: u32,
    /// Defensive capability; feeds `king_defend_projection` and `p_knight_win`.
    pub defend: u32,
    /// Raiding capability; feeds `raid_value`.
    pub raid: u32,
    /// Trade capability; incremented by `apply_trade`.
    pub trade: u32,
    /// Sensing capability; contributes to both defend and raid formulas.
    pub sense: u32,
    /// Adaptive capability; contributes to both defend and raid formulas,
    /// and is one of the two bounty-eligible traits.
    pub adapt: u32,
}

impl WealthTraits {
    /// Sum of all seven traits.
    pub fn total(&self) -> u32 {
        self.compute + self.copy + self.defend + self.raid + self.trade + self.sense + self.adapt
    }

    /// Scale every trait by `factor`, flooring to the nearest integer and
    /// clamping at zero. `factor` is expected in `[0, 1]` for leakage/loss
    /// use but is not restricted here.
    pub fn scale(&mut self, factor: f64) {
        self.compute = scale_floor(self.compute, factor);
        self.copy = scale_floor(self.copy, factor);
        self.defend = scale_floor(self.defend, factor);
        self.raid = scale_floor(self.raid, factor);
        self.trade = scale_floor(self.trade, factor);
        self.sense = scale_floor(self.sense, factor);
        self.adapt = scale_floor(self.adapt, factor);
    }

    /// Read a trait by name. Returns `None` for unknown names.
    pub fn get(&self, trait_name: &str) -> Option<u32> {
        Some(match trait_name {
            "compute" => self.compute,
            "copy" => self.copy,
            "defend" => self.defend,
            "raid" => self.raid,
            "trade" => self.trade,
            "sense" => self.sense,
            "adapt" => self.adapt,
            _ => return None,
        })
    }

    /// Add (or, if negative, subtract) `amount` from the named trait,
    /// clamping the result at zero. No-ops silently on an unknown name —
    /// callers that need to distinguish that case should check `get` first.
    pub fn add(&mut self, trait_name: &str, amount: i64) {
        let field = match trait_name {
            "compute" => &mut self.compute,
            "copy" => &mut self.copy,
            "defend" => &mut self.defend,
            "raid" => &mut self.raid,
            "trade" => &mut self.trade,
            "sense" => &mut self.sense,
            "adapt" => &mut self.adapt,
            _ => return,
        };
        let next = i64::from(*field) + amount;
        *field = next.max(0) as u32;
    }
}

fn scale_floor(value: u32, factor: f64) -> u32 {
    let scaled = (f64::from(value) * factor).floor();
    if scaled <= 0.0 {
        0
    } else {
        scaled as u32
    }
}

/// An agent participating in the economic layer.
///
/// `tape_id` links back to the substrate population index this agent was
/// created from (or, in trace mode, the externally supplied tape id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier, e.g. `"K-01"`.
    pub id: String,
    /// Substrate population index (or trace tape id) this agent maps to.
    pub tape_id: usize,
    /// Current role.
    pub role: Role,
    /// Non-negative currency balance.
    pub currency: u64,
    /// Current wealth traits.
    pub wealth: WealthTraits,
    /// Employing king's id, if any. Only meaningful for Knights.
    pub employer: Option<String>,
    /// Per-tick fee paid by `employer` to this knight, if employed.
    pub retainer_fee: u64,
    /// Bribe threshold this king will accept. Only meaningful for Kings.
    pub bribe_threshold: u64,
    /// Whether this agent is still part of the simulation.
    pub alive: bool,
}

impl Agent {
    /// Total wealth across all seven traits.
    pub fn wealth_total(&self) -> u32 {
        self.wealth.total()
    }

    /// Add (or subtract, if negative) currency, clamping at zero.
    pub fn add_currency(&mut self, amount: i64) {
        let next = self.currency as i64 + amount;
        self.currency = next.max(0) as u64;
    }
}

/// The tag distinguishing which `Event` variant a record carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A trait-emergence rule fired for one agent.
    TraitDrip,
    /// A king executed a trade operation.
    Trade,
    /// A king paid a retainer fee to an employed knight.
    Retainer,
    /// A mercenary accepted a bribe instead of raiding.
    BribeAccept,
    /// A bribe would have been accepted but the king lacked the funds.
    BribeInsufficientFunds,
    /// A knight successfully defended against a raid.
    DefendWin,
    /// A mercenary won a contested raid against a defending knight.
    DefendLoss,
    /// A mercenary raided a king with no defenders present.
    UnopposedRaid,
}

/// One economic event produced during a tick.
///
/// All fields beyond `tick` and `kind` are optional; which ones are
/// populated depends on `kind` (see the `EconomicEngine` phase that
/// produces each kind for the exact field set).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Tick number this event occurred in.
    pub tick: u64,
    /// Which kind of event this is. `Default` is unusable on its own;
    /// every constructor sets this explicitly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    /// King agent id involved, if any.
    pub king: Option<String>,
    /// Knight agent id involved, if any.
    pub knight: Option<String>,
    /// Mercenary agent id involved, if any.
    pub merc: Option<String>,
    /// Currency amount transferred, if applicable.
    pub amount: Option<u64>,
    /// Currency staked in a defend contest, if applicable.
    pub stake: Option<u64>,
    /// Computed knight win probability, if applicable.
    pub p_knight: Option<f64>,
    /// Computed raid value, if applicable.
    pub rv: Option<f64>,
    /// King's bribe threshold, if applicable.
    pub threshold: Option<u64>,
    /// Trait name affected, for `trait_drip`.
    pub trait_name: Option<String>,
    /// Trait delta applied, for `trait_drip`.
    pub delta: Option<i64>,
    /// Currency invested, for `trade`.
    pub invest: Option<u64>,
    /// Wealth units created, for `trade`.
    pub wealth_created: Option<u32>,
    /// Employer king id, for `retainer` (duplicates `king` for clarity).
    pub employer: Option<String>,
    /// Agent id the event is primarily about, for `trait_drip`.
    pub agent: Option<String>,
    /// Free-text annotation, informational only.
    pub notes: Option<String>,
}

impl Event {
    /// Start building an event of the given kind at the given tick.
    pub fn new(tick: u64, kind: EventKind) -> Self {
        Event {
            tick,
            kind: Some(kind),
            ..Default::default()
        }
    }
}

/// Metrics computed for a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    /// Shannon entropy (bits) of the substrate population, if available.
    pub entropy: f64,
    /// zlib compression ratio of the substrate population, if available.
    pub compression_ratio: f64,
    /// Arithmetic mean of `copy` trait across all agents.
    pub copy_score_mean: f64,
    /// Sum of `wealth_total()` across all agents.
    pub wealth_total: u64,
    /// Sum of `currency` across all agents.
    pub currency_total: u64,
    /// Count of `bribe_accept` + `bribe_insufficient_funds` events this tick.
    pub bribes_paid: u32,
    /// Count of `bribe_accept` events this tick.
    pub bribes_accepted: u32,
    /// Count of `defend_win` + `defend_loss` + `unopposed_raid` events this tick.
    pub raids_attempted: u32,
    /// Count of `defend_loss` + `unopposed_raid` events this tick.
    pub raids_won_by_merc: u32,
    /// Count of `defend_win` events this tick.
    pub raids_won_by_knight: u32,
}

/// A public projection of an `Agent`'s state, used in `TickResult` and as
/// the cache's canonical-state input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Agent id.
    pub id: String,
    /// Agent role.
    pub role: Role,
    /// Currency balance at snapshot time.
    pub currency: u64,
    /// Wealth traits at snapshot time.
    pub wealth: WealthTraits,
}

impl AgentSnapshot {
    /// Project an `Agent` into its public snapshot.
    pub fn from_agent(agent: &Agent) -> Self {
        AgentSnapshot {
            id: agent.id.clone(),
            role: agent.role,
            currency: agent.currency,
            wealth: agent.wealth,
        }
    }
}

/// The complete result of processing one economic tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickResult {
    /// 1-indexed tick number.
    pub tick_num: u64,
    /// Events produced this tick, in phase order then per-phase order.
    pub events: Vec<Event>,
    /// Aggregate metrics for this tick.
    pub metrics: TickMetrics,
    /// Snapshot of every agent's state after this tick, in id-sorted order.
    pub agent_snapshots: Vec<AgentSnapshot>,
}

/// Substrate-layer analytics passed through into a tick's [`TickMetrics`]
/// when the caller drives a [`crate::soup::Soup`] alongside the economic
/// engine. Absent a substrate (trace-mode construction), both fields default
/// to `0.0` at the call site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubstrateAnalytics {
    /// Shannon entropy (bits) of the current population.
    pub entropy: f64,
    /// zlib compression ratio of the current population.
    pub compression_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wealth_total_sums_all_seven_traits() {
        let w = WealthTraits {
            compute: 1,
            copy: 2,
            defend: 3,
            raid: 4,
            trade: 5,
            sense: 6,
            adapt: 7,
        };
        assert_eq!(w.total(), 28);
    }

    #[test]
    fn scale_floors_and_clamps_at_zero() {
        let mut w = WealthTraits {
            compute: 10,
            ..Default::default()
        };
        w.scale(0.95);
        assert_eq!(w.compute, 9);

        let mut w2 = WealthTraits {
            compute: 1,
            ..Default::default()
        };
        w2.scale(0.0);
        assert_eq!(w2.compute, 0);
    }

    #[test]
    fn add_clamps_negative_results_at_zero() {
        let mut w = WealthTraits {
            raid: 3,
            ..Default::default()
        };
        w.add("raid", -10);
        assert_eq!(w.raid, 0);
    }

    #[test]
    fn add_currency_clamps_at_zero() {
        let mut agent = Agent {
            id: "M-01".into(),
            tape_id: 0,
            role: Role::Mercenary,
            currency: 5,
            wealth: WealthTraits::default(),
            employer: None,
            retainer_fee: 0,
            bribe_threshold: 0,
            alive: true,
        };
        agent.add_currency(-100);
        assert_eq!(agent.currency, 0);
    }

    #[test]
    fn role_id_prefix_matches_table() {
        assert_eq!(Role::King.id_prefix(), 'K');
        assert_eq!(Role::Knight.id_prefix(), 'N');
        assert_eq!(Role::Mercenary.id_prefix(), 'M');
    }
}
