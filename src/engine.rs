//! Orchestrates one economic tick: soup drip, trade, retainer, mercenary
//! interactions, metrics, and agent snapshots (§4.11), wrapping the pure
//! per-tick computation in the tick-result [`crate::cache::Cache`] and
//! driving the [`crate::signal::SignalProcessor`] once per tick.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use tracing::{debug, warn};

use crate::cache::Cache;
use crate::canon::{canonical_json, sha256_hex_prefix};
use crate::config::Config;
use crate::models::{Agent, AgentSnapshot, Event, EventKind, Role, SubstrateAnalytics, TickMetrics, TickResult, TRAIT_NAMES};
use crate::numerics::{
    apply_bounty, apply_bribe_leakage, apply_mirrored_losses, apply_trade, p_knight_win, pick_target_king, raid_value,
    resolve_knight_wins, stake_amount,
};
use crate::policy::{self, Context, Value};
use crate::registry::{AgentRegistry, RegistryError};
use crate::signal::{Signal, SignalProcessor};

/// Errors constructing or driving an [`EconomicEngine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The underlying agent registry could not be built.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The cached unit of work: a tick's resulting agent state plus its result
/// record. Cached under a key derived from the pre-tick agent state and the
/// config hash (§4.10); the key intentionally omits `tick_num`, so a hit may
/// replay an earlier tick's event payloads verbatim. `process_tick`
/// unconditionally overwrites the two fields that must never be stale
/// (`tick_num`, and `entropy`/`compression_ratio` when substrate analytics
/// are supplied) after every lookup, hit or miss.
type TickComputation = (Vec<Agent>, TickResult);

/// Drives the economic layer tick by tick over an [`AgentRegistry`].
pub struct EconomicEngine {
    registry: AgentRegistry,
    config: Config,
    config_hash: String,
    cache: Cache<TickComputation>,
    signals: SignalProcessor,
    last_signals: Vec<Signal>,
}

impl EconomicEngine {
    /// Build an engine over a fresh registry constructed from `tape_ids`
    /// (substrate population indices, or externally supplied trace tape
    /// ids — trace-mode construction per §4.7), validating `config` and
    /// assigning knight employers as part of setup.
    pub fn new<R: rand::Rng>(tape_ids: &[usize], config: Config, rng: &mut R) -> Result<Self, EngineError> {
        let mut registry = AgentRegistry::from_tape_ids(tape_ids, &config.registry, rng)?;
        registry.assign_knight_employers(rng);

        let config_hash = config.config_hash();
        // Independent of the simulation RNG by construction: derived from
        // the config seed with a fixed salt rather than drawn from `rng`.
        let witness_seed = config.seed ^ 0x9E37_79B9_7F4A_7C15;
        let cache = Cache::new(
            config.cache.max_size,
            config.cache.enabled,
            config.cache.witness_sample_rate,
            witness_seed,
        );
        let signals = SignalProcessor::new(&config.refractory);

        Ok(EconomicEngine {
            registry,
            config,
            config_hash,
            cache,
            signals,
            last_signals: Vec::new(),
        })
    }

    /// The underlying agent registry.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// This engine's `config_hash`.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Current cache statistics.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Signals emitted by the most recent `process_tick` call.
    pub fn last_signals(&self) -> &[Signal] {
        &self.last_signals
    }

    /// Reassign roles across the population per `config.registry.mutation_rate`.
    ///
    /// Not one of the fixed Phase 1-6 tick operations (§4.11 enumerates only
    /// drip/trade/retainer/interactions/metrics/snapshot); role churn draws
    /// RNG and is therefore driven explicitly by the caller alongside
    /// `process_tick`, not folded into the cached pure computation.
    pub fn mutate_roles<R: rand::Rng>(&mut self, rng: &mut R) -> Vec<(String, Role, Role)> {
        if self.config.registry.mutation_rate <= 0.0 {
            return Vec::new();
        }
        let changes = self
            .registry
            .mutate_roles(self.config.registry.mutation_rate, &self.config.registry, rng);
        if !changes.is_empty() {
            self.cache.invalidate("role mutation changed agent population");
        }
        changes
    }

    /// Process one economic tick, returning its result. `substrate` carries
    /// entropy/compression-ratio analytics from a driven [`crate::soup::Soup`],
    /// if any; absent a substrate, both metrics are `0.0`.
    pub fn process_tick(&mut self, tick_num: u64, substrate: Option<SubstrateAnalytics>) -> TickResult {
        let pre_state = self.registry.agents().to_vec();
        let key = cache_key(&pre_state, &self.config_hash);
        let config = self.config.clone();

        let (next_agents, mut result) = self
            .cache
            .get_or_compute(&key, || compute_tick(pre_state, tick_num, &config));

        result.tick_num = tick_num;
        if let Some(analytics) = substrate {
            result.metrics.entropy = analytics.entropy;
            result.metrics.compression_ratio = analytics.compression_ratio;
        }

        self.registry.replace_agents(next_agents);

        self.last_signals = self.signals.update_refractory(tick_num);
        let mut emitted = self.signals.process_events(tick_num, &result.events);
        self.last_signals.append(&mut emitted);

        debug!(tick_num, events = result.events.len(), "tick complete");
        result
    }
}

/// 16-hex-char SHA-256 prefix of the canonical JSON rendering of `agents`
/// (sorted by id, fields `{id, role, currency, wealth}`) joined with
/// `config_hash` (§4.10).
fn cache_key(agents: &[Agent], config_hash: &str) -> String {
    let mut sorted: Vec<&Agent> = agents.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let state = serde_json::json!(sorted
        .iter()
        .map(|a| serde_json::json!({
            "id": a.id,
            "role": a.role,
            "currency": a.currency,
            "wealth": a.wealth,
        }))
        .collect::<Vec<_>>());

    let state_prefix = sha256_hex_prefix(canonical_json(&state).as_bytes(), 16);
    format!("{state_prefix}-{config_hash}")
}

/// The pure per-tick computation: requires no RNG, so it is safe to cache
/// and to replay verbatim on a cache hit. Runs Phases 1 through 6 of §4.11
/// in order.
fn compute_tick(mut agents: Vec<Agent>, tick_num: u64, config: &Config) -> TickComputation {
    let mut events = Vec::new();

    phase1_soup_drip(&mut agents, tick_num, config, &mut events);
    phase2_trade(&mut agents, tick_num, config, &mut events);
    phase3_retainer(&mut agents, tick_num, &mut events);
    phase4_interactions(&mut agents, tick_num, config, &mut events);

    let metrics = phase5_metrics(&agents, &events);
    let agent_snapshots = phase6_snapshot(&agents);

    let result = TickResult {
        tick_num,
        events,
        metrics,
        agent_snapshots,
    };
    (agents, result)
}

fn phase1_soup_drip(agents: &mut [Agent], tick_num: u64, config: &Config, events: &mut Vec<Event>) {
    if !config.trait_emergence.enabled {
        return;
    }

    for rule in &config.trait_emergence.rules {
        let expr = match policy::parse(&rule.condition) {
            Ok(expr) => expr,
            Err(err) => {
                warn!(condition = %rule.condition, error = %err, "skipping malformed trait-emergence rule");
                continue;
            }
        };

        let mut ids: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();
        ids.sort();

        for id in ids {
            let index = agents.iter().position(|a| a.id == id).expect("id from own snapshot exists");

            let mut ctx: Context = Context::new();
            for &trait_name in TRAIT_NAMES.iter() {
                ctx.insert(
                    trait_name.to_string(),
                    Value::Int(agents[index].wealth.get(trait_name).unwrap_or(0) as i64),
                );
            }
            ctx.insert("currency".to_string(), Value::Int(agents[index].currency as i64));
            ctx.insert("tick".to_string(), Value::Int(tick_num as i64));

            match policy::eval(&expr, &ctx) {
                Ok(Value::Bool(true)) => {
                    for (trait_name, delta) in &rule.delta {
                        agents[index].wealth.add(trait_name, *delta);
                        let mut event = Event::new(tick_num, EventKind::TraitDrip);
                        event.agent = Some(id.clone());
                        event.trait_name = Some(trait_name.clone());
                        event.delta = Some(*delta);
                        events.push(event);
                    }
                }
                Ok(Value::Bool(false)) => {}
                Ok(other) => {
                    warn!(agent = %id, value = ?other, "trait-emergence condition did not evaluate to a boolean");
                }
                Err(err) => {
                    warn!(agent = %id, condition = %rule.condition, error = %err, "skipping trait-emergence rule for agent");
                }
            }
        }
    }
}

fn phase2_trade(agents: &mut [Agent], tick_num: u64, config: &Config, events: &mut Vec<Event>) {
    let mut king_ids: Vec<String> = agents.iter().filter(|a| a.role == Role::King).map(|a| a.id.clone()).collect();
    king_ids.sort();

    for id in king_ids {
        let index = agents.iter().position(|a| a.id == id).expect("id from own snapshot exists");
        let invest = config.economic.trade.invest_per_tick;
        let created = apply_trade(&mut agents[index], &config.economic);
        if created > 0 {
            let mut event = Event::new(tick_num, EventKind::Trade);
            event.king = Some(id.clone());
            event.invest = Some(invest);
            event.wealth_created = Some(created);
            events.push(event);
        }
    }
}

fn phase3_retainer(agents: &mut [Agent], tick_num: u64, events: &mut Vec<Event>) {
    let mut knight_ids: Vec<String> = agents
        .iter()
        .filter(|a| a.role == Role::Knight)
        .map(|a| a.id.clone())
        .collect();
    knight_ids.sort();

    for knight_id in knight_ids {
        let knight_index = agents.iter().position(|a| a.id == knight_id).expect("id exists");
        let Some(employer_id) = agents[knight_index].employer.clone() else {
            continue;
        };
        let Some(king_index) = agents.iter().position(|a| a.id == employer_id) else {
            continue;
        };

        let fee = agents[knight_index].retainer_fee;
        if agents[king_index].currency < fee {
            continue;
        }

        let (king, knight) = two_mut(agents, king_index, knight_index);
        king.add_currency(-(fee as i64));
        knight.add_currency(fee as i64);

        let mut event = Event::new(tick_num, EventKind::Retainer);
        event.king = Some(employer_id.clone());
        event.employer = Some(employer_id);
        event.knight = Some(knight_id);
        event.amount = Some(fee);
        events.push(event);
    }
}

fn phase4_interactions(agents: &mut Vec<Agent>, tick_num: u64, config: &Config, events: &mut Vec<Event>) {
    let any_kings = agents.iter().any(|a| a.role == Role::King);
    if !any_kings {
        return;
    }

    let mut merc_ids: Vec<String> = agents
        .iter()
        .filter(|a| a.role == Role::Mercenary)
        .map(|a| a.id.clone())
        .collect();
    merc_ids.sort();

    for merc_id in merc_ids {
        let merc_index = agents.iter().position(|a| a.id == merc_id).expect("id exists");

        let kings_snapshot: Vec<Agent> = agents.iter().filter(|a| a.role == Role::King).cloned().collect();
        let target = match pick_target_king(&kings_snapshot, &config.economic) {
            Ok(king) => king.clone(),
            Err(_) => continue,
        };
        let king_index = agents.iter().position(|a| a.id == target.id).expect("target exists");

        let defenders = assign_defenders(agents, &target.id);
        let rv = raid_value(&agents[merc_index], &target, &defenders, &config.economic);

        let theta = agents[king_index].bribe_threshold;
        let mut resolved_by_bribe = false;
        if (theta as f64) >= rv {
            if agents[king_index].currency >= theta {
                {
                    let (king, merc) = two_mut(agents, king_index, merc_index);
                    king.add_currency(-(theta as i64));
                    merc.add_currency(theta as i64);
                    apply_bribe_leakage(king, config.economic.bribe_leakage);
                }
                let mut event = Event::new(tick_num, EventKind::BribeAccept);
                event.king = Some(target.id.clone());
                event.merc = Some(merc_id.clone());
                event.amount = Some(theta);
                event.threshold = Some(theta);
                event.rv = Some(rv);
                events.push(event);
                resolved_by_bribe = true;
            } else {
                let mut event = Event::new(tick_num, EventKind::BribeInsufficientFunds);
                event.king = Some(target.id.clone());
                event.merc = Some(merc_id.clone());
                event.threshold = Some(theta);
                event.rv = Some(rv);
                events.push(event);
            }
        }

        if resolved_by_bribe {
            continue;
        }

        if defenders.is_empty() {
            {
                let (king, merc) = two_mut(agents, king_index, merc_index);
                apply_mirrored_losses(king, merc, &config.economic);
            }
            let mut event = Event::new(tick_num, EventKind::UnopposedRaid);
            event.king = Some(target.id.clone());
            event.merc = Some(merc_id.clone());
            event.rv = Some(rv);
            events.push(event);
        } else {
            let knight_id = defenders[0].id.clone();
            let knight_index = agents.iter().position(|a| a.id == knight_id).expect("defender exists");

            let p = p_knight_win(&agents[knight_index], &agents[merc_index], &config.economic);
            let stake = stake_amount(&agents[knight_index], &agents[merc_index], &config.economic);
            let knight_wins = resolve_knight_wins(p, &agents[knight_index].id, &agents[merc_index].id);

            if knight_wins {
                {
                    let (merc, knight) = two_mut(agents, merc_index, knight_index);
                    merc.add_currency(-(stake as i64));
                    knight.add_currency(stake as i64);
                    apply_bounty(knight, merc, config.economic.bounty_frac);
                }
                let mut event = Event::new(tick_num, EventKind::DefendWin);
                event.king = Some(target.id.clone());
                event.knight = Some(knight_id);
                event.merc = Some(merc_id.clone());
                event.stake = Some(stake);
                event.p_knight = Some(p);
                events.push(event);
            } else {
                {
                    let (knight, merc) = two_mut(agents, knight_index, merc_index);
                    knight.add_currency(-(stake as i64));
                    merc.add_currency(stake as i64);
                }
                {
                    let (king, merc) = two_mut(agents, king_index, merc_index);
                    apply_mirrored_losses(king, merc, &config.economic);
                }
                let mut event = Event::new(tick_num, EventKind::DefendLoss);
                event.king = Some(target.id.clone());
                event.knight = Some(knight_id);
                event.merc = Some(merc_id.clone());
                event.stake = Some(stake);
                event.p_knight = Some(p);
                events.push(event);
            }
        }
    }
}

/// Employer's employed knights first (id order), then the strongest free
/// knight by key `-(defend + sense + adapt)` (ascending id tie-break), if
/// any exists — appended regardless of whether any employed knights were
/// found.
fn assign_defenders(agents: &[Agent], king_id: &str) -> Vec<Agent> {
    let mut employed: Vec<Agent> = agents
        .iter()
        .filter(|a| a.role == Role::Knight && a.employer.as_deref() == Some(king_id))
        .cloned()
        .collect();
    employed.sort_by(|a, b| a.id.cmp(&b.id));

    let mut free: Vec<Agent> = agents
        .iter()
        .filter(|a| a.role == Role::Knight && a.employer.is_none())
        .cloned()
        .collect();
    free.sort_by(|a, b| {
        let score = |k: &Agent| -(k.wealth.defend as i64 + k.wealth.sense as i64 + k.wealth.adapt as i64);
        score(a).cmp(&score(b)).then_with(|| a.id.cmp(&b.id))
    });

    if let Some(best) = free.into_iter().next() {
        employed.push(best);
    }
    employed
}

fn phase5_metrics(agents: &[Agent], events: &[Event]) -> TickMetrics {
    let wealth_total: u64 = agents.iter().map(|a| u64::from(a.wealth_total())).sum();
    let currency_total: u64 = agents.iter().map(|a| a.currency).sum();
    let copy_score_mean = if agents.is_empty() {
        0.0
    } else {
        agents.iter().map(|a| f64::from(a.wealth.copy)).sum::<f64>() / agents.len() as f64
    };

    let mut bribes_paid = 0;
    let mut bribes_accepted = 0;
    let mut raids_attempted = 0;
    let mut raids_won_by_merc = 0;
    let mut raids_won_by_knight = 0;

    for event in events {
        match event.kind {
            Some(EventKind::BribeAccept) => {
                bribes_paid += 1;
                bribes_accepted += 1;
            }
            Some(EventKind::BribeInsufficientFunds) => bribes_paid += 1,
            Some(EventKind::DefendWin) => {
                raids_attempted += 1;
                raids_won_by_knight += 1;
            }
            Some(EventKind::DefendLoss) => {
                raids_attempted += 1;
                raids_won_by_merc += 1;
            }
            Some(EventKind::UnopposedRaid) => {
                raids_attempted += 1;
                raids_won_by_merc += 1;
            }
            _ => {}
        }
    }

    TickMetrics {
        entropy: 0.0,
        compression_ratio: 0.0,
        copy_score_mean,
        wealth_total,
        currency_total,
        bribes_paid,
        bribes_accepted,
        raids_attempted,
        raids_won_by_merc,
        raids_won_by_knight,
    }
}

fn phase6_snapshot(agents: &[Agent]) -> Vec<AgentSnapshot> {
    let mut sorted: Vec<&Agent> = agents.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted.into_iter().map(AgentSnapshot::from_agent).collect()
}

/// Borrow two distinct indices of `slice` mutably at once.
fn two_mut<T>(slice: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    assert_ne!(i, j, "two_mut requires distinct indices");
    if i < j {
        let (left, right) = slice.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn engine(seed: u64, n: usize) -> EconomicEngine {
        let mut rng = StdRng::seed_from_u64(seed);
        let tape_ids: Vec<usize> = (0..n).collect();
        let config = Config::default();
        EconomicEngine::new(&tape_ids, config, &mut rng).unwrap()
    }

    #[test]
    fn process_tick_preserves_total_currency_modulo_trade_investment() {
        let mut eng = engine(1, 40);
        let before: u64 = eng.registry().total_currency();
        let result = eng.process_tick(1, None);
        assert_eq!(result.tick_num, 1);
        let invested: u64 = result
            .events
            .iter()
            .filter(|e| e.kind == Some(EventKind::Trade))
            .filter_map(|e| e.invest)
            .sum();
        let created_value: u64 = 0; // trade creates wealth, not currency
        let _ = created_value;
        assert!(eng.registry().total_currency() <= before);
        let _ = invested;
    }

    #[test]
    fn identical_pre_state_across_ticks_is_a_cache_hit() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut cfg = Config::default();
        cfg.trait_emergence.enabled = false;
        cfg.registry.role_ratios = crate::config::RoleRatios {
            king: 0.0,
            knight: 0.0,
            mercenary: 1.0,
        };
        let tape_ids: Vec<usize> = (0..10).collect();
        let mut eng = EconomicEngine::new(&tape_ids, cfg, &mut rng).unwrap();

        // No kings means phases 2-4 are no-ops and trait emergence is off, so
        // the agent state never changes tick to tick, and the cache key
        // (which omits tick_num) is identical across calls.
        eng.process_tick(1, None);
        eng.process_tick(2, None);
        assert_eq!(eng.cache_stats().misses, 1);
        assert_eq!(eng.cache_stats().hits, 1);
    }

    #[test]
    fn no_kings_skips_phase_four_without_panicking() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut cfg = Config::default();
        cfg.registry.role_ratios = crate::config::RoleRatios {
            king: 0.0,
            knight: 0.0,
            mercenary: 1.0,
        };
        let tape_ids: Vec<usize> = (0..10).collect();
        let mut eng = EconomicEngine::new(&tape_ids, cfg, &mut rng).unwrap();
        let result = eng.process_tick(1, None);
        assert!(result.events.iter().all(|e| e.kind != Some(EventKind::UnopposedRaid)));
    }

    #[test]
    fn substrate_analytics_override_cached_metrics() {
        let mut eng = engine(3, 20);
        let analytics = SubstrateAnalytics {
            entropy: 4.2,
            compression_ratio: 0.5,
        };
        let result = eng.process_tick(1, Some(analytics));
        assert_eq!(result.metrics.entropy, 4.2);
        assert_eq!(result.metrics.compression_ratio, 0.5);
    }

    #[test]
    fn two_mut_returns_distinct_references_regardless_of_order() {
        let mut v = vec![1, 2, 3];
        {
            let (a, b) = two_mut(&mut v, 0, 2);
            *a += 10;
            *b += 100;
        }
        assert_eq!(v, vec![11, 2, 103]);
        {
            let (a, b) = two_mut(&mut v, 2, 0);
            *a += 1;
            *b += 1;
        }
        assert_eq!(v, vec![12, 2, 104]);
    }
}
