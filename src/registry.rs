//! Owns the set of economic agents: creation from substrate (or trace-mode)
//! tape ids, role assignment, knight employment, role mutation, and the
//! id/tape-id/role lookups the engine needs every tick.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::collections::HashMap;

use rand::Rng;
use thiserror::Error;

use crate::config::RegistryConfig;
use crate::models::{Agent, Role, WealthTraits, TRAIT_NAMES};

/// Errors constructing or driving an [`AgentRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// `from_tape_ids` was called with an empty tape-id set.
    #[error("cannot build a registry from an empty tape-id set")]
    EmptyTapeIds,
}

/// Owns every [`Agent`] and the indices the engine's phases need.
pub struct AgentRegistry {
    agents: Vec<Agent>,
    by_id: HashMap<String, usize>,
    by_tape: HashMap<usize, usize>,
}

impl AgentRegistry {
    /// Build a fresh registry from an ordered set of tape ids (substrate
    /// population indices, or externally supplied trace tape ids). Draws
    /// role, currency, and wealth for every agent from `cfg` via `rng`.
    pub fn from_tape_ids<R: Rng>(
        tape_ids: &[usize],
        cfg: &RegistryConfig,
        rng: &mut R,
    ) -> Result<Self, RegistryError> {
        let n = tape_ids.len();
        if n == 0 {
            return Err(RegistryError::EmptyTapeIds);
        }

        let n_king = ((n as f64) * cfg.role_ratios.king).floor() as usize;
        let n_knight = ((n as f64) * cfg.role_ratios.knight).floor() as usize;
        let n_merc = n - n_king - n_knight;

        let mut role_seq = Vec::with_capacity(n);
        role_seq.extend(std::iter::repeat(Role::King).take(n_king));
        role_seq.extend(std::iter::repeat(Role::Knight).take(n_knight));
        role_seq.extend(std::iter::repeat(Role::Mercenary).take(n_merc));
        shuffle(&mut role_seq, rng);

        let mut agents = Vec::with_capacity(n);
        let mut by_id = HashMap::with_capacity(n);
        let mut by_tape = HashMap::with_capacity(n);
        let mut next_index: HashMap<Role, usize> = HashMap::new();

        for (tape_id, &role) in tape_ids.iter().zip(role_seq.iter()) {
            let index = next_index.entry(role).or_insert(0);
            *index += 1;
            let id = format!("{}-{:02}", role.id_prefix(), index);

            let stats = match role {
                Role::King => &cfg.king,
                Role::Knight => &cfg.knight,
                Role::Mercenary => &cfg.mercenary,
            };
            let currency = rng.gen_range(stats.currency.min..=stats.currency.max);
            let mut wealth = WealthTraits::default();
            for &trait_name in TRAIT_NAMES.iter() {
                let range = stats
                    .wealth
                    .get(trait_name)
                    .copied()
                    .expect("RoleInitialStats carries a range for every trait name");
                let value = rng.gen_range(range.min..=range.max) as u32;
                wealth.add(trait_name, value as i64);
            }

            let (retainer_fee, bribe_threshold) = match role {
                Role::Knight => (
                    rng.gen_range(cfg.knight_retainer_fee_range.min..=cfg.knight_retainer_fee_range.max),
                    0,
                ),
                Role::King => (
                    0,
                    rng.gen_range(cfg.king_bribe_threshold_range.min..=cfg.king_bribe_threshold_range.max),
                ),
                Role::Mercenary => (0, 0),
            };

            let agent_index = agents.len();
            by_id.insert(id.clone(), agent_index);
            by_tape.insert(*tape_id, agent_index);
            agents.push(Agent {
                id,
                tape_id: *tape_id,
                role,
                currency,
                wealth,
                employer: None,
                retainer_fee,
                bribe_threshold,
                alive: true,
            });
        }

        Ok(AgentRegistry { agents, by_id, by_tape })
    }

    /// Shuffle knights and round-robin assign each to a king as employer.
    /// Leaves every knight unemployed if there are no kings.
    pub fn assign_knight_employers<R: Rng>(&mut self, rng: &mut R) {
        let mut king_ids: Vec<String> = self.kings().iter().map(|a| a.id.clone()).collect();
        if king_ids.is_empty() {
            return;
        }
        king_ids.sort();

        let mut knight_ids: Vec<String> = self.knights().iter().map(|a| a.id.clone()).collect();
        shuffle_strings(&mut knight_ids, rng);

        for (i, knight_id) in knight_ids.iter().enumerate() {
            let employer = king_ids[i % king_ids.len()].clone();
            if let Some(agent) = self.get_mut(knight_id) {
                agent.employer = Some(employer);
            }
        }
    }

    /// For each agent, in id-sorted order, with probability `p` reassign it
    /// to a uniformly chosen *different* role and reset its role-specific
    /// fields (employer, retainer_fee, bribe_threshold) from `cfg`'s ranges.
    /// Returns `(id, old_role, new_role)` for every agent that changed.
    pub fn mutate_roles<R: Rng>(&mut self, p: f64, cfg: &RegistryConfig, rng: &mut R) -> Vec<(String, Role, Role)> {
        let mut ids: Vec<String> = self.agents.iter().map(|a| a.id.clone()).collect();
        ids.sort();

        let mut changes = Vec::new();
        for id in ids {
            if rng.gen::<f64>() >= p {
                continue;
            }
            let old_role = self.get(&id).expect("id from own snapshot exists").role;
            let choices: Vec<Role> = [Role::King, Role::Knight, Role::Mercenary]
                .into_iter()
                .filter(|&r| r != old_role)
                .collect();
            let new_role = choices[rng.gen_range(0..choices.len())];

            let (retainer_fee, bribe_threshold) = match new_role {
                Role::Knight => (rng.gen_range(cfg.knight_retainer_fee_range.min..=cfg.knight_retainer_fee_range.max), 0),
                Role::King => (0, rng.gen_range(cfg.king_bribe_threshold_range.min..=cfg.king_bribe_threshold_range.max)),
                Role::Mercenary => (0, 0),
            };

            if let Some(agent) = self.get_mut(&id) {
                agent.role = new_role;
                agent.employer = None;
                agent.retainer_fee = retainer_fee;
                agent.bribe_threshold = bribe_threshold;
            }
            changes.push((id, old_role, new_role));
        }
        changes
    }

    /// Look up an agent by id.
    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.by_id.get(id).map(|&idx| &self.agents[idx])
    }

    /// Look up an agent mutably by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Agent> {
        if let Some(&idx) = self.by_id.get(id) {
            Some(&mut self.agents[idx])
        } else {
            None
        }
    }

    /// Look up an agent by its substrate/trace tape id.
    pub fn by_tape_id(&self, tape_id: usize) -> Option<&Agent> {
        self.by_tape.get(&tape_id).map(|&idx| &self.agents[idx])
    }

    /// Every agent, in creation order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Every agent, sorted ascending by id.
    pub fn agents_sorted_by_id(&self) -> Vec<&Agent> {
        let mut out: Vec<&Agent> = self.agents.iter().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Agents with the given role, sorted ascending by id.
    pub fn by_role(&self, role: Role) -> Vec<&Agent> {
        let mut out: Vec<&Agent> = self.agents.iter().filter(|a| a.role == role).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// All kings, sorted ascending by id.
    pub fn kings(&self) -> Vec<&Agent> {
        self.by_role(Role::King)
    }

    /// All knights, sorted ascending by id.
    pub fn knights(&self) -> Vec<&Agent> {
        self.by_role(Role::Knight)
    }

    /// All mercenaries, sorted ascending by id.
    pub fn mercenaries(&self) -> Vec<&Agent> {
        self.by_role(Role::Mercenary)
    }

    /// Knights employed by the given king, sorted ascending by id.
    pub fn employed_by(&self, king_id: &str) -> Vec<&Agent> {
        let mut out: Vec<&Agent> = self
            .agents
            .iter()
            .filter(|a| a.role == Role::Knight && a.employer.as_deref() == Some(king_id))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Knights with no employer, sorted ascending by id.
    pub fn free_knights(&self) -> Vec<&Agent> {
        let mut out: Vec<&Agent> = self
            .agents
            .iter()
            .filter(|a| a.role == Role::Knight && a.employer.is_none())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Total currency across every agent.
    pub fn total_currency(&self) -> u64 {
        self.agents.iter().map(|a| a.currency).sum()
    }

    /// Total wealth (sum of all seven traits) across every agent.
    pub fn total_wealth(&self) -> u64 {
        self.agents.iter().map(|a| u64::from(a.wealth_total())).sum()
    }

    /// Replace the full agent set (used by the engine after a tick's pure
    /// computation produces a new state), rebuilding the id/tape indices.
    pub fn replace_agents(&mut self, agents: Vec<Agent>) {
        let mut by_id = HashMap::with_capacity(agents.len());
        let mut by_tape = HashMap::with_capacity(agents.len());
        for (idx, agent) in agents.iter().enumerate() {
            by_id.insert(agent.id.clone(), idx);
            by_tape.insert(agent.tape_id, idx);
        }
        self.agents = agents;
        self.by_id = by_id;
        self.by_tape = by_tape;
    }
}

/// Fisher-Yates shuffle, mirroring `scheduler::shuffle`'s approach but over
/// role values rather than plain indices.
fn shuffle<T, R: Rng>(slice: &mut [T], rng: &mut R) {
    for i in (1..slice.len()).rev() {
        let j = rng.gen_range(0..=i);
        slice.swap(i, j);
    }
}

fn shuffle_strings<R: Rng>(slice: &mut [String], rng: &mut R) {
    shuffle(slice, rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cfg() -> RegistryConfig {
        RegistryConfig::default()
    }

    #[test]
    fn rejects_empty_tape_ids() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            AgentRegistry::from_tape_ids(&[], &cfg(), &mut rng),
            Err(RegistryError::EmptyTapeIds)
        );
    }

    #[test]
    fn assigns_role_counts_matching_ratios() {
        let mut rng = StdRng::seed_from_u64(7);
        let tape_ids: Vec<usize> = (0..100).collect();
        let registry = AgentRegistry::from_tape_ids(&tape_ids, &cfg(), &mut rng).unwrap();
        assert_eq!(registry.kings().len(), 10);
        assert_eq!(registry.knights().len(), 20);
        assert_eq!(registry.mercenaries().len(), 70);
    }

    #[test]
    fn ids_are_zero_padded_and_monotonic_per_role() {
        let mut rng = StdRng::seed_from_u64(3);
        let tape_ids: Vec<usize> = (0..20).collect();
        let registry = AgentRegistry::from_tape_ids(&tape_ids, &cfg(), &mut rng).unwrap();
        let king_ids: Vec<String> = registry.kings().iter().map(|a| a.id.clone()).collect();
        assert_eq!(king_ids[0], "K-01");
    }

    #[test]
    fn employers_are_assigned_round_robin_from_kings() {
        let mut rng = StdRng::seed_from_u64(11);
        let tape_ids: Vec<usize> = (0..20).collect();
        let mut registry = AgentRegistry::from_tape_ids(&tape_ids, &cfg(), &mut rng).unwrap();
        registry.assign_knight_employers(&mut rng);
        for knight in registry.knights() {
            assert!(knight.employer.is_some());
            let employer_id = knight.employer.as_ref().unwrap();
            assert!(registry.get(employer_id).is_some());
        }
    }

    #[test]
    fn no_kings_leaves_knights_unemployed() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut only_knight_cfg = cfg();
        only_knight_cfg.role_ratios = crate::config::RoleRatios {
            king: 0.0,
            knight: 1.0,
            mercenary: 0.0,
        };
        let tape_ids: Vec<usize> = (0..10).collect();
        let mut registry = AgentRegistry::from_tape_ids(&tape_ids, &only_knight_cfg, &mut rng).unwrap();
        registry.assign_knight_employers(&mut rng);
        assert!(registry.knights().iter().all(|k| k.employer.is_none()));
    }

    #[test]
    fn mutate_roles_resets_role_specific_fields() {
        let mut rng = StdRng::seed_from_u64(5);
        let tape_ids: Vec<usize> = (0..20).collect();
        let mut registry = AgentRegistry::from_tape_ids(&tape_ids, &cfg(), &mut rng).unwrap();
        registry.assign_knight_employers(&mut rng);
        let changes = registry.mutate_roles(1.0, &cfg(), &mut rng);
        assert_eq!(changes.len(), 20);
        for (id, old_role, new_role) in &changes {
            assert_ne!(old_role, new_role);
            let agent = registry.get(id).unwrap();
            assert_eq!(agent.role, *new_role);
            assert_eq!(agent.employer, None);
        }
    }

    #[test]
    fn replace_agents_rebuilds_lookup_indices() {
        let mut rng = StdRng::seed_from_u64(9);
        let tape_ids: Vec<usize> = (0..4).collect();
        let mut registry = AgentRegistry::from_tape_ids(&tape_ids, &cfg(), &mut rng).unwrap();
        let mut agents = registry.agents().to_vec();
        agents[0].currency += 1000;
        let id0 = agents[0].id.clone();
        registry.replace_agents(agents);
        assert_eq!(registry.get(&id0).unwrap().currency, registry.agents()[0].currency);
    }
}
