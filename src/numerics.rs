//! Pure economic calculation functions. Every function here is
//! deterministic and side-effect-free except the `apply_*` family, which
//! mutate the `Agent`s passed to them and are the only place wealth or
//! currency moves between agents.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use thiserror::Error;

use crate::config::EconomicConfig;
use crate::models::{Agent, TRAIT_NAMES};

/// Errors from numerics functions that have no sensible total result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NumericsError {
    /// `pick_target_king` was called with no kings available.
    #[error("no kings available to target")]
    NoKings,
}

/// Logistic sigmoid. Saturates to `0.0`/`1.0` rather than overflow for
/// extreme inputs (`exp` on `f64` already saturates to `inf`, which divides
/// out cleanly; no special-casing needed beyond what IEEE 754 gives us).
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Clamp `value` into `[min_val, max_val]`.
pub fn clamp(value: f64, min_val: f64, max_val: f64) -> f64 {
    value.max(min_val).min(max_val)
}

/// Total wealth scaled by the agent's role exposure factor.
pub fn wealth_exposed(agent: &Agent, cfg: &EconomicConfig) -> f64 {
    let factor = cfg
        .exposure_factors
        .get(&agent.role.to_string())
        .copied()
        .unwrap_or(1.0);
    f64::from(agent.wealth_total()) * factor
}

/// A king's defensive projection from a set of assigned knights against a
/// given number of attackers. `attackers <= 0` is treated as `1`.
pub fn king_defend_projection(knights: &[Agent], attackers: i64) -> f64 {
    let attackers = if attackers <= 0 { 1 } else { attackers };
    let score: f64 = knights
        .iter()
        .map(|k| f64::from(k.wealth.defend) + 0.5 * f64::from(k.wealth.sense) + 0.5 * f64::from(k.wealth.adapt))
        .sum();
    score * (1.0_f64).min(knights.len() as f64 / attackers as f64)
}

/// Raid value a mercenary perceives in raiding `king`, net of the king's
/// projected defense and gross of the king's exposed wealth.
pub fn raid_value(merc: &Agent, king: &Agent, knights: &[Agent], cfg: &EconomicConfig) -> f64 {
    let kd = king_defend_projection(knights, 1);
    let exposed = wealth_exposed(king, cfg);
    let w = &cfg.raid_value_weights;

    let value = w.alpha_raid * f64::from(merc.wealth.raid)
        + w.beta_sense_adapt * f64::from(merc.wealth.sense + merc.wealth.adapt)
        - w.gamma_king_defend * kd
        + w.delta_king_exposed * exposed;

    value.max(0.0)
}

/// Probability that `knight` wins a defend contest against `merc`.
pub fn p_knight_win(knight: &Agent, merc: &Agent, cfg: &EconomicConfig) -> f64 {
    let d = &cfg.defend_resolution;

    let knight_traits = f64::from(knight.wealth.defend + knight.wealth.sense + knight.wealth.adapt);
    let merc_traits = f64::from(merc.wealth.raid + merc.wealth.sense + merc.wealth.adapt);
    let trait_delta = knight_traits - merc_traits;

    let mut raw = d.base_knight_winrate + (sigmoid(d.trait_advantage_weight * trait_delta) - 0.5);
    if knight.employer.is_some() {
        raw += d.employment_bonus;
    }

    clamp(raw, d.clamp_min, d.clamp_max)
}

/// Currency staked by both sides of a defend contest.
pub fn stake_amount(knight: &Agent, merc: &Agent, cfg: &EconomicConfig) -> u64 {
    let combined = knight.currency + merc.currency;
    (cfg.defend_resolution.stake_currency_frac * combined as f64) as u64
}

/// Deterministically resolve a defend contest: `p > 0.5` favors the knight,
/// `p < 0.5` favors the mercenary, and an exact tie is broken
/// lexicographically by id (knight wins iff its id sorts first).
pub fn resolve_knight_wins(p: f64, knight_id: &str, merc_id: &str) -> bool {
    if p > 0.5 {
        true
    } else if p < 0.5 {
        false
    } else {
        knight_id < merc_id
    }
}

/// Scale every trait of `king` by `1 - leakage_frac`, in place.
pub fn apply_bribe_leakage(king: &mut Agent, leakage_frac: f64) {
    king.wealth.scale(1.0 - leakage_frac);
}

/// Transfer a fraction of `king`'s currency and, per trait, a fraction of
/// its wealth, to `merc`. Used when a raid succeeds against a king
/// (unopposed or after losing a defend contest).
pub fn apply_mirrored_losses(king: &mut Agent, merc: &mut Agent, cfg: &EconomicConfig) {
    let failed = &cfg.on_failed_bribe;

    let currency_loss = (king.currency as f64 * failed.king_currency_loss_frac) as i64;
    king.add_currency(-currency_loss);
    merc.add_currency(currency_loss);

    for &trait_name in TRAIT_NAMES.iter() {
        let value = king.wealth.get(trait_name).unwrap_or(0);
        let loss = (f64::from(value) * failed.king_wealth_loss_frac) as i64;
        if loss > 0 {
            king.wealth.add(trait_name, -loss);
            merc.wealth.add(trait_name, loss);
        }
    }
}

/// Transfer a bounty fraction of `merc`'s `raid` and `adapt` traits to
/// `knight`. Used after a knight wins a defend contest.
pub fn apply_bounty(knight: &mut Agent, merc: &mut Agent, bounty_frac: f64) {
    for trait_name in ["raid", "adapt"] {
        let value = merc.wealth.get(trait_name).unwrap_or(0);
        let bounty = (f64::from(value) * bounty_frac) as i64;
        if bounty > 0 {
            merc.wealth.add(trait_name, -bounty);
            knight.wealth.add(trait_name, bounty);
        }
    }
}

/// Execute a trade for `king`: deduct `invest_per_tick` currency and add
/// the configured wealth distribution, provided the king can afford it.
/// Returns the wealth units created, or `0` if funds were insufficient
/// (in which case `king` is left untouched).
pub fn apply_trade(king: &mut Agent, cfg: &EconomicConfig) -> u32 {
    let invest = cfg.trade.invest_per_tick;
    if king.currency < invest {
        return 0;
    }
    king.add_currency(-(invest as i64));
    for (trait_name, amount) in cfg.trade.distribution.iter() {
        king.wealth.add(trait_name, *amount as i64);
    }
    cfg.trade.created_wealth_units
}

/// The king with the highest exposed wealth, tie-broken by ascending id.
pub fn pick_target_king<'a>(kings: &'a [Agent], cfg: &EconomicConfig) -> Result<&'a Agent, NumericsError> {
    kings
        .iter()
        .min_by(|a, b| {
            let exp_a = wealth_exposed(a, cfg);
            let exp_b = wealth_exposed(b, cfg);
            exp_b
                .partial_cmp(&exp_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
        .ok_or(NumericsError::NoKings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, WealthTraits};

    fn agent(id: &str, role: Role, currency: u64, wealth: WealthTraits) -> Agent {
        Agent {
            id: id.to_string(),
            tape_id: 0,
            role,
            currency,
            wealth,
            employer: None,
            retainer_fee: 0,
            bribe_threshold: 0,
            alive: true,
        }
    }

    #[test]
    fn sigmoid_at_zero_is_one_half() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn clamp_restricts_to_range() {
        assert_eq!(clamp(10.0, 0.0, 5.0), 5.0);
        assert_eq!(clamp(-10.0, 0.0, 5.0), 0.0);
        assert_eq!(clamp(3.0, 0.0, 5.0), 3.0);
    }

    #[test]
    fn trade_scenario_matches_expected_numbers() {
        let cfg = EconomicConfig::default();
        let mut king = agent(
            "K-01",
            Role::King,
            500,
            WealthTraits {
                defend: 10,
                trade: 8,
                ..Default::default()
            },
        );
        let created = apply_trade(&mut king, &cfg);
        assert_eq!(king.currency, 400);
        assert_eq!(king.wealth.defend, 13);
        assert_eq!(king.wealth.trade, 10);
        assert_eq!(created, 5);
    }

    #[test]
    fn trade_with_insufficient_funds_is_identity() {
        let cfg = EconomicConfig::default();
        let mut king = agent("K-01", Role::King, 50, WealthTraits::default());
        let before = king.clone();
        let created = apply_trade(&mut king, &cfg);
        assert_eq!(created, 0);
        assert_eq!(king.currency, before.currency);
        assert_eq!(king.wealth, before.wealth);
    }

    #[test]
    fn bribe_accept_scenario_matches_expected_numbers() {
        let cfg = EconomicConfig::default();
        let king = agent(
            "K-01",
            Role::King,
            2000,
            WealthTraits {
                compute: 50,
                ..Default::default()
            },
        );
        let merc = agent(
            "M-01",
            Role::Mercenary,
            50,
            WealthTraits {
                raid: 3,
                sense: 3,
                adapt: 3,
                ..Default::default()
            },
        );
        let rv = raid_value(&merc, &king, &[], &cfg);
        assert!((rv - 24.5).abs() < 1e-9);
    }

    #[test]
    fn apply_bribe_leakage_zero_is_identity() {
        let mut king = agent(
            "K-01",
            Role::King,
            0,
            WealthTraits {
                compute: 10,
                ..Default::default()
            },
        );
        apply_bribe_leakage(&mut king, 0.0);
        assert_eq!(king.wealth.compute, 10);
    }

    #[test]
    fn apply_bribe_leakage_scales_and_floors() {
        let mut king = agent(
            "K-01",
            Role::King,
            0,
            WealthTraits {
                compute: 50,
                ..Default::default()
            },
        );
        apply_bribe_leakage(&mut king, 0.05);
        assert_eq!(king.wealth.compute, 47);
    }

    #[test]
    fn mirrored_losses_conserve_currency_and_traits() {
        let cfg = EconomicConfig::default();
        let mut king = agent(
            "K-01",
            Role::King,
            1000,
            WealthTraits {
                compute: 20,
                ..Default::default()
            },
        );
        let mut merc = agent("M-01", Role::Mercenary, 0, WealthTraits::default());
        apply_mirrored_losses(&mut king, &mut merc, &cfg);
        assert_eq!(king.currency + merc.currency, 1000);
        assert_eq!(king.wealth.compute + merc.wealth.compute, 20);
    }

    #[test]
    fn defend_tie_break_scenario() {
        assert!(!resolve_knight_wins(0.5, "N-01", "M-01"));
        assert!(resolve_knight_wins(0.5, "M-01", "N-01"));
    }

    #[test]
    fn pick_target_king_errors_on_empty() {
        let cfg = EconomicConfig::default();
        assert_eq!(pick_target_king(&[], &cfg), Err(NumericsError::NoKings));
    }

    #[test]
    fn pick_target_king_prefers_highest_exposed_wealth() {
        let cfg = EconomicConfig::default();
        let poor = agent("K-02", Role::King, 0, WealthTraits::default());
        let rich = agent(
            "K-01",
            Role::King,
            0,
            WealthTraits {
                compute: 100,
                ..Default::default()
            },
        );
        let kings = vec![poor, rich.clone()];
        let target = pick_target_king(&kings, &cfg).unwrap();
        assert_eq!(target.id, rich.id);
    }
}
