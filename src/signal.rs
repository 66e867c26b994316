//! Routes economic events to fixed channels, enforces per-channel refractory
//! cool-downs, and optionally queues/coalesces events raised while a channel
//! is cooling down.
//!
//! The signal processor is advisory: the engine's own event generation
//! (`TickResult.events`) proceeds whether or not a consumer drives this
//! processor. It exists for consumers that want to suppress oscillatory
//! storms of, say, repeated raids against the same king.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::collections::HashMap;

use crate::config::RefractoryConfig;
use crate::models::{Event, EventKind};

/// The fixed set of signal channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Unopposed raids.
    Raid,
    /// Defend-win/defend-loss contests.
    Defend,
    /// Bribe accept/insufficient-funds.
    Bribe,
    /// Trades.
    Trade,
    /// Retainer payments.
    Retainer,
    /// Trait-emergence drips.
    TraitDrip,
}

const CHANNELS: [Channel; 6] = [
    Channel::Raid,
    Channel::Defend,
    Channel::Bribe,
    Channel::Trade,
    Channel::Retainer,
    Channel::TraitDrip,
];

fn channel_for(kind: EventKind) -> Channel {
    match kind {
        EventKind::UnopposedRaid => Channel::Raid,
        EventKind::DefendWin | EventKind::DefendLoss => Channel::Defend,
        EventKind::BribeAccept | EventKind::BribeInsufficientFunds => Channel::Bribe,
        EventKind::Trade => Channel::Trade,
        EventKind::Retainer => Channel::Retainer,
        EventKind::TraitDrip => Channel::TraitDrip,
    }
}

/// Fixed channel priority, descending (higher emits first on ties).
fn priority_of(channel: Channel) -> u32 {
    match channel {
        Channel::Raid => 100,
        Channel::Defend => 100,
        Channel::Bribe => 90,
        Channel::Retainer => 60,
        Channel::Trade => 50,
        Channel::TraitDrip => 10,
    }
}

/// Retainer and trait-drip have a fixed refractory period of zero and are
/// not configurable; the remaining four read from [`RefractoryConfig`].
fn period_of(channel: Channel, cfg: &RefractoryConfig) -> i64 {
    match channel {
        Channel::Raid => cfg.raid,
        Channel::Defend => cfg.defend,
        Channel::Bribe => cfg.bribe,
        Channel::Trade => cfg.trade,
        Channel::Retainer => 0,
        Channel::TraitDrip => 0,
    }
}

/// One emitted signal.
#[derive(Clone, Debug)]
pub struct Signal {
    /// Channel the underlying event mapped to.
    pub channel: Channel,
    /// Fixed channel priority (higher sorts first).
    pub priority: u32,
    /// The event that triggered this signal.
    pub payload: Event,
    /// Tick at which the signal was emitted.
    pub timestamp: u64,
}

struct ChannelState {
    period: i64,
    expiry: Option<i64>,
    queue: Vec<(CoalesceKey, Event)>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CoalesceKey {
    kind: EventKind,
    king: Option<String>,
    knight: Option<String>,
    merc: Option<String>,
}

impl CoalesceKey {
    fn of(event: &Event) -> Option<Self> {
        event.kind.map(|kind| CoalesceKey {
            kind,
            king: event.king.clone(),
            knight: event.knight.clone(),
            merc: event.merc.clone(),
        })
    }
}

/// Routes events to channels and enforces refractory cool-downs. Construct
/// once per simulation run and drive once per tick: call
/// `update_refractory(tick)` then `process_events(tick, &events)`.
pub struct SignalProcessor {
    queue_events: bool,
    channels: HashMap<Channel, ChannelState>,
}

impl SignalProcessor {
    /// Build a processor from the refractory configuration.
    pub fn new(cfg: &RefractoryConfig) -> Self {
        let channels = CHANNELS
            .iter()
            .map(|&channel| {
                (
                    channel,
                    ChannelState {
                        period: period_of(channel, cfg),
                        expiry: None,
                        queue: Vec::new(),
                    },
                )
            })
            .collect();
        SignalProcessor {
            queue_events: cfg.queue_events,
            channels,
        }
    }

    fn is_active(&self, channel: Channel, tick: i64) -> bool {
        match self.channels[&channel].expiry {
            Some(expiry) => tick >= expiry,
            None => true,
        }
    }

    /// Route `events` (all from tick `tick`) to their channels, emitting a
    /// [`Signal`] for every event whose channel is not currently in
    /// refractory, queuing the rest (or dropping them, if queuing is
    /// disabled). Returns the emitted signals sorted by priority descending.
    pub fn process_events(&mut self, tick: u64, events: &[Event]) -> Vec<Signal> {
        let tick_i = tick as i64;
        let mut emitted = Vec::new();

        for event in events {
            let Some(kind) = event.kind else { continue };
            let channel = channel_for(kind);

            if self.is_active(channel, tick_i) {
                emitted.push(Signal {
                    channel,
                    priority: priority_of(channel),
                    payload: event.clone(),
                    timestamp: tick,
                });
                let state = self.channels.get_mut(&channel).expect("all channels present");
                if state.period > 0 {
                    state.expiry = Some(tick_i + state.period);
                }
            } else if self.queue_events {
                if let Some(key) = CoalesceKey::of(event) {
                    let state = self.channels.get_mut(&channel).expect("all channels present");
                    if let Some(slot) = state.queue.iter_mut().find(|(k, _)| *k == key) {
                        slot.1 = event.clone();
                    } else {
                        state.queue.push((key, event.clone()));
                    }
                }
            }
        }

        emitted.sort_by(|a, b| b.priority.cmp(&a.priority));
        emitted
    }

    /// Clear refractory state for every channel whose cool-down has expired
    /// as of `tick`, draining and coalescing any queued events and emitting
    /// them as signals, re-arming the channel's refractory from `tick`.
    pub fn update_refractory(&mut self, tick: u64) -> Vec<Signal> {
        let tick_i = tick as i64;
        let mut emitted = Vec::new();

        for &channel in CHANNELS.iter() {
            let expired = matches!(self.channels[&channel].expiry, Some(expiry) if expiry <= tick_i);
            if !expired {
                continue;
            }
            let state = self.channels.get_mut(&channel).expect("all channels present");
            state.expiry = None;
            if state.queue.is_empty() {
                continue;
            }
            let drained: Vec<(CoalesceKey, Event)> = state.queue.drain(..).collect();
            for (_, event) in &drained {
                emitted.push(Signal {
                    channel,
                    priority: priority_of(channel),
                    payload: event.clone(),
                    timestamp: tick,
                });
            }
            if state.period > 0 {
                state.expiry = Some(tick_i + state.period);
            }
        }

        emitted.sort_by(|a, b| b.priority.cmp(&a.priority));
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, tick: u64) -> Event {
        Event::new(tick, kind)
    }

    #[test]
    fn first_event_on_a_channel_always_emits() {
        let cfg = RefractoryConfig::default();
        let mut sp = SignalProcessor::new(&cfg);
        let signals = sp.process_events(0, &[event(EventKind::UnopposedRaid, 0)]);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].channel, Channel::Raid);
    }

    #[test]
    fn second_event_during_refractory_is_queued_not_emitted() {
        let cfg = RefractoryConfig::default();
        let mut sp = SignalProcessor::new(&cfg);
        sp.process_events(0, &[event(EventKind::UnopposedRaid, 0)]);
        let signals = sp.process_events(1, &[event(EventKind::UnopposedRaid, 1)]);
        assert!(signals.is_empty());
    }

    #[test]
    fn queued_event_emits_once_refractory_clears() {
        let cfg = RefractoryConfig::default();
        let mut sp = SignalProcessor::new(&cfg);
        sp.process_events(0, &[event(EventKind::UnopposedRaid, 0)]);
        sp.process_events(1, &[event(EventKind::UnopposedRaid, 1)]);
        // raid period defaults to 2, so tick 2 clears the refractory set at tick 0.
        let signals = sp.update_refractory(2);
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn disabling_queueing_drops_events_during_refractory() {
        let mut cfg = RefractoryConfig::default();
        cfg.queue_events = false;
        let mut sp = SignalProcessor::new(&cfg);
        sp.process_events(0, &[event(EventKind::UnopposedRaid, 0)]);
        sp.process_events(1, &[event(EventKind::UnopposedRaid, 1)]);
        let signals = sp.update_refractory(2);
        assert!(signals.is_empty());
    }

    #[test]
    fn zero_period_channels_never_enter_refractory() {
        let cfg = RefractoryConfig::default();
        let mut sp = SignalProcessor::new(&cfg);
        let first = sp.process_events(0, &[event(EventKind::Retainer, 0)]);
        let second = sp.process_events(1, &[event(EventKind::Retainer, 1)]);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn emitted_signals_sort_by_priority_descending() {
        let cfg = RefractoryConfig::default();
        let mut sp = SignalProcessor::new(&cfg);
        let signals = sp.process_events(
            0,
            &[event(EventKind::TraitDrip, 0), event(EventKind::UnopposedRaid, 0)],
        );
        assert_eq!(signals[0].channel, Channel::Raid);
        assert_eq!(signals[1].channel, Channel::TraitDrip);
    }
}
