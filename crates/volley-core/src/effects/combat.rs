//! Applying damage and status records to the world.
//!
//! [`CombatConsumer`] reads [`EffectRecord`]s from every trigger pass that
//! feeds it. Records are applied in producer registration order, then segment
//! order; within a tick, damage is additive, so the order only matters for
//! which status instance is appended first.
//!
//! Records whose target has despawned, or lacks the component the effect acts
//! on, are counted as misses and skipped. With [`CombatConsumer::reap_dead`]
//! set, entities brought to zero health are despawned once every channel has
//! been read.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{EffectRecord, ResolvedEffect, StatusId};
use crate::channel::EffectChannel;
use crate::consumer::{ChannelLedger, CompletionSet, ConsumeReport, EffectConsumer};
use crate::error::{ChannelError, DispatchResult};
use crate::job::JobHandle;
use crate::{EntityId, QueryDesc, World};

/// Hit points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    /// Remaining hit points, never below zero.
    pub current: f32,
    /// Upper bound.
    pub max: f32,
}

impl Health {
    /// Full health.
    #[must_use]
    pub const fn full(max: f32) -> Self {
        Self { current: max, max }
    }

    /// Returns true while hit points remain.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    /// Removes `amount` hit points, clamping at zero.
    pub fn take(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

/// A status instance on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedStatus {
    /// Which status.
    pub status: StatusId,
    /// Ticks left.
    pub remaining_ticks: u32,
    /// Entity that applied it.
    pub source: EntityId,
    /// Where the source stood.
    pub origin: Vec2,
}

/// Statuses currently on an entity, in application order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveStatuses(pub Vec<AppliedStatus>);

impl ActiveStatuses {
    /// Returns true if any instance of `status` is present.
    #[must_use]
    pub fn has(&self, status: StatusId) -> bool {
        self.0.iter().any(|s| s.status == status)
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no statuses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Running totals of a [`CombatConsumer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatStats {
    /// Damage records applied.
    pub damage_applied: usize,
    /// Total hit points removed (before clamping).
    pub damage_dealt: f32,
    /// Status records applied.
    pub statuses_applied: usize,
    /// Records whose target was gone or lacked the affected component.
    pub missed: usize,
    /// Entities despawned after reaching zero health.
    pub reaped: usize,
}

// =============================================================================
// Consumer
// =============================================================================

/// Applies [`EffectRecord`]s to [`Health`] and [`ActiveStatuses`].
pub struct CombatConsumer {
    enabled: bool,
    completions: CompletionSet<EffectRecord>,
    ledger: ChannelLedger,
    stats: CombatStats,
    reap_dead: bool,
    killed: Vec<EntityId>,
}

impl CombatConsumer {
    /// Creates an enabled consumer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            completions: CompletionSet::new(),
            ledger: ChannelLedger::default(),
            stats: CombatStats::default(),
            reap_dead: false,
            killed: Vec::new(),
        }
    }

    /// Despawns entities whose health reaches zero during a consume phase.
    #[must_use]
    pub fn reap_dead(mut self, reap: bool) -> Self {
        self.reap_dead = reap;
        self
    }

    /// Enables or disables the consumer.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Channel allocation counters.
    #[must_use]
    pub fn ledger(&self) -> ChannelLedger {
        self.ledger
    }

    /// Totals since creation.
    #[must_use]
    pub fn stats(&self) -> CombatStats {
        self.stats
    }

    /// Producers registered and not yet joined.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.completions.pending()
    }

    fn apply(&mut self, world: &mut World, record: &EffectRecord) -> bool {
        match record.effect {
            ResolvedEffect::Damage { amount } => {
                let Some(health) = world.get_mut::<Health>(record.target) else {
                    return false;
                };
                let was_alive = health.is_alive();
                health.take(amount);
                if was_alive && !health.is_alive() {
                    self.killed.push(record.target);
                }
                self.stats.damage_applied += 1;
                self.stats.damage_dealt += amount;
            }
            ResolvedEffect::Status {
                status,
                duration_ticks,
                origin,
            } => {
                let Some(statuses) = world.get_mut::<ActiveStatuses>(record.target) else {
                    return false;
                };
                statuses.0.push(AppliedStatus {
                    status,
                    remaining_ticks: duration_ticks,
                    source: record.source,
                    origin,
                });
                self.stats.statuses_applied += 1;
            }
        }
        true
    }

    /// Applies every record of a sealed channel, then disposes it.
    fn read(
        &mut self,
        world: &mut World,
        channel: EffectChannel<EffectRecord>,
    ) -> Result<usize, ChannelError> {
        let outcome = match channel.iter() {
            Ok(records) => {
                let mut applied = 0;
                for record in records {
                    if self.apply(world, record) {
                        applied += 1;
                    } else {
                        tracing::trace!(
                            target_entity = %record.target,
                            "effect target missing"
                        );
                        self.stats.missed += 1;
                    }
                }
                Ok(applied)
            }
            Err(err) => Err(err),
        };
        self.ledger.dispose(channel);
        outcome
    }
}

impl Default for CombatConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectConsumer<EffectRecord> for CombatConsumer {
    fn should_run(&self, world: &World) -> bool {
        self.enabled && !world.query(&QueryDesc::new().with::<Health>()).is_empty()
    }

    fn allocate_channel(&mut self, batch_count: usize) -> EffectChannel<EffectRecord> {
        self.ledger.allocate(batch_count)
    }

    fn register_completion(&mut self, handle: JobHandle<EffectRecord>) {
        self.completions.register(handle);
    }

    fn consume(&mut self, world: &mut World) -> DispatchResult<ConsumeReport> {
        let producers = self.completions.pending();
        let (completed, joined) = self.completions.join();
        for _ in completed.len()..producers {
            self.ledger.record_disposed();
        }

        let mut report = ConsumeReport::default();
        let mut result = joined;
        for done in completed {
            report.triggered += done.stats;
            report.channels += 1;
            match self.read(world, done.channel) {
                Ok(applied) => report.records += applied,
                Err(err) => result = result.and(Err(err.into())),
            }
        }

        let killed = std::mem::take(&mut self.killed);
        if self.reap_dead {
            for id in killed {
                match world.despawn(id) {
                    Ok(()) => self.stats.reaped += 1,
                    Err(err) => result = result.and(Err(err.into())),
                }
            }
        }

        tracing::debug!(
            channels = report.channels,
            records = report.records,
            missed = self.stats.missed,
            "applied combat effects"
        );
        result.map(|()| report)
    }
}

impl fmt::Debug for CombatConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombatConsumer")
            .field("enabled", &self.enabled)
            .field("completions", &self.completions)
            .field("ledger", &self.ledger)
            .field("stats", &self.stats)
            .field("reap_dead", &self.reap_dead)
            .finish()
    }
}
