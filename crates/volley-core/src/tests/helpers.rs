//! Test helpers: world builders, seeded populations and instrumented writers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::ability::{Ability, AbilitySequence, AbilityState, Target};
use crate::channel::SegmentWriter;
use crate::effect::{EffectEntry, EffectPayload, EffectSequence};
use crate::effects::{
    ActiveStatuses, CasterStats, DamageEffect, EffectRecord, Health, Position, StatusEffect,
    StatusId,
};
use crate::writer::ContextWriter;
use crate::{Batch, EntityId, QueryDesc, World, WorldConfig};

/// Installs a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// =============================================================================
// Entity Factory Functions
// =============================================================================

/// Builds an ability sequence from states.
pub fn abilities(states: &[AbilityState]) -> AbilitySequence {
    AbilitySequence::new(states.iter().copied().map(Ability::new).collect())
}

/// Spawns a plain target dummy with health and a status list.
pub fn spawn_dummy(world: &mut World, hp: f32) -> EntityId {
    world
        .spawn()
        .with(Health::full(hp))
        .with(ActiveStatuses::default())
        .build()
}

/// Spawns a damage caster with power 1.
pub fn spawn_damage_caster(
    world: &mut World,
    states: &[AbilityState],
    target: Option<EntityId>,
    effects: Vec<EffectEntry<DamageEffect>>,
) -> EntityId {
    world
        .spawn()
        .with(abilities(states))
        .with(Target(target))
        .with(EffectSequence::new(effects))
        .with(CasterStats::default())
        .build()
}

/// Spawns a combatant that carries everything the stock categories read.
pub fn spawn_combatant(
    world: &mut World,
    states: &[AbilityState],
    damage: Vec<EffectEntry<DamageEffect>>,
    status: Vec<EffectEntry<StatusEffect>>,
    position: Vec2,
) -> EntityId {
    world
        .spawn()
        .with(abilities(states))
        .with(Target::none())
        .with(EffectSequence::new(damage))
        .with(EffectSequence::new(status))
        .with(CasterStats::default())
        .with(Position(position))
        .with(Health::full(100.0))
        .with(ActiveStatuses::default())
        .build()
}

/// Points `entity` at `target`.
pub fn set_target(world: &mut World, entity: EntityId, target: Option<EntityId>) {
    if let Some(current) = world.get_mut::<Target>(entity) {
        *current = Target(target);
    }
}

/// Changes one ability slot's state.
pub fn set_ability(world: &mut World, entity: EntityId, slot: usize, state: AbilityState) {
    if let Some(sequence) = world.get_mut::<AbilitySequence>(entity) {
        if let Some(ability) = sequence.0.get_mut(slot) {
            ability.state = state;
        }
    }
}

/// Current hit points, if the entity has health.
pub fn hp(world: &World, entity: EntityId) -> Option<f32> {
    world.get::<Health>(entity).map(|h| h.current)
}

// =============================================================================
// Seeded Populations
// =============================================================================

fn random_state(rng: &mut ChaCha8Rng) -> AbilityState {
    match rng.gen_range(0..3) {
        0 => AbilityState::Inactive,
        1 => AbilityState::Active,
        _ => AbilityState::Cooldown,
    }
}

/// Builds a world of `count` combatants whose abilities, effects, stats and
/// targets are drawn from `seed`.
///
/// Some effect entries deliberately reference ability slots that do not exist.
pub fn seeded_world(seed: u64, count: usize, batch_capacity: usize) -> (World, Vec<EntityId>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut world = World::new(WorldConfig { batch_capacity });
    let mut ids = Vec::with_capacity(count);

    for _ in 0..count {
        let slots = rng.gen_range(1..4);
        let states: Vec<_> = (0..slots).map(|_| random_state(&mut rng)).collect();

        let damage = (0..rng.gen_range(0..4))
            .map(|_| {
                let amount = rng.gen_range(1.0..10.0);
                let effect = if rng.gen_bool(0.7) {
                    DamageEffect::on_target(amount)
                } else {
                    DamageEffect::on_caster(amount)
                };
                EffectEntry::new(rng.gen_range(0..=slots), effect)
            })
            .collect();
        let status = (0..rng.gen_range(0..3))
            .map(|_| {
                let effect = StatusEffect {
                    status: StatusId(rng.gen_range(0..4)),
                    duration_ticks: rng.gen_range(1..10),
                    affects: if rng.gen_bool(0.5) {
                        crate::effect::Affects::Target
                    } else {
                        crate::effect::Affects::Caster
                    },
                };
                EffectEntry::new(rng.gen_range(0..=slots), effect)
            })
            .collect();
        let position = Vec2::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));

        let id = spawn_combatant(&mut world, &states, damage, status, position);
        if let Some(stats) = world.get_mut::<CasterStats>(id) {
            stats.power = rng.gen_range(0.5..2.0);
        }
        ids.push(id);
    }

    for &id in &ids {
        if rng.gen_bool(0.8) {
            let target = ids[rng.gen_range(0..ids.len())];
            set_target(&mut world, id, Some(target));
        }
    }

    (world, ids)
}

// =============================================================================
// Instrumented Writers
// =============================================================================

/// Wraps a writer, counting records and sleeping before each one.
///
/// Lets tests observe whether a consumer read before its producers finished.
pub struct SlowWriter<W> {
    inner: W,
    delay: Duration,
    writes: Arc<AtomicUsize>,
}

impl<W> SlowWriter<W> {
    pub fn new(inner: W, delay: Duration, writes: Arc<AtomicUsize>) -> Self {
        Self { inner, delay, writes }
    }
}

impl<T, W> ContextWriter<T> for SlowWriter<W>
where
    T: EffectPayload,
    W: ContextWriter<T, Enriched = EffectRecord>,
{
    type Enriched = EffectRecord;
    type BatchCache<'b> = W::BatchCache<'b>;

    fn requirement(&self) -> QueryDesc {
        self.inner.requirement()
    }

    fn prepare_batch<'b>(&self, batch: &'b Batch) -> Self::BatchCache<'b> {
        self.inner.prepare_batch(batch)
    }

    fn write_enriched(
        &self,
        cache: &Self::BatchCache<'_>,
        local_index: usize,
        segment: &mut SegmentWriter<'_, Self::Enriched>,
        payload: &T,
        target: EntityId,
    ) {
        std::thread::sleep(self.delay);
        self.inner.write_enriched(cache, local_index, segment, payload, target);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}
