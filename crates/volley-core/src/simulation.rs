//! The tick driver.
//!
//! [`Simulation`] owns the [`World`] and an ordered list of [`Stage`]s and
//! advances them one tick at a time:
//!
//! 1. **SCHEDULE**: every stage launches its trigger jobs against the world as
//!    it stands at the start of the tick. Jobs from all stages are in flight
//!    together.
//! 2. **COMPLETE**: stages are completed in registration order. Each one joins
//!    its own producers and applies their records to the world.
//! 3. **ADVANCE**: the tick counter moves on.
//!
//! Jobs read `Arc<Batch>` snapshots, so mutations made by an earlier stage's
//! completion are not visible to later stages' jobs in the same tick.
//!
//! # Example
//!
//! ```
//! use volley_core::simulation::{Simulation, SimulationConfig};
//!
//! let mut sim = Simulation::new(SimulationConfig::default());
//! for _ in 0..3 {
//!     sim.step().unwrap();
//! }
//! assert_eq!(sim.tick(), 3);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::consumer::ConsumeReport;
use crate::error::DispatchResult;
use crate::job::ExecutionMode;
use crate::pass::TickContext;
use crate::pipeline::Stage;
use crate::{World, WorldConfig};

/// Simulation configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Entity store settings.
    pub world: WorldConfig,
    /// How trigger jobs execute.
    pub execution: ExecutionMode,
}

/// What one stage did during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// The stage's name.
    pub stage: String,
    /// Its consume summary.
    pub report: ConsumeReport,
}

/// Summary of one [`Simulation::step`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// The tick that was executed.
    pub tick: u64,
    /// One entry per stage, in registration order.
    pub stages: Vec<StageReport>,
}

impl TickReport {
    /// Total records applied across all stages.
    #[must_use]
    pub fn records(&self) -> usize {
        self.stages.iter().map(|s| s.report.records).sum()
    }
}

// =============================================================================
// Simulation
// =============================================================================

/// Owns the world and drives its stages.
pub struct Simulation {
    world: World,
    stages: Vec<Box<dyn Stage>>,
    tick: u64,
    config: SimulationConfig,
}

impl Simulation {
    /// Creates a simulation with an empty world at tick 0.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            world: World::new(config.world),
            stages: Vec::new(),
            tick: 0,
            config,
        }
    }

    /// Creates a simulation around an existing world.
    ///
    /// # Arguments
    ///
    /// * `world` - The populated world; its config becomes `config().world`
    /// * `execution` - How trigger jobs run each tick
    #[must_use]
    pub fn with_world(world: World, execution: ExecutionMode) -> Self {
        let config = SimulationConfig {
            world: *world.config(),
            execution,
        };
        Self {
            world,
            stages: Vec::new(),
            tick: 0,
            config,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The current tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The world, mutably. Use between steps to spawn entities or change abilities.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Appends a stage. Stages complete in the order they were added.
    pub fn add_stage(&mut self, stage: impl Stage + 'static) {
        tracing::debug!(stage = stage.name(), "added stage");
        self.stages.push(Box::new(stage));
    }

    /// Number of registered stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Executes one tick.
    ///
    /// Every stage is completed even if an earlier one fails, so no job
    /// outlives the tick that scheduled it.
    ///
    /// # Returns
    ///
    /// A [`TickReport`] with one entry per stage, in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first stage error. The tick still advances.
    pub fn step(&mut self) -> DispatchResult<TickReport> {
        let ctx = TickContext {
            tick: self.tick,
            mode: self.config.execution,
        };
        let _span = tracing::debug_span!("step", tick = ctx.tick).entered();

        // SCHEDULE
        for stage in &mut self.stages {
            stage.schedule(&ctx, &self.world);
        }

        // COMPLETE
        let mut report = TickReport {
            tick: ctx.tick,
            stages: Vec::with_capacity(self.stages.len()),
        };
        let mut first_error = None;
        for stage in &mut self.stages {
            match stage.complete(&ctx, &mut self.world) {
                Ok(stage_report) => report.stages.push(StageReport {
                    stage: stage.name().to_string(),
                    report: stage_report,
                }),
                Err(err) => {
                    tracing::warn!(stage = stage.name(), error = %err, "stage failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        // ADVANCE
        self.tick += 1;
        tracing::debug!(tick = ctx.tick, records = report.records(), "tick complete");

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("config", &self.config)
            .field("entities", &self.world.len())
            .field("stages", &stages)
            .finish()
    }
}
