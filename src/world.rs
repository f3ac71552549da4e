use std::sync::Arc;

use crate::{
    config::{Options, DEFAULT_TIME_STEP},
    core::{Data, Model, ModelBuilder},
    dynamics::{self, Integrator},
    error::{ErrorHandler, SimResult, Warning, WarningStat},
    utils::logging::ScopedTimer,
};

/// Central simulation container: a shared, immutable [`Model`] plus the
/// [`Data`] it is stepped with.
pub struct World {
    model: Arc<Model>,
    data: Data,
    pub time_accumulated: f64,
}

impl World {
    pub fn new(model: Arc<Model>) -> Self {
        let data = Data::new(&model);
        Self {
            model,
            data,
            time_accumulated: 0.0,
        }
    }

    /// Compiles `builder` and wraps the result.
    pub fn from_builder(builder: &ModelBuilder) -> SimResult<Self> {
        Ok(Self::new(Arc::new(builder.compile()?)))
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Shared handle to the model, e.g. for a second `Data` on another thread.
    pub fn shared_model(&self) -> Arc<Model> {
        Arc::clone(&self.model)
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Data {
        &mut self.data
    }

    pub fn options(&self) -> &Options {
        &self.model.opt
    }

    /// Mutable options. Clones the model first if it is shared.
    pub fn options_mut(&mut self) -> &mut Options {
        &mut Arc::make_mut(&mut self.model).opt
    }

    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.options_mut().parallel = enabled;
    }

    pub fn parallel_enabled(&self) -> bool {
        cfg!(feature = "parallel") && self.model.opt.parallel
    }

    pub fn set_islands_enabled(&mut self, enabled: bool) {
        self.options_mut().islands = enabled;
    }

    #[cfg(feature = "parallel")]
    pub fn bind_thread_pool(&mut self, pool: Arc<rayon::ThreadPool>) {
        self.data.bind_thread_pool(pool);
    }

    pub fn set_error_handler(&mut self, handler: Arc<ErrorHandler>) {
        self.data.set_error_handler(handler);
    }

    pub fn warning(&self, warning: Warning) -> WarningStat {
        self.data.handler.stat(warning)
    }

    pub fn time(&self) -> f64 {
        self.data.time
    }

    /// Computes accelerations for the current state without advancing time.
    pub fn forward(&mut self) {
        let _timer = ScopedTimer::new("world::forward");
        dynamics::forward(&self.model, &mut self.data);
    }

    /// Computes `qfrc_inverse` for the current `qpos`, `qvel` and `qacc`.
    pub fn inverse(&mut self) {
        let _timer = ScopedTimer::new("world::inverse");
        dynamics::inverse(&self.model, &mut self.data);
    }

    /// Advances exactly one model timestep.
    pub fn step_once(&mut self) {
        let _timer = ScopedTimer::new("world::step");
        dynamics::step(&self.model, &mut self.data);
    }

    /// Advances the simulation using a fixed timestep accumulator. Returns
    /// the number of timesteps taken.
    ///
    /// A non-positive or non-finite model timestep set through
    /// [`World::options_mut`] is replaced by [`DEFAULT_TIME_STEP`]. A
    /// non-finite `dt` is ignored.
    pub fn step(&mut self, dt: f64) -> usize {
        if !dt.is_finite() {
            log::warn!("ignoring non-finite step dt {dt}");
            return 0;
        }
        let mut timestep = self.model.opt.timestep;
        if !timestep.is_finite() || timestep <= 0.0 {
            log::warn!("invalid timestep {timestep}, falling back to {DEFAULT_TIME_STEP}");
            timestep = DEFAULT_TIME_STEP;
            self.options_mut().timestep = timestep;
        }
        self.time_accumulated += dt;
        let mut steps = 0;
        while self.time_accumulated >= timestep {
            self.time_accumulated -= timestep;
            self.step_once();
            steps += 1;
        }
        steps
    }

    /// Integrates with an explicit timestep, using the accelerations of the
    /// last [`World::forward`] call.
    pub fn integrate(&mut self, dt: f64) {
        Integrator::new(dt).step(&self.model, &mut self.data);
    }

    pub fn reset(&mut self) {
        self.data.reset(&self.model);
        self.time_accumulated = 0.0;
    }

    /// Logs the stage timings of the last step.
    pub fn report_profile(&self) {
        self.data.profiler.report();
    }
}
