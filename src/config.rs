//! Pipeline configuration: builder-method style config controlling
//! the fixed-point driver's iteration cap and which optional passes
//! run. The defaults: 32-iteration cap, loop unrolling wired out.

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum fixed-point rounds before the driver gives up and runs
    /// the final unconditional dead-code pass anyway.
    pub max_fixpoint_iterations: u32,
    pub enable_lsr: bool,
    pub enable_loopreduce: bool,
    /// Loop unrolling is present but disabled by default — an
    /// explicit opt-in, not part of the default pipeline.
    pub enable_loopunroll: bool,
    pub unroll_trip_cap: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_fixpoint_iterations: 32,
            enable_lsr: true,
            enable_loopreduce: true,
            enable_loopunroll: false,
            unroll_trip_cap: 32,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        PipelineConfig::default()
    }

    pub fn with_max_fixpoint_iterations(mut self, n: u32) -> Self {
        self.max_fixpoint_iterations = n;
        self
    }

    pub fn with_loopunroll(mut self, enabled: bool) -> Self {
        self.enable_loopunroll = enabled;
        self
    }

    pub fn with_unroll_trip_cap(mut self, cap: u32) -> Self {
        self.unroll_trip_cap = cap;
        self
    }
}
