//! The fixed-point optimization pipeline: each pass runs in sequence,
//! the whole sequence repeats until a round makes no changes (or the
//! iteration cap is hit), followed by one unconditional dead-code pass
//! so the last round's rewrites still get swept even if they were the
//! only change in the final iteration.

pub mod constfold;
pub mod copyprop;
pub mod cse;
pub mod deadcode;
pub mod flow;
pub mod licm;
pub mod loopreduce;
pub mod loopshape;
pub mod loopunroll;
pub mod lsr;

use crate::config::PipelineConfig;
use crate::optlog::OptLog;
use crate::tac::Program;

pub fn optimize(prog: &mut Program, config: &PipelineConfig) -> OptLog {
    let mut log = OptLog::new();
    let mut iter = 1;
    while iter <= config.max_fixpoint_iterations {
        let mut total = 0;
        total += constfold::run(prog, &mut log, iter);
        total += copyprop::run(prog, &mut log, iter);
        total += cse::run(prog, &mut log, iter);
        total += licm::run(prog, &mut log, iter);
        if config.enable_lsr {
            total += lsr::run(prog, &mut log, iter);
        }
        if config.enable_loopreduce {
            total += loopreduce::run(prog, &mut log, iter);
        }
        if config.enable_loopunroll {
            total += loopunroll::run(prog, &mut log, iter, config.unroll_trip_cap);
        }
        total += deadcode::run(prog, &mut log, iter);

        if total == 0 {
            log.set_iterations_run(iter);
            return log;
        }
        iter += 1;
    }
    deadcode::run(prog, &mut log, iter);
    log.set_iterations_run(iter);
    log
}
