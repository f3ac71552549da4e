//! Dispatch of per-island work onto rayon.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{Data, Model};
use crate::dynamics::island::Island;
use crate::error::SimResult;

/// Solves all islands, on rayon when enabled and there are enough of them.
///
/// Islands never share rows or dofs, so each work item owns its system. The
/// call returns after every island has finished.
pub(crate) fn solve_all(islands: &mut [Island], model: &Model, data: &Data) -> SimResult<()> {
    if let Some(result) = try_parallel(islands, model, data) {
        return result;
    }
    let handler = data.handler.as_ref();
    islands
        .iter_mut()
        .try_for_each(|island| island.solve(&model.opt, handler))
}

#[cfg(feature = "parallel")]
fn try_parallel(islands: &mut [Island], model: &Model, data: &Data) -> Option<SimResult<()>> {
    let opt = &model.opt;
    if !opt.parallel || islands.len() < opt.min_parallel_islands {
        return None;
    }
    let handler = data.handler.as_ref();
    let count = islands.len();
    Some(match data.thread_pool.as_deref() {
        Some(pool) => {
            log::trace!("solving {count} islands on {} bound threads", pool.current_num_threads());
            pool.install(|| solve_par(islands, opt, handler))
        }
        None => {
            log::trace!("solving {count} islands on the global pool");
            solve_par(islands, opt, handler)
        }
    })
}

#[cfg(feature = "parallel")]
fn solve_par(
    islands: &mut [Island],
    opt: &crate::config::Options,
    handler: &crate::error::ErrorHandler,
) -> SimResult<()> {
    islands
        .par_iter_mut()
        .try_for_each(|island| island.solve(opt, handler))
}

#[cfg(not(feature = "parallel"))]
fn try_parallel(_islands: &mut [Island], _model: &Model, _data: &Data) -> Option<SimResult<()>> {
    None
}
