//! Queue stats and operator triggers.

use jobfeed::{ControlSurface, QueueSnapshot, TriggerRequest, TriggerResponse};

use super::{ApiResponse, AppContext};

/// Trigger flags as given on the command line. Which combinations are
/// allowed is decided by [`TriggerRequest::validate`].
#[derive(Debug, Clone, Default)]
pub struct TriggerFlags {
    pub job_id: Option<String>,
    pub force: bool,
    pub all: bool,
    pub reset: bool,
}

impl From<TriggerFlags> for TriggerRequest {
    fn from(flags: TriggerFlags) -> Self {
        TriggerRequest {
            job_id: flags.job_id,
            all: flags.all.then_some(true),
            reset: flags.reset.then_some(true),
            force: flags.force.then_some(true),
        }
    }
}

fn surface(ctx: &AppContext) -> ControlSurface {
    ControlSurface::new(ctx.queue.clone(), ctx.config.enrichment.stuck_timeout())
}

pub fn stats(ctx: &AppContext) -> ApiResponse<QueueSnapshot> {
    ApiResponse::from_result(surface(ctx).query())
}

pub fn trigger(ctx: &AppContext, flags: TriggerFlags) -> ApiResponse<TriggerResponse> {
    let request = TriggerRequest::from(flags);
    ApiResponse::from_result(surface(ctx).trigger(&request))
}
