//! Maps harvest failures to the process exit outcome.

use anyhow::Result;
use harvester_core::ScheduleError;
use tracing::warn;

use crate::ProcessExit;

/// A cancelled harvest is an interrupt, not an error; anything else
/// propagates to the caller.
pub(crate) fn harvest_failure(error: ScheduleError) -> Result<ProcessExit> {
    if error.is_cancelled() {
        warn!(%error, "harvest interrupted; completed artifacts are kept");
        Ok(ProcessExit::Interrupted)
    } else {
        Err(error.into())
    }
}
