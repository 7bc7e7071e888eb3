use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Periodic background work driven by [`crate::scheduler::Scheduler`].
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Stable name used in log fields.
    fn name(&self) -> &str;

    /// Time between runs. The first run happens as soon as the scheduler
    /// starts.
    fn interval(&self) -> Duration;

    /// One pass of the job. An error is logged and the next tick still runs.
    async fn run(&self) -> Result<()>;
}
