use std::sync::Arc;

use rama::{graceful::ShutdownGuard, telemetry::tracing};
use tokio::time::{Instant, sleep_until};

use super::scenario::{CheckRecorder, LoadTestScenario};

/// Wall-clock bounds of a run, shared by all virtual users.
#[derive(Debug, Clone, Copy)]
pub struct RunWindow {
    /// no new iteration is started from this point on
    pub deadline: Instant,
    /// in-flight iterations are abandoned from this point on
    pub hard_deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VuSummary {
    pub vu: usize,
    pub iterations: u64,
    pub interrupted: bool,
}

/// Loop the scenario for a single virtual user until the run window closes
/// or shutdown is requested.
pub async fn run_virtual_user(
    guard: ShutdownGuard,
    scenario: Arc<LoadTestScenario>,
    mut recorder: CheckRecorder,
    window: RunWindow,
) -> VuSummary {
    let vu = recorder.vu();
    let mut iteration = 0;

    loop {
        if Instant::now() >= window.deadline {
            tracing::trace!(vu, iteration, "run duration elapsed: stop virtual user");
            return VuSummary {
                vu,
                iterations: iteration,
                interrupted: false,
            };
        }

        let finished = tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!(vu, iteration, "exit virtual user early: guard shutdown");
                false
            }
            _ = sleep_until(window.hard_deadline) => {
                tracing::debug!(vu, iteration, "graceful stop elapsed: abandon iteration");
                false
            }
            _ = scenario.run_iteration(&mut recorder, iteration) => true,
        };

        if !finished {
            // an interrupted think time does not interrupt the iteration itself
            let interrupted = !recorder.has_recorded(iteration);
            if interrupted {
                recorder.record_interrupted(iteration).await;
            }
            return VuSummary {
                vu,
                iterations: if interrupted { iteration } else { iteration + 1 },
                interrupted,
            };
        }

        iteration += 1;
    }
}
