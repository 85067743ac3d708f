use std::time::Duration;

mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

/// Name of the single check evaluated for every iteration.
pub const CHECK_NAME: &str = "is status 200";

pub trait Reporter: Send + 'static {
    fn on_event(&mut self, ev: &RunEvent);
    fn on_tick(&mut self, now: Duration);
    fn finish(&mut self, now: Duration);
    fn counters(&self) -> &Counters;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    /// completed iterations (= evaluated checks)
    pub total: u64,
    pub passed: u64,
    pub http_fail: u64,
    pub timeout_fail: u64,
    pub request_fail: u64,
    pub interrupted: u64,
    pub latency: LatencyStats,
}

impl Counters {
    pub fn failed(&self) -> u64 {
        self.total - self.passed
    }

    /// Percentage of passed checks, `None` if no check was evaluated.
    pub fn pass_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.passed as f64 * 100. / self.total as f64)
    }

    pub(super) fn apply(&mut self, ev: &RunEvent) {
        let ev = match ev {
            RunEvent::Iteration(ev) => ev,
            RunEvent::Interrupted { .. } => {
                self.interrupted += 1;
                return;
            }
        };

        self.total += 1;
        self.latency.record(ev.latency);
        if ev.outcome.passed {
            self.passed += 1;
            return;
        }
        match ev.outcome.failure {
            Some(FailureKind::HttpStatus) => self.http_fail += 1,
            Some(FailureKind::Timeout) => self.timeout_fail += 1,
            Some(FailureKind::Request) | None => self.request_fail += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyStats {
    count: u32,
    sum: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl LatencyStats {
    fn record(&mut self, latency: Duration) {
        self.count = self.count.saturating_add(1);
        self.sum = self.sum.saturating_add(latency);
        self.min = Some(self.min.map_or(latency, |min| min.min(latency)));
        self.max = self.max.max(latency);
    }

    pub fn min(&self) -> Duration {
        self.min.unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.sum / self.count
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// a response was received, with a status other than 200
    HttpStatus,
    /// no response within the request timeout
    Timeout,
    /// transport level failure (e.g. connection refused)
    Request,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpStatus => "http_status",
            Self::Timeout => "timeout",
            Self::Request => "request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub status: Option<u16>,
    pub failure: Option<FailureKind>,
}

impl CheckOutcome {
    /// Evaluate the check for a received response status.
    pub fn from_status(status: u16) -> Self {
        if status == 200 {
            Self {
                passed: true,
                status: Some(status),
                failure: None,
            }
        } else {
            Self {
                passed: false,
                status: Some(status),
                failure: Some(FailureKind::HttpStatus),
            }
        }
    }

    /// Failed check for a request that did not produce a response.
    pub fn no_response(failure: FailureKind) -> Self {
        Self {
            passed: false,
            status: None,
            failure: Some(failure),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IterationEvent {
    pub elapsed: Duration,
    pub vu: usize,
    pub iteration: u64,
    pub latency: Duration,
    pub outcome: CheckOutcome,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Iteration(IterationEvent),
    Interrupted {
        elapsed: Duration,
        vu: usize,
        iteration: u64,
    },
}
