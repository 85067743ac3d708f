use std::time::Duration;

use super::{CHECK_NAME, Counters, Reporter, RunEvent};

pub struct JsonlReporter {
    interval: Duration,
    vus: u32,
    last_tick: Duration,
    interval_counts: Counters,
    total_counts: Counters,
    emit_events: bool,
}

impl JsonlReporter {
    pub fn new(interval: Duration, vus: u32, emit_events: bool) -> Self {
        Self {
            interval,
            vus,
            last_tick: Duration::ZERO,
            interval_counts: Counters::default(),
            total_counts: Counters::default(),
            emit_events,
        }
    }

    fn event_line(ev: &RunEvent) -> serde_json::Value {
        match ev {
            RunEvent::Iteration(ev) => serde_json::json!({
                "type": "iteration",
                "t_ms": ev.elapsed.as_millis(),
                "vu": ev.vu,
                "iteration": ev.iteration,
                "latency_ms": ev.latency.as_millis(),
                "check": CHECK_NAME,
                "passed": ev.outcome.passed,
                "status": ev.outcome.status,
                "failure": ev.outcome.failure.map(|kind| kind.as_str()),
            }),
            RunEvent::Interrupted {
                elapsed,
                vu,
                iteration,
            } => serde_json::json!({
                "type": "interrupted",
                "t_ms": elapsed.as_millis(),
                "vu": vu,
                "iteration": iteration,
            }),
        }
    }

    fn counters_value(c: &Counters) -> serde_json::Value {
        serde_json::json!({
            "total": c.total,
            "passed": c.passed,
            "failed": c.failed(),
            "http_fail": c.http_fail,
            "timeout_fail": c.timeout_fail,
            "request_fail": c.request_fail,
            "interrupted": c.interrupted,
        })
    }

    fn final_line(&self, now: Duration) -> serde_json::Value {
        let c = &self.total_counts;
        serde_json::json!({
            "type": "final",
            "t_ms": now.as_millis(),
            "vus": self.vus,
            "check": CHECK_NAME,
            "pass_rate": c.pass_rate(),
            "latency_ms": {
                "avg": millis_f64(c.latency.avg()),
                "min": millis_f64(c.latency.min()),
                "max": millis_f64(c.latency.max()),
            },
            "total": Self::counters_value(c),
        })
    }
}

fn millis_f64(d: Duration) -> f64 {
    d.as_micros() as f64 / 1000.
}

impl Reporter for JsonlReporter {
    fn on_event(&mut self, ev: &RunEvent) {
        self.interval_counts.apply(ev);
        self.total_counts.apply(ev);

        if self.emit_events {
            println!("{}", Self::event_line(ev));
        }
    }

    fn on_tick(&mut self, now: Duration) {
        if now.saturating_sub(self.last_tick) < self.interval {
            return;
        }

        let interval_secs = now.saturating_sub(self.last_tick).as_secs_f64();
        let rate = if interval_secs == 0. {
            0.
        } else {
            self.interval_counts.total as f64 / interval_secs
        };

        let line = serde_json::json!({
            "type": "summary",
            "t_ms": now.as_millis(),
            "interval_ms": self.interval.as_millis(),
            "vus": self.vus,
            "iterations_per_sec": rate,
            "interval": Self::counters_value(&self.interval_counts),
            "total": Self::counters_value(&self.total_counts),
        });
        println!("{}", line);

        self.last_tick = now;
        self.interval_counts = Counters::default();
    }

    fn finish(&mut self, now: Duration) {
        println!("{}", self.final_line(now));
    }

    fn counters(&self) -> &Counters {
        &self.total_counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::run::reporter::{CheckOutcome, FailureKind, tests::iteration_event};

    #[test]
    fn iteration_event_line() {
        let line = JsonlReporter::event_line(&iteration_event(
            4,
            12,
            CheckOutcome::from_status(503),
        ));
        assert_eq!(
            serde_json::json!({
                "type": "iteration",
                "t_ms": 1000,
                "vu": 4,
                "iteration": 0,
                "latency_ms": 12,
                "check": "is status 200",
                "passed": false,
                "status": 503,
                "failure": "http_status",
            }),
            line
        );
    }

    #[test]
    fn interrupted_event_line() {
        let line = JsonlReporter::event_line(&RunEvent::Interrupted {
            elapsed: Duration::from_millis(2500),
            vu: 1,
            iteration: 7,
        });
        assert_eq!("interrupted", line["type"]);
        assert_eq!(2500, line["t_ms"]);
        assert_eq!(7, line["iteration"]);
    }

    #[test]
    fn final_line_reports_totals() {
        let mut reporter = JsonlReporter::new(Duration::from_secs(1), 3, false);
        reporter.on_event(&iteration_event(0, 10, CheckOutcome::from_status(200)));
        reporter.on_event(&iteration_event(
            1,
            30,
            CheckOutcome::no_response(FailureKind::Timeout),
        ));

        let line = reporter.final_line(Duration::from_secs(3));
        assert_eq!("final", line["type"]);
        assert_eq!(3, line["vus"]);
        assert_eq!(50., line["pass_rate"]);
        assert_eq!(2, line["total"]["total"]);
        assert_eq!(1, line["total"]["passed"]);
        assert_eq!(1, line["total"]["timeout_fail"]);
        assert_eq!(20., line["latency_ms"]["avg"]);
    }
}
