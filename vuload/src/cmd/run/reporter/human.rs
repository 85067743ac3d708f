use std::{fmt::Write as _, time::Duration};

use super::{CHECK_NAME, Counters, Reporter, RunEvent};

pub struct HumanReporter {
    interval: Duration,
    vus: u32,
    last_tick: Duration,
    interval_counts: Counters,
    total_counts: Counters,
}

impl HumanReporter {
    pub fn new(interval: Duration, vus: u32) -> Self {
        Self {
            interval,
            vus,
            last_tick: Duration::ZERO,
            interval_counts: Counters::default(),
            total_counts: Counters::default(),
        }
    }

    fn render_progress(&self, now: Duration) -> String {
        let elapsed = now.saturating_sub(self.last_tick).as_secs_f64();
        let rate = if elapsed > 0. {
            self.interval_counts.total as f64 / elapsed
        } else {
            0.
        };

        format!(
            "running ({:.1}s) vus={} it/s={:.1} passed={} http_fail={} timeout={} request_fail={} total_passed={} total_failed={}",
            now.as_secs_f64(),
            self.vus,
            rate,
            self.interval_counts.passed,
            self.interval_counts.http_fail,
            self.interval_counts.timeout_fail,
            self.interval_counts.request_fail,
            self.total_counts.passed,
            self.total_counts.failed(),
        )
    }

    fn render_summary(&self, now: Duration) -> String {
        let c = &self.total_counts;
        let secs = now.as_secs_f64();
        let rate = if secs > 0. { c.total as f64 / secs } else { 0. };
        let pass_rate = c.pass_rate().unwrap_or_default();

        let mut out = String::new();
        let mark = if c.failed() == 0 { '✓' } else { '✗' };
        let _ = writeln!(out, "     {mark} {CHECK_NAME}");
        let _ = writeln!(
            out,
            "     checks.............: {pass_rate:.2}% ✓ {} ✗ {}",
            c.passed,
            c.failed()
        );
        let _ = writeln!(
            out,
            "     check_failures.....: http_status={} timeout={} request={}",
            c.http_fail, c.timeout_fail, c.request_fail
        );
        let _ = writeln!(
            out,
            "     http_req_duration..: avg={:?} min={:?} max={:?}",
            c.latency.avg(),
            c.latency.min(),
            c.latency.max()
        );
        let _ = writeln!(
            out,
            "     iterations.........: {} {rate:.2}/s",
            c.total
        );
        let _ = writeln!(out, "     interrupted........: {}", c.interrupted);
        let _ = writeln!(out, "     vus................: {}", self.vus);
        let _ = write!(out, "     duration...........: {secs:.1}s");
        out
    }
}

impl Reporter for HumanReporter {
    fn on_event(&mut self, ev: &RunEvent) {
        self.interval_counts.apply(ev);
        self.total_counts.apply(ev);
    }

    fn on_tick(&mut self, now: Duration) {
        if now.saturating_sub(self.last_tick) < self.interval {
            return;
        }

        println!("{}", self.render_progress(now));

        self.last_tick = now;
        self.interval_counts = Counters::default();
    }

    fn finish(&mut self, now: Duration) {
        println!("\n{}\n", self.render_summary(now));
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
    fn summary_lists_check_tallies() {
        let mut reporter = HumanReporter::new(Duration::from_secs(5), 10);
        reporter.on_event(&iteration_event(0, 10, CheckOutcome::from_status(200)));
        reporter.on_event(&iteration_event(1, 10, CheckOutcome::from_status(200)));
        reporter.on_event(&iteration_event(2, 10, CheckOutcome::from_status(200)));
        reporter.on_event(&iteration_event(
            3,
            10,
            CheckOutcome::no_response(FailureKind::Request),
        ));

        let summary = reporter.render_summary(Duration::from_secs(2));
        assert!(summary.contains("✗ is status 200"), "{summary}");
        assert!(summary.contains("checks.............: 75.00% ✓ 3 ✗ 1"), "{summary}");
        assert!(summary.contains("http_status=0 timeout=0 request=1"), "{summary}");
        assert!(summary.contains("iterations.........: 4 2.00/s"), "{summary}");
        assert!(summary.contains("vus................: 10"), "{summary}");
    }

    #[test]
    fn summary_marks_all_passed() {
        let mut reporter = HumanReporter::new(Duration::from_secs(5), 1);
        reporter.on_event(&iteration_event(0, 10, CheckOutcome::from_status(200)));

        let summary = reporter.render_summary(Duration::from_secs(1));
        assert!(summary.contains("✓ is status 200"), "{summary}");
        assert!(summary.contains("100.00% ✓ 1 ✗ 0"), "{summary}");
    }

    #[test]
    fn tick_resets_interval_counts_only() {
        let mut reporter = HumanReporter::new(Duration::from_secs(1), 2);
        reporter.on_event(&iteration_event(0, 10, CheckOutcome::from_status(500)));

        // not yet due
        reporter.on_tick(Duration::from_millis(500));
        assert_eq!(1, reporter.interval_counts.total);

        reporter.on_tick(Duration::from_secs(1));
        assert_eq!(0, reporter.interval_counts.total);
        assert_eq!(1, reporter.counters().total);
        assert_eq!(1, reporter.counters().http_fail);
    }
}
