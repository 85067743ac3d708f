use std::{path::PathBuf, sync::Arc, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::Uri,
    rt::Executor,
    telemetry::tracing,
};

use clap::Args;
use tokio::{
    sync::mpsc::{self, Receiver},
    time::Instant,
};

use crate::config::{RunConfiguration, RunOptions};

pub mod client;
pub mod reporter;
pub mod scenario;
pub mod vu;

use self::{
    client::HttpClient,
    reporter::*,
    scenario::{CheckRecorder, LoadTestScenario},
    vu::RunWindow,
};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Args)]
/// run virtual users against a target endpoint
pub struct RunCommand {
    /// http(s) URL every iteration POSTs its payload to
    #[arg(value_name = "URL", required = true)]
    target: Uri,

    /// k6 style JSON options file,
    /// manually defined parameters overwrite file parameters.
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    #[clap(flatten)]
    overwrites: RunOptions,

    /// report json lines instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,

    /// also emit a json line for every finished or interrupted iteration
    #[arg(long, default_value_t = false, requires = "json")]
    json_events: bool,
}

/// Everything a run needs, prepared before any virtual user starts.
pub struct RunPlan {
    cfg: RunConfiguration,
    client: HttpClient,
    reporter: Box<dyn Reporter>,
}

impl RunPlan {
    /// Resolve the configuration and create the client,
    /// its connections are driven by the given executor.
    pub async fn try_new(args: RunCommand, exec: Executor) -> Result<Self, BoxError> {
        let file_options = match args.options.as_deref() {
            Some(path) => {
                let options = RunOptions::load(path).await?;
                tracing::info!(path = %path.display(), "options file loaded");
                options
            }
            None => {
                tracing::debug!("no options file defined, use defaults as base options");
                RunOptions::default()
            }
        };

        let cfg = RunConfiguration::try_new(
            args.target,
            RunOptions::merge(file_options, args.overwrites),
        )
        .context("validate run configuration")?;

        let client = self::client::new_web_client(exec).context("create HTTP(S) client")?;

        let vus = cfg.vus().get();
        let reporter: Box<dyn Reporter> = if args.json {
            Box::new(JsonlReporter::new(REPORT_INTERVAL, vus, args.json_events))
        } else {
            Box::new(HumanReporter::new(REPORT_INTERVAL, vus))
        };

        Ok(Self::new(cfg, client, reporter))
    }

    fn new(cfg: RunConfiguration, client: HttpClient, reporter: Box<dyn Reporter>) -> Self {
        Self {
            cfg,
            client,
            reporter,
        }
    }
}

/// Run all virtual users until the configured duration elapsed
/// (or shutdown is requested) and return the final tallies.
pub async fn exec(guard: ShutdownGuard, plan: RunPlan) -> Result<Counters, BoxError> {
    let RunPlan {
        cfg,
        client,
        reporter,
    } = plan;

    let start = Instant::now();
    let window = run_window(start, cfg.duration(), cfg.graceful_stop())?;

    let vus = cfg.vus().get() as usize;
    let scenario = Arc::new(LoadTestScenario::new(client, &cfg));

    let (event_tx, event_rx) = mpsc::channel(vus * 8);
    let report_handle = guard.spawn_task(report_worker(reporter, event_rx, REPORT_INTERVAL));

    tracing::info!(
        vus,
        duration = ?cfg.duration(),
        graceful_stop = ?cfg.graceful_stop(),
        "starting virtual users",
    );

    let vu_handles: Vec<_> = (0..vus)
        .map(|vu| {
            let scenario = scenario.clone();
            let recorder = CheckRecorder::new(vu, start, event_tx.clone());
            guard.spawn_task_fn(async move |guard| {
                self::vu::run_virtual_user(guard, scenario, recorder, window).await
            })
        })
        .collect();

    // the report worker finishes once all virtual users dropped their sender
    drop(event_tx);

    for handle in vu_handles {
        let summary = handle.await.context("join virtual user task")?;
        tracing::debug!(
            vu = summary.vu,
            iterations = summary.iterations,
            interrupted = summary.interrupted,
            "virtual user finished",
        );
    }

    let counters = report_handle.await.context("join report worker task")?;
    tracing::info!(
        iterations = counters.total,
        passed = counters.passed,
        failed = counters.failed(),
        interrupted = counters.interrupted,
        "load run finished",
    );

    Ok(counters)
}

fn run_window(
    start: Instant,
    duration: Duration,
    graceful_stop: Duration,
) -> Result<RunWindow, BoxError> {
    let deadline = start
        .checked_add(duration)
        .ok_or_else(|| BoxError::from(format!("run duration {duration:?} overflows the clock")))?;
    let hard_deadline = deadline.checked_add(graceful_stop).ok_or_else(|| {
        BoxError::from(format!("graceful stop {graceful_stop:?} overflows the clock"))
    })?;
    Ok(RunWindow {
        deadline,
        hard_deadline,
    })
}

async fn report_worker(
    mut reporter: Box<dyn Reporter>,
    mut event_rx: Receiver<RunEvent>,
    interval: Duration,
) -> Counters {
    let start = Instant::now();
    let mut ticker = tokio::time::interval_at(start + interval, interval);

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                let Some(ev) = maybe_event else {
                    tracing::debug!("exit report worker: event senders closed");
                    break;
                };
                reporter.on_event(&ev);
            }

            _ = ticker.tick() => {
                reporter.on_tick(start.elapsed());
            }
        }
    }

    reporter.finish(start.elapsed());
    reporter.counters().clone()
}
