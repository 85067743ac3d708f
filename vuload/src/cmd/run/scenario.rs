use std::time::Duration;

use rama::{
    Service as _,
    error::{BoxError, ErrorContext as _},
    http::{
        Body, HeaderValue, Method, Request, StatusCode, Uri,
        body::util::BodyExt as _,
        header::{CONTENT_TYPE, USER_AGENT},
    },
    telemetry::tracing,
};
use serde::Serialize;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep, timeout},
};

use crate::{
    cmd::run::{
        client::HttpClient,
        reporter::{CHECK_NAME, CheckOutcome, FailureKind, IterationEvent, RunEvent},
    },
    config::{RunConfiguration, UserIdSource},
    utils,
};

/// JSON body sent with every request, created fresh per iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub user_id: String,
}

/// The work a virtual user does in a single iteration:
/// POST the payload, check for `200 OK`, sleep.
pub struct LoadTestScenario {
    client: HttpClient,
    target: Uri,
    think_time: Duration,
    request_timeout: Duration,
    user_id: UserIdSource,
}

impl LoadTestScenario {
    pub fn new(client: HttpClient, cfg: &RunConfiguration) -> Self {
        Self {
            client,
            target: cfg.target().clone(),
            think_time: cfg.think_time(),
            request_timeout: cfg.request_timeout(),
            user_id: cfg.user_id().clone(),
        }
    }

    fn build_request(&self, payload: &RequestPayload) -> Result<Request, BoxError> {
        let body = serde_json::to_vec(payload).context("json encode request payload")?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.target.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(utils::env::user_agent()))
            .body(Body::from(body))
            .context("build load request")?;
        Ok(req)
    }

    /// Send the request and read the full response body,
    /// so the connection can be reused and latency covers the whole exchange.
    async fn send_request(&self, req: Request) -> Result<StatusCode, BoxError> {
        let resp = self.client.serve(req).await?;
        let status = resp.status();
        resp.into_body()
            .collect()
            .await
            .context("collect response body")?;
        Ok(status)
    }

    /// Issue the request and evaluate the check.
    ///
    /// Never fails: every error is turned into a failed [`CheckOutcome`].
    async fn request_and_check(&self) -> (CheckOutcome, Duration) {
        let payload = RequestPayload {
            user_id: self.user_id.next_user_id(),
        };

        let req = match self.build_request(&payload) {
            Ok(req) => req,
            Err(err) => {
                tracing::debug!("failed to build request: {err}");
                return (CheckOutcome::no_response(FailureKind::Request), Duration::ZERO);
            }
        };

        let start = Instant::now();
        let result = timeout(self.request_timeout, self.send_request(req)).await;
        let latency = start.elapsed();

        let outcome = match result {
            Ok(Ok(status)) => CheckOutcome::from_status(status.as_u16()),
            Ok(Err(err)) => {
                tracing::debug!("request failed: {err}");
                CheckOutcome::no_response(FailureKind::Request)
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.request_timeout, "request timed out");
                CheckOutcome::no_response(FailureKind::Timeout)
            }
        };

        (outcome, latency)
    }

    /// Run one full iteration on behalf of a virtual user.
    ///
    /// The check outcome is recorded before the think time starts.
    pub async fn run_iteration(&self, recorder: &mut CheckRecorder, iteration: u64) {
        let (outcome, latency) = self.request_and_check().await;

        if !outcome.passed {
            tracing::debug!(
                vu = recorder.vu(),
                iteration,
                status = ?outcome.status,
                failure = ?outcome.failure,
                "check '{CHECK_NAME}' failed",
            );
        }

        recorder.record(iteration, latency, outcome).await;

        sleep(self.think_time).await;
    }
}

/// Delivers the check outcomes of a single virtual user to the reporter.
pub struct CheckRecorder {
    vu: usize,
    start: Instant,
    last_recorded: Option<u64>,
    event_tx: mpsc::Sender<RunEvent>,
}

impl CheckRecorder {
    pub fn new(vu: usize, start: Instant, event_tx: mpsc::Sender<RunEvent>) -> Self {
        Self {
            vu,
            start,
            last_recorded: None,
            event_tx,
        }
    }

    pub fn vu(&self) -> usize {
        self.vu
    }

    /// Returns true if the outcome for the given iteration was recorded.
    pub fn has_recorded(&self, iteration: u64) -> bool {
        self.last_recorded == Some(iteration)
    }

    async fn record(&mut self, iteration: u64, latency: Duration, outcome: CheckOutcome) {
        self.last_recorded = Some(iteration);
        self.send(RunEvent::Iteration(IterationEvent {
            elapsed: self.start.elapsed(),
            vu: self.vu,
            iteration,
            latency,
            outcome,
        }))
        .await;
    }

    pub async fn record_interrupted(&mut self, iteration: u64) {
        self.send(RunEvent::Interrupted {
            elapsed: self.start.elapsed(),
            vu: self.vu,
            iteration,
        })
        .await;
    }

    async fn send(&self, ev: RunEvent) {
        if let Err(err) = self.event_tx.send(ev).await {
            tracing::debug!("failed to send run event msg: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::config::RunOptions;

    use rama::{
        http::{BodyExtractExt as _, Response, service::web::response::IntoResponse},
        service::service_fn,
    };

    const TARGET: &str = "http://127.0.0.1:8080/visits";

    fn cfg(options: RunOptions) -> RunConfiguration {
        RunConfiguration::try_new(Uri::from_static(TARGET), options).unwrap()
    }

    fn status_client(status: StatusCode, hits: Arc<AtomicUsize>) -> HttpClient {
        service_fn(move |req: Request| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let valid = req.method() == Method::POST
                    && req.uri() == TARGET
                    && req.headers().get(CONTENT_TYPE).map(|v| v.as_bytes())
                        == Some(b"application/json".as_slice());
                let status = if valid { status } else { StatusCode::BAD_REQUEST };
                Ok::<_, BoxError>(status.into_response())
            }
        })
        .boxed()
    }

    fn erroring_client(hits: Arc<AtomicUsize>) -> HttpClient {
        service_fn(move |_req: Request| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Err::<Response, _>(BoxError::from("tcp connect: connection refused (os error 111)"))
            }
        })
        .boxed()
    }

    fn hanging_client() -> HttpClient {
        service_fn(|_req: Request| async move {
            std::future::pending::<()>().await;
            Ok::<_, BoxError>(StatusCode::OK.into_response())
        })
        .boxed()
    }

    async fn run_single_iteration(
        scenario: &LoadTestScenario,
    ) -> (IterationEvent, Duration) {
        let start = Instant::now();
        let (tx, mut rx) = mpsc::channel(1);
        let mut recorder = CheckRecorder::new(0, start, tx);

        scenario.run_iteration(&mut recorder, 0).await;
        let iteration_time = start.elapsed();
        assert!(recorder.has_recorded(0));

        match rx.recv().await {
            Some(RunEvent::Iteration(ev)) => (ev, iteration_time),
            other => panic!("unexpected run event: {other:?}"),
        }
    }

    #[test]
    fn payload_is_json_object_with_user_id() {
        let payload = RequestPayload {
            user_id: "someUserId".to_owned(),
        };
        let value: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&payload).unwrap()).unwrap();
        assert_eq!(serde_json::json!({"userId": "someUserId"}), value);
    }

    #[tokio::test]
    async fn request_is_json_post_to_target() {
        let scenario = LoadTestScenario::new(
            status_client(StatusCode::OK, Default::default()),
            &cfg(RunOptions::default()),
        );
        let req = scenario
            .build_request(&RequestPayload {
                user_id: "someUserId".to_owned(),
            })
            .unwrap();

        assert_eq!(Method::POST, req.method());
        assert_eq!(TARGET, req.uri().to_string());
        assert_eq!(req.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(
            req.headers().get(USER_AGENT).unwrap(),
            utils::env::user_agent()
        );

        let (_, body) = req.into_parts();
        let value: serde_json::Value = Response::new(body).try_into_json().await.unwrap();
        assert_eq!("someUserId", value["userId"]);
    }

    #[tokio::test(flavor = "current_thread")]
    #[tracing_test::traced_test]
    async fn status_200_passes_and_sleeps() {
        tokio::time::pause();

        let hits = Arc::new(AtomicUsize::new(0));
        let scenario = LoadTestScenario::new(
            status_client(StatusCode::OK, hits.clone()),
            &cfg(RunOptions::default()),
        );

        let (ev, iteration_time) = run_single_iteration(&scenario).await;

        assert_eq!(1, hits.load(Ordering::SeqCst));
        assert!(ev.outcome.passed);
        assert_eq!(Some(200), ev.outcome.status);
        assert_eq!(None, ev.outcome.failure);
        assert!(iteration_time >= Duration::from_millis(100));
        assert!(iteration_time < Duration::from_millis(110));
    }

    #[tokio::test(flavor = "current_thread")]
    #[tracing_test::traced_test]
    async fn status_500_fails_and_still_sleeps() {
        tokio::time::pause();

        let hits = Arc::new(AtomicUsize::new(0));
        let scenario = LoadTestScenario::new(
            status_client(StatusCode::INTERNAL_SERVER_ERROR, hits.clone()),
            &cfg(RunOptions::default()),
        );

        let (ev, iteration_time) = run_single_iteration(&scenario).await;

        assert_eq!(1, hits.load(Ordering::SeqCst));
        assert!(!ev.outcome.passed);
        assert_eq!(Some(500), ev.outcome.status);
        assert_eq!(Some(FailureKind::HttpStatus), ev.outcome.failure);
        assert!(iteration_time >= Duration::from_millis(100));
        assert!(logs_contain("check 'is status 200' failed"));
    }

    #[tokio::test(flavor = "current_thread")]
    #[tracing_test::traced_test]
    async fn connection_refused_fails_and_still_sleeps() {
        tokio::time::pause();

        let hits = Arc::new(AtomicUsize::new(0));
        let scenario =
            LoadTestScenario::new(erroring_client(hits.clone()), &cfg(RunOptions::default()));

        let (ev, iteration_time) = run_single_iteration(&scenario).await;

        assert_eq!(1, hits.load(Ordering::SeqCst));
        assert!(!ev.outcome.passed);
        assert_eq!(None, ev.outcome.status);
        assert_eq!(Some(FailureKind::Request), ev.outcome.failure);
        assert!(iteration_time >= Duration::from_millis(100));
        assert!(logs_contain("connection refused"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unanswered_request_times_out() {
        tokio::time::pause();

        let scenario = LoadTestScenario::new(
            hanging_client(),
            &cfg(RunOptions {
                timeout: Some(Duration::from_secs(2)),
                ..Default::default()
            }),
        );

        let (ev, iteration_time) = run_single_iteration(&scenario).await;

        assert!(!ev.outcome.passed);
        assert_eq!(Some(FailureKind::Timeout), ev.outcome.failure);
        assert!(ev.latency >= Duration::from_secs(2));
        assert!(iteration_time >= Duration::from_millis(2100));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn custom_think_time_is_applied() {
        tokio::time::pause();

        let scenario = LoadTestScenario::new(
            status_client(StatusCode::OK, Default::default()),
            &cfg(RunOptions {
                sleep: Some(Duration::from_secs(1)),
                ..Default::default()
            }),
        );

        let (_, iteration_time) = run_single_iteration(&scenario).await;
        assert!(iteration_time >= Duration::from_secs(1));
        assert!(iteration_time < Duration::from_millis(1010));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn random_user_id_reaches_request_body() {
        tokio::time::pause();

        let (id_tx, mut id_rx) = mpsc::unbounded_channel();
        let client = service_fn(move |req: Request| {
            let id_tx = id_tx.clone();
            async move {
                let (_, body) = req.into_parts();
                let value: serde_json::Value = Response::new(body).try_into_json().await?;
                let _ = id_tx.send(value["userId"].as_str().unwrap_or_default().to_owned());
                Ok::<_, BoxError>(StatusCode::OK.into_response())
            }
        })
        .boxed();

        let scenario = LoadTestScenario::new(
            client,
            &cfg(RunOptions {
                user_id: Some(UserIdSource::Random),
                ..Default::default()
            }),
        );

        let (first, _) = run_single_iteration(&scenario).await;
        let (second, _) = run_single_iteration(&scenario).await;
        assert!(first.outcome.passed);
        assert!(second.outcome.passed);

        let a = id_rx.recv().await.unwrap();
        let b = id_rx.recv().await.unwrap();
        for id in [&a, &b] {
            let hex = id.strip_prefix("user-").unwrap();
            assert_eq!(16, hex.len(), "id: {id}");
        }
        assert_ne!(a, b);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn response_body_is_read_before_check_completes() {
        tokio::time::pause();

        let client = service_fn(|_req: Request| async move {
            let body = serde_json::to_vec(&serde_json::json!({"visits": 42})).unwrap();
            Ok::<_, BoxError>(
                Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
        })
        .boxed();

        let scenario = LoadTestScenario::new(client, &cfg(RunOptions::default()));
        let req = scenario
            .build_request(&RequestPayload {
                user_id: "someUserId".to_owned(),
            })
            .unwrap();

        assert_eq!(StatusCode::OK, scenario.send_request(req).await.unwrap());

        let (ev, _) = run_single_iteration(&scenario).await;
        assert!(ev.outcome.passed);
        assert_eq!(Some(200), ev.outcome.status);
    }
}
