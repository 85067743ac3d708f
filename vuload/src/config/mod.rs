use std::{num::NonZeroU32, time::Duration};

use rama::{
    error::BoxError,
    http::Uri,
    telemetry::tracing,
};
use tokio::time::Instant;

mod duration;
mod options;
mod user_id;

pub use self::{
    duration::parse_duration,
    options::RunOptions,
    user_id::{DEFAULT_USER_ID, UserIdSource},
};

pub const DEFAULT_VUS: u32 = 10;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(300);
pub const DEFAULT_THINK_TIME: Duration = Duration::from_millis(100);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Validated configuration of a single load run.
///
/// Immutable once created: the virtual user count is positive
/// and the duration is non-zero.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    target: Uri,
    vus: NonZeroU32,
    duration: Duration,
    think_time: Duration,
    request_timeout: Duration,
    graceful_stop: Duration,
    user_id: UserIdSource,
}

impl RunConfiguration {
    pub fn try_new(target: Uri, options: RunOptions) -> Result<Self, BoxError> {
        match target.scheme_str() {
            Some("http" | "https") => (),
            Some(scheme) => {
                return Err(BoxError::from(format!(
                    "target url '{target}': scheme '{scheme}' is not supported (use http or https)"
                )));
            }
            None => {
                return Err(BoxError::from(format!(
                    "target url '{target}' must start with http:// or https://"
                )));
            }
        }
        if target.host().is_none_or(str::is_empty) {
            return Err(BoxError::from(format!("target url '{target}' has no host")));
        }

        let vus = NonZeroU32::new(options.vus.unwrap_or(DEFAULT_VUS))
            .ok_or_else(|| BoxError::from("vus must be greater than 0"))?;

        let duration = options.duration.unwrap_or(DEFAULT_DURATION);
        if duration.is_zero() {
            return Err(BoxError::from("duration must be greater than 0"));
        }

        let request_timeout = options.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(BoxError::from("timeout must be greater than 0"));
        }

        let graceful_stop = options.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP);
        if duration
            .checked_add(graceful_stop)
            .and_then(|window| Instant::now().checked_add(window))
            .is_none()
        {
            return Err(BoxError::from(format!(
                "duration ({duration:?}) plus graceful stop ({graceful_stop:?}) is too large"
            )));
        }

        let cfg = Self {
            target,
            vus,
            duration,
            think_time: options.sleep.unwrap_or(DEFAULT_THINK_TIME),
            request_timeout,
            graceful_stop,
            user_id: options.user_id.unwrap_or_default(),
        };

        tracing::info!(
            url = %cfg.target,
            vus = cfg.vus.get(),
            duration = ?cfg.duration,
            think_time = ?cfg.think_time,
            request_timeout = ?cfg.request_timeout,
            graceful_stop = ?cfg.graceful_stop,
            user_id = %cfg.user_id,
            "run configuration ready",
        );

        Ok(cfg)
    }

    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn vus(&self) -> NonZeroU32 {
        self.vus
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn think_time(&self) -> Duration {
        self.think_time
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn graceful_stop(&self) -> Duration {
        self.graceful_stop
    }

    pub fn user_id(&self) -> &UserIdSource {
        &self.user_id
    }
}
