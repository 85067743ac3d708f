use std::{path::Path, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing,
};
use serde::Deserialize;

use super::{UserIdSource, duration::deserialize_opt_duration, parse_duration};

/// Load run options, as defined on the command line
/// or in a (k6 style) JSON options file.
///
/// Every property is optional, undefined properties
/// fall back to the next source and finally the defaults.
#[derive(Debug, Clone, Default, PartialEq, clap::Args, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RunOptions {
    /// Number of concurrent virtual users.
    #[arg(long, value_name = "N")]
    pub vus: Option<u32>,

    /// Total run duration (e.g. `300s`, `5m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub duration: Option<Duration>,

    /// Think time at the end of every iteration (e.g. `100ms`, `0.1`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub sleep: Option<Duration>,

    /// Maximum time to wait for a response.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub timeout: Option<Duration>,

    /// How long in-flight iterations may still finish once the duration elapsed.
    #[arg(long = "graceful-stop", value_name = "DURATION", value_parser = parse_duration)]
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub graceful_stop: Option<Duration>,

    /// User id to send in the payload, or `random` (lowercase) for a fresh one per iteration.
    #[arg(long = "user-id", value_name = "ID|random")]
    pub user_id: Option<UserIdSource>,
}

impl RunOptions {
    pub async fn load(path: &Path) -> Result<Self, BoxError> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read options file at path '{}'", path.display()))?;
        let options = serde_json::from_slice(&bytes)
            .with_context(|| format!("json decode options file at path '{}'", path.display()))?;
        Ok(options)
    }

    /// Merge two option sets, properties of `overwrite` win over `base`.
    pub fn merge(base: Self, overwrite: Self) -> Self {
        macro_rules! merge_options {
            ($base:ident, $overwrite:ident, {$($property:ident),+ $(,)?}) => {
                RunOptions {
                    $(
                        $property: if let Some(value) = $overwrite.$property {
                            tracing::info!("property '{}': use overwrite: {value:?}", stringify!($property));
                            Some(value)
                        } else if let Some(value) = $base.$property {
                            tracing::info!("property '{}': use options file: {value:?}", stringify!($property));
                            Some(value)
                        } else {
                            tracing::debug!("property '{}': undefined, use default", stringify!($property));
                            None
                        },
                    )+
                }
            };
        }

        merge_options!(
            base, overwrite,
            {
                vus,
                duration,
                sleep,
                timeout,
                graceful_stop,
                user_id,
            }
        )
    }
}
