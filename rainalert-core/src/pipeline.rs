//! One complete run: resolve, filter, decide, send.

use chrono::{DateTime, Utc};

use crate::{
    config::ConfigError,
    fallback::{AllProvidersFailed, FallbackCoordinator},
    message::{NoOpReason, Outcome, build_message},
    model::{Location, Mode, Provenance},
    notify::{Notifier, NotifyError},
    window::filter_window,
};

/// Errors that end a run with a non-zero exit.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    AllProvidersFailed(#[from] AllProvidersFailed),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl RunError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::HttpClient(_) => 1,
            Self::Config(_) => 2,
            Self::AllProvidersFailed(_) => 3,
            Self::Notify(_) => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Sent { provenance: Provenance },
    Skipped(NoOpReason),
}

/// Run the pipeline once for `mode` at `now`.
///
/// Nothing reaches `notifier` when every provider fails or the decision is a
/// no-op.
pub async fn run(
    coordinator: &FallbackCoordinator,
    notifier: &dyn Notifier,
    location: &Location,
    mode: Mode,
    now: DateTime<Utc>,
) -> Result<RunOutcome, RunError> {
    let result = coordinator.resolve_forecast(location, mode).await?;

    let window = filter_window(&result.entries, mode, now, location.timezone);
    tracing::debug!(
        %mode,
        entries = window.entries.len(),
        approximate = window.approximate,
        "filtered forecast window"
    );

    match build_message(&window, mode, result.provenance, now, location.timezone) {
        Outcome::Send(message) => {
            notifier.send(message.as_str()).await?;
            Ok(RunOutcome::Sent {
                provenance: result.provenance,
            })
        }
        Outcome::NoOp(reason) => {
            match reason {
                NoOpReason::Dry => tracing::info!(%mode, "no rain in window, nothing to send"),
                NoOpReason::NoData => tracing::warn!(
                    %mode,
                    provider = %result.provenance.provider,
                    "no forecast data covers the window, nothing to send"
                ),
            }
            Ok(RunOutcome::Skipped(reason))
        }
    }
}
