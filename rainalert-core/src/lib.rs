//! Core library for the `rainalert` CLI.
//!
//! This crate defines:
//! - Weather provider adapters normalized to one forecast representation
//! - Primary/fallback forecast resolution
//! - Time-window filtering and the rain decision / message rendering
//! - Notification delivery and configuration handling
//!
//! It is used by `rainalert-cli`, but the pipeline can be driven by any binary.

pub mod config;
pub mod fallback;
pub mod message;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod provider;
pub mod window;

pub use config::{Config, ConfigError, ProviderConfig};
pub use fallback::{AllProvidersFailed, FallbackCoordinator};
pub use message::{NoOpReason, Outcome, RenderedMessage, build_message};
pub use model::{ForecastEntry, Location, Mode, Provenance, ProviderResult, WeatherCategory};
pub use notify::{ConsoleNotifier, Notifier, NotifyError, TelegramNotifier};
pub use pipeline::{RunError, RunOutcome, run};
pub use provider::{ForecastProvider, ProviderError, ProviderId};
pub use window::{WindowedForecast, filter_window};
