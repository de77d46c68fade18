//! Primary-then-fallback forecast resolution.

use crate::{
    Location, Mode,
    config::{Config, ConfigError},
    model::ProviderResult,
    provider::{ForecastProvider, ProviderError, ProviderId, provider_from_config},
};
use reqwest::Client;

/// Both the mode's primary provider and the fallback failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("all providers failed: {primary_id} ({primary}); {fallback_id} ({fallback})")]
pub struct AllProvidersFailed {
    pub primary_id: ProviderId,
    pub primary: ProviderError,
    pub fallback_id: ProviderId,
    pub fallback: ProviderError,
}

#[derive(Debug)]
pub struct FallbackCoordinator {
    primary: Box<dyn ForecastProvider>,
    fallback: Box<dyn ForecastProvider>,
}

impl FallbackCoordinator {
    pub fn new(primary: Box<dyn ForecastProvider>, fallback: Box<dyn ForecastProvider>) -> Self {
        Self { primary, fallback }
    }

    /// Wire up the providers `mode` uses from config.
    pub fn from_config(config: &Config, mode: Mode, http: Client) -> Result<Self, ConfigError> {
        let primary = provider_from_config(mode.primary_provider(), config, http.clone())?;
        let fallback = provider_from_config(mode.fallback_provider(), config, http)?;
        Ok(Self::new(primary, fallback))
    }

    /// Ask the primary provider, and on any error the fallback exactly once.
    ///
    /// A result obtained from the fallback is tagged `was_fallback`.
    pub async fn resolve_forecast(
        &self,
        location: &Location,
        mode: Mode,
    ) -> Result<ProviderResult, AllProvidersFailed> {
        let primary_err = match self.primary.fetch(location, mode).await {
            Ok(result) => {
                tracing::info!(
                    provider = %self.primary.id(),
                    entries = result.entries.len(),
                    "forecast resolved from primary provider"
                );
                return Ok(result);
            }
            Err(err) => err,
        };

        tracing::warn!(
            provider = %self.primary.id(),
            class = primary_err.class(),
            error = %primary_err,
            fallback = %self.fallback.id(),
            "primary provider failed, falling back"
        );

        match self.fallback.fetch(location, mode).await {
            Ok(mut result) => {
                result.provenance.was_fallback = true;
                tracing::info!(
                    provider = %self.fallback.id(),
                    entries = result.entries.len(),
                    "forecast resolved from fallback provider"
                );
                Ok(result)
            }
            Err(fallback_err) => {
                tracing::error!(
                    provider = %self.fallback.id(),
                    class = fallback_err.class(),
                    error = %fallback_err,
                    "fallback provider failed"
                );
                Err(AllProvidersFailed {
                    primary_id: self.primary.id(),
                    primary: primary_err,
                    fallback_id: self.fallback.id(),
                    fallback: fallback_err,
                })
            }
        }
    }
}
