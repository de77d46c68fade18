use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use inquire::{CustomType, Password, PasswordDisplayMode, Text};
use rainalert_core::{
    Config, ConsoleNotifier, FallbackCoordinator, Mode, Notifier, ProviderId, RunError,
    TelegramNotifier, config::DEFAULT_TIMEZONE, provider::http_client,
};
use std::path::PathBuf;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "rainalert",
    version,
    about = "Rain notifications for one location, meant to run from cron"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Which check to run.
    #[arg(long, value_enum, default_value_t = ModeArg::Daily)]
    pub mode: ModeArg,

    /// Print the message instead of sending it.
    #[arg(long)]
    pub dry_run: bool,

    /// Config file to use instead of the platform default.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Today's and tomorrow's rain summary.
    Daily,
    /// Rain expected in the next 30 minutes.
    Alert,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Daily => Mode::Daily,
            ModeArg::Alert => Mode::Alert,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set location, API keys and Telegram credentials.
    Configure,

    /// Show where the config file lives and what is configured.
    ShowConfig,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Some(Command::Configure) => self.configure(),
            Some(Command::ShowConfig) => self.show_config(),
            None => Ok(self.check(self.mode.into()).await?),
        }
    }

    fn config_path(&self) -> Result<PathBuf, RunError> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_file_path()?),
        }
    }

    async fn check(&self, mode: Mode) -> Result<(), RunError> {
        let path = self.config_path()?;
        let mut config = Config::load_from(&path)?;
        config.apply_env()?;
        config.validate_for(mode, !self.dry_run)?;

        let location = config.location()?;
        let http = http_client(config.http_timeout())?;
        let coordinator = FallbackCoordinator::from_config(&config, mode, http.clone())?;

        let notifier: Box<dyn Notifier> = if self.dry_run {
            Box::new(ConsoleNotifier)
        } else {
            let (token, chat_id) = config.telegram_credentials()?;
            Box::new(TelegramNotifier::new(
                token.to_owned(),
                chat_id.to_owned(),
                http,
            ))
        };

        tracing::info!(%mode, dry_run = self.dry_run, "starting run");

        let outcome =
            rainalert_core::run(&coordinator, notifier.as_ref(), &location, mode, Utc::now())
                .await?;

        tracing::info!(?outcome, "run finished");
        Ok(())
    }

    fn configure(&self) -> anyhow::Result<()> {
        let path = self.config_path()?;
        let mut config = Config::load_from(&path)?;

        println!("Configuring rainalert ({})", path.display());

        let latitude = coordinate("Latitude:", config.location.latitude, "3.1073")?;
        let longitude = coordinate("Longitude:", config.location.longitude, "101.6067")?;

        let name = text(
            "MET Malaysia location name (district or town):",
            config.location.name.as_deref(),
        )?;
        let timezone = text(
            "Timezone:",
            Some(config.location.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)),
        )?;

        config.location.latitude = Some(latitude);
        config.location.longitude = Some(longitude);
        config.location.name = Some(name.trim().to_string()).filter(|s| !s.is_empty());
        config.location.timezone = Some(timezone.trim().to_string());
        config
            .timezone()
            .context("Unknown timezone; use an IANA name such as Asia/Kuala_Lumpur")?;

        for id in ProviderId::all() {
            let optional = if id.requires_api_key() { "" } else { ", optional" };
            let prompt = format!(
                "{} API key (blank keeps current{optional}):",
                id.display_name()
            );
            let key = secret(&prompt)?;
            if !key.is_empty() {
                config.upsert_provider_api_key(*id, key);
            }
        }

        let token = secret("Telegram bot token (blank keeps current):")?;
        if !token.is_empty() {
            config.telegram.bot_token = Some(token);
        }
        let chat_id = text("Telegram chat id:", config.telegram.chat_id.as_deref())?;
        config.telegram.chat_id = Some(chat_id.trim().to_string()).filter(|s| !s.is_empty());

        config.save_to(&path)?;
        println!("Saved configuration to {}", path.display());

        Ok(())
    }

    fn show_config(&self) -> anyhow::Result<()> {
        let path = self.config_path()?;
        let mut config = Config::load_from(&path)?;
        config.apply_env()?;

        println!("Config file: {}", path.display());
        println!(
            "Location: {}, {} ({})",
            opt_to_string(config.location.latitude),
            opt_to_string(config.location.longitude),
            config.location.name.as_deref().unwrap_or("no name filter"),
        );
        println!(
            "Timezone: {}",
            config.location.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
        );
        for id in ProviderId::all() {
            let state = if config.is_provider_configured(*id) {
                "configured"
            } else {
                "not configured"
            };
            println!("{}: {state}", id.display_name());
        }
        println!(
            "Telegram: {}",
            if config.telegram_credentials().is_ok() {
                "configured"
            } else {
                "not configured"
            }
        );
        println!("HTTP timeout: {}s", config.http_timeout().as_secs());

        Ok(())
    }
}

fn secret(prompt: &str) -> anyhow::Result<String> {
    let value = Password::new(prompt)
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
        .with_context(|| format!("Failed to read input for '{prompt}'"))?;
    Ok(value.trim().to_string())
}

fn coordinate(prompt: &str, current: Option<f64>, example: &str) -> anyhow::Result<f64> {
    let error_message = format!("Please enter a number, e.g. {example}");
    let mut input = CustomType::<f64>::new(prompt).with_error_message(&error_message);
    if let Some(value) = current {
        input = input.with_default(value);
    }
    input
        .prompt()
        .with_context(|| format!("Failed to read input for '{prompt}'"))
}

fn text(prompt: &str, current: Option<&str>) -> anyhow::Result<String> {
    let mut input = Text::new(prompt);
    if let Some(value) = current {
        input = input.with_default(value);
    }
    let value = input
        .prompt()
        .with_context(|| format!("Failed to read input for '{prompt}'"))?;
    Ok(value.trim().to_string())
}

fn opt_to_string(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
