//! RAM Cleaner Interval - console host
//!
//! Hosts the plugin outside the game: settings come from a TOML file, the
//! session state is driven from the console.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use ram_cleaner_interval::core::{self, release::MallocTrimResolver};
use ram_cleaner_interval::plugin::{
    Plugin, PluginContext, RamCleanerPlugin, SessionSnapshot, SettingKey, SettingValue,
    SettingsStore, SharedSessionState,
};

/// One line typed at the console
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Debug, Subcommand)]
enum ConsoleCommand {
    /// Show the plugin and timer status
    Status,
    /// Run the RAM cleaner now
    Clean,
    /// Turn the interval on
    Enable,
    /// Turn the interval off
    Disable,
    /// Set the number of seconds between runs
    Interval { secs: u64 },
    /// Only run while in an active session (on|off)
    OnlyInSession {
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Move the player to a location, or `none` to leave the world
    Session { location: String },
    /// Shut down and exit
    Quit,
}

fn parse_switch(value: &str) -> std::result::Result<bool, String> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

struct Console {
    plugin: RamCleanerPlugin,
    settings: Arc<SettingsStore>,
    session: Arc<SharedSessionState>,
}

impl Console {
    /// Run one command; returns false when the console should close
    fn execute(&self, command: ConsoleCommand) -> core::Result<bool> {
        match command {
            ConsoleCommand::Status => self.print_status()?,
            ConsoleCommand::Clean => {
                let outcome = self.plugin.clean_now()?;
                println!("clean: {:?}", outcome);
            }
            ConsoleCommand::Enable => self
                .settings
                .set(SettingKey::IntervalEnabled, SettingValue::Bool(true))?,
            ConsoleCommand::Disable => self
                .settings
                .set(SettingKey::IntervalEnabled, SettingValue::Bool(false))?,
            ConsoleCommand::Interval { secs } => self
                .settings
                .set(SettingKey::IntervalSeconds, SettingValue::Int(secs))?,
            ConsoleCommand::OnlyInSession { enabled } => self
                .settings
                .set(SettingKey::OnlyInSession, SettingValue::Bool(enabled))?,
            ConsoleCommand::Session { location } => {
                if location.eq_ignore_ascii_case("none") {
                    self.session.clear()?;
                } else {
                    self.session.update(SessionSnapshot::in_location(location))?;
                }
            }
            ConsoleCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn print_status(&self) -> core::Result<()> {
        let settings = self.settings.settings()?;
        let session = self.session.snapshot()?;

        println!("plugin:          {}", self.plugin.state());
        println!("interval:        {}s (enabled: {})", settings.interval_seconds, settings.interval_enabled);
        println!("only in session: {}", settings.only_in_session);
        println!(
            "session:         {} (active: {})",
            session.main_player_location.as_deref().unwrap_or("none"),
            session.is_active()
        );

        if let Some(trigger) = self.plugin.trigger() {
            match trigger.next_tick_at() {
                Some(at) => println!(
                    "next tick in:    {}s",
                    at.saturating_duration_since(Instant::now()).as_secs()
                ),
                None => println!("next tick in:    disarmed"),
            }
            match serde_json::to_string_pretty(&trigger.stats()) {
                Ok(stats) => println!("stats: {}", stats),
                Err(e) => warn!(error = %e, "Failed to render stats"),
            }
        }

        Ok(())
    }
}

async fn run_console(console: &Console) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Commands: status, clean, enable, disable, interval <secs>, only-in-session <on|off>, session <location|none>, quit");

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => line?,
        };

        // End of input
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match ConsoleLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                let _ = e.print();
                continue;
            }
        };

        match console.execute(command) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting RAM cleaner host v{}", ram_cleaner_interval::VERSION);
    info!(
        path = ?config.settings.path,
        watch = config.settings.watch,
        "Settings configuration"
    );

    let settings = Arc::new(SettingsStore::open(&config.settings.path)?);
    let _watcher = if config.settings.watch {
        match settings.watch() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "Settings file will not be reloaded on change");
                None
            }
        }
    } else {
        None
    };

    let session = Arc::new(SharedSessionState::new());
    let context = PluginContext::new(
        settings.clone(),
        session.clone(),
        Arc::new(MallocTrimResolver),
        Handle::current(),
    );

    let plugin = RamCleanerPlugin::new();
    if let Err(e) = plugin.initialize(&context).await {
        error!(error = %e, "RAM cleaner is inactive");
    }

    let console = Console {
        plugin,
        settings,
        session,
    };
    run_console(&console).await?;

    console.plugin.shutdown().await?;
    info!("RAM cleaner host stopped");

    Ok(())
}
