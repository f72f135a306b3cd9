use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ca_booking::{conversation_summary, BookingAgent, MeetingIntent, Negotiation, ProgressCallback};
use ca_calendar::{BookingPreferences, CalendarEngine, EventStore};
use ca_domain::config::Config;
use ca_peer::PeerClient;
use ca_store::JsonFileStore;
use ca_tools::{NlDispatcher, ToolDispatcher};

mod chat;
mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = if cli.config.exists() {
        Config::load(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        tracing::debug!(path = %cli.config.display(), "no config file, using defaults");
        Config::default()
    };

    match cli.command {
        Command::Book {
            endpoint,
            target,
            date,
            time,
            duration,
            title,
            verbose,
        } => {
            let runtime = Runtime::build(&config)?;
            let intent = MeetingIntent {
                date,
                time,
                duration: Some(duration),
                title,
                description: None,
                partner_agent_id: Some(target.clone()),
            };
            book(&config, runtime, endpoint, target, intent, verbose).await
        }
        Command::Slots { start, end, duration } => {
            let runtime = Runtime::build(&config)?;
            let result = runtime.tools.dispatch(
                "requestAvailableSlots",
                &serde_json::json!({
                    "start_date": start,
                    "end_date": end,
                    "duration": duration,
                }),
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Events { status } => {
            let runtime = Runtime::build(&config)?;
            let mut args = serde_json::json!({});
            if let Some(status) = status {
                args["status"] = serde_json::json!(status);
            }
            let result = runtime.tools.dispatch("getCalendarEvents", &args);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Propose {
            start,
            duration,
            partner,
            title,
        } => {
            let runtime = Runtime::build(&config)?;
            let mut args = serde_json::json!({
                "start_time": start,
                "duration": duration,
                "partner_agent_id": partner,
            });
            if let Some(title) = title {
                args["title"] = serde_json::json!(title);
            }
            let result = runtime.tools.dispatch("requestBooking", &args);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Chat { partner } => {
            let runtime = Runtime::build(&config)?;
            let provider = ca_providers::build_provider(&config.llm)?;
            let nl = NlDispatcher::new(provider, runtime.tools.clone());
            chat::run(nl, partner).await
        }
        Command::Prefs {
            start_hour,
            end_hour,
            buffer,
            allow_back_to_back,
            block,
            unblock,
            instructions,
        } => {
            let runtime = Runtime::build(&config)?;
            let mut prefs = runtime.prefs.clone();
            let mut changed = false;

            if let Some(hour) = start_hour {
                prefs.preferred_start_hour = hour;
                changed = true;
            }
            if let Some(hour) = end_hour {
                prefs.preferred_end_hour = hour;
                changed = true;
            }
            if let Some(minutes) = buffer {
                prefs.buffer_between_meetings = minutes;
                changed = true;
            }
            if let Some(allow) = allow_back_to_back {
                prefs.allow_back_to_back = allow;
                changed = true;
            }
            if let Some(partner) = block {
                if !prefs.blocked_partners.contains(&partner) {
                    prefs.blocked_partners.push(partner);
                }
                changed = true;
            }
            if let Some(partner) = unblock {
                prefs.blocked_partners.retain(|p| p != &partner);
                changed = true;
            }
            if let Some(text) = instructions {
                prefs.instructions = text;
                changed = true;
            }

            if changed {
                prefs.validate().context("updated preferences invalid")?;
                runtime
                    .store
                    .save_preferences(&prefs)
                    .context("saving preferences")?;
            }
            println!("{}", serde_json::to_string_pretty(&prefs)?);
            Ok(())
        }
        Command::Config => {
            config.validate().context("config validation")?;
            println!("{}", toml::to_string_pretty(&config).context("rendering config")?);
            Ok(())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The shared pieces every command needs: durable store, calendar
/// engine, preferences, and the tool dispatcher over them.
struct Runtime {
    tools: Arc<ToolDispatcher>,
    prefs: BookingPreferences,
    store: Arc<JsonFileStore>,
}

impl Runtime {
    fn build(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            JsonFileStore::open(&config.store.state_path)
                .with_context(|| format!("opening store at {}", config.store.state_path.display()))?,
        );

        let prefs = store
            .load_preferences()
            .context("loading preferences")?
            .unwrap_or_default();
        prefs.validate().context("stored preferences invalid")?;

        let engine = Arc::new(
            CalendarEngine::with_store(config.agent.owner_id.clone(), store.clone())
                .context("loading calendar engine")?,
        );

        Ok(Self {
            tools: Arc::new(ToolDispatcher::new(engine, prefs.clone())),
            prefs,
            store,
        })
    }
}

async fn book(
    config: &Config,
    runtime: Runtime,
    endpoint: String,
    target: String,
    intent: MeetingIntent,
    verbose: bool,
) -> anyhow::Result<()> {
    let provider = ca_providers::build_provider(&config.llm)?;
    let agent = Arc::new(BookingAgent::new(
        config.agent.name.clone(),
        provider,
        "You negotiate calendar bookings on behalf of your owner. Be concise and professional.",
    ));
    let transport = Arc::new(PeerClient::new(
        config.peer.use_streaming,
        Duration::from_secs(config.peer.card_timeout_secs),
    )?);

    let mut negotiation = Negotiation::new(
        endpoint,
        target,
        intent,
        runtime.prefs.clone(),
        agent,
        transport,
        config.booking,
    );
    if verbose {
        negotiation = negotiation.with_progress(stderr_progress());
    }

    let outcome = negotiation.run().await;

    println!(
        "{}: {}",
        if outcome.success { "booked" } else { "failed" },
        outcome.message
    );
    if let Some(details) = &outcome.booking_details {
        println!("{}", serde_json::to_string_pretty(details)?);
    }
    eprintln!("\n{}", conversation_summary(&outcome.conversation_history));

    if outcome.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn stderr_progress() -> ProgressCallback {
    Arc::new(|turn, status, message| {
        Box::pin(async move {
            eprintln!("[turn {turn}] {status}: {message}");
        })
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CALAGENT_LOG")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
