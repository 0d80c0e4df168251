use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{fmt, EnvFilter};

mod auth;
mod config;
mod db;
mod device;
mod models;
mod report;
mod stats;
mod store;
mod survey;

use config::Config;
use db::PgStore;
use device::DeviceGate;
use stats::{DateRange, RangePreset};
use store::{MemoryStore, ResponseStore, Responses};
use survey::{CancellationDraft, FollowupDraft, GatePolicy, Submission, SubmitOutcome};

#[derive(Parser)]
#[command(name = "cancellation-feedback")]
#[command(about = "Hotel cancellation feedback surveys and dashboard", long_about = None)]
struct Cli {
    /// Validate inputs and run the command against a throwaway in-process
    /// store; nothing persists past this invocation
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Credentials {
    #[arg(long, env = "FEEDBACK_USERNAME")]
    username: String,
    #[arg(long, env = "FEEDBACK_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
struct ContactArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
}

#[derive(Args)]
struct RangeArgs {
    #[arg(long, value_enum, default_value_t = RangeChoice::All)]
    range: RangeChoice,
    /// First day of a custom range (YYYY-MM-DD)
    #[arg(long, required_if_eq("range", "custom"))]
    from: Option<NaiveDate>,
    /// Last day of a custom range (YYYY-MM-DD)
    #[arg(long, required_if_eq("range", "custom"))]
    to: Option<NaiveDate>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RangeChoice {
    Today,
    Week,
    Month,
    All,
    Custom,
}

impl RangeArgs {
    fn resolve(&self) -> anyhow::Result<DateRange> {
        let preset = match self.range {
            RangeChoice::Today => RangePreset::Today,
            RangeChoice::Week => RangePreset::Week,
            RangeChoice::Month => RangePreset::Month,
            RangeChoice::All => RangePreset::All,
            RangeChoice::Custom => RangePreset::Custom {
                from: self.from.context("--from is required for a custom range")?,
                to: self.to.context("--to is required for a custom range")?,
            },
        };
        DateRange::resolve(preset, Utc::now()).context("invalid date range")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Print this device's identifier
    DeviceId,
    /// Answer the cancellation survey
    SubmitCancellation {
        #[arg(long, action = clap::ArgAction::Set)]
        proposal_adjusted: bool,
        #[arg(long, action = clap::ArgAction::Set)]
        attention_met: bool,
        #[arg(long, action = clap::ArgAction::Set)]
        found_alternative: bool,
        #[arg(long)]
        reason: String,
        #[command(flatten)]
        contact: ContactArgs,
        /// Refuse to submit when the gate cannot be checked
        #[arg(long)]
        fail_closed: bool,
    },
    /// Answer the follow-up survey
    SubmitFollowup {
        #[arg(long)]
        blocking_aspect: String,
        #[arg(long, action = clap::ArgAction::Set)]
        wants_adjustment: bool,
        #[arg(long)]
        team_attention: String,
        #[arg(long, action = clap::ArgAction::Set)]
        visit_or_call: bool,
        #[arg(long, action = clap::ArgAction::Set)]
        contact_24h: bool,
        #[command(flatten)]
        contact: ContactArgs,
        /// Refuse to submit when the gate cannot be checked
        #[arg(long)]
        fail_closed: bool,
    },
    /// Show aggregated statistics over every stored response
    Stats {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        json: bool,
    },
    /// List raw responses within a date range, newest first
    Responses {
        #[command(flatten)]
        credentials: Credentials,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        credentials: Credentials,
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export responses within a date range as CSV
    Export {
        #[command(flatten)]
        credentials: Credentials,
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Remove every gate record so all devices can answer again
    ClearGates {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        yes: bool,
    },
    /// Permanently delete every stored response
    Wipe {
        #[command(flatten)]
        credentials: Credentials,
        /// Must be exactly "DELETE ALL"
        #[arg(long)]
        confirm: String,
    },
}

impl Credentials {
    fn check(&self) -> anyhow::Result<()> {
        let account = auth::require_admin(&self.username, &self.password)?;
        tracing::debug!(username = account.username, "admin authenticated");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let (pool, store): (Option<PgPool>, Box<dyn ResponseStore>) = if cli.dry_run {
        tracing::info!("dry run, the in-process store is discarded on exit");
        (None, Box::new(MemoryStore::new()) as Box<dyn ResponseStore>)
    } else {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        (Some(pool.clone()), Box::new(PgStore::new(pool)) as Box<dyn ResponseStore>)
    };
    let store = store.as_ref();

    match cli.command {
        Commands::InitDb => {
            let pool = pool.context("init-db needs a database, drop --dry-run")?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store).await?;
            println!("Seed data inserted.");
        }
        Commands::DeviceId => {
            let device_id = device::get_or_create_device_id(&config.device_id_path)?;
            println!("{device_id}");
        }
        Commands::SubmitCancellation {
            proposal_adjusted,
            attention_met,
            found_alternative,
            reason,
            contact,
            fail_closed,
        } => {
            let device_id = device::get_or_create_device_id(&config.device_id_path)
                .context("failed to load device id")?;
            let draft = CancellationDraft {
                proposal_adjusted,
                attention_met,
                found_alternative,
                main_reason: reason,
                contact_name: contact.name,
                contact_phone: contact.phone,
            };
            let outcome = Submission::new(store, policy(fail_closed))
                .with_client(client_descriptor())
                .cancellation(&device_id, draft)
                .await
                .context("could not save your answers, please retry")?;
            print_outcome(outcome);
        }
        Commands::SubmitFollowup {
            blocking_aspect,
            wants_adjustment,
            team_attention,
            visit_or_call,
            contact_24h,
            contact,
            fail_closed,
        } => {
            let device_id = device::get_or_create_device_id(&config.device_id_path)
                .context("failed to load device id")?;
            let draft = FollowupDraft {
                blocking_aspect,
                wants_adjustment,
                team_attention,
                wants_visit_or_call: visit_or_call,
                wants_contact_24h: contact_24h,
                contact_name: contact.name,
                contact_phone: contact.phone,
            };
            draft.validate()?;
            let link = if draft.requests_contact() {
                Some(survey::contact_link(&config.contact_number, &draft)?)
            } else {
                None
            };
            let outcome = Submission::new(store, policy(fail_closed))
                .with_client(client_descriptor())
                .followup(&device_id, draft)
                .await
                .context("could not save your answers, please retry")?;
            let recorded = matches!(outcome, SubmitOutcome::Recorded(_));
            print_outcome(outcome);
            if let (true, Some(link)) = (recorded, link) {
                println!("Send your contact request: {link}");
            }
        }
        Commands::Stats { credentials, json } => {
            credentials.check()?;
            let (cancellations, followups) = load_all(store).await?;
            let statistics = stats::compute_statistics(&cancellations, &followups);
            if json {
                println!("{}", serde_json::to_string_pretty(&statistics)?);
            } else {
                print!(
                    "{}",
                    report::build_report(&statistics, None, &cancellations, &followups)
                );
            }
        }
        Commands::Responses { credentials, range } => {
            credentials.check()?;
            let range = range.resolve()?;
            let (cancellations, followups) = load_all(store).await?;
            let cancellations = range.apply(&cancellations);
            let followups = range.apply(&followups);

            println!("Cancellation surveys ({}):", cancellations.len());
            for r in &cancellations {
                println!(
                    "- {} adjusted={} attention={} alternative={} reason={:?}",
                    report::format_timestamp(r.submitted_at),
                    r.proposal_adjusted,
                    r.attention_met,
                    r.found_alternative,
                    r.main_reason
                );
            }
            println!("Follow-up surveys ({}):", followups.len());
            for r in &followups {
                println!(
                    "- {} aspect={:?} adjust={} attention={:?} visit={} contact24h={} contact={}",
                    report::format_timestamp(r.submitted_at),
                    r.blocking_aspect,
                    r.wants_adjustment,
                    r.team_attention,
                    r.wants_visit_or_call,
                    r.wants_contact_24h,
                    r.contact_phone.as_deref().unwrap_or("N/A")
                );
            }
        }
        Commands::Report {
            credentials,
            range,
            out,
        } => {
            credentials.check()?;
            let range = range.resolve()?;
            let (cancellations, followups) = load_all(store).await?;
            let cancellations = range.apply(&cancellations);
            let followups = range.apply(&followups);
            let statistics = stats::compute_statistics(&cancellations, &followups);
            let report = report::build_report(&statistics, Some(&range), &cancellations, &followups);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            credentials,
            range,
            out,
        } => {
            credentials.check()?;
            let range = range.resolve()?;
            let (cancellations, followups) = load_all(store).await?;
            let cancellations = range.apply(&cancellations);
            let followups = range.apply(&followups);
            let out = out.unwrap_or_else(|| {
                PathBuf::from(report::export_file_name(Utc::now().date_naive()))
            });
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::export_csv(std::io::BufWriter::new(file), &cancellations, &followups)?;
            println!(
                "Exported {} cancellation and {} follow-up responses to {}.",
                cancellations.len(),
                followups.len(),
                out.display()
            );
        }
        Commands::ClearGates { credentials, yes } => {
            credentials.check()?;
            anyhow::ensure!(yes, "pass --yes to let every device answer the surveys again");
            DeviceGate::new(store).clear_all().await?;
            println!("All gates removed; every device can answer again.");
        }
        Commands::Wipe {
            credentials,
            confirm,
        } => {
            credentials.check()?;
            anyhow::ensure!(confirm == "DELETE ALL", "operation cancelled");
            Responses::new(store).delete_all().await?;
            tracing::warn!("all survey responses deleted");
            println!("All responses deleted.");
        }
    }

    Ok(())
}

/// `RUST_LOG` when set and valid, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn policy(fail_closed: bool) -> GatePolicy {
    if fail_closed {
        GatePolicy::FailClosed
    } else {
        GatePolicy::FailOpen
    }
}

fn client_descriptor() -> String {
    format!(
        "{}/{} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

fn print_outcome(outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Recorded(_) => println!("Thank you, your answers were saved."),
        SubmitOutcome::AlreadyResponded => {
            println!("This device has already answered this survey.")
        }
    }
}

async fn load_all(
    store: &dyn ResponseStore,
) -> anyhow::Result<(Vec<models::CancellationResponse>, Vec<models::FollowupResponse>)> {
    let responses = Responses::new(store);
    let cancellations = responses
        .cancellations()
        .await
        .context("failed to load cancellation responses")?;
    let followups = responses
        .followups()
        .await
        .context("failed to load follow-up responses")?;
    Ok((cancellations, followups))
}
