// Physio Schedule
// Command line entry point

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use physio_schedule::models::appointment::AppointmentRecord;
use physio_schedule::models::recurrence::RecurringSeries;
use physio_schedule::models::tenant::TenantId;
use physio_schedule::services::appointment::AppointmentService;
use physio_schedule::services::database::Database;
use physio_schedule::services::layout::layout_appointments;
use physio_schedule::services::realtime::{publish_refresh, SqliteRefreshChannel};
use physio_schedule::services::recurrence::{
    generate_dates, CancelToken, OccurrenceService, RecurrenceExpander, SeriesService,
};
use physio_schedule::services::settings::SettingsService;
use physio_schedule::utils::date::parse_date;

#[derive(Parser)]
#[command(name = "physio-schedule")]
#[command(about = "Appointment scheduling core for physiotherapy clinics", long_about = None)]
struct Cli {
    /// Database file (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Init,
    /// Import appointments from a JSON array of platform records
    Import {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the grid layout of one day
    Layout {
        #[arg(long)]
        tenant: String,
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,
    },
    /// Store a recurring series read from a JSON file
    AddSeries {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the occurrence dates of a series definition without storing it
    SeriesPreview {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_parser = parse_date_arg)]
        horizon: NaiveDate,
    },
    /// Materialize a stored series up to a horizon and notify other clients
    Expand {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        series: String,
        #[arg(long, value_parser = parse_date_arg)]
        horizon: NaiveDate,
    },
    /// Show display settings, or change the card height multiplier
    Settings {
        #[arg(long)]
        multiplier: Option<f64>,
    },
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).ok_or_else(|| format!("'{}' is not a YYYY-MM-DD date", value))
}

fn parse_tenant(value: &str) -> Result<TenantId> {
    TenantId::new(value).map_err(|e| anyhow!(e))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(Database::default_path);
    log::info!("Starting physio-schedule with database {}", db_path.display());

    let db = Database::open_initialized(&db_path)?;

    match cli.command {
        Commands::Init => {
            println!("Schema ready at {}.", db_path.display());
        }
        Commands::Import { tenant, file } => {
            let tenant = parse_tenant(&tenant)?;
            let records: Vec<AppointmentRecord> = read_json(&file)?;
            let report = AppointmentService::new(db.connection()).import_records(&tenant, records)?;

            println!("Imported {} appointments.", report.imported);
            for skipped in &report.skipped {
                println!("  skipped: {}", skipped);
            }
            if report.imported > 0 {
                publish_refresh(&SqliteRefreshChannel::new(db), &tenant)?;
            }
        }
        Commands::Layout { tenant, date } => {
            let tenant = parse_tenant(&tenant)?;
            let grid = SettingsService::new(&db).get_or_default().grid_config();

            let (mut appointments, skipped) = AppointmentService::new(db.connection())
                .fetch_appointments_with_skipped(&tenant, date, date)?;
            for record in &skipped {
                eprintln!("skipped: {}", record);
            }
            let series = SeriesService::new(db.connection());
            for occurrence in OccurrenceService::new(db.connection()).list_in_range(&tenant, date, date)? {
                match series.get(&tenant, &occurrence.series_id)? {
                    Some(parent) => appointments.push(occurrence.to_appointment(&parent)),
                    None => log::warn!(
                        "Occurrence {} refers to missing series {}",
                        occurrence.id,
                        occurrence.series_id
                    ),
                }
            }

            let layout = layout_appointments(&appointments, date, &grid);
            println!("{}", serde_json::to_string_pretty(&layout.placed)?);
        }
        Commands::AddSeries { tenant, file } => {
            let tenant = parse_tenant(&tenant)?;
            let mut series: RecurringSeries = read_json(&file)?;
            series.tenant_id = tenant;
            if series.id.trim().is_empty() {
                series.id = uuid::Uuid::new_v4().to_string();
            }

            let stored = SeriesService::new(db.connection()).create(series)?;
            println!("Stored series {}.", stored.id);
        }
        Commands::SeriesPreview { file, horizon } => {
            let series: RecurringSeries = read_json(&file)?;
            series.validate().map_err(|e| anyhow!("Invalid series: {}", e))?;

            let dates: Vec<String> = generate_dates(&series, horizon)
                .iter()
                .map(|start| start.format("%Y-%m-%dT%H:%M").to_string())
                .collect();
            println!("{}", serde_json::to_string_pretty(&dates)?);
        }
        Commands::Expand {
            tenant,
            series,
            horizon,
        } => {
            let tenant = parse_tenant(&tenant)?;
            let settings = SettingsService::new(&db).get_or_default();
            let series = SeriesService::new(db.connection())
                .get(&tenant, &series)?
                .ok_or_else(|| anyhow!("Series {} not found", series))?;

            let expander =
                RecurrenceExpander::new(Arc::new(Mutex::new(db)), settings.write_timeout());
            let report = expander
                .expand_with_retry(&series, horizon, &CancelToken::new())
                .await?;

            println!(
                "Materialized {} occurrences ({} already present).",
                report.created_count(),
                report.already_present
            );

            if !report.is_empty() {
                // The expander owns the connection now; signal through a fresh one.
                let signal_db = Database::open_initialized(&db_path)?;
                publish_refresh(&SqliteRefreshChannel::new(signal_db), &tenant)?;
            }
        }
        Commands::Settings { multiplier } => {
            let service = SettingsService::new(&db);
            let mut settings = service.get()?;

            if let Some(multiplier) = multiplier {
                settings.card_height_multiplier = multiplier;
                service.update(&settings)?;
                log::info!("Card height multiplier set to {}", multiplier);
            }

            let grid = settings.grid_config();
            println!("card_height_multiplier: {}", settings.card_height_multiplier);
            println!("pixels_per_minute: {:.3}", grid.pixels_per_minute());
            println!("day: {} - {}", settings.day_start_time, settings.day_end_time);
            println!("recurrence_horizon_days: {}", settings.recurrence_horizon_days);
        }
    }

    Ok(())
}
