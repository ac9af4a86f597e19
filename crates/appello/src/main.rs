use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use appello::config::Config;
use appello::dates;
use appello::report;
use appello::server::{self, AppState};
use appello::sheet::AttendanceSheet;
use appello::store::{self, AttendanceStore, Backend};
use appello::types::{Class, ExportFilter};

#[derive(Parser, Debug)]
#[command(name = "appello")]
#[command(about = "Track class rosters and daily attendance")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Storage backend (overrides APPELLO_BACKEND)
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// Data directory (overrides APPELLO_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Export attendance as CSV
    Export {
        /// First date (YYYY-MM-DD), open if omitted
        #[arg(long, default_value = "")]
        from: String,

        /// Last date (YYYY-MM-DD), open if omitted
        #[arg(long, default_value = "")]
        to: String,

        /// Class id or name
        #[arg(long)]
        class: Option<String>,

        #[arg(long)]
        division: Option<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Create the attendance sheet for a date, everyone absent
    InitSheet {
        /// Class id or name
        #[arg(long)]
        class: String,

        /// Date (YYYY-MM-DD), today if omitted
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        division: Option<String>,
    },

    /// Print per-student attendance for a date range
    Stats {
        /// Class id or name
        #[arg(long)]
        class: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=warn".parse()?);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
    Ok(())
}

/// Find a class by id, falling back to an exact name match
fn resolve_class(store: &dyn AttendanceStore, key: &str) -> Result<Class> {
    let classes = store.get_classes()?;
    classes
        .iter()
        .find(|c| c.id == key)
        .or_else(|| classes.iter().find(|c| c.name == key))
        .cloned()
        .with_context(|| format!("No class with id or name {key:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    let config = Config::from_env()?.with_overrides(args.backend, args.data_dir);
    let store = store::open_store(config.backend, &config.data_dir)
        .with_context(|| format!("Failed to open store in {}", config.data_dir.display()))?;

    match args.command {
        // Default to serve if no command specified
        None => {
            server::serve(8080, Arc::new(AppState { store, config })).await?;
        }
        Some(Commands::Serve { port }) => {
            server::serve(port, Arc::new(AppState { store, config })).await?;
        }
        Some(Commands::Export {
            from,
            to,
            class,
            division,
            out,
        }) => {
            for bound in [&from, &to].into_iter().filter(|d| !d.is_empty()) {
                dates::parse_date(bound)?;
            }
            let class_id = match class {
                Some(key) => Some(resolve_class(store.as_ref(), &key)?.id),
                None => None,
            };
            let filter = ExportFilter {
                start: from,
                end: to,
                class_id,
                division,
            };
            let csv = store.export_attendance_to_csv(&filter)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &csv)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "CSV saved");
                }
                None => print!("{csv}"),
            }
        }
        Some(Commands::InitSheet {
            class,
            date,
            division,
        }) => {
            let class = resolve_class(store.as_ref(), &class)?;
            let date = date.unwrap_or_else(|| dates::format_date(dates::today()));
            let mut sheet =
                AttendanceSheet::new(store.as_ref(), &class.id, division.as_deref(), &date)?;
            let mode = sheet.refresh()?;
            let rows = sheet.rows()?;
            info!(
                class = %class.name,
                date = %date,
                mode = ?mode,
                students = rows.len(),
                "Sheet ready"
            );
        }
        Some(Commands::Stats { class, from, to }) => {
            dates::parse_date(&from)?;
            dates::parse_date(&to)?;
            let class = resolve_class(store.as_ref(), &class)?;
            let students = store.get_students_by_class(&class.id)?;
            let stats = store.get_attendance_stats(&class.id, &from, &to)?;
            let summary = report::range_summary(&from, &to, &students, &stats, stats.total_days);

            println!("{} ({} to {}), {} days", class.name, from, to, summary.total_days);
            for row in &summary.students {
                println!(
                    "{:<8} {:<30} {:>4} present {:>4} absent {:>6.1}%",
                    row.student.tr_no,
                    row.student.name,
                    row.present_days,
                    row.absent_days,
                    row.attendance_rate
                );
            }
        }
    }

    Ok(())
}
