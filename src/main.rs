use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use waste_ledger::config::Config;
use waste_ledger::warehouse::{SqliteWarehouse, Warehouse};
use waste_ledger::{AppState, build_router, heuristics, intake, ocr};

#[derive(Parser)]
#[command(version, about = "Waste photo and hauler invoice intake with diversion KPIs")]
struct Cli {
    /// TOML config; a missing file means built-in defaults.
    #[arg(long, env = "WASTE_LEDGER_CONFIG", default_value = "waste_ledger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default).
    Serve {
        /// Override `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// OCR + parse a local invoice and print the result as JSON.
    ParseInvoice { file: PathBuf },
    /// Print warehouse row counts and KPI totals.
    Stats,
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        Ok(Config::load(path)?)
    } else {
        info!(path = %path.display(), "Config not found — using defaults");
        Ok(Config::default())
    }
}

fn open_warehouse(cfg: &Config) -> Result<SqliteWarehouse, Box<dyn std::error::Error>> {
    let path = Path::new(&cfg.warehouse.db_path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    info!(db_path = %path.display(), "Opening warehouse");
    Ok(SqliteWarehouse::open(path)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Install crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(cfg, bind).await,
        Command::ParseInvoice { file } => parse_invoice(&cfg, &file).await,
        Command::Stats => stats(&cfg).await,
    }
}

async fn serve(cfg: Config, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = Arc::new(open_warehouse(&cfg)?);
    let state = AppState::from_config(&cfg, warehouse.clone());

    if cfg.kpi.seed_from_warehouse {
        match warehouse.kpi_totals().await {
            Ok(t) => {
                state.kpis.seed(t.recycle_kg, t.compost_kg, t.landfill_kg);
                info!(
                    recycle_kg = t.recycle_kg,
                    compost_kg = t.compost_kg,
                    landfill_kg = t.landfill_kg,
                    "KPI totals seeded from warehouse"
                );
            }
            Err(e) => warn!(error = %e, "Could not seed KPI totals — starting from zero"),
        }
    }

    let app = build_router(state, cfg.server.max_upload_bytes);
    let addr = bind.unwrap_or(cfg.server.bind);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "waste_ledger listening on http://{addr}"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

async fn parse_invoice(cfg: &Config, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(file)?;
    info!(file = %file.display(), bytes = bytes.len(), "Parsing invoice");

    let detector = ocr::from_config(&cfg.ocr);
    let text = intake::invoice_text(detector.as_ref(), &bytes).await;
    let parsed = heuristics::parse_invoice_text(&text);
    info!(
        lines = parsed.lines.len(),
        total_weight_kg = parsed.total_weight_kg(),
        total_cost_usd = parsed.total_cost_usd(),
        "Heuristic result"
    );
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

async fn stats(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = open_warehouse(cfg)?;
    let counts = warehouse.counts().await?;
    let totals = warehouse.kpi_totals().await?;
    info!(
        waste_events = counts.waste_events,
        invoices = counts.invoices,
        invoice_lines = counts.invoice_lines,
        "Warehouse statistics"
    );
    println!("{}", serde_json::to_string_pretty(&totals)?);
    Ok(())
}
