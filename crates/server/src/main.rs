//! Trade-Sim: Monte Carlo outcome simulator for trading models
//!
//! Usage:
//!   trade-sim serve --port 3001                  # HTTP API
//!   trade-sim run --model-id 3 --seed 42         # one-shot simulation from CLI
//!   trade-sim register-model --name x --pair BTC/USDT --win-rate 57

mod api;
mod config;
mod error;
mod records;

use clap::{Parser, Subcommand};
use engine::{
    simulate_with_deadline, ResolutionMode, SimulationRequest, SimulationResponse,
};
use persistence::repository::{ModelBackupRecord, ModelRepository, SimulationRunRepository};
use tracing::{error, info};

use crate::api::AppState;
use crate::config::AppConfig;
use crate::records::{compute_params_hash, response_to_record};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "trade-sim")]
#[command(about = "Monte Carlo outcome simulator for trading models", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, env = "TRADE_SIM_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, env = "TRADE_SIM_PORT", default_value_t = 3001)]
        port: u16,
    },
    /// Run one simulation and print the summary (no web server)
    Run {
        /// Registered model to take the win rate from
        #[arg(long)]
        model_id: Option<i64>,
        /// Win rate in percent, used when no model is given
        #[arg(long, default_value_t = 50.0)]
        win_rate: f64,
        /// Label for the narrative when no model is given
        #[arg(long, default_value = "BTC/USDT")]
        pair: String,
        #[arg(long, default_value_t = 1000)]
        simulations: u32,
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long, default_value_t = 3.0)]
        trades_per_day: f64,
        /// Risk per trade in percent of capital
        #[arg(long, default_value_t = 1.0)]
        risk: f64,
        #[arg(long, default_value_t = 1.5)]
        reward_ratio: f64,
        #[arg(long, default_value_t = 10000.0)]
        capital: f64,
        /// Disable the 0.1% trading fee
        #[arg(long)]
        no_fees: bool,
        /// Resolution mode: per_trade, daily_poisson
        #[arg(long, default_value = "per_trade")]
        mode: String,
        /// Fixed seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<String>,
    },
    /// List registered models
    Models {
        /// Only models for this pair
        #[arg(long)]
        pair: Option<String>,
    },
    /// Register a trained model and its measured win rate
    RegisterModel {
        #[arg(long)]
        name: String,
        #[arg(long)]
        pair: String,
        #[arg(long, default_value = "1h")]
        timeframe: String,
        /// Backtested win rate in percent
        #[arg(long)]
        win_rate: Option<f64>,
        /// Share of positive predictions (0-1), used when no win rate is known
        #[arg(long)]
        positive_rate: Option<f64>,
        #[arg(long)]
        description: Option<String>,
        /// Make this the active model
        #[arg(long)]
        activate: bool,
    },
    /// Show recent simulation runs
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long)]
        model_id: Option<i64>,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,trade_sim=debug")
    } else {
        EnvFilter::new("info,engine=info,persistence=info,trade_sim=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap's env fallbacks can see it
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(cli.config, &host, port).await?;
        }
        Commands::Run {
            model_id,
            win_rate,
            pair,
            simulations,
            days,
            trades_per_day,
            risk,
            reward_ratio,
            capital,
            no_fees,
            mode,
            seed,
            export,
        } => {
            let mode: ResolutionMode = mode.parse()?;
            let request = SimulationRequest {
                simulations,
                trading_days: days,
                trades_per_day,
                risk_per_trade: risk,
                risk_reward_ratio: reward_ratio,
                initial_capital: capital,
                consider_fees: !no_fees,
                mode,
                seed,
                ..SimulationRequest::for_model(model_id.unwrap_or_default())
            };
            cmd_run(cli.config, request, model_id, win_rate, pair, export).await?;
        }
        Commands::Models { pair } => {
            cmd_models(cli.config, pair).await?;
        }
        Commands::RegisterModel {
            name,
            pair,
            timeframe,
            win_rate,
            positive_rate,
            description,
            activate,
        } => {
            let record = ModelBackupRecord {
                win_rate_pct: win_rate,
                positive_rate,
                description,
                ..ModelBackupRecord::new(&name, &pair, &timeframe)
            };
            cmd_register_model(cli.config, record, activate).await?;
        }
        Commands::History { limit, model_id } => {
            cmd_history(cli.config, limit, model_id).await?;
        }
    }

    Ok(())
}

async fn open_database(config: &AppConfig) -> anyhow::Result<persistence::Database> {
    persistence::Database::new(&config.db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })
}

// ============================================================================
// Serve command: Axum web server
// ============================================================================

async fn cmd_serve(config: AppConfig, host: &str, port: u16) -> anyhow::Result<()> {
    info!("Trade-Sim v{} starting...", APP_VERSION);

    let db = open_database(&config).await?;
    info!("Database initialized: {}", config.db_path);

    let db_path = config.db_path.clone();
    let max_simulations = config.limits().max_simulations;
    let app = api::router(AppState::new(db, config));

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Trade-Sim v{} ===", APP_VERSION);
    println!("Monte Carlo Simulation Server");
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/models              - List registered models");
    println!("  POST /api/models              - Register a model");
    println!("  POST /api/simulate            - Run a simulation (synchronous)");
    println!("  POST /api/simulate/start      - Start a background simulation");
    println!("  GET  /api/simulate/status     - Poll background progress");
    println!("  POST /api/simulate/cancel     - Cancel the background simulation");
    println!("  GET  /api/history             - Recent simulation runs");
    println!("  GET  /api/history/stats       - Run history stats");
    println!("\n  Database: {}", db_path);
    println!("  Max simulations per request: {}", max_simulations);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Run command: CLI mode (no web server)
// ============================================================================

async fn cmd_run(
    config: AppConfig,
    request: SimulationRequest,
    model_id: Option<i64>,
    win_rate_pct: f64,
    pair: String,
    export: Option<String>,
) -> anyhow::Result<()> {
    println!("\n=== Trade-Sim v{} ===", APP_VERSION);

    // A registered model supplies both the win rate and the label
    let db = match model_id {
        Some(_) => Some(open_database(&config).await?),
        None => None,
    };
    let model = match (&db, model_id) {
        (Some(db), Some(id)) => Some(
            ModelRepository::new(db.pool())
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Model {} not found", id))?,
        ),
        _ => None,
    };
    let (subject, base_win_rate) = match &model {
        Some(m) => (m.pair.clone(), m.base_win_rate()),
        None => (pair, (win_rate_pct / 100.0).clamp(0.0, 1.0)),
    };

    let sim_config = request.into_config(base_win_rate).with_resolved_seed();
    println!(
        "Subject: {} | Win rate: {:.1}% | Mode: {}",
        subject,
        base_win_rate * 100.0,
        sim_config.mode
    );
    println!(
        "Simulations: {} | Days: {} | Trades/day: {} | Risk: {:.2}% | R:R {:.2}",
        sim_config.num_simulations,
        sim_config.trading_days,
        sim_config.trades_per_day,
        sim_config.risk_per_trade * 100.0,
        sim_config.risk_reward_ratio
    );
    if let Some(seed) = sim_config.seed {
        println!("Seed: {} (pass --seed {} to replay)", seed, seed);
    }
    println!();

    let response = simulate_with_deadline(
        sim_config.clone(),
        config.limits(),
        subject.clone(),
        config.deadline(),
    )
    .await?;

    print_summary(&response);

    if let (Some(db), Some(model)) = (&db, &model) {
        let hash = compute_params_hash(model.id.unwrap_or_default(), &sim_config);
        let record = response_to_record(&hash, model, &sim_config, &response)?;
        SimulationRunRepository::new(db.pool()).save(&record).await?;
    }

    if let Some(export_path) = export {
        let json = serde_json::to_string_pretty(&response)?;
        std::fs::write(&export_path, &json)?;
        println!("\nResults exported to {}", export_path);
    }

    Ok(())
}

fn print_summary(response: &SimulationResponse) {
    let r = &response.results;
    let profit_factor = if r.profit_factor.is_infinite() {
        "inf".to_string()
    } else {
        format!("{:.2}", r.profit_factor)
    };

    println!("Results ({} simulations):", r.simulations_run);
    println!("  {}", "-".repeat(48));
    println!("  {:<28} {:>+16.2}", "Mean profit", r.mean_profit_abs);
    println!("  {:<28} {:>+15.2}%", "Mean profit %", r.mean_profit_pct);
    println!("  {:<28} {:>15.1}%", "Success rate", r.success_rate);
    println!("  {:<28} {:>16}", "Profit factor", profit_factor);
    if let Some(sharpe) = r.sharpe_ratio {
        println!("  {:<28} {:>16.2}", "Sharpe-like ratio", sharpe);
    }
    println!(
        "  {:<28} {:>15.1}%",
        "Max drawdown (mean)", r.max_drawdown.mean
    );
    println!("  {:<28} {:>15.1}%", "Max drawdown (p90)", r.max_drawdown.p90);

    println!("\nFinal balance percentiles:");
    let p = &r.profit_percentiles;
    println!(
        "  {:>12} {:>12} {:>12} {:>12} {:>12}",
        "p10", "p25", "p50", "p75", "p90"
    );
    println!(
        "  {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
        p.p10, p.p25, p.p50, p.p75, p.p90
    );

    let a = &response.ai_analysis;
    println!("\nRisk: {}", a.risk_level);
    println!("  {}", a.risk_assessment);
    if !a.optimizations.is_empty() {
        println!("\nSuggestions:");
        for rec in &a.optimizations {
            println!(
                "  {:<18} {:>10} -> {:<28} {}",
                rec.parameter, rec.current, rec.suggested, rec.impact
            );
        }
    }
    println!("\n{}", a.advanced_suggestion);
}

// ============================================================================
// Registry & history commands
// ============================================================================

async fn cmd_models(config: AppConfig, pair: Option<String>) -> anyhow::Result<()> {
    let db = open_database(&config).await?;
    let models = ModelRepository::new(db.pool()).list(pair.as_deref()).await?;

    if models.is_empty() {
        println!("No models registered.");
        return Ok(());
    }

    println!(
        "  {:>4}  {:<24} {:<12} {:<6} {:>8}  {}",
        "ID", "Model", "Pair", "TF", "WR%", "Active"
    );
    println!("  {}", "-".repeat(66));
    for m in &models {
        println!(
            "  {:>4}  {:<24} {:<12} {:<6} {:>7.1}%  {}",
            m.id.unwrap_or_default(),
            m.model_name,
            m.pair,
            m.timeframe,
            m.base_win_rate() * 100.0,
            if m.is_active { "*" } else { "" }
        );
    }
    Ok(())
}

async fn cmd_register_model(
    config: AppConfig,
    record: ModelBackupRecord,
    activate: bool,
) -> anyhow::Result<()> {
    let db = open_database(&config).await?;
    let repo = ModelRepository::new(db.pool());
    let id = repo.save(&record).await?;
    if activate {
        repo.activate(id).await?;
    }
    info!(id, model = %record.model_name, pair = %record.pair, "Model registered");
    println!(
        "Registered model {} ({} {}) with win rate {:.1}%",
        id,
        record.pair,
        record.timeframe,
        record.base_win_rate() * 100.0
    );
    Ok(())
}

async fn cmd_history(config: AppConfig, limit: i64, model_id: Option<i64>) -> anyhow::Result<()> {
    let db = open_database(&config).await?;
    let repo = SimulationRunRepository::new(db.pool());
    let runs = repo.recent(limit, model_id).await?;
    let stats = repo.stats().await?;

    println!(
        "History: {} runs over {} models, average success rate {}%",
        stats.total_runs, stats.unique_models, stats.avg_success_rate
    );
    if runs.is_empty() {
        return Ok(());
    }

    println!(
        "\n  {:>4}  {:<12} {:<14} {:>6} {:>5} {:>10} {:>8} {:>8}  {}",
        "ID", "Pair", "Mode", "Sims", "Days", "Profit%", "Succ%", "PF", "Risk"
    );
    println!("  {}", "-".repeat(90));
    for r in &runs {
        println!(
            "  {:>4}  {:<12} {:<14} {:>6} {:>5} {:>10} {:>8} {:>8}  {}",
            r.id.unwrap_or_default(),
            r.pair,
            r.mode,
            r.num_simulations,
            r.trading_days,
            r.mean_profit_pct,
            r.success_rate,
            r.profit_factor,
            r.risk_level
        );
    }
    Ok(())
}
