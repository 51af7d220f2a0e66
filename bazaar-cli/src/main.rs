//! Bazaar CLI — run the market headless, watch it live, inspect saves.
//!
//! Commands:
//! - `simulate`: run a fixed number of ticks on simulated time
//! - `live`: run the market in real time on a worker thread
//! - `inspect`: summarize a save file
//! - `default-config`: print the built-in market as TOML

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bazaar_core::{MarketConfig, MarketEngine, MarketEvent, PersistedState};
use bazaar_runner::{
    default_config_toml, export_candles_csv, export_trades_csv, load_config, load_state,
    restore_engine, run_session, save_engine, spawn_market, write_csv,
    ScheduledOrder, SessionPlan, SystemClock, TickSchedule,
};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bazaar", about = "Bazaar: trading mini-game market simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the market headless for a fixed number of ticks.
    Simulate {
        /// Path to a TOML market config. Defaults to the built-in market.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of price ticks to run.
        #[arg(long, default_value_t = 200)]
        ticks: u64,

        /// Master seed (overrides the config).
        #[arg(long)]
        seed: Option<u64>,

        /// Buy on the first tick, as INSTRUMENT:AMOUNT (repeatable).
        #[arg(long = "buy", value_name = "INSTRUMENT:AMOUNT")]
        buys: Vec<ScheduledOrder>,

        /// Sell every position after the last tick.
        #[arg(long, default_value_t = false)]
        close_out: bool,

        /// Continue from this save file instead of a fresh market.
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Write the final state to this save file.
        #[arg(long)]
        save: Option<PathBuf>,

        /// Write all candles to this CSV file.
        #[arg(long)]
        candles_csv: Option<PathBuf>,

        /// Write the trade log to this CSV file.
        #[arg(long)]
        trades_csv: Option<PathBuf>,

        /// Print the report as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the market in real time and print prices as they move.
    Live {
        /// Path to a TOML market config. Defaults to the built-in market.
        #[arg(long)]
        config: Option<PathBuf>,

        /// How long to run.
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Write the final state to this save file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Summarize a save file.
    Inspect {
        /// Save file to read.
        save: PathBuf,

        /// Also check the save against this market config.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the built-in market config as TOML.
    DefaultConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            ticks,
            seed,
            buys,
            close_out,
            resume,
            save,
            candles_csv,
            trades_csv,
            json,
        } => run_simulate(SimulateArgs {
            config,
            ticks,
            seed,
            buys,
            close_out,
            resume,
            save,
            candles_csv,
            trades_csv,
            json,
        }),
        Commands::Live {
            config,
            seconds,
            save,
        } => run_live(config.as_deref(), seconds, save.as_deref()),
        Commands::Inspect { save, config } => run_inspect(&save, config.as_deref()),
        Commands::DefaultConfig => {
            print!("{}", default_config_toml()?);
            Ok(())
        }
    }
}

struct SimulateArgs {
    config: Option<PathBuf>,
    ticks: u64,
    seed: Option<u64>,
    buys: Vec<ScheduledOrder>,
    close_out: bool,
    resume: Option<PathBuf>,
    save: Option<PathBuf>,
    candles_csv: Option<PathBuf>,
    trades_csv: Option<PathBuf>,
    json: bool,
}

fn market_config(path: Option<&Path>, seed: Option<u64>) -> Result<MarketConfig> {
    let mut config = load_config(path)?;
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(config)
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    if args.ticks == 0 {
        bail!("--ticks must be at least 1");
    }
    let config = market_config(args.config.as_deref(), args.seed)?;

    let mut engine = match &args.resume {
        Some(path) => restore_engine(config, path)?,
        None => MarketEngine::new(config).context("invalid market config")?,
    };
    let tick_ms = i64::try_from(engine.config().constants.price_tick_ms)?;
    let start_ms = engine.last_tick().map_or(0, |t| t + tick_ms);

    let plan = SessionPlan {
        ticks: args.ticks,
        start_ms,
        orders: args.buys,
        close_out: args.close_out,
    };
    let report = run_session(&mut engine, &plan);

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }

    if let Some(path) = &args.candles_csv {
        write_csv(path, &export_candles_csv(&report.snapshot.candles)?)?;
        info!(path = %path.display(), "candles written");
    }
    if let Some(path) = &args.trades_csv {
        write_csv(path, &export_trades_csv(&report.snapshot.trade_history)?)?;
        info!(path = %path.display(), "trades written");
    }
    if let Some(path) = &args.save {
        save_engine(&engine, path)?;
    }
    Ok(())
}

fn run_live(config: Option<&Path>, seconds: u64, save: Option<&Path>) -> Result<()> {
    let config = market_config(config, None)?;
    let interval = Duration::from_millis(config.constants.price_tick_ms);
    let engine = MarketEngine::new(config).context("invalid market config")?;
    let handle = spawn_market(engine, SystemClock, TickSchedule::Every(interval))
        .context("failed to start market worker")?;

    info!(seconds, tick_ms = interval.as_millis() as u64, "live market started");
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_secs(1).min(deadline.saturating_duration_since(Instant::now())));

        for event in handle.drain_events()? {
            print_event(&event);
        }
        let snap = handle.snapshot()?;
        let line: Vec<String> = snap
            .prices
            .iter()
            .map(|(id, price)| {
                let flag = if snap.is_bull_run(id) { "*" } else { "" };
                format!("{id} {price:.3}{flag}")
            })
            .collect();
        println!("{}", line.join("  "));
    }

    let engine = handle.shutdown()?;
    info!(ticks = engine.ticks_processed(), "live market stopped");
    if let Some(path) = save {
        save_engine(&engine, path)?;
    }
    Ok(())
}

fn print_event(event: &MarketEvent) {
    match event {
        MarketEvent::VolatilityStarted {
            instrument_id,
            start_price,
            end_time,
            ..
        } => println!(
            "BULL RUN  {instrument_id} from {start_price:.3} until {}",
            format_ms(*end_time)
        ),
        MarketEvent::VolatilityEnded {
            instrument_id,
            final_price,
        } => println!("BULL RUN OVER  {instrument_id} at {final_price:.3}"),
        MarketEvent::TradeExecuted(trade) => println!(
            "{} {} {:.4} {} @ {:.3}",
            trade.id, trade.side, trade.quantity, trade.instrument_id, trade.price
        ),
        MarketEvent::Deposited { amount, balance } => {
            println!("deposit {amount:.2} → balance {balance:.2}")
        }
        MarketEvent::Reset => println!("market reset"),
    }
}

fn format_ms(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map_or_else(|| format!("{ms} ms"), |t| t.format("%H:%M:%S").to_string())
}

fn run_inspect(path: &Path, config: Option<&Path>) -> Result<()> {
    let state = load_state(path)?;
    if let Some(config_path) = config {
        let config = load_config(Some(config_path))?;
        state
            .validate_against(&config)
            .with_context(|| format!("{} does not fit {}", path.display(), config_path.display()))?;
        println!("Config:       {} (ok)", config_path.display());
    }
    print_state(path, &state);
    Ok(())
}

fn print_state(path: &Path, state: &PersistedState) {
    println!("Save:         {}", path.display());
    println!("Schema:       v{}", state.schema_version);
    if let Some(saved_at) = state.saved_at {
        println!("Saved at:     {}", saved_at.to_rfc3339());
    }
    println!("Ticks:        {}", state.ticks_processed);
    if let Some(last_tick) = state.last_tick {
        println!("Last tick:    {}", format_ms(last_tick));
    }
    println!("Balance:      {:.2}", state.balance);
    println!("Next trade:   {}", state.next_trade_id);

    println!();
    println!("{:<12} {:>10} {:>8} {:>12} {:>10}", "instrument", "price", "candles", "position", "avg cost");
    for (id, price) in &state.prices {
        let candles = state.candles.get(id).map_or(0, Vec::len);
        let (quantity, avg) = match (state.positions.get(id), state.average_costs.get(id)) {
            (Some(q), Some(a)) => (format!("{q:.4}"), format!("{a:.4}")),
            _ => ("-".to_string(), "-".to_string()),
        };
        println!("{id:<12} {price:>10.4} {candles:>8} {quantity:>12} {avg:>10}");
    }

    for (id, period) in &state.active_volatility_periods {
        let left = state
            .last_tick
            .map_or_else(String::new, |t| format!(", {} s left", period.remaining_ms(t) / 1_000));
        println!();
        println!(
            "Bull run:     {id} from {:.3} (×{}) until {}{left}",
            period.start_price,
            period.multiplier,
            format_ms(period.end_time)
        );
    }

    if !state.trade_history.is_empty() {
        println!();
        println!("Recent trades:");
        for trade in state.trade_history.iter().take(5) {
            println!(
                "  {} {:<4} {:>10.4} {:<10} @ {:>8.3} = {:>8.2}",
                trade.id,
                trade.side.to_string(),
                trade.quantity,
                trade.instrument_id,
                trade.price,
                trade.total
            );
        }
    }
}
