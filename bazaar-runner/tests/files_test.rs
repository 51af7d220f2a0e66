//! Save files, config files and CSV output on a real filesystem.

use std::fs;

use bazaar_core::domain::TradeSide;
use bazaar_core::{MarketConfig, MarketEngine, PersistedState};
use bazaar_runner::{
    default_config_toml, export_candles_csv, export_trades_csv, load_config, load_state,
    restore_engine, run_session, save_engine, write_csv, ScheduledOrder, SessionPlan,
};
use tempfile::TempDir;

fn config() -> MarketConfig {
    MarketConfig {
        seed: Some(99),
        ..MarketConfig::default()
    }
}

fn played_engine() -> MarketEngine {
    let mut engine = MarketEngine::new(config()).unwrap();
    let plan = SessionPlan {
        ticks: 150,
        start_ms: 0,
        orders: vec![
            ScheduledOrder::buy(3, "pizza", 20.0),
            ScheduledOrder::buy(40, "burger", 15.0),
            ScheduledOrder::sell_all(90, "burger"),
        ],
        close_out: false,
    };
    run_session(&mut engine, &plan);
    engine
}

#[test]
fn save_then_restore_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("saves").join("market.json");
    let engine = played_engine();

    let written = save_engine(&engine, &path).unwrap();
    assert!(written.saved_at.is_some());
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let restored = restore_engine(config(), &path).unwrap();
    assert_eq!(restored.snapshot().prices, engine.snapshot().prices);
    assert_eq!(restored.snapshot().positions, engine.snapshot().positions);

    let mut resaved = restored.save_state();
    resaved.saved_at = written.saved_at;
    assert_eq!(resaved, written);
}

#[test]
fn load_state_reports_the_broken_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let err = load_state(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.json"));
}

#[test]
fn restore_rejects_save_from_other_market() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.json");
    save_engine(&played_engine(), &path).unwrap();

    let other = MarketConfig {
        instruments: vec![bazaar_core::domain::Instrument::new(
            "taco", "Taco", "TCO", 1.75, 0.12,
        )],
        ..config()
    };
    assert!(restore_engine(other, &path).is_err());
}

#[test]
fn saved_file_is_plain_persisted_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.json");
    let engine = played_engine();
    save_engine(&engine, &path).unwrap();

    let json = fs::read_to_string(&path).unwrap();
    let state = PersistedState::from_json(&json).unwrap();
    assert_eq!(state.schema_version, 1);
    assert_eq!(state.ticks_processed, 150);
    assert!(state.positions.contains_key("pizza"));
    assert!(!state.positions.contains_key("burger"));
}

#[test]
fn config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.toml");
    fs::write(&path, default_config_toml().unwrap()).unwrap();
    assert_eq!(load_config(Some(&path)).unwrap(), MarketConfig::default());
}

#[test]
fn partial_config_file_takes_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.toml");
    fs::write(
        &path,
        r#"
seed = 5
initial_balance = 250.0

[constants]
candle_duration_ms = 5000

[[instruments]]
id = "pizza"
name = "Pizza"
symbol = "PZA"
base_price = 2.54
volatility = 0.15
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.seed, Some(5));
    assert_eq!(config.initial_balance, 250.0);
    assert_eq!(config.constants.candle_duration_ms, 5_000);
    assert_eq!(config.constants.price_tick_ms, 300);
    assert_eq!(config.instruments.len(), 1);
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.toml");
    fs::write(&path, "[constants]\nspawn_probability = 2.0\n").unwrap();
    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn csv_files_are_written() {
    let dir = TempDir::new().unwrap();
    let mut engine = played_engine();
    engine.submit_trade(TradeSide::Buy, "donut", 1.0, 50_000).unwrap();
    let snap = engine.snapshot();

    let candles_path = dir.path().join("out").join("candles.csv");
    let trades_path = dir.path().join("out").join("trades.csv");
    write_csv(&candles_path, &export_candles_csv(&snap.candles).unwrap()).unwrap();
    write_csv(&trades_path, &export_trades_csv(&snap.trade_history).unwrap()).unwrap();

    let candle_rows = fs::read_to_string(&candles_path).unwrap().lines().count() - 1;
    let total_candles: usize = snap.candles.values().map(Vec::len).sum();
    assert_eq!(candle_rows, total_candles);

    let trades = fs::read_to_string(&trades_path).unwrap();
    assert_eq!(trades.lines().count() - 1, 4);
    assert!(trades.lines().nth(1).unwrap().contains(",donut,buy,"));
}
