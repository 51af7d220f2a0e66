//! CSV export of candles and the trade log, for charting outside the game.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bazaar_core::domain::{Candle, Trade};

/// Candles as CSV, one row per candle, instruments in id order.
///
/// Columns: instrument, timestamp, open, high, low, close, volume
pub fn export_candles_csv(candles: &BTreeMap<String, Vec<Candle>>) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["instrument", "timestamp", "open", "high", "low", "close", "volume"])?;

    for (id, series) in candles {
        for c in series {
            wtr.write_record([
                id,
                &c.timestamp.to_string(),
                &format!("{:.6}", c.open),
                &format!("{:.6}", c.high),
                &format!("{:.6}", c.low),
                &format!("{:.6}", c.close),
                &format!("{:.2}", c.volume),
            ])?;
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Trade log as CSV, in the order given (the ledger keeps newest first).
///
/// Columns: id, timestamp, instrument, side, quantity, price, total
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["id", "timestamp", "instrument", "side", "quantity", "price", "total"])?;

    for t in trades {
        wtr.write_record([
            &t.id.to_string(),
            &t.timestamp.to_string(),
            &t.instrument_id,
            &t.side.to_string(),
            &format!("{:.9}", t.quantity),
            &format!("{:.6}", t.price),
            &format!("{:.6}", t.total),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_csv(path: &Path, csv: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    }
    fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
}
