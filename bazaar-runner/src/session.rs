//! Headless simulation sessions.
//!
//! Runs an engine for a fixed number of ticks on simulated time, placing
//! scheduled orders along the way, and summarizes what happened. Nothing
//! here sleeps: tick `n` happens at `start_ms + n × price_tick_ms`.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use bazaar_core::domain::{Timestamp, TradeSide};
use bazaar_core::{MarketEngine, MarketEvent, MarketSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// An order to place at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOrder {
    /// Placed right after this tick runs.
    pub at_tick: u64,
    pub side: TradeSide,
    pub instrument_id: String,
    /// Currency for buys, units for sells. `None` on a sell means the whole
    /// position.
    pub amount: Option<f64>,
}

impl ScheduledOrder {
    pub fn buy(at_tick: u64, instrument_id: impl Into<String>, amount: f64) -> Self {
        Self {
            at_tick,
            side: TradeSide::Buy,
            instrument_id: instrument_id.into(),
            amount: Some(amount),
        }
    }

    pub fn sell_all(at_tick: u64, instrument_id: impl Into<String>) -> Self {
        Self {
            at_tick,
            side: TradeSide::Sell,
            instrument_id: instrument_id.into(),
            amount: None,
        }
    }
}

/// Parses `instrument:amount`, e.g. `pizza:10`, as a buy on the first tick.
impl FromStr for ScheduledOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((id, amount)) = s.split_once(':') else {
            bail!("expected INSTRUMENT:AMOUNT, got {s:?}");
        };
        let id = id.trim();
        if id.is_empty() {
            bail!("missing instrument id in {s:?}");
        }
        let amount: f64 = amount
            .trim()
            .parse()
            .with_context(|| format!("invalid amount in {s:?}"))?;
        Ok(Self::buy(0, id, amount))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPlan {
    pub ticks: u64,
    pub start_ms: Timestamp,
    pub orders: Vec<ScheduledOrder>,
    /// Liquidate every position after the last tick.
    pub close_out: bool,
}

/// What a session did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub ticks: u64,
    pub start_ms: Timestamp,
    pub end_ms: Timestamp,
    pub starting_net_worth: f64,
    pub final_net_worth: f64,
    pub trades_executed: usize,
    pub trades_rejected: usize,
    /// Net effect of executed trades on the balance.
    pub trade_cash_flow: f64,
    pub bull_runs_started: usize,
    pub bull_runs_ended: usize,
    pub snapshot: MarketSnapshot,
}

impl SessionReport {
    pub fn net_worth_change(&self) -> f64 {
        self.final_net_worth - self.starting_net_worth
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize session report to JSON")
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ticks:        {} ({} ms → {} ms)", self.ticks, self.start_ms, self.end_ms)?;
        writeln!(
            f,
            "Net worth:    {:.2} → {:.2} ({:+.2})",
            self.starting_net_worth,
            self.final_net_worth,
            self.net_worth_change()
        )?;
        writeln!(f, "Balance:      {:.2}", self.snapshot.balance)?;
        writeln!(
            f,
            "Trades:       {} executed, {} rejected",
            self.trades_executed, self.trades_rejected
        )?;
        writeln!(f, "Cash flow:    {:+.2}", self.trade_cash_flow)?;
        writeln!(
            f,
            "Bull runs:    {} started, {} ended",
            self.bull_runs_started, self.bull_runs_ended
        )?;
        writeln!(f)?;
        writeln!(f, "{:<12} {:>10} {:>8} {:>12}", "instrument", "price", "candles", "position")?;
        for (id, price) in &self.snapshot.prices {
            let candles = self.snapshot.candles.get(id).map_or(0, Vec::len);
            let position = self
                .snapshot
                .positions
                .get(id)
                .map_or_else(
                    || "-".to_string(),
                    |p| format!("{:.4} ({:+.1}%)", p.quantity, p.unrealized_return(*price) * 100.0),
                );
            let marker = if self.snapshot.is_bull_run(id) { "  [bull run]" } else { "" };
            writeln!(f, "{id:<12} {price:>10.4} {candles:>8} {position:>12}{marker}")?;
        }
        Ok(())
    }
}

/// Drive `engine` through `plan`.
///
/// Rejected orders are logged and counted, not fatal: the session keeps
/// going the way the game would after showing an error toast.
pub fn run_session(engine: &mut MarketEngine, plan: &SessionPlan) -> SessionReport {
    let tick_ms = i64::try_from(engine.config().constants.price_tick_ms).unwrap_or(i64::MAX);
    let starting_net_worth = engine.snapshot().net_worth;

    let mut orders = plan.orders.clone();
    orders.sort_by_key(|o| o.at_tick);
    let mut pending = orders.into_iter().peekable();

    let mut tally = Tally::default();
    let mut now = plan.start_ms;
    info!(ticks = plan.ticks, start_ms = plan.start_ms, orders = plan.orders.len(), "session started");

    for tick in 0..plan.ticks {
        now = plan
            .start_ms
            .saturating_add(i64::try_from(tick).unwrap_or(i64::MAX).saturating_mul(tick_ms));
        engine.tick(now);
        while let Some(order) = pending.next_if(|o| o.at_tick <= tick) {
            place(engine, &order, now, &mut tally);
        }
        tally.absorb(engine.drain_events());
    }

    // Orders scheduled past the last tick still go in at the final price.
    for order in pending {
        place(engine, &order, now, &mut tally);
    }
    if plan.close_out {
        let owned: Vec<String> = engine.ledger().positions().keys().cloned().collect();
        for id in owned {
            place(engine, &ScheduledOrder::sell_all(plan.ticks, id), now, &mut tally);
        }
    }
    tally.absorb(engine.drain_events());

    let snapshot = engine.snapshot();
    info!(
        ticks = plan.ticks,
        net_worth = snapshot.net_worth,
        trades = tally.executed,
        rejected = tally.rejected,
        "session finished"
    );
    SessionReport {
        ticks: plan.ticks,
        start_ms: plan.start_ms,
        end_ms: now,
        starting_net_worth,
        final_net_worth: snapshot.net_worth,
        trades_executed: tally.executed,
        trades_rejected: tally.rejected,
        trade_cash_flow: tally.cash_flow,
        bull_runs_started: tally.bull_runs_started,
        bull_runs_ended: tally.bull_runs_ended,
        snapshot,
    }
}

fn place(engine: &mut MarketEngine, order: &ScheduledOrder, now: Timestamp, tally: &mut Tally) {
    let result = match (order.side, order.amount) {
        (TradeSide::Sell, None) => engine.sell_all(&order.instrument_id, now),
        (side, amount) => engine.submit_trade(side, &order.instrument_id, amount.unwrap_or(0.0), now),
    };
    if let Err(err) = result {
        warn!(instrument = %order.instrument_id, side = %order.side, %err, "order rejected");
        tally.rejected += 1;
    }
}

#[derive(Default)]
struct Tally {
    executed: usize,
    rejected: usize,
    cash_flow: f64,
    bull_runs_started: usize,
    bull_runs_ended: usize,
}

impl Tally {
    fn absorb(&mut self, events: Vec<MarketEvent>) {
        for event in events {
            match event {
                MarketEvent::TradeExecuted(trade) => {
                    self.executed += 1;
                    self.cash_flow += trade.balance_delta();
                }
                MarketEvent::VolatilityStarted { .. } => self.bull_runs_started += 1,
                MarketEvent::VolatilityEnded { .. } => self.bull_runs_ended += 1,
                MarketEvent::Deposited { .. } | MarketEvent::Reset => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::MarketConfig;

    fn engine() -> MarketEngine {
        MarketEngine::new(MarketConfig {
            seed: Some(3),
            ..MarketConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn parse_order_spec() {
        let order: ScheduledOrder = "pizza:12.5".parse().unwrap();
        assert_eq!(order, ScheduledOrder::buy(0, "pizza", 12.5));
        assert!("pizza".parse::<ScheduledOrder>().is_err());
        assert!(":5".parse::<ScheduledOrder>().is_err());
        assert!("pizza:lots".parse::<ScheduledOrder>().is_err());
    }

    #[test]
    fn session_runs_requested_ticks() {
        let mut engine = engine();
        let plan = SessionPlan {
            ticks: 100,
            start_ms: 1_000,
            ..SessionPlan::default()
        };
        let report = run_session(&mut engine, &plan);
        assert_eq!(engine.ticks_processed(), 100);
        assert_eq!(report.end_ms, 1_000 + 99 * 300);
        assert_eq!(report.snapshot.last_tick, Some(report.end_ms));
        assert_eq!(report.trades_executed, 0);
    }

    #[test]
    fn orders_are_placed_and_rejections_counted() {
        let mut engine = engine();
        let plan = SessionPlan {
            ticks: 20,
            start_ms: 0,
            orders: vec![
                ScheduledOrder::buy(0, "pizza", 30.0),
                ScheduledOrder::buy(1, "sushi", 500.0),
                ScheduledOrder::buy(2, "caviar", 1.0),
                ScheduledOrder::sell_all(10, "pizza"),
            ],
            close_out: false,
        };
        let report = run_session(&mut engine, &plan);
        assert_eq!(report.trades_executed, 2);
        assert_eq!(report.trades_rejected, 2);
        assert!(report.snapshot.positions.is_empty());
    }

    #[test]
    fn close_out_liquidates_everything() {
        let mut engine = engine();
        let plan = SessionPlan {
            ticks: 10,
            start_ms: 0,
            orders: vec![
                ScheduledOrder::buy(0, "pizza", 10.0),
                ScheduledOrder::buy(0, "taco", 10.0),
            ],
            close_out: true,
        };
        let report = run_session(&mut engine, &plan);
        assert!(report.snapshot.positions.is_empty());
        assert_eq!(report.trades_executed, 4);
        assert!((report.final_net_worth - report.snapshot.balance).abs() < 1e-9);
        let realized = report.snapshot.balance - report.starting_net_worth;
        assert!((report.trade_cash_flow - realized).abs() < 1e-9);
    }

    #[test]
    fn open_positions_show_their_return() {
        let mut engine = engine();
        let plan = SessionPlan {
            ticks: 5,
            orders: vec![ScheduledOrder::buy(0, "pizza", 10.0)],
            ..SessionPlan::default()
        };
        let report = run_session(&mut engine, &plan);
        assert!((report.trade_cash_flow + 10.0).abs() < 1e-9);
        let line = report
            .to_string()
            .lines()
            .find(|l| l.starts_with("pizza"))
            .map(str::to_string)
            .unwrap();
        assert!(line.contains('%'), "{line}");
    }

    #[test]
    fn report_json_carries_snapshot() {
        let mut engine = engine();
        let report = run_session(&mut engine, &SessionPlan { ticks: 3, ..SessionPlan::default() });
        let back: SessionReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn report_renders_every_instrument() {
        let mut engine = engine();
        let report = run_session(&mut engine, &SessionPlan { ticks: 5, ..SessionPlan::default() });
        let text = report.to_string();
        for id in ["pizza", "shawarma", "burger", "taco", "sushi", "donut"] {
            assert!(text.contains(id), "{id} missing from:\n{text}");
        }
    }
}
