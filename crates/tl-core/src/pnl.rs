//! P&L calculation and aggregation.
//!
//! One formula, one ledger:
//! - [`net_pnl`] is the only place a position's signed P&L is derived; the
//!   matcher and the expiration sweep both call it.
//! - [`PnlSummary`] and [`daily_pnl`] fold over the same realized lines
//!   ([`realized_lines`]), so totals after fees, before fees, and per day
//!   always reconcile with each other.
//!
//! Only `Closed` and `Expired` positions are realized. `Open` positions feed
//! the open-premium and unrealized figures, never realized totals.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::fixedpoint::{micros_from_i128_clamp, notional_i128, Micros};
use crate::types::{ContractKey, Direction, Position, PositionStatus};

/// Canonical mark map (contract key -> price micros per unit).
pub type MarkMap = BTreeMap<ContractKey, Micros>;

/// Signed net P&L of a position from its unsigned premiums.
///
/// Debit-opened (long) positions gain when the closing premium exceeds the
/// opening premium; credit-opened (short) positions gain when it is smaller.
pub fn net_pnl(
    direction: Direction,
    open_premium: Micros,
    close_premium: Micros,
    fees: Micros,
) -> Micros {
    gross_pnl(direction, open_premium, close_premium) - fees
}

/// Signed P&L before fees.
pub fn gross_pnl(direction: Direction, open_premium: Micros, close_premium: Micros) -> Micros {
    match direction {
        Direction::Long => close_premium - open_premium,
        Direction::Short => open_premium - close_premium,
    }
}

/// One realized position as seen by the aggregations.
#[derive(Copy, Clone, Debug)]
pub struct RealizedLine<'a> {
    pub position: &'a Position,
    pub gross: Micros,
    pub fees: Micros,
    pub net: Micros,
}

/// Realized positions with their P&L components. Skips open positions.
pub fn realized_lines(positions: &[Position]) -> impl Iterator<Item = RealizedLine<'_>> {
    positions.iter().filter(|p| p.is_realized()).map(|p| {
        let gross = p.gross_pnl.unwrap_or(Micros::ZERO);
        RealizedLine {
            position: p,
            gross,
            fees: p.fees,
            net: p.net_pnl.unwrap_or(gross - p.fees),
        }
    })
}

// ---------------------------------------------------------------------------
// Summary by status
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlSummary {
    /// Realized P&L after fees (closed + expired).
    pub realized_pnl: Micros,
    /// Realized P&L before fees.
    pub realized_pnl_before_fees: Micros,
    pub realized_fees: Micros,
    pub closed_pnl: Micros,
    pub expired_pnl: Micros,
    /// Premium still committed in open positions (unsigned notional).
    pub open_premium: Micros,
    pub open_count: usize,
    pub closed_count: usize,
    pub expired_count: usize,
}

impl PnlSummary {
    pub fn from_positions(positions: &[Position]) -> Self {
        let mut s = PnlSummary::default();
        for line in realized_lines(positions) {
            s.realized_pnl += line.net;
            s.realized_pnl_before_fees += line.gross;
            s.realized_fees += line.fees;
            match line.position.status {
                PositionStatus::Closed => {
                    s.closed_pnl += line.net;
                    s.closed_count += 1;
                }
                PositionStatus::Expired => {
                    s.expired_pnl += line.net;
                    s.expired_count += 1;
                }
                PositionStatus::Open => {}
            }
        }
        for p in positions.iter().filter(|p| p.is_open()) {
            s.open_premium += p.open_premium;
            s.open_count += 1;
        }
        s
    }

    pub fn total_positions(&self) -> usize {
        self.open_count + self.closed_count + self.expired_count
    }

    pub fn is_profitable(&self) -> bool {
        self.realized_pnl.is_positive()
    }
}

// ---------------------------------------------------------------------------
// Day buckets
// ---------------------------------------------------------------------------

/// Realized P&L for one reporting day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub pnl: Micros,
    pub pnl_before_fees: Micros,
    pub fees: Micros,
    pub count: usize,
    /// `SYMBOL (net)` per position, comma separated, in exit order.
    pub details: String,
}

/// Inclusive reporting-day filter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        self.from.map_or(true, |f| d >= f) && self.to.map_or(true, |t| d <= t)
    }
}

/// Reporting day of a position's exit, in `tz`.
pub fn exit_day(p: &Position, tz: Tz) -> Option<NaiveDate> {
    p.exit_ts.map(|ts| ts.with_timezone(&tz).date_naive())
}

/// Bucket realized positions by the reporting-timezone date of their exit.
///
/// The bucket date never depends on the host locale: timestamps are UTC and
/// are converted into `tz` explicitly.
pub fn daily_pnl(positions: &[Position], tz: Tz, range: DateRange) -> BTreeMap<NaiveDate, DailyPnl> {
    let mut lines: Vec<RealizedLine<'_>> = realized_lines(positions).collect();
    lines.sort_by(|a, b| {
        a.position
            .exit_ts
            .cmp(&b.position.exit_ts)
            .then_with(|| a.position.id.cmp(&b.position.id))
    });

    let mut days: BTreeMap<NaiveDate, DailyPnl> = BTreeMap::new();
    for line in lines {
        let Some(date) = exit_day(line.position, tz) else {
            continue;
        };
        if !range.contains(date) {
            continue;
        }
        let day = days.entry(date).or_insert_with(|| DailyPnl {
            date,
            pnl: Micros::ZERO,
            pnl_before_fees: Micros::ZERO,
            fees: Micros::ZERO,
            count: 0,
            details: String::new(),
        });
        day.pnl += line.net;
        day.pnl_before_fees += line.gross;
        day.fees += line.fees;
        day.count += 1;
        if !day.details.is_empty() {
            day.details.push_str(", ");
        }
        day.details.push_str(&format!(
            "{} ({})",
            line.position.instrument.symbol(),
            line.net.display_cents()
        ));
    }
    days
}

/// Realized positions whose exit falls on `date` in `tz`, latest exit first.
pub fn positions_on(positions: &[Position], date: NaiveDate, tz: Tz) -> Vec<&Position> {
    let mut out: Vec<&Position> = positions
        .iter()
        .filter(|p| p.is_realized() && exit_day(p, tz) == Some(date))
        .collect();
    out.sort_by(|a, b| b.exit_ts.cmp(&a.exit_ts).then_with(|| a.id.cmp(&b.id)));
    out
}

// ---------------------------------------------------------------------------
// Unrealized
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnrealizedPnl {
    pub pnl: Micros,
    /// Open positions that had a mark.
    pub priced: usize,
    /// Open positions without a mark (excluded from `pnl`).
    pub unpriced: usize,
}

/// Mark-to-market P&L of open positions.
///
/// long:  (mark - open) × multiplier × qty
/// short: (open - mark) × multiplier × qty
///
/// Summed at full precision, rounded to cents once.
pub fn unrealized_pnl(positions: &[Position], marks: &MarkMap) -> UnrealizedPnl {
    let mut acc: i128 = 0;
    let mut out = UnrealizedPnl::default();
    for p in positions.iter().filter(|p| p.is_open()) {
        let Some(mark) = marks.get(&p.key) else {
            out.unpriced += 1;
            continue;
        };
        let diff = notional_i128(*mark, p.multiplier, p.qty)
            - notional_i128(p.open_price, p.multiplier, p.qty);
        acc += diff * p.direction.sign() as i128;
        out.priced += 1;
    }
    out.pnl = micros_from_i128_clamp(acc).round_to_cents();
    out
}
