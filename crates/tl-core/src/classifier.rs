//! Terminal classification of lot remainders.
//!
//! Runs once per reconciliation pass, after all matching. Every lot still
//! holding quantity becomes exactly one position:
//! - `Expired` when the instrument has a sweep expiration and `as_of` is at or
//!   past its settlement instant (by default the start of the expiration day
//!   in the reporting timezone);
//! - `Open` otherwise.
//!
//! `Closed` is never assigned here; only the matcher produces it.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::fixedpoint::{micros_from_i128_clamp, notional_i128, Micros};
use crate::matcher::OpenLot;
use crate::pnl::{gross_pnl, net_pnl};
use crate::types::{derive_position_id, Position, PositionStatus};

/// Hour (reporting timezone) at which options settle on expiration day.
/// Midnight: a contract counts as expired for the whole of its expiration
/// date. Set 16 to keep it open through the closing bell instead.
pub const DEFAULT_SETTLE_HOUR: u32 = 0;

/// When an expiring contract is considered settled, and on which clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub tz: Tz,
    pub settle_hour: u32,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
            settle_hour: DEFAULT_SETTLE_HOUR,
        }
    }
}

impl ExpiryPolicy {
    /// Settlement instant of a contract expiring on `expiration`.
    ///
    /// Used both as the sweep cutoff and as the exit timestamp of the
    /// resulting `Expired` position, so the position buckets on its
    /// expiration day in the reporting timezone.
    pub fn settlement_ts(&self, expiration: NaiveDate) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.settle_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
        let local = expiration.and_time(time);
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }
}

/// Turn every remaining lot into an `Open` or `Expired` position.
pub fn classify_remainders(
    open_lots: Vec<OpenLot>,
    as_of: DateTime<Utc>,
    policy: &ExpiryPolicy,
) -> Vec<Position> {
    open_lots
        .into_iter()
        .filter(|o| o.lot.remaining() > 0)
        .map(|o| {
            let settled_at = o
                .instrument
                .sweep_expiration()
                .map(|exp| policy.settlement_ts(exp))
                .filter(|ts| as_of >= *ts);
            match settled_at {
                Some(ts) => expired_position(o, ts),
                None => open_position(o),
            }
        })
        .collect()
}

fn premium(o: &OpenLot) -> Micros {
    micros_from_i128_clamp(notional_i128(o.lot.price, o.multiplier, o.lot.remaining()))
        .round_to_cents()
}

fn expired_position(o: OpenLot, settled_at: DateTime<Utc>) -> Position {
    let open_premium = premium(&o);
    let fees = o.lot.remaining_fee().round_to_cents();
    let direction = o.lot.direction;
    debug!(
        key = %o.key,
        open_execution_id = %o.lot.execution_id,
        qty = o.lot.remaining(),
        "lot expired"
    );
    Position {
        id: derive_position_id(&o.lot.execution_id, "expired"),
        key: o.key,
        instrument: o.instrument,
        direction,
        status: PositionStatus::Expired,
        qty: o.lot.remaining(),
        multiplier: o.multiplier,
        open_execution_id: o.lot.execution_id.clone(),
        close_execution_id: None,
        entry_ts: o.lot.ts,
        exit_ts: Some(settled_at),
        open_price: o.lot.price,
        close_price: Some(Micros::ZERO),
        open_premium,
        close_premium: Some(Micros::ZERO),
        gross_pnl: Some(gross_pnl(direction, open_premium, Micros::ZERO)),
        fees,
        net_pnl: Some(net_pnl(direction, open_premium, Micros::ZERO, fees)),
        strategy: o.lot.strategy,
    }
}

fn open_position(o: OpenLot) -> Position {
    let open_premium = premium(&o);
    Position {
        id: derive_position_id(&o.lot.execution_id, "open"),
        key: o.key,
        instrument: o.instrument,
        direction: o.lot.direction,
        status: PositionStatus::Open,
        qty: o.lot.remaining(),
        multiplier: o.multiplier,
        open_execution_id: o.lot.execution_id.clone(),
        close_execution_id: None,
        entry_ts: o.lot.ts,
        exit_ts: None,
        open_price: o.lot.price,
        close_price: None,
        open_premium,
        close_premium: None,
        gross_pnl: None,
        fees: o.lot.remaining_fee().round_to_cents(),
        net_pnl: None,
        strategy: o.lot.strategy,
    }
}
