//! The execution log on disk only grows, and only with new ids.
//!
//! Two overlapping fetch windows are appended; the overlap is counted as
//! duplicates, nothing is written twice, and a reopened log sees the same
//! ids and the same last timestamp.

use chrono::{DateTime, TimeZone, Utc};
use tl_core::{Execution, Instrument, Micros, PositionEffect, Side};
use tl_store::{AppendStats, ExecutionLogFile};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 9, hour, 0, 0).unwrap()
}

fn exec(id: &str, effect: PositionEffect, hour: u32) -> Execution {
    let instrument = Instrument::Future {
        contract_id: "MESU4".to_string(),
        symbol: "/MES".to_string(),
    };
    Execution {
        id: id.to_string(),
        order_id: id.to_string(),
        leg_index: 0,
        key: instrument.contract_key(),
        instrument,
        side: if effect == PositionEffect::Opening { Side::Buy } else { Side::Sell },
        effect,
        qty: 1,
        price: Micros::from_dollars(5600),
        fee: Micros::from_cents(62),
        ts: at(hour),
        multiplier: Some(5),
        broker_pnl: None,
        strategy: None,
    }
}

#[test]
fn overlapping_windows_append_only_new_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("executions.jsonl");

    let mut log = ExecutionLogFile::open(&path).unwrap();
    assert!(log.is_empty());
    assert_eq!(log.last_execution_ts(), None);

    let first = vec![
        exec("a", PositionEffect::Opening, 14),
        exec("b", PositionEffect::Closing, 15),
    ];
    assert_eq!(
        log.append_new(&first).unwrap(),
        AppendStats { inserted: 2, duplicates: 0 }
    );

    // Second window overlaps "b" and repeats "c" inside the batch.
    let second = vec![
        exec("b", PositionEffect::Closing, 15),
        exec("c", PositionEffect::Opening, 16),
        exec("c", PositionEffect::Opening, 16),
    ];
    assert_eq!(
        log.append_new(&second).unwrap(),
        AppendStats { inserted: 1, duplicates: 2 }
    );

    let lines = std::fs::read_to_string(&path).unwrap();
    assert_eq!(lines.lines().count(), 3);
    assert_eq!(log.last_execution_ts(), Some(at(16)));

    let reopened = ExecutionLogFile::open(&path).unwrap();
    assert_eq!(reopened.len(), 3);
    assert!(reopened.contains("c"));
    assert_eq!(reopened.last_execution_ts(), Some(at(16)));

    let loaded = reopened.load().unwrap();
    let ids: Vec<&str> = loaded.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(loaded[0], first[0], "executions survive the file unchanged");
}

#[test]
fn corrupt_line_is_reported_with_its_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("executions.jsonl");

    let mut log = ExecutionLogFile::open(&path).unwrap();
    log.append_new(&[exec("a", PositionEffect::Opening, 14)]).unwrap();

    let mut content = std::fs::read_to_string(&path).unwrap();
    content.push_str("{not json\n");
    std::fs::write(&path, content).unwrap();

    let err = ExecutionLogFile::open(&path).err().expect("corrupt log must not open");
    assert!(format!("{err:#}").contains("line 2"));
}
