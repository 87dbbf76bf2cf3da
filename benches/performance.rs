//! Performance benchmarks for trade-forensics
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use trade_forensics::decoder::{decode_execution_line, decode_trade_log_line, Event};
use trade_forensics::store::TradeStore;
use trade_forensics::types::ANOMALY_THRESHOLD_USD;

fn open_line(ticket: u64) -> String {
    format!(
        r#"{{"status":"OPEN","order_id":{},"trade_type":"BUY","entry_price":1.1,"timestamp":"2024-01-01 {:02}:{:02}:00","additional_info":{{"lot_size":0.01,"quality_score":75.0,"risk_usd":2.0}}}}"#,
        ticket,
        (ticket / 60) % 24,
        ticket % 60
    )
}

fn close_line(ticket: u64) -> String {
    format!(
        "2024-01-02 {:02}:{:02}:00 [EXECUTOR] Closed position {} (EURUSD) via TrailingStop, profit: {:.2}, sl_hit: false, tp_hit: false",
        (ticket / 60) % 24,
        ticket % 60,
        ticket,
        (ticket % 7) as f64 - 3.0
    )
}

fn benchmark_decode(c: &mut Criterion) {
    let open = open_line(12345);
    let close = close_line(12345);

    c.bench_function("decode_trade_log_line", |b| {
        b.iter(|| decode_trade_log_line(black_box(&open), black_box("EURUSD")))
    });

    c.bench_function("decode_execution_line", |b| {
        b.iter(|| decode_execution_line(black_box(&close)))
    });
}

fn benchmark_reconcile(c: &mut Criterion) {
    // Pre-decode 10k open/close pairs; measure the merge and finalize path
    let events: Vec<Event> = (1..=10_000u64)
        .flat_map(|ticket| {
            [
                decode_trade_log_line(&open_line(ticket), "EURUSD").unwrap(),
                decode_execution_line(&close_line(ticket)).unwrap(),
            ]
        })
        .collect();

    c.bench_function("apply_and_finalize_10k_tickets", |b| {
        b.iter(|| {
            let mut store = TradeStore::new();
            for event in &events {
                store.apply(event);
            }
            store.finalize(ANOMALY_THRESHOLD_USD);
            black_box(store.len())
        })
    });
}

criterion_group!(benches, benchmark_decode, benchmark_reconcile);
criterion_main!(benches);
