use aqua_core::codec::{FrameDecoder, FrameEncoder};
use aqua_core::{DeviceConfig, LogEntry, Schedule, TimelineCfg, WeekdayMask, reconcile};
use chrono::NaiveDate;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

fn full_config() -> DeviceConfig {
    let mut cfg = DeviceConfig::default();
    for id in 1..=3u8 {
        let p = cfg.pump_mut(id).unwrap();
        for (slot, s) in p.schedules.iter_mut().enumerate() {
            *s = Schedule {
                id: slot as u32 + 1,
                hour: 6 + 4 * slot as u32,
                minute: u32::from(id) * 5,
                dose_ml: 1.0 + f64::from(id) / 10.0,
                enabled: true,
                weekdays: WeekdayMask::ALL,
            };
        }
    }
    cfg
}

// A month of history, one entry every 20 minutes across three pumps.
fn synth_log(day: NaiveDate, entries: usize) -> Vec<LogEntry> {
    let start = day.and_hms_opt(0, 0, 0).unwrap() - chrono::Duration::days(30);
    (0..entries)
        .map(|i| LogEntry {
            timestamp: start + chrono::Duration::minutes(20 * i as i64),
            pump_id: (i % 3) as u8 + 1,
            dose_ml: 1.0 + ((i % 3) as f64 + 1.0) / 10.0,
            origin: if i % 7 == 0 { "Teste" } else { "Programado" }.to_string(),
        })
        .collect()
}

pub fn bench_reconcile(c: &mut Criterion) {
    let mut g = c.benchmark_group("reconcile");
    if let Some(n) = std::env::var("BENCH_SAMPLE_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
    {
        g.sample_size(n.max(10));
    }
    let day = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
    let cfg = full_config();
    let tl = TimelineCfg::default();
    let logs = synth_log(day, 31 * 72);
    g.bench_function("month_of_logs", |b| {
        b.iter(|| reconcile(black_box(&logs), black_box(&cfg), day, &tl));
    });
    g.finish();
}

pub fn bench_framing(c: &mut Criterion) {
    let mut g = c.benchmark_group("framing");
    let doc = full_config().to_document();
    let enc = FrameEncoder::new(20).unwrap();
    g.bench_function("encode_20", |b| b.iter(|| enc.encode(black_box(&doc))));
    let frames = enc.encode(&doc).unwrap();
    g.bench_function("decode_20", |b| {
        b.iter_batched(
            || FrameDecoder::new(8192),
            |mut dec| {
                for f in &frames {
                    black_box(dec.push(f.as_bytes()));
                }
            },
            BatchSize::SmallInput,
        );
    });
    g.finish();
}

criterion_group!(benches, bench_reconcile, bench_framing);
criterion_main!(benches);
