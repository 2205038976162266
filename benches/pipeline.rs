//! Benchmarks for merging and correlation analysis.

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use surgescan::prelude::*;
use surgescan::record::{TechnicalPatterns, VolumePatterns};

/// Deterministic synthetic batch results
fn generate_results(batches: usize, per_batch: usize) -> Vec<BatchResult> {
  let entry = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();

  (0..batches)
    .map(|b| {
      let stocks = (0..per_batch)
        .map(|i| {
          let n = b * per_batch + i;
          let score = ((n * 37 + 11) % 120) as f64;
          let gain = ((n * 53 + 7) % 900) as f64 - 50.0;
          let record = StockRecord::new(format!("S{n:05}"), entry + Duration::days((n % 200) as i64))
            .with_gain(gain);

          if n % 17 == 0 {
            return AnalyzedStock::failed(record, "timeout");
          }

          AnalyzedStock::complete(record)
            .with_score(score)
            .with_component("volume_spike", if n % 3 == 0 { 15.0 } else { 0.0 })
            .with_component("breakout", if n % 5 < 2 { 10.0 } else { 0.0 })
            .with_patterns(PatternGroups {
              volume_patterns: Some(VolumePatterns { volume_spike: Some(n % 3 == 0), ..Default::default() }),
              technical_patterns: Some(TechnicalPatterns { breakout: Some(n % 5 < 2), ..Default::default() }),
              ..Default::default()
            })
        })
        .collect();
      BatchResult::new(b as u32 + 1, stocks)
    })
    .collect()
}

fn bench_partition(c: &mut Criterion) {
  let entry = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
  let stocks: Vec<StockRecord> = (0..10_000).map(|i| StockRecord::new(format!("S{i:05}"), entry)).collect();

  c.bench_function("partition_10000_into_16", |b| {
    b.iter(|| {
      let _ = black_box(partition(black_box(&stocks), 16));
    })
  });
}

fn bench_merge(c: &mut Criterion) {
  let mut group = c.benchmark_group("merge");

  for size in [1_000, 5_000, 20_000].iter() {
    let results = generate_results(8, size / 8);

    group.bench_with_input(BenchmarkId::new("stocks", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(merge(black_box(results.clone())));
      })
    });
  }

  group.finish();
}

fn bench_analyze(c: &mut Criterion) {
  let merged = merge(generate_results(8, 1_250)).unwrap();
  let analyzer = AnalyzerBuilder::new().threshold_grid(ThresholdGrid::new(0.0, 120.0, 5.0).unwrap()).build().unwrap();

  c.bench_function("analyze_10000_stocks_25_thresholds", |b| {
    b.iter(|| {
      let _ = black_box(analyzer.analyze(black_box(&merged)));
    })
  });
}

fn bench_render(c: &mut Criterion) {
  let merged = merge(generate_results(4, 500)).unwrap();
  let matrix = AnalyzerBuilder::new().build().unwrap().analyze(&merged);

  c.bench_function("render_report", |b| {
    b.iter(|| {
      let _ = black_box(render_report(black_box(&matrix)));
    })
  });
}

criterion_group!(benches, bench_partition, bench_merge, bench_analyze, bench_render);

criterion_main!(benches);
