//! Property tests for partitioning and merging.

use chrono::NaiveDate;
use proptest::prelude::*;
use surgescan::prelude::*;
use surgescan::record::VolumePatterns;

fn universe(n: usize) -> Vec<StockRecord> {
    let entry = NaiveDate::from_ymd_opt(2021, 9, 1).unwrap();
    (0..n)
        .map(|i| StockRecord::new(format!("P{i:04}"), entry))
        .collect()
}

/// Analyzed stock with an outcome chosen by `kind`
fn analyzed(ticker: String, kind: u8) -> AnalyzedStock {
    let stock = StockRecord::new(ticker, NaiveDate::from_ymd_opt(2021, 9, 1).unwrap());
    match kind % 3 {
        0 => AnalyzedStock::failed(stock, "extractor timeout"),
        1 => AnalyzedStock::complete(stock),
        _ => AnalyzedStock::complete(stock).with_patterns(PatternGroups {
            volume_patterns: Some(VolumePatterns {
                volume_spike: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

fn results_strategy() -> impl Strategy<Value = Vec<BatchResult>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 1..8).prop_map(|batches| {
        batches
            .into_iter()
            .enumerate()
            .map(|(b, kinds)| {
                let id = b as u32 + 1;
                let stocks = kinds
                    .into_iter()
                    .enumerate()
                    .map(|(i, k)| analyzed(format!("B{id}S{i}"), k))
                    .collect();
                BatchResult::new(id, stocks)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_partition_is_balanced(n in 1usize..300, k_seed in 1usize..300) {
        let k = 1 + (k_seed - 1) % n;
        let stocks = universe(n);
        let batches = partition(&stocks, k).unwrap();

        prop_assert_eq!(batches.len(), k);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        prop_assert_eq!(sizes.iter().sum::<usize>(), n);
        for size in &sizes {
            prop_assert!(*size == n / k || *size == n.div_ceil(k));
        }

        let rejoined: Vec<StockRecord> = batches.into_iter().flat_map(|b| b.stocks).collect();
        prop_assert_eq!(rejoined, stocks);
    }

    #[test]
    fn prop_partition_is_deterministic(n in 1usize..120, k_seed in 1usize..120) {
        let k = 1 + (k_seed - 1) % n;
        let stocks = universe(n);
        prop_assert_eq!(partition(&stocks, k).unwrap(), partition(&stocks, k).unwrap());
    }

    #[test]
    fn prop_merge_order_independent(results in results_strategy(), rotate in 0usize..8) {
        let forward = merge(results.clone()).unwrap();

        let mut shuffled = results;
        shuffled.reverse();
        let len = shuffled.len();
        shuffled.rotate_left(rotate % len);
        let shuffled = merge(shuffled).unwrap();

        prop_assert_eq!(forward.total_stocks, shuffled.total_stocks);
        prop_assert_eq!(forward.successful_analyses, shuffled.successful_analyses);
        prop_assert_eq!(forward.failed_analyses, shuffled.failed_analyses);
        prop_assert_eq!(&forward.pattern_summary, &shuffled.pattern_summary);
        prop_assert_eq!(&forward.all_stocks, &shuffled.all_stocks);
    }

    #[test]
    fn prop_merge_counts_reconcile(results in results_strategy()) {
        let merged = merge(results).unwrap();
        prop_assert_eq!(
            merged.successful_analyses + merged.failed_analyses,
            merged.total_stocks
        );
        prop_assert!(merged.is_consistent());
        let ids: Vec<u32> = merged.batch_summaries.iter().map(|b| b.batch_id).collect();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
