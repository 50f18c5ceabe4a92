//! Stress tests for compaction maps.
//!
//! These harnesses run a compactor thread that keeps publishing and pruning
//! generations while reader threads query snapshots of the root.

use crate::fixtures::{before_records, chain, pass, written_segment};
use compmap_core::{CompactionMap, CompactionMapRoot, MapConfig, RecordId, SegmentId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent reader threads.
    pub readers: usize,
    /// Number of generations the compactor publishes.
    pub generations: u32,
    /// Input segments per pass.
    pub segments: u32,
    /// Records per input segment.
    pub records: u32,
    /// Generations kept before the oldest one is pruned.
    pub prune_lag: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            readers: 4,
            generations: 200,
            segments: 8,
            records: 16,
            prune_lag: 4,
        }
    }
}

/// Input segments of generation `generation`, the ones its pass empties.
fn input_segments(generation: u32, segments: u32) -> HashSet<SegmentId> {
    (0..segments)
        .map(|i| written_segment(generation - 1, i))
        .collect()
}

/// Checks one snapshot, returning whether it was consistent.
///
/// Every layer present must still hold all of its entries, generations must
/// be strictly newest first, and asking twice must give the same answers.
fn check_snapshot(map: &CompactionMap, probes: &[RecordId]) -> bool {
    let generations = map.generations();
    if generations.windows(2).any(|w| w[0] <= w[1]) {
        return false;
    }
    let complete = generations.iter().all(|&g| {
        let probe = RecordId::new(written_segment(g - 1, 0), 0);
        matches!(map.resolve(probe), Some(after) if after.segment().msb() == u64::from(g))
    });
    let first: Vec<_> = probes.iter().map(|&r| map.resolve(r)).collect();
    thread::yield_now();
    let second: Vec<_> = probes.iter().map(|&r| map.resolve(r)).collect();
    complete && first == second
}

/// Runs a compactor against concurrent snapshot readers.
///
/// The compactor publishes generation after generation through a
/// [`CompactionMapRoot`] and prunes each pass's input segments once it is
/// `prune_lag` generations old. Readers load snapshots and verify they stay
/// consistent while the root moves on. Each verified snapshot counts as one
/// successful operation.
pub fn stress_snapshot_isolation(config: &StressConfig) -> StressTestResult {
    let root = Arc::new(CompactionMapRoot::new(
        MapConfig::new().depth_warning(config.prune_lag as usize + 1),
    ));
    let done = Arc::new(AtomicBool::new(false));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let probes: Arc<Vec<RecordId>> = Arc::new(
        (1..=config.generations.min(8))
            .flat_map(|g| before_records(g, config.segments, config.records.min(4)))
            .collect(),
    );

    let start = Instant::now();

    let readers: Vec<_> = (0..config.readers)
        .map(|_| {
            let root = Arc::clone(&root);
            let done = Arc::clone(&done);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let probes = Arc::clone(&probes);

            thread::spawn(move || loop {
                let finished = done.load(Ordering::Acquire);
                let snapshot = root.load();
                if check_snapshot(&snapshot, &probes) {
                    successful.fetch_add(1, Ordering::Relaxed);
                } else {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
                if finished {
                    break;
                }
            })
        })
        .collect();

    for g in 1..=config.generations {
        let layer = pass(g, config.segments, config.records);
        if root.extend(layer).is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
        if g > config.prune_lag {
            root.prune(&input_segments(g - config.prune_lag, config.segments));
        }
    }
    done.store(true, Ordering::Release);

    for handle in readers {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs sequential lookups against a chain of `config.generations` passes.
///
/// A lookup succeeds when it lands in the segment written by the pass that
/// relocated the record.
pub fn stress_sequential_resolves(config: &StressConfig, lookups: usize) -> StressTestResult {
    let generations = config.generations.max(1);
    let records = config.records.max(1);
    let map = chain(generations, config.segments, records);
    let probes = before_records(generations, 1, records);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..lookups {
        let probe = probes[i % probes.len()];
        match map.resolve(probe) {
            Some(after) if after.segment().msb() == u64::from(generations) => successful += 1,
            _ => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_isolation() {
        let config = StressConfig {
            readers: 4,
            generations: 60,
            segments: 4,
            records: 8,
            prune_lag: 3,
        };

        let result = stress_snapshot_isolation(&config);
        assert_eq!(result.failed_ops, 0);
        assert!(result.successful_ops >= config.readers);
    }

    #[test]
    fn test_snapshot_isolation_without_readers() {
        let config = StressConfig {
            readers: 0,
            generations: 10,
            ..Default::default()
        };

        let result = stress_snapshot_isolation(&config);
        assert_eq!(result.total_ops, 0);
    }

    #[test]
    fn test_sequential_resolves() {
        let config = StressConfig {
            generations: 4,
            segments: 8,
            records: 8,
            ..Default::default()
        };

        let result = stress_sequential_resolves(&config, 1_000);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
    }

    #[test]
    fn test_check_snapshot_rejects_partial_layer() {
        let full = chain(2, 4, 2);
        let probes = before_records(1, 4, 2);
        assert!(check_snapshot(&full, &probes));

        // drop only part of generation 2's input
        let (partial, _) = full.pruned(&HashSet::from([written_segment(1, 0)]));
        assert!(!check_snapshot(&partial, &probes));
    }
}
