//! Simulate command implementation.
//!
//! Runs a synthetic compactor against a [`CompactionMapRoot`]. Generation
//! `g` rewrites every segment written by generation `g - 1` into a fresh
//! segment, so a record that survives `n` passes is relocated `n` times.

use compmap_core::{
    CompactionMap, CompactionMapRoot, MapConfig, MapTelemetry, RecordId, SegmentId, StatsSnapshot,
};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Offset stride between records in simulated segments.
const RECORD_SIZE: u32 = 16;

/// Workload parameters.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Generations to run.
    pub generations: u32,
    /// Input segments per generation.
    pub segments: u32,
    /// Relocated records per input segment.
    pub records: u32,
    /// Prune every K generations, 0 disables.
    pub prune_every: u32,
}

/// What a step did.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A generation was published.
    Extend,
    /// Reclaimed segments were pruned.
    Prune,
}

/// State of the composite after one step.
#[derive(Debug, Serialize)]
pub struct StepReport {
    /// Generation that triggered the step.
    pub generation: u32,
    /// Step kind.
    pub action: Action,
    /// Layers after the step.
    pub depth: usize,
    /// Estimated bytes after the step.
    pub total_weight: u64,
    /// Records after the step.
    pub total_records: u64,
    /// Records removed by a prune step.
    pub records_removed: u64,
}

impl StepReport {
    fn new(generation: u32, action: Action, map: &CompactionMap, records_removed: u64) -> Self {
        Self {
            generation,
            action,
            depth: map.depth(),
            total_weight: map.total_weight(),
            total_records: map.total_records(),
            records_removed,
        }
    }
}

/// Result of chasing sample records through every surviving generation.
#[derive(Debug, Serialize)]
pub struct ChaseReport {
    /// Records chased.
    pub probes: usize,
    /// Most hops any probe took.
    pub max_hops: usize,
}

/// Full simulation result.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Per-step composite state.
    pub steps: Vec<StepReport>,
    /// Final per-layer diagnostics.
    pub telemetry: MapTelemetry,
    /// Root counters.
    pub stats: StatsSnapshot,
    /// Relocation chase over the final composite.
    pub chase: ChaseReport,
}

fn written_segment(generation: u32, index: u32) -> SegmentId {
    SegmentId::from_parts(u64::from(generation), u64::from(index))
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = simulate(options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Runs the workload and collects the report.
pub fn simulate(options: &SimulateOptions) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    if options.generations == 0 {
        return Err("generations must be at least 1".into());
    }
    if options.records.checked_mul(RECORD_SIZE).is_none() {
        return Err(format!("too many records per segment: {}", options.records).into());
    }

    let root = CompactionMapRoot::new(MapConfig::default());
    let mut reclaimable: VecDeque<HashSet<SegmentId>> = VecDeque::new();
    let mut steps = Vec::new();

    for g in 1..=options.generations {
        let mut layer = root.new_generation(g);
        for i in 0..options.segments {
            for j in 0..options.records {
                let before = RecordId::new(written_segment(g - 1, i), j * RECORD_SIZE);
                let after = RecordId::new(written_segment(g, i), j * RECORD_SIZE);
                layer.put(before, after)?;
            }
        }
        layer.finalize()?;

        let map = root.extend(layer)?;
        debug!(generation = g, depth = map.depth(), "generation published");
        steps.push(StepReport::new(g, Action::Extend, &map, 0));
        reclaimable.push_back((0..options.segments).map(|i| written_segment(g - 1, i)).collect());

        if options.prune_every > 0 && g % options.prune_every == 0 {
            let keep = options.prune_every as usize;
            let stale = reclaimable.len().saturating_sub(keep);
            let ids: HashSet<SegmentId> = reclaimable.drain(..stale).flatten().collect();
            let summary = root.prune(&ids);
            info!(
                generation = g,
                segments = ids.len(),
                records = summary.records_removed,
                dropped = summary.layers_dropped,
                "pruned reclaimed segments"
            );
            steps.push(StepReport::new(
                g,
                Action::Prune,
                &root.load(),
                summary.records_removed,
            ));
        }
    }

    let chase = chase(&root, options.segments);
    let map = root.load();
    info!(
        depth = map.depth(),
        weight = map.total_weight(),
        max_hops = chase.max_hops,
        "simulation finished"
    );

    Ok(SimulationReport {
        steps,
        telemetry: map.telemetry(),
        stats: root.stats().snapshot(),
        chase,
    })
}

/// Follows the first record of each input segment of the oldest layer.
fn chase(root: &CompactionMapRoot, segments: u32) -> ChaseReport {
    let depth = root.load().depth();
    let Some(oldest) = root.load().generations().last().copied() else {
        return ChaseReport {
            probes: 0,
            max_hops: 0,
        };
    };

    let mut max_hops = 0;
    for i in 0..segments {
        let mut current = RecordId::new(written_segment(oldest - 1, i), 0);
        let mut hops = 0;
        while let Some(next) = root.resolve(current) {
            current = next;
            hops += 1;
            if hops > depth {
                break;
            }
        }
        max_hops = max_hops.max(hops);
    }

    ChaseReport {
        probes: segments as usize,
        max_hops,
    }
}

fn print_text_output(report: &SimulationReport) {
    println!("Compaction Map Simulation");
    println!("=========================");
    println!();
    println!(
        "{:>6}  {:<7}  {:>5}  {:>12}  {:>10}  {:>8}",
        "gen", "action", "depth", "weight", "records", "removed"
    );
    for step in &report.steps {
        let action = match step.action {
            Action::Extend => "extend",
            Action::Prune => "prune",
        };
        println!(
            "{:>6}  {:<7}  {:>5}  {:>12}  {:>10}  {:>8}",
            step.generation,
            action,
            step.depth,
            format_bytes(step.total_weight),
            step.total_records,
            step.records_removed
        );
    }

    println!();
    println!("Layers (newest first):");
    for layer in &report.telemetry.layers {
        println!(
            "  gen {:>4}: {:>8} records in {:>5} segments, {} ({})",
            layer.generation,
            layer.record_count,
            layer.segment_count,
            format_bytes(layer.estimated_weight),
            if layer.packed { "packed" } else { "live" }
        );
    }

    println!();
    println!("Lookups: {} ({} hits)", report.stats.lookups, report.stats.hits);
    println!(
        "Chase: {} probes, at most {} hops",
        report.chase.probes, report.chase.max_hops
    );
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}
