mod constants;

use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vicinity_client::{fetch_snapshot, FetchConfig, JsonlProvider};
use vicinity_core::{
    cross_reference_recall, drift, evaluate, neighbor_overlap, pairwise, CrossRecall, CutoffTable,
    DriftRecord, EngineConfig, Exclusion, PairRtt, QueryEngine, RecallReport, Result, VicinityError,
};

use constants::*;

#[derive(Parser, Debug)]
#[command(about = "Index Vivaldi coordinates on a Hilbert curve and measure RTT query accuracy")]
struct Args {
    /// JSONL file, one coordinate per line
    #[arg(long)]
    coordinates: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    fetch_config: Option<PathBuf>,

    /// Node to calibrate and query from (default: first by name)
    #[arg(long)]
    reference: Option<String>,

    #[arg(long = "budget")]
    budgets: Vec<f64>,

    #[arg(long)]
    calibration: Option<PathBuf>,

    #[arg(long)]
    calibration_out: Option<PathBuf>,

    /// Other references the calibration is reused for
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    #[arg(long, default_value_t = DEFAULT_NEIGHBORS)]
    neighbors: usize,

    #[arg(long, default_value_t = DEFAULT_PAIRS)]
    pairs: usize,

    #[arg(long)]
    drift: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
enum CalibrationSource {
    Computed,
    Loaded,
    Recomputed,
}

impl CalibrationSource {
    fn label(self) -> &'static str {
        match self {
            CalibrationSource::Computed => "computed",
            CalibrationSource::Loaded => "loaded",
            CalibrationSource::Recomputed => "recomputed, stored table was stale",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotSummary {
    nodes: usize,
    dim: usize,
    fingerprint: String,
    malformed_lines: usize,
    duplicate_lines: usize,
    excluded: Vec<Exclusion>,
    grid_size: u32,
    shared_indices: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BudgetReport {
    budget_ms: f64,
    recall: Option<RecallReport>,
    box_candidates: usize,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    engine: EngineConfig,
    fetch: FetchConfig,
    samples: usize,
    seed: u64,
    neighbors: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisOutput {
    params: Params,
    snapshot: SnapshotSummary,
    reference: String,
    calibration_source: CalibrationSource,
    calibration: CutoffTable,
    budgets: Vec<BudgetReport>,
    cross_reference: Vec<CrossRecall>,
    neighbor_overlap: f64,
    drift: Option<Vec<DriftRecord>>,
    closest_pairs: Option<Vec<PairRtt>>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let cfg = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let fetch_cfg = match &args.fetch_config {
        Some(path) => FetchConfig::load(path)?,
        None => FetchConfig::default(),
    };

    let provider = Arc::new(JsonlProvider::load(&args.coordinates)?);
    let (malformed, duplicates) = (provider.malformed(), provider.duplicates());
    let snapshot = fetch_snapshot(provider, &fetch_cfg)?;
    let engine = QueryEngine::build(Arc::new(snapshot), &cfg)?;

    let reference = resolve_reference(&engine, args.reference.as_deref())?;
    let (table, source) = obtain_calibration(&engine, &reference, args.calibration.as_deref())?;
    if let Some(out_path) = &args.calibration_out {
        save_calibration(out_path, &table)?;
        tracing::info!(path = %out_path.display(), "calibration saved");
    }

    let budgets = if args.budgets.is_empty() {
        DEFAULT_BUDGETS_MS.to_vec()
    } else {
        args.budgets.clone()
    };
    let budget_reports = budgets
        .iter()
        .map(|&b| budget_report(&engine, &table, &reference, b))
        .collect::<Result<Vec<_>>>()?;

    let others = sample_references(&engine, &reference, args.samples, args.seed);
    let mut cross = Vec::new();
    if !others.is_empty() {
        for &b in &budgets {
            match cross_reference_recall(&engine, &table, &others, b) {
                Ok(c) => cross.push(c),
                Err(VicinityError::UncalibratedBudget { .. }) => {}
                Err(err) => return Err(err),
            }
        }
    }

    let overlap = neighbor_overlap(&engine, &reference, args.neighbors)?;
    let drift_records = if args.drift {
        Some(drift(engine.snapshot())?)
    } else {
        None
    };
    let closest_pairs = if args.pairs > 0 {
        let mut pairs = pairwise(engine.snapshot())?;
        pairs.truncate(args.pairs);
        Some(pairs)
    } else {
        None
    };

    let summary = SnapshotSummary {
        nodes: engine.snapshot().len(),
        dim: engine.snapshot().dim(),
        fingerprint: engine.snapshot().fingerprint().to_string(),
        malformed_lines: malformed,
        duplicate_lines: duplicates,
        excluded: engine.snapshot().excluded().to_vec(),
        grid_size: engine.mapper().grid_size(),
        shared_indices: engine.index().duplicate_indices().len(),
    };

    if args.json {
        let output = AnalysisOutput {
            params: Params {
                engine: cfg,
                fetch: fetch_cfg,
                samples: args.samples,
                seed: args.seed,
                neighbors: args.neighbors,
            },
            snapshot: summary,
            reference,
            calibration_source: source,
            calibration: table,
            budgets: budget_reports,
            cross_reference: cross,
            neighbor_overlap: overlap,
            drift: drift_records,
            closest_pairs,
        };
        let text = serde_json::to_string_pretty(&output)
            .unwrap_or_else(|_| "{\"error\":\"failed to serialize\"}".to_string());
        println!("{text}");
        return Ok(());
    }

    print_snapshot_summary(&summary);
    print_calibration(&table, source);
    print_budgets(&reference, &budget_reports);
    if !cross.is_empty() {
        print_cross(&cross);
    }
    println!(
        "\nNeighbour overlap (k={}): {:.2} of the nearest by RTT are nearest on the curve",
        args.neighbors, overlap
    );
    if let Some(records) = &drift_records {
        print_drift(records);
    }
    if let Some(pairs) = &closest_pairs {
        print_pairs(pairs);
    }

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn resolve_reference(engine: &QueryEngine, requested: Option<&str>) -> Result<String> {
    match requested {
        Some(name) => engine.snapshot().require(name).map(|c| c.name.clone()),
        None => engine
            .snapshot()
            .coordinates()
            .first()
            .map(|c| c.name.clone())
            .ok_or(VicinityError::EmptySnapshot),
    }
}

fn obtain_calibration(
    engine: &QueryEngine,
    reference: &str,
    path: Option<&Path>,
) -> Result<(CutoffTable, CalibrationSource)> {
    let Some(path) = path else {
        return Ok((engine.calibrate(reference)?, CalibrationSource::Computed));
    };
    let table = load_calibration(path)?;
    match table.ensure_fresh(engine.snapshot().fingerprint()) {
        Ok(()) => {
            if table.reference != reference {
                tracing::warn!(
                    reference,
                    calibrated_for = %table.reference,
                    "stored calibration was made for another node"
                );
            }
            Ok((table, CalibrationSource::Loaded))
        }
        Err(err) => {
            tracing::warn!(error = %err, "recalibrating");
            Ok((engine.calibrate(reference)?, CalibrationSource::Recomputed))
        }
    }
}

fn load_calibration(path: &Path) -> Result<CutoffTable> {
    let file = File::open(path)?;
    let table: CutoffTable = serde_json::from_reader(file)?;
    Ok(table)
}

fn save_calibration(path: &Path, table: &CutoffTable) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, table)?;
    Ok(())
}

fn budget_report(
    engine: &QueryEngine,
    table: &CutoffTable,
    reference: &str,
    budget_ms: f64,
) -> Result<BudgetReport> {
    let box_candidates = engine.query_box(reference, budget_ms)?.candidates;
    match evaluate(engine, table, reference, budget_ms) {
        Ok(report) => Ok(BudgetReport {
            budget_ms,
            recall: Some(report),
            box_candidates,
            error: None,
        }),
        Err(err @ VicinityError::UncalibratedBudget { .. }) => Ok(BudgetReport {
            budget_ms,
            recall: None,
            box_candidates,
            error: Some(err.to_string()),
        }),
        Err(err) => Err(err),
    }
}

fn sample_references(
    engine: &QueryEngine,
    reference: &str,
    samples: usize,
    seed: u64,
) -> Vec<String> {
    let candidates: Vec<&str> = engine
        .snapshot()
        .coordinates()
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| *name != reference)
        .collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked: Vec<String> = candidates
        .choose_multiple(&mut rng, samples)
        .map(|name| name.to_string())
        .collect();
    picked.sort();
    picked
}

fn print_snapshot_summary(s: &SnapshotSummary) {
    let short = s.fingerprint.get(..12).unwrap_or(&s.fingerprint);
    println!("Snapshot: {} nodes, dim={}, fingerprint={}", s.nodes, s.dim, short);
    println!(
        "  grid {}x{}, {} curve indices shared by more than one node",
        s.grid_size, s.grid_size, s.shared_indices
    );
    if s.malformed_lines > 0 || s.duplicate_lines > 0 {
        println!(
            "  skipped lines: malformed={} duplicate={}",
            s.malformed_lines, s.duplicate_lines
        );
    }
    if !s.excluded.is_empty() {
        println!("  excluded {} nodes:", s.excluded.len());
        for e in &s.excluded {
            println!("  - {} ({})", e.name, e.reason);
        }
    }
}

fn print_calibration(table: &CutoffTable, source: CalibrationSource) {
    println!(
        "\nCalibration for {} ({}, p{:.0}):",
        table.reference,
        source.label(),
        table.percentile * 100.0
    );
    if table.is_empty() {
        println!("- no threshold has nodes under it");
    }
    for e in &table.entries {
        println!(
            "- <= {:.1}ms cutoff={} nodes={}",
            e.threshold_ms, e.cutoff, e.population
        );
    }
}

fn print_budgets(reference: &str, reports: &[BudgetReport]) {
    println!("\nQueries from {} (recall against a full scan):", reference);
    for r in reports {
        match (&r.recall, &r.error) {
            (Some(rep), _) => println!(
                "- {:.1}ms found={}/{} recall={:.3} scanned={:.1}% box_scanned={}",
                r.budget_ms,
                rep.true_positives,
                rep.expected,
                rep.recall,
                rep.candidate_ratio * 100.0,
                r.box_candidates
            ),
            (None, Some(err)) => println!("- {:.1}ms {}", r.budget_ms, err),
            (None, None) => {}
        }
    }
}

fn print_cross(cross: &[CrossRecall]) {
    println!(
        "\nCross-reference recall (table made for {}):",
        cross[0].calibrated_for
    );
    for c in cross {
        println!(
            "- {:.1}ms queries={} mean={:.3} min={:.3}",
            c.budget_ms, c.queries, c.mean_recall, c.min_recall
        );
    }
}

fn print_drift(records: &[DriftRecord]) {
    println!("\nDrift from origin (ms):");
    for r in records {
        println!(
            "- {} vec={:.2} total={:.2} height={:.5} adj={:.5}",
            r.name, r.vec_distance_ms, r.total_drift_ms, r.height, r.adjustment
        );
    }
}

fn print_pairs(pairs: &[PairRtt]) {
    println!("\nClosest pairs:");
    for p in pairs {
        println!("- {} <-> {} {:.2}ms", p.from, p.to, p.rtt_ms);
    }
}
