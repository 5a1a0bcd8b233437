use anyhow::{Context, Result};
use clap::Parser;
use declaration_sampling::export::ExportOptions;
use declaration_sampling::worker::{spawn_export, ExportEvent};
use declaration_sampling::{config, load_table, SamplingEngine, SamplingParams};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "declaration-sampler",
    version,
    about = "Select customs declarations for manual audit and export an Excel report",
    long_about = "\
Applies the standard selection criteria (regime quotas, per-sender/-tariff/-country \
coverage, top weight and value, document-code and keyword rules) to a declaration \
line-item table, tops the sample up to the target size with uniform random draws, \
and writes a Summary/Detail/Statistics workbook."
)]
struct Args {
    /// Line-item table (Excel .xlsx/.xls or CSV). Columns such as
    /// Beyanname_no, Rejim, Gtip, Fatura_miktari are discovered by name.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Output Excel path; overwritten atomically on success.
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Target sample percentage of unique declarations, in (0, 1].
    #[arg(long, default_value_t = 0.05)]
    percentage: f64,

    /// Minimum sample size.
    #[arg(long, default_value_t = 100)]
    min_count: usize,

    /// Maximum target sample size (rule-driven picks may exceed it).
    #[arg(long, default_value_t = 150)]
    max_count: usize,

    /// RNG seed for reproducible runs; omit for an OS-seeded run.
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Optional JSON parameter file; overrides the flags above when given.
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Abort the export after this many seconds.
    #[arg(long, default_value_t = 60)]
    export_timeout_secs: u64,

    /// Detail sheets split once they exceed this many rows.
    #[arg(long, default_value_t = 5000)]
    chunk_rows: usize,

    /// Verbose logging (rule evaluation, export phases).
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let params = match &args.params {
        Some(p) => config::load_params(p).context("failed to load parameter file")?,
        None => {
            let params = SamplingParams {
                percentage: args.percentage,
                min_count: args.min_count,
                max_count: args.max_count,
                seed: args.seed,
                detail_chunk_rows: args.chunk_rows,
                ..SamplingParams::default()
            };
            params.validate()?;
            params
        }
    };

    let table = load_table(&args.input)
        .with_context(|| format!("failed to load input table: {}", args.input.display()))?;

    let mut engine = SamplingEngine::new();
    engine.set_table(table).context("input table rejected")?;

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let report = engine
        .run_sampling(&params, &mut rng)
        .context("sampling run failed")?;

    eprintln!(
        "{} of {} declarations selected (target {})",
        report.stats.selected_count,
        report.stats.total_declarations,
        report.stats.target_sample_count
    );

    let opts = ExportOptions {
        detail_chunk_rows: params.detail_chunk_rows,
        ..ExportOptions::default()
    };
    let handle = spawn_export(report, args.output.clone(), opts);
    let timeout = Duration::from_secs(args.export_timeout_secs);
    if args.verbose {
        for event in handle.poll_events() {
            if let ExportEvent::Phase(phase) = event {
                eprintln!("export: {phase:?}");
            }
        }
    }
    handle
        .wait(timeout)
        .with_context(|| format!("export failed: {}", args.output.display()))?;

    println!("{}", args.output.display());
    Ok(())
}
