//! Ingest subcommand - read record streams and flush them day by day

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Args;
use rayon::prelude::*;

use chunkline_core::{
    BatchReader, DailyAccumulator, SharedProgress, fmt_num, is_shutdown_requested,
};
use chunkline_sink::{DuckDbWarehouse, SinkAdapter, create_store};

use crate::config::{Config, StreamConfig};

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Only ingest these streams (slug, e.g. bnb_transfer)
    #[arg(short, long = "stream")]
    pub streams: Vec<String>,

    /// Skip records at or below each stream's stored position marker
    #[arg(long)]
    pub resume: bool,

    /// Flush the last day at end of input even though no later day arrived
    #[arg(long)]
    pub flush_open_day: bool,
}

/// Per-stream result shown in the final summary
#[derive(Debug, Default)]
struct StreamSummary {
    records: usize,
    skipped: usize,
    days_flushed: u64,
    left_open: usize,
    marker: Option<i64>,
    warehouse_failures: usize,
    interrupted: bool,
    elapsed: Duration,
}

pub fn run(args: IngestArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let selected = config.select(&args.streams)?;
    if selected.is_empty() {
        bail!("no streams configured; add [[streams]] entries to the config file");
    }

    let store = create_store(&config.storage.url)
        .with_context(|| format!("Failed to open store {}", config.storage.url))?;
    log::info!("Store: {}", store.describe());

    let warehouse = if config.warehouse.enabled {
        let db = DuckDbWarehouse::open(&config.warehouse.path).with_context(|| {
            format!("Failed to open warehouse {}", config.warehouse.path.display())
        })?;
        Some(db)
    } else {
        None
    };

    // Build every sink up front so config errors surface before any I/O
    let mut jobs = Vec::with_capacity(selected.len());
    for stream in selected {
        let mut sink = SinkAdapter::new(stream.id(), store.clone(), config.sink_config(stream))
            .with_context(|| format!("Invalid stream {}", stream.id().slug()))?;
        if let Some(db) = &warehouse {
            sink = sink.with_warehouse(Box::new(db.try_clone()?));
        }
        jobs.push((stream, sink));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.ingest.workers)
        .thread_name(|i| format!("chunkline-{i}"))
        .build()
        .context("Failed to build worker pool")?;

    let start = Instant::now();
    let results: Vec<(String, Result<StreamSummary>)> = pool.install(|| {
        jobs.into_par_iter()
            .map(|(stream, sink)| {
                let slug = stream.id().slug();
                let result = ingest_stream(stream, sink, &args, config.ingest.batch_size, progress);
                (slug, result)
            })
            .collect()
    });

    print_summary(&results);

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    for (slug, result) in &results {
        if let Err(e) = result {
            log::error!("{slug}: {e:#}");
        }
    }
    log::info!(
        "Ingested {} streams in {:.1}s",
        results.len(),
        start.elapsed().as_secs_f64()
    );
    if failed > 0 {
        bail!("{failed} of {} streams failed", results.len());
    }
    Ok(())
}

fn ingest_stream(
    stream: &StreamConfig,
    mut sink: SinkAdapter,
    args: &IngestArgs,
    batch_size: usize,
    progress: &SharedProgress,
) -> Result<StreamSummary> {
    let id = stream.id();
    let start = Instant::now();
    let pb = progress.stream_line(&id.slug());

    let mut reader = BatchReader::open(&stream.input, batch_size)
        .with_context(|| format!("Failed to open {}", stream.input.display()))?;
    if args.resume {
        let marker = sink.read_marker().context("Failed to read position marker")?;
        if let Some(block) = marker {
            log::info!("{id}: resuming after block {block}");
            reader = reader.skip_through(sink.marker_column_index(), block);
        }
    }

    let mut acc = DailyAccumulator::new(id.clone());
    let mut summary = StreamSummary::default();

    loop {
        if is_shutdown_requested() {
            log::warn!("{id}: shutdown requested, open day left unflushed");
            summary.interrupted = true;
            break;
        }
        let Some(batch) = reader
            .next_batch()
            .with_context(|| format!("Failed to read {}", stream.input.display()))?
        else {
            break;
        };

        // Days covered by the skipped prefix were flushed by an earlier run
        if let Some(day) = reader.last_skipped_day() {
            acc.mark_flushed_through(day);
        }

        summary.records += batch.len();
        acc.submit(batch, &mut sink)
            .with_context(|| format!("{id}: batch ending at line {}", reader.lines_read()))?;

        pb.set_message(format!(
            "{} records, {} days, open {}",
            fmt_num(summary.records),
            acc.file_counter(),
            acc.open_day().map(|d| d.to_string()).unwrap_or_else(|| "-".into())
        ));
    }

    if args.flush_open_day && !summary.interrupted {
        if let Some(day) = acc.flush_open_day(&mut sink)? {
            log::info!("{id}: flushed open day {day}");
        }
    }

    pb.finish_and_clear();

    summary.skipped = reader.records_skipped();
    summary.days_flushed = acc.file_counter();
    summary.left_open = acc.buffer().len();
    summary.marker = sink.last_report().map(|r| r.marker_block);
    summary.warehouse_failures = sink.stats().warehouse_failures;
    summary.elapsed = start.elapsed();

    log::info!(
        "{id}: {} records, {} days flushed, {} left open ({:.1}s)",
        fmt_num(summary.records),
        summary.days_flushed,
        fmt_num(summary.left_open),
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

fn print_summary(results: &[(String, Result<StreamSummary>)]) {
    let rows = results.iter().map(|(slug, result)| match result {
        Ok(s) => vec![
            slug.clone(),
            fmt_num(s.records),
            fmt_num(s.skipped),
            s.days_flushed.to_string(),
            fmt_num(s.left_open),
            s.marker.map(|m| m.to_string()).unwrap_or_else(|| "-".into()),
            s.warehouse_failures.to_string(),
            if s.interrupted {
                "interrupted".to_string()
            } else {
                format!("{:.1}s", s.elapsed.as_secs_f64())
            },
        ],
        Err(e) => {
            let mut row = vec![slug.clone(), format!("failed: {e}")];
            row.resize(8, String::new());
            row
        }
    });
    super::print_table(
        &[
            "Stream",
            "Records",
            "Skipped",
            "Days",
            "Open",
            "Marker",
            "WH failures",
            "Time",
        ],
        rows,
    );
}
