//! Status subcommand - stored position markers per stream

use anyhow::{Context, Result};
use clap::Args;

use chunkline_sink::{create_store, layout, read_marker, table_schema};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show these streams (slug, e.g. bnb_transfer)
    #[arg(short, long = "stream")]
    pub streams: Vec<String>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let store = create_store(&config.storage.url)
        .with_context(|| format!("Failed to open store {}", config.storage.url))?;

    let mut rows = Vec::new();
    for stream in config.select(&args.streams)? {
        let id = stream.id();
        let marker = read_marker(store.as_ref(), &id)
            .with_context(|| format!("Failed to read marker of {}", id.slug()))?;
        rows.push(vec![
            id.slug(),
            id.method.canonical().to_string(),
            if table_schema(&id).is_some() {
                "registered".to_string()
            } else {
                "inferred".to_string()
            },
            marker.map(|m| m.to_string()).unwrap_or_else(|| "never flushed".into()),
            layout::marker_key(&id),
        ]);
    }

    if rows.is_empty() {
        log::warn!("No streams configured");
        return Ok(());
    }
    super::print_table(
        &["Stream", "Method", "Schema", "Last block", "Marker key"],
        rows,
    );
    eprintln!("Store: {}", store.describe());
    Ok(())
}
