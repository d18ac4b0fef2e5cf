//! Build (or reuse) the on-disk DAG file for a block number.
//!
//! Usage: gen_dag <block_number> [dirname]

use anyhow::{bail, Context, Result};
use rifthash::{get_cache_size, get_dataset_size, get_epoch, get_seedhash, FullDataset, LightCache};
use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let block_number: u64 = match args.next() {
        Some(arg) => arg.parse().context("block number must be an integer")?,
        None => bail!("usage: gen_dag <block_number> [dirname]"),
    };
    let dirname = PathBuf::from(args.next().unwrap_or_else(|| ".rifthash".to_string()));

    println!(
        "epoch {}: cache {} MB, dataset {} MB, seed {}",
        get_epoch(block_number),
        get_cache_size(block_number) / (1024 * 1024),
        get_dataset_size(block_number) / (1024 * 1024),
        get_seedhash(block_number)
    );

    let light = LightCache::new(block_number)?;

    let mut last = u32::MAX;
    let full = FullDataset::new(&dirname, &light, |percent| {
        if percent != last {
            print!("\r{:3}%", percent);
            let _ = std::io::stdout().flush();
            last = percent;
        }
        0
    })?;

    println!(
        "\rDAG ready: {} ({} bytes)",
        full.path().display(),
        full.file_len()?
    );
    Ok(())
}
