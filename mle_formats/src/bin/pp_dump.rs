use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mle_formats::{ChunkInfo, DppHeader, Playprint, TocEntry};
use serde::Serialize;

/// List the header, table of contents and top-level chunks of a Playprint.
#[derive(Parser, Debug)]
#[command(about = "Inspect a Playprint container", version)]
struct Args {
    /// Playprint file to inspect
    path: PathBuf,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    path: String,
    byte_format: mle_formats::ByteFormat,
    header: Option<DppHeader>,
    toc: &'a [TocEntry],
    chunks: &'a [ChunkInfo],
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut playprint = Playprint::open(&args.path)
        .with_context(|| format!("opening Playprint {}", args.path.display()))?;
    let chunks = playprint
        .top_level_chunks()
        .context("listing top-level chunks")?;
    let toc = playprint.toc().map(|toc| toc.entries()).unwrap_or(&[]);

    if args.json {
        let report = Report {
            path: args.path.display().to_string(),
            byte_format: playprint.byte_format(),
            header: playprint.header(),
            toc,
            chunks: &chunks,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} ({:?}) {} TOC entries",
        args.path.display(),
        playprint.byte_format(),
        toc.len()
    );
    if let Some(header) = playprint.header() {
        println!("version {} date {}", header.version, header.date);
    }
    for (index, entry) in toc.iter().enumerate() {
        let tag = chunks
            .iter()
            .find(|info| info.offset - info.header_len() == u64::from(entry.offset))
            .map(|info| info.chunk.tag.as_string())
            .unwrap_or_else(|| String::from("????"));
        println!(
            "toc {index:>4} label {label:>6} {tag} @ {offset:#010x}",
            label = entry.label,
            offset = entry.offset
        );
    }
    for info in &chunks {
        println!(
            "{tag:<4} {form:<4} {offset:>10} {size:>10}",
            tag = info.chunk.tag.as_string(),
            form = info.form.as_string(),
            offset = info.offset,
            size = info.chunk.size
        );
    }
    Ok(())
}
