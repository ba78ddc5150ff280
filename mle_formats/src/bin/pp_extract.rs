use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use mle_formats::{Playprint, Tag};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Dump Playprint chunk payloads addressed by the TOC", version)]
struct Args {
    /// Playprint to extract (may be passed multiple times)
    #[arg(long = "playprint", value_name = "PATH", conflicts_with = "root")]
    playprints: Vec<PathBuf>,

    /// Directory scanned recursively for `.dpp` files when --playprint is not used
    #[arg(long = "root", value_name = "DIR", conflicts_with = "playprints")]
    root: Option<PathBuf>,

    /// Destination directory for payload files
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Only extract these TOC indices (may repeat)
    #[arg(long = "index", value_name = "N")]
    indices: Vec<u32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let playprints = resolve_playprint_paths(&args);
    if playprints.is_empty() {
        bail!("no Playprints to extract");
    }

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for path in playprints {
        extract_playprint(&path, &args.dest, &args.indices)?;
    }
    Ok(())
}

fn resolve_playprint_paths(args: &Args) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if !args.playprints.is_empty() {
        paths.extend(args.playprints.iter().cloned());
    } else if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            let is_dpp = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("dpp"))
                .unwrap_or(false);
            if entry.file_type().is_file() && is_dpp {
                paths.push(entry.into_path());
            }
        }
    }

    paths.sort();
    paths.dedup();
    paths
}

fn extract_playprint(path: &Path, dest_root: &Path, indices: &[u32]) -> Result<()> {
    let mut playprint = Playprint::open(path)
        .with_context(|| format!("opening Playprint {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("playprint")
        .to_string();
    let dest = dest_root.join(&stem);
    fs::create_dir_all(&dest).with_context(|| format!("creating {}", dest.display()))?;

    let chunks = playprint.top_level_chunks()?;
    let used = playprint.toc().map(|toc| toc.len()).unwrap_or(0) as u32;
    let wanted: Vec<u32> = if indices.is_empty() {
        (0..used).collect()
    } else {
        indices.to_vec()
    };

    let mut extracted = 0usize;
    for index in wanted {
        let offset = match playprint.toc_offset(index) {
            Ok(offset) => u64::from(offset),
            Err(err) => {
                warn!("skipping TOC entry {index} of {}: {err}", path.display());
                continue;
            }
        };
        let Some(tag) = chunks
            .iter()
            .find(|info| info.offset - info.header_len() == offset)
            .map(|info| info.chunk.tag)
        else {
            warn!("TOC entry {index} of {} does not point at a chunk", path.display());
            continue;
        };
        let payload = playprint
            .read_chunk_at(index, tag)
            .with_context(|| format!("reading TOC entry {index}"))?;
        let file_name = format!("{index:04}_{}.bin", file_tag(tag));
        let out = dest.join(file_name);
        fs::write(&out, &payload).with_context(|| format!("writing {}", out.display()))?;
        extracted += 1;
    }

    info!("extracted {extracted} chunks from {}", path.display());
    println!(
        "Extracted {} chunks from {} into {}",
        extracted,
        path.display(),
        dest.display()
    );
    Ok(())
}

fn file_tag(tag: Tag) -> String {
    tag.as_string()
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
