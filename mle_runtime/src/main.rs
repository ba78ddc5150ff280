use std::rc::Rc;

use anyhow::{Context, Result};
use log::info;
use mle_formats::Playprint;
use mle_runtime::registry::{ClassRegistry, Tables, TitleManifest};
use mle_runtime::stock;
use mle_runtime::summary::{self, LoadSummary};
use mle_runtime::Loader;

mod cli;
use cli::{LoadArgs, Request};

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::parse()?;
    let summary = run(&args)?;

    print_summary(&summary);
    if let Some(path) = &args.summary_json {
        summary.write_json(path)?;
        println!("Saved load summary to {}", path.display());
    }
    Ok(())
}

fn run(args: &LoadArgs) -> Result<LoadSummary> {
    let manifest = TitleManifest::from_json_file(&args.tables)?;
    let registry: Rc<dyn ClassRegistry> = Rc::new(Tables::from_manifest(manifest, stock::catalog()));
    let playprint = Playprint::open(&args.playprint)
        .with_context(|| format!("opening Playprint {}", args.playprint.display()))?;

    let mut report = LoadSummary {
        toc_entries: playprint.toc().map(|toc| toc.len()).unwrap_or(0),
        ..LoadSummary::default()
    };
    let mut loader = Loader::new(playprint, registry);

    for request in &args.requests {
        match *request {
            Request::Group(toc) => {
                let group = loader
                    .load_group(toc)
                    .with_context(|| format!("loading group at TOC entry {toc}"))?;
                info!("loaded group {} from TOC entry {toc}", group.class_name());
                report
                    .groups
                    .push(summary::summarize_group(Some(toc), group.as_ref()));
            }
            Request::Scene(toc) => {
                let scene = loader
                    .load_scene(toc)
                    .with_context(|| format!("loading scene at TOC entry {toc}"))?;
                info!("loaded scene from TOC entry {toc}");
                report
                    .scenes
                    .push(summary::summarize_scene(toc, &*scene.borrow()));
            }
            Request::BootScene => {
                let toc = loader
                    .registry()
                    .boot_scene()
                    .context("manifest does not name a boot scene")?;
                let scene = loader.load_boot_scene().context("loading boot scene")?;
                info!("loaded boot scene from TOC entry {toc}");
                report
                    .scenes
                    .push(summary::summarize_scene(toc, &*scene.borrow()));
            }
            Request::MediaRef(toc) => {
                let media_ref = loader
                    .load_media_ref(toc)
                    .with_context(|| format!("loading media reference at TOC entry {toc}"))?;
                report
                    .media_refs
                    .push(summary::summarize_media_ref(toc, media_ref.as_ref()));
            }
        }
    }

    report.sets = loader
        .sets()
        .iter()
        .enumerate()
        .map(|(index, slot)| summary::summarize_set(index, slot))
        .collect();
    Ok(report)
}

fn print_summary(report: &LoadSummary) {
    println!("Playprint with {} TOC entries", report.toc_entries);
    for group in &report.groups {
        print_group("", group);
    }
    for scene in &report.scenes {
        println!(
            "scene {} (TOC {}) with {} groups",
            scene.class,
            scene.toc_index,
            scene.groups.len()
        );
        for group in &scene.groups {
            print_group("  ", group);
        }
    }
    for set in report.sets.iter().filter(|set| set.class.is_some()) {
        println!(
            "set {} [{}] {} with {} attached roles",
            set.index,
            set.name,
            set.class.as_deref().unwrap_or("?"),
            set.attachments
        );
    }
    for media_ref in &report.media_refs {
        println!(
            "media reference {} (TOC {}) with {} entries",
            media_ref.class,
            media_ref.toc_index,
            media_ref.media.len()
        );
    }
}

fn print_group(indent: &str, group: &summary::GroupSummary) {
    match group.toc_index {
        Some(toc) => println!("{indent}group {} (TOC {toc})", group.class),
        None => println!("{indent}group {}", group.class),
    }
    for actor in &group.actors {
        println!(
            "{indent}  actor #{} {} role={} set={}",
            actor.id,
            actor.class,
            actor.role.as_deref().unwrap_or("-"),
            actor
                .set
                .map(|set| set.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        for property in &actor.properties {
            println!(
                "{indent}    {} ({}, {} bytes) {}",
                property.name, property.kind, property.len, property.preview
            );
        }
    }
}
