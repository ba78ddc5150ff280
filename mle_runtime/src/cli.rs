use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Load groups, scenes and media references out of a Playprint",
    version
)]
pub struct Args {
    /// Playprint container to load from
    #[arg(long)]
    pub playprint: PathBuf,

    /// Title manifest JSON with class, property and set tables
    #[arg(long)]
    pub tables: PathBuf,

    /// TOC index of a group chunk to load (repeatable)
    #[arg(long = "group", value_name = "TOC")]
    pub groups: Vec<u32>,

    /// TOC index of a scene chunk to load
    #[arg(long, value_name = "TOC")]
    pub scene: Option<u32>,

    /// Load the boot scene named by the manifest
    #[arg(long)]
    pub boot: bool,

    /// TOC index of a media reference list to load (repeatable)
    #[arg(long = "media", value_name = "TOC")]
    pub media: Vec<u32>,

    /// Path to write the loaded graph summary as JSON
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

/// What to pull out of the container, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Group(u32),
    Scene(u32),
    BootScene,
    MediaRef(u32),
}

#[derive(Debug)]
pub struct LoadArgs {
    pub playprint: PathBuf,
    pub tables: PathBuf,
    pub requests: Vec<Request>,
    pub summary_json: Option<PathBuf>,
}

pub fn parse() -> Result<LoadArgs> {
    Args::parse().into_load_args()
}

impl Args {
    fn into_load_args(self) -> Result<LoadArgs> {
        if self.boot && self.scene.is_some() {
            bail!("--boot and --scene are mutually exclusive");
        }

        let mut requests: Vec<Request> = self.groups.iter().copied().map(Request::Group).collect();
        if let Some(scene) = self.scene {
            requests.push(Request::Scene(scene));
        }
        if self.boot {
            requests.push(Request::BootScene);
        }
        requests.extend(self.media.iter().copied().map(Request::MediaRef));
        if requests.is_empty() {
            bail!("nothing to load: pass --group, --scene, --boot or --media");
        }

        Ok(LoadArgs {
            playprint: self.playprint,
            tables: self.tables,
            requests,
            summary_json: self.summary_json,
        })
    }
}
