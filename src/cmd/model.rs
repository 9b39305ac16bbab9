use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use argh::FromArgs;
use suralib::{
    format::model::{decode_model_bytes, Model},
    util::file::map_file,
};

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process SURA model files
#[argh(subcommand, name = "model")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
    Json(JsonArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print a summary of a model
#[argh(subcommand, name = "info")]
struct InfoArgs {
    #[argh(positional)]
    /// input model
    input: PathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// dump a decoded model as JSON
#[argh(subcommand, name = "json")]
struct JsonArgs {
    #[argh(positional)]
    /// input model
    input: PathBuf,
    #[argh(option, short = 'o')]
    /// output file (default: stdout)
    output: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
        SubCommand::Json(c_args) => json(c_args),
    }
}

fn load(path: &Path) -> Result<Model> {
    let data = map_file(path)?;
    decode_model_bytes(&data)
        .with_context(|| format!("Failed to decode model '{}'", path.display()))
}

fn info(args: InfoArgs) -> Result<()> {
    let model = load(&args.input)?;
    let header = &model.header;
    log::info!("Model info:");
    log::info!("  Tag ID: {:#010X}", header.tag_id);
    log::info!("  RTGO: {}", header.is_rtgo);
    log::info!("  Regions: {}", model.regions.len());
    for region in &model.regions {
        log::info!("    {}: {} permutation(s)", region.name, region.permutations.len());
    }
    log::info!("  Nodes: {}", model.bones.len());
    log::info!("  Markers: {}", model.markers.len());
    log::info!("  Materials: {:?}", model.materials);
    log::info!("  Sections: {}", model.sections.len());
    for (idx, section) in model.sections.iter().enumerate() {
        let triangles: usize =
            section.submeshes.iter().map(|submesh| submesh.index_count.max(0) as usize / 3).sum();
        log::info!(
            "    {idx}: {} ({}), {} vertices, {} submesh(es), ~{triangles} triangles",
            section.vertex_type,
            section.index_buffer.topology,
            section.vertex_buffers.vertex_count(),
            section.submeshes.len(),
        );
    }
    if header.is_rtgo {
        log::info!("  Offsets: {}", model.offsets.len());
    }
    Ok(())
}

fn json(args: JsonArgs) -> Result<()> {
    let model = load(&args.input)?;
    write_json(&model, args.output.as_deref())
}
