use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use suralib::{
    bond::{decode_value_tree, DecodeLimits},
    forge::{blob_url, read_forge_map},
    util::file::map_file,
};
use uuid::Uuid;

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process forge map variants
#[argh(subcommand, name = "forge")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Objects(ObjectsArgs),
    Dump(DumpArgs),
    Url(UrlArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// extract placed objects and folders as JSON
#[argh(subcommand, name = "objects")]
struct ObjectsArgs {
    #[argh(positional)]
    /// input map variant
    input: PathBuf,
    #[argh(option, short = 'o')]
    /// output file (default: stdout)
    output: Option<PathBuf>,
    #[argh(option, default = "DecodeLimits::default().max_depth")]
    /// maximum nesting depth
    max_depth: usize,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// dump the raw value tree as JSON
#[argh(subcommand, name = "dump")]
struct DumpArgs {
    #[argh(positional)]
    /// input map variant
    input: PathBuf,
    #[argh(option, short = 'o')]
    /// output file (default: stdout)
    output: Option<PathBuf>,
    #[argh(option, default = "DecodeLimits::default().max_depth")]
    /// maximum nesting depth
    max_depth: usize,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print the download URL of a map variant
#[argh(subcommand, name = "url")]
struct UrlArgs {
    #[argh(positional)]
    /// asset id
    asset_id: Uuid,
    #[argh(positional)]
    /// version id
    version_id: Uuid,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Objects(c_args) => objects(c_args),
        SubCommand::Dump(c_args) => dump(c_args),
        SubCommand::Url(c_args) => url(c_args),
    }
}

fn objects(args: ObjectsArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    let map = read_forge_map(&data, DecodeLimits { max_depth: args.max_depth })
        .with_context(|| format!("Failed to decode '{}'", args.input.display()))?;
    log::info!("Objects: {}, folders: {}", map.objects.len(), map.folders.len());
    write_json(&map, args.output.as_deref())
}

fn dump(args: DumpArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    let tree = decode_value_tree(&data, DecodeLimits { max_depth: args.max_depth })
        .with_context(|| format!("Failed to decode '{}'", args.input.display()))?;
    write_json(&tree, args.output.as_deref())
}

fn url(args: UrlArgs) -> Result<()> {
    println!("{}", blob_url(&args.asset_id, &args.version_id));
    Ok(())
}
