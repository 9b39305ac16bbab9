use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use argh::FromArgs;

pub mod forge;
pub mod model;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum SubCommand {
    Forge(forge::Args),
    Model(model::Args),
}

/// Writes `value` as pretty JSON to `output`, or to stdout when no path is given.
pub fn write_json<T: serde::Serialize + ?Sized>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            log::info!("Writing {}", path.display());
            let mut file = BufWriter::new(
                File::create(path)
                    .with_context(|| format!("Failed to create output file '{}'", path.display()))?,
            );
            serde_json::to_writer_pretty(&mut file, value)?;
            file.flush()?;
        }
        None => {
            let mut out = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
