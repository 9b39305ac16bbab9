use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use memmap2::{Mmap, MmapOptions};

/// Memory maps an input file so decoders can borrow it as one byte slice.
pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open file '{}'", path.display()))?;
    let map = unsafe { MmapOptions::new().map(&file) }
        .with_context(|| format!("Failed to mmap file: '{}'", path.display()))?;
    log::debug!("Mapped '{}' ({} bytes)", path.display(), map.len());
    Ok(map)
}
