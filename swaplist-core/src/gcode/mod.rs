//! Combined G-code generation for swap jobs.

pub mod macros;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use crate::errors::SwapResult;
use crate::playlist::ExpandedGcodeEntry;

pub use macros::{SWAP_INIT_GCODE, SWAP_SEQUENCE_GCODE};

/// Counts reported after assembling a G-code stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblySummary {
    pub plates: usize,
    pub copies: usize,
    pub skipped: usize,
}

fn write_terminated<W: Write>(out: &mut W, chunk: &[u8]) -> io::Result<()> {
    out.write_all(chunk)?;
    if !chunk.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Writes the init macro, then every plate body `copy_count` times, each
/// followed by the swap macro. Bodies are copied verbatim; a body whose
/// file is missing is logged and left out.
pub fn assemble_gcode<W: Write>(
    entries: &[ExpandedGcodeEntry],
    out: &mut W,
) -> SwapResult<AssemblySummary> {
    let mut summary = AssemblySummary::default();
    out.write_all(SWAP_INIT_GCODE.as_bytes())?;

    for entry in entries {
        let body = match fs::read(&entry.gcode_path) {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    path = %entry.gcode_path.display(),
                    error = %e,
                    "G-code file not readable, skipping"
                );
                summary.skipped += 1;
                continue;
            }
        };

        debug!(
            path = %entry.gcode_path.display(),
            copies = entry.copy_count,
            bytes = body.len(),
            "Appending plate G-code"
        );
        for _ in 0..entry.copy_count {
            write_terminated(out, &body)?;
            write_terminated(out, SWAP_SEQUENCE_GCODE.as_bytes())?;
            summary.copies += 1;
        }
        summary.plates += 1;
    }

    Ok(summary)
}

/// Assembles the combined program into `path`.
pub fn write_gcode(entries: &[ExpandedGcodeEntry], path: &Path) -> SwapResult<AssemblySummary> {
    let mut file = io::BufWriter::new(fs::File::create(path)?);
    let summary = assemble_gcode(entries, &mut file)?;
    file.flush()?;
    info!(
        path = %path.display(),
        plates = summary.plates,
        copies = summary.copies,
        skipped = summary.skipped,
        "Generated combined G-code"
    );
    Ok(summary)
}

/// Lowercase hex MD5 of a file's contents.
pub fn file_md5(path: &Path) -> SwapResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes `<gcode>.md5` beside the G-code file and returns the digest.
pub fn write_checksum(gcode_path: &Path) -> SwapResult<String> {
    let digest = file_md5(gcode_path)?;
    let mut sidecar = gcode_path.as_os_str().to_owned();
    sidecar.push(".md5");
    fs::write(&sidecar, &digest)?;
    debug!(path = %Path::new(&sidecar).display(), md5 = %digest, "Wrote checksum");
    Ok(digest)
}
