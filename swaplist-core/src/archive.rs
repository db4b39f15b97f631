use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{SwapError, SwapResult};

const WORKSPACE_PREFIX: &str = "swap_extract_";

/// A scratch directory exclusively owned by one merge job.
///
/// The directory is removed when the workspace is dropped, so every early
/// return releases it. [`ArchiveWorkspace::close`] removes it explicitly and
/// logs a failed removal instead of reporting it.
#[derive(Debug)]
pub struct ArchiveWorkspace {
    dir: TempDir,
}

impl ArchiveWorkspace {
    pub fn create() -> SwapResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()?;
        debug!(path = %dir.path().display(), "Created workspace");
        Ok(Self { dir })
    }

    /// Extracts `archive` into a fresh workspace.
    pub fn extract(archive: &Path) -> SwapResult<Self> {
        let workspace = Self::create()?;
        let file = fs::File::open(archive)
            .map_err(|e| SwapError::malformed_archive(archive, e))?;
        let count = extract_zip(file, workspace.root()).map_err(|e| match e {
            SwapError::Io(io) => SwapError::malformed_archive(archive, io),
            SwapError::MalformedArchive { reason, .. } => {
                SwapError::malformed_archive(archive, reason)
            }
            other => other,
        })?;
        debug!(
            archive = %archive.display(),
            workspace = %workspace.root().display(),
            files = count,
            "Extracted archive"
        );
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes the workspace contents as a zip archive at `output`.
    pub fn repackage(&self, output: &Path) -> SwapResult<usize> {
        archive_directory(self.root(), output)
    }

    /// Removes the directory now. Failure is logged, never returned.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "Removed workspace"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

fn sanitize_relative_path(path: &str) -> SwapResult<PathBuf> {
    let candidate = Path::new(path);
    if candidate.is_absolute()
        || candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(SwapError::malformed_archive(
            path,
            "entry escapes the extraction root",
        ));
    }
    Ok(candidate.components().collect())
}

fn extract_zip<R: Read + Seek>(reader: R, target_dir: &Path) -> SwapResult<usize> {
    let mut archive =
        ZipArchive::new(reader).map_err(|e| SwapError::malformed_archive(target_dir, e))?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SwapError::malformed_archive(target_dir, e))?;
        let rel_path = sanitize_relative_path(entry.name())?;
        let out_path = target_dir.join(&rel_path);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut outfile = fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut outfile)?;
        written += 1;
    }

    Ok(written)
}

/// Zips every regular file under `source_dir` into `output`, entries named
/// relative to the root with `/` separators and sorted.
pub fn archive_directory(source_dir: &Path, output: &Path) -> SwapResult<usize> {
    fn collect(dir: &Path, root: &Path, acc: &mut Vec<PathBuf>) -> SwapResult<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                collect(&path, root, acc)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                acc.push(rel.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files: Vec<PathBuf> = Vec::new();
    collect(source_dir, source_dir, &mut files)?;
    files.sort();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(output)?;
    write_zip(file, source_dir, &files)?;
    Ok(files.len())
}

fn write_zip<W: Write + Seek>(sink: W, root: &Path, files: &[PathBuf]) -> SwapResult<()> {
    let mut writer = ZipWriter::new(sink);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for rel in files {
        let mut file = fs::File::open(root.join(rel))?;
        let rel_string = rel.to_string_lossy().replace('\\', "/");
        writer
            .start_file(rel_string, options)
            .map_err(|e| SwapError::malformed_archive(rel, e))?;
        std::io::copy(&mut file, &mut writer)?;
    }

    writer
        .finish()
        .map_err(|e| SwapError::malformed_archive(root, e))?;
    Ok(())
}
