use tracing::info;

use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn create_path_if_not_exists(path: &Path) -> anyhow::Result<()> {
    // remove the file name from the path
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if !parent.as_os_str().is_empty() && !parent.exists() {
        info!("Creating path: {:?}", parent);
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_string_to_file(path: &Path, content: &str) -> anyhow::Result<()> {
    create_path_if_not_exists(path)?;
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_file_creating_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("jobs/nested/plan.yaml");
        write_string_to_file(&target, "meta: {}\n").unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "meta: {}\n");
    }
}
