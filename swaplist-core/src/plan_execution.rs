use crate::pipeline::RecombinationPipeline;
use crate::plan::{OutputTarget, SwapPlan};
use crate::publish::Publisher;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use tracing::{debug, error, info, warn};

use anyhow::Result;

fn load_plan(plan_file_path: &Path) -> Result<SwapPlan> {
    let content = std::fs::read_to_string(plan_file_path)?;
    SwapPlan::from_yaml(&content)
}

/// Runs one plan and returns the archive it produced.
pub fn run_plan(plan: &SwapPlan, plan_file_path: &Path) -> Result<PathBuf> {
    info!("Running swap job: {}", plan.name());
    let entries = plan.entries(plan_file_path)?;

    let output = match plan.output_target(plan_file_path)? {
        OutputTarget::File(path) => RecombinationPipeline::default().run(&entries, &path)?,
        OutputTarget::Directory(directory) => Publisher::new(directory).publish_swap(&entries)?,
    };

    info!("Swap archive written to {}", output.display());
    Ok(output)
}

pub fn execute_plan(plan: &Path, watch: bool) -> Result<()> {
    info!("Executing plan {}", plan.display());

    let swap_plan = load_plan(plan)?;
    debug!("Executing plan: {:?}", swap_plan);
    run_plan(&swap_plan, plan)?;

    if watch {
        watch_for_changes(&swap_plan, plan)?;
    }

    Ok(())
}

/// The plan file followed by every archive it references.
fn watched_paths(plan: &SwapPlan, plan_file_path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![plan_file_path.to_path_buf()];
    for path in plan.archive_paths(plan_file_path)? {
        if !files.contains(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Paths to stop watching and paths to start watching.
fn watch_set_changes(current: &[PathBuf], next: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let removed = current.iter().filter(|p| !next.contains(p)).cloned().collect();
    let added = next.iter().filter(|p| !current.contains(p)).cloned().collect();
    (removed, added)
}

fn update_watch_set<W: Watcher>(watcher: &mut W, current: &mut Vec<PathBuf>, next: Vec<PathBuf>) {
    let (removed, added) = watch_set_changes(current, &next);
    for file in &removed {
        if let Err(e) = watcher.unwatch(file) {
            debug!("Cannot unwatch {}: {}", file.display(), e);
        }
    }
    for file in &added {
        if let Err(e) = watcher.watch(file, RecursiveMode::NonRecursive) {
            warn!("Cannot watch {}: {}", file.display(), e);
        }
    }
    if !removed.is_empty() || !added.is_empty() {
        info!("Watching {} files", next.len());
    }
    *current = next;
}

/// Re-runs the plan whenever the plan file or one of its archives changes.
/// The watched archives follow the plan as it is edited.
fn watch_for_changes(plan: &SwapPlan, plan_file_path: &Path) -> Result<()> {
    info!("Watching for changes");
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(tx, Config::default())?;
    let mut watched = Vec::new();
    update_watch_set(&mut watcher, &mut watched, watched_paths(plan, plan_file_path)?);

    loop {
        match rx.recv() {
            Ok(Ok(event)) => {
                if let EventKind::Modify(_) = event.kind {
                    debug!("File modified {:?}", event.paths);
                    info!("Change detected, re-executing plan");
                    let result = load_plan(plan_file_path).and_then(|plan| {
                        let next = watched_paths(&plan, plan_file_path)?;
                        update_watch_set(&mut watcher, &mut watched, next);
                        run_plan(&plan, plan_file_path)
                    });
                    if let Err(e) = result {
                        error!("Plan run failed: {:#}", e);
                    }
                }
            }
            Ok(Err(e)) => error!("Watch error: {:?}", e),
            Err(e) => {
                error!("Watch channel closed: {:?}", e);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(archives: &[&str]) -> SwapPlan {
        let mut yaml = String::from("meta:\n  name: watched\noutput:\n  directory: out\nplaylist:\n");
        for archive in archives {
            yaml.push_str(&format!("  - archive: {}\n", archive));
        }
        SwapPlan::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn watched_paths_start_with_the_plan_file() {
        let plan_file = Path::new("/jobs/plan.yaml");
        let paths = watched_paths(&plan_with(&["a.3mf", "b.3mf", "a.3mf"]), plan_file).unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/jobs/plan.yaml"),
                PathBuf::from("/jobs/a.3mf"),
                PathBuf::from("/jobs/b.3mf"),
            ]
        );
    }

    #[test]
    fn edited_plan_changes_the_watch_set() {
        let plan_file = Path::new("/jobs/plan.yaml");
        let before = watched_paths(&plan_with(&["a.3mf", "b.3mf"]), plan_file).unwrap();
        let after = watched_paths(&plan_with(&["b.3mf", "c.3mf"]), plan_file).unwrap();

        let (removed, added) = watch_set_changes(&before, &after);
        assert_eq!(removed, vec![PathBuf::from("/jobs/a.3mf")]);
        assert_eq!(added, vec![PathBuf::from("/jobs/c.3mf")]);

        let (removed, added) = watch_set_changes(&after, &after);
        assert!(removed.is_empty() && added.is_empty());
    }
}
