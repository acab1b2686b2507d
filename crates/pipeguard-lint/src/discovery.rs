//! Definition discovery and loading.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LintError, LintResult};
use crate::model::{parse_pipeline, parse_step_bundle, PipelineDefinition};

const WORKFLOW_DIR: &str = ".github/workflows";
const ACTIONS_DIR: &str = ".github/actions";
const BUNDLE_FILE_NAMES: &[&str] = &["action.yml", "action.yaml"];

/// A discovered document. `relative` uses `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub absolute: PathBuf,
    pub relative: String,
}

/// Documents found under a repository root, each list sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    pub pipelines: Vec<DiscoveredFile>,
    pub bundles: Vec<DiscoveredFile>,
}

impl Discovered {
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty() && self.bundles.is_empty()
    }
}

/// Find workflow files and step bundles under `root`.
///
/// Pipelines: `.github/workflows/*.yml|yaml` (not recursive).
/// Bundles: `.github/actions/**/action.yml|yaml` and a root `action.yml|yaml`.
pub fn discover(root: &Path) -> LintResult<Discovered> {
    let mut pipelines = Vec::new();
    let workflows = root.join(WORKFLOW_DIR);
    if workflows.is_dir() {
        for path in read_dir_sorted(&workflows)? {
            if path.is_file() && has_yaml_extension(&path) {
                pipelines.push(discovered(root, path));
            }
        }
    }

    let mut bundles = Vec::new();
    for name in BUNDLE_FILE_NAMES {
        let path = root.join(name);
        if path.is_file() {
            bundles.push(discovered(root, path));
        }
    }
    let actions = root.join(ACTIONS_DIR);
    if actions.is_dir() {
        collect_bundles(root, &actions, &mut bundles)?;
    }

    pipelines.sort_by(|a, b| a.relative.cmp(&b.relative));
    bundles.sort_by(|a, b| a.relative.cmp(&b.relative));
    debug!(
        pipelines = pipelines.len(),
        bundles = bundles.len(),
        root = %root.display(),
        "discovered definitions"
    );

    Ok(Discovered { pipelines, bundles })
}

fn collect_bundles(root: &Path, dir: &Path, out: &mut Vec<DiscoveredFile>) -> LintResult<()> {
    for path in read_dir_sorted(dir)? {
        if path.is_dir() {
            collect_bundles(root, &path, out)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| BUNDLE_FILE_NAMES.contains(&n))
        {
            out.push(discovered(root, path));
        }
    }
    Ok(())
}

fn read_dir_sorted(dir: &Path) -> LintResult<Vec<PathBuf>> {
    let io_err = |source| LintError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

fn has_yaml_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

fn discovered(root: &Path, absolute: PathBuf) -> DiscoveredFile {
    let relative = absolute
        .strip_prefix(root)
        .unwrap_or(&absolute)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    DiscoveredFile { absolute, relative }
}

/// Read and parse workflow files. The first failure aborts.
pub fn load_pipelines(files: &[DiscoveredFile]) -> LintResult<Vec<PipelineDefinition>> {
    files
        .iter()
        .map(|file| parse_pipeline(&file.relative, &read(file)?))
        .collect()
}

/// Read and parse step bundles. The first failure aborts.
pub fn load_step_bundles(files: &[DiscoveredFile]) -> LintResult<Vec<PipelineDefinition>> {
    files
        .iter()
        .map(|file| parse_step_bundle(&file.relative, &read(file)?))
        .collect()
}

fn read(file: &DiscoveredFile) -> LintResult<String> {
    std::fs::read_to_string(&file.absolute).map_err(|source| LintError::Io {
        path: file.absolute.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, ".github/workflows/release.yaml", "on: push\n");
        write(root, ".github/workflows/ci.yml", "on: push\n");
        write(root, ".github/workflows/README.md", "docs");
        write(root, ".github/workflows/nested/skip.yml", "on: push\n");
        write(root, ".github/actions/setup/action.yml", "runs: {using: composite, steps: []}\n");
        write(root, ".github/actions/deep/lint/action.yaml", "runs: {using: node20}\n");
        write(root, ".github/actions/setup/helper.yml", "x: 1\n");
        write(root, "action.yml", "runs: {using: node20}\n");

        let found = discover(root).unwrap();
        let pipelines: Vec<_> = found.pipelines.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(
            pipelines,
            vec![".github/workflows/ci.yml", ".github/workflows/release.yaml"]
        );

        let bundles: Vec<_> = found.bundles.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(
            bundles,
            vec![
                ".github/actions/deep/lint/action.yaml",
                ".github/actions/setup/action.yml",
                "action.yml",
            ]
        );
    }

    #[test]
    fn test_discover_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_aborts_on_unparseable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".github/workflows/a.yml", "on: push\njobs: {}\n");
        write(dir.path(), ".github/workflows/b.yml", "jobs: [oops\n");

        let found = discover(dir.path()).unwrap();
        let err = load_pipelines(&found.pipelines).unwrap_err();
        match err {
            LintError::Parse { path, .. } => assert_eq!(path, ".github/workflows/b.yml"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_load_step_bundles() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            ".github/actions/setup/action.yml",
            "runs:\n  using: composite\n  steps:\n    - uses: actions/cache@v4\n",
        );
        let found = discover(dir.path()).unwrap();
        let bundles = load_step_bundles(&found.bundles).unwrap();
        assert_eq!(bundles.len(), 1);
        assert!(bundles[0].is_bundle());
        assert_eq!(bundles[0].path, ".github/actions/setup/action.yml");
    }
}
