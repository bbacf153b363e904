//! Packaging of a project directory into a deterministic zip.
//!
//! Files are enumerated depth-first in file-name order, filtered by the fixed
//! exclusions and the optional ignore ruleset, and written to an in-memory zip
//! with a fixed timestamp. The same tree therefore always yields the same bytes.

use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::ignore::{IgnoreRuleSet, RelativePath, IGNORE_FILE_NAME};

/// Directories that are never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[".git", ".vscode"];

/// File names that never ship, at any depth.
pub const EXCLUDED_FILES: &[&str] = &[
    IGNORE_FILE_NAME,
    ".gitignore",
    "appsettings.json",
    "local.settings.json",
    "project.lock.json",
];

/// Marker file identifying a Function App project root.
pub const HOST_FILE_NAME: &str = "host.json";

#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("failed to enumerate project files: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("two files map to the same package path `{0}`")]
    DuplicatePath(RelativePath),

    #[error("failed to write package: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("no .funcignore file")]
    NoIgnoreFile,

    #[error(transparent)]
    Packaging(#[from] PackagingError),
}

/// A file selected for the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub relative_path: RelativePath,
    pub source_path: PathBuf,
}

/// Zip bytes ready for upload plus the entries they contain.
#[derive(Debug)]
pub struct Package {
    entries: Vec<ArchiveEntry>,
    stream: Cursor<Vec<u8>>,
}

impl Package {
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn size_bytes(&self) -> usize {
        self.stream.get_ref().len()
    }

    pub fn bytes(&self) -> &[u8] {
        self.stream.get_ref()
    }

    /// Seekable stream over the package, positioned at the start.
    pub fn stream(&mut self) -> &mut Cursor<Vec<u8>> {
        &mut self.stream
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.stream.into_inner()
    }

    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stream.get_ref());
        format!("{:x}", hasher.finalize())
    }
}

/// Which side of the ignore rules a listing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Included,
    Ignored,
}

/// Nearest ancestor of `start` holding `host.json`, or `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(HOST_FILE_NAME).is_file())
        .unwrap_or(start)
        .to_path_buf()
}

/// All shippable files under `root` before ignore rules, in enumeration order.
///
/// Symbolic links are followed and packaged under the link's own path.
pub fn enumerate_files(root: &Path) -> Result<Vec<ArchiveEntry>, PackagingError> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && EXCLUDED_DIRS.iter().any(|d| e.file_name() == *d))
        });

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for item in walker {
        let entry = item?;
        if !entry.file_type().is_file() {
            continue;
        }
        if EXCLUDED_FILES.iter().any(|f| entry.file_name() == *f) {
            debug!(path = %entry.path().display(), "Skipping excluded file");
            continue;
        }
        let Some(relative_path) = RelativePath::from_root(root, entry.path()) else {
            continue;
        };
        if !seen.insert(relative_path.clone()) {
            error!(path = %relative_path, "Duplicate package path");
            return Err(PackagingError::DuplicatePath(relative_path));
        }
        entries.push(ArchiveEntry {
            relative_path,
            source_path: entry.into_path(),
        });
    }
    Ok(entries)
}

/// Builds the package for `root`. Without rules every enumerated file ships.
pub fn build_package(
    root: &Path,
    rules: Option<&IgnoreRuleSet>,
) -> Result<Package, PackagingError> {
    info!(root = %root.display(), ignore_rules = rules.is_some(), "Building package");

    let entries: Vec<ArchiveEntry> = enumerate_files(root)?
        .into_iter()
        .filter(|entry| match rules {
            Some(rules) => {
                let accepted = rules.accepts(&entry.relative_path);
                if !accepted {
                    debug!(path = %entry.relative_path, "Ignored by rules");
                }
                accepted
            }
            None => true,
        })
        .collect();

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in &entries {
        let content = fs::read(&entry.source_path).map_err(|source| {
            error!(path = %entry.source_path.display(), error = ?source, "Failed to read file");
            PackagingError::Read {
                path: entry.source_path.clone(),
                source,
            }
        })?;
        zip.start_file(entry.relative_path.as_str(), options)?;
        zip.write_all(&content).map_err(|source| PackagingError::Read {
            path: entry.source_path.clone(),
            source,
        })?;
        debug!(path = %entry.relative_path, size = content.len(), "Added file to package");
    }
    let mut stream = zip.finish()?;
    stream.set_position(0);

    let package = Package { entries, stream };
    info!(
        entries = package.entries().len(),
        bytes = package.size_bytes(),
        "Package built"
    );
    Ok(package)
}

/// Relative paths on one side of the ignore rules.
///
/// Unlike [`build_package`], a listing needs rules to classify against.
pub fn list_files(
    root: &Path,
    rules: Option<&IgnoreRuleSet>,
    mode: ListMode,
) -> Result<Vec<RelativePath>, ListError> {
    let rules = rules.ok_or(ListError::NoIgnoreFile)?;
    let files = enumerate_files(root)?
        .into_iter()
        .map(|entry| entry.relative_path)
        .filter(|path| match mode {
            ListMode::Included => rules.accepts(path),
            ListMode::Ignored => rules.denies(path),
        })
        .collect();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(package: &Package) -> Vec<String> {
        package
            .entries()
            .iter()
            .map(|e| e.relative_path.to_string())
            .collect()
    }

    #[test]
    fn fixed_exclusions_apply_without_rules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "host.json", "{}");
        write(root, ".git/HEAD", "ref");
        write(root, ".vscode/settings.json", "{}");
        write(root, "local.settings.json", "{}");
        write(root, "nested/local.settings.json", "{}");
        write(root, ".funcignore", "");
        write(root, ".gitignore", "");
        write(root, "HttpTrigger/function.json", "{}");

        let package = build_package(root, None).unwrap();
        assert_eq!(names(&package), vec!["HttpTrigger/function.json", "host.json"]);
    }

    #[test]
    fn ignore_rules_filter_entries_and_zip_matches() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "readme.md", "hello");
        write(root, "bin/a.txt", "a");
        write(root, "bin/keep.txt", "keep");
        let rules = IgnoreRuleSet::parse("bin/\n!bin/keep.txt\n").unwrap();

        let mut package = build_package(root, Some(&rules)).unwrap();
        assert_eq!(names(&package), vec!["bin/keep.txt", "readme.md"]);
        assert_eq!(package.stream().position(), 0);

        let mut archive = ZipArchive::new(Cursor::new(package.into_bytes())).unwrap();
        let mut in_zip: Vec<&str> = archive.file_names().collect();
        in_zip.sort_unstable();
        assert_eq!(in_zip, vec!["bin/keep.txt", "readme.md"]);
        let mut content = String::new();
        archive
            .by_name("bin/keep.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "keep");
    }

    #[test]
    fn rebuilding_unchanged_tree_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "sub/b.txt", "b");

        let first = build_package(dir.path(), None).unwrap();
        let second = build_package(dir.path(), None).unwrap();
        assert_eq!(first.entries(), second.entries());
        assert_eq!(first.sha256(), second.sha256());
    }

    #[cfg(unix)]
    #[test]
    fn backslash_file_name_colliding_with_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/b", "nested");
        write(dir.path(), "a\\b", "flat");

        let err = build_package(dir.path(), None).unwrap_err();
        assert!(matches!(err, PackagingError::DuplicatePath(p) if p.as_str() == "a/b"));
    }

    #[test]
    fn listing_requires_rules() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        assert!(matches!(
            list_files(dir.path(), None, ListMode::Included),
            Err(ListError::NoIgnoreFile)
        ));
    }

    #[test]
    fn listing_splits_included_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.py", "");
        write(dir.path(), "x.pyc", "");
        write(dir.path(), "cache/y.pyc", "");
        write(dir.path(), "tests/test_app.py", "");
        let rules = IgnoreRuleSet::parse("*.pyc\ntests/\n").unwrap();

        let included = list_files(dir.path(), Some(&rules), ListMode::Included).unwrap();
        let ignored = list_files(dir.path(), Some(&rules), ListMode::Ignored).unwrap();
        assert_eq!(
            included,
            vec![RelativePath::new("app.py"), RelativePath::new("cache/y.pyc")]
        );
        assert_eq!(
            ignored,
            vec![
                RelativePath::new("tests/test_app.py"),
                RelativePath::new("x.pyc")
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_packaged() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write(dir.path(), "real.txt", "real");
        write(outside.path(), "shared/lib.py", "shared");
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path().join("shared"), dir.path().join("shared"))
            .unwrap();

        let package = build_package(dir.path(), None).unwrap();
        assert_eq!(
            names(&package),
            vec!["link.txt", "real.txt", "shared/lib.py"]
        );

        let mut archive = ZipArchive::new(Cursor::new(package.into_bytes())).unwrap();
        let mut content = String::new();
        archive
            .by_name("link.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "real");
    }

    #[test]
    fn project_root_is_nearest_host_json_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app/host.json", "{}");
        write(dir.path(), "app/Func/function.json", "{}");
        let start = dir.path().join("app/Func");
        assert_eq!(find_project_root(&start), dir.path().join("app"));

        let elsewhere = dir.path().join("other");
        fs::create_dir_all(&elsewhere).unwrap();
        assert_eq!(find_project_root(&elsewhere), elsewhere);
    }
}
