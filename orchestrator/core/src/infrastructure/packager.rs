// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tarball Packager
//!
//! Builds the deployment artifact as a gzip compressed tar:
//!
//! 1. the entry point at `bootstrap` (mode 0755)
//! 2. the generated settings file
//! 3. project tree, minus excluded patterns
//! 4. contents of each dependency directory, merged into the archive root
//!
//! A path already written is never written again, so the injected files
//! shadow project files and project files shadow dependency files.

use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::domain::artifact::{
    Artifact, ArtifactPackager, PackageError, PackageRequest, BUILTIN_EXCLUDES, ENTRY_POINT_NAME,
    GENERATED_SETTINGS_NAME,
};

/// Compiled exclude globs.
///
/// A pattern matches an entry when it matches either the entry's file name
/// or its full path relative to the walked root. `*` and `?` stay within one
/// path segment, `**` crosses segments.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    patterns: Vec<Regex>,
}

impl ExcludeSet {
    pub fn new<'a>(globs: impl IntoIterator<Item = &'a str>) -> Result<Self, PackageError> {
        let patterns = globs
            .into_iter()
            .map(|glob| {
                Regex::new(&glob_to_regex(glob)).map_err(|e| PackageError::InvalidPattern {
                    pattern: glob.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, relative: &Path) -> bool {
        let full = relative.to_string_lossy().replace('\\', "/");
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.patterns
            .iter()
            .any(|pattern| pattern.is_match(&name) || pattern.is_match(&full))
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = glob.trim_end_matches('/').chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*");
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    regex.push('$');
    regex
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TarballPackager;

impl TarballPackager {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactPackager for TarballPackager {
    fn package(&self, request: &PackageRequest) -> Result<Artifact, PackageError> {
        if !request.entry_point.is_file() {
            return Err(PackageError::EntryPointMissing(request.entry_point.clone()));
        }

        let excludes = ExcludeSet::new(
            request
                .exclude
                .iter()
                .map(String::as_str)
                .chain(BUILTIN_EXCLUDES),
        )?;

        std::fs::create_dir_all(&request.output_dir)
            .map_err(|e| PackageError::io(&request.output_dir, e))?;
        let timestamp = chrono::Utc::now().timestamp();
        let path = request
            .output_dir
            .join(format!("{}-{}.tar.gz", request.identity, timestamp));

        let entries = match write_archive(request, &excludes, &path, timestamp) {
            Ok(entries) => entries,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&path) {
                    trace!(error = %cleanup, "No partial artifact to remove");
                }
                return Err(e);
            }
        };
        debug!(artifact = %path.display(), entries, "Wrote artifact");
        Ok(Artifact::new(path, request.identity.clone()))
    }
}

fn write_archive(
    request: &PackageRequest,
    excludes: &ExcludeSet,
    path: &Path,
    timestamp: i64,
) -> Result<usize, PackageError> {
    let file = File::create(path).map_err(|e| PackageError::io(path, e))?;
    let mut archive = ArchiveWriter::new(file, path, timestamp);

    let entry_point = std::fs::read(&request.entry_point)
        .map_err(|e| PackageError::io(&request.entry_point, e))?;
    archive.append_bytes(ENTRY_POINT_NAME, &entry_point, 0o755)?;
    archive.append_bytes(
        GENERATED_SETTINGS_NAME,
        request.generated_settings.contents().as_bytes(),
        0o644,
    )?;

    archive.append_tree(&request.project_dir, excludes)?;
    for dir in &request.dependency_dirs {
        if !dir.is_dir() {
            return Err(PackageError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "dependency directory not found"),
            ));
        }
        archive.append_tree(dir, excludes)?;
    }

    archive.finish()
}

struct ArchiveWriter<'a> {
    builder: tar::Builder<GzEncoder<File>>,
    output: &'a Path,
    mtime: u64,
    written: HashSet<PathBuf>,
}

impl<'a> ArchiveWriter<'a> {
    fn new(file: File, output: &'a Path, timestamp: i64) -> Self {
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(false);
        Self {
            builder,
            output,
            mtime: u64::try_from(timestamp).unwrap_or_default(),
            written: HashSet::new(),
        }
    }

    fn append_bytes(&mut self, name: &str, data: &[u8], mode: u32) -> Result<(), PackageError> {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_mtime(self.mtime);
        self.builder
            .append_data(&mut header, name, data)
            .map_err(|e| PackageError::io(self.output, e))?;
        self.written.insert(PathBuf::from(name));
        Ok(())
    }

    fn append_tree(&mut self, root: &Path, excludes: &ExcludeSet) -> Result<(), PackageError> {
        let output = self.output.to_path_buf();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || entry
                        .path()
                        .strip_prefix(root)
                        .map(|relative| !excludes.matches(relative))
                        .unwrap_or(false)
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                PackageError::io(path, e.into())
            })?;

            let file_type = entry.file_type();
            if !(file_type.is_file() || file_type.is_symlink()) || entry.path() == output {
                continue;
            }

            let relative = match entry.path().strip_prefix(root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };
            if !self.written.insert(relative.clone()) {
                trace!(path = %relative.display(), "Skipping shadowed entry");
                continue;
            }

            self.builder
                .append_path_with_name(entry.path(), &relative)
                .map_err(|e| PackageError::io(entry.path(), e))?;
        }
        Ok(())
    }

    /// Flush the tar and gzip trailers; returns the entry count
    fn finish(self) -> Result<usize, PackageError> {
        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| PackageError::io(self.output, e))?;
        let mut file = encoder.finish().map_err(|e| PackageError::io(self.output, e))?;
        file.flush().map_err(|e| PackageError::io(self.output, e))?;
        Ok(self.written.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::GeneratedSettings;
    use crate::domain::deployment::DeploymentIdentity;
    use crate::domain::settings::resolve;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Read;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read_archive(path: &Path) -> HashMap<String, (u32, String)> {
        let file = File::open(path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mode = entry.header().mode().unwrap();
                let mut contents = String::new();
                entry.read_to_string(&mut contents).unwrap();
                (name, (mode, contents))
            })
            .collect()
    }

    fn request(project: &TempDir, output: &TempDir, exclude: &[&str]) -> PackageRequest {
        let settings_file = project.path().join("app.env");
        let settings = resolve(
            "dev",
            &json!({ "dev": {
                "project_name": "blog",
                "s3_bucket": "artifacts",
                "settings_file": settings_file.to_string_lossy(),
            }}),
        )
        .unwrap();

        PackageRequest {
            identity: DeploymentIdentity::new("blog", "dev"),
            project_dir: project.path().to_path_buf(),
            output_dir: output.path().to_path_buf(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            dependency_dirs: Vec::new(),
            entry_point: project.path().join("target/bootstrap"),
            generated_settings: GeneratedSettings::render("DEBUG=false", &settings),
        }
    }

    fn project() -> TempDir {
        let project = TempDir::new().unwrap();
        write(project.path(), "app.env", "DEBUG=false");
        write(project.path(), "target/bootstrap", "#!binary");
        write(project.path(), "static/app.css", "body {}");
        write(project.path(), "static/app.css.map", "{}");
        write(project.path(), "notes.log", "debug output");
        write(project.path(), ".git/HEAD", "ref: refs/heads/main");
        write(project.path(), "old-build.tar.gz", "stale");
        project
    }

    #[test]
    fn test_glob_translation() {
        let set = ExcludeSet::new(["*.log", "static/*.map", "docs/**"]).unwrap();
        assert!(set.matches(Path::new("notes.log")));
        assert!(set.matches(Path::new("deep/dir/notes.log")));
        assert!(set.matches(Path::new("static/app.css.map")));
        assert!(!set.matches(Path::new("nested/static/app.css.map")));
        assert!(set.matches(Path::new("docs/a/b.md")));
        assert!(!set.matches(Path::new("static/app.css")));
    }

    #[test]
    fn test_artifact_layout() {
        let project = project();
        let output = TempDir::new().unwrap();

        let artifact = TarballPackager::new()
            .package(&request(&project, &output, &["*.log", "*.map", "target"]))
            .unwrap();

        assert!(artifact.key().starts_with("blog-dev-"));
        assert!(artifact.key().ends_with(".tar.gz"));

        let entries = read_archive(artifact.path());
        let (mode, contents) = &entries["bootstrap"];
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(contents, "#!binary");
        assert!(entries[GENERATED_SETTINGS_NAME].1.contains("SCRIPT_NAME=\"/dev\""));
        assert!(entries.contains_key("static/app.css"));
        assert!(entries.contains_key("app.env"));

        assert!(!entries.contains_key("notes.log"));
        assert!(!entries.contains_key("static/app.css.map"));
        assert!(!entries.contains_key(".git/HEAD"));
        assert!(!entries.contains_key("old-build.tar.gz"));
        assert!(!entries.contains_key("target/bootstrap"));
    }

    #[test]
    fn test_dependency_dirs_merge_into_root() {
        let project = project();
        let deps = TempDir::new().unwrap();
        write(deps.path(), "vendor/lib.txt", "dependency");
        write(deps.path(), "static/app.css", "shadowed");
        let output = TempDir::new().unwrap();

        let mut request = request(&project, &output, &[]);
        request.dependency_dirs = vec![deps.path().to_path_buf()];
        let artifact = TarballPackager::new().package(&request).unwrap();

        let entries = read_archive(artifact.path());
        assert_eq!(entries["vendor/lib.txt"].1, "dependency");
        assert_eq!(entries["static/app.css"].1, "body {}");
    }

    #[test]
    fn test_project_bootstrap_is_replaced() {
        let project = project();
        write(project.path(), "bootstrap", "stale entry point");
        let output = TempDir::new().unwrap();

        let artifact = TarballPackager::new()
            .package(&request(&project, &output, &[]))
            .unwrap();
        assert_eq!(read_archive(artifact.path())["bootstrap"].1, "#!binary");
    }

    #[test]
    fn test_missing_entry_point_fails() {
        let project = project();
        let output = TempDir::new().unwrap();
        let mut request = request(&project, &output, &[]);
        request.entry_point = project.path().join("missing");

        let err = TarballPackager::new().package(&request).unwrap_err();
        assert!(matches!(err, PackageError::EntryPointMissing(_)));
    }
}
