//! Include directive resolution

use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};

use crate::document::RawInclude;

fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn resolve_dir(dir: &Path, base_dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base_dir.join(dir)
    }
}

/// Directories searched for an include, in order: `dir`, `alt_dir`, the
/// loader's include directory, then the including file's directory.
pub fn candidate_dirs(
    include: &RawInclude,
    base_dir: &Path,
    include_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for d in [include.dir.as_deref(), include.alt_dir.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        dirs.push(resolve_dir(Path::new(d), base_dir));
    }
    if let Some(d) = include_dir {
        dirs.push(resolve_dir(d, base_dir));
    }
    let base = base_dir.to_path_buf();
    if !dirs.contains(&base) {
        dirs.push(base);
    }
    dirs
}

/// Files in `dir` matching `file`, which may be a glob on the file name
fn matches_in(dir: &Path, file: &str) -> Vec<PathBuf> {
    let rel = Path::new(file);
    let name = match rel.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return Vec::new(),
    };
    let scan_dir = match rel.parent() {
        Some(sub) if !sub.as_os_str().is_empty() => dir.join(sub),
        _ => dir.to_path_buf(),
    };

    if !is_glob(name) {
        let path = scan_dir.join(name);
        return if path.is_file() { vec![path] } else { Vec::new() };
    }

    let pattern = match Pattern::new(name) {
        Ok(p) => p,
        Err(e) => {
            warn!(pattern = %name, error = %e, "Invalid include pattern");
            return Vec::new();
        }
    };
    let entries = match std::fs::read_dir(&scan_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %scan_dir.display(), error = %e, "Include directory not readable");
            return Vec::new();
        }
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| pattern.matches(n))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}

/// Resolve an include directive to concrete files.
///
/// The first candidate directory yielding any match wins. An absolute
/// `file` is used as-is.
pub fn resolve_include(
    include: &RawInclude,
    base_dir: &Path,
    include_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let file = include.file.trim();
    if file.is_empty() {
        return Vec::new();
    }

    let file_path = Path::new(file);
    if file_path.is_absolute() {
        let parent = file_path.parent().unwrap_or_else(|| Path::new("/"));
        let name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        return matches_in(parent, name);
    }

    candidate_dirs(include, base_dir, include_dir)
        .into_iter()
        .map(|dir| matches_in(&dir, file))
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn include(file: &str) -> RawInclude {
        RawInclude {
            file: file.to_string(),
            dir: None,
            alt_dir: None,
            optional: false,
            active: None,
        }
    }

    #[test]
    fn test_candidate_dir_order() {
        let mut inc = include("a.toml");
        inc.dir = Some("conf.d".into());
        inc.alt_dir = Some("/etc/dcs".into());
        let dirs = candidate_dirs(&inc, Path::new("/base"), Some(Path::new("shared")));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/base/conf.d"),
                PathBuf::from("/etc/dcs"),
                PathBuf::from("/base/shared"),
                PathBuf::from("/base"),
            ]
        );
    }

    #[test]
    fn test_glob_matches_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["dcs_b.toml", "dcs_a.toml", "other.toml"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let found = resolve_include(&include("dcs_*.toml"), dir.path(), None);
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["dcs_a.toml", "dcs_b.toml"]);
    }

    #[test]
    fn test_falls_back_to_alt_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("alt")).unwrap();
        fs::write(dir.path().join("alt/x.toml"), "").unwrap();

        let mut inc = include("x.toml");
        inc.dir = Some("missing".into());
        inc.alt_dir = Some("alt".into());
        let found = resolve_include(&inc, dir.path(), None);
        assert_eq!(found, vec![dir.path().join("alt").join("x.toml")]);
    }

    #[test]
    fn test_subdirectory_in_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/one.toml"), "").unwrap();
        let found = resolve_include(&include("sub/*.toml"), dir.path(), None);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_missing_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_include(&include("nope.toml"), dir.path(), None).is_empty());
    }
}
