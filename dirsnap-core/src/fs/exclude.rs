//! Exclusion patterns for archive walks and size analysis.
//!
//! A pattern excludes a relative path when it matches the path itself or any
//! of its ancestors, so excluding a directory always excludes everything below
//! it. Each candidate is checked for:
//!
//! 1. exact equality (`build` matches `build`, and through the ancestor rule
//!    `build/out/a.o`),
//! 2. a shell-style glob against the whole relative path, where `*` and `?`
//!    never cross `/` (`logs/*.log` matches `logs/app.log` but not
//!    `logs/old/app.log`),
//!
//! Patterns are anchored at the archive root. `**/` opts into matching at any
//! depth (`**/node_modules` matches `node_modules` and `web/node_modules`).
//!
//! The archive builder and the analyzer share this one rule.

use globset::{GlobBuilder, GlobMatcher};
use std::path::{Component, Path};
use tracing::warn;

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    glob: Option<GlobMatcher>,
}

impl Rule {
    fn parse(raw: &str) -> Option<Self> {
        let pattern = raw.trim().trim_start_matches("./").trim_end_matches('/');
        if pattern.is_empty() || pattern == "." {
            return None;
        }

        let glob = match GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
        {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                warn!("Invalid exclusion glob '{}', using exact matching only: {}", pattern, e);
                None
            }
        };

        Some(Self {
            pattern: pattern.to_string(),
            glob,
        })
    }

    fn matches_str(&self, candidate: &str) -> bool {
        candidate == self.pattern
            || self.glob.as_ref().is_some_and(|g| g.is_match(candidate))
    }
}

/// A compiled set of exclusion patterns.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    rules: Vec<Rule>,
}

impl ExclusionMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            rules: patterns.iter().filter_map(|p| Rule::parse(p.as_ref())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true if `relative_path` (relative to the archive root) is excluded.
    pub fn is_excluded(&self, relative_path: &Path) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        let components: Vec<String> = relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if components.is_empty() {
            return false;
        }

        let mut ancestor = String::new();
        for component in &components {
            if !ancestor.is_empty() {
                ancestor.push('/');
            }
            ancestor.push_str(component);

            for rule in &self.rules {
                if rule.matches_str(&ancestor) {
                    return true;
                }
            }
        }

        false
    }
}

/// One-shot form of [`ExclusionMatcher::is_excluded`].
pub fn should_exclude<S: AsRef<str>>(relative_path: &Path, patterns: &[S]) -> bool {
    ExclusionMatcher::new(patterns).is_excluded(relative_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded(path: &str, patterns: &[&str]) -> bool {
        should_exclude(Path::new(path), patterns)
    }

    #[test]
    fn test_no_patterns_never_excludes() {
        assert!(!excluded("file.txt", &[]));
        assert!(!excluded("a/b/c", &[]));
    }

    #[test]
    fn test_exact_and_directory_prefix() {
        assert!(excluded("file.txt", &["file.txt"]));
        assert!(excluded("dir", &["dir"]));
        assert!(excluded("dir/file.txt", &["dir"]));
        assert!(excluded("dir/subdir/file.txt", &["dir"]));
        assert!(!excluded("dir/file.txt", &["dir/other.txt"]));
        assert!(!excluded("directory/file.txt", &["dir"]));
    }

    #[test]
    fn test_multi_segment_prefix() {
        assert!(excluded("project/cache/x.bin", &["project/cache"]));
        assert!(!excluded("other/project/cache/x.bin", &["project/cache"]));
    }

    #[test]
    fn test_glob_patterns() {
        assert!(excluded("notes.txt", &["*.txt"]));
        assert!(!excluded("notes.go", &["*.txt"]));
        assert!(excluded("logs/app.log", &["logs/*.log"]));
        assert!(!excluded("logs/old/app.log", &["logs/*.log"]));
        assert!(excluded("data/file1.csv", &["data/file?.csv"]));
        assert!(excluded("tmp7/x", &["tmp[0-9]"]));
    }

    #[test]
    fn test_bare_patterns_are_anchored_at_root() {
        assert!(excluded("build/out.o", &["build"]));
        assert!(!excluded("src/build", &["build"]));
        assert!(!excluded("src/build/out.o", &["build"]));
        assert!(!excluded("a/notes.txt", &["*.txt"]));
    }

    #[test]
    fn test_double_star_matches_at_any_depth() {
        assert!(excluded("node_modules/pkg.js", &["**/node_modules"]));
        assert!(excluded("web/node_modules/pkg.js", &["**/node_modules"]));
        assert!(excluded("a/b/trace.log", &["**/*.log"]));
        assert!(!excluded("a/b/trace.txt", &["**/*.log"]));
    }

    #[test]
    fn test_no_substring_matching() {
        assert!(!excluded("binaries/tool", &["bin"]));
        assert!(!excluded("src/cabinet.rs", &["bin"]));
    }

    #[test]
    fn test_pattern_normalization() {
        assert!(excluded("build/out.o", &["build/"]));
        assert!(excluded("build/out.o", &["./build"]));
        assert!(!excluded("anything", &["", "."]));
    }

    #[test]
    fn test_invalid_glob_falls_back_to_exact() {
        let matcher = ExclusionMatcher::new(&["[invalid"]);
        assert!(!matcher.is_empty());
        assert!(matcher.is_excluded(Path::new("[invalid")));
        assert!(!matcher.is_excluded(Path::new("invalid")));
    }
}
