//! Tracked-path rules.
//!
//! A path is tracked when it matches a configured pattern or a
//! `.gitattributes` line carrying `filter=lfs`. Patterns follow
//! gitattributes glob rules: `*` and `?` stay within one path segment,
//! `**` spans segments, a pattern without `/` matches the basename at any
//! depth, and a leading `/` anchors to the workspace root.

use crate::error::{LfsError, LfsResult};
use crate::layout::slash_path;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;

/// Compiled tracked-path patterns.
#[derive(Debug, Clone, Default)]
pub struct TrackedPaths {
    patterns: Vec<(String, Regex)>,
}

impl TrackedPaths {
    /// Compiles `patterns`.
    pub fn new<I, S>(patterns: I) -> LfsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tracked = Self::default();
        for pattern in patterns {
            tracked.add(pattern.as_ref())?;
        }
        Ok(tracked)
    }

    /// Compiles `patterns` plus the `filter=lfs` rules of
    /// `<workdir>/.gitattributes`, if present.
    pub fn load<I, S>(workdir: &Path, patterns: I) -> LfsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tracked = Self::new(patterns)?;
        let attributes = workdir.join(".gitattributes");
        match fs::read_to_string(&attributes) {
            Ok(content) => {
                for pattern in lfs_patterns(&content) {
                    tracked.add(pattern)?;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(LfsError::io(attributes, e)),
        }
        Ok(tracked)
    }

    fn add(&mut self, pattern: &str) -> LfsResult<()> {
        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| LfsError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.patterns.push((pattern.to_string(), regex));
        Ok(())
    }

    /// Returns true if relative path `rel` is tracked.
    pub fn is_tracked(&self, rel: &Path) -> bool {
        let path = slash_path(rel);
        self.patterns.iter().any(|(_, re)| re.is_match(&path))
    }

    /// Returns the patterns as written.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(p, _)| p.as_str())
    }
}

/// Extracts the patterns of `.gitattributes` lines that set `filter=lfs`.
pub fn lfs_patterns(attributes: &str) -> impl Iterator<Item = &str> {
    attributes.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut fields = line.split_whitespace();
        let pattern = fields.next()?;
        fields.any(|attr| attr == "filter=lfs").then_some(pattern)
    })
}

/// Translates a gitattributes glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> String {
    let anchored = pattern.starts_with('/');
    let body = pattern.trim_start_matches('/');
    let basename_only = !anchored && !body.contains('/');

    let mut out = String::from("^");
    if basename_only {
        out.push_str("(?:.*/)?");
    }

    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let leading = i == 0 || chars[i - 1] == '/';
                let trailing_slash = chars.get(i + 2) == Some(&'/');
                if leading && trailing_slash {
                    // `**/` matches zero or more directories.
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => match chars[i..].iter().position(|&c| c == ']') {
                Some(end) if end > 1 => {
                    let class: String = chars[i + 1..i + end].iter().collect();
                    let class = class.strip_prefix('!').map_or(class.clone(), |rest| {
                        format!("^{rest}")
                    });
                    out.push('[');
                    out.push_str(&class.replace('\\', "\\\\"));
                    out.push(']');
                    i += end + 1;
                }
                _ => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn tracked(patterns: &[&str]) -> TrackedPaths {
        TrackedPaths::new(patterns.iter().copied()).unwrap()
    }

    #[test]
    fn default_pointer_pattern() {
        let t = tracked(&[".project/attachments/pointers/**"]);
        assert!(t.is_tracked(Path::new(".project/attachments/pointers/a.png")));
        assert!(t.is_tracked(Path::new(".project/attachments/pointers/deep/b/c.bin")));
        assert!(!t.is_tracked(Path::new(".project/attachments/files/a.png")));
        assert!(!t.is_tracked(Path::new("README.md")));
    }

    #[test]
    fn basename_patterns_match_at_any_depth() {
        let t = tracked(&["*.psd"]);
        assert!(t.is_tracked(Path::new("cover.psd")));
        assert!(t.is_tracked(Path::new("art/2024/cover.psd")));
        assert!(!t.is_tracked(Path::new("cover.psd.txt")));
    }

    #[test]
    fn anchored_and_segment_patterns() {
        let t = tracked(&["/media/*.mp4", "docs/**/*.pdf", "data/file?.bin", "img/[ab].png"]);
        assert!(t.is_tracked(Path::new("media/clip.mp4")));
        assert!(!t.is_tracked(Path::new("x/media/clip.mp4")));
        assert!(!t.is_tracked(Path::new("media/sub/clip.mp4")));
        assert!(t.is_tracked(Path::new("docs/a.pdf")));
        assert!(t.is_tracked(Path::new("docs/x/y/a.pdf")));
        assert!(t.is_tracked(Path::new("data/file1.bin")));
        assert!(!t.is_tracked(Path::new("data/file10.bin")));
        assert!(t.is_tracked(Path::new("img/a.png")));
        assert!(!t.is_tracked(Path::new("img/c.png")));
    }

    #[test]
    fn gitattributes_rules_are_loaded() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(".gitattributes"),
            "# large files\n*.psd filter=lfs diff=lfs merge=lfs -text\n*.txt text eol=lf\n",
        )
        .unwrap();
        let t = TrackedPaths::load(dir.path(), Vec::<String>::new()).unwrap();
        assert_eq!(t.patterns().collect::<Vec<_>>(), vec!["*.psd"]);
        assert!(t.is_tracked(Path::new("a/b.psd")));
        assert!(!t.is_tracked(Path::new("a/b.txt")));
    }

    #[test]
    fn missing_gitattributes_is_fine() {
        let dir = tempdir().unwrap();
        let t = TrackedPaths::load(dir.path(), ["*.bin"]).unwrap();
        assert!(t.is_tracked(Path::new("x.bin")));
    }

    proptest! {
        #[test]
        fn literal_names_match_themselves(name in "[a-z0-9_-][a-z0-9_.-]{0,11}") {
            let t = tracked(&[name.as_str()]);
            let nested = format!("dir/{name}");
            prop_assert!(t.is_tracked(Path::new(&name)));
            prop_assert!(t.is_tracked(Path::new(&nested)));
        }
    }
}
