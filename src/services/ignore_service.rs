//! Ignore Matcher: gitignore-flavoured path exclusion for scans, listings and
//! verification counts.
//!
//! Paths are matched relative to the scanned root in forward-slash form.
//! A rule ending in `/` is directory-scoped and also matches everything
//! beneath the named directory; a plain literal directory name (no glob
//! metacharacters) additionally matches that name at any depth.

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::scope_path;

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub raw: String,
    pub directory_scoped: bool,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: IgnoreRule,
    /// Pattern without its trailing separator, case-folded when the host
    /// filesystem is case-insensitive.
    stem: String,
    literal: bool,
    glob: GlobMatcher,
}

#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<CompiledRule>,
}

fn case_insensitive_host() -> bool {
    cfg!(any(windows, target_os = "macos"))
}

fn fold(text: &str) -> String {
    if case_insensitive_host() {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

impl IgnoreMatcher {
    /// Compiles multi-line pattern text. Blank lines and `#` comments are
    /// dropped; an invalid glob fails the whole set.
    pub fn new(pattern_text: &str) -> Result<Self, AppError> {
        let mut rules = Vec::new();
        for line in pattern_text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rules.push(Self::compile(line)?);
        }
        tracing::debug!("loaded {} ignore patterns", rules.len());
        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn compile(raw: &str) -> Result<CompiledRule, AppError> {
        let normalized = raw.replace('\\', "/");
        let directory_scoped = normalized.ends_with('/');
        let stem = normalized.trim_end_matches('/').to_string();

        let glob = GlobBuilder::new(&stem)
            .literal_separator(true)
            .case_insensitive(case_insensitive_host())
            .build()?
            .compile_matcher();

        Ok(CompiledRule {
            rule: IgnoreRule {
                raw: raw.to_string(),
                directory_scoped,
            },
            literal: !stem.contains(GLOB_META),
            stem: fold(&stem),
            glob,
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = &IgnoreRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn patterns(&self) -> Vec<String> {
        self.rules.iter().map(|c| c.rule.raw.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First matching rule wins.
    pub fn should_ignore(&self, relative_path: &str, is_dir: bool) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let path = clean_relative(relative_path);
        if path.is_empty() {
            return false;
        }
        let folded = fold(&path);

        self.rules.iter().any(|compiled| {
            if compiled.rule.directory_scoped {
                matches_directory_rule(compiled, &path, &folded, is_dir)
            } else {
                compiled.glob.is_match(&path)
            }
        })
    }

    /// True when the path itself or any directory above it is ignored. Use
    /// this for paths that did not arrive through a filtered walk.
    pub fn is_excluded(&self, relative_path: &str, is_dir: bool) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let path = clean_relative(relative_path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for depth in 1..segments.len() {
            if self.should_ignore(&segments[..depth].join("/"), true) {
                return true;
            }
        }
        self.should_ignore(&path, is_dir)
    }
}

fn clean_relative(relative_path: &str) -> String {
    let normalized = scope_path::normalize(relative_path);
    let mut trimmed = normalized.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    if trimmed == "." {
        return String::new();
    }
    trimmed.to_string()
}

fn matches_directory_rule(compiled: &CompiledRule, path: &str, folded: &str, is_dir: bool) -> bool {
    let stem = compiled.stem.as_str();
    let under = folded
        .strip_prefix(stem)
        .is_some_and(|rest| rest.starts_with('/'));

    if is_dir && (folded == stem || under) {
        return true;
    }
    if !is_dir && under {
        return true;
    }

    if compiled.literal && !stem.is_empty() && folded.split('/').any(|s| s == stem) {
        return true;
    }

    compiled.glob.is_match(path)
}
