//! Ignore-file rules deciding which project files are shipped.
//!
//! The `.funcignore` format is line oriented:
//! - blank lines and lines starting with `#` are skipped
//! - a leading `!` negates the rule (re-includes what it matches)
//! - a trailing `/` restricts the rule to directories
//! - every rule is anchored at the project root: it matches the whole relative
//!   path or a leading run of its directories, never a suffix deeper down
//! - a leading `/` is accepted and changes nothing
//! - `*` and `?` never cross a `/`, `**` spans segments
//!
//! Rules are evaluated in file order and the last one that matches wins.
//! A path no rule matches is accepted.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the ignore file looked up in the project root.
pub const IGNORE_FILE_NAME: &str = ".funcignore";

/// A project-root-relative path using `/` separators.
///
/// Construction normalizes backslashes and strips leading/trailing separators,
/// so the inner string is always the matching key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativePath(String);

impl RelativePath {
    pub fn new(raw: &str) -> Self {
        let normalized = raw.replace('\\', "/");
        let trimmed = normalized.trim_matches('/');
        let mut out = String::with_capacity(trimmed.len());
        for segment in trimmed.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(segment);
        }
        RelativePath(out)
    }

    /// Relative path of `path` below `root`, or `None` if `path` is outside it.
    pub fn from_root(root: &Path, path: &Path) -> Option<Self> {
        let rel = path.strip_prefix(root).ok()?;
        Some(Self::new(&rel.to_string_lossy()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelativePath {
    fn from(raw: &str) -> Self {
        RelativePath::new(raw)
    }
}

#[derive(Debug, Error)]
#[error("invalid ignore pattern on line {line}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

/// Why an ignore ruleset is unavailable.
#[derive(Debug, Error)]
pub enum IgnoreFileError {
    #[error("no .funcignore file")]
    NotFound,

    #[error("failed to read .funcignore: {0}")]
    Unreadable(#[from] io::Error),

    #[error(transparent)]
    Malformed(#[from] ParseError),
}

/// One compiled line of an ignore file.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pub pattern: String,
    pub negated: bool,
    pub directory_only: bool,
    /// Always true: matching starts at the first path segment.
    pub anchored_to_root: bool,
    matcher: GlobMatcher,
}

impl IgnoreRule {
    fn compile(line_no: usize, line: &str) -> Result<Self, ParseError> {
        let mut pattern = line;
        let negated = pattern.starts_with('!');
        if negated {
            pattern = &pattern[1..];
        }
        let directory_only = pattern.ends_with('/');
        let pattern = pattern.trim_end_matches('/');
        let pattern = pattern.trim_start_matches('/');

        if pattern.is_empty() {
            return Err(ParseError {
                line: line_no,
                reason: format!("`{line}` has no pattern"),
            });
        }

        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| ParseError {
                line: line_no,
                reason: e.kind().to_string(),
            })?
            .compile_matcher();

        Ok(IgnoreRule {
            pattern: pattern.to_string(),
            negated,
            directory_only,
            anchored_to_root: true,
            matcher,
        })
    }

    /// True if the rule matches `path` itself or one of its leading directories.
    pub fn matches(&self, path: &RelativePath) -> bool {
        let segments: Vec<&str> = path.segments().collect();
        let count = segments.len();

        (1..=count).any(|end| {
            // The full span names the file itself.
            if end == count && self.directory_only {
                return false;
            }
            self.matcher.is_match(segments[..end].join("/"))
        })
    }
}

/// Ordered rules parsed from one ignore file.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRuleSet {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut rules = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rules.push(IgnoreRule::compile(idx + 1, line)?);
        }
        debug!(rules = rules.len(), "Parsed ignore rules");
        Ok(IgnoreRuleSet { rules })
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    /// Last matching rule decides; no match accepts.
    pub fn accepts(&self, path: &RelativePath) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(path))
            .map_or(true, |rule| rule.negated)
    }

    pub fn denies(&self, path: &RelativePath) -> bool {
        !self.accepts(path)
    }
}

/// Reads and parses `.funcignore` from the project root.
pub fn load_ignore_file(root: &Path) -> Result<IgnoreRuleSet, IgnoreFileError> {
    let path = root.join(IGNORE_FILE_NAME);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(IgnoreFileError::NotFound),
        Err(e) => return Err(IgnoreFileError::Unreadable(e)),
    };
    let rules = IgnoreRuleSet::parse(&text)?;
    info!(path = %path.display(), rules = rules.rules().len(), "Loaded ignore file");
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(text: &str) -> IgnoreRuleSet {
        IgnoreRuleSet::parse(text).expect("rules should parse")
    }

    #[test]
    fn relative_path_normalizes_separators() {
        assert_eq!(RelativePath::new("\\bin\\a.txt").as_str(), "bin/a.txt");
        assert_eq!(RelativePath::new("/src//lib/").as_str(), "src/lib");
        assert_eq!(RelativePath::new("./readme.md").as_str(), "readme.md");
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let set = rules("# comment\n\n   \n*.log\r\n");
        assert_eq!(set.rules().len(), 1);
        assert!(set.denies(&"debug.log".into()));
    }

    #[test]
    fn no_rules_accepts_everything() {
        let set = rules("# nothing here\n");
        assert!(set.accepts(&"anything/at/all.txt".into()));
    }

    #[test]
    fn last_matching_rule_wins() {
        let set = rules("*.txt\n!notes.txt\nnotes.txt\n");
        assert!(set.denies(&"notes.txt".into()));
        assert!(set.denies(&"other.txt".into()));
        assert!(set.accepts(&"main.rs".into()));
    }

    #[test]
    fn negation_after_deny_accepts_and_reversed_denies() {
        let deny_then_accept = rules("secret.json\n!secret.json\n");
        assert!(deny_then_accept.accepts(&"secret.json".into()));

        let accept_then_deny = rules("!secret.json\nsecret.json\n");
        assert!(accept_then_deny.denies(&"secret.json".into()));
    }

    #[test]
    fn directory_rule_matches_contents_but_not_file_of_same_name() {
        let set = rules("dir/\n");
        assert!(set.denies(&"dir/file.txt".into()));
        assert!(set.denies(&"dir/nested/file.txt".into()));
        assert!(set.accepts(&"dir".into()));
        assert!(set.accepts(&"directory/file.txt".into()));
    }

    #[test]
    fn pattern_without_slash_matches_from_root_only() {
        let set = rules("*.pyc\nnode_modules/\n");
        assert!(set.denies(&"x.pyc".into()));
        assert!(set.accepts(&"app/mod.pyc".into()));
        assert!(set.denies(&"node_modules/left-pad/index.js".into()));
        assert!(set.accepts(&"web/node_modules/x.js".into()));
    }

    #[test]
    fn root_segment_pattern_excludes_whole_directory() {
        let set = rules("*cache*\n");
        assert!(set.denies(&"__pycache__/mod.pyc".into()));
        assert!(set.denies(&"cache".into()));
        assert!(set.accepts(&"app/__pycache__/mod.pyc".into()));
    }

    #[test]
    fn anchored_pattern_only_matches_from_root() {
        let set = rules("/build\nsrc/*.tmp\n");
        assert!(set.denies(&"build/out.bin".into()));
        assert!(set.accepts(&"tools/build/out.bin".into()));
        assert!(set.denies(&"src/a.tmp".into()));
        assert!(set.accepts(&"lib/src/a.tmp".into()));
        assert!(set.rules().iter().all(|r| r.anchored_to_root));
    }

    #[test]
    fn wildcards_stay_within_a_segment() {
        let set = rules("src/*.rs\nfile?.txt\n");
        assert!(set.denies(&"src/main.rs".into()));
        assert!(set.accepts(&"src/nested/main.rs".into()));
        assert!(set.denies(&"file1.txt".into()));
        assert!(set.accepts(&"file10.txt".into()));
    }

    #[test]
    fn double_star_spans_segments() {
        let set = rules("docs/**/*.md\n");
        assert!(set.denies(&"docs/a/b/c.md".into()));
        assert!(set.accepts(&"src/c.md".into()));
    }

    #[test]
    fn bare_negation_is_a_parse_error() {
        let err = IgnoreRuleSet::parse("*.log\n!\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn invalid_glob_is_a_parse_error() {
        let err = IgnoreRuleSet::parse("[unclosed\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn missing_ignore_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_ignore_file(dir.path()),
            Err(IgnoreFileError::NotFound)
        ));
    }

    #[test]
    fn malformed_ignore_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(IGNORE_FILE_NAME), "ok.txt\n{unclosed\n").unwrap();
        assert!(matches!(
            load_ignore_file(dir.path()),
            Err(IgnoreFileError::Malformed(ParseError { line: 2, .. }))
        ));
    }
}
