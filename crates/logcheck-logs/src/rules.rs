use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::filter::PatternList;

/// Errors loading the rules directory
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("no rules folder configured")]
    NoRulesDir,

    #[error("rules directory {0} not found")]
    RulesDirNotFound(PathBuf),

    #[error("cannot read rules directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Patterns whose match marks a log line as expected noise
#[derive(Clone, Debug)]
pub struct RuleMatcher {
    rules: PatternList,
}

impl RuleMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rules: PatternList::compile("rule", patterns),
        }
    }

    /// Load one rule per non-empty line of every regular file under `dir`
    ///
    /// Files are visited in file name order so rule order is stable. Only a
    /// missing or unreadable root is fatal; unreadable files inside the tree
    /// are logged and skipped.
    pub fn load_dir(dir: &Path) -> Result<Self, RulesError> {
        if dir.as_os_str().is_empty() {
            return Err(RulesError::NoRulesDir);
        }
        let metadata = fs::metadata(dir).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => RulesError::RulesDirNotFound(dir.to_path_buf()),
            _ => RulesError::Io {
                path: dir.to_path_buf(),
                source,
            },
        })?;
        if !metadata.is_dir() {
            return Err(RulesError::RulesDirNotFound(dir.to_path_buf()));
        }

        let mut rules = PatternList::compile("rule", std::iter::empty::<&str>());
        let mut files = 0usize;

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(RulesError::Io {
                        path: dir.to_path_buf(),
                        source: e.into(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable rules entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let content = match fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable rule file");
                    continue;
                }
            };
            files += 1;

            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                rules.push(line);
            }
            debug!(path = %entry.path().display(), "Loaded rule file");
        }

        if rules.is_empty() {
            warn!(dir = %dir.display(), "No rules loaded, every line will be reported");
        }
        info!(
            dir = %dir.display(),
            files,
            rules = rules.len(),
            rejected = rules.rejected(),
            "Rules loaded"
        );

        Ok(Self { rules })
    }

    /// Whether `line` matches any rule; the first match wins
    pub fn matches_any_rule(&self, line: &str) -> bool {
        self.rules.is_match(line)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn patterns(&self) -> &PatternList {
        &self.rules
    }
}
