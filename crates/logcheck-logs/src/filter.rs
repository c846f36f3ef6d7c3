use regex::Regex;
use tracing::{trace, warn};

/// Ordered list of compiled patterns, tested in load order
#[derive(Clone, Default)]
pub struct PatternList {
    /// What the patterns are for (diagnostics only)
    kind: &'static str,

    /// Compiled patterns, in load order
    patterns: Vec<Regex>,

    /// Patterns that failed to compile
    rejected: usize,
}

impl PatternList {
    /// Compile `sources` in order
    ///
    /// A pattern that fails to compile is logged and skipped so that one bad
    /// entry does not disable the others.
    pub fn compile<I, S>(kind: &'static str, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self {
            kind,
            patterns: Vec::new(),
            rejected: 0,
        };
        for source in sources {
            list.push(source.as_ref());
        }
        list
    }

    /// Compile and append one pattern, returning whether it was accepted
    pub fn push(&mut self, source: &str) -> bool {
        match Regex::new(source) {
            Ok(regex) => {
                self.patterns.push(regex);
                true
            }
            Err(e) => {
                warn!(kind = self.kind, pattern = source, error = %e, "Pattern is incorrect, skipping");
                self.rejected += 1;
                false
            }
        }
    }

    /// First pattern matching anywhere in `text`
    pub fn first_match(&self, text: &str) -> Option<&Regex> {
        let found = self.patterns.iter().find(|re| re.is_match(text));
        match found {
            Some(re) => trace!(kind = self.kind, pattern = re.as_str(), text, "Pattern match"),
            None => trace!(kind = self.kind, text, "No pattern match"),
        }
        found
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Number of patterns skipped because they did not compile
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Source text of the accepted patterns
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}

impl std::fmt::Debug for PatternList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternList")
            .field("kind", &self.kind)
            .field("patterns", &self.sources().collect::<Vec<_>>())
            .field("rejected", &self.rejected)
            .finish()
    }
}

/// Container image and container name ignore lists
///
/// A stream with any surviving line from an ignored container is left out
/// of the report entirely.
#[derive(Clone, Debug)]
pub struct ContainerFilter {
    images: PatternList,
    container_names: PatternList,
}

impl ContainerFilter {
    pub fn new<I, S, J, T>(images: I, container_names: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        J: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            images: PatternList::compile("image", images),
            container_names: PatternList::compile("container name", container_names),
        }
    }

    /// A filter that ignores nothing
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new(), Vec::<String>::new())
    }

    pub fn is_image_ignored(&self, image: &str) -> bool {
        self.images.is_match(image)
    }

    pub fn is_container_ignored(&self, name: &str) -> bool {
        self.container_names.is_match(name)
    }

    /// Whether either ignore list excludes this container
    pub fn is_ignored(&self, image: &str, name: &str) -> bool {
        self.is_image_ignored(image) || self.is_container_ignored(name)
    }

    pub fn images(&self) -> &PatternList {
        &self.images
    }

    pub fn container_names(&self) -> &PatternList {
        &self.container_names
    }
}

impl Default for ContainerFilter {
    fn default() -> Self {
        Self::empty()
    }
}
