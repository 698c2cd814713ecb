/// Where a repository lives, judged by the first segment of its path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace<'a> {
    /// Not an architecture prefix: the repository holds manifest lists
    TopLevel,
    /// Architecture prefix selected for this run
    Arch(&'a str),
    /// Known architecture the operator left out of this run
    Skipped(&'a str),
}

impl<'a> Namespace<'a> {
    /// `(architecture or "", should process)`
    pub fn as_pair(&self) -> (&'a str, bool) {
        match *self {
            Namespace::TopLevel => ("", true),
            Namespace::Arch(a) => (a, true),
            Namespace::Skipped(a) => (a, false),
        }
    }
}

/// Known architecture prefixes plus the subset processed in this run
#[derive(Debug, Clone)]
pub struct ArchSet {
    known: Vec<String>,
    selected: Vec<String>,
}

impl ArchSet {
    pub fn new(known: Vec<String>, selected: Vec<String>) -> Self {
        Self { known, selected }
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn classify<'a>(&self, prefix: &'a str) -> Namespace<'a> {
        classify(prefix, self.known.as_slice(), self.selected.as_slice())
    }
}

pub fn classify<'a, S: AsRef<str>>(prefix: &'a str, known: &[S], selected: &[S]) -> Namespace<'a> {
    if !known.iter().any(|a| a.as_ref() == prefix) {
        return Namespace::TopLevel;
    }
    if selected.iter().any(|a| a.as_ref() == prefix) {
        Namespace::Arch(prefix)
    } else {
        Namespace::Skipped(prefix)
    }
}

/// Split `arch/image/name` into its first segment and the rest.
/// A path without `/` has an empty rest.
pub fn split_prefix(repository: &str) -> (&str, &str) {
    repository.split_once('/').unwrap_or((repository, ""))
}
