//! Per-item outcomes that did not stop loading.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadIssueKind {
    ShaderCompile,
    ProgramLink,
    ProgramValidate,
    TextureFallback,
    CacheUnusable,
}

impl fmt::Display for LoadIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadIssueKind::ShaderCompile => "shader compile",
            LoadIssueKind::ProgramLink => "program link",
            LoadIssueKind::ProgramValidate => "program validate",
            LoadIssueKind::TextureFallback => "texture fallback",
            LoadIssueKind::CacheUnusable => "unusable cache",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadIssue {
    pub kind: LoadIssueKind,
    /// Row index within the table that produced the item.
    pub index: usize,
    pub name: String,
    pub detail: String,
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} '{}': {}", self.kind, self.index, self.name, self.detail)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    issues: Vec<LoadIssue>,
}

impl LoadReport {
    pub fn push(
        &mut self,
        kind: LoadIssueKind,
        index: usize,
        name: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.issues.push(LoadIssue {
            kind,
            index,
            name: name.into(),
            detail: detail.into(),
        });
    }

    pub fn issues(&self) -> &[LoadIssue] {
        &self.issues
    }

    pub fn of_kind(&self, kind: LoadIssueKind) -> impl Iterator<Item = &LoadIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    pub fn count(&self, kind: LoadIssueKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn clear(&mut self) {
        self.issues.clear();
    }
}
