//! On-disk layout of fetched server resources.

use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

/// Default structure: one directory per edition, then per version.
pub const DEFAULT_STRUCTURE: &str = "{edition}/{version}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Edition,
    Version,
}

/// Maps an edition and version to the base directory holding its resources.
///
/// The structure template is validated once on construction; rendering
/// only fails when a value would escape the store root.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
    structure: String,
    segments: Vec<Segment>,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>, structure: &str) -> Result<Self, StoreError> {
        Ok(Self {
            root: root.into(),
            structure: structure.to_string(),
            segments: parse(structure)?,
        })
    }

    /// A layout rooted at `root` with [`DEFAULT_STRUCTURE`].
    pub fn with_default_structure(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            structure: DEFAULT_STRUCTURE.to_string(),
            segments: vec![
                Segment::Edition,
                Segment::Literal("/".to_string()),
                Segment::Version,
            ],
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn structure(&self) -> &str {
        &self.structure
    }

    /// Base directory for an edition and version.
    pub fn base_dir(&self, edition: &str, version: &str) -> Result<PathBuf, StoreError> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Edition => rendered.push_str(edition),
                Segment::Version => rendered.push_str(version),
            }
        }

        let relative = Path::new(&rendered);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                other => {
                    return Err(StoreError::UnsafeComponent {
                        component: other.as_os_str().to_string_lossy().into_owned(),
                    })
                }
            }
        }

        Ok(self.root.join(relative))
    }
}

fn parse(template: &str) -> Result<Vec<Segment>, StoreError> {
    let unbalanced = || StoreError::UnbalancedBraces {
        template: template.to_string(),
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(unbalanced()),
                        Some(c) => name.push(c),
                    }
                }

                let placeholder = match name.trim() {
                    "edition" => Segment::Edition,
                    "version" => Segment::Version,
                    other => {
                        return Err(StoreError::UnknownPlaceholder {
                            name: other.to_string(),
                        })
                    }
                };
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(placeholder);
            }
            '}' => return Err(unbalanced()),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
