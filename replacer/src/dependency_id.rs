//! Semantic wrapper for installed dependency identifiers.
//!
//! A dependency identifier is the verbatim `<name>-<version>` directory
//! segment that the package manager writes below its `extensions/` tree, for
//! example `nokogiri-1.8.1`. The same token names the replacement artifact in
//! the registry, so it is never normalised.

use std::fmt;

/// A `<name>-<version>` token identifying one installed dependency.
///
/// Construct values through [`DependencyId::parse`], which enforces the
/// name/version shape. Ordering is lexicographic on the raw token so that
/// sets of identifiers render deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyId {
    raw: String,
    split: usize,
}

/// Reason a directory segment is not a dependency identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyIdError {
    /// The segment is empty.
    #[error("dependency identifier is empty")]
    Empty,

    /// No `-` followed by a digit separates a name from a version.
    #[error("\"{0}\" has no `<name>-<version>` boundary")]
    MissingVersion(String),
}

impl DependencyId {
    /// Parse a directory segment into an identifier.
    ///
    /// The name ends at the first `-` that is immediately followed by an
    /// ASCII digit. Everything after that hyphen is the version, which may
    /// itself carry a platform suffix.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyIdError`] when the segment is empty or has no
    /// name/version boundary.
    ///
    /// # Examples
    ///
    /// ```
    /// use native_replacer::dependency_id::DependencyId;
    ///
    /// let id = DependencyId::parse("aws-sdk-core-3.1.0")?;
    /// assert_eq!(id.name(), "aws-sdk-core");
    /// assert_eq!(id.version(), "3.1.0");
    /// assert_eq!(id.as_str(), "aws-sdk-core-3.1.0");
    /// # Ok::<(), native_replacer::dependency_id::DependencyIdError>(())
    /// ```
    pub fn parse(segment: &str) -> Result<Self, DependencyIdError> {
        if segment.is_empty() {
            return Err(DependencyIdError::Empty);
        }

        let split = segment
            .char_indices()
            .zip(segment.chars().skip(1))
            .find(|((_, current), next)| *current == '-' && next.is_ascii_digit())
            .map(|((index, _), _)| index)
            .filter(|&index| index > 0)
            .ok_or_else(|| DependencyIdError::MissingVersion(segment.to_owned()))?;

        Ok(Self {
            raw: segment.to_owned(),
            split,
        })
    }

    /// The dependency name, e.g. `nokogiri`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.raw.get(..self.split).unwrap_or_default()
    }

    /// The version, e.g. `1.8.1`.
    #[must_use]
    pub fn version(&self) -> &str {
        self.raw.get(self.split + 1..).unwrap_or_default()
    }

    /// The full identifier as it appears on disk.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl AsRef<str> for DependencyId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
