use std::collections::BTreeSet;
use std::fmt;

use log::debug;
use thiserror::Error;

/// Rejected manual edit of the exclusion list
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Exclusion list must be enclosed in brackets, e.g. [1, 2]")]
    MissingBrackets,

    #[error("'{0}' is not an integer")]
    NotAnInteger(String),

    #[error("Empty entry at position {0}")]
    EmptyEntry(usize),
}

/// Directions marked for removal, always within `0..directions`.
///
/// Entries outside the valid range are dropped on every mutation without
/// raising an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    directions: usize,
    excluded: BTreeSet<usize>,
}

impl ExclusionSet {
    /// Empty set for a dataset with `directions` channels
    pub fn new(directions: usize) -> Self {
        Self {
            directions,
            excluded: BTreeSet::new(),
        }
    }

    pub fn directions(&self) -> usize {
        self.directions
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.excluded.contains(&index)
    }

    /// Returns `true` if the index was newly excluded.
    pub fn add(&mut self, index: usize) -> bool {
        if index >= self.directions {
            debug!("ignoring out of range exclusion {index}");
            return false;
        }
        self.excluded.insert(index)
    }

    /// Returns `true` if the index was excluded before.
    pub fn remove(&mut self, index: usize) -> bool {
        self.excluded.remove(&index)
    }

    /// Replaces the whole set from a manually edited list such as
    /// `[1, 2, 999]`. Out of range values are dropped. On a parse error the
    /// set is left untouched.
    pub fn replace(&mut self, text: &str) -> Result<(), ValidationError> {
        let parsed = parse_index_list(text)?;
        let directions = self.directions;
        self.excluded = parsed
            .into_iter()
            .filter_map(|value| usize::try_from(value).ok())
            .filter(|&index| index < directions)
            .collect();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.excluded.clear();
    }

    /// Excluded indices, ascending
    pub fn serialize(&self) -> Vec<usize> {
        self.excluded.iter().copied().collect()
    }

    /// Directions that survive the exclusion, ascending
    pub fn retained(&self) -> Vec<usize> {
        (0..self.directions)
            .filter(|index| !self.excluded.contains(index))
            .collect()
    }
}

impl fmt::Display for ExclusionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.excluded.iter().map(usize::to_string).collect();
        write!(f, "[{}]", entries.join(", "))
    }
}

/// Strict grammar: `[` integers separated by commas `]`, whitespace
/// anywhere, one trailing comma allowed.
fn parse_index_list(text: &str) -> Result<Vec<i64>, ValidationError> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or(ValidationError::MissingBrackets)?;

    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    let inner = inner.strip_suffix(',').unwrap_or(inner);

    inner
        .split(',')
        .enumerate()
        .map(|(position, entry)| {
            let entry = entry.trim();
            if entry.is_empty() {
                return Err(ValidationError::EmptyEntry(position));
            }
            entry
                .parse::<i64>()
                .map_err(|_| ValidationError::NotAnInteger(entry.to_string()))
        })
        .collect()
}
