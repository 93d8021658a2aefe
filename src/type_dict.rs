//! Type dictionary: entity → set of asserted types.
//!
//! Built once from the type-assertion sources. Only lines whose predicate local
//! name is `type` contribute; every other line is ignored. Duplicate
//! (entity, type) pairs are no-ops.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::MalformedPolicy;
use crate::error::{DistillResult, InputError};
use crate::triple::{ReadStats, TripleReader};

/// Mapping from entity IRI to its type IRIs. Every stored set is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDictionary {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `entity` has type `ty`. Returns `true` if the pair is new.
    pub fn insert(&mut self, entity: &str, ty: &str) -> bool {
        match self.entries.get_mut(entity) {
            Some(types) => {
                if types.contains(ty) {
                    false
                } else {
                    types.insert(ty.to_string())
                }
            }
            None => {
                self.entries
                    .insert(entity.to_string(), BTreeSet::from([ty.to_string()]));
                true
            }
        }
    }

    /// Types of an entity, if it has any.
    pub fn types_of(&self, entity: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(entity)
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entries.contains_key(entity)
    }

    /// Number of typed entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of (entity, type) pairs.
    pub fn pair_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    /// Entities in lexicographic order with their types.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every distinct type mentioned anywhere in the dictionary.
    pub fn all_types(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .flat_map(|types| types.iter().map(String::as_str))
            .collect()
    }

    pub(crate) fn insert_set(&mut self, entity: String, types: BTreeSet<String>) {
        if !types.is_empty() {
            self.entries.insert(entity, types);
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for TypeDictionary {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut dict = TypeDictionary::new();
        for (entity, ty) in iter {
            dict.insert(entity, ty);
        }
        dict
    }
}

/// Fold every type assertion from `reader` into `dict`. Returns the number of
/// assertions seen (duplicates included).
pub fn read_type_assertions<R: BufRead>(
    reader: &mut TripleReader<R>,
    dict: &mut TypeDictionary,
) -> Result<usize, InputError> {
    let mut assertions = 0;
    while let Some(t) = reader.next_triple()? {
        if t.is_type_assertion() {
            dict.insert(t.subject, t.object);
            assertions += 1;
        }
    }
    Ok(assertions)
}

/// Build the dictionary from every type source, in order.
pub fn build_type_dictionary(
    sources: &[PathBuf],
    policy: MalformedPolicy,
) -> DistillResult<(TypeDictionary, ReadStats)> {
    let mut dict = TypeDictionary::new();
    let mut stats = ReadStats::default();
    for (i, path) in sources.iter().enumerate() {
        tracing::info!(
            source = %path.display(),
            file = i + 1,
            of = sources.len(),
            "reading type assertions"
        );
        let mut reader = TripleReader::open(path, policy)?;
        let assertions = read_type_assertions(&mut reader, &mut dict)?;
        stats.absorb(&reader);
        tracing::debug!(source = %path.display(), assertions, "type source done");
    }
    tracing::info!(
        entities = dict.len(),
        pairs = dict.pair_count(),
        "type dictionary built"
    );
    Ok((dict, stats))
}

/// Whether a source contains at least one type assertion. Stops at the first one.
pub fn has_type_assertions<R: BufRead>(reader: &mut TripleReader<R>) -> Result<bool, InputError> {
    while let Some(t) = reader.next_triple()? {
        if t.is_type_assertion() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Pick the link files that also carry type assertions.
pub fn discover_type_sources(
    candidates: &[PathBuf],
    policy: MalformedPolicy,
) -> DistillResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in candidates {
        let mut reader = TripleReader::open(path, policy)?;
        if has_type_assertions(&mut reader)? {
            tracing::info!(source = %path.display(), "link file carries type assertions");
            found.push(path.clone());
        }
    }
    Ok(found)
}
