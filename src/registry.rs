//! Stable name ↔ id registries.
//!
//! An [`IdRegistry`] maps entity names to non-negative integer ids within one
//! [`Namespace`]. Ids are handed out sequentially from 0 in the order names are
//! passed to [`IdRegistry::assign`]; the pipeline always passes names in
//! ascending lexicographic order, which makes a from-scratch assignment
//! reproducible.
//!
//! Assigned ids never change. Reopening a registry file reloads every pair
//! verbatim; names not yet in it get fresh ids starting at `max(id) + 1`.
//!
//! On disk a registry is one `name id` pair per line, in id order.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::checkpoint::Checkpoint;
use crate::error::{DistillResult, RegistryError};

/// Which id space a registry covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Type,
    Instance,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Type => write!(f, "Type"),
            Namespace::Instance => write!(f, "Instance"),
        }
    }
}

/// Bidirectional name ↔ id mapping for one namespace.
#[derive(Debug, Clone)]
pub struct IdRegistry {
    namespace: Namespace,
    /// Reverse map: name → id.
    ids: HashMap<String, u64>,
    /// Forward list in assignment order, which is also id order.
    entries: Vec<(String, u64)>,
    next_id: u64,
}

impl IdRegistry {
    /// Create a new empty registry.
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            ids: HashMap::new(),
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Assign ids to every name not yet registered, in the order given.
    /// Returns how many names were new.
    pub fn assign<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> usize {
        let mut added = 0;
        for name in names {
            if self.ids.contains_key(name) {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.ids.insert(name.to_owned(), id);
            self.entries.push((name.to_owned(), id));
            added += 1;
        }
        added
    }

    /// Look up an id. A miss is always an error; there is no default id.
    pub fn id_of(&self, name: &str) -> Result<u64, RegistryError> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::LookupMiss {
                namespace: self.namespace.to_string(),
                name: name.to_owned(),
            })
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.ids.get(name).copied()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(name, id)| (name.as_str(), *id))
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load a registry file.
    pub fn load(namespace: Namespace, path: &Path) -> DistillResult<Self> {
        let mut registry = Self::new(namespace);
        let mut by_id: HashMap<u64, String> = HashMap::new();
        let display = path.display().to_string();

        Checkpoint::unfingerprinted(path).for_each_line(|line_no, line| {
            let malformed = || RegistryError::MalformedEntry {
                path: display.clone(),
                line: line_no,
            };
            let mut fields = line.split_ascii_whitespace();
            let (Some(name), Some(id), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(malformed().into());
            };
            let id: u64 = id.parse().map_err(|_| malformed())?;
            if registry.ids.contains_key(name) {
                return Err(malformed().into());
            }
            if let Some(first) = by_id.get(&id) {
                return Err(RegistryError::DuplicateId {
                    path: display.clone(),
                    id,
                    first: first.clone(),
                    second: name.to_owned(),
                }
                .into());
            }
            by_id.insert(id, name.to_owned());
            registry.ids.insert(name.to_owned(), id);
            registry.entries.push((name.to_owned(), id));
            let after = id.checked_add(1).ok_or_else(malformed)?;
            registry.next_id = registry.next_id.max(after);
            Ok(())
        })?;

        registry.entries.sort_by_key(|(_, id)| *id);
        Ok(registry)
    }

    /// Persist every pair, in id order.
    pub fn persist(&self, path: &Path) -> DistillResult<()> {
        Checkpoint::unfingerprinted(path)
            .save_lines(self.entries.iter().map(|(name, id)| format!("{name} {id}")))
    }

    /// Reopen the registry at `path` if it exists, register `names`, and write
    /// it back if anything was added. Returns the registry and the number of
    /// new names.
    pub fn open_and_assign<'a>(
        namespace: Namespace,
        path: &Path,
        names: impl IntoIterator<Item = &'a str>,
    ) -> DistillResult<(Self, usize)> {
        let existed = path.is_file();
        let mut registry = if existed {
            Self::load(namespace, path)?
        } else {
            Self::new(namespace)
        };
        let before = registry.len();
        let added = registry.assign(names);
        if added > 0 || !existed {
            registry.persist(path)?;
        }
        tracing::info!(
            %namespace,
            reloaded = before,
            assigned = added,
            path = %path.display(),
            "id registry ready"
        );
        Ok((registry, added))
    }
}
