//! Bounded instance sampling.
//!
//! The sampler reads relationship triples in order and keeps every entity it
//! sees (subjects and objects) until the instance set reaches the configured
//! cap. Once the set is full, reading stops. [`CapBoundary`] decides what
//! happens to the triple that hits the cap:
//!
//! - `Truncate` admits the subject, then stops before a new object, so the edge
//!   is lost and the subject may be left with only some of its predicates.
//! - `Atomic` admits a triple only if all of its new entities fit.
//!
//! Under both policies `instances.len() <= cap` holds after every call.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{CapBoundary, MalformedPolicy};
use crate::error::{DistillResult, InputError};
use crate::triple::{ReadStats, TripleReader, TripleRef};

/// subject instance → predicate → object instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpoTable {
    rows: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl SpoTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_subject(&mut self, subject: &str) {
        if !self.rows.contains_key(subject) {
            self.rows.insert(subject.to_owned(), BTreeMap::new());
        }
    }

    pub fn contains_edge(&self, subject: &str, predicate: &str, object: &str) -> bool {
        self.rows
            .get(subject)
            .and_then(|by_pred| by_pred.get(predicate))
            .is_some_and(|objects| objects.contains(object))
    }

    /// Record an edge. Returns `true` on first insertion.
    pub fn insert(&mut self, subject: &str, predicate: &str, object: &str) -> bool {
        if self.contains_edge(subject, predicate, object) {
            return false;
        }
        self.rows
            .entry(subject.to_owned())
            .or_default()
            .entry(predicate.to_owned())
            .or_default()
            .insert(object.to_owned())
    }

    /// Edges in (subject, predicate, object) order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.rows.iter().flat_map(|(s, by_pred)| {
            by_pred.iter().flat_map(move |(p, objects)| {
                objects
                    .iter()
                    .map(move |o| (s.as_str(), p.as_str(), o.as_str()))
            })
        })
    }

    /// Total number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.rows
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeSet::len)
            .sum()
    }

    /// Subjects with a row, in order.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Every entity mentioned as a subject or an object.
    pub fn entities(&self) -> BTreeSet<&str> {
        let mut out: BTreeSet<&str> = self.subjects().collect();
        out.extend(self.edges().map(|(_, _, o)| o));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The sampler's finished output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSample {
    pub spo: SpoTable,
    pub instances: BTreeSet<String>,
    /// Edges recorded on first insertion.
    pub new_edges: usize,
}

impl InstanceSample {
    /// Rebuild from reloaded checkpoints; the edge counter is recomputed.
    pub fn from_parts(spo: SpoTable, instances: BTreeSet<String>) -> Self {
        let new_edges = spo.edge_count();
        Self {
            spo,
            instances,
            new_edges,
        }
    }
}

/// Result of offering one triple to the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// A new edge was recorded.
    Recorded,
    /// The edge was already in the table.
    Duplicate,
    /// The cap was reached; stop reading.
    Full,
}

/// Incremental sampler state.
#[derive(Debug)]
pub struct InstanceSampler {
    cap: usize,
    boundary: CapBoundary,
    spo: SpoTable,
    instances: BTreeSet<String>,
    new_edges: usize,
    full: bool,
}

impl InstanceSampler {
    pub fn new(cap: usize, boundary: CapBoundary) -> Self {
        Self {
            cap,
            boundary,
            spo: SpoTable::new(),
            instances: BTreeSet::new(),
            new_edges: 0,
            full: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn admit(&mut self, entity: &str) -> bool {
        if self.instances.contains(entity) {
            return true;
        }
        if self.instances.len() >= self.cap {
            return false;
        }
        self.instances.insert(entity.to_owned());
        true
    }

    /// Offer one triple.
    pub fn offer(&mut self, triple: TripleRef<'_>) -> Offer {
        if self.full || self.instances.len() >= self.cap {
            self.full = true;
            return Offer::Full;
        }

        match self.boundary {
            CapBoundary::Truncate => {
                if !self.admit(triple.subject) {
                    self.full = true;
                    return Offer::Full;
                }
                self.spo.ensure_subject(triple.subject);
                if !self.admit(triple.object) {
                    self.full = true;
                    return Offer::Full;
                }
            }
            CapBoundary::Atomic => {
                let subject_new = !self.instances.contains(triple.subject);
                let object_new =
                    triple.object != triple.subject && !self.instances.contains(triple.object);
                let needed = usize::from(subject_new) + usize::from(object_new);
                if self.instances.len() + needed > self.cap {
                    self.full = true;
                    return Offer::Full;
                }
                self.admit(triple.subject);
                self.admit(triple.object);
                self.spo.ensure_subject(triple.subject);
            }
        }

        if self
            .spo
            .insert(triple.subject, triple.predicate, triple.object)
        {
            self.new_edges += 1;
            Offer::Recorded
        } else {
            Offer::Duplicate
        }
    }

    /// Offer every triple of `reader` until it ends or the cap is reached.
    /// Returns `true` if the cap was reached.
    pub fn offer_all<R: BufRead>(&mut self, reader: &mut TripleReader<R>) -> Result<bool, InputError> {
        while let Some(t) = reader.next_triple()? {
            if self.offer(t) == Offer::Full {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn finish(self) -> InstanceSample {
        InstanceSample {
            spo: self.spo,
            instances: self.instances,
            new_edges: self.new_edges,
        }
    }
}

/// Sample the relationship pool under the instance cap.
pub fn sample_instances(
    pool: &[PathBuf],
    cap: usize,
    boundary: CapBoundary,
    policy: MalformedPolicy,
) -> DistillResult<(InstanceSample, ReadStats)> {
    let mut sampler = InstanceSampler::new(cap, boundary);
    let mut stats = ReadStats::default();
    for path in pool {
        tracing::info!(source = %path.display(), cap, %boundary, "sampling instances");
        let mut reader = TripleReader::open(path, policy)?;
        let full = sampler.offer_all(&mut reader)?;
        stats.absorb(&reader);
        if full {
            tracing::info!(
                source = %path.display(),
                line = reader.lines_read(),
                "instance cap reached; stopping"
            );
            break;
        }
    }
    let sample = sampler.finish();
    tracing::info!(
        instances = sample.instances.len(),
        subjects = sample.spo.subjects().count(),
        edges = sample.new_edges,
        "instance sample built"
    );
    Ok((sample, stats))
}
