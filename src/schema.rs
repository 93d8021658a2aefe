//! Schema graph: the type-level projection of the relationship graph.
//!
//! For every relationship triple (s, p, o) whose endpoints are both typed, the
//! graph gains one edge `st —p→ ot` for each (st, ot) in types(s) × types(o).
//! Edges are deduplicated per (subject type, predicate, object type). Triples
//! with an untyped endpoint contribute nothing and are not an error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::BufRead;
use std::path::PathBuf;

use crate::checkpoint::Checkpoint;
use crate::config::MalformedPolicy;
use crate::error::{CheckpointError, DistillResult, InputError};
use crate::triple::{ReadStats, TripleReader, TripleRef};
use crate::type_dict::TypeDictionary;

/// One deduplicated schema edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaEdge<'a> {
    pub subject_type: &'a str,
    pub predicate: &'a str,
    pub object_type: &'a str,
}

/// Renders the checkpoint line format: `subject_type predicate object_type`.
impl fmt::Display for SchemaEdge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject_type, self.predicate, self.object_type)
    }
}

/// subject type → predicate → object types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaGraph {
    edges: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    subject_types: BTreeSet<String>,
    object_types: BTreeSet<String>,
    edge_count: usize,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_edge(&self, subject_type: &str, predicate: &str, object_type: &str) -> bool {
        self.edges
            .get(subject_type)
            .and_then(|by_pred| by_pred.get(predicate))
            .is_some_and(|objects| objects.contains(object_type))
    }

    /// Insert an edge. Returns `true` if it was not already present.
    pub fn insert_edge(&mut self, subject_type: &str, predicate: &str, object_type: &str) -> bool {
        if self.contains_edge(subject_type, predicate, object_type) {
            return false;
        }
        self.edges
            .entry(subject_type.to_owned())
            .or_default()
            .entry(predicate.to_owned())
            .or_default()
            .insert(object_type.to_owned());
        if !self.subject_types.contains(subject_type) {
            self.subject_types.insert(subject_type.to_owned());
        }
        if !self.object_types.contains(object_type) {
            self.object_types.insert(object_type.to_owned());
        }
        self.edge_count += 1;
        true
    }

    /// Derive edges from one relationship triple. Returns the number of new edges.
    pub fn absorb(&mut self, triple: TripleRef<'_>, types: &TypeDictionary) -> usize {
        let (Some(subject_types), Some(object_types)) =
            (types.types_of(triple.subject), types.types_of(triple.object))
        else {
            return 0;
        };
        let mut added = 0;
        for st in subject_types {
            for ot in object_types {
                if self.insert_edge(st, triple.predicate, ot) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count == 0
    }

    /// Edges in (subject type, predicate, object type) order.
    pub fn edges(&self) -> impl Iterator<Item = SchemaEdge<'_>> {
        self.edges.iter().flat_map(|(st, by_pred)| {
            by_pred.iter().flat_map(move |(p, objects)| {
                objects.iter().map(move |ot| SchemaEdge {
                    subject_type: st,
                    predicate: p,
                    object_type: ot,
                })
            })
        })
    }

    /// Types that appear as the subject end of some edge.
    pub fn subject_types(&self) -> &BTreeSet<String> {
        &self.subject_types
    }

    /// Types that appear as the object end of some edge.
    pub fn object_types(&self) -> &BTreeSet<String> {
        &self.object_types
    }

    /// The vertex set: every type at either end of an edge, nothing else.
    pub fn vertices(&self) -> BTreeSet<String> {
        self.subject_types
            .union(&self.object_types)
            .cloned()
            .collect()
    }

    /// Number of edges per predicate.
    pub fn predicate_usage(&self) -> BTreeMap<&str, usize> {
        let mut usage = BTreeMap::new();
        for by_pred in self.edges.values() {
            for (p, objects) in by_pred {
                *usage.entry(p.as_str()).or_insert(0) += objects.len();
            }
        }
        usage
    }
}

/// Counters from a schema build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaBuildStats {
    pub read: ReadStats,
    /// Triples dropped because an endpoint had no types.
    pub untyped: usize,
}

/// Feed every triple of `reader` through [`SchemaGraph::absorb`].
pub fn read_relationships<R: BufRead>(
    reader: &mut TripleReader<R>,
    types: &TypeDictionary,
    graph: &mut SchemaGraph,
) -> Result<usize, InputError> {
    let mut untyped = 0;
    while let Some(t) = reader.next_triple()? {
        if !types.contains(t.subject) || !types.contains(t.object) {
            untyped += 1;
            continue;
        }
        graph.absorb(t, types);
    }
    Ok(untyped)
}

/// Build the schema graph from the relationship pool.
pub fn build_schema_graph(
    pool: &[PathBuf],
    types: &TypeDictionary,
    policy: MalformedPolicy,
) -> DistillResult<(SchemaGraph, SchemaBuildStats)> {
    let mut graph = SchemaGraph::new();
    let mut stats = SchemaBuildStats::default();
    for (i, path) in pool.iter().enumerate() {
        tracing::info!(
            source = %path.display(),
            file = i + 1,
            of = pool.len(),
            "deriving schema edges"
        );
        let mut reader = TripleReader::open(path, policy)?;
        stats.untyped += read_relationships(&mut reader, types, &mut graph)?;
        stats.read.absorb(&reader);
    }
    tracing::info!(
        edges = graph.edge_count(),
        untyped = stats.untyped,
        "schema graph built"
    );
    Ok((graph, stats))
}

/// Rebuild the in-memory graph from a `type predicate type` edge checkpoint.
pub fn load_schema_edges(checkpoint: &Checkpoint) -> DistillResult<SchemaGraph> {
    let mut graph = SchemaGraph::new();
    checkpoint.for_each_line(|line_no, line| {
        let mut fields = line.split_ascii_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(st), Some(p), Some(ot)) => {
                graph.insert_edge(st, p, ot);
                Ok(())
            }
            _ => Err(CheckpointError::Corrupt {
                path: checkpoint.path().display().to_string(),
                message: format!("line {line_no}: expected `type predicate type`"),
            }
            .into()),
        }
    })?;
    Ok(graph)
}

/// Load a one-type-per-line vertex checkpoint.
pub fn load_vertices(checkpoint: &Checkpoint) -> DistillResult<BTreeSet<String>> {
    checkpoint.load_set()
}
