//! Predicate usage across the schema graph.

use std::collections::BTreeMap;

use crate::checkpoint::Checkpoint;
use crate::error::DistillResult;
use crate::schema::SchemaGraph;

/// Distinct schema predicates with the number of schema edges each labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateStats {
    usage: BTreeMap<String, usize>,
}

impl PredicateStats {
    pub fn from_schema(schema: &SchemaGraph) -> Self {
        let usage = schema
            .predicate_usage()
            .into_iter()
            .map(|(p, n)| (p.to_owned(), n))
            .collect();
        Self { usage }
    }

    /// Number of distinct predicates.
    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }

    pub fn count(&self, predicate: &str) -> usize {
        self.usage.get(predicate).copied().unwrap_or(0)
    }

    /// Predicates in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.usage.iter().map(|(p, n)| (p.as_str(), *n))
    }

    /// The `n` most used predicates, ties broken by name.
    pub fn top(&self, n: usize) -> Vec<(&str, usize)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Write `predicate count` lines.
    pub fn save(&self, checkpoint: &Checkpoint) -> DistillResult<()> {
        checkpoint.save_lines(self.iter().map(|(p, n)| format!("{p} {n}")))?;
        tracing::info!(
            predicates = self.len(),
            path = %checkpoint.path().display(),
            "predicate statistics written"
        );
        Ok(())
    }
}
