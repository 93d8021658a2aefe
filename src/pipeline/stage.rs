//! Stage and artifact identifiers, and the reports stages return.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::checkpoint::CheckpointState;
use crate::paths::OutputLayout;
use crate::triple::ReadStats;

/// A unit of pipeline work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    TypeSources,
    TypeDictionary,
    Schema,
    Statistics,
    Sample,
    SampledTypes,
    TypeIds,
    InstanceIds,
    Export,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::TypeSources => "type sources",
            Stage::TypeDictionary => "type dictionary",
            Stage::Schema => "schema",
            Stage::Statistics => "statistics",
            Stage::Sample => "sample",
            Stage::SampledTypes => "sampled types",
            Stage::TypeIds => "type ids",
            Stage::InstanceIds => "instance ids",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A persisted intermediate that a later run may reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    TypeSources,
    TypeDictionary,
    SchemaEdges,
    SchemaVertices,
    PredicateStats,
    SpoTable,
    SampledInstances,
    SampledTypes,
    TypeIds,
    InstanceIds,
}

impl Artifact {
    pub const ALL: [Artifact; 10] = [
        Artifact::TypeSources,
        Artifact::TypeDictionary,
        Artifact::SchemaEdges,
        Artifact::SchemaVertices,
        Artifact::PredicateStats,
        Artifact::SpoTable,
        Artifact::SampledInstances,
        Artifact::SampledTypes,
        Artifact::TypeIds,
        Artifact::InstanceIds,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Artifact::TypeSources => "type-sources",
            Artifact::TypeDictionary => "type-dictionary",
            Artifact::SchemaEdges => "schema-edges",
            Artifact::SchemaVertices => "schema-vertices",
            Artifact::PredicateStats => "predicate-statistics",
            Artifact::SpoTable => "spo-table",
            Artifact::SampledInstances => "sampled-instances",
            Artifact::SampledTypes => "sampled-types",
            Artifact::TypeIds => "type-ids",
            Artifact::InstanceIds => "instance-ids",
        }
    }

    pub fn path(self, layout: &OutputLayout) -> &Path {
        match self {
            Artifact::TypeSources => &layout.discovered_type_files,
            Artifact::TypeDictionary => &layout.type_dict,
            Artifact::SchemaEdges => &layout.schema_edges,
            Artifact::SchemaVertices => &layout.schema_vertices,
            Artifact::PredicateStats => &layout.predicates,
            Artifact::SpoTable => &layout.spo_table,
            Artifact::SampledInstances => &layout.sampled_instances,
            Artifact::SampledTypes => &layout.sampled_type_dict,
            Artifact::TypeIds => &layout.type_ids,
            Artifact::InstanceIds => &layout.instance_ids,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a stage did its work or reloaded a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Built,
    Reloaded,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Built => write!(f, "built"),
            Outcome::Reloaded => write!(f, "reloaded"),
        }
    }
}

/// What one stage did, with named counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: Outcome,
    pub counts: Vec<(String, usize)>,
}

impl StageReport {
    pub fn new(stage: Stage, outcome: Outcome) -> Self {
        Self {
            stage,
            outcome,
            counts: Vec::new(),
        }
    }

    pub fn count(mut self, label: impl Into<String>, value: usize) -> Self {
        self.counts.push((label.into(), value));
        self
    }

    /// Attach reader counters. Skipped lines are only listed when there were any.
    pub fn read(self, stats: ReadStats) -> Self {
        let report = self
            .count("files", stats.files)
            .count("lines", stats.lines)
            .count("triples", stats.triples);
        if stats.skipped > 0 {
            report.count("skipped", stats.skipped)
        } else {
            report
        }
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| *v)
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.outcome)?;
        if !self.counts.is_empty() {
            let parts: Vec<String> = self
                .counts
                .iter()
                .map(|(label, value)| format!("{label}={value}"))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// One row of `kgd status`.
#[derive(Debug, Clone)]
pub struct ArtifactStatus {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub state: CheckpointState,
}
