//! Stage orchestration.
//!
//! A [`Pipeline`] owns the resolved configuration, the output layout and a
//! [`PipelineContext`] holding every intermediate produced so far. Each stage
//! first asks its checkpoint whether it can be reloaded; only if not does it
//! pull in its upstream stages and compute. So a rerun over intact checkpoints
//! reads nothing but the checkpoints, and an edge checkpoint alone is enough
//! for the schema path without rebuilding the type dictionary.
//!
//! Two independent paths meet at export:
//!
//! ```text
//! type sources ─► type dictionary ─► schema graph ─► schema vertices ─┐
//!                        │                                            ├─► ids ─► CSV
//! relation pool ─► instance sample ─► sampled types ──────────────────┘
//! ```

mod stage;

pub use stage::{Artifact, ArtifactStatus, Outcome, Stage, StageReport};

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::checkpoint::{Checkpoint, Fingerprint, FingerprintBuilder};
use crate::config::{PipelineConfig, StalePolicy};
use crate::error::{DistillResult, PipelineError};
use crate::export::{ExportSources, export_all};
use crate::join::{SampledTypes, sample_types};
use crate::paths::OutputLayout;
use crate::registry::{IdRegistry, Namespace};
use crate::sampler::{InstanceSample, SpoTable, sample_instances};
use crate::schema::{SchemaGraph, build_schema_graph, load_schema_edges, load_vertices};
use crate::stats::PredicateStats;
use crate::type_dict::{TypeDictionary, build_type_dictionary, discover_type_sources};

/// Every intermediate the pipeline has produced or reloaded so far.
#[derive(Debug, Default)]
pub struct PipelineContext {
    /// Configured type files plus any discovered link files.
    pub type_sources: Option<Vec<PathBuf>>,
    pub type_dict: Option<TypeDictionary>,
    pub schema: Option<SchemaGraph>,
    pub vertices: Option<BTreeSet<String>>,
    pub sample: Option<InstanceSample>,
    pub sampled_types: Option<SampledTypes>,
    pub type_ids: Option<IdRegistry>,
    pub instance_ids: Option<IdRegistry>,
}

fn loaded<T>(slot: &Option<T>, stage: Stage, requires: Stage) -> DistillResult<&T> {
    slot.as_ref().ok_or_else(|| {
        PipelineError::StageOrder {
            stage: stage.name(),
            requires: requires.name(),
        }
        .into()
    })
}

/// The stage sequencer.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    layout: OutputLayout,
    ctx: PipelineContext,
    reports: Vec<StageReport>,
}

impl Pipeline {
    /// Validate the configuration and create the output directories.
    pub fn new(config: PipelineConfig) -> DistillResult<Self> {
        config.validate()?;
        let layout = OutputLayout::new(&config.output);
        layout.ensure_dirs()?;
        Ok(Self {
            config,
            layout,
            ctx: PipelineContext::default(),
            reports: Vec::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Every report recorded since the pipeline was created.
    pub fn reports(&self) -> &[StageReport] {
        &self.reports
    }

    // ── Entry points ────────────────────────────────────────────────────

    /// Type dictionary, schema graph and vertex set, plus predicate statistics
    /// when `schema-statistics` is on.
    pub fn run_schema(&mut self) -> DistillResult<Vec<StageReport>> {
        let start = self.reports.len();
        self.ensure_schema()?;
        if self.config.features.schema_statistics {
            self.write_statistics()?;
        }
        Ok(self.reports[start..].to_vec())
    }

    /// Instance sample and the sampled type dictionary.
    pub fn run_instances(&mut self) -> DistillResult<Vec<StageReport>> {
        let start = self.reports.len();
        self.ensure_sample()?;
        self.ensure_sampled_types()?;
        Ok(self.reports[start..].to_vec())
    }

    /// Id registries and CSV tables. Both the schema and the sample must have
    /// been produced, in this process or by an earlier run.
    pub fn run_exports(&mut self) -> DistillResult<Vec<StageReport>> {
        let start = self.reports.len();
        self.require(
            Stage::Schema,
            &[Artifact::SchemaEdges, Artifact::SchemaVertices],
            self.ctx.schema.is_some() && self.ctx.vertices.is_some(),
        )?;
        self.require(
            Stage::Sample,
            &[
                Artifact::SpoTable,
                Artifact::SampledInstances,
                Artifact::SampledTypes,
            ],
            self.ctx.sample.is_some() && self.ctx.sampled_types.is_some(),
        )?;
        self.ensure_type_ids()?;
        self.ensure_instance_ids()?;
        self.write_tables()?;
        Ok(self.reports[start..].to_vec())
    }

    /// Every stage, in order.
    pub fn run(&mut self) -> DistillResult<Vec<StageReport>> {
        let mut reports = self.run_schema()?;
        reports.extend(self.run_instances()?);
        reports.extend(self.run_exports()?);
        Ok(reports)
    }

    /// Presence and fingerprint state of every artifact.
    pub fn status(&self) -> Vec<ArtifactStatus> {
        Artifact::ALL
            .into_iter()
            .map(|artifact| {
                let cp = self.checkpoint(artifact);
                ArtifactStatus {
                    artifact,
                    path: cp.path().to_path_buf(),
                    state: cp.state(),
                }
            })
            .collect()
    }

    // ── Checkpoints ─────────────────────────────────────────────────────

    fn stale(&self) -> StalePolicy {
        self.config.checkpoints.stale
    }

    /// Type sources as configured, without running discovery.
    fn with_type_inputs(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        let sources = &self.config.sources;
        let builder = builder
            .field("malformed", format!("{:?}", self.config.parsing.malformed))
            .field("use_link_files", sources.use_link_files)
            .inputs(&sources.type_files);
        if sources.use_link_files {
            builder.inputs(&sources.link_files)
        } else {
            builder
        }
    }

    fn with_sample_inputs(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        let sampling = &self.config.sampling;
        builder
            .field("malformed", format!("{:?}", self.config.parsing.malformed))
            .field("instance_cap", sampling.instance_cap)
            .field("boundary", sampling.boundary)
            .inputs(self.config.sources.relation_pool())
    }

    /// Registries are never fingerprinted: their ids must survive input changes.
    fn fingerprint(&self, artifact: Artifact) -> Option<Fingerprint> {
        let builder = Fingerprint::builder(artifact.name());
        let builder = match artifact {
            Artifact::TypeSources => builder
                .field("malformed", format!("{:?}", self.config.parsing.malformed))
                .inputs(&self.config.sources.link_files),
            Artifact::TypeDictionary => self.with_type_inputs(builder),
            Artifact::SchemaEdges | Artifact::SchemaVertices => self
                .with_type_inputs(builder)
                .inputs(self.config.sources.relation_pool()),
            Artifact::SpoTable | Artifact::SampledInstances => self.with_sample_inputs(builder),
            Artifact::SampledTypes => self.with_sample_inputs(self.with_type_inputs(builder)),
            Artifact::PredicateStats | Artifact::TypeIds | Artifact::InstanceIds => return None,
        };
        Some(builder.finish())
    }

    fn checkpoint(&self, artifact: Artifact) -> Checkpoint {
        let path = artifact.path(&self.layout);
        match self.fingerprint(artifact) {
            Some(fp) => Checkpoint::new(path, fp),
            None => Checkpoint::unfingerprinted(path),
        }
    }

    fn require(&self, requires: Stage, artifacts: &[Artifact], in_memory: bool) -> DistillResult<()> {
        if in_memory
            || artifacts
                .iter()
                .all(|a| a.path(&self.layout).is_file())
        {
            return Ok(());
        }
        Err(PipelineError::StageOrder {
            stage: Stage::Export.name(),
            requires: requires.name(),
        }
        .into())
    }

    fn record(&mut self, report: StageReport) {
        tracing::info!(
            stage = %report.stage,
            outcome = %report.outcome,
            "{report}"
        );
        self.reports.push(report);
    }

    // ── Stages ──────────────────────────────────────────────────────────

    fn ensure_type_sources(&mut self) -> DistillResult<()> {
        if self.ctx.type_sources.is_some() {
            return Ok(());
        }
        let mut resolved = self.config.sources.type_files.clone();
        if self.config.sources.use_link_files {
            let cp = self.checkpoint(Artifact::TypeSources);
            let (discovered, outcome) = if cp.usable(self.stale()) {
                let mut found = Vec::new();
                cp.for_each_line(|_, line| {
                    found.push(PathBuf::from(line));
                    Ok(())
                })?;
                (found, Outcome::Reloaded)
            } else {
                let found = discover_type_sources(
                    &self.config.sources.link_files,
                    self.config.parsing.malformed,
                )?;
                cp.save_lines(found.iter().map(|p| p.display()))?;
                (found, Outcome::Built)
            };
            self.record(
                StageReport::new(Stage::TypeSources, outcome)
                    .count("discovered", discovered.len()),
            );
            for path in discovered {
                if !resolved.contains(&path) {
                    resolved.push(path);
                }
            }
        }
        self.ctx.type_sources = Some(resolved);
        Ok(())
    }

    fn ensure_type_dict(&mut self) -> DistillResult<()> {
        if self.ctx.type_dict.is_some() {
            return Ok(());
        }
        let cp = self.checkpoint(Artifact::TypeDictionary);
        let (dict, report) = if cp.usable(self.stale()) {
            let dict: TypeDictionary = cp.load_json()?;
            (dict, StageReport::new(Stage::TypeDictionary, Outcome::Reloaded))
        } else {
            self.ensure_type_sources()?;
            let sources = loaded(&self.ctx.type_sources, Stage::TypeDictionary, Stage::TypeSources)?;
            let (dict, read) = build_type_dictionary(sources, self.config.parsing.malformed)?;
            cp.save_json(&dict)?;
            (
                dict,
                StageReport::new(Stage::TypeDictionary, Outcome::Built).read(read),
            )
        };
        self.record(
            report
                .count("entities", dict.len())
                .count("pairs", dict.pair_count()),
        );
        self.ctx.type_dict = Some(dict);
        Ok(())
    }

    fn ensure_schema(&mut self) -> DistillResult<()> {
        if self.ctx.schema.is_some() && self.ctx.vertices.is_some() {
            return Ok(());
        }
        let stale = self.stale();
        let edges_cp = self.checkpoint(Artifact::SchemaEdges);
        let (graph, report) = if edges_cp.usable(stale) {
            let graph = load_schema_edges(&edges_cp)?;
            (graph, StageReport::new(Stage::Schema, Outcome::Reloaded))
        } else {
            self.ensure_type_dict()?;
            let types = loaded(&self.ctx.type_dict, Stage::Schema, Stage::TypeDictionary)?;
            let (graph, stats) = build_schema_graph(
                self.config.sources.relation_pool(),
                types,
                self.config.parsing.malformed,
            )?;
            edges_cp.save_lines(graph.edges())?;
            let report = StageReport::new(Stage::Schema, Outcome::Built)
                .read(stats.read)
                .count("untyped", stats.untyped);
            (graph, report)
        };

        // Vertices are only trusted alongside the edges they were derived from.
        let vertices_cp = self.checkpoint(Artifact::SchemaVertices);
        let vertices = if report.outcome == Outcome::Reloaded && vertices_cp.usable(stale) {
            load_vertices(&vertices_cp)?
        } else {
            let vertices = graph.vertices();
            vertices_cp.save_lines(&vertices)?;
            vertices
        };

        self.record(
            report
                .count("edges", graph.edge_count())
                .count("vertices", vertices.len()),
        );
        self.ctx.schema = Some(graph);
        self.ctx.vertices = Some(vertices);
        Ok(())
    }

    fn write_statistics(&mut self) -> DistillResult<()> {
        let graph = loaded(&self.ctx.schema, Stage::Statistics, Stage::Schema)?;
        let stats = PredicateStats::from_schema(graph);
        stats.save(&self.checkpoint(Artifact::PredicateStats))?;
        for (predicate, edges) in stats.top(5) {
            tracing::debug!(predicate, edges, "frequent schema predicate");
        }
        self.record(
            StageReport::new(Stage::Statistics, Outcome::Built).count("predicates", stats.len()),
        );
        Ok(())
    }

    fn ensure_sample(&mut self) -> DistillResult<()> {
        if self.ctx.sample.is_some() {
            return Ok(());
        }
        let stale = self.stale();
        let spo_cp = self.checkpoint(Artifact::SpoTable);
        let instances_cp = self.checkpoint(Artifact::SampledInstances);
        let (sample, report) = if spo_cp.usable(stale) && instances_cp.usable(stale) {
            let spo: SpoTable = spo_cp.load_json()?;
            let instances = instances_cp.load_set()?;
            (
                InstanceSample::from_parts(spo, instances),
                StageReport::new(Stage::Sample, Outcome::Reloaded),
            )
        } else {
            let sampling = self.config.sampling;
            let (sample, read) = sample_instances(
                self.config.sources.relation_pool(),
                sampling.instance_cap,
                sampling.boundary,
                self.config.parsing.malformed,
            )?;
            spo_cp.save_json(&sample.spo)?;
            instances_cp.save_lines(&sample.instances)?;
            (sample, StageReport::new(Stage::Sample, Outcome::Built).read(read))
        };
        self.record(
            report
                .count("instances", sample.instances.len())
                .count("edges", sample.new_edges),
        );
        self.ctx.sample = Some(sample);
        Ok(())
    }

    fn ensure_sampled_types(&mut self) -> DistillResult<()> {
        if self.ctx.sampled_types.is_some() {
            return Ok(());
        }
        let cp = self.checkpoint(Artifact::SampledTypes);
        let (sampled, outcome) = if cp.usable(self.stale()) {
            (SampledTypes::from_dict(cp.load_json()?), Outcome::Reloaded)
        } else {
            self.ensure_sample()?;
            self.ensure_type_dict()?;
            let types = loaded(&self.ctx.type_dict, Stage::SampledTypes, Stage::TypeDictionary)?;
            let sample = loaded(&self.ctx.sample, Stage::SampledTypes, Stage::Sample)?;
            let sampled = sample_types(types, &sample.instances);
            cp.save_json(&sampled.dict)?;
            (sampled, Outcome::Built)
        };
        self.record(
            StageReport::new(Stage::SampledTypes, outcome)
                .count("typed instances", sampled.dict.len())
                .count("pairs", sampled.pair_count),
        );
        self.ctx.sampled_types = Some(sampled);
        Ok(())
    }

    /// Schema vertices first, then types only reachable from the sample.
    fn ensure_type_ids(&mut self) -> DistillResult<()> {
        if self.ctx.type_ids.is_some() {
            return Ok(());
        }
        self.ensure_schema()?;
        self.ensure_sampled_types()?;
        let vertices = loaded(&self.ctx.vertices, Stage::TypeIds, Stage::Schema)?;
        let sampled = loaded(&self.ctx.sampled_types, Stage::TypeIds, Stage::SampledTypes)?;
        let path = Artifact::TypeIds.path(&self.layout);
        let outcome = if path.is_file() {
            Outcome::Reloaded
        } else {
            Outcome::Built
        };
        let names = vertices.iter().map(String::as_str).chain(sampled.types());
        let (ids, added) = IdRegistry::open_and_assign(Namespace::Type, path, names)?;
        self.record(
            StageReport::new(Stage::TypeIds, outcome)
                .count("ids", ids.len())
                .count("assigned", added),
        );
        self.ctx.type_ids = Some(ids);
        Ok(())
    }

    fn ensure_instance_ids(&mut self) -> DistillResult<()> {
        if self.ctx.instance_ids.is_some() {
            return Ok(());
        }
        self.ensure_sample()?;
        let sample = loaded(&self.ctx.sample, Stage::InstanceIds, Stage::Sample)?;
        let path = Artifact::InstanceIds.path(&self.layout);
        let outcome = if path.is_file() {
            Outcome::Reloaded
        } else {
            Outcome::Built
        };
        let names = sample.instances.iter().map(String::as_str);
        let (ids, added) = IdRegistry::open_and_assign(Namespace::Instance, path, names)?;
        self.record(
            StageReport::new(Stage::InstanceIds, outcome)
                .count("ids", ids.len())
                .count("assigned", added),
        );
        self.ctx.instance_ids = Some(ids);
        Ok(())
    }

    fn write_tables(&mut self) -> DistillResult<()> {
        let sources = ExportSources {
            schema: loaded(&self.ctx.schema, Stage::Export, Stage::Schema)?,
            vertices: loaded(&self.ctx.vertices, Stage::Export, Stage::Schema)?,
            sample: loaded(&self.ctx.sample, Stage::Export, Stage::Sample)?,
            sampled_types: loaded(&self.ctx.sampled_types, Stage::Export, Stage::SampledTypes)?,
            type_ids: loaded(&self.ctx.type_ids, Stage::Export, Stage::TypeIds)?,
            instance_ids: loaded(&self.ctx.instance_ids, Stage::Export, Stage::InstanceIds)?,
        };
        let tables = export_all(&self.layout, &sources, &self.config.features)?;
        let report = tables.iter().fold(
            StageReport::new(Stage::Export, Outcome::Built),
            |report, table| {
                let name = table
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| table.path.display().to_string());
                report.count(name, table.rows)
            },
        );
        self.record(report);
        Ok(())
    }
}
