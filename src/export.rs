//! Bulk-import CSV tables.
//!
//! Each table is a header row followed by one row per node or relationship,
//! in the column conventions of `neo4j-admin import`: ids are bare integers,
//! names are wrapped in double quotes, labels and relationship types are bare.
//!
//! Exporters only read; every id comes from an [`IdRegistry`] and a name
//! missing from it aborts the export with `LookupMiss`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};

use crate::config::Features;
use crate::error::{DistillResult, ExportError};
use crate::join::SampledTypes;
use crate::paths::OutputLayout;
use crate::registry::{IdRegistry, Namespace};
use crate::sampler::InstanceSample;
use crate::schema::SchemaGraph;

/// Relationship type of type → type rows when the predicate is not used.
pub const TYPE_TYPE_KIND: &str = "TypeType";
/// Relationship type of instance → instance rows when the predicate is not used.
pub const INST_INST_KIND: &str = "InstInst";
/// Relationship type of instance → type rows.
pub const HAS_ONTOLOGY_KIND: &str = "HasOntology";

/// Wrap a string value in double quotes, doubling any embedded quote.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// One CSV file being written. Fields are written verbatim; callers quote
/// string values with [`quote`].
struct Table {
    path: PathBuf,
    writer: csv::Writer<std::fs::File>,
    rows: usize,
}

impl Table {
    fn create(path: &Path, header: &[&str]) -> DistillResult<Self> {
        let writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Never)
            .from_path(path)
            .map_err(|e| write_error(path, e))?;
        let mut table = Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        };
        table
            .writer
            .write_record(header)
            .map_err(|e| write_error(path, e))?;
        Ok(table)
    }

    fn row<I, T>(&mut self, fields: I) -> DistillResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(fields)
            .map_err(|e| write_error(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    fn finish(mut self) -> DistillResult<TableReport> {
        self.writer
            .flush()
            .map_err(|e| write_error(&self.path, e))?;
        tracing::info!(path = %self.path.display(), rows = self.rows, "table written");
        Ok(TableReport {
            path: self.path,
            rows: self.rows,
        })
    }
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> ExportError {
    ExportError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// A finished table and its data row count (header excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub path: PathBuf,
    pub rows: usize,
}

/// Everything an export run reads.
#[derive(Debug, Clone, Copy)]
pub struct ExportSources<'a> {
    pub schema: &'a SchemaGraph,
    pub vertices: &'a BTreeSet<String>,
    pub sample: &'a InstanceSample,
    pub sampled_types: &'a SampledTypes,
    pub type_ids: &'a IdRegistry,
    pub instance_ids: &'a IdRegistry,
}

impl ExportSources<'_> {
    /// Instances that get a vertex row: the typed ones under `type-labels`,
    /// otherwise the whole sample.
    fn exported_instances(&self, features: &Features) -> Box<dyn Iterator<Item = &str> + '_> {
        if features.type_labels {
            Box::new(self.sampled_types.dict.iter().map(|(inst, _)| inst))
        } else {
            Box::new(self.sample.instances.iter().map(String::as_str))
        }
    }
}

fn id_header(kind: &str, namespace: Namespace) -> String {
    format!("{kind}({namespace})")
}

// ---------------------------------------------------------------------------
// Type tables
// ---------------------------------------------------------------------------

/// `type_nodes.csv`: every registered type, in id order.
pub fn write_type_nodes(path: &Path, type_ids: &IdRegistry) -> DistillResult<TableReport> {
    let header = id_header(":ID", Namespace::Type);
    let mut table = Table::create(path, &[header.as_str(), ":LABEL", "Name"])?;
    for (name, id) in type_ids.iter() {
        table.row([id.to_string(), Namespace::Type.to_string(), quote(name)])?;
    }
    table.finish()
}

/// `type_type_relationships.csv`: one row per schema edge.
pub fn write_type_type_relationships(
    path: &Path,
    schema: &SchemaGraph,
    type_ids: &IdRegistry,
    features: &Features,
) -> DistillResult<TableReport> {
    let start = id_header(":START_ID", Namespace::Type);
    let end = id_header(":END_ID", Namespace::Type);
    let mut header = vec![start.as_str(), end.as_str(), ":TYPE", "Start", "End"];
    if !features.predicate_edge_kind {
        header.push("Predicate");
    }
    let mut table = Table::create(path, &header)?;

    for edge in schema.edges() {
        let mut row = vec![
            type_ids.id_of(edge.subject_type)?.to_string(),
            type_ids.id_of(edge.object_type)?.to_string(),
        ];
        if features.predicate_edge_kind {
            row.push(edge.predicate.to_owned());
        } else {
            row.push(TYPE_TYPE_KIND.to_owned());
        }
        row.push(quote(edge.subject_type));
        row.push(quote(edge.object_type));
        if !features.predicate_edge_kind {
            row.push(quote(edge.predicate));
        }
        table.row(row)?;
    }
    table.finish()
}

/// Id-free `<prefix>_schema_edges.csv` and `<prefix>_schema_vertices.csv`.
pub fn write_plain_schema(
    edges_path: &Path,
    vertices_path: &Path,
    schema: &SchemaGraph,
    vertices: &BTreeSet<String>,
) -> DistillResult<(TableReport, TableReport)> {
    let mut edges = Table::create(edges_path, &["START_TYPE", "PROPERTY_TYPE", "END_TYPE"])?;
    for edge in schema.edges() {
        edges.row([
            quote(edge.subject_type),
            quote(edge.predicate),
            quote(edge.object_type),
        ])?;
    }
    let mut labels = Table::create(vertices_path, &["LABEL_TYPE"])?;
    for vertex in vertices {
        labels.row([quote(vertex)])?;
    }
    Ok((edges.finish()?, labels.finish()?))
}

// ---------------------------------------------------------------------------
// Instance tables
// ---------------------------------------------------------------------------

/// `instance_nodes.csv`.
pub fn write_instance_nodes(
    path: &Path,
    sources: &ExportSources<'_>,
    features: &Features,
) -> DistillResult<TableReport> {
    let header = id_header(":ID", Namespace::Instance);
    let mut table = Table::create(path, &[header.as_str(), "Name", ":LABEL"])?;
    for inst in sources.exported_instances(features) {
        let mut label = Namespace::Instance.to_string();
        if features.type_labels
            && let Some(types) = sources.sampled_types.dict.types_of(inst)
        {
            for ty in types {
                label.push(';');
                label.push_str(ty);
            }
        }
        table.row([
            sources.instance_ids.id_of(inst)?.to_string(),
            quote(inst),
            label,
        ])?;
    }
    table.finish()
}

/// `minimum_instance_nodes.csv`: the instance vertex ids alone.
pub fn write_minimal_instance_nodes(
    path: &Path,
    sources: &ExportSources<'_>,
    features: &Features,
) -> DistillResult<TableReport> {
    let header = id_header(":ID", Namespace::Instance);
    let mut table = Table::create(path, &[header.as_str()])?;
    for inst in sources.exported_instances(features) {
        table.row([sources.instance_ids.id_of(inst)?.to_string()])?;
    }
    table.finish()
}

/// `instance_type_nodes.csv`: typed instances with their type ids joined by `;`.
pub fn write_instance_type_nodes(
    path: &Path,
    sampled: &SampledTypes,
    instance_ids: &IdRegistry,
    type_ids: &IdRegistry,
) -> DistillResult<TableReport> {
    let header = id_header(":ID", Namespace::Instance);
    let mut table = Table::create(path, &[header.as_str(), "Name", "TypeIdList"])?;
    for (inst, types) in sampled.dict.iter() {
        let ids = types
            .iter()
            .map(|ty| type_ids.id_of(ty).map(|id| id.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        table.row([
            instance_ids.id_of(inst)?.to_string(),
            quote(inst),
            ids.join(";"),
        ])?;
    }
    table.finish()
}

/// `instance_instance_relationships.csv`: one row per sampled edge.
pub fn write_instance_instance_relationships(
    path: &Path,
    sources: &ExportSources<'_>,
    features: &Features,
) -> DistillResult<TableReport> {
    let start = id_header(":START_ID", Namespace::Instance);
    let end = id_header(":END_ID", Namespace::Instance);
    let mut header = vec![start.as_str(), end.as_str(), ":TYPE", "Start", "End"];
    if !features.predicate_edge_kind {
        header.push("Predicate");
    }
    let mut table = Table::create(path, &header)?;

    let ids = sources.instance_ids;
    for (s, p, o) in sources.sample.spo.edges() {
        if features.sampled_only && !sources.sampled_types.dict.contains(s) {
            continue;
        }
        let kind = if features.predicate_edge_kind { p } else { INST_INST_KIND };
        let mut row = vec![
            ids.id_of(s)?.to_string(),
            ids.id_of(o)?.to_string(),
            kind.to_owned(),
            quote(s),
            quote(o),
        ];
        if !features.predicate_edge_kind {
            row.push(quote(p));
        }
        table.row(row)?;
    }
    table.finish()
}

/// `instance_type_relationships.csv`: one `HasOntology` row per sampled
/// (instance, type) pair.
pub fn write_instance_type_relationships(
    path: &Path,
    sampled: &SampledTypes,
    instance_ids: &IdRegistry,
    type_ids: &IdRegistry,
) -> DistillResult<TableReport> {
    let start = id_header(":START_ID", Namespace::Instance);
    let end = id_header(":END_ID", Namespace::Type);
    let mut table = Table::create(path, &[start.as_str(), end.as_str(), ":TYPE", "Start", "End"])?;
    for (inst, types) in sampled.dict.iter() {
        let inst_id = instance_ids.id_of(inst)?;
        for ty in types {
            table.row([
                inst_id.to_string(),
                type_ids.id_of(ty)?.to_string(),
                HAS_ONTOLOGY_KIND.to_owned(),
                quote(inst),
                quote(ty),
            ])?;
        }
    }
    table.finish()
}

// ---------------------------------------------------------------------------
// Whole export
// ---------------------------------------------------------------------------

/// Write every table the features ask for. Returns one report per file, in
/// the order written.
pub fn export_all(
    layout: &OutputLayout,
    sources: &ExportSources<'_>,
    features: &Features,
) -> DistillResult<Vec<TableReport>> {
    let mut tables = vec![
        write_type_nodes(&layout.type_nodes_csv, sources.type_ids)?,
        write_type_type_relationships(
            &layout.type_type_csv,
            sources.schema,
            sources.type_ids,
            features,
        )?,
    ];
    if features.plain_schema_csv {
        let (edges, vertices) = write_plain_schema(
            &layout.schema_edges_csv,
            &layout.schema_vertices_csv,
            sources.schema,
            sources.vertices,
        )?;
        tables.push(edges);
        tables.push(vertices);
    }

    tables.push(write_instance_nodes(
        &layout.instance_nodes_csv,
        sources,
        features,
    )?);
    if features.minimal_instance_nodes {
        tables.push(write_minimal_instance_nodes(
            &layout.minimal_instance_nodes_csv,
            sources,
            features,
        )?);
    }
    if features.instance_type_nodes {
        tables.push(write_instance_type_nodes(
            &layout.instance_type_nodes_csv,
            sources.sampled_types,
            sources.instance_ids,
            sources.type_ids,
        )?);
    }
    tables.push(write_instance_instance_relationships(
        &layout.instance_instance_csv,
        sources,
        features,
    )?);
    if features.type_labels {
        tracing::info!("type labels are on; skipping instance → type relationships");
    } else {
        tables.push(write_instance_type_relationships(
            &layout.instance_type_csv,
            sources.sampled_types,
            sources.instance_ids,
            sources.type_ids,
        )?);
    }
    Ok(tables)
}
