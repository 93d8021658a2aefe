//! File layout for checkpoints and exports.
//!
//! [`OutputLayout`] resolves every file the pipeline reads back or writes from
//! the `[output]` config section. Final artifacts go under `out_dir`,
//! intermediate checkpoints under `dump_dir`.

use std::path::PathBuf;

use crate::config::OutputConfig;
use crate::error::{DistillResult, PipelineError};

/// Resolved paths of every pipeline artifact.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// `out/`
    pub out_dir: PathBuf,
    /// `dump/`
    pub dump_dir: PathBuf,
    /// `dump/additional_type_files.txt`
    pub discovered_type_files: PathBuf,
    /// `dump/type_dict.json`
    pub type_dict: PathBuf,
    /// `out/<prefix>_schema_edges.txt`
    pub schema_edges: PathBuf,
    /// `out/<prefix>_schema_vertices.txt`
    pub schema_vertices: PathBuf,
    /// `dump/predicates.txt`
    pub predicates: PathBuf,
    /// `dump/spo_table.json`
    pub spo_table: PathBuf,
    /// `dump/sampled_instances.txt`
    pub sampled_instances: PathBuf,
    /// `dump/sampled_type_dict.json`
    pub sampled_type_dict: PathBuf,
    /// `out/type_node_name_id_map.txt`
    pub type_ids: PathBuf,
    /// `out/instance_node_name_id_map.txt`
    pub instance_ids: PathBuf,
    /// `out/<prefix>_schema_edges.csv`
    pub schema_edges_csv: PathBuf,
    /// `out/<prefix>_schema_vertices.csv`
    pub schema_vertices_csv: PathBuf,
    /// `out/type_nodes.csv`
    pub type_nodes_csv: PathBuf,
    /// `out/type_type_relationships.csv`
    pub type_type_csv: PathBuf,
    /// `out/instance_nodes.csv`
    pub instance_nodes_csv: PathBuf,
    /// `out/minimum_instance_nodes.csv`
    pub minimal_instance_nodes_csv: PathBuf,
    /// `out/instance_type_nodes.csv`
    pub instance_type_nodes_csv: PathBuf,
    /// `out/instance_instance_relationships.csv`
    pub instance_instance_csv: PathBuf,
    /// `out/instance_type_relationships.csv`
    pub instance_type_csv: PathBuf,
}

impl OutputLayout {
    /// Resolve the layout from the output config.
    pub fn new(config: &OutputConfig) -> Self {
        let out = config.out_dir.clone();
        let dump = config.dump_dir.clone();
        let prefix = &config.prefix;
        Self {
            discovered_type_files: dump.join("additional_type_files.txt"),
            type_dict: dump.join("type_dict.json"),
            schema_edges: out.join(format!("{prefix}_schema_edges.txt")),
            schema_vertices: out.join(format!("{prefix}_schema_vertices.txt")),
            predicates: dump.join("predicates.txt"),
            spo_table: dump.join("spo_table.json"),
            sampled_instances: dump.join("sampled_instances.txt"),
            sampled_type_dict: dump.join("sampled_type_dict.json"),
            type_ids: out.join("type_node_name_id_map.txt"),
            instance_ids: out.join("instance_node_name_id_map.txt"),
            schema_edges_csv: out.join(format!("{prefix}_schema_edges.csv")),
            schema_vertices_csv: out.join(format!("{prefix}_schema_vertices.csv")),
            type_nodes_csv: out.join("type_nodes.csv"),
            type_type_csv: out.join("type_type_relationships.csv"),
            instance_nodes_csv: out.join("instance_nodes.csv"),
            minimal_instance_nodes_csv: out.join("minimum_instance_nodes.csv"),
            instance_type_nodes_csv: out.join("instance_type_nodes.csv"),
            instance_instance_csv: out.join("instance_instance_relationships.csv"),
            instance_type_csv: out.join("instance_type_relationships.csv"),
            out_dir: out,
            dump_dir: dump,
        }
    }

    /// Create the output and checkpoint directories. Idempotent.
    pub fn ensure_dirs(&self) -> DistillResult<()> {
        for dir in [&self.out_dir, &self.dump_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_uses_prefix_and_dirs() {
        let config = OutputConfig {
            out_dir: PathBuf::from("/tmp/kgd/out"),
            dump_dir: PathBuf::from("/tmp/kgd/dump"),
            prefix: "wiki".into(),
        };
        let layout = OutputLayout::new(&config);

        assert_eq!(
            layout.schema_edges,
            PathBuf::from("/tmp/kgd/out/wiki_schema_edges.txt")
        );
        assert_eq!(
            layout.schema_vertices_csv,
            PathBuf::from("/tmp/kgd/out/wiki_schema_vertices.csv")
        );
        assert_eq!(layout.type_dict, PathBuf::from("/tmp/kgd/dump/type_dict.json"));
        assert_eq!(
            layout.instance_ids,
            PathBuf::from("/tmp/kgd/out/instance_node_name_id_map.txt")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = OutputLayout::new(&OutputConfig {
            out_dir: dir.path().join("out"),
            dump_dir: dir.path().join("dump"),
            prefix: "t".into(),
        });

        layout.ensure_dirs().unwrap();
        layout.ensure_dirs().unwrap();
        assert!(layout.out_dir.is_dir());
        assert!(layout.dump_dir.is_dir());
    }
}
