//! Pipeline configuration: sources, output layout, sampling, and feature switches.
//!
//! The configuration is persisted as TOML (`kgd.toml` by default) and resolved
//! once, before the pipeline is constructed. Every component receives the parts
//! it needs explicitly; nothing reads configuration from global state.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or saving configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(kgd::config::read),
        help("Ensure the config file exists, or create one with `kgd init`.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(kgd::config::parse),
        help("Check the TOML syntax in the config file. {message}")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(kgd::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(kgd::config::invalid), help("{help}"))]
    Invalid { message: String, help: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What the triple reader does with a line that has fewer than three fields
/// or is not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the stage with `MalformedLine` or `InvalidEncoding`.
    #[default]
    Fail,
    /// Log a warning, count the line, and continue.
    Skip,
}

/// How the instance sampler behaves when the instance cap is reached mid-triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapBoundary {
    /// Admit entities one at a time and stop at the first one that does not fit,
    /// even if that leaves the current triple half-absorbed.
    Truncate,
    /// Admit a triple whole or not at all.
    #[default]
    Atomic,
}

impl std::fmt::Display for CapBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapBoundary::Truncate => write!(f, "truncate"),
            CapBoundary::Atomic => write!(f, "atomic"),
        }
    }
}

impl std::str::FromStr for CapBoundary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "truncate" => Ok(CapBoundary::Truncate),
            "atomic" => Ok(CapBoundary::Atomic),
            other => Err(format!(
                "unknown cap boundary \"{other}\" (expected `truncate` or `atomic`)"
            )),
        }
    }
}

/// What a stage does when a checkpoint's fingerprint no longer matches its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Reuse the checkpoint silently.
    Accept,
    /// Reuse the checkpoint and log a warning.
    #[default]
    Warn,
    /// Discard the checkpoint and recompute the stage.
    Rebuild,
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Named boolean switches that shape the exported tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Use the raw predicate as the relationship type instead of a fixed tag.
    PredicateEdgeKind,
    /// Put type names on instance vertices instead of emitting instance→type edges.
    TypeLabels,
    /// Only export instance→instance edges whose subject has known types.
    SampledOnly,
    /// Dump predicate usage statistics for the schema graph.
    SchemaStatistics,
    /// Also write the id-only instance vertex table.
    MinimalInstanceNodes,
    /// Also write instance vertices with their type id lists.
    InstanceTypeNodes,
    /// Also write id-free CSV copies of the schema edges and vertices.
    PlainSchemaCsv,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::PredicateEdgeKind,
        Feature::TypeLabels,
        Feature::SampledOnly,
        Feature::SchemaStatistics,
        Feature::MinimalInstanceNodes,
        Feature::InstanceTypeNodes,
        Feature::PlainSchemaCsv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::PredicateEdgeKind => "predicate-edge-kind",
            Feature::TypeLabels => "type-labels",
            Feature::SampledOnly => "sampled-only",
            Feature::SchemaStatistics => "schema-statistics",
            Feature::MinimalInstanceNodes => "minimal-instance-nodes",
            Feature::InstanceTypeNodes => "instance-type-nodes",
            Feature::PlainSchemaCsv => "plain-schema-csv",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Feature::ALL.iter().map(|f| f.name()).collect();
                format!("unknown feature \"{s}\" (known: {})", known.join(", "))
            })
    }
}

/// Resolved feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Features {
    pub predicate_edge_kind: bool,
    pub type_labels: bool,
    pub sampled_only: bool,
    pub schema_statistics: bool,
    pub minimal_instance_nodes: bool,
    pub instance_type_nodes: bool,
    pub plain_schema_csv: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            predicate_edge_kind: true,
            type_labels: false,
            sampled_only: true,
            schema_statistics: true,
            minimal_instance_nodes: false,
            instance_type_nodes: true,
            plain_schema_csv: false,
        }
    }
}

impl Features {
    /// Whether a feature is on.
    pub fn enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::PredicateEdgeKind => self.predicate_edge_kind,
            Feature::TypeLabels => self.type_labels,
            Feature::SampledOnly => self.sampled_only,
            Feature::SchemaStatistics => self.schema_statistics,
            Feature::MinimalInstanceNodes => self.minimal_instance_nodes,
            Feature::InstanceTypeNodes => self.instance_type_nodes,
            Feature::PlainSchemaCsv => self.plain_schema_csv,
        }
    }

    /// Turn a feature on or off.
    pub fn set(&mut self, feature: Feature, on: bool) {
        let slot = match feature {
            Feature::PredicateEdgeKind => &mut self.predicate_edge_kind,
            Feature::TypeLabels => &mut self.type_labels,
            Feature::SampledOnly => &mut self.sampled_only,
            Feature::SchemaStatistics => &mut self.schema_statistics,
            Feature::MinimalInstanceNodes => &mut self.minimal_instance_nodes,
            Feature::InstanceTypeNodes => &mut self.instance_type_nodes,
            Feature::PlainSchemaCsv => &mut self.plain_schema_csv,
        };
        *slot = on;
    }

    /// Builder-style variant of [`Features::set`].
    pub fn with(mut self, feature: Feature, on: bool) -> Self {
        self.set(feature, on);
        self
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where the raw triples come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Type-assertion sources (`<s> <…#type> <T> .`).
    pub type_files: Vec<PathBuf>,
    /// Relationship sources used for both the schema graph and the sampler.
    pub relation_files: Vec<PathBuf>,
    /// Link-file pool, used instead of `relation_files` when `use_link_files` is on.
    pub link_files: Vec<PathBuf>,
    /// Use `link_files` as the relationship pool and scan them for extra type sources.
    pub use_link_files: bool,
}

impl SourcesConfig {
    /// The relationship pool in effect.
    pub fn relation_pool(&self) -> &[PathBuf] {
        if self.use_link_files {
            &self.link_files
        } else {
            &self.relation_files
        }
    }
}

/// Output directories and naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Final artifacts: schema text files, id maps, CSV tables.
    pub out_dir: PathBuf,
    /// Intermediate checkpoints.
    pub dump_dir: PathBuf,
    /// Dataset prefix for the schema files.
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            dump_dir: PathBuf::from("dump"),
            prefix: "dbpedia_local".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Maximum number of distinct instances in the sample.
    pub instance_cap: usize,
    pub boundary: CapBoundary,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            instance_cap: 100_000,
            boundary: CapBoundary::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub malformed: MalformedPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub stale: StalePolicy,
}

/// Complete pipeline configuration, persisted as TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sources: SourcesConfig,
    pub output: OutputConfig,
    pub sampling: SamplingConfig,
    pub parsing: ParsingConfig,
    pub checkpoints: CheckpointConfig,
    pub features: Features,
}

impl PipelineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject configurations no stage can run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sampling.instance_cap == 0 {
            return Err(ConfigError::Invalid {
                message: "sampling.instance_cap must be > 0".into(),
                help: "Set `instance_cap` under `[sampling]` to the number of instances to keep."
                    .into(),
            });
        }
        if self.output.prefix.trim().is_empty() || self.output.prefix.contains('/') {
            return Err(ConfigError::Invalid {
                message: format!("output.prefix \"{}\" is not a file name", self.output.prefix),
                help: "Use a plain name such as `dbpedia_local`.".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kgd.toml");

        let mut config = PipelineConfig::default();
        config.sources.type_files = vec![PathBuf::from("types.ttl")];
        config.sampling.instance_cap = 50;
        config.features.set(Feature::TypeLabels, true);
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.sources.type_files, vec![PathBuf::from("types.ttl")]);
        assert_eq!(loaded.sampling.instance_cap, 50);
        assert!(loaded.features.type_labels);
        assert_eq!(loaded.sampling.boundary, CapBoundary::Atomic);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [sampling]
            boundary = "truncate"

            [features]
            type-labels = true
            "#,
        )
        .unwrap();
        assert_eq!(config.sampling.instance_cap, 100_000);
        assert_eq!(config.sampling.boundary, CapBoundary::Truncate);
        assert!(config.features.type_labels);
        assert!(config.features.predicate_edge_kind);
        assert_eq!(config.parsing.malformed, MalformedPolicy::Fail);
        assert_eq!(config.checkpoints.stale, StalePolicy::Warn);
    }

    #[test]
    fn zero_cap_is_rejected() {
        let mut config = PipelineConfig::default();
        config.sampling.instance_cap = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn feature_names_parse_back() {
        for feature in Feature::ALL {
            let parsed: Feature = feature.name().parse().unwrap();
            assert_eq!(parsed, feature);
        }
        assert!("no-such-feature".parse::<Feature>().is_err());
    }

    #[test]
    fn set_and_enabled_agree() {
        let mut features = Features::default();
        for feature in Feature::ALL {
            features.set(feature, true);
            assert!(features.enabled(feature));
            features.set(feature, false);
            assert!(!features.enabled(feature));
        }
    }

    #[test]
    fn link_pool_replaces_relation_pool() {
        let mut sources = SourcesConfig {
            relation_files: vec![PathBuf::from("objects.ttl")],
            link_files: vec![PathBuf::from("links.ttl")],
            ..Default::default()
        };
        assert_eq!(sources.relation_pool(), &[PathBuf::from("objects.ttl")]);
        sources.use_link_files = true;
        assert_eq!(sources.relation_pool(), &[PathBuf::from("links.ttl")]);
    }
}
