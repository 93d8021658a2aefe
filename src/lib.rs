// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # kg-distill
//!
//! Distills large subject-predicate-object dumps into a type-level schema graph
//! and a size-bounded sample of the instance graph, exported as bulk-import CSV.
//!
//! ## Architecture
//!
//! - **Triple reader** (`triple`): streaming `<s> <p> <o> .` line parser
//! - **Type dictionary** (`type_dict`): entity → set of types
//! - **Schema graph** (`schema`): type → predicate → types, by type cross-product
//! - **Instance sampler** (`sampler`): bounded subject → predicate → objects table
//! - **Join** (`join`): the type dictionary restricted to the sample
//! - **Id registries** (`registry`): stable name ↔ id maps, one per namespace
//! - **Exporters** (`export`): neo4j-admin style CSV tables
//! - **Checkpoints** (`checkpoint`): fingerprinted build-or-reload stage outputs
//! - **Pipeline** (`pipeline`): explicit context and stage sequencing
//!
//! ## Library usage
//!
//! ```no_run
//! use kg_distill::config::PipelineConfig;
//! use kg_distill::pipeline::Pipeline;
//!
//! let mut config = PipelineConfig::default();
//! config.sources.type_files = vec!["instance_types_en.ttl".into()];
//! config.sources.relation_files = vec!["mappingbased_objects_en.ttl".into()];
//!
//! let mut pipeline = Pipeline::new(config).unwrap();
//! for report in pipeline.run().unwrap() {
//!     println!("{report}");
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod export;
pub mod join;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod sampler;
pub mod schema;
pub mod stats;
pub mod triple;
pub mod type_dict;
