//! Rich diagnostic error types for the kg-distill pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;

/// Top-level error type for the kg-distill pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum DistillError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InputError {
    #[error("input file not found: {path}")]
    #[diagnostic(
        code(kgd::input::missing_file),
        help(
            "A required triple source or prerequisite checkpoint does not exist. \
             Check the `[sources]` section of your config, or run the earlier \
             stage (`kgd schema` / `kgd sample`) first."
        )
    )]
    MissingInputFile { path: String },

    #[error("malformed triple at {path}:{line}: expected 3 fields, found {fields}")]
    #[diagnostic(
        code(kgd::input::malformed_line),
        help(
            "Each line must look like `<subject> <predicate> <object> .`. \
             Fix the source file, or set `parsing.malformed = \"skip\"` to skip \
             such lines with a warning."
        )
    )]
    MalformedLine {
        path: String,
        line: usize,
        fields: usize,
    },

    #[error("line {line} of {path} is not valid UTF-8")]
    #[diagnostic(
        code(kgd::input::invalid_encoding),
        help(
            "Triple sources must be UTF-8 text. Re-encode the file, or set \
             `parsing.malformed = \"skip\"` to skip such lines with a warning."
        )
    )]
    InvalidEncoding { path: String, line: usize },

    #[error("failed to read {path}")]
    #[diagnostic(
        code(kgd::input::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Checkpoint errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path}")]
    #[diagnostic(
        code(kgd::checkpoint::read),
        help("Check the file permissions, or delete the checkpoint to rebuild it.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write checkpoint {path}")]
    #[diagnostic(
        code(kgd::checkpoint::write),
        help(
            "A filesystem operation failed. Check that the output directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt checkpoint {path}: {message}")]
    #[diagnostic(
        code(kgd::checkpoint::corrupt),
        help(
            "The checkpoint could not be parsed. It may be truncated from an \
             interrupted run. Delete it and rerun the stage to rebuild it."
        )
    )]
    Corrupt { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("no {namespace} id registered for \"{name}\"")]
    #[diagnostic(
        code(kgd::registry::lookup_miss),
        help(
            "An export asked for the id of a name that was never assigned one. \
             This means ids were assigned before the data they cover was final; \
             delete the `*_node_name_id_map.txt` files together with the exports \
             and rerun `kgd run`."
        )
    )]
    LookupMiss { namespace: String, name: String },

    #[error("malformed registry entry at {path}:{line}")]
    #[diagnostic(
        code(kgd::registry::malformed_entry),
        help(
            "Registry files hold one `name id` pair per line, with a non-negative \
             integer id below 18446744073709551615."
        )
    )]
    MalformedEntry { path: String, line: usize },

    #[error("id {id} assigned twice in {path} (\"{first}\" and \"{second}\")")]
    #[diagnostic(
        code(kgd::registry::duplicate_id),
        help(
            "A registry file must be a bijection between names and ids. \
             The file was edited by hand or concatenated from two runs."
        )
    )]
    DuplicateId {
        path: String,
        id: u64,
        first: String,
        second: String,
    },
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("failed to write {path}: {message}")]
    #[diagnostic(
        code(kgd::export::write),
        help("Check that the output directory exists and that the disk is not full.")
    )]
    Write { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("stage `{stage}` ran before `{requires}`")]
    #[diagnostic(
        code(kgd::pipeline::stage_order),
        help("Run the full pipeline with `kgd run`, or the missing stage first.")
    )]
    StageOrder {
        stage: &'static str,
        requires: &'static str,
    },

    #[error("failed to create directory {path}")]
    #[diagnostic(
        code(kgd::pipeline::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for functions returning kg-distill results.
pub type DistillResult<T> = std::result::Result<T, DistillError>;
