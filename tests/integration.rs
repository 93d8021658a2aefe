//! End-to-end tests: raw triple files in, schema files and CSV tables out.

use std::path::PathBuf;

use kg_distill::config::{CapBoundary, Feature, MalformedPolicy, OutputConfig, PipelineConfig};
use kg_distill::error::{DistillError, InputError};
use kg_distill::pipeline::{Outcome, Pipeline, Stage};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

fn type_line(entity: &str, ty: &str) -> String {
    format!("<http://e/{entity}> <{RDF_TYPE}> <http://t/{ty}> .\n")
}

fn rel_line(s: &str, p: &str, o: &str) -> String {
    format!("<http://e/{s}> <http://p/{p}> <http://e/{o}> .\n")
}

/// Types {A:[T1], B:[T2], C:[T1], D:[T2], E:[T3]}, F untyped.
fn types_text() -> String {
    [("A", "T1"), ("B", "T2"), ("C", "T1"), ("D", "T2"), ("E", "T3")]
        .iter()
        .map(|(e, t)| type_line(e, t))
        .collect()
}

fn relations_text() -> String {
    [("A", "p1", "B"), ("C", "p1", "D"), ("E", "p2", "F")]
        .iter()
        .map(|(s, p, o)| rel_line(s, p, o))
        .collect()
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new(types: &str, relations: &str) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("types.ttl"), types).unwrap();
        std::fs::write(dir.path().join("relations.nt"), relations).unwrap();
        Self { dir }
    }

    fn scenario() -> Self {
        Self::new(&types_text(), &relations_text())
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sources.type_files = vec![self.path("types.ttl")];
        config.sources.relation_files = vec![self.path("relations.nt")];
        config.output = OutputConfig {
            out_dir: self.path("out"),
            dump_dir: self.path("dump"),
            prefix: "test".into(),
        };
        config
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    fn csv_rows(&self, name: &str) -> Vec<String> {
        self.read(&format!("out/{name}"))
            .lines()
            .skip(1)
            .map(str::to_owned)
            .collect()
    }
}

fn run(config: PipelineConfig) -> Pipeline {
    let mut pipeline = Pipeline::new(config).unwrap();
    pipeline.run().unwrap();
    pipeline
}

#[test]
fn schema_scenario_yields_single_edge() {
    let ws = Workspace::scenario();
    let mut pipeline = Pipeline::new(ws.config()).unwrap();
    let reports = pipeline.run_schema().unwrap();

    assert_eq!(
        ws.read("out/test_schema_edges.txt"),
        "http://t/T1 http://p/p1 http://t/T2\n"
    );
    assert_eq!(
        ws.read("out/test_schema_vertices.txt"),
        "http://t/T1\nhttp://t/T2\n"
    );
    assert_eq!(ws.read("dump/predicates.txt"), "http://p/p1 1\n");

    let schema = reports.iter().find(|r| r.stage == Stage::Schema).unwrap();
    assert_eq!(schema.outcome, Outcome::Built);
    assert_eq!(schema.get("edges"), Some(1));
    // (E, p2, F): F has no types.
    assert_eq!(schema.get("untyped"), Some(1));
}

#[test]
fn full_run_tables_have_expected_cardinality() {
    let ws = Workspace::scenario();
    let pipeline = run(ws.config());

    let sample = pipeline.context().sample.as_ref().unwrap();
    let sampled = pipeline.context().sampled_types.as_ref().unwrap();
    assert_eq!(sample.instances.len(), 6);
    assert_eq!(sample.new_edges, 3);
    assert_eq!(sampled.pair_count, 5);

    // T1, T2 from the schema, then T3 through the sample.
    assert_eq!(
        ws.read("out/type_node_name_id_map.txt"),
        "http://t/T1 0\nhttp://t/T2 1\nhttp://t/T3 2\n"
    );
    assert_eq!(ws.csv_rows("type_nodes.csv").len(), 3);
    assert_eq!(
        ws.csv_rows("type_type_relationships.csv"),
        vec!["0,1,http://p/p1,\"http://t/T1\",\"http://t/T2\""]
    );
    assert_eq!(ws.csv_rows("instance_nodes.csv").len(), 6);
    assert_eq!(
        ws.csv_rows("instance_type_relationships.csv").len(),
        sampled.pair_count
    );
    assert_eq!(ws.csv_rows("instance_type_nodes.csv").len(), 5);
    // Subjects A, C and E are typed, so sampled-only keeps every edge.
    assert_eq!(
        ws.csv_rows("instance_instance_relationships.csv").len(),
        sample.new_edges
    );
    assert!(!ws.path("out/minimum_instance_nodes.csv").exists());
}

#[test]
fn sampled_only_drops_edges_from_untyped_subjects() {
    let relations = relations_text() + &rel_line("F", "p3", "A");
    let ws = Workspace::new(&types_text(), &relations);

    run(ws.config());
    assert_eq!(ws.csv_rows("instance_instance_relationships.csv").len(), 3);

    let mut config = ws.config();
    config.features.set(Feature::SampledOnly, false);
    let pipeline = run(config);
    let rows = ws.csv_rows("instance_instance_relationships.csv");
    assert_eq!(rows.len(), 4);
    assert_eq!(
        rows.len(),
        pipeline.context().sample.as_ref().unwrap().new_edges
    );
}

#[test]
fn two_fresh_runs_produce_identical_outputs() {
    let first = Workspace::scenario();
    let second = Workspace::scenario();
    run(first.config());
    run(second.config());

    for name in [
        "out/test_schema_edges.txt",
        "out/test_schema_vertices.txt",
        "out/type_node_name_id_map.txt",
        "out/instance_node_name_id_map.txt",
        "out/type_nodes.csv",
        "out/type_type_relationships.csv",
        "out/instance_nodes.csv",
        "out/instance_instance_relationships.csv",
        "out/instance_type_relationships.csv",
        "dump/spo_table.json",
        "dump/sampled_type_dict.json",
    ] {
        assert_eq!(first.read(name), second.read(name), "{name}");
    }
}

#[test]
fn rerun_over_checkpoints_reloads_and_matches() {
    let ws = Workspace::scenario();
    run(ws.config());
    let before = ws.read("out/instance_instance_relationships.csv");
    let ids_before = ws.read("out/instance_node_name_id_map.txt");

    let mut pipeline = Pipeline::new(ws.config()).unwrap();
    let reports = pipeline.run().unwrap();
    for stage in [Stage::Schema, Stage::Sample, Stage::SampledTypes] {
        let report = reports.iter().find(|r| r.stage == stage).unwrap();
        assert_eq!(report.outcome, Outcome::Reloaded, "{stage}");
    }
    assert!(!reports.iter().any(|r| r.stage == Stage::TypeDictionary));
    assert_eq!(ws.read("out/instance_instance_relationships.csv"), before);
    assert_eq!(ws.read("out/instance_node_name_id_map.txt"), ids_before);
}

#[test]
fn instance_cap_holds_under_both_boundaries() {
    for (boundary, expected) in [
        (CapBoundary::Truncate, vec!["A", "B", "C"]),
        (CapBoundary::Atomic, vec!["A", "B"]),
    ] {
        let ws = Workspace::scenario();
        let mut config = ws.config();
        config.sampling.instance_cap = 3;
        config.sampling.boundary = boundary;
        let pipeline = run(config);

        let instances: Vec<String> = ws
            .read("dump/sampled_instances.txt")
            .lines()
            .map(str::to_owned)
            .collect();
        let expected: Vec<String> = expected.iter().map(|e| format!("http://e/{e}")).collect();
        assert_eq!(instances, expected, "{boundary}");

        // Only (A, p1, B) made it in whole.
        let sample = pipeline.context().sample.as_ref().unwrap();
        assert_eq!(sample.new_edges, 1, "{boundary}");
        assert_eq!(
            ws.csv_rows("instance_nodes.csv").len(),
            expected.len(),
            "{boundary}"
        );
    }
}

#[test]
fn type_labels_replace_instance_type_edges() {
    let ws = Workspace::scenario();
    let mut config = ws.config();
    config.features.set(Feature::TypeLabels, true);
    config.features.set(Feature::MinimalInstanceNodes, true);
    run(config);

    assert!(!ws.path("out/instance_type_relationships.csv").exists());
    let nodes = ws.csv_rows("instance_nodes.csv");
    assert_eq!(nodes.len(), 5);
    assert!(nodes.contains(&"0,\"http://e/A\",Instance;http://t/T1".to_string()));
    assert_eq!(ws.csv_rows("minimum_instance_nodes.csv").len(), 5);
}

#[test]
fn tagged_edge_kinds_add_predicate_column() {
    let ws = Workspace::scenario();
    let mut config = ws.config();
    config.features.set(Feature::PredicateEdgeKind, false);
    config.features.set(Feature::PlainSchemaCsv, true);
    run(config);

    let tt = ws.read("out/type_type_relationships.csv");
    let mut lines = tt.lines();
    assert_eq!(
        lines.next(),
        Some(":START_ID(Type),:END_ID(Type),:TYPE,Start,End,Predicate")
    );
    assert_eq!(
        lines.next(),
        Some("0,1,TypeType,\"http://t/T1\",\"http://t/T2\",\"http://p/p1\"")
    );
    assert!(
        ws.csv_rows("instance_instance_relationships.csv")
            .iter()
            .all(|r| r.contains(",InstInst,"))
    );
    assert_eq!(
        ws.csv_rows("test_schema_edges.csv"),
        vec!["\"http://t/T1\",\"http://p/p1\",\"http://t/T2\""]
    );
}

#[test]
fn malformed_line_fails_by_default_and_skip_continues() {
    let relations = relations_text() + "<http://e/A> <http://p/p1>\n";
    let ws = Workspace::new(&types_text(), &relations);

    let mut pipeline = Pipeline::new(ws.config()).unwrap();
    let err = pipeline.run_schema().unwrap_err();
    assert!(matches!(
        err,
        DistillError::Input(InputError::MalformedLine { line: 4, fields: 2, .. })
    ));

    let mut config = ws.config();
    config.parsing.malformed = MalformedPolicy::Skip;
    let mut pipeline = Pipeline::new(config).unwrap();
    let reports = pipeline.run_schema().unwrap();
    let schema = reports.iter().find(|r| r.stage == Stage::Schema).unwrap();
    assert_eq!(schema.get("skipped"), Some(1));
    assert_eq!(schema.get("edges"), Some(1));
}

#[test]
fn missing_type_source_is_reported() {
    let ws = Workspace::scenario();
    let mut config = ws.config();
    config.sources.type_files = vec![ws.path("absent.ttl")];
    let mut pipeline = Pipeline::new(config).unwrap();
    let err = pipeline.run_schema().unwrap_err();
    assert!(matches!(
        err,
        DistillError::Input(InputError::MissingInputFile { .. })
    ));
}

#[test]
fn link_files_double_as_type_sources() {
    let ws = Workspace::scenario();
    let links = ws.path("links.nt");
    std::fs::write(&links, relations_text() + &types_text()).unwrap();
    let plain = ws.path("plain-links.nt");
    std::fs::write(&plain, rel_line("A", "p9", "C")).unwrap();

    let mut config = ws.config();
    config.sources.type_files.clear();
    config.sources.use_link_files = true;
    config.sources.link_files = vec![links.clone(), plain];
    let mut pipeline = Pipeline::new(config).unwrap();
    let reports = pipeline.run_schema().unwrap();

    let discovered = reports
        .iter()
        .find(|r| r.stage == Stage::TypeSources)
        .unwrap();
    assert_eq!(discovered.get("discovered"), Some(1));
    assert_eq!(
        ws.read("dump/additional_type_files.txt").trim(),
        links.display().to_string()
    );
    // (A, p9, C) lives in a file without type lines but A and C are still typed.
    assert!(ws.read("out/test_schema_edges.txt").contains("http://t/T1 http://p/p9 http://t/T1"));
}

#[test]
fn discovered_type_sources_are_reloaded() {
    let ws = Workspace::scenario();
    let links = ws.path("links.nt");
    std::fs::write(&links, relations_text() + &types_text()).unwrap();

    let mut config = ws.config();
    config.sources.type_files.clear();
    config.sources.use_link_files = true;
    config.sources.link_files = vec![links];
    Pipeline::new(config.clone()).unwrap().run_schema().unwrap();
    let edges = ws.read("out/test_schema_edges.txt");

    // Force a schema rebuild so the type dictionary needs its sources again.
    std::fs::remove_file(ws.path("dump/type_dict.json")).unwrap();
    std::fs::remove_file(ws.path("out/test_schema_edges.txt")).unwrap();

    let reports = Pipeline::new(config).unwrap().run_schema().unwrap();
    let sources = reports
        .iter()
        .find(|r| r.stage == Stage::TypeSources)
        .unwrap();
    assert_eq!(sources.outcome, Outcome::Reloaded);
    assert_eq!(sources.get("discovered"), Some(1));
    let schema = reports.iter().find(|r| r.stage == Stage::Schema).unwrap();
    assert_eq!(schema.outcome, Outcome::Built);
    assert_eq!(ws.read("out/test_schema_edges.txt"), edges);
}
