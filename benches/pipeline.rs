//! Benchmarks for the streaming stages over synthetic triple text.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};

use kg_distill::config::{CapBoundary, MalformedPolicy};
use kg_distill::sampler::InstanceSampler;
use kg_distill::schema::{SchemaGraph, read_relationships};
use kg_distill::triple::TripleReader;
use kg_distill::type_dict::{TypeDictionary, read_type_assertions};

const ENTITIES: usize = 5_000;
const TYPES: usize = 60;
const PREDICATES: usize = 25;
const RELATIONS: usize = 20_000;

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

fn type_text(rng: &mut impl Rng) -> String {
    let mut text = String::new();
    for e in 0..ENTITIES {
        for _ in 0..rng.gen_range(1..=3) {
            let t = rng.gen_range(0..TYPES);
            text.push_str(&format!(
                "<http://e/{e}> <{RDF_TYPE}> <http://t/{t}> .\n"
            ));
        }
    }
    text
}

fn relation_text(rng: &mut impl Rng) -> String {
    let mut text = String::new();
    for _ in 0..RELATIONS {
        let s = rng.gen_range(0..ENTITIES);
        let p = rng.gen_range(0..PREDICATES);
        // A tenth of the objects are never typed.
        let o = rng.gen_range(0..ENTITIES + ENTITIES / 10);
        text.push_str(&format!("<http://e/{s}> <http://p/{p}> <http://e/{o}> .\n"));
    }
    text
}

fn reader(text: &str) -> TripleReader<&[u8]> {
    TripleReader::from_reader(text.as_bytes(), "bench", MalformedPolicy::Fail)
}

fn bench_type_dictionary(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let types = type_text(&mut rng);

    c.bench_function("type_dictionary_5k", |bench| {
        bench.iter(|| {
            let mut dict = TypeDictionary::new();
            read_type_assertions(&mut reader(&types), &mut dict).unwrap();
            black_box(dict)
        })
    });
}

fn bench_schema(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let types = type_text(&mut rng);
    let relations = relation_text(&mut rng);
    let mut dict = TypeDictionary::new();
    read_type_assertions(&mut reader(&types), &mut dict).unwrap();

    c.bench_function("schema_graph_20k", |bench| {
        bench.iter(|| {
            let mut graph = SchemaGraph::new();
            read_relationships(&mut reader(&relations), &dict, &mut graph).unwrap();
            black_box(graph)
        })
    });
}

fn bench_sampler(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let relations = relation_text(&mut rng);

    for boundary in [CapBoundary::Truncate, CapBoundary::Atomic] {
        c.bench_function(&format!("sample_cap_2k_{boundary}"), |bench| {
            bench.iter(|| {
                let mut sampler = InstanceSampler::new(2_000, boundary);
                sampler.offer_all(&mut reader(&relations)).unwrap();
                black_box(sampler.finish())
            })
        });
    }
}

criterion_group!(benches, bench_type_dictionary, bench_schema, bench_sampler);
criterion_main!(benches);
