//! Restrict the type dictionary to the sampled instances.

use std::collections::BTreeSet;

use crate::type_dict::TypeDictionary;

/// The sampled type dictionary and its (instance, type) pair count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampledTypes {
    pub dict: TypeDictionary,
    pub pair_count: usize,
}

impl SampledTypes {
    /// Wrap a reloaded checkpoint; the pair count is recomputed.
    pub fn from_dict(dict: TypeDictionary) -> Self {
        let pair_count = dict.pair_count();
        Self { dict, pair_count }
    }

    /// Types appearing in the sample, in order.
    pub fn types(&self) -> BTreeSet<&str> {
        self.dict.all_types()
    }
}

/// Keep exactly the entries of `types` whose entity is in `instances`.
///
/// Walks whichever side is smaller, so a sample of a hundred thousand
/// instances does not scan a dictionary of millions of entities.
pub fn sample_types(types: &TypeDictionary, instances: &BTreeSet<String>) -> SampledTypes {
    let mut dict = TypeDictionary::new();
    if instances.len() <= types.len() {
        for inst in instances {
            if let Some(set) = types.types_of(inst) {
                dict.insert_set(inst.clone(), set.clone());
            }
        }
    } else {
        for (entity, set) in types.iter() {
            if instances.contains(entity) {
                dict.insert_set(entity.to_owned(), set.clone());
            }
        }
    }
    let sampled = SampledTypes::from_dict(dict);
    tracing::info!(
        instances = instances.len(),
        typed = sampled.dict.len(),
        pairs = sampled.pair_count,
        "type dictionary sampled"
    );
    sampled
}
