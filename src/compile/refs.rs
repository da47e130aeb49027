//! Mirror of the JSON emitter that collects referenced names instead of JSON.
//!
//! Each subtree yields the set of names it references, so a property or union
//! member dropped for being excluded drops its references with it.
use std::collections::BTreeSet;

use super::{Compiled, ResolvedStruct, Visitor};

pub type RefSet = BTreeSet<String>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RefCollector;

fn merged(sets: impl IntoIterator<Item = RefSet>) -> RefSet {
    sets.into_iter().flatten().collect()
}

impl Visitor for RefCollector {
    type Output = RefSet;

    fn builtin(&mut self, _name: &str) -> Compiled<RefSet> { Ok(RefSet::new()) }
    fn literal_bool(&mut self, _value: bool) -> RefSet { RefSet::new() }
    fn literal_string(&mut self, _value: &str) -> RefSet { RefSet::new() }
    fn literal_integer(&mut self, _value: i64) -> RefSet { RefSet::new() }

    fn reference(&mut self, name: &str) -> RefSet {
        RefSet::from([name.to_string()])
    }

    fn union(&mut self, members: Vec<RefSet>) -> RefSet { merged(members) }

    fn array(&mut self, content: RefSet, _empty_as_object: bool) -> RefSet { content }

    fn dictionary(&mut self, keys: RefSet, values: RefSet) -> RefSet { merged([keys, values]) }

    fn tuple(&mut self, members: Vec<RefSet>) -> RefSet { merged(members) }

    fn structure(&mut self, resolved: ResolvedStruct<RefSet>) -> RefSet {
        merged(
            resolved.properties.into_values().map(|p| p.schema)
                .chain(resolved.custom_properties),
        )
    }

    fn unconstrained(&mut self) -> RefSet { RefSet::new() }
}
