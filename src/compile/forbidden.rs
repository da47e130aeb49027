//! Fixed point of the "forbidden" relation.
//!
//! Some names are forbidden by the caller. Others become useless as a
//! consequence: a struct whose every property got dropped, a union whose every
//! member is forbidden, a container of a forbidden type. Whether a struct
//! survives depends on how many of its properties survive, so instead of a
//! dependency graph we re-attempt compilation of every candidate until a full
//! pass forbids nothing new.
use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{CompileError, DocIndex, RefCollector, SchemaError, Walker};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForbiddenSet {
    explicit: BTreeSet<String>,
    derived: BTreeSet<String>,
}

impl ForbiddenSet {
    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { explicit: names.into_iter().map(Into::into).collect(), derived: BTreeSet::new() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.explicit.contains(name) || self.derived.contains(name)
    }

    /// Forbidden by the caller, as opposed to by consequence.
    pub fn is_explicit(&self, name: &str) -> bool {
        self.explicit.contains(name)
    }

    pub fn len(&self) -> usize {
        self.explicit.len() + self.derived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names forbidden by consequence, sorted.
    pub fn derived(&self) -> impl Iterator<Item = &str> {
        self.derived.iter().map(String::as_str)
    }

    pub fn compute(index: &DocIndex<'_>, forbid_type_names: &BTreeSet<String>) -> Result<Self, SchemaError> {
        for name in forbid_type_names {
            if !index.contains(name) {
                warn!(name = %name, "forbidden name matches no type or prototype");
            }
        }

        let mut set = Self::explicit(forbid_type_names.iter().cloned());
        let doc = index.doc();
        let candidates: Vec<&str> = doc.types.iter().map(|t| t.name.as_str())
            .chain(doc.prototypes.iter().map(|p| p.name.as_str()))
            .collect();

        // each productive pass forbids at least one new candidate
        let max_passes = candidates.len() + 1;
        let mut passes = 0;
        loop {
            passes += 1;
            assert!(passes <= max_passes, "forbidden-type closure failed to converge");

            let mut newly_forbidden = Vec::new();
            {
                let walker = Walker::new(index, &set);
                let mut collector = RefCollector;
                for &name in &candidates {
                    if set.contains(name) {
                        continue;
                    }
                    let Some(definition) = index.definition(name) else { continue };
                    match walker.walk(&mut collector, &definition) {
                        Ok(_) => {}
                        Err(CompileError::Excluded) => newly_forbidden.push(name.to_string()),
                        Err(source) => return Err(SchemaError::Definition { name: name.to_string(), source }),
                    }
                }
            }

            if newly_forbidden.is_empty() {
                debug!(passes, forbidden = set.len(), "forbidden closure converged");
                return Ok(set);
            }
            debug!(pass = passes, names = ?newly_forbidden, "newly forbidden");
            let before = set.len();
            set.derived.extend(newly_forbidden);
            assert!(set.len() > before, "forbidden set must grow on every productive pass");
        }
    }
}
