use std::{collections::HashMap, sync::Arc};

use crate::resolver::Resolver;

/// Read access to resolvers by name
///
/// Cycle checks walk the graph through this, so a batch of resolvers can be
/// checked before any of them is inserted.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<&Arc<Resolver>>;
}

/// Name to [Resolver] lookup table
///
/// Performs no validation - uniqueness and key rules are enforced by the
/// [Container](crate::container::Container), the only one inserting.
#[derive(Default)]
pub struct Registry {
    map: HashMap<String, Arc<Resolver>>,
}
impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Resolver>> {
        self.map.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, resolver: Arc<Resolver>) {
        self.map.insert(name.into(), resolver);
    }

    pub fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Resolver>)> {
        self.map.iter().map(|(name, resolver)| (name.as_str(), resolver))
    }
}

impl Lookup for Registry {
    fn lookup(&self, name: &str) -> Option<&Arc<Resolver>> {
        self.get(name)
    }
}

/// A registry seen together with resolvers staged for insertion
pub(crate) struct Staged<'a> {
    pub registry: &'a Registry,
    pub staged: &'a [(String, Arc<Resolver>)],
}
impl Lookup for Staged<'_> {
    fn lookup(&self, name: &str) -> Option<&Arc<Resolver>> {
        self.registry.get(name).or_else(|| {
            self.staged
                .iter()
                .find(|(staged, _)| staged == name)
                .map(|(_, resolver)| resolver)
        })
    }
}
