use std::{fmt::Debug, sync::Arc};

use crate::{
    errors::ContainerError,
    producer::{Export, Producer},
    registry::{Registry, Staged},
    resolver::{Resolution, Resolver},
    types::{is_valid_identifier, Injectable, Instance},
};

/// Key of the throwaway resolver built by [Container::invoke]
///
/// Never a valid identifier, so it cannot collide with a registered key.
pub const INVOKE_KEY: &str = "#";

/// Facade coordinating registration and resolution against one [Registry]
///
/// The container is the only one inserting into its registry: keys are
/// validated, duplicates rejected and cycles detected before anything is
/// stored. Batches are all-or-nothing.
#[derive(Default)]
pub struct Container {
    registry: Registry,
}
impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self.registry.iter().collect();
        entries.sort_by_key(|(name, _)| *name);

        let mut map = f.debug_struct("Container");
        for (name, resolver) in entries {
            let state = if resolver.is_resolved() {
                "resolved"
            } else if resolver.is_pending() {
                "pending"
            } else {
                "unresolved"
            };
            map.field(name, &state);
        }
        map.finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single producer under `key`
    pub fn register(
        &mut self,
        key: impl Into<String>,
        producer: impl Into<Producer>,
    ) -> Result<(), ContainerError> {
        self.register_all([(key.into(), producer.into())])
    }

    /// Registers a batch of producers - either all of them or none
    pub fn register_all<I, K>(&mut self, batch: I) -> Result<(), ContainerError>
    where
        I: IntoIterator<Item = (K, Producer)>,
        K: Into<String>,
    {
        self.register_exports(
            batch
                .into_iter()
                .map(|(key, producer)| (key, Export::Producer(producer))),
        )
    }

    /// Registers a batch of exports - either all of them or none
    ///
    /// Plain values are not producers and fail the batch with
    /// [ContainerError::NotCallable].
    pub fn register_exports<I, K>(&mut self, batch: I) -> Result<(), ContainerError>
    where
        I: IntoIterator<Item = (K, Export)>,
        K: Into<String>,
    {
        let mut staged: Vec<(String, Arc<Resolver>)> = Vec::new();

        for (key, export) in batch {
            let key = key.into();
            self.check_new_key(&key, &staged)?;

            let resolver = Resolver::new(key.clone(), export)
                .map_err(|error| ContainerError::from_signature(key.clone(), error))?;
            staged.push((key, Arc::new(resolver)));
        }

        let view = Staged {
            registry: &self.registry,
            staged: &staged,
        };
        if let Some((key, _)) = staged.iter().find(|(_, resolver)| resolver.is_circular(&view)) {
            return Err(ContainerError::CircularDependency(key.clone()));
        }

        for (key, resolver) in staged {
            tracing::debug!("Registered '{key}' depending on {:?}", resolver.signature().dependency_names());
            self.registry.set(key, resolver);
        }

        Ok(())
    }

    /// Registers a value that resolves to itself
    pub fn literal<T: Injectable>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), ContainerError> {
        self.literal_all([(key.into(), Instance::new(value))])
    }

    /// Registers a batch of values - either all of them or none
    ///
    /// Each value is wrapped in a zero-dependency producer and goes through
    /// the same resolver machinery as any other registration.
    pub fn literal_all<I, K>(&mut self, batch: I) -> Result<(), ContainerError>
    where
        I: IntoIterator<Item = (K, Instance)>,
        K: Into<String>,
    {
        self.register_all(
            batch
                .into_iter()
                .map(|(key, value)| (key, Producer::value(value))),
        )
    }

    /// Resolves `key`, synchronously if possible
    pub fn resolve(&self, key: &str) -> Result<Resolution, ContainerError> {
        let Some(resolver) = self.registry.get(key) else {
            tracing::error!("Tried to resolve unregistered '{key}'");
            return Err(ContainerError::NotRegistered(key.to_string()));
        };

        resolver
            .resolve(&self.registry, None)
            .map_err(|error| ContainerError::resolution(key, error))
    }

    /// Resolves `key`, waiting for pending dependencies
    pub async fn get(&self, key: &str) -> Result<Instance, ContainerError> {
        self.resolve(key)?
            .await
            .map_err(|error| ContainerError::resolution(key, error))
    }

    /// Resolves `key` and downcasts the value
    pub async fn get_as<T: Injectable>(&self, key: &str) -> Result<Arc<T>, ContainerError> {
        self.get(key)
            .await?
            .downcast()
            .map_err(|actual_type| ContainerError::DowncastFailed {
                key: key.to_string(),
                required_type: std::any::type_name::<T>(),
                actual_type,
            })
    }

    /// Runs a producer against the registered dependencies without registering it
    pub fn invoke(&self, producer: impl Into<Producer>) -> Result<Resolution, ContainerError> {
        self.invoke_export(None, Export::Producer(producer.into()))
    }

    /// Like [Container::invoke], binding the producer to `context`
    ///
    /// Only function producers accept a context.
    pub fn invoke_with(
        &self,
        context: Instance,
        producer: impl Into<Producer>,
    ) -> Result<Resolution, ContainerError> {
        self.invoke_export(Some(context), Export::Producer(producer.into()))
    }

    /// Runs anything handed over from outside, refusing plain values
    pub(crate) fn invoke_export(
        &self,
        context: Option<Instance>,
        target: Export,
    ) -> Result<Resolution, ContainerError> {
        let resolver = Resolver::new(INVOKE_KEY, target)
            .map_err(|error| ContainerError::from_signature(INVOKE_KEY, error))?;

        resolver
            .resolve(&self.registry, context)
            .map_err(|error| ContainerError::resolution(INVOKE_KEY, error))
    }

    pub fn is_registered(&self, key: &str) -> Result<bool, ContainerError> {
        if !is_valid_identifier(key) {
            return Err(ContainerError::InvalidKey(key.to_string()));
        }
        Ok(self.registry.has(key))
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Registered keys in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.registry.iter().map(|(name, _)| name)
    }

    fn check_new_key(
        &self,
        key: &str,
        staged: &[(String, Arc<Resolver>)],
    ) -> Result<(), ContainerError> {
        if !is_valid_identifier(key) {
            return Err(ContainerError::InvalidKey(key.to_string()));
        }

        if self.registry.has(key) || staged.iter().any(|(staged, _)| staged == key) {
            return Err(ContainerError::DuplicateKey(key.to_string()));
        }

        Ok(())
    }
}
