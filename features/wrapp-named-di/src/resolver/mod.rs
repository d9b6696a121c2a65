use std::{
    fmt::Debug,
    future::IntoFuture,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{
    future::{self, try_join_all, BoxFuture},
    FutureExt, TryFutureExt,
};

use crate::{
    errors::{ResolveError, SignatureError},
    producer::{Args, Export, Group, Param, Produced, Producer},
    registry::{Lookup, Registry},
    signature::{self, Category, DependencyRef, Signature},
    types::{DynError, Instance},
};

pub mod resolution;

pub use resolution::{PendingValue, Resolution};

/// Memoized resolution state - only ever moves forward
enum State {
    Unresolved,
    Pending(PendingValue),
    Resolved(Instance),
}

/// A parameter available now, or once its dependency completes
enum Slot {
    Ready(Param),
    Pending(BoxFuture<'static, Result<Param, ResolveError>>),
}

/// Wraps one producer, its dependency specification and its memoized result
///
/// Name, producer and signature are fixed for the resolver's lifetime.
/// The registry is borrowed on every call rather than stored, so sibling
/// resolvers are looked up through whichever registry the caller owns.
pub struct Resolver {
    name: String,
    producer: Producer,
    signature: Signature,
    state: Arc<Mutex<State>>,
}
impl Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.lock_state() {
            State::Unresolved => "unresolved",
            State::Pending(_) => "pending",
            State::Resolved(_) => "resolved",
        };
        f.debug_struct("Resolver")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("state", &state)
            .finish()
    }
}

impl Resolver {
    /// Extracts the signature of `target`, refusing anything not callable
    pub fn new(name: impl Into<String>, target: impl Into<Export>) -> Result<Self, SignatureError> {
        let target = target.into();
        let signature = signature::extract(&target)?;
        Ok(Resolver {
            name: name.into(),
            producer: target.callable()?.clone(),
            signature,
            state: Arc::new(Mutex::new(State::Unresolved)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock_state(), State::Resolved(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.lock_state(), State::Pending(_))
    }

    /// True if resolving would revisit a node already being resolved
    pub fn is_circular<L: Lookup + ?Sized>(&self, resolvers: &L) -> bool {
        self.is_circular_from(resolvers, &[])
    }

    /// Cycle check continuing an existing dependency path
    ///
    /// Dependencies without a registered resolver end the walk - they are
    /// reported as missing on resolution, not as cycles.
    pub fn is_circular_from<'a, L: Lookup + ?Sized>(
        &'a self,
        resolvers: &'a L,
        path: &[&'a str],
    ) -> bool {
        if path.contains(&self.name.as_str()) {
            return true;
        }

        let dependencies = self.signature.dependency_names();

        let mut current_path = path.to_vec();
        current_path.push(&self.name);

        if let Some(node) = current_path.iter().find(|node| dependencies.contains(*node)) {
            tracing::trace!("'{}' depends on '{node}' which is already on {current_path:?}", self.name);
            return true;
        }

        dependencies.iter().any(|dependency| {
            resolvers
                .lookup(dependency)
                .is_some_and(|resolver| resolver.is_circular_from(resolvers, &current_path))
        })
    }

    /// Resolves the producer, at most once for the resolver's lifetime
    ///
    /// Returns the cached value once resolved and the shared in-flight handle
    /// while pending. Only this call may carry a custom context, transitive
    /// dependencies are always resolved without one.
    pub fn resolve(
        &self,
        registry: &Registry,
        context: Option<Instance>,
    ) -> Result<Resolution, ResolveError> {
        if self.is_circular(registry) {
            return Err(ResolveError::CircularDependency(self.name.clone()));
        }

        if let Some(existing) = current(&self.lock_state()) {
            return Ok(existing);
        }

        ensure_context_allowed(&self.name, self.signature.category, &context)?;

        let slots = self.collect_parameters(registry)?;

        let resolution = if slots.iter().all(|slot| matches!(slot, Slot::Ready(_))) {
            let params = slots
                .into_iter()
                .filter_map(|slot| match slot {
                    Slot::Ready(param) => Some(param),
                    Slot::Pending(_) => None,
                })
                .collect();

            match apply(&self.name, &self.producer, Args::new(params), context)? {
                Produced::Ready(instance) => Resolution::Ready(instance),
                Produced::Pending(future) => {
                    let name = self.name.clone();
                    Resolution::Pending(
                        self.settle(future.map_err(move |error| producer_failed(&name, error)).boxed()),
                    )
                }
            }
        } else {
            let name = self.name.clone();
            let producer = self.producer.clone();
            let computation = async move {
                let params = try_join_all(slots.into_iter().map(|slot| match slot {
                    Slot::Ready(param) => future::ready(Ok(param)).boxed(),
                    Slot::Pending(future) => future,
                }))
                .await?;

                match apply(&name, &producer, Args::new(params), context)? {
                    Produced::Ready(instance) => Ok(instance),
                    Produced::Pending(future) => future
                        .await
                        .map_err(|error| producer_failed(&name, error)),
                }
            };

            Resolution::Pending(self.settle(computation.boxed()))
        };

        // Producers ran unlocked, so another caller may have stored an outcome first
        let mut state = self.lock_state();
        if let Some(existing) = current(&state) {
            return Ok(existing);
        }
        *state = match &resolution {
            Resolution::Ready(instance) => {
                tracing::debug!("Resolved '{}'", self.name);
                State::Resolved(instance.clone())
            }
            Resolution::Pending(pending) => {
                tracing::debug!("'{}' is pending", self.name);
                State::Pending(pending.clone())
            }
        };

        Ok(resolution)
    }

    /// Looks up and resolves every dependency in declaration order
    fn collect_parameters(&self, registry: &Registry) -> Result<Vec<Slot>, ResolveError> {
        let mut slots = Vec::with_capacity(self.signature.dependencies.len());

        for dependency in &self.signature.dependencies {
            let slot = match dependency {
                DependencyRef::Simple(name) => match self.resolve_dependency(registry, name)? {
                    Resolution::Ready(instance) => Slot::Ready(Param::Value(instance)),
                    Resolution::Pending(pending) => {
                        Slot::Pending(pending.map_ok(Param::Value).boxed())
                    }
                },
                DependencyRef::Group(names) => {
                    let mut members = Vec::with_capacity(names.len());
                    for name in names {
                        members.push((name.clone(), self.resolve_dependency(registry, name)?));
                    }

                    if members.iter().all(|(_, resolution)| resolution.is_ready()) {
                        let fields = members
                            .into_iter()
                            .filter_map(|(name, resolution)| match resolution {
                                Resolution::Ready(instance) => Some((name, instance)),
                                Resolution::Pending(_) => None,
                            })
                            .collect();
                        Slot::Ready(Param::Group(Group::from_fields(fields)))
                    } else {
                        let fields = try_join_all(members.into_iter().map(|(name, resolution)| {
                            resolution.into_future().map_ok(move |instance| (name, instance))
                        }));
                        Slot::Pending(
                            fields
                                .map_ok(|fields| Param::Group(Group::from_fields(fields)))
                                .boxed(),
                        )
                    }
                }
            };
            slots.push(slot);
        }

        Ok(slots)
    }

    fn resolve_dependency(&self, registry: &Registry, name: &str) -> Result<Resolution, ResolveError> {
        let Some(resolver) = registry.get(name) else {
            tracing::error!("'{}' requires unregistered '{name}'", self.name);
            return Err(ResolveError::NotRegistered {
                dependency: name.to_string(),
                required_by: self.name.clone(),
            });
        };

        resolver.resolve(registry, None)
    }

    /// Wraps a computation so its result is memoized once it completes
    fn settle(&self, computation: BoxFuture<'static, Result<Instance, ResolveError>>) -> PendingValue {
        let state = Arc::clone(&self.state);
        let name = self.name.clone();

        async move {
            let instance = computation.await?;
            *lock(&state) = State::Resolved(instance.clone());
            tracing::debug!("Resolved '{name}' after waiting");
            Ok(instance)
        }
        .boxed()
        .shared()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

/// The memoized outcome, if there is one
fn current(state: &State) -> Option<Resolution> {
    match state {
        State::Resolved(instance) => Some(Resolution::Ready(instance.clone())),
        State::Pending(pending) => Some(Resolution::Pending(pending.clone())),
        State::Unresolved => None,
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn producer_failed(name: &str, error: DynError) -> ResolveError {
    ResolveError::ProducerFailed {
        key: name.to_string(),
        error: Arc::new(error),
    }
}

fn ensure_context_allowed(
    name: &str,
    category: Category,
    context: &Option<Instance>,
) -> Result<(), ResolveError> {
    match (category, context) {
        (Category::Class | Category::NoContextFunction, Some(_)) => {
            Err(ResolveError::ContextNotAllowed {
                key: name.to_string(),
                category,
            })
        }
        _ => Ok(()),
    }
}

/// Invokes a producer with its resolved parameters
///
/// Classes are constructed and closures called plainly - both reject a
/// custom context. Functions are bound to the context, if any.
fn apply(
    name: &str,
    producer: &Producer,
    args: Args,
    context: Option<Instance>,
) -> Result<Produced, ResolveError> {
    let produced = match producer {
        Producer::Class(class) => {
            ensure_context_allowed(name, Category::Class, &context)?;
            class.construct(args).map(Produced::Ready)
        }
        Producer::Closure(closure) => {
            ensure_context_allowed(name, Category::NoContextFunction, &context)?;
            closure.call(args)
        }
        Producer::Function(function) => function.call(args, context),
        Producer::Native(native) => {
            ensure_context_allowed(name, Category::NoContextFunction, &context)?;
            native.call(args)
        }
    };

    produced.map_err(|error| producer_failed(name, error))
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use futures::{
        executor::{block_on, LocalPool},
        task::LocalSpawnExt,
    };
    use futures_channel::oneshot;

    use super::*;
    use crate::{
        errors::ArgError,
        producer::{Class, Parameter},
    };

    fn register(registry: &mut Registry, name: &str, producer: Producer) -> Arc<Resolver> {
        let resolver = Arc::new(Resolver::new(name, producer).unwrap());
        registry.set(name, resolver.clone());
        resolver
    }

    fn literal<T: Send + Sync + 'static>(value: T) -> Producer {
        Producer::value(Instance::new(value))
    }

    /// Async closure waiting for a value sent through the returned channel
    fn gated(parameters: Vec<Parameter>) -> (Producer, oneshot::Sender<i32>) {
        let (tx, rx) = oneshot::channel::<i32>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let producer = Producer::async_closure(parameters, move |_| {
            let rx = rx.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => rx.await.map_err(|e| Box::new(e) as DynError),
                    None => Err("gate applied twice".into()),
                }
            }
        });
        (producer, tx)
    }

    #[test]
    fn resolves_without_dependencies_synchronously() {
        let registry = Registry::new();
        let resolver = Resolver::new("a", literal(10_i32)).unwrap();

        let resolution = resolver.resolve(&registry, None).unwrap();
        assert_eq!(*resolution.ready().unwrap().downcast::<i32>().unwrap(), 10);
        assert!(resolver.is_resolved());
    }

    #[test]
    fn refuses_plain_values() {
        assert!(matches!(
            Resolver::new("config", Instance::new(1_u8)),
            Err(SignatureError::NotCallable("u8"))
        ));
        assert!(matches!(
            Resolver::new("parse", Producer::native("parse", |_| Ok::<_, Infallible>(1))),
            Err(SignatureError::UnsupportedNative(name)) if name == "parse"
        ));
    }

    #[test]
    fn caches_the_first_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolver = Resolver::new(
            "a",
            Producer::closure((), move |_| {
                Ok::<_, Infallible>(counter.fetch_add(1, Ordering::SeqCst))
            }),
        )
        .unwrap();
        let registry = Registry::new();

        let first = resolver.resolve(&registry, None).unwrap();
        let second = resolver.resolve(&registry, None).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.ready().unwrap().ptr_eq(second.ready().unwrap()));
    }

    #[test]
    fn resolves_dependencies_before_dependents() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();

        let log = order.clone();
        register(
            &mut registry,
            "a",
            Producer::closure((), move |_| {
                log.lock().unwrap().push("a");
                Ok::<_, Infallible>(2_i32)
            }),
        );
        let log = order.clone();
        let b = register(
            &mut registry,
            "b",
            Producer::closure(["a"], move |args| {
                log.lock().unwrap().push("b");
                Ok::<_, ArgError>(*args.get::<i32>(0)? * 3)
            }),
        );

        let resolution = b.resolve(&registry, None).unwrap();
        assert_eq!(*resolution.ready().unwrap().downcast::<i32>().unwrap(), 6);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn detects_self_dependency() {
        let mut registry = Registry::new();
        let x = register(&mut registry, "x", Producer::closure(["x"], |_| Ok::<_, Infallible>(())));
        assert!(x.is_circular(&registry));

        // Not yet registered - the self reference alone is enough
        let y = Resolver::new("y", Producer::closure(["y"], |_| Ok::<_, Infallible>(()))).unwrap();
        assert!(y.is_circular(&Registry::new()));
    }

    #[test]
    fn detects_mutual_and_transitive_cycles() {
        let mut registry = Registry::new();
        let a = register(&mut registry, "a", Producer::closure(["b"], |_| Ok::<_, Infallible>(())));
        register(&mut registry, "b", Producer::closure(["c"], |_| Ok::<_, Infallible>(())));
        assert!(!a.is_circular(&registry));

        register(
            &mut registry,
            "c",
            Producer::closure([Parameter::fields(["a"])], |_| Ok::<_, Infallible>(())),
        );
        assert!(a.is_circular(&registry));
        assert!(matches!(
            a.resolve(&registry, None),
            Err(ResolveError::CircularDependency(name)) if name == "a"
        ));
    }

    #[test]
    fn shared_dependencies_are_not_cycles() {
        let mut registry = Registry::new();
        register(&mut registry, "base", literal(1_u8));
        register(&mut registry, "left", Producer::closure(["base"], |_| Ok::<_, Infallible>(())));
        register(&mut registry, "right", Producer::closure(["base"], |_| Ok::<_, Infallible>(())));
        let top = register(
            &mut registry,
            "top",
            Producer::closure(["left", "right", "base"], |_| Ok::<_, Infallible>(())),
        );

        assert!(!top.is_circular(&registry));
        assert!(top.resolve(&registry, None).unwrap().is_ready());
    }

    #[test]
    fn missing_dependency_fails_and_stays_unresolved() {
        let mut registry = Registry::new();
        let b = register(&mut registry, "b", Producer::closure(["a"], |_| Ok::<_, Infallible>(())));

        assert!(!b.is_circular(&registry));
        match b.resolve(&registry, None) {
            Err(ResolveError::NotRegistered {
                dependency,
                required_by,
            }) => {
                assert_eq!(dependency, "a");
                assert_eq!(required_by, "b");
            }
            other => panic!("unexpected {other:?}"),
        }

        register(&mut registry, "a", literal(1_u8));
        assert!(b.resolve(&registry, None).unwrap().is_ready());
    }

    #[test]
    fn failed_producer_is_retried_on_next_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolver = Resolver::new(
            "flaky",
            Producer::closure((), move |_| match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err("first call fails"),
                n => Ok(n),
            }),
        )
        .unwrap();
        let registry = Registry::new();

        assert!(matches!(
            resolver.resolve(&registry, None),
            Err(ResolveError::ProducerFailed { key, .. }) if key == "flaky"
        ));
        assert!(!resolver.is_resolved());
        assert!(resolver.resolve(&registry, None).unwrap().is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn builds_groups_from_named_fields() {
        let mut registry = Registry::new();
        register(&mut registry, "a", literal(1_i32));
        register(&mut registry, "b", literal(2_i32));
        let sum = register(
            &mut registry,
            "sum",
            Producer::closure([Parameter::fields(["a", "b"])], |args| {
                let group = args.group(0)?;
                assert_eq!(group.keys().collect::<Vec<_>>(), vec!["a", "b"]);
                Ok::<_, ArgError>(*group.get_as::<i32>("a")? + *group.get_as::<i32>("b")?)
            }),
        );

        let resolution = sum.resolve(&registry, None).unwrap();
        assert_eq!(*resolution.ready().unwrap().downcast::<i32>().unwrap(), 3);
    }

    #[test]
    fn pending_dependency_makes_dependent_pending() {
        let mut registry = Registry::new();
        let (a, gate) = gated(vec![]);
        register(&mut registry, "a", a);
        let b = register(
            &mut registry,
            "b",
            Producer::closure(["a"], |args| Ok::<_, ArgError>(*args.get::<i32>(0)? + 1)),
        );

        let resolution = b.resolve(&registry, None).unwrap();
        assert!(resolution.is_pending());
        assert!(b.is_pending());

        gate.send(41).unwrap();
        let value = block_on(resolution.into_future()).unwrap();
        assert_eq!(*value.downcast::<i32>().unwrap(), 42);
        assert!(b.is_resolved());
        assert!(b.resolve(&registry, None).unwrap().is_ready());
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let (a, gate) = gated(vec![]);
        register(&mut registry, "a", a);
        let counter = calls.clone();
        let b = register(
            &mut registry,
            "b",
            Producer::closure(["a"], move |args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ArgError>(*args.get::<i32>(0)?)
            }),
        );

        let first = b.resolve(&registry, None).unwrap();
        let second = b.resolve(&registry, None).unwrap();
        assert!(first.same_pending(&second));

        gate.send(7).unwrap();
        let (x, y) = block_on(future::join(first.into_future(), second.into_future()));
        assert!(x.unwrap().ptr_eq(&y.unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parameters_keep_declaration_order_whatever_completes_first() {
        let mut registry = Registry::new();
        let (first, first_gate) = gated(vec![]);
        let (third, third_gate) = gated(vec![]);
        register(&mut registry, "first", first);
        register(&mut registry, "second", literal(2_i32));
        register(&mut registry, "third", third);
        let all = register(
            &mut registry,
            "all",
            Producer::closure(["first", "second", "third"], |args| {
                Ok::<_, ArgError>(vec![*args.get::<i32>(0)?, *args.get::<i32>(1)?, *args.get::<i32>(2)?])
            }),
        );

        let resolution = all.resolve(&registry, None).unwrap();
        let mut pool = LocalPool::new();
        let handle = pool
            .spawner()
            .spawn_local_with_handle(resolution.into_future())
            .unwrap();

        pool.run_until_stalled();
        third_gate.send(3).unwrap();
        pool.run_until_stalled();
        first_gate.send(1).unwrap();

        let value = pool.run_until(handle).unwrap();
        assert_eq!(*value.downcast::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn groups_wait_for_pending_members() {
        let mut registry = Registry::new();
        let (a, gate) = gated(vec![]);
        register(&mut registry, "a", a);
        register(&mut registry, "b", literal(5_i32));
        let pair = register(
            &mut registry,
            "pair",
            Producer::closure([Parameter::fields(["a", "b"])], |args| {
                let group = args.group(0)?;
                Ok::<_, ArgError>((*group.get_as::<i32>("a")?, *group.get_as::<i32>("b")?))
            }),
        );

        let resolution = pair.resolve(&registry, None).unwrap();
        assert!(resolution.is_pending());
        gate.send(4).unwrap();

        let value = block_on(resolution.into_future()).unwrap();
        assert_eq!(*value.downcast::<(i32, i32)>().unwrap(), (4, 5));
    }

    #[test]
    fn failed_pending_computation_keeps_its_error() {
        let mut registry = Registry::new();
        let (a, gate) = gated(vec![]);
        register(&mut registry, "a", a);
        let b = register(&mut registry, "b", Producer::closure(["a"], |_| Ok::<_, Infallible>(())));

        let resolution = b.resolve(&registry, None).unwrap();
        drop(gate);

        assert!(matches!(
            block_on(resolution.into_future()),
            Err(ResolveError::ProducerFailed { key, .. }) if key == "a"
        ));
        let again = b.resolve(&registry, None).unwrap();
        assert!(block_on(again.into_future()).is_err());
    }

    #[test]
    fn async_producer_without_dependencies_is_pending() {
        let registry = Registry::new();
        let resolver = Resolver::new(
            "later",
            Producer::async_closure((), |_| async { Ok::<_, Infallible>("done") }),
        )
        .unwrap();

        let resolution = resolver.resolve(&registry, None).unwrap();
        assert!(resolution.is_pending());
        let value = block_on(resolution.into_future()).unwrap();
        assert_eq!(*value.downcast::<&str>().unwrap(), "done");
        assert!(resolver.resolve(&registry, None).unwrap().is_ready());
    }

    #[test]
    fn classes_and_closures_reject_context() {
        let registry = Registry::new();
        let class = Resolver::new("class", Producer::class(Class::new("Service"))).unwrap();
        let closure = Resolver::new("closure", literal(1_u8)).unwrap();

        assert!(matches!(
            class.resolve(&registry, Some(Instance::new(()))),
            Err(ResolveError::ContextNotAllowed { category: Category::Class, .. })
        ));
        assert!(matches!(
            closure.resolve(&registry, Some(Instance::new(()))),
            Err(ResolveError::ContextNotAllowed { category: Category::NoContextFunction, .. })
        ));
        assert!(!class.is_resolved());
    }

    #[test]
    fn functions_observe_their_context() {
        let registry = Registry::new();
        let resolver = Resolver::new(
            "greet",
            Producer::function((), |_, context: Option<Instance>| {
                let name = match context {
                    Some(context) => context.downcast::<String>().map(|s| s.to_string()),
                    None => Ok("nobody".to_string()),
                };
                name.map(|name| format!("hello {name}"))
            }),
        )
        .unwrap();

        let resolution = resolver
            .resolve(&registry, Some(Instance::new("world".to_string())))
            .unwrap();
        assert_eq!(
            *resolution.ready().unwrap().downcast::<String>().unwrap(),
            "hello world"
        );
    }
}
