//! Component registry.
//!
//! Lazily constructs and holds exactly one instance per component type for the
//! lifetime of the owning [`ServiceContainer`](crate::services::ServiceContainer).
//! Members that react to configuration reloads are additionally recorded, in
//! construction order, so the config monitor can fan out `reconfigure()` calls.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::Result;

/// A component that rebuilds its state when the configuration is reloaded.
#[async_trait]
pub trait Reconfigurable: Send + Sync {
    /// Name used in logs.
    fn component(&self) -> &'static str;

    /// Rebuild from the freshly loaded configuration.
    async fn reconfigure(&self) -> Result<()>;
}

type AnyArc = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Entries {
    instances: HashMap<TypeId, AnyArc>,
    reconfigurables: Vec<Arc<dyn Reconfigurable>>,
}

/// Thread-safe lazy construction map from component type to its instance.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: Mutex<Entries>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing instance of `T` or construct and store one.
    ///
    /// The constructor runs under the registry lock, so at most one instance
    /// of `T` is ever created. It must not call back into the registry.
    pub fn get_or_create<T, F>(&self, ctor: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.lock();
        match Self::lookup_or_insert::<T, Infallible, _>(&mut entries, || Ok(Arc::new(ctor()))) {
            Ok((instance, _)) => instance,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`get_or_create`](Self::get_or_create).
    ///
    /// Nothing is stored when the constructor fails.
    pub fn try_get_or_create<T, F>(&self, ctor: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T>,
    {
        let mut entries = self.entries.lock();
        Self::lookup_or_insert(&mut entries, || ctor().map(Arc::new)).map(|(instance, _)| instance)
    }

    /// Like [`get_or_create`](Self::get_or_create), and record the instance as
    /// a reconfiguration target on first construction.
    pub fn register_reconfigurable<T, F>(&self, ctor: F) -> Arc<T>
    where
        T: Reconfigurable + 'static,
        F: FnOnce() -> Arc<T>,
    {
        let mut entries = self.entries.lock();
        let (instance, created) =
            match Self::lookup_or_insert::<T, Infallible, _>(&mut entries, || Ok(ctor())) {
                Ok(found) => found,
                Err(never) => match never {},
            };
        if created {
            debug!(component = instance.component(), "Registered reconfigurable component");
            entries.reconfigurables.push(instance.clone());
        }
        instance
    }

    /// Get an already constructed instance of `T`.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let entries = self.entries.lock();
        entries
            .instances
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Whether an instance of `T` has been constructed.
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.lock().instances.contains_key(&TypeId::of::<T>())
    }

    /// Snapshot of the reconfiguration targets in construction order.
    pub fn reconfigurables(&self) -> Vec<Arc<dyn Reconfigurable>> {
        self.entries.lock().reconfigurables.clone()
    }

    /// Number of constructed components.
    pub fn len(&self) -> usize {
        self.entries.lock().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup_or_insert<T, E, F>(
        entries: &mut Entries,
        ctor: F,
    ) -> std::result::Result<(Arc<T>, bool), E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<Arc<T>, E>,
    {
        let key = TypeId::of::<T>();
        if let Some(existing) = entries.instances.get(&key) {
            if let Ok(instance) = existing.clone().downcast::<T>() {
                return Ok((instance, false));
            }
        }

        let instance = ctor()?;
        entries.instances.insert(key, instance.clone() as AnyArc);
        Ok((instance, true))
    }
}
