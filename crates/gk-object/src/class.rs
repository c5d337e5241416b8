//! Class registry: per-class pass participation and object factories.

use std::fmt;

use gk_core::{ClassId, PassConfig};
use tracing::debug;

use crate::{NameMap, ObjectError, ObjectModel, ObjectResult};

type Factory = dyn Fn() -> Box<dyn ObjectModel> + Send + Sync;

/// One registered object class.
pub struct ClassInfo {
    id:         ClassId,
    name:       String,
    passes:     PassConfig,
    force_name: bool,
    factory:    Box<Factory>,
}

impl ClassInfo {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Passes objects of this class are synchronized in.
    pub fn passes(&self) -> PassConfig {
        self.passes
    }

    /// `true` if objects of this class are expected to carry a name.
    pub fn force_name(&self) -> bool {
        self.force_name
    }

    /// A fresh model from the class factory.
    pub fn instantiate(&self) -> Box<dyn ObjectModel> {
        (self.factory)()
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("passes", &self.passes)
            .field("force_name", &self.force_name)
            .finish_non_exhaustive()
    }
}

/// All classes known to one kernel, indexed by [`ClassId`].
#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    by_name: NameMap<ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class whose objects take part in `passes`.
    ///
    /// `factory` builds the model for every object created through
    /// [`ObjectStore::create`](crate::ObjectStore::create).
    pub fn register<M, F>(&mut self, name: &str, passes: PassConfig, factory: F) -> ObjectResult<ClassId>
    where
        M: ObjectModel,
        F: Fn() -> M + Send + Sync + 'static,
    {
        if self.by_name.contains_key(name) {
            return Err(ObjectError::DuplicateClass(name.to_owned()));
        }
        let id = ClassId::try_from(self.classes.len()).map_err(|_| ObjectError::Capacity)?;
        self.classes.push(ClassInfo {
            id,
            name: name.to_owned(),
            passes,
            force_name: false,
            factory: Box::new(move || -> Box<dyn ObjectModel> { Box::new(factory()) }),
        });
        self.by_name.insert(name.to_owned(), id);
        debug!(class = name, %id, ?passes, "class registered");
        Ok(id)
    }

    /// Require (or stop requiring) a name on objects of `class`.
    pub fn set_force_name(&mut self, class: ClassId, force: bool) -> ObjectResult<()> {
        let info = self
            .classes
            .get_mut(class.index())
            .ok_or_else(|| ObjectError::UnknownClass(class.to_string()))?;
        info.force_name = force;
        Ok(())
    }

    pub fn get(&self, class: ClassId) -> ObjectResult<&ClassInfo> {
        self.classes
            .get(class.index())
            .ok_or_else(|| ObjectError::UnknownClass(class.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter()
    }
}
