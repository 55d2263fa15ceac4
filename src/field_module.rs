//! Regions and field modules: the owners of fields, nodes, elements and live caches.
use crate::error::{FieldError, FieldResult};
use crate::field::{CoordinateSystem, CoordinateSystemType, Field, FieldCore, FieldData, FieldDefinition, FieldId};
use crate::field_cache::Fieldcache;
use crate::mesh::{Element, Mesh, Node, Nodeset};
use crate::MAXIMUM_ELEMENT_XI_DIMENSIONS;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Settings fixed when a [`FieldModule`] is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldModuleSettings {
    /// Coordinate system given to new numerical fields that do not inherit one from a source.
    pub default_coordinate_system: CoordinateSystem,
    pub automatic_name_prefix: String,
    /// Whether setting an explicit name taken by a field with an automatic name renames that
    /// field instead of failing.
    pub replace_automatic_names: bool,
}

impl Default for FieldModuleSettings {
    fn default() -> Self {
        Self {
            default_coordinate_system: CoordinateSystem::default(),
            automatic_name_prefix: "temp".to_string(),
            replace_automatic_names: true,
        }
    }
}

/// Change flag shared between a region and one live [`Fieldcache`].
#[derive(Debug, Default)]
pub(crate) struct CacheRegistration {
    changed: Cell<bool>,
}

impl CacheRegistration {
    /// Returns whether the region changed since the last call, clearing the flag.
    pub(crate) fn take_changed(&self) -> bool {
        self.changed.replace(false)
    }
}

enum FieldEntry {
    Managed(Field),
    Unmanaged(Weak<FieldData>),
}

impl FieldEntry {
    fn field(&self) -> Option<Field> {
        match self {
            FieldEntry::Managed(field) => Some(field.clone()),
            FieldEntry::Unmanaged(data) => data.upgrade().map(Field),
        }
    }
}

/// Shared state behind a [`FieldModule`].
pub(crate) struct Region {
    pub(crate) settings: FieldModuleSettings,
    pub(crate) nodes: RefCell<BTreeMap<i32, Node>>,
    pub(crate) elements: [RefCell<BTreeMap<i32, Element>>; MAXIMUM_ELEMENT_XI_DIMENSIONS],
    fields: RefCell<BTreeMap<String, FieldEntry>>,
    caches: RefCell<Vec<Weak<CacheRegistration>>>,
    next_field_id: Cell<FieldId>,
    change_counter: Cell<u64>,
}

impl Region {
    fn new(settings: FieldModuleSettings) -> Self {
        Self {
            settings,
            nodes: RefCell::default(),
            elements: Default::default(),
            fields: RefCell::default(),
            caches: RefCell::default(),
            next_field_id: Cell::new(0),
            change_counter: Cell::new(0),
        }
    }

    pub(crate) fn register_cache(&self) -> Rc<CacheRegistration> {
        let registration = Rc::new(CacheRegistration::default());
        let mut caches = self.caches.borrow_mut();
        caches.retain(|cache| cache.strong_count() > 0);
        caches.push(Rc::downgrade(&registration));
        registration
    }

    pub(crate) fn deregister_cache(&self, registration: &Rc<CacheRegistration>) {
        let target = Rc::downgrade(registration);
        self.caches
            .borrow_mut()
            .retain(|cache| !cache.ptr_eq(&target) && cache.strong_count() > 0);
    }

    pub(crate) fn live_cache_count(&self) -> usize {
        self.caches
            .borrow()
            .iter()
            .filter(|cache| cache.strong_count() > 0)
            .count()
    }

    /// Marks every live cache as invalid after a persistent change to fields, nodes or elements.
    pub(crate) fn notify_changed(&self) {
        self.change_counter.set(self.change_counter.get() + 1);
        for cache in self.caches.borrow().iter().filter_map(Weak::upgrade) {
            cache.changed.set(true);
        }
    }

    /// Number of persistent changes made to the region so far.
    pub(crate) fn change_counter(&self) -> u64 {
        self.change_counter.get()
    }

    fn find_field_by_name(&self, name: &str) -> Option<Field> {
        self.fields.borrow().get(name).and_then(FieldEntry::field)
    }

    fn fields(&self) -> Vec<Field> {
        self.fields
            .borrow()
            .values()
            .filter_map(FieldEntry::field)
            .collect()
    }

    fn purge_dropped_fields(&self) {
        self.fields
            .borrow_mut()
            .retain(|_, entry| !matches!(entry, FieldEntry::Unmanaged(data) if data.strong_count() == 0));
    }

    /// First unused name of the form `<prefix><n>`.
    fn unique_automatic_name(&self) -> String {
        self.purge_dropped_fields();
        let fields = self.fields.borrow();
        let prefix = &self.settings.automatic_name_prefix;
        (fields.len() + 1..)
            .map(|n| format!("{}{}", prefix, n))
            .find(|name| !fields.contains_key(name))
            .unwrap_or_else(|| prefix.clone())
    }

    fn insert_entry(&self, name: String, field: &Field) {
        let entry = if field.is_managed() {
            FieldEntry::Managed(field.clone())
        } else {
            FieldEntry::Unmanaged(field.downgrade())
        };
        self.fields.borrow_mut().insert(name, entry);
    }

    pub(crate) fn rename_field(&self, field: &Field, name: &str) -> FieldResult<()> {
        if name.is_empty() {
            return Err(FieldError::invalid_argument("field name must not be empty"));
        }
        let current_name = field.name();
        if current_name == name {
            field.0.automatic_name.set(false);
            return Ok(());
        }
        if let Some(existing) = self.find_field_by_name(name) {
            if existing.has_automatic_name() && self.settings.replace_automatic_names {
                let replacement = self.unique_automatic_name();
                warn!(
                    "Renaming field {} to {} to make way for explicitly named field",
                    name, replacement
                );
                self.fields.borrow_mut().remove(name);
                *existing.0.name.borrow_mut() = replacement.clone();
                self.insert_entry(replacement, &existing);
            } else {
                error!("Field set_name. Name {} is in use", name);
                return Err(FieldError::NameInUse(name.to_string()));
            }
        }
        self.fields.borrow_mut().remove(&current_name);
        *field.0.name.borrow_mut() = name.to_string();
        field.0.automatic_name.set(false);
        self.insert_entry(name.to_string(), field);
        Ok(())
    }

    pub(crate) fn set_field_managed(&self, field: &Field, managed: bool) {
        let name = field.name();
        let mut fields = self.fields.borrow_mut();
        if let Some(entry) = fields.get_mut(&name) {
            *entry = if managed {
                FieldEntry::Managed(field.clone())
            } else {
                FieldEntry::Unmanaged(field.downgrade())
            };
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("nodes", &self.nodes.borrow().len())
            .field("fields", &self.fields.borrow().len())
            .field("live_caches", &self.live_cache_count())
            .field("change_counter", &self.change_counter.get())
            .finish()
    }
}

/// Handle to a region through which fields, caches, nodes and elements are created.
///
/// Cloning gives another handle to the same region. The region lives as long as any module
/// handle, cache, nodeset or mesh refers to it; fields alone do not keep it alive.
#[derive(Clone, Debug)]
pub struct FieldModule {
    region: Rc<Region>,
}

impl PartialEq for FieldModule {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.region, &other.region)
    }
}

impl Default for FieldModule {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldModule {
    /// Creates a module for a new, empty region.
    pub fn new() -> Self {
        Self::with_settings(FieldModuleSettings::default())
    }

    pub fn with_settings(settings: FieldModuleSettings) -> Self {
        Self {
            region: Rc::new(Region::new(settings)),
        }
    }

    pub(crate) fn from_region(region: Rc<Region>) -> Self {
        Self { region }
    }

    pub(crate) fn region(&self) -> &Rc<Region> {
        &self.region
    }

    pub fn settings(&self) -> &FieldModuleSettings {
        &self.region.settings
    }

    pub fn create_fieldcache(&self) -> Fieldcache {
        Fieldcache::new(self.region.clone())
    }

    pub fn nodeset(&self) -> Nodeset {
        Nodeset::new(self.region.clone())
    }

    /// The mesh of elements with the given dimension, from 1 to 3.
    pub fn mesh(&self, dimension: usize) -> FieldResult<Mesh> {
        if (1..=MAXIMUM_ELEMENT_XI_DIMENSIONS).contains(&dimension) {
            Ok(Mesh::new(self.region.clone(), dimension))
        } else {
            Err(FieldError::invalid_argument(format!("no mesh of dimension {}", dimension)))
        }
    }

    pub fn find_field_by_name(&self, name: &str) -> Option<Field> {
        self.region.find_field_by_name(name)
    }

    /// All live fields of the region, in order of name.
    pub fn fields(&self) -> Vec<Field> {
        self.region.fields()
    }

    /// Number of persistent changes made to fields, nodes and elements of the region.
    pub fn change_counter(&self) -> u64 {
        self.region.change_counter()
    }

    pub(crate) fn check_source_field(&self, field: &Field, function: &str) -> FieldResult<()> {
        if field.belongs_to(&self.region) {
            Ok(())
        } else {
            error!("{}. Source field {} is from another region", function, field.name());
            Err(FieldError::invalid_argument("source field is from another region"))
        }
    }

    /// Creates an unmanaged field with an automatic name.
    ///
    /// Non-numerical fields get coordinate system type `NotApplicable`; numerical fields get
    /// `coordinate_system` or else the module default.
    pub(crate) fn create_field(
        &self,
        component_count: usize,
        source_fields: Vec<Field>,
        source_values: Vec<f64>,
        core: Rc<dyn FieldCore>,
        coordinate_system: Option<CoordinateSystem>,
    ) -> FieldResult<Field> {
        if component_count == 0 {
            return Err(FieldError::invalid_argument("fields need at least one component"));
        }
        let coordinate_system = if core.value_type() == crate::field::FieldValueType::Real {
            coordinate_system.unwrap_or(self.region.settings.default_coordinate_system)
        } else {
            CoordinateSystem::new(CoordinateSystemType::NotApplicable)
        };
        let id = self.region.next_field_id.get();
        self.region.next_field_id.set(id + 1);
        let name = self.region.unique_automatic_name();
        let field = Field(Rc::new(FieldData {
            id,
            region: Rc::downgrade(&self.region),
            name: RefCell::new(name.clone()),
            automatic_name: Cell::new(true),
            component_count,
            coordinate_system: Cell::new(coordinate_system),
            managed: Cell::new(false),
            definition: RefCell::new(FieldDefinition {
                core,
                source_fields,
                source_values,
            }),
        }));
        self.region.insert_entry(name, &field);
        debug!("Created {} field {}", field.field_type(), field.name());
        Ok(field)
    }
}
