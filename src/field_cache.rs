//! The evaluation context: a domain location plus memoized per-field values.
use crate::error::{FieldError, FieldResult};
use crate::field::{Field, FieldId, FieldValueType};
use crate::field_module::{CacheRegistration, FieldModule, Region};
use crate::location::{FieldValuesLocation, Location, MeshLocation};
use crate::mesh::{Element, Mesh, Node, Nodeset};
use crate::value_cache::FieldValueCache;
use crate::MAXIMUM_ELEMENT_XI_DIMENSIONS;
use log::{debug, error, trace};
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Holds one domain location and a time, and the memoized values of every field evaluated there.
///
/// Every call that changes the location (including time) increments the location counter. Value
/// caches stamped with an older counter are stale and are recomputed on the next evaluation; they
/// are not destroyed until the `Fieldcache` is dropped.
///
/// A `Fieldcache` must only be used by one evaluation context at a time. Evaluation through it is
/// not reentrant.
pub struct Fieldcache {
    region: Rc<Region>,
    registration: Rc<CacheRegistration>,
    location: Location,
    time: f64,
    location_counter: u64,
    assign_in_cache_only: bool,
    value_caches: FxHashMap<FieldId, FieldValueCache>,
    evaluation_count: usize,
}

impl Fieldcache {
    pub(crate) fn new(region: Rc<Region>) -> Self {
        let registration = region.register_cache();
        debug!("Created field cache, {} live in region", region.live_cache_count());
        Self {
            region,
            registration,
            location: Location::None,
            time: 0.0,
            // Value caches start at EVALUATION_COUNTER_RESET, so they are stale from the outset
            location_counter: 1,
            assign_in_cache_only: false,
            value_caches: FxHashMap::default(),
            evaluation_count: 0,
        }
    }

    /// A cache for nested evaluation at derived locations, sharing this cache's region and time.
    pub(crate) fn create_extra_cache(&self) -> Fieldcache {
        let mut cache = Fieldcache::new(self.region.clone());
        cache.time = self.time;
        cache
    }

    pub fn fieldmodule(&self) -> FieldModule {
        FieldModule::from_region(self.region.clone())
    }

    pub(crate) fn region(&self) -> &Rc<Region> {
        &self.region
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Generation id of the current location. Strictly increases with every location change.
    pub fn location_counter(&self) -> u64 {
        self.location_counter
    }

    /// Number of type-specific evaluations performed through this cache, i.e. evaluations that
    /// were not served from memoized values.
    pub fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    /// Sets the time without changing the spatial location.
    ///
    /// Time dependence of fields is not tracked, so this invalidates every cached value.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.increment_location_counter();
    }

    /// Sets a mesh location at the chart origin of `element`.
    pub fn set_element(&mut self, element: &Element) -> FieldResult<()> {
        let xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        self.set_mesh_location(element, &xi, None)
    }

    /// Sets the location to chart coordinates `xi` in `element`.
    ///
    /// `xi` must have at least `element.dimension()` entries. The optional `top_level_element`
    /// lets dependent fields use values defined on a higher-dimensional parent.
    pub fn set_mesh_location(
        &mut self,
        element: &Element,
        xi: &[f64],
        top_level_element: Option<&Element>,
    ) -> FieldResult<()> {
        if xi.len() < element.dimension() {
            error!(
                "Fieldcache set_mesh_location. Need {} chart coordinates, got {}",
                element.dimension(),
                xi.len()
            );
            return Err(FieldError::invalid_argument("too few chart coordinates"));
        }
        self.check_element(element)?;
        if let Some(top_level_element) = top_level_element {
            if top_level_element.dimension() < element.dimension() {
                error!("Fieldcache set_mesh_location. Top level element has lower dimension than element");
                return Err(FieldError::invalid_argument("top level element dimension too low"));
            }
            self.check_element(top_level_element)?;
        }
        let location = MeshLocation::new(element.clone(), xi, top_level_element.cloned());
        self.change_location(Location::MeshLocation(location));
        Ok(())
    }

    pub fn set_node(&mut self, node: &Node) -> FieldResult<()> {
        if !Nodeset::new(self.region.clone()).contains(node) {
            error!("Fieldcache set_node. {:?} is not from this region", node);
            return Err(FieldError::invalid_argument("node is not from this region"));
        }
        self.change_location(Location::Node(node.clone()));
        Ok(())
    }

    /// Prescribes the values of `field`. Evaluating `field` returns `values`, zero-padded or
    /// truncated to its component count, and fields depending on it see those values.
    pub fn set_field_real(&mut self, field: &Field, values: &[f64]) -> FieldResult<()> {
        self.set_field_real_with_derivatives(field, values, 0, &[])
    }

    /// As [`set_field_real`](Self::set_field_real), additionally prescribing `derivative_count`
    /// chart derivatives per component.
    pub fn set_field_real_with_derivatives(
        &mut self,
        field: &Field,
        values: &[f64],
        derivative_count: usize,
        derivatives: &[f64],
    ) -> FieldResult<()> {
        if !field.belongs_to(&self.region) {
            error!("Fieldcache set_field_real. Field {} is from another region", field.name());
            return Err(FieldError::invalid_argument("field is from another region"));
        }
        if field.value_type() != FieldValueType::Real {
            error!("Fieldcache set_field_real. Field {} is not numerical", field.name());
            return Err(FieldError::invalid_argument("field is not numerical"));
        }
        if values.is_empty() {
            error!("Fieldcache set_field_real. No values supplied");
            return Err(FieldError::invalid_argument("no values supplied"));
        }
        if derivative_count > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            error!(
                "Fieldcache set_field_real_with_derivatives. At most {} derivatives supported",
                MAXIMUM_ELEMENT_XI_DIMENSIONS
            );
            return Err(FieldError::invalid_argument("too many derivative directions"));
        }
        let location = FieldValuesLocation::new(field.clone(), values, derivative_count, derivatives);
        self.change_location(Location::FieldValues(location));
        Ok(())
    }

    /// Removes any spatial location, keeping the time.
    pub fn clear_location(&mut self) {
        self.change_location(Location::None);
    }

    pub fn is_assign_in_cache_only(&self) -> bool {
        self.assign_in_cache_only
    }

    /// Internal toggle for speculative evaluation: while set, assignments write only into this
    /// cache's value caches and are observed by later evaluations at the same location.
    ///
    /// The caller must clear it afterwards. Changing location discards speculative values.
    #[doc(hidden)]
    pub fn set_assign_in_cache_only(&mut self, value: bool) {
        self.assign_in_cache_only = value;
    }

    fn check_element(&self, element: &Element) -> FieldResult<()> {
        if Mesh::new(self.region.clone(), element.dimension()).contains(element) {
            Ok(())
        } else {
            error!("Fieldcache set_mesh_location. {:?} is not from this region", element);
            Err(FieldError::invalid_argument("element is not from this region"))
        }
    }

    fn change_location(&mut self, location: Location) {
        self.location = location;
        self.increment_location_counter();
    }

    fn increment_location_counter(&mut self) {
        self.location_counter += 1;
        for value_cache in self.value_caches.values_mut() {
            value_cache.location_changed();
        }
    }

    /// Applies a pending change notification from the region, invalidating every cached value.
    pub(crate) fn sync_region_changes(&mut self) {
        if self.registration.take_changed() {
            trace!("Field cache invalidated by region change");
            self.increment_location_counter();
        }
    }

    pub(crate) fn record_evaluation(&mut self) {
        self.evaluation_count += 1;
    }

    pub(crate) fn value_cache(&self, id: FieldId) -> Option<&FieldValueCache> {
        self.value_caches.get(&id)
    }

    pub(crate) fn value_cache_mut(&mut self, id: FieldId) -> Option<&mut FieldValueCache> {
        self.value_caches.get_mut(&id)
    }

    /// Removes a value cache while its field evaluates into it; the field graph is acyclic, so
    /// no source evaluation can ask for it in the meantime.
    pub(crate) fn take_value_cache(&mut self, id: FieldId) -> Option<FieldValueCache> {
        self.value_caches.remove(&id)
    }

    pub(crate) fn put_value_cache(&mut self, id: FieldId, value_cache: FieldValueCache) {
        self.value_caches.insert(id, value_cache);
    }

    /// Number of fields that have value caches in this cache.
    pub fn value_cache_count(&self) -> usize {
        self.value_caches.len()
    }
}

impl Drop for Fieldcache {
    fn drop(&mut self) {
        self.region.deregister_cache(&self.registration);
        debug!(
            "Destroyed field cache with {} value caches, {} live in region",
            self.value_caches.len(),
            self.region.live_cache_count()
        );
    }
}

impl fmt::Debug for Fieldcache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fieldcache")
            .field("location", &self.location)
            .field("time", &self.time)
            .field("location_counter", &self.location_counter)
            .field("assign_in_cache_only", &self.assign_in_cache_only)
            .field("value_caches", &self.value_caches.len())
            .finish()
    }
}
