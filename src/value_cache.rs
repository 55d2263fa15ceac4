//! Per-field memoization slots owned by a [`Fieldcache`].
//!
//! A value stored in a [`FieldValueCache`] may only be read while its evaluation counter equals
//! the location counter of the owning cache. Nothing here checks that; the evaluation routines in
//! [`field`](crate::field) do.
use crate::field::FieldId;
use crate::field_cache::Fieldcache;
use crate::mesh::Element;
use crate::mesh_location::FindMeshLocationSettings;
use crate::MAXIMUM_ELEMENT_XI_DIMENSIONS;
use itertools::Itertools;

/// Evaluation counter value of a cache that holds no trustworthy value.
pub const EVALUATION_COUNTER_RESET: u64 = 0;

/// Result of the last find-element-xi search for a particular set of field values, with the mesh
/// field and settings it was searched with.
#[derive(Debug, Clone, PartialEq)]
pub struct FindElementXiCache {
    pub values: Vec<f64>,
    pub mesh_field: FieldId,
    pub settings: FindMeshLocationSettings,
    pub element: Element,
    pub xi: [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS],
}

/// Values and chart derivatives of a real-valued field.
#[derive(Debug, Clone)]
pub struct RealFieldValueCache {
    values: Vec<f64>,
    // Allocated for the maximum number of chart directions, used for `derivative_count`
    derivatives: Vec<f64>,
    derivative_count: usize,
    derivatives_valid: bool,
    find_element_xi_cache: Option<FindElementXiCache>,
}

impl RealFieldValueCache {
    pub fn new(component_count: usize) -> Self {
        Self {
            values: vec![0.0; component_count],
            derivatives: vec![0.0; component_count * MAXIMUM_ELEMENT_XI_DIMENSIONS],
            derivative_count: 0,
            derivatives_valid: false,
            find_element_xi_cache: None,
        }
    }

    pub fn component_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Copies as many values as fit; remaining values are left untouched.
    pub fn set_values(&mut self, values: &[f64]) {
        let n = values.len().min(self.values.len());
        self.values[..n].copy_from_slice(&values[..n]);
    }

    pub fn derivative_count(&self) -> usize {
        self.derivative_count
    }

    /// Derivatives laid out with `derivative_count()` entries per component.
    pub fn derivatives(&self) -> &[f64] {
        &self.derivatives[..self.values.len() * self.derivative_count]
    }

    /// Sets the number of chart directions and returns the derivative storage sized for it.
    ///
    /// Panics if `derivative_count` exceeds [`MAXIMUM_ELEMENT_XI_DIMENSIONS`].
    pub fn derivatives_mut(&mut self, derivative_count: usize) -> &mut [f64] {
        assert!(derivative_count <= MAXIMUM_ELEMENT_XI_DIMENSIONS);
        self.derivative_count = derivative_count;
        let n = self.values.len() * derivative_count;
        &mut self.derivatives[..n]
    }

    pub fn derivatives_valid(&self) -> bool {
        self.derivatives_valid
    }

    pub fn set_derivatives_valid(&mut self, valid: bool) {
        self.derivatives_valid = valid;
    }

    pub fn find_element_xi_cache(&self) -> Option<&FindElementXiCache> {
        self.find_element_xi_cache.as_ref()
    }

    pub fn set_find_element_xi_cache(&mut self, cache: Option<FindElementXiCache>) {
        self.find_element_xi_cache = cache;
    }

    fn clear_location_dependent(&mut self) {
        self.derivatives_valid = false;
        self.find_element_xi_cache = None;
    }

    pub fn get_as_string(&self) -> String {
        self.values.iter().map(|value| format_real(*value)).join(",")
    }
}

#[derive(Debug, Clone, Default)]
pub struct StringFieldValueCache {
    value: String,
}

impl StringFieldValueCache {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshLocationFieldValueCache {
    element: Option<Element>,
    xi: [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS],
}

impl MeshLocationFieldValueCache {
    pub fn element(&self) -> Option<&Element> {
        self.element.as_ref()
    }

    /// Chart coordinates, dimensioned to the element. Empty if no element is held.
    pub fn xi(&self) -> &[f64] {
        let dimension = self.element.as_ref().map_or(0, Element::dimension);
        &self.xi[..dimension]
    }

    /// Caller guarantees `xi` has at least `element.dimension()` entries.
    pub fn set_mesh_location(&mut self, element: Element, xi: &[f64]) {
        let dimension = element.dimension();
        self.xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        self.xi[..dimension].copy_from_slice(&xi[..dimension]);
        self.element = Some(element);
    }

    pub fn clear_mesh_location(&mut self) {
        self.element = None;
        self.xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
    }

    pub fn get_as_string(&self) -> String {
        match &self.element {
            Some(element) => {
                let xi = self.xi().iter().map(|x| format_real(*x)).join(" ");
                format!("{} : {}", element.identifier(), xi)
            }
            None => String::new(),
        }
    }
}

/// Typed payload of a [`FieldValueCache`].
#[derive(Debug)]
pub enum ValueStorage {
    Real(RealFieldValueCache),
    String(StringFieldValueCache),
    MeshLocation(MeshLocationFieldValueCache),
}

/// Memoized result of evaluating one field in one [`Fieldcache`].
#[derive(Debug)]
pub struct FieldValueCache {
    pub(crate) evaluation_counter: u64,
    extra_cache: Option<Box<Fieldcache>>,
    storage: ValueStorage,
}

impl FieldValueCache {
    pub fn new(storage: ValueStorage) -> Self {
        Self {
            evaluation_counter: EVALUATION_COUNTER_RESET,
            extra_cache: None,
            storage,
        }
    }

    pub fn new_real(component_count: usize) -> Self {
        Self::new(ValueStorage::Real(RealFieldValueCache::new(component_count)))
    }

    pub fn new_string() -> Self {
        Self::new(ValueStorage::String(StringFieldValueCache::default()))
    }

    pub fn new_mesh_location() -> Self {
        Self::new(ValueStorage::MeshLocation(MeshLocationFieldValueCache::default()))
    }

    pub fn evaluation_counter(&self) -> u64 {
        self.evaluation_counter
    }

    pub fn reset_evaluation_counter(&mut self) {
        self.evaluation_counter = EVALUATION_COUNTER_RESET;
    }

    /// Marks the stored value as never evaluated and drops location-dependent data.
    pub fn clear(&mut self) {
        self.reset_evaluation_counter();
        self.location_changed();
    }

    /// Eagerly drops data tied to the previous location; the stored value becomes stale by
    /// counter comparison alone.
    pub(crate) fn location_changed(&mut self) {
        if let ValueStorage::Real(real) = &mut self.storage {
            real.clear_location_dependent();
        }
    }

    pub fn storage(&self) -> &ValueStorage {
        &self.storage
    }

    pub fn as_real(&self) -> Option<&RealFieldValueCache> {
        match &self.storage {
            ValueStorage::Real(real) => Some(real),
            _ => None,
        }
    }

    pub fn as_real_mut(&mut self) -> Option<&mut RealFieldValueCache> {
        match &mut self.storage {
            ValueStorage::Real(real) => Some(real),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringFieldValueCache> {
        match &self.storage {
            ValueStorage::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn as_string_mut(&mut self) -> Option<&mut StringFieldValueCache> {
        match &mut self.storage {
            ValueStorage::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn as_mesh_location(&self) -> Option<&MeshLocationFieldValueCache> {
        match &self.storage {
            ValueStorage::MeshLocation(location) => Some(location),
            _ => None,
        }
    }

    pub fn as_mesh_location_mut(&mut self) -> Option<&mut MeshLocationFieldValueCache> {
        match &mut self.storage {
            ValueStorage::MeshLocation(location) => Some(location),
            _ => None,
        }
    }

    /// Number of components held; mesh locations and strings hold one.
    pub fn component_count(&self) -> usize {
        match &self.storage {
            ValueStorage::Real(real) => real.component_count(),
            _ => 1,
        }
    }

    /// Nested cache for field types that evaluate their sources at a different location.
    /// Created on first use with the time of `parent`.
    pub fn get_or_create_extra_cache(&mut self, parent: &Fieldcache) -> &mut Fieldcache {
        let extra_cache = self
            .extra_cache
            .get_or_insert_with(|| Box::new(parent.create_extra_cache()));
        if extra_cache.time() != parent.time() {
            extra_cache.set_time(parent.time());
        }
        extra_cache
    }

    pub fn extra_cache(&self) -> Option<&Fieldcache> {
        self.extra_cache.as_deref()
    }

    pub fn get_as_string(&self) -> String {
        match &self.storage {
            ValueStorage::Real(real) => real.get_as_string(),
            ValueStorage::String(string) => string.value().to_string(),
            ValueStorage::MeshLocation(location) => location.get_as_string(),
        }
    }
}

fn format_real(value: f64) -> String {
    // Rust's float formatting is the shortest representation that round-trips
    format!("{}", value)
}
