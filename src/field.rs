//! Fields: typed nodes of the evaluation graph, and their evaluate/assign dispatch.
use crate::error::{FieldError, FieldResult};
use crate::field_cache::Fieldcache;
use crate::field_module::{FieldModule, Region};
use crate::mesh::Element;
use crate::value_cache::{FieldValueCache, RealFieldValueCache};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Index of a field's value cache in any [`Fieldcache`] of its region. Unique within the region.
pub(crate) type FieldId = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValueType {
    Real,
    String,
    MeshLocation,
}

/// The kind of a field, as determined by the function that created it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Composite,
    Identity,
    Component,
    Concatenate,
    Constant,
    FiniteElement,
    StringConstant,
    TimeValue,
    StoredMeshLocation,
    FindMeshLocation,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Composite => "composite",
            FieldType::Identity => "identity",
            FieldType::Component => "component",
            FieldType::Concatenate => "concatenate",
            FieldType::Constant => "constant",
            FieldType::FiniteElement => "finite_element",
            FieldType::StringConstant => "string_constant",
            FieldType::TimeValue => "time_value",
            FieldType::StoredMeshLocation => "stored_mesh_location",
            FieldType::FindMeshLocation => "find_mesh_location",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateSystemType {
    RectangularCartesian,
    CylindricalPolar,
    SphericalPolar,
    ProlateSpheroidal,
    OblateSpheroidal,
    Fibre,
    NotApplicable,
}

/// Coordinate system of a field's values. The focus is only meaningful for the prolate and
/// oblate spheroidal types.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub system_type: CoordinateSystemType,
    pub focus: f64,
}

impl CoordinateSystem {
    pub fn new(system_type: CoordinateSystemType) -> Self {
        Self {
            system_type,
            focus: 1.0,
        }
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::new(CoordinateSystemType::RectangularCartesian)
    }
}

/// Type-specific behaviour of a field.
///
/// Implementations read source fields and source values through the [`Field`] passed to each
/// method. Evaluation methods fill the supplied value cache; the generic code in [`Field`]
/// handles memoization, field-value locations and counters.
pub(crate) trait FieldCore: fmt::Debug {
    fn field_type(&self) -> FieldType;

    fn value_type(&self) -> FieldValueType {
        FieldValueType::Real
    }

    fn create_value_cache(&self, component_count: usize) -> FieldValueCache {
        match self.value_type() {
            FieldValueType::Real => FieldValueCache::new_real(component_count),
            FieldValueType::String => FieldValueCache::new_string(),
            FieldValueType::MeshLocation => FieldValueCache::new_mesh_location(),
        }
    }

    fn evaluate(&self, field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()>;

    /// Fills `derivative_count` chart derivatives per component. Values in `value_cache` are
    /// already up to date.
    fn evaluate_derivatives(
        &self,
        _field: &Field,
        _cache: &mut Fieldcache,
        _value_cache: &mut RealFieldValueCache,
        _derivative_count: usize,
    ) -> FieldResult<()> {
        Err(FieldError::EvaluationFailed(format!(
            "derivatives are not implemented for {} fields",
            self.field_type()
        )))
    }

    /// Assigns the values already placed in `value_cache`.
    fn assign(&self, _field: &Field, _cache: &mut Fieldcache, _value_cache: &mut FieldValueCache) -> FieldResult<()> {
        Err(FieldError::AssignmentNotSupported {
            field_type: self.field_type(),
        })
    }

    fn is_defined_at_location(&self, field: &Field, cache: &mut Fieldcache) -> bool {
        field
            .source_fields()
            .iter()
            .all(|source| source.is_defined_internal(cache))
    }

    /// Component names default to the component number, starting at 1.
    fn component_name(&self, index: usize) -> String {
        (index + 1).to_string()
    }

    fn set_component_name(&self, _index: usize, _name: &str) -> FieldResult<()> {
        Err(FieldError::invalid_argument("component names can not be set for this field type"))
    }

    fn is_type_coordinate(&self) -> bool {
        false
    }

    fn set_type_coordinate(&self, value: bool) -> FieldResult<()> {
        if value {
            Err(FieldError::invalid_argument("field type can not be a coordinate field"))
        } else {
            Ok(())
        }
    }

    fn command_string(&self, field: &Field) -> String;

    /// Whether `other` has an equivalent type-specific definition.
    fn compare(&self, other: &dyn FieldCore) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Sources and type-specific behaviour of a field, replaceable as a whole.
#[derive(Debug, Clone)]
pub(crate) struct FieldDefinition {
    pub core: Rc<dyn FieldCore>,
    pub source_fields: Vec<Field>,
    pub source_values: Vec<f64>,
}

pub(crate) struct FieldData {
    pub id: FieldId,
    pub region: Weak<Region>,
    pub name: RefCell<String>,
    pub automatic_name: Cell<bool>,
    pub component_count: usize,
    pub coordinate_system: Cell<CoordinateSystem>,
    pub managed: Cell<bool>,
    pub definition: RefCell<FieldDefinition>,
}

/// Shared handle to a field. Clones refer to the same field; equality is identity.
///
/// Fields keep their source fields alive but not their region: a field whose
/// [`FieldModule`] has been dropped can no longer be evaluated.
#[derive(Clone)]
pub struct Field(pub(crate) Rc<FieldData>);

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Field {}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({:?}, {})", self.name(), self.field_type())
    }
}

impl Field {
    pub(crate) fn id(&self) -> FieldId {
        self.0.id
    }

    pub(crate) fn definition(&self) -> Ref<FieldDefinition> {
        self.0.definition.borrow()
    }

    pub(crate) fn region(&self) -> Option<Rc<Region>> {
        self.0.region.upgrade()
    }

    pub(crate) fn belongs_to(&self, region: &Rc<Region>) -> bool {
        std::ptr::eq(self.0.region.as_ptr(), Rc::as_ptr(region))
    }

    pub(crate) fn downgrade(&self) -> Weak<FieldData> {
        Rc::downgrade(&self.0)
    }

    /// The module of the field's region, or `None` if the region no longer exists.
    pub fn fieldmodule(&self) -> Option<FieldModule> {
        self.region().map(FieldModule::from_region)
    }

    pub fn name(&self) -> String {
        self.0.name.borrow().clone()
    }

    /// Renames the field. Names are unique within a region.
    pub fn set_name(&self, name: &str) -> FieldResult<()> {
        let region = self
            .region()
            .ok_or_else(|| FieldError::invalid_argument("field region no longer exists"))?;
        region.rename_field(self, name)
    }

    pub fn has_automatic_name(&self) -> bool {
        self.0.automatic_name.get()
    }

    pub fn component_count(&self) -> usize {
        self.0.component_count
    }

    /// Name of the component at zero-based `index`.
    pub fn component_name(&self, index: usize) -> Option<String> {
        (index < self.component_count()).then(|| self.definition().core.component_name(index))
    }

    pub fn set_component_name(&self, index: usize, name: &str) -> FieldResult<()> {
        if index >= self.component_count() {
            return Err(FieldError::invalid_argument("component index out of range"));
        }
        self.definition().core.set_component_name(index, name)
    }

    pub fn value_type(&self) -> FieldValueType {
        self.definition().core.value_type()
    }

    pub fn field_type(&self) -> FieldType {
        self.definition().core.field_type()
    }

    pub fn is_numerical(&self) -> bool {
        self.value_type() == FieldValueType::Real
    }

    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.0.coordinate_system.get()
    }

    /// Non-numerical fields may only have coordinate system type `NotApplicable`.
    pub fn set_coordinate_system(&self, coordinate_system: CoordinateSystem) -> FieldResult<()> {
        if coordinate_system.system_type != CoordinateSystemType::NotApplicable && !self.is_numerical() {
            error!(
                "Field set_coordinate_system. Non-numeric field {} may only have coordinate system type NotApplicable",
                self.name()
            );
            return Err(FieldError::invalid_argument("non-numeric fields have no coordinate system"));
        }
        if coordinate_system.focus <= 0.0 {
            return Err(FieldError::invalid_argument("coordinate system focus must be positive"));
        }
        self.0.coordinate_system.set(coordinate_system);
        Ok(())
    }

    pub fn set_coordinate_system_type(&self, system_type: CoordinateSystemType) -> FieldResult<()> {
        let focus = self.coordinate_system().focus;
        self.set_coordinate_system(CoordinateSystem { system_type, focus })
    }

    pub fn set_coordinate_system_focus(&self, focus: f64) -> FieldResult<()> {
        let system_type = self.coordinate_system().system_type;
        self.set_coordinate_system(CoordinateSystem { system_type, focus })
    }

    pub fn is_managed(&self) -> bool {
        self.0.managed.get()
    }

    /// A managed field is kept alive by its region even when no other handle to it exists.
    pub fn set_managed(&self, managed: bool) {
        if self.0.managed.replace(managed) != managed {
            if let Some(region) = self.region() {
                region.set_field_managed(self, managed);
            }
        }
    }

    pub fn is_type_coordinate(&self) -> bool {
        self.definition().core.is_type_coordinate()
    }

    pub fn set_type_coordinate(&self, value: bool) -> FieldResult<()> {
        self.definition().core.set_type_coordinate(value)
    }

    pub fn source_fields(&self) -> Vec<Field> {
        self.definition().source_fields.clone()
    }

    pub fn source_field(&self, index: usize) -> Option<Field> {
        self.definition().source_fields.get(index).cloned()
    }

    /// Whether this field is `other` or depends on it directly or indirectly.
    pub fn depends_on_field(&self, other: &Field) -> bool {
        self == other
            || self
                .definition()
                .source_fields
                .iter()
                .any(|source| source.depends_on_field(other))
    }

    /// Text description of the field's definition.
    pub fn command_string(&self) -> String {
        let core = self.definition().core.clone();
        core.command_string(self)
    }

    /// Whether both fields have equivalent definitions: same type, source fields and values.
    pub fn compare_definition(&self, other: &Field) -> bool {
        let this = self.definition();
        let that = other.definition();
        self.component_count() == other.component_count()
            && this.source_fields == that.source_fields
            && this.source_values == that.source_values
            && this.core.compare(that.core.as_ref())
    }

    /// Replaces the definition of this field with that of `source`, keeping this field's name
    /// and identity so that fields depending on it pick up the new definition.
    ///
    /// Fails if `source` depends on this field, is from another region, or has a different
    /// number of components or value type. Finite element parameter storage is shared, not
    /// copied.
    pub fn copy_definition(&self, source: &Field) -> FieldResult<()> {
        let region = self
            .region()
            .ok_or_else(|| FieldError::invalid_argument("field region no longer exists"))?;
        if !source.belongs_to(&region) {
            error!("Field copy_definition. Source field {} is from another region", source.name());
            return Err(FieldError::invalid_argument("source field is from another region"));
        }
        if source.depends_on_field(self) {
            error!(
                "Field copy_definition. Source field {} depends on field {}",
                source.name(),
                self.name()
            );
            return Err(FieldError::invalid_argument("source field depends on field"));
        }
        if source.component_count() != self.component_count() || source.value_type() != self.value_type() {
            error!(
                "Field copy_definition. Field {} and source field {} are incompatible",
                self.name(),
                source.name()
            );
            return Err(FieldError::invalid_argument("incompatible component count or value type"));
        }
        let definition = source.definition().clone();
        *self.0.definition.borrow_mut() = definition;
        region.notify_changed();
        Ok(())
    }

    fn check_cache(&self, cache: &Fieldcache) -> FieldResult<()> {
        if self.belongs_to(cache.region()) {
            Ok(())
        } else {
            error!("Field {}. Field cache is from another region", self.name());
            Err(FieldError::invalid_argument("field cache is from another region"))
        }
    }

    fn check_value_type(&self, value_type: FieldValueType) -> FieldResult<()> {
        if self.value_type() == value_type {
            Ok(())
        } else {
            Err(FieldError::invalid_argument(format!(
                "field {} does not have value type {:?}",
                self.name(),
                value_type
            )))
        }
    }

    /// Evaluates all components into `values`, which must hold at least `component_count()`
    /// entries.
    pub fn evaluate_real(&self, cache: &mut Fieldcache, values: &mut [f64]) -> FieldResult<()> {
        self.check_cache(cache)?;
        self.check_value_type(FieldValueType::Real)?;
        let n = self.component_count();
        if values.len() < n {
            return Err(FieldError::invalid_argument("too few values requested"));
        }
        cache.sync_region_changes();
        let real = self.evaluate_real_cache(cache)?;
        values[..n].copy_from_slice(real.values());
        Ok(())
    }

    /// Evaluates values and first derivatives with respect to chart coordinates. Requires a
    /// mesh location, or a field-value location with prescribed derivatives.
    ///
    /// Derivatives are written with one entry per chart direction for each component. Returns
    /// the number of chart directions.
    pub fn evaluate_real_with_derivatives(
        &self,
        cache: &mut Fieldcache,
        values: &mut [f64],
        derivatives: &mut [f64],
    ) -> FieldResult<usize> {
        self.check_cache(cache)?;
        self.check_value_type(FieldValueType::Real)?;
        let n = self.component_count();
        let derivative_count = cache
            .location()
            .derivative_count()
            .ok_or_else(|| FieldError::invalid_argument("derivatives require a mesh location"))?;
        if values.len() < n || derivatives.len() < n * derivative_count {
            return Err(FieldError::invalid_argument("too few values requested"));
        }
        cache.sync_region_changes();
        let real = self.evaluate_derivatives(cache)?;
        values[..n].copy_from_slice(real.values());
        derivatives[..n * derivative_count].copy_from_slice(real.derivatives());
        Ok(derivative_count)
    }

    /// Evaluates the field and renders its value as a string. Numerical fields give their
    /// components comma separated; mesh locations give `"<element id> : xi1 xi2 ..."`.
    pub fn evaluate_string(&self, cache: &mut Fieldcache) -> FieldResult<String> {
        self.check_cache(cache)?;
        cache.sync_region_changes();
        Ok(self.evaluate(cache)?.get_as_string())
    }

    /// Evaluates a mesh location field, writing its chart coordinates into `xi`, which must have
    /// room for the element dimension.
    pub fn evaluate_mesh_location(&self, cache: &mut Fieldcache, xi: &mut [f64]) -> FieldResult<Element> {
        self.check_cache(cache)?;
        self.check_value_type(FieldValueType::MeshLocation)?;
        cache.sync_region_changes();
        let location = self
            .evaluate(cache)?
            .as_mesh_location()
            .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?;
        let element = location
            .element()
            .ok_or(FieldError::NotDefined)?
            .clone();
        let location_xi = location.xi();
        if xi.len() < location_xi.len() {
            return Err(FieldError::invalid_argument("too few chart coordinates requested"));
        }
        xi[..location_xi.len()].copy_from_slice(location_xi);
        Ok(element)
    }

    /// True if any component is non-zero beyond a small tolerance. Undefined is false.
    pub fn evaluate_boolean(&self, cache: &mut Fieldcache) -> bool {
        const ZERO_TOLERANCE: f64 = 1e-6;
        if self.check_cache(cache).is_err() || !self.is_numerical() {
            return false;
        }
        cache.sync_region_changes();
        self.evaluate_real_cache(cache)
            .map(|real| real.values().iter().any(|v| v.abs() > ZERO_TOLERANCE))
            .unwrap_or(false)
    }

    pub fn is_defined_at_location(&self, cache: &mut Fieldcache) -> bool {
        if self.check_cache(cache).is_err() {
            return false;
        }
        cache.sync_region_changes();
        self.is_defined_internal(cache)
    }

    /// Assigns `values` (at least `component_count()` of them) at the cache location.
    pub fn assign_real(&self, cache: &mut Fieldcache, values: &[f64]) -> FieldResult<()> {
        self.check_cache(cache)?;
        self.check_value_type(FieldValueType::Real)?;
        if values.len() < self.component_count() {
            return Err(FieldError::invalid_argument("too few values supplied"));
        }
        cache.sync_region_changes();
        self.assign_real_internal(cache, values)
    }

    pub fn assign_string(&self, cache: &mut Fieldcache, value: &str) -> FieldResult<()> {
        self.check_cache(cache)?;
        self.check_value_type(FieldValueType::String)?;
        cache.sync_region_changes();
        self.assign_with(cache, |value_cache| {
            value_cache
                .as_string_mut()
                .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
                .set_value(value);
            Ok(())
        })
    }

    pub fn assign_mesh_location(&self, cache: &mut Fieldcache, element: &Element, xi: &[f64]) -> FieldResult<()> {
        self.check_cache(cache)?;
        self.check_value_type(FieldValueType::MeshLocation)?;
        if xi.len() < element.dimension() {
            return Err(FieldError::invalid_argument("too few chart coordinates supplied"));
        }
        cache.sync_region_changes();
        self.assign_with(cache, |value_cache| {
            value_cache
                .as_mesh_location_mut()
                .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
                .set_mesh_location(element.clone(), xi);
            Ok(())
        })
    }

    pub(crate) fn assign_real_internal(&self, cache: &mut Fieldcache, values: &[f64]) -> FieldResult<()> {
        self.assign_with(cache, |value_cache| {
            value_cache
                .as_real_mut()
                .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
                .set_values(values);
            Ok(())
        })
    }

    fn assign_with<F>(&self, cache: &mut Fieldcache, set_values: F) -> FieldResult<()>
    where
        F: FnOnce(&mut FieldValueCache) -> FieldResult<()>,
    {
        let id = self.id();
        let mut value_cache = self.take_or_create_value_cache(cache);
        let result = set_values(&mut value_cache).and_then(|_| {
            let core = self.definition().core.clone();
            core.assign(self, cache, &mut value_cache)
        });
        if result.is_ok() && cache.is_assign_in_cache_only() {
            let location_counter = cache.location_counter();
            if value_cache.evaluation_counter() == location_counter {
                debug!(
                    "Field {} assigned in cache more than once at the same location",
                    self.name()
                );
            }
            value_cache.evaluation_counter = location_counter;
            if let Some(real) = value_cache.as_real_mut() {
                real.set_derivatives_valid(false);
            }
        } else {
            // Supplied values are never trusted; evaluate again from the assigned state
            value_cache.reset_evaluation_counter();
        }
        cache.put_value_cache(id, value_cache);
        result
    }

    pub(crate) fn is_defined_internal(&self, cache: &mut Fieldcache) -> bool {
        if let Some(location) = cache.location().field_values() {
            if location.field() == self {
                return true;
            }
        }
        let core = self.definition().core.clone();
        core.is_defined_at_location(self, cache)
    }

    fn take_or_create_value_cache(&self, cache: &mut Fieldcache) -> FieldValueCache {
        let definition = self.definition();
        match cache.take_value_cache(self.id()) {
            Some(value_cache) if value_cache.component_count() == self.component_count() => value_cache,
            _ => definition.core.create_value_cache(self.component_count()),
        }
    }

    /// Evaluates the field at the cache location, reusing the memoized value if it was computed
    /// at the current location counter.
    pub(crate) fn evaluate<'c>(&self, cache: &'c mut Fieldcache) -> FieldResult<&'c FieldValueCache> {
        let id = self.id();
        let location_counter = cache.location_counter();
        let up_to_date = cache
            .value_cache(id)
            .map_or(false, |value_cache| value_cache.evaluation_counter() == location_counter);
        if !up_to_date {
            let mut value_cache = self.take_or_create_value_cache(cache);
            let result = self.evaluate_into(cache, &mut value_cache);
            if result.is_ok() {
                value_cache.evaluation_counter = location_counter;
            } else {
                value_cache.reset_evaluation_counter();
            }
            cache.put_value_cache(id, value_cache);
            result?;
        }
        cache
            .value_cache(id)
            .ok_or_else(|| FieldError::EvaluationFailed("missing value cache".to_string()))
    }

    pub(crate) fn evaluate_real_cache<'c>(&self, cache: &'c mut Fieldcache) -> FieldResult<&'c RealFieldValueCache> {
        self.evaluate(cache)?
            .as_real()
            .ok_or_else(|| FieldError::EvaluationFailed(format!("field {} is not real-valued", self.name())))
    }

    fn evaluate_into(&self, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        if let Some(real) = value_cache.as_real_mut() {
            real.set_derivatives_valid(false);
        }
        if let Some(location) = cache.location().field_values() {
            if location.field() == self {
                let real = value_cache
                    .as_real_mut()
                    .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?;
                real.set_values(location.values());
                return Ok(());
            }
        }
        cache.record_evaluation();
        let core = self.definition().core.clone();
        core.evaluate(self, cache, value_cache)
    }

    /// Evaluates values and chart derivatives, reusing derivatives computed since the last
    /// location change.
    pub(crate) fn evaluate_derivatives<'c>(
        &self,
        cache: &'c mut Fieldcache,
    ) -> FieldResult<&'c RealFieldValueCache> {
        let derivative_count = cache
            .location()
            .derivative_count()
            .ok_or_else(|| FieldError::invalid_argument("derivatives require a mesh location"))?;
        let derivatives_valid = self.evaluate_real_cache(cache)?.derivatives_valid();
        let id = self.id();
        if !derivatives_valid {
            let mut value_cache = cache
                .take_value_cache(id)
                .ok_or_else(|| FieldError::EvaluationFailed("missing value cache".to_string()))?;
            let result = match value_cache.as_real_mut() {
                Some(real) => {
                    let result = self.evaluate_derivatives_into(cache, real, derivative_count);
                    real.set_derivatives_valid(result.is_ok());
                    result
                }
                None => Err(FieldError::EvaluationFailed("value cache type mismatch".to_string())),
            };
            cache.put_value_cache(id, value_cache);
            result?;
        }
        cache
            .value_cache(id)
            .and_then(FieldValueCache::as_real)
            .ok_or_else(|| FieldError::EvaluationFailed("missing value cache".to_string()))
    }

    fn evaluate_derivatives_into(
        &self,
        cache: &mut Fieldcache,
        real: &mut RealFieldValueCache,
        derivative_count: usize,
    ) -> FieldResult<()> {
        if let Some(location) = cache.location().field_values() {
            if location.field() == self {
                real.derivatives_mut(derivative_count)
                    .copy_from_slice(location.derivatives());
                return Ok(());
            }
        }
        let core = self.definition().core.clone();
        core.evaluate_derivatives(self, cache, real, derivative_count)
    }
}
