//! Composite fields and the identity, component, concatenate and constant fields built on them.
//!
//! A composite field assembles each of its components either from a component of one of its
//! source fields or from a literal source value. All five creation functions produce the same
//! core and differ only in their validation and reported [`FieldType`].
use crate::error::{FieldError, FieldResult};
use crate::field::{Field, FieldCore, FieldType};
use crate::field_cache::Fieldcache;
use crate::field_module::FieldModule;
use crate::value_cache::{FieldValueCache, RealFieldValueCache};
use itertools::Itertools;
use log::{error, warn};
use std::any::Any;
use std::rc::Rc;

/// Where one component of a composite field takes its value from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SourceSelector {
    /// Component `component` of source field `field_index`.
    Field { field_index: usize, component: usize },
    /// Literal source value `value_index`.
    Value { value_index: usize },
}

impl SourceSelector {
    /// Converts the paired numbering used by [`FieldModule::create_composite`]: a negative
    /// field number selects a literal value.
    fn from_numbers(field_number: i32, value_number: i32) -> Option<Self> {
        let value_number = usize::try_from(value_number).ok()?;
        Some(match usize::try_from(field_number) {
            Ok(field_index) => SourceSelector::Field {
                field_index,
                component: value_number,
            },
            Err(_) => SourceSelector::Value {
                value_index: value_number,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompositeCore {
    field_type: FieldType,
    selectors: Vec<SourceSelector>,
}

impl CompositeCore {
    pub(crate) fn selectors(&self) -> &[SourceSelector] {
        &self.selectors
    }

    /// Whether this selects component `component` of the only source field and nothing else.
    fn is_component_wrapper(&self, component: usize) -> bool {
        self.selectors == [SourceSelector::Field { field_index: 0, component }]
    }
}

impl FieldCore for CompositeCore {
    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn evaluate(&self, field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        let definition = field.definition();
        let values = value_cache
            .as_real_mut()
            .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
            .values_mut();
        for (value, selector) in values.iter_mut().zip(&self.selectors) {
            if let SourceSelector::Value { value_index } = *selector {
                *value = definition.source_values[value_index];
            }
        }
        for (i, source) in definition.source_fields.iter().enumerate() {
            let source_values = source.evaluate_real_cache(cache)?.values();
            for (value, selector) in values.iter_mut().zip(&self.selectors) {
                match *selector {
                    SourceSelector::Field { field_index, component } if field_index == i => {
                        *value = source_values[component];
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn evaluate_derivatives(
        &self,
        field: &Field,
        cache: &mut Fieldcache,
        value_cache: &mut RealFieldValueCache,
        derivative_count: usize,
    ) -> FieldResult<()> {
        let definition = field.definition();
        let derivatives = value_cache.derivatives_mut(derivative_count);
        for (row, selector) in derivatives.chunks_exact_mut(derivative_count).zip(&self.selectors) {
            if let SourceSelector::Value { .. } = selector {
                row.fill(0.0);
            }
        }
        for (i, source) in definition.source_fields.iter().enumerate() {
            let source_derivatives = source.evaluate_derivatives(cache)?.derivatives();
            for (row, selector) in derivatives.chunks_exact_mut(derivative_count).zip(&self.selectors) {
                match *selector {
                    SourceSelector::Field { field_index, component } if field_index == i => {
                        let start = component * derivative_count;
                        row.copy_from_slice(&source_derivatives[start..start + derivative_count]);
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Only identity fields are invertible: the values are assigned to the source field.
    fn assign(&self, field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        if self.field_type != FieldType::Identity {
            return Err(FieldError::AssignmentNotSupported {
                field_type: self.field_type,
            });
        }
        let source = field
            .source_field(0)
            .ok_or_else(|| FieldError::AssignmentFailed("identity field has no source".to_string()))?;
        let values = value_cache
            .as_real()
            .ok_or_else(|| FieldError::AssignmentFailed("value cache type mismatch".to_string()))?
            .values();
        source.assign_real_internal(cache, values)
    }

    /// Lists components and literal values. A source field used whole, in order, appears by
    /// name alone; otherwise as `name.component`.
    fn command_string(&self, field: &Field) -> String {
        let definition = field.definition();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < self.selectors.len() {
            match self.selectors[i] {
                SourceSelector::Field { field_index, component } => {
                    let source = &definition.source_fields[field_index];
                    let source_count = source.component_count();
                    let whole_field = (0..source_count).all(|j| {
                        self.selectors.get(i + j)
                            == Some(&SourceSelector::Field {
                                field_index,
                                component: j,
                            })
                    });
                    if whole_field {
                        tokens.push(source.name());
                        i += source_count;
                    } else {
                        let component_name = source.component_name(component).unwrap_or_default();
                        tokens.push(format!("{}.{}", source.name(), component_name));
                        i += 1;
                    }
                }
                SourceSelector::Value { value_index } => {
                    tokens.push(format!("{}", definition.source_values[value_index]));
                    i += 1;
                }
            }
        }
        format!("composite {}", tokens.iter().join(" "))
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<CompositeCore>()
            .map_or(false, |other| other.selectors == self.selectors)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Checks selectors against the composite rules, logging the first violation.
///
/// Source fields must be distinct and numerical, and be first used in order. Literal values
/// must be used in order, each exactly once. Every source field and value must be used.
fn validate_selectors(sources: &[Field], value_count: usize, selectors: &[SourceSelector]) -> FieldResult<()> {
    const FUNCTION: &str = "FieldModule create_composite";
    let fail = |message: String| {
        error!("{}. {}", FUNCTION, message);
        Err(FieldError::InvalidArgument(message))
    };
    if selectors.is_empty() {
        return fail("Composite fields need at least one component".to_string());
    }
    for (i, source) in sources.iter().enumerate() {
        if !source.is_numerical() {
            return fail(format!("Source field {} is not numerical", source.name()));
        }
        if sources[..i].contains(source) {
            return fail(format!("Source field {} is repeated", source.name()));
        }
    }
    let mut next_field = 0;
    let mut next_value = 0;
    for selector in selectors {
        match *selector {
            SourceSelector::Field { field_index, component } => {
                if field_index > next_field || field_index >= sources.len() {
                    return fail(format!("Source field {} used out of order", field_index));
                }
                if field_index == next_field {
                    next_field += 1;
                }
                if component >= sources[field_index].component_count() {
                    return fail(format!(
                        "Component {} out of range for source field {}",
                        component,
                        sources[field_index].name()
                    ));
                }
            }
            SourceSelector::Value { value_index } => {
                if value_index != next_value || value_index >= value_count {
                    return fail(format!("Source value {} used out of order", value_index));
                }
                next_value += 1;
            }
        }
    }
    if next_field != sources.len() {
        return fail("Not all source fields used".to_string());
    }
    if next_value != value_count {
        return fail("Not all source values used".to_string());
    }
    Ok(())
}

impl FieldModule {
    fn create_composite_of_type(
        &self,
        field_type: FieldType,
        sources: &[Field],
        values: &[f64],
        selectors: Vec<SourceSelector>,
    ) -> FieldResult<Field> {
        for source in sources {
            self.check_source_field(source, "FieldModule create_composite")?;
        }
        validate_selectors(sources, values.len(), &selectors)?;
        let coordinate_system = match field_type {
            FieldType::Identity | FieldType::Concatenate => Some(sources[0].coordinate_system()),
            _ => None,
        };
        let component_count = selectors.len();
        let core = CompositeCore {
            field_type,
            selectors,
        };
        self.create_field(
            component_count,
            sources.to_vec(),
            values.to_vec(),
            Rc::new(core),
            coordinate_system,
        )
    }

    /// Creates a field whose components are picked from `sources` and literal `values`.
    ///
    /// For each component `i`, a non-negative `field_numbers[i]` selects component
    /// `value_numbers[i]` of that source field. A negative field number selects literal value
    /// `value_numbers[i]`.
    ///
    /// ```
    /// # use computed_fields::FieldModule;
    /// let fieldmodule = FieldModule::new();
    /// let a = fieldmodule.create_constant(&[2.0, 3.0]).unwrap();
    /// // swap the components of a and append a literal 99
    /// let c = fieldmodule
    ///     .create_composite(3, &[a], &[99.0], &[0, 0, -1], &[1, 0, 0])
    ///     .unwrap();
    /// assert_eq!(c.component_count(), 3);
    /// ```
    pub fn create_composite(
        &self,
        component_count: usize,
        sources: &[Field],
        values: &[f64],
        field_numbers: &[i32],
        value_numbers: &[i32],
    ) -> FieldResult<Field> {
        if field_numbers.len() != component_count || value_numbers.len() != component_count {
            error!("FieldModule create_composite. Need one field and value number per component");
            return Err(FieldError::invalid_argument("selector arrays do not match component count"));
        }
        let selectors = field_numbers
            .iter()
            .zip(value_numbers)
            .map(|(&field_number, &value_number)| SourceSelector::from_numbers(field_number, value_number))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                error!("FieldModule create_composite. Negative value number");
                FieldError::invalid_argument("negative value number")
            })?;
        self.create_composite_of_type(FieldType::Composite, sources, values, selectors)
    }

    /// As [`create_composite`](Self::create_composite), with one selector per component.
    pub fn create_composite_from_selectors(
        &self,
        sources: &[Field],
        values: &[f64],
        selectors: &[SourceSelector],
    ) -> FieldResult<Field> {
        self.create_composite_of_type(FieldType::Composite, sources, values, selectors.to_vec())
    }

    /// A field with the values of `source`. Assigning to it assigns to `source`.
    pub fn create_identity(&self, source: &Field) -> FieldResult<Field> {
        let selectors = (0..source.component_count())
            .map(|component| SourceSelector::Field { field_index: 0, component })
            .collect();
        self.create_composite_of_type(FieldType::Identity, &[source.clone()], &[], selectors)
    }

    /// A scalar field holding component `component` (zero-based) of `source`.
    pub fn create_component(&self, source: &Field, component: usize) -> FieldResult<Field> {
        self.create_component_multiple(source, &[component])
    }

    /// A field holding the given components of `source`, in order, repeats allowed.
    pub fn create_component_multiple(&self, source: &Field, components: &[usize]) -> FieldResult<Field> {
        if let Some(component) = components
            .iter()
            .find(|&&component| component >= source.component_count())
        {
            error!(
                "FieldModule create_component. Component {} out of range for field {}",
                component,
                source.name()
            );
            return Err(FieldError::invalid_argument("component index out of range"));
        }
        let selectors = components
            .iter()
            .map(|&component| SourceSelector::Field { field_index: 0, component })
            .collect();
        self.create_composite_of_type(FieldType::Component, &[source.clone()], &[], selectors)
    }

    /// All components of `sources` in order. Repeated sources are stored once.
    pub fn create_concatenate(&self, sources: &[Field]) -> FieldResult<Field> {
        if sources.is_empty() {
            error!("FieldModule create_concatenate. No source fields");
            return Err(FieldError::invalid_argument("no source fields"));
        }
        let unique_sources: Vec<Field> = sources.iter().unique_by(|field| field.id()).cloned().collect();
        let selectors = sources
            .iter()
            .flat_map(|source| {
                let field_index = unique_sources
                    .iter()
                    .position(|unique| unique == source)
                    .unwrap_or_default();
                (0..source.component_count()).map(move |component| SourceSelector::Field { field_index, component })
            })
            .collect();
        self.create_composite_of_type(FieldType::Concatenate, &unique_sources, &[], selectors)
    }

    /// A field with fixed `values`, one per component.
    pub fn create_constant(&self, values: &[f64]) -> FieldResult<Field> {
        let selectors = (0..values.len())
            .map(|value_index| SourceSelector::Value { value_index })
            .collect();
        self.create_composite_of_type(FieldType::Constant, &[], values, selectors)
    }

    /// Finds a field selecting only component `component` of `field`, or creates one named
    /// `"<field name>.<component name>"`.
    pub fn find_or_create_component_wrapper(&self, field: &Field, component: usize) -> FieldResult<Field> {
        if component >= field.component_count() {
            error!("FieldModule find_or_create_component_wrapper. Invalid component {}", component);
            return Err(FieldError::invalid_argument("component index out of range"));
        }
        let existing = self.fields().into_iter().find(|candidate| {
            candidate.source_fields() == [field.clone()]
                && candidate.definition().source_values.is_empty()
                && candidate
                    .composite_core()
                    .map_or(false, |core| core.is_component_wrapper(component))
        });
        if let Some(existing) = existing {
            return Ok(existing);
        }
        let wrapper = self.create_component(field, component)?;
        let component_name = field.component_name(component).unwrap_or_default();
        let name = format!("{}.{}", field.name(), component_name);
        if let Err(err) = wrapper.set_name(&name) {
            warn!("Component wrapper keeps automatic name {}: {}", wrapper.name(), err);
        }
        Ok(wrapper)
    }
}

impl Field {
    pub(crate) fn composite_core(&self) -> Option<CompositeCore> {
        self.definition()
            .core
            .as_any()
            .downcast_ref::<CompositeCore>()
            .cloned()
    }

    /// For composite fields with exactly one source field and no literal values, the source
    /// component selected by component `index`.
    pub fn source_component_index(&self, index: usize) -> Option<usize> {
        let core = self.composite_core()?;
        let definition = self.definition();
        if definition.source_fields.len() != 1 || !definition.source_values.is_empty() {
            return None;
        }
        match core.selectors().get(index)? {
            SourceSelector::Field { component, .. } => Some(*component),
            SourceSelector::Value { .. } => None,
        }
    }

    /// The values of a constant field, `None` for any other field.
    pub fn constant_values(&self) -> Option<Vec<f64>> {
        let core = self.composite_core()?;
        (core.field_type() == FieldType::Constant).then(|| self.definition().source_values.clone())
    }
}
