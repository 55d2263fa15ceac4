//! Domain location descriptors held by a field cache.
use crate::field::Field;
use crate::mesh::{Element, Node};
use crate::MAXIMUM_ELEMENT_XI_DIMENSIONS;

/// An element together with chart coordinates in it.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLocation {
    element: Element,
    xi: [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS],
    top_level_element: Option<Element>,
}

impl MeshLocation {
    /// Caller guarantees `xi` has at least `element.dimension()` entries. Entries beyond the
    /// element dimension are ignored.
    pub(crate) fn new(element: Element, xi: &[f64], top_level_element: Option<Element>) -> Self {
        let dimension = element.dimension();
        let mut stored_xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        stored_xi[..dimension].copy_from_slice(&xi[..dimension]);
        Self {
            element,
            xi: stored_xi,
            top_level_element,
        }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Chart coordinates, one per element dimension.
    pub fn xi(&self) -> &[f64] {
        &self.xi[..self.element.dimension()]
    }

    /// Optional higher-dimensional element the location was reached from.
    ///
    /// Carried for callers only. Meshes store no face-to-parent mapping, so no field evaluates
    /// on the top level element.
    pub fn top_level_element(&self) -> Option<&Element> {
        self.top_level_element.as_ref()
    }
}

/// Prescribed values (and optionally derivatives) of a reference field.
#[derive(Debug, Clone)]
pub struct FieldValuesLocation {
    field: Field,
    values: Vec<f64>,
    derivative_count: usize,
    derivatives: Vec<f64>,
}

impl FieldValuesLocation {
    /// Values are zero-padded or truncated to the field's component count. Derivatives have
    /// `derivative_count` entries per supplied component and are padded/truncated separately.
    pub(crate) fn new(field: Field, values: &[f64], derivative_count: usize, derivatives: &[f64]) -> Self {
        let component_count = field.component_count();
        let mut stored_values = vec![0.0; component_count];
        let n = values.len().min(component_count);
        stored_values[..n].copy_from_slice(&values[..n]);

        let mut stored_derivatives = vec![0.0; component_count * derivative_count];
        let n = derivatives.len().min(stored_derivatives.len());
        stored_derivatives[..n].copy_from_slice(&derivatives[..n]);
        Self {
            field,
            values: stored_values,
            derivative_count,
            derivatives: stored_derivatives,
        }
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of prescribed derivative directions; zero if none were given.
    pub fn derivative_count(&self) -> usize {
        self.derivative_count
    }

    /// Prescribed derivatives, `derivative_count` per component.
    pub fn derivatives(&self) -> &[f64] {
        &self.derivatives
    }
}

/// The spatial part of a field cache's location. Time is held separately by the cache.
#[derive(Debug, Clone, Default)]
pub enum Location {
    #[default]
    None,
    MeshLocation(MeshLocation),
    Node(Node),
    FieldValues(FieldValuesLocation),
}

impl Location {
    pub fn mesh_location(&self) -> Option<&MeshLocation> {
        match self {
            Location::MeshLocation(location) => Some(location),
            _ => None,
        }
    }

    pub fn node(&self) -> Option<&Node> {
        match self {
            Location::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn field_values(&self) -> Option<&FieldValuesLocation> {
        match self {
            Location::FieldValues(location) => Some(location),
            _ => None,
        }
    }

    /// Number of chart directions derivatives are taken with respect to at this location.
    pub fn derivative_count(&self) -> Option<usize> {
        match self {
            Location::MeshLocation(location) => Some(location.element().dimension()),
            Location::FieldValues(location) if location.derivative_count() > 0 => Some(location.derivative_count()),
            _ => None,
        }
    }
}
