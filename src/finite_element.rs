//! Nodal-interpolated finite element fields: the stored leaves of most field graphs.
use crate::error::{FieldError, FieldResult};
use crate::field::{Field, FieldCore, FieldType};
use crate::field_cache::Fieldcache;
use crate::field_module::FieldModule;
use crate::location::{Location, MeshLocation};
use crate::value_cache::{FieldValueCache, RealFieldValueCache};
use itertools::Itertools;
use log::error;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Real field interpolated from parameters stored at nodes with the element's linear basis.
#[derive(Debug)]
pub(crate) struct FiniteElementCore {
    component_names: RefCell<Vec<String>>,
    type_coordinate: Cell<bool>,
    // Keyed by node identifier, unique within the region
    node_parameters: RefCell<FxHashMap<i32, Vec<f64>>>,
}

impl FiniteElementCore {
    fn new(component_count: usize) -> Self {
        Self {
            component_names: RefCell::new((1..=component_count).map(|i| i.to_string()).collect()),
            type_coordinate: Cell::new(false),
            node_parameters: RefCell::default(),
        }
    }

    /// Gathers element node parameters into a `component_count x node_count` matrix, or `None`
    /// if any node has no parameters.
    fn element_parameters(&self, location: &MeshLocation, component_count: usize) -> Option<DMatrix<f64>> {
        let parameters = self.node_parameters.borrow();
        let nodes = location.element().nodes();
        let mut matrix = DMatrix::zeros(component_count, nodes.len());
        for (mut column, node) in matrix.column_iter_mut().zip(nodes) {
            let node_values = parameters.get(&node.identifier())?;
            column.copy_from_slice(node_values);
        }
        Some(matrix)
    }
}

impl FieldCore for FiniteElementCore {
    fn field_type(&self) -> FieldType {
        FieldType::FiniteElement
    }

    fn evaluate(&self, field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        let real = value_cache
            .as_real_mut()
            .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?;
        match cache.location() {
            Location::Node(node) => {
                let parameters = self.node_parameters.borrow();
                let node_values = parameters.get(&node.identifier()).ok_or(FieldError::NotDefined)?;
                real.set_values(node_values);
                Ok(())
            }
            Location::MeshLocation(location) => {
                let parameters = self
                    .element_parameters(location, field.component_count())
                    .ok_or(FieldError::NotDefined)?;
                let shape = location.element().shape();
                let mut basis = vec![0.0; shape.node_count()];
                shape.populate_basis(&mut basis, location.xi());
                let values = parameters * nalgebra::DVector::from_vec(basis);
                real.set_values(values.as_slice());
                Ok(())
            }
            _ => Err(FieldError::NotDefined),
        }
    }

    fn evaluate_derivatives(
        &self,
        field: &Field,
        cache: &mut Fieldcache,
        value_cache: &mut RealFieldValueCache,
        derivative_count: usize,
    ) -> FieldResult<()> {
        let location = cache.location().mesh_location().ok_or(FieldError::NotDefined)?;
        let parameters = self
            .element_parameters(location, field.component_count())
            .ok_or(FieldError::NotDefined)?;
        let shape = location.element().shape();
        let mut gradients = DMatrix::zeros(shape.dimension(), shape.node_count());
        shape.populate_basis_gradients(gradients.as_view_mut(), location.xi());
        // Row c holds d(component c)/d(xi_k) for each k
        let jacobian = parameters * gradients.transpose();
        let derivatives = value_cache.derivatives_mut(derivative_count);
        for (c, row) in derivatives.chunks_exact_mut(derivative_count).enumerate() {
            for (k, derivative) in row.iter_mut().enumerate() {
                *derivative = jacobian[(c, k)];
            }
        }
        Ok(())
    }

    /// Stores node parameters. Only node locations can be assigned; in cache-only mode nothing
    /// is stored.
    fn assign(&self, field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        let node = cache.location().node().ok_or_else(|| {
            FieldError::AssignmentFailed(format!(
                "finite element field {} can only be assigned at nodes",
                field.name()
            ))
        })?;
        if cache.is_assign_in_cache_only() {
            return Ok(());
        }
        let values = value_cache
            .as_real()
            .ok_or_else(|| FieldError::AssignmentFailed("value cache type mismatch".to_string()))?
            .values()
            .to_vec();
        self.node_parameters
            .borrow_mut()
            .insert(node.identifier(), values);
        cache.region().notify_changed();
        Ok(())
    }

    fn is_defined_at_location(&self, field: &Field, cache: &mut Fieldcache) -> bool {
        match cache.location() {
            Location::Node(node) => self.node_parameters.borrow().contains_key(&node.identifier()),
            Location::MeshLocation(location) => self
                .element_parameters(location, field.component_count())
                .is_some(),
            _ => false,
        }
    }

    fn component_name(&self, index: usize) -> String {
        self.component_names.borrow()[index].clone()
    }

    fn set_component_name(&self, index: usize, name: &str) -> FieldResult<()> {
        if name.is_empty() {
            return Err(FieldError::invalid_argument("component name must not be empty"));
        }
        self.component_names.borrow_mut()[index] = name.to_string();
        Ok(())
    }

    fn is_type_coordinate(&self) -> bool {
        self.type_coordinate.get()
    }

    fn set_type_coordinate(&self, value: bool) -> FieldResult<()> {
        self.type_coordinate.set(value);
        Ok(())
    }

    fn command_string(&self, _field: &Field) -> String {
        format!(
            "finite_element component_names {}",
            self.component_names.borrow().iter().join(" ")
        )
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<FiniteElementCore>()
            .map_or(false, |other| std::ptr::eq(self, other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FieldModule {
    /// A real field with `component_count` components, undefined until values are assigned at
    /// nodes. Values at mesh locations interpolate the parameters of the element's nodes.
    pub fn create_finite_element(&self, component_count: usize) -> FieldResult<Field> {
        if component_count == 0 {
            error!("FieldModule create_finite_element. Need at least one component");
            return Err(FieldError::invalid_argument("fields need at least one component"));
        }
        let core = FiniteElementCore::new(component_count);
        self.create_field(component_count, Vec::new(), Vec::new(), Rc::new(core), None)
    }
}
