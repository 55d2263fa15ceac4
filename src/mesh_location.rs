//! Fields whose values are locations in a mesh.
//!
//! A stored mesh location field holds an element and chart coordinates per node. A find mesh
//! location field inverts a field over a mesh: it evaluates its source field at the cache
//! location and searches the mesh for the element and chart coordinates where the mesh field
//! takes the same values.
use crate::error::{FieldError, FieldResult};
use crate::field::{Field, FieldCore, FieldType, FieldValueType};
use crate::field_cache::Fieldcache;
use crate::field_module::{FieldModule, Region};
use crate::mesh::{Element, Mesh};
use crate::value_cache::{FieldValueCache, FindElementXiCache};
use crate::MAXIMUM_ELEMENT_XI_DIMENSIONS;
use eyre::{bail, eyre};
use fenris_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use fenris_optimize::newton::{newton, NewtonSettings};
use log::{debug, error, trace};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use rstar::{Envelope, PointDistance, RTree, RTreeObject, AABB};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

type Xi = [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS];

#[derive(Debug)]
pub(crate) struct StoredMeshLocationCore {
    mesh_dimension: usize,
    // Keyed by node identifier
    locations: RefCell<FxHashMap<i32, (Element, Xi)>>,
}

impl FieldCore for StoredMeshLocationCore {
    fn field_type(&self) -> FieldType {
        FieldType::StoredMeshLocation
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::MeshLocation
    }

    fn evaluate(&self, _field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        let node = cache.location().node().ok_or(FieldError::NotDefined)?;
        let locations = self.locations.borrow();
        let (element, xi) = locations.get(&node.identifier()).ok_or(FieldError::NotDefined)?;
        value_cache
            .as_mesh_location_mut()
            .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
            .set_mesh_location(element.clone(), xi);
        Ok(())
    }

    fn assign(&self, field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        let node = cache.location().node().ok_or_else(|| {
            FieldError::AssignmentFailed(format!(
                "stored mesh location field {} can only be assigned at nodes",
                field.name()
            ))
        })?;
        let location = value_cache
            .as_mesh_location()
            .ok_or_else(|| FieldError::AssignmentFailed("value cache type mismatch".to_string()))?;
        let element = location
            .element()
            .ok_or_else(|| FieldError::AssignmentFailed("no element to assign".to_string()))?;
        let host_mesh = Mesh::new(cache.region().clone(), self.mesh_dimension);
        if !host_mesh.contains(element) {
            return Err(FieldError::AssignmentFailed(format!(
                "{:?} is not from host mesh of field {}",
                element,
                field.name()
            )));
        }
        if cache.is_assign_in_cache_only() {
            return Ok(());
        }
        let mut xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        xi[..element.dimension()].copy_from_slice(location.xi());
        self.locations
            .borrow_mut()
            .insert(node.identifier(), (element.clone(), xi));
        cache.region().notify_changed();
        Ok(())
    }

    fn is_defined_at_location(&self, _field: &Field, cache: &mut Fieldcache) -> bool {
        cache
            .location()
            .node()
            .map_or(false, |node| self.locations.borrow().contains_key(&node.identifier()))
    }

    fn command_string(&self, _field: &Field) -> String {
        format!("stored_mesh_location mesh mesh{}d", self.mesh_dimension)
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<StoredMeshLocationCore>()
            .map_or(false, |other| std::ptr::eq(self, other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Only locations where the mesh field equals the source values, within tolerance.
    Exact,
    /// The location in the mesh where the mesh field is closest to the source values.
    Nearest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindMeshLocationSettings {
    pub search_mode: SearchMode,
    /// Maximum number of Newton iterations per candidate element.
    pub max_iterations: usize,
    /// How far outside the element chart an exact match may lie.
    pub xi_tolerance: f64,
    /// Newton converges when the residual is below this multiple of the element size.
    pub convergence_tolerance: f64,
}

impl Default for FindMeshLocationSettings {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::Exact,
            max_iterations: 20,
            xi_tolerance: 1e-6,
            convergence_tolerance: 1e-12,
        }
    }
}

/// Bounding box of the mesh field over one element.
#[derive(Debug, Clone)]
struct ElementBox {
    envelope: AABB<[f64; 3]>,
    identifier: i32,
}

impl RTreeObject for ElementBox {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for ElementBox {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        self.envelope.distance_2(point)
    }

    fn contains_point(&self, point: &[f64; 3]) -> bool {
        self.envelope.contains_point(point)
    }
}

/// Bounding boxes of the mesh field over each element, valid for one state of the region.
#[derive(Debug)]
struct ElementIndex {
    change_counter: u64,
    tree: RTree<ElementBox>,
}

fn to_point(values: &[f64]) -> [f64; 3] {
    let mut point = [0.0; 3];
    let n = values.len().min(3);
    point[..n].copy_from_slice(&values[..n]);
    point
}

fn box_diameter(envelope: &AABB<[f64; 3]>) -> f64 {
    let (lower, upper) = (envelope.lower(), envelope.upper());
    lower
        .iter()
        .zip(&upper)
        .map(|(l, u)| (u - l) * (u - l))
        .sum::<f64>()
        .sqrt()
}

/// The residual `mesh_field(xi) - target` over one element, evaluated through a nested cache.
struct InverseMapFunction<'a> {
    element: &'a Element,
    mesh_field: &'a Field,
    target: &'a [f64],
    extra_cache: &'a mut Fieldcache,
    values: Vec<f64>,
    derivatives: Vec<f64>,
    error: Option<FieldError>,
}

impl InverseMapFunction<'_> {
    fn evaluate_at(&mut self, x: &DVectorView<f64>, with_derivatives: bool) -> FieldResult<()> {
        let mut xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        for (xi_k, x_k) in xi.iter_mut().zip(x.iter()) {
            *xi_k = *x_k;
        }
        self.extra_cache.set_mesh_location(self.element, &xi, None)?;
        if with_derivatives {
            self.mesh_field
                .evaluate_real_with_derivatives(self.extra_cache, &mut self.values, &mut self.derivatives)?;
        } else {
            self.mesh_field.evaluate_real(self.extra_cache, &mut self.values)?;
        }
        Ok(())
    }
}

impl VectorFunction<f64> for InverseMapFunction<'_> {
    fn dimension(&self) -> usize {
        self.target.len()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        match self.evaluate_at(x, false) {
            Ok(()) => {
                for (f_i, (value, target)) in f.iter_mut().zip(self.values.iter().zip(self.target)) {
                    *f_i = value - target;
                }
            }
            Err(err) => {
                // An infinite residual keeps Newton iterating into the Jacobian solve, which fails
                f.fill(f64::INFINITY);
                self.error = Some(err);
            }
        }
    }
}

impl DifferentiableVectorFunction<f64> for InverseMapFunction<'_> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        self.evaluate_at(x, true)?;
        let jacobian = DMatrix::from_row_slice(self.target.len(), self.element.dimension(), &self.derivatives);
        sol.copy_from(rhs);
        if jacobian.lu().solve_mut(sol) {
            Ok(())
        } else {
            Err(Box::<dyn Error>::from(
                "LU decomposition failed. Jacobian not invertible?",
            ))
        }
    }
}

#[derive(Debug)]
pub(crate) struct FindMeshLocationCore {
    mesh_dimension: usize,
    settings: FindMeshLocationSettings,
    index: RefCell<Option<ElementIndex>>,
}

impl FindMeshLocationCore {
    /// Bounds each element by the mesh field at its nodes. Elements where the mesh field is not
    /// defined are left out.
    fn build_index(
        &self,
        mesh: &Mesh,
        mesh_field: &Field,
        extra_cache: &mut Fieldcache,
        change_counter: u64,
    ) -> ElementIndex {
        let mut values = vec![0.0; mesh_field.component_count()];
        let boxes: Vec<ElementBox> = mesh
            .elements()
            .into_iter()
            .filter_map(|element| {
                let shape = element.shape();
                let mut lower = [f64::INFINITY; 3];
                let mut upper = [f64::NEG_INFINITY; 3];
                for node in 0..shape.node_count() {
                    extra_cache
                        .set_mesh_location(&element, &shape.node_xi(node), None)
                        .ok()?;
                    mesh_field.evaluate_real(extra_cache, &mut values).ok()?;
                    let point = to_point(&values);
                    for k in 0..3 {
                        lower[k] = lower[k].min(point[k]);
                        upper[k] = upper[k].max(point[k]);
                    }
                }
                // Enlarge slightly to accommodate floating point errors
                let margin = 0.01 * box_diameter(&AABB::from_corners(lower, upper)) + 1e-12;
                Some(ElementBox {
                    envelope: AABB::from_corners(lower.map(|x| x - margin), upper.map(|x| x + margin)),
                    identifier: element.identifier(),
                })
            })
            .collect();
        debug!(
            "Built find mesh location index of {} of {} elements",
            boxes.len(),
            mesh.size()
        );
        ElementIndex {
            change_counter,
            tree: RTree::bulk_load(boxes),
        }
    }

    /// Solves `mesh_field(xi) = target` in `element` by Newton's method, starting at the element
    /// centre. Returns the chart coordinates and the number of iterations.
    fn newton_inverse_map(
        &self,
        element: &Element,
        mesh_field: &Field,
        target: &[f64],
        extra_cache: &mut Fieldcache,
        diameter: f64,
    ) -> eyre::Result<(Xi, usize)> {
        let dim = element.dimension();
        let n = target.len();
        if n != dim {
            bail!("Mesh field has {} components on element of dimension {}", n, dim);
        }
        let mut function = InverseMapFunction {
            element,
            mesh_field,
            target,
            extra_cache,
            values: vec![0.0; n],
            derivatives: vec![0.0; n * dim],
            error: None,
        };
        // Converge on a residual relative to the element size
        let settings = NewtonSettings {
            max_iterations: Some(self.settings.max_iterations),
            tolerance: self.settings.convergence_tolerance * diameter,
        };
        let mut x = DVector::from_vec(element.shape().centre_xi());
        let mut f = DVector::<f64>::zeros(n);
        let mut dx = DVector::<f64>::zeros(n);
        let result = newton(&mut function, &mut x, &mut f, &mut dx, settings);
        if let Some(err) = function.error.take() {
            bail!("Mesh field not evaluable at xi {:?}: {}", x.as_slice(), err);
        }
        let iterations = result.map_err(|err| eyre!("{}", err))?;
        let mut xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        xi[..dim].copy_from_slice(x.as_slice());
        Ok((xi, iterations))
    }

    fn find(
        &self,
        region: &Rc<Region>,
        mesh_field: &Field,
        target: &[f64],
        extra_cache: &mut Fieldcache,
    ) -> Option<(Element, Xi)> {
        let mesh = Mesh::new(region.clone(), self.mesh_dimension);
        let mut index = self.index.borrow_mut();
        if index
            .as_ref()
            .map_or(true, |index| index.change_counter != region.change_counter())
        {
            *index = Some(self.build_index(&mesh, mesh_field, extra_cache, region.change_counter()));
        }
        let tree = &index.as_ref()?.tree;
        let point = to_point(target);
        let mut candidate_count = 0;

        let found = match self.settings.search_mode {
            SearchMode::Exact => tree.locate_all_at_point(&point).find_map(|candidate| {
                candidate_count += 1;
                let element = mesh.find_element_by_identifier(candidate.identifier)?;
                let diameter = box_diameter(&candidate.envelope);
                match self.newton_inverse_map(&element, mesh_field, target, extra_cache, diameter) {
                    Ok((mut xi, _)) if element.shape().contains_xi(&xi, self.settings.xi_tolerance) => {
                        element.shape().clamp_xi(&mut xi);
                        Some((element, xi))
                    }
                    Ok(_) => None,
                    Err(err) => {
                        trace!("Find mesh location skipped {:?}: {}", element, err);
                        None
                    }
                }
            }),
            SearchMode::Nearest => {
                let mut best: Option<(f64, Element, Xi)> = None;
                let mut values = vec![0.0; target.len()];
                for candidate in tree.nearest_neighbor_iter(&point) {
                    let best_distance2 = best.as_ref().map_or(f64::INFINITY, |(d2, _, _)| *d2);
                    if candidate.distance_2(&point) > best_distance2 {
                        break;
                    }
                    candidate_count += 1;
                    let element = match mesh.find_element_by_identifier(candidate.identifier) {
                        Some(element) => element,
                        None => continue,
                    };
                    let diameter = box_diameter(&candidate.envelope);
                    let mut xi = match self.newton_inverse_map(&element, mesh_field, target, extra_cache, diameter) {
                        Ok((xi, _)) => xi,
                        Err(err) => {
                            trace!("Find mesh location skipped {:?}: {}", element, err);
                            continue;
                        }
                    };
                    element.shape().clamp_xi(&mut xi);
                    if extra_cache.set_mesh_location(&element, &xi, None).is_err()
                        || mesh_field.evaluate_real(extra_cache, &mut values).is_err()
                    {
                        continue;
                    }
                    let distance2: f64 = values.iter().zip(target).map(|(v, t)| (v - t) * (v - t)).sum();
                    if distance2 < best_distance2 {
                        best = Some((distance2, element, xi));
                    }
                }
                best.map(|(_, element, xi)| (element, xi))
            }
        };
        debug!(
            "Find mesh location tried {} candidate elements, found {:?}",
            candidate_count,
            found.as_ref().map(|(element, _)| element)
        );
        found
    }

    /// Whether `found` is the result of this search for `target` on `mesh_field`.
    fn is_search_of(&self, found: &FindElementXiCache, mesh_field: &Field, target: &[f64]) -> bool {
        found.mesh_field == mesh_field.id()
            && found.settings == self.settings
            && found.element.dimension() == self.mesh_dimension
            && found.values == target
    }
}

impl FieldCore for FindMeshLocationCore {
    fn field_type(&self) -> FieldType {
        FieldType::FindMeshLocation
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::MeshLocation
    }

    fn evaluate(&self, field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        let definition = field.definition();
        let (source, mesh_field) = (&definition.source_fields[0], &definition.source_fields[1]);
        let target = source.evaluate_real_cache(cache)?.values().to_vec();

        // Searches share their result through the source's value cache while the location holds
        let previous = cache
            .value_cache(source.id())
            .and_then(FieldValueCache::as_real)
            .and_then(|real| real.find_element_xi_cache())
            .filter(|found| self.is_search_of(found, mesh_field, &target))
            .map(|found| (found.element.clone(), found.xi));
        let (element, xi) = match previous {
            Some(found) => found,
            None => {
                let region = cache.region().clone();
                let extra_cache = value_cache.get_or_create_extra_cache(cache);
                let (element, xi) = self
                    .find(&region, mesh_field, &target, extra_cache)
                    .ok_or(FieldError::NotDefined)?;
                if let Some(real) = cache
                    .value_cache_mut(source.id())
                    .and_then(FieldValueCache::as_real_mut)
                {
                    real.set_find_element_xi_cache(Some(FindElementXiCache {
                        values: target,
                        mesh_field: mesh_field.id(),
                        settings: self.settings.clone(),
                        element: element.clone(),
                        xi,
                    }));
                }
                (element, xi)
            }
        };
        value_cache
            .as_mesh_location_mut()
            .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
            .set_mesh_location(element, &xi);
        Ok(())
    }

    fn is_defined_at_location(&self, field: &Field, cache: &mut Fieldcache) -> bool {
        field.evaluate(cache).is_ok()
    }

    fn command_string(&self, field: &Field) -> String {
        let definition = field.definition();
        let mode = match self.settings.search_mode {
            SearchMode::Exact => "exact",
            SearchMode::Nearest => "nearest",
        };
        format!(
            "find_mesh_location source_field {} mesh_field {} mesh mesh{}d search_mode {}",
            definition.source_fields[0].name(),
            definition.source_fields[1].name(),
            self.mesh_dimension,
            mode
        )
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<FindMeshLocationCore>()
            .map_or(false, |other| {
                other.mesh_dimension == self.mesh_dimension && other.settings == self.settings
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FieldModule {
    fn check_mesh(&self, mesh: &Mesh, function: &str) -> FieldResult<()> {
        if Rc::ptr_eq(mesh.region(), self.region()) {
            Ok(())
        } else {
            error!("{}. Mesh is from another region", function);
            Err(FieldError::invalid_argument("mesh is from another region"))
        }
    }

    /// A field storing a location in `mesh` at each node, set by assignment.
    pub fn create_stored_mesh_location(&self, mesh: &Mesh) -> FieldResult<Field> {
        self.check_mesh(mesh, "FieldModule create_stored_mesh_location")?;
        let core = StoredMeshLocationCore {
            mesh_dimension: mesh.dimension(),
            locations: RefCell::default(),
        };
        self.create_field(1, Vec::new(), Vec::new(), Rc::new(core), None)
    }

    /// As [`create_find_mesh_location_with_settings`](Self::create_find_mesh_location_with_settings)
    /// with default settings.
    pub fn create_find_mesh_location(&self, source: &Field, mesh_field: &Field, mesh: &Mesh) -> FieldResult<Field> {
        self.create_find_mesh_location_with_settings(source, mesh_field, mesh, FindMeshLocationSettings::default())
    }

    /// A field giving the location in `mesh` where `mesh_field` equals `source`.
    ///
    /// Both fields must be numerical with as many components as the mesh has dimensions.
    pub fn create_find_mesh_location_with_settings(
        &self,
        source: &Field,
        mesh_field: &Field,
        mesh: &Mesh,
        settings: FindMeshLocationSettings,
    ) -> FieldResult<Field> {
        const FUNCTION: &str = "FieldModule create_find_mesh_location";
        self.check_mesh(mesh, FUNCTION)?;
        self.check_source_field(source, FUNCTION)?;
        self.check_source_field(mesh_field, FUNCTION)?;
        if !source.is_numerical() || !mesh_field.is_numerical() {
            error!("{}. Source and mesh fields must be numerical", FUNCTION);
            return Err(FieldError::invalid_argument("source and mesh fields must be numerical"));
        }
        if mesh_field.component_count() != mesh.dimension() || source.component_count() != mesh.dimension() {
            error!(
                "{}. Source and mesh fields need {} components for mesh of dimension {}",
                FUNCTION,
                mesh.dimension(),
                mesh.dimension()
            );
            return Err(FieldError::invalid_argument("component counts must equal mesh dimension"));
        }
        let core = FindMeshLocationCore {
            mesh_dimension: mesh.dimension(),
            settings,
            index: RefCell::default(),
        };
        self.create_field(
            1,
            vec![source.clone(), mesh_field.clone()],
            Vec::new(),
            Rc::new(core),
            None,
        )
    }
}
