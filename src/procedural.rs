//! Basic procedural mesh generation routines.
//!
//! Each routine creates nodes and elements in a field module together with a managed
//! finite element field named `"coordinates"` holding the node positions, and returns that field.
//! New nodes and elements are numbered consecutively after the largest existing identifiers.
use crate::element::ElementShape;
use crate::error::FieldResult;
use crate::field::{Field, FieldType};
use crate::field_module::FieldModule;
use crate::mesh::{Mesh, Node, Nodeset};
use nalgebra::{Vector2, Vector3};

pub fn create_unit_square_uniform_quad_mesh(fieldmodule: &FieldModule, cells_per_dim: usize) -> FieldResult<Field> {
    create_rectangular_uniform_quad_mesh(fieldmodule, 1.0, 1, 1, cells_per_dim, &Vector2::zeros())
}

pub fn create_unit_box_uniform_hex_mesh(fieldmodule: &FieldModule, cells_per_dim: usize) -> FieldResult<Field> {
    create_rectangular_uniform_hex_mesh(fieldmodule, 1.0, 1, 1, 1, cells_per_dim, &Vector3::zeros())
}

/// Generates an axis-aligned rectangular uniform quad mesh given a unit length,
/// dimensions as multipliers of the unit length and the number of cells per unit length.
/// Element chart directions follow the x and y axes.
pub fn create_rectangular_uniform_quad_mesh(
    fieldmodule: &FieldModule,
    unit_length: f64,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    origin: &Vector2<f64>,
) -> FieldResult<Field> {
    let coordinates = find_or_create_coordinates(fieldmodule, 2)?;
    let cell_size = unit_length / cells_per_unit.max(1) as f64;
    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;
    if num_cells_x == 0 || num_cells_y == 0 {
        return Ok(coordinates);
    }

    let mut positions = Vec::new();
    for j in 0..=num_cells_y {
        for i in 0..=num_cells_x {
            positions.push(vec![
                origin.x + i as f64 * cell_size,
                origin.y + j as f64 * cell_size,
            ]);
        }
    }
    let nodes = create_nodes(fieldmodule, &coordinates, &positions)?;

    let to_global_vertex_index = |i, j| (num_cells_x + 1) * j + i;
    let mesh = fieldmodule.mesh(2)?;
    let mut identifier = next_element_identifier(&mesh);
    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            let element_nodes = [
                nodes[to_global_vertex_index(i, j)].clone(),
                nodes[to_global_vertex_index(i + 1, j)].clone(),
                nodes[to_global_vertex_index(i, j + 1)].clone(),
                nodes[to_global_vertex_index(i + 1, j + 1)].clone(),
            ];
            mesh.create_element(identifier, ElementShape::Quad4, &element_nodes)?;
            identifier += 1;
        }
    }
    Ok(coordinates)
}

/// As [`create_rectangular_uniform_quad_mesh`], for hexahedra.
pub fn create_rectangular_uniform_hex_mesh(
    fieldmodule: &FieldModule,
    unit_length: f64,
    units_x: usize,
    units_y: usize,
    units_z: usize,
    cells_per_unit: usize,
    origin: &Vector3<f64>,
) -> FieldResult<Field> {
    let coordinates = find_or_create_coordinates(fieldmodule, 3)?;
    let cell_size = unit_length / cells_per_unit.max(1) as f64;
    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;
    let num_cells_z = units_z * cells_per_unit;
    if num_cells_x == 0 || num_cells_y == 0 || num_cells_z == 0 {
        return Ok(coordinates);
    }

    let mut positions = Vec::new();
    for k in 0..=num_cells_z {
        for j in 0..=num_cells_y {
            for i in 0..=num_cells_x {
                positions.push(vec![
                    origin.x + i as f64 * cell_size,
                    origin.y + j as f64 * cell_size,
                    origin.z + k as f64 * cell_size,
                ]);
            }
        }
    }
    let nodes = create_nodes(fieldmodule, &coordinates, &positions)?;

    let to_global_vertex_index = |i, j, k| (num_cells_x + 1) * (num_cells_y + 1) * k + (num_cells_x + 1) * j + i;
    let mesh = fieldmodule.mesh(3)?;
    let mut identifier = next_element_identifier(&mesh);
    for k in 0..num_cells_z {
        for j in 0..num_cells_y {
            for i in 0..num_cells_x {
                let element_nodes: Vec<Node> = (0..8)
                    .map(|corner| {
                        let (di, dj, dk) = (corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
                        nodes[to_global_vertex_index(i + di, j + dj, k + dk)].clone()
                    })
                    .collect();
                mesh.create_element(identifier, ElementShape::Hex8, &element_nodes)?;
                identifier += 1;
            }
        }
    }
    Ok(coordinates)
}

fn find_or_create_coordinates(fieldmodule: &FieldModule, dimension: usize) -> FieldResult<Field> {
    if let Some(existing) = fieldmodule.find_field_by_name("coordinates") {
        if existing.field_type() == FieldType::FiniteElement && existing.component_count() == dimension {
            return Ok(existing);
        }
    }
    let coordinates = fieldmodule.create_finite_element(dimension)?;
    coordinates.set_name("coordinates")?;
    coordinates.set_managed(true);
    coordinates.set_type_coordinate(true)?;
    for (index, name) in ["x", "y", "z"].iter().enumerate().take(dimension) {
        coordinates.set_component_name(index, name)?;
    }
    Ok(coordinates)
}

fn create_nodes(fieldmodule: &FieldModule, coordinates: &Field, positions: &[Vec<f64>]) -> FieldResult<Vec<Node>> {
    let nodeset: Nodeset = fieldmodule.nodeset();
    let first_identifier = nodeset
        .nodes()
        .last()
        .map_or(1, |node| node.identifier() + 1);
    let mut cache = fieldmodule.create_fieldcache();
    positions
        .iter()
        .zip(first_identifier..)
        .map(|(position, identifier)| {
            let node = nodeset.create_node(identifier)?;
            cache.set_node(&node)?;
            coordinates.assign_real(&mut cache, position)?;
            Ok(node)
        })
        .collect()
}

fn next_element_identifier(mesh: &Mesh) -> i32 {
    mesh.elements()
        .last()
        .map_or(1, |element| element.identifier() + 1)
}
