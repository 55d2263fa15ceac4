use computed_fields::element::ElementShape;
use computed_fields::procedural::{create_rectangular_uniform_hex_mesh, create_unit_square_uniform_quad_mesh};
use computed_fields::{FieldError, FieldModule};
use nalgebra::Vector3;

#[test]
fn nodes_are_unique_by_identifier() {
    let fieldmodule = FieldModule::new();
    let nodeset = fieldmodule.nodeset();
    let node = nodeset.create_node(7).unwrap();
    assert!(matches!(nodeset.create_node(7), Err(FieldError::InvalidArgument(_))));
    assert_eq!(nodeset.find_node_by_identifier(7), Some(node.clone()));
    assert!(nodeset.contains(&node));
    assert_eq!(nodeset.size(), 1);
}

#[test]
fn nodes_from_another_region_are_not_contained() {
    let fieldmodule = FieldModule::new();
    let other = FieldModule::new();
    let node = other.nodeset().create_node(1).unwrap();
    fieldmodule.nodeset().create_node(1).unwrap();
    assert!(!fieldmodule.nodeset().contains(&node));
}

#[test]
fn create_element_validates_shape_and_nodes() {
    let fieldmodule = FieldModule::new();
    let nodeset = fieldmodule.nodeset();
    let nodes: Vec<_> = (1..=4).map(|id| nodeset.create_node(id).unwrap()).collect();
    let mesh = fieldmodule.mesh(2).unwrap();

    assert!(mesh.create_element(1, ElementShape::Hex8, &nodes).is_err());
    assert!(mesh.create_element(1, ElementShape::Triangle3, &nodes).is_err());
    let foreign = FieldModule::new().nodeset().create_node(5).unwrap();
    assert!(mesh
        .create_element(1, ElementShape::Triangle3, &[nodes[0].clone(), nodes[1].clone(), foreign])
        .is_err());

    let element = mesh.create_element(1, ElementShape::Quad4, &nodes).unwrap();
    assert_eq!(element.dimension(), 2);
    assert_eq!(element.nodes(), nodes.as_slice());
    assert!(mesh.create_element(1, ElementShape::Quad4, &nodes).is_err());
    assert_eq!(mesh.size(), 1);
    assert_eq!(format!("{:?}", element), "Element(1, square)");
}

#[test]
fn meshes_exist_for_dimensions_one_to_three() {
    let fieldmodule = FieldModule::new();
    assert!(fieldmodule.mesh(0).is_err());
    assert!(fieldmodule.mesh(4).is_err());
    for dimension in 1..=3 {
        assert_eq!(fieldmodule.mesh(dimension).unwrap().dimension(), dimension);
    }
}

#[test]
fn procedural_quad_mesh_has_expected_size() {
    let fieldmodule = FieldModule::new();
    let coordinates = create_unit_square_uniform_quad_mesh(&fieldmodule, 3).unwrap();
    assert_eq!(fieldmodule.nodeset().size(), 16);
    assert_eq!(fieldmodule.mesh(2).unwrap().size(), 9);
    assert_eq!(coordinates.name(), "coordinates");
    assert!(coordinates.is_managed());
    assert!(coordinates.is_type_coordinate());
    assert_eq!(coordinates.component_name(1).as_deref(), Some("y"));
}

#[test]
fn procedural_hex_mesh_with_zero_cells_is_empty() {
    let fieldmodule = FieldModule::new();
    let coordinates = create_rectangular_uniform_hex_mesh(&fieldmodule, 1.0, 1, 0, 1, 2, &Vector3::zeros()).unwrap();
    assert_eq!(coordinates.component_count(), 3);
    assert_eq!(fieldmodule.nodeset().size(), 0);
    assert_eq!(fieldmodule.mesh(3).unwrap().size(), 0);
}
