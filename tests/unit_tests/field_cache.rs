use crate::line_element;
use computed_fields::location::Location;
use computed_fields::{FieldError, FieldModule};
use matrixcompare::assert_scalar_eq;

#[test]
fn every_location_change_increments_location_counter() {
    let fieldmodule = FieldModule::new();
    let (_, element, nodes) = line_element(&fieldmodule, 0.0, 1.0);
    let mut cache = fieldmodule.create_fieldcache();

    let mut counter = cache.location_counter();
    let mut assert_incremented = |counter_now: u64| {
        assert!(counter_now > counter);
        counter = counter_now;
    };
    cache.set_element(&element).unwrap();
    assert_incremented(cache.location_counter());
    cache.set_mesh_location(&element, &[0.25], None).unwrap();
    assert_incremented(cache.location_counter());
    cache.set_node(&nodes[0]).unwrap();
    assert_incremented(cache.location_counter());
    cache.clear_location();
    assert_incremented(cache.location_counter());
}

#[test]
fn set_time_always_increments_location_counter() {
    let fieldmodule = FieldModule::new();
    let mut cache = fieldmodule.create_fieldcache();
    cache.set_time(2.0);
    let counter = cache.location_counter();
    cache.set_time(2.0);
    assert!(cache.location_counter() > counter);
    assert_eq!(cache.time(), 2.0);
}

#[test]
fn time_is_preserved_across_location_changes() {
    let fieldmodule = FieldModule::new();
    let (_, element, nodes) = line_element(&fieldmodule, 0.0, 1.0);
    let mut cache = fieldmodule.create_fieldcache();
    cache.set_time(3.5);
    cache.set_element(&element).unwrap();
    cache.set_node(&nodes[1]).unwrap();
    assert_eq!(cache.time(), 3.5);
}

#[test]
fn new_location_replaces_previous_one() {
    let fieldmodule = FieldModule::new();
    let (_, element, nodes) = line_element(&fieldmodule, 0.0, 1.0);
    let mut cache = fieldmodule.create_fieldcache();
    assert!(matches!(cache.location(), Location::None));

    cache.set_mesh_location(&element, &[0.75, 9.0], None).unwrap();
    let location = cache.location().mesh_location().unwrap();
    assert_eq!(location.element(), &element);
    assert_eq!(location.xi(), &[0.75]);
    assert!(location.top_level_element().is_none());

    cache.set_node(&nodes[0]).unwrap();
    assert!(cache.location().mesh_location().is_none());
    assert_eq!(cache.location().node(), Some(&nodes[0]));
}

#[test]
fn set_mesh_location_needs_chart_coordinate_per_dimension() {
    let fieldmodule = FieldModule::new();
    let (_, element, _) = line_element(&fieldmodule, 0.0, 1.0);
    let mut cache = fieldmodule.create_fieldcache();
    let counter = cache.location_counter();
    assert!(matches!(
        cache.set_mesh_location(&element, &[], None),
        Err(FieldError::InvalidArgument(_))
    ));
    assert_eq!(cache.location_counter(), counter);
}

#[test]
fn locations_from_another_region_are_rejected() {
    let fieldmodule = FieldModule::new();
    let other = FieldModule::new();
    let (_, element, nodes) = line_element(&other, 0.0, 1.0);
    let mut cache = fieldmodule.create_fieldcache();
    assert!(cache.set_element(&element).is_err());
    assert!(cache.set_node(&nodes[0]).is_err());
}

#[test]
fn top_level_element_must_not_have_lower_dimension() {
    let fieldmodule = FieldModule::new();
    let coordinates = computed_fields::procedural::create_unit_square_uniform_quad_mesh(&fieldmodule, 1).unwrap();
    let square = fieldmodule.mesh(2).unwrap().find_element_by_identifier(1).unwrap();
    let nodes = square.nodes()[..2].to_vec();
    let line = fieldmodule
        .mesh(1)
        .unwrap()
        .create_element(1, computed_fields::element::ElementShape::Line2, &nodes)
        .unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    assert!(cache.set_mesh_location(&square, &[0.5, 0.5], Some(&line)).is_err());

    cache.set_mesh_location(&line, &[0.5], Some(&square)).unwrap();
    assert_eq!(
        cache.location().mesh_location().unwrap().top_level_element(),
        Some(&square)
    );
    let mut x = [0.0; 2];
    coordinates.evaluate_real(&mut cache, &mut x).unwrap();
    assert_eq!(x, [0.5, 0.0]);
}

#[test]
fn field_values_are_padded_or_truncated() {
    let fieldmodule = FieldModule::new();
    let field = fieldmodule.create_finite_element(3).unwrap();
    let mut cache = fieldmodule.create_fieldcache();

    cache.set_field_real(&field, &[1.0]).unwrap();
    let mut values = [9.0; 3];
    field.evaluate_real(&mut cache, &mut values).unwrap();
    assert_eq!(values, [1.0, 0.0, 0.0]);

    cache.set_field_real(&field, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    field.evaluate_real(&mut cache, &mut values).unwrap();
    assert_eq!(values, [1.0, 2.0, 3.0]);
}

#[test]
fn set_field_real_rejects_bad_arguments() {
    let fieldmodule = FieldModule::new();
    let field = fieldmodule.create_finite_element(2).unwrap();
    let text = fieldmodule.create_string_constant("text").unwrap();
    let foreign = FieldModule::new().create_finite_element(2).unwrap();
    let mut cache = fieldmodule.create_fieldcache();

    assert!(cache.set_field_real(&field, &[]).is_err());
    assert!(cache.set_field_real(&text, &[1.0]).is_err());
    assert!(cache.set_field_real(&foreign, &[1.0]).is_err());
    assert!(cache
        .set_field_real_with_derivatives(&field, &[1.0], 4, &[0.0; 8])
        .is_err());
}

#[test]
fn prescribed_derivatives_are_returned() {
    let fieldmodule = FieldModule::new();
    let field = fieldmodule.create_finite_element(2).unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    cache
        .set_field_real_with_derivatives(&field, &[1.0, 2.0], 2, &[0.1, 0.2, 0.3])
        .unwrap();

    let mut values = [0.0; 2];
    let mut derivatives = [0.0; 4];
    let count = field
        .evaluate_real_with_derivatives(&mut cache, &mut values, &mut derivatives)
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(values, [1.0, 2.0]);
    assert_eq!(derivatives, [0.1, 0.2, 0.3, 0.0]);
}

#[test]
fn derivatives_require_mesh_location() {
    let fieldmodule = FieldModule::new();
    let (coordinates, _, nodes) = line_element(&fieldmodule, 0.0, 1.0);
    let mut cache = fieldmodule.create_fieldcache();
    cache.set_node(&nodes[0]).unwrap();
    let mut values = [0.0];
    let mut derivatives = [0.0; 3];
    assert!(matches!(
        coordinates.evaluate_real_with_derivatives(&mut cache, &mut values, &mut derivatives),
        Err(FieldError::InvalidArgument(_))
    ));
}

#[test]
fn value_caches_are_created_on_first_evaluation() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0]).unwrap();
    let b = fieldmodule.create_identity(&a).unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    assert_eq!(cache.value_cache_count(), 0);

    let mut value = [0.0];
    b.evaluate_real(&mut cache, &mut value).unwrap();
    assert_eq!(cache.value_cache_count(), 2);
    cache.clear_location();
    b.evaluate_real(&mut cache, &mut value).unwrap();
    assert_eq!(cache.value_cache_count(), 2);
}

#[test]
fn fieldcache_belongs_to_its_module() {
    let fieldmodule = FieldModule::new();
    let cache = fieldmodule.create_fieldcache();
    assert_eq!(cache.fieldmodule(), fieldmodule);
    assert_scalar_eq!(cache.time(), 0.0);
}
