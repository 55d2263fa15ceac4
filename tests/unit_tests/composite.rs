use computed_fields::composite::SourceSelector;
use computed_fields::field::FieldType;
use computed_fields::procedural::create_unit_box_uniform_hex_mesh;
use computed_fields::{Field, FieldError, FieldModule, Fieldcache};
use proptest::prelude::*;

fn evaluate(field: &Field, cache: &mut Fieldcache) -> Vec<f64> {
    let mut values = vec![0.0; field.component_count()];
    field.evaluate_real(cache, &mut values).unwrap();
    values
}

/// A node with an assigned three-component finite element field, and a cache at that node.
fn node_field(fieldmodule: &FieldModule, values: &[f64]) -> (Field, Fieldcache) {
    let field = fieldmodule.create_finite_element(values.len()).unwrap();
    let node = fieldmodule.nodeset().create_node(1).unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    cache.set_node(&node).unwrap();
    field.assign_real(&mut cache, values).unwrap();
    (field, cache)
}

#[test]
fn composite_mixes_source_components_and_values() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[2.0, 3.0]).unwrap();
    let _b = fieldmodule.create_constant(&[10.0]).unwrap();
    let composite = fieldmodule
        .create_composite(3, &[a], &[99.0], &[0, 0, -1], &[1, 0, 0])
        .unwrap();
    assert_eq!(composite.field_type(), FieldType::Composite);
    let mut cache = fieldmodule.create_fieldcache();
    assert_eq!(evaluate(&composite, &mut cache), [3.0, 2.0, 99.0]);
}

#[test]
fn composite_accepts_interleaved_fields_and_values() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0, 2.0]).unwrap();
    let b = fieldmodule.create_constant(&[3.0]).unwrap();
    let composite = fieldmodule
        .create_composite(
            6,
            &[a.clone(), b.clone()],
            &[7.0, 8.0],
            &[-1, 0, 1, 0, -1, 1],
            &[0, 1, 0, 0, 1, 0],
        )
        .unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    assert_eq!(evaluate(&composite, &mut cache), [7.0, 2.0, 3.0, 1.0, 8.0, 3.0]);
    assert_eq!(composite.source_fields(), [a, b]);
}

#[test]
fn composite_rejects_invalid_selectors() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0, 2.0]).unwrap();
    let b = fieldmodule.create_constant(&[3.0]).unwrap();
    let text = fieldmodule.create_string_constant("text").unwrap();
    let ab = [a.clone(), b.clone()];

    let rejected = [
        // source fields first used out of order
        fieldmodule.create_composite(2, &ab, &[], &[1, 0], &[0, 0]),
        // source field not used
        fieldmodule.create_composite(1, &ab, &[], &[0], &[0]),
        // repeated source field
        fieldmodule.create_composite(2, &[a.clone(), a.clone()], &[], &[0, 1], &[0, 0]),
        // component out of range
        fieldmodule.create_composite(1, &[b.clone()], &[], &[0], &[1]),
        // literal values out of order
        fieldmodule.create_composite(2, &[], &[1.0, 2.0], &[-1, -1], &[1, 0]),
        // literal value repeated
        fieldmodule.create_composite(2, &[], &[1.0, 2.0], &[-1, -1], &[0, 0]),
        // literal value not used
        fieldmodule.create_composite(1, &[], &[1.0, 2.0], &[-1], &[0]),
        // literal value beyond the supplied values
        fieldmodule.create_composite(2, &[], &[1.0], &[-1, -1], &[0, 1]),
        // source field number beyond the supplied fields
        fieldmodule.create_composite(1, &[], &[], &[0], &[0]),
        // non-numerical source field
        fieldmodule.create_composite(1, &[text], &[], &[0], &[0]),
        // selector arrays shorter than the component count
        fieldmodule.create_composite(2, &[b.clone()], &[], &[0], &[0]),
        // no components
        fieldmodule.create_composite(0, &[], &[], &[], &[]),
    ];
    for (i, result) in rejected.into_iter().enumerate() {
        assert!(
            matches!(result, Err(FieldError::InvalidArgument(_))),
            "case {} was not rejected",
            i
        );
    }
    assert!(fieldmodule
        .create_composite(2, &[b.clone()], &[], &[0, 0], &[0, 0])
        .is_ok());
}

#[test]
fn composite_rejects_source_field_from_another_region() {
    let fieldmodule = FieldModule::new();
    let foreign = FieldModule::new().create_constant(&[1.0]).unwrap();
    assert!(fieldmodule.create_identity(&foreign).is_err());
}

#[test]
fn composite_from_selectors_matches_numbered_form() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0, 2.0]).unwrap();
    let selectors = [
        SourceSelector::Field {
            field_index: 0,
            component: 1,
        },
        SourceSelector::Value { value_index: 0 },
    ];
    let from_selectors = fieldmodule
        .create_composite_from_selectors(&[a.clone()], &[5.0], &selectors)
        .unwrap();
    let numbered = fieldmodule
        .create_composite(2, &[a], &[5.0], &[0, -1], &[1, 0])
        .unwrap();
    assert!(from_selectors.compare_definition(&numbered));
}

#[test]
fn identity_passes_values_through() {
    let fieldmodule = FieldModule::new();
    let (source, mut cache) = node_field(&fieldmodule, &[1.0, 2.0, 3.0]);
    let identity = fieldmodule.create_identity(&source).unwrap();
    assert_eq!(identity.field_type(), FieldType::Identity);
    assert_eq!(evaluate(&identity, &mut cache), evaluate(&source, &mut cache));
}

#[test]
fn identity_assignment_assigns_source() {
    let fieldmodule = FieldModule::new();
    let (source, mut cache) = node_field(&fieldmodule, &[1.0, 2.0, 3.0]);
    let identity = fieldmodule.create_identity(&source).unwrap();
    identity.assign_real(&mut cache, &[4.0, 5.0, 6.0]).unwrap();
    assert_eq!(evaluate(&source, &mut cache), [4.0, 5.0, 6.0]);
    assert_eq!(evaluate(&identity, &mut cache), [4.0, 5.0, 6.0]);
}

#[test]
fn identity_of_constant_is_not_assignable() {
    let fieldmodule = FieldModule::new();
    let constant = fieldmodule.create_constant(&[1.0]).unwrap();
    let identity = fieldmodule.create_identity(&constant).unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    assert_eq!(
        identity.assign_real(&mut cache, &[2.0]),
        Err(FieldError::AssignmentNotSupported {
            field_type: FieldType::Constant
        })
    );
    assert_eq!(evaluate(&identity, &mut cache), [1.0]);
}

#[test]
fn component_selection_out_of_range_fails() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0, 2.0]).unwrap();
    assert!(fieldmodule.create_component(&a, 2).is_err());
    assert!(fieldmodule.create_component_multiple(&a, &[0, 5]).is_err());
}

#[test]
fn component_multiple_allows_reordering_and_repeats() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0, 2.0, 3.0]).unwrap();
    let field = fieldmodule.create_component_multiple(&a, &[2, 0, 2]).unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    assert_eq!(evaluate(&field, &mut cache), [3.0, 1.0, 3.0]);
    assert_eq!(field.field_type(), FieldType::Component);
    assert_eq!(field.source_component_index(0), Some(2));
    assert_eq!(field.source_component_index(1), Some(0));
    assert_eq!(field.source_component_index(3), None);
}

#[test]
fn concatenate_stacks_components_and_merges_repeated_sources() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0, 2.0]).unwrap();
    let b = fieldmodule.create_constant(&[3.0]).unwrap();
    let concatenate = fieldmodule
        .create_concatenate(&[a.clone(), b.clone(), a.clone()])
        .unwrap();
    assert_eq!(concatenate.component_count(), 5);
    assert_eq!(concatenate.source_fields(), [a, b]);
    let mut cache = fieldmodule.create_fieldcache();
    assert_eq!(evaluate(&concatenate, &mut cache), [1.0, 2.0, 3.0, 1.0, 2.0]);
    assert!(fieldmodule.create_concatenate(&[]).is_err());
}

#[test]
fn concatenate_is_not_assignable() {
    let fieldmodule = FieldModule::new();
    let (a, mut cache) = node_field(&fieldmodule, &[1.0, 2.0]);
    let concatenate = fieldmodule.create_concatenate(&[a.clone(), a.clone()]).unwrap();
    let result = concatenate.assign_real(&mut cache, &[5.0, 6.0, 7.0, 8.0]);
    assert_eq!(
        result,
        Err(FieldError::AssignmentNotSupported {
            field_type: FieldType::Concatenate
        })
    );
    assert_eq!(evaluate(&a, &mut cache), [1.0, 2.0]);
}

#[test]
fn identity_and_concatenate_inherit_coordinate_system() {
    use computed_fields::field::CoordinateSystemType;
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_finite_element(3).unwrap();
    a.set_coordinate_system_type(CoordinateSystemType::CylindricalPolar)
        .unwrap();
    let identity = fieldmodule.create_identity(&a).unwrap();
    let concatenate = fieldmodule.create_concatenate(&[a.clone()]).unwrap();
    let component = fieldmodule.create_component(&a, 0).unwrap();
    assert_eq!(
        identity.coordinate_system().system_type,
        CoordinateSystemType::CylindricalPolar
    );
    assert_eq!(
        concatenate.coordinate_system().system_type,
        CoordinateSystemType::CylindricalPolar
    );
    assert_eq!(
        component.coordinate_system().system_type,
        CoordinateSystemType::RectangularCartesian
    );
}

#[test]
fn constant_values_are_only_reported_for_constants() {
    let fieldmodule = FieldModule::new();
    let constant = fieldmodule.create_constant(&[1.5, -2.0]).unwrap();
    let composite = fieldmodule
        .create_composite(1, &[], &[1.5], &[-1], &[0])
        .unwrap();
    assert_eq!(constant.constant_values(), Some(vec![1.5, -2.0]));
    assert_eq!(composite.constant_values(), None);
    assert_eq!(constant.source_component_index(0), None);
}

#[test]
fn command_string_names_whole_fields_and_components() {
    let fieldmodule = FieldModule::new();
    let a = fieldmodule.create_constant(&[1.0, 2.0]).unwrap();
    a.set_name("a").unwrap();
    let swapped = fieldmodule
        .create_composite(3, &[a.clone()], &[99.0], &[0, 0, -1], &[1, 0, 0])
        .unwrap();
    insta::assert_snapshot!(swapped.command_string(), @"composite a.2 a.1 99");

    let whole = fieldmodule
        .create_composite(3, &[a], &[0.5], &[0, 0, -1], &[0, 1, 0])
        .unwrap();
    insta::assert_snapshot!(whole.command_string(), @"composite a 0.5");
}

#[test]
fn component_wrapper_is_reused() {
    let fieldmodule = FieldModule::new();
    let coordinates = fieldmodule.create_finite_element(2).unwrap();
    coordinates.set_name("coordinates").unwrap();
    coordinates.set_component_name(1, "y").unwrap();

    let wrapper = fieldmodule
        .find_or_create_component_wrapper(&coordinates, 1)
        .unwrap();
    assert_eq!(wrapper.name(), "coordinates.y");
    assert_eq!(wrapper.source_component_index(0), Some(1));

    let again = fieldmodule
        .find_or_create_component_wrapper(&coordinates, 1)
        .unwrap();
    assert_eq!(again, wrapper);
    let other = fieldmodule
        .find_or_create_component_wrapper(&coordinates, 0)
        .unwrap();
    assert_ne!(other, wrapper);
    assert_eq!(other.name(), "coordinates.1");
    assert!(fieldmodule.find_or_create_component_wrapper(&coordinates, 2).is_err());
}

#[test]
fn composite_is_undefined_where_a_source_is_undefined() {
    let fieldmodule = FieldModule::new();
    let stored = fieldmodule.create_finite_element(1).unwrap();
    let constant = fieldmodule.create_constant(&[1.0]).unwrap();
    let concatenate = fieldmodule.create_concatenate(&[constant, stored]).unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    assert!(!concatenate.is_defined_at_location(&mut cache));
    let mut values = [0.0; 2];
    assert_eq!(
        concatenate.evaluate_real(&mut cache, &mut values),
        Err(FieldError::NotDefined)
    );
}

#[test]
fn composite_derivatives_copy_source_rows_and_zero_literals() {
    let fieldmodule = FieldModule::new();
    let coordinates = create_unit_box_uniform_hex_mesh(&fieldmodule, 1).unwrap();
    let mut cache = fieldmodule.create_fieldcache();
    // Move the far corner so the coordinate Jacobian varies over the element
    let corner = fieldmodule.nodeset().find_node_by_identifier(8).unwrap();
    cache.set_node(&corner).unwrap();
    coordinates.assign_real(&mut cache, &[2.0, 1.5, 3.0]).unwrap();

    let composite = fieldmodule
        .create_composite(3, &[coordinates.clone()], &[5.0], &[0, -1, 0], &[2, 0, 0])
        .unwrap();
    let element = fieldmodule.mesh(3).unwrap().find_element_by_identifier(1).unwrap();
    cache.set_mesh_location(&element, &[0.25, 0.5, 0.75], None).unwrap();

    let mut x = [0.0; 3];
    let mut jacobian = [0.0; 9];
    let derivative_count = coordinates
        .evaluate_real_with_derivatives(&mut cache, &mut x, &mut jacobian)
        .unwrap();
    assert_eq!(derivative_count, 3);
    // dz/dxi3 = 1 + 2 xi1 xi2
    assert_eq!(jacobian[8], 1.25);

    let mut values = [0.0; 3];
    let mut derivatives = [f64::NAN; 9];
    let derivative_count = composite
        .evaluate_real_with_derivatives(&mut cache, &mut values, &mut derivatives)
        .unwrap();
    assert_eq!(derivative_count, 3);
    assert_eq!(values, [x[2], 5.0, x[0]]);
    assert_eq!(&derivatives[0..3], &jacobian[6..9]);
    assert_eq!(&derivatives[3..6], &[0.0; 3]);
    assert_eq!(&derivatives[6..9], &jacobian[0..3]);
}

fn constant_values_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-100.0..100.0f64, 1..6)
}

proptest! {
    #[test]
    fn component_selects_source_component(values in constant_values_strategy(), index in 0..6usize) {
        let fieldmodule = FieldModule::new();
        let source = fieldmodule.create_constant(&values).unwrap();
        let component = fieldmodule.create_component(&source, index);
        let mut cache = fieldmodule.create_fieldcache();
        if index < values.len() {
            let component = component.unwrap();
            prop_assert_eq!(evaluate(&component, &mut cache), vec![values[index]]);
        } else {
            prop_assert!(component.is_err());
        }
    }

    #[test]
    fn concatenate_has_components_of_sources_in_order(
        a in constant_values_strategy(),
        b in constant_values_strategy()
    ) {
        let fieldmodule = FieldModule::new();
        let fa = fieldmodule.create_constant(&a).unwrap();
        let fb = fieldmodule.create_constant(&b).unwrap();
        let concatenate = fieldmodule.create_concatenate(&[fa, fb]).unwrap();
        prop_assert_eq!(concatenate.component_count(), a.len() + b.len());
        let mut cache = fieldmodule.create_fieldcache();
        let expected: Vec<f64> = a.iter().chain(&b).copied().collect();
        prop_assert_eq!(evaluate(&concatenate, &mut cache), expected);
    }

    #[test]
    fn composite_rejects_late_first_use_of_source(swap in 1..3usize) {
        // Fields [a, b, c] where the first uses of two fields are swapped
        let fieldmodule = FieldModule::new();
        let sources: Vec<Field> = (0..3)
            .map(|i| fieldmodule.create_constant(&[i as f64]).unwrap())
            .collect();
        let mut field_numbers = vec![0, 1, 2];
        field_numbers.swap(swap - 1, swap);
        let result = fieldmodule.create_composite(3, &sources, &[], &field_numbers, &[0, 0, 0]);
        prop_assert!(result.is_err());
    }
}
