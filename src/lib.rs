//! Caching, composable computed-field evaluation over finite element domains.
//!
//! A [`Field`](field::Field) is a node in a directed acyclic graph of typed operators whose
//! leaves are finite element (or otherwise stored) fields. Fields are evaluated at a domain
//! location held by a [`Fieldcache`](field_cache::Fieldcache), which memoizes the value of every
//! field it has evaluated until the location changes.
//!
//! ```
//! use computed_fields::field_module::FieldModule;
//!
//! let module = FieldModule::new();
//! let a = module.create_constant(&[2.0, 3.0]).unwrap();
//! let composite = module
//!     .create_composite(3, &[a.clone()], &[99.0], &[0, 0, -1], &[1, 0, 0])
//!     .unwrap();
//!
//! let mut cache = module.create_fieldcache();
//! let mut values = [0.0; 3];
//! composite.evaluate_real(&mut cache, &mut values).unwrap();
//! assert_eq!(values, [3.0, 2.0, 99.0]);
//! ```

pub mod composite;
pub mod element;
pub mod error;
pub mod field;
pub mod field_cache;
pub mod field_module;
pub mod finite_element;
pub mod location;
pub mod mesh;
pub mod mesh_location;
pub mod procedural;
pub mod string;
pub mod time;
pub mod value_cache;

pub extern crate nalgebra;

/// The maximum number of chart (xi) coordinates of any element.
pub const MAXIMUM_ELEMENT_XI_DIMENSIONS: usize = 3;

pub use error::{FieldError, FieldResult};
pub use field::Field;
pub use field_cache::Fieldcache;
pub use field_module::FieldModule;
