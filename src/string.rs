//! String constant fields.
use crate::error::{FieldError, FieldResult};
use crate::field::{Field, FieldCore, FieldType, FieldValueType};
use crate::field_cache::Fieldcache;
use crate::field_module::FieldModule;
use crate::value_cache::FieldValueCache;
use std::any::Any;
use std::rc::Rc;

#[derive(Debug)]
pub(crate) struct StringConstantCore {
    value: String,
}

impl FieldCore for StringConstantCore {
    fn field_type(&self) -> FieldType {
        FieldType::StringConstant
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::String
    }

    fn evaluate(&self, _field: &Field, _cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        value_cache
            .as_string_mut()
            .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
            .set_value(self.value.as_str());
        Ok(())
    }

    fn is_defined_at_location(&self, _field: &Field, _cache: &mut Fieldcache) -> bool {
        true
    }

    fn command_string(&self, _field: &Field) -> String {
        format!("string_constant {:?}", self.value)
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<StringConstantCore>()
            .map_or(false, |other| other.value == self.value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FieldModule {
    /// A single-component string field with the same value everywhere.
    pub fn create_string_constant(&self, value: &str) -> FieldResult<Field> {
        let core = StringConstantCore {
            value: value.to_string(),
        };
        self.create_field(1, Vec::new(), Vec::new(), Rc::new(core), None)
    }
}
