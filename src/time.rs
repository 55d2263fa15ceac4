//! Fields of the cache time.
use crate::error::{FieldError, FieldResult};
use crate::field::{Field, FieldCore, FieldType};
use crate::field_cache::Fieldcache;
use crate::field_module::FieldModule;
use crate::value_cache::{FieldValueCache, RealFieldValueCache};
use std::any::Any;
use std::rc::Rc;

#[derive(Debug)]
pub(crate) struct TimeValueCore;

impl FieldCore for TimeValueCore {
    fn field_type(&self) -> FieldType {
        FieldType::TimeValue
    }

    fn evaluate(&self, _field: &Field, cache: &mut Fieldcache, value_cache: &mut FieldValueCache) -> FieldResult<()> {
        value_cache
            .as_real_mut()
            .ok_or_else(|| FieldError::EvaluationFailed("value cache type mismatch".to_string()))?
            .set_values(&[cache.time()]);
        Ok(())
    }

    /// Time does not vary over the element.
    fn evaluate_derivatives(
        &self,
        _field: &Field,
        _cache: &mut Fieldcache,
        value_cache: &mut RealFieldValueCache,
        derivative_count: usize,
    ) -> FieldResult<()> {
        value_cache.derivatives_mut(derivative_count).fill(0.0);
        Ok(())
    }

    fn is_defined_at_location(&self, _field: &Field, _cache: &mut Fieldcache) -> bool {
        true
    }

    fn command_string(&self, _field: &Field) -> String {
        "time_value".to_string()
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other.as_any().is::<TimeValueCore>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FieldModule {
    /// A scalar field whose value is the time of the cache it is evaluated in.
    pub fn create_time_value(&self) -> FieldResult<Field> {
        self.create_field(1, Vec::new(), Vec::new(), Rc::new(TimeValueCore), None)
    }
}
