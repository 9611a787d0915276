use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{error::ServiceError, model::ConfigPatch};

pub type Getter<C> = fn(&C) -> Value;
/// Assigns a JSON value to one field, or explains why the value is unusable.
pub type Setter<C> = fn(&mut C, &Value) -> Result<(), String>;

struct ConfigField<C> {
    get: Getter<C>,
    set: Setter<C>,
}

/// The named fields a backend exposes for runtime mutation.
///
/// Backends declare their schema once; the service only ever goes through
/// [`ConfigSchema::apply`], which works on a copy so a rejected patch leaves
/// the committed configuration untouched.
pub struct ConfigSchema<C> {
    fields: BTreeMap<&'static str, ConfigField<C>>,
}

impl<C> Default for ConfigSchema<C> {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }
}

impl<C: Clone> ConfigSchema<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, get: Getter<C>, set: Setter<C>) -> Self {
        self.fields.insert(name, ConfigField { get, set });
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    pub fn get_field(&self, config: &C, name: &str) -> Option<Value> {
        self.fields.get(name).map(|field| (field.get)(config))
    }

    pub fn set_field(&self, config: &mut C, name: &str, value: &Value) -> Result<(), ServiceError> {
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| ServiceError::InvalidConfigKey(name.to_string()))?;
        (field.set)(config, value).map_err(|reason| ServiceError::ConfigApply {
            key: name.to_string(),
            reason,
        })
    }

    /// Applies `patch` in order to a copy of `current`. The first unknown key
    /// or rejected value aborts and nothing is returned.
    pub fn apply(&self, current: &C, patch: &ConfigPatch) -> Result<C, ServiceError> {
        let mut working = current.clone();
        for (name, value) in patch.iter() {
            self.set_field(&mut working, name, value)?;
        }
        Ok(working)
    }

    pub fn snapshot(&self, config: &C) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, field)| (name.to_string(), (field.get)(config)))
            .collect()
    }
}

/// Conversions used by typed setters.
pub mod value {
    use serde_json::Value;

    pub fn to_f64(value: &Value) -> Result<f64, String> {
        value
            .as_f64()
            .ok_or_else(|| format!("expected a number, got {value}"))
    }

    pub fn to_non_negative_f64(value: &Value) -> Result<f64, String> {
        let number = to_f64(value)?;
        if number < 0.0 {
            return Err(format!("expected a non-negative number, got {number}"));
        }
        Ok(number)
    }

    /// A probability mass in `(0, 1]`.
    pub fn to_unit_interval(value: &Value) -> Result<f64, String> {
        let number = to_f64(value)?;
        if number <= 0.0 || number > 1.0 {
            return Err(format!("expected a number in (0, 1], got {number}"));
        }
        Ok(number)
    }

    pub fn to_usize(value: &Value) -> Result<usize, String> {
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| format!("expected a non-negative integer, got {value}"))
    }

    pub fn to_bool(value: &Value) -> Result<bool, String> {
        value
            .as_bool()
            .ok_or_else(|| format!("expected a boolean, got {value}"))
    }

    pub fn to_optional_i64(value: &Value) -> Result<Option<i64>, String> {
        match value {
            Value::Null => Ok(None),
            other => other
                .as_i64()
                .map(Some)
                .ok_or_else(|| format!("expected an integer or null, got {other}")),
        }
    }
}
