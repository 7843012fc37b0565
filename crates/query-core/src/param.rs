//! Parameter signatures and argument binding (spec §6).
//!
//! Every registered operation kind declares a `Signature` describing its
//! named parameters and their types. `Arguments` wraps the raw JSON object
//! from the wire-format `spec` field and validates required parameters,
//! unknown-parameter rejection, and type checks — the Rust analogue of
//! the source engine's `query.Arguments` binder.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::error::{QueryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Duration,
    Time,
    Function,
    Object,
    Array,
}

/// `name -> expected type` for one operation kind.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: BTreeMap<String, ParamType>,
    pub required: HashSet<String>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &str, typ: ParamType) -> Self {
        self.params.insert(name.to_string(), typ);
        self
    }

    pub fn required_param(mut self, name: &str, typ: ParamType) -> Self {
        self.params.insert(name.to_string(), typ);
        self.required.insert(name.to_string());
        self
    }
}

/// Validates and extracts typed values from a `spec` JSON object against
/// a `Signature`.
pub struct Arguments<'a> {
    value: &'a Value,
    sig: &'a Signature,
}

impl<'a> Arguments<'a> {
    pub fn bind(value: &'a Value, sig: &'a Signature) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| QueryError::validation("spec must be a JSON object"))?;
        for key in obj.keys() {
            if !sig.params.contains_key(key) {
                return Err(QueryError::validation(format!("unknown parameter {key:?}")));
            }
        }
        for req in &sig.required {
            if !obj.contains_key(req) {
                return Err(QueryError::validation(format!(
                    "missing required parameter {req:?}"
                )));
            }
        }
        Ok(Self { value, sig })
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        self.typed(name, ParamType::String)?;
        Ok(self.field(name).and_then(|v| v.as_str()).map(str::to_string))
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        self.typed(name, ParamType::Bool)?;
        Ok(self.field(name).and_then(Value::as_bool))
    }

    pub fn get_int(&self, name: &str) -> Result<Option<i64>> {
        self.typed(name, ParamType::Int)?;
        Ok(self.field(name).and_then(Value::as_i64))
    }

    pub fn get_float(&self, name: &str) -> Result<Option<f64>> {
        self.typed(name, ParamType::Float)?;
        Ok(self.field(name).and_then(Value::as_f64))
    }

    pub fn get_required_int(&self, name: &str) -> Result<i64> {
        self.get_int(name)?
            .ok_or_else(|| QueryError::validation(format!("missing required parameter {name:?}")))
    }

    fn typed(&self, name: &str, expected: ParamType) -> Result<()> {
        match self.sig.params.get(name) {
            Some(t) if *t == expected => Ok(()),
            Some(_) => Err(QueryError::validation(format!(
                "parameter {name:?} has wrong type in signature"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_unknown_parameter() {
        let sig = Signature::new().param("n", ParamType::Int);
        let v = json!({"n": 1, "bogus": true});
        assert!(Arguments::bind(&v, &sig).is_err());
    }

    #[test]
    fn rejects_missing_required() {
        let sig = Signature::new().required_param("n", ParamType::Int);
        let v = json!({});
        assert!(Arguments::bind(&v, &sig).is_err());
    }

    #[test]
    fn extracts_values() {
        let sig = Signature::new().required_param("n", ParamType::Int);
        let v = json!({"n": 3});
        let args = Arguments::bind(&v, &sig).unwrap();
        assert_eq!(args.get_required_int("n").unwrap(), 3);
    }
}
