//! Tunable integer parameters and the values exchanged for them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::errors::ParameterError;

/// Character class a parameter name must contain at least once.
pub const NAME_PATTERN: &str = "[a-zA-Z0-9_]";

fn name_regex() -> &'static Regex {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX.get_or_init(|| Regex::new(NAME_PATTERN).expect("NAME_PATTERN is a valid regex"))
}

/// Injects a value received from the optimizer into caller-owned state.
pub type ParameterSetter = Arc<dyn Fn(i64) + Send + Sync>;

/// Inclusive range `[left, right]` a parameter may vary in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub left: i64,
    pub right: i64,
}

impl Bound {
    pub fn new(left: i64, right: i64) -> Self {
        Self { left, right }
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.left..=self.right).contains(&value)
    }
}

/// Something in the caller's configuration worth optimizing.
///
/// The description never owns the state it mutates: the setter closes over
/// whatever the caller wants to tune and is invoked once per estimation.
#[derive(Clone)]
pub struct ParameterDescription {
    pub name: String,
    pub bound: Bound,
    pub setter: Option<ParameterSetter>,
}

impl ParameterDescription {
    pub fn new(name: impl Into<String>, bound: Bound) -> Self {
        Self {
            name: name.into(),
            bound,
            setter: None,
        }
    }

    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        if !name_regex().is_match(&self.name) {
            return Err(ParameterError::InvalidName {
                name: self.name.clone(),
                pattern: NAME_PATTERN,
            });
        }
        if self.setter.is_none() {
            return Err(ParameterError::MissingModifier {
                name: self.name.clone(),
            });
        }
        if self.bound.left > self.bound.right {
            return Err(ParameterError::InvalidBound {
                name: self.name.clone(),
                left: self.bound.left,
                right: self.bound.right,
            });
        }
        Ok(())
    }

    /// Push `value` into the caller's state. A description without a setter
    /// never passes validation, so this is a no-op only for unvalidated input.
    pub fn apply(&self, value: i64) {
        if let Some(setter) = &self.setter {
            setter(value);
        }
    }
}

impl fmt::Debug for ParameterDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDescription")
            .field("name", &self.name)
            .field("bound", &self.bound)
            .field("setter", &self.setter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// First description named `name`.
pub fn find_parameter<'a>(
    parameters: &'a [ParameterDescription],
    name: &str,
) -> Result<&'a ParameterDescription, ParameterError> {
    parameters
        .iter()
        .find(|param| param.name == name)
        .ok_or_else(|| ParameterError::NotFound {
            name: name.to_string(),
        })
}

/// A concrete value of one parameter, as sent over the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: i64,
}

impl ParameterValue {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}
