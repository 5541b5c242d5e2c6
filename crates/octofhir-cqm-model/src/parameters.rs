//! Caller-supplied parameter values

use crate::{Interval, ScalarValue};
use std::collections::HashMap;

/// Name of the parameter every measure can reference without declaring it
pub const MEASUREMENT_PERIOD: &str = "Measurement Period";

/// Parameter values for one evaluation or compilation run.
///
/// Values given here take precedence over the library's declared defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: HashMap<String, ScalarValue>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_measurement_period(period: Interval) -> Self {
        let mut parameters = Self::new();
        parameters.set(MEASUREMENT_PERIOD, ScalarValue::Interval(period));
        parameters
    }

    pub fn set(&mut self, name: impl Into<String>, value: ScalarValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.values.get(name)
    }

    pub fn measurement_period(&self) -> Option<&Interval> {
        match self.values.get(MEASUREMENT_PERIOD) {
            Some(ScalarValue::Interval(period)) => Some(period),
            _ => None,
        }
    }
}
