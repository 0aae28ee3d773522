//! Terminal artifact of an optimization run.

use serde::{Deserialize, Serialize};

use crate::config::Cost;
use crate::parameter::ParameterValue;

/// Optimum found by the external optimizer, registered exactly once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Discovered optimal value of the cost function.
    pub cost: Cost,
    /// Parameter values at the optimum, in the optimizer's order.
    pub optimum: Vec<ParameterValue>,
    pub iterations: u64,
    pub evaluations: u64,
    pub fast_evaluations: u64,
}

impl Report {
    /// Value of `name` at the optimum, if the optimizer reported one.
    pub fn optimum_value(&self, name: &str) -> Option<i64> {
        self.optimum
            .iter()
            .find(|pv| pv.name == name)
            .map(|pv| pv.value)
    }
}
