//! Messages exchanged between the optimizer process and the bridge.
//!
//! Decoding is structural only: unknown fields are ignored, missing ones are
//! rejected. Semantic checks belong to the [`crate::CostEstimator`].

use ob_types::{Cost, ParameterValue, Report};
use serde::{Deserialize, Serialize};

/// The two routes served by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    EstimateCost,
    RegisterReport,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::EstimateCost => "/estimate_cost",
            Self::RegisterReport => "/register_report",
        }
    }

    /// HTTP method the route accepts; anything else is rejected before the
    /// body is read.
    pub fn method(self) -> &'static str {
        match self {
            Self::EstimateCost => "GET",
            Self::RegisterReport => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateCostRequest {
    pub parameter_values: Vec<ParameterValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateCostResponse {
    pub cost: Cost,
    pub invalid_parameter_combination: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterReportRequest {
    pub report: Option<Report>,
}

/// Empty acknowledgment, encoded as `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterReportResponse {}

/// Body of every non-200 bridge response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_cost_request_wire_shape() {
        let json = r#"{"parameter_values":[{"name":"x","value":3},{"name":"y","value":-1}]}"#;
        let request: EstimateCostRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request.parameter_values,
            vec![ParameterValue::new("x", 3), ParameterValue::new("y", -1)]
        );
    }

    #[test]
    fn estimate_cost_request_rejects_non_integer_values() {
        let json = r#"{"parameter_values":[{"name":"x","value":"three"}]}"#;
        assert!(serde_json::from_str::<EstimateCostRequest>(json).is_err());

        let json = r#"{"values":[]}"#;
        assert!(serde_json::from_str::<EstimateCostRequest>(json).is_err());
    }

    #[test]
    fn estimate_cost_response_wire_shape() {
        let response = EstimateCostResponse {
            cost: 10.0,
            invalid_parameter_combination: true,
        };
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            serde_json::json!({"cost": 10.0, "invalid_parameter_combination": true})
        );
    }

    #[test]
    fn register_report_payload_may_be_absent() {
        let request: RegisterReportRequest = serde_json::from_str("{}").unwrap();
        assert!(request.report.is_none());

        let request: RegisterReportRequest = serde_json::from_str(r#"{"report":null}"#).unwrap();
        assert!(request.report.is_none());
    }

    #[test]
    fn register_report_response_is_empty_object() {
        assert_eq!(
            serde_json::to_string(&RegisterReportResponse::default()).unwrap(),
            "{}"
        );
    }

    #[test]
    fn endpoints_pin_their_methods() {
        assert_eq!(Endpoint::EstimateCost.method(), "GET");
        assert_eq!(Endpoint::RegisterReport.method(), "POST");
        assert_eq!(Endpoint::RegisterReport.path(), "/register_report");
    }
}
