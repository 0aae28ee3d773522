//! Stateful mediator between bridge calls and the caller's cost function.

use ob_types::{
    BridgeError, CancellationToken, ConfigError, Cost, CostError, CostFunction, OptimizerConfig,
    ParameterDescription, ParameterError, Report,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, trace};

use crate::api::{
    EstimateCostRequest, EstimateCostResponse, RegisterReportRequest, RegisterReportResponse,
};

#[derive(Debug, Default)]
struct EstimatorState {
    attempts: u64,
    report: Option<Report>,
}

/// Applies incoming parameter values, runs the cost function and latches the
/// final report.
///
/// Every call takes the same lock for its whole duration, so setter
/// application, cost evaluation and the attempt counter are serialized even
/// if the optimizer issues concurrent requests.
pub struct CostEstimator {
    parameters: Vec<ParameterDescription>,
    cost_function: Arc<dyn CostFunction>,
    ceiling: Cost,
    state: Mutex<EstimatorState>,
}

impl CostEstimator {
    /// Build an estimator from a validated configuration.
    pub fn new(config: &OptimizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cost_function = config
            .cost_function
            .clone()
            .ok_or(ConfigError::MissingCostFunction)?;

        Ok(Self {
            parameters: config.parameters.clone(),
            cost_function,
            ceiling: config.invalid_parameter_combination_cost,
            state: Mutex::new(EstimatorState::default()),
        })
    }

    /// Apply `request` and evaluate the cost function. A request whose
    /// `cancel` token fired while it waited for the lock is dropped without
    /// touching the caller's state.
    pub fn estimate_cost(
        &self,
        request: &EstimateCostRequest,
        cancel: &CancellationToken,
    ) -> Result<EstimateCostResponse, BridgeError> {
        // resolve every name first so a bad request leaves no side effects
        let resolved = request
            .parameter_values
            .iter()
            .map(|pv| {
                let param = ob_types::find_parameter(&self.parameters, &pv.name).map_err(
                    |err| match err {
                        ParameterError::NotFound { name } => BridgeError::UnknownParameter { name },
                        other => BridgeError::Internal {
                            message: other.to_string(),
                        },
                    },
                )?;
                if !param.bound.contains(pv.value) {
                    return Err(BridgeError::OutOfBound {
                        name: pv.name.clone(),
                        value: pv.value,
                        left: param.bound.left,
                        right: param.bound.right,
                    });
                }
                Ok((param, pv.value))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state.lock();
        if cancel.is_cancelled() {
            return Err(BridgeError::CostFunction(CostError::Cancelled));
        }
        for (param, value) in resolved {
            param.apply(value);
        }
        state.attempts += 1;

        let response = match self.cost_function.estimate(cancel) {
            Ok(cost) => {
                if !cost.is_finite() {
                    return Err(BridgeError::NonFiniteCost { cost });
                }
                if cost >= self.ceiling {
                    return Err(BridgeError::CostCeilingViolated {
                        cost,
                        ceiling: self.ceiling,
                    });
                }
                EstimateCostResponse {
                    cost,
                    invalid_parameter_combination: false,
                }
            }
            Err(CostError::InvalidParameterCombination) => EstimateCostResponse {
                cost: self.ceiling,
                invalid_parameter_combination: true,
            },
            Err(err) => return Err(BridgeError::CostFunction(err)),
        };

        trace!(
            attempts = state.attempts,
            ?request,
            ?response,
            "estimate cost"
        );
        Ok(response)
    }

    pub fn register_report(
        &self,
        request: RegisterReportRequest,
    ) -> Result<RegisterReportResponse, BridgeError> {
        let mut state = self.state.lock();
        if state.report.is_some() {
            return Err(BridgeError::DuplicateReport);
        }
        let report = request.report.ok_or(BridgeError::EmptyReport)?;

        info!(
            cost = report.cost,
            iterations = report.iterations,
            evaluations = report.evaluations,
            "register report"
        );
        state.report = Some(report);
        Ok(RegisterReportResponse {})
    }

    /// Number of cost function invocations so far.
    pub fn attempts(&self) -> u64 {
        self.state.lock().attempts
    }

    /// The latched report, if the optimizer registered one.
    pub fn report(&self) -> Option<Report> {
        self.state.lock().report.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_types::{Bound, ParameterValue};
    use std::sync::atomic::{AtomicI64, Ordering};

    struct Service {
        x: Arc<AtomicI64>,
        y: Arc<AtomicI64>,
    }

    impl Service {
        fn new() -> Self {
            Self {
                x: Arc::new(AtomicI64::new(0)),
                y: Arc::new(AtomicI64::new(0)),
            }
        }

        fn config(&self) -> OptimizerConfig {
            let (x, y) = (Arc::clone(&self.x), Arc::clone(&self.y));
            let (cx, cy) = (Arc::clone(&self.x), Arc::clone(&self.y));
            OptimizerConfig::new()
                .with_parameter(
                    ParameterDescription::new("x", Bound::new(0, 10))
                        .with_setter(move |v| x.store(v, Ordering::SeqCst)),
                )
                .with_parameter(
                    ParameterDescription::new("y", Bound::new(0, 10))
                        .with_setter(move |v| y.store(v, Ordering::SeqCst)),
                )
                .with_cost_function(move |_| {
                    let (x, y) = (cx.load(Ordering::SeqCst), cy.load(Ordering::SeqCst));
                    if x < y {
                        return Err(CostError::InvalidParameterCombination);
                    }
                    Ok(-((x * y) as Cost))
                })
                .with_invalid_parameter_combination_cost(10.0)
        }
    }

    fn request(values: &[(&str, i64)]) -> EstimateCostRequest {
        EstimateCostRequest {
            parameter_values: values
                .iter()
                .map(|(name, value)| ParameterValue::new(*name, *value))
                .collect(),
        }
    }

    fn estimate(
        estimator: &CostEstimator,
        values: &[(&str, i64)],
    ) -> Result<EstimateCostResponse, BridgeError> {
        estimator.estimate_cost(&request(values), &CancellationToken::new())
    }

    fn report(cost: Cost) -> Report {
        Report {
            cost,
            optimum: vec![ParameterValue::new("x", 10), ParameterValue::new("y", 10)],
            iterations: 1,
            evaluations: 4,
            fast_evaluations: 0,
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = OptimizerConfig::new().with_cost_function(|_| Ok(0.0));
        assert!(matches!(
            CostEstimator::new(&config),
            Err(ConfigError::EmptyParameters)
        ));
    }

    #[test]
    fn estimates_cost_after_applying_values() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();

        let response = estimate(&estimator, &[("x", 4), ("y", 3)]).unwrap();
        assert_eq!(response.cost, -12.0);
        assert!(!response.invalid_parameter_combination);
        assert_eq!(service.x.load(Ordering::SeqCst), 4);
        assert_eq!(service.y.load(Ordering::SeqCst), 3);
        assert_eq!(estimator.attempts(), 1);
    }

    #[test]
    fn identical_requests_yield_identical_responses() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();

        let first = estimate(&estimator, &[("x", 7), ("y", 2)]).unwrap();
        let second = estimate(&estimator, &[("x", 7), ("y", 2)]).unwrap();
        assert_eq!(first, second);
        assert_eq!(estimator.attempts(), 2);
    }

    #[test]
    fn unknown_parameter_applies_nothing() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();

        let err = estimate(&estimator, &[("x", 5), ("nope", 1)]).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownParameter { ref name } if name == "nope"));
        assert_eq!(service.x.load(Ordering::SeqCst), 0);
        assert_eq!(estimator.attempts(), 0);
    }

    #[test]
    fn out_of_bound_value_applies_nothing() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();

        let err = estimate(&estimator, &[("x", 5), ("y", 11)]).unwrap_err();
        assert!(matches!(err, BridgeError::OutOfBound { value: 11, .. }));
        assert_eq!(service.x.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_combination_reports_ceiling() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();

        for (x, y) in [(0, 1), (2, 9), (9, 10)] {
            let response = estimate(&estimator, &[("x", x), ("y", y)]).unwrap();
            assert!(response.invalid_parameter_combination);
            assert_eq!(response.cost, 10.0);
        }
    }

    #[test]
    fn cost_at_ceiling_is_rejected() {
        let service = Service::new();
        let config = service
            .config()
            .with_cost_function(|_| Ok(10.0))
            .with_invalid_parameter_combination_cost(10.0);
        let estimator = CostEstimator::new(&config).unwrap();

        let err = estimate(&estimator, &[("x", 1)]).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::CostCeilingViolated {
                cost,
                ceiling
            } if cost == 10.0 && ceiling == 10.0
        ));
    }

    #[test]
    fn non_finite_cost_is_rejected() {
        let service = Service::new();
        let config = service.config().with_cost_function(|_| Ok(Cost::NAN));
        let estimator = CostEstimator::new(&config).unwrap();

        let err = estimate(&estimator, &[("x", 1)]).unwrap_err();
        assert!(matches!(err, BridgeError::NonFiniteCost { .. }));
    }

    #[test]
    fn other_cost_errors_propagate() {
        let service = Service::new();
        let config = service
            .config()
            .with_cost_function(|_| Err(anyhow::anyhow!("backend unavailable").into()));
        let estimator = CostEstimator::new(&config).unwrap();

        let err = estimate(&estimator, &[("x", 1)]).unwrap_err();
        assert!(matches!(err, BridgeError::CostFunction(CostError::Other(_))));
        assert!(err.to_string().contains("backend unavailable"));
        assert_eq!(estimator.attempts(), 1);
    }

    #[test]
    fn cost_function_sees_the_request_token() {
        let service = Service::new();
        let config = service.config().with_cost_function(|cancel| {
            if cancel.is_cancelled() {
                return Err(CostError::Cancelled);
            }
            Ok(-1.0)
        });
        let estimator = CostEstimator::new(&config).unwrap();

        let cancel = CancellationToken::new();
        assert_eq!(
            estimator.estimate_cost(&request(&[("x", 3)]), &cancel).unwrap().cost,
            -1.0
        );
        assert_eq!(estimator.attempts(), 1);
    }

    #[test]
    fn cancelled_request_is_not_evaluated() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = estimator
            .estimate_cost(&request(&[("x", 6), ("y", 2)]), &cancel)
            .unwrap_err();
        assert!(matches!(err, BridgeError::CostFunction(CostError::Cancelled)));
        assert_eq!(service.x.load(Ordering::SeqCst), 0);
        assert_eq!(estimator.attempts(), 0);
    }

    #[test]
    fn concurrent_estimations_are_serialized() {
        let service = Service::new();
        let (cx, cy) = (Arc::clone(&service.x), Arc::clone(&service.y));
        // every request sets x == y; an interleaved setter would break that
        let config = service.config().with_cost_function(move |_| {
            let x = cx.load(Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(1));
            let y = cy.load(Ordering::SeqCst);
            if x != y {
                return Err(anyhow::anyhow!("interleaved: x={x} y={y}").into());
            }
            Ok(-(x as Cost))
        });
        let estimator = Arc::new(CostEstimator::new(&config).unwrap());

        let threads = 8;
        let calls_per_thread = 10;
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let estimator = Arc::clone(&estimator);
                std::thread::spawn(move || {
                    (0..calls_per_thread)
                        .map(|_| {
                            let v = i as i64;
                            estimate(&estimator, &[("x", v), ("y", v)]).map(|r| r.cost)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            for cost in handle.join().unwrap() {
                assert_eq!(cost.unwrap(), -(i as Cost));
            }
        }
        assert_eq!(estimator.attempts(), (threads * calls_per_thread) as u64);
    }

    #[test]
    fn report_is_latched_once() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();
        assert!(estimator.report().is_none());

        estimator
            .register_report(RegisterReportRequest {
                report: Some(report(-100.0)),
            })
            .unwrap();

        let err = estimator
            .register_report(RegisterReportRequest {
                report: Some(report(-5.0)),
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateReport));
        assert_eq!(estimator.report().unwrap().cost, -100.0);
    }

    #[test]
    fn empty_report_is_rejected() {
        let service = Service::new();
        let estimator = CostEstimator::new(&service.config()).unwrap();

        let err = estimator
            .register_report(RegisterReportRequest { report: None })
            .unwrap_err();
        assert!(matches!(err, BridgeError::EmptyReport));
        assert!(estimator.report().is_none());
    }

    #[test]
    fn concurrent_registration_latches_exactly_one() {
        let service = Service::new();
        let estimator = Arc::new(CostEstimator::new(&service.config()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let estimator = Arc::clone(&estimator);
                std::thread::spawn(move || {
                    estimator
                        .register_report(RegisterReportRequest {
                            report: Some(report(-(i as Cost))),
                        })
                        .is_ok()
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
        assert!(estimator.report().is_some());
    }
}
