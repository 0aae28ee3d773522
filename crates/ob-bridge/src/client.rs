//! Typed client for the bridge, as used by optimizer processes written in Rust.

use ob_types::{ParameterValue, Report};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::{
    Endpoint, EstimateCostRequest, EstimateCostResponse, RegisterReportRequest,
    RegisterReportResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("bridge transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("bridge returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct BridgeClient {
    base_url: String,
    http: reqwest::Client,
}

impl BridgeClient {
    /// `endpoint` is the `host:port` the bridge listens on.
    pub fn new(endpoint: impl AsRef<str>) -> Self {
        Self {
            base_url: format!("http://{}", endpoint.as_ref()),
            http: reqwest::Client::new(),
        }
    }

    pub async fn estimate_cost(
        &self,
        parameter_values: Vec<ParameterValue>,
    ) -> Result<EstimateCostResponse, ClientError> {
        self.call(
            Endpoint::EstimateCost,
            &EstimateCostRequest { parameter_values },
        )
        .await
    }

    pub async fn register_report(&self, report: Report) -> Result<(), ClientError> {
        let _: RegisterReportResponse = self
            .call(
                Endpoint::RegisterReport,
                &RegisterReportRequest {
                    report: Some(report),
                },
            )
            .await?;
        Ok(())
    }

    async fn call<Req, Resp>(&self, endpoint: Endpoint, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let builder = match endpoint {
            Endpoint::EstimateCost => self.http.get(&url),
            Endpoint::RegisterReport => self.http.post(&url),
        };

        let response = builder.json(request).send().await?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "bridge call");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
