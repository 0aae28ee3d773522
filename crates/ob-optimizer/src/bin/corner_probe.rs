//! Minimal optimizer peer: evaluates the corners of the parameter box over
//! the bridge and registers the best valid one.
//!
//! Usage: `ob-corner-probe <root_dir>`

use anyhow::{bail, Context};
use ob_bridge::BridgeClient;
use ob_optimizer::{ParameterSpec, SubprocessSettings};
use ob_types::{Cost, ParameterValue, Report};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// `index`-th corner: bit `j` picks the upper bound of parameter `j`.
fn corner(parameters: &[ParameterSpec], index: u64) -> Vec<ParameterValue> {
    parameters
        .iter()
        .enumerate()
        .map(|(j, p)| {
            let upper = j < 64 && index & (1u64 << j) != 0;
            let value = if upper { p.bound.right } else { p.bound.left };
            ParameterValue::new(p.name.clone(), value)
        })
        .collect()
}

fn corner_count(parameters: &[ParameterSpec], budget: u32) -> u64 {
    let total = 1u64.checked_shl(parameters.len() as u32).unwrap_or(u64::MAX);
    total.min(budget as u64)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let root_dir: PathBuf = std::env::args_os()
        .nth(1)
        .context("usage: ob-corner-probe <root_dir>")?
        .into();
    let settings = SubprocessSettings::load(&root_dir)?;
    let optimizer = &settings.optimizer;
    info!(endpoint = %settings.endpoint, parameters = optimizer.parameters.len(), "probe started");

    let client = BridgeClient::new(&settings.endpoint);
    let mut best: Option<(Cost, Vec<ParameterValue>)> = None;
    let mut evaluations = 0u64;

    for index in 0..corner_count(&optimizer.parameters, optimizer.max_evaluations) {
        let point = corner(&optimizer.parameters, index);
        let response = client
            .estimate_cost(point.clone())
            .await
            .with_context(|| format!("estimate cost at corner {index}"))?;
        evaluations += 1;

        if response.invalid_parameter_combination {
            continue;
        }
        if best.as_ref().map_or(true, |(cost, _)| response.cost < *cost) {
            best = Some((response.cost, point));
        }
    }

    let Some((cost, optimum)) = best else {
        warn!(evaluations, "every corner was an invalid combination");
        bail!("no valid corner among {evaluations} evaluated");
    };

    println!("best corner cost={cost} after {evaluations} evaluations");
    client
        .register_report(Report {
            cost,
            optimum,
            iterations: 1,
            evaluations,
            fast_evaluations: 0,
        })
        .await
        .context("register report")?;
    Ok(())
}
