//! Status command handler.
//!
//! Probes every configured endpoint once. Nothing is started.

use anyhow::Result;
use futures_util::future::join_all;
use scry_core::ports::ReadinessProbe;
use scry_core::{CONTROL_SERVICE_ID, ServiceSettings, Settings, TRANSFER_SERVICE_ID};
use scry_runtime::{HttpProbe, TcpProbe};
use serde_json::json;

struct Check {
    name: &'static str,
    probe: Box<dyn ReadinessProbe>,
}

fn service_check(name: &'static str, settings: &ServiceSettings) -> Option<Check> {
    settings.enabled.then(|| Check {
        name,
        probe: Box::new(HttpProbe::new(settings.service_config().health_url()).expect_status_ok()),
    })
}

fn checks(settings: &Settings) -> Vec<Check> {
    let inference = Check {
        name: "inference",
        probe: Box::new(TcpProbe::new(
            settings.inference.socket_host.clone(),
            settings.inference.socket_port,
        )),
    };
    std::iter::once(inference)
        .chain(service_check(CONTROL_SERVICE_ID, &settings.control))
        .chain(service_check(TRANSFER_SERVICE_ID, &settings.transfer))
        .collect()
}

pub async fn execute(settings: &Settings, as_json: bool) -> Result<()> {
    let checks = checks(settings);
    let results = join_all(checks.iter().map(|c| c.probe.check())).await;

    if as_json {
        let rows: Vec<_> = checks
            .iter()
            .zip(&results)
            .map(|(check, healthy)| {
                json!({
                    "name": check.name,
                    "target": check.probe.describe(),
                    "healthy": healthy,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<12} {:<8} TARGET", "SERVICE", "STATUS");
    for (check, healthy) in checks.iter().zip(&results) {
        let status = if *healthy { "up" } else { "down" };
        println!("{:<12} {:<8} {}", check.name, status, check.probe.describe());
    }
    Ok(())
}
