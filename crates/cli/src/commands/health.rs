//! Health probe: run one sync against the target and report the alerts the
//! registry derives from it. The health window lives in process memory, so a
//! CLI invocation always starts from "no data yet" and probes fresh.

use clap::Args;
use serde::Serialize;

use unibox_core::config::{AppConfig, LoadOptions};
use unibox_core::domain::interaction::TenantId;
use unibox_core::domain::metrics::SyncMetrics;
use unibox_core::health::{AlertSeverity, HealthAlert};
use unibox_sync::SyncError;

use crate::commands::{
    build_runtime, build_service, init_logging, marketplace_token, CommandResult, TargetArgs,
};

#[derive(Debug, Args)]
pub struct HealthArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Serialize)]
struct HealthOutput {
    command: &'static str,
    status: &'static str,
    probe: SyncMetrics,
    alerts: Vec<HealthAlert>,
}

pub fn run(args: HealthArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "health",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    let token = match marketplace_token("health") {
        Ok(token) => token,
        Err(result) => return *result,
    };
    let runtime = match build_runtime("health") {
        Ok(runtime) => runtime,
        Err(result) => return *result,
    };

    let tenant = TenantId(args.target.tenant.clone());
    let result = runtime.block_on(async {
        let service = build_service(&config, &args.target, token).await?;
        let probe = service.sync(&tenant, args.target.channel).await.map_err(|error| {
            match error {
                SyncError::AlreadyRunning(_) => ("already_running", error.to_string(), 6u8),
                other => ("sync_run", other.to_string(), 5u8),
            }
        })?;
        let alerts = service.alerts(&tenant, args.target.channel);
        Ok::<(SyncMetrics, Vec<HealthAlert>), (&'static str, String, u8)>((probe, alerts))
    });

    match result {
        Ok((probe, alerts)) => {
            let critical =
                alerts.iter().any(|alert| alert.severity == AlertSeverity::Critical);
            let status = if critical {
                "critical"
            } else if alerts.is_empty() {
                "ok"
            } else {
                "warning"
            };
            let exit_code = if critical { 1 } else { 0 };
            let output = HealthOutput { command: "health", status, probe, alerts };
            let rendered = serde_json::to_string_pretty(&output)
                .unwrap_or_else(|error| format!("health output serialization failed: {error}"));
            CommandResult { exit_code, output: rendered }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("health", error_class, message, exit_code)
        }
    }
}
