use clap::Args;
use serde::Serialize;

use unibox_core::config::{AppConfig, LoadOptions};
use unibox_core::domain::interaction::TenantId;
use unibox_core::domain::metrics::SyncMetrics;
use unibox_sync::SyncError;

use crate::commands::{
    build_runtime, build_service, init_logging, marketplace_token, CommandResult, TargetArgs,
};

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Serialize)]
struct SyncOutput {
    command: &'static str,
    status: &'static str,
    metrics: SyncMetrics,
}

pub fn run(args: SyncArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sync",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    let token = match marketplace_token("sync") {
        Ok(token) => token,
        Err(result) => return *result,
    };
    let runtime = match build_runtime("sync") {
        Ok(runtime) => runtime,
        Err(result) => return *result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config, &args.target, token).await?;
        service
            .sync(&TenantId(args.target.tenant.clone()), args.target.channel)
            .await
            .map_err(|error| match error {
                SyncError::AlreadyRunning(_) => ("already_running", error.to_string(), 6u8),
                other => ("sync_run", other.to_string(), 5u8),
            })
    });

    match result {
        Ok(metrics) => {
            // Aborted runs come back as Ok(metrics) with the failure folded
            // into the entry; surface that as a failing exit code.
            let failed = metrics.errors > 0;
            let output = SyncOutput {
                command: "sync",
                status: if failed { "error" } else { "ok" },
                metrics,
            };
            let rendered = serde_json::to_string_pretty(&output)
                .unwrap_or_else(|error| format!("sync output serialization failed: {error}"));
            CommandResult { exit_code: if failed { 5 } else { 0 }, output: rendered }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sync", error_class, message, exit_code)
        }
    }
}
