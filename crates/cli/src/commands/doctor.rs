use std::sync::Arc;

use serde::Serialize;
use switchdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use switchdesk_discord::platform::{Platform, PlatformError};
use switchdesk_discord::rest::RestPlatform;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self::new(name, CheckStatus::Skipped, format!("skipped because {reason}"))
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const CONFIG_VALIDATION: &str = "config_validation";
const INTERACTIONS_KEY: &str = "interactions_public_key";
const DISCORD_REACHABILITY: &str = "discord_api_reachability";
const GUILD_RESOURCES: &str = "guild_resources";

pub fn run(json_output: bool) -> CommandResult {
    let config = AppConfig::load(LoadOptions::default());
    let platform = config.as_ref().ok().map(|config| {
        RestPlatform::new(&config.discord).map(|rest| Arc::new(rest) as Arc<dyn Platform>)
    });

    let report = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(build_report(config, platform)),
        Err(error) => DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: could not start async runtime".to_string(),
            checks: vec![DoctorCheck::new(
                DISCORD_REACHABILITY,
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            )],
        },
    };
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::raw(exit_code, output);
    }

    CommandResult::raw(exit_code, render_human(&report))
}

async fn build_report(
    config: Result<AppConfig, ConfigError>,
    platform: Option<Result<Arc<dyn Platform>, PlatformError>>,
) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                CONFIG_VALIDATION,
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_interactions_key(&config));
            match platform {
                Some(Ok(platform)) => {
                    let reachable = check_reachability(platform.as_ref()).await;
                    let api_up = reachable.status == CheckStatus::Pass;
                    checks.push(reachable);
                    if api_up {
                        checks.push(check_guild_resources(&config, platform.as_ref()).await);
                    } else {
                        checks.push(DoctorCheck::skipped(GUILD_RESOURCES, "discord is unreachable"));
                    }
                }
                Some(Err(error)) => {
                    checks.push(DoctorCheck::new(
                        DISCORD_REACHABILITY,
                        CheckStatus::Fail,
                        format!("could not build discord client: {error}"),
                    ));
                    checks.push(DoctorCheck::skipped(GUILD_RESOURCES, "discord is unreachable"));
                }
                None => {
                    checks.push(DoctorCheck::skipped(DISCORD_REACHABILITY, "no client was built"));
                    checks.push(DoctorCheck::skipped(GUILD_RESOURCES, "no client was built"));
                }
            }
        }
        Err(error) => {
            let reason = "configuration did not load";
            checks.push(DoctorCheck::new(CONFIG_VALIDATION, CheckStatus::Fail, error.to_string()));
            checks.push(DoctorCheck::skipped(INTERACTIONS_KEY, reason));
            checks.push(DoctorCheck::skipped(DISCORD_REACHABILITY, reason));
            checks.push(DoctorCheck::skipped(GUILD_RESOURCES, reason));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let config_loaded = checks.first().is_some_and(|check| check.status == CheckStatus::Pass);
    let healthy = config_loaded && !failed;
    let overall_status = if healthy { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if healthy {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_interactions_key(config: &AppConfig) -> DoctorCheck {
    match &config.discord.public_key {
        Some(_) => DoctorCheck::new(
            INTERACTIONS_KEY,
            CheckStatus::Pass,
            "public key present; POST /interactions will verify signatures",
        ),
        None => DoctorCheck::skipped(
            INTERACTIONS_KEY,
            "discord.public_key is unset and /interactions is disabled",
        ),
    }
}

async fn check_reachability(platform: &dyn Platform) -> DoctorCheck {
    match platform.latency().await {
        Ok(latency) => DoctorCheck::new(
            DISCORD_REACHABILITY,
            CheckStatus::Pass,
            format!("GET /gateway answered in {}ms", latency.as_millis()),
        ),
        Err(error) => DoctorCheck::new(
            DISCORD_REACHABILITY,
            CheckStatus::Fail,
            format!("discord api unreachable: {error}"),
        ),
    }
}

/// Every configured channel and role must resolve for the workflows to post.
async fn check_guild_resources(config: &AppConfig, platform: &dyn Platform) -> DoctorCheck {
    let guild = &config.guild;
    let channels = [
        ("quality_control", guild.channels.quality_control),
        ("quality_control_results", guild.channels.quality_control_results),
        ("loa_approval", guild.channels.loa_approval),
        ("reviews", guild.channels.reviews),
        ("order_log", guild.channels.order_log),
        ("welcome", guild.channels.welcome),
    ];
    let roles = [("loa", guild.roles.loa), ("member", guild.roles.member)];

    let mut problems = Vec::new();
    for (name, channel_id) in channels {
        match platform.resolve_channel(channel_id).await {
            Ok(Some(_)) => {}
            Ok(None) => problems.push(format!("channel {name} ({channel_id}) not found")),
            Err(error) => problems.push(format!("channel {name} ({channel_id}): {error}")),
        }
    }
    for (name, role_id) in roles {
        match platform.resolve_role(guild.guild_id, role_id).await {
            Ok(Some(_)) => {}
            Ok(None) => problems.push(format!("role {name} ({role_id}) not found")),
            Err(error) => problems.push(format!("role {name} ({role_id}): {error}")),
        }
    }

    if problems.is_empty() {
        DoctorCheck::new(
            GUILD_RESOURCES,
            CheckStatus::Pass,
            format!("{} channels and {} roles resolved", channels.len(), roles.len()),
        )
    } else {
        DoctorCheck::new(GUILD_RESOURCES, CheckStatus::Fail, problems.join("; "))
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
