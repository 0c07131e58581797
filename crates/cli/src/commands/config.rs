use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use switchdesk_core::config::{AppConfig, LoadOptions, CONFIG_FILE_CANDIDATES};
use toml::Value;

use super::CommandResult;

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn entry(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Entry {
    Entry { key, value: value.to_string(), env_keys }
}

fn optional(value: Option<impl ToString>) -> String {
    value.map(|value| value.to_string()).unwrap_or_else(|| "<unset>".to_string())
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for item in entries(&config) {
        let source = field_source(
            item.key,
            item.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(item.key, &item.value, source));
    }

    CommandResult::raw(0, lines.join("\n"))
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let discord = &config.discord;
    let guild = &config.guild;
    let roles = &guild.roles;
    let channels = &guild.channels;

    vec![
        entry(
            "discord.token",
            redact_token(discord.token.expose_secret()),
            &["SWITCHDESK_DISCORD_TOKEN", "DISCORD_TOKEN"],
        ),
        entry(
            "discord.public_key",
            optional(discord.public_key.as_deref()),
            &["SWITCHDESK_DISCORD_PUBLIC_KEY"],
        ),
        entry("discord.api_base_url", &discord.api_base_url, &["SWITCHDESK_DISCORD_API_BASE_URL"]),
        entry("discord.gateway_url", &discord.gateway_url, &["SWITCHDESK_DISCORD_GATEWAY_URL"]),
        entry(
            "discord.request_timeout_secs",
            discord.request_timeout_secs,
            &["SWITCHDESK_DISCORD_TIMEOUT_SECS"],
        ),
        entry("guild.guild_id", guild.guild_id, &["SWITCHDESK_GUILD_ID"]),
        entry("guild.name", &guild.name, &[]),
        entry("guild.welcome_emoji_id", optional(guild.welcome_emoji_id), &[]),
        entry("guild.server_icon_url", optional(guild.server_icon_url.as_deref()), &[]),
        entry("guild.roles.designer", roles.designer, &[]),
        entry("guild.roles.qc_reviewer", roles.qc_reviewer, &[]),
        entry("guild.roles.loa_approver", roles.loa_approver, &[]),
        entry("guild.roles.loa", roles.loa, &[]),
        entry("guild.roles.member", roles.member, &[]),
        entry("guild.channels.quality_control", channels.quality_control, &[]),
        entry("guild.channels.quality_control_results", channels.quality_control_results, &[]),
        entry("guild.channels.loa_approval", channels.loa_approval, &[]),
        entry("guild.channels.reviews", channels.reviews, &[]),
        entry("guild.channels.order_log", channels.order_log, &[]),
        entry("guild.channels.welcome", channels.welcome, &[]),
        entry(
            "server.bind_address",
            &config.server.bind_address,
            &["SWITCHDESK_SERVER_BIND_ADDRESS"],
        ),
        entry("server.port", config.server.port, &["SWITCHDESK_SERVER_PORT"]),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            &["SWITCHDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        entry(
            "logging.level",
            &config.logging.level,
            &["SWITCHDESK_LOGGING_LEVEL", "SWITCHDESK_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["SWITCHDESK_LOGGING_FORMAT", "SWITCHDESK_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Bot tokens are `<id>.<timestamp>.<hmac>`; only the id segment is shown.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('.') {
        return format!("{prefix}.***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn tokens_are_redacted_past_the_first_segment() {
        assert_eq!(redact_token("MTIz.GhIjKl.secretpart"), "MTIz.***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc = "[guild.channels]\nwelcome = 42\n".parse::<Value>().expect("toml");
        assert!(contains_path(&doc, "guild.channels.welcome"));
        assert!(!contains_path(&doc, "guild.channels.reviews"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
