use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::{ChannelId, EmojiId, GuildId, RoleId};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub guild: GuildConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub token: SecretString,
    /// Hex-encoded Ed25519 key used to verify signed interaction requests.
    pub public_key: Option<String>,
    pub api_base_url: String,
    /// Websocket URL the gateway session connects to for member joins.
    pub gateway_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuildConfig {
    pub guild_id: GuildId,
    pub name: String,
    pub welcome_emoji_id: Option<EmojiId>,
    pub server_icon_url: Option<String>,
    pub roles: RoleConfig,
    pub channels: ChannelConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoleConfig {
    pub designer: RoleId,
    pub qc_reviewer: RoleId,
    pub loa_approver: RoleId,
    pub loa: RoleId,
    pub member: RoleId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub quality_control: ChannelId,
    pub quality_control_results: ChannelId,
    pub loa_approval: ChannelId,
    pub reviews: ChannelId,
    pub order_log: ChannelId,
    pub welcome: ChannelId,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub discord_token: Option<String>,
    pub discord_public_key: Option<String>,
    pub discord_api_base_url: Option<String>,
    pub guild_id: Option<GuildId>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["switchdesk.toml", "config/switchdesk.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig {
                token: String::new().into(),
                public_key: None,
                api_base_url: "https://discord.com/api/v10".to_string(),
                gateway_url: "wss://gateway.discord.gg/?v=10&encoding=json".to_string(),
                request_timeout_secs: 10,
            },
            guild: GuildConfig {
                guild_id: GuildId(1342198087933755555),
                name: "Switch Customs".to_string(),
                welcome_emoji_id: Some(EmojiId(1342248128270569522)),
                server_icon_url: None,
                roles: RoleConfig {
                    designer: RoleId(1342201759111712799),
                    qc_reviewer: RoleId(1342201759111712799),
                    loa_approver: RoleId(1342201759111712799),
                    loa: RoleId(1342882515676827668),
                    member: RoleId(1342201876405555332),
                },
                channels: ChannelConfig {
                    quality_control: ChannelId(1342233279050416129),
                    quality_control_results: ChannelId(1342224308793114705),
                    loa_approval: ChannelId(1342883804896821270),
                    reviews: ChannelId(1342201735992840242),
                    order_log: ChannelId(1342230845032894514),
                    welcome: ChannelId(1342198088722546780),
                },
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Whether signed HTTP interactions can be verified.
    pub fn interactions_enabled(&self) -> bool {
        self.discord.public_key.is_some()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(discord) = patch.discord {
            if let Some(token_value) = discord.token {
                self.discord.token = secret_value(token_value);
            }
            if let Some(public_key) = discord.public_key {
                self.discord.public_key = Some(public_key);
            }
            if let Some(api_base_url) = discord.api_base_url {
                self.discord.api_base_url = api_base_url;
            }
            if let Some(gateway_url) = discord.gateway_url {
                self.discord.gateway_url = gateway_url;
            }
            if let Some(request_timeout_secs) = discord.request_timeout_secs {
                self.discord.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(guild) = patch.guild {
            if let Some(guild_id) = guild.guild_id {
                self.guild.guild_id = guild_id;
            }
            if let Some(name) = guild.name {
                self.guild.name = name;
            }
            if let Some(welcome_emoji_id) = guild.welcome_emoji_id {
                self.guild.welcome_emoji_id = Some(welcome_emoji_id);
            }
            if let Some(server_icon_url) = guild.server_icon_url {
                self.guild.server_icon_url = Some(server_icon_url);
            }

            if let Some(roles) = guild.roles {
                let current = &mut self.guild.roles;
                current.designer = roles.designer.unwrap_or(current.designer);
                current.qc_reviewer = roles.qc_reviewer.unwrap_or(current.qc_reviewer);
                current.loa_approver = roles.loa_approver.unwrap_or(current.loa_approver);
                current.loa = roles.loa.unwrap_or(current.loa);
                current.member = roles.member.unwrap_or(current.member);
            }

            if let Some(channels) = guild.channels {
                let current = &mut self.guild.channels;
                current.quality_control = channels.quality_control.unwrap_or(current.quality_control);
                current.quality_control_results =
                    channels.quality_control_results.unwrap_or(current.quality_control_results);
                current.loa_approval = channels.loa_approval.unwrap_or(current.loa_approval);
                current.reviews = channels.reviews.unwrap_or(current.reviews);
                current.order_log = channels.order_log.unwrap_or(current.order_log);
                current.welcome = channels.welcome.unwrap_or(current.welcome);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let token = read_env("SWITCHDESK_DISCORD_TOKEN").or_else(|| read_env("DISCORD_TOKEN"));
        if let Some(value) = token {
            self.discord.token = secret_value(value);
        }
        if let Some(value) = read_env("SWITCHDESK_DISCORD_PUBLIC_KEY") {
            self.discord.public_key = Some(value);
        }
        if let Some(value) = read_env("SWITCHDESK_DISCORD_API_BASE_URL") {
            self.discord.api_base_url = value;
        }
        if let Some(value) = read_env("SWITCHDESK_DISCORD_GATEWAY_URL") {
            self.discord.gateway_url = value;
        }
        if let Some(value) = read_env("SWITCHDESK_DISCORD_TIMEOUT_SECS") {
            self.discord.request_timeout_secs = parse_u64("SWITCHDESK_DISCORD_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHDESK_GUILD_ID") {
            self.guild.guild_id = GuildId(parse_u64("SWITCHDESK_GUILD_ID", &value)?);
        }

        if let Some(value) = read_env("SWITCHDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SWITCHDESK_SERVER_PORT") {
            self.server.port = parse_u16("SWITCHDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SWITCHDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SWITCHDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("SWITCHDESK_LOGGING_LEVEL").or_else(|| read_env("SWITCHDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SWITCHDESK_LOGGING_FORMAT").or_else(|| read_env("SWITCHDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(token) = overrides.discord_token {
            self.discord.token = secret_value(token);
        }
        if let Some(public_key) = overrides.discord_public_key {
            self.discord.public_key = Some(public_key);
        }
        if let Some(api_base_url) = overrides.discord_api_base_url {
            self.discord.api_base_url = api_base_url;
        }
        if let Some(guild_id) = overrides.guild_id {
            self.guild.guild_id = guild_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_discord(&self.discord)?;
        validate_guild(&self.guild)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    let token = discord.token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.token is required. Set DISCORD_TOKEN or SWITCHDESK_DISCORD_TOKEN (Developer Portal > Your App > Bot > Token)".to_string(),
        ));
    }
    if token.starts_with("Bot ") {
        return Err(ConfigError::Validation(
            "discord.token must be the raw bot token without the `Bot ` prefix".to_string(),
        ));
    }

    if let Some(public_key) = &discord.public_key {
        let valid = public_key.len() == 64 && public_key.bytes().all(|byte| byte.is_ascii_hexdigit());
        if !valid {
            return Err(ConfigError::Validation(
                "discord.public_key must be the 64-character hex key from Developer Portal > Your App > General Information".to_string(),
            ));
        }
    }

    if !discord.api_base_url.starts_with("http://") && !discord.api_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "discord.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if !discord.gateway_url.starts_with("ws://") && !discord.gateway_url.starts_with("wss://") {
        return Err(ConfigError::Validation(
            "discord.gateway_url must start with ws:// or wss://".to_string(),
        ));
    }

    if discord.request_timeout_secs == 0 || discord.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "discord.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_guild(guild: &GuildConfig) -> Result<(), ConfigError> {
    if guild.name.trim().is_empty() {
        return Err(ConfigError::Validation("guild.name must not be empty".to_string()));
    }

    let roles = &guild.roles;
    let channels = &guild.channels;
    let identifiers = [
        ("guild.guild_id", guild.guild_id.get()),
        ("guild.roles.designer", roles.designer.get()),
        ("guild.roles.qc_reviewer", roles.qc_reviewer.get()),
        ("guild.roles.loa_approver", roles.loa_approver.get()),
        ("guild.roles.loa", roles.loa.get()),
        ("guild.roles.member", roles.member.get()),
        ("guild.channels.quality_control", channels.quality_control.get()),
        ("guild.channels.quality_control_results", channels.quality_control_results.get()),
        ("guild.channels.loa_approval", channels.loa_approval.get()),
        ("guild.channels.reviews", channels.reviews.get()),
        ("guild.channels.order_log", channels.order_log.get()),
        ("guild.channels.welcome", channels.welcome.get()),
    ];
    if let Some((key, _)) = identifiers.iter().find(|(_, id)| *id == 0) {
        return Err(ConfigError::Validation(format!("{key} must be a non-zero snowflake id")));
    }

    if let Some(url) = &guild.server_icon_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "guild.server_icon_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    discord: Option<DiscordPatch>,
    guild: Option<GuildPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    token: Option<String>,
    public_key: Option<String>,
    api_base_url: Option<String>,
    gateway_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GuildPatch {
    guild_id: Option<GuildId>,
    name: Option<String>,
    welcome_emoji_id: Option<EmojiId>,
    server_icon_url: Option<String>,
    roles: Option<RolesPatch>,
    channels: Option<ChannelsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RolesPatch {
    designer: Option<RoleId>,
    qc_reviewer: Option<RoleId>,
    loa_approver: Option<RoleId>,
    loa: Option<RoleId>,
    member: Option<RoleId>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelsPatch {
    quality_control: Option<ChannelId>,
    quality_control_results: Option<ChannelId>,
    loa_approval: Option<ChannelId>,
    reviews: Option<ChannelId>,
    order_log: Option<ChannelId>,
    welcome: Option<ChannelId>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
