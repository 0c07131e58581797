use switchdesk_discord::commands::command_manifest;

use super::CommandResult;

/// Body for `PUT /applications/{app}/guilds/{guild}/commands`.
pub fn run() -> CommandResult {
    match serde_json::to_string_pretty(&command_manifest()) {
        Ok(body) => CommandResult::raw(0, body),
        Err(error) => CommandResult::failure(
            "commands",
            "serialization",
            format!("could not render command manifest: {error}"),
            1,
        ),
    }
}
