use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};

/// Placeholder so `/help` shows up in the registry. Dispatch renders the
/// help text itself since it needs the full command list.
pub struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &str {
        "/help"
    }

    fn aliases(&self) -> &[&str] {
        &["/h", "/?"]
    }

    fn description(&self) -> &str {
        "show available commands"
    }

    async fn execute(&self, _args: &str, _info: &SessionInfo<'_>) -> CommandResult {
        CommandResult::Handled
    }
}
