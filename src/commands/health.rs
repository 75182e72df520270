use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};

pub struct HealthCommand;

#[async_trait]
impl Command for HealthCommand {
    fn name(&self) -> &str {
        "/health"
    }

    fn aliases(&self) -> &[&str] {
        &["/status"]
    }

    fn description(&self) -> &str {
        "show tool availability, credential rotation, and worker state"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        let pool = info.queue.executor().pool();
        let tool = if info.tool_available {
            "available"
        } else {
            "NOT FOUND"
        };
        let worker = if info.queue.is_processing() {
            "processing"
        } else {
            "idle"
        };

        println!("  tool      {} ({})", info.tool, tool);
        if pool.is_empty() {
            println!("  keys      none configured");
        } else {
            // 1-based for humans.
            println!(
                "  keys      {} (using #{}, rotation {})",
                pool.size(),
                pool.current_index() + 1,
                if pool.size() > 1 { "enabled" } else { "disabled" }
            );
        }
        println!("  worker    {worker}");
        println!("  db        {}", info.db_path);
        CommandResult::Handled
    }
}
