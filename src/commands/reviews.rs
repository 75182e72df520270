use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};

pub struct ReviewsCommand;

#[async_trait]
impl Command for ReviewsCommand {
    fn name(&self) -> &str {
        "/reviews"
    }

    fn description(&self) -> &str {
        "list timed-out tasks awaiting manual review"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        match info.queue.reviews().list() {
            Ok(entries) if entries.is_empty() => println!("  (nothing to review)"),
            Ok(entries) => {
                for entry in entries {
                    println!(
                        "  {}  #{}  {}  {}",
                        entry.job_id,
                        entry.index,
                        entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.reason
                    );
                }
            }
            Err(e) => println!("error: {e}"),
        }
        CommandResult::Handled
    }
}
