use async_trait::async_trait;
use uuid::Uuid;

use super::{Command, CommandResult, SessionInfo};

pub struct JobCommand;

#[async_trait]
impl Command for JobCommand {
    fn name(&self) -> &str {
        "/job"
    }

    fn description(&self) -> &str {
        "show one job as JSON: /job <id>"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        let Ok(job_id) = Uuid::parse_str(args) else {
            println!("usage: /job <job id>");
            return CommandResult::Handled;
        };

        match info.queue.get_job(job_id).await {
            Some(job) => match serde_json::to_string_pretty(&job) {
                Ok(json) => println!("{json}"),
                Err(e) => println!("error: {e}"),
            },
            None => println!("job not found: {job_id}"),
        }
        CommandResult::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::test_info;

    #[tokio::test]
    async fn bad_id_is_handled() {
        assert!(matches!(
            JobCommand.execute("not-a-uuid", &test_info()).await,
            CommandResult::Handled
        ));
    }

    #[tokio::test]
    async fn unknown_id_is_handled() {
        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            JobCommand.execute(&id, &test_info()).await,
            CommandResult::Handled
        ));
    }
}
