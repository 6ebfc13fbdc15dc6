//! `converge hook complete` - idempotent agent-completion capture.

use std::path::Path;

use crate::cli::HookCompleteArgs;
use crate::engine::{AgentCompletionOptions, AgentCompletionStatus};
use crate::error::Result;

use super::open_service;

pub fn execute_complete(project_dir: &Path, args: &HookCompleteArgs, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let result = svc.handle_agent_completion(&AgentCompletionOptions {
        run_id: args.run_id.trim().to_string(),
        agent: args.agent.trim().to_string(),
        message: args.message.trim().to_string(),
        tags: args.tags.trim().to_string(),
        source: String::new(),
        run_eval: args.eval,
    })?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
        return Ok(());
    }

    match result.status {
        AgentCompletionStatus::Created => {
            println!(
                "created run={} cell={} branch={} source={}",
                result.run_id,
                result.cell_id.as_deref().unwrap_or_default(),
                result.branch,
                result.source
            );
        }
        AgentCompletionStatus::NoChange => {
            println!(
                "no_change run={} branch={} source={}",
                result.run_id, result.branch, result.source
            );
        }
        AgentCompletionStatus::Duplicate => match result.cell_id.as_deref() {
            Some(cell_id) => println!(
                "duplicate run={} cell={cell_id} branch={} source={}",
                result.run_id, result.branch, result.source
            ),
            None => println!("duplicate run={} source={}", result.run_id, result.source),
        },
        AgentCompletionStatus::Failed => {
            println!(
                "failed run={} source={} error={}",
                result.run_id, result.source, result.error
            );
        }
    }
    Ok(())
}
