//! Agent-completion handling.
//!
//! A completion hook may fire more than once for the same agent
//! invocation (retries, duplicated hooks). The `run_id` reservation makes
//! the capture idempotent: exactly one caller wins the reservation and
//! drives it to a terminal state; everyone else gets `duplicate` with the
//! winner's outcome.

use crate::error::{Error, Result};
use crate::storage::{AgentRun, AGENT_RUN_SOURCE_DEFAULT};

use super::service::Service;
use super::types::{
    AgentCompletionOptions, AgentCompletionResult, AgentCompletionStatus, SnapOptions,
};

impl Service {
    /// Record an agent completion, capturing a cell when the tree changed.
    ///
    /// Validates inputs, reserves the `run_id`, then runs the conditional
    /// capture and finalizes the reservation to `created`, `no_change`, or
    /// `failed`. A second call with the same `run_id` returns `duplicate`
    /// populated from the first call's row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for blank `run_id`, `agent`, or
    /// `message`. Capture failures are reported both in the returned
    /// error and in the finalized run row.
    pub fn handle_agent_completion(
        &mut self,
        opts: &AgentCompletionOptions,
    ) -> Result<AgentCompletionResult> {
        let run_id = opts.run_id.trim().to_string();
        if run_id.is_empty() {
            return Err(Error::InvalidArgument("run-id is required".to_string()));
        }
        let agent = opts.agent.trim().to_string();
        if agent.is_empty() {
            return Err(Error::InvalidArgument("agent is required".to_string()));
        }
        let message = opts.message.trim().to_string();
        if message.is_empty() {
            return Err(Error::InvalidArgument("message is required".to_string()));
        }
        let source = if opts.source.trim().is_empty() {
            AGENT_RUN_SOURCE_DEFAULT.to_string()
        } else {
            opts.source.trim().to_string()
        };
        let tags = opts.tags.trim().to_string();

        let (reserved, existing) = self.db.reserve_agent_run(&AgentRun {
            run_id: run_id.clone(),
            agent: agent.clone(),
            message: message.clone(),
            tags: if tags.is_empty() { None } else { Some(tags.clone()) },
            source: source.clone(),
            status: String::new(),
            branch: None,
            cell_id: None,
            error: None,
            created_at: String::new(),
            updated_at: String::new(),
        })?;
        if !reserved {
            return Ok(result_from_duplicate(&existing));
        }

        let capture = self.create_cell_if_changed(&SnapOptions {
            message,
            tags,
            agent,
            source: source.clone(),
            run_eval: opts.run_eval,
        });

        let (cell, created) = match capture {
            Ok(outcome) => outcome,
            Err(create_err) => {
                let error_text = create_err.to_string();
                self.db.finalize_agent_run(
                    &run_id,
                    AgentCompletionStatus::Failed.as_str(),
                    None,
                    None,
                    &source,
                    Some(&error_text),
                )?;
                return Ok(AgentCompletionResult {
                    status: AgentCompletionStatus::Failed,
                    run_id,
                    cell_id: None,
                    branch: String::new(),
                    source,
                    error: error_text,
                });
            }
        };

        if !created {
            let branch = self.active_branch()?;
            self.db.finalize_agent_run(
                &run_id,
                AgentCompletionStatus::NoChange.as_str(),
                None,
                Some(&branch),
                &source,
                None,
            )?;
            return Ok(AgentCompletionResult {
                status: AgentCompletionStatus::NoChange,
                run_id,
                cell_id: None,
                branch,
                source,
                error: String::new(),
            });
        }

        let cell = cell.ok_or_else(|| {
            Error::Other("created cell missing from create flow".to_string())
        })?;

        self.db.finalize_agent_run(
            &run_id,
            AgentCompletionStatus::Created.as_str(),
            Some(&cell.id),
            Some(cell.branch.trim()),
            &source,
            None,
        )?;

        Ok(AgentCompletionResult {
            status: AgentCompletionStatus::Created,
            run_id,
            cell_id: Some(cell.id),
            branch: cell.branch.trim().to_string(),
            source,
            error: String::new(),
        })
    }
}

fn result_from_duplicate(run: &AgentRun) -> AgentCompletionResult {
    AgentCompletionResult {
        status: AgentCompletionStatus::Duplicate,
        run_id: run.run_id.clone(),
        cell_id: run
            .cell_id
            .as_ref()
            .filter(|id| !id.trim().is_empty())
            .cloned(),
        branch: run
            .branch
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        source: run.source.clone(),
        error: run
            .error
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
    }
}
