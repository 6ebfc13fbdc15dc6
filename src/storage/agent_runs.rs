//! Agent-run reservations.
//!
//! One row per `run_id` makes agent-triggered captures idempotent: the
//! reservation insert is race-free (`ON CONFLICT DO NOTHING`), and the row
//! is later driven to exactly one terminal state.

use rusqlite::OptionalExtension;

use crate::config::now_rfc3339;
use crate::error::{Error, Result};
use crate::storage::sqlite::{AgentRun, Database};

/// Default source recorded for agent completions.
pub const AGENT_RUN_SOURCE_DEFAULT: &str = "agent_complete";

/// Status of a freshly reserved run.
pub const AGENT_RUN_STATUS_RUNNING: &str = "running";

impl Database {
    /// Reserve a run id.
    ///
    /// Returns `(true, run)` when this caller inserted the reservation (in
    /// `running` state), or `(false, existing)` when the id was already
    /// reserved; concurrent callers race on the conflict-free insert, so
    /// exactly one of them wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for blank `run_id` or `agent`,
    /// or a storage error if the insert fails.
    pub fn reserve_agent_run(&mut self, run: &AgentRun) -> Result<(bool, AgentRun)> {
        let run_id = run.run_id.trim();
        if run_id.is_empty() {
            return Err(Error::InvalidArgument("run_id cannot be empty".to_string()));
        }
        let agent = run.agent.trim();
        if agent.is_empty() {
            return Err(Error::InvalidArgument("agent cannot be empty".to_string()));
        }
        let source = if run.source.trim().is_empty() {
            AGENT_RUN_SOURCE_DEFAULT
        } else {
            run.source.trim()
        };
        let message = run.message.trim();
        let now = now_rfc3339();

        let affected = self.conn.execute(
            "INSERT INTO agent_runs (run_id, agent, message, tags, source, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(run_id) DO NOTHING",
            rusqlite::params![
                run_id,
                agent,
                message,
                run.tags,
                source,
                AGENT_RUN_STATUS_RUNNING,
                now
            ],
        )?;

        if affected == 1 {
            let created = AgentRun {
                run_id: run_id.to_string(),
                agent: agent.to_string(),
                message: message.to_string(),
                tags: run.tags.clone(),
                source: source.to_string(),
                status: AGENT_RUN_STATUS_RUNNING.to_string(),
                branch: None,
                cell_id: None,
                error: None,
                created_at: now.clone(),
                updated_at: now,
            };
            return Ok((true, created));
        }

        let existing = self
            .get_agent_run(run_id)?
            .ok_or_else(|| Error::AgentRunNotFound { run_id: run_id.to_string() })?;
        Ok((false, existing))
    }

    /// Drive a reserved run to a terminal state, recording the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for blank `run_id` or `status`,
    /// [`Error::AgentRunNotFound`] when no row matched.
    pub fn finalize_agent_run(
        &mut self,
        run_id: &str,
        status: &str,
        cell_id: Option<&str>,
        branch: Option<&str>,
        source: &str,
        error: Option<&str>,
    ) -> Result<()> {
        let run_id = run_id.trim();
        if run_id.is_empty() {
            return Err(Error::InvalidArgument("run_id cannot be empty".to_string()));
        }
        let status = status.trim();
        if status.is_empty() {
            return Err(Error::InvalidArgument("status cannot be empty".to_string()));
        }
        let source = if source.trim().is_empty() {
            AGENT_RUN_SOURCE_DEFAULT
        } else {
            source.trim()
        };

        let affected = self.conn.execute(
            "UPDATE agent_runs
             SET status = ?1, cell_id = ?2, branch = ?3, source = ?4, error = ?5, updated_at = ?6
             WHERE run_id = ?7",
            rusqlite::params![status, cell_id, branch, source, error, now_rfc3339(), run_id],
        )?;
        if affected == 0 {
            return Err(Error::AgentRunNotFound { run_id: run_id.to_string() });
        }
        Ok(())
    }

    /// Get a run by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_agent_run(&self, run_id: &str) -> Result<Option<AgentRun>> {
        let run = self
            .conn
            .query_row(
                "SELECT run_id, agent, message, tags, source, status, branch, cell_id, error,
                        created_at, updated_at
                 FROM agent_runs
                 WHERE run_id = ?1",
                [run_id],
                |row| {
                    Ok(AgentRun {
                        run_id: row.get(0)?,
                        agent: row.get(1)?,
                        message: row.get(2)?,
                        tags: row.get(3)?,
                        source: row.get(4)?,
                        status: row.get(5)?,
                        branch: row.get(6)?,
                        cell_id: row.get(7)?,
                        error: row.get(8)?,
                        created_at: row.get(9)?,
                        updated_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}
