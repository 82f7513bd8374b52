//! Correction Agent
//!
//! Bounded generate → execute → verify → correct state machine. One run per
//! question; the attempt counter and log are local to the run.

use crate::agent_prompts::{PriorAttempt, PromptBuilder, RESULT_SAMPLE_ROWS};
use crate::config::AgentConfig;
use crate::error::{AstroError, Result};
use crate::execution::engine::QueryExecutor;
use crate::execution::result::QueryResult;
use crate::execution_loop::attempt_log::{Attempt, AttemptLog, ExecutionOutcome};
use crate::execution_loop::cancellation::{guarded, Cancellable, CancellationToken};
use crate::execution_loop::error_classifier::ErrorClassifier;
use crate::execution_loop::error_recovery::ErrorRecovery;
use crate::execution_loop::run_result::{RunResult, MAX_RETRIES_EXCEEDED};
use crate::explain::{Explainer, FALLBACK_EXPLANATION};
use crate::llm::Generator;
use crate::schema_rag::retriever::{RetrievedContext, SchemaRetriever};
use crate::sql_extract::SqlExtractor;
use crate::verifier::{Judge, VerificationOutcome, Verifier};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Retrieving,
    Generating,
    Executing,
    Verifying,
    Retrying,
    Succeeded,
    Exhausted,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Succeeded | AgentState::Exhausted)
    }
}

/// Per-run mutable state. Never shared between runs.
struct RunState {
    attempt: u32,
    max_attempts: u32,
    draft: Attempt,
    result: Option<QueryResult>,
    prior: Option<PriorAttempt>,
    log: AttemptLog,
}

impl RunState {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts,
            draft: Attempt::new(1),
            result: None,
            prior: None,
            log: AttemptLog::new(),
        }
    }

    fn take_draft(&mut self) -> Attempt {
        std::mem::replace(&mut self.draft, Attempt::new(self.attempt))
    }
}

fn tables_of(context: &Option<RetrievedContext>) -> Vec<&str> {
    context.as_ref().map(RetrievedContext::tables).unwrap_or_default()
}

pub struct CorrectionAgent {
    retriever: Arc<SchemaRetriever>,
    generator: Arc<dyn Generator>,
    executor: Arc<dyn QueryExecutor>,
    verifier: Verifier,
    explainer: Explainer,
    prompts: PromptBuilder,
    extractor: SqlExtractor,
    classifier: ErrorClassifier,
    recovery: ErrorRecovery,
    config: AgentConfig,
}

impl CorrectionAgent {
    pub fn new(
        retriever: Arc<SchemaRetriever>,
        generator: Arc<dyn Generator>,
        executor: Arc<dyn QueryExecutor>,
        judge: Arc<dyn Judge>,
        config: AgentConfig,
    ) -> Result<Self> {
        config.validate()?;
        let prompts = PromptBuilder::new(config.top_n_results);
        Ok(Self {
            verifier: Verifier::new(
                judge,
                config.empty_result_policy,
                config.empty_result_confidence,
            ),
            explainer: Explainer::new(Arc::clone(&generator), prompts),
            extractor: SqlExtractor::new()?,
            classifier: ErrorClassifier::new(),
            recovery: ErrorRecovery::new(),
            retriever,
            generator,
            executor,
            prompts,
            config,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run with the given bounds and no external cancellation.
    pub async fn run_query(
        &self,
        question: &str,
        top_k: usize,
        max_retries: u32,
    ) -> Result<RunResult> {
        self.run(question, top_k, max_retries, &CancellationToken::new())
            .await
    }

    /// `max_retries` bounds the number of attempts. Returns `Err` only for
    /// cancellation and for configuration problems that no retry can fix.
    /// Schema retrieval runs once; if it fails the attempt is logged and
    /// retrieval is retried on the next one.
    pub async fn run(
        &self,
        question: &str,
        top_k: usize,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        if max_retries == 0 {
            return Err(AstroError::Config(
                "max_retries must allow at least one attempt".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, top_k, max_retries, "Starting run for question: {}", question);

        let mut context: Option<RetrievedContext> = None;
        let mut run = RunState::new(max_retries);
        let mut state = AgentState::Retrieving;

        loop {
            if !state.is_terminal() && cancel.is_cancelled() {
                warn!(%run_id, attempt = run.attempt, ?state, "Run cancelled");
                return Err(AstroError::Cancelled);
            }
            debug!(%run_id, attempt = run.attempt, ?state, "Agent state");

            state = match state {
                AgentState::Retrieving => match self.retrieve(question, top_k, cancel).await {
                    Ok(retrieved) => {
                        context = Some(retrieved);
                        AgentState::Generating
                    }
                    Err(e) => {
                        // no SQL was produced, so the previous repair context still applies
                        let prior = run.prior.take();
                        let next = self.record_failure(&mut run, e, &[])?;
                        run.prior = prior;
                        next
                    }
                },
                AgentState::Generating => {
                    info!(attempt = run.attempt, max = run.max_attempts, "Generating SQL");
                    let context = context.clone().unwrap_or_default();
                    match self.generate(question, &context, &mut run, cancel).await {
                        Ok(()) => AgentState::Executing,
                        Err(e) => self.record_failure(&mut run, e, &context.tables())?,
                    }
                }
                AgentState::Executing => {
                    let sql = run.draft.sql.clone().unwrap_or_default();
                    let limit = self.config.timeouts.execution();
                    let row_limit = Some(u64::from(self.config.top_n_results));
                    let execution = self.executor.execute(&sql, row_limit);
                    match guarded(cancel, "execution", limit, execution).await {
                        Ok(result) => {
                            info!(
                                attempt = run.attempt,
                                rows = result.row_count(),
                                "Execution succeeded"
                            );
                            let outcome = ExecutionOutcome::from_result(&result);
                            run.draft = run.take_draft().with_execution(outcome);
                            run.result = Some(result);
                            AgentState::Verifying
                        }
                        Err(e) => {
                            if !e.is_fatal_for_run() {
                                let outcome = ExecutionOutcome::ExecutionError {
                                    message: e.detail(),
                                };
                                run.draft = run.take_draft().with_execution(outcome);
                            }
                            self.record_failure(&mut run, e, &tables_of(&context))?
                        }
                    }
                }
                AgentState::Verifying => {
                    let sql = run.draft.sql.clone().unwrap_or_default();
                    let result = run.result.clone().unwrap_or_default();
                    let limit = self.config.timeouts.generation();
                    let verification = self.verifier.verify(question, &sql, &result);
                    match guarded(cancel, "verification", limit, verification).await {
                        Ok(VerificationOutcome::Pass) => {
                            info!(attempt = run.attempt, "Verification passed");
                            run.draft =
                                run.take_draft().with_verification(VerificationOutcome::Pass);
                            AgentState::Succeeded
                        }
                        Ok(VerificationOutcome::Fail { reason }) => {
                            warn!(attempt = run.attempt, %reason, "Verification failed");
                            run.draft = run
                                .take_draft()
                                .with_verification(VerificationOutcome::fail(reason.clone()));
                            let error = AstroError::Verification(reason);
                            self.record_failure(&mut run, error, &tables_of(&context))?
                        }
                        Err(e) => self.record_failure(&mut run, e, &tables_of(&context))?,
                    }
                }
                AgentState::Retrying => {
                    run.attempt += 1;
                    let rationale = run.prior.as_ref().map(|p| match &p.hint {
                        Some(hint) => format!("{}\n{}", p.failure, hint),
                        None => p.failure.clone(),
                    });
                    run.draft = Attempt::new(run.attempt).with_correction_rationale(rationale);
                    run.result = None;
                    info!(
                        attempt = run.attempt,
                        max = run.max_attempts,
                        "Retrying with correction context"
                    );
                    if context.is_some() {
                        AgentState::Generating
                    } else {
                        AgentState::Retrieving
                    }
                }
                AgentState::Succeeded => {
                    return self.finish_success(run_id, question, run, cancel).await;
                }
                AgentState::Exhausted => {
                    warn!(%run_id, attempts = run.log.len(), "Max retries exceeded");
                    let last = run.log.last().and_then(|a| a.failure.clone());
                    return Ok(RunResult::Exhausted {
                        run_id,
                        question: question.to_string(),
                        reason: MAX_RETRIES_EXCEEDED.to_string(),
                        last_sql: run.log.last_with_sql().and_then(|a| a.sql.clone()),
                        last_error: last.as_ref().map(|f| f.reason.clone()),
                        last_failure_kind: last.map(|f| f.kind),
                        log: run.log,
                    });
                }
            };
        }
    }

    async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<RetrievedContext> {
        let limit = self.config.timeouts.embedding();
        let context = match self.config.min_score {
            Some(min_score) => {
                guarded(
                    cancel,
                    "embedding",
                    limit,
                    self.retriever.retrieve_with_threshold(question, top_k, min_score),
                )
                .await?
            }
            None => {
                let retrieval = self.retriever.retrieve(question, top_k);
                guarded(cancel, "embedding", limit, retrieval).await?
            }
        };
        info!(
            elements = context.len(),
            tables = ?context.tables(),
            "Retrieved schema context"
        );
        Ok(context)
    }

    /// Generate and extract the attempt's SQL into the draft.
    async fn generate(
        &self,
        question: &str,
        context: &RetrievedContext,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = self.prompts.build(question, context, run.prior.as_ref());
        let limit = self.config.timeouts.generation();
        let generation = self.generator.generate(&request);
        let response = guarded(cancel, "generation", limit, generation).await?;
        run.draft = run.take_draft().with_response(response.clone());

        let sql = self.extractor.extract(&response)?;
        let sql = self.extractor.enforce_top_n(&sql, self.config.top_n_results);
        info!(attempt = run.attempt, sql = %sql, "Generated SQL");
        run.draft = run.take_draft().with_sql(sql);
        Ok(())
    }

    /// Close the current attempt as failed and pick the next state.
    fn record_failure(
        &self,
        run: &mut RunState,
        error: AstroError,
        tables: &[&str],
    ) -> Result<AgentState> {
        if error.is_fatal_for_run() {
            return Err(error);
        }

        let kind = error.kind();
        let reason = error.detail();
        let error_class = self.classifier.classify(kind, &reason);
        warn!(attempt = run.attempt, %kind, %error_class, %reason, "Attempt failed");

        let attempt = run
            .take_draft()
            .with_failure(kind, error_class, reason.clone())
            .finished();

        let data_sample = match (&attempt.verification, &run.result) {
            (Some(VerificationOutcome::Fail { .. }), Some(result)) if !result.is_empty() => {
                Some(result.preview(RESULT_SAMPLE_ROWS))
            }
            (Some(VerificationOutcome::Fail { .. }), Some(_)) => {
                Some("The result was empty.".to_string())
            }
            _ => None,
        };
        let previous_sql = attempt
            .sql
            .clone()
            .or_else(|| attempt.response.clone())
            .unwrap_or_default();

        run.prior = Some(PriorAttempt {
            sql: previous_sql,
            failure: reason,
            hint: Some(self.recovery.build_hint(error_class, run.attempt + 1, tables)),
            data_sample,
        });
        run.log.append(attempt);

        if run.attempt < run.max_attempts {
            Ok(AgentState::Retrying)
        } else {
            Ok(AgentState::Exhausted)
        }
    }

    async fn finish_success(
        &self,
        run_id: Uuid,
        question: &str,
        mut run: RunState,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        let sql = run.draft.sql.clone().unwrap_or_default();
        let limit = self.config.timeouts.generation();
        let explaining = self.explainer.explain(question, &sql);
        let (explanation, explanation_error) =
            match guarded(cancel, "explanation", limit, explaining).await {
                Ok(text) => (text, None),
                Err(AstroError::Cancelled) => return Err(AstroError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "Explanation failed, using fallback text");
                    (FALLBACK_EXPLANATION.to_string(), Some(e.to_string()))
                }
            };

        let attempt = run
            .take_draft()
            .with_explanation(explanation.clone(), explanation_error)
            .finished();
        run.log.append(attempt);

        info!(%run_id, attempts = run.log.len(), "Run succeeded");
        Ok(RunResult::Succeeded {
            run_id,
            question: question.to_string(),
            sql,
            result: run.result.unwrap_or_default(),
            explanation,
            log: run.log,
        })
    }
}
