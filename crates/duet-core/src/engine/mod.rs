//! Experiment controller: sequences rewrite, response generation, and
//! judging for both arms, records every result through the store, and
//! serves visibility-filtered views. Provider failures degrade the
//! owning record; they never abort the experiment or surface as errors
//! from `advance`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use uuid::Uuid;

use crate::answer::ResponseClient;
use crate::config::CoreConfig;
use crate::errors::{CoreError, Stage};
use crate::intent;
use crate::judge::JudgeClient;
use crate::model::{
    arm_blocked, pending_stage, ArmKind, Experiment, ExperimentSnapshot, ExperimentStatus,
    ExperimentTree, Rating, RewriteStatus, StageKind, StepStatus, Variant,
};
use crate::retry::RetryPolicy;
use crate::rewrite::RewriteClient;
use crate::storage::{AttemptResult, Store};
use crate::visibility::{redact_tree, ExperimentView, Role};

pub struct Controller {
    store: Store,
    rewriter: Arc<dyn RewriteClient>,
    responder: Arc<dyn ResponseClient>,
    judge: Arc<dyn JudgeClient>,
    retry: RetryPolicy,
    config: CoreConfig,
    /// One async lock per experiment so concurrent `advance` calls for
    /// the same experiment serialize; different experiments proceed
    /// independently.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Controller {
    pub fn new(
        store: Store,
        rewriter: Arc<dyn RewriteClient>,
        responder: Arc<dyn ResponseClient>,
        judge: Arc<dyn JudgeClient>,
        config: CoreConfig,
    ) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            store,
            rewriter,
            responder,
            judge,
            retry,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn lock_for(&self, experiment_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(experiment_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Create the experiment and both variant shells. Returns
    /// immediately; no external call happens here.
    pub fn submit(&self, original_prompt: &str) -> Result<String, CoreError> {
        let prompt = original_prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::validation("prompt is empty"));
        }
        if prompt.chars().count() > self.config.max_prompt_chars {
            return Err(CoreError::validation(format!(
                "prompt exceeds {} characters",
                self.config.max_prompt_chars
            )));
        }

        let route = intent::classify(prompt).route;
        let experiment = Experiment {
            id: Uuid::new_v4().to_string(),
            original_prompt: prompt.to_string(),
            route,
            status: ExperimentStatus::Pending,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.create_experiment(&experiment)?;

        for arm in [ArmKind::Baseline, ArmKind::Enhanced] {
            let variant = Variant {
                id: Uuid::new_v4().to_string(),
                experiment_id: experiment.id.clone(),
                arm,
                // The enhanced prompt starts as the original and is
                // replaced when the rewrite lands.
                prompt_text: prompt.to_string(),
                rewrite_status: match arm {
                    ArmKind::Baseline => RewriteStatus::NotApplicable,
                    ArmKind::Enhanced => RewriteStatus::Pending,
                },
            };
            self.store.create_variant(&variant)?;
            self.store
                .create_response_shell(&Uuid::new_v4().to_string(), &variant.id)?;
        }

        info!(
            experiment_id = %experiment.id,
            route = route.as_str(),
            "experiment submitted"
        );
        Ok(experiment.id)
    }

    /// Drive the next pending stage (rewrite, then responses, then
    /// verdicts). Calling with nothing pending is a no-op that returns
    /// the current snapshot.
    pub async fn advance(&self, experiment_id: &str) -> Result<ExperimentSnapshot, CoreError> {
        let lock = self.lock_for(experiment_id);
        let _guard = lock.lock().await;

        let tree = self.load_tree(experiment_id)?;
        let Some(stage) = pending_stage(&tree) else {
            return Ok(ExperimentSnapshot::from_tree(&tree));
        };

        if tree.experiment.status == ExperimentStatus::Pending {
            self.store
                .set_experiment_status(experiment_id, ExperimentStatus::InProgress)?;
        }

        match stage {
            StageKind::Rewrite => self.run_rewrite_stage(&tree).await?,
            StageKind::Respond => self.run_respond_stage(&tree).await?,
            StageKind::Judge => self.run_judge_stage(&tree).await?,
        }

        self.store.recompute_experiment_status(experiment_id)?;
        let tree = self.load_tree(experiment_id)?;
        Ok(ExperimentSnapshot::from_tree(&tree))
    }

    /// Loop `advance` until the pipeline has nothing left to do.
    pub async fn run_to_completion(
        &self,
        experiment_id: &str,
    ) -> Result<ExperimentSnapshot, CoreError> {
        loop {
            let snapshot = self.advance(experiment_id).await?;
            if snapshot.pending.is_none() {
                return Ok(snapshot);
            }
        }
    }

    async fn run_rewrite_stage(&self, tree: &ExperimentTree) -> Result<(), CoreError> {
        let enhanced = tree
            .arm(ArmKind::Enhanced)
            .ok_or_else(|| CoreError::not_found("enhanced variant"))?;
        let variant_id = enhanced.variant.id.clone();
        let original = tree.experiment.original_prompt.clone();

        let rewriter = self.rewriter.clone();
        let result = self
            .retry
            .run(Stage::Rewrite, || {
                let rewriter = rewriter.clone();
                let prompt = original.clone();
                async move { rewriter.rewrite(&prompt).await }
            })
            .await;

        match result {
            Ok(rewritten) => {
                self.store
                    .set_variant_rewrite(&variant_id, RewriteStatus::Done, Some(&rewritten))?;
            }
            Err(e) => {
                warn!(variant_id = %variant_id, error = %e, "rewrite failed terminally");
                self.store
                    .set_variant_rewrite(&variant_id, RewriteStatus::Failed, None)?;
            }
        }
        Ok(())
    }

    async fn run_respond_stage(&self, tree: &ExperimentTree) -> Result<(), CoreError> {
        for arm in &tree.arms {
            if arm_blocked(arm) {
                continue;
            }
            let Some(response) = &arm.response else {
                continue;
            };
            if response.status.is_terminal() {
                continue;
            }

            let response_id = response.id.clone();
            let prompt = arm.variant.prompt_text.clone();
            self.store.set_response_in_progress(&response_id)?;

            let responder = self.responder.clone();
            let budget = self.retry.max_attempts();
            let store = self.store.clone();
            let audit_id = response_id.clone();
            let result = self
                .retry
                .run_observed(
                    Stage::Response,
                    || {
                        let responder = responder.clone();
                        let prompt = prompt.clone();
                        async move { responder.generate(&prompt).await }
                    },
                    |attempt, message| {
                        // Persist each failed attempt as it happens so
                        // the audit trail survives a crash mid-retry.
                        let terminal = attempt >= budget;
                        if let Err(e) = store.upsert_response_attempt(
                            &audit_id,
                            AttemptResult::Failure { message, terminal },
                        ) {
                            warn!(response_id = %audit_id, error = %e, "attempt audit write failed");
                        }
                    },
                )
                .await;

            match result {
                Ok(text) => {
                    self.store.upsert_response_attempt(
                        &response_id,
                        AttemptResult::Success { text: &text },
                    )?;
                }
                Err(e) => {
                    // Terminal status was already recorded by the
                    // observer on the last failed attempt.
                    warn!(response_id = %response_id, error = %e, "generation failed terminally");
                }
            }
        }
        Ok(())
    }

    async fn run_judge_stage(&self, tree: &ExperimentTree) -> Result<(), CoreError> {
        for arm in &tree.arms {
            let Some(response) = &arm.response else {
                continue;
            };
            if response.status != StepStatus::Done || response.judge_status.is_terminal() {
                continue;
            }
            let Some(text) = response.text.clone() else {
                continue;
            };

            let response_id = response.id.clone();
            let prompt = arm.variant.prompt_text.clone();
            let judge = self.judge.clone();
            let result = self
                .retry
                .run(Stage::Judge, || {
                    let judge = judge.clone();
                    let prompt = prompt.clone();
                    let text = text.clone();
                    async move { judge.judge(&prompt, &text).await }
                })
                .await;

            match result {
                Ok(payload) => {
                    self.store.upsert_verdict(&response_id, &payload)?;
                }
                Err(e) => {
                    warn!(response_id = %response_id, error = %e, "judging failed terminally");
                    self.store.set_judge_failed(&response_id)?;
                }
            }
        }
        Ok(())
    }

    /// Ratings depend only on the response being `done`; a rating
    /// against a partially failed experiment's surviving response is
    /// accepted.
    pub fn submit_rating(
        &self,
        response_id: &str,
        rater_id: &str,
        score: i64,
        comment: Option<&str>,
    ) -> Result<String, CoreError> {
        let rater = rater_id.trim();
        if rater.is_empty() {
            return Err(CoreError::validation("rater id is empty"));
        }
        if score < self.config.rating_min || score > self.config.rating_max {
            return Err(CoreError::validation(format!(
                "score must be between {} and {}",
                self.config.rating_min, self.config.rating_max
            )));
        }

        let response = self
            .store
            .get_response(response_id)?
            .ok_or_else(|| CoreError::not_found(format!("response {response_id}")))?;
        if response.status != StepStatus::Done {
            return Err(CoreError::not_found(format!(
                "response {response_id} is not done"
            )));
        }

        let rating = Rating {
            id: Uuid::new_v4().to_string(),
            response_id: response_id.to_string(),
            rater_id: rater.to_string(),
            score,
            comment: comment.map(|c| c.to_string()),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.insert_rating(&rating)?;
        info!(response_id, rater_id = rater, score, "rating recorded");
        Ok(rating.id)
    }

    /// Assemble the tree and apply the visibility policy. Read-only;
    /// the policy is evaluated fresh on every call.
    pub fn view(&self, experiment_id: &str, role: &Role) -> Result<ExperimentView, CoreError> {
        let tree = self.load_tree(experiment_id)?;
        Ok(redact_tree(role, &tree))
    }

    pub fn snapshot(&self, experiment_id: &str) -> Result<ExperimentSnapshot, CoreError> {
        let tree = self.load_tree(experiment_id)?;
        Ok(ExperimentSnapshot::from_tree(&tree))
    }

    pub fn list(
        &self,
        status: Option<ExperimentStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Experiment>, CoreError> {
        self.store.list_experiments(status, limit, offset)
    }

    fn load_tree(&self, experiment_id: &str) -> Result<ExperimentTree, CoreError> {
        self.store
            .get_experiment_tree(experiment_id)?
            .ok_or_else(|| CoreError::not_found(format!("experiment {experiment_id}")))
    }
}
