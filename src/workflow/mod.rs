//! Workflow orchestration: the durable step sequence for one job.
//!
//! `Orchestrator::run` drives a fixed, ordered list of named steps, each
//! checkpointed through the step runner before the next one starts. A
//! re-run resumes at the first un-checkpointed step. Every step reports
//! progress to the status hub, and every step's output is archived as a
//! named artifact.

pub mod step;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::docint::{self, DocintBackend, NormalizedDocument};
use crate::error::PipelineError;
use crate::hitl::{AnswerHub, ColumnDecision};
use crate::llm::{GenerationClient, LlmSelection};
use crate::models::{
    DocumentPattern, GlobalAnalysis, JobMode, JobOutcome, JobRecord, JobState, Node, PendingInput,
    Region, StatusLevel, ValidationReport,
};
use crate::pipeline::escalate::{escalate_and_judge, merge_patches, EscalationRequest};
use crate::pipeline::verify::VerifyOutput;
use crate::pipeline::{self, CandidateSpec};
use crate::settings::Settings;
use crate::status::{StatusHub, StatusPatch};
use crate::storage::{ArtifactWriter, CacheStore, JobStore, NodeStore, ObjectStore};

pub use step::StepRunner;

/// Per-run configuration resolved once and checkpointed, so a resumed run
/// keeps the model choices it started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunPlan {
    analysis: LlmSelection,
    extract: LlmSelection,
    verify: LlmSelection,
    judge: LlmSelection,
    summary: LlmSelection,
    candidates: Vec<CandidateSpec>,
    cache_key: String,
    cache_enabled: bool,
}

impl RunPlan {
    fn resolve(settings: &Settings, job: &JobRecord) -> Self {
        Self {
            analysis: settings.models.analysis.clone(),
            extract: settings.models.extract.clone(),
            verify: settings.models.verify.clone(),
            judge: settings.models.judge.clone(),
            summary: settings.models.summary.clone(),
            candidates: settings.escalation_candidates.clone(),
            cache_key: docint::cache_key(
                &job.file_hash_sha256,
                &settings.docint.model,
                &settings.docint.backend_version,
            ),
            cache_enabled: settings.docint.cache_enabled && !job.skip_cache(),
        }
    }
}

/// Document-understanding result, tagged with whether it came from cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocintFetch {
    cached: bool,
    raw: serde_json::Value,
}

/// An upload entering the system.
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub mode: JobMode,
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Sequences the pipeline and owns the job record and node set for the
/// duration of a run. No two concurrent runs for the same job id.
pub struct Orchestrator {
    settings: Settings,
    generation: Arc<dyn GenerationClient>,
    docint: Arc<dyn DocintBackend>,
    objects: Arc<dyn ObjectStore>,
    cache: Arc<dyn CacheStore>,
    jobs: Arc<dyn JobStore>,
    nodes: Arc<dyn NodeStore>,
    status: Arc<StatusHub>,
    answers: Arc<AnswerHub>,
}

#[allow(clippy::too_many_arguments)]
impl Orchestrator {
    pub fn new(
        settings: Settings,
        generation: Arc<dyn GenerationClient>,
        docint: Arc<dyn DocintBackend>,
        objects: Arc<dyn ObjectStore>,
        cache: Arc<dyn CacheStore>,
        jobs: Arc<dyn JobStore>,
        nodes: Arc<dyn NodeStore>,
        status: Arc<StatusHub>,
        answers: Arc<AnswerHub>,
    ) -> Self {
        Self {
            settings,
            generation,
            docint,
            objects,
            cache,
            jobs,
            nodes,
            status,
            answers,
        }
    }

    pub fn answers(&self) -> &Arc<AnswerHub> {
        &self.answers
    }

    pub fn status(&self) -> &Arc<StatusHub> {
        &self.status
    }

    /// Accept an upload: hash it, store the bytes, create the job record,
    /// and initialize its status. The caller decides when to `run`.
    pub async fn ingest(&self, upload: UploadRequest) -> Result<JobRecord, PipelineError> {
        let job_id = format!("job_{}", Uuid::new_v4().simple());
        let file_hash = format!("{:x}", Sha256::digest(&upload.bytes));
        let upload_key = format!("uploads/{job_id}/{}", upload.filename);
        let now = Utc::now().to_rfc3339();

        let size_bytes = upload.bytes.len() as u64;
        self.objects
            .put(&upload_key, upload.bytes, &upload.content_type)
            .await?;

        let record = JobRecord {
            job_id: job_id.clone(),
            mode: upload.mode,
            state: JobState::Queued,
            filename: upload.filename,
            content_type: upload.content_type,
            size_bytes,
            file_hash_sha256: file_hash,
            upload_key,
            artifacts_prefix: format!("artifacts/{job_id}"),
            created_at: now.clone(),
            updated_at: now,
            node_count: None,
            inferred_count: None,
            coverage_ratio: None,
            error: None,
            options: upload.options,
        };

        self.jobs.create(&record).await?;
        self.status.init(&job_id).await?;
        tracing::info!(job_id = %job_id, mode = %record.mode, "job ingested");
        Ok(record)
    }

    /// Execute the full step sequence for a job.
    ///
    /// On any failure the run performs its bookkeeping (error entry in the
    /// status log, job flipped to `failed`) best-effort and then surfaces
    /// the original error; bookkeeping trouble never masks it.
    pub async fn run(&self, job_id: &str) -> Result<(), PipelineError> {
        match self.run_inner(job_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "run failed");

                let detail = json!({ "error": err.to_string() });
                if let Err(e) = self
                    .status
                    .append(job_id, StatusLevel::Error, "Job failed", Some(detail))
                    .await
                {
                    tracing::warn!(job_id = %job_id, error = %e, "failed to append error status");
                }
                if let Err(e) = self
                    .status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .state(JobState::Failed)
                            .step("failed")
                            .percent(100)
                            .message("Failed")
                            .clear_pending_input(),
                    )
                    .await
                {
                    tracing::warn!(job_id = %job_id, error = %e, "failed to set failed status");
                }
                if let Err(e) = self.jobs.mark_failed(job_id, &err.to_string()).await {
                    tracing::warn!(job_id = %job_id, error = %e, "failed to mark job failed");
                }

                Err(err)
            }
        }
    }

    async fn run_inner(&self, job_id: &str) -> Result<(), PipelineError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        let artifacts = ArtifactWriter::new(self.objects.clone(), job_id);
        let steps = StepRunner::new(self.objects.clone(), job_id, self.settings.retry.clone());

        steps
            .run("mark-running", || async {
                self.jobs.mark_running(job_id).await?;
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .state(JobState::Running)
                            .step("start")
                            .percent(2)
                            .message("Workflow started"),
                    )
                    .await?;
                Ok(())
            })
            .await?;

        let plan: RunPlan = steps
            .run("resolve-config", || async {
                Ok(RunPlan::resolve(&self.settings, &job))
            })
            .await?;

        // Document understanding, cache-aware. The cache is advisory: on a
        // hit the backend call is skipped entirely, on a miss the result is
        // archived and the cache populated for next time.
        steps
            .run("docint-status-update", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("docint")
                            .percent(8)
                            .message("Checking document-understanding cache"),
                    )
                    .await?;
                Ok(())
            })
            .await?;

        let fetch: DocintFetch = steps
            .run("docint-fetch", || async {
                if plan.cache_enabled {
                    if let Some(text) = self.cache.get(&plan.cache_key).await? {
                        if let Ok(raw) = serde_json::from_str(&text) {
                            tracing::info!(job_id = %job_id, cache_key = %plan.cache_key, "docint cache hit");
                            return Ok(DocintFetch { cached: true, raw });
                        }
                    }
                }

                self.status
                    .append(job_id, StatusLevel::Info, "Cache miss; fetching upload", None)
                    .await?;
                let bytes = self
                    .objects
                    .get(&job.upload_key)
                    .await?
                    .ok_or_else(|| PipelineError::MissingUpload(job.upload_key.clone()))?;

                self.status
                    .append(
                        job_id,
                        StatusLevel::Info,
                        "Calling document-understanding backend",
                        None,
                    )
                    .await?;
                let raw = self.docint.analyze(bytes, &job.filename).await?;
                Ok(DocintFetch { cached: false, raw })
            })
            .await?;

        steps
            .run("store-raw-artifact", || async {
                if fetch.cached {
                    artifacts.put_json("di_cached.json", &fetch.raw).await?;
                } else {
                    artifacts.put_json("di_raw.json", &fetch.raw).await?;
                    if plan.cache_enabled {
                        self.cache
                            .put(
                                &plan.cache_key,
                                serde_json::to_string(&fetch.raw)?,
                                self.settings.docint.cache_ttl,
                            )
                            .await?;
                    }
                }
                Ok(())
            })
            .await?;

        let (doc, regions): (NormalizedDocument, Vec<Region>) = steps
            .run("normalize-segment", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("segment")
                            .percent(20)
                            .message("Normalizing and segmenting document"),
                    )
                    .await?;
                let doc = docint::normalize(&fetch.raw);
                let regions = docint::segment(&doc);
                artifacts.put_json("di_normalized.json", &doc).await?;
                artifacts.put_json("regions.json", &regions).await?;
                Ok((doc, regions))
            })
            .await?;

        let analysis: GlobalAnalysis = steps
            .run("global-analysis", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("global_analysis")
                            .percent(25)
                            .message("Analyzing document structure"),
                    )
                    .await?;

                let outcome = pipeline::analyze_document(
                    self.generation.as_ref(),
                    &plan.analysis,
                    &doc,
                    &regions,
                    job.user_context(),
                )
                .await?;

                artifacts
                    .put_text("global_analysis_system_prompt.txt", &outcome.system_prompt)
                    .await?;
                artifacts
                    .put_text("global_analysis_user_prompt.txt", &outcome.user_prompt)
                    .await?;
                artifacts
                    .put_json(
                        "global_analysis_output.json",
                        &json!({ "analysis": &outcome.analysis, "rawText": &outcome.raw_text }),
                    )
                    .await?;
                Ok(outcome.analysis)
            })
            .await?;

        let column_decision: Option<ColumnDecision> = steps
            .run("column-gate", || self.column_gate(job_id, &analysis))
            .await?;

        // Region extraction, in fixed-size batches. Batches run in
        // sequence; regions within a batch extract concurrently.
        steps
            .run("extract-status-update", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("extract_regions")
                            .percent(30)
                            .message(format!("Extracting {} regions", regions.len())),
                    )
                    .await?;
                Ok(())
            })
            .await?;

        let mut extracted: Vec<Node> = Vec::new();
        for (batch_index, batch) in regions.chunks(self.settings.batch_size).enumerate() {
            let batch_start = batch_index * self.settings.batch_size;
            let step_name = format!("extract-batch-{batch_index}");

            let batch_nodes: Vec<Node> = steps
                .run(&step_name, || {
                    self.extract_batch(
                        job_id,
                        &job,
                        &plan,
                        &artifacts,
                        batch,
                        batch_start,
                        regions.len(),
                        &analysis,
                        column_decision.as_ref(),
                    )
                })
                .await?;
            extracted.extend(batch_nodes);
        }

        let report: ValidationReport = steps
            .run("validate", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("validate")
                            .percent(60)
                            .message("Validating and generating QC report"),
                    )
                    .await?;
                let report = pipeline::validate_nodes(&extracted, &regions);
                artifacts.put_json("validation_report.json", &report).await?;
                Ok(report)
            })
            .await?;

        let draft: Vec<Node> = steps
            .run("consolidate", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("consolidate")
                            .percent(65)
                            .message("Consolidating nodes"),
                    )
                    .await?;
                let draft = pipeline::consolidate(&extracted);
                artifacts.put_json("document_draft.json", &draft).await?;
                Ok(draft)
            })
            .await?;

        let verify_out: VerifyOutput = steps
            .run("verify", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("verify")
                            .percent(75)
                            .message("Verifying document"),
                    )
                    .await?;

                let outcome = pipeline::verify_document(
                    self.generation.as_ref(),
                    &plan.verify,
                    job.mode,
                    &draft,
                    &report,
                    &regions,
                )
                .await?;

                artifacts
                    .put_text("verify_system_prompt.txt", &outcome.system_prompt)
                    .await?;
                artifacts
                    .put_text("verify_user_prompt.txt", &outcome.user_prompt)
                    .await?;
                artifacts
                    .put_json(
                        "verifier_output.json",
                        &json!({ "verifyOut": &outcome.output, "verifyRaw": &outcome.raw_text }),
                    )
                    .await?;
                Ok(outcome.output)
            })
            .await?;

        let final_nodes: Vec<Node> = if verify_out.escalation_plan.needed {
            steps
                .run("escalate", || async {
                    self.status
                        .set(
                            job_id,
                            StatusPatch::new()
                                .step("escalate")
                                .percent(82)
                                .message("Escalation required; re-extracting targeted regions"),
                        )
                        .await?;

                    let targets = &verify_out.escalation_plan.target_region_ids;
                    tracing::warn!(
                        job_id = %job_id,
                        targets = ?targets,
                        reason = %verify_out.escalation_plan.reason,
                        "escalation needed"
                    );

                    let patches = escalate_and_judge(
                        self.generation.as_ref(),
                        &EscalationRequest {
                            mode: job.mode,
                            target_region_ids: targets,
                            regions: &regions,
                            candidates: &plan.candidates,
                            judge: &plan.judge,
                        },
                    )
                    .await?;

                    for (region_id, patch) in &patches {
                        artifacts
                            .put_json(
                                &format!("escalations/{region_id}/selected_patch.json"),
                                patch,
                            )
                            .await?;
                    }

                    Ok(merge_patches(
                        &verify_out.corrected_nodes,
                        targets,
                        &patches,
                    ))
                })
                .await?
        } else {
            verify_out.corrected_nodes.clone()
        };

        steps
            .run("store-final", || async {
                artifacts.put_json("document_final.json", &final_nodes).await?;
                Ok(())
            })
            .await?;

        steps
            .run("persist-nodes", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("persist")
                            .percent(92)
                            .message("Persisting nodes"),
                    )
                    .await?;
                self.nodes.replace_for_job(job_id, &final_nodes).await?;
                Ok(())
            })
            .await?;

        steps
            .run("generate-summary", || async {
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .step("summary")
                            .percent(96)
                            .message("Generating summary"),
                    )
                    .await?;

                let (summary, raw_text) = pipeline::generate_summary(
                    self.generation.as_ref(),
                    &plan.summary,
                    job.mode,
                    &final_nodes,
                    &report,
                    &verify_out.issues,
                )
                .await?;

                artifacts
                    .put_json(
                        "summary.json",
                        &json!({ "summary": summary, "summaryRaw": raw_text }),
                    )
                    .await?;
                Ok(())
            })
            .await?;

        steps
            .run("mark-completed", || async {
                let inferred_count = final_nodes.iter().filter(|n| n.inferred).count() as u32;
                self.jobs
                    .mark_completed(
                        job_id,
                        &JobOutcome {
                            node_count: final_nodes.len() as u32,
                            inferred_count,
                            coverage_ratio: report.coverage.coverage_ratio,
                        },
                    )
                    .await?;
                self.status
                    .set(
                        job_id,
                        StatusPatch::new()
                            .state(JobState::Completed)
                            .step("done")
                            .percent(100)
                            .message("Completed"),
                    )
                    .await?;
                tracing::info!(
                    job_id = %job_id,
                    nodes = final_nodes.len(),
                    inferred = inferred_count,
                    "workflow completed"
                );
                Ok(())
            })
            .await?;

        Ok(())
    }

    /// The column-decision gate.
    ///
    /// Triggers only for matrix-like documents with detected column
    /// headers. The job moves to `awaiting_input` and the run suspends on
    /// the answer channel; a missed timeout is fatal since a human answer
    /// cannot be synthesized.
    async fn column_gate(
        &self,
        job_id: &str,
        analysis: &GlobalAnalysis,
    ) -> Result<Option<ColumnDecision>, PipelineError> {
        let headers = analysis
            .structural_elements
            .column_headers
            .clone()
            .unwrap_or_default();
        let is_matrix = analysis.document_pattern == DocumentPattern::Matrix
            || analysis.structural_elements.has_phase_columns;

        if !is_matrix || headers.is_empty() {
            tracing::debug!(job_id = %job_id, "column gate skipped");
            return Ok(None);
        }

        let question_id = format!("column-decision-{}", Uuid::new_v4().simple());
        tracing::info!(job_id = %job_id, headers = ?headers, "awaiting column decision");

        // Register the wait before announcing the question, so an answer
        // submitted the instant the status lands has a receiver.
        let receiver = self.answers.ask(job_id, &question_id);

        self.status
            .set(
                job_id,
                StatusPatch::new()
                    .state(JobState::AwaitingInput)
                    .step("column_decision")
                    .percent(28)
                    .message("Waiting for user decision on column headers")
                    .pending_input(PendingInput {
                        question_id: question_id.clone(),
                        kind: "column_decision".to_string(),
                        column_headers: headers.clone(),
                        document_pattern: analysis.document_pattern,
                        prompt: format!(
                            "This document appears to be a matrix layout with the following \
                             column headers: {}. Should these columns be treated as breakdown \
                             nodes (tasks or phases) or only as informational organization?",
                            headers.join(", ")
                        ),
                    }),
            )
            .await?;

        let answer = tokio::time::timeout(self.settings.answer_timeout, receiver)
            .await
            .map_err(|_| PipelineError::AnswerTimeout {
                question_id: question_id.clone(),
            })?
            .map_err(|_| PipelineError::AnswerTimeout {
                question_id: question_id.clone(),
            })?;

        let decision: ColumnDecision = serde_json::from_value(answer)?;
        tracing::info!(job_id = %job_id, treat_as_nodes = decision.treat_as_nodes, "column decision received");

        self.status
            .set(
                job_id,
                StatusPatch::new()
                    .state(JobState::Running)
                    .step("extract_regions")
                    .percent(30)
                    .message(if decision.treat_as_nodes {
                        "Column decision: treat as breakdown nodes"
                    } else {
                        "Column decision: treat as informational only"
                    })
                    .clear_pending_input(),
            )
            .await?;

        Ok(Some(decision))
    }

    /// Extract one batch of regions concurrently.
    #[allow(clippy::too_many_arguments)]
    async fn extract_batch(
        &self,
        job_id: &str,
        job: &JobRecord,
        plan: &RunPlan,
        artifacts: &ArtifactWriter,
        batch: &[Region],
        batch_start: usize,
        total_regions: usize,
        analysis: &GlobalAnalysis,
        column_decision: Option<&ColumnDecision>,
    ) -> Result<Vec<Node>, PipelineError> {
        let done = batch_start + batch.len();
        self.status
            .set(
                job_id,
                StatusPatch::new()
                    .step("extract_regions")
                    .percent((30 + 25 * done / total_regions.max(1)) as u8)
                    .message(format!(
                        "Extracting regions {}-{} of {}",
                        batch_start + 1,
                        done,
                        total_regions
                    )),
            )
            .await?;

        let results = try_join_all(batch.iter().map(|region| async move {
            let guidance = analysis.guidance_for(&region.region_id);
            tracing::info!(
                job_id = %job_id,
                region_id = %region.region_id,
                token_estimate = region.token_estimate,
                has_guidance = guidance.is_some(),
                "extracting region"
            );

            let outcome = pipeline::extract_region(
                self.generation.as_ref(),
                &plan.extract,
                job.mode,
                region,
                guidance,
                column_decision,
            )
            .await?;

            artifacts
                .put_json(
                    &format!("extractions/region_{}.json", region.region_id),
                    &json!({
                        "llm": &plan.extract,
                        "extraction": &outcome.extraction,
                        "rawText": &outcome.raw_text,
                        "contextUsed": guidance,
                    }),
                )
                .await?;

            tracing::info!(
                job_id = %job_id,
                region_id = %region.region_id,
                nodes = outcome.extraction.nodes.len(),
                confidence = outcome.extraction.confidence,
                "region extracted"
            );
            Ok::<Vec<Node>, PipelineError>(outcome.extraction.nodes)
        }))
        .await?;

        Ok(results.into_iter().flatten().collect())
    }
}
