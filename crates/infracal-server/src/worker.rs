//! Background extraction queue. Runs the pipeline off the request path.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::state::{AppState, ExtractJob, ExtractRequest, JobStatus};
use infracal_extract::Pipeline;
use infracal_store::PageFilter;

const MAX_FINISHED_JOBS: usize = 100;

/// Start the background extraction worker task.
pub fn start_extract_worker(state: Arc<AppState>) {
    let mut rx = match state.take_extract_rx() {
        Some(rx) => rx,
        None => {
            error!("Extraction worker already started");
            return;
        }
    };

    tokio::spawn(async move {
        info!("Background extraction worker started");
        while let Some(request) = rx.recv().await {
            let job_state = state.clone();
            let joined =
                tokio::task::spawn_blocking(move || process_extract_job(&job_state, &request)).await;
            if let Err(e) = joined {
                error!("Extraction task panicked: {}", e);
            }
            cleanup_old_jobs(&state);
        }
    });
}

/// Register a queued job and hand it to the worker.
pub fn enqueue(
    state: &AppState,
    extraction_version: String,
    config_id: Option<String>,
    limit: Option<usize>,
) -> ExtractJob {
    let job = ExtractJob {
        id: uuid::Uuid::new_v4().to_string(),
        extraction_version: extraction_version.clone(),
        config_id: config_id.clone(),
        limit,
        status: JobStatus::Queued,
        pages_done: 0,
        pages_total: 0,
        report: None,
        error: None,
        queued_at: now_millis(),
        started_at: None,
        completed_at: None,
    };
    state.extract_jobs.write().insert(job.id.clone(), job.clone());

    let request = ExtractRequest {
        job_id: job.id.clone(),
        extraction_version,
        config_id,
        limit,
    };
    if state.extract_tx.send(request).is_err() {
        error!("Extraction worker is not running; job {} stays queued", job.id);
    }
    job
}

fn process_extract_job(state: &AppState, request: &ExtractRequest) {
    let job_id = request.job_id.as_str();
    state.update_job(job_id, |job| {
        job.status = JobStatus::Processing;
        job.started_at = Some(now_millis());
    });
    info!(
        "Processing extraction job {} ({})",
        job_id, request.extraction_version
    );

    let filter = PageFilter {
        config_id: request.config_id.clone(),
        limit: request.limit,
    };
    let result = Pipeline::new(&state.store).run_with_progress(
        &filter,
        &request.extraction_version,
        |done, total| {
            state.update_job(job_id, |job| {
                job.pages_done = done;
                job.pages_total = total;
            })
        },
    );

    match result {
        Ok(report) => {
            info!(
                "Extraction job {} done: {} page(s), {} inserted, {} superseded",
                job_id, report.pages, report.inserted, report.superseded
            );
            state.update_job(job_id, |job| {
                job.status = JobStatus::Completed;
                job.pages_total = report.pages + report.failed_pages;
                job.report = Some(report);
                job.completed_at = Some(now_millis());
            });
        }
        Err(e) => {
            error!("Extraction job {} failed: {}", job_id, e);
            state.update_job(job_id, |job| {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                job.completed_at = Some(now_millis());
            });
        }
    }
}

fn cleanup_old_jobs(state: &AppState) {
    let mut jobs = state.extract_jobs.write();
    let mut finished: Vec<(String, i64)> = jobs
        .iter()
        .filter(|(_, j)| matches!(j.status, JobStatus::Completed | JobStatus::Failed))
        .filter_map(|(id, j)| j.completed_at.map(|t| (id.clone(), t)))
        .collect();

    if finished.len() > MAX_FINISHED_JOBS {
        finished.sort_by_key(|(_, t)| *t);
        let remove_count = finished.len() - MAX_FINISHED_JOBS;
        for (id, _) in finished.into_iter().take(remove_count) {
            jobs.remove(&id);
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
