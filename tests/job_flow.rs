use pretty_assertions::assert_eq;
use reposcribe::api::SubmitRequest;
use reposcribe::jobs::JobStatus;
use reposcribe::test_utils::ScriptedGenerator;
use reposcribe::{AnalyzerError, ApiError, OutputType};

mod common;
use common::{setup_test_logger, HarnessBuilder, SAMPLE_URL};

fn submission(output_type: OutputType, key: Option<&str>) -> SubmitRequest {
    SubmitRequest {
        repo_url: SAMPLE_URL.to_string(),
        output_type,
        api_key: key.map(str::to_string),
        generate_pdf: false,
    }
}

#[tokio::test]
async fn test_analysis_job_writes_report() {
    setup_test_logger();
    let harness = HarnessBuilder::new(ScriptedGenerator::always("## Introduction\nA small sample.\n\n## Dependencies\n- none"))
        .api_key("server-key")
        .build();

    let handle = harness.manager.submit(submission(OutputType::Analysis, None)).unwrap();
    let id = handle.id.clone();
    assert_eq!(handle.wait().await.unwrap(), JobStatus::Completed);

    let job = harness.manager.get(&id).unwrap();
    assert_eq!(job.progress, "Completed");
    assert!(job.warnings.is_empty());
    assert!(job.finished_at.is_some());
    assert_eq!(harness.factory.keys(), vec!["server-key".to_string()]);

    let path = job.report_path.unwrap();
    assert!(path.starts_with(harness.output.path()));
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.starts_with("# sample: Analysis Report"));
    assert!(text.contains("## Introduction"));
    assert!(text.contains("## Dependencies"));
}

#[tokio::test]
async fn test_failed_part_still_completes_with_note() {
    let generator = ScriptedGenerator::new(vec![Err(ApiError::ContentFiltered("SAFETY".into()))]);
    let harness = HarnessBuilder::new(generator).max_chunk_chars(80).build();

    let handle = harness
        .manager
        .submit(submission(OutputType::Analysis, Some("form-key")))
        .unwrap();
    let id = handle.id.clone();
    assert_eq!(handle.wait().await.unwrap(), JobStatus::Completed);

    let job = harness.manager.get(&id).unwrap();
    assert_eq!(job.warnings.len(), 1);
    assert!(job.warnings[0].contains("part 1 of"));

    let text = std::fs::read_to_string(job.report_path.unwrap()).unwrap();
    assert!(text.contains("Section unavailable"));
    assert!(text.contains("content filtered: SAFETY"));
}

#[tokio::test]
async fn test_rejected_key_fails_job() {
    let generator = ScriptedGenerator::new(vec![Err(ApiError::AuthFailed("API key not valid".into()))]);
    let harness = HarnessBuilder::new(generator).build();

    let handle = harness.manager.submit(submission(OutputType::Readme, Some("bad"))).unwrap();
    let id = handle.id.clone();
    assert_eq!(handle.wait().await.unwrap(), JobStatus::Failed);

    let job = harness.manager.get(&id).unwrap();
    assert_eq!(job.progress, "Failed");
    assert!(job.report_path.is_none());
    assert!(job.error.unwrap().contains("API key not valid"));
    assert_eq!(harness.factory.generator().call_count(), 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let generator = ScriptedGenerator::new(vec![
        Err(ApiError::RateLimited("429".into())),
        Err(ApiError::Transport("timeout".into())),
    ]);
    let harness = HarnessBuilder::new(generator).build();

    let handle = harness.manager.submit(submission(OutputType::Guidance, Some("key"))).unwrap();
    let id = handle.id.clone();
    assert_eq!(handle.wait().await.unwrap(), JobStatus::Completed);

    let job = harness.manager.get(&id).unwrap();
    assert!(job.warnings.is_empty());
    assert_eq!(harness.factory.generator().call_count(), 3);
}

#[tokio::test]
async fn test_chat_quota_runs_out() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("## Backend\n- [ ] add tests"))
        .question_quota(1)
        .build();

    let handle = harness.manager.submit(submission(OutputType::Guidance, Some("key"))).unwrap();
    let id = handle.id.clone();
    handle.wait().await.unwrap();

    let answer = harness.manager.ask(&id, "What should come first?").await.unwrap();
    assert_eq!(answer.remaining_questions, 0);
    let prompts = harness.factory.generator().prompts();
    assert!(prompts.last().unwrap().contains("What should come first?"));

    let err = harness.manager.ask(&id, "One more?").await.unwrap_err();
    assert!(matches!(err, AnalyzerError::QuotaExhausted(_)));
}

#[tokio::test]
async fn test_health_counts_jobs() {
    let harness = HarnessBuilder::new(ScriptedGenerator::always("## Introduction\nok")).build();
    let handle = harness.manager.submit(submission(OutputType::Analysis, Some("key"))).unwrap();
    handle.wait().await.unwrap();
    harness.insert_running_job("still-running");

    let health = harness.manager.health();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_jobs, 1);
    assert_eq!(health.completed_jobs, 1);
    assert_eq!(health.failed_jobs, 0);
}
