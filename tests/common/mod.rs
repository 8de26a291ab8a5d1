#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use reposcribe::api::JobManager;
use reposcribe::jobs::{JobRecord, JobStatus};
use reposcribe::test_utils::{write_sample_tree, LocalFetcher, ScriptedFactory, ScriptedGenerator};
use reposcribe::{Config, ReportPipeline};
use tempfile::TempDir;

pub const SAMPLE_URL: &str = "https://github.com/acme/sample";

/// A job manager over a local sample tree and a scripted model
pub struct Harness {
    pub source: TempDir,
    pub output: TempDir,
    pub factory: Arc<ScriptedFactory>,
    pub manager: Arc<JobManager>,
}

pub struct HarnessBuilder {
    generator: ScriptedGenerator,
    api_key: Option<String>,
    max_chunk_chars: Option<usize>,
    question_quota: u32,
}

impl HarnessBuilder {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self {
            generator,
            api_key: None,
            max_chunk_chars: None,
            question_quota: 10,
        }
    }

    /// Server-side key used when a submission carries none
    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn max_chunk_chars(mut self, max: usize) -> Self {
        self.max_chunk_chars = Some(max);
        self
    }

    pub fn question_quota(mut self, quota: u32) -> Self {
        self.question_quota = quota;
        self
    }

    pub fn build(self) -> Harness {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_sample_tree(source.path()).unwrap();

        let mut config = Config::new(output.path().to_path_buf());
        config.gemini.api_key = self.api_key;
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        config.server.question_quota = self.question_quota;
        if let Some(max) = self.max_chunk_chars {
            config.limits.max_chunk_chars = max;
        }

        let factory = Arc::new(ScriptedFactory::new(Arc::new(self.generator)));
        let pipeline = ReportPipeline::new(config, factory.clone(), Arc::new(LocalFetcher::new(source.path())));
        Harness {
            source,
            output,
            factory,
            manager: Arc::new(JobManager::with_pipeline(pipeline)),
        }
    }
}

impl Harness {
    /// Polls until the job leaves the running state
    pub async fn wait_finished(&self, id: &str) -> JobRecord {
        for _ in 0..500 {
            let job = self.manager.get(id).unwrap();
            if job.status != JobStatus::Running {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish in time", id);
    }

    /// Registers a job that stays running for the whole test
    pub fn insert_running_job(&self, id: &str) {
        self.manager.store().insert(JobRecord::new(
            id.to_string(),
            SAMPLE_URL.to_string(),
            "sample".to_string(),
            Default::default(),
            false,
            10,
        ));
    }
}

pub fn setup_test_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
