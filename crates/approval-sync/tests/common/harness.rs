//! Isolated output directory plus orchestrator wiring for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::TempDir;

use approval_sync::browser::Cookie;
use approval_sync::discovery::ItemStatus;
use approval_sync::download::{
    AuthenticatedClient, Companion, DownloadOrchestrator, OrchestratorSettings, ScrapedItem,
};
use approval_sync::pipeline::{ProgressReporter, RecordingProgress};
use approval_sync::registry::DedupRegistry;
use approval_sync::storage::FileStorage;

pub struct TestHarness {
    temp_dir: TempDir,
    pub output_root: PathBuf,
    pub registry_path: PathBuf,
    pub progress: Arc<RecordingProgress>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output_root = temp_dir.path().join("output");
        std::fs::create_dir_all(&output_root).expect("Failed to create output dir");
        let registry_path = output_root.join("downloaded.txt");

        Self {
            temp_dir,
            output_root,
            registry_path,
            progress: Arc::new(RecordingProgress::new()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    pub fn storage(&self) -> Arc<FileStorage> {
        Arc::new(FileStorage::new(&self.output_root))
    }

    pub fn registry(&self) -> DedupRegistry {
        DedupRegistry::load(&self.registry_path).expect("Failed to load registry")
    }

    pub fn client() -> AuthenticatedClient {
        AuthenticatedClient::new(
            &[Cookie::new("session", "s3cr3t")],
            "approval-sync-tests",
            Duration::from_secs(30),
            Duration::from_secs(5),
        )
        .expect("Failed to build client")
    }

    pub fn orchestrator(&self, companion: Option<Companion>) -> DownloadOrchestrator {
        let progress: Arc<dyn ProgressReporter> = self.progress.clone();
        DownloadOrchestrator::new(
            Self::client(),
            self.storage(),
            self.registry(),
            companion,
            progress,
            OrchestratorSettings {
                run_date: Self::run_date(),
                success_delay: Duration::ZERO,
                failure_delay: Duration::ZERO,
            },
        )
    }

    /// An approved item pointing at `url`, filed under `creator`/`period`.
    pub fn item(url: &str, creator: &str, period: &str) -> ScrapedItem {
        let resolved = reqwest::Url::parse(url).expect("valid url");
        let mut item = ScrapedItem::new(url, &resolved, ItemStatus::Approved);
        item.creator_name = creator.to_string();
        item.period_label = period.to_string();
        item
    }

    /// `{output_root}/19102026/{creator}/{period}`.
    pub fn item_folder(&self, creator: &str, period: &str) -> PathBuf {
        self.storage()
            .item_folder(Self::run_date(), creator, period)
    }
}
