use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::auth::resolve_credentials;
use crate::broadcast::run_events::{RunEvent, Severity};
use crate::browser::BrowserDriver;
use crate::config::Config;
use crate::discovery::{CreatorSelection, ItemScanner};
use crate::download::{
    retry_pass, AuthenticatedClient, Companion, DownloadOrchestrator, OrchestratorSettings,
};
use crate::error::SyncError;
use crate::registry::DedupRegistry;
use crate::session::controller::join_path;
use crate::session::{LoginVerdict, SessionController, SessionSettings};
use crate::storage::{run_date_folder, FileStorage};
use crate::templating::CompanionTemplater;

use super::context::{RunContext, RunWarning};
use super::progress::ProgressReporter;
use super::summary::{write_run_record, RunRecord, RunSummary};

/// Per-run choices made by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub creators: CreatorSelection,
    /// Date of the top-level output folder. Today when unset.
    pub run_date: Option<NaiveDate>,
}

pub struct RunOutcome {
    pub context: RunContext,
    pub summary: RunSummary,
    /// Where `run-summary.json` was written, if it could be.
    pub summary_path: Option<PathBuf>,
}

/// Runs login, discovery, download and retry against one portal.
pub struct SyncRunner {
    config: Arc<Config>,
    driver: Arc<dyn BrowserDriver>,
    progress: Arc<dyn ProgressReporter>,
    templater: Option<Arc<dyn CompanionTemplater>>,
}

impl SyncRunner {
    pub fn new(
        config: Arc<Config>,
        driver: Arc<dyn BrowserDriver>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            config,
            driver,
            progress,
            templater: None,
        }
    }

    /// Renders a companion document per stored spreadsheet. Only takes effect
    /// when the config also names a template.
    pub fn with_templater(mut self, templater: Arc<dyn CompanionTemplater>) -> Self {
        self.templater = Some(templater);
        self
    }

    /// Runs the whole flow once.
    ///
    /// Per-item failures end up in the summary. Cancellation before the
    /// download stage returns [`SyncError::Cancelled`]; cancellation during
    /// downloads still produces a summary with the stopped items counted as
    /// cancelled.
    pub async fn run(
        &self,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, SyncError> {
        let run_date = options
            .run_date
            .unwrap_or_else(|| Local::now().date_naive());
        let mut ctx = RunContext::new(run_date);
        let span = info_span!("run",
            run_id = %ctx.run_id,
            run_date = %run_date_folder(run_date),
        );

        async move {
            let config = &self.config;
            let storage = Arc::new(FileStorage::new(&config.output.root));

            // Step 1: Registry
            let registry = match DedupRegistry::load_or_rebuild(
                config.output.registry_path(),
                storage.output_root(),
            ) {
                Ok(registry) => registry,
                Err(e) => {
                    warn!("Registry unreadable, rebuilding from output: {}", e);
                    ctx.warnings.push(RunWarning::RegistryUnreadable {
                        error: e.to_string(),
                    });
                    DedupRegistry::rebuild(config.output.registry_path(), storage.output_root())
                }
            };
            info!("Registry holds {} known items", registry.len());

            // Step 2: Session
            self.authenticate(&mut ctx, cancel).await?;

            // Step 3: Discovery
            self.discover(&mut ctx, &registry, &options.creators, cancel)
                .await?;

            // Step 4: Downloads
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let orchestrator = self.orchestrator(Arc::clone(&storage), registry, run_date).await?;
            self.progress
                .status("Download", "Downloading documents", Severity::Info);
            let batch = orchestrator
                .run(
                    std::mem::take(&mut ctx.items),
                    config.download.concurrency,
                    cancel,
                )
                .await;
            ctx.items = batch.items;

            // Step 5: Retry pass
            if !cancel.is_cancelled() {
                let retry = retry_pass(
                    &orchestrator,
                    std::mem::take(&mut ctx.items),
                    config.download.retry_concurrency,
                    cancel,
                )
                .await;
                ctx.items = retry.items;
                ctx.retried = retry.retried;
            }

            if let Err(e) = orchestrator.registry_snapshot().save() {
                warn!("Registry not persisted at end of run: {}", e);
            }

            // Step 6: Summary
            Ok(self.finish(ctx, &storage))
        }
        .instrument(span)
        .await
    }

    async fn authenticate(
        &self,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let config = &self.config;
        let credentials = if config.credentials.manual_login {
            None
        } else {
            Some(resolve_credentials(&config.credentials)?)
        };

        let mut session = SessionController::new(
            Arc::clone(&self.driver),
            SessionSettings::from_config(config),
            credentials,
            Arc::clone(&self.progress),
            cancel.clone(),
        );

        match session.authenticate().await? {
            LoginVerdict::Authenticated(signal) => {
                info!("Logged in ({:?})", signal);
            }
            LoginVerdict::Indeterminate => {
                warn!("Login could not be confirmed, continuing with discovery");
                ctx.warnings.push(RunWarning::AuthenticationIndeterminate);
            }
        }
        Ok(())
    }

    async fn discover(
        &self,
        ctx: &mut RunContext,
        registry: &DedupRegistry,
        creators: &CreatorSelection,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let config = &self.config;
        let list_url = join_path(&config.site.base_url, &config.site.list_path);
        self.driver.navigate(&list_url).await?;

        let scanner = ItemScanner::from_config(config);
        let report = scanner
            .discover(self.driver.as_ref(), registry, cancel)
            .await?;

        self.progress.report(RunEvent::Found {
            count: report.items.len(),
        });
        self.progress.status(
            "Discovery",
            &format!(
                "{} new items, {} already downloaded",
                report.items.len(),
                report.skipped_known
            ),
            Severity::Info,
        );

        let discovered = report.items.len();
        ctx.items = creators.apply(report.items.clone());
        ctx.deselected = discovered - ctx.items.len();
        if ctx.deselected > 0 {
            info!("Creator selection dropped {} items", ctx.deselected);
        }
        ctx.discovery = Some(report);
        Ok(())
    }

    async fn orchestrator(
        &self,
        storage: Arc<FileStorage>,
        registry: DedupRegistry,
        run_date: NaiveDate,
    ) -> Result<DownloadOrchestrator, SyncError> {
        let download = &self.config.download;
        let cookies = self.driver.cookies().await?;
        let client = AuthenticatedClient::new(
            &cookies,
            &download.user_agent,
            download.request_timeout(),
            download.connect_timeout(),
        )
        .map_err(|e| SyncError::Client(e.to_string()))?;

        let companion = match (&self.templater, &self.config.output.template_path) {
            (Some(templater), Some(template)) => {
                Some(Companion::new(Arc::clone(templater), template.clone()))
            }
            _ => None,
        };

        Ok(DownloadOrchestrator::new(
            client,
            storage,
            registry,
            companion,
            Arc::clone(&self.progress),
            OrchestratorSettings {
                run_date,
                success_delay: download.success_delay(),
                failure_delay: download.failure_delay(),
            },
        ))
    }

    fn finish(&self, mut ctx: RunContext, storage: &FileStorage) -> RunOutcome {
        let summary = RunSummary::from_context(&ctx);
        let record = RunRecord::from_context(&ctx, &summary);
        let summary_path = match write_run_record(storage.output_root(), &ctx, &record) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Run summary not written: {}", e);
                ctx.warnings.push(RunWarning::SummaryNotWritten {
                    error: e.to_string(),
                });
                None
            }
        };

        info!(
            found = summary.found,
            downloaded = summary.downloaded,
            skipped_known = summary.skipped_known,
            duplicates = summary.duplicates,
            failed = summary.failed,
            cancelled = summary.cancelled,
            retried = summary.retried,
            "Run finished, total amount {:.2}",
            summary.total_amount
        );

        let severity = if summary.failed > 0 || summary.cancelled > 0 {
            Severity::Warning
        } else {
            Severity::Success
        };
        self.progress.status(
            "Summary",
            &format!(
                "{} downloaded, {} skipped, {} failed, total {:.2}",
                summary.downloaded,
                summary.skipped_known + summary.duplicates,
                summary.failed,
                summary.total_amount
            ),
            severity,
        );

        RunOutcome {
            context: ctx,
            summary,
            summary_path,
        }
    }
}
