//! Sequential batch driver.
//!
//! Makes sure a session exists before the first task, runs every task in
//! order, and gives a task that hits `AuthExpired` exactly one
//! re-authentication and one retry. No task's failure stops the batch.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::auth::{
    AuthError, Authenticator, CredentialError, CredentialStore, CredentialSupplier, Credentials,
};
use crate::download::{Transfer, TransferError, TransferOutcome};
use crate::task::DownloadTask;

/// Outcome of one task within a batch.
#[derive(Debug)]
pub struct TaskReport {
    /// Resource that was fetched.
    pub url: Url,
    /// Local destination.
    pub destination: PathBuf,
    /// Final outcome (after the retry, if one happened).
    pub outcome: TransferOutcome,
    /// Whether the task's `AuthExpired` led to a login request.
    pub reauthenticated: bool,
}

/// Everything a run produced, in task order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One report per task, in input order.
    pub reports: Vec<TaskReport>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Most recent login failure, if any login failed.
    pub auth_error: Option<AuthError>,
}

impl BatchReport {
    /// Outcomes in task order.
    pub fn outcomes(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.reports.iter().map(|report| &report.outcome)
    }

    /// Number of `Completed` tasks.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, TransferOutcome::Completed { .. }))
            .count()
    }

    /// Number of `Skipped` tasks.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, TransferOutcome::Skipped { .. }))
            .count()
    }

    /// Number of `Failed` tasks.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes().filter(|o| o.is_failed()).count()
    }

    /// Bytes received over the network across all tasks.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.outcomes()
            .map(|o| match o {
                TransferOutcome::Completed {
                    bytes_transferred, ..
                } => *bytes_transferred,
                _ => 0,
            })
            .sum()
    }

    /// Failed tasks with their errors, for operator follow-up.
    pub fn failures(&self) -> impl Iterator<Item = (&TaskReport, &TransferError)> {
        self.reports.iter().filter_map(|report| match &report.outcome {
            TransferOutcome::Failed(error) => Some((report, error)),
            _ => None,
        })
    }

    /// True when no task failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Per-run login bookkeeping: credentials are requested lazily, once, and a
/// rejected pair is never submitted again.
struct LoginState<'a> {
    supplier: &'a dyn CredentialSupplier,
    credentials: Option<Credentials>,
    rejected: bool,
    last_error: Option<AuthError>,
}

impl<'a> LoginState<'a> {
    fn new(supplier: &'a dyn CredentialSupplier) -> Self {
        Self {
            supplier,
            credentials: None,
            rejected: false,
            last_error: None,
        }
    }

    fn credentials(&mut self) -> Result<Credentials, CredentialError> {
        if let Some(credentials) = &self.credentials {
            return Ok(credentials.clone());
        }
        let credentials = self.supplier.credentials()?;
        self.credentials = Some(credentials.clone());
        Ok(credentials)
    }

    fn record(&mut self, error: AuthError) {
        if error.is_permanent() {
            self.rejected = true;
        }
        self.last_error = Some(error);
    }
}

/// What came of a request to log in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginAttempt {
    /// Credentials were rejected earlier or could not be obtained.
    NotAttempted,
    Failed,
    Succeeded,
}

/// Drives a batch of tasks through a [`Transfer`].
pub struct DownloadOrchestrator {
    store: Arc<CredentialStore>,
    authenticator: Arc<dyn Authenticator>,
    transfer: Arc<dyn Transfer>,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl DownloadOrchestrator {
    /// Creates an orchestrator over a shared store.
    ///
    /// `transfer` must read its cookies from the same `store` for a fresh
    /// login to take effect.
    #[must_use]
    pub fn new(
        store: Arc<CredentialStore>,
        authenticator: Arc<dyn Authenticator>,
        transfer: Arc<dyn Transfer>,
    ) -> Self {
        Self {
            store,
            authenticator,
            transfer,
        }
    }

    /// Runs every task in order and reports each outcome.
    ///
    /// `credentials` is consulted only when a login is needed, at most once.
    /// A task that hits `AuthExpired` gets one re-authentication and one
    /// retry, except once the provider has rejected the credentials: from
    /// then on no login is attempted, so later `AuthExpired` tasks fail
    /// without one and the account is not hammered with a bad password.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn run(
        &self,
        tasks: &[DownloadTask],
        credentials: &dyn CredentialSupplier,
    ) -> BatchReport {
        let started = Instant::now();
        let mut login = LoginState::new(credentials);

        if let Some(first) = tasks.first() {
            if self.authenticator.has_valid_session(&self.store).await {
                info!("stored session accepted");
            } else {
                info!("no valid session; logging in");
                self.authenticate(first.url(), &mut login).await;
            }
        }

        let mut seen = HashSet::new();
        let mut reports = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            info!(
                task = index + 1,
                total = tasks.len(),
                url = %task.url(),
                "starting task"
            );

            if !seen.insert(task.destination().to_path_buf()) {
                warn!(path = %task.destination().display(), "destination already used in this batch; skipping");
                reports.push(TaskReport {
                    url: task.url().clone(),
                    destination: task.destination().to_path_buf(),
                    outcome: TransferOutcome::Skipped {
                        already_complete: false,
                    },
                    reauthenticated: false,
                });
                continue;
            }

            let mut outcome = self.transfer.fetch(task).await;
            let mut reauthenticated = false;
            if outcome.is_auth_expired() {
                info!(url = %task.url(), "session rejected; re-authenticating once");
                let attempt = self.authenticate(task.url(), &mut login).await;
                reauthenticated = attempt != LoginAttempt::NotAttempted;
                if attempt == LoginAttempt::Succeeded {
                    outcome = self.transfer.fetch(task).await;
                }
            }

            log_outcome(task, &outcome);
            reports.push(TaskReport {
                url: task.url().clone(),
                destination: task.destination().to_path_buf(),
                outcome,
                reauthenticated,
            });
        }

        let report = BatchReport {
            reports,
            elapsed: started.elapsed(),
            auth_error: login.last_error,
        };
        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            bytes = report.bytes_transferred(),
            "batch finished"
        );
        report
    }

    /// Logs in against `target` and commits the session.
    async fn authenticate(&self, target: &Url, login: &mut LoginState<'_>) -> LoginAttempt {
        if login.rejected {
            debug!("credentials already rejected in this run; not logging in again");
            return LoginAttempt::NotAttempted;
        }
        let credentials = match login.credentials() {
            Ok(credentials) => credentials,
            Err(error) => {
                warn!(error = %error, "no credentials available");
                login.record(error.into());
                return LoginAttempt::NotAttempted;
            }
        };

        match self.authenticator.login(target, &credentials).await {
            Ok(session) => {
                self.store.set(session);
                LoginAttempt::Succeeded
            }
            Err(error) => {
                warn!(error = %error, "login failed");
                login.record(error);
                LoginAttempt::Failed
            }
        }
    }
}

fn log_outcome(task: &DownloadTask, outcome: &TransferOutcome) {
    let path = task.destination().display();
    match outcome {
        TransferOutcome::Completed {
            verified_checksum,
            bytes_transferred,
            resumed,
        } => info!(
            path = %path,
            bytes = bytes_transferred,
            resumed,
            verified = verified_checksum,
            "completed"
        ),
        TransferOutcome::Skipped { already_complete } => {
            info!(path = %path, already_complete, "skipped");
        }
        TransferOutcome::Failed(error) => warn!(path = %path, error = %error, "failed"),
    }
}
