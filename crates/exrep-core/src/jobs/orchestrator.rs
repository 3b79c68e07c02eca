//! Submission and polling of analysis jobs.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use futures::stream::{self, StreamExt};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{ServiceError, SubmissionError};
use crate::extraction::RawExtractionResult;
use crate::models::config::PollingConfig;
use crate::progress::{NoProgress, ProgressObserver, Stage};
use crate::storage::DocumentHandle;

use super::{AnalysisService, JobHandle, JobOutcome, JobPoll, JobStatus};

/// Limits applied while polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Jobs polled at the same time.
    pub concurrency: usize,
    /// First wait between two polls of one job.
    pub min_delay: Duration,
    /// Upper bound of the wait between two polls of one job.
    pub max_delay: Duration,
    /// Status queries per job before it is timed out. `None` polls until terminal.
    pub max_attempts: Option<usize>,
    /// Wall-clock budget for the whole polling phase.
    pub batch_timeout: Option<Duration>,
    /// Retries of a status query that failed in transport.
    pub transport_retries: usize,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollingPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
            max_attempts: (config.max_attempts > 0).then_some(config.max_attempts),
            batch_timeout: (config.batch_timeout_secs > 0)
                .then(|| Duration::from_secs(config.batch_timeout_secs)),
            transport_retries: config.transport_retries,
        }
    }
}

impl PollingPolicy {
    /// Delays between successive polls of one job.
    fn requeue_backoff(&self) -> ExponentialBuilder {
        let requeues = self
            .max_attempts
            .map_or(usize::MAX, |attempts| attempts.saturating_sub(1));
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(requeues)
            .with_jitter()
    }

    fn transport_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.transport_retries)
            .with_jitter()
    }
}

/// Result data collected from one job.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedResult {
    pub job: JobHandle,
    /// The service reported only partial success.
    pub partial: bool,
    pub result: RawExtractionResult,
}

/// Everything `poll_all` learned about a batch of jobs.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    /// Succeeded and partially succeeded jobs, in submission order.
    pub collected: Vec<CollectedResult>,
    /// Terminal outcome of every job, in submission order.
    pub outcomes: Vec<(JobHandle, JobOutcome)>,
}

impl PollReport {
    /// Raw results in submission order.
    pub fn results(&self) -> impl Iterator<Item = &RawExtractionResult> {
        self.collected.iter().map(|c| &c.result)
    }
}

/// Outcome of submitting a batch of documents.
#[derive(Debug, Default)]
pub struct SubmissionReport {
    /// Started jobs, in input order.
    pub jobs: Vec<JobHandle>,
    /// Documents the service refused, in input order.
    pub rejected: Vec<(DocumentHandle, SubmissionError)>,
}

struct Resolved {
    job: JobHandle,
    outcome: JobOutcome,
    result: Option<RawExtractionResult>,
}

impl Resolved {
    fn dropped(job: JobHandle, outcome: JobOutcome) -> Self {
        Self {
            job,
            outcome,
            result: None,
        }
    }
}

/// Drives analysis jobs from submission to a terminal outcome.
pub struct JobOrchestrator<S> {
    service: S,
    policy: PollingPolicy,
    observer: Arc<dyn ProgressObserver>,
}

impl<S: AnalysisService> JobOrchestrator<S> {
    /// Create an orchestrator with the default polling policy.
    pub fn new(service: S) -> Self {
        Self {
            service,
            policy: PollingPolicy::default(),
            observer: Arc::new(NoProgress),
        }
    }

    /// Set the polling policy.
    pub fn with_policy(mut self, policy: PollingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    /// Start an analysis job for one uploaded document. Rejections are not retried.
    pub async fn submit(&self, document: DocumentHandle) -> Result<JobHandle, SubmissionError> {
        debug!("Starting analysis job for {}", document.key);
        let job_id = self.service.start(&document.key).await?;
        debug!("Analysis job for {} started. Job ID: {}", document.key, job_id);

        Ok(JobHandle { job_id, document })
    }

    /// Start one job per document. A rejected document does not affect the others.
    pub async fn submit_all(&self, documents: Vec<DocumentHandle>) -> SubmissionReport {
        info!("Starting analysis jobs for {} documents", documents.len());
        self.observer.stage_started(Stage::Submit, documents.len());

        let mut report = SubmissionReport::default();
        for document in documents {
            match self.submit(document.clone()).await {
                Ok(job) => report.jobs.push(job),
                Err(err) => {
                    warn!("Analysis of {} was not started: {}", document.key, err);
                    report.rejected.push((document, err));
                }
            }
            self.observer.item_finished(Stage::Submit);
        }

        self.observer.stage_finished(Stage::Submit);
        report
    }

    /// Poll every job until none is pending.
    ///
    /// Up to `concurrency` jobs are polled at once. A job still in progress waits
    /// an exponentially growing, jittered delay before its next poll, and is timed
    /// out once its attempt budget or the batch deadline is exhausted. Results come
    /// back in submission order regardless of completion order.
    pub async fn poll_all(&self, jobs: Vec<JobHandle>) -> PollReport {
        let total = jobs.len();
        info!("Retrieving analyses for {} jobs", total);
        self.observer.stage_started(Stage::Poll, total);

        let deadline = self.policy.batch_timeout.map(|timeout| Instant::now() + timeout);
        let mut resolved: Vec<Resolved> = stream::iter(jobs)
            .map(|job| self.poll_job(job, deadline))
            .buffer_unordered(self.policy.concurrency.max(1))
            .inspect(|_| self.observer.item_finished(Stage::Poll))
            .collect()
            .await;
        resolved.sort_by_key(|r| r.job.document.ordinal);

        self.observer.stage_finished(Stage::Poll);

        let mut report = PollReport::default();
        for Resolved {
            job,
            outcome,
            result,
        } in resolved
        {
            if let Some(result) = result {
                report.collected.push(CollectedResult {
                    job: job.clone(),
                    partial: outcome == JobOutcome::PartialSuccess,
                    result,
                });
            }
            report.outcomes.push((job, outcome));
        }

        info!(
            "Retrieved analyses for {} jobs, {} usable",
            total,
            report.collected.len()
        );
        report
    }

    async fn poll_job(&self, job: JobHandle, deadline: Option<Instant>) -> Resolved {
        let mut requeues = self.policy.requeue_backoff().build();
        let mut attempts: u32 = 0;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("Job {} timed out after {} polls", job.job_id, attempts);
                return Resolved::dropped(job, JobOutcome::TimedOut { attempts });
            }

            attempts += 1;
            debug!("Retrieving analysis status for job {}", job.job_id);
            let poll = match self.query(&job.job_id).await {
                Ok(poll) => poll,
                Err(err) => {
                    warn!("Job {} could not be queried: {}", job.job_id, err);
                    let outcome = JobOutcome::Failed {
                        message: Some(err.to_string()),
                    };
                    return Resolved::dropped(job, outcome);
                }
            };

            let JobPoll {
                status,
                status_message,
                result,
            } = poll;

            match status {
                JobStatus::Succeeded => {
                    debug!("Job {} succeeded", job.job_id);
                    return with_result(job, JobOutcome::Succeeded, result);
                }
                JobStatus::PartialSuccess => {
                    warn!("Job {} partially succeeded", job.job_id);
                    return with_result(job, JobOutcome::PartialSuccess, result);
                }
                JobStatus::Failed => {
                    warn!(
                        "Job {} for {} failed: {}",
                        job.job_id,
                        job.document.key,
                        status_message.as_deref().unwrap_or("no reason given")
                    );
                    let outcome = JobOutcome::Failed {
                        message: status_message,
                    };
                    return Resolved::dropped(job, outcome);
                }
                JobStatus::Other(status) => {
                    warn!("Job {} in unknown state {}", job.job_id, status);
                    return Resolved::dropped(job, JobOutcome::Unknown { status });
                }
                JobStatus::InProgress => {
                    let Some(delay) = requeues.next() else {
                        warn!("Job {} still in progress after {} polls", job.job_id, attempts);
                        return Resolved::dropped(job, JobOutcome::TimedOut { attempts });
                    };
                    if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                        warn!("Job {} would outlive the batch deadline", job.job_id);
                        return Resolved::dropped(job, JobOutcome::TimedOut { attempts });
                    }

                    debug!("Job {} still in progress, next poll in {:?}", job.job_id, delay);
                    sleep(delay).await;
                }
            }
        }
    }

    /// One status query, retried on transient transport failures.
    async fn query(&self, job_id: &str) -> Result<JobPoll, ServiceError> {
        (|| async move { self.service.poll(job_id).await })
            .retry(self.policy.transport_backoff())
            .sleep(sleep)
            .when(ServiceError::is_transient)
            .notify(|err: &ServiceError, delay: Duration| {
                warn!(
                    job_id,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying job status query"
                );
            })
            .await
    }
}

fn with_result(job: JobHandle, outcome: JobOutcome, result: Option<RawExtractionResult>) -> Resolved {
    let result = result.unwrap_or_else(|| {
        warn!("Job {} reported {:?} without results", job.job_id, outcome);
        RawExtractionResult::default()
    });
    Resolved {
        job,
        outcome,
        result: Some(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{normalize, FieldDetection};
    use crate::storage::StorageKey;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;
    use std::sync::Mutex;

    type Step = Result<JobPoll, ServiceError>;

    /// Service replaying a scripted status sequence per job; the last step repeats.
    #[derive(Default)]
    struct ScriptedService {
        scripts: Mutex<HashMap<String, VecDeque<Step>>>,
        polls: Mutex<HashMap<String, usize>>,
        reject: Vec<String>,
    }

    impl ScriptedService {
        fn script(self, key: &str, steps: Vec<Step>) -> Self {
            self.scripts
                .lock()
                .expect("script mutex poisoned")
                .insert(format!("job-{key}"), steps.into());
            self
        }

        fn polls(&self, key: &str) -> usize {
            let polls = self.polls.lock().expect("poll mutex poisoned");
            polls.get(&format!("job-{key}")).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl AnalysisService for ScriptedService {
        async fn start(&self, key: &StorageKey) -> Result<String, SubmissionError> {
            if self.reject.iter().any(|k| k == key.as_str()) {
                return Err(SubmissionError::Rejected {
                    key: key.to_string(),
                    status: 400,
                    message: "throttled".into(),
                });
            }
            Ok(format!("job-{key}"))
        }

        async fn poll(&self, job_id: &str) -> Result<JobPoll, ServiceError> {
            *self
                .polls
                .lock()
                .expect("poll mutex poisoned")
                .entry(job_id.to_string())
                .or_default() += 1;

            let mut scripts = self.scripts.lock().expect("script mutex poisoned");
            let steps = scripts
                .get_mut(job_id)
                .expect("poll for unscripted job");
            if steps.len() > 1 {
                steps.pop_front().expect("non-empty script")
            } else {
                steps.front().cloned().expect("non-empty script")
            }
        }
    }

    fn fast_policy() -> PollingPolicy {
        PollingPolicy {
            concurrency: 2,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_attempts: Some(20),
            batch_timeout: None,
            transport_retries: 2,
        }
    }

    fn document(ordinal: usize, key: &str) -> DocumentHandle {
        DocumentHandle {
            ordinal,
            source: PathBuf::from(format!("{key}.png")),
            key: StorageKey::new(key),
        }
    }

    async fn start_jobs<S: AnalysisService>(
        orchestrator: &JobOrchestrator<S>,
        keys: &[&str],
    ) -> Vec<JobHandle> {
        let documents = keys
            .iter()
            .enumerate()
            .map(|(ordinal, key)| document(ordinal, key))
            .collect();
        let report = orchestrator.submit_all(documents).await;
        assert!(report.rejected.is_empty());
        report.jobs
    }

    fn total(value: &str) -> RawExtractionResult {
        RawExtractionResult::single(vec![FieldDetection::new("TOTAL", value)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_completeness() {
        let service = ScriptedService::default()
            .script("a", vec![Ok(JobPoll::succeeded(total("12.50")))])
            .script("b", vec![Ok(JobPoll::in_progress()), Ok(JobPoll::failed("bad scan"))])
            .script("c", vec![Ok(JobPoll::partial(total("7.00")))])
            .script("d", vec![Ok(JobPoll::status(JobStatus::parse("QUEUED")))]);
        let orchestrator = JobOrchestrator::new(service).with_policy(fast_policy());

        let jobs = start_jobs(&orchestrator, &["a", "b", "c", "d"]).await;
        let report = orchestrator.poll_all(jobs).await;

        let collected: Vec<_> = report
            .collected
            .iter()
            .map(|c| (c.job.document.key.as_str(), c.partial))
            .collect();
        assert_eq!(collected, vec![("a", false), ("c", true)]);

        let outcomes: Vec<_> = report.outcomes.iter().map(|(_, o)| o.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                JobOutcome::Succeeded,
                JobOutcome::Failed {
                    message: Some("bad scan".into())
                },
                JobOutcome::PartialSuccess,
                JobOutcome::Unknown {
                    status: "QUEUED".into()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeded_without_payload_yields_empty_row() {
        let service = ScriptedService::default()
            .script("bare", vec![Ok(JobPoll::status(JobStatus::Succeeded))]);
        let orchestrator = JobOrchestrator::new(service).with_policy(fast_policy());

        let jobs = start_jobs(&orchestrator, &["bare"]).await;
        let report = orchestrator.poll_all(jobs).await;

        assert_eq!(report.collected.len(), 1);
        assert!(!report.collected[0].partial);
        assert_eq!(report.collected[0].result, RawExtractionResult::default());
        assert!(normalize(&report.collected[0].result).is_empty());
        assert_eq!(report.outcomes[0].1, JobOutcome::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_holds_job_until_terminal() {
        let service = ScriptedService::default()
            .script("stuck", vec![Ok(JobPoll::in_progress())])
            .script("done", vec![Ok(JobPoll::succeeded(total("2.00")))]);
        let policy = PollingPolicy {
            concurrency: 1,
            max_attempts: None,
            batch_timeout: Some(Duration::from_secs(5)),
            ..fast_policy()
        };
        let orchestrator = JobOrchestrator::new(service).with_policy(policy);

        let jobs = start_jobs(&orchestrator, &["stuck", "done"]).await;
        let report = orchestrator.poll_all(jobs).await;

        assert!(matches!(report.outcomes[0].1, JobOutcome::TimedOut { .. }));
        assert_eq!(report.outcomes[1].1, JobOutcome::Succeeded);
        assert!(orchestrator.service().polls("stuck") > 1);
        assert_eq!(orchestrator.service().polls("done"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeued_job_collected_once() {
        let mut steps: Vec<Step> = (0..5).map(|_| Ok(JobPoll::in_progress())).collect();
        steps.push(Ok(JobPoll::succeeded(total("3.00"))));
        let service = ScriptedService::default().script("a", steps);
        let orchestrator = JobOrchestrator::new(service).with_policy(fast_policy());

        let jobs = start_jobs(&orchestrator, &["a"]).await;
        let report = orchestrator.poll_all(jobs).await;

        assert_eq!(report.collected.len(), 1);
        assert_eq!(report.results().next(), Some(&total("3.00")));
        assert_eq!(orchestrator.service().polls("a"), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_submission_order() {
        let mut slow: Vec<Step> = (0..4).map(|_| Ok(JobPoll::in_progress())).collect();
        slow.push(Ok(JobPoll::succeeded(total("first"))));
        let service = ScriptedService::default()
            .script("first", slow)
            .script("second", vec![Ok(JobPoll::succeeded(total("second")))]);
        let orchestrator = JobOrchestrator::new(service).with_policy(fast_policy());

        let jobs = start_jobs(&orchestrator, &["first", "second"]).await;
        let report = orchestrator.poll_all(jobs).await;

        let keys: Vec<_> = report
            .collected
            .iter()
            .map(|c| c.job.document.key.as_str())
            .collect();
        assert_eq!(keys, vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_times_out() {
        let service = ScriptedService::default().script("stuck", vec![Ok(JobPoll::in_progress())]);
        let policy = PollingPolicy {
            max_attempts: Some(4),
            ..fast_policy()
        };
        let orchestrator = JobOrchestrator::new(service).with_policy(policy);

        let jobs = start_jobs(&orchestrator, &["stuck"]).await;
        let report = orchestrator.poll_all(jobs).await;

        assert!(report.collected.is_empty());
        assert_eq!(report.outcomes[0].1, JobOutcome::TimedOut { attempts: 4 });
        assert_eq!(orchestrator.service().polls("stuck"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_deadline_times_out() {
        let service = ScriptedService::default()
            .script("stuck", vec![Ok(JobPoll::in_progress())])
            .script("done", vec![Ok(JobPoll::succeeded(total("1.00")))]);
        let policy = PollingPolicy {
            max_attempts: None,
            batch_timeout: Some(Duration::from_secs(1)),
            ..fast_policy()
        };
        let orchestrator = JobOrchestrator::new(service).with_policy(policy);

        let jobs = start_jobs(&orchestrator, &["stuck", "done"]).await;
        let report = orchestrator.poll_all(jobs).await;

        assert!(matches!(report.outcomes[0].1, JobOutcome::TimedOut { .. }));
        assert_eq!(report.outcomes[1].1, JobOutcome::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let service = ScriptedService::default().script(
            "flaky",
            vec![
                Err(ServiceError::Transport("connection reset".into())),
                Err(ServiceError::Status {
                    status: 503,
                    body: "busy".into(),
                }),
                Ok(JobPoll::succeeded(total("9.99"))),
            ],
        );
        let orchestrator = JobOrchestrator::new(service).with_policy(fast_policy());

        let jobs = start_jobs(&orchestrator, &["flaky"]).await;
        let report = orchestrator.poll_all(jobs).await;

        assert_eq!(report.outcomes[0].1, JobOutcome::Succeeded);
        assert_eq!(orchestrator.service().polls("flaky"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_transport_retries_fail_job() {
        let service = ScriptedService::default().script(
            "down",
            vec![Err(ServiceError::Transport("unreachable".into()))],
        );
        let orchestrator = JobOrchestrator::new(service).with_policy(fast_policy());

        let jobs = start_jobs(&orchestrator, &["down"]).await;
        let report = orchestrator.poll_all(jobs).await;

        assert!(matches!(report.outcomes[0].1, JobOutcome::Failed { .. }));
        assert_eq!(orchestrator.service().polls("down"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let service = ScriptedService::default().script(
            "gone",
            vec![Err(ServiceError::Status {
                status: 404,
                body: "no such job".into(),
            })],
        );
        let orchestrator = JobOrchestrator::new(service).with_policy(fast_policy());

        let jobs = start_jobs(&orchestrator, &["gone"]).await;
        orchestrator.poll_all(jobs).await;

        assert_eq!(orchestrator.service().polls("gone"), 1);
    }

    #[tokio::test]
    async fn test_submit_rejection_propagates() {
        let service = ScriptedService {
            reject: vec!["bad".to_string()],
            ..Default::default()
        };
        let orchestrator = JobOrchestrator::new(service);

        let err = orchestrator.submit(document(0, "bad")).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { status: 400, .. }));

        let job = orchestrator.submit(document(1, "good")).await.unwrap();
        assert_eq!(job.job_id, "job-good");
    }

    #[tokio::test]
    async fn test_submit_all_isolates_rejections() {
        let service = ScriptedService {
            reject: vec!["bad".to_string()],
            ..Default::default()
        };
        let orchestrator = JobOrchestrator::new(service);

        let report = orchestrator
            .submit_all(vec![document(0, "a"), document(1, "bad"), document(2, "c")])
            .await;

        let started: Vec<_> = report.jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(started, vec!["job-a", "job-c"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0.key.as_str(), "bad");
    }

    #[test]
    fn test_policy_from_config() {
        let config = PollingConfig {
            concurrency: 0,
            max_attempts: 0,
            batch_timeout_secs: 0,
            ..PollingConfig::default()
        };
        let policy = PollingPolicy::from(&config);

        assert_eq!(policy.concurrency, 1);
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.batch_timeout, None);
    }
}
