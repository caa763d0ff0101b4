use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use mayday_core::job::JobDefinition;

use crate::notify::Notifier;
use crate::runner;

/// Concurrency-safe execution of job invocations.
///
/// One tokio task per invocation; a mutex-guarded set of running job names
/// enforces at most one concurrent invocation per name. Failures are
/// classified, logged and turned into failure notifications; they never
/// propagate to the scheduler loop.
pub struct Runtime {
    http: reqwest::Client,
    notifier: Arc<dyn Notifier>,
    running: Mutex<HashSet<String>>,
}

impl Runtime {
    pub fn new(http: reqwest::Client, notifier: Arc<dyn Notifier>) -> Self {
        Self { http, notifier, running: Mutex::new(HashSet::new()) }
    }

    /// Whether an invocation of `name` is currently in flight.
    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains(name)
    }

    /// Number of in-flight invocations.
    pub fn in_flight(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    /// Fire one invocation of `job` as a detached task.
    ///
    /// Returns `false` without running anything if an invocation of the same
    /// name is still in flight.
    pub fn execute(self: &Arc<Self>, job: Arc<JobDefinition>) -> bool {
        if !self.running.lock().unwrap().insert(job.name.clone()) {
            return false;
        }

        let rt = Arc::clone(self);
        tokio::spawn(async move {
            // Clears the running flag even if the handler panics the task.
            let _guard = RunGuard { rt: Arc::clone(&rt), name: job.name.clone() };

            let body = match runner::execute(&job.params, &rt.http).await {
                Ok(body) => {
                    info!(rule = %job.name, kind = job.params.kind(), "job ok");
                    body
                }
                Err(e) => {
                    warn!(rule = %job.name, kind = job.params.kind(), "job failed: {e}");
                    format!("execution failed: {e}")
                }
            };

            let text = format_notification(&job, &body);
            if let Err(e) = rt.notifier.send(&job.target.channel, &text).await {
                warn!(rule = %job.name, channel = %job.target.channel, "notification dropped: {e}");
            }
        });
        true
    }

    /// Wait for in-flight invocations to complete, up to `grace`.
    ///
    /// Returns `false` when stragglers were abandoned; their outcomes, if
    /// any, are logged by the detached tasks after shutdown.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(25)).await;
        }
        true
    }
}

struct RunGuard {
    rt: Arc<Runtime>,
    name: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.rt.running.lock().unwrap().remove(&self.name);
    }
}

/// `[timestamp] [Severity: s] [Rule: name] <body>`.
pub fn format_notification(job: &JobDefinition, body: &str) -> String {
    format!(
        "[{}] [Severity: {}] [Rule: {}] {}",
        Local::now().format("%d/%m/%Y %H:%M:%S"),
        job.severity,
        job.name,
        body
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::notify::{Notifier, NotifyError};

    /// Records deliveries instead of talking to Slack; an optional delay
    /// keeps the invocation in flight for concurrency tests.
    pub struct RecordingNotifier {
        pub delay: Duration,
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        pub fn new(delay: Duration) -> Self {
            Self { delay, sent: Mutex::new(Vec::new()) }
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }
}
