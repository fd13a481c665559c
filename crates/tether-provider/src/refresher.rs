//! Periodic background status refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::command::CommandId;
use crate::operation::Operation;
use crate::provider::Provider;

/// Issues a forced `Fetch` on a fixed interval, skipping a round while the
/// previous one is still queued.
pub struct Refresher {
    provider: Arc<Provider>,
    interval: Duration,
}

impl Refresher {
    pub fn new(provider: Arc<Provider>) -> Self {
        let interval = provider.config().refresh_interval();
        Self { provider, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; initialization already
        // fetched.
        ticker.tick().await;

        info!(interval = ?self.interval, "background refresh started");
        let mut in_flight: Option<CommandId> = None;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Some(id) = in_flight {
                if self.provider.is_pending(id) {
                    debug!(%id, "previous refresh still queued");
                    continue;
                }
            }
            if !self.provider.is_enabled() {
                continue;
            }
            let handle = self.provider.issue(Operation::Fetch { update_status: true }, Vec::new());
            in_flight = Some(handle.id());
        }
        info!("background refresh stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use tether_cache::NoopAttributes;
    use tether_client::{MockDaemon, NonceStore, RemoteServiceClient};
    use tether_status::{GitOutput, GitRunner, StatusResult};

    struct OneFileGit;

    impl GitRunner for OneFileGit {
        fn run(&self, command: &str, _params: &[String], _files: &[String]) -> StatusResult<GitOutput> {
            match command {
                "ls-files" => Ok(GitOutput::stdout(&["Content/A.uasset"])),
                _ => Ok(GitOutput::default()),
            }
        }
    }

    #[tokio::test]
    async fn issues_fetches_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Content")).unwrap();
        let daemon = Arc::new(MockDaemon::new("alice"));
        let client = Arc::new(RemoteServiceClient::with_transport(daemon.clone(), NonceStore::fixed("nonce")));
        let config = ProviderConfig { sync_poll_interval_ms: 1, ..ProviderConfig::for_repo(dir.path()) };
        let provider = Arc::new(Provider::new(config, client, Arc::new(OneFileGit), Arc::new(NoopAttributes)));
        provider.initialize().await.unwrap();
        let baseline = daemon.call_count("/repo/status");

        let (tx, rx) = watch::channel(false);
        provider.spawn_scheduler(rx.clone());
        let task = Refresher::new(provider.clone()).with_interval(Duration::from_millis(10)).spawn(rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        assert!(daemon.call_count("/repo/status") > baseline);
    }
}
