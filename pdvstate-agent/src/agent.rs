//! Startup and task wiring.

use crate::config::ConfigLoader;
use pdvstate_core::config::AgentConfig;
use pdvstate_core::processors::{
    EventDispatcher, EventSink, LogWatcher, OperatorWatcher, OperatorWatcherConfig, RuleUpdater,
    SaleStateTracker,
};
use pdvstate_core::rules::{RuleFetcher, RuleSet, RuleSource, RuleStore, RuleStoreWatcher};
use pdvstate_core::utils::{log_file_path, today_at};
use pdvstate_sdk::client::CollectorClient;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::UtcOffset;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Runtime settings that do not come from the terminal's config files.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub log_dir: PathBuf,
    pub marker_dir: PathBuf,
    /// Channel whose watcher drives the sale state machine.
    pub sale_channel: String,
    pub rule_update_interval: Duration,
    pub operator_interval: Duration,
    pub log_poll_interval: Duration,
    /// Used to pick today's log files.
    pub local_offset: UtcOffset,
}

/// Block until the local config and the initial rule set are available.
///
/// Retries every `retry_interval`. Returns `None` if shutdown is signaled
/// first.
pub async fn bootstrap(
    loader: &ConfigLoader,
    http: &reqwest::Client,
    retry_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<(AgentConfig, RuleSet)> {
    loop {
        match try_bootstrap(loader, http).await {
            Ok(ready) => return Some(ready),
            Err(e) => {
                warn!(error = %e, retry_in = ?retry_interval, "Startup failed, retrying");
            }
        }

        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return None;
                }
            }

            _ = tokio::time::sleep(retry_interval) => {}
        }
    }
}

async fn try_bootstrap(
    loader: &ConfigLoader,
    http: &reqwest::Client,
) -> anyhow::Result<(AgentConfig, RuleSet)> {
    let config = loader.load()?;
    let client = collector_client(&config, http);
    let rules = RuleFetcher::new(client).fetch().await?;
    info!(version = %rules.version, "Initial rules loaded");
    Ok((config, rules))
}

fn collector_client(config: &AgentConfig, http: &reqwest::Client) -> CollectorClient {
    CollectorClient::with_http_client(http.clone(), config.api_base_url.clone())
}

/// Start every long-running task and wait for all of them to finish.
///
/// One LogWatcher is started per channel of `initial_rules`; channels added
/// by later rule updates are not watched until restart.
pub async fn run_agent(
    config: AgentConfig,
    initial_rules: RuleSet,
    http: reqwest::Client,
    settings: &AgentSettings,
    shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        api = %config.api_base_url,
        store_id = config.store_id,
        terminal_id = config.terminal_id,
        "Configuration loaded"
    );

    let client = collector_client(&config, &http);
    let channels = initial_rules.channels();
    let store = RuleStore::new(initial_rules);
    let rule_changes = store.subscribe();
    let sink: Arc<dyn EventSink> = Arc::new(EventDispatcher::new(client.clone(), Arc::new(config)));

    let mut tasks = JoinSet::new();

    let updater = RuleUpdater::new(
        Arc::new(RuleFetcher::new(client)),
        store.clone(),
        settings.rule_update_interval,
    );
    tasks.spawn(updater.run(shutdown_rx.clone()));

    let operator_watcher = OperatorWatcher::new(
        OperatorWatcherConfig {
            marker_dir: settings.marker_dir.clone(),
            interval: settings.operator_interval,
            ..OperatorWatcherConfig::default()
        },
        sink.clone(),
    );
    tasks.spawn(operator_watcher.run(shutdown_rx.clone()));

    let watched: BTreeSet<String> = channels.iter().cloned().collect();
    tasks.spawn(report_unwatched_channels(
        store.clone(),
        rule_changes,
        watched,
        shutdown_rx.clone(),
    ));

    let today = today_at(settings.local_offset);
    let sale_tracker = Arc::new(SaleStateTracker::default());
    for channel in channels {
        let path = log_file_path(&settings.log_dir, &channel, today);
        let mut watcher = LogWatcher::new(channel.clone(), path, store.clone(), sink.clone())
            .with_poll_interval(settings.log_poll_interval);
        if channel == settings.sale_channel {
            watcher = watcher.with_sale_tracker(sale_tracker.clone());
        }

        let shutdown_rx = shutdown_rx.clone();
        tasks.spawn(async move {
            if let Err(e) = watcher.run(shutdown_rx).await {
                error!(%channel, error = %e, "Log watcher stopped");
            }
        });
    }

    info!(tasks = tasks.len(), "All watchers started");

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Agent task failed");
        }
    }
}

/// Warn whenever a rule update names channels that have no LogWatcher.
pub async fn report_unwatched_channels(
    store: RuleStore,
    mut rule_changes: RuleStoreWatcher,
    watched: BTreeSet<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            changed = rule_changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let rules = store.get().await;
                let unwatched = unwatched_channels(&rules, &watched);
                if !unwatched.is_empty() {
                    warn!(
                        version = %rules.version,
                        generation = store.generation(),
                        channels = ?unwatched,
                        "Rule update names channels without a watcher, restart to watch them"
                    );
                }
            }
        }
    }
}

/// Channels of `rules` missing from `watched`, sorted.
fn unwatched_channels(rules: &RuleSet, watched: &BTreeSet<String>) -> Vec<String> {
    rules
        .channels()
        .into_iter()
        .filter(|channel| !watched.contains(channel))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use pdvstate_core::rules::Rule;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;
    use url::Url;

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_gives_up_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(dir.path().join("agent.conf"), dir.path().join("pdv.conf"));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let ready = bootstrap(
            &loader,
            &reqwest::Client::new(),
            Duration::from_secs(60),
            &mut shutdown_rx,
        )
        .await;

        assert!(ready.is_none());
    }

    #[tokio::test]
    async fn test_matched_line_reaches_collector() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/pdv/event")
                    .json_body_partial(r#"{"loja_id": 12, "pdv_id": 201, "event_type": "ERROR_CODE", "data": {"code": "42"}}"#);
                then.status(200);
            })
            .await;

        let log_dir = TempDir::new().unwrap();
        let marker_dir = TempDir::new().unwrap();
        let settings = AgentSettings {
            log_dir: log_dir.path().to_path_buf(),
            marker_dir: marker_dir.path().to_path_buf(),
            sale_channel: "logpdv".to_string(),
            rule_update_interval: Duration::from_secs(3600),
            operator_interval: Duration::from_secs(3600),
            log_poll_interval: Duration::from_millis(10),
            local_offset: UtcOffset::UTC,
        };
        let path = log_file_path(&settings.log_dir, "log1", today_at(UtcOffset::UTC));
        std::fs::write(&path, "").unwrap();

        let config = AgentConfig::new("127.0.0.1", 12, 201)
            .unwrap()
            .with_api_base_url(Url::parse(&server.base_url()).unwrap());
        let rules = RuleSet {
            version: "1".to_string(),
            rules: HashMap::from([(
                "log1".to_string(),
                vec![Rule::compile("log1", r"ERR-(?P<code>\d+)", "ERROR_CODE")],
            )]),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let agent = tokio::spawn({
            let settings = settings.clone();
            async move {
                run_agent(config, rules, reqwest::Client::new(), &settings, shutdown_rx).await
            }
        });

        // Lines written before the watcher reaches the end of the file are
        // treated as old content, so keep appending until one is delivered.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        let mut delivered = false;
        for _ in 0..200 {
            file.write_all(b"2024 ERR-42 occurred\n").unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
            if mock.hits_async().await >= 1 {
                delivered = true;
                break;
            }
        }
        assert!(delivered, "no event reached the collector");

        shutdown_tx.send(true).unwrap();
        agent.await.unwrap();
    }

    fn rule_set(version: &str, channels: &[&str]) -> RuleSet {
        RuleSet {
            version: version.to_string(),
            rules: channels
                .iter()
                .map(|channel| (channel.to_string(), vec![Rule::compile(channel, "X", "EV")]))
                .collect(),
        }
    }

    #[test]
    fn test_unwatched_channels() {
        let watched = BTreeSet::from(["logpdv".to_string(), "logtef".to_string()]);

        assert!(unwatched_channels(&rule_set("1", &["logpdv", "logtef"]), &watched).is_empty());
        assert_eq!(
            unwatched_channels(&rule_set("2", &["logtef", "logecf", "logpdv", "logbal"]), &watched),
            vec!["logbal", "logecf"]
        );
    }

    #[tokio::test]
    async fn test_unwatched_channel_report_follows_store_until_shutdown() {
        let store = RuleStore::new(rule_set("1", &["logpdv"]));
        let rule_changes = store.subscribe();
        let watched = BTreeSet::from(["logpdv".to_string()]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(report_unwatched_channels(
            store.clone(),
            rule_changes,
            watched,
            shutdown_rx,
        ));

        store.replace(rule_set("2", &["logpdv", "logecf"])).await;
        tokio::task::yield_now().await;
        assert_eq!(store.generation(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
