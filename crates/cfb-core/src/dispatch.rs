//! Poll-and-dispatch loop for news alerts.
//!
//! One tick: fetch the single newest item → consult the dedup gate → if new,
//! fan the rendered alert out to every subscriber, pruning recipients whose
//! delivery failed. Ticks fire on a fixed interval after a short initial
//! delay; upstream failures are logged and wait for the next tick.
//!
//! Behaviour worth knowing when reading the logs:
//! - The first tick after a restart only seeds the cursor. Nothing is sent
//!   unless a different item shows up on a later tick.
//! - Only the newest item is looked at per tick, so items published and
//!   superseded between two polls are skipped.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    dedup::DedupGate,
    domain::{ChatId, Item},
    feed::{FeedQuery, FeedSource},
    formatting::{render_notification, truncate_message},
    messaging::{port::MessagingPort, types::DeliveryFailure},
    registry::SubscriberRegistry,
    Error, Result,
};

/// The dedup poll only ever looks at the newest item.
const POLL_COUNT: usize = 1;

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub topic: String,
    pub language: String,
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub feed_timeout: Duration,
    pub delivery_timeout: Duration,
    pub fan_out_concurrency: usize,
    pub prune_after_transient_failures: u32,
    pub dedup_history: usize,
}

impl DispatchSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            topic: cfg.news_topic.clone(),
            language: cfg.news_language.clone(),
            poll_interval: cfg.poll_interval,
            initial_delay: cfg.initial_delay,
            feed_timeout: cfg.feed_timeout,
            delivery_timeout: cfg.delivery_timeout,
            fan_out_concurrency: cfg.fan_out_concurrency.max(1),
            prune_after_transient_failures: cfg.prune_after_transient_failures,
            dedup_history: cfg.dedup_history,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Fetching,
    Deciding,
    Dispatching,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub item_id: String,
    pub attempted: usize,
    pub delivered: Vec<ChatId>,
    pub failed: Vec<(ChatId, DeliveryFailure)>,
    pub removed: Vec<ChatId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Feed errored or timed out; retried on the next tick.
    FeedFailed,
    /// Feed answered with no items.
    FeedEmpty,
    /// Cold start: cursor seeded with this item, nothing sent.
    Seeded { item_id: String },
    /// Newest item already seen.
    Unchanged { item_id: String },
    Dispatched(FanOutReport),
}

pub struct DispatchLoop {
    settings: DispatchSettings,
    registry: Arc<SubscriberRegistry>,
    feed: Arc<dyn FeedSource>,
    messenger: Arc<dyn MessagingPort>,
    gate: DedupGate,
    // Consecutive transient failures per recipient, reset on success.
    strikes: HashMap<ChatId, u32>,
    phase: DispatchPhase,
}

impl DispatchLoop {
    pub fn new(
        settings: DispatchSettings,
        registry: Arc<SubscriberRegistry>,
        feed: Arc<dyn FeedSource>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let gate = DedupGate::new(settings.dedup_history);
        Self {
            settings,
            registry,
            feed,
            messenger,
            gate,
            strikes: HashMap::new(),
            phase: DispatchPhase::Idle,
        }
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn gate(&self) -> &DedupGate {
        &self.gate
    }

    /// Run the loop on the current runtime until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let start = Instant::now() + self.settings.initial_delay;
        let mut ticker = interval_at(start, self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            topic = %self.settings.topic,
            initial_delay_secs = self.settings.initial_delay.as_secs(),
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Dispatch loop started"
        );

        loop {
            tokio::select! {
              biased;
              _ = cancel.cancelled() => break,
              _ = ticker.tick() => {
                self.tick().await;
              }
            }
        }

        tracing::info!("Dispatch loop stopped");
    }

    /// Execute one fetch → decide → dispatch cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        self.phase = DispatchPhase::Fetching;
        let fetched = self.fetch_newest().await;

        self.phase = DispatchPhase::Deciding;
        let outcome = match fetched {
            Err(e) => {
                tracing::warn!(error = %e, "Feed fetch failed, retrying next tick");
                TickOutcome::FeedFailed
            }
            Ok(None) => {
                tracing::info!(topic = %self.settings.topic, "Feed returned no items");
                TickOutcome::FeedEmpty
            }
            Ok(Some(item)) => self.decide(item).await,
        };

        self.phase = DispatchPhase::Idle;
        outcome
    }

    async fn decide(&mut self, item: Item) -> TickOutcome {
        if !self.gate.is_new(&item) {
            tracing::debug!(item_id = %item.id, "Newest item already dispatched");
            return TickOutcome::Unchanged { item_id: item.id };
        }

        let cold_start = !self.gate.is_seeded();
        // Advance before fan-out so a crash or slow fan-out can't re-trigger this item.
        self.gate.advance(&item);

        if cold_start {
            tracing::info!(
                item_id = %item.id,
                "Seeded dedup cursor on first tick, notification suppressed"
            );
            return TickOutcome::Seeded { item_id: item.id };
        }

        let limit = self.messenger.capabilities().max_message_len;
        let message = truncate_message(&render_notification(&item), limit);

        self.phase = DispatchPhase::Dispatching;
        let report = self.fan_out(&item, message).await;
        tracing::info!(
            item_id = %report.item_id,
            attempted = report.attempted,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            removed = report.removed.len(),
            "Notification dispatched"
        );
        TickOutcome::Dispatched(report)
    }

    async fn fetch_newest(&self) -> Result<Option<Item>> {
        let query = FeedQuery::new(
            self.settings.topic.clone(),
            self.settings.language.clone(),
            POLL_COUNT,
        );
        let items = timeout(self.settings.feed_timeout, self.feed.fetch(&query))
            .await
            .map_err(|_| {
                Error::Feed(format!(
                    "timed out after {}ms",
                    self.settings.feed_timeout.as_millis()
                ))
            })??;
        Ok(items.into_iter().next())
    }

    async fn fan_out(&mut self, item: &Item, message: String) -> FanOutReport {
        let recipients = self.registry.snapshot().await;
        let message: Arc<str> = Arc::from(message);
        let permits = Arc::new(Semaphore::new(self.settings.fan_out_concurrency));

        let mut attempts = Vec::with_capacity(recipients.len());
        for chat_id in recipients.iter().copied() {
            let messenger = self.messenger.clone();
            let message = message.clone();
            let permits = permits.clone();
            let delivery_timeout = self.settings.delivery_timeout;
            let handle = tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(DeliveryFailure::transient("fan-out aborted"));
                };
                match timeout(delivery_timeout, messenger.send_html(chat_id, &message)).await {
                    Ok(res) => res,
                    Err(_) => Err(DeliveryFailure::transient(format!(
                        "timed out after {}ms",
                        delivery_timeout.as_millis()
                    ))),
                }
            });
            attempts.push((chat_id, handle));
        }

        let mut report = FanOutReport {
            item_id: item.id.clone(),
            attempted: recipients.len(),
            ..FanOutReport::default()
        };

        for (chat_id, handle) in attempts {
            let result = match handle.await {
                Ok(res) => res,
                Err(e) => Err(DeliveryFailure::transient(format!("delivery task failed: {e}"))),
            };
            match result {
                Ok(()) => report.delivered.push(chat_id),
                Err(failure) => {
                    tracing::warn!(
                        chat_id = %chat_id,
                        permanent = failure.permanent,
                        reason = %failure.reason,
                        "Delivery failed"
                    );
                    report.failed.push((chat_id, failure));
                }
            }
        }

        let to_prune = self.record_failures(&recipients, &report);
        if !to_prune.is_empty() {
            report.removed = self.registry.remove_all(&to_prune).await;
            for chat_id in &report.removed {
                self.strikes.remove(chat_id);
                tracing::info!(chat_id = %chat_id, "Pruned unreachable subscriber");
            }
        }

        report
    }

    /// Update the strike counts and return the recipients to prune.
    ///
    /// Permanent failures prune at once. Transient ones (outages, flood
    /// control, timeouts) prune only after the configured number of
    /// consecutive failures; with the default of 0 they never do.
    fn record_failures(&mut self, recipients: &[ChatId], report: &FanOutReport) -> Vec<ChatId> {
        // `recipients` is sorted.
        self.strikes
            .retain(|chat_id, _| recipients.binary_search(chat_id).is_ok());
        for chat_id in &report.delivered {
            self.strikes.remove(chat_id);
        }

        let threshold = self.settings.prune_after_transient_failures;
        let mut to_prune = Vec::new();
        for (chat_id, failure) in &report.failed {
            if failure.permanent {
                to_prune.push(*chat_id);
                continue;
            }
            let strikes = self.strikes.entry(*chat_id).or_insert(0);
            *strikes += 1;
            if threshold > 0 && *strikes >= threshold {
                to_prune.push(*chat_id);
            }
        }
        to_prune
    }
}
