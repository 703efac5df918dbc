//! Periodic live-game tracking.
//!
//! A [`LiveTracker`] polls the scoreboard, a single game or a game's betting
//! lines on a fixed
//! interval and publishes what it finds through the [`NotificationHub`].
//! Each poll drops the cached copy first, so listeners always see a fresh
//! network result, still subject to the throttle. Stopping the handle ends
//! the repetition.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::SportsApi;
use crate::hub::{LiveEvent, NotificationHub};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveTarget {
    Scoreboard,
    Game(String),
    Odds(String),
}

impl LiveTarget {
    fn url(&self, api: &SportsApi) -> String {
        match self {
            LiveTarget::Scoreboard => api.scoreboard_url(),
            LiveTarget::Game(event_id) => api.summary_url(event_id),
            LiveTarget::Odds(event_id) => api.odds_url(event_id),
        }
    }

    fn name(&self) -> String {
        match self {
            LiveTarget::Scoreboard => "scoreboard".to_string(),
            LiveTarget::Game(event_id) => format!("game {}", event_id),
            LiveTarget::Odds(event_id) => format!("odds {}", event_id),
        }
    }
}

pub struct LiveTracker;

impl LiveTracker {
    /// Starts polling `target` every `period`, beginning immediately.
    pub fn spawn(
        api: SportsApi,
        hub: NotificationHub,
        target: LiveTarget,
        period: Duration,
    ) -> LiveTrackerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            info!(tracked = %target.name(), period_secs = period.as_secs(), "Live tracking started");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::poll(&api, &hub, &target).await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
            info!(tracked = %target.name(), "Live tracking stopped");
        });

        LiveTrackerHandle {
            shutdown_tx,
            task,
        }
    }

    async fn poll(api: &SportsApi, hub: &NotificationHub, target: &LiveTarget) {
        api.client().invalidate(&target.url(api)).await;

        let event = match target {
            LiveTarget::Scoreboard => match api.fetch_scoreboard().await {
                Ok(games) => {
                    debug!(games = games.len(), "Scoreboard polled");
                    LiveEvent::ScoresUpdated { games }
                }
                Err(e) => Self::failure(target, &e),
            },
            LiveTarget::Game(event_id) => match api.fetch_game(event_id).await {
                Ok(Some(game)) => LiveEvent::GameUpdated {
                    event_id: event_id.clone(),
                    game,
                },
                Ok(None) => return,
                Err(e) => Self::failure(target, &e),
            },
            LiveTarget::Odds(event_id) => match api.fetch_game_odds(event_id).await {
                Ok(odds) => LiveEvent::OddsUpdated {
                    event_id: event_id.clone(),
                    odds,
                },
                Err(e) => Self::failure(target, &e),
            },
        };
        hub.notify(&event);
    }

    fn failure(target: &LiveTarget, error: &crate::api::FetchError) -> LiveEvent {
        warn!(tracked = %target.name(), error = %error, "Live poll failed");
        LiveEvent::RefreshFailed {
            source: target.name(),
            message: error.to_string(),
        }
    }
}

pub struct LiveTrackerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl LiveTrackerHandle {
    /// Stops future polls and waits for the task to exit. A poll already in
    /// flight finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Live tracking task ended abnormally");
        }
    }
}
