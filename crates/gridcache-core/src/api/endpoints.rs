//! Endpoint helpers for the two API base paths.
//!
//! The "site" path serves scoreboards, teams, rosters and game summaries;
//! the "core" path serves athlete statistics and odds. Each helper fetches
//! through the [`CachedClient`] and applies the entity checks from
//! [`crate::validate`], dropping records that fail them.

use serde_json::Value;
use tracing::{debug, warn};

use super::{CachedClient, FetchError, TtlPolicy};
use crate::config::ApiConfig;
use crate::store::Partition;
use crate::validate::{validate, Schema};

pub fn roster_key(team_id: &str) -> String {
    format!("roster_{}", team_id)
}

pub fn player_stats_key(athlete_id: &str) -> String {
    format!("player_fantasy_stats_{}", athlete_id)
}

#[derive(Clone)]
pub struct SportsApi {
    client: CachedClient,
    api: ApiConfig,
}

impl SportsApi {
    pub fn new(client: CachedClient, api: ApiConfig) -> Self {
        Self { client, api }
    }

    pub fn client(&self) -> &CachedClient {
        &self.client
    }

    // ===== URLs =====

    pub fn scoreboard_url(&self) -> String {
        format!("{}/scoreboard", self.api.site_base_url)
    }

    pub fn teams_url(&self) -> String {
        format!("{}/teams", self.api.site_base_url)
    }

    pub fn roster_url(&self, team_id: &str) -> String {
        format!("{}/teams/{}/roster", self.api.site_base_url, team_id)
    }

    pub fn summary_url(&self, event_id: &str) -> String {
        format!("{}/summary?event={}", self.api.site_base_url, event_id)
    }

    pub fn athlete_statistics_url(&self, athlete_id: &str) -> String {
        format!("{}/athletes/{}/statistics", self.api.core_base_url, athlete_id)
    }

    pub fn odds_url(&self, event_id: &str) -> String {
        format!(
            "{}/events/{}/competitions/{}/odds",
            self.api.core_base_url, event_id, event_id
        )
    }

    // ===== Fetching =====

    /// Games on the current scoreboard.
    pub async fn fetch_scoreboard(&self) -> Result<Vec<Value>, FetchError> {
        let data = self.client.fetch(&self.scoreboard_url()).await?;
        Ok(keep_valid(array_at(&data, "events"), Schema::Game, "scoreboard"))
    }

    /// Every team in the league.
    pub async fn fetch_teams(&self) -> Result<Vec<Value>, FetchError> {
        let data = self.client.fetch(&self.teams_url()).await?;
        let teams = data
            .pointer("/sports/0/leagues/0/teams")
            .and_then(Value::as_array)
            .map(|teams| {
                teams
                    .iter()
                    .map(|entry| entry.get("team").unwrap_or(entry).clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(keep_valid(teams, Schema::Team, "teams"))
    }

    /// Players on a team's roster. The list is mirrored into the `teams`
    /// partition under `roster_<teamId>`.
    pub async fn fetch_team_roster(&self, team_id: &str) -> Result<Vec<Value>, FetchError> {
        let data = self.client.fetch(&self.roster_url(team_id)).await?;

        // Rosters arrive either flat or grouped by unit (`{"items": [...]}`).
        let athletes = array_at(&data, "athletes")
            .into_iter()
            .flat_map(|group| match group.get("items").and_then(Value::as_array) {
                Some(items) => items.clone(),
                None => vec![group],
            })
            .collect();
        let players = keep_valid(athletes, Schema::Player, "roster");

        let ttl = TtlPolicy::Roster.resolve(self.client.ttl_config());
        let stored = self
            .client
            .store()
            .set_in(Partition::Teams, &roster_key(team_id), Value::Array(players.clone()), ttl)
            .await;
        if !stored {
            warn!(team_id, "Failed to mirror roster into store");
        }
        Ok(players)
    }

    /// Roster previously mirrored by [`SportsApi::fetch_team_roster`], without
    /// touching the network.
    pub async fn cached_roster(&self, team_id: &str) -> Option<Vec<Value>> {
        self.client
            .store()
            .get_as(Partition::Teams, &roster_key(team_id))
            .await
    }

    /// Season statistics for an athlete, mirrored into the `players`
    /// partition under `player_fantasy_stats_<id>`.
    pub async fn fetch_player_stats(&self, athlete_id: &str) -> Result<Value, FetchError> {
        let data = self
            .client
            .fetch(&self.athlete_statistics_url(athlete_id))
            .await?;

        let ttl = TtlPolicy::Statistics.resolve(self.client.ttl_config());
        if !self
            .client
            .store()
            .set_in(Partition::Players, &player_stats_key(athlete_id), data.clone(), ttl)
            .await
        {
            warn!(athlete_id, "Failed to mirror player statistics into store");
        }
        Ok(data)
    }

    /// Betting lines for a game.
    pub async fn fetch_game_odds(&self, event_id: &str) -> Result<Vec<Value>, FetchError> {
        let data = self.client.fetch(&self.odds_url(event_id)).await?;
        Ok(keep_valid(array_at(&data, "items"), Schema::Odds, "odds"))
    }

    /// Header of a game summary, or `None` when it does not look like a game.
    pub async fn fetch_game(&self, event_id: &str) -> Result<Option<Value>, FetchError> {
        let data = self.client.fetch(&self.summary_url(event_id)).await?;
        let header = data.get("header").cloned().unwrap_or(Value::Null);
        if validate(&header, Schema::Game) {
            Ok(Some(header))
        } else {
            warn!(event_id, "Game summary failed validation");
            Ok(None)
        }
    }
}

fn array_at(data: &Value, field: &str) -> Vec<Value> {
    data.get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn keep_valid(items: Vec<Value>, schema: Schema, what: &str) -> Vec<Value> {
    let total = items.len();
    let valid: Vec<Value> = items
        .into_iter()
        .filter(|item| validate(item, schema))
        .collect();
    if valid.len() < total {
        debug!(what, dropped = total - valid.len(), "Dropped records that failed validation");
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpResponse, Transport};
    use crate::config::{RetryConfig, ThrottleConfig, TtlConfig};
    use crate::store::{MemoryBackend, Store};
    use crate::throttle::Throttler;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Serves canned bodies by URL.
    struct FixtureTransport {
        bodies: HashMap<String, String>,
    }

    #[async_trait]
    impl Transport for FixtureTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
            Ok(match self.bodies.get(url) {
                Some(body) => HttpResponse {
                    status: 200,
                    body: body.clone(),
                },
                None => HttpResponse {
                    status: 404,
                    body: String::new(),
                },
            })
        }
    }

    fn api_with(fixtures: Vec<(String, Value)>) -> SportsApi {
        let transport = FixtureTransport {
            bodies: fixtures
                .into_iter()
                .map(|(url, body)| (url, body.to_string()))
                .collect(),
        };
        let store = Arc::new(Store::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
        ));
        let throttler = Arc::new(Throttler::new(ThrottleConfig {
            spacing_ms: 0,
            ..Default::default()
        }));
        let client = CachedClient::new(
            store,
            throttler,
            Arc::new(transport),
            RetryConfig {
                max_retries: 1,
                ..Default::default()
            },
            TtlConfig::default(),
        );
        SportsApi::new(client, ApiConfig::default())
    }

    fn base() -> SportsApi {
        api_with(vec![])
    }

    #[test]
    fn test_urls_use_both_base_paths() {
        let api = base();
        assert!(api.scoreboard_url().starts_with(&ApiConfig::default().site_base_url));
        assert!(api.roster_url("12").ends_with("/teams/12/roster"));
        assert!(api.summary_url("401").ends_with("/summary?event=401"));
        assert!(api.athlete_statistics_url("3").starts_with(&ApiConfig::default().core_base_url));
        assert!(api.odds_url("401").ends_with("/events/401/competitions/401/odds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grouped_roster_is_flattened_and_mirrored() {
        let url = base().roster_url("12");
        let api = api_with(vec![(
            url,
            json!({
                "athletes": [
                    {"position": "offense", "items": [
                        {"id": "1", "fullName": "Quarterback"},
                        {"id": "2", "fullName": "Receiver"}
                    ]},
                    {"position": "defense", "items": [{"note": "no identity"}]}
                ]
            }),
        )]);

        let players = api.fetch_team_roster("12").await.expect("roster fetch");
        assert_eq!(players.len(), 2);
        assert_eq!(api.cached_roster("12").await, Some(players));
        assert_eq!(api.cached_roster("13").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teams_are_unwrapped() {
        let url = base().teams_url();
        let api = api_with(vec![(
            url,
            json!({"sports": [{"leagues": [{"teams": [
                {"team": {"id": "1", "abbreviation": "ATL"}},
                {"team": {"id": "2", "abbreviation": "BUF"}}
            ]}]}]}),
        )]);

        let teams = api.fetch_teams().await.expect("teams fetch");
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[1]["abbreviation"], "BUF");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_game_header_yields_none() {
        let url = base().summary_url("9");
        let api = api_with(vec![(url, json!({"header": {"season": 2024}}))]);
        assert_eq!(api.fetch_game("9").await.expect("summary fetch"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_stats_are_mirrored() {
        let url = base().athlete_statistics_url("3");
        let api = api_with(vec![(url, json!({"splits": {"categories": []}}))]);

        let stats = api.fetch_player_stats("3").await.expect("stats fetch");
        let mirrored: Option<Value> = api
            .client()
            .store()
            .get_as(Partition::Players, &player_stats_key("3"))
            .await;
        assert_eq!(mirrored, Some(stats));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_endpoint_propagates_error() {
        let api = base();
        assert!(api.fetch_game_odds("404").await.is_err());
    }
}
