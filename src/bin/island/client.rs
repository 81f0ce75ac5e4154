//! Island Rewards API Client

use anyhow::{anyhow, Result};
use island_rewards::{ProofOfWorkChallenge, ProofOfWorkSolution};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
pub struct ChallengeRequest<'a> {
    pub pubkey: &'a str,
    pub score: u64,
    pub level: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: ProofOfWorkChallenge,
    pub estimated_solve_time: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimRequest<'a> {
    pub pubkey: &'a str,
    pub score: u64,
    pub solution: &'a ProofOfWorkSolution,
}

#[derive(Debug, Deserialize)]
pub struct ClaimResponse {
    pub claim_id: String,
    pub amount: u64,
    pub tier: String,
    pub lnurl: String,
    pub qr_code_url: String,
    pub pull_payment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub claimed_scores: Vec<u64>,
    pub attempts_last_hour: u32,
    pub rate_limited: bool,
}

#[derive(Debug, Deserialize)]
pub struct TierEntry {
    pub min_score: u64,
    pub max_score: Option<u64>,
    pub satoshis: u64,
    pub description: String,
}

pub struct RewardsClient {
    client: Client,
    base_url: String,
}

impl RewardsClient {
    pub fn new(server_url: &str) -> Self {
        // Build HTTP client with timeout, falling back to default client if builder fails
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn request_challenge(&self, request: &ChallengeRequest<'_>) -> Result<ChallengeResponse> {
        let resp = self.client.post(self.url("challenge")).json(request).send().await?;
        parse(resp, "Challenge request failed").await
    }

    pub async fn claim(&self, request: &ClaimRequest<'_>) -> Result<ClaimResponse> {
        let resp = self.client.post(self.url("claim")).json(request).send().await?;
        parse(resp, "Claim failed").await
    }

    pub async fn get_status(&self, pubkey: &str) -> Result<StatusResponse> {
        let resp = self
            .client
            .get(self.url(&format!("status/{}", pubkey)))
            .send()
            .await?;
        parse(resp, "Failed to fetch status").await
    }

    pub async fn get_tiers(&self) -> Result<Vec<TierEntry>> {
        let resp = self.client.get(self.url("rewards/tiers")).send().await?;
        let data: serde_json::Value = parse(resp, "Failed to fetch tiers").await?;
        match data.get("tiers") {
            Some(tiers) => Ok(serde_json::from_value(tiers.clone())?),
            None => Ok(vec![]),
        }
    }

    pub async fn get_config(&self) -> Result<serde_json::Value> {
        let resp = self.client.get(self.url("config")).send().await?;
        parse(resp, "Failed to fetch config").await
    }
}

/// Decode a success body, or turn the server's `{"error": ...}` into an error.
async fn parse<T: serde::de::DeserializeOwned>(resp: Response, context: &str) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let body = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(anyhow!("{} ({}): {}", context, status, message))
}
