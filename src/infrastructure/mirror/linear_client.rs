//! Linear GraphQL adapter for `domain::ports::mirror::MirrorClient`, grounded
//! on the teacher's `adapters/plugins/clickup/client.rs` REST-client
//! structure, translated to a single GraphQL endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as ReqwestClient;
use serde_json::{json, Value};
use std::time::Duration;

use crate::domain::error::MirrorError;
use crate::domain::ports::mirror::{InboundIssue, MirrorClient, MirrorIssueState};

const LINEAR_API_URL: &str = "https://api.linear.app/graphql";

pub struct LinearMirrorClient {
    http: ReqwestClient,
    api_key: String,
    team_id: String,
}

impl LinearMirrorClient {
    pub fn new(api_key: String, team_id: String) -> Result<Self, MirrorError> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MirrorError::RequestFailed(format!("failed to build http client: {e}")))?;
        Ok(Self { http, api_key, team_id })
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, MirrorError> {
        let response = self
            .http
            .post(LINEAR_API_URL)
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| MirrorError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::RequestFailed(format!("linear returned {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| MirrorError::RequestFailed(format!("failed to parse linear response: {e}")))?;

        if let Some(errors) = body.get("errors") {
            return Err(MirrorError::RequestFailed(format!("linear graphql errors: {errors}")));
        }

        Ok(body)
    }
}

#[async_trait]
impl MirrorClient for LinearMirrorClient {
    async fn create_project(&self, name: &str, description: &str) -> Result<String, MirrorError> {
        let query = "mutation CreateProject($input: ProjectCreateInput!) { \
            projectCreate(input: $input) { success project { id } } }";
        let variables = json!({
            "input": { "name": name, "description": description, "teamIds": [self.team_id] }
        });
        let body = self.graphql(query, variables).await?;
        body["data"]["projectCreate"]["project"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MirrorError::RequestFailed("projectCreate returned no id".to_string()))
    }

    async fn create_issue(&self, project_external_id: &str, title: &str, description: &str) -> Result<String, MirrorError> {
        let query = "mutation CreateIssue($input: IssueCreateInput!) { \
            issueCreate(input: $input) { success issue { id } } }";
        let variables = json!({
            "input": {
                "teamId": self.team_id,
                "projectId": project_external_id,
                "title": title,
                "description": description,
            }
        });
        let body = self.graphql(query, variables).await?;
        body["data"]["issueCreate"]["issue"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MirrorError::RequestFailed("issueCreate returned no id".to_string()))
    }

    async fn set_issue_state(&self, issue_external_id: &str, state: MirrorIssueState) -> Result<(), MirrorError> {
        let query = "mutation SetIssueState($id: String!, $stateId: String!) { \
            issueUpdate(id: $id, input: { stateId: $stateId }) { success } }";
        let variables = json!({ "id": issue_external_id, "stateId": state.as_str() });
        self.graphql(query, variables).await?;
        Ok(())
    }

    async fn post_comment(&self, issue_external_id: &str, body: &str) -> Result<(), MirrorError> {
        let query = "mutation CreateComment($input: CommentCreateInput!) { \
            commentCreate(input: $input) { success } }";
        let variables = json!({ "input": { "issueId": issue_external_id, "body": body } });
        self.graphql(query, variables).await?;
        Ok(())
    }

    async fn poll_recent_issues(&self, since: DateTime<Utc>) -> Result<Vec<InboundIssue>, MirrorError> {
        let query = "query RecentIssues($teamId: String!, $since: DateTimeOrDuration!) { \
            issues(filter: { team: { id: { eq: $teamId } }, createdAt: { gt: $since } }) { \
              nodes { id identifier title description url createdAt labels { nodes { id } } creator { id } } } }";
        let variables = json!({ "teamId": self.team_id, "since": since.to_rfc3339() });
        let body = self.graphql(query, variables).await?;

        let nodes = body["data"]["issues"]["nodes"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        nodes
            .into_iter()
            .map(|node| {
                let created_at = node["createdAt"]
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(since);
                let label_ids = node["labels"]["nodes"]
                    .as_array()
                    .map(|labels| labels.iter().filter_map(|l| l["id"].as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                Ok(InboundIssue {
                    external_id: node["id"].as_str().unwrap_or_default().to_string(),
                    title: node["title"].as_str().unwrap_or_default().to_string(),
                    description: node["description"].as_str().unwrap_or_default().to_string(),
                    creator_id: node["creator"]["id"].as_str().unwrap_or_default().to_string(),
                    label_ids,
                    url: node["url"].as_str().unwrap_or_default().to_string(),
                    identifier: node["identifier"].as_str().unwrap_or_default().to_string(),
                    created_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_succeeds() {
        let client = LinearMirrorClient::new("test-key".to_string(), "team-1".to_string());
        assert!(client.is_ok());
    }
}
