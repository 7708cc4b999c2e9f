use std::env;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use exam_core::model::{
    Attempt, AttemptId, GradedAttempt, SanitizedQuestion, StudentId, SubmittedAnswer, TestId,
};

use crate::contract::SessionGateway;
use crate::dto::{ApiErrorBody, AttemptDto, GradedAttemptDto, QuestionDto, SubmissionRequest};
use crate::error::GatewayError;

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub auth_token: String,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token.into(),
        }
    }

    #[must_use]
    pub fn from_env() -> Option<Self> {
        let auth_token = env::var("PORTAL_API_TOKEN").ok()?;
        if auth_token.trim().is_empty() {
            return None;
        }
        let base_url =
            env::var("PORTAL_API_BASE_URL").unwrap_or_else(|_| "http://localhost:8080/api".into());
        Some(Self {
            base_url,
            auth_token,
        })
    }
}

/// REST-backed gateway bound to one authenticated test-taker.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
    actor: StudentId,
}

impl HttpGateway {
    #[must_use]
    pub fn new(config: GatewayConfig, actor: StudentId) -> Self {
        Self {
            client: Client::new(),
            config,
            actor,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Decodes a response body exactly once: success into `T`, failure into
    /// the structured error taxonomy.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| GatewayError::Decode(err.to_string()));
        }
        Err(Self::decode_failure(status, response).await)
    }

    async fn decode_failure(status: StatusCode, response: Response) -> GatewayError {
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(error_body) => error_body.into_gateway_error(),
            Err(_) => GatewayError::Server {
                code: status.as_u16().to_string(),
                message: body.chars().take(200).collect(),
            },
        }
    }
}

#[async_trait]
impl SessionGateway for HttpGateway {
    fn actor(&self) -> StudentId {
        self.actor
    }

    async fn find_in_progress(&self, test_id: TestId) -> Result<Option<Attempt>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/tests/{test_id}/attempts/in-progress")))
            .bearer_auth(&self.config.auth_token)
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let dto: AttemptDto = Self::decode(response).await?;
        dto.into_attempt().map(Some)
    }

    async fn start_attempt(&self, test_id: TestId) -> Result<Attempt, GatewayError> {
        let response = self
            .client
            .post(self.url(&format!("/tests/{test_id}/attempts")))
            .bearer_auth(&self.config.auth_token)
            .send()
            .await?;

        let dto: AttemptDto = Self::decode(response).await?;
        dto.into_attempt()
    }

    async fn fetch_questions(
        &self,
        test_id: TestId,
        attempt_id: AttemptId,
    ) -> Result<Vec<SanitizedQuestion>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!(
                "/tests/{test_id}/attempts/{attempt_id}/questions"
            )))
            .bearer_auth(&self.config.auth_token)
            .send()
            .await?;

        let dtos: Vec<QuestionDto> = Self::decode(response).await?;
        Ok(dtos.into_iter().map(QuestionDto::into_sanitized).collect())
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &[SubmittedAnswer],
        forced: bool,
    ) -> Result<GradedAttempt, GatewayError> {
        tracing::debug!(%attempt_id, forced, answers = answers.len(), "submitting attempt");
        let response = self
            .client
            .post(self.url(&format!("/attempts/{attempt_id}/submission")))
            .bearer_auth(&self.config.auth_token)
            .json(&SubmissionRequest { answers, forced })
            .send()
            .await?;

        let dto: GradedAttemptDto = Self::decode(response).await?;
        dto.into_graded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let gateway = HttpGateway::new(
            GatewayConfig::new("http://localhost:8080/api/", "token"),
            StudentId::new(1),
        );
        assert_eq!(
            gateway.url("/tests/3/attempts"),
            "http://localhost:8080/api/tests/3/attempts"
        );
    }
}
