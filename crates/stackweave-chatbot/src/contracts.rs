//! Compute-function contracts
//!
//! The chatbot and ingestion functions are opaque to synthesis; only their
//! input and output shapes are fixed here. A function node declares the
//! contract it implements through its `contract` property.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node property naming the contract a function implements
pub const CONTRACT_PROPERTY: &str = "contract";

/// Longest accepted question, in characters
pub const MAX_QUESTION_CHARS: usize = 1000;

/// Contract implemented by a compute function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contract {
    /// Answers questions and health checks behind the api
    Query,
    /// Collects documents and syncs the knowledge base on a schedule
    Ingestion,
}

impl Contract {
    /// Property value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Ingestion => "ingestion",
        }
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Contract {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Self::Query),
            "ingestion" => Ok(Self::Ingestion),
            other => Err(ContractError::UnknownContract(other.to_string())),
        }
    }
}

/// Contract-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    /// Question missing or blank
    #[error("question is required")]
    EmptyQuestion,

    /// Question over the length limit
    #[error("question has {chars} characters, limit is {limit}")]
    QuestionTooLong { chars: usize, limit: usize },

    /// Contract name not recognized
    #[error("unknown contract `{0}`")]
    UnknownContract(String),

    /// Handler reported a failure
    #[error("handler failed: {0}")]
    Handler(String),
}

/// Query input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// User question
    pub question: String,
    /// Earlier turns, if the client keeps them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_context: Option<String>,
}

impl ChatRequest {
    /// Request for `question`
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_context: None,
        }
    }

    /// Trimmed question, checked against the contract
    ///
    /// # Errors
    /// `EmptyQuestion` or `QuestionTooLong`.
    pub fn validated_question(&self) -> Result<&str, ContractError> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(ContractError::EmptyQuestion);
        }
        let chars = question.chars().count();
        if chars > MAX_QUESTION_CHARS {
            return Err(ContractError::QuestionTooLong {
                chars,
                limit: MAX_QUESTION_CHARS,
            });
        }
        Ok(question)
    }
}

/// A source backing part of an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Quoted text
    pub text: String,
    /// Location of the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Query output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated answer
    pub answer: String,
    /// Supporting sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

/// Health output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"healthy"` when serving
    pub status: String,
}

impl HealthStatus {
    /// Serving
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Ingestion output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    /// Documents written to the data store
    pub documents_processed: u64,
    /// Per-document failures
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Handler behind `POST /chat` and `GET /health`
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Answer a validated question
    async fn answer(&self, request: ChatRequest) -> Result<ChatResponse, ContractError>;

    /// Health check
    async fn health(&self) -> HealthStatus {
        HealthStatus::healthy()
    }
}

/// Handler fired by the ingestion schedule
#[async_trait]
pub trait IngestionHandler: Send + Sync {
    /// Run one ingestion pass
    async fn ingest(&self) -> Result<IngestionReport, ContractError>;
}

/// Validate `request`, then hand it to `handler`
///
/// # Errors
/// Validation errors, or whatever the handler returns.
pub async fn dispatch_query<H>(handler: &H, request: ChatRequest) -> Result<ChatResponse, ContractError>
where
    H: QueryHandler + ?Sized,
{
    request.validated_question()?;
    handler.answer(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_form() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"question":"금리 전망은?","conversationContext":"earlier"}"#).unwrap();
        assert_eq!(request.question, "금리 전망은?");
        assert_eq!(request.conversation_context.as_deref(), Some("earlier"));
    }

    #[test]
    fn test_question_limits() {
        assert_eq!(ChatRequest::new("   ").validated_question(), Err(ContractError::EmptyQuestion));
        let long = "가".repeat(MAX_QUESTION_CHARS + 1);
        assert!(matches!(
            ChatRequest::new(long).validated_question(),
            Err(ContractError::QuestionTooLong { chars: 1001, .. })
        ));
        assert_eq!(ChatRequest::new(" hi ").validated_question(), Ok("hi"));
    }

    #[test]
    fn test_ingestion_report_wire_form() {
        let report = IngestionReport {
            documents_processed: 3,
            errors: vec![],
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({ "documentsProcessed": 3, "errors": [] })
        );
    }

    #[test]
    fn test_contract_names_round_trip() {
        for contract in [Contract::Query, Contract::Ingestion] {
            assert_eq!(contract.as_str().parse::<Contract>(), Ok(contract));
        }
        assert!("batch".parse::<Contract>().is_err());
    }
}
