//! Handler contracts driven through mock implementations

use async_trait::async_trait;
use stackweave_chatbot::{
    dispatch_query, ChatRequest, ChatResponse, Citation, ContractError, HealthStatus, IngestionHandler,
    IngestionReport, QueryHandler,
};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct EchoHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl QueryHandler for EchoHandler {
    async fn answer(&self, request: ChatRequest) -> Result<ChatResponse, ContractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse {
            answer: format!("echo: {}", request.question.trim()),
            citations: vec![Citation {
                text: "기준금리 동결".to_string(),
                source: Some("s3://news/2025/01/rates.json".to_string()),
            }],
        })
    }
}

struct DownHandler;

#[async_trait]
impl QueryHandler for DownHandler {
    async fn answer(&self, _request: ChatRequest) -> Result<ChatResponse, ContractError> {
        Err(ContractError::Handler("knowledge base unavailable".to_string()))
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "degraded".to_string(),
        }
    }
}

struct CountingIngestion;

#[async_trait]
impl IngestionHandler for CountingIngestion {
    async fn ingest(&self) -> Result<IngestionReport, ContractError> {
        Ok(IngestionReport {
            documents_processed: 42,
            errors: vec!["article 17: missing body".to_string()],
        })
    }
}

#[tokio::test]
async fn test_dispatch_answers_valid_question() {
    let handler = EchoHandler::default();
    let response = dispatch_query(&handler, ChatRequest::new("  오늘 환율은?  ")).await.unwrap();

    assert_eq!(response.answer, "echo: 오늘 환율은?");
    assert_eq!(response.citations.len(), 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispatch_rejects_before_handler() {
    let handler = EchoHandler::default();
    let err = dispatch_query(&handler, ChatRequest::new("")).await.unwrap_err();

    assert_eq!(err, ContractError::EmptyQuestion);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dispatch_through_trait_object() {
    let handlers: Vec<Box<dyn QueryHandler>> = vec![Box::new(EchoHandler::default()), Box::new(DownHandler)];

    let first = dispatch_query(handlers[0].as_ref(), ChatRequest::new("hi")).await;
    let second = dispatch_query(handlers[1].as_ref(), ChatRequest::new("hi")).await;

    assert!(first.is_ok());
    assert_eq!(
        second.unwrap_err().to_string(),
        "handler failed: knowledge base unavailable"
    );
}

#[tokio::test]
async fn test_health_defaults_to_healthy() {
    assert_eq!(EchoHandler::default().health().await, HealthStatus::healthy());
    assert_eq!(DownHandler.health().await.status, "degraded");
}

#[tokio::test]
async fn test_ingestion_report_serializes() {
    let report = CountingIngestion.ingest().await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["documentsProcessed"], 42);
    assert_eq!(json["errors"][0], "article 17: missing body");
}

#[test]
fn test_response_omits_empty_citations() {
    let response = ChatResponse {
        answer: "ok".to_string(),
        citations: vec![],
    };
    assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"answer":"ok"}"#);
}
