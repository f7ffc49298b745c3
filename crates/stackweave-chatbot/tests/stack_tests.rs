//! End-to-end synthesis of the chatbot stack

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use stackweave_chatbot::config::{PERPLEXITY_API_KEY, INGESTION_CADENCE_MINUTES};
use stackweave_chatbot::stack::*;
use stackweave_chatbot::{synthesize_stack, ConfigError, ConfigOverlay, StackConfig, StackError, StackVariant};
use stackweave_core::prelude::*;
use stackweave_test_utils::assert_respects_edges;
use std::collections::HashMap;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn ingestion_artifact() -> Artifact {
    synthesize_stack(&env(&[(PERPLEXITY_API_KEY, "pplx-test")]), None, StackVariant::Ingestion).unwrap()
}

#[test]
fn test_missing_api_key_fails_before_declaration() {
    let err = synthesize_stack(&env(&[]), None, StackVariant::Ingestion).unwrap_err();
    assert!(matches!(
        err,
        StackError::Config(ConfigError::MissingVariable { name: "PERPLEXITY_API_KEY" })
    ));
}

#[test]
fn test_config_errors_reported_together() {
    let err = synthesize_stack(&env(&[(INGESTION_CADENCE_MINUTES, "0")]), None, StackVariant::Ingestion).unwrap_err();
    let StackError::Config(config) = &err else {
        panic!("expected config error, got {err:?}");
    };
    assert!(matches!(config, ConfigError::Multiple(errors) if errors.len() == 2));
}

#[test]
fn test_zero_cadence_rejected_as_config() {
    let err = synthesize_stack(
        &env(&[(PERPLEXITY_API_KEY, "k"), (INGESTION_CADENCE_MINUTES, "0")]),
        None,
        StackVariant::Ingestion,
    )
    .unwrap_err();
    assert!(matches!(err, StackError::Config(ConfigError::InvalidValue { .. })));
}

#[test]
fn test_ingestion_stack_order() {
    let artifact = ingestion_artifact();
    assert_respects_edges(&artifact);
    assert!(artifact.verify_digest());

    let pos = |id: &str| artifact.position(id).unwrap();
    assert!(pos(INGESTION_SECRET) < pos(FETCHER_ROLE));
    assert!(pos(DATA_BUCKET) < pos(FETCHER_ROLE));
    assert!(pos(FETCHER_ROLE) < pos(FETCHER_FUNCTION));
    assert!(pos(FETCHER_FUNCTION) < pos(FETCH_SCHEDULE));
    assert!(pos(CHATBOT_FUNCTION) < pos(CHATBOT_API));
    assert!(pos(WEBSITE_BUCKET) < pos(WEBSITE_DISTRIBUTION));
    assert!(pos(PERPLEXITY_SECRET) < pos(CHATBOT_ROLE));
    assert_eq!(artifact.ordered_nodes.len(), 11);
}

#[test]
fn test_fetcher_environment_resolved() {
    let artifact = ingestion_artifact();
    let fetcher = artifact.node(FETCHER_FUNCTION).unwrap();
    let secret = artifact.node(INGESTION_SECRET).unwrap().ordinal;
    let data = artifact.node(DATA_BUCKET).unwrap().ordinal;

    assert_eq!(
        fetcher.properties["environment"],
        serde_json::json!({
            "BIGKINDS_API_SECRET_ARN": format!("${{{secret}:ingestion-secret.handle}}"),
            "DATA_BUCKET_NAME": format!("${{{data}:data-bucket.name}}"),
            "DATA_SOURCE_ID": "W8DS8YQGZG",
            "KNOWLEDGE_BASE_ID": "PGQV3JXPET",
        })
    );
    assert_eq!(fetcher.properties["contract"], "ingestion");
}

#[test]
fn test_schedule_fires_every_ten_minutes() {
    let artifact = ingestion_artifact();
    let schedule = artifact.node(FETCH_SCHEDULE).unwrap();
    assert_eq!(schedule.properties["cadenceSeconds"], 600);
    assert_eq!(schedule.properties["expression"], "rate(10 minutes)");

    let invoke = artifact
        .policies
        .iter()
        .find(|p| matches!(p.origin, PolicyOrigin::ScheduleInvoke { .. }))
        .unwrap();
    let actions: Vec<_> = invoke.statements[0].actions.iter().map(String::as_str).collect();
    assert_eq!(actions, vec!["lambda:InvokeFunction"]);
}

#[test]
fn test_routes_share_one_invoke_grant() {
    let artifact = ingestion_artifact();
    let routes: Vec<_> = artifact.routes.iter().map(|r| (r.method, r.path.as_str())).collect();
    assert_eq!(routes, vec![(HttpMethod::Post, "/chat"), (HttpMethod::Get, "/health")]);
    assert!(artifact.routes.iter().all(|r| r.cors.is_some()));

    let route_grants = artifact
        .policies
        .iter()
        .filter(|p| matches!(p.origin, PolicyOrigin::RouteInvoke { .. }))
        .count();
    assert_eq!(route_grants, 1);
}

#[test]
fn test_every_broad_grant_is_justified() {
    let artifact = ingestion_artifact();
    let report = &artifact.broad_grant_report;
    assert_eq!(report.len(), 2);
    assert_eq!(report.unjustified().count(), 0);

    let principals: Vec<_> = report.entries().iter().map(|g| g.principal.as_str()).collect();
    assert_eq!(principals, vec![CHATBOT_ROLE, FETCHER_ROLE]);
}

#[test]
fn test_outputs() {
    let artifact = ingestion_artifact();
    let names: Vec<_> = artifact.outputs.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "ApiUrl",
            "WebsiteUrl",
            "KnowledgeBaseId",
            "ChatbotFunctionName",
            "WebsiteBucket",
            "IngestionSecretHandle",
        ]
    );

    let cdn = artifact.node(WEBSITE_DISTRIBUTION).unwrap().ordinal;
    let website = artifact.output("WebsiteUrl").unwrap();
    assert_eq!(website.value, format!("https://${{{cdn}:website-distribution.hostname}}"));
    assert_eq!(website.export_name.as_deref(), Some("NewsChatbotWebsiteUrl"));
}

#[test]
fn test_standalone_reads_external_bucket() {
    let artifact = stackweave_chatbot::synthesize_with(
        &StackConfig::new().with_api_key("k"),
        StackVariant::Standalone,
    )
    .unwrap();
    assert_eq!(artifact.ordered_nodes.len(), 6);

    let role = artifact
        .policies
        .iter()
        .find(|p| p.principal.as_str() == CHATBOT_ROLE)
        .unwrap();
    let resources: Vec<_> = role.statements.iter().flat_map(|s| s.resources.clone()).collect();
    assert!(resources.contains(&serde_json::json!(format!("{STANDALONE_DATA_BUCKET_ARN}/*"))));
    assert_eq!(artifact.broad_grant_report.len(), 1);
}

#[test]
fn test_overlay_tags_reach_artifact() {
    let overlay = ConfigOverlay::from_toml_str("[tags]\nEnvironment = \"Staging\"\n").unwrap();
    let artifact = synthesize_stack(
        &env(&[(PERPLEXITY_API_KEY, "k")]),
        Some(&overlay),
        StackVariant::Ingestion,
    )
    .unwrap();
    assert_eq!(artifact.tags["Environment"], "Staging");
    assert_eq!(artifact.tags["Project"], "News Chatbot");
}

#[test]
fn test_api_key_never_reaches_artifact() {
    for variant in [StackVariant::Ingestion, StackVariant::Standalone] {
        let artifact = synthesize_stack(&env(&[(PERPLEXITY_API_KEY, "pplx-do-not-leak")]), None, variant).unwrap();
        assert!(!artifact.to_json_pretty().unwrap().contains("pplx-do-not-leak"));

        let secret = artifact.node(PERPLEXITY_SECRET).unwrap();
        assert_eq!(secret.properties["seedFromEnvironment"], "PERPLEXITY_API_KEY");
        let chatbot = artifact.node(CHATBOT_FUNCTION).unwrap();
        assert_eq!(
            chatbot.properties["environment"]["PERPLEXITY_API_KEY_SECRET_ARN"],
            format!("${{{}:perplexity-secret.handle}}", secret.ordinal)
        );
    }
}

#[test]
fn test_chatbot_reads_its_secret_only() {
    let artifact = ingestion_artifact();
    let secret = artifact.node(PERPLEXITY_SECRET).unwrap().ordinal;
    let role = artifact
        .policies
        .iter()
        .find(|p| p.principal.as_str() == CHATBOT_ROLE)
        .unwrap();

    let secret_statement = role
        .statements
        .iter()
        .find(|s| s.actions.contains("secretsmanager:GetSecretValue"))
        .unwrap();
    assert_eq!(
        secret_statement.resources,
        vec![serde_json::json!(format!("${{{secret}:perplexity-secret.handle}}"))]
    );
}

#[test]
fn test_retrieval_scoped_to_knowledge_base() {
    for variant in [StackVariant::Ingestion, StackVariant::Standalone] {
        let config = StackConfig::new().with_api_key("k").with_account("123456789012");
        let artifact = stackweave_chatbot::synthesize_with(&config, variant).unwrap();
        let role = artifact
            .policies
            .iter()
            .find(|p| p.principal.as_str() == CHATBOT_ROLE)
            .unwrap();

        let retrieval = role
            .statements
            .iter()
            .find(|s| s.actions.contains("bedrock:Retrieve"))
            .unwrap();
        assert_eq!(
            retrieval.resources,
            vec![serde_json::json!(
                "arn:aws:bedrock:ap-northeast-2:123456789012:knowledge-base/PGQV3JXPET"
            )]
        );

        let broad = &artifact.broad_grant_report.entries()[0];
        assert_eq!(broad.principal.as_str(), CHATBOT_ROLE);
        assert_eq!(broad.actions, vec!["bedrock:InvokeModel".to_string()]);
    }
}

#[test]
fn test_logs_are_retained_for_a_week() {
    let artifact = ingestion_artifact();
    for function in [CHATBOT_FUNCTION, FETCHER_FUNCTION] {
        assert_eq!(artifact.node(function).unwrap().properties["logRetentionDays"], 7);
    }

    let api = artifact.node(CHATBOT_API).unwrap();
    assert_eq!(api.properties["logging"]["accessLogFormat"], "json-standard-fields");
    assert_eq!(api.properties["logging"]["accessLogRetentionDays"], 7);
    let suppressed: Vec<_> = api.properties["suppressedChecks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|check| check["id"].as_str().unwrap())
        .collect();
    assert_eq!(suppressed, vec!["AwsSolutions-APIG2", "AwsSolutions-COG4"]);
}

#[test]
fn test_api_key_not_in_config_dump() {
    let config = StackConfig::new().with_api_key("pplx-secret");
    let dump = serde_json::to_string(&config).unwrap();
    assert!(!dump.contains("pplx-secret"));
}

proptest! {
    #[test]
    fn prop_cadence_sets_schedule(minutes in 1u64..=1440) {
        let config = StackConfig::new().with_api_key("k").with_cadence_minutes(minutes);
        let artifact = stackweave_chatbot::synthesize_with(&config, StackVariant::Ingestion).unwrap();
        let schedule = artifact.node(FETCH_SCHEDULE).unwrap();
        prop_assert_eq!(schedule.properties["cadenceSeconds"].as_u64(), Some(minutes * 60));
    }

    #[test]
    fn prop_synthesis_is_repeatable(variant in prop_oneof![Just(StackVariant::Ingestion), Just(StackVariant::Standalone)]) {
        let config = StackConfig::new().with_api_key("k");
        let first = stackweave_chatbot::synthesize_with(&config, variant).unwrap();
        let second = stackweave_chatbot::synthesize_with(&config, variant).unwrap();
        prop_assert_eq!(first.digest, second.digest);
    }
}
