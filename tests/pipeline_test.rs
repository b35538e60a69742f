mod common;

use common::*;
use nl_analyst::config::AgentConfig;
use nl_analyst::llm::LlmManager;
use nl_analyst::pipeline::{QueryOptions, QueryPipeline};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn pipeline(
    history: Arc<StubHistory>,
    generator: Arc<StubGenerator>,
    executor: Arc<StubExecutor>,
    config: AgentConfig,
) -> QueryPipeline {
    let llm = Arc::new(LlmManager::with_generator(Box::new(SharedGenerator(
        generator,
    ))));
    QueryPipeline::new(history, llm, executor, config)
}

#[tokio::test]
async fn approval_gate_blocks_execution_and_storage() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(2, 0.05));
    let pipeline = pipeline(history.clone(), generator.clone(), executor.clone(), agent_config());

    let response = pipeline
        .run("how many customers churned", QueryOptions::default())
        .await
        .unwrap();

    assert!(response.requires_approval);
    assert!(!response.approved);
    assert!(response.awaiting_approval);
    assert_eq!(response.was_successful, None);
    assert_eq!(response.execution_time, 0.0);
    assert_eq!(response.sql, "SELECT 1");
    assert!(response.results.is_none());

    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    assert!(history.upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn approved_call_regenerates_sql() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::varying("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let pipeline = pipeline(history, generator.clone(), executor, agent_config());

    let preview = pipeline
        .run("weekly signups", QueryOptions::default())
        .await
        .unwrap();

    let approved = pipeline
        .run(
            "weekly signups",
            QueryOptions { approved: true, ..QueryOptions::default() },
        )
        .await
        .unwrap();

    // SQL is not cached between the preview and the approved call.
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_ne!(preview.sql, approved.sql);
}

#[tokio::test]
async fn reuse_previewed_sql_executes_the_previewed_statement() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::varying("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let config = AgentConfig { reuse_previewed_sql: true, ..agent_config() };
    let pipeline = pipeline(history, generator.clone(), executor, config);

    let preview = pipeline
        .run("weekly signups", QueryOptions::default())
        .await
        .unwrap();

    let approved = pipeline
        .run(
            "weekly signups",
            QueryOptions { approved: true, ..QueryOptions::default() },
        )
        .await
        .unwrap();

    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(preview.sql, approved.sql);
    assert_eq!(approved.was_successful, Some(true));
}

#[tokio::test]
async fn abandoned_previews_are_evicted_from_the_sql_cache() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::varying("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let config = AgentConfig { reuse_previewed_sql: true, ..agent_config() };
    let pipeline = pipeline(history, generator.clone(), executor, config);

    let first = pipeline
        .run("question 0", QueryOptions::default())
        .await
        .unwrap();

    // Enough distinct never-approved previews to overflow the cache.
    for i in 1..=64 {
        pipeline
            .run(&format!("question {}", i), QueryOptions::default())
            .await
            .unwrap();
    }

    // The original entry is gone, so approval regenerates.
    let approved = pipeline
        .run(
            "question 0",
            QueryOptions { approved: true, ..QueryOptions::default() },
        )
        .await
        .unwrap();
    assert_ne!(first.sql, approved.sql);
}

#[tokio::test]
async fn recent_history_uses_configured_page_size() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let config = AgentConfig { history_limit: 1, ..agent_config() };
    let pipeline = pipeline(history, generator, executor, config);

    for question in ["first question", "second question"] {
        pipeline
            .run(
                question,
                QueryOptions { require_approval: false, ..QueryOptions::default() },
            )
            .await
            .unwrap();
    }

    let recent = pipeline.recent_history().await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].question, "second question");
}

#[tokio::test]
async fn only_successful_similar_queries_become_examples() {
    let history = Arc::new(StubHistory::with_similar(vec![
        similar("orders by region", "A", true),
        similar("orders by city", "B", false),
    ]));
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let pipeline = pipeline(history, generator.clone(), executor, agent_config());

    pipeline
        .run("orders by country", QueryOptions { require_approval: false, ..QueryOptions::default() })
        .await
        .unwrap();

    let seen = generator.seen_examples.lock().unwrap();
    let examples = seen[0].as_ref().expect("examples should be present");
    assert_eq!(examples.len(), 1);
    assert_eq!(examples[0].sql, "A");
    assert_eq!(examples[0].question, "orders by region");
}

#[tokio::test]
async fn all_unsuccessful_similar_queries_mean_no_examples_at_all() {
    let history = Arc::new(StubHistory::with_similar(vec![
        similar("orders by region", "A", false),
        similar("orders by city", "B", false),
    ]));
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let pipeline = pipeline(history, generator.clone(), executor, agent_config());

    pipeline
        .run("orders by country", QueryOptions { require_approval: false, ..QueryOptions::default() })
        .await
        .unwrap();

    let seen = generator.seen_examples.lock().unwrap();
    // Absent, not an empty list.
    assert!(seen[0].is_none());
}

#[tokio::test]
async fn execution_failure_is_structured_and_still_stored() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::returning("SELECT broken"));
    let executor = Arc::new(StubExecutor::failing("table not found: sales"));
    let pipeline = pipeline(history.clone(), generator, executor, agent_config());

    let response = pipeline
        .run(
            "total sales",
            QueryOptions { require_approval: false, ..QueryOptions::default() },
        )
        .await
        .unwrap();

    assert_eq!(response.was_successful, Some(false));
    assert_eq!(response.execution_time, 0.0);
    assert!(response.results.is_none());
    assert!(response.result_preview.is_none());
    assert!(response
        .error_message
        .as_ref()
        .unwrap()
        .contains("table not found: sales"));

    let upserts = history.upserts.lock().unwrap();
    assert_eq!(upserts.len(), 1);
    assert!(!upserts[0].was_successful);
    assert_eq!(upserts[0].execution_time, 0.0);
    assert_eq!(upserts[0].result_preview, None);
}

#[tokio::test]
async fn storage_failure_after_execution_failure_is_appended_not_raised() {
    let history = Arc::new(StubHistory::failing_upserts());
    let generator = Arc::new(StubGenerator::returning("SELECT broken"));
    let executor = Arc::new(StubExecutor::failing("syntax error"));
    let pipeline = pipeline(history, generator, executor, agent_config());

    let response = pipeline
        .run(
            "total sales",
            QueryOptions { require_approval: false, ..QueryOptions::default() },
        )
        .await
        .unwrap();

    assert_eq!(response.was_successful, Some(false));
    let message = response.error_message.unwrap();
    assert!(message.contains("syntax error"));
    assert!(message.contains("history write also failed"));
}

#[tokio::test]
async fn storage_failure_after_success_propagates() {
    let history = Arc::new(StubHistory::failing_upserts());
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let pipeline = pipeline(history, generator, executor, agent_config());

    let result = pipeline
        .run(
            "total sales",
            QueryOptions { require_approval: false, ..QueryOptions::default() },
        )
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn successful_run_returns_results_and_preview() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::returning(
        "SELECT region, SUM(revenue) FROM sales GROUP BY region",
    ));
    let executor = Arc::new(StubExecutor::succeeding(2, 0.05));
    let pipeline = pipeline(history.clone(), generator, executor, agent_config());

    let response = pipeline
        .run(
            "total revenue by region",
            QueryOptions { require_approval: false, ..QueryOptions::default() },
        )
        .await
        .unwrap();

    assert_eq!(response.was_successful, Some(true));
    assert_eq!(response.execution_time, 0.05);
    assert_eq!(response.results.as_ref().unwrap().row_count(), 2);
    assert!(response.result_preview.as_ref().unwrap().contains("region"));
    assert!(response.error_message.is_none());

    let upserts = history.upserts.lock().unwrap();
    assert_eq!(upserts.len(), 1);
    assert!(upserts[0].was_successful);
    assert_eq!(upserts[0].execution_time, 0.05);
    assert!(upserts[0].result_preview.is_some());
}

#[tokio::test]
async fn store_results_false_skips_storage() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let pipeline = pipeline(history.clone(), generator, executor, agent_config());

    pipeline
        .run(
            "total sales",
            QueryOptions {
                store_results: false,
                require_approval: false,
                approved: false,
            },
        )
        .await
        .unwrap();

    assert!(history.upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn generate_only_never_executes_or_stores() {
    let history = Arc::new(StubHistory::with_similar(vec![similar(
        "orders by region",
        "A",
        true,
    )]));
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(1, 0.01));
    let pipeline = pipeline(history.clone(), generator, executor.clone(), agent_config());

    let (sql, similar_queries) = pipeline.generate_only("orders by country").await.unwrap();

    assert_eq!(sql, "SELECT 1");
    assert_eq!(similar_queries.len(), 1);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    assert!(history.upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_result_preview_is_no_results() {
    let history = Arc::new(StubHistory::empty());
    let generator = Arc::new(StubGenerator::returning("SELECT 1"));
    let executor = Arc::new(StubExecutor::succeeding(0, 0.01));
    let pipeline = pipeline(history.clone(), generator, executor, agent_config());

    let response = pipeline
        .run(
            "customers in antarctica",
            QueryOptions { require_approval: false, ..QueryOptions::default() },
        )
        .await
        .unwrap();

    assert_eq!(response.result_preview.as_deref(), Some("No results"));
    assert_eq!(
        history.upserts.lock().unwrap()[0].result_preview.as_deref(),
        Some("No results")
    );
}
