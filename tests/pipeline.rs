//! Ingestion and chat pipelines end to end, with fake providers and the
//! in-memory store.

mod support;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ragbot::chat::{self, ChatRequest};
use ragbot::ingest::{self, FileUpload};
use ragbot_core::completion::Role;
use ragbot_core::models::{ChatTurn, SourceKind};
use ragbot_core::store::memory::InMemoryStore;
use ragbot_core::store::Store;
use ragbot_core::ApiError;
use tempfile::TempDir;

use support::{test_config, testbed, testbed_with, StaticCrawler};

const SHIPPING: &str = "Shipping takes three days. We offer shipping to every country.";
const PIZZA: &str = "Our pizza oven runs hot. Every pizza is made by hand.";

#[tokio::test]
async fn training_text_stores_one_source_with_chunks_and_tags() {
    let bed = testbed(test_config());
    let source = ingest::train_text(&bed.svc, "acme", Some("Delivery"), SHIPPING)
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Text);
    assert_eq!(source.title, "Delivery");
    assert_eq!(source.chunk_count, 1);
    assert_eq!(source.tags, vec!["shipping", "customer-support", "pricing"]);

    let chunks = bed.store.tenant_chunks("acme").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source_id, source.id);
    assert_eq!(chunks[0].embedding.len(), support::VOCAB.len());
    assert_eq!(chunks[0].embedding[0], 2.0);
}

#[tokio::test]
async fn long_text_is_split_into_overlapping_chunks() {
    let bed = testbed(test_config());
    let text = (0..100).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
    let source = ingest::train_text(&bed.svc, "acme", None, &text).await.unwrap();

    assert!(source.chunk_count > 3);
    let chunks = bed.store.tenant_chunks("acme").await.unwrap();
    let indexes: Vec<usize> = chunks.iter().map(|c| c.index).collect();
    assert_eq!(indexes, (0..source.chunk_count).collect::<Vec<_>>());
    assert!(source.title.starts_with("w0 w1"));
}

#[tokio::test]
async fn embedding_outage_still_trains_with_zero_vectors() {
    let bed = testbed(test_config());
    bed.embedder.fail.store(true, Ordering::SeqCst);

    let source = ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    assert_eq!(source.chunk_count, 1);
    let chunks = bed.store.tenant_chunks("acme").await.unwrap();
    assert!(chunks[0].embedding.iter().all(|v| *v == 0.0));
    assert_eq!(chunks[0].embedding.len(), support::VOCAB.len());
}

#[tokio::test]
async fn blank_text_is_rejected() {
    let bed = testbed(test_config());
    let err = ingest::train_text(&bed.svc, "acme", None, "  \n ").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert!(bed.store.list_sources("acme").await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_tenant_is_rejected() {
    let bed = testbed(test_config());
    let err = ingest::train_text(&bed.svc, "bad tenant!", None, SHIPPING)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn qa_file_becomes_one_chunk_per_pair() {
    let bed = testbed(test_config());
    let content = "# store FAQ\nDo you offer a refund? | Yes, within 30 days.\n\nWhat are your hours? | 9 to 5.\n";
    let source = ingest::train_qa(&bed.svc, "acme", None, content).await.unwrap();

    assert_eq!(source.kind, SourceKind::Qa);
    assert_eq!(source.chunk_count, 2);
    assert_eq!(source.title, "Q&A (2 pairs)");
    let chunks = bed.store.tenant_chunks("acme").await.unwrap();
    assert_eq!(chunks[0].text, "Q: Do you offer a refund?\nA: Yes, within 30 days.");
    assert_eq!(chunks[1].heading.as_deref(), Some("What are your hours?"));
}

#[tokio::test]
async fn malformed_qa_file_names_the_line() {
    let bed = testbed(test_config());
    let err = ingest::train_qa(&bed.svc, "acme", None, "A? | B\nno delimiter here\n")
        .await
        .unwrap_err();
    match err {
        ApiError::Validation(msg) => assert!(msg.starts_with("line 2:"), "{}", msg),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn url_training_keeps_page_url_and_headings() {
    let url = "https://shop.test/faq";
    let crawler = StaticCrawler::with_page(
        url,
        Some("Shop FAQ"),
        "# Shipping\nWe offer shipping.\n\n## Refunds\nA refund takes 30 days.\n",
    );
    let bed = testbed_with(test_config(), crawler, Arc::new(InMemoryStore::new()));

    let source = ingest::train_url(&bed.svc, "acme", url).await.unwrap();
    assert_eq!(source.kind, SourceKind::Url);
    assert_eq!(source.title, "Shop FAQ");
    assert_eq!(source.source_url.as_deref(), Some(url));

    let chunks = bed.store.tenant_chunks("acme").await.unwrap();
    let headings: Vec<Option<&str>> = chunks.iter().map(|c| c.heading.as_deref()).collect();
    assert_eq!(headings, vec![Some("Shipping"), Some("Refunds")]);
    assert!(chunks.iter().all(|c| c.source_url.as_deref() == Some(url)));
}

#[tokio::test]
async fn crawler_failure_is_upstream_and_bad_scheme_is_validation() {
    let bed = testbed(test_config());
    let err = ingest::train_url(&bed.svc, "acme", "https://missing.test/")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Upstream(_)));

    let err = ingest::train_url(&bed.svc, "acme", "ftp://files.test/a")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn file_uploads_are_extracted_by_type() {
    let bed = testbed(test_config());

    let md = FileUpload {
        filename: "guide.md".to_string(),
        bytes: b"# Hours\nOpen hours are nine to five.\n".to_vec(),
        content_type: None,
    };
    let source = ingest::train_file(&bed.svc, "acme", &md).await.unwrap();
    assert_eq!(source.kind, SourceKind::File);
    assert_eq!(source.title, "guide.md");
    let chunks = bed.store.tenant_chunks("acme").await.unwrap();
    assert_eq!(chunks[0].heading.as_deref(), Some("Hours"));

    let empty = FileUpload {
        filename: "empty.txt".to_string(),
        bytes: Vec::new(),
        content_type: None,
    };
    match ingest::train_file(&bed.svc, "acme", &empty).await {
        Err(ApiError::Validation(msg)) => assert_eq!(msg, "file is empty"),
        other => panic!("expected validation error, got {:?}", other),
    }

    let image = FileUpload {
        filename: "logo.png".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
        content_type: Some("image/png".to_string()),
    };
    assert!(matches!(
        ingest::train_file(&bed.svc, "acme", &image).await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn directory_training_skips_invalid_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.md"), "# Shipping\nWe offer shipping.").unwrap();
    fs::create_dir_all(tmp.path().join("nested")).unwrap();
    fs::write(tmp.path().join("nested/b.txt"), PIZZA).unwrap();
    fs::write(tmp.path().join("blank.txt"), "   ").unwrap();
    fs::write(tmp.path().join("ignored.png"), "not text").unwrap();

    let bed = testbed(test_config());
    let include = vec!["**/*.md".to_string(), "**/*.txt".to_string()];
    let report = ingest::train_dir(&bed.svc, "acme", tmp.path(), &include, &[])
        .await
        .unwrap();

    let titles: Vec<&str> = report.trained.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"a.md"));
    assert!(titles.iter().any(|t| t.ends_with("b.txt")));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "blank.txt");
}

#[tokio::test]
async fn chat_cites_the_most_similar_chunk() {
    let bed = testbed(test_config());
    let shipping = ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    ingest::train_text(&bed.svc, "acme", None, PIZZA).await.unwrap();

    let answer = chat::answer(
        &bed.svc,
        "acme",
        "1.2.3.4",
        &ChatRequest::new("How long does shipping take?"),
    )
    .await
    .unwrap();

    assert_eq!(answer.answer, "We ship worldwide [1].");
    assert!(!answer.cached);
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].index, 1);
    assert_eq!(answer.sources[0].source_id, shipping.id);

    let calls = bed.completer.chat_calls();
    assert_eq!(calls.len(), 1);
    let messages = &calls[0];
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].content, bed.svc.config.chat.system_prompt);
    assert!(messages[1].content.contains("[1] Source: training data\nShipping takes three days."));
    assert!(!messages[1].content.contains("pizza"));
    assert_eq!(messages[2].role, Role::User);
    assert_eq!(messages[2].content, "How long does shipping take?");
}

#[tokio::test]
async fn chat_without_relevant_context_sends_no_context_message() {
    let bed = testbed(test_config());
    ingest::train_text(&bed.svc, "acme", None, PIZZA).await.unwrap();

    let answer = chat::answer(&bed.svc, "acme", "ip", &ChatRequest::new("Tell me about rust"))
        .await
        .unwrap();
    assert!(answer.sources.is_empty());
    assert_eq!(bed.completer.chat_calls()[0].len(), 2);
}

#[tokio::test]
async fn chat_answers_without_context_when_query_embedding_fails() {
    let bed = testbed(test_config());
    ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    bed.embedder.fail.store(true, Ordering::SeqCst);

    let answer = chat::answer(&bed.svc, "acme", "ip", &ChatRequest::new("shipping?"))
        .await
        .unwrap();
    assert!(answer.sources.is_empty());
    let messages = &bed.completer.chat_calls()[0];
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "shipping?");
}

#[tokio::test]
async fn completion_failure_is_upstream() {
    let bed = testbed(test_config());
    bed.completer.fail_answers.store(true, Ordering::SeqCst);
    let err = chat::answer(&bed.svc, "acme", "ip", &ChatRequest::new("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Upstream(_)));
}

#[tokio::test]
async fn repeated_question_is_served_from_cache() {
    let bed = testbed(test_config());
    ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    let request = ChatRequest::new("shipping?");

    let first = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    let second = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.sources, second.sources);
    assert_eq!(bed.completer.chat_calls().len(), 1);

    // Other tenants never see the cached answer.
    let other = chat::answer(&bed.svc, "other", "ip", &request).await.unwrap();
    assert!(!other.cached);
}

#[tokio::test]
async fn changing_training_data_drops_cached_answers() {
    let bed = testbed(test_config());
    let shipping = ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    let request = ChatRequest::new("shipping?");

    let first = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    assert_eq!(first.sources[0].source_id, shipping.id);
    assert!(chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap().cached);

    ingest::delete_source(&bed.svc, "acme", &shipping.id).await.unwrap();
    let after_delete = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    assert!(!after_delete.cached);
    assert!(after_delete.sources.is_empty());

    let retrained = ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    let after_train = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    assert!(!after_train.cached);
    assert_eq!(after_train.sources[0].source_id, retrained.id);

    ingest::purge_tenant(&bed.svc, "acme").await.unwrap();
    let after_purge = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    assert!(!after_purge.cached);
    assert!(after_purge.sources.is_empty());
    assert_eq!(bed.completer.chat_calls().len(), 4);
}

#[tokio::test]
async fn invalidating_one_tenant_keeps_other_tenants_cached() {
    let bed = testbed(test_config());
    ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    ingest::train_text(&bed.svc, "globex", None, SHIPPING).await.unwrap();
    let request = ChatRequest::new("shipping?");
    chat::answer(&bed.svc, "globex", "ip", &request).await.unwrap();

    ingest::purge_tenant(&bed.svc, "acme").await.unwrap();
    assert!(chat::answer(&bed.svc, "globex", "ip", &request).await.unwrap().cached);
}

#[tokio::test]
async fn conversations_with_history_bypass_the_cache_and_keep_recent_turns() {
    let mut config = test_config();
    config.chat.max_history = 2;
    let bed = testbed(config);

    let request = ChatRequest {
        history: vec![
            ChatTurn::user("first"),
            ChatTurn::assistant("one"),
            ChatTurn::user("second"),
            ChatTurn::assistant("two"),
        ],
        ..ChatRequest::new("and then?")
    };
    chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    let again = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap();
    assert!(!again.cached);

    let calls = bed.completer.chat_calls();
    assert_eq!(calls.len(), 2);
    let contents: Vec<&str> = calls[0].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents[1..], ["second", "two", "and then?"]);
    assert_eq!(calls[0][2].role, Role::Assistant);
}

#[tokio::test]
async fn chat_validates_its_input() {
    let bed = testbed(test_config());
    for request in [
        ChatRequest::new("   "),
        ChatRequest::new("x".repeat(4001)),
        ChatRequest {
            history: vec![ChatTurn::user(" ")],
            ..ChatRequest::new("hi")
        },
    ] {
        let err = chat::answer(&bed.svc, "acme", "ip", &request).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
    assert!(bed.completer.chat_calls().is_empty());
}

#[tokio::test]
async fn chat_is_rate_limited_per_client() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let bed = testbed(config);

    for i in 0..2 {
        chat::answer(&bed.svc, "acme", "10.0.0.1", &ChatRequest::new(format!("q{}", i)))
            .await
            .unwrap();
    }
    match chat::answer(&bed.svc, "acme", "10.0.0.1", &ChatRequest::new("q3")).await {
        Err(ApiError::RateLimited { retry_after_secs }) => assert!(retry_after_secs >= 1),
        other => panic!("expected rate limit, got {:?}", other),
    }
    chat::answer(&bed.svc, "acme", "10.0.0.2", &ChatRequest::new("q3"))
        .await
        .unwrap();
}

#[tokio::test]
async fn search_ranks_chunks_and_respects_top_n() {
    let bed = testbed(test_config());
    ingest::train_text(&bed.svc, "acme", None, PIZZA).await.unwrap();
    let shipping = ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();

    let results = chat::search(&bed.svc, "acme", "shipping", Some(1)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.source_id, shipping.id);
    assert!((results[0].similarity - 1.0).abs() < 1e-6);

    let all = chat::search(&bed.svc, "acme", "shipping", None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].similarity, 0.0);

    assert!(matches!(
        chat::search(&bed.svc, "acme", " ", None).await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn deleting_sources_and_tenants() {
    let bed = testbed(test_config());
    let a = ingest::train_text(&bed.svc, "acme", None, SHIPPING).await.unwrap();
    ingest::train_text(&bed.svc, "acme", None, PIZZA).await.unwrap();
    ingest::train_text(&bed.svc, "other", None, PIZZA).await.unwrap();

    ingest::delete_source(&bed.svc, "acme", &a.id).await.unwrap();
    assert!(matches!(
        ingest::delete_source(&bed.svc, "acme", &a.id).await,
        Err(ApiError::NotFound(_))
    ));
    assert_eq!(ingest::list_sources(&bed.svc, "acme").await.unwrap().len(), 1);

    assert_eq!(ingest::purge_tenant(&bed.svc, "acme").await.unwrap(), 1);
    assert!(bed.store.tenant_chunks("acme").await.unwrap().is_empty());
    assert_eq!(ingest::list_sources(&bed.svc, "other").await.unwrap().len(), 1);
}
