use pretty_assertions::assert_eq;
use repo_pulse::analyzer::compute_metrics;
use repo_pulse::classifier::LlmClassifier;
use repo_pulse::embedding::HashingEmbedder;
use repo_pulse::entities::HeuristicRecognizer;
use repo_pulse::github::{GitHubClient, GitHubConfig};
use repo_pulse::graph_agent::GraphAgent;
use repo_pulse::llm::{GroqClient, LanguageModel};
use repo_pulse::renderer::RenderOptions;
use repo_pulse::session::{Assistant, QueryResponse, Session, CHART_FALLBACK_MESSAGE};
use repo_pulse::snapshot::SnapshotStore;
use repo_pulse::summary::SummaryConfig;
use repo_pulse::text_agent::TextAgent;
use repo_pulse::vector_index::{MemoryIndex, TemplateSelector};
use repo_pulse::{RepoId, RepoTables, Resource};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn repo() -> RepoId {
    RepoId::new("acme", "widgets")
}

async fn mount_github(server: &MockServer) {
    let commits = json!([
        {
            "sha": "c3",
            "commit": {
                "author": { "name": "Ana", "date": "2024-03-12T14:05:00Z" },
                "message": "feat: Add Kafka sink"
            },
            "author": { "login": "ana" }
        },
        {
            "sha": "c2",
            "commit": {
                "author": { "name": "Bo", "date": "2024-02-20T09:00:00Z" },
                "message": "fix: Retry S3 uploads"
            },
            "author": { "login": "bo" }
        },
        {
            "sha": "c1",
            "commit": {
                "author": { "name": "Ana", "date": "2024-01-05T22:30:00Z" },
                "message": "Initial import, with \"quotes\"\nand a second line"
            },
            "author": { "login": "ana" }
        }
    ]);
    let pulls = json!([
        {
            "number": 2,
            "title": "Kafka sink",
            "user": { "login": "ana" },
            "created_at": "2024-03-10T00:00:00Z",
            "closed_at": "2024-03-12T00:00:00Z",
            "merged_at": "2024-03-12T00:00:00Z",
            "state": "closed"
        },
        {
            "number": 1,
            "title": "Draft docs",
            "user": { "login": "bo" },
            "created_at": "2024-02-01T00:00:00Z",
            "state": "open"
        }
    ]);
    let issues = json!([
        {
            "number": 5,
            "title": "S3 uploads fail",
            "user": { "login": "cy" },
            "created_at": "2024-02-18T00:00:00Z",
            "closed_at": "2024-02-20T00:00:00Z",
            "state": "closed",
            "labels": [{ "name": "bug" }, { "name": "storage" }]
        }
    ]);

    for (resource, body) in [("commits", commits), ("pulls", pulls), ("issues", issues)] {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/widgets/{}", resource)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

async fn collect(server: &MockServer) -> RepoTables {
    let client = GitHubClient::new(GitHubConfig {
        api_url: server.uri(),
        fetch_details: false,
        ..Default::default()
    })
    .unwrap();
    let outcome = client.fetch_all(&repo()).await;
    assert!(outcome.failed().is_empty());
    let (tables, errors) = outcome.into_tables();
    assert!(errors.is_empty());
    tables
}

#[tokio::test]
async fn collected_tables_survive_a_snapshot_round_trip() {
    let server = MockServer::start().await;
    mount_github(&server).await;
    let tables = collect(&server).await;
    assert_eq!(tables.commits.len(), 3);
    assert_eq!(tables.pull_requests.len(), 2);
    assert_eq!(tables.issues.len(), 1);

    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    assert!(!store.exists(&repo()));
    store.save(&repo(), &tables, &Resource::ALL).unwrap();
    assert!(store.exists(&repo()));

    let loaded = store.load(&repo()).unwrap();
    assert_eq!(loaded, tables);
    assert_eq!(compute_metrics(&loaded), compute_metrics(&tables));
}

#[tokio::test]
async fn metrics_export_reloads_identically() {
    let server = MockServer::start().await;
    mount_github(&server).await;
    let tables = collect(&server).await;

    let metrics = compute_metrics(&tables);
    assert_eq!(metrics.total_commits, 3);
    assert_eq!(metrics.active_authors, 2);
    assert_eq!(metrics.contributors[0].author, "ana");
    assert_eq!(metrics.open_issues, 0);
    assert_eq!(metrics.closed_issues, 1);

    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    let rows = metrics.to_rows();
    store.save_metrics(&repo(), &rows).unwrap();
    assert_eq!(store.load_metrics(&repo()).unwrap(), rows);
}

#[tokio::test]
async fn partial_snapshot_loads_missing_resources_empty() {
    let server = MockServer::start().await;
    mount_github(&server).await;
    let tables = collect(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    store.save(&repo(), &tables, &[Resource::Commits]).unwrap();

    let loaded = store.load(&repo()).unwrap();
    assert_eq!(loaded.commits, tables.commits);
    assert!(loaded.pull_requests.is_empty());
    assert!(loaded.issues.is_empty());
}

fn assistant(server: &MockServer) -> Assistant {
    let model: Arc<dyn LanguageModel> = Arc::new(
        GroqClient::new("groq-key".to_string(), None, Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri()),
    );
    let options = RenderOptions {
        width: 480,
        height: 320,
    };
    Assistant::new(
        Arc::new(LlmClassifier::new(model.clone())),
        TextAgent::new(model.clone(), 4000),
        TemplateSelector::new(Arc::new(HashingEmbedder::default()), Arc::new(MemoryIndex::new())),
        GraphAgent::new(model, options, 4000),
    )
}

async fn mount_reply(server: &MockServer, prompt_fragment: &str, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(body_string_contains(prompt_fragment))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": reply } }]
        })))
        .mount(server)
        .await;
}

async fn session(server: &MockServer) -> Session {
    let tables = collect(server).await;
    Session::new(
        repo(),
        Arc::new(tables),
        &HeuristicRecognizer::default(),
        &SummaryConfig::default(),
    )
}

#[tokio::test]
async fn text_questions_are_answered_from_the_summary() {
    let server = MockServer::start().await;
    mount_github(&server).await;
    mount_reply(&server, "Classify the following request", "text").await;
    mount_reply(&server, "Please answer the following query", "ana wrote most commits.").await;

    let session = session(&server).await;
    match assistant(&server).ask(&session, "Who commits the most?").await.unwrap() {
        QueryResponse::Text(answer) => assert_eq!(answer, "ana wrote most commits."),
        other => panic!("expected text, got {:?}", other),
    }
}

#[tokio::test]
async fn chart_questions_render_a_png() {
    let server = MockServer::start().await;
    mount_github(&server).await;
    mount_reply(&server, "Classify the following request", "graph").await;
    mount_reply(
        &server,
        "You design charts",
        concat!(
            "```json\n",
            r#"{"chart": "line_chart", "dataset": "months", "x": "month", "y": "commits", "#,
            r#""title": "Commits per month"}"#,
            "\n```"
        ),
    )
    .await;

    let session = session(&server).await;
    match assistant(&server).ask(&session, "trend of commits over time").await.unwrap() {
        QueryResponse::Chart(chart) => {
            assert_eq!(chart.template, "line_chart");
            assert_eq!(chart.spec.dataset, "months");
            assert!(chart.png.starts_with(&[0x89, b'P', b'N', b'G']));
        }
        other => panic!("expected chart, got {:?}", other),
    }
}

#[tokio::test]
async fn unusable_chart_replies_fall_back() {
    let server = MockServer::start().await;
    mount_github(&server).await;
    mount_reply(&server, "Classify the following request", "graph").await;
    mount_reply(&server, "You design charts", "I cannot draw that, sorry.").await;

    let session = session(&server).await;
    match assistant(&server).ask(&session, "trend of commits over time").await.unwrap() {
        QueryResponse::Fallback(message) => assert_eq!(message, CHART_FALLBACK_MESSAGE),
        other => panic!("expected fallback, got {:?}", other),
    }
}
