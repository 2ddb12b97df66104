use pretty_assertions::assert_eq;
use repo_pulse::github::{GitHubClient, GitHubConfig};
use repo_pulse::{Error, RepoId, Resource};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, fetch_details: bool) -> GitHubClient {
    GitHubClient::new(GitHubConfig {
        token: Some("test-token".to_string()),
        api_url: server.uri(),
        max_pages: 5,
        fetch_details,
        detail_concurrency: 2,
        show_progress: false,
    })
    .unwrap()
}

fn repo() -> RepoId {
    RepoId::new("acme", "widgets")
}

fn commit(sha: &str, login: &str, date: &str, message: &str) -> serde_json::Value {
    json!({
        "sha": sha,
        "commit": {
            "author": { "name": format!("{} name", login), "date": date },
            "message": message
        },
        "author": { "login": login }
    })
}

async fn mount_empty(server: &MockServer, resource: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/widgets/{}", resource)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn follows_link_header_and_keeps_api_order() {
    let server = MockServer::start().await;
    let next = format!("<{}/repos/acme/widgets/commits?page=2>; rel=\"next\"", server.uri());

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            commit("c3", "bo", "2024-01-01T10:00:00Z", "Initial import")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([
                    commit("c1", "ana", "2024-01-03T10:00:00Z", "feat: Add S3 export"),
                    commit("c2", "bo", "2024-01-02T10:00:00Z", "fix: typo"),
                ])),
        )
        .mount(&server)
        .await;

    let commits = client(&server, false).fetch_commits(&repo()).await.unwrap();
    let shas: Vec<&str> = commits.iter().map(|c| c.sha.as_str()).collect();
    assert_eq!(shas, vec!["c1", "c2", "c3"]);
    assert_eq!(commits[0].author, "ana");
    assert_eq!(commits[0].message, "feat: Add S3 export");
    assert_eq!(commits[0].additions, 0);
}

#[tokio::test]
async fn page_limit_stops_pagination() {
    let server = MockServer::start().await;
    let next = format!("<{}/repos/acme/widgets/commits?page=2>; rel=\"next\"", server.uri());
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([commit("c1", "ana", "2024-01-03T10:00:00Z", "one")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = GitHubClient::new(GitHubConfig {
        api_url: server.uri(),
        max_pages: 1,
        fetch_details: false,
        ..Default::default()
    })
    .unwrap();
    let commits = client.fetch_commits(&repo()).await.unwrap();
    assert_eq!(commits.len(), 1);
}

#[tokio::test]
async fn detail_documents_fill_in_line_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            commit("c1", "ana", "2024-01-03T10:00:00Z", "one"),
            commit("c2", "bo", "2024-01-02T10:00:00Z", "two"),
        ])))
        .mount(&server)
        .await;

    let mut detailed = commit("c1", "ana", "2024-01-03T10:00:00Z", "one");
    detailed["stats"] = json!({ "additions": 12, "deletions": 3, "total": 15 });
    detailed["files"] = json!([{ "filename": "a.rs" }, { "filename": "b.rs" }]);
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(detailed))
        .mount(&server)
        .await;
    // c2's detail request fails; its stats stay at zero
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits/c2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let commits = client(&server, true).fetch_commits(&repo()).await.unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!((commits[0].additions, commits[0].deletions, commits[0].files_changed), (12, 3, 2));
    assert_eq!((commits[1].additions, commits[1].deletions, commits[1].files_changed), (0, 0, 0));
}

#[tokio::test]
async fn fetch_all_fills_details_for_commits_and_pull_requests() {
    let server = MockServer::start().await;
    let listed = commit("c1", "ana", "2024-01-03T10:00:00Z", "feat: Add S3 export");
    let mut detailed = listed.clone();
    detailed["stats"] = json!({ "additions": 7, "deletions": 1, "total": 8 });
    detailed["files"] = json!([{ "filename": "src/export.rs" }]);
    let pull = json!({
        "number": 9,
        "title": "S3 export",
        "user": { "login": "ana" },
        "created_at": "2024-01-02T00:00:00Z",
        "state": "open"
    });
    let mut pull_detail = pull.clone();
    pull_detail["additions"] = json!(40);
    pull_detail["deletions"] = json!(6);
    pull_detail["review_comments"] = json!(3);

    for (route, body) in [
        ("commits", json!([listed])),
        ("commits/c1", detailed),
        ("pulls", json!([pull])),
        ("pulls/9", pull_detail),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/widgets/{}", route)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_empty(&server, "issues").await;

    let outcome = client(&server, true).fetch_all(&repo()).await;
    assert!(outcome.failed().is_empty());
    let (tables, errors) = outcome.into_tables();
    assert!(errors.is_empty());

    let c = &tables.commits[0];
    assert_eq!((c.additions, c.deletions, c.files_changed), (7, 1, 1));
    let pr = &tables.pull_requests[0];
    assert_eq!((pr.additions, pr.deletions, pr.review_comments), (40, 6, 3));
    assert!(tables.issues.is_empty());
}

#[tokio::test]
async fn issues_endpoint_drops_pull_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/issues"))
        .and(query_param("state", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "number": 7,
                "title": "Crash on Windows",
                "user": { "login": "cy" },
                "created_at": "2024-02-01T00:00:00Z",
                "closed_at": null,
                "state": "open",
                "labels": [{ "name": "bug" }]
            },
            {
                "number": 8,
                "title": "Add retries",
                "user": { "login": "ana" },
                "created_at": "2024-02-02T00:00:00Z",
                "state": "closed",
                "closed_at": "2024-02-03T00:00:00Z",
                "labels": [],
                "pull_request": { "url": "https://api.github.com/repos/acme/widgets/pulls/8" }
            }
        ])))
        .mount(&server)
        .await;

    let issues = client(&server, false).fetch_issues(&repo()).await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, 7);
    assert_eq!(issues[0].labels, vec!["bug".to_string()]);
    assert_eq!(issues[0].closed_at, None);
}

#[tokio::test]
async fn one_failing_resource_keeps_the_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            commit("c1", "ana", "2024-01-03T10:00:00Z", "one")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-reset", "1700000000"))
        .mount(&server)
        .await;
    mount_empty(&server, "issues").await;

    let outcome = client(&server, false).fetch_all(&repo()).await;
    assert_eq!(outcome.failed(), vec![Resource::PullRequests]);

    let (tables, errors) = outcome.into_tables();
    assert_eq!(tables.commits.len(), 1);
    assert!(tables.pull_requests.is_empty());
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        Error::Fetch { resource, reason } => {
            assert_eq!(*resource, Resource::PullRequests);
            assert!(reason.contains("rate limited"), "{}", reason);
            assert!(reason.contains("1700000000"), "{}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn missing_repository_fails_every_resource() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let outcome = client(&server, false).fetch_all(&repo()).await;
    assert_eq!(outcome.failed().len(), 3);
    let (_, errors) = outcome.into_tables();
    assert!(errors.iter().all(|e| e.to_string().contains("repository not found")));
}

#[tokio::test]
async fn merged_pull_requests_are_reported_as_merged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("state", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "number": 3,
                "title": "Speed up build",
                "user": { "login": "bo" },
                "created_at": "2024-03-01T00:00:00Z",
                "closed_at": "2024-03-04T00:00:00Z",
                "merged_at": "2024-03-04T00:00:00Z",
                "state": "closed"
            },
            {
                "number": 4,
                "title": "",
                "user": null,
                "created_at": "2024-03-02T00:00:00Z",
                "state": "open"
            }
        ])))
        .mount(&server)
        .await;

    let prs = client(&server, false).fetch_pull_requests(&repo()).await.unwrap();
    assert_eq!(prs[0].state, "merged");
    assert_eq!(prs[1].state, "open");
    assert_eq!(prs[1].title, "No Title");
    assert_eq!(prs[1].author, "Unknown");
}
