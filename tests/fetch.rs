use fedimerge::{
    api::mastodon::{InstanceDestination, InstanceSource, MastodonClient, PushSummary},
    merge_blocklists, DomainBlock, Field, MergePlan, Severity,
};
use httpmock::prelude::*;
use sha2::{Digest, Sha256};

fn digest(domain: &str) -> String {
    hex::encode(Sha256::digest(domain.as_bytes()))
}

#[tokio::test]
async fn fetch_public_blocklist() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/instance/domain_blocks")
                .header_exists("user-agent");
            then.status(200).json_body(serde_json::json!([
                {"domain": "Bad.example", "digest": digest("Bad.example"), "severity": "suspend", "comment": "spam"},
                {"domain": "q*iet.example", "digest": digest("quiet.example"), "severity": "silence", "comment": null},
                {"domain": "forged.example", "digest": digest("other.example"), "severity": "suspend", "comment": null}
            ]));
        })
        .await;

    let source = InstanceSource::new(server.base_url());
    let blocks = MastodonClient::new()
        .fetch(&source, &[Field::Domain, Field::Severity, Field::PublicComment])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].domain, "bad.example");
    assert_eq!(blocks[0].severity, Severity::Suspend);
    assert_eq!(blocks[0].public_comment.as_deref(), Some("spam"));
}

#[tokio::test]
async fn fetch_admin_blocklist_follows_pages() {
    let server = MockServer::start_async().await;

    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/admin/domain_blocks")
                .query_param("limit", "200")
                .header("authorization", "Bearer secret");
            then.status(200)
                .header(
                    "link",
                    format!(
                        r#"<{}>; rel="next""#,
                        server.url("/api/v1/admin/domain_blocks?max_id=1")
                    ),
                )
                .json_body(serde_json::json!([
                    {"id": "2", "domain": "a.example", "severity": "suspend", "reject_media": true,
                     "reject_reports": true, "private_comment": "internal", "public_comment": null, "obfuscate": false}
                ]));
        })
        .await;

    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/admin/domain_blocks")
                .query_param("max_id", "1")
                .header("authorization", "Bearer secret");
            then.status(200).json_body(serde_json::json!([
                {"id": "1", "domain": "b.example", "severity": "noop", "reject_media": true,
                 "reject_reports": false, "private_comment": null, "public_comment": "media only", "obfuscate": true}
            ]));
        })
        .await;

    let source = InstanceSource {
        token: Some("secret".into()),
        admin: true,
        ..InstanceSource::new(server.base_url())
    };
    let blocks = MastodonClient::new().fetch(&source, &Field::ALL).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].domain, "a.example");
    assert_eq!(blocks[0].private_comment.as_deref(), Some("internal"));
    assert!(blocks[0].reject_reports);
    assert_eq!(blocks[1].severity, Severity::None);
    assert!(blocks[1].obfuscate);
}

#[tokio::test]
async fn fetch_error_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.path("/api/v1/instance/domain_blocks");
            then.status(404);
        })
        .await;

    let source = InstanceSource::new(server.base_url());
    let result = MastodonClient::new().fetch(&source, &Field::ALL).await;
    assert!(matches!(result, Err(fedimerge::Error::Http(_))));
}

#[tokio::test]
async fn push_adds_and_updates_blocks() {
    let server = MockServer::start_async().await;

    let list = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/admin/domain_blocks")
                .header("authorization", "Bearer publish");
            then.status(200).json_body(serde_json::json!([
                {"id": "1", "domain": "changed.example", "severity": "silence", "reject_media": false,
                 "reject_reports": false, "private_comment": null, "public_comment": "old", "obfuscate": false},
                {"id": "2", "domain": "Same.example", "severity": "suspend", "reject_media": false,
                 "reject_reports": false, "private_comment": null, "public_comment": "other", "obfuscate": false},
                {"id": "3", "domain": "theirs.example", "severity": "suspend", "reject_media": false,
                 "reject_reports": false, "private_comment": null, "public_comment": null, "obfuscate": false}
            ]));
        })
        .await;

    let update = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/v1/admin/domain_blocks/1")
                .header("authorization", "Bearer publish")
                .json_body(serde_json::json!({"severity": "suspend"}));
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let untouched = server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/v1/admin/domain_blocks/2");
            then.status(200);
        })
        .await;

    let add = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/admin/domain_blocks")
                .header("authorization", "Bearer publish")
                .json_body(serde_json::json!({"domain": "new.example", "severity": "silence"}));
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let merged = merge_blocklists(
        [vec![
            DomainBlock::new("changed.example", Severity::Suspend).with_public_comment("ignored"),
            DomainBlock::new("same.example", Severity::Suspend),
            DomainBlock::new("new.example", Severity::Silence),
        ]],
        MergePlan::Max,
    )
    .unwrap();

    let destination = InstanceDestination::new(server.base_url(), "publish");
    let summary = MastodonClient::new()
        .push(&destination, &merged, &[Field::Domain, Field::Severity])
        .await
        .unwrap();

    list.assert_async().await;
    update.assert_async().await;
    add.assert_async().await;
    assert_eq!(untouched.hits_async().await, 0);
    assert_eq!(
        summary,
        PushSummary {
            added: 1,
            updated: 1,
            unchanged: 1,
        }
    );
}
