use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{
    block::{normalize_domain, DomainBlock, Field, Severity},
    error::Result,
    export::{export_columns, json_value},
    merge::Blocklist,
    parse::{parse_blocklist, restrict_fields, SourceFormat},
};

// some instances (mstdn.jp) serve a 404 without a browser user agent
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

const ADMIN_PAGE_LIMIT: u32 = 200;

/// https://docs.joinmastodon.org/methods/instance/#domain_blocks
#[derive(Serialize, Deserialize, Debug)]
pub struct InstanceDomainBlock {
    /// The domain which is blocked. This may be obfuscated or partially censored.
    pub domain: String,
    /// The SHA256 hash digest of the domain string.
    #[serde(default)]
    pub digest: String,
    /// The level to which the domain is blocked.
    pub severity: Severity,
    /// An optional reason for the domain block.
    pub comment: Option<String>,
}

impl InstanceDomainBlock {
    /// Converts the public entry, dropping censored domains and entries whose
    /// digest doesn't match the domain.
    pub fn into_domain_block(self, origin: &str) -> Option<DomainBlock> {
        if self.domain.contains('*') {
            tracing::debug!(origin, domain = %self.domain, "skipping obfuscated domain");
            return None;
        }

        if !self.digest.is_empty() && !digest_matches(&self.domain, &self.digest) {
            tracing::warn!(
                origin,
                domain = %self.domain,
                digest = %self.digest,
                "digest does not match domain, skipping"
            );
            return None;
        }

        Some(DomainBlock {
            domain: normalize_domain(&self.domain),
            severity: self.severity,
            public_comment: self.comment.filter(|c| !c.is_empty()),
            ..Default::default()
        })
    }
}

fn digest_matches(domain: &str, expected: &str) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    let found = hasher.finalize();

    hex::decode(expected.trim())
        .map(|expected| expected[..] == found[..])
        .unwrap_or(false)
}

/// An instance to pull a blocklist from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSource {
    /// Hostname, or a full base URL such as `http://localhost:3000`.
    pub host: String,
    /// Bearer token, needed for the admin API.
    #[serde(default)]
    pub token: Option<String>,
    /// Read the admin API, which carries every field, instead of the public list.
    #[serde(default)]
    pub admin: bool,
    /// Fields to take from this instance; falls back to the global import fields.
    #[serde(default)]
    pub import_fields: Option<Vec<Field>>,
}

impl InstanceSource {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    fn base_url(&self) -> String {
        base_url(&self.host)
    }
}

/// An instance the merged blocklist is published to through the admin API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDestination {
    /// Hostname, or a full base URL such as `http://localhost:3000`.
    pub host: String,
    /// Bearer token with the `admin:read:domain_blocks` and
    /// `admin:write:domain_blocks` scopes.
    pub token: String,
}

impl InstanceDestination {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
        }
    }
}

fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// https://docs.joinmastodon.org/entities/Admin_DomainBlock/
#[derive(Deserialize, Debug)]
struct AdminDomainBlock {
    id: String,
    #[serde(flatten)]
    block: DomainBlock,
}

/// What a push changed on the destination.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

pub struct MastodonClient {
    client: reqwest::Client,
}

impl Default for MastodonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MastodonClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Fetches the blocklist of one instance, keeping only `import_fields`.
    pub async fn fetch(
        &self,
        source: &InstanceSource,
        import_fields: &[Field],
    ) -> Result<Vec<DomainBlock>> {
        let fields = source.import_fields.as_deref().unwrap_or(import_fields);

        match (&source.token, source.admin) {
            (Some(token), true) => self.fetch_admin(source, token, fields).await,
            (None, true) => {
                tracing::warn!(
                    host = %source.host,
                    "admin API requested without a token, using the public list"
                );
                self.fetch_public(source, fields).await
            }
            _ => self.fetch_public(source, fields).await,
        }
    }

    async fn fetch_public(
        &self,
        source: &InstanceSource,
        import_fields: &[Field],
    ) -> Result<Vec<DomainBlock>> {
        let mut request = self
            .client
            .get(format!("{}/api/v1/instance/domain_blocks", source.base_url()))
            .header("user-agent", USER_AGENT);
        if let Some(token) = &source.token {
            request = request.bearer_auth(token);
        }

        let body = request.send().await?.error_for_status()?.bytes().await?;
        parse_blocklist(&body, &source.host, SourceFormat::Mastodon, import_fields)
    }

    async fn fetch_admin(
        &self,
        source: &InstanceSource,
        token: &str,
        import_fields: &[Field],
    ) -> Result<Vec<DomainBlock>> {
        let blocks = self
            .list_admin(&source.host, token)
            .await?
            .into_iter()
            .map(|b| b.block)
            .filter(|b| !b.domain.trim().is_empty())
            .map(|b| restrict_fields(b, import_fields))
            .collect::<Vec<_>>();

        tracing::info!(host = %source.host, count = blocks.len(), "loaded admin blocklist");
        Ok(blocks)
    }

    async fn list_admin(&self, host: &str, token: &str) -> Result<Vec<AdminDomainBlock>> {
        let mut blocks = Vec::new();
        let mut next = Some(format!(
            "{}/api/v1/admin/domain_blocks?limit={ADMIN_PAGE_LIMIT}",
            base_url(host)
        ));

        while let Some(url) = next.take() {
            let response = self
                .client
                .get(&url)
                .header("user-agent", USER_AGENT)
                .bearer_auth(token)
                .send()
                .await?
                .error_for_status()?;

            next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page_url);

            let page: Vec<AdminDomainBlock> = response.json().await?;
            tracing::debug!(host, count = page.len(), "loaded admin page");
            blocks.extend(page);
        }

        Ok(blocks)
    }

    /// Publishes the merged blocklist to an instance.
    ///
    /// Domains the instance doesn't block yet are created, and existing blocks
    /// that differ in any of `export_fields` are updated. Blocks present only
    /// on the instance are left alone.
    pub async fn push(
        &self,
        destination: &InstanceDestination,
        blocklist: &Blocklist,
        export_fields: &[Field],
    ) -> Result<PushSummary> {
        let fields = export_columns(export_fields);
        let existing = self
            .list_admin(&destination.host, &destination.token)
            .await?
            .into_iter()
            .map(|b| (normalize_domain(&b.block.domain), b))
            .collect::<HashMap<_, _>>();

        let url = format!("{}/api/v1/admin/domain_blocks", base_url(&destination.host));
        let mut summary = PushSummary::default();

        for block in blocklist {
            match existing.get(&block.domain) {
                Some(current) if !differs(&current.block, block, &fields) => summary.unchanged += 1,
                Some(current) => {
                    self.client
                        .put(format!("{url}/{}", current.id))
                        .header("user-agent", USER_AGENT)
                        .bearer_auth(&destination.token)
                        .json(&request_body(block, &fields, false))
                        .send()
                        .await?
                        .error_for_status()?;
                    tracing::debug!(domain = %block.domain, id = %current.id, "updated domain block");
                    summary.updated += 1;
                }
                None => {
                    self.client
                        .post(&url)
                        .header("user-agent", USER_AGENT)
                        .bearer_auth(&destination.token)
                        .json(&request_body(block, &fields, true))
                        .send()
                        .await?
                        .error_for_status()?;
                    tracing::debug!(domain = %block.domain, "added domain block");
                    summary.added += 1;
                }
            }
        }

        tracing::info!(
            host = %destination.host,
            added = summary.added,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "pushed blocklist"
        );
        Ok(summary)
    }
}

fn differs(current: &DomainBlock, wanted: &DomainBlock, fields: &[Field]) -> bool {
    fields
        .iter()
        .filter(|&&f| f != Field::Domain)
        .any(|&f| json_value(current, f) != json_value(wanted, f))
}

// the domain of an existing block can't be changed, so updates leave it out
fn request_body(block: &DomainBlock, fields: &[Field], with_domain: bool) -> Map<String, Value> {
    fields
        .iter()
        .filter(|&&f| with_domain || f != Field::Domain)
        .map(|&f| (f.as_str().to_string(), json_value(block, f)))
        .collect()
}

/// Extracts the `rel="next"` target from a `Link` header.
fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha256_hex(s: &str) -> String {
        hex::encode(Sha256::digest(s.as_bytes()))
    }

    #[test]
    fn public_entry_with_valid_digest() {
        let entry = InstanceDomainBlock {
            domain: "bad.example".into(),
            digest: sha256_hex("bad.example"),
            severity: Severity::Suspend,
            comment: Some("spam".into()),
        };
        assert_eq!(
            entry.into_domain_block("test"),
            Some(DomainBlock::new("bad.example", Severity::Suspend).with_public_comment("spam"))
        );
    }

    #[test]
    fn public_entry_with_wrong_digest() {
        let entry = InstanceDomainBlock {
            domain: "bad.example".into(),
            digest: sha256_hex("other.example"),
            severity: Severity::Silence,
            comment: None,
        };
        assert_eq!(entry.into_domain_block("test"), None);
    }

    #[test]
    fn public_entry_obfuscated() {
        let entry = InstanceDomainBlock {
            domain: "b*d.ex*mple".into(),
            digest: String::new(),
            severity: Severity::Suspend,
            comment: None,
        };
        assert_eq!(entry.into_domain_block("test"), None);
    }

    #[test]
    fn link_header() {
        let link = r#"<https://a.example/api/v1/admin/domain_blocks?limit=200&max_id=5>; rel="next", <https://a.example/api/v1/admin/domain_blocks?min_id=9>; rel="prev""#;
        assert_eq!(
            next_page_url(link).as_deref(),
            Some("https://a.example/api/v1/admin/domain_blocks?limit=200&max_id=5")
        );
        assert_eq!(
            next_page_url(r#"<https://a.example/x?min_id=9>; rel="prev""#),
            None
        );
    }

    #[test]
    fn update_only_when_exported_fields_differ() {
        let current = DomainBlock::new("a.example", Severity::Suspend).with_public_comment("old");
        let wanted = DomainBlock::new("a.example", Severity::Suspend).with_public_comment("new");

        assert!(!differs(&current, &wanted, &[Field::Domain, Field::Severity]));
        assert!(differs(&current, &wanted, &[Field::Domain, Field::PublicComment]));

        let mut renamed = current.clone();
        renamed.domain = "A.Example".into();
        assert!(!differs(&renamed, &current, &Field::ALL));
    }

    #[test]
    fn request_body_fields() {
        let block = DomainBlock::new("a.example", Severity::Silence).with_flags(true, false, false);
        let fields = [Field::Domain, Field::Severity, Field::RejectMedia];

        assert_eq!(
            Value::Object(request_body(&block, &fields, true)),
            serde_json::json!({"domain": "a.example", "severity": "silence", "reject_media": true})
        );
        assert_eq!(
            Value::Object(request_body(&block, &fields, false)),
            serde_json::json!({"severity": "silence", "reject_media": true})
        );
    }

    #[test]
    fn base_url() {
        assert_eq!(InstanceSource::new("mastodon.social").base_url(), "https://mastodon.social");
        assert_eq!(
            InstanceSource::new("http://127.0.0.1:8080/").base_url(),
            "http://127.0.0.1:8080"
        );
    }
}
