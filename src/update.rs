use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::*;

use crate::admission::NEXUS_COMMUNITY_IMAGE;

const TAGS_ENDPOINT: &str = "https://hub.docker.com/v2/repositories";
const TAG_PAGE_SIZE: u32 = 100;
const MAX_TAG_PAGES: u32 = 20;

/// Resolves the newest release lines of the tracked image.
///
/// `latest_micro` returning `None` means the minor line does not exist, which
/// is distinct from a transport failure in `latest_minor`.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn latest_minor(&self) -> Result<i32>;
    async fn latest_micro(&self, minor: i32) -> Option<String>;
}

/// `minor -> micro -> full tag`, e.g. `70 -> 1 -> "3.70.1"`.
type TagIndex = BTreeMap<i32, BTreeMap<i32, String>>;

/// Update source backed by the Docker Hub tag listing of one repository.
///
/// Tags are fetched once per value and cached, so one defaulting invocation
/// performs at most one listing walk.
pub struct HubUpdateSource {
    repository: String,
    http: reqwest::Client,
    tags: OnceCell<TagIndex>,
}

#[derive(Deserialize)]
struct TagPage {
    next: Option<String>,
    results: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl HubUpdateSource {
    pub fn new(repository: &str) -> Self {
        // hub repositories are addressed without the registry host
        let repository = repository.trim_start_matches("docker.io/").to_string();
        Self {
            repository,
            http: reqwest::Client::new(),
            tags: OnceCell::new(),
        }
    }

    /// Source tracking the community Nexus image.
    pub fn community() -> Self {
        Self::new(NEXUS_COMMUNITY_IMAGE)
    }

    async fn tags(&self) -> Result<&TagIndex> {
        self.tags.get_or_try_init(|| self.fetch_tags()).await
    }

    async fn fetch_tags(&self) -> Result<TagIndex> {
        let mut tags = TagIndex::new();
        let mut url = format!(
            "{}/{}/tags?page_size={}",
            TAGS_ENDPOINT, self.repository, TAG_PAGE_SIZE
        );

        for _ in 0..MAX_TAG_PAGES {
            debug!("Fetching tags for {}: {}", self.repository, url);
            let page: TagPage = self
                .http
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            for entry in page.results {
                if let Some((minor, micro)) = parse_tag(&entry.name) {
                    tags.entry(minor).or_default().insert(micro, entry.name);
                }
            }

            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(tags)
    }
}

#[async_trait]
impl UpdateSource for HubUpdateSource {
    async fn latest_minor(&self) -> Result<i32> {
        self.tags()
            .await?
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| anyhow!("no versioned tags found for {}", self.repository))
    }

    async fn latest_micro(&self, minor: i32) -> Option<String> {
        // only reached after a successful minor resolution, so a fetch error
        // here is indistinguishable from (and as safe as) a missing minor
        let minors = self.tags().await.ok()?;
        minors.get(&minor)?.values().next_back().cloned()
    }
}

/// Parses tags shaped `major.minor.micro` such as `3.70.1` into
/// `(minor, micro)`. Channel tags like `latest` are skipped.
fn parse_tag(name: &str) -> Option<(i32, i32)> {
    let mut parts = name.split('.');
    let _major: i32 = parts.next()?.parse().ok()?;
    let minor: i32 = parts.next()?.parse().ok()?;
    let micro: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((minor, micro))
}
