use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, LINK};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::config::RegistryConfig;
use crate::models::RegistryTaggedImage;

const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Tags never included in the stored-image inventory.
const EXCLUDED_TAGS: [&str; 1] = ["latest"];

/// How many tags are resolved concurrently per repository.
const RESOLVE_CONCURRENCY: usize = 10;

#[derive(Debug, Deserialize)]
struct Catalog {
    repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    config: Option<ManifestConfig>,
}

#[derive(Debug, Deserialize)]
struct ManifestConfig {
    digest: String,
}

/// Image config blob; carries the push-time `created` timestamp.
#[derive(Debug, Deserialize)]
struct ImageConfig {
    created: Option<DateTime<Utc>>,
}

/// Registry V2 API client for a single registry.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    host: String,
    verbose: bool,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig, verbose: bool) -> Self {
        let host = config.url.trim_end_matches('/').to_string();
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.clone()
        } else {
            format!("https://{}", host)
        };
        Self {
            client: Client::new(),
            base_url,
            host,
            verbose,
        }
    }

    /// GET /v2/_catalog with pagination
    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        let mut repos = Vec::new();
        let mut url = format!("{}/v2/_catalog", self.base_url);

        loop {
            if self.verbose {
                eprintln!("[DEBUG] GET {}", url);
            }
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .context("Failed to fetch catalog")?;

            let next_link = Self::parse_next_link(&resp);

            let catalog: Catalog = resp.json().await.context("Failed to parse catalog JSON")?;
            repos.extend(catalog.repositories);

            match next_link {
                Some(next) => url = self.resolve_url(&next),
                None => break,
            }
        }

        Ok(repos)
    }

    /// GET /v2/<repo>/tags/list with pagination
    async fn list_tags(&self, repo: &str) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut url = format!("{}/v2/{}/tags/list", self.base_url, repo);

        loop {
            if self.verbose {
                eprintln!("[DEBUG] GET {}", url);
            }
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("Failed to fetch tags for {}", repo))?;

            let next_link = Self::parse_next_link(&resp);

            let tag_list: TagList = resp
                .json()
                .await
                .with_context(|| format!("Failed to parse tag list for {}", repo))?;

            if let Some(t) = tag_list.tags {
                tags.extend(t);
            }

            match next_link {
                Some(next) => url = self.resolve_url(&next),
                None => break,
            }
        }

        Ok(tags)
    }

    /// HEAD /v2/<repo>/manifests/<tag> — extract Docker-Content-Digest header
    async fn get_digest(&self, repo: &str, tag: &str) -> Result<String> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, tag);
        if self.verbose {
            eprintln!("[DEBUG] HEAD {}", url);
        }
        let resp = self
            .client
            .head(&url)
            .header(ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await
            .with_context(|| format!("Failed to HEAD manifest for {}:{}", repo, tag))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HEAD manifest for {}:{} returned status {}", repo, tag, status);
        }

        resp.headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .with_context(|| format!("Missing Docker-Content-Digest header for {}:{}", repo, tag))
    }

    /// GET /v2/<repo>/manifests/<tag>
    async fn get_manifest(&self, repo: &str, tag: &str) -> Result<Manifest> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, tag);
        if self.verbose {
            eprintln!("[DEBUG] GET {}", url);
        }
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await
            .with_context(|| format!("Failed to GET manifest for {}:{}", repo, tag))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET manifest for {}:{} returned status {}", repo, tag, status);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse manifest for {}:{}", repo, tag))
    }

    /// GET /v2/<repo>/blobs/<config_digest> — the created timestamp lives here
    async fn get_image_config(&self, repo: &str, config_digest: &str) -> Result<ImageConfig> {
        let url = format!("{}/v2/{}/blobs/{}", self.base_url, repo, config_digest);
        if self.verbose {
            eprintln!("[DEBUG] GET {}", url);
        }
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to GET blob {} for {}", config_digest, repo))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET blob {} for {} returned status {}", config_digest, repo, status);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse image config for {}", repo))
    }

    /// Resolve one tag's push timestamp via its manifest config blob.
    async fn resolve_created(&self, repo: &str, tag: &str) -> Result<Option<DateTime<Utc>>> {
        let manifest = self.get_manifest(repo, tag).await?;
        let Some(config) = manifest.config else {
            return Ok(None);
        };
        let image_config = self.get_image_config(repo, &config.digest).await?;
        Ok(image_config.created)
    }

    /// Build the full stored-image inventory: every repository, every tag
    /// except the excluded ones, each with its creation timestamp. Tags whose
    /// timestamp cannot be determined are left out of the inventory (and so
    /// can never be deleted) with a warning.
    pub async fn stored_images(&self) -> Result<HashSet<RegistryTaggedImage>> {
        let repos = self.list_repositories().await?;
        let mut images = HashSet::new();

        for repo in &repos {
            if self.verbose {
                eprintln!("[DEBUG] Inventorying repository: {}", repo);
            }

            let tags = self.list_tags(repo).await?;
            let semaphore = Arc::new(Semaphore::new(RESOLVE_CONCURRENCY));
            let mut handles = Vec::with_capacity(tags.len());

            for tag in tags {
                if EXCLUDED_TAGS.contains(&tag.as_str()) {
                    continue;
                }
                let permit = semaphore.clone().acquire_owned().await?;
                let client = self.clone();
                let repo = repo.clone();

                handles.push(tokio::spawn(async move {
                    let result = client.resolve_created(&repo, &tag).await;
                    drop(permit);
                    (tag, result)
                }));
            }

            for handle in handles {
                let (tag, result) = handle.await.context("Task join error")?;
                match result {
                    Ok(Some(created_on)) => {
                        images.insert(RegistryTaggedImage {
                            registry: self.host.clone(),
                            name: repo.clone(),
                            tag,
                            created_on,
                        });
                    }
                    Ok(None) => {
                        eprintln!(
                            "[WARN] {}:{} has no creation timestamp; leaving it alone",
                            repo, tag
                        );
                    }
                    Err(e) => {
                        eprintln!("[WARN] Could not resolve {}:{}: {:#}", repo, tag, e);
                    }
                }
            }
        }

        Ok(images)
    }

    /// Delete a stored image: look up the manifest digest for its tag, then
    /// DELETE /v2/<repo>/manifests/<digest>.
    pub async fn delete_image(&self, image: &RegistryTaggedImage) -> Result<()> {
        let digest = self.get_digest(&image.name, &image.tag).await?;
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, image.name, digest);
        if self.verbose {
            eprintln!("[DEBUG] DELETE {}", url);
        }
        let resp = self
            .client
            .delete(&url)
            .header(ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await
            .with_context(|| format!("Failed to DELETE manifest {} for {}", digest, image.name))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!(
                "DELETE manifest {} for {} returned status {}",
                digest,
                image.name,
                status
            );
        }

        Ok(())
    }

    /// Parse the Link header for pagination (next URL)
    fn parse_next_link(resp: &reqwest::Response) -> Option<String> {
        let link = resp.headers().get(LINK)?.to_str().ok()?;
        // Link: </v2/_catalog?n=100&last=xxx>; rel="next"
        if link.contains("rel=\"next\"") {
            let start = link.find('<')? + 1;
            let end = link.find('>')?;
            Some(link[start..end].to_string())
        } else {
            None
        }
    }

    /// Resolve a relative URL path against the base URL
    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }
}
