//! GitHub-backed document store: one public repository per identifier under
//! the token owner's account, files through the contents API.

use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{Container, DocumentStore, Record};
use crate::error::{LyricsError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct Repo {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ContentEntry {
    name: String,
}

#[derive(Deserialize)]
struct FileContent {
    name: String,
    sha: String,
    #[serde(default)]
    content: String,
}

/// Map a non-success response onto the store error kinds.
fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => LyricsError::NotFound(what.to_string()),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            LyricsError::Conflict(format!("{}: {}", what, body))
        }
        _ => LyricsError::PersistFailure(format!("{} failed with status {}: {}", what, status, body)),
    })
}

/// Contents API bodies are base64 with embedded line breaks.
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| LyricsError::Parse(format!("file content: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn not_found_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct GithubStore {
    client: Client,
    api_base: String,
    owner: String,
    branch: String,
}

impl GithubStore {
    /// Authenticate and resolve the owning account.
    pub fn connect(
        token: &str,
        api_base: &str,
        branch: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(LyricsError::Config("GitHub token is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| LyricsError::Config("GitHub token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        let api_base = api_base.trim_end_matches('/').to_string();
        let user: User = check(client.get(format!("{}/user", api_base)).send()?, "current user")?.json()?;
        debug!("GitHub store owner: {}", user.login);

        Ok(Self {
            client,
            api_base,
            owner: user.login,
            branch: branch.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn repo_url(&self, id: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.owner, id)
    }

    fn contents_url(&self, id: &str, name: &str) -> String {
        format!("{}/contents/{}", self.repo_url(id), name)
    }

    fn put_file(
        &self,
        id: &str,
        name: &str,
        content: &str,
        sha: Option<&str>,
        message: &str,
    ) -> Result<()> {
        let mut body = json!({
            "message": message,
            "content": general_purpose::STANDARD.encode(content),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }
        let what = format!("write {}/{}", id, name);
        check(self.client.put(self.contents_url(id, name)).json(&body).send()?, &what)?;
        Ok(())
    }
}

impl DocumentStore for GithubStore {
    fn container(&self, id: &str) -> Result<Option<Container>> {
        let response = self.client.get(self.repo_url(id)).send()?;
        let repo = not_found_as_none(check(response, id))?;
        match repo {
            Some(response) => {
                let repo: Repo = response.json()?;
                Ok(Some(Container {
                    name: repo.name,
                    description: repo.description,
                }))
            }
            None => Ok(None),
        }
    }

    fn create_container(&self, id: &str, description: &str) -> Result<Container> {
        let body = json!({
            "name": id,
            "description": description,
            "private": false,
            "auto_init": false,
        });
        let response = self
            .client
            .post(format!("{}/user/repos", self.api_base))
            .json(&body)
            .send()?;
        let repo: Repo = check(response, &format!("create repository {}", id))?.json()?;
        Ok(Container {
            name: repo.name,
            description: repo.description,
        })
    }

    fn set_description(&self, id: &str, description: &str) -> Result<()> {
        let response = self
            .client
            .patch(self.repo_url(id))
            .json(&json!({ "description": description }))
            .send()?;
        check(response, &format!("describe {}", id))?;
        Ok(())
    }

    fn list_records(&self, id: &str) -> Result<Vec<String>> {
        // An empty repository answers 404 here.
        let response = self.client.get(format!("{}/contents/", self.repo_url(id))).send()?;
        match not_found_as_none(check(response, id))? {
            Some(response) => {
                let entries: Vec<ContentEntry> = response.json()?;
                Ok(entries.into_iter().map(|e| e.name).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    fn read_record(&self, id: &str, name: &str) -> Result<Option<Record>> {
        let response = self.client.get(self.contents_url(id, name)).send()?;
        let Some(response) = not_found_as_none(check(response, name))? else {
            return Ok(None);
        };
        let file: FileContent = response.json()?;
        Ok(Some(Record {
            name: file.name,
            content: decode_content(&file.content)?,
            revision: file.sha,
        }))
    }

    fn create_record(&self, id: &str, name: &str, content: &str, message: &str) -> Result<()> {
        self.put_file(id, name, content, None, message)
    }

    fn update_record(
        &self,
        id: &str,
        name: &str,
        content: &str,
        revision: &str,
        message: &str,
    ) -> Result<()> {
        self.put_file(id, name, content, Some(revision), message)
    }

    fn delete_record(&self, id: &str, name: &str, revision: &str, message: &str) -> Result<()> {
        let body = json!({
            "message": message,
            "sha": revision,
            "branch": self.branch,
        });
        let response = self.client.delete(self.contents_url(id, name)).json(&body).send()?;
        check(response, &format!("delete {}/{}", id, name))?;
        Ok(())
    }

    fn container_url(&self, id: &str) -> String {
        format!("https://github.com/{}/{}", self.owner, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_content_ignores_line_breaks() {
        let encoded = general_purpose::STANDARD.encode("# 夜に駆ける\n\nbody");
        let (a, b) = encoded.split_at(8);
        assert_eq!(decode_content(&format!("{}\n{}\n", a, b)).unwrap(), "# 夜に駆ける\n\nbody");
        assert!(decode_content("@@@").is_err());
    }

    #[test]
    fn test_not_found_as_none() {
        assert_eq!(not_found_as_none(Ok(1)).unwrap(), Some(1));
        let missing: Result<i32> = Err(LyricsError::NotFound("x".into()));
        assert_eq!(not_found_as_none(missing).unwrap(), None);
        let failed: Result<i32> = Err(LyricsError::PersistFailure("x".into()));
        assert!(not_found_as_none(failed).is_err());
    }

    #[test]
    fn test_connect_rejects_empty_token() {
        let err = GithubStore::connect(" ", DEFAULT_API_BASE, "main", "ua", DEFAULT_TIMEOUT);
        assert!(matches!(err, Err(LyricsError::Config(_))));
    }
}
