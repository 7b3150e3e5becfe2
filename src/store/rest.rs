use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::KvStore;
use crate::{Error, Result};

/// Client for Redis-over-HTTP services (Upstash, Vercel KV).
///
/// Each command is POSTed to the base URL as a JSON array such as
/// `["SET", "key", "value"]`; replies look like `{"result": ...}` or
/// `{"error": "..."}`.
pub struct RestStore {
    client: Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl RestStore {
    pub fn new(url: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn command(&self, args: &[&str]) -> Result<Value> {
        debug!("KV command {}", args.first().copied().unwrap_or_default());

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await
            .map_err(|e| Error::Store(format!("rest: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Store(format!("rest: {}", e)))?;

        let reply: Reply = match serde_json::from_str(&text) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                return Err(Error::Store(format!("rest: {} {}", status, text.trim())));
            }
            Err(e) => return Err(Error::Store(format!("rest: malformed reply: {}", e))),
        };

        if let Some(error) = reply.error {
            return Err(Error::Store(format!("rest: {}", error)));
        }
        if !status.is_success() {
            return Err(Error::Store(format!("rest: {}", status)));
        }

        Ok(reply.result)
    }
}

/// Escape glob metacharacters so a prefix matches literally in `KEYS`.
fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unexpected(command: &str, value: &Value) -> Error {
    Error::Store(format!("rest: unexpected {} reply: {}", command, value))
}

#[async_trait]
impl KvStore for RestStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(&["GET", key]).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(unexpected("GET", &other)),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.command(&["SET", key, value]).await?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        match self.command(&["SET", key, value, "NX"]).await? {
            Value::Null => Ok(false),
            Value::String(s) if s == "OK" => Ok(true),
            other => Err(unexpected("SET NX", &other)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", glob_escape(prefix));
        let items = match self.command(&["KEYS", &pattern]).await? {
            Value::Array(items) => items,
            other => return Err(unexpected("KEYS", &other)),
        };
        let mut keys = items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(unexpected("KEYS", &other)),
            })
            .collect::<Result<Vec<_>>>()?;
        keys.sort();
        Ok(keys)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let value = self.command(&["INCR", key]).await?;
        value.as_i64().ok_or_else(|| unexpected("INCR", &value))
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}
