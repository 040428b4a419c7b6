use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Patch,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Patch => "PATCH",
    }
  }
}

/// One call against the control API. `path` is relative to the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  pub path: String,
  pub body: Option<Value>,
}

impl Request {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      path: path.into(),
      body: None,
    }
  }

  pub fn with_body(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
    Self {
      method,
      path: path.into(),
      body,
    }
  }
}

/// A single attempt at a request. Retries and timeouts live above this.
pub trait Transport: Send + Sync + 'static {
  fn send(&self, request: &Request) -> impl Future<Output = Result<Value, RemoteError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
  fn send(&self, request: &Request) -> impl Future<Output = Result<Value, RemoteError>> + Send {
    (**self).send(request)
  }
}

/// `reqwest` transport against the real control API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
  api_key: Option<String>,
}

impl HttpTransport {
  pub fn new(base_url: Url, api_key: Option<String>, connect_timeout: Duration) -> Result<Self, RemoteError> {
    let client = reqwest::Client::builder()
      .connect_timeout(connect_timeout)
      .user_agent(concat!("homedeck/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| RemoteError::Transport {
        endpoint: base_url.to_string(),
        message: e.to_string(),
      })?;

    Ok(Self {
      client,
      base_url,
      api_key: api_key.filter(|k| !k.is_empty()),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn endpoint_url(&self, path: &str) -> String {
    format!(
      "{}/{}",
      self.base_url.as_str().trim_end_matches('/'),
      path.trim_start_matches('/')
    )
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: &Request) -> impl Future<Output = Result<Value, RemoteError>> + Send {
    let url = self.endpoint_url(&request.path);
    let endpoint = request.path.clone();

    let mut builder = match request.method {
      Method::Get => self.client.get(&url),
      Method::Post => self.client.post(&url),
      Method::Patch => self.client.patch(&url),
    };
    if let Some(key) = &self.api_key {
      builder = builder.header("X-API-Key", key);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    async move {
      let response = builder.send().await.map_err(|e| RemoteError::Transport {
        endpoint: endpoint.clone(),
        message: e.to_string(),
      })?;

      let status = response.status();
      if !status.is_success() {
        return Err(RemoteError::Http {
          endpoint,
          status: status.as_u16(),
        });
      }

      let bytes = response.bytes().await.map_err(|e| RemoteError::Transport {
        endpoint: endpoint.clone(),
        message: e.to_string(),
      })?;
      if bytes.is_empty() {
        return Ok(Value::Null);
      }

      serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode {
        endpoint,
        message: e.to_string(),
      })
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted transport for exercising retry and fallback paths.

  use super::*;
  use std::collections::{HashMap, VecDeque};
  use std::sync::Mutex;

  type Outcome = Result<Value, RemoteError>;

  #[derive(Default)]
  struct Script {
    queued: HashMap<String, VecDeque<Outcome>>,
    always: HashMap<String, Outcome>,
    delays: HashMap<String, Duration>,
    calls: Vec<Request>,
  }

  /// Answers from per-path queues, then per-path defaults, then a transport error.
  #[derive(Default)]
  pub struct ScriptedTransport {
    script: Mutex<Script>,
  }

  impl ScriptedTransport {
    pub fn new() -> Self {
      Self::default()
    }

    /// Queue a one-shot outcome for `path`.
    pub fn push(&self, path: &str, outcome: Outcome) -> &Self {
      self
        .script
        .lock()
        .unwrap()
        .queued
        .entry(path.to_string())
        .or_default()
        .push_back(outcome);
      self
    }

    /// Answer every otherwise-unscripted call to `path` with `outcome`.
    pub fn always(&self, path: &str, outcome: Outcome) -> &Self {
      self.script.lock().unwrap().always.insert(path.to_string(), outcome);
      self
    }

    /// Delay every answer for `path`.
    pub fn delay(&self, path: &str, delay: Duration) -> &Self {
      self.script.lock().unwrap().delays.insert(path.to_string(), delay);
      self
    }

    pub fn calls(&self, path: &str) -> usize {
      self
        .script
        .lock()
        .unwrap()
        .calls
        .iter()
        .filter(|r| r.path == path)
        .count()
    }

    pub fn requests(&self) -> Vec<Request> {
      self.script.lock().unwrap().calls.clone()
    }

    fn next(&self, request: &Request) -> (Outcome, Option<Duration>) {
      let mut script = self.script.lock().unwrap();
      script.calls.push(request.clone());
      let delay = script.delays.get(&request.path).copied();

      let queued = script
        .queued
        .get_mut(&request.path)
        .and_then(|q| q.pop_front());
      let outcome = queued
        .or_else(|| script.always.get(&request.path).cloned())
        .unwrap_or_else(|| Err(refused(&request.path)));
      (outcome, delay)
    }
  }

  pub fn refused(path: &str) -> RemoteError {
    RemoteError::Transport {
      endpoint: path.to_string(),
      message: "connection refused".to_string(),
    }
  }

  impl Transport for ScriptedTransport {
    fn send(&self, request: &Request) -> impl Future<Output = Result<Value, RemoteError>> + Send {
      let (outcome, delay) = self.next(request);
      async move {
        if let Some(delay) = delay {
          tokio::time::sleep(delay).await;
        }
        outcome
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::prelude::*;
  use serde_json::json;

  fn transport(server: &MockServer, key: Option<&str>) -> HttpTransport {
    let base = Url::parse(&server.url("/api/")).unwrap();
    HttpTransport::new(base, key.map(String::from), Duration::from_secs(2)).unwrap()
  }

  #[tokio::test]
  async fn test_get_sends_api_key() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when.method(GET).path("/api/services").header("X-API-Key", "secret");
        then.status(200).json_body(json!([{"id": "svc-1"}]));
      })
      .await;

    let value = transport(&server, Some("secret"))
      .send(&Request::get("/services"))
      .await
      .unwrap();
    assert_eq!(value, json!([{"id": "svc-1"}]));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_non_success_status_is_http_error() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/api/health");
        then.status(503);
      })
      .await;

    let err = transport(&server, None)
      .send(&Request::get("/health"))
      .await
      .unwrap_err();
    assert_eq!(
      err,
      RemoteError::Http {
        endpoint: "/health".to_string(),
        status: 503
      }
    );
  }

  #[tokio::test]
  async fn test_empty_body_is_null_and_garbage_is_decode_error() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(POST).path("/api/services/svc-1/restart");
        then.status(204);
      })
      .await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/api/storage");
        then.status(200).body("<html>");
      })
      .await;

    let t = transport(&server, None);
    let value = t
      .send(&Request::with_body(Method::Post, "services/svc-1/restart", None))
      .await
      .unwrap();
    assert_eq!(value, Value::Null);

    let err = t.send(&Request::get("/storage")).await.unwrap_err();
    assert!(matches!(err, RemoteError::Decode { .. }));
  }
}
