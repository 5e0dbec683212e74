//! reqwest-backed [`SourceHost`].

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{HostError, SourceHost};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpSourceHost {
  client: Client,
}

impl HttpSourceHost {
  pub fn new() -> Result<Self, HostError> {
    let client = Client::builder()
      .connect_timeout(CONNECT_TIMEOUT)
      .user_agent(concat!("chromaforge/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| HostError::Network {
        url: String::new(),
        message: e.to_string(),
      })?;
    Ok(Self { client })
  }

  async fn send(&self, url: &str) -> Result<Response, HostError> {
    let response = self.client.get(url).send().await.map_err(|e| network(url, e))?;

    match response.status() {
      status if status.is_success() => Ok(response),
      StatusCode::NOT_FOUND => Err(HostError::NotFound { url: url.to_string() }),
      status => Err(HostError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      }),
    }
  }
}

impl SourceHost for HttpSourceHost {
  async fn get(&self, url: &str) -> Result<Vec<u8>, HostError> {
    debug!(url = %url, "fetching document");
    let response = self.send(url).await?;
    let bytes = response.bytes().await.map_err(|e| network(url, e))?;
    Ok(bytes.to_vec())
  }

  async fn download(&self, url: &str, dest: &Path) -> Result<u64, HostError> {
    info!(url = %url, dest = %dest.display(), "downloading");
    let mut response = self.send(url).await?;

    let io_err = |source| HostError::Io {
      path: dest.to_path_buf(),
      source,
    };

    let mut file = fs::File::create(dest).await.map_err(io_err)?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(|e| network(url, e))? {
      file.write_all(&chunk).await.map_err(io_err)?;
      written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;

    info!(url = %url, size = written, "download complete");
    Ok(written)
  }
}

fn network(url: &str, err: reqwest::Error) -> HostError {
  HostError::Network {
    url: url.to_string(),
    message: err.to_string(),
  }
}
