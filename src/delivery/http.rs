use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use super::{DeliveryTransport, PING_PATH};

/// HTTP transport backed by a `ureq` agent.
pub struct HttpTransport {
    base: Url,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(server_url).context("parse delivery server url")?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported delivery scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        // Endpoints are joined as siblings of the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { base, agent })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("join endpoint {}", path))
    }
}

impl DeliveryTransport for HttpTransport {
    fn post_json(&mut self, path: &str, body: &[u8]) -> Result<u16> {
        let url = self.endpoint(path)?;
        let result = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .send_bytes(body);
        status_of(result, &url)
    }

    fn ping(&mut self) -> Result<u16> {
        let url = self.endpoint(PING_PATH)?;
        let result = self.agent.get(url.as_str()).call();
        status_of(result, &url)
    }
}

fn status_of(result: std::result::Result<ureq::Response, ureq::Error>, url: &Url) -> Result<u16> {
    match result {
        Ok(response) => Ok(response.status()),
        Err(ureq::Error::Status(code, _)) => Ok(code),
        Err(err) => Err(anyhow!("request to {} failed: {}", url, err)),
    }
}
