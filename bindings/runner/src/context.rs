use anyhow::Context;
use http_client_instrumented::prelude::HttpClient;
use crosswind_runner::prelude::UserValuesConstraint;

/// Per-VU values for HTTP scenarios.
#[derive(Default, Debug)]
pub struct HttpAgentContext {
    /// Set by [crate::prelude::configure_client].
    pub client: Option<HttpClient>,
    /// Set by [crate::prelude::login_or_register] when the login returned a token.
    pub token: Option<String>,
    pub user: Option<serde_json::Value>,
}

impl HttpAgentContext {
    pub fn client(&self) -> anyhow::Result<&HttpClient> {
        self.client
            .as_ref()
            .context("HTTP client is not configured, use `configure_client` as the agent setup hook")
    }
}

impl UserValuesConstraint for HttpAgentContext {}
