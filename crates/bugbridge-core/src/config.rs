use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Application-level OAuth client identity and provider endpoints.
///
/// One instance covers the single tracker provider; it is built once at
/// startup and injected into the components that talk to the provider.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// OAuth client id registered with the provider.
    pub client_id: String,
    /// OAuth client secret; application-level, never per-user.
    pub client_secret: String,
    /// Interactive authorization endpoint.
    pub auth_url: String,
    /// Token endpoint for both code exchange and refresh grants.
    pub token_url: String,
    /// Base URL of the provider API gateway.
    pub api_base: String,
    /// Redirect URI registered for the authorization-code flow.
    pub redirect_uri: String,
    /// Scopes requested during authorization.
    pub scopes: Vec<String>,
    /// `audience` parameter for the authorize request, when required.
    pub audience: Option<String>,
    /// Deadline applied to every outbound provider call.
    pub http_timeout: Duration,
}

impl TrackerConfig {
    /// Build an outbound HTTP client honouring the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }

    /// API root for a connected workspace.
    pub fn site_api_base(&self, site_id: &str) -> String {
        format!("{}/ex/jira/{site_id}", self.api_base.trim_end_matches('/'))
    }

    /// Endpoint listing the workspaces an access token can reach.
    pub fn accessible_resources_url(&self) -> String {
        format!(
            "{}/oauth/token/accessible-resources",
            self.api_base.trim_end_matches('/')
        )
    }

    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://auth.atlassian.com/authorize".to_owned(),
            token_url: "https://auth.atlassian.com/oauth/token".to_owned(),
            api_base: "https://api.atlassian.com".to_owned(),
            redirect_uri: String::new(),
            scopes: vec![
                "read:jira-user".to_owned(),
                "read:jira-work".to_owned(),
                "write:jira-work".to_owned(),
                "read:jira-board".to_owned(),
                "offline_access".to_owned(),
            ],
            audience: Some("api.atlassian.com".to_owned()),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}
