/// HTTP endpoint paths.
pub mod endpoints {
    /// `POST` stores an article, `GET` reads one.
    pub const MSGID: &str = "/msgid";
    pub const STATS: &str = "/stats";
    pub const PARTITIONS: &str = "/partitions";
    pub const HEALTH: &str = "/v1/health";
}

/// Health check response.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}
