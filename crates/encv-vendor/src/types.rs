use serde::Deserialize;
use serde_json::Value;

/// Body of `GET /api/stats/realm.json`.
///
/// Entries are kept as raw JSON; flattening them is the pipeline's job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealmStatsResponse {
    #[serde(default)]
    pub statistics: Option<Vec<Value>>,
    #[serde(default)]
    pub error: Option<String>,
}
