use serde::{Deserialize, Serialize};
use skyscale_state::AppId;

/// A threshold breach delivered by the upstream evaluator.
///
/// Consumed once per `scale` call. The app identifier is accepted as
/// either `app_id` or `appId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    #[serde(alias = "appId")]
    pub app_id: AppId,
    #[serde(default)]
    pub metric_type: String,
    #[serde(default)]
    pub metric_unit: String,
    #[serde(default)]
    pub breach_duration_secs: u64,
    #[serde(default)]
    pub cool_down_secs: u64,
    #[serde(default)]
    pub threshold: i64,
    #[serde(default)]
    pub operator: String,
    pub adjustment: String,
}

impl Trigger {
    /// Human readable reason recorded in scaling history.
    pub fn reason(&self) -> String {
        format!(
            "{} instance(s) because {} {} {}{} for {} seconds",
            self.adjustment,
            self.metric_type,
            self.operator,
            self.threshold,
            self.metric_unit,
            self.breach_duration_secs
        )
    }
}
