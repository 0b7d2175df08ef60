//! Request and response payloads for the coach endpoints.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/ai-coach-v2/generate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachRequest {
    /// Ask for a token stream instead of a single JSON body.
    pub stream: bool,
    /// Bypass the backend's response cache.
    pub force: bool,
    /// P&L year to coach on. The backend defaults to the current year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl CoachRequest {
    /// A non-streaming request.
    #[must_use]
    pub fn once(force: bool, year: Option<i32>) -> Self {
        Self {
            stream: false,
            force,
            year,
        }
    }

    /// A streaming request.
    #[must_use]
    pub fn streaming(force: bool, year: Option<i32>) -> Self {
        Self {
            stream: true,
            force,
            year,
        }
    }
}

/// Structured coaching output.
///
/// Every field defaults when absent so partially-filled payloads from the
/// model still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoachReport {
    /// Short headline, usually under 200 characters.
    #[serde(default)]
    pub summary: String,
    /// Free-form comparison of current numbers against goals.
    #[serde(default)]
    pub stats: serde_json::Value,
    /// Recommended actions, at most three in practice.
    #[serde(default)]
    pub actions: Vec<CoachAction>,
    /// Risk flags.
    #[serde(default)]
    pub risks: Vec<String>,
    /// What the agent should log next.
    #[serde(default)]
    pub next_inputs: Vec<String>,
}

impl CoachReport {
    /// Interpret a fallback payload delivered at the end of a stream.
    ///
    /// The backend sends a JSON report; anything else is kept verbatim as
    /// the summary.
    #[must_use]
    pub fn from_fallback(payload: &str) -> Self {
        match serde_json::from_str::<Self>(payload) {
            Ok(report) => report,
            Err(_) => Self {
                summary: payload.to_string(),
                ..Self::default()
            },
        }
    }
}

/// A recommended action. The model emits either bare strings or objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoachAction {
    /// `"Call 20 past clients this week"`
    Text(String),
    /// `{"text": "..."}`, `{"title": "..."}` or some other object.
    Structured(serde_json::Value),
}

impl CoachAction {
    /// Display text: the string itself, else `text`, else `title`, else the
    /// JSON rendering of the object.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => ["text", "title"]
                .iter()
                .find_map(|key| v.get(key).and_then(|t| t.as_str()))
                .map(str::to_string)
                .unwrap_or_else(|| v.to_string()),
        }
    }
}

/// Output of `GET /api/ai-coach-v2/diag`: what data the coach can see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachDiagnostics {
    /// Truncated user id, e.g. `"1a2b3c4d..."`.
    #[serde(default)]
    pub user_id_prefix: String,
    /// Subscription plan name.
    #[serde(default)]
    pub user_plan: String,
    #[serde(default)]
    pub goals_count: u64,
    /// Activity entries in the last 28 days.
    #[serde(default)]
    pub activity_entries: u64,
    #[serde(default)]
    pub reflections_count: u64,
    #[serde(default)]
    pub pnl_deals: u64,
    #[serde(default)]
    pub data_summary: DataSummary,
}

/// Presence flags for each coach input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSummary {
    #[serde(default)]
    pub has_goals: bool,
    #[serde(default)]
    pub has_recent_activity: bool,
    #[serde(default)]
    pub has_reflections: bool,
    #[serde(default)]
    pub has_pnl_data: bool,
}

impl DataSummary {
    /// Whether the coach has nothing to work with and will answer with a
    /// canned "start logging" report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.has_goals || self.has_recent_activity || self.has_reflections || self.has_pnl_data)
    }
}
