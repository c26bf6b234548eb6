use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use secscan_core::{OutcomeLedger, PluginRecord};

/// JSON shape of a finished run.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub plugins: &'a IndexMap<String, PluginRecord>,
    pub summary: Summary,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_succeeded: usize,
    pub total_failed: usize,
}

impl<'a> From<&'a OutcomeLedger> for JsonReport<'a> {
    fn from(ledger: &'a OutcomeLedger) -> Self {
        Self {
            plugins: &ledger.plugins,
            summary: Summary {
                total_succeeded: ledger.total_succeeded(),
                total_failed: ledger.total_failed(),
            },
            started_at: ledger.started_at,
            finished_at: ledger.finished_at,
        }
    }
}

/// Format the outcome ledger as JSON, keeping plugin order.
pub fn format_report(ledger: &OutcomeLedger, compact: bool) -> String {
    let report = JsonReport::from(ledger);
    if compact {
        serde_json::to_string(&report).expect("JsonReport should be serializable")
    } else {
        serde_json::to_string_pretty(&report).expect("JsonReport should be serializable")
    }
}
