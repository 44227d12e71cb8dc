//! Run identity and correlation labels

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Label key shared by every resource created by this tool
pub const APP_LABEL: &str = "app";

/// Value of the [`APP_LABEL`] label
pub const APP_NAME: &str = "run-job";

/// Label key carrying the [`RunId`] of the invocation
pub const RUN_ID_LABEL: &str = "run-id";

/// Unique token minted once per invocation
///
/// The run id is the only correlation key between the submitted Job, its
/// pods and the watch filter. It is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Mints a fresh run id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Label selector matching every resource of this run
    pub fn label_selector(&self) -> String {
        format!("{}={}", RUN_ID_LABEL, self.0)
    }

    /// The `{app, run-id}` label pair stamped on the Job and its pod template
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.to_string(), APP_NAME.to_string()),
            (RUN_ID_LABEL.to_string(), self.0.to_string()),
        ])
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn test_label_selector_uses_run_id_label() {
        let uuid = Uuid::new_v4();
        let run_id = RunId::from(uuid);
        assert_eq!(run_id.label_selector(), format!("run-id={}", uuid));
    }

    #[test]
    fn test_labels_are_exactly_app_and_run_id() {
        let run_id = RunId::new();
        let labels = run_id.labels();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("app"), Some(&"run-job".to_string()));
        assert_eq!(labels.get("run-id"), Some(&run_id.to_string()));
    }
}
