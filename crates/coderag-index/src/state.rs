//! Per-namespace ingestion lifecycle.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ingestion state of one repository namespace.
///
/// ```text
/// NotIngested -> Ingesting -> Ready | Failed
/// Ready       -> ReIngesting -> Ready | Failed
/// Failed      -> Ingesting
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    #[default]
    NotIngested,
    Ingesting,
    Ready,
    ReIngesting,
    Failed,
}

impl IngestState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotIngested => "not_ingested",
            Self::Ingesting => "ingesting",
            Self::Ready => "ready",
            Self::ReIngesting => "re_ingesting",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Ingesting | Self::ReIngesting)
    }

    /// State entered when an ingestion run starts, or `None` if one is
    /// already running.
    #[must_use]
    pub fn begin(self) -> Option<Self> {
        match self {
            Self::NotIngested | Self::Failed => Some(Self::Ingesting),
            Self::Ready => Some(Self::ReIngesting),
            Self::Ingesting | Self::ReIngesting => None,
        }
    }

    /// State entered when a run ends. Only fatal errors fail a run.
    #[must_use]
    pub fn finish(self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (Self::Ingesting | Self::ReIngesting, true) => Self::Ready,
            (Self::Ingesting | Self::ReIngesting, false) => Self::Failed,
            (other, _) => other,
        }
    }
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_ingested" => Ok(Self::NotIngested),
            "ingesting" => Ok(Self::Ingesting),
            "ready" => Ok(Self::Ready),
            "re_ingesting" => Ok(Self::ReIngesting),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ingest state: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_ingestion_path() {
        let s = IngestState::NotIngested.begin().unwrap();
        assert_eq!(s, IngestState::Ingesting);
        assert_eq!(s.finish(true), IngestState::Ready);
        assert_eq!(s.finish(false), IngestState::Failed);
    }

    #[test]
    fn resubmission_paths() {
        assert_eq!(IngestState::Ready.begin(), Some(IngestState::ReIngesting));
        assert_eq!(IngestState::Failed.begin(), Some(IngestState::Ingesting));
        assert_eq!(
            IngestState::ReIngesting.finish(true),
            IngestState::Ready
        );
    }

    #[test]
    fn running_state_rejects_begin() {
        assert_eq!(IngestState::Ingesting.begin(), None);
        assert_eq!(IngestState::ReIngesting.begin(), None);
        assert!(IngestState::ReIngesting.is_running());
        assert!(!IngestState::Ready.is_running());
    }

    #[test]
    fn finish_outside_run_is_noop() {
        assert_eq!(IngestState::Ready.finish(false), IngestState::Ready);
        assert_eq!(
            IngestState::NotIngested.finish(true),
            IngestState::NotIngested
        );
    }

    #[test]
    fn string_roundtrip() {
        for s in [
            IngestState::NotIngested,
            IngestState::Ingesting,
            IngestState::Ready,
            IngestState::ReIngesting,
            IngestState::Failed,
        ] {
            assert_eq!(s.as_str().parse::<IngestState>().unwrap(), s);
        }
        assert!("bogus".parse::<IngestState>().is_err());
    }
}
