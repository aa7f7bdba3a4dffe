//! Inbound commands and the feed request type.
//!
//! These represent actions requested by the outside world (HTTP
//! router, message bus, scheduler) that the dispatcher interprets and
//! acts upon.

use serde::Deserialize;

use crate::config::FeederParams;

/// A resolved feed request, carried through the single-slot mailbox
/// to the feeder task. Parameters are resolved at trigger time so the
/// feeder never reads half-updated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRequest {
    pub params: FeederParams,
}

/// Optional per-trigger overrides of the drum parameters, accepted in
/// the JSON body of a feed command. Present fields replace the stored
/// feeder configuration before the request is resolved.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct FeedOverrides {
    pub speed: Option<u16>,
    pub step_fwd: Option<u16>,
    pub step_rev: Option<u16>,
    pub step_count: Option<u16>,
}

impl FeedOverrides {
    pub fn is_empty(&self) -> bool {
        self.speed.is_none()
            && self.step_fwd.is_none()
            && self.step_rev.is_none()
            && self.step_count.is_none()
    }

    /// Fold the overrides into a parameter set.
    pub fn apply(&self, mut params: FeederParams) -> FeederParams {
        if let Some(v) = self.speed {
            params.speed = v;
        }
        if let Some(v) = self.step_fwd {
            params.step_fwd = v;
        }
        if let Some(v) = self.step_rev {
            params.step_rev = v;
        }
        if let Some(v) = self.step_count {
            params.step_count = v;
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_fold_into_params() {
        let o: FeedOverrides =
            serde_json::from_str(r#"{"feed": true, "speed": 800, "step_count": 5}"#).unwrap();
        let p = o.apply(FeederParams::default());
        assert_eq!(p.speed, 800);
        assert_eq!(p.step_count, 5);
        assert_eq!(p.step_fwd, FeederParams::default().step_fwd);
    }

    #[test]
    fn empty_payload_means_no_overrides() {
        let o: FeedOverrides = serde_json::from_str("{}").unwrap();
        assert!(o.is_empty());
        assert_eq!(o.apply(FeederParams::default()), FeederParams::default());
    }
}
