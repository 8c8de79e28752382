use chrono::{DateTime, Utc};
use pkg_types::condition::ConditionStatus;
use pkg_types::hpa::HPACondition;
use pkg_types::hpax::HorizontalPodAutoscalerXSpec;

use super::reason;
use super::window::window_end;

/// Result of evaluating the fallback rule for one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    /// Suggested floor: the fallback floor once engaged, the baseline otherwise.
    pub min_replicas: u32,
    /// Status of the `FallbackActive` condition.
    pub status: ConditionStatus,
    pub reason: &'static str,
    pub message: String,
    /// When a pending fallback will engage if nothing changes.
    pub engages_at: Option<DateTime<Utc>>,
}

impl FallbackOutcome {
    fn baseline(
        spec: &HorizontalPodAutoscalerXSpec,
        status: ConditionStatus,
        reason: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            min_replicas: spec.min_replicas,
            status,
            reason,
            message: message.into(),
            engages_at: None,
        }
    }
}

/// Decide whether sustained scaling inactivity should raise the floor.
///
/// The fallback engages only after `ScalingActive` has been `False` for the
/// full configured duration (the boundary instant included) and releases as
/// soon as the condition is anything else. Missing data never engages it.
pub fn evaluate(
    spec: &HorizontalPodAutoscalerXSpec,
    scaling_active: Option<&HPACondition>,
    now: DateTime<Utc>,
) -> FallbackOutcome {
    let Some(fallback) = &spec.fallback else {
        return FallbackOutcome::baseline(
            spec,
            ConditionStatus::False,
            reason::FALLBACK_DISABLED,
            "no fallback is configured",
        );
    };

    let Some(condition) = scaling_active else {
        return FallbackOutcome::baseline(
            spec,
            ConditionStatus::False,
            reason::CONDITION_UNKNOWN,
            "target hpa reports no ScalingActive condition",
        );
    };

    let since = match condition.status {
        ConditionStatus::True => {
            return FallbackOutcome::baseline(
                spec,
                ConditionStatus::False,
                reason::SCALING_ACTIVE,
                "scaling active condition is true",
            );
        }
        ConditionStatus::Unknown => {
            return FallbackOutcome::baseline(
                spec,
                ConditionStatus::False,
                reason::CONDITION_UNKNOWN,
                "scaling active condition is unknown",
            );
        }
        ConditionStatus::False => match condition.last_transition_time {
            Some(since) => since,
            None => {
                return FallbackOutcome::baseline(
                    spec,
                    ConditionStatus::False,
                    reason::CONDITION_UNKNOWN,
                    "scaling active condition is false without a transition time",
                );
            }
        },
    };

    match window_end(since, fallback.duration()) {
        Some(engage) if engage <= now => FallbackOutcome {
            min_replicas: fallback.min_replicas,
            status: ConditionStatus::False,
            reason: reason::INACTIVE_LONG_ENOUGH,
            message: format!(
                "scaling active condition has been false since {}, fallback minReplicas {} applied",
                since.to_rfc3339(),
                fallback.min_replicas
            ),
            engages_at: None,
        },
        engage => FallbackOutcome {
            min_replicas: spec.min_replicas,
            status: ConditionStatus::True,
            reason: reason::RECENTLY_INACTIVE,
            message: format!(
                "scaling active condition is false for not long enough (since {})",
                since.to_rfc3339()
            ),
            engages_at: engage,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use pkg_types::hpa::HPAConditionType;
    use pkg_types::hpax::Fallback;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn spec(fallback: Option<(u32, u64)>) -> HorizontalPodAutoscalerXSpec {
        HorizontalPodAutoscalerXSpec {
            hpa_target_name: "web".to_string(),
            min_replicas: 1,
            fallback: fallback.map(|(min_replicas, duration_seconds)| Fallback {
                min_replicas,
                duration_seconds,
            }),
        }
    }

    fn scaling_active(status: ConditionStatus, since: Option<DateTime<Utc>>) -> HPACondition {
        HPACondition {
            condition_type: HPAConditionType::ScalingActive,
            status,
            last_transition_time: since,
            reason: String::new(),
            message: String::new(),
        }
    }

    #[test]
    fn test_disabled() {
        let cond = scaling_active(ConditionStatus::False, Some(t(-3600)));
        let out = evaluate(&spec(None), Some(&cond), t(0));
        assert_eq!(out.min_replicas, 1);
        assert_eq!(out.status, ConditionStatus::False);
        assert_eq!(out.reason, reason::FALLBACK_DISABLED);
    }

    #[test]
    fn test_missing_or_unknown_fails_open() {
        let s = spec(Some((10, 5)));
        let unknown = scaling_active(ConditionStatus::Unknown, Some(t(-3600)));
        let no_time = scaling_active(ConditionStatus::False, None);

        for cond in [None, Some(&unknown), Some(&no_time)] {
            let out = evaluate(&s, cond, t(0));
            assert_eq!(out.min_replicas, 1);
            assert_eq!(out.status, ConditionStatus::False);
            assert_eq!(out.reason, reason::CONDITION_UNKNOWN);
            assert!(out.engages_at.is_none());
        }
    }

    #[test]
    fn test_scaling_active() {
        let cond = scaling_active(ConditionStatus::True, Some(t(-3600)));
        let out = evaluate(&spec(Some((10, 5))), Some(&cond), t(0));
        assert_eq!(out.min_replicas, 1);
        assert_eq!(out.status, ConditionStatus::False);
        assert_eq!(out.reason, reason::SCALING_ACTIVE);
    }

    #[test]
    fn test_recently_inactive_then_engaged_at_boundary() {
        let s = spec(Some((10, 5)));
        let cond = scaling_active(ConditionStatus::False, Some(t(0)));

        for now in [t(0), t(1), t(5) - TimeDelta::milliseconds(1)] {
            let out = evaluate(&s, Some(&cond), now);
            assert_eq!(out.min_replicas, 1);
            assert_eq!(out.status, ConditionStatus::True);
            assert_eq!(out.reason, reason::RECENTLY_INACTIVE);
            assert_eq!(out.engages_at, Some(t(5)));
        }

        for now in [t(5), t(6), t(3600)] {
            let out = evaluate(&s, Some(&cond), now);
            assert_eq!(out.min_replicas, 10);
            assert_eq!(out.status, ConditionStatus::False);
            assert_eq!(out.reason, reason::INACTIVE_LONG_ENOUGH);
            assert!(out.engages_at.is_none());
        }
    }

    #[test]
    fn test_zero_duration_engages_immediately() {
        let cond = scaling_active(ConditionStatus::False, Some(t(0)));
        let out = evaluate(&spec(Some((4, 0))), Some(&cond), t(0));
        assert_eq!(out.min_replicas, 4);
        assert_eq!(out.reason, reason::INACTIVE_LONG_ENOUGH);
    }

    #[test]
    fn test_fallback_below_baseline_is_still_reported() {
        // The decision engine takes the max; the evaluator reports what it was given.
        let mut s = spec(Some((0, 5)));
        s.min_replicas = 3;
        let cond = scaling_active(ConditionStatus::False, Some(t(-10)));
        let out = evaluate(&s, Some(&cond), t(0));
        assert_eq!(out.min_replicas, 0);
    }
}
