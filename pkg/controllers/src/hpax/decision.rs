use serde_json::{Value, json};

/// The floor to enforce and whether the target must be patched to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub min_replicas: u32,
    pub patch_needed: bool,
}

/// Combine the three floor sources. Fallback and overrides only ever raise
/// the floor, so the largest suggestion wins regardless of where it came from.
pub fn decide(baseline: u32, fallback: u32, override_floor: u32, current: Option<u32>) -> Decision {
    let min_replicas = baseline.max(fallback).max(override_floor);
    Decision {
        min_replicas,
        patch_needed: current != Some(min_replicas),
    }
}

/// Merge patch that sets only `spec.minReplicas` on the target.
pub fn min_replicas_patch(min_replicas: u32) -> Value {
    json!({ "spec": { "minReplicas": min_replicas } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_of_all_sources() {
        for baseline in 0..4 {
            for fallback in 0..4 {
                for override_floor in 0..4 {
                    let d = decide(baseline, fallback, override_floor, None);
                    assert!(d.min_replicas >= baseline);
                    assert_eq!(d.min_replicas, *[baseline, fallback, override_floor].iter().max().unwrap());
                }
            }
        }
    }

    #[test]
    fn test_patch_needed_when_absent_or_different() {
        assert!(decide(1, 1, 1, None).patch_needed);
        assert!(decide(1, 10, 1, Some(1)).patch_needed);
        assert!(!decide(1, 10, 1, Some(10)).patch_needed);
        assert!(decide(1, 1, 1, Some(10)).patch_needed);
    }

    #[test]
    fn test_patch_shape() {
        assert_eq!(min_replicas_patch(21), json!({"spec": {"minReplicas": 21}}));
    }
}
