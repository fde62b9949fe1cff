//! Alert status resolution.

use crate::artefact::{AlertStatus, Finding, FindingKind};

/// Pick the alert status for a document from its findings list.
///
/// Highest-priority recognized type wins; an empty list or a list of only
/// unrecognized types resolves to `None`. Pure function, no tie-breaking
/// needed: priority is a total order.
pub fn resolve_alert(findings: &[Finding]) -> AlertStatus {
    findings
        .iter()
        .map(|f| match f.findings_type {
            FindingKind::Alert => AlertStatus::Alert,
            FindingKind::ActionRequired => AlertStatus::ActionRequired,
            FindingKind::Reminder => AlertStatus::Reminder,
            FindingKind::InsightsAvailable => AlertStatus::InsightsAvailable,
            FindingKind::Unknown => AlertStatus::None,
        })
        .max_by_key(|status| match status {
            AlertStatus::None => 0,
            AlertStatus::InsightsAvailable => 1,
            AlertStatus::Reminder => 2,
            AlertStatus::ActionRequired => 3,
            AlertStatus::Alert => 4,
        })
        .unwrap_or(AlertStatus::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(kind: FindingKind) -> Finding {
        Finding {
            findings_type: kind,
            title: "t".into(),
            description: "d".into(),
            due_date: None,
        }
    }

    #[test]
    fn highest_priority_wins() {
        let findings = vec![
            finding(FindingKind::Reminder),
            finding(FindingKind::Alert),
            finding(FindingKind::InsightsAvailable),
        ];
        assert_eq!(resolve_alert(&findings), AlertStatus::Alert);
    }

    #[test]
    fn empty_findings_resolve_to_none() {
        assert_eq!(resolve_alert(&[]), AlertStatus::None);
    }

    #[test]
    fn unknown_types_carry_no_weight() {
        assert_eq!(
            resolve_alert(&[finding(FindingKind::Unknown)]),
            AlertStatus::None
        );
        assert_eq!(
            resolve_alert(&[finding(FindingKind::Unknown), finding(FindingKind::Reminder)]),
            AlertStatus::Reminder
        );
    }

    #[test]
    fn action_required_beats_reminder() {
        let findings = vec![
            finding(FindingKind::Reminder),
            finding(FindingKind::ActionRequired),
        ];
        assert_eq!(resolve_alert(&findings), AlertStatus::ActionRequired);
    }
}
