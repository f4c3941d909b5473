//! Project status engine
//!
//! Maps free-text project statuses onto the fixed set of dashboard options,
//! and derives the progress percentage and progress-bar background from them.

use serde::Serialize;
use std::fmt;

/// Canonical project status, as offered by the dashboard dropdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CanonicalStatus {
    Planning,
    Approved,
    Pending,
    Awaiting,
    Active,
    Activated,
    #[serde(rename = "Work Started")]
    WorkStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    #[serde(rename = "On Hold")]
    OnHold,
    Canceled,
    Inactive,
}

/// All options in dropdown order
pub const STATUS_OPTIONS: &[CanonicalStatus] = &[
    CanonicalStatus::Planning,
    CanonicalStatus::Approved,
    CanonicalStatus::Pending,
    CanonicalStatus::Awaiting,
    CanonicalStatus::Active,
    CanonicalStatus::Activated,
    CanonicalStatus::WorkStarted,
    CanonicalStatus::InProgress,
    CanonicalStatus::Completed,
    CanonicalStatus::OnHold,
    CanonicalStatus::Canceled,
    CanonicalStatus::Inactive,
];

/// Canonical flow used for gradients (status -> next status)
const FLOW: &[CanonicalStatus] = &[
    CanonicalStatus::Planning,
    CanonicalStatus::Approved,
    CanonicalStatus::Pending,
    CanonicalStatus::Awaiting,
    CanonicalStatus::Active,
    CanonicalStatus::WorkStarted,
    CanonicalStatus::InProgress,
    CanonicalStatus::Completed,
];

/// Keyword predicates, checked in order. The first hit wins.
const KEYWORD_RULES: &[(&[&str], CanonicalStatus)] = &[
    (&["completed", "complete", "done", "finalized", "finished"], CanonicalStatus::Completed),
    (&["in progress"], CanonicalStatus::InProgress),
    (&["work started", "started"], CanonicalStatus::WorkStarted),
    (&["activated"], CanonicalStatus::Activated),
    (&["active"], CanonicalStatus::Active),
    (&["approved"], CanonicalStatus::Approved),
    (&["planning", "scheduled"], CanonicalStatus::Planning),
    (&["pending", "review", "deposit", "payment"], CanonicalStatus::Pending),
    (&["await", "waiting"], CanonicalStatus::Awaiting),
    (&["on hold", "paused", "suspend"], CanonicalStatus::OnHold),
    (&["cancel", "canceled", "cancelled"], CanonicalStatus::Canceled),
    (&["inactive", "expired"], CanonicalStatus::Inactive),
];

impl CanonicalStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Planning => "Planning",
            Self::Approved => "Approved",
            Self::Pending => "Pending",
            Self::Awaiting => "Awaiting",
            Self::Active => "Active",
            Self::Activated => "Activated",
            Self::WorkStarted => "Work Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::OnHold => "On Hold",
            Self::Canceled => "Canceled",
            Self::Inactive => "Inactive",
        }
    }

    /// Bar colour for this status
    pub fn color(self) -> &'static str {
        match self {
            Self::Planning => "#A0AEC0",
            Self::Approved => "#CBD5E0",
            Self::Pending => "#F6AD55",
            Self::Awaiting => "#FBD38D",
            Self::Active => "#48BB78",
            Self::Activated => "#38A169",
            Self::WorkStarted => "#ECC94B",
            Self::InProgress => "#ED8936",
            Self::Completed => "#276749",
            Self::OnHold => "#718096",
            Self::Canceled => "#4A5568",
            Self::Inactive => "#2D3748",
        }
    }

    /// Exact, case-sensitive label match (admin updates must use real options)
    pub fn parse_exact(label: &str) -> Option<Self> {
        STATUS_OPTIONS.iter().copied().find(|s| s.label() == label)
    }

    /// Statuses that render as a solid, non-flow bar
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OnHold | Self::Canceled | Self::Inactive)
    }

    fn next_in_flow(self) -> Option<Self> {
        let current = if self == Self::Activated { Self::Active } else { self };
        let idx = FLOW.iter().position(|s| *s == current)?;
        FLOW.get(idx + 1).copied()
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Map a free-text status into one of the canonical options.
///
/// Never fails: unrecognized or empty input becomes `Inactive`.
pub fn canonicalize(raw: &str) -> CanonicalStatus {
    let s = normalize(raw);
    if s.is_empty() {
        return CanonicalStatus::Inactive;
    }

    for (keywords, status) in KEYWORD_RULES {
        // "inactive" must not be caught by the broader "active" rule
        if *status == CanonicalStatus::Active && s.contains("inactive") {
            continue;
        }
        if keywords.iter().any(|k| s.contains(k)) {
            return *status;
        }
    }

    STATUS_OPTIONS
        .iter()
        .copied()
        .find(|opt| opt.label().to_lowercase() == s)
        .unwrap_or(CanonicalStatus::Inactive)
}

/// Progress bar fill, in percent
pub fn progress_percent(status: CanonicalStatus) -> u8 {
    use CanonicalStatus::*;
    match status {
        OnHold | Canceled | Inactive => 0,
        Planning | Approved | Pending | Awaiting => 10,
        Active | Activated => 25,
        WorkStarted => 35,
        InProgress => 50,
        Completed => 100,
    }
}

/// CSS background for the progress fill: solid, or a gradient towards the next flow step
pub fn progress_color(status: CanonicalStatus) -> String {
    if status == CanonicalStatus::Completed || status.is_terminal() {
        return status.color().to_string();
    }

    let from = status.color();
    let to = status.next_in_flow().map(|s| s.color()).unwrap_or(from);
    format!("linear-gradient(90deg, {}, {})", from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_unknown_input_is_inactive() {
        assert_eq!(canonicalize(""), CanonicalStatus::Inactive);
        assert_eq!(canonicalize("   "), CanonicalStatus::Inactive);
        assert_eq!(canonicalize("something else entirely"), CanonicalStatus::Inactive);
    }

    #[test]
    fn keywords_map_to_expected_status() {
        assert_eq!(canonicalize("Project Finished"), CanonicalStatus::Completed);
        assert_eq!(canonicalize("  IN   progress "), CanonicalStatus::InProgress);
        assert_eq!(canonicalize("Work started on site"), CanonicalStatus::WorkStarted);
        assert_eq!(canonicalize("Activated"), CanonicalStatus::Activated);
        assert_eq!(canonicalize("active"), CanonicalStatus::Active);
        assert_eq!(canonicalize("Permit approved"), CanonicalStatus::Approved);
        assert_eq!(canonicalize("Scheduled for March"), CanonicalStatus::Planning);
        assert_eq!(canonicalize("Awaiting Payment"), CanonicalStatus::Pending);
        assert_eq!(canonicalize("Waiting on client"), CanonicalStatus::Awaiting);
        assert_eq!(canonicalize("Paused"), CanonicalStatus::OnHold);
        assert_eq!(canonicalize("Cancelled by owner"), CanonicalStatus::Canceled);
        assert_eq!(canonicalize("Expired"), CanonicalStatus::Inactive);
    }

    #[test]
    fn rule_order_decides_overlaps() {
        assert_eq!(canonicalize("payment review pending hold"), CanonicalStatus::Pending);
        assert_eq!(canonicalize("done, awaiting invoice"), CanonicalStatus::Completed);
        assert_eq!(canonicalize("on hold until deposit"), CanonicalStatus::Pending);
        assert_eq!(canonicalize("Inactive"), CanonicalStatus::Inactive);
    }

    #[test]
    fn every_option_label_round_trips() {
        for status in STATUS_OPTIONS {
            assert_eq!(canonicalize(status.label()), *status, "label {}", status);
            assert_eq!(CanonicalStatus::parse_exact(status.label()), Some(*status));
        }
        assert_eq!(CanonicalStatus::parse_exact("active"), None);
    }

    #[test]
    fn percent_is_monotonic_along_flow() {
        let percents: Vec<u8> = FLOW.iter().map(|s| progress_percent(*s)).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
        assert_eq!(progress_percent(CanonicalStatus::Activated), 25);
        assert_eq!(progress_percent(CanonicalStatus::WorkStarted), 35);
        assert_eq!(progress_percent(CanonicalStatus::InProgress), 50);
        assert_eq!(progress_percent(CanonicalStatus::Completed), 100);
        for s in [CanonicalStatus::OnHold, CanonicalStatus::Canceled, CanonicalStatus::Inactive] {
            assert_eq!(progress_percent(s), 0);
        }
    }

    #[test]
    fn colors_are_solid_or_gradient() {
        assert_eq!(progress_color(CanonicalStatus::Completed), "#276749");
        assert_eq!(progress_color(CanonicalStatus::OnHold), "#718096");
        assert_eq!(
            progress_color(CanonicalStatus::Pending),
            "linear-gradient(90deg, #F6AD55, #FBD38D)"
        );
        // Activated steps like Active but keeps its own start colour
        assert_eq!(
            progress_color(CanonicalStatus::Activated),
            "linear-gradient(90deg, #38A169, #ECC94B)"
        );
        assert_eq!(
            progress_color(CanonicalStatus::InProgress),
            "linear-gradient(90deg, #ED8936, #276749)"
        );
    }
}
