//! Threat score and risk categories.

use serde::Serialize;

/// Risk category of a 0-100 threat score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLabel {
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "HIGH RISK")]
    HighRisk,
    #[serde(rename = "UNDER REVIEW")]
    UnderReview,
    #[serde(rename = "CLEAN")]
    Clean,
}

impl RiskLabel {
    pub fn for_score(score: u8) -> Self {
        match score {
            75.. => RiskLabel::Critical,
            50..=74 => RiskLabel::HighRisk,
            20..=49 => RiskLabel::UnderReview,
            _ => RiskLabel::Clean,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Critical => "CRITICAL",
            RiskLabel::HighRisk => "HIGH RISK",
            RiskLabel::UnderReview => "UNDER REVIEW",
            RiskLabel::Clean => "CLEAN",
        }
    }

    /// Display colour used by dashboards.
    pub fn color(&self) -> &'static str {
        match self {
            RiskLabel::Critical => "#DC2626",
            RiskLabel::HighRisk => "#D97706",
            RiskLabel::UnderReview => "#2563EB",
            RiskLabel::Clean => "#059669",
        }
    }
}

/// Externally queried risk signal for an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatScore {
    pub address: String,
    pub confirmed: bool,
    /// Confirmed scam score, 0 when unconfirmed
    pub score: u8,
    /// For-share of vote power behind the finding, 0 when nothing is on record
    pub confidence: u8,
    pub votes_for: f64,
    pub votes_against: f64,
    pub total_voters: u32,
    /// Proposal the confidence was read from
    pub proposal_id: Option<u64>,
    pub risk_label: RiskLabel,
    pub risk_color: &'static str,
    pub explanation: Vec<String>,
}

impl ThreatScore {
    pub(crate) fn explain(&mut self) {
        let mut lines = Vec::new();

        if self.confirmed {
            lines.push("DAO community confirmed this address as a scammer".to_string());
        } else if self.proposal_id.is_some() {
            lines.push("Address is currently under community review".to_string());
        }

        if self.total_voters > 0 {
            lines.push(format!(
                "{} voters reached {}% consensus",
                self.total_voters, self.confidence
            ));
        }

        lines.push(
            match self.risk_label {
                RiskLabel::Critical => "Threat level CRITICAL: avoid all interaction",
                RiskLabel::HighRisk => "Threat level HIGH: exercise extreme caution",
                RiskLabel::UnderReview => "Threat level elevated: proceed with care",
                RiskLabel::Clean => "No confirmed threats on record",
            }
            .to_string(),
        );

        self.explanation = lines;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_boundaries() {
        assert_eq!(RiskLabel::for_score(100), RiskLabel::Critical);
        assert_eq!(RiskLabel::for_score(75), RiskLabel::Critical);
        assert_eq!(RiskLabel::for_score(74), RiskLabel::HighRisk);
        assert_eq!(RiskLabel::for_score(50), RiskLabel::HighRisk);
        assert_eq!(RiskLabel::for_score(49), RiskLabel::UnderReview);
        assert_eq!(RiskLabel::for_score(20), RiskLabel::UnderReview);
        assert_eq!(RiskLabel::for_score(19), RiskLabel::Clean);
        assert_eq!(RiskLabel::for_score(0), RiskLabel::Clean);
    }

    #[test]
    fn test_label_serializes_as_display_text() {
        let json = serde_json::to_string(&RiskLabel::HighRisk).unwrap();
        assert_eq!(json, "\"HIGH RISK\"");
    }
}
