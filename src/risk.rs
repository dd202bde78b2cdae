//! Rule-based risky-clause detection and contract risk scoring.
//!
//! Works on the same cleaned units the normalizer produces, so the unit
//! indices in a [`RiskyClause`] line up with the context window that a
//! question about the same document would see.
//!
//! Detection is keyword-based and deterministic: each unit is tagged with at
//! most one [`RiskCategory`], the first in [`RiskCategory::ALL`] order with a
//! matching keyword. The overall score is the confidence-weighted sum of
//! category weights, damped by the clause count and clamped to `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RiskConfig;
use crate::models::ContextUnit;
use crate::normalize::segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    AutoRenewal,
    TerminationRestrictions,
    UnilateralChanges,
    LiabilityLimitations,
    Indemnification,
    Jurisdiction,
    Confidentiality,
    PaymentTerms,
    IpRights,
    VagueTerms,
}

impl RiskCategory {
    /// Detection order. A unit matching several categories gets the first.
    pub const ALL: [RiskCategory; 10] = [
        RiskCategory::AutoRenewal,
        RiskCategory::TerminationRestrictions,
        RiskCategory::UnilateralChanges,
        RiskCategory::LiabilityLimitations,
        RiskCategory::Indemnification,
        RiskCategory::Jurisdiction,
        RiskCategory::Confidentiality,
        RiskCategory::PaymentTerms,
        RiskCategory::IpRights,
        RiskCategory::VagueTerms,
    ];

    pub fn weight(self) -> f64 {
        match self {
            RiskCategory::AutoRenewal => 0.8,
            RiskCategory::TerminationRestrictions => 0.7,
            RiskCategory::UnilateralChanges => 0.9,
            RiskCategory::LiabilityLimitations => 0.6,
            RiskCategory::Indemnification => 0.5,
            RiskCategory::Jurisdiction => 0.4,
            RiskCategory::Confidentiality => 0.3,
            RiskCategory::PaymentTerms => 0.4,
            RiskCategory::IpRights => 0.6,
            RiskCategory::VagueTerms => 0.7,
        }
    }

    /// Lowercase trigger phrases, tried in order.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            RiskCategory::AutoRenewal => &["automatically renew", "auto renewal", "auto-renewal"],
            RiskCategory::TerminationRestrictions => {
                &["may not terminate", "termination fee", "early termination"]
            }
            RiskCategory::UnilateralChanges => {
                &["sole discretion", "modify without notice", "unilaterally amend"]
            }
            RiskCategory::LiabilityLimitations => {
                &["no liability", "not be liable", "limit liability"]
            }
            RiskCategory::Indemnification => &["indemnify", "hold harmless", "defend against"],
            RiskCategory::Jurisdiction => {
                &["exclusive jurisdiction", "governing law", "exclusive venue"]
            }
            RiskCategory::Confidentiality => &[
                "confidential information",
                "non-disclosure",
                "shall not disclose",
            ],
            RiskCategory::PaymentTerms => &["late fee", "non-refundable", "interest at the rate"],
            RiskCategory::IpRights => &[
                "intellectual property",
                "work made for hire",
                "assigns all right",
            ],
            RiskCategory::VagueTerms => &[
                "reasonable efforts",
                "from time to time",
                "as deemed necessary",
            ],
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskCategory::AutoRenewal => "auto_renewal",
            RiskCategory::TerminationRestrictions => "termination_restrictions",
            RiskCategory::UnilateralChanges => "unilateral_changes",
            RiskCategory::LiabilityLimitations => "liability_limitations",
            RiskCategory::Indemnification => "indemnification",
            RiskCategory::Jurisdiction => "jurisdiction",
            RiskCategory::Confidentiality => "confidentiality",
            RiskCategory::PaymentTerms => "payment_terms",
            RiskCategory::IpRights => "ip_rights",
            RiskCategory::VagueTerms => "vague_terms",
        };
        f.write_str(s)
    }
}

/// A unit flagged as risky.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskyClause {
    pub unit_index: usize,
    pub text: String,
    pub category: RiskCategory,
    pub keyword: &'static str,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64, config: &RiskConfig) -> Self {
        if score < config.low_threshold {
            RiskLevel::Low
        } else if score < config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn recommendations(self) -> [&'static str; 3] {
        match self {
            RiskLevel::Low => [
                "Review standard terms for clarity and understanding.",
                "Ensure all parties and dates are correctly identified.",
                "Verify that the contract meets your needs.",
            ],
            RiskLevel::Medium => [
                "Consider negotiating the terms with higher risk weights.",
                "Have a legal professional review the contract before signing.",
                "Document any verbal agreements or clarifications in writing.",
            ],
            RiskLevel::High => [
                "Consult with legal counsel before proceeding.",
                "Negotiate to modify or remove the high-risk clauses.",
                "Consider alternative options or contracts if available.",
            ],
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub clauses: Vec<RiskyClause>,
    pub recommendations: Vec<String>,
}

/// Tags each unit with the first risk category whose keyword it contains.
pub fn detect_risky_clauses(units: &[ContextUnit]) -> Vec<RiskyClause> {
    units.iter().filter_map(classify_unit).collect()
}

fn classify_unit(unit: &ContextUnit) -> Option<RiskyClause> {
    let lower = unit.text.to_lowercase();
    RiskCategory::ALL.iter().find_map(|&category| {
        category
            .keywords()
            .iter()
            .find(|kw| lower.contains(*kw))
            .map(|&keyword| {
                let matches = lower.matches(keyword).count();
                RiskyClause {
                    unit_index: unit.index,
                    text: unit.text.clone(),
                    category,
                    keyword,
                    confidence: (0.5 + 0.2 * matches as f64).min(0.9),
                }
            })
    })
}

/// Scores detected clauses. No clauses is a score of 0.0.
pub fn assess(clauses: Vec<RiskyClause>, config: &RiskConfig) -> RiskAssessment {
    let weighted: f64 = clauses
        .iter()
        .map(|c| c.category.weight() * c.confidence)
        .sum();
    let score = if clauses.is_empty() {
        0.0
    } else {
        (weighted / (clauses.len() as f64 + 2.0)).min(1.0)
    };
    let level = RiskLevel::from_score(score, config);

    RiskAssessment {
        score,
        level,
        clauses,
        recommendations: level
            .recommendations()
            .iter()
            .map(|r| r.to_string())
            .collect(),
    }
}

/// Segments raw document text and assesses it.
pub fn assess_text(raw: &str, config: &RiskConfig) -> RiskAssessment {
    let units: Vec<ContextUnit> = segment(raw)
        .into_iter()
        .enumerate()
        .map(|(index, text)| ContextUnit { index, text })
        .collect();
    let clauses = detect_risky_clauses(&units);
    let assessment = assess(clauses, config);
    tracing::info!(
        units = units.len(),
        clauses = assessment.clauses.len(),
        score = assessment.score,
        level = %assessment.level,
        "risk assessed"
    );
    assessment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(index: usize, text: &str) -> ContextUnit {
        ContextUnit {
            index,
            text: text.to_string(),
        }
    }

    #[test]
    fn one_clause_per_unit_first_category_wins() {
        let units = vec![
            unit(0, "This Agreement shall automatically renew and the Provider may change fees at its sole discretion."),
            unit(1, "The tenant shall pay rent monthly."),
        ];
        let clauses = detect_risky_clauses(&units);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].unit_index, 0);
        assert_eq!(clauses[0].category, RiskCategory::AutoRenewal);
        assert_eq!(clauses[0].keyword, "automatically renew");
    }

    #[test]
    fn confidence_grows_with_repeats() {
        let once = detect_risky_clauses(&[unit(0, "Client shall INDEMNIFY the vendor.")]);
        assert!((once[0].confidence - 0.7).abs() < 1e-9);

        let twice = detect_risky_clauses(&[unit(
            0,
            "Client shall indemnify vendor and indemnify its affiliates and indemnify agents.",
        )]);
        assert!((twice[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn no_clauses_scores_zero_low() {
        let assessment = assess(Vec::new(), &RiskConfig::default());
        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.recommendations.len(), 3);
    }

    #[test]
    fn score_is_damped_weighted_sum() {
        let clauses = detect_risky_clauses(&[
            unit(0, "The Provider may amend these terms at its sole discretion."),
            unit(1, "This contract will automatically renew each year."),
        ]);
        let assessment = assess(clauses, &RiskConfig::default());
        // (0.9 * 0.7 + 0.8 * 0.7) / (2 + 2)
        assert!((assessment.score - 0.2975).abs() < 1e-9);
        assert_eq!(assessment.level, RiskLevel::Low);
    }

    #[test]
    fn levels_follow_thresholds() {
        let config = RiskConfig::default();
        assert_eq!(RiskLevel::from_score(0.29, &config), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3, &config), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.6, &config), RiskLevel::High);

        let strict = RiskConfig {
            low_threshold: 0.1,
            medium_threshold: 0.2,
        };
        assert_eq!(RiskLevel::from_score(0.25, &strict), RiskLevel::High);
    }

    #[test]
    fn assess_text_uses_normalized_units() {
        let raw = "1. Term. This lease will automatically renew.\n\nPage 1 of 2\n\n\
                   2. Landlord may modify without notice at its sole discretion, in its sole discretion.";
        let assessment = assess_text(raw, &RiskConfig::default());
        assert_eq!(assessment.clauses.len(), 2);
        assert_eq!(assessment.clauses[0].unit_index, 0);
        assert_eq!(assessment.clauses[1].unit_index, 1);
        assert_eq!(assessment.clauses[1].category, RiskCategory::UnilateralChanges);
        assert!((assessment.clauses[1].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn serializes_for_api() {
        let assessment = assess_text("The parties hold harmless each other.", &RiskConfig::default());
        let json = serde_json::to_value(&assessment).unwrap();
        assert_eq!(json["clauses"][0]["category"], "indemnification");
        assert_eq!(json["level"], "low");
    }
}
