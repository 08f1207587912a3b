//! Rule-based customer segments over RFM scores

use crate::scoring::RfmScores;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Champions,
    LoyalCustomers,
    PotentialLoyalists,
    AtRisk,
    Lost,
    NeedAttention,
}

impl Segment {
    pub const ALL: [Segment; 6] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::PotentialLoyalists,
        Segment::AtRisk,
        Segment::Lost,
        Segment::NeedAttention,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::PotentialLoyalists => "Potential Loyalists",
            Segment::AtRisk => "At Risk",
            Segment::Lost => "Lost",
            Segment::NeedAttention => "Need Attention",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Constraint on a single score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Any,
    AtLeast(u8),
    AtMost(u8),
}

impl ScoreBound {
    pub fn admits(self, score: u8) -> bool {
        match self {
            ScoreBound::Any => true,
            ScoreBound::AtLeast(min) => score >= min,
            ScoreBound::AtMost(max) => score <= max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRule {
    pub segment: Segment,
    pub recency: ScoreBound,
    pub frequency: ScoreBound,
    pub monetary: ScoreBound,
}

impl SegmentRule {
    pub fn matches(&self, scores: &RfmScores) -> bool {
        self.recency.admits(scores.r) && self.frequency.admits(scores.f) && self.monetary.admits(scores.m)
    }
}

/// Segment for customers no rule matches
pub const FALLBACK_SEGMENT: Segment = Segment::NeedAttention;

/// Evaluated top to bottom, first match wins. Order matters: rules overlap.
pub const SEGMENT_RULES: [SegmentRule; 5] = [
    SegmentRule {
        segment: Segment::Champions,
        recency: ScoreBound::AtLeast(4),
        frequency: ScoreBound::AtLeast(4),
        monetary: ScoreBound::AtLeast(4),
    },
    SegmentRule {
        segment: Segment::LoyalCustomers,
        recency: ScoreBound::Any,
        frequency: ScoreBound::AtLeast(4),
        monetary: ScoreBound::AtLeast(3),
    },
    SegmentRule {
        segment: Segment::PotentialLoyalists,
        recency: ScoreBound::AtLeast(4),
        frequency: ScoreBound::AtLeast(2),
        monetary: ScoreBound::Any,
    },
    SegmentRule {
        segment: Segment::AtRisk,
        recency: ScoreBound::AtMost(2),
        frequency: ScoreBound::AtLeast(3),
        monetary: ScoreBound::Any,
    },
    SegmentRule {
        segment: Segment::Lost,
        recency: ScoreBound::AtMost(2),
        frequency: ScoreBound::AtMost(2),
        monetary: ScoreBound::Any,
    },
];

pub fn classify(scores: &RfmScores) -> Segment {
    SEGMENT_RULES
        .iter()
        .find(|rule| rule.matches(scores))
        .map_or(FALLBACK_SEGMENT, |rule| rule.segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(r: u8, f: u8, m: u8) -> Segment {
        classify(&RfmScores::new(r, f, m))
    }

    #[test]
    fn test_rule_examples() {
        assert_eq!(seg(5, 5, 5), Segment::Champions);
        assert_eq!(seg(4, 4, 4), Segment::Champions);
        assert_eq!(seg(1, 5, 3), Segment::LoyalCustomers);
        assert_eq!(seg(5, 2, 1), Segment::PotentialLoyalists);
        assert_eq!(seg(2, 3, 5), Segment::AtRisk);
        assert_eq!(seg(1, 1, 3), Segment::Lost);
        assert_eq!(seg(3, 3, 3), Segment::NeedAttention);
        assert_eq!(seg(4, 1, 5), Segment::NeedAttention);
    }

    #[test]
    fn test_priority_order_decides_overlaps() {
        // r=5,f=4,m=2 fails Champions and Loyal on m, lands on rule 3
        assert_eq!(seg(5, 4, 2), Segment::PotentialLoyalists);
        // r=5,f=4,m=3 would also satisfy rule 3 but rule 2 comes first
        assert_eq!(seg(5, 4, 3), Segment::LoyalCustomers);
        // r=1,f=5,m=1 would satisfy At Risk, Loyal is checked first but needs m>=3
        assert_eq!(seg(1, 5, 1), Segment::AtRisk);
    }

    #[test]
    fn test_classification_is_total_and_pure() {
        for r in 1..=5 {
            for f in 1..=5 {
                for m in 1..=5 {
                    let first = seg(r, f, m);
                    assert_eq!(first, seg(r, f, m));

                    let expected = if r >= 4 && f >= 4 && m >= 4 {
                        Segment::Champions
                    } else if f >= 4 && m >= 3 {
                        Segment::LoyalCustomers
                    } else if r >= 4 && f >= 2 {
                        Segment::PotentialLoyalists
                    } else if r <= 2 && f >= 3 {
                        Segment::AtRisk
                    } else if r <= 2 && f <= 2 {
                        Segment::Lost
                    } else {
                        Segment::NeedAttention
                    };
                    assert_eq!(first, expected, "r={r} f={f} m={m}");
                }
            }
        }
    }

    #[test]
    fn test_labels() {
        let labels: Vec<&str> = Segment::ALL.iter().map(Segment::label).collect();
        assert_eq!(
            labels,
            vec![
                "Champions",
                "Loyal Customers",
                "Potential Loyalists",
                "At Risk",
                "Lost",
                "Need Attention"
            ]
        );
    }
}
