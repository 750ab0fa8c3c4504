//! Security Scoring
//!
//! Folds sub-check outcomes into one score in [0, 1]:
//! base 0.5, +0.2 identity verified, +0.1 under rate limit, +0.15 payload
//! valid, -0.3 x threat score, +0.05 in production. Clamped, then rounded to
//! three decimals.

/// Inputs to the security score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInputs {
    pub identity_verified: bool,
    pub under_rate_limit: bool,
    pub payload_valid: bool,
    pub threat_score: f64,
    pub production: bool,
}

/// Stateless scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityScorer;

impl SecurityScorer {
    const BASE: f64 = 0.5;
    const IDENTITY_BONUS: f64 = 0.2;
    const RATE_BONUS: f64 = 0.1;
    const PAYLOAD_BONUS: f64 = 0.15;
    const THREAT_WEIGHT: f64 = 0.3;
    const PRODUCTION_BONUS: f64 = 0.05;

    pub fn score(&self, inputs: ScoreInputs) -> f64 {
        let mut score = Self::BASE;
        if inputs.identity_verified {
            score += Self::IDENTITY_BONUS;
        }
        if inputs.under_rate_limit {
            score += Self::RATE_BONUS;
        }
        if inputs.payload_valid {
            score += Self::PAYLOAD_BONUS;
        }
        score -= inputs.threat_score * Self::THREAT_WEIGHT;
        if inputs.production {
            score += Self::PRODUCTION_BONUS;
        }

        (score.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(identity: bool, rate: bool, payload: bool, threat: f64, prod: bool) -> ScoreInputs {
        ScoreInputs {
            identity_verified: identity,
            under_rate_limit: rate,
            payload_valid: payload,
            threat_score: threat,
            production: prod,
        }
    }

    #[test]
    fn test_all_checks_pass_no_threat() {
        assert_eq!(SecurityScorer.score(inputs(true, true, true, 0.0, false)), 0.95);
    }

    #[test]
    fn test_production_bonus_clamped() {
        assert_eq!(SecurityScorer.score(inputs(true, true, true, 0.0, true)), 1.0);
    }

    #[test]
    fn test_threat_penalty() {
        // 0.95 - 0.2 * 0.3
        assert_eq!(SecurityScorer.score(inputs(true, true, true, 0.2, false)), 0.89);
        // 0.95 - 0.5 * 0.3 + 0.05
        assert_eq!(SecurityScorer.score(inputs(true, true, true, 0.5, true)), 0.85);
    }

    #[test]
    fn test_invalid_payload_drops_score() {
        assert_eq!(SecurityScorer.score(inputs(true, true, false, 0.0, false)), 0.8);
        assert_eq!(SecurityScorer.score(inputs(true, true, false, 0.4, false)), 0.68);
    }

    #[test]
    fn test_floor_is_zero() {
        let score = SecurityScorer.score(inputs(false, false, false, 1.0, false));
        assert_eq!(score, 0.2);
        assert!(score >= 0.0);
    }

    #[test]
    fn test_rounded_to_three_decimals() {
        let score = SecurityScorer.score(inputs(true, true, true, 0.3333, false));
        assert_eq!(score, 0.85);
    }
}
