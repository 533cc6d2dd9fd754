use serde::{Deserialize, Serialize};

/// Which fields a market variant expects the executor to report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeSchema {
    /// `{"price": 65000.50, "winner": "<label>"}`
    PriceAndWinner,
    /// `{"announcement_found": true, "winner": "<label>"}`
    FlagAndWinner,
}

impl OutcomeSchema {
    pub fn has_price(self) -> bool {
        matches!(self, OutcomeSchema::PriceAndWinner)
    }

    pub fn has_flag(self) -> bool {
        matches!(self, OutcomeSchema::FlagAndWinner)
    }
}

/// How far the parser had to degrade before it produced a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParseStage {
    Direct,
    Extracted,
    Repaired,
    FieldScan,
    Default,
}

impl ParseStage {
    pub fn is_default(self) -> bool {
        self == ParseStage::Default
    }
}

/// Best-effort typed reading of one executor output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCandidate {
    /// Decimal dollars.
    pub price: Option<f64>,
    pub flag: Option<bool>,
    pub winner: Option<String>,
}

impl ParsedCandidate {
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.flag.is_none() && self.winner.is_none()
    }

    /// Price in cents, rounded to the nearest cent. Missing prices count as zero.
    pub fn price_minor_units(&self) -> u128 {
        self.price.map(dollars_to_cents).unwrap_or(0)
    }

    /// The value carried in the bridge envelope: 0/1 for flag markets,
    /// cents otherwise. The parser only keeps a flag on flag markets.
    pub fn resolved_value(&self) -> u128 {
        match self.flag {
            Some(flag) => u128::from(flag),
            None => self.price_minor_units(),
        }
    }

    /// The fields consensus has to agree on exactly in comparative mode.
    pub fn decision_fields(&self) -> (Option<bool>, Option<&str>) {
        (self.flag, self.winner.as_deref())
    }
}

/// Non-finite and negative inputs map to zero.
pub fn dollars_to_cents(dollars: f64) -> u128 {
    if !dollars.is_finite() || dollars <= 0.0 {
        return 0;
    }
    let cents = (dollars * 100.0).round();
    if cents >= u128::MAX as f64 {
        u128::MAX
    } else {
        cents as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_conversion_rounds() {
        assert_eq!(dollars_to_cents(65000.50), 6_500_050);
        assert_eq!(dollars_to_cents(0.29), 29);
        assert_eq!(dollars_to_cents(150.25), 15_025);
        assert_eq!(dollars_to_cents(19.999), 2_000);
        assert_eq!(dollars_to_cents(-3.0), 0);
        assert_eq!(dollars_to_cents(f64::NAN), 0);
    }

    #[test]
    fn resolved_value_prefers_flag() {
        let c = ParsedCandidate { price: Some(1.5), flag: None, winner: None };
        assert_eq!(c.resolved_value(), 150);
        let c = ParsedCandidate { price: None, flag: Some(true), winner: None };
        assert_eq!(c.resolved_value(), 1);
        assert_eq!(ParsedCandidate::default().resolved_value(), 0);
    }
}
