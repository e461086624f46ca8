//! Rule-based habitability classifier.
//!
//! Fixed linear scoring over four observables: orbital period (days), planet
//! radius (Earth radii), stellar distance (AU) and equilibrium temperature
//! (K). Deterministic, no side effects, no I/O.

pub const CONFIRMED: &str = "CONFIRMED";
pub const FALSE_POSITIVE: &str = "FALSE POSITIVE";

/// Outcome of scoring one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: &'static str,
    pub confidence: f64,
    pub reasons: Vec<&'static str>,
}

/// Score a candidate and label it.
pub fn classify(period: f64, radius: f64, distance: f64, temperature: f64) -> Classification {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    // Earth-like orbital period: 200-500 days
    if (200.0..=500.0).contains(&period) {
        score += 0.30;
        reasons.push("Favorable orbital period");
    } else if period < 200.0 {
        reasons.push("Too close to star");
    } else {
        reasons.push("Too far from star");
    }

    // Earth-like radius: 0.5-2.0 Earth radii
    if (0.5..=2.0).contains(&radius) {
        score += 0.30;
        reasons.push("Earth-like size");
    } else if radius < 0.5 {
        reasons.push("Too small");
    } else {
        reasons.push("Too large (likely gas giant)");
    }

    // Habitable zone distance: 0.8-1.5 AU
    if (0.8..=1.5).contains(&distance) {
        score += 0.25;
        reasons.push("In habitable zone");
    }

    // Liquid water temperature range: 273-373 K
    if (273.0..=373.0).contains(&temperature) {
        score += 0.15;
        reasons.push("Temperature allows liquid water");
    }

    // Weights sum to 1.0; the clamp also flattens float accumulation noise.
    let confidence = score.min(1.0);

    Classification {
        label: label_for(confidence),
        confidence,
        reasons,
    }
}

/// Label rule: the 0.5 boundary is inclusive.
fn label_for(confidence: f64) -> &'static str {
    if confidence >= 0.5 {
        CONFIRMED
    } else {
        FALSE_POSITIVE
    }
}
