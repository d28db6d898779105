//! Text-to-offer parsing for RUB listings
//!
//! Handles the usual Russian number formatting: spaces (including NBSP)
//! as thousands separators, comma decimals and trailing currency markers.

use once_cell::sync::Lazy;
use regex::Regex;

use super::extract::OfferFragment;
use crate::types::RawOffer;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());

/// Currency markers stripped before number matching. Longest first.
const RUB_MARKERS: [&str; 8] = ["руб.", "руб", "RUB", "р.", "Р.", "₽", "р", "Р"];

/// Collapse whitespace and resolve `,`/`.` so that the only separator left
/// is a `.` decimal point.
fn normalize_number(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.trim_end_matches(['.', ',']).to_string();

    let commas = compact.matches(',').count();
    let dots = compact.matches('.').count();

    match (commas, dots) {
        (0, 0) => compact,
        (c, d) if c > 0 && d > 0 => {
            // Whichever separator comes last is the decimal point
            let last_comma = compact.rfind(',').unwrap_or(0);
            let last_dot = compact.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                compact.replace('.', "").replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
        (1, 0) => compact.replace(',', "."),
        (_, 0) => compact.replace(',', ""),
        (0, 1) => compact,
        _ => compact.replace('.', ""),
    }
}

fn first_number(normalized: &str) -> Option<f64> {
    NUMBER
        .find(normalized)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Parse a RUB price such as `"1 234,56 ₽"`
pub fn parse_rub(text: &str) -> Option<f64> {
    let mut cleaned = text.to_string();
    for marker in RUB_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    first_number(&normalize_number(&cleaned))
}

/// Parse an available quantity such as `"47 000"` or `"Наличие: 1 200"`
pub fn parse_quantity(text: &str) -> Option<f64> {
    first_number(&normalize_number(text))
}

/// Build an offer from a fragment. Missing or unusable quantities become 1.
pub fn parse_offer(fragment: &OfferFragment) -> Option<RawOffer> {
    let unit_price = parse_rub(&fragment.price_text)?;
    let quantity = fragment
        .amount_text
        .as_deref()
        .and_then(parse_quantity)
        .filter(|q| *q > 0.0)
        .unwrap_or(1.0);
    let offer = RawOffer::new(unit_price, quantity);
    Some(offer.with_seller(fragment.seller.clone(), fragment.href.clone()))
}

/// Parse all fragments, silently skipping those without a price
pub fn parse_offers(fragments: &[OfferFragment]) -> Vec<RawOffer> {
    fragments.iter().filter_map(parse_offer).collect()
}
