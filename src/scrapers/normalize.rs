//! Pure field normalization: price text, URLs and availability labels.

use crate::error::NormalizeError;
use crate::models::{AvailabilityStatus, Category, Product, RawProduct};
use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

/// Display text used by the storefront when a product has no listed price
pub const PRICE_ON_REQUEST: &str = "Consultar";

const AVAILABLE_TERMS: &[&str] = &[
    "disponível",
    "disponivel",
    "em estoque",
    "pronta entrega",
    "in stock",
    "available",
];

const UNAVAILABLE_TERMS: &[&str] = &[
    "indisponível",
    "indisponivel",
    "esgotado",
    "sem estoque",
    "fora de estoque",
    "out of stock",
    "sold out",
    "unavailable",
];

fn price_with_cents() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d.]*,\d{2}").expect("price pattern is valid"))
}

fn currency_amount() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"R\$\s*(\d[\d.]*(?:,\d+)?)").expect("amount pattern is valid"))
}

fn repeated_currency() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:R\$\s*){2,}").expect("currency pattern is valid"))
}

/// Extract the numeric value from a display price such as `R$ 1.510,40`.
///
/// Dots are thousands separators and the comma is the decimal mark. A number
/// with cents wins; a bare amount only counts right after the currency sign,
/// so installment counts like `12x` are not prices. Returns `None` when no
/// amount is found, which is distinct from a price of zero.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let token = match price_with_cents().find(raw) {
        Some(token) => token.as_str(),
        None => currency_amount().captures(raw)?.get(1)?.as_str(),
    };
    let canonical = token.replace('.', "").replace(',', ".");
    Decimal::from_str(&canonical).ok()
}

/// Render a value the way the storefront displays it: `1.510,40`.
#[cfg(test)]
pub fn format_price(value: Decimal) -> String {
    let value = value.round_dp(2);
    let negative = value.is_sign_negative() && !value.is_zero();
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    format!("{}{},{}", if negative { "-" } else { "" }, grouped, frac_part)
}

/// Tidy a display price: collapse doubled currency prefixes and whitespace.
///
/// Empty text and the storefront's own "Consultar" both become
/// [`PRICE_ON_REQUEST`].
pub fn clean_price_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.eq_ignore_ascii_case(PRICE_ON_REQUEST) {
        return PRICE_ON_REQUEST.to_string();
    }
    repeated_currency()
        .replace_all(&collapsed, "R$ ")
        .trim()
        .to_string()
}

/// Join `raw` onto `base` and insist on an absolute http(s) URL.
pub fn resolve_url(raw: &str, base: &str) -> Result<String, NormalizeError> {
    let malformed = |reason: String| NormalizeError::MalformedUrl {
        raw: raw.to_string(),
        reason,
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(malformed("empty".to_string()));
    }

    let base = Url::parse(base).map_err(|e| malformed(format!("invalid base '{}': {}", base, e)))?;
    let resolved = base.join(raw).map_err(|e| malformed(e.to_string()))?;

    match resolved.scheme() {
        "http" | "https" if resolved.host_str().is_some() => Ok(resolved.to_string()),
        scheme => Err(malformed(format!("not a web address (scheme '{}')", scheme))),
    }
}

/// Canonical identity form of a product link: resolved, without fragment.
pub fn canonical_link(raw: &str, base: &str) -> Result<String, NormalizeError> {
    let resolved = resolve_url(raw, base)?;
    match resolved.split_once('#') {
        Some((without_fragment, _)) => Ok(without_fragment.to_string()),
        None => Ok(resolved),
    }
}

/// Classify availability text. Never fails; unknown wording maps to `Unknown`.
pub fn map_availability(raw: &str) -> AvailabilityStatus {
    let text = raw.trim().to_lowercase();
    // "indisponível" contains "disponível", so the negative vocabulary goes first
    if UNAVAILABLE_TERMS.iter().any(|term| text.contains(term)) {
        AvailabilityStatus::Unavailable
    } else if AVAILABLE_TERMS.iter().any(|term| text.contains(term)) {
        AvailabilityStatus::Available
    } else {
        AvailabilityStatus::Unknown
    }
}

/// Turn a raw card into a typed [`Product`].
///
/// A card without a price shows [`PRICE_ON_REQUEST`]. Cards without an
/// availability badge are listed for sale, so they count as available.
pub fn normalize_product(
    raw: RawProduct,
    category: &Category,
    source_page: &str,
    scraped_at: DateTime<Utc>,
) -> Product {
    let price_text = Some(
        raw.price_text
            .as_deref()
            .map(clean_price_text)
            .unwrap_or_else(|| PRICE_ON_REQUEST.to_string()),
    );
    let price_value = price_text.as_deref().and_then(parse_price);
    let availability_status = raw
        .availability_text
        .as_deref()
        .map(map_availability)
        .unwrap_or(AvailabilityStatus::Available);

    Product {
        external_id: raw.external_id,
        sku: raw.sku,
        name: raw.name,
        price_text,
        price_value,
        image_url: raw.image_url,
        link: raw.link,
        category: category.name.clone(),
        availability_status,
        source_page: source_page.to_string(),
        scraped_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: &str = "https://www.lojamestreparrillero.com.br/acessorios?pagina=2";

    #[test]
    fn parses_brazilian_prices() {
        assert_eq!(parse_price("R$ 1.510,40"), Some(Decimal::new(151040, 2)));
        assert_eq!(parse_price("R$ 7.450,00"), Some(Decimal::new(745000, 2)));
        assert_eq!(parse_price("R$ 89,90"), Some(Decimal::new(8990, 2)));
        assert_eq!(parse_price("R$ 1510"), Some(Decimal::new(1510, 0)));
    }

    #[test]
    fn zero_is_a_price_but_words_are_not() {
        assert_eq!(parse_price("R$ 0,00"), Some(Decimal::ZERO));
        assert_eq!(parse_price("Consultar"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("R$ --"), None);
    }

    #[test]
    fn installment_counts_are_not_prices() {
        assert_eq!(parse_price("12x"), None);
        assert_eq!(parse_price("12x sem juros"), None);
        assert_eq!(parse_price("12x de R$ 125,83"), Some(Decimal::new(12583, 2)));
        assert_eq!(
            parse_price("em até 12x de R$ 125,83"),
            Some(Decimal::new(12583, 2))
        );
        assert_eq!(parse_price("R$ 1.510"), Some(Decimal::new(1510, 0)));
    }

    #[test]
    fn cleans_price_text() {
        assert_eq!(clean_price_text("R$ R$ 1.510,40"), "R$ 1.510,40");
        assert_eq!(clean_price_text("R$R$\n  7.450,00 "), "R$ 7.450,00");
        assert_eq!(clean_price_text("   "), PRICE_ON_REQUEST);
        assert_eq!(clean_price_text("consultar"), PRICE_ON_REQUEST);
    }

    #[test]
    fn formats_with_thousands_groups() {
        assert_eq!(format_price(Decimal::new(151040, 2)), "1.510,40");
        assert_eq!(format_price(Decimal::new(5, 1)), "0,50");
        assert_eq!(format_price(Decimal::new(123456789, 0)), "123.456.789,00");
    }

    #[test]
    fn resolves_relative_links_against_the_page() {
        assert_eq!(
            resolve_url("/produto/kit-espetos", BASE).unwrap(),
            "https://www.lojamestreparrillero.com.br/produto/kit-espetos"
        );
        assert_eq!(
            resolve_url("https://cdn.example.com/a.jpg", BASE).unwrap(),
            "https://cdn.example.com/a.jpg"
        );
        assert_eq!(
            resolve_url("//cdn.example.com/a.jpg", BASE).unwrap(),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn rejects_unusable_urls() {
        assert!(matches!(
            resolve_url("", BASE),
            Err(NormalizeError::MalformedUrl { .. })
        ));
        assert!(resolve_url("javascript:void(0)", BASE).is_err());
        assert!(resolve_url("/produto", "not a base").is_err());
    }

    #[test]
    fn canonical_link_drops_fragment() {
        assert_eq!(
            canonical_link("/produto/grelha#avaliacoes", BASE).unwrap(),
            "https://www.lojamestreparrillero.com.br/produto/grelha"
        );
    }

    #[test]
    fn maps_availability_vocabulary() {
        assert_eq!(map_availability("  Disponível "), AvailabilityStatus::Available);
        assert_eq!(map_availability("EM ESTOQUE"), AvailabilityStatus::Available);
        assert_eq!(map_availability("Indisponível"), AvailabilityStatus::Unavailable);
        assert_eq!(map_availability("Esgotado"), AvailabilityStatus::Unavailable);
        assert_eq!(map_availability("sob encomenda"), AvailabilityStatus::Unknown);
        assert_eq!(map_availability(""), AvailabilityStatus::Unknown);
    }

    #[test]
    fn normalizes_a_raw_card() {
        let category = Category::new("Acessórios", BASE, "acessorios");
        let raw = RawProduct {
            external_id: Some("101".into()),
            sku: None,
            name: "Kit Espetos".into(),
            price_text: Some("R$ R$ 1.510,40".into()),
            image_url: None,
            link: "https://www.lojamestreparrillero.com.br/kit-espetos".into(),
            availability_text: None,
        };

        let product = normalize_product(raw, &category, BASE, Utc::now());
        assert_eq!(product.price_text.as_deref(), Some("R$ 1.510,40"));
        assert_eq!(product.price_value, Some(Decimal::new(151040, 2)));
        assert_eq!(product.category, "Acessórios");
        assert_eq!(product.availability_status, AvailabilityStatus::Available);
        assert_eq!(product.source_page, BASE);
    }

    #[test]
    fn missing_price_is_on_request() {
        let category = Category::new("Bancada", BASE, "bancada");
        let raw = RawProduct {
            external_id: None,
            sku: None,
            name: "Bancada Inox".into(),
            price_text: None,
            image_url: None,
            link: "https://www.lojamestreparrillero.com.br/bancada-inox".into(),
            availability_text: Some("Esgotado".into()),
        };

        let product = normalize_product(raw, &category, BASE, Utc::now());
        assert_eq!(product.price_text.as_deref(), Some(PRICE_ON_REQUEST));
        assert_eq!(product.price_value, None);
        assert_eq!(product.availability_status, AvailabilityStatus::Unavailable);
    }

    proptest! {
        #[test]
        fn formatted_prices_parse_back(cents in 0i64..10_000_000_000) {
            let value = Decimal::new(cents, 2);
            let display = format!("R$ {}", format_price(value));
            prop_assert_eq!(parse_price(&display), Some(value));
        }
    }
}
