//! Listing page extraction.
//!
//! A [`PageExtractor`] turns the markup of one listing page into raw product
//! records plus the "is there another page" signal. The storefront runs a
//! single template, so [`ListingExtractor`] is the only strategy; its CSS
//! selectors come from configuration so a template tweak does not need a
//! rebuild.

use crate::error::ExtractionAnomaly;
use crate::models::{AvailabilityStatus, RawProduct};
use crate::scrapers::normalize::{canonical_link, map_availability, resolve_url};
use crate::scrapers::types::{ListingPage, PageContext};
use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Extraction strategy for one markup shape
pub trait PageExtractor: Send + Sync {
    fn extract(&self, markup: &str, page: &PageContext<'_>) -> ListingPage;
}

/// CSS selectors for the parts of a listing page.
///
/// Every field is a list tried in order; the first selector that matches wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub product_card: Vec<String>,
    pub name: Vec<String>,
    pub link: Vec<String>,
    pub price: Vec<String>,
    pub installment_price: Vec<String>,
    pub image: Vec<String>,
    pub sku: Vec<String>,
    pub availability: Vec<String>,
    pub next_page: Vec<String>,
    pub page_links: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            product_card: strings(&["li .listagem-item"]),
            name: strings(&[".nome-produto"]),
            link: strings(&[".produto-sobrepor", "a[href]"]),
            price: strings(&[".preco-venda", ".preco-promocional"]),
            installment_price: strings(&[".preco-parcela strong.cor-principal"]),
            image: strings(&[".imagem-principal"]),
            sku: strings(&[".produto-sku"]),
            availability: strings(&[
                ".bandeira-indisponivel",
                ".produto-indisponivel",
                ".disponibilidade",
                ".indisponivel",
            ]),
            next_page: strings(&[
                "a[rel='next']",
                ".pagination .next",
                ".paginacao .proxima",
                ".pagination li.next a",
            ]),
            page_links: strings(&[".paginacao a", ".pagination a"]),
        }
    }
}

fn product_id_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"prod-id-(\d+)").expect("product id pattern is valid"))
}

/// Default strategy: repeating product cards plus a pagination bar
pub struct ListingExtractor {
    product_card: Vec<Selector>,
    name: Vec<Selector>,
    link: Vec<Selector>,
    price: Vec<Selector>,
    installment_price: Vec<Selector>,
    image: Vec<Selector>,
    sku: Vec<Selector>,
    availability: Vec<Selector>,
    next_page: Vec<Selector>,
    page_links: Vec<Selector>,
}

impl ListingExtractor {
    /// Create an extractor for the storefront's default template
    #[cfg(test)]
    pub fn new() -> Result<Self> {
        Self::with_selectors(&ListingSelectors::default())
    }

    /// Create an extractor from custom selectors
    pub fn with_selectors(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            product_card: compile("product_card", &selectors.product_card)?,
            name: compile("name", &selectors.name)?,
            link: compile("link", &selectors.link)?,
            price: compile("price", &selectors.price)?,
            installment_price: compile("installment_price", &selectors.installment_price)?,
            image: compile("image", &selectors.image)?,
            sku: compile("sku", &selectors.sku)?,
            availability: compile("availability", &selectors.availability)?,
            next_page: compile("next_page", &selectors.next_page)?,
            page_links: compile("page_links", &selectors.page_links)?,
        })
    }

    fn extract_card(
        &self,
        card: ElementRef<'_>,
        index: usize,
        page: &PageContext<'_>,
        anomalies: &mut Vec<ExtractionAnomaly>,
    ) -> Option<RawProduct> {
        let Some(name) = first_text(card, &self.name) else {
            anomalies.push(ExtractionAnomaly::RequiredFieldMissing {
                card: index,
                field: "name",
            });
            return None;
        };

        let Some(href) = first_attr(card, &self.link, &["href"]) else {
            anomalies.push(ExtractionAnomaly::RequiredFieldMissing {
                card: index,
                field: "link",
            });
            return None;
        };

        let link = match canonical_link(&href, page.page_url) {
            Ok(link) => link,
            Err(source) => {
                anomalies.push(ExtractionAnomaly::MalformedLink {
                    card: index,
                    source,
                });
                return None;
            }
        };

        let price_text = first_text(card, &self.price)
            .map(|text| format!("R$ {}", text))
            .or_else(|| first_text(card, &self.installment_price));

        let image_url = match first_attr(card, &self.image, &["src", "data-src"]) {
            Some(src) => match resolve_url(&src, page.page_url) {
                Ok(url) => Some(url),
                Err(source) => {
                    anomalies.push(ExtractionAnomaly::MalformedImage {
                        card: index,
                        source,
                    });
                    None
                }
            },
            None => {
                anomalies.push(ExtractionAnomaly::OptionalFieldMissing {
                    card: index,
                    field: "image",
                });
                None
            }
        };

        let sku = first_text(card, &self.sku);
        if sku.is_none() {
            anomalies.push(ExtractionAnomaly::OptionalFieldMissing {
                card: index,
                field: "sku",
            });
        }

        let availability_text = first_match(card, &self.availability).map(|el| {
            let text = element_text(el);
            if text.is_empty() {
                // Badges are sometimes icon-only; the class carries the meaning
                el.value().classes().collect::<Vec<_>>().join(" ")
            } else {
                text
            }
        });
        if let Some(text) = availability_text.as_deref() {
            if !text.is_empty() && map_availability(text) == AvailabilityStatus::Unknown {
                anomalies.push(ExtractionAnomaly::UnmatchedAvailability {
                    card: index,
                    text: text.to_string(),
                });
            }
        }

        Some(RawProduct {
            external_id: card_id(card),
            sku,
            name,
            price_text,
            image_url,
            link,
            availability_text,
        })
    }

    /// An explicit "next" control decides on its own; without one, any numbered
    /// page link beyond the current page means there is more to read.
    fn has_next_page(&self, document: &Html, page_number: u32) -> bool {
        let next_control = self
            .next_page
            .iter()
            .find_map(|selector| document.select(selector).next());

        if let Some(control) = next_control {
            return control_enabled(control);
        }

        self.page_links
            .iter()
            .flat_map(|selector| document.select(selector))
            .filter_map(|link| element_text(link).parse::<u32>().ok())
            .any(|number| number > page_number)
    }
}

impl PageExtractor for ListingExtractor {
    fn extract(&self, markup: &str, page: &PageContext<'_>) -> ListingPage {
        let document = Html::parse_document(markup);

        let cards: Vec<ElementRef<'_>> = self
            .product_card
            .iter()
            .map(|selector| document.select(selector).collect::<Vec<_>>())
            .find(|cards| !cards.is_empty())
            .unwrap_or_default();

        debug!(
            "Found {} product cards on {} page {}",
            cards.len(),
            page.category.name,
            page.page_number
        );

        let mut anomalies = Vec::new();
        let records: Vec<RawProduct> = cards
            .iter()
            .enumerate()
            .filter_map(|(index, card)| self.extract_card(*card, index, page, &mut anomalies))
            .collect();

        for anomaly in &anomalies {
            warn!(
                "{} page {}: {}",
                page.category.name, page.page_number, anomaly
            );
        }

        ListingPage {
            cards_seen: cards.len(),
            has_next_page: self.has_next_page(&document, page.page_number),
            records,
            anomalies,
        }
    }
}

fn compile(field: &str, selectors: &[String]) -> Result<Vec<Selector>> {
    let mut compiled = Vec::with_capacity(selectors.len());
    for selector in selectors {
        match Selector::parse(selector) {
            Ok(parsed) => compiled.push(parsed),
            Err(e) => warn!("Ignoring invalid {} selector '{}': {}", field, selector, e),
        }
    }

    if compiled.is_empty() {
        anyhow::bail!("no usable selector for '{}'", field);
    }
    Ok(compiled)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_match<'a>(card: ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .find_map(|selector| card.select(selector).next())
}

fn first_text(card: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|selector| card.select(selector))
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn first_attr(card: ElementRef<'_>, selectors: &[Selector], attrs: &[&str]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|selector| card.select(selector))
        .find_map(|el| {
            attrs
                .iter()
                .filter_map(|attr| el.value().attr(attr))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        })
}

fn card_id(card: ElementRef<'_>) -> Option<String> {
    if let Some(id) = card.value().attr("data-id").map(str::trim) {
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    card.value()
        .attr("class")
        .and_then(|classes| product_id_class().captures(classes))
        .map(|caps| caps[1].to_string())
}

fn control_enabled(control: ElementRef<'_>) -> bool {
    let element = control.value();
    let disabled = element.attr("disabled").is_some()
        || element.attr("aria-disabled") == Some("true")
        || element.classes().any(|c| c == "disabled" || c == "desabilitado");

    // Disabled state is often marked on the surrounding list item
    let parent_disabled = control
        .parent()
        .and_then(ElementRef::wrap)
        .map(|parent| parent.value().classes().any(|c| c == "disabled"))
        .unwrap_or(false);

    let href = element.attr("href").map(str::trim);
    let navigable = match element.name() {
        "a" => matches!(href, Some(h) if !h.is_empty() && h != "#"),
        _ => true,
    };

    !disabled && !parent_disabled && navigable
}
