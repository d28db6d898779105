//! Fragment extraction from listing HTML
//!
//! Uses CSS selectors to pull price (and quantity) text out of offer rows,
//! plus the seller's profile link when a row carries one.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// `data-s` attributes that carry a clean machine-readable price
static NUMERIC_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d.,]+$").unwrap());

static PROFILE_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="/users/"], a[href*="/user/"], a[href*="/shop/"]"#).unwrap()
});

/// Raw text of one offer as seen on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferFragment {
    pub price_text: String,
    pub amount_text: Option<String>,
    pub seller: Option<String>,
    pub href: Option<String>,
}

impl OfferFragment {
    pub fn new(price_text: &str, amount_text: Option<&str>) -> Self {
        Self {
            price_text: price_text.to_string(),
            amount_text: amount_text.map(str::to_string),
            seller: None,
            href: None,
        }
    }

    pub fn with_seller(mut self, seller: &str, href: &str) -> Self {
        self.seller = Some(seller.to_string());
        self.href = Some(href.to_string());
        self
    }
}

/// Compiled selectors for one page layout
#[derive(Debug, Clone)]
pub struct FragmentExtractor {
    row: Option<Selector>,
    price: Selector,
    amount: Option<Selector>,
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector {:?}: {}", css, e))
}

fn non_empty(css: Option<&str>) -> Option<&str> {
    css.map(str::trim).filter(|s| !s.is_empty())
}

impl FragmentExtractor {
    /// Build from CSS strings. Empty `row`/`amount` selectors are treated as unset.
    pub fn new(row: Option<&str>, price: &str, amount: Option<&str>) -> Result<Self> {
        Ok(Self {
            row: non_empty(row).map(compile).transpose()?,
            price: compile(price)?,
            amount: non_empty(amount).map(compile).transpose()?,
        })
    }

    /// Extract fragments in page order
    pub fn extract(&self, html: &str) -> Vec<OfferFragment> {
        let document = Html::parse_document(html);

        match &self.row {
            Some(row) => document
                .select(row)
                .filter_map(|row_el| {
                    let price_el = row_el.select(&self.price).next()?;
                    let amount_text = self
                        .amount
                        .as_ref()
                        .and_then(|sel| row_el.select(sel).next())
                        .map(element_text)
                        .filter(|t| !t.is_empty());
                    let (seller, href) = profile_link(row_el);
                    Some(OfferFragment {
                        price_text: price_text(price_el),
                        amount_text,
                        seller,
                        href,
                    })
                })
                .collect(),
            None => document
                .select(&self.price)
                .map(|el| OfferFragment {
                    price_text: price_text(el),
                    amount_text: None,
                    seller: None,
                    href: None,
                })
                .collect(),
        }
    }
}

fn price_text(el: ElementRef<'_>) -> String {
    match el.value().attr("data-s") {
        Some(attr) if NUMERIC_ATTR.is_match(attr.trim()) => attr.trim().to_string(),
        _ => element_text(el),
    }
}

/// Seller name and profile href from the first profile link inside a row
fn profile_link(row: ElementRef<'_>) -> (Option<String>, Option<String>) {
    match row.select(&PROFILE_LINK).next() {
        Some(link) => {
            let seller = Some(element_text(link)).filter(|t| !t.is_empty());
            let href = link
                .value()
                .attr("href")
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string);
            (seller, href)
        }
        None => (None, None),
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
