//! Line-item extraction with an ordered list of tolerant row matchers.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::receipt::ParsedItem;

use super::amounts::parse_amount;
use super::patterns::{
    AMOUNT, FIVE_DIGITS, ITEM_AT_PRICE, ITEM_NAME_QTY_UNIT_TOTAL, ITEM_NAME_TOTAL,
    ITEM_QTY_NAME_TOTAL, ITEM_QTY_NAME_UNIT_TOTAL, ITEM_SECTION_HEADER, NON_ITEM, TOTAL_KEYWORD,
};
use super::{ExtractionMatch, FieldExtractor};

/// One row shape. Named groups: `name`, `total`, optional `qty` and `unit`.
pub struct ItemPattern {
    pub name: &'static str,
    pub regex: &'static Regex,
    pub confidence: f32,
}

lazy_static! {
    /// Row matchers, most explicit first. The first match on a line wins.
    pub static ref ITEM_PATTERNS: Vec<ItemPattern> = vec![
        ItemPattern {
            name: "qty_at_unit",
            regex: &ITEM_AT_PRICE,
            confidence: 0.9,
        },
        ItemPattern {
            name: "name_qty_unit_total",
            regex: &ITEM_NAME_QTY_UNIT_TOTAL,
            confidence: 0.85,
        },
        ItemPattern {
            name: "qty_name_unit_total",
            regex: &ITEM_QTY_NAME_UNIT_TOTAL,
            confidence: 0.85,
        },
        ItemPattern {
            name: "qty_name_total",
            regex: &ITEM_QTY_NAME_TOTAL,
            confidence: 0.75,
        },
        ItemPattern {
            name: "name_total",
            regex: &ITEM_NAME_TOTAL,
            confidence: 0.6,
        },
    ];
}

fn clean_name(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let name = collapsed.trim_matches(|c: char| !c.is_alphanumeric());
    if name.chars().count() <= 1 || FIVE_DIGITS.is_match(name) {
        return None;
    }
    Some(name.to_string())
}

fn build_item(caps: &Captures<'_>) -> Option<ParsedItem> {
    let name = clean_name(caps.name("name")?.as_str())?;
    let line_total = parse_amount(caps.name("total")?.as_str())?;
    let quantity = match caps.name("qty") {
        Some(m) => Decimal::from_str(m.as_str()).ok()?,
        None => Decimal::ONE,
    };
    if quantity.is_zero() {
        return None;
    }
    let unit_price = match caps.name("unit") {
        Some(m) => parse_amount(m.as_str())?,
        None => line_total.checked_div(quantity)?.round_dp(2),
    };

    Some(ParsedItem {
        name,
        quantity,
        unit_price,
        line_total,
    })
}

/// A column header row such as `ITEM QTY PRICE`.
fn is_section_header(line: &str) -> bool {
    !AMOUNT.is_match(line) && ITEM_SECTION_HEADER.find_iter(line).count() >= 2
}

/// Extracts itemized rows; everything that does not look like one is skipped.
pub struct ItemExtractor;

impl ItemExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Match one line against the ordered patterns.
    pub fn match_line(&self, line: &str) -> Option<ExtractionMatch<ParsedItem>> {
        let line = line.trim();
        if NON_ITEM.is_match(line) || TOTAL_KEYWORD.is_match(line) {
            return None;
        }
        ITEM_PATTERNS.iter().find_map(|pattern| {
            let caps = pattern.regex.captures(line)?;
            build_item(&caps).map(|item| ExtractionMatch::new(item, pattern.confidence, line))
        })
    }
}

impl Default for ItemExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for ItemExtractor {
    type Output = ExtractionMatch<ParsedItem>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let lines: Vec<&str> = text.lines().collect();
        let start = lines
            .iter()
            .position(|line| is_section_header(line))
            .map_or(0, |i| i + 1);

        lines[start..]
            .iter()
            .filter_map(|line| self.match_line(line))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(line: &str) -> Option<ParsedItem> {
        ItemExtractor::new().match_line(line).map(|m| m.value)
    }

    #[test]
    fn test_name_and_total_defaults_quantity() {
        assert_eq!(
            item("WIDGET 15.00"),
            Some(ParsedItem {
                name: "WIDGET".to_string(),
                quantity: Decimal::ONE,
                unit_price: dec("15.00"),
                line_total: dec("15.00"),
            })
        );
    }

    #[test]
    fn test_quantity_at_unit_price() {
        let parsed = item("MILK 2 @ 1.25 = 2.50").unwrap();
        assert_eq!(parsed.name, "MILK");
        assert_eq!(parsed.quantity, dec("2"));
        assert_eq!(parsed.unit_price, dec("1.25"));
        assert_eq!(parsed.line_total, dec("2.50"));
    }

    #[test]
    fn test_weighed_goods() {
        let parsed = item("BANANAS 1.25 lb @ 0.59 /lb 0.74").unwrap();
        assert_eq!(parsed.name, "BANANAS");
        assert_eq!(parsed.quantity, dec("1.25"));
        assert_eq!(parsed.unit_price, dec("0.59"));
        assert_eq!(parsed.line_total, dec("0.74"));
    }

    #[test]
    fn test_name_qty_unit_total_columns() {
        let parsed = item("Green Tea 3 1.50 4.50").unwrap();
        assert_eq!(parsed.name, "Green Tea");
        assert_eq!(parsed.quantity, dec("3"));
        assert_eq!(parsed.unit_price, dec("1.50"));
    }

    #[test]
    fn test_leading_quantity() {
        let parsed = item("2x COFFEE 7.00").unwrap();
        assert_eq!(parsed.name, "COFFEE");
        assert_eq!(parsed.quantity, dec("2"));
        assert_eq!(parsed.unit_price, dec("3.50"));

        let parsed = item("3 BAGEL 1.10 3.30").unwrap();
        assert_eq!(parsed.name, "BAGEL");
        assert_eq!(parsed.unit_price, dec("1.10"));
    }

    #[test]
    fn test_non_item_lines_are_skipped() {
        assert_eq!(item("SUBTOTAL 40.00"), None);
        assert_eq!(item("TAX 2.50"), None);
        assert_eq!(item("VISA 42.50"), None);
        assert_eq!(item("TIP 5.00"), None);
        assert_eq!(item("ACME MART"), None);
        assert_eq!(item("Order #12345 9.99"), None);
        assert_eq!(item("$ 4.00"), None);
    }

    #[test]
    fn test_section_header_skips_preamble() {
        let text = "Store 42 Lane 3.00\nITEM QTY PRICE\nCOOKIE 1.00";
        let items = ItemExtractor::new().extract_all(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value.name, "COOKIE");
    }
}
