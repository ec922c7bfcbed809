//! Common regex patterns for receipt field extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Normalization
    pub static ref SEPARATOR_RUN: Regex = Regex::new(r"[-=_*]{2,}").unwrap();

    pub static ref NOISE_CHARS: Regex = Regex::new(
        r##"[^\w\s@$.,\-()/\\:&'"#%=+]"##
    ).unwrap();

    // Contact details that disqualify a merchant candidate
    pub static ref PHONE_NUMBER: Regex = Regex::new(
        r"\(?\d{3}\)?[-.\s]?\d{3}[-.]?\d{4}"
    ).unwrap();

    pub static ref POSTAL_CODE: Regex = Regex::new(r"\b\d{5}(?:-\d{4})?\b").unwrap();

    pub static ref WEB_OR_EMAIL: Regex = Regex::new(r"(?i)@|\.com\b|www\.|https?:").unwrap();

    pub static ref NON_MERCHANT: Regex = Regex::new(
        r"(?i)\b(?:tel|fax|phone|address|receipt|invoice|order|terminal|transaction|merchant|card|credit|debit|cash|total|subtotal|tax|date|time|server|cashier|operator|www|http|item|qty|quantity|price|amount|copy|duplicate|original|customer)\b"
    ).unwrap();

    pub static ref DECORATION: Regex = Regex::new(r"^[-=\s]+|[-=\s]+$|(?i)\s+copy$").unwrap();

    // Currency-shaped numbers: 42.50, $42.50, 1,234.56, 42,50
    // Integer part capped at nine digits so parsed amounts stay well inside Decimal range
    pub static ref AMOUNT: Regex = Regex::new(
        r"\$?\s?\b(\d{1,3}(?:,\d{3}){1,2}\.\d{2}|\d{1,9}[.,]\d{2})\b"
    ).unwrap();

    pub static ref AMOUNT_ONLY: Regex = Regex::new(
        r"^\$?\s?(\d{1,3}(?:,\d{3}){1,2}\.\d{2}|\d{1,9}[.,]\d{2})$"
    ).unwrap();

    // Total keywords, tolerant of O/0 and l/1 confusion and split letters
    pub static ref TOTAL_KEYWORD: Regex = Regex::new(
        r"(?i)\b(?:(?:sub|grand)\s?)?t\s?[o0]\s?t\s?a\s?[l1]\b|\b(?:amount|balance)\s+due\b|\bamount\b|\bsum\b|\bdue\b"
    ).unwrap();

    pub static ref TOTAL_EXCLUDED: Regex = Regex::new(
        r"(?i)\b(?:change|tendered|cash|savings|saved|discount)\b|\btotal\s+tax\b|\btax\s+total\b"
    ).unwrap();

    // Dates, most specific first
    pub static ref DATE_ISO: Regex = Regex::new(
        r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b"
    ).unwrap();

    pub static ref DATE_MONTH_DAY_YEAR: Regex = Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b"
    ).unwrap();

    pub static ref DATE_DAY_MONTH_YEAR: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b"
    ).unwrap();

    pub static ref DATE_NUMERIC_LONG: Regex = Regex::new(
        r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})\b"
    ).unwrap();

    pub static ref DATE_NUMERIC_SHORT: Regex = Regex::new(
        r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{2})\b"
    ).unwrap();

    pub static ref TIME_OF_DAY: Regex = Regex::new(
        r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([AaPp])\.?[Mm]\.?)?"
    ).unwrap();

    // Line items
    pub static ref ITEM_SECTION_HEADER: Regex = Regex::new(
        r"(?i)\b(?:item|items|description|qty|quantity|price|products)\b"
    ).unwrap();

    pub static ref NON_ITEM: Regex = Regex::new(
        r"(?i)\b(?:total|subtotal|tax|gratuity|tip|change|cash|credit|debit|card|visa|mastercard|amex|balance|tendered|due|tel|fax|phone|address|receipt|invoice|date|time|merchant|terminal|transaction|approved|auth|savings)\b|#|\.com\b|https?:|www\."
    ).unwrap();

    pub static ref ITEM_AT_PRICE: Regex = Regex::new(
        r"(?i)^(?P<name>.*?[a-z].*?)\s+(?P<qty>\d{1,6}(?:\.\d{1,3})?)\s*(?:lbs?|kg|oz|ea)?\s*@\s*\$?\b(?P<unit>\d{1,9}[.,]\d{2})\s*(?:/\s*(?:lbs?|kg|oz|ea))?\s*=?\s*\$?\b(?P<total>\d{1,9}[.,]\d{2})$"
    ).unwrap();

    pub static ref ITEM_NAME_QTY_UNIT_TOTAL: Regex = Regex::new(
        r"(?i)^(?P<name>.*?[a-z].*?)\s+(?P<qty>\d{1,6}(?:\.\d{1,3})?)\s+\$?\b(?P<unit>\d{1,9}[.,]\d{2})\s+\$?\b(?P<total>\d{1,9}[.,]\d{2})$"
    ).unwrap();

    pub static ref ITEM_QTY_NAME_UNIT_TOTAL: Regex = Regex::new(
        r"(?i)^(?P<qty>\d{1,6}(?:\.\d{1,3})?)\s*(?:x|pcs?|pieces?|ea|each)?\s+(?P<name>.*?[a-z].*?)\s+\$?\b(?P<unit>\d{1,9}[.,]\d{2})\s+\$?\b(?P<total>\d{1,9}[.,]\d{2})$"
    ).unwrap();

    pub static ref ITEM_QTY_NAME_TOTAL: Regex = Regex::new(
        r"(?i)^(?P<qty>\d{1,6}(?:\.\d{1,3})?)\s*(?:x|pcs?|pieces?|ea|each)?\s+(?P<name>.*?[a-z].*?)\s+\$?\b(?P<total>\d{1,9}[.,]\d{2})$"
    ).unwrap();

    pub static ref ITEM_NAME_TOTAL: Regex = Regex::new(
        r"(?i)^(?P<name>.*?[a-z].*?)\s*\$?\b(?P<total>\d{1,9}[.,]\d{2})$"
    ).unwrap();

    pub static ref FIVE_DIGITS: Regex = Regex::new(r"\d{5}").unwrap();
}
