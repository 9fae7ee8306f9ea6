//! Cleaning of external model output before it is trusted.

use crate::models::{ClassificationResult, ClassificationSource, clamp_confidence};

use super::ExternalClassification;

/// Longest category or subcategory kept.
const MAX_CATEGORY_LEN: usize = 64;
/// Longest merchant name kept.
const MAX_MERCHANT_LEN: usize = 100;

/// Turns an external response into a result, or `None` if no usable
/// category survives cleaning.
#[must_use]
pub(crate) fn sanitize(response: ExternalClassification) -> Option<ClassificationResult> {
    let category = clean_text(&response.category, MAX_CATEGORY_LEN)?;
    let confidence = clamp_confidence(response.confidence);
    let mut result = ClassificationResult::new(category, confidence, ClassificationSource::External);
    result.subcategory = response
        .subcategory
        .as_deref()
        .and_then(|s| clean_text(s, MAX_CATEGORY_LEN));
    result.merchant_name = response
        .merchant_name
        .as_deref()
        .and_then(|s| clean_text(s, MAX_MERCHANT_LEN));
    result.is_recurring = response.is_recurring;
    result.recurring_frequency = response
        .recurring_frequency
        .filter(|_| response.is_recurring != Some(false));
    Some(result)
}

/// Strips markup and script-like content, keeps a conservative character
/// set, collapses whitespace and bounds the length.
///
/// Returns `None` when nothing is left.
#[must_use]
pub(crate) fn clean_text(raw: &str, max_len: usize) -> Option<String> {
    let without_tags = strip_tags(&strip_raw_text_elements(raw));
    let without_schemes = strip_script_schemes(&without_tags);
    let kept: String = without_schemes
        .chars()
        .map(|c| if is_allowed(c) { c } else { ' ' })
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let bounded: String = collapsed.chars().take(max_len).collect();
    let trimmed = bounded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Elements dropped together with their content.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Removes `<script>` and `<style>` elements including their content,
/// ignoring case. An unclosed element swallows the rest of the text.
fn strip_raw_text_elements(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let mut out = String::with_capacity(raw.len());
    let mut pos = 0;
    while let Some((start, name)) = next_element_open(&lower, pos) {
        out.push_str(raw.get(pos..start).unwrap_or_default());
        let closing = format!("</{name}");
        pos = lower
            .get(start..)
            .and_then(|rest| rest.find(&closing))
            .and_then(|at| {
                let close = start + at;
                lower.get(close..)?.find('>').map(|gt| close + gt + 1)
            })
            .unwrap_or(raw.len());
    }
    out.push_str(raw.get(pos..).unwrap_or_default());
    out
}

/// Earliest opening tag of a raw-text element at or after `from` in
/// lowercased text. `<scripts>` and the like do not count.
fn next_element_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    RAW_TEXT_ELEMENTS
        .into_iter()
        .filter_map(|name| {
            let open = format!("<{name}");
            let mut search = from;
            while let Some(at) = lower.get(search..).and_then(|rest| rest.find(&open)) {
                let start = search + at;
                let after = start + open.len();
                match lower.as_bytes().get(after).copied() {
                    None | Some(b'>' | b'/') => return Some((start, name)),
                    Some(byte) if byte.is_ascii_whitespace() => return Some((start, name)),
                    Some(_) => search = after,
                }
            }
            None
        })
        .min_by_key(|hit| hit.0)
}

/// Removes `<...>` sequences, and everything after an unclosed `<`.
fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Removes `javascript:`, `vbscript:` and `data:` prefixes wherever they
/// occur, ignoring case.
fn strip_script_schemes(text: &str) -> String {
    const SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];
    let mut out = text.to_owned();
    loop {
        let lower = out.to_ascii_lowercase();
        let hit = SCHEMES
            .iter()
            .filter_map(|scheme| lower.find(scheme).map(|at| (at, scheme.len())))
            .min();
        match hit {
            Some((at, len)) => out.replace_range(at..at + len, ""),
            None => return out,
        }
    }
}

/// Characters allowed in category and merchant names.
fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '&' | '-' | '/' | ',' | '.' | '\'' | '(' | ')')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecurringFrequency;

    fn response(category: &str, confidence: f64) -> ExternalClassification {
        ExternalClassification {
            category: category.to_owned(),
            subcategory: None,
            confidence,
            merchant_name: None,
            is_recurring: None,
            recurring_frequency: None,
        }
    }

    #[test]
    fn strips_markup_and_scripts() {
        let cleaned = clean_text("<script>alert(1)</script>Food & Dining", 64).unwrap();
        assert_eq!(cleaned, "Food & Dining");
        let cleaned = clean_text("JavaScript:Groceries", 64).unwrap();
        assert_eq!(cleaned, "Groceries");
        assert_eq!(clean_text("Travel <img src=x onerror=boom", 64).unwrap(), "Travel");
    }

    #[test]
    fn script_and_style_bodies_are_dropped() {
        let cleaned = clean_text("<SCRIPT type=x>steal()</Script >Groceries", 64).unwrap();
        assert_eq!(cleaned, "Groceries");
        let cleaned = clean_text("Bills<style>.a{color:red}</style> & Utilities", 64).unwrap();
        assert_eq!(cleaned, "Bills & Utilities");
        assert_eq!(clean_text("Travel<script>never closed", 64).unwrap(), "Travel");
        assert!(clean_text("<script>only(1)</script>", 64).is_none());
        assert_eq!(clean_text("<scripts>Shopping</scripts>", 64).unwrap(), "Shopping");
    }

    #[test]
    fn bounds_length_and_drops_symbols() {
        let long = "a".repeat(200);
        assert_eq!(clean_text(&long, 64).unwrap().len(), 64);
        assert_eq!(clean_text("Bills {} $$ ;; Utilities", 64).unwrap(), "Bills Utilities");
    }

    #[test]
    fn empty_after_cleaning_is_rejected() {
        assert!(sanitize(response("<b></b>", 0.9)).is_none());
        assert!(sanitize(response("   ", 0.9)).is_none());
    }

    #[test]
    fn confidence_is_clamped_and_source_external() {
        let result = sanitize(response("Shopping", 3.0)).unwrap();
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.source, ClassificationSource::External);
        let nan = sanitize(response("Shopping", f64::NAN)).unwrap();
        assert!(nan.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn non_recurring_drops_frequency() {
        let mut raw = response("Entertainment", 0.95);
        raw.is_recurring = Some(false);
        raw.recurring_frequency = Some(RecurringFrequency::Monthly);
        raw.merchant_name = Some("<i>Netflix</i>".to_owned());
        let result = sanitize(raw).unwrap();
        assert!(result.recurring_frequency.is_none());
        assert_eq!(result.merchant_name.as_deref(), Some("Netflix"));
    }
}
