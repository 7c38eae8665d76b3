//! Parsing of the curated registry sources.
//!
//! Two layouts are accepted. A header row naming an `address` column selects delimited rows;
//! otherwise the text is scanned for quoted value tuples such as `('0xabc..', 'Name')`.

use crate::error::RegistryParseError;
use crate::model::EntityCategory;
use crate::utils::hex::parse_address;
use alloy::primitives::Address;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// General address labels: `address`, `name`, optional `category`.
    General,
    /// Exchange addresses: `address` plus `cex_name` (or `name`); always CEX.
    Exchange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub address: Address,
    pub name: String,
    pub category: EntityCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRegistry {
    pub entries: Vec<RegistryEntry>,
    pub skipped: usize,
}

const CHAIN_NAMES: &[&str] = &["ethereum", "mainnet"];

pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn categorize(kind: RegistryKind, name: &str, raw_category: Option<&str>) -> EntityCategory {
    if kind == RegistryKind::Exchange {
        return EntityCategory::Cex;
    }
    raw_category
        .and_then(EntityCategory::parse)
        .unwrap_or_else(|| EntityCategory::from_entity_name(name))
}

pub fn parse_registry(
    source_name: &str,
    kind: RegistryKind,
    text: &str,
) -> Result<ParsedRegistry, RegistryParseError> {
    let malformed = |reason: &str| RegistryParseError {
        source_name: source_name.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Err(malformed("empty body"));
    }

    let first_line = trimmed.lines().next().unwrap_or_default();
    let header = split_delimited(first_line);
    let parsed = if header
        .iter()
        .any(|h| h.trim().eq_ignore_ascii_case("address"))
    {
        parse_delimited(kind, &header, trimmed).map_err(|reason| malformed(&reason))?
    } else {
        parse_tuples(kind, trimmed)
    };

    if parsed.entries.is_empty() {
        return Err(malformed(&format!(
            "no usable rows ({} skipped)",
            parsed.skipped
        )));
    }
    Ok(parsed)
}

fn column(header: &[String], names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    })
}

fn parse_delimited(
    kind: RegistryKind,
    header: &[String],
    text: &str,
) -> Result<ParsedRegistry, String> {
    let address_col = column(header, &["address"]).ok_or("missing `address` column")?;
    let name_cols: &[&str] = match kind {
        RegistryKind::General => &["name", "label", "entity"],
        RegistryKind::Exchange => &["cex_name", "name"],
    };
    let name_col = column(header, name_cols)
        .ok_or_else(|| format!("missing name column (one of {})", name_cols.join(", ")))?;
    let category_col = column(header, &["category", "label_type"]);

    let mut out = ParsedRegistry::default();
    for line in text.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_delimited(line);
        let address = fields.get(address_col).and_then(|a| parse_address(a));
        let name = fields
            .get(name_col)
            .map(|n| normalize_name(n))
            .filter(|n| !n.is_empty());
        match (address, name) {
            (Some(address), Some(name)) => {
                let raw_category = category_col.and_then(|c| fields.get(c)).map(String::as_str);
                let category = categorize(kind, &name, raw_category);
                out.entries.push(RegistryEntry {
                    address,
                    name,
                    category,
                });
            }
            _ => out.skipped += 1,
        }
    }
    Ok(out)
}

/// Splits one comma-delimited line, honouring double quotes and `""` escapes.
fn split_delimited(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            '\r' if !in_quotes => {}
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn tuple_patterns() -> Option<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            let tuple = Regex::new(r"\(([^()]*)\)").ok()?;
            let quoted = Regex::new(r"'((?:[^']|'')*)'").ok()?;
            Some((tuple, quoted))
        })
        .as_ref()
}

fn parse_tuples(kind: RegistryKind, text: &str) -> ParsedRegistry {
    let mut out = ParsedRegistry::default();
    let Some((tuple_re, quoted_re)) = tuple_patterns() else {
        return out;
    };
    for tuple in tuple_re.captures_iter(text) {
        let Some(body) = tuple.get(1) else { continue };
        let fields: Vec<String> = quoted_re
            .captures_iter(body.as_str())
            .filter_map(|c| c.get(1).map(|m| m.as_str().replace("''", "'")))
            .collect();
        if fields.len() < 2 {
            continue;
        }
        let address_pos = fields.iter().position(|f| parse_address(f).is_some());
        let Some(address_pos) = address_pos else {
            out.skipped += 1;
            continue;
        };
        let name = fields
            .iter()
            .enumerate()
            .filter(|(i, f)| {
                *i != address_pos && !CHAIN_NAMES.contains(&f.trim().to_lowercase().as_str())
            })
            .map(|(_, f)| normalize_name(f))
            .find(|n| !n.is_empty());
        match (parse_address(&fields[address_pos]), name) {
            (Some(address), Some(name)) => {
                let category = categorize(kind, &name, None);
                out.entries.push(RegistryEntry {
                    address,
                    name,
                    category,
                });
            }
            _ => out.skipped += 1,
        }
    }
    out
}
