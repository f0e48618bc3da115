//! pgs-consolidate: document parsing
//!
//! A metrics document is sectioned CSV. Sections are separated by blank lines
//! and the first line of each section is its title:
//!
//! ```text
//! Portfolio Allocations
//! Asset,Grid_001,Grid_002
//! US Equities,60,40
//! US Treasuries,40,60
//!
//! Risk and Return Metrics (Jan 1998 - Dec 2024)
//! Metric,Grid_001,Grid_002
//! Sharpe Ratio,0.70,0.65
//! Max. Drawdown,-27.1%,-20.0%
//! ```
//!
//! Portfolio columns may carry the service's positional labels instead of
//! names (`Sample Portfolio`, `Portfolio 2`, ...). Those are resolved against
//! the batch's planned portfolio list.

use pgs_grid::{Allocation, AssetWeight, GRID_FILE_TOLERANCE};
use tracing::debug;

use crate::ConsolidateError;

const ALLOCATION_TITLE: &str = "Portfolio Allocations";
const METRIC_TITLES: &[&str] = &["Portfolio Performance", "Risk and Return Metrics"];
const SAMPLE_LABEL: &str = "Sample Portfolio";
const BENCHMARK_PREFIX: &str = "benchmark";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Where the text came from (file path, batch label). Used in issue reports.
    pub source: String,
    pub text: String,
    /// Portfolio names of the batch in submission order, when known.
    pub expected_portfolios: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSection {
    pub title: String,
    /// (metric name, one value per allocation in document order)
    pub metrics: Vec<(String, Vec<Option<f64>>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub allocations: Vec<Allocation>,
    pub sections: Vec<MetricSection>,
}

struct Section<'a> {
    title: String,
    body: Vec<&'a str>,
}

pub fn parse_document(doc: &RawDocument) -> Result<ParsedDocument, ConsolidateError> {
    let fail = |reason: String| ConsolidateError::Parse {
        source: doc.source.clone(),
        reason,
    };
    let expected = doc.expected_portfolios.as_deref();

    let sections = split_sections(&doc.text).map_err(fail)?;

    let alloc_section = sections
        .iter()
        .find(|s| s.title.eq_ignore_ascii_case(ALLOCATION_TITLE))
        .ok_or_else(|| fail(format!("missing '{ALLOCATION_TITLE}' section")))?;
    let allocations = parse_allocations(alloc_section, expected).map_err(fail)?;
    let names: Vec<&str> = allocations.iter().map(|a| a.name.as_str()).collect();

    let mut metric_sections = Vec::new();
    for s in &sections {
        if METRIC_TITLES.iter().any(|t| starts_with_ignore_case(&s.title, t)) {
            metric_sections.push(parse_metric_section(s, expected, &names).map_err(fail)?);
        } else if !s.title.eq_ignore_ascii_case(ALLOCATION_TITLE) {
            debug!(source = %doc.source, title = %s.title, "skipping section");
        }
    }
    if metric_sections.is_empty() {
        return Err(fail("no metric sections".to_string()));
    }

    Ok(ParsedDocument {
        allocations,
        sections: metric_sections,
    })
}

fn split_sections(text: &str) -> Result<Vec<Section<'_>>, String> {
    let text = text.trim_start_matches('\u{feff}');
    let mut groups: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if is_blank_line(line) {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut out = Vec::with_capacity(groups.len());
    for g in groups {
        let title = csv_rows(&g[..1])?
            .into_iter()
            .next()
            .and_then(|r| r.into_iter().next())
            .unwrap_or_default();
        out.push(Section {
            title,
            body: g[1..].to_vec(),
        });
    }
    Ok(out)
}

fn is_blank_line(line: &str) -> bool {
    line.chars().all(|c| c.is_whitespace() || c == ',')
}

fn csv_rows(lines: &[&str]) -> Result<Vec<Vec<String>>, String> {
    let joined = lines.join("\n");
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(joined.as_bytes());
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| format!("csv: {e}"))?;
        out.push(rec.iter().map(str::to_string).collect());
    }
    Ok(out)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// 1-based position encoded in a service label, if it is one.
fn label_position(label: &str) -> Option<usize> {
    if label.eq_ignore_ascii_case(SAMPLE_LABEL) {
        return Some(1);
    }
    let rest = label.strip_prefix("Portfolio ")?;
    rest.trim().parse::<usize>().ok().filter(|n| *n >= 1)
}

/// Map header labels to portfolio names. Returns `None` for columns to ignore.
fn resolve_columns(
    labels: &[String],
    expected: Option<&[String]>,
    allow_benchmark: bool,
) -> Result<Vec<Option<String>>, String> {
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        if label.is_empty() {
            return Err("empty column header".to_string());
        }
        if allow_benchmark && starts_with_ignore_case(label, BENCHMARK_PREFIX) {
            out.push(None);
            continue;
        }
        let name = match (label_position(label), expected) {
            (Some(pos), Some(exp)) => exp
                .get(pos - 1)
                .cloned()
                .ok_or_else(|| format!("column '{label}' has no planned portfolio"))?,
            (Some(_), None) => {
                return Err(format!(
                    "positional column '{label}' needs the batch's portfolio list"
                ))
            }
            (None, _) => label.clone(),
        };
        out.push(Some(name));
    }

    let resolved: Vec<&String> = out.iter().flatten().collect();
    for (i, n) in resolved.iter().enumerate() {
        if resolved[..i].contains(n) {
            return Err(format!("portfolio '{n}' appears in two columns"));
        }
    }
    if let Some(exp) = expected {
        if let Some(unknown) = resolved.iter().find(|n| !exp.contains(n)) {
            return Err(format!("unknown portfolio column '{unknown}'"));
        }
        if let Some(missing) = exp.iter().find(|n| !resolved.contains(n)) {
            return Err(format!("missing portfolio column '{missing}'"));
        }
    }
    Ok(out)
}

fn header_and_rows(section: &Section<'_>, first: &str) -> Result<(Vec<String>, Vec<Vec<String>>), String> {
    let mut rows = csv_rows(&section.body)?.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| format!("section '{}' has no header", section.title))?;
    match header.first() {
        Some(h) if h.eq_ignore_ascii_case(first) => {}
        other => {
            return Err(format!(
                "section '{}' header starts with {:?}, expected '{first}'",
                section.title, other
            ))
        }
    }
    let labels: Vec<String> = header[1..]
        .iter()
        .rev()
        .skip_while(|h| h.is_empty())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .cloned()
        .collect();
    if labels.is_empty() {
        return Err(format!("section '{}' has no portfolio columns", section.title));
    }
    Ok((labels, rows.collect()))
}

fn parse_allocations(section: &Section<'_>, expected: Option<&[String]>) -> Result<Vec<Allocation>, String> {
    let (labels, rows) = header_and_rows(section, "Asset")?;
    let names: Vec<String> = resolve_columns(&labels, expected, false)?
        .into_iter()
        .flatten()
        .collect();

    let mut weights: Vec<Vec<AssetWeight>> = vec![Vec::new(); names.len()];
    for row in rows {
        let Some(asset) = row.first().filter(|a| !a.is_empty()) else {
            continue;
        };
        if asset.eq_ignore_ascii_case("total") {
            continue;
        }
        for (col, slot) in weights.iter_mut().enumerate() {
            let cell = row.get(col + 1).map(String::as_str).unwrap_or("");
            let percent = if cell.is_empty() {
                0.0
            } else {
                parse_number(cell)
                    .ok_or_else(|| format!("weight '{cell}' for '{asset}' is not a number"))?
            };
            slot.push(AssetWeight {
                asset: asset.clone(),
                percent,
            });
        }
    }

    names
        .into_iter()
        .zip(weights)
        .map(|(name, w)| Allocation::new(name, w, GRID_FILE_TOLERANCE).map_err(|e| e.to_string()))
        .collect()
}

fn parse_metric_section(
    section: &Section<'_>,
    expected: Option<&[String]>,
    names: &[&str],
) -> Result<MetricSection, String> {
    let (labels, rows) = header_and_rows(section, "Metric")?;
    let columns = resolve_columns(&labels, expected, true)?;

    // Column index (within labels) for each allocation, in allocation order.
    let mut positions = Vec::with_capacity(names.len());
    for n in names {
        let pos = columns
            .iter()
            .position(|c| c.as_deref() == Some(*n))
            .ok_or_else(|| format!("section '{}' is missing portfolio '{n}'", section.title))?;
        positions.push(pos);
    }
    if let Some(extra) = columns
        .iter()
        .flatten()
        .find(|c| !names.contains(&c.as_str()))
    {
        return Err(format!(
            "section '{}' has unknown portfolio column '{extra}'",
            section.title
        ));
    }

    let mut metrics = Vec::new();
    for row in rows {
        let Some(metric) = row.first().filter(|m| !m.is_empty()) else {
            continue;
        };
        let values = positions
            .iter()
            .map(|&p| row.get(p + 1).and_then(|c| parse_number(c)))
            .collect();
        metrics.push((metric.clone(), values));
    }

    Ok(MetricSection {
        title: section.title.clone(),
        metrics,
    })
}

/// Lenient numeric cell: `12.3%`, `$10,000`, `-0.5`. `N/A`, `-` and text are `None`.
pub(crate) fn parse_number(cell: &str) -> Option<f64> {
    let s = cell.trim();
    let s = s.strip_suffix('%').unwrap_or(s).trim();
    let s = s.strip_prefix('$').unwrap_or(s);
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMED: &str = "\
Portfolio Allocations
Asset,Grid_001,Grid_002
US Equities,60,40
US Treasuries,40,60

Portfolio Performance (Jan 1998 - Dec 2024)
Metric,Grid_001,Grid_002
Start Balance,\"$10,000\",\"$10,000\"
CAGR,7.1%,6.2%

Annual Returns
Year,Grid_001,Grid_002
1998,12.0%,8.0%

Risk and Return Metrics (Jan 1998 - Dec 2024)
Metric,Grid_001,Grid_002
Sharpe Ratio,0.70,0.65
Max. Drawdown,-27.1%,-20.0%
Sortino Ratio,N/A,0.9
";

    fn raw(text: &str, expected: Option<&[&str]>) -> RawDocument {
        RawDocument {
            source: "batch_001.csv".to_string(),
            text: text.to_string(),
            expected_portfolios: expected.map(|e| e.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn parses_named_document() {
        let doc = parse_document(&raw(NAMED, None)).unwrap();
        assert_eq!(doc.allocations.len(), 2);
        assert_eq!(doc.allocations[1].weight("US Treasuries"), Some(60.0));
        assert_eq!(doc.sections.len(), 2);

        let perf = &doc.sections[0];
        assert!(perf.title.starts_with("Portfolio Performance"));
        assert_eq!(perf.metrics[0], ("Start Balance".to_string(), vec![Some(10000.0), Some(10000.0)]));

        let risk = &doc.sections[1];
        assert_eq!(risk.metrics[1], ("Max. Drawdown".to_string(), vec![Some(-27.1), Some(-20.0)]));
        assert_eq!(risk.metrics[2].1, vec![None, Some(0.9)]);
    }

    #[test]
    fn positional_labels_map_to_planned_names() {
        let text = "\
Portfolio Allocations
Asset,Sample Portfolio,Portfolio 2
US Equities,60,40
US Treasuries,40,60

Risk and Return Metrics (Jan 1998 - Dec 2024)
Metric,Sample Portfolio,Portfolio 2,Benchmark (VFINX)
Sharpe Ratio,0.70,0.65,0.50
";
        let doc = parse_document(&raw(text, Some(&["Grid_019", "Grid_020"]))).unwrap();
        assert_eq!(doc.allocations[0].name, "Grid_019");
        assert_eq!(doc.allocations[1].name, "Grid_020");
        assert_eq!(doc.sections[0].metrics[0].1, vec![Some(0.70), Some(0.65)]);
    }

    #[test]
    fn positional_labels_without_plan_are_a_parse_error() {
        let text = "Portfolio Allocations\nAsset,Sample Portfolio\nA,100\n\nRisk and Return Metrics\nMetric,Sample Portfolio\nSharpe Ratio,1\n";
        assert!(matches!(
            parse_document(&raw(text, None)),
            Err(ConsolidateError::Parse { .. })
        ));
    }

    #[test]
    fn unknown_and_missing_columns_are_parse_errors() {
        let err = parse_document(&raw(NAMED, Some(&["Grid_001", "Grid_003"]))).unwrap_err();
        assert!(err.to_string().contains("unknown portfolio column 'Grid_002'"), "{err}");

        let short_metrics = NAMED.replace(
            "Metric,Grid_001,Grid_002\nSharpe Ratio,0.70,0.65",
            "Metric,Grid_001\nSharpe Ratio,0.70",
        );
        let err = parse_document(&raw(&short_metrics, None)).unwrap_err();
        assert!(err.to_string().contains("missing portfolio 'Grid_002'"), "{err}");
    }

    #[test]
    fn missing_allocation_section_is_a_parse_error() {
        let text = "Risk and Return Metrics\nMetric,Grid_001\nSharpe Ratio,1\n";
        let err = parse_document(&raw(text, None)).unwrap_err();
        assert!(err.to_string().contains("Portfolio Allocations"), "{err}");
    }

    #[test]
    fn allocation_not_summing_to_100_is_a_parse_error() {
        let text = NAMED.replace("US Treasuries,40,60", "US Treasuries,30,60");
        assert!(parse_document(&raw(&text, None)).is_err());
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(parse_number("12.3%"), Some(12.3));
        assert_eq!(parse_number(" $1,234.5 "), Some(1234.5));
        assert_eq!(parse_number("-0.5"), Some(-0.5));
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn crlf_and_bom_are_tolerated() {
        let text = format!("\u{feff}{}", NAMED.replace('\n', "\r\n"));
        let doc = parse_document(&raw(&text, None)).unwrap();
        assert_eq!(doc.allocations.len(), 2);
    }
}
