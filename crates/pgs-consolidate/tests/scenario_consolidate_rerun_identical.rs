//! Consolidating the same documents twice, including into a directory that
//! already holds the previous output, produces byte-identical tables.

use std::collections::BTreeMap;
use std::fs;

use pgs_consolidate::{consolidate, read_id_mapping, write_tables, RawDocument, MAPPING_FILE};

fn batch_doc(index: usize, names: [&str; 3], sharpe: [f64; 3], dd: [f64; 3]) -> RawDocument {
    let text = format!(
        "Portfolio Allocations\n\
         Asset,Sample Portfolio,Portfolio 2,Portfolio 3\n\
         US Equities,60,50,40\n\
         US Treasuries,40,50,60\n\
         Total,100,100,100\n\
         \n\
         Portfolio Performance (Jan 1998 - Dec 2024)\n\
         Metric,Sample Portfolio,Portfolio 2,Portfolio 3,Benchmark (VFINX)\n\
         CAGR,7.1%,6.8%,6.2%,8.0%\n\
         \n\
         Risk and Return Metrics (Jan 1998 - Dec 2024)\n\
         Metric,Sample Portfolio,Portfolio 2,Portfolio 3,Benchmark (VFINX)\n\
         Sharpe Ratio,{},{},{},0.5\n\
         Max. Drawdown,{}%,{}%,{}%,-51.0%\n",
        sharpe[0], sharpe[1], sharpe[2], dd[0], dd[1], dd[2]
    );
    RawDocument {
        source: format!("results/batch_{index:03}.csv"),
        text,
        expected_portfolios: Some(names.iter().map(|s| s.to_string()).collect()),
    }
}

fn docs() -> Vec<RawDocument> {
    vec![
        batch_doc(
            1,
            ["Grid_001", "Grid_002", "Grid_003"],
            [0.70, 0.68, 0.65],
            [-27.1, -24.0, -20.0],
        ),
        batch_doc(
            2,
            ["Grid_004", "Grid_005", "Grid_006"],
            [0.70, 0.68, 0.65],
            [-27.1, -24.0, -20.0],
        ),
    ]
}

#[test]
fn rerun_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("generated_tables");

    let first = consolidate(&docs(), 0.01, BTreeMap::new());
    assert!(first.issues.is_empty(), "{:?}", first.issues);
    assert_eq!(first.metadata.rows.len(), 6);
    // 6 portfolios x (CAGR, Sharpe, drawdown); benchmark column ignored.
    assert_eq!(first.performance.len(), 18);

    let paths = write_tables(&out, &first).unwrap();
    let snapshot: Vec<Vec<u8>> = [&paths.metadata, &paths.performance, &paths.mapping]
        .iter()
        .map(|p| fs::read(p).unwrap())
        .collect();

    let mapping = read_id_mapping(&out.join(MAPPING_FILE)).unwrap();
    let second = consolidate(&docs(), 0.01, mapping);
    let paths2 = write_tables(&out, &second).unwrap();
    let again: Vec<Vec<u8>> = [&paths2.metadata, &paths2.performance, &paths2.mapping]
        .iter()
        .map(|p| fs::read(p).unwrap())
        .collect();

    assert_eq!(snapshot, again);
    assert_eq!(first, second);
}

#[test]
fn duplicate_document_does_not_duplicate_records() {
    let mut twice = docs();
    twice.extend(docs());
    let c = consolidate(&twice, 0.01, BTreeMap::new());
    assert!(c.issues.is_empty());
    assert_eq!(c.performance.len(), 18);
}
