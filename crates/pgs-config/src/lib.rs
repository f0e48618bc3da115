//! pgs-config
//!
//! Layered YAML configuration for the grid search.
//! - Files are merged in order (later files override earlier ones) into one JSON tree
//! - Secret-looking literals are rejected; credentials live in env vars only
//! - The canonical JSON form is hashed so every run can record exactly what it ran with
//! - Leaves that the selected command never reads are reported as unused
//!
//! Typed sections live in [`settings`]; env-var credential resolution in [`secrets`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub mod secrets;
pub mod settings;

pub use secrets::{resolve_service_credentials, ServiceCredentials};
pub use settings::{
    AssetBoundSettings, BatchSettings, ConsolidateSettings, GridSearchConfig, GridSettings,
    PathSettings, RankSettings, SampleSettings, ServiceKeysEnv, ServiceKind, ServiceSettings,
};

/// If any leaf string value in the effective config starts with one of these
/// we abort with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

// ---------------------------------------------------------------------------
// Command modes + consumed-key registry
// ---------------------------------------------------------------------------

/// Which `pgs` command is reading the config. Each command consumes a
/// different subset of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    Generate,
    Run,
    Consolidate,
    Rank,
}

impl CommandMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandMode::Generate => "GENERATE",
            CommandMode::Run => "RUN",
            CommandMode::Consolidate => "CONSOLIDATE",
            CommandMode::Rank => "RANK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// JSON-pointer prefixes each command actually reads. A leaf under any
/// listed prefix is consumed; everything else is unused for that command.
///
/// Keep this in step with `settings` and the CLI command modules.
pub fn consumed_pointers_for_mode(mode: CommandMode) -> &'static [&'static str] {
    match mode {
        CommandMode::Generate => &["/grid", "/paths/grid_file"],

        CommandMode::Run => &[
            "/batch",
            "/service",
            "/paths/grid_file",
            "/paths/work_dir",
            "/paths/runs_dir",
        ],

        CommandMode::Consolidate => &[
            "/paths/work_dir",
            "/paths/output_dir",
            "/consolidate",
        ],

        CommandMode::Rank => &["/paths/output_dir", "/rank"],
    }
}

/// Produce an unused-key report for a given mode.
/// If `policy == Fail`, returns an error when unused keys exist.
/// If `policy == Warn`, always returns Ok(report).
pub fn report_unused_keys(
    mode: CommandMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let mut consumed: BTreeSet<String> = BTreeSet::new();
    for p in consumed_pointers_for_mode(mode) {
        consumed.insert(normalize_pointer(p));
    }
    let consumed_prefixes: Vec<String> = consumed.iter().cloned().collect();

    let mut all_leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, &mut all_leaves);

    let mut unused: Vec<String> = all_leaves
        .into_iter()
        .filter(|lp| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS (mode={}): {} unused config leaf key(s) detected. \
            Remove them or update the consumed registry. First few: {}",
            report.mode,
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

/// `"batch/"` and `"/batch"` name the same subtree.
fn normalize_pointer(p: &str) -> String {
    let body = p.trim().trim_matches('/');
    format!("/{body}")
}

/// `/a/b` covers `/a/b` and `/a/b/c` but not `/a/bc`; `/` covers everything.
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    leaf.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Every scalar in `v` with its JSON pointer, depth-first in key order.
fn leaves(v: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), v)];
    while let Some((ptr, node)) = stack.pop() {
        let children: Vec<(String, &Value)> = match node {
            Value::Object(map) => map
                .iter()
                .map(|(k, child)| (format!("{ptr}/{}", escape_pointer_token(k)), child))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, child)| (format!("{ptr}/{i}"), child))
                .collect(),
            _ => Vec::new(),
        };
        if children.is_empty() && !matches!(node, Value::Object(_) | Value::Array(_)) {
            let ptr = if ptr.is_empty() { "/".to_string() } else { ptr };
            out.push((ptr, node));
        }
        stack.extend(children.into_iter().rev());
    }
    out
}

fn collect_leaf_pointers(v: &Value, out: &mut Vec<String>) {
    out.extend(leaves(v).into_iter().map(|(p, _)| p));
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let shown: Vec<&str> = items.iter().take(n).map(String::as_str).collect();
    format!("{shown:?}")
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p)
            .with_context(|| format!("failed to read yaml path: {}", p.display()))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    // Earlier docs are base, later docs override.
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty YAML document parses as null; treat it as "no overrides".
        if !v_json.is_null() {
            merged = deep_merge(merged, v_json);
        }
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json::Map is BTreeMap-backed (no preserve_order feature), so keys
    // serialize sorted and the hash does not depend on YAML key order.
    serde_json::to_string(v).context("canonical json serialize failed")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let hit = leaves(v)
        .into_iter()
        .find(|(_, leaf)| leaf.as_str().is_some_and(looks_like_secret));
    if let Some((ptr, _)) = hit {
        bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_override_earlier() {
        let base = "batch:\n  size: 3\n  max_attempts: 3\n";
        let over = "batch:\n  size: 5\n";
        let loaded = load_layered_yaml_from_strings(&[base, over]).unwrap();
        assert_eq!(loaded.config_json.pointer("/batch/size"), Some(&Value::from(5)));
        assert_eq!(
            loaded.config_json.pointer("/batch/max_attempts"),
            Some(&Value::from(3))
        );
    }

    #[test]
    fn empty_overlay_is_noop() {
        let base = "rank:\n  top_n: 5\n";
        let a = load_layered_yaml_from_strings(&[base]).unwrap();
        let b = load_layered_yaml_from_strings(&[base, ""]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }

    #[test]
    fn prefix_pointer_respects_boundaries() {
        assert!(is_prefix_pointer("/batch", "/batch/size"));
        assert!(is_prefix_pointer("/batch", "/batch"));
        assert!(!is_prefix_pointer("/batch", "/batches/size"));
        assert!(is_prefix_pointer("/", "/anything"));
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        let v = serde_json::json!({"grid": {"Real Estate/REIT": 1}});
        let mut out = Vec::new();
        collect_leaf_pointers(&v, &mut out);
        assert_eq!(out, vec!["/grid/Real Estate~1REIT".to_string()]);
    }
}
