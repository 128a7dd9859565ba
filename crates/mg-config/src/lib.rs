//! mg-config
//!
//! Layered YAML configuration for the guard.
//!
//! - Documents merge in order: earlier layers are the base, later layers
//!   override key by key (objects merge recursively, everything else is
//!   replaced).
//! - The merged tree is serialized to canonical JSON (sorted keys, compact)
//!   and hashed with SHA-256; the hex digest identifies the effective config.
//! - Secrets never live in config files: leaves whose key looks like a
//!   credential are rejected with `CONFIG_SECRET_DETECTED`. The passphrase
//!   comes from the environment.
//! - [`GuardConfig`] is the typed view; [`GuardConfig::validate`] converts it
//!   into domain configurations or rejects it whole.

mod guard;

pub use guard::*;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Leaf key names that must not carry literal values.
const SECRET_KEYS: &[&str] = &["passphrase", "password", "secret", "token", "api_key"];

/// Top-level sections read by [`GuardConfig`].
const CONSUMED_SECTIONS: &[&str] = &["/arming", "/actions", "/auto_arm", "/protection"];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged tree. Missing sections take their defaults.
    pub fn guard_config(&self) -> Result<GuardConfig> {
        serde_json::from_value(self.config_json.clone()).context("config does not match schema")
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses as null; treat it as an empty layer.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
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
    // serde_json's default map is ordered by key.
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        let key = ptr.rsplit('/').next().unwrap_or_default();
        let is_string = v.pointer(&ptr).map(Value::is_string).unwrap_or(false);
        if is_string && SECRET_KEYS.iter().any(|s| key.eq_ignore_ascii_case(s)) {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// List leaves that [`GuardConfig`] does not read. Typos in section or field
/// names show up here rather than silently falling back to defaults.
///
/// A leaf is consumed when it survives a round trip through the typed view.
/// If the tree does not fit the typed view at all, only top-level sections
/// are checked; validation reports the type error itself.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let typed = serde_json::from_value::<GuardConfig>(config_json.clone())
        .ok()
        .and_then(|g| serde_json::to_value(g).ok());
    let consumed = |lp: &str| match &typed {
        Some(round_trip) => round_trip.pointer(lp).is_some(),
        None => CONSUMED_SECTIONS.iter().any(|cp| is_prefix_pointer(cp, lp)),
    };

    let unused: BTreeSet<String> = leaves
        .into_iter()
        .filter(|lp| lp != "/")
        .filter(|lp| !consumed(lp))
        .collect();
    let report = UnusedKeyReport {
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. First few: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }

    Ok(report)
}

/// "/a/b" is a prefix of "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}
