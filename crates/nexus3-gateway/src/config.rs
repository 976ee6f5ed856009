//! Deep-merged JSON configuration (§6): shipped defaults, then
//! `~/.nexus3/config.json`, then ancestor `.nexus3/config.json` files up to a
//! configured depth, then `<cwd>/.nexus3/config.json`. Later sources win,
//! merged key-by-key rather than replacing whole objects.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

const CONFIG_FILE: &str = ".nexus3/config.json";
const DEFAULT_ANCESTOR_DEPTH: u32 = 2;

fn defaults() -> Value {
    json!({
        "default_model": "claude-sonnet-4-20250514",
        "providers": {},
        "permissions": { "default_preset": "sandboxed" },
        "context": { "ancestor_depth": DEFAULT_ANCESTOR_DEPTH },
        "compaction": {
            "enabled": true,
            "trigger_threshold": 0.9,
            "recent_preserve_ratio": 0.25,
            "summary_budget_ratio": 0.25,
        },
        "server": { "host": "127.0.0.1", "port": 8787 },
        "clipboard": {},
        "ide": {},
    })
}

/// Merges `overlay` into `base` in place: objects merge key-by-key
/// recursively, any other value (including arrays) replaces the base value.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let body = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&body).ok()
}

fn home_config_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(CONFIG_FILE)
}

/// Loads and merges configuration for an agent/server rooted at `cwd`.
pub fn load(cwd: &Path) -> Value {
    let mut config = defaults();

    if let Some(overlay) = read_json(&home_config_path()) {
        deep_merge(&mut config, overlay);
    }

    let ancestor_depth = config["context"]["ancestor_depth"].as_u64().unwrap_or(DEFAULT_ANCESTOR_DEPTH as u64) as u32;

    let ancestors: Vec<PathBuf> = cwd.ancestors().map(Path::to_path_buf).collect();
    let mut chain: Vec<PathBuf> = ancestors.into_iter().take(ancestor_depth as usize + 1).collect();
    chain.reverse();
    // The deepest ancestor (closest to cwd, excluding cwd itself) is applied
    // last among ancestors, then cwd's own config wins over all of them.
    if let Some(cwd_config) = chain.pop() {
        for ancestor in &chain {
            if let Some(overlay) = read_json(&ancestor.join(CONFIG_FILE)) {
                deep_merge(&mut config, overlay);
            }
        }
        if let Some(overlay) = read_json(&cwd_config.join(CONFIG_FILE)) {
            deep_merge(&mut config, overlay);
        }
    }

    config
}

pub fn default_model(config: &Value) -> String {
    config["default_model"].as_str().unwrap_or("claude-sonnet-4-20250514").to_string()
}

pub fn default_preset(config: &Value) -> String {
    config["permissions"]["default_preset"].as_str().unwrap_or("sandboxed").to_string()
}

pub fn ancestor_depth(config: &Value) -> u32 {
    config["context"]["ancestor_depth"].as_u64().unwrap_or(DEFAULT_ANCESTOR_DEPTH as u64).min(10) as u32
}

pub fn server_host(config: &Value) -> String {
    config["server"]["host"].as_str().unwrap_or("127.0.0.1").to_string()
}

pub fn server_port(config: &Value) -> u16 {
    config["server"]["port"].as_u64().unwrap_or(8787) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_preserves_unrelated_sibling_keys() {
        let mut base = json!({ "a": { "x": 1, "y": 2 }, "b": 3 });
        deep_merge(&mut base, json!({ "a": { "x": 10 } }));
        assert_eq!(base["a"]["x"], 10);
        assert_eq!(base["a"]["y"], 2);
        assert_eq!(base["b"], 3);
    }

    #[test]
    fn deep_merge_replaces_arrays_wholesale() {
        let mut base = json!({ "a": [1, 2, 3] });
        deep_merge(&mut base, json!({ "a": [9] }));
        assert_eq!(base["a"], json!([9]));
    }

    #[test]
    fn load_with_no_files_returns_defaults() {
        let dir = std::env::temp_dir().join("nexus3-config-test-no-files");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let config = load(&dir);
        assert_eq!(default_model(&config), "claude-sonnet-4-20250514");
        assert_eq!(default_preset(&config), "sandboxed");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_applies_cwd_config_over_defaults() {
        let dir = std::env::temp_dir().join("nexus3-config-test-cwd");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join(".nexus3")).unwrap();
        std::fs::write(dir.join(".nexus3").join("config.json"), r#"{"default_model": "custom-model"}"#).unwrap();
        let config = load(&dir);
        assert_eq!(default_model(&config), "custom-model");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
