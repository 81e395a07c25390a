//! Read/write helpers over the YAML frontmatter block (§4.3). The public
//! surface never panics on malformed input: getters return `None`/`false`
//! defaults and setters always produce the canonical shape, per §9's
//! "parsing is tolerant; serialization is strict".

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};

/// The configurable key table (§4.3 `PropNames`). Every logical property has
/// a *preferred* key (what's written) and an optional *legacy* key (read as a
/// fallback, never written). Renaming a property in config only changes
/// `preferred`; old vaults keep working via `legacy`.
#[derive(Debug, Clone)]
pub struct PropName {
    pub preferred: &'static str,
    pub legacy: Option<&'static str>,
}

impl PropName {
    const fn new(preferred: &'static str) -> Self {
        Self {
            preferred,
            legacy: None,
        }
    }

    const fn with_legacy(preferred: &'static str, legacy: &'static str) -> Self {
        Self {
            preferred,
            legacy: Some(legacy),
        }
    }
}

/// The default property-name table shipped with the engine. A vault-level
/// config may override any of these (see [`crate::cfg::Config`]); the table
/// here is what tests and the default run exercise.
pub mod keys {
    use super::PropName;

    pub const VAULT_UUID: PropName = PropName::new("vault_uuid");
    pub const CREATED: PropName = PropName::new("created");
    pub const MODIFIED: PropName = PropName::new("modified");
    pub const TAGS: PropName = PropName::new("tags");

    pub const TASK_TITLE: PropName = PropName::with_legacy("task_title", "title");
    pub const TASK_STATUS: PropName = PropName::new("task_status");
    pub const TASK_DONE: PropName = PropName::new("task_done");

    pub const REMOTE_TASK_ID: PropName = PropName::with_legacy("remote_task_id", "todoist_id");
    pub const REMOTE_PROJECT_ID: PropName = PropName::new("remote_project_id");
    pub const REMOTE_SECTION_ID: PropName = PropName::new("remote_section_id");
    pub const PROJECT_NAME: PropName = PropName::new("project_name");
    pub const SECTION_NAME: PropName = PropName::new("section_name");
    pub const PROJECT_LINK: PropName = PropName::new("project_link");
    pub const SECTION_LINK: PropName = PropName::new("section_link");

    pub const PRIORITY: PropName = PropName::new("priority");
    pub const PRIORITY_LABEL: PropName = PropName::new("priority_label");
    pub const DUE_DATE: PropName = PropName::new("due_date");
    pub const DUE_STRING: PropName = PropName::new("due_string");
    pub const IS_RECURRING: PropName = PropName::new("is_recurring");
    pub const RECURRENCE: PropName = PropName::new("recurrence");
    pub const DEADLINE: PropName = PropName::new("deadline");
    pub const DESCRIPTION: PropName = PropName::new("description");
    pub const LABELS: PropName = PropName::new("labels");

    pub const PARENT_TASK_ID: PropName = PropName::new("parent_task_id");
    pub const PARENT_TASK_LINK: PropName = PropName::new("parent_task_link");
    pub const CHILD_TASKS: PropName = PropName::new("child_tasks");
    pub const HAS_CHILDREN: PropName = PropName::new("has_children");
    pub const CHILD_COUNT: PropName = PropName::new("child_count");

    pub const EXTERNAL_URL: PropName = PropName::new("url");

    pub const SYNC_FLAG: PropName = PropName::new("sync_flag");
    pub const SYNC_STATUS: PropName = PropName::new("sync_status");
    pub const PENDING_REMOTE_ID: PropName = PropName::new("pending_remote_id");
    pub const LAST_IMPORTED_FINGERPRINT: PropName = PropName::new("last_imported_fingerprint");
    pub const LAST_SYNCED_FINGERPRINT: PropName = PropName::new("last_synced_fingerprint");
    pub const LAST_IMPORTED_AT: PropName = PropName::new("last_imported_at");
    pub const IS_DELETED: PropName = PropName::new("is_deleted");
    pub const COMPLETE_INSTANCES: PropName = PropName::new("complete_instances");

    pub const COLOR: PropName = PropName::new("color");
    pub const PARENT_PROJECT_ID: PropName = PropName::new("parent_project_id");
    pub const PARENT_PROJECT_NAME: PropName = PropName::new("parent_project_name");
    pub const PARENT_PROJECT_LINK: PropName = PropName::new("parent_project_link");
    pub const IS_ARCHIVED: PropName = PropName::new("is_archived");
}

/// A parsed frontmatter block: a key-value bag plus the note body (§6
/// "the engine reads/writes only the frontmatter; the body is opaque").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub map: Mapping,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self {
            map: Mapping::new(),
        }
    }

    /// Parses a full file's text into (frontmatter, body). Returns `None`
    /// frontmatter if the file doesn't start with a `---` block (§6).
    pub fn parse(text: &str) -> (Option<Self>, String) {
        let Some(rest) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n"))
        else {
            return (None, text.to_string());
        };
        let Some(end) = find_closing_delimiter(rest) else {
            return (None, text.to_string());
        };
        let (yaml, body) = rest.split_at(end);
        let body = body
            .strip_prefix("---\n")
            .or_else(|| body.strip_prefix("---\r\n"))
            .unwrap_or(body)
            .to_string();
        let map = serde_yaml::from_str::<Mapping>(yaml)
            .or_else(|_| serde_yaml::from_str::<Mapping>(&blank_unparseable_signature_lines(yaml)))
            .unwrap_or_default();
        (Some(Self { map }), body)
    }

    /// Renders (frontmatter, body) back into full file text, always in the
    /// canonical `---\n<yaml>---\n<body>` shape.
    pub fn render(&self, body: &str) -> String {
        let yaml = serde_yaml::to_string(&self.map).unwrap_or_default();
        format!("---\n{yaml}---\n{body}")
    }

    fn get_raw(&self, key: &PropName) -> Option<&Value> {
        self.map
            .get(Value::String(key.preferred.to_string()))
            .or_else(|| {
                key.legacy
                    .and_then(|legacy| self.map.get(Value::String(legacy.to_string())))
            })
    }

    /// Typed string getter with legacy-key fallback and trimming (§4.3).
    pub fn get_string(&self, key: &PropName) -> Option<String> {
        match self.get_raw(key)? {
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Typed bool getter: accepts `true|false|"true"|"false"` (§4.3).
    pub fn get_bool(&self, key: &PropName) -> bool {
        match self.get_raw(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Typed list getter, normalized to a canonical `Vec<String>` (§4.3).
    pub fn get_list(&self, key: &PropName) -> Vec<String> {
        match self.get_raw(key) {
            Some(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    /// Writes `value` under `key.preferred` and deletes `key.legacy` if
    /// present and different from the preferred key (§4.3).
    pub fn set_string(&mut self, key: &PropName, value: &str) {
        self.map.insert(
            Value::String(key.preferred.to_string()),
            Value::String(value.trim().to_string()),
        );
        self.strip_legacy(key);
    }

    pub fn set_bool(&mut self, key: &PropName, value: bool) {
        self.map
            .insert(Value::String(key.preferred.to_string()), Value::Bool(value));
        self.strip_legacy(key);
    }

    pub fn set_list<I: IntoIterator<Item = S>, S: ToString>(&mut self, key: &PropName, values: I) {
        let seq = values
            .into_iter()
            .map(|v| Value::String(v.to_string()))
            .collect();
        self.map.insert(
            Value::String(key.preferred.to_string()),
            Value::Sequence(seq),
        );
        self.strip_legacy(key);
    }

    /// Clears a key entirely (used e.g. to drop `remote_task_id` under the
    /// `stop-syncing` missing-remote policy, §4.5.7).
    pub fn remove(&mut self, key: &PropName) {
        self.map.remove(Value::String(key.preferred.to_string()));
        self.strip_legacy(key);
    }

    fn strip_legacy(&mut self, key: &PropName) {
        if let Some(legacy) = key.legacy {
            if legacy != key.preferred {
                self.map.remove(Value::String(legacy.to_string()));
            }
        }
    }

    pub fn has_any(&self, keys: &[&PropName]) -> bool {
        keys.iter().any(|k| self.get_string(k).is_some())
    }
}

fn find_closing_delimiter(rest: &str) -> Option<usize> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Strict pattern a signature line's value must match: a bare/quoted 8-hex
/// string, or an explicit empty string (§4.3).
static SIGNATURE_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:"[0-9a-f]{8}"|'[0-9a-f]{8}'|[0-9a-f]{8}|""|'')$"#).unwrap());

/// Matches a raw `last_imported_fingerprint`/`last_synced_fingerprint` line,
/// capturing its value so it can be blanked out before the surrounding YAML
/// is even given a chance to parse.
static SIGNATURE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^(last_imported_fingerprint|last_synced_fingerprint):[ \t]*(.*)$"#).unwrap());

/// Last-resort repair attempted only when the whole document failed to
/// parse as YAML (§4.3: a corrupted signature value — e.g. an unescaped
/// quote — can break parsing of the entire block, not just that one key).
/// Blanks any signature line whose value doesn't match [`SIGNATURE_VALUE`]
/// and retries; this doesn't recover from corruption elsewhere in the file,
/// only from the specific class this module is responsible for.
fn blank_unparseable_signature_lines(yaml: &str) -> String {
    SIGNATURE_LINE
        .replace_all(yaml, |caps: &regex::Captures| {
            let key = &caps[1];
            let value = caps[2].trim();
            if value.is_empty() || SIGNATURE_VALUE.is_match(value) {
                caps[0].to_string()
            } else {
                format!("{key}: \"\"")
            }
        })
        .into_owned()
}

/// Validates and repairs the two signature lines (§4.3). Any value failing
/// [`SIGNATURE_VALUE`] is replaced with an empty string, leaving the rest of
/// the frontmatter untouched.
pub fn repair_signature_lines(fm: &mut Frontmatter) -> bool {
    let mut repaired = false;
    for key in [&keys::LAST_IMPORTED_FINGERPRINT, &keys::LAST_SYNCED_FINGERPRINT] {
        let name = Value::String(key.preferred.to_string());
        let valid = match fm.map.get(&name) {
            None => true,
            Some(Value::String(s)) => SIGNATURE_VALUE.is_match(&format!("\"{s}\"")) || s.is_empty(),
            Some(Value::Null) => true,
            _ => false,
        };
        if !valid {
            fm.map.insert(name, Value::String(String::new()));
            repaired = true;
        }
    }
    repaired
}
