//! ---
//! gantry_section: "02-configuration"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Path-or-inline JSON source reading."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

/// Read an option source that is either a path to a JSON file or an inline
/// JSON object.
///
/// Path resolution is attempted first; when the file cannot be read or does
/// not contain a JSON object, the string itself is parsed as JSON. A source
/// that fails both attempts is reported with a warning and treated as absent.
pub fn read_json_file_or_string(option_name: &str, source: Option<&str>) -> Option<Value> {
    let raw = source?;
    if let Ok(bytes) = fs::read(Path::new(raw)) {
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if value.is_object() {
            return Some(value);
        }
    }
    warn!(
        option = option_name,
        "option does not point to a valid JSON file and is not a valid JSON object; ignoring it"
    );
    None
}
