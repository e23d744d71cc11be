//! JSON block-tree parser.
//!
//! Accepts the editor's serialization: either a workspace
//! `{"blocks": {"blocks": [..]}}` holding exactly one top-level block, or a
//! bare block object. A block object looks like:
//!
//! ```json
//! {
//!   "type": "variables_set",
//!   "id": "a1",
//!   "fields": { "VAR": "total" },
//!   "inputs": { "VALUE": { "block": { "type": "math_number", "fields": { "NUM": 1 } } } },
//!   "extraState": { "itemCount": 2 },
//!   "mutations": [ { "domain": "config", "name": "mode", "value": "fast" } ],
//!   "next": { "block": { "type": "..." } }
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::block::{Block, Mutation, DEFAULT_MUTATION_DOMAIN};
use crate::error::ParseError;
use crate::registry::BlockRegistry;

/// Deepest bracket nesting accepted in script text.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// Parse a script from a string into a block tree.
pub fn parse_script(input: &str, registry: &BlockRegistry) -> Result<Block, ParseError> {
    let depth = nesting_depth(input);
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::Malformed {
            path: "$".to_string(),
            message: format!(
                "nesting depth {} exceeds the limit of {}",
                depth, MAX_NESTING_DEPTH
            ),
        });
    }

    let mut deserializer = serde_json::Deserializer::from_str(input);
    deserializer.disable_recursion_limit();
    let document = JsonValue::deserialize(&mut deserializer)?;
    deserializer.end()?;

    let (root, path) = root_node(&document)?;
    build_block(root, registry, &path)
}

/// Maximum depth of `{`/`[` nesting outside string literals.
fn nesting_depth(input: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for byte in input.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                max = max.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

fn root_node(document: &JsonValue) -> Result<(&JsonValue, String), ParseError> {
    let Some(object) = document.as_object() else {
        return Err(malformed("$", "expected a block or workspace object"));
    };
    if object.contains_key("type") {
        return Ok((document, "$".to_string()));
    }
    let Some(blocks) = object.get("blocks") else {
        return Err(malformed("$", "expected a 'type' or 'blocks' key"));
    };
    let (top_level, path) = match blocks {
        JsonValue::Array(items) => (items, "$.blocks"),
        JsonValue::Object(workspace) => match workspace.get("blocks") {
            Some(JsonValue::Array(items)) => (items, "$.blocks.blocks"),
            Some(_) => return Err(malformed("$.blocks.blocks", "expected an array")),
            None => return Err(ParseError::NoRoot),
        },
        _ => return Err(malformed("$.blocks", "expected an array or object")),
    };
    match top_level.as_slice() {
        [] => Err(ParseError::NoRoot),
        [root] => Ok((root, format!("{}[0]", path))),
        many => Err(ParseError::MultipleRoots { count: many.len() }),
    }
}

fn build_block(node: &JsonValue, registry: &BlockRegistry, path: &str) -> Result<Block, ParseError> {
    let Some(object) = node.as_object() else {
        return Err(malformed(path, "expected a block object"));
    };

    let kind = match object.get("type") {
        Some(JsonValue::String(kind)) => kind.clone(),
        Some(_) => return Err(malformed(path, "'type' must be a string")),
        None => return Err(malformed(path, "missing 'type'")),
    };
    let behavior = registry
        .instantiate(&kind)
        .ok_or_else(|| ParseError::UnknownKind {
            kind: kind.clone(),
            path: path.to_string(),
        })?;

    let id = match object.get("id") {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(id)) => Some(id.clone()),
        Some(_) => return Err(malformed(path, "'id' must be a string")),
    };

    let fields = match object.get("fields") {
        None | Some(JsonValue::Null) => HashMap::new(),
        Some(JsonValue::Object(fields)) => fields
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        Some(_) => return Err(malformed(path, "'fields' must be an object")),
    };

    let mut values = HashMap::new();
    for key in ["inputs", "values"] {
        match object.get(key) {
            None | Some(JsonValue::Null) => {}
            Some(JsonValue::Object(inputs)) => {
                for (slot, input) in inputs {
                    let input_path = format!("{}.{}.{}", path, key, slot);
                    if let Some(child) = connected_block(input, &input_path)? {
                        let child = build_block(child, registry, &input_path)?;
                        values.insert(slot.clone(), child);
                    }
                }
            }
            Some(_) => return Err(malformed(path, &format!("'{}' must be an object", key))),
        }
    }

    let mut mutations = Vec::new();
    match object.get("mutations") {
        None | Some(JsonValue::Null) => {}
        Some(JsonValue::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{}.mutations[{}]", path, index);
                mutations.push(parse_mutation(item, &item_path)?);
            }
        }
        Some(_) => return Err(malformed(path, "'mutations' must be an array")),
    }
    match object.get("extraState") {
        None | Some(JsonValue::Null) => {}
        Some(JsonValue::Object(state)) => {
            mutations.extend(state.iter().map(|(name, value)| Mutation::new(name, value.clone())));
        }
        Some(other) => mutations.push(Mutation::new("extraState", other.clone())),
    }

    let next = match object.get("next") {
        None | Some(JsonValue::Null) => None,
        Some(next) => {
            let next_path = format!("{}.next", path);
            match connected_block(next, &next_path)? {
                Some(node) => Some(Box::new(build_block(node, registry, &next_path)?)),
                None => None,
            }
        }
    };

    Ok(Block {
        kind,
        id,
        fields,
        values,
        mutations,
        next,
        behavior,
    })
}

/// The block plugged into a connection, preferring a real block over a shadow.
fn connected_block<'a>(
    connection: &'a JsonValue,
    path: &str,
) -> Result<Option<&'a JsonValue>, ParseError> {
    let Some(connection) = connection.as_object() else {
        return Err(malformed(path, "expected a connection object"));
    };
    Ok(non_null(connection, "block").or_else(|| non_null(connection, "shadow")))
}

fn non_null<'a>(object: &'a Map<String, JsonValue>, key: &str) -> Option<&'a JsonValue> {
    object.get(key).filter(|value| !value.is_null())
}

fn parse_mutation(item: &JsonValue, path: &str) -> Result<Mutation, ParseError> {
    let Some(object) = item.as_object() else {
        return Err(malformed(path, "expected a mutation object"));
    };
    let domain = match object.get("domain") {
        None | Some(JsonValue::Null) => DEFAULT_MUTATION_DOMAIN.to_string(),
        Some(JsonValue::String(domain)) => domain.clone(),
        Some(_) => return Err(malformed(path, "'domain' must be a string")),
    };
    let name = match object.get("name") {
        Some(JsonValue::String(name)) => name.clone(),
        _ => return Err(malformed(path, "missing string 'name'")),
    };
    let value = object.get("value").cloned().unwrap_or(JsonValue::Null);
    Ok(Mutation {
        domain,
        name,
        value,
    })
}

fn malformed(path: &str, message: &str) -> ParseError {
    ParseError::Malformed {
        path: path.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: JsonValue) -> Result<Block, ParseError> {
        parse_script(&json.to_string(), &BlockRegistry::standard())
    }

    #[test]
    fn test_parse_workspace_document() {
        let block = parse(json!({
            "blocks": {
                "languageVersion": 0,
                "blocks": [
                    { "type": "text", "id": "t1", "fields": { "TEXT": "hi" } }
                ]
            }
        }))
        .unwrap();
        assert_eq!(block.kind(), "text");
        assert_eq!(block.id(), Some("t1"));
        assert_eq!(block.field_str("TEXT").unwrap(), "hi");
    }

    #[test]
    fn test_parse_inputs_next_and_mutations() {
        let block = parse(json!({
            "type": "variables_set",
            "fields": { "VAR": "x" },
            "inputs": {
                "VALUE": {
                    "shadow": { "type": "math_number", "fields": { "NUM": 0 } },
                    "block": { "type": "math_number", "fields": { "NUM": 5 } }
                }
            },
            "extraState": { "itemCount": 3 },
            "mutations": [ { "domain": "ui", "name": "colour", "value": "red" } ],
            "next": { "block": { "type": "variables_get", "fields": { "VAR": "x" } } }
        }))
        .unwrap();

        let value = block.input("VALUE").unwrap();
        assert_eq!(value.field_f64("NUM").unwrap(), 5.0);
        assert_eq!(block.mutation(Some("ui"), "colour"), Some(&json!("red")));
        assert_eq!(block.mutation(None, "colour"), None);
        assert_eq!(block.mutation_count("itemCount"), 3);
        assert_eq!(block.next().unwrap().kind(), "variables_get");
        assert_eq!(block.chain_len(), 2);
    }

    #[test]
    fn test_shadow_used_when_no_block() {
        let block = parse(json!({
            "type": "logic_negate",
            "inputs": { "BOOL": { "shadow": { "type": "logic_boolean", "fields": { "BOOL": "TRUE" } } } }
        }))
        .unwrap();
        assert!(block.has_input("BOOL"));
    }

    #[test]
    fn test_unknown_kind_reports_path() {
        let err = parse(json!({
            "type": "controls_scope",
            "inputs": { "DO": { "block": { "type": "teleport" } } }
        }))
        .unwrap_err();
        match err {
            ParseError::UnknownKind { kind, path } => {
                assert_eq!(kind, "teleport");
                assert_eq!(path, "$.inputs.DO");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_kind_in_next_chain() {
        let err = parse(json!({
            "type": "text", "fields": { "TEXT": "a" },
            "next": { "block": { "type": "text", "fields": { "TEXT": "b" },
                "next": { "block": { "type": "nope" } } } }
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownKind { ref path, .. } if path == "$.next.next"));
    }

    #[test]
    fn test_malformed_nodes() {
        assert!(matches!(parse(json!({ "type": 3 })), Err(ParseError::Malformed { .. })));
        assert!(matches!(
            parse(json!({ "type": "text", "fields": [] })),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(
            parse(json!({ "type": "text", "mutations": [ { "value": 1 } ] })),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(parse(json!([])), Err(ParseError::Malformed { .. })));
    }

    #[test]
    fn test_root_count() {
        assert!(matches!(
            parse(json!({ "blocks": { "blocks": [] } })),
            Err(ParseError::NoRoot)
        ));
        assert!(matches!(
            parse(json!({ "blocks": { "blocks": [ { "type": "logic_null" }, { "type": "logic_null" } ] } })),
            Err(ParseError::MultipleRoots { count: 2 })
        ));
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_script("{ \"type\": ", &BlockRegistry::standard()).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_nesting_depth_ignores_strings() {
        assert_eq!(nesting_depth(r#"{"a": "{{[[", "b": [1, {"c": 2}]}"#), 3);
        assert_eq!(nesting_depth(r#"{"a": "\"{"}"#), 1);
    }

    #[test]
    fn test_excessive_nesting_rejected() {
        let text = "[".repeat(MAX_NESTING_DEPTH + 1);
        assert!(matches!(
            parse_script(&text, &BlockRegistry::standard()),
            Err(ParseError::Malformed { .. })
        ));
    }
}
