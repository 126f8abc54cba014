#![allow(dead_code)]

use el_analyzer::Schema;

/// Schema shared by the integration tests: one object type, a handful of
/// globals and functions covering every arity shape.
pub const SCHEMA_JSON: &str = r#"{
  "types": {
    "custom44": {
      "identifiers": [
        {"name": "property11", "type": ["any"], "info": "First property"},
        {"name": "property22", "type": ["any"]}
      ],
      "functions": [
        {"name": "firstMethod", "args": [], "returnType": ["custom44"], "info": "Returns itself"}
      ]
    }
  },
  "identifiers": [
    {"name": "foobar"},
    {"name": "foobaz"},
    {"name": "obj", "type": ["custom44"], "info": "The object"},
    {"name": "arr", "type": ["string[]"]},
    {"name": "arr2", "type": ["string[][]"]}
  ],
  "functions": [
    {"name": "smh", "args": [], "returnType": ["string"], "info": "Shakes head"},
    {"name": "any_fn", "args": [
      {"name": "anything", "type": ["any"]},
      {"name": "optional", "optional": true}
    ], "returnType": ["any"]},
    {"name": "smash_my_head", "args": [{"name": "object", "type": ["object"]}]},
    {"name": "getObject", "returnType": ["custom44"]}
  ]
}"#;

pub fn schema() -> Schema {
    Schema::from_json_str(SCHEMA_JSON).expect("test schema should load")
}

pub const CURSOR: &str = "‸";

/// Removes the `‸` marker from `doc`, returning the text and the marker's
/// byte offset.
pub fn split_cursor(doc: &str) -> (String, usize) {
    let position = doc.find(CURSOR).expect("document should contain a cursor");
    let mut text = String::with_capacity(doc.len());
    text.push_str(&doc[..position]);
    text.push_str(&doc[position + CURSOR.len()..]);
    (text, position)
}
