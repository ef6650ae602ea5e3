//! Recovering plugin calls from LLM output
//!
//! The model is instructed to emit exactly one call in the form
//!
//! ```text
//! <API>Namespace.operationId({"parameter": "value"})</API>
//! ```
//!
//! No other delimiter convention is recognised.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Opening call delimiter
pub const CALL_OPEN: &str = "<API>";
/// Closing call delimiter
pub const CALL_CLOSE: &str = "</API>";

static CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<API>(.*?)</API>").expect("call pattern is a valid regex")
});

/// A call extracted from LLM output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedCall {
    /// Plugin namespace (`name_for_model`)
    pub plugin_name: String,
    /// Operation id
    pub operation_id: String,
    /// Parameters by name
    pub parameters: Map<String, Value>,
}

impl ParsedCall {
    /// Canonical `<API>...</API>` form of this call
    #[must_use]
    pub fn to_delimited(&self) -> String {
        let params = Value::Object(self.parameters.clone());
        format!(
            "{CALL_OPEN}{}.{}({params}){CALL_CLOSE}",
            self.plugin_name, self.operation_id
        )
    }
}

impl fmt::Display for ParsedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_delimited())
    }
}

/// Extract the first call from `text`
///
/// Returns `Ok(None)` when the text contains no `<API>` marker at all.
///
/// # Errors
///
/// Returns `Error::MalformedCall` when a marker is present but the call
/// cannot be read: unclosed delimiter, no `Namespace.operation`
/// separator, no parenthesised parameter block, or parameters that are
/// not a JSON object.
pub fn parse_call(text: &str) -> Result<Option<ParsedCall>> {
    if !text.contains(CALL_OPEN) {
        return Ok(None);
    }

    let inner = CALL_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .ok_or_else(|| Error::MalformedCall(format!("{CALL_OPEN} without closing {CALL_CLOSE}")))?;

    let (plugin_name, rest) = inner
        .split_once('.')
        .ok_or_else(|| Error::MalformedCall(format!("expected Namespace.operationId in '{inner}'")))?;
    let plugin_name = plugin_name.trim();

    let open = rest
        .find('(')
        .ok_or_else(|| Error::MalformedCall(format!("missing parameter block in '{inner}'")))?;
    if !rest.ends_with(')') {
        return Err(Error::MalformedCall(format!(
            "parameter block is not closed in '{inner}'"
        )));
    }
    let operation_id = rest[..open].trim();
    let body = rest[open + 1..rest.len() - 1].trim();

    if plugin_name.is_empty() || operation_id.is_empty() {
        return Err(Error::MalformedCall(format!(
            "empty namespace or operation id in '{inner}'"
        )));
    }

    let parameters = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(Error::MalformedCall(format!(
                    "parameters must be a JSON object, got {other}"
                )));
            }
            Err(e) => {
                return Err(Error::MalformedCall(format!("invalid parameter JSON: {e}")));
            }
        }
    };

    Ok(Some(ParsedCall {
        plugin_name: plugin_name.to_string(),
        operation_id: operation_id.to_string(),
        parameters,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_call() {
        let text = r#"Let me look that up.
<API>KlarnaProducts.productsUsingGET({"q": "t-shirt", "size": 3})</API>"#;
        let call = parse_call(text).unwrap().unwrap();
        assert_eq!(call.plugin_name, "KlarnaProducts");
        assert_eq!(call.operation_id, "productsUsingGET");
        assert_eq!(Value::Object(call.parameters), json!({"q": "t-shirt", "size": 3}));
    }

    #[test]
    fn test_no_call_present() {
        assert_eq!(parse_call("Paris is the capital of France.").unwrap(), None);
        assert_eq!(parse_call("").unwrap(), None);
    }

    #[test]
    fn test_roundtrip() {
        let mut parameters = Map::new();
        parameters.insert("username".to_string(), json!("ada"));
        parameters.insert("limit".to_string(), json!(5));
        parameters.insert("done".to_string(), json!(false));
        let call = ParsedCall {
            plugin_name: "todo".to_string(),
            operation_id: "getTodos".to_string(),
            parameters,
        };
        let text = format!("sure thing {call} done");
        assert_eq!(parse_call(&text).unwrap(), Some(call));
    }

    #[test]
    fn test_multiline_and_whitespace() {
        let text = "<API>\n  todo.addTodo({\n  \"todo\": \"buy milk\"\n})\n</API>";
        let call = parse_call(text).unwrap().unwrap();
        assert_eq!(call.operation_id, "addTodo");
        assert_eq!(call.parameters["todo"], "buy milk");
    }

    #[test]
    fn test_empty_parameters() {
        let call = parse_call("<API>todo.listAll()</API>").unwrap().unwrap();
        assert!(call.parameters.is_empty());
    }

    #[test]
    fn test_first_call_wins() {
        let text = "<API>a.one({})</API> and <API>b.two({})</API>";
        let call = parse_call(text).unwrap().unwrap();
        assert_eq!(call.plugin_name, "a");
        assert_eq!(call.operation_id, "one");
    }

    #[test]
    fn test_malformed_calls() {
        let cases = [
            "<API>todo.addTodo({\"todo\": \"x\"})",
            "<API>addTodo({})</API>",
            "<API>todo.addTodo</API>",
            "<API>todo.addTodo({\"todo\": </API>",
            "<API>todo.addTodo([1, 2])</API>",
            "<API>.addTodo({})</API>",
            "<API>todo.({})</API>",
            "<API>todo.addTodo({}</API>",
        ];
        for text in cases {
            let err = parse_call(text).unwrap_err();
            assert!(matches!(err, Error::MalformedCall(_)), "{text}: {err}");
        }
    }
}
