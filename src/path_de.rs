use serde::de::DeserializeOwned;

/// Decoding failure located by JSON path, e.g. `types[3].definition.kind`.
#[derive(Debug, thiserror::Error)]
#[error("at JSON path {path} → {message}")]
pub struct JsonPathError {
    pub path: String,
    pub message: String,
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, JsonPathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| JsonPathError {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Doc;

    #[test]
    fn reports_where_a_doc_is_malformed() {
        let src = r#"{"types": [
            {"name": "A", "definition": {"kind": "builtin", "name": "string"}},
            {"name": "B", "definition": {"kind": "bogus"}}
        ]}"#;
        let err = from_str_with_path::<Doc>(src).unwrap_err();
        assert_eq!(err.path, "types[1].definition.kind");
        assert!(err.message.contains("bogus"), "{}", err.message);
    }

    #[test]
    fn decodes_well_formed_input() {
        let doc: Doc = from_str_with_path(r#"{"prototypes": [{"name": "P", "key": "p"}]}"#).unwrap();
        assert_eq!(doc.prototypes[0].key.as_deref(), Some("p"));
    }
}
