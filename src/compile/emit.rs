//! JSON Schema emission for one type expression.
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::{Map, Value, json};

use super::{CompileError, CompileOptions, Compiled, ResolvedStruct, Visitor};
use crate::ir::INVENTORY_INDEX;

/// Schemas of the documented builtin types.
static BUILTINS: Lazy<IndexMap<&'static str, Value>> = Lazy::new(|| {
    IndexMap::from([
        ("string", json!({"type": "string"})),
        ("float", json!({"type": "number"})),
        ("double", json!({"type": "number"})),
        ("bool", json!({"type": "boolean"})),
        ("uint8", integer(u8::MIN, u8::MAX)),
        ("uint16", integer(u16::MIN, u16::MAX)),
        ("uint32", integer(u32::MIN, u32::MAX)),
        ("uint64", integer(u64::MIN, u64::MAX)),
        ("int8", integer(i8::MIN, i8::MAX)),
        ("int16", integer(i16::MIN, i16::MAX)),
        ("int32", integer(i32::MIN, i32::MAX)),
        ("int64", integer(i64::MIN, i64::MAX)),
    ])
});

fn integer<T: Into<Value>>(minimum: T, maximum: T) -> Value {
    let (minimum, maximum): (Value, Value) = (minimum.into(), maximum.into());
    json!({"type": "integer", "minimum": minimum, "maximum": maximum})
}

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.keys().copied()
}

pub struct JsonEmitter<'o> {
    options: &'o CompileOptions,
}

impl<'o> JsonEmitter<'o> {
    pub fn new(options: &'o CompileOptions) -> Self {
        Self { options }
    }
}

impl Visitor for JsonEmitter<'_> {
    type Output = Value;

    fn builtin(&mut self, name: &str) -> Compiled<Value> {
        match BUILTINS.get(name) {
            Some(schema) => Ok(schema.clone()),
            None if name == INVENTORY_INDEX => Ok(json!({"type": "integer"})),
            None => Err(CompileError::UnknownBuiltin(name.to_string())),
        }
    }

    fn literal_bool(&mut self, value: bool) -> Value {
        json!({"const": value, "type": "boolean"})
    }

    fn literal_string(&mut self, value: &str) -> Value {
        json!({"const": value, "type": "string"})
    }

    fn literal_integer(&mut self, value: i64) -> Value {
        json!({"const": value, "type": "integer"})
    }

    fn reference(&mut self, name: &str) -> Value {
        json!({"$ref": self.options.reference(true, name)})
    }

    fn union(&mut self, members: Vec<Value>) -> Value {
        json!({"anyOf": members})
    }

    fn array(&mut self, content: Value, empty_as_object: bool) -> Value {
        let array = json!({"type": "array", "items": content});
        if empty_as_object {
            json!({"oneOf": [array, {"type": "object", "additionalProperties": false}]})
        } else {
            array
        }
    }

    fn dictionary(&mut self, keys: Value, values: Value) -> Value {
        json!({"type": "object", "additionalProperties": values, "propertyNames": keys})
    }

    fn tuple(&mut self, members: Vec<Value>) -> Value {
        let len = members.len();
        json!({"type": "array", "items": members, "minItems": len, "maxItems": len})
    }

    fn structure(&mut self, resolved: ResolvedStruct<Value>) -> Value {
        let required: Vec<Value> = resolved.required().into_iter().map(Value::from).collect();

        let mut out = Map::new();
        out.insert("type".into(), Value::from("object"));
        let properties: Map<String, Value> = resolved
            .properties
            .into_iter()
            .map(|(name, p)| (name, p.schema))
            .collect();
        out.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            out.insert("required".into(), Value::Array(required));
        }
        match resolved.custom_properties {
            Some(custom) => {
                out.insert("additionalProperties".into(), custom);
            }
            None if self.options.strict_properties => {
                out.insert("additionalProperties".into(), Value::Bool(false));
            }
            None => {}
        }
        Value::Object(out)
    }

    fn unconstrained(&mut self) -> Value {
        json!({})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{DocIndex, ForbiddenSet, Walker};
    use crate::ir::{Doc, Property, StructType, TypeExpression};
    use pretty_assertions::assert_eq;

    fn emit_with(options: &CompileOptions, expr: &TypeExpression) -> Compiled<Value> {
        let doc = Doc::default();
        let index = DocIndex::new(&doc).unwrap();
        let forbidden = ForbiddenSet::default();
        Walker::new(&index, &forbidden).walk(&mut JsonEmitter::new(options), expr)
    }

    fn emit(expr: &TypeExpression) -> Value {
        emit_with(&CompileOptions::default(), expr).unwrap()
    }

    #[test]
    fn integer_builtins_carry_exact_ranges() {
        assert_eq!(emit(&TypeExpression::builtin("int8")), json!({"type": "integer", "minimum": -128, "maximum": 127}));
        assert_eq!(
            serde_json::to_string(&emit(&TypeExpression::builtin("uint64"))).unwrap(),
            r#"{"type":"integer","minimum":0,"maximum":18446744073709551615}"#
        );
        assert_eq!(
            serde_json::to_string(&emit(&TypeExpression::builtin("int64"))).unwrap(),
            r#"{"type":"integer","minimum":-9223372036854775808,"maximum":9223372036854775807}"#
        );
        assert_eq!(builtin_names().count(), 12);
    }

    #[test]
    fn inventory_index_is_any_integer() {
        assert_eq!(emit(&TypeExpression::builtin(INVENTORY_INDEX)), json!({"type": "integer"}));
        assert!(builtin_names().all(|name| name != INVENTORY_INDEX));
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        assert_eq!(
            emit_with(&CompileOptions::default(), &TypeExpression::builtin("quad")),
            Err(CompileError::UnknownBuiltin("quad".into()))
        );
    }

    #[test]
    fn literals_pin_value_and_type() {
        assert_eq!(emit(&TypeExpression::literal_string("item")), json!({"const": "item", "type": "string"}));
        assert_eq!(emit(&TypeExpression::LiteralBool { value: true }), json!({"const": true, "type": "boolean"}));
        assert_eq!(emit(&TypeExpression::LiteralInteger { value: 7 }), json!({"const": 7, "type": "integer"}));
    }

    #[test]
    fn array_of_strings_accepts_empty_object() {
        assert_eq!(
            serde_json::to_string(&emit(&TypeExpression::array(TypeExpression::builtin("string")))).unwrap(),
            r#"{"oneOf":[{"type":"array","items":{"type":"string"}},{"type":"object","additionalProperties":false}]}"#
        );
        let plain = TypeExpression::Array { content: Box::new(TypeExpression::builtin("bool")), empty_as_object: false };
        assert_eq!(emit(&plain), json!({"type": "array", "items": {"type": "boolean"}}));
    }

    #[test]
    fn dictionary_and_tuple_shapes() {
        let dict = TypeExpression::dictionary(TypeExpression::builtin("string"), TypeExpression::builtin("double"));
        assert_eq!(emit(&dict), json!({
            "type": "object",
            "additionalProperties": {"type": "number"},
            "propertyNames": {"type": "string"}
        }));

        let tuple = TypeExpression::Tuple { members: vec![TypeExpression::builtin("float"), TypeExpression::builtin("float")] };
        assert_eq!(emit(&tuple), json!({
            "type": "array",
            "items": [{"type": "number"}, {"type": "number"}],
            "minItems": 2,
            "maxItems": 2
        }));
    }

    #[test]
    fn union_and_placeholder() {
        let u = TypeExpression::union([TypeExpression::literal_string("a"), TypeExpression::Unconstrained]);
        assert_eq!(emit(&u), json!({"anyOf": [{"const": "a", "type": "string"}, {}]}));
    }

    #[test]
    fn strict_structs_close_additional_properties() {
        let options = CompileOptions { strict_properties: true, ..CompileOptions::default() };
        let expr = TypeExpression::Struct(StructType::new(None, vec![
            Property::new("x", TypeExpression::builtin("bool"), false),
        ]));
        assert_eq!(emit_with(&options, &expr).unwrap(), json!({
            "type": "object",
            "properties": {"x": {"type": "boolean"}},
            "additionalProperties": false
        }));
    }
}
