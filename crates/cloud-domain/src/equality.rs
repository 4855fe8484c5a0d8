// equality.rs
use serde_json::Value;

/// Igualdad estructural de los campos que controla el cliente.
///
/// Cada entidad la implementa campo a campo y excluye los campos que asigna
/// el servidor (versión y marcas de tiempo). Una actualización cuyo payload
/// es `spec_eq` al valor guardado es un no-op.
pub trait SpecEq {
  fn spec_eq(&self, other: &Self) -> bool;
}

/// Compara dos valores JSON tratando `null`, `{}` y `[]` como equivalentes,
/// también en profundidad.
pub fn json_eq(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Object(x), Value::Object(y)) => json_map_eq(x, y),
    (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_eq(l, r)),
    _ if is_blank(a) && is_blank(b) => true,
    _ => a == b,
  }
}

/// Igual que [`json_eq`] para mapas: una clave ausente equivale a una clave
/// con valor vacío.
pub fn json_map_eq(a: &serde_json::Map<String, Value>, b: &serde_json::Map<String, Value>) -> bool {
  let blank = Value::Null;
  a.iter().all(|(k, v)| json_eq(v, b.get(k).unwrap_or(&blank)))
  && b.iter().all(|(k, v)| a.contains_key(k) || is_blank(v))
}

fn is_blank(v: &Value) -> bool {
  match v {
    Value::Null => true,
    Value::Object(m) => m.is_empty(),
    Value::Array(a) => a.is_empty(),
    _ => false,
  }
}
