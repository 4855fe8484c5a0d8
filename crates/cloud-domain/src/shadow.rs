// shadow.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const APPLICATIONS_KEY: &str = "applications";
pub const SYSTEM_APPLICATIONS_KEY: &str = "systemApplications";
/// Clave del reporte que el nodo rellena con la hora (RFC3339) del envío.
pub const REPORT_TIME_KEY: &str = "time";

/// Estado reportado por el nodo.
pub type Report = Map<String, Value>;
/// Estado deseado por el plano de control.
pub type Desire = Map<String, Value>;
/// Metadatos por campo de `Report` / `Desire`.
pub type Meta = Map<String, Value>;

/// Documento vacío: `{"applications": [], "systemApplications": []}`.
pub fn empty_apps_document() -> Map<String, Value> {
  let mut doc = Map::new();
  ensure_apps_skeleton(&mut doc);
  doc
}

/// Garantiza que las dos listas de aplicaciones existen y nunca son `null`.
pub fn ensure_apps_skeleton(doc: &mut Map<String, Value>) {
  for key in [APPLICATIONS_KEY, SYSTEM_APPLICATIONS_KEY] {
    let entry = doc.entry(key).or_insert(Value::Null);
    if entry.is_null() {
      *entry = Value::Array(Vec::new());
    }
  }
}

/// Sombra de un nodo: lo que reportó (`report`) frente a lo que la nube
/// desea (`desire`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shadow {
  pub namespace: String,
  pub name: String,
  pub report: Report,
  pub desire: Desire,
  #[serde(default)]
  pub report_meta: Meta,
  #[serde(default)]
  pub desire_meta: Meta,
  #[serde(default)]
  pub desire_version: String,
  #[serde(rename = "createTime")]
  pub creation_timestamp: DateTime<Utc>,
  #[serde(rename = "updateTime")]
  pub update_timestamp: DateTime<Utc>,
  /// Hora derivada de `report.time`; `None` si falta o no es válida.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub time: Option<DateTime<Utc>>,
  /// Texto exacto del reporte tal como quedó persistido.
  #[serde(skip)]
  pub report_str: String,
}

/// Fila tal como la guarda el almacén: documentos serializados y marcas de
/// tiempo en milisegundos Unix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredShadow {
  pub namespace: String,
  pub name: String,
  pub report: String,
  pub desire: String,
  pub report_meta: String,
  pub desire_meta: String,
  pub desire_version: String,
  pub create_time: i64,
  pub update_time: i64,
}

impl Shadow {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    let now = Utc::now();
    Self { namespace: namespace.into(),
           name: name.into(),
           report: empty_apps_document(),
           desire: empty_apps_document(),
           report_meta: Meta::new(),
           desire_meta: Meta::new(),
           desire_version: String::new(),
           creation_timestamp: now,
           update_timestamp: now,
           time: None,
           report_str: String::new() }
  }

  pub fn with_report(mut self, mut report: Report) -> Self {
    ensure_apps_skeleton(&mut report);
    self.report = report;
    self
  }

  pub fn with_desire(mut self, mut desire: Desire) -> Self {
    ensure_apps_skeleton(&mut desire);
    self.desire = desire;
    self
  }

  pub fn key(&self) -> String {
    shadow_key(&self.namespace, &self.name)
  }

  pub fn validate(&self) -> Result<(), DomainError> {
    if self.namespace.trim().is_empty() || self.name.trim().is_empty() {
      return Err(DomainError::ValidationError(format!("sombra con clave inválida: '{}'", self.key())));
    }
    Ok(())
  }

  pub fn encode_report(&self) -> Result<String, DomainError> {
    encode_document(&self.report)
  }

  pub fn encode_desire(&self) -> Result<String, DomainError> {
    encode_document(&self.desire)
  }

  pub fn encode_report_meta(&self) -> Result<String, DomainError> {
    encode_document(&self.report_meta)
  }

  pub fn encode_desire_meta(&self) -> Result<String, DomainError> {
    encode_document(&self.desire_meta)
  }

  /// Serializa todas las columnas. Falla antes de tocar el almacén si algún
  /// documento no se puede serializar.
  pub fn to_stored(&self) -> Result<StoredShadow, DomainError> {
    Ok(StoredShadow { namespace: self.namespace.clone(),
                      name: self.name.clone(),
                      report: self.encode_report()?,
                      desire: self.encode_desire()?,
                      report_meta: self.encode_report_meta()?,
                      desire_meta: self.encode_desire_meta()?,
                      desire_version: self.desire_version.clone(),
                      create_time: self.creation_timestamp.timestamp_millis(),
                      update_time: self.update_timestamp.timestamp_millis() })
  }

  /// Reconstruye la sombra desde su fila. Cualquier documento corrupto aborta
  /// con `SerializationError`; una hora de reporte inválida sólo deja
  /// `time` en `None` (ver [`Shadow::report_time`]).
  pub fn from_stored(row: StoredShadow) -> Result<Self, DomainError> {
    let key = shadow_key(&row.namespace, &row.name);
    let report = decode_document(&row.report).map_err(|e| with_context(e, &key, "report"))?;
    let desire = decode_document(&row.desire).map_err(|e| with_context(e, &key, "desire"))?;
    let report_meta = decode_meta(&row.report_meta).map_err(|e| with_context(e, &key, "report_meta"))?;
    let desire_meta = decode_meta(&row.desire_meta).map_err(|e| with_context(e, &key, "desire_meta"))?;
    let report_str = if is_blank_text(&row.report) { encode_document(&report)? } else { row.report };
    let time = report_time(&report).ok().flatten();
    Ok(Self { namespace: row.namespace,
              name: row.name,
              report,
              desire,
              report_meta,
              desire_meta,
              desire_version: row.desire_version,
              creation_timestamp: from_millis(row.create_time),
              update_timestamp: from_millis(row.update_time),
              time,
              report_str })
  }

  /// Versión estricta de `time`: devuelve el error si `report.time` existe
  /// pero no es una fecha RFC3339.
  pub fn report_time(&self) -> Result<Option<DateTime<Utc>>, DomainError> {
    report_time(&self.report)
  }
}

pub fn shadow_key(namespace: &str, name: &str) -> String {
  format!("{}/{}", namespace, name)
}

pub fn encode_document(doc: &Map<String, Value>) -> Result<String, DomainError> {
  Ok(serde_json::to_string(doc)?)
}

/// Texto vacío o `null` se interpreta como el documento vacío de apps, para
/// tolerar filas escritas antes de que existieran las columnas.
pub fn decode_document(raw: &str) -> Result<Map<String, Value>, DomainError> {
  if is_blank_text(raw) {
    return Ok(empty_apps_document());
  }
  let mut doc = decode_object(raw)?;
  ensure_apps_skeleton(&mut doc);
  Ok(doc)
}

pub fn decode_meta(raw: &str) -> Result<Meta, DomainError> {
  if is_blank_text(raw) {
    return Ok(Meta::new());
  }
  decode_object(raw)
}

/// Extrae `report.time`. Ausente => `Ok(None)`.
pub fn report_time(report: &Report) -> Result<Option<DateTime<Utc>>, DomainError> {
  match report.get(REPORT_TIME_KEY) {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => {
      DateTime::parse_from_rfc3339(s).map(|t| Some(t.with_timezone(&Utc)))
                                     .map_err(|e| DomainError::SerializationError(format!("time '{}': {}", s, e)))
    }
    Some(other) => Err(DomainError::SerializationError(format!("time no es una cadena: {}", other))),
  }
}

/// Lectura ligera de la hora de reporte directamente del texto guardado, sin
/// exigir que el resto del documento tenga la forma esperada.
pub fn report_time_from_str(raw: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
  if is_blank_text(raw) {
    return Ok(None);
  }
  match serde_json::from_str::<Value>(raw)? {
    Value::Object(doc) => report_time(&doc),
    other => Err(DomainError::SerializationError(format!("el reporte no es un objeto: {}", other))),
  }
}

fn decode_object(raw: &str) -> Result<Map<String, Value>, DomainError> {
  match serde_json::from_str::<Value>(raw)? {
    Value::Object(doc) => Ok(doc),
    other => Err(DomainError::SerializationError(format!("se esperaba un objeto JSON: {}", other))),
  }
}

fn is_blank_text(raw: &str) -> bool {
  let t = raw.trim();
  t.is_empty() || t == "null"
}

fn from_millis(ms: i64) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn with_context(e: DomainError, key: &str, column: &str) -> DomainError {
  match e {
    DomainError::SerializationError(m) => DomainError::SerializationError(format!("{} ({}): {}", key, column, m)),
    other => other,
  }
}
