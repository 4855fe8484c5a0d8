// Archivo: errors.rs
// Propósito: definir los errores del subsistema de sombras y el alias
// Result<T> usado por sus APIs.
use cloud_domain::DomainError;
use thiserror::Error;
/// Errores del almacén y del servicio de sombras.
///
/// - `NotFound`: la sombra `(namespace, name)` no existe.
/// - `DuplicateKey`: se intentó crear una sombra que ya existe.
/// - `Serialization`: un documento guardado no se pudo interpretar.
/// - `Storage`: fallo de transporte/transacción contra el almacén.
/// - `LockHeld`: no se obtuvo el lock de la sombra a tiempo.
/// - `Invalid`: entrada rechazada antes de tocar el almacén.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShadowError {
  /// Sombra no encontrada. Distinto de una sombra con documentos vacíos.
  #[error("No encontrado: {0}")]
  NotFound(String),
  /// Clave `(namespace, name)` ya existente.
  #[error("Ya existe: {0}")]
  DuplicateKey(String),
  /// Documento corrupto; reintentar no lo arregla.
  #[error("Error de serialización: {0}")]
  Serialization(String),
  /// Error de almacenamiento (BD, pool, timeout). La transacción se revierte.
  #[error("Error de almacenamiento: {0}")]
  Storage(String),
  /// Lock ocupado por otro escritor.
  #[error("Lock ocupado: {0}")]
  LockHeld(String),
  /// Entrada inválida.
  #[error("Entrada inválida: {0}")]
  Invalid(String),
}

impl From<DomainError> for ShadowError {
  fn from(e: DomainError) -> Self {
    match e {
      DomainError::NotFound(m) => Self::NotFound(m),
      DomainError::DuplicateKey(m) => Self::DuplicateKey(m),
      DomainError::SerializationError(m) => Self::Serialization(m),
      DomainError::ValidationError(m) => Self::Invalid(m),
      DomainError::ExternalError(m) => Self::Storage(m),
    }
  }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, ShadowError>;
