//! Crate `shadow` — sincronización de sombras de nodo (report/desire)
//!
//! Este crate define el contrato de persistencia `ShadowRepository`, el
//! colaborador de exclusión mutua `Locker`, implementaciones en memoria
//! útiles para pruebas (`InMemoryShadowRepository`, `InMemoryLocker`) y el
//! servicio `ShadowService`, que aplica reportes y deseos parciales.
//!
//! Diseño resumido:
//! - Cada operación del almacén es un leer-modificar-escribir transaccional.
//! - Idempotencia: un parche que no cambia el documento no escribe nada.
//! - Orden entre escritores: lo da el lock por sombra, no el almacén.
//!
//! Ejemplo rápido:
//! ```rust
//! use shadow::{InMemoryLocker, InMemoryShadowRepository, ShadowService, ShadowServiceConfig};
//! use std::sync::Arc;
//! let service = ShadowService::new(Arc::new(InMemoryShadowRepository::new()),
//!                                  Arc::new(InMemoryLocker::new()),
//!                                  ShadowServiceConfig::default());
//! let s = service.ensure("default", "node01").unwrap();
//! assert_eq!(s.name, "node01");
//! ```
pub mod errors;
pub mod repository;
pub mod service;
pub mod stubs;

pub use errors::*;
pub use repository::*;
pub use service::*;
pub use stubs::*;
