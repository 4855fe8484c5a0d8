// version.rs
use chrono::Utc;
use rand::Rng;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

/// Genera el token de versión de un recurso: segundos Unix (UTC) seguidos de
/// seis caracteres aleatorios.
///
/// El token sólo sirve para detectar que un recurso cambió. No es un reloj
/// lógico: dos procesos con relojes distintos pueden generar tokens que no
/// respetan ningún orden, así que nunca se deben comparar para ordenar.
pub fn gen_resource_version() -> String {
  let mut rng = rand::thread_rng();
  let suffix: String = (0..SUFFIX_LEN).map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
                                      .collect();
  format!("{}{}", Utc::now().timestamp(), suffix)
}
