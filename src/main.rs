use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use cloud_domain::Report;
use cloud_persistence::{DieselLocker, DieselShadowRepository};
use shadow::{ShadowService, ShadowServiceConfig};

/// Pequeño menú interactivo para inspeccionar y modificar sombras de nodo
/// usando el almacén configurado por `CLOUD_DB_URL`.
///
/// Opciones soportadas:
/// 1) Listar sombras de un namespace
/// 2) Asegurar sombra (crearla vacía si no existe)
/// 3) Aplicar reporte parcial (JSON)
/// 4) Aplicar deseo parcial (JSON)
/// 5) Eliminar sombra
/// 6) Horas de reporte de varios nodos
/// 7) Salir
fn main() -> Result<(), Box<dyn Error>> {
    // Inicializar almacén (aplica migraciones embebidas si procede)
    let db = cloud_persistence::new_from_env()?;
    let service = ShadowService::new(Arc::new(DieselShadowRepository::new(db.clone())),
                                     Arc::new(DieselLocker::new(db)),
                                     ShadowServiceConfig::from_env()?);

    loop {
        println!("\n== Shadow CLI menu ==");
        println!("1) Listar sombras");
        println!("2) Asegurar sombra");
        println!("3) Aplicar reporte (JSON)");
        println!("4) Aplicar deseo (JSON)");
        println!("5) Eliminar sombra");
        println!("6) Horas de reporte");
        println!("7) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => {
                let ns = prompt("Namespace: ")?;
                match service.list(ns.trim()) {
                    Ok(shadows) => {
                        println!("\nNAME                 | DESIRE VERSION       | REPORT TIME");
                        println!("--------------------------------------------------------------------");
                        for s in shadows {
                            let time = s.time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
                            println!("{:<20} | {:<20} | {}", s.name, s.desire_version, time);
                        }
                    }
                    Err(e) => eprintln!("Error listando sombras: {}", e),
                }
            }
            "2" => {
                let (ns, name) = prompt_key()?;
                match service.ensure(&ns, &name) {
                    Ok(s) => print_shadow(&s),
                    Err(e) => eprintln!("Error asegurando sombra: {}", e),
                }
            }
            "3" | "4" => {
                let (ns, name) = prompt_key()?;
                let raw = prompt("Parche JSON (objeto): ")?;
                let patch: Report = match serde_json::from_str(raw.trim()) {
                    Ok(p) => p,
                    Err(e) => {
                        eprintln!("JSON inválido: {}", e);
                        continue;
                    }
                };
                let res = if choice.trim() == "3" {
                    service.report(&ns, &name, &patch)
                } else {
                    service.desire(&ns, &name, &patch)
                };
                match res {
                    Ok(s) => print_shadow(&s),
                    Err(e) => eprintln!("Error aplicando parche: {}", e),
                }
            }
            "5" => {
                let (ns, name) = prompt_key()?;
                let confirm = prompt(&format!("Confirma borrado de {}/{}? escribir 'yes' para confirmar: ", ns, name))?;
                if confirm.trim().to_lowercase() == "yes" {
                    match service.delete(&ns, &name) {
                        Ok(()) => println!("Sombra eliminada: {}/{}", ns, name),
                        Err(e) => eprintln!("Error eliminando sombra: {}", e),
                    }
                } else {
                    println!("Borrado cancelado");
                }
            }
            "6" => {
                let ns = prompt("Namespace: ")?;
                let names_s = prompt("Nodos separados por coma: ")?;
                let names: Vec<String> = names_s.split(',')
                                                .map(|s| s.trim().to_string())
                                                .filter(|s| !s.is_empty())
                                                .collect();
                match service.list_report_times(ns.trim(), &names) {
                    Ok(times) => {
                        for t in times {
                            let time = t.time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
                            println!("{:<20} | {}", t.name, time);
                        }
                    }
                    Err(e) => eprintln!("Error leyendo horas de reporte: {}", e),
                }
            }
            "7" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn print_shadow(s: &cloud_domain::Shadow) {
    println!("{}/{} (desire version {})", s.namespace, s.name, s.desire_version);
    println!("report: {}", serde_json::Value::Object(s.report.clone()));
    println!("desire: {}", serde_json::Value::Object(s.desire.clone()));
}

fn prompt_key() -> io::Result<(String, String)> {
    let ns = prompt("Namespace: ")?;
    let name = prompt("Nombre del nodo: ")?;
    Ok((ns.trim().to_string(), name.trim().to_string()))
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
