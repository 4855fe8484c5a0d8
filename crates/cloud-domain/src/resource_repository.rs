use crate::resource::{plan_update, prepare_create, Resource, UpdatePlan};
use crate::DomainError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Operaciones de persistencia de un tipo de recurso versionado.
///
/// `update` sigue la convención de igualdad-antes-de-escribir: si el payload
/// no cambia nada de lo que controla el cliente, el valor guardado se
/// devuelve tal cual y no se genera versión nueva.
pub trait ResourceRepository<T: Resource>: Send + Sync {
    /// Obtiene un recurso; `DomainError::NotFound` si no existe.
    fn get(&self, namespace: &str, name: &str) -> Result<T, DomainError>;

    /// Crea el recurso. `DomainError::DuplicateKey` si ya existe.
    fn create(&self, resource: T) -> Result<T, DomainError>;

    /// Actualiza el recurso y devuelve el valor vigente tras la operación.
    fn update(&self, resource: T) -> Result<T, DomainError>;

    /// Borra el recurso. Borrar algo inexistente no es un error.
    fn delete(&self, namespace: &str, name: &str) -> Result<(), DomainError>;

    /// Lista los recursos de un namespace ordenados por nombre.
    fn list(&self, namespace: &str) -> Result<Vec<T>, DomainError>;
}

/// Implementación en memoria para tests y desarrollo.
pub struct InMemoryResourceRepository<T: Resource> {
    items: Arc<Mutex<BTreeMap<(String, String), T>>>,
}

impl<T: Resource> InMemoryResourceRepository<T> {
    pub fn new() -> Self {
        Self { items: Arc::new(Mutex::new(BTreeMap::new())) }
    }

    // Helper to map poisoned mutex errors into DomainError
    fn lock_items(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), T>>, DomainError> {
        self.items
            .lock()
            .map_err(|e| DomainError::ExternalError(format!("Mutex '{}' poisoned: {}", T::KIND, e)))
    }
}

fn key_of(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl<T: Resource> ResourceRepository<T> for InMemoryResourceRepository<T> {
    fn get(&self, namespace: &str, name: &str) -> Result<T, DomainError> {
        let items = self.lock_items()?;
        items.get(&key_of(namespace, name))
             .cloned()
             .ok_or_else(|| DomainError::NotFound(format!("{} {}/{}", T::KIND, namespace, name)))
    }

    fn create(&self, resource: T) -> Result<T, DomainError> {
        let resource = prepare_create(resource, Utc::now())?;
        let key = key_of(&resource.meta().namespace, &resource.meta().name);
        let mut items = self.lock_items()?;
        if items.contains_key(&key) {
            return Err(DomainError::DuplicateKey(format!("{} {}", T::KIND, resource.meta().key())));
        }
        items.insert(key, resource.clone());
        Ok(resource)
    }

    fn update(&self, resource: T) -> Result<T, DomainError> {
        let key = key_of(&resource.meta().namespace, &resource.meta().name);
        let mut items = self.lock_items()?;
        let stored = items.get(&key)
                          .cloned()
                          .ok_or_else(|| DomainError::NotFound(format!("{} {}", T::KIND, resource.meta().key())))?;
        match plan_update(stored, resource, Utc::now())? {
            UpdatePlan::Unchanged(current) => Ok(current),
            UpdatePlan::Write(next) => {
                items.insert(key, next.clone());
                Ok(next)
            }
        }
    }

    fn delete(&self, namespace: &str, name: &str) -> Result<(), DomainError> {
        let mut items = self.lock_items()?;
        items.remove(&key_of(namespace, name));
        Ok(())
    }

    fn list(&self, namespace: &str) -> Result<Vec<T>, DomainError> {
        let items = self.lock_items()?;
        Ok(items.iter().filter(|((ns, _), _)| ns == namespace).map(|(_, v)| v.clone()).collect())
    }
}

impl<T: Resource> Default for InMemoryResourceRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Configuration, Node, Secret};
    use serde_json::json;

    #[test]
    fn create_get_and_duplicate() -> Result<(), DomainError> {
        let repo = InMemoryResourceRepository::<Node>::new();
        let created = repo.create(Node::new("default", "node01"))?;
        assert!(!created.meta.version.is_empty());
        let loaded = repo.get("default", "node01")?;
        assert_eq!(loaded, created);
        match repo.create(Node::new("default", "node01")) {
            Err(DomainError::DuplicateKey(_)) => (),
            other => panic!("expected DuplicateKey, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn no_op_update_keeps_version() -> Result<(), DomainError> {
        let repo = InMemoryResourceRepository::<Configuration>::new();
        let created = repo.create(Configuration::new("default", "cfg").with_data([("a", "1")]))?;
        let same = repo.update(Configuration::new("default", "cfg").with_data([("a", "1")]))?;
        assert_eq!(same.meta.version, created.meta.version);
        let changed = repo.update(Configuration::new("default", "cfg").with_data([("a", "2")]))?;
        assert_ne!(changed.meta.version, created.meta.version);
        assert_eq!(repo.get("default", "cfg")?.meta.version, changed.meta.version);
        Ok(())
    }

    #[test]
    fn update_missing_is_not_found_and_delete_is_idempotent() -> Result<(), DomainError> {
        let repo = InMemoryResourceRepository::<Secret>::new();
        assert!(matches!(repo.update(Secret::new("default", "s")), Err(DomainError::NotFound(_))));
        repo.create(Secret::new("default", "s").with_entry("k", b"v".to_vec()))?;
        repo.delete("default", "s")?;
        repo.delete("default", "s")?;
        assert!(matches!(repo.get("default", "s"), Err(DomainError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn list_is_scoped_to_namespace() -> Result<(), DomainError> {
        let repo = InMemoryResourceRepository::<Node>::new();
        let mut n = Node::new("default", "b");
        n.attributes.insert("zone".into(), json!("eu"));
        repo.create(n)?;
        repo.create(Node::new("default", "a"))?;
        repo.create(Node::new("other", "c"))?;
        let names: Vec<String> = repo.list("default")?.into_iter().map(|n| n.meta.name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[test]
    fn mutex_poisoning_returns_error() {
        use std::thread;

        let repo = InMemoryResourceRepository::<Node>::new();
        let items = repo.items.clone();
        let handle = thread::spawn(move || {
            let _g = items.lock().unwrap();
            panic!("force poison");
        });
        let _ = handle.join();

        match repo.list("default") {
            Err(DomainError::ExternalError(_)) => (),
            other => panic!("expected ExternalError, got {:?}", other),
        }
    }
}
