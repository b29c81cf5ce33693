use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use tokio::time::{Duration, Instant};
use tracing::debug;

use breezedb_common::StorageError;

use crate::entry::{Entry, Value};
use crate::locks::{HeldLock, LockTable};

/// Estado compartilhado entre todas as conexões.
struct SharedState {
    data: DashMap<Bytes, Entry>,
    locks: LockTable,
}

/// Handle para o banco de dados in-memory.
///
/// Clonar é barato (um `Arc`); cada `Db::new()` é um store independente.
/// Toda operação atua sobre uma única chave e roda com o lock daquela chave,
/// então operações concorrentes na mesma chave nunca se intercalam. A expiração
/// é preguiçosa: uma entrada vencida só é removida quando a chave é acessada.
#[derive(Clone)]
pub struct Db {
    shared: Arc<SharedState>,
}

/// Lock de uma chave durante uma operação. Ao cair, libera o lock e devolve
/// a entrada da tabela de locks se a chave não existe mais.
struct KeyGuard<'a> {
    shared: &'a SharedState,
    key: Bytes,
    held: HeldLock,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.held.unlock();
        let data = &self.shared.data;
        let key = &self.key;
        self.shared
            .locks
            .reclaim(key, &self.held.lock, || !data.contains_key(key));
    }
}

impl Db {
    pub fn new() -> Self {
        Db {
            shared: Arc::new(SharedState {
                data: DashMap::new(),
                locks: LockTable::default(),
            }),
        }
    }

    // --- Scalar operations ---

    /// Substitui incondicionalmente o valor da chave.
    pub async fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let _guard = self.lock_key(&key).await;
        // Um TTL que estoura o relógio equivale a não expirar.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.shared
            .data
            .insert(key, Entry::new(Value::Scalar(value), expires_at));
    }

    pub async fn get(&self, key: &Bytes) -> Option<Value> {
        let _guard = self.lock_key(key).await;
        self.live_entry(key).map(|entry| entry.value.clone())
    }

    /// Remove a chave. Retorna `true` se havia uma entrada viva.
    pub async fn delete(&self, key: &Bytes) -> bool {
        let _guard = self.lock_key(key).await;
        match self.shared.data.remove(key) {
            Some((_, entry)) => !entry.is_expired(),
            None => false,
        }
    }

    pub async fn exists(&self, key: &Bytes) -> bool {
        let _guard = self.lock_key(key).await;
        let entry = self.live_entry(key);
        entry.is_some()
    }

    // --- List operations ---

    pub async fn rpush(&self, key: &Bytes, values: &[Bytes]) -> Result<usize, StorageError> {
        self.push(key, values, |list, v| list.push_back(v)).await
    }

    /// Insere cada valor na cabeça, na ordem dada: `[a, b, c]` vira `[c, b, a, ...]`.
    pub async fn lpush(&self, key: &Bytes, values: &[Bytes]) -> Result<usize, StorageError> {
        self.push(key, values, |list, v| list.push_front(v)).await
    }

    async fn push(
        &self,
        key: &Bytes,
        values: &[Bytes],
        push_one: fn(&mut VecDeque<Bytes>, Bytes),
    ) -> Result<usize, StorageError> {
        let _guard = self.lock_key(key).await;

        if let Some(mut entry) = self.live_entry(key) {
            // Mantém o expires_at da entrada existente.
            return match &mut entry.value {
                Value::List(list) => {
                    for v in values {
                        push_one(list, v.clone());
                    }
                    Ok(list.len())
                }
                Value::Scalar(_) => Err(StorageError::WrongType),
            };
        }

        // Lista vazia não existe como chave.
        if values.is_empty() {
            return Ok(0);
        }

        let mut list = VecDeque::with_capacity(values.len());
        for v in values {
            push_one(&mut list, v.clone());
        }
        let len = list.len();
        self.shared
            .data
            .insert(key.clone(), Entry::new(Value::List(list), None));
        Ok(len)
    }

    /// Remove e retorna a cabeça da lista. A chave some quando a lista esvazia.
    pub async fn lpop(&self, key: &Bytes) -> Result<Option<Bytes>, StorageError> {
        let _guard = self.lock_key(key).await;

        let Some(mut entry) = self.live_entry(key) else {
            return Ok(None);
        };

        let (head, now_empty) = match &mut entry.value {
            Value::List(list) => (list.pop_front(), list.is_empty()),
            Value::Scalar(_) => return Err(StorageError::WrongType),
        };

        // Limpar chave se lista ficou vazia
        if now_empty {
            drop(entry);
            self.shared.data.remove(key);
        }
        Ok(head)
    }

    pub async fn lrange(
        &self,
        key: &Bytes,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Bytes>, StorageError> {
        let _guard = self.lock_key(key).await;

        let Some(entry) = self.live_entry(key) else {
            return Ok(vec![]);
        };

        match &entry.value {
            Value::List(list) => Ok(match normalize_range(list.len(), start, stop) {
                Some((s, e)) => list.range(s..=e).cloned().collect(),
                None => vec![],
            }),
            Value::Scalar(_) => Err(StorageError::WrongType),
        }
    }

    pub async fn llen(&self, key: &Bytes) -> Result<usize, StorageError> {
        let _guard = self.lock_key(key).await;

        let entry = self.live_entry(key);
        match entry.as_deref() {
            None => Ok(0),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.len()),
            Some(_) => Err(StorageError::WrongType),
        }
    }

    /// Número de entradas armazenadas, incluindo vencidas ainda não acessadas.
    pub fn len(&self) -> usize {
        self.shared.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.data.is_empty()
    }

    async fn lock_key(&self, key: &Bytes) -> KeyGuard<'_> {
        let mut guard = KeyGuard {
            shared: &self.shared,
            key: key.clone(),
            held: HeldLock::new(self.shared.locks.handle(key)),
        };
        guard.held.acquire().await;
        guard
    }

    /// Entrada da chave, removendo-a antes se já venceu.
    /// Só pode ser chamada com o lock da chave adquirido.
    fn live_entry(&self, key: &Bytes) -> Option<RefMut<'_, Bytes, Entry>> {
        let entry = self.shared.data.get_mut(key)?;
        if entry.is_expired() {
            drop(entry);
            self.shared.data.remove(key);
            debug!(key = ?key, "key expirada removida");
            return None;
        }
        Some(entry)
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

/// Normaliza índices estilo Redis para um intervalo inclusivo válido.
/// Negativos contam a partir do fim; `None` se o intervalo é vazio.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop }.min(len - 1);

    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
