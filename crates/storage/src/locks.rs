use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type KeyLock = Arc<Mutex<()>>;

/// Tabela chave → lock da chave.
///
/// O lock da tabela (síncrono) só protege a busca/criação/remoção de entradas
/// e nunca é mantido através de um `.await`. O lock de cada chave é assíncrono
/// e serializa as operações sobre aquela chave.
#[derive(Default)]
pub(crate) struct LockTable {
    locks: StdMutex<HashMap<Bytes, KeyLock>>,
}

impl LockTable {
    /// Busca ou cria o lock da chave.
    pub(crate) fn handle(&self, key: &Bytes) -> KeyLock {
        self.table()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Remove o lock da chave se ninguém mais o referencia e `unused()` confirma
    /// que a chave não tem dados.
    ///
    /// `lock` é o handle do chamador, já sem o guard. Clones só são entregues
    /// com o lock da tabela adquirido, então a contagem não cresce durante a checagem.
    pub(crate) fn reclaim(&self, key: &Bytes, lock: &KeyLock, unused: impl FnOnce() -> bool) {
        let mut locks = self.table();
        if let Some(current) = locks.get(key)
            && Arc::ptr_eq(current, lock)
            && Arc::strong_count(lock) == 2
            && unused()
        {
            locks.remove(key);
            debug!(key = ?key, "lock de chave liberado");
        }
    }

    /// Número de locks vivos na tabela.
    pub(crate) fn len(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Bytes, KeyLock>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lock exclusivo sobre uma chave, com o handle usado para adquiri-lo.
pub(crate) struct HeldLock {
    pub(crate) lock: KeyLock,
    pub(crate) guard: Option<OwnedMutexGuard<()>>,
}

impl HeldLock {
    pub(crate) fn new(lock: KeyLock) -> Self {
        Self { lock, guard: None }
    }

    pub(crate) async fn acquire(&mut self) {
        self.guard = Some(self.lock.clone().lock_owned().await);
    }

    /// Solta o guard, mantendo o handle para a checagem de reclaim.
    pub(crate) fn unlock(&mut self) {
        self.guard.take();
    }
}
