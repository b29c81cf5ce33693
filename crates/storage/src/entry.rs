use bytes::Bytes;
use std::collections::VecDeque;
use tokio::time::Instant;

/// Tipo do valor armazenado. A variante é fixa durante a vida da entrada.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Bytes),
    List(VecDeque<Bytes>),
}

/// Entrada no store: valor + instante absoluto de expiração opcional.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    pub(crate) expires_at: Option<Instant>,
}

impl Entry {
    pub(crate) fn new(value: Value, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|t| Instant::now() >= t)
    }
}
