use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use breezedb_common::{BreezeResult, ConnectionError, MAX_CONNECTIONS};
use breezedb_storage::Db;

use crate::{Connection, handle_connection};

/// Pausa após uma falha de accept (ex.: limite de file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Servidor TCP: aceita conexões e atende cada uma em sua própria task.
pub struct Server {
    listener: TcpListener,
    db: Db,
    max_connections: usize,
}

impl Server {
    pub fn new(listener: TcpListener, db: Db) -> Self {
        Self {
            listener,
            db,
            max_connections: MAX_CONNECTIONS,
        }
    }

    /// Faz o bind no endereço com um store novo.
    pub async fn bind(addr: impl ToSocketAddrs) -> BreezeResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, Db::new()))
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn local_addr(&self) -> BreezeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Aceita conexões até `shutdown` completar; então avisa as conexões
    /// abertas e espera todas terminarem.
    pub async fn run(self, shutdown: impl Future) {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (complete_tx, mut complete_rx) = mpsc::channel::<()>(1);

        if let Ok(addr) = self.listener.local_addr() {
            info!("BreezeDB escutando em {addr}");
        }

        tokio::select! {
            _ = self.accept_loop(&shutdown_tx, &complete_tx) => {}
            _ = shutdown => {
                info!("shutdown signal recebido");
            }
        }

        drop(shutdown_tx);
        drop(complete_tx);
        // Recebe None quando a última conexão solta seu Sender.
        let _ = complete_rx.recv().await;
        info!("todas as conexões encerradas");
    }

    async fn accept_loop(
        &self,
        shutdown_tx: &broadcast::Sender<()>,
        complete_tx: &mpsc::Sender<()>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                return;
            };

            let (socket, addr) = match self.listener.accept().await {
                Ok(v) => v,
                Err(e) => {
                    error!("erro ao aceitar conexão: {e}");
                    sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            info!("nova conexão: {addr}");
            let db = self.db.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            let complete_tx = complete_tx.clone();

            tokio::spawn(async move {
                let conn = Connection::new(socket);
                match handle_connection(conn, db, &mut shutdown_rx).await {
                    Ok(()) => {}
                    Err(e) if e.is_disconnect() => debug!("peer {addr} desconectou: {e}"),
                    Err(ConnectionError::Protocol(e)) => {
                        warn!("erro de protocolo em {addr}, encerrando: {e}")
                    }
                    Err(e) => error!("erro na conexão {addr}: {e}"),
                }
                info!("conexão encerrada: {addr}");
                drop(permit);
                drop(complete_tx);
            });
        }
    }
}
