use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::debug;

use breezedb_common::{BreezeResult, ConnectionError, StorageError};
use breezedb_protocol::{Command, Frame};
use breezedb_storage::{Db, Value};

use crate::Connection;

/// Loop principal de tratamento de uma conexão.
///
/// Erros de comando e de tipo viram `-ERR` e o loop segue; só EOF, erro de
/// protocolo/I-O ou o sinal de shutdown encerram a conexão.
pub async fn handle_connection(
    mut conn: Connection,
    db: Db,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let parts = tokio::select! {
            result = conn.read_command() => result?,
            _ = shutdown.recv() => {
                return conn.flush().await;
            }
        };

        let parts = match parts {
            Some(p) => p,
            None => return Ok(()), // EOF
        };

        let response = match Command::from_parts(parts) {
            Ok(Some(cmd)) => {
                debug!("comando recebido: {}", cmd.name());
                execute_command(cmd, &db).await
            }
            // Comando vazio: nada a responder.
            Ok(None) => continue,
            Err(e) => Frame::error(e),
        };

        conn.write_frame(&response).await?;
    }
}

/// Executa um comando e retorna o Frame de resposta.
pub async fn execute_command(cmd: Command, db: &Db) -> Frame {
    match execute(cmd, db).await {
        Ok(frame) => frame,
        Err(e) => Frame::error(e),
    }
}

async fn execute(cmd: Command, db: &Db) -> BreezeResult<Frame> {
    let frame = match cmd {
        Command::Ping => Frame::Simple("PONG".into()),
        Command::Echo(msg) => Frame::Bulk(msg),
        Command::Get(key) => match db.get(&key).await {
            Some(Value::Scalar(data)) => Frame::Bulk(data),
            Some(Value::List(_)) => return Err(StorageError::WrongType.into()),
            None => Frame::Null,
        },
        Command::Set {
            key,
            value,
            expire_ms,
        } => {
            db.set(key, value, expire_ms.map(Duration::from_millis))
                .await;
            Frame::Simple("OK".into())
        }
        Command::RPush { key, values } => Frame::Integer(db.rpush(&key, &values).await? as i64),
        Command::LPush { key, values } => Frame::Integer(db.lpush(&key, &values).await? as i64),
        Command::LRange { key, start, stop } => {
            Frame::bulk_array(db.lrange(&key, start, stop).await?)
        }
        Command::LLen(key) => Frame::Integer(db.llen(&key).await? as i64),
        Command::LPop(key) => match db.lpop(&key).await? {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        },
    };

    Ok(frame)
}
