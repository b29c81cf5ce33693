use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use breezedb_common::{ConnectionError, INITIAL_BUFFER_CAPACITY, ProtocolError};
use breezedb_protocol::{Frame, check_command, decode_command};

/// Wrapper sobre TcpStream com buffer para leitura de comandos e escrita de respostas RESP.
///
/// Respostas ficam no `BufWriter` e são enviadas antes de qualquer espera por
/// novos dados do socket, então comandos em pipeline respondem em lote e em ordem.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Lê o próximo comando do stream. Retorna None no EOF limpo.
    ///
    /// EOF no meio de um frame vira `ConnectionReset`; frame malformado vira
    /// `ConnectionError::Protocol` e a conexão não deve ser reaproveitada.
    pub async fn read_command(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        loop {
            match self.parse_command() {
                Ok(Some(parts)) => return Ok(Some(parts)),
                Ok(None) => {}
                Err(e) => {
                    // Respostas de comandos anteriores ainda são entregues.
                    self.stream.flush().await?;
                    return Err(e.into());
                }
            }

            self.stream.flush().await?;
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ConnectionError::ConnectionReset);
            }
        }
    }

    /// Escreve um frame no buffer de saída. O envio acontece no próximo flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ConnectionError> {
        self.stream.flush().await?;
        Ok(())
    }

    fn parse_command(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        let mut cursor = Cursor::new(&self.buffer[..]);

        // Primeiro verifica sem copiar nada; só decodifica o comando inteiro.
        match check_command(&mut cursor) {
            Ok(()) => {
                let len = cursor.position() as usize;
                cursor.set_position(0);
                let parts = decode_command(&mut cursor)?;
                self.buffer.advance(len);
                Ok(Some(parts))
            }
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
