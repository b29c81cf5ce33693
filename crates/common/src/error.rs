/// Erros de framing do protocolo RESP.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame incompleto")]
    Incomplete,
    #[error("byte de tipo inválido: {0:#x}")]
    InvalidFrameType(u8),
    #[error("esperado '{expected}', recebido {found:#x}")]
    UnexpectedPrefix { expected: char, found: u8 },
    #[error("inteiro inválido: {0}")]
    InvalidInteger(String),
    #[error("comprimento inválido: {0}")]
    InvalidLength(String),
    #[error("comprimento de bulk inválido: {0}")]
    InvalidBulkLength(i64),
    #[error("bulk string sem CRLF final")]
    MissingTerminator,
    #[error("frame excede tamanho máximo ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("encoding inválido: {0}")]
    InvalidEncoding(String),
}

/// Erros do store de dados.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StorageError {
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("conexão resetada pelo peer")]
    ConnectionReset,
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocolo: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Erros de parsing/validação de comandos.
///
/// As mensagens vão para o cliente como `-ERR <mensagem>`.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("value is not an integer or out of range")]
    NotAnInteger,
}

/// Erro top-level do BreezeDB.
#[derive(Debug, thiserror::Error)]
pub enum BreezeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Result type alias.
pub type BreezeResult<T> = Result<T, BreezeError>;

// Conversão implícita de io::Error → BreezeError (via ConnectionError)
impl From<std::io::Error> for BreezeError {
    fn from(e: std::io::Error) -> Self {
        BreezeError::Connection(ConnectionError::Io(e))
    }
}

impl ConnectionError {
    /// Indica se o erro equivale a um fechamento da conexão pelo peer,
    /// e não a uma violação de protocolo.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::ConnectionReset => true,
            ConnectionError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            ConnectionError::Protocol(_) => false,
        }
    }
}
