use bytes::Bytes;
use std::vec;
use breezedb_common::CommandError;

/// Cursor sobre os argumentos de um comando já decodificado.
///
/// Erros de aridade levam o nome do comando em minúsculas, como o Redis.
pub struct Parse {
    name: String,
    parts: vec::IntoIter<Bytes>,
}

impl Parse {
    /// Cria um Parse a partir dos elementos do comando. O primeiro é o nome.
    /// Retorna `None` para um comando vazio.
    ///
    /// O nome é guardado com bytes de controle e não-ASCII escapados
    /// (`\r` vira `\\r`), já que ele volta ao cliente em mensagens de erro.
    pub fn new(parts: Vec<Bytes>) -> Option<Parse> {
        let mut parts = parts.into_iter();
        let name = parts.next()?;
        Some(Parse {
            name: name.escape_ascii().to_string(),
            parts,
        })
    }

    /// Nome do comando, escapado.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exige exatamente `n` argumentos restantes.
    pub fn expect_exact(&self, n: usize) -> Result<(), CommandError> {
        if self.remaining() == n {
            Ok(())
        } else {
            Err(self.wrong_arity())
        }
    }

    /// Exige pelo menos `n` argumentos restantes.
    pub fn expect_at_least(&self, n: usize) -> Result<(), CommandError> {
        if self.remaining() >= n {
            Ok(())
        } else {
            Err(self.wrong_arity())
        }
    }

    /// Retorna o próximo argumento como Bytes.
    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        self.parts.next().ok_or_else(|| self.wrong_arity())
    }

    /// Retorna o próximo argumento como inteiro com sinal.
    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        let data = self.next_bytes()?;
        std::str::from_utf8(&data)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(CommandError::NotAnInteger)
    }

    /// Retorna o próximo argumento como inteiro não negativo.
    pub fn next_u64(&mut self) -> Result<u64, CommandError> {
        let data = self.next_bytes()?;
        std::str::from_utf8(&data)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(CommandError::NotAnInteger)
    }

    /// Consome todos os argumentos restantes.
    pub fn rest(&mut self) -> Vec<Bytes> {
        self.parts.by_ref().collect()
    }

    /// Retorna o número de argumentos restantes.
    pub fn remaining(&self) -> usize {
        self.parts.len()
    }

    fn wrong_arity(&self) -> CommandError {
        CommandError::WrongArity(self.name.to_lowercase())
    }
}
