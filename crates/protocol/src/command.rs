use bytes::Bytes;
use breezedb_common::CommandError;

use crate::Parse;

/// Enum com todos os comandos suportados.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Echo(Bytes),
    Get(Bytes),
    Set {
        key: Bytes,
        value: Bytes,
        expire_ms: Option<u64>,
    },
    RPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    LPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    LRange {
        key: Bytes,
        start: i64,
        stop: i64,
    },
    LLen(Bytes),
    LPop(Bytes),
}

impl Command {
    /// Faz o parse dos elementos de um comando em um Command.
    ///
    /// Um comando vazio resulta em `Ok(None)`: não há resposta a enviar.
    /// Aridade e argumentos são validados aqui, antes de qualquer acesso ao store.
    pub fn from_parts(parts: Vec<Bytes>) -> Result<Option<Command>, CommandError> {
        let Some(mut parse) = Parse::new(parts) else {
            return Ok(None);
        };
        let cmd_name = parse.name().to_uppercase();

        let cmd = match cmd_name.as_str() {
            "PING" => {
                parse.expect_exact(0)?;
                Command::Ping
            }
            "ECHO" => {
                parse.expect_exact(1)?;
                Command::Echo(parse.next_bytes()?)
            }
            "GET" => {
                parse.expect_exact(1)?;
                Command::Get(parse.next_bytes()?)
            }
            "SET" => parse_set(&mut parse)?,
            "RPUSH" => {
                parse.expect_at_least(2)?;
                let key = parse.next_bytes()?;
                Command::RPush {
                    key,
                    values: parse.rest(),
                }
            }
            "LPUSH" => {
                parse.expect_at_least(2)?;
                let key = parse.next_bytes()?;
                Command::LPush {
                    key,
                    values: parse.rest(),
                }
            }
            "LRANGE" => {
                parse.expect_exact(3)?;
                let key = parse.next_bytes()?;
                let start = parse.next_int()?;
                let stop = parse.next_int()?;
                Command::LRange { key, start, stop }
            }
            "LLEN" => {
                parse.expect_exact(1)?;
                Command::LLen(parse.next_bytes()?)
            }
            "LPOP" => {
                parse.expect_exact(1)?;
                Command::LPop(parse.next_bytes()?)
            }
            _ => return Err(CommandError::Unknown(parse.name().to_string())),
        };

        Ok(Some(cmd))
    }

    /// Nome canônico do comando, usado nos logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Echo(_) => "ECHO",
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::RPush { .. } => "RPUSH",
            Command::LPush { .. } => "LPUSH",
            Command::LRange { .. } => "LRANGE",
            Command::LLen(_) => "LLEN",
            Command::LPop(_) => "LPOP",
        }
    }
}

/// `SET key value [PX ms]`. O TTL só vale quando há um quinto token e o
/// quarto é `PX`; demais tokens extras são ignorados.
fn parse_set(parse: &mut Parse) -> Result<Command, CommandError> {
    parse.expect_at_least(2)?;
    let key = parse.next_bytes()?;
    let value = parse.next_bytes()?;

    let mut expire_ms = None;
    if parse.remaining() >= 2 {
        let opt = parse.next_bytes()?;
        if opt.eq_ignore_ascii_case(b"PX") {
            expire_ms = Some(parse.next_u64()?);
        }
    }

    Ok(Command::Set {
        key,
        value,
        expire_ms,
    })
}
