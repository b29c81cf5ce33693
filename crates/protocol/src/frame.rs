use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::io::Cursor;
use breezedb_common::{MAX_ARRAY_LEN, MAX_FRAME_SIZE, ProtocolError};

/// Maior linha de comprimento aceita (`*`/`$` + dígitos), sem o CRLF.
const MAX_LENGTH_LINE: usize = 20;

/// Representação de um frame RESP2.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Faz o parse de um frame de resposta qualquer a partir do cursor.
    ///
    /// Retorna `Err(Incomplete)` se o buffer ainda não contém o frame inteiro;
    /// nesse caso a posição do cursor não tem significado.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, ProtocolError> {
        match get_u8(src)? {
            b'+' => {
                let line = get_line(src)?;
                let s = String::from_utf8(line.to_vec())
                    .map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))?;
                Ok(Frame::Simple(s))
            }
            b'-' => {
                let line = get_line(src)?;
                let s = String::from_utf8(line.to_vec())
                    .map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))?;
                Ok(Frame::Error(s))
            }
            b':' => Ok(Frame::Integer(get_decimal(src)?)),
            b'$' => {
                let len = get_decimal(src)?;
                if len == -1 {
                    return Ok(Frame::Null);
                }
                let len = usize::try_from(len).map_err(|_| ProtocolError::InvalidBulkLength(len))?;
                Ok(Frame::Bulk(get_payload(src, len)?))
            }
            b'*' => {
                let count = get_decimal(src)?;
                let count =
                    usize::try_from(count).map_err(|_| ProtocolError::InvalidBulkLength(count))?;
                let mut frames = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    frames.push(Frame::parse(src)?);
                }
                Ok(Frame::Array(frames))
            }
            byte => Err(ProtocolError::InvalidFrameType(byte)),
        }
    }

    /// Encoda o frame no buffer de saída em formato RESP2.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                put_line(dst, s);
            }
            Frame::Error(s) => {
                dst.put_u8(b'-');
                put_line(dst, s);
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                dst.put(n.to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                dst.put(data.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                dst.put(data.as_ref());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Null => {
                dst.put(&b"$-1\r\n"[..]);
            }
            Frame::Array(frames) => {
                dst.put_u8(b'*');
                dst.put(frames.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                for frame in frames {
                    frame.encode(dst);
                }
            }
        }
    }

    /// Helper: cria um Frame::Bulk a partir de &str.
    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Helper: resposta de erro no formato `-ERR <mensagem>`.
    pub fn error(msg: impl fmt::Display) -> Frame {
        Frame::Error(format!("ERR {msg}"))
    }

    /// Helper: cria um Array de Bulk strings a partir de &[&str].
    pub fn array_from_strs(strs: &[&str]) -> Frame {
        Frame::Array(strs.iter().map(|s| Frame::bulk(s)).collect())
    }

    /// Helper: cria um Array de Bulk strings a partir de valores já em Bytes.
    pub fn bulk_array(items: Vec<Bytes>) -> Frame {
        Frame::Array(items.into_iter().map(Frame::Bulk).collect())
    }
}

/// Verifica se há um comando completo no buffer, sem alocar nem copiar payloads.
///
/// Aplica as mesmas regras de `decode_command`: `Ok(())` garante que o decode
/// a partir da mesma posição terá sucesso. Chamar antes do decode evita copiar
/// argumentos de um comando grande a cada leitura parcial.
pub fn check_command(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
    expect_prefix(src, b'*')?;
    let count = get_length(src)?;
    if count > MAX_ARRAY_LEN {
        return Err(ProtocolError::FrameTooLarge(count));
    }

    for _ in 0..count {
        expect_prefix(src, b'$')?;
        let len = get_length(src)?;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        skip_payload(src, len)?;
    }

    Ok(())
}

/// Decodifica um comando: array de bulk strings, `*<n>\r\n($<len>\r\n<bytes>\r\n){n}`.
///
/// Qualquer outro tipo RESP na entrada é erro de protocolo. `Incomplete` indica
/// que o chamador deve ler mais bytes e tentar de novo desde o início do buffer.
pub fn decode_command(src: &mut Cursor<&[u8]>) -> Result<Vec<Bytes>, ProtocolError> {
    expect_prefix(src, b'*')?;
    let count = get_length(src)?;
    if count > MAX_ARRAY_LEN {
        return Err(ProtocolError::FrameTooLarge(count));
    }

    let mut parts = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        expect_prefix(src, b'$')?;
        let len = get_length(src)?;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        parts.push(get_payload(src, len)?);
    }

    Ok(parts)
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::Incomplete);
    }
    Ok(src.get_u8())
}

fn expect_prefix(src: &mut Cursor<&[u8]>, expected: u8) -> Result<(), ProtocolError> {
    match get_u8(src)? {
        byte if byte == expected => Ok(()),
        found => Err(ProtocolError::UnexpectedPrefix {
            expected: expected as char,
            found,
        }),
    }
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    match buf[start..].windows(2).position(|w| w == b"\r\n") {
        Some(offset) => {
            src.set_position((start + offset + 2) as u64);
            Ok(&buf[start..start + offset])
        }
        None => Err(ProtocolError::Incomplete),
    }
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let line = get_line(src)?;
    let s = std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidInteger(e.to_string()))?;
    s.parse::<i64>()
        .map_err(|e| ProtocolError::InvalidInteger(e.to_string()))
}

/// Lê um comprimento não negativo: somente dígitos ASCII, sem sinal.
fn get_length(src: &mut Cursor<&[u8]>) -> Result<usize, ProtocolError> {
    let start = src.position() as usize;
    let line = match get_line(src) {
        Ok(line) => line,
        Err(ProtocolError::Incomplete) if src.get_ref().len() - start > MAX_LENGTH_LINE + 1 => {
            return Err(ProtocolError::InvalidLength("linha de comprimento longa demais".into()));
        }
        Err(e) => return Err(e),
    };

    if line.is_empty() || line.len() > MAX_LENGTH_LINE || !line.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::InvalidLength(
            String::from_utf8_lossy(line).into_owned(),
        ));
    }

    // Só dígitos: a única falha possível é overflow.
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ProtocolError::InvalidLength(String::from_utf8_lossy(line).into_owned()))
}

/// Linha de Simple/Error: CR e LF viram espaço para não quebrar o frame.
fn put_line(dst: &mut BytesMut, line: &str) {
    dst.reserve(line.len() + 2);
    for &byte in line.as_bytes() {
        dst.put_u8(match byte {
            b'\r' | b'\n' => b' ',
            other => other,
        });
    }
    dst.put(&b"\r\n"[..]);
}

fn skip_payload(src: &mut Cursor<&[u8]>, len: usize) -> Result<(), ProtocolError> {
    if src.remaining() < len + 2 {
        return Err(ProtocolError::Incomplete);
    }
    let start = src.position() as usize;
    if &src.get_ref()[start + len..start + len + 2] != b"\r\n" {
        return Err(ProtocolError::MissingTerminator);
    }
    src.set_position((start + len + 2) as u64);
    Ok(())
}

fn get_payload(src: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, ProtocolError> {
    let start = src.position() as usize;
    skip_payload(src, len)?;
    Ok(Bytes::copy_from_slice(&src.get_ref()[start..start + len]))
}
