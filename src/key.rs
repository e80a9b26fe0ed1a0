//! Cache-key encoding for the per-query cache: each parameter value is
//! serialized and terminated by a zero byte so that `("a", "b")` cannot
//! collide with `("ab", "")`.

use crate::value::Value;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Encode a parameter list into a stable cache key.
///
/// The intermediate byte buffer is hex-encoded rather than interpreted as
/// UTF-8: parameter values may be arbitrary `Bytes`, and a lossy UTF-8
/// conversion would map distinct invalid byte sequences to the same
/// replacement characters, silently colliding two different keys.
pub fn encode_key(args: &[Value]) -> String {
    let mut buf = Vec::new();
    for arg in args {
        arg.write_key_bytes(&mut buf);
    }
    let mut hex = String::with_capacity(buf.len() * 2);
    for byte in buf {
        hex.push(HEX[(byte >> 4) as usize] as char);
        hex.push(HEX[(byte & 0x0f) as usize] as char);
    }
    hex
}
