//! Text helpers shared by every transport: line splitting, push-back,
//! character decoding and NUL-terminated string extraction.

mod encoding;
mod lines;
mod pushback;

pub use encoding::{TextDecoder, TextEncoding};
pub use lines::{find_terminator, split_lines, LineSplitter};
pub use pushback::{PushBack, PushBackLine};

/// Cut `bytes` at the first NUL, as binary "char" reads do.
pub fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}
