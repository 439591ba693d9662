use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

use crate::{Error, Result};

/// Character encoding of a connection's external bytes.
///
/// Text is always held as UTF-8 inside the crate; this converts at the
/// transport boundary.
#[derive(Clone, Copy)]
pub struct TextEncoding {
    encoding: &'static Encoding,
}

impl TextEncoding {
    /// Resolve a label such as `"UTF-8"`, `"latin1"` or `"native.enc"`.
    ///
    /// `"native.enc"` and the empty label map to `default_label`.
    pub fn resolve(label: &str, default_label: &str) -> Result<Self> {
        let label = match label {
            "" | "native.enc" => default_label,
            other => other,
        };
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| Error::Encoding(label.to_string()))?;
        Ok(Self { encoding })
    }

    pub fn utf8() -> Self {
        Self { encoding: UTF_8 }
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF_8
    }

    pub fn decoder(&self) -> TextDecoder {
        TextDecoder {
            decoder: self.encoding.new_decoder_without_bom_handling(),
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        if self.is_utf8() {
            return text.as_bytes().to_vec();
        }
        let (bytes, _, _) = self.encoding.encode(text);
        bytes.into_owned()
    }
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl std::fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TextEncoding").field(&self.name()).finish()
    }
}

/// Streaming decoder; multi-byte sequences split across chunks are carried over.
pub struct TextDecoder {
    decoder: Decoder,
}

impl TextDecoder {
    /// Decode `bytes`, appending to `out`. Pass `last = true` at end of stream.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut String, last: bool) {
        let mut src = bytes;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len() * 3 + 16);
            out.reserve(needed);
            let (result, read, _) = self.decoder.decode_to_string(src, out, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    pub fn decode(&mut self, bytes: &[u8], last: bool) -> String {
        let mut out = String::new();
        self.decode_into(bytes, &mut out, last);
        out
    }
}
