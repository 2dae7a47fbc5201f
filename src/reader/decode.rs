//! Streaming text decoding for register extracts
//!
//! Government extracts arrive either Latin-1 or UTF-8 encoded. The CSV reader
//! expects UTF-8, so the source bytes are transcoded on the fly in bounded
//! buffers rather than loading whole files into memory.

use std::io::{self, Read};

use encoding_rs::{Decoder, DecoderResult, UTF_8, WINDOWS_1252};

/// Text encoding of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TextEncoding {
    /// ISO-8859-1, decoded with the WHATWG `latin1` decoder (windows-1252)
    Latin1,
    /// UTF-8, decoded strictly
    Utf8,
}

impl TextEncoding {
    /// Label used in logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Latin1 => "latin-1",
            Self::Utf8 => "utf-8",
        }
    }

    fn new_decoder(self) -> Decoder {
        match self {
            Self::Latin1 => WINDOWS_1252.new_decoder_without_bom_handling(),
            Self::Utf8 => UTF_8.new_decoder_with_bom_removal(),
        }
    }
}

const INPUT_BUFFER_SIZE: usize = 8192;
// A windows-1252 byte decodes to at most three UTF-8 bytes (0x80 is U+20AC)
const OUTPUT_BUFFER_SIZE: usize = INPUT_BUFFER_SIZE * 3 + 16;

/// A reader that transcodes its inner reader to UTF-8
///
/// Malformed input (only possible for [`TextEncoding::Utf8`]) surfaces as an
/// `InvalidData` I/O error.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    input: Box<[u8]>,
    input_start: usize,
    input_end: usize,
    output: Box<[u8]>,
    output_start: usize,
    output_end: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    /// Wrap `inner`, decoding it from `encoding`
    pub fn new(inner: R, encoding: TextEncoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder(),
            input: vec![0; INPUT_BUFFER_SIZE].into_boxed_slice(),
            input_start: 0,
            input_end: 0,
            output: vec![0; OUTPUT_BUFFER_SIZE].into_boxed_slice(),
            output_start: 0,
            output_end: 0,
            eof: false,
            finished: false,
        }
    }

    fn fill_output(&mut self) -> io::Result<()> {
        while !self.finished {
            if self.input_start == self.input_end && !self.eof {
                let read = self.inner.read(&mut self.input)?;
                self.input_start = 0;
                self.input_end = read;
                self.eof = read == 0;
            }

            let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
                &self.input[self.input_start..self.input_end],
                &mut self.output,
                self.eof,
            );
            self.input_start += read;
            self.output_start = 0;
            self.output_end = written;

            match result {
                DecoderResult::Malformed(_, _) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "input is not valid for the selected text encoding",
                    ));
                }
                DecoderResult::InputEmpty if self.eof => self.finished = true,
                DecoderResult::InputEmpty | DecoderResult::OutputFull => {}
            }

            if written > 0 {
                break;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.output_start == self.output_end {
            self.fill_output()?;
        }
        let available = self.output_end - self.output_start;
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&self.output[self.output_start..self.output_start + count]);
        self.output_start += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8], encoding: TextEncoding) -> io::Result<String> {
        let mut reader = DecodingReader::new(bytes, encoding);
        let mut out = String::new();
        reader.read_to_string(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_latin1_is_transcoded() {
        let bytes = b"S\xe3o Jos\xe9;Cear\xe1";
        assert_eq!(
            decode_all(bytes, TextEncoding::Latin1).unwrap(),
            "São José;Ceará"
        );
    }

    #[test]
    fn test_utf8_rejects_latin1_bytes() {
        let bytes = b"S\xe3o Paulo";
        let err = decode_all(bytes, TextEncoding::Utf8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_utf8_bom_is_removed() {
        let bytes = "\u{feff}cd_ibge,qtde_pessoas".as_bytes();
        assert_eq!(
            decode_all(bytes, TextEncoding::Utf8).unwrap(),
            "cd_ibge,qtde_pessoas"
        );
    }

    #[test]
    fn test_large_input_crosses_buffer_boundaries() {
        let line = "Florian\u{f3}polis;4205407\n";
        let text = line.repeat(2_000);
        let latin: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
        assert_eq!(decode_all(&latin, TextEncoding::Latin1).unwrap(), text);
        assert_eq!(decode_all(text.as_bytes(), TextEncoding::Utf8).unwrap(), text);
    }
}
