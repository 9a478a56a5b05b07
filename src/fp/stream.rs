//! A write-only fingerprint stream (`spec.md` §4.1), ported from the
//! original `FP::FPStream` streambuf: pending bytes are buffered up to one
//! word and folded in with a single `Extend` call, so that writing the
//! same bytes through any sequence of chunk sizes produces the same tag.

use super::Tag;

/// Accumulates a fingerprint tag from a sequence of writes.
#[derive(Debug, Clone)]
pub struct FpStream {
    tag: Tag,
    pending: Vec<u8>,
}

impl FpStream {
    /// A stream starting from the fingerprint of the empty string.
    pub fn new() -> Self {
        Self { tag: Tag::empty(), pending: Vec::with_capacity(8) }
    }

    /// A stream that continues extending a previously computed tag.
    pub fn with_tag(tag: Tag) -> Self {
        Self { tag, pending: Vec::with_capacity(8) }
    }

    /// Writes `data` into the stream, extending the tag by any complete
    /// words immediately and buffering the remainder.
    pub fn write(&mut self, mut data: &[u8]) {
        if !self.pending.is_empty() {
            let need = 8 - self.pending.len();
            let take = need.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() == 8 {
                self.tag.extend(&self.pending);
                self.pending.clear();
            } else {
                return;
            }
        }

        let full_words = (data.len() / 8) * 8;
        if full_words > 0 {
            self.tag.extend(&data[..full_words]);
        }
        self.pending.extend_from_slice(&data[full_words..]);
    }

    /// Folds any buffered tail into the tag and returns it. Idempotent:
    /// calling it again without further writes returns the same tag.
    pub fn tag(&mut self) -> Tag {
        if !self.pending.is_empty() {
            self.tag.extend(&self.pending);
            self.pending.clear();
        }
        self.tag
    }
}

impl Default for FpStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for FpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        FpStream::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.tag();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::Tag;

    #[test]
    fn streaming_matches_whole_string_for_any_split() {
        let s = b"the quick brown fox jumps over the lazy dog, repeatedly";
        let whole = Tag::new(s);

        for chunk_len in [1usize, 2, 3, 7, 8, 9, 16, 64] {
            let mut stream = FpStream::new();
            for chunk in s.chunks(chunk_len) {
                stream.write(chunk);
            }
            assert_eq!(stream.tag(), whole, "chunk_len={chunk_len}");
        }
    }

    #[test]
    fn grouping_of_writes_does_not_matter() {
        let mut a = FpStream::new();
        a.write(b"abc");
        a.write(b"def");

        let mut b = FpStream::new();
        b.write(b"ab");
        b.write(b"cd");
        b.write(b"ef");

        assert_eq!(a.tag(), b.tag());
        assert_eq!(a.tag(), Tag::new(b"abcdef"));
    }

    #[test]
    fn flush_is_idempotent() {
        let mut s = FpStream::new();
        s.write(b"partial");
        let t1 = s.tag();
        let t2 = s.tag();
        assert_eq!(t1, t2);
    }
}
