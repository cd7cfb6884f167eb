//! Git unified diff rendering
//!
//! Produces the same text as go-git's unified encoder: extended headers
//! (`old mode`, `new file mode`, `rename from`, `index`), `---`/`+++` lines,
//! and hunks with three lines of context.

use std::io::Write;

use crate::hash::ObjectHash;
use crate::patch::{Chunk, ChunkOp, FilePatch, Patch, PatchSink};
use crate::{Error, Result};

pub const DEFAULT_CONTEXT_LINES: usize = 3;

const SRC_PREFIX: &str = "a/";
const DST_PREFIX: &str = "b/";
const DEV_NULL: &str = "/dev/null";

/// Writes patches as git unified diff text.
///
/// Each patch is rendered in full before anything is written, so a failed
/// encode never leaves half a patch in the output.
#[derive(Debug)]
pub struct UnifiedEncoder<W> {
    out: W,
    context_lines: usize,
}

impl<W: Write> UnifiedEncoder<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    pub fn with_context_lines(mut self, context_lines: usize) -> Self {
        self.context_lines = context_lines;
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PatchSink for UnifiedEncoder<W> {
    fn encode(&mut self, patch: &Patch) -> Result<()> {
        let rendered = render(patch, self.context_lines);
        self.out.write_all(&rendered).map_err(Error::Output)
    }
}

/// Render `patch` as unified diff bytes.
pub fn render(patch: &Patch, context_lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    if !patch.message.is_empty() {
        out.extend_from_slice(patch.message.as_bytes());
        if !patch.message.ends_with('\n') {
            out.push(b'\n');
        }
    }
    for file_patch in &patch.file_patches {
        write_header(&mut out, file_patch);
        for hunk in HunkBuilder::new(&file_patch.chunks, context_lines).build() {
            hunk.write_to(&mut out);
        }
    }
    out
}

fn write_header(out: &mut Vec<u8>, file_patch: &FilePatch) {
    let binary = file_patch.is_binary;
    let mut lines = Vec::new();

    match (&file_patch.from, &file_patch.to) {
        (None, None) => return,
        (Some(from), Some(to)) => {
            lines.push(format!(
                "diff --git {SRC_PREFIX}{} {DST_PREFIX}{}",
                from.path, to.path
            ));
            if from.mode != to.mode {
                lines.push(format!("old mode {}", from.mode));
                lines.push(format!("new mode {}", to.mode));
            }
            if from.path != to.path {
                lines.push(format!("rename from {}", from.path));
                lines.push(format!("rename to {}", to.path));
            }
            if from.hash != to.hash {
                if from.mode != to.mode {
                    lines.push(format!("index {}..{}", from.hash, to.hash));
                } else {
                    lines.push(format!("index {}..{} {}", from.hash, to.hash, from.mode));
                }
                push_path_lines(
                    &mut lines,
                    &format!("{SRC_PREFIX}{}", from.path),
                    &format!("{DST_PREFIX}{}", to.path),
                    binary,
                );
            }
        }
        (None, Some(to)) => {
            lines.push(format!(
                "diff --git {SRC_PREFIX}{} {DST_PREFIX}{}",
                to.path, to.path
            ));
            lines.push(format!("new file mode {}", to.mode));
            lines.push(format!("index {}..{}", ObjectHash::ZERO, to.hash));
            push_path_lines(&mut lines, DEV_NULL, &format!("{DST_PREFIX}{}", to.path), binary);
        }
        (Some(from), None) => {
            lines.push(format!(
                "diff --git {SRC_PREFIX}{} {DST_PREFIX}{}",
                from.path, from.path
            ));
            lines.push(format!("deleted file mode {}", from.mode));
            lines.push(format!("index {}..{}", from.hash, ObjectHash::ZERO));
            push_path_lines(&mut lines, &format!("{SRC_PREFIX}{}", from.path), DEV_NULL, binary);
        }
    }

    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
}

fn push_path_lines(lines: &mut Vec<String>, from: &str, to: &str, binary: bool) {
    if binary {
        lines.push(format!("Binary files {from} and {to} differ"));
    } else {
        lines.push(format!("--- {from}"));
        lines.push(format!("+++ {to}"));
    }
}

/// Lines of `content`, each keeping its `\n`; the last may lack one.
fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    content.split_inclusive(|&b| b == b'\n').collect()
}

struct Hunk<'a> {
    from_line: usize,
    to_line: usize,
    from_count: usize,
    to_count: usize,
    /// The line preceding the hunk's leading context, shown after `@@`.
    section: &'a [u8],
    lines: Vec<(ChunkOp, &'a [u8])>,
}

impl<'a> Hunk<'a> {
    fn new(section: &'a [u8]) -> Self {
        Self {
            from_line: 0,
            to_line: 0,
            from_count: 0,
            to_count: 0,
            section: section.strip_suffix(b"\n").unwrap_or(section),
            lines: Vec::new(),
        }
    }

    fn push(&mut self, op: ChunkOp, lines: &[&'a [u8]]) {
        match op {
            ChunkOp::Add => self.to_count += lines.len(),
            ChunkOp::Delete => self.from_count += lines.len(),
            ChunkOp::Equal => {
                self.from_count += lines.len();
                self.to_count += lines.len();
            }
        }
        self.lines.extend(lines.iter().map(|&line| (op, line)));
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"@@ -");
        write_range(out, self.from_line, self.from_count);
        out.extend_from_slice(b" +");
        write_range(out, self.to_line, self.to_count);
        out.extend_from_slice(b" @@");
        if !self.section.is_empty() {
            out.push(b' ');
            out.extend_from_slice(self.section);
        }
        out.push(b'\n');

        for &(op, line) in &self.lines {
            out.push(match op {
                ChunkOp::Equal => b' ',
                ChunkOp::Add => b'+',
                ChunkOp::Delete => b'-',
            });
            match line.strip_suffix(b"\n") {
                Some(text) => out.extend_from_slice(text),
                None => {
                    out.extend_from_slice(line);
                    out.extend_from_slice(b"\n\\ No newline at end of file");
                }
            }
            out.push(b'\n');
        }
    }
}

fn write_range(out: &mut Vec<u8>, start: usize, count: usize) {
    let range = if count == 1 {
        start.to_string()
    } else {
        format!("{start},{count}")
    };
    out.extend_from_slice(range.as_bytes());
}

/// Groups chunks into hunks, keeping `context` equal lines around changes
/// and splitting wherever more than twice that many equal lines separate
/// two changes.
struct HunkBuilder<'a> {
    chunks: &'a [Chunk],
    context: usize,
    from_line: usize,
    to_line: usize,
    current: Option<Hunk<'a>>,
    hunks: Vec<Hunk<'a>>,
    before: Vec<&'a [u8]>,
    after: Vec<&'a [u8]>,
}

impl<'a> HunkBuilder<'a> {
    fn new(chunks: &'a [Chunk], context: usize) -> Self {
        Self {
            chunks,
            context,
            from_line: 0,
            to_line: 0,
            current: None,
            hunks: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    fn build(mut self) -> Vec<Hunk<'a>> {
        let chunks = self.chunks;
        for (i, chunk) in chunks.iter().enumerate() {
            let lines = split_lines(&chunk.content);
            let n = lines.len();

            match chunk.op {
                ChunkOp::Equal => {
                    self.from_line += n;
                    self.to_line += n;
                    self.push_equal(lines, i);
                }
                ChunkOp::Delete => {
                    if n != 0 {
                        self.from_line += 1;
                    }
                    self.start_hunk(i, ChunkOp::Delete);
                    self.from_line += n.saturating_sub(1);
                    if let Some(hunk) = self.current.as_mut() {
                        hunk.push(ChunkOp::Delete, &lines);
                    }
                }
                ChunkOp::Add => {
                    if n != 0 {
                        self.to_line += 1;
                    }
                    self.start_hunk(i, ChunkOp::Add);
                    self.to_line += n.saturating_sub(1);
                    if let Some(hunk) = self.current.as_mut() {
                        hunk.push(ChunkOp::Add, &lines);
                    }
                }
            }

            if i == chunks.len() - 1
                && let Some(hunk) = self.current.take()
            {
                self.hunks.push(hunk);
            }
        }
        self.hunks
    }

    fn start_hunk(&mut self, i: usize, op: ChunkOp) {
        if self.current.is_some() {
            return;
        }

        let mut lines_before = self.before.len();
        let mut section: &'a [u8] = b"";
        if lines_before > self.context {
            section = self.before[lines_before - self.context - 1];
            self.before.drain(..lines_before - self.context);
            lines_before = self.context;
        }

        let mut hunk = Hunk::new(section);
        hunk.push(ChunkOp::Equal, &self.before);
        match op {
            ChunkOp::Delete => {
                (hunk.from_line, hunk.to_line) =
                    self.start_lines(self.from_line, self.to_line, lines_before, i, ChunkOp::Add);
            }
            ChunkOp::Add => {
                (hunk.to_line, hunk.from_line) =
                    self.start_lines(self.to_line, self.from_line, lines_before, i, ChunkOp::Delete);
            }
            ChunkOp::Equal => {}
        }

        self.before.clear();
        self.current = Some(hunk);
    }

    /// Starting line numbers for a hunk opened by a change on side `a`;
    /// `other` is the operation that would advance side `b`.
    fn start_lines(&self, a: usize, b: usize, lines_before: usize, i: usize, other: ChunkOp) -> (usize, usize) {
        let start_a = a.saturating_sub(lines_before);
        let start_b = if lines_before != 0 && self.context != 0 {
            if b > self.context {
                b - self.context + 1
            } else {
                1
            }
        } else if self.context == 0 {
            b
        } else {
            match self.chunks.get(i + 1) {
                Some(next) if next.op == other || next.op == ChunkOp::Equal => b + 1,
                _ => 0,
            }
        };
        (start_a, start_b)
    }

    fn push_equal(&mut self, lines: Vec<&'a [u8]>, i: usize) {
        let Some(hunk) = self.current.as_mut() else {
            self.before.extend(lines);
            return;
        };

        self.after.extend(lines);
        if self.after.len() <= self.context * 2 && i != self.chunks.len() - 1 {
            hunk.push(ChunkOp::Equal, &self.after);
            self.after.clear();
        } else {
            let keep = self.context.min(self.after.len());
            hunk.push(ChunkOp::Equal, &self.after[..keep]);
            if let Some(done) = self.current.take() {
                self.hunks.push(done);
            }
            self.before = self.after.split_off(keep);
            self.after.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::FileMode;
    use crate::patch::PatchFile;
    use crate::textdiff::diff_chunks;

    fn modified(path: &str, from: &[u8], to: &[u8]) -> Patch {
        FilePatch {
            from: Some(PatchFile::new(path, FileMode::Regular, ObjectHash::of_blob(from))),
            to: Some(PatchFile::new(path, FileMode::Regular, ObjectHash::of_blob(to))),
            is_binary: false,
            chunks: diff_chunks(from, to),
        }
        .into()
    }

    fn rendered(patch: &Patch) -> String {
        String::from_utf8(render(patch, DEFAULT_CONTEXT_LINES)).unwrap()
    }

    #[test]
    fn single_line_change() {
        let patch = modified("file", b"a\nb\nc\n", b"a\nB\nc\n");
        insta::assert_snapshot!(rendered(&patch), @r"
        diff --git a/file b/file
        index de980441c3ab03a8c07dda1ad27b8a11f39deb1e..7be73ce3c1b1cdaea86e8168dfee8575175953bf 100644
        --- a/file
        +++ b/file
        @@ -1,3 +1,3 @@
         a
        -b
        +B
         c
        ");
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let from: String = (1..=20).map(|i| format!("{i}\n")).collect();
        let to: String = (1..=20)
            .map(|i| match i {
                2 => "two\n".to_string(),
                19 => "nineteen\n".to_string(),
                _ => format!("{i}\n"),
            })
            .collect();
        let patch = modified("numbers", from.as_bytes(), to.as_bytes());
        let text = rendered(&patch);

        let headers: Vec<&str> = text.lines().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(headers, vec!["@@ -1,5 +1,5 @@", "@@ -16,5 +16,5 @@ 15"]);
    }

    #[test]
    fn missing_trailing_newline_is_marked() {
        let patch = modified("f", b"old", b"new");
        let text = rendered(&patch);
        assert!(text.ends_with(
            "@@ -1 +1 @@\n-old\n\\ No newline at end of file\n+new\n\\ No newline at end of file\n"
        ));
    }

    #[test]
    fn binary_patch_has_no_hunks() {
        let mut patch = modified("blob", b"\x00\x01", b"\x00\x02");
        patch.file_patches[0].is_binary = true;
        patch.file_patches[0].chunks.clear();

        let text = rendered(&patch);
        assert!(text.ends_with("Binary files a/blob and b/blob differ\n"));
        assert!(!text.contains("@@"));
    }

    #[test]
    fn message_is_written_first() {
        let mut patch = modified("f", b"x\n", b"y\n");
        patch.message = "summary".to_string();
        assert!(rendered(&patch).starts_with("summary\ndiff --git a/f b/f\n"));
    }

    #[test]
    fn encode_writes_to_output() {
        let mut encoder = UnifiedEncoder::new(Vec::new());
        encoder.encode(&modified("f", b"x\n", b"y\n")).unwrap();
        encoder.encode(&Patch::default()).unwrap();

        let out = String::from_utf8(encoder.into_inner()).unwrap();
        assert_eq!(out.matches("diff --git").count(), 1);
    }
}
