//! Section tree → retrieval chunks.
//!
//! Traverses a normalized document in document order, accumulating section
//! text into a running buffer and flushing at the configured target size.
//! Splits happen only at block boundaries (headings, paragraphs, whole code
//! blocks); a single block that alone exceeds the maximum size becomes its
//! own chunk flagged `oversized`. Chunk ids are a deterministic function of
//! the document identity and the ordinal index, so an unchanged document
//! reproduces the same id set on every pass.

use sha2::{Digest, Sha256};
use tracing::debug;

use certcorpus_shared::{Chunk, ChunkingConfig, Section, SourceDocument};

/// Separator between blocks inside a chunk (and between chunks when
/// reconstructing the document text from its chunk sequence).
pub const BLOCK_SEPARATOR: &str = "\n\n";

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum BlockKind {
    Heading,
    Paragraph,
    Code,
}

/// One indivisible unit of rendered document text.
#[derive(Debug, Clone)]
struct Block {
    section_id: String,
    heading: String,
    kind: BlockKind,
    text: String,
}

/// Flatten the normalized tree into rendered blocks in document order.
fn collect_blocks(sections: &[Section], out: &mut Vec<Block>) {
    for section in sections {
        out.push(Block {
            section_id: section.section_id.clone(),
            heading: section.heading.clone(),
            kind: BlockKind::Heading,
            text: format!(
                "{} {}",
                "#".repeat(section.heading_level as usize),
                section.heading
            ),
        });
        for paragraph in section.content.split('\n').filter(|p| !p.trim().is_empty()) {
            out.push(Block {
                section_id: section.section_id.clone(),
                heading: section.heading.clone(),
                kind: BlockKind::Paragraph,
                text: paragraph.to_string(),
            });
        }
        for code in &section.code_blocks {
            let lang = code.language.as_deref().unwrap_or_default();
            out.push(Block {
                section_id: section.section_id.clone(),
                heading: section.heading.clone(),
                kind: BlockKind::Code,
                text: format!("```{lang}\n{}\n```", code.code),
            });
        }
        collect_blocks(&section.subsections, out);
    }
}

/// Render the whole document the way the chunker sees it. Concatenating all
/// chunk texts in ordinal order with [`BLOCK_SEPARATOR`] (overlap stripped)
/// reproduces exactly this string.
pub fn render_document(sections: &[Section]) -> String {
    let mut blocks = Vec::new();
    collect_blocks(sections, &mut blocks);
    blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

// ---------------------------------------------------------------------------
// Chunker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PendingChunk {
    blocks: Vec<Block>,
    oversized: bool,
}

impl PendingChunk {
    fn len(&self) -> usize {
        if self.blocks.is_empty() {
            return 0;
        }
        self.blocks.iter().map(|b| b.text.chars().count()).sum::<usize>()
            + BLOCK_SEPARATOR.len() * (self.blocks.len() - 1)
    }

    fn text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR)
    }
}

/// Split a normalized document into an ordered chunk sequence.
///
/// A fresh pass is run per document version; the result is deterministic in
/// document order regardless of concurrency elsewhere in a run.
pub fn chunk_document(doc: &SourceDocument, config: &ChunkingConfig) -> Vec<Chunk> {
    let mut blocks = Vec::new();
    collect_blocks(&doc.sections, &mut blocks);

    let mut pending: Vec<PendingChunk> = Vec::new();
    let mut current = PendingChunk::default();

    for block in blocks {
        let block_len = block.text.chars().count();

        if block_len > config.max_chars {
            // The block cannot be split (whole code block, or a paragraph
            // with no interior boundary): it becomes its own flagged chunk.
            // Its section heading travels with it when it is all we have
            // buffered for that section.
            let mut own = PendingChunk {
                blocks: Vec::new(),
                oversized: true,
            };
            if current
                .blocks
                .last()
                .is_some_and(|b| b.kind == BlockKind::Heading && b.section_id == block.section_id)
            {
                own.blocks.push(current.blocks.pop().expect("checked last"));
            }
            if !current.blocks.is_empty() {
                pending.push(std::mem::take(&mut current));
            }
            own.blocks.push(block);
            pending.push(own);
            continue;
        }

        let would_be = current.len() + BLOCK_SEPARATOR.len() + block_len;
        // Flush at the target size, but never leave an under-min fragment
        // behind unless the max bound forces it.
        if !current.blocks.is_empty()
            && would_be > config.target_chars
            && (current.len() >= config.min_chars || would_be > config.max_chars)
        {
            pending.push(std::mem::take(&mut current));
        }
        current.blocks.push(block);
    }
    if !current.blocks.is_empty() {
        pending.push(current);
    }

    merge_short_tail(&mut pending, config);

    let version = doc.version.as_deref().unwrap_or_default();
    let mut chunks = Vec::with_capacity(pending.len());
    let mut prev_text: Option<String> = None;

    for (ordinal, piece) in pending.iter().enumerate() {
        let mut text = piece.text();
        if config.overlap_chars > 0 {
            if let Some(prev) = &prev_text {
                let tail = overlap_tail(prev, config.overlap_chars);
                if !tail.is_empty() {
                    text = format!("{tail}{BLOCK_SEPARATOR}{text}");
                }
            }
        }
        prev_text = Some(piece.text());

        let mut section_ids = Vec::new();
        let mut headings = Vec::new();
        for block in &piece.blocks {
            if section_ids.last() != Some(&block.section_id) {
                section_ids.push(block.section_id.clone());
                headings.push(block.heading.clone());
            }
        }

        let char_len = text.chars().count();
        chunks.push(Chunk {
            chunk_id: chunk_id(&doc.url, version, ordinal as u32),
            document_url: doc.url.clone(),
            version: doc.version.clone(),
            ordinal: ordinal as u32,
            section_ids,
            headings,
            breadcrumbs: doc.breadcrumbs.clone(),
            doc_type: doc.doc_type,
            text_hash: text_hash(&text),
            char_len,
            oversized: piece.oversized,
            text,
        });
    }

    debug!(
        url = %doc.url,
        chunks = chunks.len(),
        oversized = chunks.iter().filter(|c| c.oversized).count(),
        "chunked document"
    );
    chunks
}

/// Fold a trailing chunk shorter than `min_chars` into its predecessor when
/// the merge stays within bounds and neither side is oversized.
fn merge_short_tail(pending: &mut Vec<PendingChunk>, config: &ChunkingConfig) {
    while pending.len() > 1 {
        let last = pending.last().expect("len > 1");
        let prev = &pending[pending.len() - 2];
        let merged_len = prev.len() + BLOCK_SEPARATOR.len() + last.len();
        if last.oversized
            || prev.oversized
            || last.len() >= config.min_chars
            || merged_len > config.max_chars
        {
            break;
        }
        let tail = pending.pop().expect("len > 1");
        pending
            .last_mut()
            .expect("non-empty")
            .blocks
            .extend(tail.blocks);
    }
}

/// Trailing whole paragraphs of `text` totaling at most `overlap` chars.
fn overlap_tail(text: &str, overlap: usize) -> String {
    let mut taken: Vec<&str> = Vec::new();
    let mut total = 0;
    for part in text.rsplit(BLOCK_SEPARATOR) {
        let len = part.chars().count();
        if total + len > overlap {
            break;
        }
        taken.push(part);
        total += len + BLOCK_SEPARATOR.len();
    }
    taken.reverse();
    taken.join(BLOCK_SEPARATOR)
}

/// `hex(sha256(url ‖ version ‖ ordinal))[..16]` — stable across reruns for
/// unchanged upstream content, so the indexer can detect no-op reindexing.
pub fn chunk_id(url: &str, version: &str, ordinal: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(version.as_bytes());
    hasher.update(b"\n");
    hasher.update(ordinal.to_be_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// SHA-256 of chunk text, compared against the stored record at index time.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
