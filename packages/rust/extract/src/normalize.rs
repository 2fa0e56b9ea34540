//! Section tree validation and repair.
//!
//! The normalizer rewrites the raw extracted tree so that every child's
//! heading level is exactly one more than its parent's, assigns stable slug
//! ids, and strips empty sections. Given the same raw tree it produces
//! byte-identical output, and normalizing an already-normalized tree is the
//! identity.
//!
//! The rewrite runs over an id-addressed arena (flat node vector,
//! parent/child relations as indices) rather than chasing owned pointers,
//! which also gives a natural place to reject runaway nesting.

use sha2::{Digest, Sha256};

use certcorpus_shared::{CodeBlock, CorpusError, Result, Section};

/// Nesting deeper than this is treated as a structurally broken tree.
const MAX_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

struct ArenaNode {
    heading: String,
    heading_level: u8,
    content: String,
    code_blocks: Vec<CodeBlock>,
    children: Vec<usize>,
}

struct Arena {
    nodes: Vec<ArenaNode>,
    roots: Vec<usize>,
}

impl Arena {
    fn from_sections(sections: Vec<Section>) -> Result<Self> {
        let mut arena = Arena {
            nodes: Vec::new(),
            roots: Vec::new(),
        };
        for section in sections {
            let id = arena.intern(section, 0)?;
            arena.roots.push(id);
        }
        Ok(arena)
    }

    fn intern(&mut self, section: Section, depth: usize) -> Result<usize> {
        if depth >= MAX_DEPTH {
            return Err(CorpusError::normalization(format!(
                "section tree exceeds maximum depth {MAX_DEPTH}"
            )));
        }
        if section.heading_level == 0 {
            return Err(CorpusError::normalization(format!(
                "section {:?} has heading level 0",
                section.heading
            )));
        }
        let Section {
            heading,
            heading_level,
            content,
            code_blocks,
            subsections,
            ..
        } = section;

        let id = self.nodes.len();
        self.nodes.push(ArenaNode {
            heading,
            heading_level,
            content,
            code_blocks,
            children: Vec::new(),
        });
        for sub in subsections {
            let child = self.intern(sub, depth + 1)?;
            self.nodes[id].children.push(child);
        }
        Ok(id)
    }

    /// Enforce `child.level == parent.level + 1` everywhere. Nodes keep
    /// their parent; only the level is rewritten (ancestors are never
    /// invented), so an H4 directly under an H2 becomes a level-3 child.
    fn repair_levels(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            self.repair_below(root);
        }
    }

    fn repair_below(&mut self, id: usize) {
        let parent_level = self.nodes[id].heading_level;
        let children = self.nodes[id].children.clone();
        for child in children {
            if self.nodes[child].heading_level != parent_level + 1 {
                self.nodes[child].heading_level = parent_level + 1;
            }
            self.repair_below(child);
        }
    }

    /// Drop sections with no body text, no code blocks, and no surviving
    /// children. The document root survives even when empty.
    fn strip_empty(&mut self) {
        let roots = self.roots.clone();
        let kept: Vec<usize> = roots.into_iter().filter(|&r| self.keep(r)).collect();
        if kept.is_empty() {
            // Keep the (synthetic) document root rather than emptying the tree.
            self.roots.truncate(1);
            if let Some(&root) = self.roots.first() {
                self.nodes[root].children.clear();
            }
        } else {
            self.roots = kept;
        }
    }

    fn keep(&mut self, id: usize) -> bool {
        let children = self.nodes[id].children.clone();
        let surviving: Vec<usize> = children.into_iter().filter(|&c| self.keep(c)).collect();
        let keep = !self.nodes[id].content.trim().is_empty()
            || !self.nodes[id].code_blocks.is_empty()
            || !surviving.is_empty();
        self.nodes[id].children = surviving;
        keep
    }

    fn rebuild(&self) -> Vec<Section> {
        let mut out = Vec::with_capacity(self.roots.len());
        let mut used = std::collections::HashMap::new();
        for &root in &self.roots {
            out.push(self.rebuild_node(root, &mut used, ""));
        }
        out
    }

    fn rebuild_node(
        &self,
        id: usize,
        used: &mut std::collections::HashMap<String, u32>,
        scope: &str,
    ) -> Section {
        let node = &self.nodes[id];
        let base = slugify(&node.heading);
        // Disambiguate duplicate headings among siblings: slug, slug-2, …
        let key = format!("{scope}/{base}");
        let count = {
            let n = used.entry(key).or_insert(0);
            *n += 1;
            *n
        };
        let section_id = if count == 1 {
            base
        } else {
            format!("{}-{count}", slugify(&node.heading))
        };

        // Children disambiguate within this node only, so sibling subtrees
        // with identical heading paths never collide.
        let child_scope = format!("{scope}/{section_id}");
        let mut subsections = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            subsections.push(self.rebuild_node(child, used, &child_scope));
        }

        Section {
            section_id,
            heading: node.heading.clone(),
            heading_level: node.heading_level,
            content: node.content.clone(),
            code_blocks: node.code_blocks.clone(),
            subsections,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Normalize a raw section tree: repair heading levels, strip empty
/// sections, and assign stable section ids.
pub fn normalize(sections: Vec<Section>) -> Result<Vec<Section>> {
    if sections.is_empty() {
        return Err(CorpusError::normalization("document has no sections"));
    }
    let mut arena = Arena::from_sections(sections)?;
    arena.repair_levels();
    arena.strip_empty();
    Ok(arena.rebuild())
}

/// SHA-256 of the canonical JSON encoding of a normalized tree.
///
/// Used for change detection: a re-scrape whose markup churns without
/// affecting extracted content hashes identically and short-circuits the
/// rest of the pipeline.
pub fn content_hash(sections: &[Section]) -> String {
    let canonical = serde_json::to_vec(sections).expect("section tree serializes");
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    format!("{:x}", hasher.finalize())
}

/// Generate a URL-safe slug from a heading.
pub fn slugify(heading: &str) -> String {
    let slug = heading
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { "section".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(heading: &str, level: u8, content: &str) -> Section {
        Section {
            section_id: String::new(),
            heading: heading.into(),
            heading_level: level,
            content: content.into(),
            code_blocks: vec![],
            subsections: vec![],
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut first = section("First", 2, "text");
        first.subsections.push(section("Deep", 4, "deep text"));
        let raw = vec![first, section("Second", 2, "more")];

        let once = normalize(raw).expect("normalize");
        let twice = normalize(once.clone()).expect("normalize again");
        assert_eq!(once, twice);
        assert_eq!(content_hash(&once), content_hash(&twice));
    }

    #[test]
    fn h2_h4_h2_clamps_the_skipped_level() {
        // Raw shape from the extractor for the heading sequence H2→H4→H2.
        let mut first = section("First", 2, "a");
        first.subsections.push(section("Skipped", 4, "b"));
        let raw = vec![first, section("Second", 2, "c")];

        let normalized = normalize(raw).expect("normalize");

        // The H4 stays a direct child of the first H2, at level 3.
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].heading, "First");
        assert_eq!(normalized[0].subsections.len(), 1);
        let child = &normalized[0].subsections[0];
        assert_eq!(child.heading, "Skipped");
        assert_eq!(child.heading_level, 3);
        assert_eq!(normalized[1].heading, "Second");
        assert_eq!(normalized[1].heading_level, 2);
    }

    #[test]
    fn duplicate_sibling_headings_get_suffixes() {
        let raw = vec![
            section("Example", 2, "one"),
            section("Example", 2, "two"),
            section("Example", 2, "three"),
        ];
        let normalized = normalize(raw).expect("normalize");
        let ids: Vec<&str> = normalized.iter().map(|s| s.section_id.as_str()).collect();
        assert_eq!(ids, vec!["example", "example-2", "example-3"]);
    }

    #[test]
    fn duplicate_headings_in_different_scopes_do_not_collide() {
        let mut a = section("Behavior", 2, "a");
        a.subsections.push(section("Details", 3, "x"));
        let mut b = section("Syntax", 2, "b");
        b.subsections.push(section("Details", 3, "y"));

        let normalized = normalize(vec![a, b]).expect("normalize");
        assert_eq!(normalized[0].subsections[0].section_id, "details");
        assert_eq!(normalized[1].subsections[0].section_id, "details");
    }

    #[test]
    fn empty_sections_are_stripped() {
        let mut parent = section("Parent", 2, "");
        parent.subsections.push(section("Empty child", 3, ""));
        parent.subsections.push(section("Full child", 3, "kept"));
        let raw = vec![parent, section("Empty sibling", 2, "")];

        let normalized = normalize(raw).expect("normalize");
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].subsections.len(), 1);
        assert_eq!(normalized[0].subsections[0].heading, "Full child");
    }

    #[test]
    fn all_empty_tree_keeps_document_root() {
        let raw = vec![section("Root", 2, "")];
        let normalized = normalize(raw).expect("normalize");
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].section_id, "root");
    }

    #[test]
    fn runaway_nesting_is_a_normalization_error() {
        let mut node = section("Leaf", 70, "x");
        for i in (1..=69).rev() {
            let mut parent = section(&format!("Level {i}"), i.min(255) as u8, "");
            parent.subsections.push(node);
            node = parent;
        }
        let err = normalize(vec![node]).unwrap_err();
        assert_eq!(err.kind_tag(), "normalization");
    }

    #[test]
    fn code_only_section_survives() {
        let mut sec = section("Syntax", 2, "");
        sec.code_blocks.push(CodeBlock::plain("db.c.find()"));
        let normalized = normalize(vec![sec]).expect("normalize");
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].code_blocks.len(), 1);
    }

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let a = vec![section("S", 2, "text")];
        let b = vec![section("S", 2, "text")];
        let c = vec![section("S", 2, "different")];
        let (a, b, c) = (
            normalize(a).unwrap(),
            normalize(b).unwrap(),
            normalize(c).unwrap(),
        );
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn slugify_examples() {
        assert_eq!(slugify("Write Concern"), "write-concern");
        assert_eq!(slugify("db.collection.insertOne()"), "db-collection-insertone");
        assert_eq!(slugify("  "), "section");
    }
}
