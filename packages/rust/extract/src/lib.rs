//! Content extraction and section-tree normalization.
//!
//! This crate provides:
//! - [`extractor`] — HTML → raw [`certcorpus_shared::SourceDocument`]
//! - [`normalize`] — tree repair, stable section ids, content hashing

pub mod extractor;
pub mod normalize;

pub use extractor::{classify_url, extract};
pub use normalize::{content_hash, normalize, slugify};

#[cfg(test)]
mod tests {
    use super::*;

    /// Extraction followed by normalization, as the pipeline runs them.
    #[test]
    fn extract_then_normalize_end_to_end() {
        let html = r#"<html><body><main>
            <h1>db.collection.updateOne()</h1>
            <h2>Definition</h2>
            <p>Updates a single document.</p>
            <h4>Deeply Skipped</h4>
            <p>Detail text.</p>
            <h2>Syntax</h2>
            <pre class="language-javascript">db.collection.updateOne(filter, update)</pre>
        </main></body></html>"#;

        let doc = extract(html, "https://docs.example.com/manual/reference/method/db.collection.updateOne/")
            .expect("extract");
        let normalized = normalize(doc.sections).expect("normalize");

        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].section_id, "definition");
        assert_eq!(normalized[0].subsections[0].section_id, "deeply-skipped");
        assert_eq!(normalized[0].subsections[0].heading_level, 3);
        assert_eq!(normalized[1].section_id, "syntax");
        assert_eq!(normalized[1].code_blocks.len(), 1);

        // Normalization output is deterministic across repeated extraction.
        let doc2 = extract(html, "https://docs.example.com/manual/reference/method/db.collection.updateOne/")
            .expect("extract");
        let normalized2 = normalize(doc2.sections).expect("normalize");
        assert_eq!(content_hash(&normalized), content_hash(&normalized2));
    }
}
