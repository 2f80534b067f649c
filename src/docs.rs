// RetailOps Gateway - Knowledge Index
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Markdown section index over the docs directory. Sections get stable
// ids (doc:<stem>#section-N) and canonical URLs so answers cite real
// anchors. Backs the search/fetch READ tools; loaded once at startup.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const CANONICAL_DOC_ROOT: &str = "https://retailnext.internal/docs";

/// Doc stems whose public slug differs from the lowercased stem.
const SLUG_OVERRIDES: &[(&str, &str)] = &[
    ("Returns_and_Holds_Policy", "returns"),
    ("Associate_Playbook", "associate-playbook"),
    ("Merch_Transfer_Playbook", "merch-transfer-playbook"),
    ("Support_Runbook", "support-runbook"),
    ("Styling_Guide_Spring_2026", "styling-guide-spring-2026"),
];

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeSection {
    pub id: String,
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Search hit: id + title + url, content withheld until fetch.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Immutable section index, keyed by stable section id.
pub struct DocsIndex {
    sections: BTreeMap<String, KnowledgeSection>,
}

impl DocsIndex {
    /// Index every *.md file in the docs directory. Missing directory is
    /// an empty index — the write tools don't depend on docs being mounted.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut sections = BTreeMap::new();
        if !dir.is_dir() {
            log::warn!("docs dir {:?} not found, knowledge index is empty", dir);
            return Ok(Self { sections });
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("reading docs dir {:?}", dir))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        for path in paths {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading doc {:?}", path))?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            for section in parse_sections(&stem, &text) {
                sections.insert(section.id.clone(), section);
            }
        }

        log::info!("knowledge index loaded: {} sections", sections.len());
        Ok(Self { sections })
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Rank sections by query-term occurrence count, with a bonus for an
    /// exact phrase hit. Ties break on section id for stable output.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        let terms = tokenize(&needle);

        let mut scored: Vec<(usize, &KnowledgeSection)> = Vec::new();
        for section in self.sections.values() {
            let haystack = format!("{}\n{}", section.title, section.content).to_lowercase();
            let mut score = if terms.is_empty() {
                1
            } else {
                terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum()
            };
            if !needle.is_empty() && haystack.contains(&needle) {
                score += 2;
            }
            if score > 0 {
                scored.push((score, section));
            }
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, s)| SearchHit {
                id: s.id.clone(),
                title: s.title.clone(),
                url: s.url.clone(),
            })
            .collect()
    }

    pub fn fetch(&self, id: &str) -> Option<&KnowledgeSection> {
        self.sections.get(id)
    }
}

fn doc_slug(stem: &str) -> String {
    SLUG_OVERRIDES
        .iter()
        .find(|(s, _)| *s == stem)
        .map(|(_, slug)| (*slug).to_string())
        .unwrap_or_else(|| stem.to_lowercase().replace('_', "-"))
}

fn doc_title(stem: &str) -> String {
    stem.replace('_', " ")
}

/// Markdown ATX heading: 1-6 '#' then whitespace then content.
fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return false;
    }
    trimmed[hashes..].trim_start() != "" && trimmed.chars().nth(hashes).is_some_and(char::is_whitespace)
}

fn heading_text(line: &str) -> String {
    line.trim_start().trim_start_matches('#').trim().to_string()
}

/// Split one document into sections, one per heading. A heading-free
/// document becomes a single section so it stays citable.
fn parse_sections(stem: &str, text: &str) -> Vec<KnowledgeSection> {
    let slug = doc_slug(stem);
    let lines: Vec<&str> = text.lines().collect();
    let heading_indices: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_heading(l))
        .map(|(i, _)| i)
        .collect();

    if heading_indices.is_empty() {
        return vec![KnowledgeSection {
            id: format!("doc:{}#section-1", stem),
            title: doc_title(stem),
            url: format!("{}/{}#section-1", CANONICAL_DOC_ROOT, slug),
            content: text.trim().to_string(),
        }];
    }

    let mut sections = Vec::with_capacity(heading_indices.len());
    for (number, &start) in heading_indices.iter().enumerate() {
        let section_number = number + 1;
        let end = heading_indices.get(number + 1).copied().unwrap_or(lines.len());
        let content = lines[start..end].join("\n").trim().to_string();
        sections.push(KnowledgeSection {
            id: format!("doc:{}#section-{}", stem, section_number),
            title: format!("{}: {}", doc_title(stem), heading_text(lines[start])),
            url: format!("{}/{}#section-{}", CANONICAL_DOC_ROOT, slug, section_number),
            content,
        });
    }
    sections
}

fn tokenize(lowercased: &str) -> Vec<String> {
    lowercased
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture_index() -> DocsIndex {
        let dir = tempfile::tempdir().unwrap();
        let mut returns = std::fs::File::create(dir.path().join("Returns_and_Holds_Policy.md")).unwrap();
        writeln!(
            returns,
            "# Returns\nItems return within 30 days.\n\n## Store Holds\nStore holds last 48 hours, one extension allowed."
        )
        .unwrap();
        let mut runbook = std::fs::File::create(dir.path().join("Support_Runbook.md")).unwrap();
        writeln!(runbook, "No headings here, just escalation steps for outages.").unwrap();
        DocsIndex::load(dir.path()).unwrap()
    }

    #[test]
    fn sections_get_stable_ids_and_canonical_urls() {
        let index = fixture_index();
        let section = index.fetch("doc:Returns_and_Holds_Policy#section-2").unwrap();
        assert_eq!(section.url, "https://retailnext.internal/docs/returns#section-2");
        assert!(section.title.contains("Store Holds"));
        assert!(section.content.to_lowercase().contains("48 hours"));
    }

    #[test]
    fn heading_free_doc_is_one_section() {
        let index = fixture_index();
        let section = index.fetch("doc:Support_Runbook#section-1").unwrap();
        assert_eq!(section.title, "Support Runbook");
        assert!(section.content.contains("escalation"));
    }

    #[test]
    fn search_ranks_matching_sections_first() {
        let index = fixture_index();
        let hits = index.search("store holds duration", 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "doc:Returns_and_Holds_Policy#section-2");
        assert!(hits[0].id.starts_with("doc:"));
        assert!(hits[0].id.contains("#section-"));
    }

    #[test]
    fn search_with_no_match_is_empty() {
        let index = fixture_index();
        assert!(index.search("quantum chromodynamics", 5).is_empty());
    }

    #[test]
    fn unknown_id_fetches_nothing() {
        let index = fixture_index();
        assert!(index.fetch("doc:Nope#section-9").is_none());
    }

    #[test]
    fn missing_docs_dir_yields_empty_index() {
        let index = DocsIndex::load(Path::new("/definitely/not/here")).unwrap();
        assert_eq!(index.section_count(), 0);
        assert!(index.search("anything", 5).is_empty());
    }
}
