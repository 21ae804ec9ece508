use std::collections::HashSet;

use serde::Serialize;

use crate::corpus::Candidate;

/// A link the injector added to one article body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedLink {
    pub phrase: String,
    pub target_slug: String,
}

/// Result of injecting one article: the (possibly unchanged) body and the
/// links that were inserted, in insertion order.
#[derive(Debug, Clone)]
pub struct InjectionOutcome {
    pub body: String,
    pub links: Vec<AddedLink>,
}

/// A pre-existing internal link found by the pre-scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingLink {
    pub text: String,
    pub target_slug: String,
}

/// Per-article uniqueness bookkeeping: which targets already have a link and
/// which anchor texts are already in use. Carried as an explicit value so the
/// injector is reentrant across articles.
#[derive(Debug, Default)]
struct LinkRecord {
    targets: HashSet<String>,
    anchors: HashSet<String>,
}

impl LinkRecord {
    fn target_used(&self, slug: &str) -> bool {
        self.targets.contains(slug)
    }

    fn anchor_used(&self, anchor_lower: &str) -> bool {
        self.anchors.contains(anchor_lower)
    }

    fn consume(&mut self, slug: &str, anchor_lower: &str) {
        self.targets.insert(slug.to_string());
        self.anchors.insert(anchor_lower.to_string());
    }
}

/// Rewrite `body` so that candidate phrases become internal links.
///
/// Candidates must already carry the corpus-wide longest-first ordering; the
/// injector attempts them in sequence, inserting at most one occurrence per
/// successful candidate, at most one link per target, and at most one link
/// per anchor text. Existing `<path_prefix>/<slug>` links are consumed during
/// the pre-scan, which makes the whole operation idempotent: running it on
/// its own output changes nothing.
pub fn inject(
    slug: &str,
    body: &str,
    candidates: &[Candidate],
    path_prefix: &str,
) -> InjectionOutcome {
    let prefix = path_prefix.trim_end_matches('/');
    let mut record = LinkRecord::default();
    for existing in scan_existing_links(body, prefix) {
        record.consume(&existing.target_slug, &existing.text.to_lowercase());
    }

    let mut current = body.to_string();
    let mut links = Vec::new();
    for candidate in candidates {
        if candidate.phrase.is_empty() || candidate.target_slug == slug {
            continue;
        }
        if record.target_used(&candidate.target_slug) || record.anchor_used(&candidate.phrase) {
            continue;
        }
        if !current.to_lowercase().contains(&candidate.phrase) {
            continue;
        }
        if let Some(rewritten) = insert_once(&current, &candidate.phrase, &candidate.target_slug, prefix)
        {
            current = rewritten;
            record.consume(&candidate.target_slug, &candidate.phrase);
            links.push(AddedLink {
                phrase: candidate.phrase.clone(),
                target_slug: candidate.target_slug.clone(),
            });
        }
    }

    InjectionOutcome {
        body: current,
        links,
    }
}

/// Find every markdown link whose target starts with `prefix` and return its
/// anchor text plus the trailing slug segment.
pub fn scan_existing_links(body: &str, prefix: &str) -> Vec<ExistingLink> {
    let prefix = prefix.trim_end_matches('/');
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'[' {
            pos += 1;
            continue;
        }
        let Some((text_end, after_bracket)) = matching_bracket(bytes, pos) else {
            pos += 1;
            continue;
        };
        if after_bracket >= bytes.len() || bytes[after_bracket] != b'(' {
            pos = after_bracket;
            continue;
        }
        let Some(url_end) = find_byte(bytes, after_bracket + 1, b')') else {
            pos = after_bracket;
            continue;
        };
        let text = &body[pos + 1..text_end];
        let url = &body[after_bracket + 1..url_end];
        if let Some(slug) = slug_from_url(url, prefix) {
            out.push(ExistingLink {
                text: text.to_string(),
                target_slug: slug,
            });
        }
        pos = url_end + 1;
    }
    out
}

/// Walk forward from an opening `[` to its matching `]`, honoring nesting.
/// Returns the index of the closing bracket and the index just past it.
fn matching_bracket(bytes: &[u8], open: usize) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut pos = open;
    while pos < bytes.len() {
        match bytes[pos] {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some((pos, pos + 1));
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|b| *b == needle).map(|i| from + i)
}

fn slug_from_url(url: &str, prefix: &str) -> Option<String> {
    let rest = url.trim().strip_prefix(prefix)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let slug = rest
        .trim_start_matches('/')
        .split(['#', '?'])
        .next()
        .unwrap_or("")
        .trim_end_matches('/');
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Insert exactly one link for the phrase at the first structurally valid
/// occurrence, or return `None` when no occurrence qualifies.
fn insert_once(body: &str, phrase: &str, target_slug: &str, prefix: &str) -> Option<String> {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut in_fence = false;

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || is_heading(line) || line.starts_with("    ") {
            continue;
        }
        if let Some(rewritten) = link_line(line, phrase, target_slug, prefix) {
            let mut out = Vec::with_capacity(lines.len());
            out.extend_from_slice(&lines[..index]);
            out.push(rewritten.as_str());
            out.extend_from_slice(&lines[index + 1..]);
            return Some(out.join("\n"));
        }
    }
    None
}

/// A heading line starts with one to six `#` followed by whitespace.
fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|ch| *ch == '#').count();
    (1..=6).contains(&hashes)
        && trimmed
            .chars()
            .nth(hashes)
            .is_some_and(|ch| ch.is_whitespace())
}

/// Wrap the first valid occurrence of `phrase` in `line`. The original-case
/// substring becomes the anchor text.
fn link_line(line: &str, phrase: &str, target_slug: &str, prefix: &str) -> Option<String> {
    for (start, end) in match_positions(line, phrase) {
        if bracket_depth(line, start) > 0 {
            // inside an existing link's anchor text
            continue;
        }
        if line[end..].starts_with("](") {
            continue;
        }
        if line[..start].ends_with('(') {
            // likely inside a URL
            continue;
        }
        let anchor = &line[start..end];
        return Some(format!(
            "{}[{}]({}/{}){}",
            &line[..start],
            anchor,
            prefix,
            target_slug,
            &line[end..]
        ));
    }
    None
}

/// Net `[`/`]` nesting depth of the line content before `position`. A
/// positive depth means the position falls inside anchor text.
fn bracket_depth(line: &str, position: usize) -> i32 {
    let mut depth = 0;
    for byte in line.as_bytes()[..position].iter() {
        match byte {
            b'[' => depth += 1,
            b']' => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Byte ranges, on the original line, of case-insensitive occurrences of
/// `phrase` (which is already lowercase). Matching happens on a lowercase
/// projection of the line; each projected character remembers the original
/// byte range it came from so matches map back exactly. Occurrences that cut
/// through a multi-character lowercase expansion are discarded.
fn match_positions(line: &str, phrase: &str) -> Vec<(usize, usize)> {
    if phrase.is_empty() {
        return Vec::new();
    }

    struct LowerPos {
        lower_start: usize,
        lower_len: usize,
        orig_start: usize,
        orig_end: usize,
    }

    let mut lower = String::with_capacity(line.len());
    let mut map: Vec<LowerPos> = Vec::new();
    for (orig_start, ch) in line.char_indices() {
        let orig_end = orig_start + ch.len_utf8();
        for lch in ch.to_lowercase() {
            map.push(LowerPos {
                lower_start: lower.len(),
                lower_len: lch.len_utf8(),
                orig_start,
                orig_end,
            });
            lower.push(lch);
        }
    }

    let mut out = Vec::new();
    let mut from = 0;
    while from <= lower.len().saturating_sub(phrase.len()) {
        let Some(found) = lower[from..].find(phrase) else {
            break;
        };
        let lstart = from + found;
        let lend = lstart + phrase.len();

        let start_entry = map.iter().find(|entry| entry.lower_start == lstart);
        let end_entry = map
            .iter()
            .find(|entry| entry.lower_start + entry.lower_len == lend);
        if let (Some(start), Some(end)) = (start_entry, end_entry) {
            out.push((start.orig_start, end.orig_end));
        }
        // step one full character so the next search starts on a boundary
        from = lstart
            + lower[lstart..]
                .chars()
                .next()
                .map_or(1, |ch| ch.len_utf8());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{inject, match_positions, scan_existing_links};
    use crate::corpus::Candidate;

    const PREFIX: &str = "/de/blog";

    fn candidate(phrase: &str, target: &str) -> Candidate {
        Candidate {
            phrase: phrase.to_string(),
            target_slug: target.to_string(),
        }
    }

    #[test]
    fn inserts_first_occurrence_with_original_case() {
        let body = "Wir bieten die beste Birria Tacos Erfahrung der Stadt.";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(
            outcome.body,
            "Wir bieten die beste [Birria Tacos](/de/blog/tacos) Erfahrung der Stadt."
        );
        assert_eq!(outcome.links.len(), 1);
        assert_eq!(outcome.links[0].target_slug, "tacos");
    }

    #[test]
    fn injection_is_idempotent() {
        let body = "Unsere birria tacos sind beliebt.\n\nMehr birria tacos gibt es morgen.";
        let candidates = [candidate("birria tacos", "tacos")];
        let once = inject("self", body, &candidates, PREFIX);
        let twice = inject("self", &once.body, &candidates, PREFIX);
        assert_eq!(once.body, twice.body);
        assert!(twice.links.is_empty());
        assert_eq!(once.body.matches("](/de/blog/tacos)").count(), 1);
    }

    #[test]
    fn self_targets_are_never_linked() {
        let body = "birria tacos hier";
        let outcome = inject("tacos", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(outcome.body, body);
        assert!(outcome.links.is_empty());
    }

    #[test]
    fn at_most_one_link_per_target() {
        let body = "birria tacos und birria spezialitäten";
        let candidates = [
            candidate("birria spezialitäten", "tacos"),
            candidate("birria tacos", "tacos"),
        ];
        let outcome = inject("self", body, &candidates, PREFIX);
        assert_eq!(outcome.links.len(), 1);
        assert_eq!(outcome.links[0].phrase, "birria spezialitäten");
    }

    #[test]
    fn at_most_one_link_per_anchor_text() {
        let body = "birria tacos links, birria tacos rechts";
        let candidates = [
            candidate("birria tacos", "tacos-a"),
            candidate("birria tacos", "tacos-b"),
        ];
        let outcome = inject("self", body, &candidates, PREFIX);
        assert_eq!(outcome.links.len(), 1);
        assert_eq!(outcome.links[0].target_slug, "tacos-a");
        assert_eq!(outcome.body.matches("](/de/blog/").count(), 1);
    }

    #[test]
    fn fenced_code_is_untouched() {
        let body = "```\nbirria tacos im code\n```\n";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(outcome.body, body);
        assert!(outcome.links.is_empty());
    }

    #[test]
    fn text_after_closed_fence_is_linked() {
        let body = "```\nbirria tacos\n```\nEchte birria tacos danach.";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert!(outcome.body.contains("Echte [birria tacos](/de/blog/tacos) danach."));
        assert!(outcome.body.starts_with("```\nbirria tacos\n```\n"));
    }

    #[test]
    fn headings_are_untouched() {
        let body = "## Birria Tacos\n\nText über birria tacos hier.";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert!(outcome.body.starts_with("## Birria Tacos\n"));
        assert!(outcome.body.contains("Text über [birria tacos](/de/blog/tacos) hier."));
    }

    #[test]
    fn indented_code_is_untouched() {
        let body = "    birria tacos eingerückt\nbirria tacos normal";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(
            outcome.body,
            "    birria tacos eingerückt\n[birria tacos](/de/blog/tacos) normal"
        );
    }

    #[test]
    fn match_inside_existing_anchor_text_is_skipped() {
        let body = "[leckere birria tacos](https://example.org) und birria tacos pur";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(
            outcome.body,
            "[leckere birria tacos](https://example.org) und [birria tacos](/de/blog/tacos) pur"
        );
    }

    #[test]
    fn match_directly_inside_url_is_skipped() {
        let body = "Siehe (birria tacos) Klammern";
        // the '(' guard refuses the position right after an open paren
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(outcome.body, body);
    }

    #[test]
    fn prescan_consumes_existing_target_and_anchor() {
        let body = "Schon verlinkt: [Birria Tacos](/de/blog/tacos). Neues über quesadillas folgt.";
        let candidates = [
            candidate("birria tacos", "tacos"),
            candidate("quesadillas rezept", "quesadillas"),
        ];
        let outcome = inject("self", body, &candidates, PREFIX);
        // target "tacos" is consumed; the second phrase does not occur
        assert_eq!(outcome.body, body);
        assert!(outcome.links.is_empty());
    }

    #[test]
    fn prescan_consumes_anchor_text_across_targets() {
        let body = "[birria tacos](/de/blog/other) und noch mehr birria tacos";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        // anchor text already used by the existing link, even for another target
        assert_eq!(outcome.body, body);
    }

    #[test]
    fn longer_phrases_win_over_shorter_ones() {
        let body = "mexikanische birria tacos sind hier";
        let candidates = [
            candidate("mexikanische birria tacos", "lang"),
            candidate("birria tacos", "kurz"),
        ];
        let outcome = inject("self", body, &candidates, PREFIX);
        assert!(
            outcome
                .body
                .contains("[mexikanische birria tacos](/de/blog/lang)")
        );
        // the shorter phrase now sits inside the new anchor text and is skipped
        assert!(!outcome.body.contains("/de/blog/kurz"));
    }

    #[test]
    fn equal_length_tie_goes_to_earlier_candidate() {
        let body = "birria tacos heute";
        let candidates = [
            candidate("birria tacos", "erster"),
            candidate("birria tacos", "zweiter"),
        ];
        let outcome = inject("self", body, &candidates, PREFIX);
        assert_eq!(outcome.links[0].target_slug, "erster");
        assert_eq!(outcome.links.len(), 1);
    }

    #[test]
    fn absent_phrase_is_skipped_silently() {
        let body = "Hier steht nichts Passendes.";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(outcome.body, body);
        assert!(outcome.links.is_empty());
    }

    #[test]
    fn trailing_newline_is_preserved() {
        let body = "birria tacos\n";
        let outcome = inject("self", body, &[candidate("birria tacos", "tacos")], PREFIX);
        assert_eq!(outcome.body, "[birria tacos](/de/blog/tacos)\n");
    }

    #[test]
    fn scan_existing_links_extracts_prefix_targets() {
        let body = "a [One](/de/blog/one) b [Two](https://x.test/two) c [Three](/de/blog/three#frag)";
        let links = scan_existing_links(body, PREFIX);
        let slugs: Vec<&str> = links.iter().map(|l| l.target_slug.as_str()).collect();
        assert_eq!(slugs, vec!["one", "three"]);
        assert_eq!(links[0].text, "One");
    }

    #[test]
    fn match_positions_maps_back_to_original_case() {
        let positions = match_positions("Viel GEMÜSE Döner", "gemüse döner");
        assert_eq!(positions.len(), 1);
        let (start, end) = positions[0];
        assert_eq!(&"Viel GEMÜSE Döner"[start..end], "GEMÜSE Döner");
    }

    #[test]
    fn match_positions_finds_multiple_occurrences() {
        let positions = match_positions("tacos und Tacos", "tacos");
        assert_eq!(positions.len(), 2);
    }

    #[test]
    fn match_positions_handles_multibyte_phrase_starts() {
        let positions = match_positions("Öl oder öl", "öl");
        assert_eq!(positions.len(), 2);
    }
}
