use std::collections::BTreeSet;

/// Function words and generic marketing vocabulary that never make good
/// anchor text on their own. German first; the corpus this tool grew up on
/// is a German-language blog.
const STOPWORDS_DE: &[&str] = &[
    "und", "oder", "der", "die", "das", "den", "dem", "des", "ein", "eine", "einen", "einem",
    "einer", "eines", "mit", "für", "von", "vom", "zum", "zur", "auf", "aus", "bei", "nach",
    "über", "unter", "gegen", "ohne", "durch", "wie", "was", "wer", "wann", "warum", "ist",
    "sind", "war", "waren", "wird", "werden", "wurde", "wurden", "kann", "können", "muss",
    "müssen", "soll", "sollen", "will", "wollen", "hat", "haben", "hatte", "hatten", "nicht",
    "auch", "noch", "nur", "schon", "mehr", "sehr", "alle", "alles", "beim", "ins", "ans",
    "als", "dass", "sich", "ihre", "ihr", "sein", "seine", "uns", "euch", "man", "hier",
    "dort", "dann", "denn", "aber", "wenn", "weil", "gefunden", "finden", "machen", "gibt",
    "beste", "bester", "bestes", "besten", "gute", "guter", "gutes", "guten", "neue", "neuer",
    "neues", "neuen", "top", "tipp", "tipps", "guide", "ratgeber", "ultimative", "perfekte",
    "einfach", "schnell", "jetzt", "heute",
];

/// Long generic compound nouns that clear the compound-single length bar but
/// still say nothing specific about an article.
const COMPOUND_STOPWORDS_DE: &[&str] = &[
    "informationen",
    "dienstleistungen",
    "möglichkeiten",
    "veranstaltungen",
    "empfehlungen",
    "unternehmen",
    "erfahrungen",
];

const STOPWORDS_EN: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "have", "has", "had", "was", "were",
    "are", "is", "been", "being", "will", "would", "can", "could", "should", "all", "any",
    "our", "your", "their", "its", "not", "also", "more", "most", "very", "much", "many",
    "how", "why", "what", "when", "where", "who", "which", "than", "then", "over", "under",
    "into", "about", "after", "before", "you", "get", "best", "great", "good", "new", "top",
    "tip", "tips", "guide", "ultimate", "easy", "quick", "complete", "now", "today",
];

const COMPOUND_STOPWORDS_EN: &[&str] = &[
    "information",
    "professional",
    "introduction",
    "understanding",
    "organization",
];

/// Accented letters treated as part of the phrase alphabet alongside ASCII
/// letters. Everything else becomes a token separator.
const ALPHABET_EXTRAS: &[char] = &[
    'ä', 'ö', 'ü', 'ß', 'é', 'è', 'ê', 'á', 'à', 'â', 'í', 'ì', 'î', 'ó', 'ò', 'ô', 'ú', 'ù',
    'û', 'ñ', 'ç',
];

/// Tuning knobs for phrase extraction. These are corpus- and language-specific
/// heuristics, so they are carried as data rather than hard-coded in the
/// extraction routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseRules {
    /// Tokens strictly shorter than this are dropped after normalization.
    pub min_token_len: usize,
    /// A bigram qualifies when the first token is at least this long...
    pub bigram_first_min: usize,
    /// ...or the second token is at least this long.
    pub bigram_second_min: usize,
    /// A trigram qualifies only when all three tokens are at least this long.
    pub trigram_min: usize,
    /// A single token qualifies as a compound-noun phrase at this length.
    pub compound_min: usize,
    pub alphabet_extras: Vec<char>,
    pub stopwords: BTreeSet<String>,
    pub compound_stopwords: BTreeSet<String>,
}

impl PhraseRules {
    pub fn for_locale(locale: &str) -> Self {
        let (stop, compound_stop) = match locale.trim().to_lowercase().as_str() {
            "en" => (STOPWORDS_EN, COMPOUND_STOPWORDS_EN),
            _ => (STOPWORDS_DE, COMPOUND_STOPWORDS_DE),
        };
        Self {
            min_token_len: 3,
            bigram_first_min: 4,
            bigram_second_min: 5,
            trigram_min: 4,
            compound_min: 12,
            alphabet_extras: ALPHABET_EXTRAS.to_vec(),
            stopwords: stop.iter().map(|word| word.to_string()).collect(),
            compound_stopwords: compound_stop.iter().map(|word| word.to_string()).collect(),
        }
    }

    fn is_alphabet_char(&self, ch: char) -> bool {
        ch.is_ascii_alphabetic() || self.alphabet_extras.contains(&ch)
    }
}

impl Default for PhraseRules {
    fn default() -> Self {
        Self::for_locale("de")
    }
}

/// Derive candidate anchor phrases from an article title.
///
/// The returned phrases are lowercase, whitespace-normalized, deduplicated,
/// and sorted by character count descending; equal-length phrases keep their
/// generation order (bigrams, then trigrams, then compound singles, each in
/// token order), so the output is fully deterministic. A title that filters
/// down to nothing yields an empty set, never an error.
pub fn extract_phrases(title: &str, rules: &PhraseRules) -> Vec<String> {
    let headline = title.split(':').next().unwrap_or(title);
    let tokens = tokenize_headline(headline, rules);

    let mut seen = BTreeSet::new();
    let mut phrases = Vec::new();
    let mut push = |phrase: String, out: &mut Vec<String>| {
        if seen.insert(phrase.clone()) {
            out.push(phrase);
        }
    };

    for pair in tokens.windows(2) {
        if char_len(&pair[0]) >= rules.bigram_first_min
            || char_len(&pair[1]) >= rules.bigram_second_min
        {
            push(format!("{} {}", pair[0], pair[1]), &mut phrases);
        }
    }

    for triple in tokens.windows(3) {
        if triple.iter().all(|token| char_len(token) >= rules.trigram_min) {
            push(format!("{} {} {}", triple[0], triple[1], triple[2]), &mut phrases);
        }
    }

    for token in &tokens {
        if char_len(token) >= rules.compound_min && !rules.compound_stopwords.contains(token) {
            push(token.clone(), &mut phrases);
        }
    }

    // Stable sort: longer phrases are more specific and must be attempted
    // first by the injector; ties keep generation order.
    phrases.sort_by_cached_key(|phrase| std::cmp::Reverse(char_len(phrase)));
    phrases
}

/// Lowercase the headline, map every non-alphabet character to a space, and
/// split into tokens, dropping short tokens and stopwords.
fn tokenize_headline(headline: &str, rules: &PhraseRules) -> Vec<String> {
    let mut normalized = String::with_capacity(headline.len());
    for ch in headline.to_lowercase().chars() {
        if rules.is_alphabet_char(ch) {
            normalized.push(ch);
        } else {
            normalized.push(' ');
        }
    }

    normalized
        .split_whitespace()
        .filter(|token| char_len(token) >= rules.min_token_len)
        .filter(|token| !rules.stopwords.contains(*token))
        .map(ToString::to_string)
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
