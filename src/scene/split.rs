use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n[ \t\r]*\n").expect("paragraph pattern is valid");
    static ref SENTENCE_END: Regex = Regex::new(r"\.\s+").expect("sentence pattern is valid");
}

/// Splits a story into scene texts: first at blank lines, then after every
/// period followed by whitespace. The period stays with its sentence and
/// empty pieces are dropped.
pub fn split_scenes(text: &str) -> Vec<String> {
    PARAGRAPH_BREAK
        .split(text)
        .flat_map(split_sentences)
        .collect()
}

fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for end in SENTENCE_END.find_iter(paragraph) {
        push_trimmed(&mut sentences, &paragraph[start..end.start() + 1]);
        start = end.end();
    }
    push_trimmed(&mut sentences, &paragraph[start..]);

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sentences.push(piece.to_string());
    }
}
