use crate::job::KeyValue;

use regex::Regex;
use std::sync::LazyLock;

pub const NAME: &str = "word_count";

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.?!;:,\s]+").unwrap());

/// Counts the words of one line.
///
/// Words are separated by whitespace and `. ? ! ; : ,`. Each distinct word is
/// emitted once, in order of first appearance, with its count as the value.
pub fn map_line(line: &str) -> Vec<KeyValue> {
    let mut result: Vec<KeyValue> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for word in SEPARATORS.split(line).filter(|w| !w.is_empty()) {
        match result.iter().position(|(key, _)| key == word) {
            Some(idx) => counts[idx] += 1,
            None => {
                result.push((word.to_string(), String::new()));
                counts.push(1);
            }
        }
    }

    for ((_, value), count) in result.iter_mut().zip(counts) {
        *value = count.to_string();
    }

    result
}
