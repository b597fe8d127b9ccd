mod fuzzy;
mod levenshtein;

pub use fuzzy::{best_match, best_match_str};
pub use levenshtein::{levenshtein_distance, similarity_ratio};
