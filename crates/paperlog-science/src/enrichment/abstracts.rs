use crate::types::InvertedIndex;

/// Rebuild abstract prose from an OpenAlex-style inverted index.
///
/// Words are ordered by position and joined with single spaces. Words sharing
/// a position are ordered lexically so the output does not depend on map
/// iteration order. A missing index gives `None`; an empty one gives
/// `Some("")`.
pub fn reconstruct_abstract(index: Option<&InvertedIndex>) -> Option<String> {
    let index = index?;

    let mut slots: Vec<(u32, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&pos| (pos, word.as_str())))
        .collect();
    slots.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    Some(
        slots
            .into_iter()
            .map(|(_, word)| word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}
