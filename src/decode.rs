use float_ord::FloatOrd;
use ndarray::ArrayView2;

use crate::result::Character;

/// Class index reserved for the CTC blank token.
const BLANK: usize = 0;

/// Greedy CTC decode of a `T x C` class-probability matrix.
///
/// A single left-to-right pass: per timestep take the arg-max class, collapse
/// immediate repeats (blank runs included), drop blanks, and emit the
/// surviving classes shifted past the blank slot with their arg-max score as
/// confidence. O(T*C), no beam search.
pub fn greedy_ctc(scores: ArrayView2<f32>) -> Vec<Character> {
    let mut text = Vec::new();
    let mut last_token = BLANK;

    for row in scores.outer_iter() {
        let Some((index, &score)) = row
            .indexed_iter()
            .max_by_key(|(_, value)| FloatOrd(**value))
        else {
            continue;
        };

        if index == last_token {
            continue;
        }
        last_token = index;

        if index == BLANK {
            continue;
        }

        text.push(Character {
            id: index - 1,
            prob: score,
        });
    }

    text
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn repeated_argmax_collapses_to_one_token() {
        let scores = arr2(&[
            [0.1, 0.9, 0.0],
            [0.1, 0.8, 0.0],
            [0.1, 0.7, 0.0],
        ]);
        let text = greedy_ctc(scores.view());
        assert_eq!(text, vec![Character { id: 0, prob: 0.9 }]);
    }

    #[test]
    fn all_blank_decodes_to_nothing() {
        let scores = arr2(&[
            [0.9, 0.1, 0.0],
            [0.9, 0.1, 0.0],
            [0.9, 0.1, 0.0],
            [0.9, 0.1, 0.0],
        ]);
        assert!(greedy_ctc(scores.view()).is_empty());
    }

    #[test]
    fn blank_separates_repeated_tokens() {
        let scores = arr2(&[
            [0.1, 0.9, 0.0],
            [0.9, 0.05, 0.0],
            [0.1, 0.8, 0.0],
        ]);
        let text = greedy_ctc(scores.view());
        assert_eq!(
            text,
            vec![
                Character { id: 0, prob: 0.9 },
                Character { id: 0, prob: 0.8 }
            ]
        );
    }

    #[test]
    fn distinct_tokens_all_survive() {
        let scores = arr2(&[
            [0.1, 0.9, 0.0],
            [0.1, 0.1, 0.8],
            [0.1, 0.7, 0.2],
        ]);
        let text = greedy_ctc(scores.view());
        assert_eq!(text.len(), 3);
        assert_eq!(
            text.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![0, 1, 0]
        );
    }

    #[test]
    fn ids_shift_past_the_blank_slot() {
        let scores = arr2(&[[0.0, 0.0, 0.0, 1.0]]);
        let text = greedy_ctc(scores.view());
        assert_eq!(text, vec![Character { id: 2, prob: 1.0 }]);
    }

    #[test]
    fn empty_matrix_decodes_to_nothing() {
        let scores = ndarray::Array2::<f32>::zeros((0, 5));
        assert!(greedy_ctc(scores.view()).is_empty());
    }
}
