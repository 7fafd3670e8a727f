use std::time::Instant;

use crate::core::error::Result;
use crate::core::types::DocId;
use crate::search::cursor::ScoredCursor;
use crate::search::topk::{SearchResults, TopK};

/// MaxScore dynamic pruning.
///
/// Terms are partitioned into an essential set (high max-score) and a
/// non-essential set. Candidates are generated only by essential lists;
/// non-essential contributions are looked up with skip-advances and only
/// when the candidate can still reach the threshold. As the threshold
/// rises, the smallest essential terms are demoted.
pub fn maxscore<'a>(
    mut cursors: Vec<ScoredCursor<'a, 'a>>,
    k: usize,
    deadline: Option<Instant>,
) -> Result<SearchResults> {
    let mut top = TopK::new(k);

    // Essential terms sorted by descending max score, so the smallest
    // essential term is at the back.
    let mut essential: Vec<usize> = (0..cursors.len())
        .filter(|&index| !cursors[index].is_end())
        .collect();
    essential.sort_by(|&a, &b| {
        cursors[b]
            .max_score()
            .partial_cmp(&cursors[a].max_score())
            .expect("max scores are totally ordered")
    });
    let mut non_essential: Vec<usize> = Vec::with_capacity(cursors.len());
    let mut non_essential_sum = 0.0f32;

    loop {
        // Demote essential terms the threshold has made hopeless on
        // their own.
        while let Some(&last) = essential.last() {
            if top.is_full()
                && cursors[last].max_score() <= top.threshold() - non_essential_sum
            {
                non_essential_sum += cursors[last].max_score();
                non_essential.push(last);
                essential.pop();
            } else {
                break;
            }
        }
        if essential.is_empty() {
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(SearchResults::cancelled(top));
        }

        // Next candidate: minimum current document over essential lists.
        let mut candidate: Option<DocId> = None;
        for &index in &essential {
            if !cursors[index].is_end() {
                let document = cursors[index].document()?;
                candidate = Some(candidate.map_or(document, |current| current.min(document)));
            }
        }
        let Some(candidate) = candidate else {
            break;
        };

        // Essential contributions, advancing every cursor at the
        // candidate.
        let mut score = 0.0f32;
        for &index in &essential {
            let cursor = &mut cursors[index];
            if !cursor.is_end() && cursor.document()? == candidate {
                score += cursor.score()?;
                cursor.next();
            }
        }

        // Only complete the score if the candidate can still make it.
        if score + non_essential_sum >= top.threshold() {
            for &index in &non_essential {
                let cursor = &mut cursors[index];
                cursor.advance_to(candidate)?;
                if !cursor.is_end() && cursor.document()? == candidate {
                    score += cursor.score()?;
                }
            }
            top.push(candidate, score);
        }
    }
    Ok(SearchResults::complete(top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::daat::daat;
    use crate::search::testing::{fixture, make_lists};

    #[test]
    fn test_matches_daat() {
        let lists_data: &[&[(u32, u32)]] = &[
            &[(0, 1), (1, 2), (5, 9), (9, 1)],
            &[(1, 3), (2, 1), (5, 2), (8, 8)],
            &[(0, 2), (7, 4), (9, 4)],
        ];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);
        for k in [1, 2, 3, 10] {
            let expected =
                daat(lists.iter().map(|list| list.cursor()).collect(), k, None).unwrap();
            let actual =
                maxscore(lists.iter().map(|list| list.cursor()).collect(), k, None).unwrap();
            assert_eq!(expected.results, actual.results, "k = {}", k);
        }
    }

    #[test]
    fn test_skewed_max_scores() {
        // The weak term is demoted to non-essential early; documents it
        // contributes alone cannot enter the top-k.
        let lists_data: &[&[(u32, u32)]] = &[
            &[(2, 50), (6, 40)],
            &[(0, 1), (1, 1), (3, 1), (6, 2), (7, 1)],
        ];
        let fixture = fixture(lists_data);
        let lists = make_lists(&fixture);
        let expected = daat(lists.iter().map(|list| list.cursor()).collect(), 2, None).unwrap();
        let actual = maxscore(lists.iter().map(|list| list.cursor()).collect(), 2, None).unwrap();
        assert_eq!(expected.results, actual.results);
        assert_eq!(actual.results[0].document, DocId(2));
        assert_eq!(actual.results[1].document, DocId(6));
    }
}
