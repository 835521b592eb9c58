//! Quorum evaluation shared by the Prepare and Accept phases

/// Returns true if the number of usable responses reaches `majority`.
///
/// `None` stands for both a rejection and a response that never arrived.
pub fn has_quorum<'a, T: 'a, I>(responses: I, majority: usize) -> bool
    where I: IntoIterator<Item = &'a Option<T>>
{
    responses.into_iter().filter(|r| r.is_some()).count() >= majority
}

/// Returns true once enough rejections have been seen that no quorum can form
pub fn quorum_impossible(rejections: usize, num_nodes: usize, majority: usize) -> bool {
    rejections > num_nodes.saturating_sub(majority)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::majority;

    #[test]
    fn threshold_boundary() {
        for n in 1..=9usize {
            let m = majority(n);
            let mut responses: Vec<Option<u8>> = vec![None; n];
            for slot in responses.iter_mut().take(m - 1) {
                *slot = Some(1);
            }
            assert!(!has_quorum(&responses, m), "n = {}", n);
            responses[m - 1] = Some(1);
            assert!(has_quorum(&responses, m), "n = {}", n);
        }
    }

    #[test]
    fn rejects_do_not_count() {
        let responses = vec![None, Some(()), None];
        assert!(!has_quorum(&responses, 2));
        assert!(has_quorum(&responses, 1));
    }

    #[test]
    fn empty_responses() {
        let responses: Vec<Option<u8>> = Vec::new();
        assert!(!has_quorum(&responses, 1));
    }

    #[test]
    fn impossible_after_minority_plus_one_rejections() {
        assert!(!quorum_impossible(1, 3, 2));
        assert!(quorum_impossible(2, 3, 2));
        assert!(!quorum_impossible(2, 5, 3));
        assert!(quorum_impossible(3, 5, 3));
    }
}
