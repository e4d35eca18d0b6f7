//! Test selection
//!
//! Maps the selection tokens left after argument pre-processing onto the
//! registry. Tokens are processed left to right:
//!
//! - no tokens selects every test;
//! - `all` selects every test and ends processing;
//! - a token containing `*` selects every test whose name starts with the
//!   text before the first `*`;
//! - any other token selects the test with exactly that name.
//!
//! A token matching nothing, a token matching an already-selected test and
//! a token matching a test without a body are all errors. The first error
//! ends processing and no test runs.

use crate::api::ComputeApi;
use crate::error::{Error, Result};
use crate::registry::TestRegistry;

/// One flag per registry entry, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionMask(Vec<bool>);

impl SelectionMask {
    pub fn none(len: usize) -> Self {
        SelectionMask(vec![false; len])
    }

    pub fn all(len: usize) -> Self {
        SelectionMask(vec![true; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn selected_count(&self) -> usize {
        self.0.iter().filter(|s| **s).count()
    }

    /// Indices of selected entries, ascending.
    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.then_some(i))
    }

    fn set(&mut self, index: usize) {
        self.0[index] = true;
    }
}

fn apply_token<A: ComputeApi>(
    registry: &TestRegistry<A>,
    mask: &mut SelectionMask,
    token: &str,
) -> Result<()> {
    let (pattern, wildcard) = match token.find('*') {
        Some(star) => (&token[..star], true),
        None => (token, false),
    };

    let mut found = false;
    for (index, test) in registry.iter().enumerate() {
        let matches = if wildcard {
            test.name.starts_with(pattern)
        } else {
            test.name == pattern
        };
        if !matches {
            continue;
        }

        if mask.is_selected(index) {
            return Err(Error::duplicate_selection(token, &test.name));
        }
        if !test.implemented() {
            return Err(Error::missing_implementation(token, &test.name));
        }
        mask.set(index);
        found = true;
        if !wildcard {
            break;
        }
    }

    match (found, wildcard) {
        (true, _) => Ok(()),
        (false, true) => Err(Error::no_wildcard_match(token)),
        (false, false) => Err(Error::unknown_test(token)),
    }
}

/// Build the selection mask for `tokens`. The first rejected token is
/// returned unlogged; the caller reports it.
pub fn select_tests<A: ComputeApi, S: AsRef<str>>(
    registry: &TestRegistry<A>,
    tokens: &[S],
) -> Result<SelectionMask> {
    if tokens.is_empty() {
        return Ok(SelectionMask::all(registry.len()));
    }

    let mut mask = SelectionMask::none(registry.len());
    for token in tokens {
        let token = token.as_ref();
        if token == "all" {
            return Ok(SelectionMask::all(registry.len()));
        }
        apply_token(registry, &mut mask, token)?;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::simulated::SimulatedApi;
    use crate::error::SelectionErrorKind;
    use crate::registry::{TestDefinition, TestOutcome};

    fn registry() -> TestRegistry<SimulatedApi> {
        let mut registry = TestRegistry::new("suite");
        for name in ["buffer_read", "buffer_write", "image_read", "kernel_args"] {
            registry
                .add(TestDefinition::new(name, |_| TestOutcome::Pass))
                .unwrap();
        }
        registry.add(TestDefinition::unimplemented("image_write")).unwrap();
        registry
    }

    fn selected(mask: &SelectionMask) -> Vec<usize> {
        mask.selected().collect()
    }

    #[test]
    fn test_no_tokens_selects_everything() {
        let mask = select_tests::<_, &str>(&registry(), &[]).unwrap();
        assert_eq!(mask.selected_count(), 5);
        assert_eq!(mask.len(), 5);
    }

    #[test]
    fn test_all_stops_processing() {
        let mask = select_tests(&registry(), &["buffer_read", "all", "nonexistent"]).unwrap();
        assert_eq!(mask.selected_count(), 5);
    }

    #[test]
    fn test_exact_and_wildcard() {
        let mask = select_tests(&registry(), &["kernel_args", "buffer_*"]).unwrap();
        assert_eq!(selected(&mask), vec![0, 1, 3]);
    }

    #[test]
    fn test_wildcard_prefix_ends_at_first_star() {
        let mask = select_tests(&registry(), &["buf*_read"]).unwrap();
        assert_eq!(selected(&mask), vec![0, 1]);
    }

    #[test]
    fn test_unknown_token() {
        let err = select_tests(&registry(), &["nope"]).unwrap_err();
        assert_eq!(err.selection_kind(), Some(SelectionErrorKind::UnknownTest));
    }

    #[test]
    fn test_wildcard_without_match() {
        let err = select_tests(&registry(), &["zzz*"]).unwrap_err();
        assert_eq!(err.selection_kind(), Some(SelectionErrorKind::NoWildcardMatch));
    }

    #[test]
    fn test_duplicate_selection() {
        let err = select_tests(&registry(), &["buffer_read", "buffer_read"]).unwrap_err();
        assert_eq!(err.selection_kind(), Some(SelectionErrorKind::DuplicateSelection));

        let err = select_tests(&registry(), &["buffer_read", "buffer*"]).unwrap_err();
        assert_eq!(err.selection_kind(), Some(SelectionErrorKind::DuplicateSelection));
    }

    #[test]
    fn test_unimplemented_selection_is_rejected() {
        let err = select_tests(&registry(), &["image_write"]).unwrap_err();
        assert_eq!(err.selection_kind(), Some(SelectionErrorKind::MissingImplementation));

        let err = select_tests(&registry(), &["image_*"]).unwrap_err();
        assert_eq!(err.selection_kind(), Some(SelectionErrorKind::MissingImplementation));
    }

    #[test]
    fn test_mask_length_tracks_registry() {
        let reg = registry();
        let mask = select_tests(&reg, &["image_read"]).unwrap();
        assert_eq!(mask.len(), reg.len());
        assert!(mask.is_selected(2));
        assert!(!mask.is_selected(99));
    }
}
