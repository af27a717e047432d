//! Property-based test generators using proptest.
//!
//! Paths stay inside the working tree, avoid `.git` and never collide
//! with a directory of the same name, so any generated tree can be
//! written to disk as is.

use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for one path segment.
pub fn path_segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for workspace-relative file paths, one to three segments deep.
///
/// File names carry a `.txt` suffix and directories never do, so a file
/// and a directory cannot share a path.
pub fn relative_path_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(path_segment_strategy(), 0..3),
        path_segment_strategy(),
    )
        .prop_map(|(dirs, name)| {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&name);
            path.push_str(".txt");
            path
        })
}

/// Strategy for file contents (arbitrary bytes).
pub fn blob_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for line-oriented text contents.
pub fn text_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec("[a-zA-Z0-9 ]{0,40}", 1..8).prop_map(|lines| {
        let mut text = lines.join("\n");
        text.push('\n');
        text.into_bytes()
    })
}

/// Strategy for small trees of files keyed by relative path.
pub fn file_tree_strategy(max_files: usize) -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(relative_path_strategy(), text_strategy(), 1..=max_files.max(1))
}

/// Strategy for a pair of trees edited from the same base on two sides.
///
/// Each side touches a disjoint subset of paths, so merging them can never
/// conflict.
pub fn disjoint_edits_strategy(
    max_files: usize,
) -> impl Strategy<Value = (BTreeMap<String, Vec<u8>>, BTreeMap<String, Vec<u8>>)> {
    file_tree_strategy(max_files * 2).prop_flat_map(|tree| {
        let len = tree.len();
        (Just(tree), prop::collection::vec(any::<bool>(), len)).prop_map(|(tree, sides)| {
            let mut left = BTreeMap::new();
            let mut right = BTreeMap::new();
            for ((path, bytes), goes_left) in tree.into_iter().zip(sides) {
                if goes_left {
                    left.insert(path, bytes);
                } else {
                    right.insert(path, bytes);
                }
            }
            (left, right)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn paths_are_relative_and_well_formed(path in relative_path_strategy()) {
            prop_assert!(!path.starts_with('/'));
            prop_assert!(!path.contains(".."));
            prop_assert!(!path.starts_with(".git"));
            prop_assert!(path.ends_with(".txt"));
            prop_assert!(path.split('/').all(|segment| !segment.is_empty()));
        }

        #[test]
        fn disjoint_edits_do_not_share_paths((left, right) in disjoint_edits_strategy(4)) {
            prop_assert!(left.keys().all(|path| !right.contains_key(path)));
        }

        #[test]
        fn text_ends_with_newline(text in text_strategy()) {
            prop_assert_eq!(text.last(), Some(&b'\n'));
        }
    }
}
