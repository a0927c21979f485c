// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use pipewatch_core::{ArtifactEntry, EntryKind, ZipEntry};

/// Normalizes a browse path to the form used as a listing key: no leading or
/// trailing slash, empty for the archive root.
pub fn normalize_path(path: &str) -> String {
	path.trim_matches('/').to_string()
}

/// Immediate children of `prefix` in a flat archive listing.
///
/// Directories sort before files, then by name. A directory appears once
/// however many entries live beneath it.
pub fn children(flat: &[ZipEntry], prefix: &str) -> Vec<ArtifactEntry> {
	let base = normalize_path(prefix);
	let prefix = if base.is_empty() {
		String::new()
	} else {
		format!("{base}/")
	};

	let mut found: BTreeMap<&str, ArtifactEntry> = BTreeMap::new();
	for entry in flat {
		let Some(rest) = entry.name.strip_prefix(prefix.as_str()) else {
			continue;
		};
		let rest = rest.trim_start_matches('/');
		let (name, is_directory) = match rest.split_once('/') {
			Some((name, _)) => (name, true),
			None => (rest, entry.is_directory),
		};
		if name.is_empty() {
			continue;
		}

		let candidate = if is_directory {
			ArtifactEntry {
				name: name.to_string(),
				path: format!("{prefix}{name}"),
				kind: EntryKind::Directory,
				size: None,
			}
		} else {
			ArtifactEntry {
				name: name.to_string(),
				path: format!("{prefix}{name}"),
				kind: EntryKind::File,
				size: Some(entry.size),
			}
		};

		let keep_existing = found
			.get(name)
			.is_some_and(|existing| existing.kind == EntryKind::Directory);
		if !keep_existing {
			found.insert(name, candidate);
		}
	}

	let mut entries: Vec<ArtifactEntry> = found.into_values().collect();
	entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
	entries
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::collections::HashSet;

	fn file(name: &str, size: u64) -> ZipEntry {
		ZipEntry {
			name: name.to_string(),
			size,
			is_directory: false,
		}
	}

	fn dir(name: &str) -> ZipEntry {
		ZipEntry {
			name: name.to_string(),
			size: 0,
			is_directory: true,
		}
	}

	fn summary(entries: &[ArtifactEntry]) -> Vec<(&str, EntryKind, Option<u64>)> {
		entries
			.iter()
			.map(|e| (e.name.as_str(), e.kind, e.size))
			.collect()
	}

	#[test]
	fn root_and_nested_listing() {
		let flat = vec![file("a/x.txt", 10), file("a/b/y.txt", 20), file("c.txt", 30)];

		assert_eq!(
			summary(&children(&flat, "")),
			vec![("a", EntryKind::Directory, None), ("c.txt", EntryKind::File, Some(30))]
		);
		assert_eq!(
			summary(&children(&flat, "a")),
			vec![("b", EntryKind::Directory, None), ("x.txt", EntryKind::File, Some(10))]
		);
		assert_eq!(
			summary(&children(&flat, "a/b/")),
			vec![("y.txt", EntryKind::File, Some(20))]
		);
	}

	#[test]
	fn child_paths_are_relative_to_the_archive_root() {
		let flat = vec![file("a/b/y.txt", 1)];
		let entries = children(&flat, "/a/");
		assert_eq!(entries[0].path, "a/b");
		assert_eq!(children(&flat, "")[0].path, "a");
	}

	#[test]
	fn explicit_directory_entries_are_directories() {
		let flat = vec![dir("empty/"), dir("logs/"), file("logs/build.log", 5)];
		assert_eq!(
			summary(&children(&flat, "")),
			vec![("empty", EntryKind::Directory, None), ("logs", EntryKind::Directory, None)]
		);
		assert!(children(&flat, "empty").is_empty());
	}

	#[test]
	fn directory_wins_over_file_with_same_name() {
		let flat = vec![file("out", 3), file("out/inner.txt", 4)];
		assert_eq!(summary(&children(&flat, "")), vec![("out", EntryKind::Directory, None)]);
	}

	#[test]
	fn sibling_prefixes_do_not_match() {
		let flat = vec![file("app/main.rs", 1), file("application/readme", 2)];
		assert_eq!(
			summary(&children(&flat, "app")),
			vec![("main.rs", EntryKind::File, Some(1))]
		);
	}

	proptest! {
		#[test]
		fn root_children_are_unique_sorted_top_level_segments(
			names in proptest::collection::vec("[a-c]{1,2}(/[a-c]{1,2}){0,3}", 0..40)
		) {
			let flat: Vec<ZipEntry> = names.iter().map(|n| file(n, 1)).collect();
			let entries = children(&flat, "");

			let listed: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
			let unique: HashSet<&str> = listed.iter().copied().collect();
			prop_assert_eq!(unique.len(), listed.len());

			let expected: HashSet<&str> = names
				.iter()
				.map(|n| n.split('/').next().unwrap_or_default())
				.collect();
			prop_assert_eq!(unique, expected);

			for pair in entries.windows(2) {
				prop_assert!((pair[0].kind, &pair[0].name) < (pair[1].kind, &pair[1].name));
			}
			for entry in &entries {
				prop_assert_eq!(entry.size.is_some(), entry.kind == EntryKind::File);
			}
		}
	}
}
