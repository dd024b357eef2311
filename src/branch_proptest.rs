//! Property-based tests for branch name mapping.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::branch::BranchNameMapper;
    use proptest::prelude::*;
    use std::path::Path;

    fn mapper() -> BranchNameMapper {
        BranchNameMapper::new(Path::new("/work/branches"), "feature/", "f-", "template")
            .unwrap()
    }

    proptest! {
        /// Property: every supported branch head round-trips through the
        /// project-name namespace unchanged.
        #[test]
        fn supported_heads_round_trip(suffix in "[a-zA-Z0-9][a-zA-Z0-9._-]{0,40}") {
            let mapper = mapper();
            let head = format!("feature/{}", suffix);
            prop_assume!(mapper.branch_name_supported(&head));

            let id = mapper.from_branch_head(&head).unwrap();
            let back = mapper.from_project_name(id.project_name()).unwrap();
            prop_assert_eq!(back.head(), head.as_str());
        }

        /// Property: the directory namespace round-trips as well.
        #[test]
        fn supported_heads_round_trip_via_directory(
            suffix in "[a-zA-Z0-9][a-zA-Z0-9._-]{0,40}"
        ) {
            let mapper = mapper();
            let head = format!("feature/{}", suffix);
            prop_assume!(mapper.branch_name_supported(&head));

            let id = mapper.from_branch_head(&head).unwrap();
            let back = mapper.from_directory(id.directory()).unwrap();
            prop_assert_eq!(back.head(), head.as_str());
        }

        /// Property: a derived project name is always filesystem-safe.
        #[test]
        fn derived_project_names_are_path_safe(
            suffix in "[a-zA-Z0-9][a-zA-Z0-9._-]{0,40}"
        ) {
            let mapper = mapper();
            let head = format!("feature/{}", suffix);
            prop_assume!(mapper.branch_name_supported(&head));

            let id = mapper.from_branch_head(&head).unwrap();
            for ch in ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '] {
                prop_assert!(!id.project_name().contains(ch));
            }
            // Exactly one path component below the sub-projects root.
            prop_assert_eq!(
                id.directory().parent(),
                Some(Path::new("/work/branches"))
            );
        }

        /// Property: heads outside the convention prefix are never
        /// supported, whatever their shape.
        #[test]
        fn heads_without_prefix_are_rejected(head in "[a-zA-Z0-9._-]{1,40}") {
            let mapper = mapper();
            prop_assume!(!head.starts_with("feature/"));
            prop_assert!(!mapper.branch_name_supported(&head));
            prop_assert!(mapper.from_branch_head(&head).is_err());
        }

        /// Property: the reserved template name never passes, regardless
        /// of the configured convention.
        #[test]
        fn template_name_never_supported(
            template in "[a-zA-Z0-9][a-zA-Z0-9._-]{0,20}"
        ) {
            let mapper = BranchNameMapper::new(
                Path::new("/work/branches"),
                "feature/",
                "f-",
                &template,
            )
            .unwrap();
            prop_assert!(!mapper.project_name_supported(&template));
        }
    }
}
