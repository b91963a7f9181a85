//! In-memory role sources matching the demo route tags.

use crate::test_ids::{ROLE_ADMIN, ROLE_USER, TEST_SUBJECT_ADMIN, TEST_SUBJECT_USER};
use gatekeeper::config::DEFAULT_ROLE_TAG_CATEGORY;
use gatekeeper::roles::{StaticRoleStore, StaticTagRoleSource};

/// Tag map for the demo routes:
///
/// | tag | roles |
/// |-----|-------|
/// | `authenticated` | admin, user |
/// | `users` | admin, user |
/// | `admin` | admin |
pub fn test_tag_source() -> StaticTagRoleSource {
    StaticTagRoleSource::new()
        .with_tag(DEFAULT_ROLE_TAG_CATEGORY, "authenticated", [ROLE_ADMIN, ROLE_USER])
        .with_tag(DEFAULT_ROLE_TAG_CATEGORY, "users", [ROLE_ADMIN, ROLE_USER])
        .with_tag(DEFAULT_ROLE_TAG_CATEGORY, "admin", [ROLE_ADMIN])
}

/// [`TEST_SUBJECT_ADMIN`] holds `admin`, [`TEST_SUBJECT_USER`] holds `user`.
/// Everyone else holds nothing.
pub fn test_role_store() -> StaticRoleStore {
    StaticRoleStore::new()
        .with_subject(TEST_SUBJECT_ADMIN, [ROLE_ADMIN])
        .with_subject(TEST_SUBJECT_USER, [ROLE_USER])
}
