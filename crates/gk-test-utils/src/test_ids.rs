//! Fixed test IDs for deterministic tests
//!
//! Subjects match the entries in [`crate::role_fixtures::test_role_store`].

// Signing Key IDs
pub const TEST_KEY_ID_1: &str = "test-key-2025-01";
pub const TEST_KEY_ID_2: &str = "test-key-2025-02";

// Subjects
pub const TEST_SUBJECT_ADMIN: &str = "00000000-0000-0000-0000-000000000100";
pub const TEST_SUBJECT_USER: &str = "00000000-0000-0000-0000-000000000101";

/// Verified but holds no roles.
pub const TEST_SUBJECT_NOBODY: &str = "00000000-0000-0000-0000-000000000102";

// Audience
pub const TEST_AUDIENCE: &str = "authenticated";

// Roles
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
