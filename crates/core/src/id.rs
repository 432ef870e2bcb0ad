// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque identifiers for reflection entities.
//!
//! Every store record is keyed by an immutable id. Ids minted by this crate
//! carry a 4-character type prefix; ids handed in from collaborators (dataset
//! ids from the catalog, job ids from the job service) are wrapped verbatim
//! with `from_string`.

/// Define a newtype ID wrapper around `SmolStr` with a type prefix.
///
/// The generated format is `{prefix}{nanoid}`: a 4-character prefix plus a
/// 19-character nanoid, 23 bytes total, which fits `SmolStr`'s inline storage.
///
/// ```ignore
/// define_id! {
///     /// Identifier of a reflection.
///     pub struct ReflectionId("rfl-");
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub smol_str::SmolStr);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Mint a fresh random id.
            pub fn new() -> Self {
                Self(smol_str::SmolStr::new(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19))))
            }

            /// Wrap an existing id (from a store, a collaborator, or a test).
            pub fn from_string(id: impl Into<smol_str::SmolStr>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First `n` characters after the type prefix, for log lines.
            pub fn short(&self, n: usize) -> &str {
                let suffix = self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0);
                $crate::id::short(suffix, n)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Returns `s` truncated to at most `n` characters (char-boundary safe).
pub fn short(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

define_id! {
    /// Identifier of a reflection. Shared by the goal and its entry.
    pub struct ReflectionId("rfl-");
}

define_id! {
    /// Identifier of one physical materialization generation.
    pub struct MaterializationId("mat-");
}

define_id! {
    /// Catalog identity of a dataset (table or view).
    pub struct DatasetId("dst-");
}

define_id! {
    /// Identifier of a job in the external job service.
    pub struct JobId("job-");
}

define_id! {
    /// Identifier of an append-only refresh record.
    pub struct RefreshId("rfr-");
}

define_id! {
    /// Identifier of an external (user-managed) reflection.
    pub struct ExternalReflectionId("ext-");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
