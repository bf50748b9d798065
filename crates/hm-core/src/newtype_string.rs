//! Macro for defining strongly-typed metadata identifier newtypes.
//!
//! Hierarchy, formula-group and filter-group ids are caller-assigned strings
//! that must never be blank. Keeping them as distinct types stops a filter
//! group id from being looked up in the node table by accident.

/// Define a strongly-typed, non-blank identifier newtype.
///
/// Generates:
/// - The struct with `Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize`
/// - Custom `Deserialize` (rejects blank strings)
/// - `new()` (panics on blank), `try_new()` (returns Option), `as_str()`, `into_inner()`
/// - `Display`, `AsRef<str>`, `Deref<Target=str>`, `Borrow<str>`
/// - `TryFrom<&str>`, `PartialEq<str>`, `PartialEq<&str>`
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        $vis struct $Name(String);

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $Name::try_new(s)
                    .ok_or_else(|| serde::de::Error::custom(concat!(stringify!($Name), " must not be blank")))
            }
        }

        impl $Name {
            /// Create a new id, panicking if it is blank.
            ///
            /// Prefer [`try_new`](Self::try_new) for metadata coming from outside.
            pub fn new(id: impl Into<String>) -> Self {
                let s = id.into();
                assert!(!s.trim().is_empty(), concat!(stringify!($Name), " must not be blank"));
                Self(s)
            }

            /// Try to create a new id, returning `None` if it is blank.
            pub fn try_new(id: impl Into<String>) -> Option<Self> {
                let s = id.into();
                if s.trim().is_empty() { None } else { Some(Self(s)) }
            }

            /// Return the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str { &self.0 }
        }

        impl std::ops::Deref for $Name {
            type Target = str;
            fn deref(&self) -> &str { &self.0 }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str { &self.0 }
        }

        impl TryFrom<&str> for $Name {
            type Error = &'static str;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::try_new(s).ok_or(concat!(stringify!($Name), " must not be blank"))
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool { self.0 == *other }
        }
    };
}

pub(crate) use define_id;
