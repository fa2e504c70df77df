//! Reading the decoded body of a token request.
//!
//! The runtime decodes `application/x-www-form-urlencoded` bodies however it likes. The grant only
//! asks for single parameters by name, and a name sent more than once has no value at all: an
//! `assertion` appearing twice is refused instead of silently picking one of the two.
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// Access to the body parameters of a token request.
///
/// Implemented for the shapes form decoders usually produce:
/// * `Vec<(String, String)>`, pairs in the order of the body,
/// * `HashMap<String, String>`,
/// * `HashMap<String, Vec<String>>`.
///
/// An implementation must return `None` for a parameter that was sent more than once, even when
/// all its values are equal.
pub trait QueryParameter {
    /// The value of a parameter sent exactly once.
    fn unique_value(&self, key: &str) -> Option<Cow<str>>;
}

/// The values a map holds for one parameter name.
pub trait FormValue {
    /// The value if there is exactly one.
    fn single(&self) -> Option<&str>;
}

impl<K, V> QueryParameter for Vec<(K, V)>
where
    K: Borrow<str>,
    V: Borrow<str>,
{
    fn unique_value(&self, key: &str) -> Option<Cow<str>> {
        let mut matching = self.iter().filter(|(name, _)| name.borrow() == key);
        match (matching.next(), matching.next()) {
            (Some((_, value)), None) => Some(Cow::Borrowed(value.borrow())),
            _ => None,
        }
    }
}

impl<K, V, S> QueryParameter for HashMap<K, V, S>
where
    K: Borrow<str> + Eq + Hash,
    V: FormValue,
    S: BuildHasher,
{
    fn unique_value(&self, key: &str) -> Option<Cow<str>> {
        self.get(key).and_then(FormValue::single).map(Cow::Borrowed)
    }
}

impl<'a, Q: QueryParameter + ?Sized> QueryParameter for &'a Q {
    fn unique_value(&self, key: &str) -> Option<Cow<str>> {
        (**self).unique_value(key)
    }
}

impl FormValue for str {
    fn single(&self) -> Option<&str> {
        Some(self)
    }
}

impl FormValue for String {
    fn single(&self) -> Option<&str> {
        Some(self)
    }
}

impl<'a, V: FormValue + ?Sized> FormValue for &'a V {
    fn single(&self) -> Option<&str> {
        (**self).single()
    }
}

impl<V: FormValue> FormValue for [V] {
    fn single(&self) -> Option<&str> {
        match self {
            [value] => value.single(),
            _ => None,
        }
    }
}

impl<V: FormValue> FormValue for Vec<V> {
    fn single(&self) -> Option<&str> {
        self.as_slice().single()
    }
}
