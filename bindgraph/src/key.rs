//! Canonical identities of requested dependencies. A [Key] names exactly one
//! binding within a container's resolved set and is what the
//! [Resolver](crate::resolver::Resolver) keys its binding table by.
//!
//! Keys combine a base type identity (a stable, globally unique string), an
//! optional qualifier and structural wrapping: member injection, lazy and
//! provider wrappers, arrays and generic instantiations. Equality and hashing
//! are structural, and the textual encoding is canonical - two structurally
//! equal keys always render identically, regardless of how they were built.
//!
//! The rendered format is stable:
//!
//! ```text
//! [members/][@<qualifier>/]<shape>
//! ```
//!
//! where generic parameters render recursively in declaration order
//! (`Map<K,V>`), arrays render with their rank (`T[]`, `T[,,]` - a rank-3
//! array is distinct from a jagged `T[][][]`), and lazy/provider wrapping
//! renders as a generic-style wrapper around the inner shape (`Lazy<T>`).

use crate::instance::Injectable;
use std::fmt::{self, Display, Formatter};

/// Structural part of a [Key]: the type being requested, including any
/// array/generic/lazy/provider nesting.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeShape {
    /// A plain type, identified by its stable global name.
    Named(String),
    /// A generic instantiation; parameters are ordered as declared.
    Generic { base: String, params: Vec<TypeShape> },
    /// An array of the given rank. A single rank-N array and N nested rank-1
    /// arrays are distinct shapes.
    Array { elem: Box<TypeShape>, rank: u8 },
    /// A lazily produced value of the inner shape.
    Lazy(Box<TypeShape>),
    /// A provider of fresh values of the inner shape.
    Provider(Box<TypeShape>),
}

impl TypeShape {
    fn base_name(&self) -> &str {
        match self {
            TypeShape::Named(name) => name,
            TypeShape::Generic { base, .. } => base,
            TypeShape::Array { elem, .. } => elem.base_name(),
            TypeShape::Lazy(inner) | TypeShape::Provider(inner) => inner.base_name(),
        }
    }
}

impl Display for TypeShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Named(name) => f.write_str(name),
            TypeShape::Generic { base, params } => {
                write!(f, "{base}<")?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{param}")?;
                }
                f.write_str(">")
            }
            TypeShape::Array { elem, rank } => {
                write!(f, "{elem}[")?;
                for _ in 1..*rank {
                    f.write_str(",")?;
                }
                f.write_str("]")
            }
            TypeShape::Lazy(inner) => write!(f, "Lazy<{inner}>"),
            TypeShape::Provider(inner) => write!(f, "Provider<{inner}>"),
        }
    }
}

/// Kind of wrapping recovered by [Key::unwrap].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WrapKind {
    Members,
    Lazy,
    Provider,
    Array(u8),
}

/// Identity of a requested dependency. See the module documentation for the
/// encoding rules.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Key {
    qualifier: Option<String>,
    members: bool,
    shape: TypeShape,
}

impl Key {
    /// Creates a key for a plain type, optionally qualified. Qualified and
    /// unqualified keys for the same type never compare equal.
    pub fn for_type(type_name: impl Into<String>, qualifier: Option<&str>) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            members: false,
            shape: TypeShape::Named(type_name.into()),
        }
    }

    /// Creates an unqualified key for an [Injectable] type.
    pub fn of<T: Injectable>() -> Self {
        Self::for_type(T::type_name(), None)
    }

    /// Creates a qualified key for an [Injectable] type.
    pub fn qualified<T: Injectable>(qualifier: &str) -> Self {
        Self::for_type(T::type_name(), Some(qualifier))
    }

    /// Creates the member-injection key for a type.
    pub fn for_members(type_name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            members: true,
            shape: TypeShape::Named(type_name.into()),
        }
    }

    /// Creates the member-injection key for an [Injectable] type.
    pub fn for_members_of<T: Injectable>() -> Self {
        Self::for_members(T::type_name())
    }

    /// Creates a key for a generic instantiation.
    pub fn for_generic(base: impl Into<String>, params: Vec<TypeShape>) -> Self {
        Self {
            qualifier: None,
            members: false,
            shape: TypeShape::Generic {
                base: base.into(),
                params,
            },
        }
    }

    /// Wraps this key in a lazy wrapper; the qualifier stays on the outer key.
    pub fn wrap_lazy(self) -> Self {
        Self {
            qualifier: self.qualifier,
            members: self.members,
            shape: TypeShape::Lazy(Box::new(self.shape)),
        }
    }

    /// Wraps this key in a provider wrapper.
    pub fn wrap_provider(self) -> Self {
        Self {
            qualifier: self.qualifier,
            members: self.members,
            shape: TypeShape::Provider(Box::new(self.shape)),
        }
    }

    /// Wraps this key in an array of the given rank.
    pub fn wrap_array(self, rank: u8) -> Self {
        Self {
            qualifier: self.qualifier,
            members: self.members,
            shape: TypeShape::Array {
                elem: Box::new(self.shape),
                rank,
            },
        }
    }

    /// Wraps this key into the multibinding collection key aggregating
    /// contributions for it.
    pub fn wrap_set(self) -> Self {
        Self {
            qualifier: self.qualifier,
            members: self.members,
            shape: TypeShape::Generic {
                base: "Set".to_string(),
                params: vec![self.shape],
            },
        }
    }

    /// Recovers the element key and wrapping kind of a wrapped key, or `None`
    /// for plain keys. Inverse of the wrap constructors:
    /// `key.clone().wrap_lazy().unwrap() == Some((key, WrapKind::Lazy))`.
    pub fn unwrap(&self) -> Option<(Key, WrapKind)> {
        if self.members {
            return Some((
                Self {
                    qualifier: self.qualifier.clone(),
                    members: false,
                    shape: self.shape.clone(),
                },
                WrapKind::Members,
            ));
        }

        match &self.shape {
            TypeShape::Lazy(inner) => Some((self.with_shape((**inner).clone()), WrapKind::Lazy)),
            TypeShape::Provider(inner) => {
                Some((self.with_shape((**inner).clone()), WrapKind::Provider))
            }
            TypeShape::Array { elem, rank } => {
                Some((self.with_shape((**elem).clone()), WrapKind::Array(*rank)))
            }
            _ => None,
        }
    }

    fn with_shape(&self, shape: TypeShape) -> Self {
        Self {
            qualifier: self.qualifier.clone(),
            members: false,
            shape,
        }
    }

    #[inline]
    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }

    #[inline]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    #[inline]
    pub fn is_members(&self) -> bool {
        self.members
    }

    /// Innermost base type identity; used as the class-name hint when asking
    /// binding factories for declaration metadata.
    #[inline]
    pub fn type_name(&self) -> &str {
        self.shape.base_name()
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.members {
            f.write_str("members/")?;
        }
        if let Some(qualifier) = &self.qualifier {
            write!(f, "@{qualifier}/")?;
        }
        write!(f, "{}", self.shape)
    }
}

#[cfg(test)]
mod tests {
    use crate::key::{Key, TypeShape, WrapKind};

    #[test]
    fn should_round_trip_wrapped_keys() {
        let key = Key::for_type("com.example.Engine", Some("turbo"));

        assert_eq!(
            key.clone().wrap_lazy().unwrap(),
            Some((key.clone(), WrapKind::Lazy))
        );
        assert_eq!(
            key.clone().wrap_provider().unwrap(),
            Some((key.clone(), WrapKind::Provider))
        );
        assert_eq!(
            key.clone().wrap_array(3).unwrap(),
            Some((key.clone(), WrapKind::Array(3)))
        );
        assert_eq!(
            Key::for_members("com.example.Engine").unwrap(),
            Some((
                Key::for_type("com.example.Engine", None),
                WrapKind::Members
            ))
        );
        assert_eq!(key.unwrap(), None);
    }

    #[test]
    fn should_render_canonical_encodings() {
        assert_eq!(
            Key::for_type("com.example.Engine", None).to_string(),
            "com.example.Engine"
        );
        assert_eq!(
            Key::for_type("com.example.Engine", Some("turbo")).to_string(),
            "@turbo/com.example.Engine"
        );
        assert_eq!(
            Key::for_members("com.example.Engine").to_string(),
            "members/com.example.Engine"
        );
        assert_eq!(
            Key::for_type("com.example.Engine", Some("turbo"))
                .wrap_lazy()
                .to_string(),
            "@turbo/Lazy<com.example.Engine>"
        );
        assert_eq!(
            Key::for_generic(
                "com.example.Pair",
                vec![
                    TypeShape::Named("com.example.Left".to_string()),
                    TypeShape::Named("com.example.Right".to_string()),
                ],
            )
            .wrap_provider()
            .to_string(),
            "Provider<com.example.Pair<com.example.Left,com.example.Right>>"
        );
    }

    #[test]
    fn should_distinguish_qualifiers_from_each_other_and_from_nothing() {
        let plain = Key::for_type("com.example.Engine", None);
        let turbo = Key::for_type("com.example.Engine", Some("turbo"));
        let diesel = Key::for_type("com.example.Engine", Some("diesel"));

        assert_ne!(plain, turbo);
        assert_ne!(turbo, diesel);
        assert_ne!(plain.to_string(), turbo.to_string());
        assert_ne!(turbo.to_string(), diesel.to_string());
    }

    #[test]
    fn should_distinguish_multidimensional_from_jagged_arrays() {
        let multidimensional = Key::for_type("com.example.Cell", None).wrap_array(2);
        let jagged = Key::for_type("com.example.Cell", None)
            .wrap_array(1)
            .wrap_array(1);

        assert_ne!(multidimensional, jagged);
        assert_eq!(multidimensional.to_string(), "com.example.Cell[,]");
        assert_eq!(jagged.to_string(), "com.example.Cell[][]");
    }

    #[test]
    fn should_compare_structurally_regardless_of_construction_path() {
        let wrapped = Key::for_type("com.example.Engine", Some("turbo")).wrap_lazy();
        let (unwrapped, _) = wrapped.unwrap().unwrap();
        let rebuilt = unwrapped.wrap_lazy();

        assert_eq!(wrapped, rebuilt);
        assert_eq!(wrapped.to_string(), rebuilt.to_string());
    }

    #[test]
    fn should_expose_the_innermost_type_name() {
        let key = Key::for_type("com.example.Engine", Some("turbo"))
            .wrap_array(1)
            .wrap_lazy();

        assert_eq!(key.type_name(), "com.example.Engine");
    }
}
