//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances with the same attribute
/// values are interchangeable. They are immutable; "modifying" one produces a
/// new value (see `Amount::checked_add`).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
