//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their attribute values.
//! A `Confidence` of 0.92 is interchangeable with any other `Confidence` of 0.92, whereas two
//! reservations of the same quantity are still different reservations.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. To "modify" one, build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct Confidence(f64);
///
/// impl ValueObject for Confidence {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
