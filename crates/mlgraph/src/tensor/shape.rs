//! Shapes with possibly-unresolved dimensions.
//!
//! A dimension is either a fixed extent or [`Dimension::Dynamic`], meaning
//! the extent is unknown until a compute call binds it. Dynamic never hides
//! behind a numeric sentinel, so an unresolved shape cannot be mistaken for
//! a fixed one.

use serde::{Deserialize, Serialize};

/// One axis of a tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Extent known at graph-construction time.
    Fixed(usize),
    /// Extent supplied per compute call through an explicit input binding.
    Dynamic,
}

impl Dimension {
    /// Returns the extent when fixed.
    pub fn fixed(self) -> Option<usize> {
        match self {
            Dimension::Fixed(extent) => Some(extent),
            Dimension::Dynamic => None,
        }
    }

    pub fn is_dynamic(self) -> bool {
        matches!(self, Dimension::Dynamic)
    }
}

/// Ordered dimension list of an operand. Rank is fixed once declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: Vec<Dimension>) -> Self {
        Shape { dims }
    }

    /// Builds a fully fixed shape from concrete extents.
    pub fn from_static(dims: &[usize]) -> Self {
        Shape {
            dims: dims.iter().map(|&d| Dimension::Fixed(d)).collect(),
        }
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_static(&self) -> bool {
        self.dims.iter().all(|dim| !dim.is_dynamic())
    }

    /// Returns the concrete extents when every dimension is fixed.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(|dim| dim.fixed()).collect()
    }

    /// Total element count, when statically known. `None` when any
    /// dimension is dynamic or the product overflows `usize`.
    pub fn element_count(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, dim| {
            dim.fixed().and_then(|extent| acc.checked_mul(extent))
        })
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("scalar");
        }
        for (index, dim) in self.dims.iter().enumerate() {
            if index > 0 {
                f.write_str("x")?;
            }
            match dim {
                Dimension::Fixed(extent) => write!(f, "{extent}")?,
                Dimension::Dynamic => f.write_str("?")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_requires_fully_fixed_dims() {
        let fixed = Shape::from_static(&[2, 3, 4]);
        assert_eq!(fixed.element_count(), Some(24));

        let dynamic = Shape::new(vec![Dimension::Dynamic, Dimension::Fixed(2)]);
        assert_eq!(dynamic.element_count(), None);
        assert_eq!(dynamic.static_dims(), None);
        assert!(!dynamic.is_static());
    }

    #[test]
    fn element_count_rejects_overflow() {
        let huge = Shape::from_static(&[usize::MAX, 2]);
        assert_eq!(huge.element_count(), None);
    }

    #[test]
    fn display_marks_dynamic_axes() {
        let shape = Shape::new(vec![
            Dimension::Dynamic,
            Dimension::Fixed(2),
            Dimension::Dynamic,
        ]);
        assert_eq!(shape.to_string(), "?x2x?");
        assert_eq!(Shape::from_static(&[]).to_string(), "scalar");
    }
}
