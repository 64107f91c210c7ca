use crate::{Mat4, Vec3};

/// Axis-aligned bounding box.
///
/// The empty box is represented by `min = +inf`, `max = -inf`, so folding
/// any box into it with [`Aabb::union`] yields that box unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub fn new<T: Into<Vec3>>(min: T, max: T) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Smallest box enclosing all `points`. Empty for an empty iterator.
    pub fn from_points<I, P>(points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec3>,
    {
        points
            .into_iter()
            .fold(Self::EMPTY, |acc, p| acc.extend_point(p.into()))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    #[inline]
    pub fn extend_point(self, p: Vec3) -> Self {
        Self::new(self.min.min(p), self.max.max(p))
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Corner `i` takes `max` on the x/y/z axis when bit 0/1/2 of `i` is set.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            )
        })
    }

    /// Box of all eight corners after `transform`. Rotations grow the box,
    /// they never clip it.
    pub fn transform(self, transform: Mat4) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }
        Self::from_points(self.corners().map(|c| transform.transform_point3(c)))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) / 2.
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
