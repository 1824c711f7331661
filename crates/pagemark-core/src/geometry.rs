//! Axis-aligned boxes and the spatial queries built on them.
//!
//! A [`BBox`] is stored as origin plus extent (`x`, `y`, `width`, `height`),
//! the form page tokens are extracted in. Annotation files store the
//! edge form instead, [`Bounds`]; the two convert losslessly.

use crate::error::PagemarkError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Edge representation: `left`, `top`, `right`, `bottom`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Per-edge tolerance used to grow a box before a containment test, or to
/// pad a box before it is emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftMargin {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl SoftMargin {
    /// The same tolerance on all four edges.
    pub fn uniform(value: f64) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Horizontal and vertical scale factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactor {
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0
    }

    /// The factor itself, or `InvalidScale` unless both axes are finite and
    /// positive.
    pub fn validate(self) -> Result<Self, PagemarkError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(PagemarkError::InvalidScale {
                x: self.x,
                y: self.y,
            })
        }
    }
}

impl From<f64> for ScaleFactor {
    fn from(factor: f64) -> Self {
        ScaleFactor {
            x: factor,
            y: factor,
        }
    }
}

impl From<(f64, f64)> for ScaleFactor {
    fn from((x, y): (f64, f64)) -> Self {
        ScaleFactor { x, y }
    }
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// `(left, top, right, bottom)`.
    pub fn coordinates(&self) -> (f64, f64, f64, f64) {
        (self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Whether the center of `self` lies inside `other` once `other` has been
    /// grown outward by `soft_margin`. Points on the grown edges count as
    /// inside.
    pub fn is_in(&self, other: &BBox, soft_margin: &SoftMargin) -> bool {
        let (cx, cy) = self.center();
        let (left, top, right, bottom) = other.coordinates();

        cx >= left - soft_margin.left
            && cx <= right + soft_margin.right
            && cy >= top - soft_margin.top
            && cy <= bottom + soft_margin.bottom
    }

    /// Grow the box outward by the given amounts, in place.
    ///
    /// Negative values shrink the box. A shrink past zero extent clamps the
    /// width or height to zero instead of inverting the box.
    pub fn pad(&mut self, left: f64, top: f64, bottom: f64, right: f64) {
        self.x -= left;
        self.y -= top;

        let width = self.width + left + right;
        let height = self.height + top + bottom;

        if width < 0.0 || height < 0.0 {
            tracing::warn!(
                width,
                height,
                "padding would invert box, clamping extent to zero"
            );
        }

        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    pub fn pad_by(&mut self, margin: &SoftMargin) {
        self.pad(margin.left, margin.top, margin.bottom, margin.right);
    }

    /// Value-returning counterpart of [`BBox::pad_by`].
    pub fn padded(&self, margin: &SoftMargin) -> BBox {
        let mut out = *self;
        out.pad_by(margin);
        out
    }

    /// Multiply origin and extent by the factor(s), in place. A factor
    /// that is not finite and positive is rejected and the box is untouched.
    pub fn scale(&mut self, factor: impl Into<ScaleFactor>) -> Result<(), PagemarkError> {
        let factor = factor.into().validate()?;
        self.x *= factor.x;
        self.width *= factor.x;
        self.y *= factor.y;
        self.height *= factor.y;
        Ok(())
    }

    pub fn scaled(&self, factor: impl Into<ScaleFactor>) -> Result<BBox, PagemarkError> {
        let mut out = *self;
        out.scale(factor)?;
        Ok(out)
    }

    /// Smallest box covering every input box.
    pub fn union(boxes: &[BBox]) -> Result<BBox, PagemarkError> {
        Self::union_of(boxes.iter().copied())
    }

    pub fn union_of(boxes: impl IntoIterator<Item = BBox>) -> Result<BBox, PagemarkError> {
        let mut iter = boxes.into_iter();
        let first = iter.next().ok_or(PagemarkError::EmptyUnion)?;
        let (mut left, mut top, mut right, mut bottom) = first.coordinates();

        for b in iter {
            let (l, t, r, btm) = b.coordinates();
            left = left.min(l);
            top = top.min(t);
            right = right.max(r);
            bottom = bottom.max(btm);
        }

        Ok(BBox::new(left, top, right - left, bottom - top))
    }

    pub fn as_bounds(&self) -> Bounds {
        let (left, top, right, bottom) = self.coordinates();
        Bounds {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Box spanning `bounds`. Swapped edges are put back in order, so the
    /// extent is never negative.
    pub fn from_bounds(bounds: &Bounds) -> BBox {
        let (left, right) = min_max(bounds.left, bounds.right);
        let (top, bottom) = min_max(bounds.top, bounds.bottom);
        BBox::new(left, top, right - left, bottom - top)
    }

    /// Whether the two boxes share any area or touch.
    pub fn overlaps(&self, other: &BBox) -> bool {
        let (l1, t1, r1, b1) = self.coordinates();
        let (l2, t2, r2, b2) = other.coordinates();
        l1 <= r2 && l2 <= r1 && t1 <= b2 && t2 <= b1
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

impl From<Bounds> for BBox {
    fn from(bounds: Bounds) -> Self {
        BBox::from_bounds(&bounds)
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if b < a {
        (b, a)
    } else {
        (a, b)
    }
}
