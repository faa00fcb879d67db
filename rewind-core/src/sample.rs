//! Coalesced continuous values.
//!
//! Pointer movement, scrolling and viewport resizes arrive at the recorder
//! as dense streams. Producers coalesce each burst into one [`Sample`] with
//! a start value, an end value and a duration; consumers interpolate
//! linearly over `duration` instead of jumping.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// A 2D integer coordinate (pointer position, scroll offset, viewport size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    /// Linear interpolation towards `to` at `num/den`. `den == 0` returns
    /// `to` (a zero-duration sample is an instant jump).
    pub fn lerp(self, to: Point, num: u32, den: u32) -> Point {
        if den == 0 || num >= den {
            return to;
        }
        let f = |a: i32, b: i32| a + (((b - a) as i64 * num as i64) / den as i64) as i32;
        Point {
            x: f(self.x, to.x),
            y: f(self.y, to.y),
        }
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.put_i32(self.x);
        w.put_i32(self.y);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Point {
            x: r.get_i32()?,
            y: r.get_i32()?,
        })
    }
}

/// A continuous change from `from` to `to` over `duration` milliseconds,
/// starting at the enclosing event's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample<T> {
    pub from: T,
    pub to: T,
    /// Interpolation window in milliseconds
    pub duration: u32,
}

impl<T> Sample<T> {
    /// Last instant covered by this sample, given the enclosing event time.
    pub fn end_time(&self, start: u32) -> u32 {
        start.saturating_add(self.duration)
    }
}

impl Sample<Point> {
    /// Value at `clock`, for an event that started at `start`. Clamped to
    /// the endpoints outside the window.
    pub fn at(&self, start: u32, clock: u32) -> Point {
        if clock <= start {
            return self.from;
        }
        self.from.lerp(self.to, clock - start, self.duration)
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        self.from.encode(w);
        self.to.encode(w);
        w.put_u32(self.duration);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Sample {
            from: Point::decode(r)?,
            to: Point::decode(r)?,
            duration: r.get_u32()?,
        })
    }
}
