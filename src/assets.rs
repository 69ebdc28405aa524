//! Sprite rotation cache
//!
//! Drawing asks for an entity's visual at a facing angle. Angles are
//! quantised into buckets so each (entity, bucket) pair is rendered once;
//! a coarser precision means fewer cached sprites and choppier rotation.
//! The cache never evicts: clear it when a level ends.

use std::collections::HashMap;
use std::f64::consts::TAU;

use crate::normalize_angle;
use crate::sim::tower::TowerKind;

/// Default bucket width in radians
pub const DEFAULT_PRECISION: f64 = 0.08;

/// What is being drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityTag {
    Creep,
    Tower(TowerKind),
    Bullet(TowerKind),
}

/// Index of a quantised angle; bucket `n` covers the angle `n * precision`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AngleBucket(pub i64);

impl AngleBucket {
    pub fn of(angle: f64, precision: f64) -> Self {
        let buckets = (TAU / precision).round().max(1.0) as i64;
        let index = (normalize_angle(angle) / precision).round() as i64;
        Self(index.rem_euclid(buckets))
    }

    /// Representative angle of the bucket
    pub fn angle(&self, precision: f64) -> f64 {
        normalize_angle(self.0 as f64 * precision)
    }
}

/// Produces the visual for an entity at an exact angle
pub trait SpriteSource {
    type Sprite;

    fn render(&self, tag: EntityTag, angle: f64) -> Self::Sprite;
}

pub struct RotationCache<S: SpriteSource> {
    source: S,
    precision: f64,
    sprites: HashMap<(EntityTag, AngleBucket), S::Sprite>,
}

impl<S: SpriteSource> RotationCache<S> {
    /// Non-positive or non-finite precisions fall back to the default
    pub fn new(source: S, precision: f64) -> Self {
        let precision = if precision > 0.0 && precision.is_finite() {
            precision
        } else {
            DEFAULT_PRECISION
        };
        Self {
            source,
            precision,
            sprites: HashMap::new(),
        }
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn sprite(&mut self, tag: EntityTag, angle: f64) -> &S::Sprite {
        let bucket = AngleBucket::of(angle, self.precision);
        let precision = self.precision;
        let source = &self.source;
        self.sprites
            .entry((tag, bucket))
            .or_insert_with(|| source.render(tag, bucket.angle(precision)))
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn clear(&mut self) {
        self.sprites.clear();
    }
}

/// Eight-way arrow glyphs for text output. Angles follow screen
/// coordinates: y grows downwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowGlyphs;

impl SpriteSource for ArrowGlyphs {
    type Sprite = char;

    fn render(&self, tag: EntityTag, angle: f64) -> char {
        const ARROWS: [char; 8] = ['→', '↘', '↓', '↙', '←', '↖', '↑', '↗'];
        match tag {
            EntityTag::Bullet(_) => '·',
            EntityTag::Creep | EntityTag::Tower(_) => {
                let octant = (angle / (TAU / 8.0)).round() as i64;
                ARROWS[octant.rem_euclid(8) as usize]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::f64::consts::PI;

    struct Counting(Cell<u32>);

    impl SpriteSource for Counting {
        type Sprite = f64;

        fn render(&self, _tag: EntityTag, angle: f64) -> f64 {
            self.0.set(self.0.get() + 1);
            angle
        }
    }

    #[test]
    fn test_nearby_angles_share_a_bucket() {
        assert_eq!(AngleBucket::of(0.01, 0.08), AngleBucket::of(-0.01, 0.08));
        assert_ne!(AngleBucket::of(0.0, 0.08), AngleBucket::of(0.1, 0.08));
        // Wraps around the circle
        assert_eq!(AngleBucket::of(0.001, 0.1), AngleBucket::of(TAU - 0.001, 0.1));
    }

    #[test]
    fn test_cache_renders_once_per_bucket() {
        let mut cache = RotationCache::new(Counting(Cell::new(0)), 0.08);
        let first = *cache.sprite(EntityTag::Creep, 0.97);
        let again = *cache.sprite(EntityTag::Creep, 0.99);
        assert_eq!(first, again);
        assert!((first - 0.96).abs() < 1e-9);
        cache.sprite(EntityTag::Tower(TowerKind::Basic), 1.0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.source.0.get(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_bad_precision_falls_back() {
        assert_eq!(RotationCache::new(ArrowGlyphs, 0.0).precision(), DEFAULT_PRECISION);
        assert_eq!(RotationCache::new(ArrowGlyphs, f64::NAN).precision(), DEFAULT_PRECISION);
    }

    #[test]
    fn test_arrow_glyphs() {
        let mut cache = RotationCache::new(ArrowGlyphs, DEFAULT_PRECISION);
        assert_eq!(*cache.sprite(EntityTag::Creep, 0.0), '→');
        assert_eq!(*cache.sprite(EntityTag::Creep, PI / 2.0), '↓');
        assert_eq!(*cache.sprite(EntityTag::Creep, PI), '←');
        assert_eq!(*cache.sprite(EntityTag::Bullet(TowerKind::Basic), 1.0), '·');
    }
}
