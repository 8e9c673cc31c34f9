//! Deciding which tiles of a frame have to be stored.

use crate::tile::TileSet;
use alloc::vec::Vec;
use itertools::Itertools;

/// Which frames are stored as keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyframePolicy {
    /// Every `interval`th frame (counting from 0) is a keyframe. `0` means only the first frame.
    pub interval: u16,
}

impl KeyframePolicy {
    pub const FIRST_ONLY: Self = Self { interval: 0 };

    pub const fn every(interval: u16) -> Self {
        Self { interval }
    }

    #[inline]
    pub const fn is_keyframe(&self, frame_index: u32) -> bool {
        frame_index == 0 || (self.interval > 0 && frame_index % self.interval as u32 == 0)
    }
}

/// One changed tile of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileUpdate<'a> {
    pub index: u16,
    pub data: &'a [u8],
}

/// The tiles one frame stores, in ascending index order.
#[derive(Debug, Clone)]
pub struct FrameRecord<'a> {
    pub keyframe: bool,
    tiles: &'a TileSet,
    changed: Vec<u16>,
}

impl<'a> FrameRecord<'a> {
    #[inline]
    pub fn update_count(&self) -> u16 {
        // the session rejects grids with more than u16::MAX tiles
        self.changed.len() as u16
    }

    #[inline]
    pub fn tile_len(&self) -> usize {
        self.tiles.tile_len()
    }

    pub fn updates(&self) -> impl ExactSizeIterator<Item = TileUpdate<'a>> + '_ {
        let tiles = self.tiles;
        self.changed.iter().map(move |&index| TileUpdate {
            index,
            data: tiles.tile(usize::from(index)),
        })
    }
}

/// Holds the previous frame's tiles and diffs each new frame against them.
#[derive(Debug, Default)]
pub struct FrameDifferencer {
    policy: KeyframePolicy,
    previous: Option<TileSet>,
    frame_index: u32,
}

impl FrameDifferencer {
    pub fn new(policy: KeyframePolicy) -> Self {
        Self {
            policy,
            previous: None,
            frame_index: 0,
        }
    }

    /// Number of frames diffed so far.
    #[inline]
    pub fn frames(&self) -> u32 {
        self.frame_index
    }

    /// Classifies the frame, collects the tiles that changed, and keeps `tiles` as the basis for
    /// the next frame (keyframes included).
    pub fn push(&mut self, tiles: TileSet) -> FrameRecord<'_> {
        let keyframe = self.policy.is_keyframe(self.frame_index);
        self.frame_index += 1;

        let changed = match self.previous.as_ref() {
            Some(previous) if !keyframe && previous.tile_len() == tiles.tile_len() => previous
                .tiles()
                .zip(tiles.tiles())
                .positions(|(prev, curr)| prev != curr)
                .map(|index| index as u16)
                .collect(),
            _ => (0..tiles.len() as u16).collect(),
        };
        // a frame without a basis always stores every tile
        let keyframe = keyframe || self.previous.is_none();

        let tiles = self.previous.insert(tiles);

        FrameRecord {
            keyframe,
            tiles,
            changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pixel::PixelFormat, tile::TileGrid};

    fn tiles(samples: &[u16]) -> TileSet {
        let grid = TileGrid::new(16, 16).unwrap();
        TileSet::extract(samples, &grid, PixelFormat::Indexed1)
    }

    fn indices(record: &FrameRecord<'_>) -> Vec<u16> {
        record.updates().map(|u| u.index).collect()
    }

    #[test]
    fn keyframe_policy() {
        let first = KeyframePolicy::FIRST_ONLY;
        assert!(first.is_keyframe(0));
        assert!(!first.is_keyframe(1));
        assert!(!first.is_keyframe(1000));

        let every3 = KeyframePolicy::every(3);
        let keys: Vec<u32> = (0..10).filter(|&i| every3.is_keyframe(i)).collect();
        assert_eq!(keys, [0, 3, 6, 9]);
    }

    #[test]
    fn identical_frames_produce_no_updates() {
        let mut diff = FrameDifferencer::new(KeyframePolicy::FIRST_ONLY);
        let frame = vec![1; 256];

        let first = diff.push(tiles(&frame));
        assert!(first.keyframe);
        assert_eq!(first.update_count(), 4);

        let second = diff.push(tiles(&frame));
        assert!(!second.keyframe);
        assert_eq!(second.update_count(), 0);
    }

    #[test]
    fn only_changed_tiles_are_emitted() {
        let mut diff = FrameDifferencer::new(KeyframePolicy::FIRST_ONLY);
        let mut frame = vec![0; 256];
        diff.push(tiles(&frame));

        // bottom-right tile
        frame[15 * 16 + 15] = 1;
        let record = diff.push(tiles(&frame));
        assert_eq!(indices(&record), [3]);
        let update = record.updates().next().unwrap();
        assert_eq!(update.data, &[0, 0, 0, 0, 0, 0, 0, 0b0000_0001]);
    }

    #[test]
    fn keyframes_emit_everything_and_still_become_the_basis() {
        let mut diff = FrameDifferencer::new(KeyframePolicy::every(2));
        let a = vec![0; 256];
        let mut b = a.clone();
        b[0] = 1;

        diff.push(tiles(&a));
        assert_eq!(diff.push(tiles(&b)).update_count(), 1);

        let key = diff.push(tiles(&b));
        assert!(key.keyframe);
        assert_eq!(key.update_count(), 4);

        // diffed against the keyframe's content
        let after = diff.push(tiles(&a));
        assert!(!after.keyframe);
        assert_eq!(indices(&after), [0]);
        assert_eq!(diff.frames(), 4);
    }
}
