//! Skip-encoding of tile update positions.
//!
//! Instead of a u16 tile index, every update is prefixed by the number of unchanged tiles since
//! the previous update. Gaps of 255 or more are split into [`SKIP_CONTINUE`] bytes (each adding
//! 255) followed by the remainder, so only the last skip byte is followed by tile data:
//!
//! | gap | bytes        |
//! |-----|--------------|
//! | 0   | `[0]`        |
//! | 254 | `[254]`      |
//! | 255 | `[255, 0]`   |
//! | 256 | `[255, 1]`   |
//! | 510 | `[255, 255, 0]` |

use crate::{
    consts::SKIP_CONTINUE,
    decode::{decode_error, DecodeError},
};
use snafu::ensure;

/// Calls `emit` with the skip bytes for one gap.
#[inline]
pub fn gap_bytes(mut gap: usize, mut emit: impl FnMut(u8)) {
    while gap >= usize::from(SKIP_CONTINUE) {
        emit(SKIP_CONTINUE);
        gap -= usize::from(SKIP_CONTINUE);
    }
    emit(gap as u8);
}

/// Skip-encodes an ascending list of tile updates.
#[cfg(feature = "alloc")]
pub fn encode_updates<'a>(
    updates: impl IntoIterator<Item = crate::diff::TileUpdate<'a>>,
    out: &mut alloc::vec::Vec<u8>,
) {
    let mut next_index = 0;

    for update in updates {
        let index = usize::from(update.index);
        debug_assert!(index >= next_index, "tile updates must be strictly ascending");

        gap_bytes(index - next_index, |b| out.push(b));
        out.extend_from_slice(update.data);
        next_index = index + 1;
    }
}

/// Walks the skip-encoded updates of one record.
///
/// Yields `(tile index, tile data)` pairs and stops after `count` updates.
#[derive(Debug, Clone)]
pub struct SkipDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    remaining: u16,
    next_index: usize,
    tile_len: usize,
    tile_count: usize,
}

impl<'a> SkipDecoder<'a> {
    pub fn new(data: &'a [u8], count: u16, tile_len: usize, tile_count: usize) -> Self {
        Self {
            data,
            pos: 0,
            remaining: count,
            next_index: 0,
            tile_len,
            tile_count,
        }
    }

    /// Bytes of `data` consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn next_update(&mut self) -> Result<(usize, &'a [u8]), DecodeError> {
        let mut gap = 0;
        loop {
            let &b = self
                .data
                .get(self.pos)
                .ok_or(DecodeError::UnexpectedEof)?;
            self.pos += 1;
            gap += usize::from(b);
            if b != SKIP_CONTINUE {
                break;
            }
        }

        let index = self.next_index + gap;
        ensure!(
            index < self.tile_count,
            decode_error::TileIndexOutOfRangeSnafu {
                index,
                tile_count: self.tile_count
            }
        );

        let data = self
            .data
            .get(self.pos..self.pos + self.tile_len)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.pos += self.tile_len;
        self.next_index = index + 1;

        Ok((index, data))
    }
}

impl<'a> Iterator for SkipDecoder<'a> {
    type Item = Result<(usize, &'a [u8]), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let update = self.next_update();
        // nothing sensible can follow a malformed update
        self.remaining = if update.is_ok() { self.remaining - 1 } else { 0 };
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::TileUpdate;
    use proptest::prelude::*;

    fn gap(n: usize) -> Vec<u8> {
        let mut v = vec![];
        gap_bytes(n, |b| v.push(b));
        v
    }

    #[test]
    fn gap_boundaries() {
        assert_eq!(gap(0), [0]);
        assert_eq!(gap(254), [254]);
        assert_eq!(gap(255), [255, 0]);
        assert_eq!(gap(256), [255, 1]);
        assert_eq!(gap(509), [255, 254]);
        assert_eq!(gap(510), [255, 255, 0]);
    }

    #[test]
    fn encodes_relative_to_previous_update() {
        let data = [[1u8, 2], [3, 4], [5, 6]];
        let updates = [
            TileUpdate { index: 0, data: &data[0] },
            TileUpdate { index: 1, data: &data[1] },
            TileUpdate { index: 300, data: &data[2] },
        ];

        let mut out = vec![];
        encode_updates(updates, &mut out);
        assert_eq!(out, [0, 1, 2, 0, 3, 4, 255, 43, 5, 6]);

        let decoded: Vec<_> = SkipDecoder::new(&out, 3, 2, 400)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, [(0, &[1, 2][..]), (1, &[3, 4][..]), (300, &[5, 6][..])]);
    }

    #[test]
    fn decoder_reports_truncation_and_overflow() {
        let mut decoder = SkipDecoder::new(&[3, 9], 1, 2, 16);
        assert!(matches!(decoder.next(), Some(Err(DecodeError::UnexpectedEof))));
        assert!(decoder.next().is_none());

        let mut decoder = SkipDecoder::new(&[255, 255], 1, 1, 16);
        assert!(matches!(decoder.next(), Some(Err(DecodeError::UnexpectedEof))));

        let mut decoder = SkipDecoder::new(&[16, 0], 1, 1, 16);
        assert!(matches!(
            decoder.next(),
            Some(Err(DecodeError::TileIndexOutOfRange { index: 16, .. }))
        ));
    }

    proptest! {
        #[test]
        fn roundtrips_any_ascending_index_set(
            indices in proptest::collection::btree_set(0u16..2000, 0..200)
        ) {
            let tiles: Vec<[u8; 2]> = indices.iter().map(|i| i.to_le_bytes()).collect();
            let updates = indices
                .iter()
                .zip(&tiles)
                .map(|(&index, data)| TileUpdate { index, data });

            let mut out = vec![];
            encode_updates(updates, &mut out);

            let mut decoder = SkipDecoder::new(&out, indices.len() as u16, 2, 2000);
            let decoded: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();
            prop_assert_eq!(decoder.position(), out.len());
            prop_assert_eq!(decoded.len(), indices.len());
            for ((index, data), expected) in decoded.into_iter().zip(&indices) {
                prop_assert_eq!(index, usize::from(*expected));
                prop_assert_eq!(data, &expected.to_le_bytes()[..]);
            }
        }
    }
}
