use std::io;

use bytemuck::{Pod, cast_slice_mut};
use zstd::zstd_safe;

use crate::error::{ReadError, Result};

use super::Column;

/// Compresses `src` into `dst` with the parameters set on the context
pub(crate) fn sized_compress(
    dst: &mut Vec<u8>,
    src: &[u8],
    cctx: &mut zstd_safe::CCtx,
) -> Result<()> {
    dst.clear();

    // reserve the maximum compressed size; zstd writes into the spare capacity
    dst.reserve(zstd_safe::compress_bound(src.len()));
    cctx.compress2(dst, src)
        .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;
    Ok(())
}

/// Decompresses a column of native values
///
/// `u_len` is the decompressed size in bytes recorded in the block header.
pub(crate) fn decompress_column<T: Pod>(
    dst: &mut Vec<T>,
    src: &[u8],
    u_len: u64,
    column: Column,
    dctx: &mut zstd_safe::DCtx,
) -> Result<()> {
    let expected = u_len as usize;
    if expected % size_of::<T>() != 0 {
        return Err(ReadError::ColumnSizeMismatch {
            column: column.name(),
            expected,
            actual: expected - expected % size_of::<T>(),
        }
        .into());
    }

    dst.clear();
    dst.resize(expected / size_of::<T>(), T::zeroed());
    if src.is_empty() {
        if expected == 0 {
            return Ok(());
        }
        return Err(ReadError::ColumnSizeMismatch {
            column: column.name(),
            expected,
            actual: 0,
        }
        .into());
    }

    let actual = dctx
        .decompress(cast_slice_mut(dst.as_mut_slice()), src)
        .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;
    if actual != expected {
        return Err(ReadError::ColumnSizeMismatch {
            column: column.name(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Returns the next `len` bytes after `offset` and advances it
pub(crate) fn slice_and_increment<'a>(
    offset: &mut usize,
    len: u64,
    bytes: &'a [u8],
) -> Result<&'a [u8]> {
    let slice = usize::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .and_then(|end| bytes.get(*offset..end))
        .ok_or(ReadError::FileTruncation(bytes.len()))?;
    let end = *offset + slice.len();
    *offset = end;
    Ok(slice)
}

/// Fills `offsets` with the `n + 1` prefix sums of `lens`
pub(crate) fn calculate_offsets<I>(lens: I, offsets: &mut Vec<usize>)
where
    I: IntoIterator<Item = usize>,
{
    offsets.clear();
    offsets.push(0);
    let mut total = 0;
    for len in lens {
        total += len;
        offsets.push(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressor() -> zstd_safe::CCtx<'static> {
        let mut cctx = zstd_safe::CCtx::create();
        cctx.set_parameter(zstd_safe::CParameter::CompressionLevel(3))
            .unwrap();
        cctx
    }

    #[test]
    fn test_compress_decompress_column() {
        let values: Vec<i32> = (0..1000).map(|i| i * 7 - 300).collect();
        let mut z_buf = Vec::new();
        sized_compress(&mut z_buf, bytemuck::cast_slice(&values), &mut compressor()).unwrap();
        assert!(!z_buf.is_empty());

        let mut dctx = zstd_safe::DCtx::create();
        let mut decoded: Vec<i32> = Vec::new();
        decompress_column(&mut decoded, &z_buf, 4000, Column::Pos, &mut dctx).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_decompress_size_mismatch() {
        let values = [1u32, 2, 3, 4];
        let mut z_buf = Vec::new();
        sized_compress(&mut z_buf, bytemuck::cast_slice(&values), &mut compressor()).unwrap();

        let mut dctx = zstd_safe::DCtx::create();
        let mut decoded: Vec<u32> = Vec::new();
        assert!(decompress_column(&mut decoded, &z_buf, 8, Column::SeqLen, &mut dctx).is_err());
        assert!(decompress_column(&mut decoded, &z_buf, 18, Column::SeqLen, &mut dctx).is_err());
        assert!(decompress_column(&mut decoded, &[], 4, Column::SeqLen, &mut dctx).is_err());
        decompress_column(&mut decoded, &[], 0, Column::SeqLen, &mut dctx).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_slice_and_increment() {
        let bytes = [0u8, 1, 2, 3, 4];
        let mut offset = 0;
        assert_eq!(slice_and_increment(&mut offset, 2, &bytes).unwrap(), &[0, 1]);
        assert_eq!(slice_and_increment(&mut offset, 3, &bytes).unwrap(), &[2, 3, 4]);
        assert!(slice_and_increment(&mut offset, 1, &bytes).is_err());
        assert_eq!(offset, 5);
    }

    #[test]
    fn test_slice_and_increment_overflowing_length() {
        let bytes = [0u8, 1, 2, 3, 4];
        let mut offset = 2;
        assert!(slice_and_increment(&mut offset, u64::MAX, &bytes).is_err());
        assert!(slice_and_increment(&mut offset, u64::MAX - 1, &bytes).is_err());
        assert_eq!(offset, 2);
    }

    #[test]
    fn test_calculate_offsets() {
        let mut offsets = Vec::new();
        calculate_offsets([3, 0, 2], &mut offsets);
        assert_eq!(offsets, [0, 3, 3, 5]);
        calculate_offsets(std::iter::empty(), &mut offsets);
        assert_eq!(offsets, [0]);
    }
}
