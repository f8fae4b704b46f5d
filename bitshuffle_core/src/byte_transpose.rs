//! Byte transpose: group byte `k` of every element into plane `k`.
//!
//! For `n` elements of `itemsize` bytes the output is `itemsize` planes of `n`
//! bytes each. The inverse swaps the roles of planes and elements.

use crate::backend::Backend;
use crate::error::{BitshuffleError, Result};

/// Check `len == n * itemsize` with a non-zero item size.
pub(crate) fn validate(len: usize, n: usize, itemsize: usize) -> Result<()> {
    if itemsize == 0 {
        return Err(BitshuffleError::InvalidItemSize(itemsize));
    }
    let expected = n
        .checked_mul(itemsize)
        .ok_or(BitshuffleError::LengthMismatch {
            n,
            itemsize,
            expected: usize::MAX,
            actual: len,
        })?;
    if len != expected {
        return Err(BitshuffleError::LengthMismatch {
            n,
            itemsize,
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Transpose a `lda x ldb` matrix of `elem_size`-byte cells:
/// cell `(ii, jj)` of the input moves to `(jj, ii)` of the output.
pub(crate) fn trans_elem(input: &[u8], out: &mut [u8], lda: usize, ldb: usize, elem_size: usize) {
    for ii in 0..lda {
        for jj in 0..ldb {
            let src = (ii * ldb + jj) * elem_size;
            let dst = (jj * lda + ii) * elem_size;
            out[dst..dst + elem_size].copy_from_slice(&input[src..src + elem_size]);
        }
    }
}

/// Byte-transpose `n` elements of `itemsize` bytes with `backend`.
pub(crate) fn transpose_bytes(
    backend: Backend,
    input: &[u8],
    n: usize,
    itemsize: usize,
) -> Result<Vec<u8>> {
    validate(input.len(), n, itemsize)?;
    let mut out = vec![0u8; input.len()];
    backend.resolve().trans_byte_elem(input, &mut out, n, itemsize);
    Ok(out)
}

/// Inverse of [`transpose_bytes`].
pub(crate) fn untranspose_bytes(
    backend: Backend,
    input: &[u8],
    n: usize,
    itemsize: usize,
) -> Result<Vec<u8>> {
    validate(input.len(), n, itemsize)?;
    let mut out = vec![0u8; input.len()];
    backend.resolve().untrans_byte_elem(input, &mut out, n, itemsize);
    Ok(out)
}
