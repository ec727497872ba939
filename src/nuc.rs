//! Nucleotide encoding and decoding module
//!
//! Sequences are packed two bases per byte using the 16-symbol alphabet
//! `=ACMGRSVTWYHKDBN`, where each symbol's position in the alphabet is its
//! 4-bit code. The first base of each pair occupies the high nibble. Odd
//! length sequences leave the low nibble of the final byte zeroed, so the
//! logical length must always be stored alongside the packed bytes.

use crate::error::{CodecError, Result};

/// The 16-symbol nucleotide alphabet, indexed by 4-bit code
pub const ALPHABET: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

/// The code assigned to every symbol outside the alphabet (`N`)
pub const AMBIGUOUS_CODE: u8 = 15;

/// Lookup table from ASCII byte to 4-bit code
const ENCODE_TABLE: [u8; 256] = build_encode_table();

const fn build_encode_table() -> [u8; 256] {
    let mut table = [AMBIGUOUS_CODE; 256];
    let mut code = 0;
    while code < ALPHABET.len() {
        table[ALPHABET[code] as usize] = code as u8;
        code += 1;
    }
    table
}

/// Returns the 4-bit code of a single nucleotide
///
/// Symbols outside the alphabet (including lowercase bases) map to the `N` code.
#[inline]
#[must_use]
pub fn code_of(base: u8) -> u8 {
    ENCODE_TABLE[base as usize]
}

/// Returns the number of bytes required to pack `len` nucleotides
#[inline]
#[must_use]
pub fn packed_len(len: usize) -> usize {
    len.div_ceil(2)
}

/// Encodes nucleotides into the packed 4-bit representation
///
/// The output buffer is cleared before encoding.
///
/// # Arguments
///
/// * `input` - A slice of ASCII nucleotides
/// * `output` - A mutable vector to store the packed nucleotides
///
/// # Example
///
/// ```
/// use binram::nuc;
///
/// let mut packed = Vec::new();
/// nuc::encode(b"ACG", &mut packed);
/// assert_eq!(packed, vec![0x12, 0x40]);
/// ```
pub fn encode(input: &[u8], output: &mut Vec<u8>) {
    output.clear();
    output.reserve(packed_len(input.len()));

    let mut pairs = input.chunks_exact(2);
    for pair in pairs.by_ref() {
        output.push((code_of(pair[0]) << 4) | code_of(pair[1]));
    }
    if let [last] = pairs.remainder() {
        output.push(code_of(*last) << 4);
    }
}

/// Decodes packed 4-bit nucleotides to ASCII
///
/// The output buffer is cleared before decoding. An empty input decodes to
/// an empty sequence whatever the requested length, which is the state of a
/// sequence column that was not loaded.
///
/// # Arguments
///
/// * `input` - The packed nucleotides
/// * `len` - The number of nucleotides to decode
/// * `output` - A mutable vector to store the decoded ASCII nucleotides
///
/// # Returns
///
/// * `Ok(())` - If decoding was successful
/// * `Err(Error)` - If the packed input holds fewer than `len` nucleotides
///
/// # Example
///
/// ```
/// use binram::nuc;
///
/// let mut decoded = Vec::new();
/// nuc::decode(&[0x12, 0x40], 3, &mut decoded).unwrap();
/// assert_eq!(decoded, b"ACG");
/// ```
pub fn decode(input: &[u8], len: usize, output: &mut Vec<u8>) -> Result<()> {
    output.clear();
    if input.is_empty() {
        return Ok(());
    }
    let expected = packed_len(len);
    if input.len() < expected {
        return Err(CodecError::TruncatedSequence {
            expected,
            actual: input.len(),
        }
        .into());
    }

    output.reserve(len);
    for byte in &input[..len / 2] {
        output.push(ALPHABET[(byte >> 4) as usize]);
        output.push(ALPHABET[(byte & 0xF) as usize]);
    }
    if len % 2 == 1 {
        output.push(ALPHABET[(input[len / 2] >> 4) as usize]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn roundtrip(sequence: &[u8]) -> Vec<u8> {
        let mut packed = Vec::new();
        let mut decoded = Vec::new();
        encode(sequence, &mut packed);
        assert_eq!(packed.len(), packed_len(sequence.len()));
        decode(&packed, sequence.len(), &mut decoded).unwrap();
        decoded
    }

    #[test]
    fn test_encode_decode_simple() {
        let sequence = b"ACGTACGT";
        assert_eq!(roundtrip(sequence), sequence);
    }

    #[test]
    fn test_full_alphabet_roundtrip() {
        assert_eq!(roundtrip(ALPHABET), ALPHABET);
        for (code, base) in ALPHABET.iter().enumerate() {
            assert_eq!(code_of(*base), code as u8);
        }
    }

    #[test]
    fn test_random_roundtrip_all_lengths() {
        let mut rng = SmallRng::seed_from_u64(42);
        for len in 0..64 {
            let sequence: Vec<u8> = (0..len)
                .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
                .collect();
            assert_eq!(roundtrip(&sequence), sequence, "length {len}");
        }
    }

    #[test]
    fn test_high_nibble_first_and_zero_padding() {
        let mut packed = Vec::new();
        encode(b"ACGTN", &mut packed);
        // A=1 C=2 G=4 T=8 N=15
        assert_eq!(packed, vec![0x12, 0x48, 0xF0]);
    }

    #[test]
    fn test_unknown_symbols_encode_as_n() {
        let mut ambiguous = Vec::new();
        let mut unknown = Vec::new();
        encode(b"NNNN", &mut ambiguous);
        encode(b"XZ.a", &mut unknown);
        assert_eq!(ambiguous, unknown);
        assert_eq!(roundtrip(b"acgu"), b"NNNN");
    }

    #[test]
    fn test_empty_input_decodes_to_empty() {
        let mut decoded = b"stale".to_vec();
        decode(&[], 12, &mut decoded).unwrap();
        assert!(decoded.is_empty());
        assert!(roundtrip(b"").is_empty());
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let mut decoded = Vec::new();
        let result = decode(&[0x12], 4, &mut decoded);
        assert!(matches!(
            result,
            Err(crate::Error::CodecError(CodecError::TruncatedSequence {
                expected: 2,
                actual: 1
            }))
        ));
    }

    #[test]
    fn test_decode_clears_output() {
        let mut packed = Vec::new();
        let mut decoded = Vec::new();
        encode(b"ACGT", &mut packed);
        decode(&packed, 4, &mut decoded).unwrap();
        encode(b"TT", &mut packed);
        decode(&packed, 2, &mut decoded).unwrap();
        assert_eq!(decoded, b"TT");
    }
}
